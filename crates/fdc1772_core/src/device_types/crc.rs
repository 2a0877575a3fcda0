/*
    MartyPC
    https://github.com/dbalsom/martypc

    Copyright 2022-2025 Daniel Balsom

    Permission is hereby granted, free of charge, to any person obtaining a
    copy of this software and associated documentation files (the “Software”),
    to deal in the Software without restriction, including without limitation
    the rights to use, copy, modify, merge, publish, distribute, sublicense,
    and/or sell copies of the Software, and to permit persons to whom the
    Software is furnished to do so, subject to the following conditions:

    The above copyright notice and this permission notice shall be included in
    all copies or substantial portions of the Software.

    THE SOFTWARE IS PROVIDED “AS IS”, WITHOUT WARRANTY OF ANY KIND, EXPRESS OR
    IMPLIED, INCLUDING BUT NOT LIMITED TO THE WARRANTIES OF MERCHANTABILITY,
    FITNESS FOR A PARTICULAR PURPOSE AND NONINFRINGEMENT. IN NO EVENT SHALL THE
    AUTHORS OR COPYRIGHT HOLDERS BE LIABLE FOR ANY CLAIM, DAMAGES OR OTHER
    LIABILITY, WHETHER IN AN ACTION OF CONTRACT, TORT OR OTHERWISE, ARISING
    FROM, OUT OF OR IN CONNECTION WITH THE SOFTWARE OR THE USE OR OTHER
    DEALINGS IN THE SOFTWARE.

    --------------------------------------------------------------------------

    device_types::crc.rs

    CRC-CCITT as computed by floppy controllers over ID and data fields.
*/

pub const CRC_CCITT_POLY: u16 = 0x1021;
pub const CRC_CCITT_INIT: u16 = 0xFFFF;

/// CRC after three MFM A1 sync bytes, which is where the controller seeds the CRC when it
/// recognizes the sync pattern.
pub const CRC_AFTER_MFM_SYNC: u16 = 0xCDB4;
/// CRC after one MFM A1 byte. The decoder presets this value and then clocks the remaining
/// two A1 bytes through the data path.
pub const CRC_AFTER_ONE_A1: u16 = 0x443B;

/// Shift a single data bit through the CRC.
#[inline]
pub const fn crc_ccitt_bit(crc: u16, bit: bool) -> u16 {
    if ((crc & 0x8000) != 0) ^ bit {
        (crc << 1) ^ CRC_CCITT_POLY
    }
    else {
        crc << 1
    }
}

/// Shift a byte through the CRC, MSB first.
pub const fn crc_ccitt_byte(mut crc: u16, byte: u8) -> u16 {
    let mut i = 0;
    while i < 8 {
        crc = crc_ccitt_bit(crc, (byte & (0x80 >> i)) != 0);
        i += 1;
    }
    crc
}

pub fn crc_ccitt(crc: u16, data: &[u8]) -> u16 {
    data.iter().fold(crc, |crc, &b| crc_ccitt_byte(crc, b))
}
