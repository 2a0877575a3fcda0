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

    device_types::encoding.rs

    FM and MFM cell encoding, and the address mark patterns recognized by
    the controller.

    A byte is recorded as 16 cells, alternating clock and data, MSB first.
    FM always records a clock cell. MFM records a clock cell only between
    two zero data bits. Address marks break those rules on purpose so that
    they cannot occur in ordinary data.
*/

use serde_derive::Deserialize;
use strum_macros::{Display, EnumString};

pub const IDAM: u8 = 0xFE;
pub const DAM: u8 = 0xFB;
pub const DAM_DELETED: u8 = 0xF8;
pub const IAM: u8 = 0xFC;

/// MFM A1 with the clock between bits 4 and 5 dropped.
pub const MFM_SYNC_A1: u16 = 0x4489;
/// MFM C2 with a missing clock, used ahead of the index address mark.
pub const MFM_SYNC_C2: u16 = 0x5224;

pub const FM_CLOCK_NORMAL: u8 = 0xFF;
pub const FM_CLOCK_MARK: u8 = 0xC7;
pub const FM_CLOCK_INDEX: u8 = 0xD7;

pub const FM_IDAM: u16 = 0xF57E;
pub const FM_DAM: u16 = 0xF56F;
pub const FM_DAM_FA: u16 = 0xF56E;
pub const FM_DAM_F9: u16 = 0xF56B;
pub const FM_DAM_DELETED: u16 = 0xF56A;
pub const FM_IAM: u16 = 0xF77A;

/// Recording density of a track, selected on the controller by the DDEN line.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Hash, Deserialize, Display, EnumString)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase", ascii_case_insensitive)]
pub enum TrackEncoding {
    Fm,
    #[default]
    Mfm,
}

impl TrackEncoding {
    /// Nominal width of one cell. A data bit occupies two cells.
    pub const fn cell_ns(&self) -> u64 {
        match self {
            TrackEncoding::Fm => 4_000,
            TrackEncoding::Mfm => 2_000,
        }
    }

    /// Sub-clock period of the data separator. There are 16 sub-clocks per cell.
    pub const fn pll_period_ns(&self) -> u64 {
        self.cell_ns() / 16
    }

    pub const fn is_mfm(&self) -> bool {
        matches!(self, TrackEncoding::Mfm)
    }

    /// Byte used to fill gaps.
    pub const fn gap_byte(&self) -> u8 {
        match self {
            TrackEncoding::Fm => 0xFF,
            TrackEncoding::Mfm => 0x4E,
        }
    }

    /// Encode a data byte. `prev_bit` is the last data bit recorded and is ignored for FM.
    pub fn encode(&self, byte: u8, prev_bit: bool) -> u16 {
        match self {
            TrackEncoding::Fm => encode_fm(byte),
            TrackEncoding::Mfm => encode_mfm(byte, prev_bit),
        }
    }
}

/// Interleave explicit clock and data bits into 16 cells.
pub fn encode_fm_with_clock(data: u8, clock: u8) -> u16 {
    let mut raw = 0u16;
    for i in (0..8).rev() {
        raw = (raw << 2) | ((((clock >> i) & 1) as u16) << 1) | ((data >> i) & 1) as u16;
    }
    raw
}

pub fn encode_fm(data: u8) -> u16 {
    encode_fm_with_clock(data, FM_CLOCK_NORMAL)
}

pub fn encode_mfm(data: u8, prev_bit: bool) -> u16 {
    let mut raw = 0u16;
    let mut prev = prev_bit;
    for i in (0..8).rev() {
        let bit = (data >> i) & 1 != 0;
        let clock = !prev && !bit;
        raw = (raw << 2) | ((clock as u16) << 1) | bit as u16;
        prev = bit;
    }
    raw
}

/// Extract the 8 data cells from 16 raw cells.
pub fn decode_data_bits(raw: u16) -> u8 {
    let mut data = 0u8;
    for i in 0..8 {
        data |= (((raw >> (i * 2)) & 1) as u8) << i;
    }
    data
}

/// Return the mark byte for an FM address mark pattern, if `raw` is one.
pub fn fm_mark(raw: u16) -> Option<u8> {
    match raw {
        FM_IDAM => Some(IDAM),
        FM_DAM => Some(DAM),
        FM_DAM_FA => Some(0xFA),
        FM_DAM_F9 => Some(0xF9),
        FM_DAM_DELETED => Some(DAM_DELETED),
        _ => None,
    }
}
