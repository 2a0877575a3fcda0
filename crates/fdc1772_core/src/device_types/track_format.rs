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

    device_types::track_format.rs

    Builds IBM System 34 (MFM) and System 3740 (FM) formatted tracks as
    flux transition lists, and decodes them back into sectors.
*/

use std::fmt::Display;

use crate::device_types::{
    crc::{crc_ccitt, crc_ccitt_byte, CRC_AFTER_MFM_SYNC, CRC_CCITT_INIT},
    encoding::*,
    flux_disk::MediaError,
};

const MFM_GAP4A: usize = 80;
const MFM_GAP1: usize = 50;
const MFM_GAP2: usize = 22;
const MFM_GAP3: usize = 40;
const MFM_SYNC_LEN: usize = 12;

const FM_GAP4A: usize = 40;
const FM_GAP1: usize = 26;
const FM_GAP2: usize = 11;
const FM_GAP3: usize = 27;
const FM_SYNC_LEN: usize = 6;

/// Bytes after an ID field within which a data address mark must start.
const MFM_DAM_WINDOW: usize = 43;
const FM_DAM_WINDOW: usize = 30;

/// Value mixed into a computed CRC to record a deliberately bad field.
const CRC_CORRUPTION: u16 = 0x5A5A;

/// The four bytes of an ID field: cylinder, head, sector, length code.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub struct SectorId {
    pub cylinder:  u8,
    pub head:      u8,
    pub sector:    u8,
    pub size_code: u8,
}

impl SectorId {
    pub fn new(cylinder: u8, head: u8, sector: u8, size_code: u8) -> Self {
        Self {
            cylinder,
            head,
            sector,
            size_code,
        }
    }

    /// Data field length implied by the length code. The WD1772 only looks at the low two bits.
    pub fn size(&self) -> usize {
        128 << (self.size_code & 0x03)
    }

    pub fn to_bytes(&self) -> [u8; 4] {
        [self.cylinder, self.head, self.sector, self.size_code]
    }

    pub fn size_code_for(size: usize) -> Option<u8> {
        match size {
            128 => Some(0),
            256 => Some(1),
            512 => Some(2),
            1024 => Some(3),
            _ => None,
        }
    }
}

impl Display for SectorId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "[c:{} h:{} s:{} n:{}]",
            self.cylinder, self.head, self.sector, self.size_code
        )
    }
}

/// A sector to be laid down by [TrackBuilder::sector].
#[derive(Clone, Debug)]
pub struct SectorSpec {
    pub id: SectorId,
    pub data: Vec<u8>,
    pub deleted: bool,
    pub bad_id_crc: bool,
    pub bad_data_crc: bool,
    /// Record only the ID field.
    pub no_dam: bool,
}

impl SectorSpec {
    pub fn new(id: SectorId, data: Vec<u8>) -> Self {
        Self {
            id,
            data,
            deleted: false,
            bad_id_crc: false,
            bad_data_crc: false,
            no_dam: false,
        }
    }
    pub fn with_deleted(mut self) -> Self {
        self.deleted = true;
        self
    }
    pub fn with_bad_id_crc(mut self) -> Self {
        self.bad_id_crc = true;
        self
    }
    pub fn with_bad_data_crc(mut self) -> Self {
        self.bad_data_crc = true;
        self
    }
    pub fn with_no_dam(mut self) -> Self {
        self.no_dam = true;
        self
    }
}

/// Accumulates cells for one track.
pub struct TrackBuilder {
    encoding: TrackEncoding,
    cells: Vec<bool>,
    last_data_bit: bool,
}

impl TrackBuilder {
    pub fn new(encoding: TrackEncoding) -> Self {
        Self {
            encoding,
            cells: Vec::with_capacity(100_000),
            last_data_bit: false,
        }
    }

    pub fn encoding(&self) -> TrackEncoding {
        self.encoding
    }

    pub fn cells(&self) -> &[bool] {
        &self.cells
    }

    /// Length of the track so far, in whole bytes.
    pub fn len_bytes(&self) -> usize {
        self.cells.len() / 16
    }

    /// Append 16 raw cells, MSB first.
    pub fn raw(&mut self, raw: u16) {
        for i in (0..16).rev() {
            self.cells.push(raw & (1 << i) != 0);
        }
        self.last_data_bit = raw & 1 != 0;
    }

    pub fn byte(&mut self, byte: u8) {
        let raw = self.encoding.encode(byte, self.last_data_bit);
        self.raw(raw);
    }

    pub fn bytes(&mut self, data: &[u8]) {
        for &b in data {
            self.byte(b);
        }
    }

    pub fn fill(&mut self, byte: u8, count: usize) {
        for _ in 0..count {
            self.byte(byte);
        }
    }

    /// Write the sync run and address mark, returning the CRC seeded with the mark.
    fn address_mark(&mut self, mark: u8) -> u16 {
        match self.encoding {
            TrackEncoding::Mfm => {
                self.fill(0x00, MFM_SYNC_LEN);
                for _ in 0..3 {
                    self.raw(MFM_SYNC_A1);
                }
                self.byte(mark);
                crc_ccitt_byte(CRC_AFTER_MFM_SYNC, mark)
            }
            TrackEncoding::Fm => {
                self.fill(0x00, FM_SYNC_LEN);
                self.raw(encode_fm_with_clock(mark, FM_CLOCK_MARK));
                crc_ccitt_byte(CRC_CCITT_INIT, mark)
            }
        }
    }

    fn crc(&mut self, crc: u16, corrupt: bool) {
        let crc = if corrupt { crc ^ CRC_CORRUPTION } else { crc };
        self.byte((crc >> 8) as u8);
        self.byte(crc as u8);
    }

    /// Lay down the gap, sync run and index address mark that start an IBM track.
    pub fn preamble(&mut self) {
        match self.encoding {
            TrackEncoding::Mfm => {
                self.fill(0x4E, MFM_GAP4A);
                self.fill(0x00, MFM_SYNC_LEN);
                for _ in 0..3 {
                    self.raw(MFM_SYNC_C2);
                }
                self.byte(IAM);
                self.fill(0x4E, MFM_GAP1);
            }
            TrackEncoding::Fm => {
                self.fill(0xFF, FM_GAP4A);
                self.fill(0x00, FM_SYNC_LEN);
                self.raw(FM_IAM);
                self.fill(0xFF, FM_GAP1);
            }
        }
    }

    /// Lay down an ID field, gap 2, a data field and `gap3` gap bytes.
    pub fn sector(&mut self, spec: &SectorSpec, gap3: usize) {
        let id = spec.id.to_bytes();
        let crc = self.address_mark(IDAM);
        self.bytes(&id);
        self.crc(crc_ccitt(crc, &id), spec.bad_id_crc);

        let gap2 = if self.encoding.is_mfm() { MFM_GAP2 } else { FM_GAP2 };
        self.fill(self.encoding.gap_byte(), gap2);

        if !spec.no_dam {
            let crc = self.address_mark(if spec.deleted { DAM_DELETED } else { DAM });
            self.bytes(&spec.data);
            self.crc(crc_ccitt(crc, &spec.data), spec.bad_data_crc);
        }

        self.fill(self.encoding.gap_byte(), gap3);
    }

    /// Pad the track with gap bytes to a full revolution and convert the cells into flux
    /// transition positions, each recorded at the center of its cell.
    pub fn into_flux(self, revolution_ns: u64) -> Result<Vec<u32>, MediaError> {
        let cell_ns = self.encoding.cell_ns();
        self.into_flux_with_cell(revolution_ns, cell_ns)
    }

    /// As [TrackBuilder::into_flux], with an explicit cell width. Recording with a cell width
    /// other than nominal models a disk written on a drive running off-speed.
    pub fn into_flux_with_cell(mut self, revolution_ns: u64, cell_ns: u64) -> Result<Vec<u32>, MediaError> {
        let capacity = (revolution_ns / cell_ns) as usize;
        if self.cells.len() > capacity {
            return Err(MediaError::TrackOverflow {
                needed:   self.cells.len() / 16,
                capacity: capacity / 16,
            });
        }
        let gap = self.encoding.gap_byte();
        while self.cells.len() + 16 <= capacity {
            self.byte(gap);
        }

        Ok(self
            .cells
            .iter()
            .enumerate()
            .filter(|(_, cell)| **cell)
            .map(|(i, _)| (i as u64 * cell_ns + cell_ns / 2) as u32)
            .collect())
    }
}

/// Bytes in a full revolution at nominal speed.
pub fn track_capacity(encoding: TrackEncoding, revolution_ns: u64) -> usize {
    (revolution_ns / encoding.cell_ns()) as usize / 16
}

fn preamble_len(encoding: TrackEncoding) -> usize {
    match encoding {
        TrackEncoding::Mfm => MFM_GAP4A + MFM_SYNC_LEN + 4 + MFM_GAP1,
        TrackEncoding::Fm => FM_GAP4A + FM_SYNC_LEN + 1 + FM_GAP1,
    }
}

/// Length of a sector excluding gap 3.
fn sector_len(encoding: TrackEncoding, data_len: usize) -> usize {
    match encoding {
        TrackEncoding::Mfm => 2 * (MFM_SYNC_LEN + 4) + 4 + 2 + MFM_GAP2 + data_len + 2,
        TrackEncoding::Fm => 2 * (FM_SYNC_LEN + 1) + 4 + 2 + FM_GAP2 + data_len + 2,
    }
}

/// Build a standard IBM formatted track. Gap 3 shrinks from its usual length as needed to fit
/// the sectors in one revolution.
pub fn build_ibm_track(
    encoding: TrackEncoding,
    sectors: &[SectorSpec],
    revolution_ns: u64,
) -> Result<Vec<u32>, MediaError> {
    let capacity = track_capacity(encoding, revolution_ns);
    let fixed: usize = preamble_len(encoding) + sectors.iter().map(|s| sector_len(encoding, s.data.len())).sum::<usize>();
    if fixed > capacity {
        return Err(MediaError::TrackOverflow {
            needed: fixed,
            capacity,
        });
    }
    let default_gap3 = if encoding.is_mfm() { MFM_GAP3 } else { FM_GAP3 };
    let gap3 = if sectors.is_empty() {
        default_gap3
    }
    else {
        default_gap3.min((capacity - fixed) / sectors.len())
    };

    let mut builder = TrackBuilder::new(encoding);
    builder.preamble();
    for spec in sectors {
        builder.sector(spec, gap3);
    }
    builder.into_flux(revolution_ns)
}

/// A sector recovered from a flux track.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DecodedSector {
    pub id: SectorId,
    pub id_crc_valid: bool,
    /// Contents of the data field, without the CRC. None if no data mark followed the ID.
    pub data: Option<Vec<u8>>,
    pub data_crc_valid: bool,
    pub deleted: bool,
}

struct CellReader<'a> {
    cells: &'a [bool],
    pos: usize,
}

impl CellReader<'_> {
    fn cell(&mut self) -> Option<bool> {
        let cell = *self.cells.get(self.pos)?;
        self.pos += 1;
        Some(cell)
    }

    fn raw(&mut self) -> Option<u16> {
        let mut raw = 0u16;
        for _ in 0..16 {
            raw = (raw << 1) | self.cell()? as u16;
        }
        Some(raw)
    }

    fn bytes(&mut self, count: usize) -> Option<Vec<u8>> {
        (0..count).map(|_| self.raw().map(decode_data_bits)).collect()
    }
}

/// Quantize flux transitions into cells by rounding each interval to whole cells. The result
/// starts at the first transition of the track.
pub fn flux_to_cells(encoding: TrackEncoding, transitions: &[u32]) -> Vec<bool> {
    let cell_ns = encoding.cell_ns();
    let mut cells = Vec::with_capacity(transitions.len() * 3);
    cells.push(true);
    for pair in transitions.windows(2) {
        let delta = (pair[1] - pair[0]) as u64;
        let n = ((delta + cell_ns / 2) / cell_ns).max(1) as usize;
        cells.extend(std::iter::repeat(false).take(n - 1));
        cells.push(true);
    }
    if transitions.is_empty() {
        cells.clear();
    }
    cells
}

/// Find every ID field on a track and the data field that belongs to it.
pub fn decode_ibm_track(encoding: TrackEncoding, transitions: &[u32]) -> Vec<DecodedSector> {
    let cells = flux_to_cells(encoding, transitions);
    let mut reader = CellReader { cells: &cells, pos: 0 };
    let dam_window = 16 * if encoding.is_mfm() { MFM_DAM_WINDOW } else { FM_DAM_WINDOW };
    let mut sectors: Vec<DecodedSector> = Vec::new();
    // Cell position where the most recent ID field ended, while its data field is still expected.
    let mut id_end: Option<usize> = None;
    let mut shift = 0u16;

    while let Some(cell) = reader.cell() {
        shift = (shift << 1) | cell as u16;

        let (mark, crc) = match encoding {
            TrackEncoding::Mfm if shift == MFM_SYNC_A1 => {
                let mut raw = MFM_SYNC_A1;
                while raw == MFM_SYNC_A1 {
                    match reader.raw() {
                        Some(r) => raw = r,
                        None => return sectors,
                    }
                }
                let mark = decode_data_bits(raw);
                (mark, crc_ccitt_byte(CRC_AFTER_MFM_SYNC, mark))
            }
            TrackEncoding::Fm => match fm_mark(shift) {
                Some(mark) => (mark, crc_ccitt_byte(CRC_CCITT_INIT, mark)),
                None => continue,
            },
            _ => continue,
        };
        shift = 0;

        match mark {
            IDAM => {
                let Some(field) = reader.bytes(6)
                else {
                    break;
                };
                sectors.push(DecodedSector {
                    id: SectorId::new(field[0], field[1], field[2], field[3]),
                    id_crc_valid: crc_ccitt(crc, &field) == 0,
                    data: None,
                    data_crc_valid: false,
                    deleted: false,
                });
                id_end = Some(reader.pos);
            }
            0xF8..=0xFB => {
                let Some(end) = id_end.take()
                else {
                    continue;
                };
                if reader.pos - end > dam_window {
                    continue;
                }
                let Some(sector) = sectors.last_mut()
                else {
                    continue;
                };
                let size = sector.id.size();
                let Some(mut field) = reader.bytes(size + 2)
                else {
                    break;
                };
                sector.data_crc_valid = crc_ccitt(crc, &field) == 0;
                sector.deleted = matches!(mark, 0xF8 | 0xF9);
                field.truncate(size);
                sector.data = Some(field);
            }
            _ => {}
        }
    }
    sectors
}
