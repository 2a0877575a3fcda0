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

    devices::fdc::live.rs

    The live bitstream engine.

    Decoding runs ahead of emulated time until it reaches a point where the
    host must observe something (a byte ready, a header complete). That
    point is scheduled as an event on the general timer. Any synchronous
    access that lands before the event rolls the engine back to the last
    checkpoint and replays it up to the present, so the host never sees
    state from the future.
*/

use crate::{
    coreconfig::CrcErrorPolicy,
    device_types::{
        crc::{crc_ccitt_bit, crc_ccitt_byte, CRC_AFTER_ONE_A1, CRC_CCITT_INIT},
        encoding::{encode_fm_with_clock, fm_mark, DAM, DAM_DELETED, FM_CLOCK_MARK, FM_IDAM, IDAM, MFM_SYNC_A1},
        sim_time::SimTime,
    },
    devices::fdc::{command::*, pll::Pll, FloppyController, MainState, TimerId},
};
use strum_macros::Display;

/// How far past the present the engine may run when no index pulse bounds it.
const LIVE_RUN_HORIZON: SimTime = SimTime::from_ms(1);

#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Display)]
pub enum LiveState {
    #[default]
    Idle,
    SearchAddressMarkHeader,
    ReadHeaderBlockHeader,
    ReadIdBlockToLocal,
    ReadIdBlockToDma,
    ReadIdBlockToDmaByte,
    SearchAddressMarkData,
    ReadDataBlockHeader,
    ReadSectorData,
    ReadSectorDataByte,
    WriteSectorPre,
    WriteSectorPreByte,
    WriteSectorDataByte,
    WriteByte,
}

#[derive(Clone, Debug, Default)]
pub struct LiveInfo {
    /// Time the engine has decoded up to.
    pub tm: SimTime,
    pub state: LiveState,
    /// State to enter once emulated time catches up with `tm`.
    pub next_state: Option<LiveState>,
    pub shift_reg: u16,
    pub crc: u16,
    /// Cells seen since the last address mark, or cells left to shift out while writing.
    pub bit_counter: u32,
    pub byte_counter: u32,
    /// Cells seen since the engine was started. Bounds the data mark search.
    pub window: u32,
    /// True when the next cell is a data cell.
    pub data_separator_phase: bool,
    /// Last data bit written, for MFM clock generation.
    pub data_bit_context: bool,
    pub data_reg: u8,
    pub idbuf: [u8; 6],
    pub data_mark: Option<u8>,
    pub pll: Pll,
}

impl LiveInfo {
    pub fn never() -> Self {
        Self {
            tm: SimTime::NEVER,
            ..Default::default()
        }
    }

    /// Enter the first byte after an address mark. The CRC has already absorbed the mark.
    fn mark_found(&mut self, crc: u16) {
        self.crc = crc;
        self.data_separator_phase = false;
        self.bit_counter = 0;
    }

    fn deleted_mark(&self) -> bool {
        matches!(self.data_mark, Some(0xF8 | 0xF9))
    }
}

/// Byte offsets of each field of a sector data block as laid down by write sector.
struct WriteLayout {
    dam:   usize,
    data:  usize,
    crc:   usize,
    end:   usize,
}

impl FloppyController {
    pub(super) fn checkpoint(&mut self) {
        self.checkpoint_live = self.cur_live.clone();
    }

    pub(super) fn rollback(&mut self) {
        self.cur_live = self.checkpoint_live.clone();
    }

    /// Reset the engine at the present time and begin decoding in `state`.
    pub(super) fn live_start(&mut self, state: LiveState) {
        let live = &mut self.cur_live;
        live.tm = self.now;
        live.state = state;
        live.next_state = None;
        live.shift_reg = 0;
        live.crc = CRC_CCITT_INIT;
        live.bit_counter = 0;
        live.byte_counter = 0;
        live.window = 0;
        live.data_separator_phase = false;
        live.data_bit_context = false;
        live.data_reg = 0;
        live.data_mark = None;
        live.pll.set_clock(SimTime::from_ns(self.encoding.pll_period_ns()));
        live.pll.reset(self.now);
        log::trace!("live_start(): {} at {}", state, self.now);

        self.checkpoint();
        self.live_run_default();
    }

    /// Bring the engine to the present. Either replays from the checkpoint when decoding has
    /// run past `now`, or applies the pending state change that has come due.
    pub(super) fn live_sync(&mut self) {
        if self.cur_live.tm.is_never() {
            return;
        }
        if self.cur_live.tm > self.now {
            self.rollback();
            self.live_run(self.now);
            let tm = self.cur_live.tm;
            self.cur_live.pll.commit(&mut self.drive, tm);
        }
        else {
            let tm = self.cur_live.tm;
            self.cur_live.pll.commit(&mut self.drive, tm);
            if let Some(next) = self.cur_live.next_state.take() {
                self.cur_live.state = next;
            }
            if self.cur_live.state == LiveState::Idle {
                self.cur_live.pll.stop_writing(&mut self.drive, tm);
                self.cur_live.tm = SimTime::NEVER;
            }
        }
        self.cur_live.next_state = None;
        self.checkpoint();
    }

    pub(super) fn live_abort(&mut self) {
        if !self.cur_live.tm.is_never() && self.cur_live.tm > self.now {
            self.rollback();
            self.live_run(self.now);
        }
        let tm = self.cur_live.tm;
        if !tm.is_never() {
            self.cur_live.pll.stop_writing(&mut self.drive, tm);
        }
        self.cur_live.tm = SimTime::NEVER;
        self.cur_live.state = LiveState::Idle;
        self.cur_live.next_state = None;
        self.timers[TimerId::Gen as usize] = SimTime::NEVER;
    }

    /// Stop decoding and schedule `state` for when emulated time reaches the engine.
    fn live_delay(&mut self, state: LiveState) {
        self.cur_live.next_state = Some(state);
        self.timers[TimerId::Gen as usize] = self.cur_live.tm;
    }

    pub(super) fn live_run_default(&mut self) {
        let limit = if self.next_index.is_never() {
            // Nothing else will wake the engine, so arm the general timer at the horizon.
            let limit = self.now + LIVE_RUN_HORIZON;
            self.timers[TimerId::Gen as usize] = limit;
            limit
        }
        else {
            self.next_index
        };
        self.live_run(limit);
    }

    /// Clock one cell through the data separator. Returns true if `limit` was reached first.
    fn read_one_bit(&mut self, limit: SimTime) -> bool {
        let Some(bit) = self.cur_live.pll.get_next_bit(&mut self.cur_live.tm, &self.drive, limit)
        else {
            return true;
        };
        let live = &mut self.cur_live;
        live.shift_reg = (live.shift_reg << 1) | bit as u16;
        live.bit_counter += 1;
        live.window += 1;
        if live.data_separator_phase {
            live.data_reg = (live.data_reg << 1) | bit as u8;
            live.crc = crc_ccitt_bit(live.crc, bit);
        }
        live.data_separator_phase = !live.data_separator_phase;
        false
    }

    /// Shift one cell out to the medium. Returns true if `limit` was reached first.
    fn write_one_bit(&mut self, limit: SimTime) -> bool {
        let bit = self.cur_live.shift_reg & 0x8000 != 0;
        if self.cur_live.pll.write_next_bit(bit, &mut self.cur_live.tm, limit) {
            return true;
        }
        self.cur_live.shift_reg <<= 1;
        self.cur_live.bit_counter -= 1;
        false
    }

    fn live_write_raw(&mut self, raw: u16) {
        self.cur_live.shift_reg = raw;
        self.cur_live.data_bit_context = raw & 1 != 0;
        self.cur_live.bit_counter = 16;
    }

    fn live_write_byte(&mut self, byte: u8) {
        self.cur_live.shift_reg = self.encoding.encode(byte, self.cur_live.data_bit_context);
        self.cur_live.data_bit_context = byte & 1 != 0;
        self.cur_live.bit_counter = 16;
    }

    fn write_layout(&self) -> WriteLayout {
        let (pre, syncs) = if self.encoding.is_mfm() { (12, 3) } else { (6, 0) };
        let dam = pre + syncs;
        WriteLayout {
            dam,
            data: dam + 1,
            crc: dam + 1 + self.sector_size,
            end: dam + 1 + self.sector_size + 3,
        }
    }

    /// Load the shift register with the next byte of the data block being written. Returns true
    /// if the engine must wait for an event instead.
    fn write_sector_next(&mut self) -> bool {
        let layout = self.write_layout();
        let i = self.cur_live.byte_counter as usize;
        let mfm = self.encoding.is_mfm();

        if i < layout.dam && (!mfm || i < layout.dam - 3) {
            self.live_write_byte(0x00);
        }
        else if i < layout.dam {
            if i == layout.dam - 3 {
                self.cur_live.crc = CRC_CCITT_INIT;
            }
            self.cur_live.crc = crc_ccitt_byte(self.cur_live.crc, 0xA1);
            self.live_write_raw(MFM_SYNC_A1);
        }
        else if i == layout.dam {
            let mark = if self.type_2().deleted_mark() { DAM_DELETED } else { DAM };
            if mfm {
                self.cur_live.crc = crc_ccitt_byte(self.cur_live.crc, mark);
                self.live_write_byte(mark);
            }
            else {
                self.cur_live.crc = crc_ccitt_byte(CRC_CCITT_INIT, mark);
                self.live_write_raw(encode_fm_with_clock(mark, FM_CLOCK_MARK));
            }
        }
        else if i < layout.crc {
            self.live_delay(LiveState::WriteSectorDataByte);
            return true;
        }
        else if i == layout.crc {
            self.live_write_byte((self.cur_live.crc >> 8) as u8);
        }
        else if i == layout.crc + 1 {
            self.live_write_byte(self.cur_live.crc as u8);
        }
        else if i < layout.end {
            self.live_write_byte(0xFF);
        }
        else {
            self.live_delay(LiveState::Idle);
            return true;
        }
        self.cur_live.state = LiveState::WriteByte;
        false
    }

    pub(super) fn live_run(&mut self, limit: SimTime) {
        if self.cur_live.state == LiveState::Idle || self.cur_live.tm > limit {
            return;
        }
        let mfm = self.encoding.is_mfm();

        loop {
            match self.cur_live.state {
                LiveState::SearchAddressMarkHeader => {
                    if self.read_one_bit(limit) {
                        return;
                    }
                    if mfm && self.cur_live.shift_reg == MFM_SYNC_A1 {
                        self.cur_live.mark_found(CRC_AFTER_ONE_A1);
                        self.cur_live.state = LiveState::ReadHeaderBlockHeader;
                    }
                    else if !mfm && self.cur_live.shift_reg == FM_IDAM {
                        self.cur_live.mark_found(crc_ccitt_byte(CRC_CCITT_INIT, IDAM));
                        self.cur_live.state = self.id_block_state();
                    }
                }

                LiveState::ReadHeaderBlockHeader => {
                    if self.read_one_bit(limit) {
                        return;
                    }
                    if self.cur_live.bit_counter & 15 != 0 {
                        continue;
                    }
                    let slot = self.cur_live.bit_counter >> 4;
                    if slot < 3 {
                        if self.cur_live.shift_reg != MFM_SYNC_A1 {
                            self.cur_live.state = LiveState::SearchAddressMarkHeader;
                        }
                        continue;
                    }
                    if self.cur_live.data_reg != IDAM {
                        self.cur_live.state = LiveState::SearchAddressMarkHeader;
                        continue;
                    }
                    self.cur_live.bit_counter = 0;
                    self.cur_live.state = self.id_block_state();
                }

                LiveState::ReadIdBlockToLocal => {
                    if self.read_one_bit(limit) {
                        return;
                    }
                    if self.cur_live.bit_counter & 15 != 0 {
                        continue;
                    }
                    let slot = (self.cur_live.bit_counter >> 4) as usize - 1;
                    self.cur_live.idbuf[slot] = self.cur_live.data_reg;
                    if slot == 5 {
                        self.live_delay(LiveState::Idle);
                        return;
                    }
                }

                LiveState::ReadIdBlockToDma => {
                    if self.read_one_bit(limit) {
                        return;
                    }
                    if self.cur_live.bit_counter & 15 != 0 {
                        continue;
                    }
                    self.live_delay(LiveState::ReadIdBlockToDmaByte);
                    return;
                }

                LiveState::ReadIdBlockToDmaByte => {
                    let slot = (self.cur_live.bit_counter >> 4) as usize - 1;
                    self.cur_live.idbuf[slot] = self.cur_live.data_reg;
                    if self.drq {
                        log::debug!("Read Address: lost data at ID byte {}", slot);
                        self.status |= S_LOST;
                        self.live_abort();
                        self.command_end();
                        return;
                    }
                    self.data = self.cur_live.data_reg;
                    self.set_drq();
                    if slot == 5 {
                        self.live_delay(LiveState::Idle);
                        return;
                    }
                    self.cur_live.state = LiveState::ReadIdBlockToDma;
                    self.checkpoint();
                }

                LiveState::SearchAddressMarkData => {
                    if self.read_one_bit(limit) {
                        return;
                    }
                    if self.cur_live.window > self.dam_window() * 16 {
                        self.live_delay(LiveState::Idle);
                        return;
                    }
                    if mfm && self.cur_live.shift_reg == MFM_SYNC_A1 {
                        self.cur_live.mark_found(CRC_AFTER_ONE_A1);
                        self.cur_live.state = LiveState::ReadDataBlockHeader;
                    }
                    else if !mfm {
                        if let Some(mark) = fm_mark(self.cur_live.shift_reg).filter(|&m| m != IDAM) {
                            self.cur_live.mark_found(crc_ccitt_byte(CRC_CCITT_INIT, mark));
                            self.cur_live.data_mark = Some(mark);
                            self.cur_live.state = LiveState::ReadSectorData;
                        }
                    }
                }

                LiveState::ReadDataBlockHeader => {
                    if self.read_one_bit(limit) {
                        return;
                    }
                    if self.cur_live.bit_counter & 15 != 0 {
                        continue;
                    }
                    let slot = self.cur_live.bit_counter >> 4;
                    if slot < 3 {
                        if self.cur_live.shift_reg != MFM_SYNC_A1 {
                            self.cur_live.state = LiveState::SearchAddressMarkData;
                        }
                        continue;
                    }
                    if !(0xF8..=0xFB).contains(&self.cur_live.data_reg) {
                        self.cur_live.state = LiveState::SearchAddressMarkData;
                        continue;
                    }
                    self.cur_live.data_mark = Some(self.cur_live.data_reg);
                    self.cur_live.bit_counter = 0;
                    self.cur_live.state = LiveState::ReadSectorData;
                }

                LiveState::ReadSectorData => {
                    if self.read_one_bit(limit) {
                        return;
                    }
                    if self.cur_live.bit_counter & 15 != 0 {
                        continue;
                    }
                    let slot = (self.cur_live.bit_counter >> 4) as usize;
                    if slot <= self.sector_size {
                        self.live_delay(LiveState::ReadSectorDataByte);
                        return;
                    }
                    if slot == self.sector_size + 2 {
                        self.live_delay(LiveState::Idle);
                        return;
                    }
                }

                LiveState::ReadSectorDataByte => {
                    let slot = (self.cur_live.bit_counter >> 4) as usize - 1;
                    if slot == 0 && self.cur_live.deleted_mark() {
                        self.status |= S_DDM;
                    }
                    match self.config.crc_error_policy {
                        CrcErrorPolicy::CompleteTransfer => {
                            if self.drq {
                                log::debug!("Read Sector: lost data at byte {}", slot);
                                self.status |= S_LOST;
                                self.live_abort();
                                self.command_end();
                                return;
                            }
                            self.data = self.cur_live.data_reg;
                            self.set_drq();
                        }
                        CrcErrorPolicy::AbortTransfer => {
                            self.xfer_buffer.push(self.cur_live.data_reg);
                        }
                    }
                    self.cur_live.state = LiveState::ReadSectorData;
                    self.checkpoint();
                }

                LiveState::WriteSectorPre => {
                    if self.read_one_bit(limit) {
                        return;
                    }
                    if self.cur_live.bit_counter != 16 {
                        continue;
                    }
                    self.live_delay(LiveState::WriteSectorPreByte);
                    return;
                }

                LiveState::WriteSectorPreByte => {
                    self.cur_live.state = LiveState::WriteSectorPre;
                    self.cur_live.byte_counter += 1;
                    self.cur_live.bit_counter = 0;
                    let gate = if mfm { 22 } else { 11 };
                    match self.cur_live.byte_counter {
                        2 => self.set_drq(),
                        n if n == gate => {
                            if self.drq {
                                log::debug!("Write Sector: first byte not supplied");
                                self.status |= S_LOST;
                                self.live_abort();
                                self.command_end();
                                return;
                            }
                            let tm = self.cur_live.tm;
                            self.cur_live.pll.start_writing(tm);
                            self.cur_live.byte_counter = 0;
                            self.cur_live.data_bit_context = false;
                            self.write_sector_next();
                        }
                        _ => {}
                    }
                    self.checkpoint();
                }

                LiveState::WriteSectorDataByte => {
                    let layout = self.write_layout();
                    let index = self.cur_live.byte_counter as usize - layout.data;
                    let byte = if self.drq {
                        log::debug!("Write Sector: lost data at byte {}", index);
                        self.status |= S_LOST;
                        0x00
                    }
                    else {
                        self.data
                    };
                    self.cur_live.crc = crc_ccitt_byte(self.cur_live.crc, byte);
                    self.live_write_byte(byte);
                    if index + 1 < self.sector_size {
                        self.set_drq();
                    }
                    self.cur_live.state = LiveState::WriteByte;
                    self.checkpoint();
                }

                LiveState::WriteByte => {
                    if self.write_one_bit(limit) {
                        return;
                    }
                    if self.cur_live.bit_counter != 0 {
                        continue;
                    }
                    self.cur_live.byte_counter += 1;
                    if self.write_sector_next() {
                        return;
                    }
                }

                LiveState::Idle => return,
            }
        }
    }

    fn id_block_state(&self) -> LiveState {
        if self.main_state == MainState::ReadAddress {
            LiveState::ReadIdBlockToDma
        }
        else {
            LiveState::ReadIdBlockToLocal
        }
    }

    /// Bytes after the ID field within which the data mark must appear.
    fn dam_window(&self) -> u32 {
        if self.encoding.is_mfm() {
            43
        }
        else {
            30
        }
    }
}
