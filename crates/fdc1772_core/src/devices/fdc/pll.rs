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

    devices::fdc::pll.rs

    Digital phase-locked data separator.

    The separator runs a 12-bit counter clocked at 16 times the nominal cell
    rate. A cell ends when the counter overflows 0x800. Whether a flux
    transition landed in the cell, and in which sub-clock slot, decides the
    phase and frequency corrections applied over the first eight slots of
    the following cell.
*/

use crate::{device_types::sim_time::SimTime, devices::floppy_drive::FloppyDrive};

const PLL_SLOTS: usize = 38;
const COUNTER_OVERFLOW: u16 = 0x800;
const COUNTER_MASK: u16 = 0x7ff;
const NOMINAL_INCREMENT: u16 = 128;
const PHASE_ADD_INCREMENT: u16 = 258;
const PHASE_SUB_INCREMENT: u16 = 34;
const MAX_INCREMENT: u16 = 140;
const MIN_INCREMENT: u16 = 117;
const NO_TRANSITION: u16 = 0xffff;

// Correction masks indexed by the slot the transition fell in. Bit n applies to slot n of the
// next cell.
const PHASE_ADD: [u8; 8] = [0x0f, 0x07, 0x03, 0x01, 0x00, 0x00, 0x00, 0x00];
const PHASE_SUB: [u8; 8] = [0x00, 0x00, 0x00, 0x00, 0x01, 0x03, 0x07, 0x0f];
// Frequency correction additionally depends on the last two early/late observations.
const FREQ_ADD: [[u8; 8]; 4] = [
    [0x0f, 0x07, 0x03, 0x01, 0x00, 0x00, 0x00, 0x00],
    [0x07, 0x03, 0x01, 0x00, 0x00, 0x00, 0x00, 0x00],
    [0x07, 0x03, 0x01, 0x00, 0x00, 0x00, 0x00, 0x00],
    [0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00],
];
const FREQ_SUB: [[u8; 8]; 4] = [
    [0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00],
    [0x00, 0x00, 0x00, 0x00, 0x00, 0x01, 0x03, 0x07],
    [0x00, 0x00, 0x00, 0x00, 0x00, 0x01, 0x03, 0x07],
    [0x00, 0x00, 0x00, 0x00, 0x01, 0x03, 0x07, 0x0f],
];

#[derive(Clone, Debug)]
pub struct Pll {
    /// Start of the current cell.
    pub ctime: SimTime,
    counter: u16,
    increment: u16,
    transition_time: u16,
    history: u8,
    slot: u8,
    phase_add: u8,
    phase_sub: u8,
    freq_add: u8,
    freq_sub: u8,
    delays: [SimTime; PLL_SLOTS],

    write_start_time: SimTime,
    write_buffer: Vec<SimTime>,
}

impl Default for Pll {
    fn default() -> Self {
        let mut pll = Self {
            ctime: SimTime::NEVER,
            counter: 0,
            increment: NOMINAL_INCREMENT,
            transition_time: NO_TRANSITION,
            history: 0x80,
            slot: 0,
            phase_add: 0,
            phase_sub: 0,
            freq_add: 0,
            freq_sub: 0,
            delays: [SimTime::ZERO; PLL_SLOTS],
            write_start_time: SimTime::NEVER,
            write_buffer: Vec::with_capacity(32),
        };
        pll.set_clock(SimTime::from_ns(125));
        pll
    }
}

impl Pll {
    /// Program the sub-clock period. A cell is nominally 16 periods.
    pub fn set_clock(&mut self, period: SimTime) {
        for (i, delay) in self.delays.iter_mut().enumerate() {
            *delay = SimTime::from_ns(period.as_ns() * (i as u64 + 1));
        }
    }

    /// Nominal cell width for the programmed clock.
    pub fn cell(&self) -> SimTime {
        self.delays[15]
    }

    /// Restart phase tracking at `when`, discarding all history.
    pub fn reset(&mut self, when: SimTime) {
        self.counter = 0;
        self.increment = NOMINAL_INCREMENT;
        self.transition_time = NO_TRANSITION;
        self.history = 0x80;
        self.slot = 0;
        self.ctime = when;
        self.phase_add = 0;
        self.phase_sub = 0;
        self.freq_add = 0;
        self.freq_sub = 0;
        self.write_start_time = SimTime::NEVER;
        self.write_buffer.clear();
    }

    pub fn counter(&self) -> u16 {
        self.counter
    }

    pub fn increment(&self) -> u16 {
        self.increment
    }

    /// Clock the separator through one cell. Returns whether the cell held a transition and
    /// sets `tm` to the end of the cell. Returns None if the cell would end after `limit`; the
    /// partial cell resumes on the next call.
    pub fn get_next_bit(&mut self, tm: &mut SimTime, drive: &FloppyDrive, limit: SimTime) -> Option<bool> {
        let when = drive.next_transition(self.ctime).unwrap_or(SimTime::NEVER);

        loop {
            let etime = self.ctime + self.delays[self.slot as usize];
            if etime > limit {
                return None;
            }
            if self.transition_time == NO_TRANSITION && etime >= when {
                self.transition_time = self.counter;
            }

            if self.slot < 8 {
                let mask = 1 << self.slot;
                if self.phase_add & mask != 0 {
                    self.counter += PHASE_ADD_INCREMENT;
                }
                else if self.phase_sub & mask != 0 {
                    self.counter += PHASE_SUB_INCREMENT;
                }
                else {
                    self.counter += self.increment;
                }

                if self.freq_add & mask != 0 && self.increment < MAX_INCREMENT {
                    self.increment += 1;
                }
                else if self.freq_sub & mask != 0 && self.increment > MIN_INCREMENT {
                    self.increment -= 1;
                }
            }
            else {
                self.counter += self.increment;
            }

            self.slot += 1;
            *tm = etime;
            if self.counter & COUNTER_OVERFLOW != 0 {
                break;
            }
        }

        let bit = self.transition_time != NO_TRANSITION;
        if bit {
            let cslot = (self.transition_time >> 8) as usize;
            self.phase_add = PHASE_ADD[cslot];
            self.phase_sub = PHASE_SUB[cslot];

            // 'late' is set when the transition arrived in the second half of the cell.
            let late = self.transition_time & 0x400 != 0;
            if self.history & 0x80 != 0 {
                self.history = if late { 0x80 } else { 0x83 };
            }
            else if self.history & 0x40 != 0 {
                self.history = if late { self.history & 2 } else { (self.history & 2) | 1 };
            }
            self.freq_add = FREQ_ADD[(self.history & 3) as usize][cslot];
            self.freq_sub = FREQ_SUB[(self.history & 3) as usize][cslot];
            self.history = if late { (self.history >> 1) | 2 } else { self.history >> 1 };
        }
        else {
            self.phase_add = 0;
            self.phase_sub = 0;
            self.freq_add = 0;
            self.freq_sub = 0;
        }

        self.counter &= COUNTER_MASK;
        self.ctime = *tm;
        self.transition_time = NO_TRANSITION;
        self.slot = 0;

        Some(bit)
    }

    pub fn is_writing(&self) -> bool {
        !self.write_start_time.is_never()
    }

    pub fn start_writing(&mut self, tm: SimTime) {
        self.write_start_time = tm;
        self.write_buffer.clear();
    }

    /// Record one cell. Returns true, recording nothing, if the cell would end after `limit`.
    pub fn write_next_bit(&mut self, bit: bool, tm: &mut SimTime, limit: SimTime) -> bool {
        let cell = self.cell();
        let etime = self.ctime + cell;
        if etime > limit {
            return true;
        }
        if bit {
            self.write_buffer.push(self.ctime + SimTime::from_ns(cell.as_ns() / 2));
        }
        self.ctime = etime;
        *tm = etime;
        false
    }

    /// Flush recorded transitions between the write start and `tm` to the medium.
    pub fn commit(&mut self, drive: &mut FloppyDrive, tm: SimTime) {
        if !self.is_writing() || tm <= self.write_start_time {
            return;
        }
        drive.write_flux(self.write_start_time, tm, &self.write_buffer);
        self.write_start_time = tm;
        self.write_buffer.clear();
    }

    pub fn stop_writing(&mut self, drive: &mut FloppyDrive, tm: SimTime) {
        self.commit(drive, tm);
        self.write_start_time = SimTime::NEVER;
    }
}
