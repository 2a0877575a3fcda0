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

    devices::fdc::command.rs

    Command byte layouts and status register bits of the WD1772.
*/

use modular_bitfield::{bitfield, prelude::*};
use strum_macros::Display;

// Status Register Bit Definitions
// --------------------------------------------------------------------------------
// Several bits change meaning depending on whether the last command was a type I
// (head positioning) command or a type II/III (data transfer) command.
pub const S_BUSY: u8 = 0b0000_0001;
/// Type II/III: data request.
pub const S_DRQ: u8 = 0b0000_0010;
/// Type I: index pulse.
pub const S_IP: u8 = 0b0000_0010;
/// Type I: head is on track 0.
pub const S_TR00: u8 = 0b0000_0100;
/// Type II/III: host did not service DRQ in time.
pub const S_LOST: u8 = 0b0000_0100;
pub const S_CRC: u8 = 0b0000_1000;
/// Type II/III: record not found.
pub const S_RNF: u8 = 0b0001_0000;
/// Type I: seek error. Same bit as record not found.
pub const S_SEEK_ERROR: u8 = 0b0001_0000;
/// Type I: spin-up complete.
pub const S_SPIN: u8 = 0b0010_0000;
/// Type II: record type, set when a deleted data mark was read.
pub const S_DDM: u8 = 0b0010_0000;
pub const S_WP: u8 = 0b0100_0000;
pub const S_MON: u8 = 0b1000_0000;
/// Reported in place of motor on when no medium is present.
pub const S_NOT_READY: u8 = 0b1000_0000;

// Force interrupt conditions
pub const I_NOT_READY_TO_READY: u8 = 0b0000_0001;
pub const I_READY_TO_NOT_READY: u8 = 0b0000_0010;
pub const I_INDEX: u8 = 0b0000_0100;
pub const I_IMMEDIATE: u8 = 0b0000_1000;

/// Type I command byte: restore, seek and the step family.
#[bitfield]
#[derive(Copy, Clone)]
pub struct TypeICommand {
    pub rate:       B2,
    pub verify:     bool,
    pub no_spinup:  bool,
    pub update:     bool,
    pub opcode:     B3,
}

/// Type II/III command byte: read/write sector and read address.
#[bitfield]
#[derive(Copy, Clone)]
pub struct TypeIICommand {
    pub deleted_mark: bool,
    pub no_precomp:   bool,
    pub settle:       bool,
    pub no_spinup:    bool,
    pub multi:        bool,
    pub opcode:       B3,
}

/// Type IV command byte: force interrupt.
#[bitfield]
#[derive(Copy, Clone)]
pub struct ForceInterruptCommand {
    pub conditions: B4,
    pub opcode:     B4,
}

#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Display)]
pub enum Command {
    #[default]
    #[strum(to_string = "No Command")]
    NoCommand,
    Restore,
    Seek,
    Step,
    #[strum(to_string = "Step In")]
    StepIn,
    #[strum(to_string = "Step Out")]
    StepOut,
    #[strum(to_string = "Read Sector")]
    ReadSector,
    #[strum(to_string = "Write Sector")]
    WriteSector,
    #[strum(to_string = "Read Address")]
    ReadAddress,
    #[strum(to_string = "Read Track")]
    ReadTrack,
    #[strum(to_string = "Write Track")]
    WriteTrack,
    #[strum(to_string = "Force Interrupt")]
    ForceInterrupt,
}

impl Command {
    pub fn decode(byte: u8) -> Command {
        match byte >> 4 {
            0x0 => Command::Restore,
            0x1 => Command::Seek,
            0x2 | 0x3 => Command::Step,
            0x4 | 0x5 => Command::StepIn,
            0x6 | 0x7 => Command::StepOut,
            0x8 | 0x9 => Command::ReadSector,
            0xA | 0xB => Command::WriteSector,
            0xC => Command::ReadAddress,
            0xD => Command::ForceInterrupt,
            0xE => Command::ReadTrack,
            _ => Command::WriteTrack,
        }
    }

    pub fn is_type_1(&self) -> bool {
        matches!(
            self,
            Command::Restore | Command::Seek | Command::Step | Command::StepIn | Command::StepOut
        )
    }

    /// Restore and seek always update the track register. The step family does so only when
    /// the `u` flag is set.
    pub fn always_updates_track(&self) -> bool {
        matches!(self, Command::Restore | Command::Seek)
    }
}
