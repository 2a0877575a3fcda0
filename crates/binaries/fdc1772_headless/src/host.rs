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

    host.rs

    A minimal host CPU stand-in. Issues commands to the controller through its
    port interface and services DRQ by polling the status register, the way
    a simple BIOS routine would.
*/

use anyhow::{anyhow, Error};

use fdc1772_config::{ConfigFileParams, SectorAddress};
use fdc1772_core::{
    bus::{DeviceRunTimeUnit, IoDevice},
    device_traits::flux_medium::MediumRef,
    device_types::sim_time::SimTime,
    devices::fdc::{command::*, *},
};

/// Interval between status polls, in microseconds. Well under one MFM byte time.
const POLL_US: f64 = 4.0;
/// Time allowed for a register write to commit before the next access.
const COMMIT_US: f64 = 50.0;

const CMD_RESTORE: u8 = 0x00;
const CMD_SEEK: u8 = 0x10;
const CMD_READ_SECTOR: u8 = 0x80;
const CMD_READ_ADDRESS: u8 = 0xC0;

pub struct SectorRead {
    pub data:   Vec<u8>,
    pub status: u8,
}

impl SectorRead {
    pub fn ok(&self) -> bool {
        self.status & (S_LOST | S_CRC | S_RNF | S_NOT_READY) == 0
    }
}

/// Name the error bits of a type II status byte.
pub fn describe_status(status: u8) -> String {
    let names = [
        (S_NOT_READY, "NOT READY"),
        (S_WP, "WRITE PROTECT"),
        (S_DDM, "DELETED"),
        (S_RNF, "RECORD NOT FOUND"),
        (S_CRC, "CRC ERROR"),
        (S_LOST, "LOST DATA"),
    ];
    let set: Vec<&str> = names
        .iter()
        .filter(|(bit, _)| status & bit != 0)
        .map(|(_, name)| *name)
        .collect();
    if set.is_empty() {
        "OK".to_string()
    }
    else {
        set.join(" | ")
    }
}

pub struct Host {
    fdc: FloppyController,
    io_base: u16,
    timeout: SimTime,
}

impl Host {
    pub fn new(config: &ConfigFileParams) -> Self {
        Self {
            fdc: FloppyController::new(config.fdc.clone(), &config.drive),
            io_base: config.fdc.io_base,
            timeout: SimTime::from_ms(config.headless.timeout_ms),
        }
    }

    pub fn fdc(&self) -> &FloppyController {
        &self.fdc
    }

    pub fn insert(&mut self, medium: MediumRef) {
        self.fdc.set_floppy(Some(medium));
    }

    fn write_reg(&mut self, reg: u16, val: u8, delta_us: f64) {
        self.fdc
            .write_u8(self.io_base.wrapping_add(reg), val, DeviceRunTimeUnit::Microseconds(delta_us));
    }

    fn read_reg(&mut self, reg: u16, delta_us: f64) -> u8 {
        self.fdc.read_u8(self.io_base.wrapping_add(reg), DeviceRunTimeUnit::Microseconds(delta_us))
    }

    /// Issue `cmd` and poll until the controller drops BUSY. For data transfer commands the data
    /// register is read whenever the status shows DRQ. Returns the final status and the bytes
    /// transferred.
    fn execute(&mut self, cmd: u8, transfer: bool) -> Result<(u8, Vec<u8>), Error> {
        let start = self.fdc.now();
        self.write_reg(WD1772_STATUS_COMMAND_REGISTER, cmd, COMMIT_US);

        let mut data = Vec::with_capacity(1024);
        let mut status = self.read_reg(WD1772_STATUS_COMMAND_REGISTER, COMMIT_US);
        loop {
            if transfer && status & S_DRQ != 0 {
                data.push(self.read_reg(WD1772_DATA_REGISTER, 0.0));
            }
            if status & S_BUSY == 0 {
                break;
            }
            if (self.fdc.now() - start) > self.timeout {
                return Err(anyhow!("Command {:02X} timed out after {}", cmd, self.fdc.now() - start));
            }
            status = self.read_reg(WD1772_STATUS_COMMAND_REGISTER, POLL_US);
        }
        log::trace!("Command {:02X} finished with status {:02X} at {}", cmd, status, self.fdc.now());
        Ok((status, data))
    }

    pub fn restore(&mut self) -> Result<u8, Error> {
        let (status, _) = self.execute(CMD_RESTORE, false)?;
        if status & S_SEEK_ERROR != 0 {
            return Err(anyhow!("Restore failed, status {:02X}", status));
        }
        Ok(status)
    }

    pub fn seek(&mut self, cylinder: u8) -> Result<u8, Error> {
        self.write_reg(WD1772_DATA_REGISTER, cylinder, 0.0);
        let (status, _) = self.execute(CMD_SEEK, false)?;
        if status & S_SEEK_ERROR != 0 {
            return Err(anyhow!("Seek to cylinder {} failed, status {:02X}", cylinder, status));
        }
        Ok(status)
    }

    pub fn read_sector(&mut self, addr: SectorAddress) -> Result<SectorRead, Error> {
        if self.fdc.track_r() != addr.c {
            self.seek(addr.c)?;
        }
        self.fdc.drive_mut().ss_w(addr.h);
        self.write_reg(WD1772_SECTOR_REGISTER, addr.s, 0.0);
        let (status, data) = self.execute(CMD_READ_SECTOR, true)?;
        Ok(SectorRead { data, status })
    }

    /// Read the next ID field passing under the head.
    pub fn read_address(&mut self, cylinder: u8, head: u8) -> Result<SectorRead, Error> {
        if self.fdc.track_r() != cylinder {
            self.seek(cylinder)?;
        }
        self.fdc.drive_mut().ss_w(head);
        let (status, data) = self.execute(CMD_READ_ADDRESS, true)?;
        Ok(SectorRead { data, status })
    }
}
