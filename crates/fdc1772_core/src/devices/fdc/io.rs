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

    devices::fdc::io.rs

    Port mapped access to the WD1772 register file.
*/

use crate::{
    bus::{DeviceRunTimeUnit, IoDevice, NO_IO_BYTE},
    device_types::sim_time::SimTime,
    devices::fdc::FloppyController,
};

// Register offsets from the configured I/O base. A0 and A1 select the register.
pub const WD1772_STATUS_COMMAND_REGISTER: u16 = 0x00;
pub const WD1772_TRACK_REGISTER: u16          = 0x01;
pub const WD1772_SECTOR_REGISTER: u16         = 0x02;
pub const WD1772_DATA_REGISTER: u16           = 0x03;

impl FloppyController {
    /// Advance the controller by the time elapsed since the last access. System ticks are
    /// counted at the controller clock.
    pub fn catch_up(&mut self, delta: DeviceRunTimeUnit) {
        match delta {
            DeviceRunTimeUnit::SystemTicks(ticks) => {
                let ns = ticks as u64 * 1_000_000_000 / self.config.clock_hz.max(1) as u64;
                let target = self.now + SimTime::from_ns(ns);
                self.run_until(target);
            }
            DeviceRunTimeUnit::Microseconds(us) => self.run(us),
        }
    }
}

impl IoDevice for FloppyController {
    fn read_u8(&mut self, port: u16, delta: DeviceRunTimeUnit) -> u8 {
        self.catch_up(delta);

        match port.wrapping_sub(self.config.io_base) {
            WD1772_STATUS_COMMAND_REGISTER => self.status_r(),
            WD1772_TRACK_REGISTER => self.track_r(),
            WD1772_SECTOR_REGISTER => self.sector_r(),
            WD1772_DATA_REGISTER => self.data_r(),
            _ => {
                log::warn!("WD1772: read from unmapped port {:04X}", port);
                NO_IO_BYTE
            }
        }
    }

    fn write_u8(&mut self, port: u16, data: u8, delta: DeviceRunTimeUnit) {
        self.catch_up(delta);

        match port.wrapping_sub(self.config.io_base) {
            WD1772_STATUS_COMMAND_REGISTER => self.cmd_w(data),
            WD1772_TRACK_REGISTER => self.track_w(data),
            WD1772_SECTOR_REGISTER => self.sector_w(data),
            WD1772_DATA_REGISTER => self.data_w(data),
            _ => {
                log::warn!("WD1772: write to unmapped port {:04X}", port);
            }
        }
    }

    fn port_list(&self) -> Vec<(String, u16)> {
        let base = self.config.io_base;
        vec![
            (
                String::from("WD1772 Status/Command Register"),
                base.wrapping_add(WD1772_STATUS_COMMAND_REGISTER),
            ),
            (String::from("WD1772 Track Register"), base.wrapping_add(WD1772_TRACK_REGISTER)),
            (String::from("WD1772 Sector Register"), base.wrapping_add(WD1772_SECTOR_REGISTER)),
            (String::from("WD1772 Data Register"), base.wrapping_add(WD1772_DATA_REGISTER)),
        ]
    }
}
