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

    coreconfig.rs

    Configuration structures consumed by the core. Frontends deserialize
    these from their configuration files.
*/

use serde_derive::Deserialize;

pub const DEFAULT_CLOCK_HZ: u32 = 8_000_000;
pub const DEFAULT_IO_BASE: u16 = 0x0000;

const fn _default_clock_hz() -> u32 {
    DEFAULT_CLOCK_HZ
}
const fn _default_step_rates() -> [u32; 4] {
    [6_000, 12_000, 2_000, 3_000]
}
const fn _default_settle_time() -> u32 {
    15_000
}
const fn _default_spinup_revolutions() -> u32 {
    6
}
const fn _default_motor_off_revolutions() -> u32 {
    9
}
const fn _default_id_search_revolutions() -> u32 {
    5
}
const fn _default_restore_step_limit() -> u32 {
    255
}
const fn _default_io_base() -> u16 {
    DEFAULT_IO_BASE
}
const fn _default_true() -> bool {
    true
}
const fn _default_cylinders() -> u16 {
    84
}
const fn _default_index_pulse_us() -> u32 {
    2_000
}

/// How a read sector command treats a data field whose CRC does not match.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Deserialize)]
pub enum CrcErrorPolicy {
    /// Deliver every byte as it is decoded and flag the CRC error when the field ends.
    #[default]
    CompleteTransfer,
    /// Verify the field before delivering anything. A bad field terminates the command with
    /// no bytes transferred.
    AbortTransfer,
}

#[derive(Clone, Debug, Deserialize)]
pub struct FdcConfig {
    /// Controller input clock. All internal delays are counted in these cycles.
    #[serde(default = "_default_clock_hz")]
    pub clock_hz: u32,
    /// Step pulse period in microseconds for each `rr` step rate code.
    #[serde(default = "_default_step_rates")]
    pub step_rates_us: [u32; 4],
    /// Head settle delay for verify and the `E` flag, in microseconds.
    #[serde(default = "_default_settle_time")]
    pub settle_time_us: u32,
    #[serde(default = "_default_spinup_revolutions")]
    pub spinup_revolutions: u32,
    #[serde(default = "_default_motor_off_revolutions")]
    pub motor_off_revolutions: u32,
    #[serde(default = "_default_id_search_revolutions")]
    pub id_search_revolutions: u32,
    #[serde(default = "_default_restore_step_limit")]
    pub restore_step_limit: u32,
    #[serde(default)]
    pub crc_error_policy: CrcErrorPolicy,
    #[serde(default = "_default_io_base")]
    pub io_base: u16,
    /// Initial level of the DDEN input.
    #[serde(default = "_default_true")]
    pub double_density: bool,
}

impl Default for FdcConfig {
    fn default() -> Self {
        Self {
            clock_hz: _default_clock_hz(),
            step_rates_us: _default_step_rates(),
            settle_time_us: _default_settle_time(),
            spinup_revolutions: _default_spinup_revolutions(),
            motor_off_revolutions: _default_motor_off_revolutions(),
            id_search_revolutions: _default_id_search_revolutions(),
            restore_step_limit: _default_restore_step_limit(),
            crc_error_policy: CrcErrorPolicy::default(),
            io_base: _default_io_base(),
            double_density: true,
        }
    }
}

#[derive(Clone, Debug, Deserialize)]
pub struct DriveConfig {
    /// Number of cylinders the head can physically reach.
    #[serde(default = "_default_cylinders")]
    pub cylinders: u16,
    #[serde(default = "_default_index_pulse_us")]
    pub index_pulse_us: u32,
}

impl Default for DriveConfig {
    fn default() -> Self {
        Self {
            cylinders: _default_cylinders(),
            index_pulse_us: _default_index_pulse_us(),
        }
    }
}
