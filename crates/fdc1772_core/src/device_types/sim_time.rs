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

    device_types::sim_time.rs

    Simulated time, in integer nanoseconds.
*/

use std::{
    fmt::Display,
    ops::{Add, AddAssign, Sub},
};

/// A point in (or span of) emulated time, measured in nanoseconds since the controller was
/// created. [SimTime::NEVER] is used for timers that are not armed.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct SimTime(pub u64);

impl SimTime {
    pub const ZERO: SimTime = SimTime(0);
    pub const NEVER: SimTime = SimTime(u64::MAX);

    #[inline]
    pub const fn from_ns(ns: u64) -> Self {
        SimTime(ns)
    }
    #[inline]
    pub const fn from_us(us: u64) -> Self {
        SimTime(us.saturating_mul(1_000))
    }
    #[inline]
    pub const fn from_ms(ms: u64) -> Self {
        SimTime(ms.saturating_mul(1_000_000))
    }
    /// Convert a fractional microsecond count, as used by [crate::bus::DeviceRunTimeUnit].
    pub fn from_us_f64(us: f64) -> Self {
        if us <= 0.0 {
            SimTime::ZERO
        }
        else {
            SimTime((us * 1_000.0).round() as u64)
        }
    }
    #[inline]
    pub const fn as_ns(&self) -> u64 {
        self.0
    }
    #[inline]
    pub fn as_us(&self) -> f64 {
        self.0 as f64 / 1_000.0
    }
    #[inline]
    pub const fn is_never(&self) -> bool {
        self.0 == u64::MAX
    }
}

impl Add for SimTime {
    type Output = SimTime;
    fn add(self, rhs: SimTime) -> SimTime {
        SimTime(self.0.saturating_add(rhs.0))
    }
}

impl AddAssign for SimTime {
    fn add_assign(&mut self, rhs: SimTime) {
        self.0 = self.0.saturating_add(rhs.0);
    }
}

impl Sub for SimTime {
    type Output = SimTime;
    fn sub(self, rhs: SimTime) -> SimTime {
        SimTime(self.0.saturating_sub(rhs.0))
    }
}

impl Display for SimTime {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.is_never() {
            write!(f, "never")
        }
        else {
            write!(f, "{}.{:03}us", self.0 / 1_000, self.0 % 1_000)
        }
    }
}
