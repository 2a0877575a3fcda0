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

    bus::mod.rs

    The host side of the controller. A host reaches devices through I/O
    ports, passing along how much time has elapsed since its last access
    so the device can catch up before the access is serviced.
*/

/// Value seen on the data bus when nothing drives it.
pub const NO_IO_BYTE: u8 = 0xFF;

/// Time elapsed on the host side since its previous access to a device.
#[derive(Copy, Clone, Debug)]
pub enum DeviceRunTimeUnit {
    /// Host clock ticks. Devices convert these at their own input clock.
    SystemTicks(u32),
    Microseconds(f64),
}

pub trait IoDevice {
    /// Catch up by `delta`, then service a read of `port`. Unimplemented reads float high.
    fn read_u8(&mut self, _port: u16, _delta: DeviceRunTimeUnit) -> u8 {
        NO_IO_BYTE
    }

    /// Catch up by `delta`, then service a write to `port`. Unimplemented writes are dropped.
    fn write_u8(&mut self, _port: u16, _data: u8, _delta: DeviceRunTimeUnit) {}

    /// The ports this device decodes, as (name, absolute port) pairs.
    fn port_list(&self) -> Vec<(String, u16)>;
}
