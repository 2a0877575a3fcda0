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

    device_traits::flux_medium.rs

    Defines the FluxMedium trait, the interface between a floppy drive and
    the magnetic surface it reads.
*/

use std::sync::{Arc, RwLock};

/// A removable medium holding flux transitions. Positions are expressed in nanoseconds from the
/// index hole, in the range `0..revolution_ns()`.
pub trait FluxMedium {
    fn cylinders(&self) -> u16;
    fn sides(&self) -> u8;
    /// The duration of one revolution at nominal speed.
    fn revolution_ns(&self) -> u64;
    fn write_protected(&self) -> bool;

    /// Return the distance from `pos` to the first transition strictly after it, wrapping through
    /// the index. Returns None if the track holds no transitions or does not exist.
    fn next_transition(&self, cylinder: u16, side: u8, pos: u64) -> Option<u64>;

    /// Replace every transition in the window of `span` nanoseconds beginning at `start` with
    /// `positions`. The window wraps through the index. Positions must already be reduced modulo
    /// the revolution.
    fn write_transitions(&mut self, cylinder: u16, side: u8, start: u64, span: u64, positions: &[u64]);
}

/// The drive and the host share a medium through this handle, so that a disk can be swapped or
/// inspected while a controller is attached to it.
pub type MediumRef = Arc<RwLock<dyn FluxMedium + Send + Sync>>;
