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

    device_types::flux_disk.rs

    An in-memory flux level disk image.
*/

use std::sync::{Arc, RwLock};

use fluxfox::prelude::DiskImageError;

use crate::{
    device_traits::flux_medium::{FluxMedium, MediumRef},
    device_types::{
        encoding::TrackEncoding,
        track_format::{build_ibm_track, SectorSpec},
    },
};

/// One revolution at 300 RPM.
pub const DEFAULT_REVOLUTION_NS: u64 = 200_000_000;
/// Shortest revolution a disk will accept.
pub const MIN_REVOLUTION_NS: u64 = 1_000;

#[derive(thiserror::Error, Debug)]
pub enum MediaError {
    #[error("Unsupported sector size: {0}")]
    UnsupportedSectorSize(usize),
    #[error("Track needs {needed} bytes but only {capacity} fit in one revolution")]
    TrackOverflow { needed: usize, capacity: usize },
    #[error("Track c:{0} h:{1} is outside the disk")]
    InvalidTrack(u16, u8),
    #[error("Flux transition at {0}ns lies beyond the end of the revolution")]
    InvalidTransition(u64),
    #[error("Failed to acquire disk lock")]
    LockFailed,
    #[error(transparent)]
    Image(#[from] DiskImageError),
}

/// A disk stored as sorted flux transition positions per track.
#[derive(Clone, Debug)]
pub struct FluxDisk {
    cylinders: u16,
    sides: u8,
    revolution_ns: u64,
    write_protect: bool,
    tracks: Vec<Vec<u32>>,
    /// Tracks that have been written since the last [FluxDisk::take_dirty].
    dirty: Vec<bool>,
}

impl FluxDisk {
    /// Create an unformatted disk.
    pub fn new(cylinders: u16, sides: u8) -> Self {
        let track_ct = cylinders as usize * sides as usize;
        Self {
            cylinders,
            sides,
            revolution_ns: DEFAULT_REVOLUTION_NS,
            write_protect: false,
            tracks: vec![Vec::new(); track_ct],
            dirty: vec![false; track_ct],
        }
    }

    /// Set the revolution period. Periods shorter than [MIN_REVOLUTION_NS] are raised to it.
    pub fn with_revolution(mut self, revolution_ns: u64) -> Self {
        if revolution_ns < MIN_REVOLUTION_NS {
            log::warn!(
                "with_revolution(): {}ns is too short, using {}ns",
                revolution_ns,
                MIN_REVOLUTION_NS
            );
        }
        self.revolution_ns = revolution_ns.max(MIN_REVOLUTION_NS);
        self
    }

    pub fn set_write_protect(&mut self, state: bool) {
        self.write_protect = state;
    }

    fn track_index(&self, cylinder: u16, side: u8) -> Option<usize> {
        if cylinder >= self.cylinders || side >= self.sides {
            return None;
        }
        Some(cylinder as usize * self.sides as usize + side as usize)
    }

    pub fn track(&self, cylinder: u16, side: u8) -> Option<&[u32]> {
        self.track_index(cylinder, side).map(|i| self.tracks[i].as_slice())
    }

    /// Replace the contents of a track. Positions are sorted on the way in.
    pub fn set_track(&mut self, cylinder: u16, side: u8, mut transitions: Vec<u32>) -> Result<(), MediaError> {
        let index = self
            .track_index(cylinder, side)
            .ok_or(MediaError::InvalidTrack(cylinder, side))?;
        if let Some(&bad) = transitions.iter().find(|&&t| t as u64 >= self.revolution_ns) {
            return Err(MediaError::InvalidTransition(bad as u64));
        }
        transitions.sort_unstable();
        transitions.dedup();
        self.tracks[index] = transitions;
        Ok(())
    }

    /// Format a track with standard IBM layout.
    pub fn format_track(
        &mut self,
        cylinder: u16,
        side: u8,
        encoding: TrackEncoding,
        sectors: &[SectorSpec],
    ) -> Result<(), MediaError> {
        let flux = build_ibm_track(encoding, sectors, self.revolution_ns)?;
        self.set_track(cylinder, side, flux)
    }

    /// Return the (cylinder, side) of every track written since the last call, and clear the
    /// dirty flags.
    pub fn take_dirty(&mut self) -> Vec<(u16, u8)> {
        let sides = self.sides.max(1) as usize;
        let dirty = self
            .dirty
            .iter()
            .enumerate()
            .filter(|(_, d)| **d)
            .map(|(i, _)| ((i / sides) as u16, (i % sides) as u8))
            .collect();
        self.dirty.iter_mut().for_each(|d| *d = false);
        dirty
    }

    pub fn into_ref(self) -> MediumRef {
        Arc::new(RwLock::new(self))
    }
}

impl FluxMedium for FluxDisk {
    fn cylinders(&self) -> u16 {
        self.cylinders
    }

    fn sides(&self) -> u8 {
        self.sides
    }

    fn revolution_ns(&self) -> u64 {
        self.revolution_ns
    }

    fn write_protected(&self) -> bool {
        self.write_protect
    }

    fn next_transition(&self, cylinder: u16, side: u8, pos: u64) -> Option<u64> {
        let track = self.track(cylinder, side)?;
        let first = *track.first()? as u64;
        let idx = track.partition_point(|&t| (t as u64) <= pos);
        match track.get(idx) {
            Some(&t) => Some(t as u64 - pos),
            None => Some(first + self.revolution_ns - pos),
        }
    }

    fn write_transitions(&mut self, cylinder: u16, side: u8, start: u64, span: u64, positions: &[u64]) {
        let Some(index) = self.track_index(cylinder, side)
        else {
            log::warn!("write_transitions(): write to nonexistent track c:{} h:{}", cylinder, side);
            return;
        };
        let rev = self.revolution_ns;
        self.dirty[index] = true;
        let track = &mut self.tracks[index];

        if span >= rev {
            track.clear();
        }
        else {
            let start = start % rev;
            track.retain(|&t| (t as u64 + rev - start) % rev >= span);
        }
        track.extend(positions.iter().map(|&p| (p % rev) as u32));
        track.sort_unstable();
        track.dedup();
    }
}
