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

    devices::floppy_drive.rs

    Implements a floppy drive: head positioning, the track 0 sensor,
    spindle rotation and the index pulse, and flux access to the
    inserted medium in absolute time.
*/

use crate::{
    coreconfig::DriveConfig,
    device_traits::flux_medium::MediumRef,
    device_types::{flux_disk::DEFAULT_REVOLUTION_NS, sim_time::SimTime},
};

macro_rules! read_lock_opt {
    ($arc_lock:expr) => {{
        match $arc_lock.try_read() {
            Ok(guard) => guard,
            Err(_) => {
                log::error!("Failed to acquire medium read lock");
                return None;
            }
        }
    }};
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum StepDirection {
    /// Toward the spindle (higher cylinders).
    In,
    /// Toward track 0.
    Out,
}

pub struct FloppyDrive {
    cylinders: u16,
    index_pulse: SimTime,

    cylinder: u16,
    side: u8,
    motor_on: bool,
    /// Time at which the index hole last passed the sensor at the start of a rotation epoch.
    /// All rotation phase is derived from this.
    rev_start: SimTime,
    medium: Option<MediumRef>,
    step_count: u64,
}

impl Default for FloppyDrive {
    fn default() -> Self {
        Self::new(&DriveConfig::default())
    }
}

impl FloppyDrive {
    pub fn new(config: &DriveConfig) -> Self {
        Self {
            cylinders: config.cylinders.max(1),
            index_pulse: SimTime::from_us(config.index_pulse_us as u64),
            cylinder: 0,
            side: 0,
            motor_on: false,
            rev_start: SimTime::ZERO,
            medium: None,
            step_count: 0,
        }
    }

    pub fn insert(&mut self, medium: MediumRef, now: SimTime) {
        self.medium = Some(medium);
        self.rev_start = now;
    }

    pub fn eject(&mut self) -> Option<MediumRef> {
        self.medium.take()
    }

    pub fn medium(&self) -> Option<&MediumRef> {
        self.medium.as_ref()
    }

    pub fn has_medium(&self) -> bool {
        self.medium.is_some()
    }

    pub fn motor_on(&mut self, now: SimTime) {
        if !self.motor_on {
            log::trace!("Drive: motor on at {}", now);
            self.motor_on = true;
            self.rev_start = now;
        }
    }

    pub fn motor_off(&mut self) {
        if self.motor_on {
            log::trace!("Drive: turning motor off.");
        }
        self.motor_on = false;
    }

    pub fn is_motor_on(&self) -> bool {
        self.motor_on
    }

    /// True when the disk is turning under the head.
    pub fn spinning(&self) -> bool {
        self.motor_on && self.medium.is_some()
    }

    pub fn revolution_ns(&self) -> u64 {
        self.medium
            .as_ref()
            .and_then(|m| m.try_read().ok().map(|m| m.revolution_ns()))
            .unwrap_or(DEFAULT_REVOLUTION_NS)
    }

    pub fn cylinder(&self) -> u16 {
        self.cylinder
    }

    pub fn set_cylinder(&mut self, cylinder: u16) {
        self.cylinder = cylinder.min(self.cylinders - 1);
    }

    pub fn side(&self) -> u8 {
        self.side
    }

    /// Side select input.
    pub fn ss_w(&mut self, side: u8) {
        self.side = side & 0x01;
    }

    /// Issue one step pulse. The head stops at either end stop.
    pub fn step(&mut self, dir: StepDirection) {
        self.step_count += 1;
        self.cylinder = match dir {
            StepDirection::In => (self.cylinder + 1).min(self.cylinders - 1),
            StepDirection::Out => self.cylinder.saturating_sub(1),
        };
        log::trace!("Drive: step {:?} to cylinder {}", dir, self.cylinder);
    }

    /// Number of step pulses received since creation.
    pub fn step_count(&self) -> u64 {
        self.step_count
    }

    pub fn trk00(&self) -> bool {
        self.cylinder == 0
    }

    pub fn write_protected(&self) -> bool {
        self.medium
            .as_ref()
            .and_then(|m| m.try_read().ok().map(|m| m.write_protected()))
            .unwrap_or(false)
    }

    /// Rotation position at `t`, in nanoseconds after the index.
    fn position(&self, t: SimTime, rev: u64) -> u64 {
        let rel = t.as_ns() as i128 - self.rev_start.as_ns() as i128;
        rel.rem_euclid(rev as i128) as u64
    }

    /// Time of the first index pulse strictly after `after`, or [SimTime::NEVER] while the disk
    /// is not turning.
    pub fn next_index(&self, after: SimTime) -> SimTime {
        if !self.spinning() {
            return SimTime::NEVER;
        }
        let rev = self.revolution_ns();
        if after < self.rev_start {
            return self.rev_start;
        }
        let revs = (after - self.rev_start).as_ns() / rev + 1;
        self.rev_start + SimTime::from_ns(revs * rev)
    }

    /// Level of the index sensor at `now`.
    pub fn index_active(&self, now: SimTime) -> bool {
        if !self.spinning() || now < self.rev_start {
            return false;
        }
        self.position(now, self.revolution_ns()) < self.index_pulse.as_ns()
    }

    /// Time of the first flux transition under the head strictly after `after`.
    pub fn next_transition(&self, after: SimTime) -> Option<SimTime> {
        if !self.motor_on {
            return None;
        }
        let medium = self.medium.as_ref()?;
        let medium = read_lock_opt!(medium);
        let rev = medium.revolution_ns();
        let delta = medium.next_transition(self.cylinder, self.side, self.position(after, rev))?;
        Some(after + SimTime::from_ns(delta))
    }

    /// Replace the flux between `start` and `end` with `transitions`.
    pub fn write_flux(&mut self, start: SimTime, end: SimTime, transitions: &[SimTime]) {
        if !self.spinning() || end <= start {
            return;
        }
        let Some(medium) = self.medium.as_ref()
        else {
            return;
        };
        let Ok(mut medium) = medium.try_write()
        else {
            log::error!("write_flux(): failed to acquire medium write lock");
            return;
        };
        if medium.write_protected() {
            log::warn!("write_flux(): medium is write protected");
            return;
        }
        let rev = medium.revolution_ns();
        let positions: Vec<u64> = transitions.iter().map(|&t| self.position(t, rev)).collect();
        log::trace!(
            "write_flux(): c:{} h:{} {} transitions from {} to {}",
            self.cylinder,
            self.side,
            positions.len(),
            start,
            end
        );
        medium.write_transitions(
            self.cylinder,
            self.side,
            self.position(start, rev),
            (end - start).as_ns(),
            &positions,
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::device_types::flux_disk::FluxDisk;

    fn drive_with_disk() -> FloppyDrive {
        let mut disk = FluxDisk::new(80, 1).with_revolution(1_000_000);
        disk.set_track(0, 0, vec![10_000, 500_000]).unwrap();
        let mut drive = FloppyDrive::new(&DriveConfig {
            cylinders: 84,
            index_pulse_us: 100,
        });
        drive.insert(disk.into_ref(), SimTime::ZERO);
        drive
    }

    #[test]
    fn test_step_clamps() {
        let mut drive = FloppyDrive::default();
        drive.step(StepDirection::Out);
        assert!(drive.trk00());
        for _ in 0..100 {
            drive.step(StepDirection::In);
        }
        assert_eq!(drive.cylinder(), 83);
        assert_eq!(drive.step_count(), 101);
    }

    #[test]
    fn test_index_requires_motor() {
        let mut drive = drive_with_disk();
        assert_eq!(drive.next_index(SimTime::ZERO), SimTime::NEVER);
        drive.motor_on(SimTime::from_us(100));
        assert_eq!(drive.next_index(SimTime::from_us(100)), SimTime::from_us(1_100));
        assert_eq!(drive.next_index(SimTime::from_us(1_100)), SimTime::from_us(2_100));
        assert!(drive.index_active(SimTime::from_us(1_150)));
        assert!(!drive.index_active(SimTime::from_us(1_500)));
    }

    #[test]
    fn test_transitions_in_absolute_time() {
        let mut drive = drive_with_disk();
        assert_eq!(drive.next_transition(SimTime::ZERO), None);
        drive.motor_on(SimTime::from_ns(1_000));
        assert_eq!(drive.next_transition(SimTime::from_ns(1_000)), Some(SimTime::from_ns(11_000)));
        assert_eq!(drive.next_transition(SimTime::from_ns(11_000)), Some(SimTime::from_ns(501_000)));
        // Wraps into the next revolution.
        assert_eq!(drive.next_transition(SimTime::from_ns(501_000)), Some(SimTime::from_ns(1_011_000)));
        drive.step(StepDirection::In);
        assert_eq!(drive.next_transition(SimTime::from_ns(1_000)), None);
    }
}
