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

    devices::fdc::tests.rs

    Command level tests for the WD1772, driven through the register file
    against synthesized flux disks.
*/

use std::{cell::RefCell, rc::Rc};

use super::*;
use crate::{
    bus::{DeviceRunTimeUnit, IoDevice},
    coreconfig::{CrcErrorPolicy, DriveConfig, FdcConfig},
    device_types::{
        crc::{crc_ccitt, CRC_AFTER_MFM_SYNC},
        encoding::{TrackEncoding, MFM_SYNC_A1},
        flux_disk::{FluxDisk, DEFAULT_REVOLUTION_NS},
        track_format::{SectorId, SectorSpec, TrackBuilder},
    },
};

const TIMEOUT_US: f64 = 3_000_000.0;
const POLL_US: f64 = 4.0;

const REG_CMD: u8 = 0;
const REG_TRACK: u8 = 1;
const REG_SECTOR: u8 = 2;
const REG_DATA: u8 = 3;

fn pattern(len: usize, seed: u8) -> Vec<u8> {
    (0..len)
        .map(|i| (i as u8).wrapping_mul(7).wrapping_add(seed))
        .collect()
}

fn sector(cylinder: u8, id: u8, size_code: u8, seed: u8) -> SectorSpec {
    SectorSpec::new(
        SectorId::new(cylinder, 0, id, size_code),
        pattern(128 << size_code, seed),
    )
}

fn mfm_sectors(cylinder: u8, count: u8) -> Vec<SectorSpec> {
    (1..=count).map(|s| sector(cylinder, s, 2, s)).collect()
}

fn disk_with_track(encoding: TrackEncoding, cylinder: u16, sectors: &[SectorSpec]) -> FluxDisk {
    let mut disk = FluxDisk::new(80, 2);
    disk.format_track(cylinder, 0, encoding, sectors).unwrap();
    disk
}

fn controller_with(disk: FluxDisk) -> FloppyController {
    let mut fdc = FloppyController::default();
    fdc.set_floppy(Some(disk.into_ref()));
    fdc
}

fn controller_with_config(config: FdcConfig, disk: FluxDisk) -> FloppyController {
    let mut fdc = FloppyController::new(config, &DriveConfig::default());
    fdc.set_floppy(Some(disk.into_ref()));
    fdc
}

/// Write a register and let its commit delay pass.
fn set_reg(fdc: &mut FloppyController, reg: u8, val: u8) {
    fdc.gen_w(reg, val);
    fdc.run(50.0);
}

fn issue(fdc: &mut FloppyController, cmd: u8) {
    fdc.cmd_w(cmd);
    fdc.run(50.0);
}

fn wait_idle(fdc: &mut FloppyController) {
    let mut elapsed = 0.0;
    while fdc.is_busy() && elapsed < TIMEOUT_US {
        fdc.run(100.0);
        elapsed += 100.0;
    }
    assert!(!fdc.is_busy(), "command did not complete");
}

/// Service DRQ by reading the data register until the command ends.
fn service_read(fdc: &mut FloppyController, poll_status: bool) -> Vec<u8> {
    let mut out = Vec::new();
    let mut elapsed = 0.0;
    while fdc.is_busy() && elapsed < TIMEOUT_US {
        fdc.run(POLL_US);
        elapsed += POLL_US;
        if poll_status {
            fdc.status_r();
        }
        if fdc.drq_r() {
            out.push(fdc.gen_r(REG_DATA));
        }
    }
    assert!(!fdc.is_busy(), "command did not complete");
    if fdc.drq_r() {
        out.push(fdc.data_r());
    }
    out
}

fn run_read(fdc: &mut FloppyController, cmd: u8) -> Vec<u8> {
    issue(fdc, cmd);
    service_read(fdc, false)
}

/// Service DRQ by writing `data` until the command ends. Returns the number of bytes taken.
fn run_write(fdc: &mut FloppyController, cmd: u8, data: &[u8]) -> usize {
    issue(fdc, cmd);
    let mut taken = 0;
    let mut elapsed = 0.0;
    while fdc.is_busy() && elapsed < TIMEOUT_US {
        fdc.run(POLL_US);
        elapsed += POLL_US;
        if fdc.drq_r() && taken < data.len() {
            fdc.gen_w(REG_DATA, data[taken]);
            taken += 1;
        }
    }
    assert!(!fdc.is_busy(), "command did not complete");
    taken
}

fn line_log() -> (Rc<RefCell<Vec<bool>>>, LineCallback) {
    let log = Rc::new(RefCell::new(Vec::new()));
    let sink = log.clone();
    (log, Box::new(move |state| sink.borrow_mut().push(state)))
}

fn errors(status: u8) -> u8 {
    status & (S_LOST | S_CRC | S_RNF | S_WP)
}

#[test]
fn test_read_sector_mfm() {
    let sectors = mfm_sectors(0, 9);
    let mut fdc = controller_with(disk_with_track(TrackEncoding::Mfm, 0, &sectors));
    set_reg(&mut fdc, REG_SECTOR, 3);

    let data = run_read(&mut fdc, 0x88);
    assert_eq!(data, sectors[2].data);
    assert!(fdc.intrq_r());
    let status = fdc.status_r();
    assert_eq!(errors(status), 0);
    assert_eq!(status & S_BUSY, 0);
    assert_ne!(status & S_MON, 0);
    assert!(!fdc.intrq_r());
}

#[test]
fn test_read_sector_fm() {
    let sectors: Vec<SectorSpec> = (1..=10).map(|s| sector(0, s, 0, s)).collect();
    let mut fdc = controller_with(disk_with_track(TrackEncoding::Fm, 0, &sectors));
    fdc.dden_w(false);
    set_reg(&mut fdc, REG_SECTOR, 7);

    let data = run_read(&mut fdc, 0x88);
    assert_eq!(data, sectors[6].data);
    assert_eq!(errors(fdc.status_r()), 0);
}

#[test]
fn test_read_sector_on_other_cylinder() {
    let sectors = mfm_sectors(3, 9);
    let mut fdc = controller_with(disk_with_track(TrackEncoding::Mfm, 3, &sectors));
    fdc.drive_mut().set_cylinder(3);
    set_reg(&mut fdc, REG_TRACK, 3);
    set_reg(&mut fdc, REG_SECTOR, 9);

    let data = run_read(&mut fdc, 0x88);
    assert_eq!(data, sectors[8].data);
}

#[test]
fn test_read_tolerates_speed_variation() {
    for cell_ns in [1_960, 2_040] {
        let sectors = mfm_sectors(0, 3);
        let mut builder = TrackBuilder::new(TrackEncoding::Mfm);
        builder.preamble();
        for s in &sectors {
            builder.sector(s, 40);
        }
        let mut disk = FluxDisk::new(80, 2);
        disk.set_track(0, 0, builder.into_flux_with_cell(DEFAULT_REVOLUTION_NS, cell_ns).unwrap())
            .unwrap();

        let mut fdc = controller_with(disk);
        set_reg(&mut fdc, REG_SECTOR, 2);
        let data = run_read(&mut fdc, 0x88);
        assert_eq!(data, sectors[1].data, "cell width {}ns", cell_ns);
        assert_eq!(errors(fdc.status_r()), 0);
    }
}

#[test]
fn test_status_polling_during_read() {
    let sectors = mfm_sectors(0, 9);
    let mut fdc = controller_with(disk_with_track(TrackEncoding::Mfm, 0, &sectors));
    set_reg(&mut fdc, REG_SECTOR, 5);

    issue(&mut fdc, 0x88);
    let data = service_read(&mut fdc, true);
    assert_eq!(data, sectors[4].data);
    assert_eq!(errors(fdc.status_r()), 0);
}

#[test]
fn test_side_byte_not_compared() {
    let spec = SectorSpec::new(SectorId::new(0, 1, 1, 2), pattern(512, 0x33));
    let mut fdc = controller_with(disk_with_track(TrackEncoding::Mfm, 0, &[spec.clone()]));
    set_reg(&mut fdc, REG_SECTOR, 1);
    assert_eq!(run_read(&mut fdc, 0x88), spec.data);
}

#[test]
fn test_data_crc_error_completes_transfer() {
    let mut sectors = mfm_sectors(0, 4);
    sectors[1] = sectors[1].clone().with_bad_data_crc();
    let mut fdc = controller_with(disk_with_track(TrackEncoding::Mfm, 0, &sectors));
    set_reg(&mut fdc, REG_SECTOR, 2);

    let data = run_read(&mut fdc, 0x88);
    assert_eq!(data, sectors[1].data);
    let status = fdc.status_r();
    assert_ne!(status & S_CRC, 0);
    assert_eq!(status & (S_RNF | S_LOST), 0);
}

#[test]
fn test_data_crc_error_abort_policy() {
    let mut sectors = mfm_sectors(0, 4);
    sectors[1] = sectors[1].clone().with_bad_data_crc();
    let config = FdcConfig {
        crc_error_policy: CrcErrorPolicy::AbortTransfer,
        ..Default::default()
    };
    let mut fdc = controller_with_config(config, disk_with_track(TrackEncoding::Mfm, 0, &sectors));
    let (drq_log, cb) = line_log();
    fdc.setup_drq_cb(cb);
    set_reg(&mut fdc, REG_SECTOR, 2);

    let data = run_read(&mut fdc, 0x88);
    assert!(data.is_empty());
    assert!(drq_log.borrow().is_empty());
    assert_ne!(fdc.status_r() & S_CRC, 0);
    assert!(!fdc.is_busy());
}

#[test]
fn test_abort_policy_delivers_good_sector() {
    let sectors = mfm_sectors(0, 4);
    let config = FdcConfig {
        crc_error_policy: CrcErrorPolicy::AbortTransfer,
        ..Default::default()
    };
    let mut fdc = controller_with_config(config, disk_with_track(TrackEncoding::Mfm, 0, &sectors));
    set_reg(&mut fdc, REG_SECTOR, 4);

    let data = run_read(&mut fdc, 0x88);
    assert_eq!(data, sectors[3].data);
    assert_eq!(errors(fdc.status_r()), 0);
}

#[test]
fn test_header_crc_error_ends_in_record_not_found() {
    let sectors = vec![sector(0, 1, 2, 1).with_bad_id_crc(), sector(0, 2, 2, 2)];
    let mut fdc = controller_with(disk_with_track(TrackEncoding::Mfm, 0, &sectors));
    set_reg(&mut fdc, REG_SECTOR, 1);

    let data = run_read(&mut fdc, 0x88);
    assert!(data.is_empty());
    let status = fdc.status_r();
    assert_ne!(status & S_CRC, 0);
    assert_ne!(status & S_RNF, 0);
}

#[test]
fn test_missing_sector_record_not_found() {
    let sectors = mfm_sectors(0, 9);
    let mut fdc = controller_with(disk_with_track(TrackEncoding::Mfm, 0, &sectors));
    set_reg(&mut fdc, REG_SECTOR, 12);

    let start = fdc.now();
    assert!(run_read(&mut fdc, 0x88).is_empty());
    assert_ne!(fdc.status_r() & S_RNF, 0);
    // Gives up after five index pulses, i.e. within five revolutions.
    let elapsed = fdc.now().as_ns() - start.as_ns();
    assert!(elapsed > 4 * DEFAULT_REVOLUTION_NS);
    assert!(elapsed < 5 * DEFAULT_REVOLUTION_NS + 1_000_000);
}

fn track_with_gap2(gap2: usize, data: &[u8]) -> Vec<u32> {
    let mut b = TrackBuilder::new(TrackEncoding::Mfm);
    b.fill(0x4E, 80);
    b.fill(0x00, 12);
    for _ in 0..3 {
        b.raw(MFM_SYNC_A1);
    }
    let id = [0xFE, 0, 0, 1, 2];
    b.bytes(&id);
    b.bytes(&crc_ccitt(CRC_AFTER_MFM_SYNC, &id).to_be_bytes());
    b.fill(0x4E, gap2);
    b.fill(0x00, 12);
    for _ in 0..3 {
        b.raw(MFM_SYNC_A1);
    }
    b.byte(0xFB);
    b.bytes(data);
    let crc = crc_ccitt(crc_ccitt(CRC_AFTER_MFM_SYNC, &[0xFB]), data);
    b.bytes(&crc.to_be_bytes());
    b.into_flux(DEFAULT_REVOLUTION_NS).unwrap()
}

#[test]
fn test_data_mark_window() {
    let data = pattern(512, 0x10);
    let mut results = Vec::new();
    for gap2 in [22, 40] {
        let mut disk = FluxDisk::new(80, 2);
        disk.set_track(0, 0, track_with_gap2(gap2, &data)).unwrap();
        let mut fdc = controller_with(disk);
        set_reg(&mut fdc, REG_SECTOR, 1);
        let read = run_read(&mut fdc, 0x88);
        results.push((read, fdc.status_r()));
    }
    assert_eq!(results[0].0, data);
    assert_eq!(errors(results[0].1), 0);
    // Too far from the ID, the mark is never seen.
    assert!(results[1].0.is_empty());
    assert_ne!(results[1].1 & S_RNF, 0);
}

#[test]
fn test_deleted_data_mark() {
    let sectors = vec![sector(0, 1, 2, 1).with_deleted(), sector(0, 2, 2, 2)];
    let mut fdc = controller_with(disk_with_track(TrackEncoding::Mfm, 0, &sectors));
    set_reg(&mut fdc, REG_SECTOR, 1);
    assert_eq!(run_read(&mut fdc, 0x88), sectors[0].data);
    assert_ne!(fdc.status_r() & S_DDM, 0);

    set_reg(&mut fdc, REG_SECTOR, 2);
    assert_eq!(run_read(&mut fdc, 0x88), sectors[1].data);
    assert_eq!(fdc.status_r() & S_DDM, 0);
}

#[test]
fn test_lost_data_terminates_read() {
    let sectors = mfm_sectors(0, 9);
    let mut fdc = controller_with(disk_with_track(TrackEncoding::Mfm, 0, &sectors));
    let (drq_log, cb) = line_log();
    fdc.setup_drq_cb(cb);
    set_reg(&mut fdc, REG_SECTOR, 1);

    issue(&mut fdc, 0x88);
    wait_idle(&mut fdc);
    let status = fdc.status_r();
    assert_ne!(status & S_LOST, 0);
    assert_eq!(status & S_BUSY, 0);
    assert_eq!(drq_log.borrow().iter().filter(|&&level| level).count(), 1);
}

#[test]
fn test_multi_sector_read() {
    let sectors = mfm_sectors(0, 3);
    let mut fdc = controller_with(disk_with_track(TrackEncoding::Mfm, 0, &sectors));
    set_reg(&mut fdc, REG_SECTOR, 1);

    let data = run_read(&mut fdc, 0x98);
    let expected: Vec<u8> = sectors.iter().flat_map(|s| s.data.clone()).collect();
    assert_eq!(data, expected);
    // The track runs out of sectors.
    assert_eq!(fdc.sector_r(), 4);
    assert_ne!(fdc.status_r() & S_RNF, 0);
}

#[test]
fn test_read_address() {
    let sectors = mfm_sectors(5, 9);
    let mut fdc = controller_with(disk_with_track(TrackEncoding::Mfm, 5, &sectors));
    fdc.drive_mut().set_cylinder(5);

    let id = run_read(&mut fdc, 0xC8);
    assert_eq!(id.len(), 6);
    assert_eq!(id[0], 5);
    assert_eq!(id[1], 0);
    assert!((1..=9).contains(&id[2]));
    assert_eq!(id[3], 2);
    let crc = crc_ccitt(CRC_AFTER_MFM_SYNC, &[0xFE, id[0], id[1], id[2], id[3]]);
    assert_eq!(&id[4..], &crc.to_be_bytes());
    // The track byte lands in the sector register.
    assert_eq!(fdc.sector_r(), 5);
    assert_eq!(errors(fdc.status_r()), 0);
}

#[test]
fn test_write_sector_then_read_back() {
    let sectors = mfm_sectors(0, 9);
    let mut fdc = controller_with(disk_with_track(TrackEncoding::Mfm, 0, &sectors));
    let new_data = pattern(512, 0x55);

    set_reg(&mut fdc, REG_SECTOR, 4);
    assert_eq!(run_write(&mut fdc, 0xA8, &new_data), 512);
    assert_eq!(errors(fdc.status_r()), 0);

    assert_eq!(run_read(&mut fdc, 0x88), new_data);
    assert_eq!(errors(fdc.status_r()), 0);

    // Neighbours are untouched.
    for id in [3, 5] {
        set_reg(&mut fdc, REG_SECTOR, id);
        assert_eq!(run_read(&mut fdc, 0x88), sectors[id as usize - 1].data);
        assert_eq!(errors(fdc.status_r()), 0);
    }
}

#[test]
fn test_write_sector_fm() {
    let sectors: Vec<SectorSpec> = (1..=10).map(|s| sector(0, s, 0, s)).collect();
    let mut fdc = controller_with(disk_with_track(TrackEncoding::Fm, 0, &sectors));
    fdc.dden_w(false);
    let new_data = pattern(128, 0xA0);

    set_reg(&mut fdc, REG_SECTOR, 6);
    assert_eq!(run_write(&mut fdc, 0xA8, &new_data), 128);
    assert_eq!(run_read(&mut fdc, 0x88), new_data);
    assert_eq!(errors(fdc.status_r()), 0);
}

#[test]
fn test_write_deleted_mark() {
    let sectors = mfm_sectors(0, 9);
    let mut fdc = controller_with(disk_with_track(TrackEncoding::Mfm, 0, &sectors));
    let new_data = pattern(512, 0x99);

    set_reg(&mut fdc, REG_SECTOR, 2);
    run_write(&mut fdc, 0xA9, &new_data);
    assert_eq!(run_read(&mut fdc, 0x88), new_data);
    assert_ne!(fdc.status_r() & S_DDM, 0);
}

#[test]
fn test_write_lost_data_pads_with_zeros() {
    let sectors = mfm_sectors(0, 9);
    let mut fdc = controller_with(disk_with_track(TrackEncoding::Mfm, 0, &sectors));
    let partial = pattern(100, 0x42);

    set_reg(&mut fdc, REG_SECTOR, 7);
    assert_eq!(run_write(&mut fdc, 0xA8, &partial), 100);
    assert_ne!(fdc.status_r() & S_LOST, 0);

    let data = run_read(&mut fdc, 0x88);
    assert_eq!(&data[..100], &partial[..]);
    assert!(data[100..].iter().all(|&b| b == 0));
    assert_eq!(errors(fdc.status_r()), 0);
}

#[test]
fn test_write_protect() {
    let sectors = mfm_sectors(0, 9);
    let mut disk = disk_with_track(TrackEncoding::Mfm, 0, &sectors);
    disk.set_write_protect(true);
    let mut fdc = controller_with(disk);
    set_reg(&mut fdc, REG_SECTOR, 1);

    assert_eq!(run_write(&mut fdc, 0xA8, &pattern(512, 0)), 0);
    assert!(fdc.intrq_r());
    assert_ne!(fdc.status_r() & S_WP, 0);
    assert_eq!(run_read(&mut fdc, 0x88), sectors[0].data);
}

#[test]
fn test_restore() {
    let mut fdc = controller_with(disk_with_track(TrackEncoding::Mfm, 0, &mfm_sectors(0, 9)));
    fdc.drive_mut().set_cylinder(5);
    set_reg(&mut fdc, REG_TRACK, 0x40);

    issue(&mut fdc, 0x08);
    wait_idle(&mut fdc);
    assert_eq!(fdc.track_r(), 0);
    assert_eq!(fdc.drive().cylinder(), 0);
    assert_eq!(fdc.drive().step_count(), 5);
    let status = fdc.status_r();
    assert_ne!(status & S_TR00, 0);
    assert_eq!(status & (S_SEEK_ERROR | S_CRC), 0);
}

#[test]
fn test_restore_step_limit() {
    let config = FdcConfig {
        restore_step_limit: 10,
        ..Default::default()
    };
    let mut fdc = controller_with_config(config, FluxDisk::new(80, 2));
    fdc.drive_mut().set_cylinder(50);

    issue(&mut fdc, 0x0B);
    wait_idle(&mut fdc);
    assert_ne!(fdc.status_r() & S_SEEK_ERROR, 0);
    assert_eq!(fdc.track_r(), 0xFF - 10);
    assert_eq!(fdc.drive().cylinder(), 40);
}

#[test]
fn test_seek_steps_by_difference() {
    for (start, target) in [(0u8, 10u8), (10, 3), (7, 7)] {
        let mut fdc = controller_with(FluxDisk::new(80, 2));
        fdc.drive_mut().set_cylinder(start as u16);
        set_reg(&mut fdc, REG_TRACK, start);
        set_reg(&mut fdc, REG_DATA, target);

        issue(&mut fdc, 0x18);
        wait_idle(&mut fdc);
        assert_eq!(fdc.drive().step_count(), start.abs_diff(target) as u64);
        assert_eq!(fdc.track_r(), target);
        assert_eq!(fdc.drive().cylinder(), target as u16);
        assert_eq!(fdc.status_r() & S_SEEK_ERROR, 0);
    }
}

#[test]
fn test_seek_verify() {
    let mut disk = disk_with_track(TrackEncoding::Mfm, 3, &mfm_sectors(3, 9));
    disk.format_track(4, 0, TrackEncoding::Mfm, &mfm_sectors(9, 9)).unwrap();
    let mut fdc = controller_with(disk);

    set_reg(&mut fdc, REG_DATA, 3);
    issue(&mut fdc, 0x1C);
    wait_idle(&mut fdc);
    assert_eq!(fdc.status_r() & (S_SEEK_ERROR | S_CRC), 0);

    // Cylinder 4 carries IDs for track 9.
    set_reg(&mut fdc, REG_DATA, 4);
    issue(&mut fdc, 0x1C);
    wait_idle(&mut fdc);
    assert_ne!(fdc.status_r() & S_SEEK_ERROR, 0);
    assert_eq!(fdc.drive().cylinder(), 4);
}

#[test]
fn test_step_direction_persists() {
    let mut fdc = controller_with(FluxDisk::new(80, 2));

    for (cmd, track, cylinder) in [(0x58, 1, 1), (0x38, 2, 2), (0x78, 1, 1), (0x28, 1, 0)] {
        issue(&mut fdc, cmd);
        wait_idle(&mut fdc);
        assert_eq!(fdc.track_r(), track, "command {:02X}", cmd);
        assert_eq!(fdc.drive().cylinder(), cylinder, "command {:02X}", cmd);
    }
}

#[test]
fn test_spinup_waits_for_index_pulses() {
    let mut fdc = controller_with(FluxDisk::new(80, 2));
    issue(&mut fdc, 0x00);
    assert!(fdc.is_busy());
    assert!(fdc.drive().is_motor_on());
    wait_idle(&mut fdc);
    assert!(fdc.now() >= SimTime::from_ns(6 * DEFAULT_REVOLUTION_NS));
    let status = fdc.status_r();
    assert_ne!(status & S_SPIN, 0);
    assert_ne!(status & S_MON, 0);

    // With h set, no wait when the motor is already running.
    let start = fdc.now();
    issue(&mut fdc, 0x08);
    wait_idle(&mut fdc);
    assert!(fdc.now().as_ns() - start.as_ns() < 1_000_000);
}

#[test]
fn test_motor_turns_off_when_idle() {
    let mut fdc = controller_with(FluxDisk::new(80, 2));
    issue(&mut fdc, 0x08);
    wait_idle(&mut fdc);
    assert!(fdc.drive().is_motor_on());

    fdc.run(10.0 * DEFAULT_REVOLUTION_NS as f64 / 1000.0);
    assert!(!fdc.drive().is_motor_on());
    assert_eq!(fdc.status_r() & S_MON, 0);
}

#[test]
fn test_not_ready_without_medium() {
    let mut fdc = FloppyController::default();
    let (intrq_log, cb) = line_log();
    fdc.setup_intrq_cb(cb);

    for cmd in [0x88, 0x08, 0xC0] {
        issue(&mut fdc, cmd);
        assert!(!fdc.is_busy());
        assert!(fdc.intrq_r());
        let status = fdc.status_r();
        assert_ne!(status & S_NOT_READY, 0);
        assert_eq!(status & S_BUSY, 0);
    }
    assert_eq!(*intrq_log.borrow(), vec![true, false, true, false, true, false]);
    assert!(fdc.cur_live.pll.ctime.is_never());
    assert!(!fdc.drive().is_motor_on());
}

#[test]
fn test_medium_removed_mid_command() {
    let sectors = mfm_sectors(0, 9);
    let mut fdc = controller_with(disk_with_track(TrackEncoding::Mfm, 0, &sectors));
    set_reg(&mut fdc, REG_SECTOR, 12);
    issue(&mut fdc, 0x88);
    fdc.run(50_000.0);
    assert!(fdc.is_busy());

    fdc.set_floppy(None);
    assert!(!fdc.is_busy());
    assert!(fdc.intrq_r());
    assert_ne!(fdc.status_r() & S_NOT_READY, 0);
    assert_eq!(fdc.cur_live.state, LiveState::Idle);
}

#[test]
fn test_force_interrupt_mid_read() {
    let sectors = mfm_sectors(0, 9);
    let mut fdc = controller_with(disk_with_track(TrackEncoding::Mfm, 0, &sectors));
    set_reg(&mut fdc, REG_SECTOR, 2);
    issue(&mut fdc, 0x88);

    let mut got = Vec::new();
    while got.len() < 10 {
        fdc.run(POLL_US);
        if fdc.drq_r() {
            got.push(fdc.data_r());
        }
    }
    assert_eq!(&got[..], &sectors[1].data[..10]);

    fdc.cmd_w(0xD0);
    assert!(!fdc.is_busy());
    assert!(!fdc.drq_r());
    assert!(fdc.intrq_r());
    assert_eq!(fdc.track_r(), 0);
    assert_eq!(fdc.sector_r(), 2);
    assert_eq!(fdc.data_r(), got[9]);

    // The controller accepts new work.
    set_reg(&mut fdc, REG_SECTOR, 3);
    assert_eq!(run_read(&mut fdc, 0x88), sectors[2].data);
}

#[test]
fn test_force_interrupt_when_idle() {
    let mut fdc = controller_with(FluxDisk::new(80, 2));
    fdc.cmd_w(0xD0);
    assert!(!fdc.intrq_r());
    assert!(!fdc.is_busy());
}

#[test]
fn test_force_interrupt_during_step_wait() {
    let mut fdc = controller_with(FluxDisk::new(80, 2));
    set_reg(&mut fdc, REG_DATA, 40);
    let sector = fdc.sector_r();
    issue(&mut fdc, 0x18);
    fdc.run(60_000.0);
    assert_eq!(fdc.main_state, MainState::Seek);
    assert_eq!(fdc.sub_state, SubState::SeekWaitStepTime);

    let track = fdc.track_r();
    let steps = fdc.drive().step_count();
    assert!((5..40).contains(&track), "track {}", track);
    assert_eq!(fdc.drive().cylinder(), track as u16);

    fdc.cmd_w(0xD0);
    assert!(!fdc.is_busy());
    assert!(fdc.intrq_r());
    assert_eq!(fdc.status_r() & S_BUSY, 0);
    assert_eq!(fdc.track_r(), track);
    assert_eq!(fdc.sector_r(), sector);
    assert_eq!(fdc.data_r(), 40);

    // No further steps once aborted.
    fdc.run(100_000.0);
    assert_eq!(fdc.sub_state, SubState::Idle);
    assert_eq!(fdc.track_r(), track);
    assert_eq!(fdc.drive().cylinder(), track as u16);
    assert_eq!(fdc.drive().step_count(), steps);
    assert!(!fdc.intrq_r());

    set_reg(&mut fdc, REG_DATA, 3);
    issue(&mut fdc, 0x18);
    wait_idle(&mut fdc);
    assert_eq!(fdc.track_r(), 3);
    assert_eq!(fdc.drive().cylinder(), 3);
    assert_eq!(fdc.status_r() & S_SEEK_ERROR, 0);
}

#[test]
fn test_force_interrupt_during_spinup() {
    let mut fdc = controller_with(FluxDisk::new(80, 2));
    fdc.drive_mut().set_cylinder(7);
    set_reg(&mut fdc, REG_TRACK, 7);
    set_reg(&mut fdc, REG_SECTOR, 9);
    set_reg(&mut fdc, REG_DATA, 0x33);

    issue(&mut fdc, 0x00);
    fdc.run(300_000.0);
    assert_eq!(fdc.main_state, MainState::Restore);
    assert_eq!(fdc.sub_state, SubState::SpinupWait);

    fdc.cmd_w(0xD0);
    assert!(!fdc.is_busy());
    assert!(fdc.intrq_r());
    assert_eq!(fdc.status_r() & S_BUSY, 0);
    assert_eq!(fdc.track_r(), 7);
    assert_eq!(fdc.sector_r(), 9);
    assert_eq!(fdc.data_r(), 0x33);

    // The remaining index pulses do not resume the restore.
    fdc.run(1_500_000.0);
    assert!(!fdc.is_busy());
    assert_eq!(fdc.track_r(), 7);
    assert_eq!(fdc.drive().cylinder(), 7);
    assert_eq!(fdc.drive().step_count(), 0);
    assert!(!fdc.intrq_r());

    issue(&mut fdc, 0x08);
    wait_idle(&mut fdc);
    assert_eq!(fdc.track_r(), 0);
    assert_eq!(fdc.drive().cylinder(), 0);
    assert_eq!(fdc.drive().step_count(), 7);
    assert_ne!(fdc.status_r() & S_TR00, 0);
}

#[test]
fn test_force_interrupt_mid_write() {
    use std::sync::{Arc, RwLock};

    let sectors = mfm_sectors(0, 9);
    let disk = Arc::new(RwLock::new(disk_with_track(TrackEncoding::Mfm, 0, &sectors)));
    let mut fdc = FloppyController::default();
    fdc.set_floppy(Some(disk.clone()));
    let new_data = pattern(512, 0x6C);

    set_reg(&mut fdc, REG_SECTOR, 4);
    issue(&mut fdc, 0xA8);
    let mut taken = 0;
    while taken < 100 {
        fdc.run(POLL_US);
        if fdc.drq_r() {
            fdc.gen_w(REG_DATA, new_data[taken]);
            taken += 1;
        }
    }
    // Wait for the 100th byte to be taken.
    while !fdc.drq_r() {
        fdc.run(1.0);
    }
    assert_eq!(fdc.main_state, MainState::WriteSector);
    assert_eq!(fdc.sub_state, SubState::SectorWrite);

    fdc.cmd_w(0xD0);
    assert!(!fdc.is_busy());
    assert!(!fdc.drq_r());
    assert!(fdc.intrq_r());
    assert_eq!(fdc.status_r() & (S_BUSY | S_LOST), 0);
    assert_eq!(fdc.track_r(), 0);
    assert_eq!(fdc.sector_r(), 4);
    assert_eq!(fdc.data_r(), new_data[99]);

    // The write gate is closed: the track stays as it was left.
    let track = disk.read().unwrap().track(0, 0).unwrap().to_vec();
    fdc.run(100_000.0);
    assert_eq!(disk.read().unwrap().track(0, 0).unwrap(), &track[..]);
    assert_eq!(fdc.sector_r(), 4);

    // Sector 4 keeps its ID and carries the bytes written before the interrupt.
    let data = run_read(&mut fdc, 0x88);
    assert_eq!(data.len(), 512);
    assert_eq!(&data[..64], &new_data[..64]);
    let status = fdc.status_r();
    assert_eq!(status & S_RNF, 0);
    assert_ne!(status & S_CRC, 0);

    for id in [3, 5] {
        set_reg(&mut fdc, REG_SECTOR, id);
        assert_eq!(run_read(&mut fdc, 0x88), sectors[id as usize - 1].data);
        assert_eq!(errors(fdc.status_r()), 0);
    }
}

#[test]
fn test_single_256_byte_sector_status() {
    for (bad_crc, expected) in [(false, S_MON), (true, S_MON | S_CRC)] {
        let mut spec = SectorSpec::new(SectorId::new(3, 0, 1, 1), pattern(256, 0x21));
        if bad_crc {
            spec = spec.with_bad_data_crc();
        }
        let mut fdc = controller_with(disk_with_track(TrackEncoding::Mfm, 3, &[spec.clone()]));
        let (drq_log, cb) = line_log();
        fdc.setup_drq_cb(cb);
        fdc.drive_mut().set_cylinder(3);
        set_reg(&mut fdc, REG_TRACK, 3);
        set_reg(&mut fdc, REG_SECTOR, 1);

        let data = run_read(&mut fdc, 0x88);
        assert_eq!(data.len(), 256);
        assert_eq!(data, spec.data);
        assert_eq!(drq_log.borrow().iter().filter(|&&level| level).count(), 256);
        assert_eq!(fdc.status_r(), expected, "bad crc: {}", bad_crc);
        assert_eq!(expected, if bad_crc { 0x88 } else { 0x80 });
    }
}

#[test]
fn test_immediate_interrupt() {
    let mut fdc = controller_with(FluxDisk::new(80, 2));
    fdc.cmd_w(0xD8);
    assert!(fdc.intrq_r());
    // Status reads do not clear an immediate interrupt.
    fdc.status_r();
    assert!(fdc.intrq_r());
    fdc.cmd_w(0xD0);
    assert!(!fdc.intrq_r());
}

#[test]
fn test_index_interrupt() {
    let mut fdc = controller_with(FluxDisk::new(80, 2));
    issue(&mut fdc, 0x08);
    wait_idle(&mut fdc);
    fdc.status_r();

    fdc.cmd_w(0xD4);
    assert!(!fdc.intrq_r());
    let mut pulses = 0;
    for _ in 0..1000 {
        fdc.run(1000.0);
        if fdc.intrq_r() {
            pulses += 1;
            fdc.status_r();
        }
    }
    assert!((4..=6).contains(&pulses), "saw {} index interrupts", pulses);
}

#[test]
fn test_ready_transition_interrupts() {
    let mut fdc = FloppyController::default();
    fdc.cmd_w(0xD1);
    assert!(!fdc.intrq_r());
    fdc.set_floppy(Some(FluxDisk::new(80, 2).into_ref()));
    assert!(fdc.intrq_r());
    fdc.status_r();

    fdc.cmd_w(0xD2);
    fdc.set_floppy(None);
    assert!(fdc.intrq_r());
}

#[test]
fn test_intrq_raised_once_per_command() {
    let mut fdc = controller_with(disk_with_track(TrackEncoding::Mfm, 0, &mfm_sectors(0, 9)));
    let (intrq_log, cb) = line_log();
    fdc.setup_intrq_cb(cb);
    set_reg(&mut fdc, REG_SECTOR, 1);

    run_read(&mut fdc, 0x88);
    assert_eq!(*intrq_log.borrow(), vec![true]);
    fdc.status_r();
    fdc.status_r();
    assert_eq!(*intrq_log.borrow(), vec![true, false]);
}

#[test]
fn test_command_rejected_while_busy() {
    let sectors = mfm_sectors(0, 9);
    let mut fdc = controller_with(disk_with_track(TrackEncoding::Mfm, 0, &sectors));
    set_reg(&mut fdc, REG_SECTOR, 4);
    issue(&mut fdc, 0x88);
    assert!(fdc.is_busy());

    fdc.cmd_w(0x0B);
    let data = service_read(&mut fdc, false);
    assert_eq!(data, sectors[3].data);
    assert_eq!(fdc.get_debug_state().last_cmd, Command::ReadSector);
    assert_eq!(fdc.drive().step_count(), 0);
}

#[test]
fn test_density_latched_at_decode() {
    let sectors: Vec<SectorSpec> = (1..=10).map(|s| sector(0, s, 0, s)).collect();
    let mut fdc = controller_with(disk_with_track(TrackEncoding::Fm, 0, &sectors));
    fdc.dden_w(false);
    set_reg(&mut fdc, REG_SECTOR, 2);

    issue(&mut fdc, 0x88);
    fdc.dden_w(true);
    assert_eq!(service_read(&mut fdc, false), sectors[1].data);
    assert_eq!(errors(fdc.status_r()), 0);
}

#[test]
fn test_register_commit_delay() {
    let mut fdc = FloppyController::default();
    fdc.track_w(0x21);
    assert_eq!(fdc.track_r(), 0);
    // 128 cycles at 8MHz.
    fdc.run(16.0);
    assert_eq!(fdc.track_r(), 0x21);

    fdc.dden_w(false);
    fdc.sector_w(0x07);
    fdc.run(16.0);
    assert_eq!(fdc.sector_r(), 0);
    fdc.run(16.0);
    assert_eq!(fdc.sector_r(), 0x07);
}

#[test]
fn test_data_register_without_transfer() {
    let mut fdc = FloppyController::default();
    fdc.data_w(0x5A);
    assert_eq!(fdc.data_r(), 0x5A);
    assert_eq!(fdc.status_r() & S_LOST, 0);
}

#[test]
fn test_io_device_ports() {
    let mut fdc = FloppyController::default();
    assert_eq!(fdc.port_list().len(), 4);

    fdc.write_u8(WD1772_TRACK_REGISTER, 0x12, DeviceRunTimeUnit::Microseconds(0.0));
    assert_eq!(fdc.read_u8(WD1772_TRACK_REGISTER, DeviceRunTimeUnit::Microseconds(0.0)), 0x00);
    assert_eq!(fdc.read_u8(WD1772_TRACK_REGISTER, DeviceRunTimeUnit::SystemTicks(160)), 0x12);
    assert_eq!(fdc.read_u8(0x07, DeviceRunTimeUnit::Microseconds(0.0)), 0xFF);

    fdc.write_u8(WD1772_DATA_REGISTER, 0x99, DeviceRunTimeUnit::Microseconds(1.0));
    assert_eq!(fdc.read_u8(WD1772_DATA_REGISTER, DeviceRunTimeUnit::Microseconds(1.0)), 0x99);
    assert_ne!(
        fdc.read_u8(WD1772_STATUS_COMMAND_REGISTER, DeviceRunTimeUnit::Microseconds(1.0)) & S_NOT_READY,
        0
    );
}

#[test]
fn test_debug_state_and_log() {
    let mut fdc = controller_with(FluxDisk::new(80, 2));
    issue(&mut fdc, 0x08);
    wait_idle(&mut fdc);
    let state = fdc.get_debug_state();
    assert_eq!(state.main_state, MainState::Idle);
    assert_eq!(state.last_cmd, Command::Restore);
    assert_eq!(state.cmd_log.len(), 1);
    assert!(state.cmd_log[0].starts_with("Restore"));
    assert!(state.motor_on);

    fdc.reset();
    assert!(fdc.get_debug_state().cmd_log.is_empty());
    assert!(!fdc.drive().is_motor_on());
}
