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

    devices::fdc::mod.rs

    Implements the WD1772 floppy disk controller.

    The controller is driven by a small set of one-shot timers and the
    index pulse of the attached drive. Commands advance through a main
    state (which command is running) and a sub state (where in that
    command we are). Everything that touches the bitstream is delegated
    to the live engine in live.rs.
*/

pub mod command;
mod io;
mod live;
pub mod pll;
#[cfg(test)]
mod tests;

use crate::{
    coreconfig::{CrcErrorPolicy, DriveConfig, FdcConfig},
    device_traits::flux_medium::MediumRef,
    device_types::{encoding::TrackEncoding, sim_time::SimTime},
    devices::floppy_drive::{FloppyDrive, StepDirection},
};
use command::*;
pub use io::*;
pub use live::{LiveInfo, LiveState};

use fdc1772_common::types::history_buffer::HistoryBuffer;
use strum_macros::Display;

pub const FDC_LOG_LEN: usize = 1000;

/// Command decode delay, in controller clocks, for MFM and FM.
const CMD_DELAY_MFM: u64 = 184;
const CMD_DELAY_FM: u64 = 384;
/// Delay before a write to the track or sector register takes effect.
const REG_DELAY_MFM: u64 = 128;
const REG_DELAY_FM: u64 = 256;

/// Callback for an output line. Called only when the line level changes.
pub type LineCallback = Box<dyn FnMut(bool)>;

#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Display)]
pub enum MainState {
    #[default]
    Idle,
    Restore,
    Seek,
    Step,
    ReadSector,
    WriteSector,
    ReadAddress,
}

#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Display)]
pub enum SubState {
    #[default]
    Idle,
    Spinup,
    SpinupWait,
    SpinupDone,
    SeekMove,
    SeekWaitStepTime,
    SeekWaitStepTimeDone,
    SeekDone,
    SeekWaitStabilizationTime,
    SeekWaitStabilizationTimeDone,
    ScanId,
    ScanIdFailed,
    SectorRead,
    SectorDeliver,
    SectorDeliverWait,
    SectorWrite,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, Display)]
pub enum TimerId {
    Gen,
    Cmd,
    Track,
    Sector,
}

const TIMERS: [TimerId; 4] = [TimerId::Gen, TimerId::Cmd, TimerId::Track, TimerId::Sector];

#[derive(Clone, Debug, Default)]
pub struct FdcDebugState {
    pub main_state: MainState,
    pub sub_state: SubState,
    pub live_state: LiveState,
    pub last_cmd: Command,
    pub command_register: u8,
    pub status_register: u8,
    pub track_register: u8,
    pub sector_register: u8,
    pub data_register: u8,
    pub intrq: bool,
    pub drq: bool,
    pub dden: bool,
    pub cylinder: u16,
    pub motor_on: bool,
    pub time: SimTime,
    pub cmd_log: Vec<String>,
}

pub struct FloppyController {
    config: FdcConfig,
    drive: FloppyDrive,
    now: SimTime,
    timers: [SimTime; 4],
    next_index: SimTime,

    dden: bool,
    /// Density latched when the running command was decoded.
    encoding: TrackEncoding,
    main_state: MainState,
    sub_state: SubState,
    status_type_1: bool,

    command: u8,
    last_command: Command,
    status: u8,
    track: u8,
    sector: u8,
    data: u8,
    intrq: bool,
    drq: bool,
    intrq_cond: u8,

    last_dir: StepDirection,
    counter: u32,
    motor_timeout: u32,
    sector_size: usize,

    cmd_buffer: Option<u8>,
    track_buffer: Option<u8>,
    sector_buffer: Option<u8>,

    xfer_buffer: Vec<u8>,
    xfer_index: usize,

    cur_live: LiveInfo,
    checkpoint_live: LiveInfo,

    intrq_cb: Option<LineCallback>,
    drq_cb: Option<LineCallback>,
    cmd_log: HistoryBuffer<String>,
}

impl Default for FloppyController {
    fn default() -> Self {
        Self::new(FdcConfig::default(), &DriveConfig::default())
    }
}

impl FloppyController {
    pub fn new(config: FdcConfig, drive_config: &DriveConfig) -> Self {
        let dden = config.double_density;
        Self {
            config,
            drive: FloppyDrive::new(drive_config),
            now: SimTime::ZERO,
            timers: [SimTime::NEVER; 4],
            next_index: SimTime::NEVER,

            dden,
            encoding: if dden { TrackEncoding::Mfm } else { TrackEncoding::Fm },
            main_state: MainState::Idle,
            sub_state: SubState::Idle,
            status_type_1: true,

            command: 0,
            last_command: Command::NoCommand,
            status: 0,
            track: 0,
            sector: 0,
            data: 0,
            intrq: false,
            drq: false,
            intrq_cond: 0,

            last_dir: StepDirection::In,
            counter: 0,
            motor_timeout: 0,
            sector_size: 0,

            cmd_buffer: None,
            track_buffer: None,
            sector_buffer: None,

            xfer_buffer: Vec::with_capacity(1024),
            xfer_index: 0,

            cur_live: LiveInfo::never(),
            checkpoint_live: LiveInfo::never(),

            intrq_cb: None,
            drq_cb: None,
            cmd_log: HistoryBuffer::new(FDC_LOG_LEN),
        }
    }

    /// Master reset. Registers are cleared and any running command is dropped without an
    /// interrupt. The drive keeps its head position and medium.
    pub fn reset(&mut self) {
        log::debug!("Resetting WD1772");
        self.live_abort();
        self.timers = [SimTime::NEVER; 4];
        self.main_state = MainState::Idle;
        self.sub_state = SubState::Idle;
        self.status_type_1 = true;
        self.command = 0;
        self.last_command = Command::NoCommand;
        self.status = 0;
        self.track = 0;
        self.sector = 0;
        self.data = 0;
        self.intrq_cond = 0;
        self.last_dir = StepDirection::In;
        self.counter = 0;
        self.motor_timeout = 0;
        self.cmd_buffer = None;
        self.track_buffer = None;
        self.sector_buffer = None;
        self.xfer_buffer.clear();
        self.xfer_index = 0;
        self.set_intrq(false);
        self.drop_drq();
        self.drive.motor_off();
        self.next_index = SimTime::NEVER;
        self.cmd_log.clear();
    }

    pub fn setup_intrq_cb(&mut self, cb: LineCallback) {
        self.intrq_cb = Some(cb);
    }

    pub fn setup_drq_cb(&mut self, cb: LineCallback) {
        self.drq_cb = Some(cb);
    }

    pub fn drive(&self) -> &FloppyDrive {
        &self.drive
    }

    pub fn drive_mut(&mut self) -> &mut FloppyDrive {
        &mut self.drive
    }

    pub fn now(&self) -> SimTime {
        self.now
    }

    pub fn config(&self) -> &FdcConfig {
        &self.config
    }

    /// Insert, replace or remove the medium. Changing the medium under a running command
    /// aborts it with not ready.
    pub fn set_floppy(&mut self, medium: Option<MediumRef>) {
        let was_ready = self.drive.has_medium();
        let busy = self.main_state != MainState::Idle;
        if busy && was_ready {
            self.live_abort();
        }

        if self.drive.eject().is_some() {
            log::debug!("Medium ejected at {}", self.now);
        }
        if let Some(medium) = medium {
            log::debug!("Medium inserted at {}", self.now);
            self.drive.insert(medium, self.now);
        }
        self.next_index = self.drive.next_index(self.now);
        let ready = self.drive.has_medium();

        if busy && was_ready {
            log::debug!("{}: medium changed, aborting", self.last_command);
            self.status |= S_NOT_READY;
            self.command_end();
        }
        if !was_ready && ready && self.intrq_cond & I_NOT_READY_TO_READY != 0 {
            self.set_intrq(true);
        }
        if was_ready && !ready && self.intrq_cond & I_READY_TO_NOT_READY != 0 {
            self.set_intrq(true);
        }
    }

    /// Set the DDEN input. The level is sampled when a command is decoded.
    pub fn dden_w(&mut self, double_density: bool) {
        self.dden = double_density;
    }

    pub fn intrq_r(&self) -> bool {
        self.intrq
    }

    pub fn drq_r(&self) -> bool {
        self.drq
    }

    pub fn is_busy(&self) -> bool {
        self.main_state != MainState::Idle
    }

    pub fn cmd_w(&mut self, val: u8) {
        if self.intrq && self.intrq_cond & I_IMMEDIATE == 0 {
            self.set_intrq(false);
        }

        if Command::decode(val) == Command::ForceInterrupt {
            self.interrupt_start(val);
            return;
        }
        if self.main_state != MainState::Idle || self.cmd_buffer.is_some() {
            log::warn!("cmd_w(): Command {:02X} rejected, controller busy", val);
            return;
        }
        self.cmd_buffer = Some(val);
        let delay = if self.dden { CMD_DELAY_MFM } else { CMD_DELAY_FM };
        self.delay_cycles(TimerId::Cmd, delay);
    }

    pub fn status_r(&mut self) -> u8 {
        self.live_sync();
        if self.intrq && self.intrq_cond & I_IMMEDIATE == 0 {
            self.set_intrq(false);
        }

        if self.status_type_1 {
            self.status &= !(S_IP | S_TR00 | S_WP);
            if self.drive.index_active(self.now) {
                self.status |= S_IP;
            }
            if self.drive.trk00() {
                self.status |= S_TR00;
            }
            if self.drive.write_protected() {
                self.status |= S_WP;
            }
        }
        else if self.drq {
            self.status |= S_DRQ;
        }
        else {
            self.status &= !S_DRQ;
        }

        if self.drive.has_medium() {
            self.status
        }
        else {
            self.status | S_NOT_READY
        }
    }

    pub fn track_w(&mut self, val: u8) {
        self.track_buffer = Some(val);
        let delay = if self.dden { REG_DELAY_MFM } else { REG_DELAY_FM };
        self.delay_cycles(TimerId::Track, delay);
    }

    pub fn track_r(&self) -> u8 {
        self.track
    }

    pub fn sector_w(&mut self, val: u8) {
        self.sector_buffer = Some(val);
        let delay = if self.dden { REG_DELAY_MFM } else { REG_DELAY_FM };
        self.delay_cycles(TimerId::Sector, delay);
    }

    pub fn sector_r(&self) -> u8 {
        self.sector
    }

    pub fn data_w(&mut self, val: u8) {
        let transfer = matches!(
            self.sub_state,
            SubState::SectorRead | SubState::SectorDeliver | SubState::SectorDeliverWait | SubState::SectorWrite
        );
        if self.main_state == MainState::WriteSector && self.drq {
            self.data = val;
            self.drop_drq();
        }
        else if transfer && !self.drq {
            log::debug!("data_w(): {:02X} written with no data request pending", val);
            self.status |= S_LOST;
        }
        else {
            self.data = val;
        }
    }

    pub fn data_r(&mut self) -> u8 {
        self.drop_drq();
        self.data
    }

    /// Read a register by its two bit address.
    pub fn gen_r(&mut self, reg: u8) -> u8 {
        match reg & 0x03 {
            0 => self.status_r(),
            1 => self.track_r(),
            2 => self.sector_r(),
            _ => self.data_r(),
        }
    }

    /// Write a register by its two bit address.
    pub fn gen_w(&mut self, reg: u8, val: u8) {
        match reg & 0x03 {
            0 => self.cmd_w(val),
            1 => self.track_w(val),
            2 => self.sector_w(val),
            _ => self.data_w(val),
        }
    }

    /// Run the controller for the specified number of microseconds.
    pub fn run(&mut self, us: f64) {
        let target = self.now + SimTime::from_us_f64(us);
        self.run_until(target);
    }

    /// Process every timer and index pulse due up to and including `target`.
    pub fn run_until(&mut self, target: SimTime) {
        loop {
            let (t, timer) = self.next_event();
            if t.is_never() || t > target {
                break;
            }
            self.now = self.now.max(t);
            match timer {
                Some(id) => {
                    self.timers[id as usize] = SimTime::NEVER;
                    self.device_timer(id);
                }
                None => {
                    self.next_index = self.drive.next_index(self.now);
                    self.index_callback();
                }
            }
        }
        self.now = self.now.max(target);
    }

    /// Earliest pending event. Timers win ties with the index pulse.
    fn next_event(&self) -> (SimTime, Option<TimerId>) {
        let mut best = (SimTime::NEVER, None);
        for id in TIMERS {
            let t = self.timers[id as usize];
            if t < best.0 {
                best = (t, Some(id));
            }
        }
        if self.next_index < best.0 {
            best = (self.next_index, None);
        }
        best
    }

    fn delay_cycles(&mut self, id: TimerId, cycles: u64) {
        let ns = cycles * 1_000_000_000 / self.config.clock_hz.max(1) as u64;
        self.timers[id as usize] = self.now + SimTime::from_ns(ns);
    }

    fn delay_us(&mut self, id: TimerId, us: u32) {
        self.timers[id as usize] = self.now + SimTime::from_us(us as u64);
    }

    fn device_timer(&mut self, id: TimerId) {
        match id {
            TimerId::Gen => self.do_generic(),
            TimerId::Cmd => self.do_cmd_w(),
            TimerId::Track => {
                if let Some(val) = self.track_buffer.take() {
                    self.track = val;
                }
            }
            TimerId::Sector => {
                if let Some(val) = self.sector_buffer.take() {
                    self.sector = val;
                }
            }
        }
    }

    fn do_generic(&mut self) {
        self.live_sync();
        match self.sub_state {
            SubState::SeekWaitStepTime => self.sub_state = SubState::SeekWaitStepTimeDone,
            SubState::SeekWaitStabilizationTime => self.sub_state = SubState::SeekWaitStabilizationTimeDone,
            SubState::SectorDeliverWait => self.sub_state = SubState::SectorDeliver,
            _ => {}
        }
        self.general_continue();
    }

    fn index_callback(&mut self) {
        self.live_sync();

        if self.intrq_cond & I_INDEX != 0 {
            self.set_intrq(true);
        }

        match self.sub_state {
            SubState::Idle => {
                if self.drive.is_motor_on() {
                    self.motor_timeout += 1;
                    if self.motor_timeout >= self.config.motor_off_revolutions {
                        self.motor_stop();
                    }
                }
            }
            SubState::SpinupWait => {
                self.counter += 1;
                if self.counter >= self.config.spinup_revolutions {
                    self.sub_state = SubState::Spinup;
                }
            }
            SubState::ScanId => {
                self.counter += 1;
                if self.counter >= self.config.id_search_revolutions {
                    log::debug!("{}: no matching ID after {} index pulses", self.last_command, self.counter);
                    self.live_abort();
                    self.sub_state = SubState::ScanIdFailed;
                }
            }
            _ => {}
        }
        self.general_continue();
    }

    fn general_continue(&mut self) {
        if self.cur_live.state != LiveState::Idle {
            self.live_run_default();
            return;
        }
        match self.main_state {
            MainState::Idle => {}
            MainState::Restore | MainState::Seek | MainState::Step => self.seek_continue(),
            MainState::ReadSector | MainState::WriteSector | MainState::ReadAddress => self.sector_continue(),
        }
    }

    fn do_cmd_w(&mut self) {
        let Some(val) = self.cmd_buffer.take()
        else {
            return;
        };
        if self.main_state != MainState::Idle {
            log::warn!("do_cmd_w(): Command {:02X} dropped, controller busy", val);
            return;
        }
        let command = Command::decode(val);
        if matches!(command, Command::ReadTrack | Command::WriteTrack) {
            log::warn!("Received {} command: {:02X}, not implemented", command, val);
            return;
        }

        self.command = val;
        self.last_command = command;
        self.encoding = if self.dden { TrackEncoding::Mfm } else { TrackEncoding::Fm };
        self.motor_timeout = 0;
        log::debug!(
            "Received {} command: {:02X} T:{:02X} S:{:02X} D:{:02X} ({})",
            command,
            val,
            self.track,
            self.sector,
            self.data,
            self.encoding
        );
        self.log_cmd(
            command,
            format!(
                "{:02X} T:{:02X} S:{:02X} D:{:02X} {} @ {}",
                val, self.track, self.sector, self.data, self.encoding, self.now
            ),
        );

        if !self.drive.has_medium() {
            log::debug!("{}: drive not ready", command);
            self.status_type_1 = command.is_type_1();
            self.status = S_NOT_READY;
            self.drop_drq();
            self.command_end();
            return;
        }

        match command {
            Command::Restore => self.seek_start(MainState::Restore),
            Command::Seek => self.seek_start(MainState::Seek),
            Command::Step | Command::StepIn | Command::StepOut => self.seek_start(MainState::Step),
            Command::ReadSector => self.sector_start(MainState::ReadSector),
            Command::WriteSector => self.sector_start(MainState::WriteSector),
            Command::ReadAddress => self.sector_start(MainState::ReadAddress),
            _ => {}
        }
    }

    /// Force interrupt is executed as soon as it is written, busy or not.
    fn interrupt_start(&mut self, val: u8) {
        let cmd = ForceInterruptCommand::from_bytes([val]);
        let busy = self.main_state != MainState::Idle;

        if self.cmd_buffer.take().is_some() {
            log::debug!("Force interrupt: discarding pending command");
            self.timers[TimerId::Cmd as usize] = SimTime::NEVER;
        }
        if busy {
            log::debug!("Force interrupt: aborting {} in {}", self.last_command, self.sub_state);
            self.live_abort();
            self.main_state = MainState::Idle;
            self.sub_state = SubState::Idle;
            self.timers[TimerId::Gen as usize] = SimTime::NEVER;
            self.status &= !S_BUSY;
            self.drop_drq();
            self.motor_timeout = 0;
        }
        else {
            self.status_type_1 = true;
        }
        self.log_cmd(Command::ForceInterrupt, format!("{:02X} @ {}", val, self.now));

        let prev_cond = self.intrq_cond;
        self.intrq_cond = cmd.conditions();
        if self.intrq_cond == 0 && prev_cond & I_IMMEDIATE != 0 {
            self.set_intrq(false);
        }
        if busy || self.intrq_cond & I_IMMEDIATE != 0 {
            self.set_intrq(true);
        }
    }

    fn command_end(&mut self) {
        if self.cur_live.state != LiveState::Idle || !self.cur_live.tm.is_never() {
            self.live_abort();
        }
        self.main_state = MainState::Idle;
        self.sub_state = SubState::Idle;
        self.status &= !S_BUSY;
        self.motor_timeout = 0;
        self.timers[TimerId::Gen as usize] = SimTime::NEVER;
        log::debug!("{} complete, status: {:02X} at {}", self.last_command, self.status, self.now);
        self.set_intrq(true);
    }

    fn set_intrq(&mut self, state: bool) {
        if self.intrq != state {
            self.intrq = state;
            if let Some(cb) = self.intrq_cb.as_mut() {
                cb(state);
            }
        }
    }

    fn set_drq(&mut self) {
        if !self.drq {
            self.drq = true;
            if let Some(cb) = self.drq_cb.as_mut() {
                cb(true);
            }
        }
    }

    fn drop_drq(&mut self) {
        if self.drq {
            self.drq = false;
            if let Some(cb) = self.drq_cb.as_mut() {
                cb(false);
            }
        }
    }

    fn type_1(&self) -> TypeICommand {
        TypeICommand::from_bytes([self.command])
    }

    fn type_2(&self) -> TypeIICommand {
        TypeIICommand::from_bytes([self.command])
    }

    fn motor_start(&mut self) {
        self.drive.motor_on(self.now);
        self.status |= S_MON;
        self.next_index = self.drive.next_index(self.now);
    }

    fn motor_stop(&mut self) {
        log::trace!("Motor off after {} idle revolutions", self.motor_timeout);
        self.drive.motor_off();
        self.status &= !S_MON;
        self.motor_timeout = 0;
        self.next_index = SimTime::NEVER;
    }

    /// Handle the spin-up sub state shared by all commands.
    fn spinup(&mut self) {
        // Bit 3 disables the spin-up wait for both command types.
        let no_spinup = self.type_1().no_spinup();
        if !self.drive.is_motor_on() {
            self.motor_start();
            if !no_spinup {
                self.counter = 0;
                self.sub_state = SubState::SpinupWait;
                return;
            }
        }
        if self.status_type_1 && !no_spinup {
            self.status |= S_SPIN;
        }
        self.sub_state = SubState::SpinupDone;
    }

    fn step_head(&mut self) {
        self.drive.step(self.last_dir);
        self.counter += 1;
        if self.last_command.always_updates_track() || self.type_1().update() {
            self.track = match self.last_dir {
                StepDirection::In => self.track.wrapping_add(1),
                StepDirection::Out => self.track.wrapping_sub(1),
            };
        }
    }

    fn scan_id_start(&mut self) {
        self.sub_state = SubState::ScanId;
        self.counter = 0;
        self.live_start(LiveState::SearchAddressMarkHeader);
    }

    fn sector_matches(&self) -> bool {
        // The 1772 has no side compare; the side byte of the ID is ignored.
        self.cur_live.idbuf[0] == self.track && self.cur_live.idbuf[2] == self.sector
    }

    fn seek_start(&mut self, state: MainState) {
        self.main_state = state;
        self.status_type_1 = true;
        self.status = (self.status & S_MON) | S_BUSY;
        if state == MainState::Restore {
            self.track = 0xFF;
            self.data = 0;
        }
        self.sub_state = SubState::Spinup;
        self.seek_continue();
    }

    fn seek_continue(&mut self) {
        loop {
            match self.sub_state {
                SubState::Spinup => self.spinup(),
                SubState::SpinupWait => return,
                SubState::SpinupDone => {
                    self.counter = 0;
                    match self.main_state {
                        MainState::Restore => {
                            self.last_dir = StepDirection::Out;
                            if self.drive.trk00() {
                                self.track = 0;
                                self.sub_state = SubState::SeekDone;
                            }
                            else {
                                self.sub_state = SubState::SeekMove;
                            }
                        }
                        MainState::Seek => {
                            if self.track == self.data {
                                self.sub_state = SubState::SeekDone;
                            }
                            else {
                                self.last_dir = if self.data > self.track {
                                    StepDirection::In
                                }
                                else {
                                    StepDirection::Out
                                };
                                self.sub_state = SubState::SeekMove;
                            }
                        }
                        _ => {
                            match self.last_command {
                                Command::StepIn => self.last_dir = StepDirection::In,
                                Command::StepOut => self.last_dir = StepDirection::Out,
                                _ => {}
                            }
                            self.sub_state = SubState::SeekMove;
                        }
                    }
                }
                SubState::SeekMove => {
                    self.step_head();
                    self.sub_state = SubState::SeekWaitStepTime;
                    let rate = self.config.step_rates_us[self.type_1().rate() as usize];
                    self.delay_us(TimerId::Gen, rate);
                    return;
                }
                SubState::SeekWaitStepTime => return,
                SubState::SeekWaitStepTimeDone => match self.main_state {
                    MainState::Restore => {
                        if self.drive.trk00() {
                            self.track = 0;
                            self.sub_state = SubState::SeekDone;
                        }
                        else if self.counter >= self.config.restore_step_limit {
                            log::debug!("Restore: no track 0 after {} steps", self.counter);
                            self.status |= S_SEEK_ERROR;
                            self.command_end();
                            return;
                        }
                        else {
                            self.sub_state = SubState::SeekMove;
                        }
                    }
                    MainState::Seek => {
                        self.sub_state = if self.track == self.data {
                            SubState::SeekDone
                        }
                        else {
                            SubState::SeekMove
                        };
                    }
                    _ => self.sub_state = SubState::SeekDone,
                },
                SubState::SeekDone => {
                    if self.type_1().verify() {
                        self.sub_state = SubState::SeekWaitStabilizationTime;
                        self.delay_us(TimerId::Gen, self.config.settle_time_us);
                        return;
                    }
                    self.command_end();
                    return;
                }
                SubState::SeekWaitStabilizationTime => return,
                SubState::SeekWaitStabilizationTimeDone => {
                    self.scan_id_start();
                    return;
                }
                SubState::ScanId => {
                    if self.cur_live.idbuf[0] != self.track {
                        self.live_start(LiveState::SearchAddressMarkHeader);
                        return;
                    }
                    if self.cur_live.crc != 0 {
                        self.status |= S_CRC;
                        self.live_start(LiveState::SearchAddressMarkHeader);
                        return;
                    }
                    self.status &= !S_CRC;
                    self.command_end();
                    return;
                }
                SubState::ScanIdFailed => {
                    self.status |= S_SEEK_ERROR;
                    self.command_end();
                    return;
                }
                _ => {
                    log::error!("seek_continue(): unexpected sub state {}", self.sub_state);
                    return;
                }
            }
        }
    }

    fn sector_start(&mut self, state: MainState) {
        self.main_state = state;
        self.status_type_1 = false;
        self.status = (self.status & S_MON) | S_BUSY;
        self.drop_drq();
        self.xfer_buffer.clear();
        self.xfer_index = 0;

        if state == MainState::WriteSector && self.drive.write_protected() {
            log::debug!("Write Sector: medium is write protected");
            self.status |= S_WP;
            self.command_end();
            return;
        }
        self.sub_state = SubState::Spinup;
        self.sector_continue();
    }

    fn sector_continue(&mut self) {
        loop {
            match self.sub_state {
                SubState::Spinup => self.spinup(),
                SubState::SpinupWait => return,
                SubState::SpinupDone => {
                    if self.type_2().settle() {
                        self.sub_state = SubState::SeekWaitStabilizationTime;
                        self.delay_us(TimerId::Gen, self.config.settle_time_us);
                        return;
                    }
                    self.sub_state = SubState::SeekWaitStabilizationTimeDone;
                }
                SubState::SeekWaitStabilizationTime => return,
                SubState::SeekWaitStabilizationTimeDone => {
                    self.scan_id_start();
                    return;
                }
                SubState::ScanId => {
                    if self.main_state == MainState::ReadAddress {
                        self.sector = self.cur_live.idbuf[0];
                        if self.cur_live.crc != 0 {
                            self.status |= S_CRC;
                        }
                        self.command_end();
                        return;
                    }
                    if !self.sector_matches() {
                        self.live_start(LiveState::SearchAddressMarkHeader);
                        return;
                    }
                    if self.cur_live.crc != 0 {
                        log::debug!("{}: ID CRC error on sector {}", self.last_command, self.sector);
                        self.status |= S_CRC;
                        if self.main_state == MainState::ReadSector
                            && self.config.crc_error_policy == CrcErrorPolicy::AbortTransfer
                        {
                            self.command_end();
                        }
                        else {
                            self.live_start(LiveState::SearchAddressMarkHeader);
                        }
                        return;
                    }
                    self.sector_size = 128 << (self.cur_live.idbuf[3] & 0x03);
                    if self.main_state == MainState::WriteSector {
                        self.sub_state = SubState::SectorWrite;
                        self.live_start(LiveState::WriteSectorPre);
                    }
                    else {
                        self.sub_state = SubState::SectorRead;
                        self.xfer_buffer.clear();
                        self.live_start(LiveState::SearchAddressMarkData);
                    }
                    return;
                }
                SubState::ScanIdFailed => {
                    self.status |= S_RNF;
                    self.command_end();
                    return;
                }
                SubState::SectorRead => {
                    let Some(mark) = self.cur_live.data_mark
                    else {
                        log::trace!("{}: no data mark in window, rescanning", self.last_command);
                        self.sub_state = SubState::ScanId;
                        self.live_start(LiveState::SearchAddressMarkHeader);
                        return;
                    };
                    if matches!(mark, 0xF8 | 0xF9) {
                        self.status |= S_DDM;
                    }
                    if self.cur_live.crc != 0 {
                        log::debug!("{}: data CRC error on sector {}", self.last_command, self.sector);
                        self.status |= S_CRC;
                    }
                    if self.config.crc_error_policy == CrcErrorPolicy::AbortTransfer {
                        if self.status & S_CRC != 0 {
                            self.xfer_buffer.clear();
                            self.command_end();
                            return;
                        }
                        self.xfer_index = 0;
                        self.sub_state = SubState::SectorDeliver;
                        continue;
                    }
                    self.sector_done();
                    return;
                }
                SubState::SectorDeliver => {
                    if self.xfer_index > 0 && self.drq {
                        log::debug!("Read Sector: lost data at byte {}", self.xfer_index);
                        self.status |= S_LOST;
                        self.command_end();
                        return;
                    }
                    let Some(&byte) = self.xfer_buffer.get(self.xfer_index)
                    else {
                        self.sector_done();
                        return;
                    };
                    self.data = byte;
                    self.xfer_index += 1;
                    self.set_drq();
                    self.sub_state = SubState::SectorDeliverWait;
                    self.timers[TimerId::Gen as usize] = self.now + SimTime::from_ns(self.encoding.cell_ns() * 16);
                    return;
                }
                SubState::SectorDeliverWait => return,
                SubState::SectorWrite => {
                    self.sector_done();
                    return;
                }
                _ => {
                    log::error!("sector_continue(): unexpected sub state {}", self.sub_state);
                    return;
                }
            }
        }
    }

    /// Finish one sector of a read or write, moving on to the next for multi-sector commands.
    fn sector_done(&mut self) {
        if self.type_2().multi() && self.status & (S_CRC | S_LOST) == 0 {
            self.sector = self.sector.wrapping_add(1);
            log::trace!("{}: continuing with sector {}", self.last_command, self.sector);
            self.scan_id_start();
        }
        else {
            self.command_end();
        }
    }

    fn log_cmd(&mut self, cmd: Command, s: String) {
        self.cmd_log.push(format!("{}: {}", cmd, s));
    }

    pub fn get_debug_state(&self) -> FdcDebugState {
        FdcDebugState {
            main_state: self.main_state,
            sub_state: self.sub_state,
            live_state: self.cur_live.state,
            last_cmd: self.last_command,
            command_register: self.command,
            status_register: self.status,
            track_register: self.track,
            sector_register: self.sector,
            data_register: self.data,
            intrq: self.intrq,
            drq: self.drq,
            dden: self.dden,
            cylinder: self.drive.cylinder(),
            motor_on: self.drive.is_motor_on(),
            time: self.now,
            cmd_log: self.cmd_log.as_vec(),
        }
    }
}
