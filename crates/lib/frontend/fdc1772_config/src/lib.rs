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
*/

//! The `fdc1772_config` crate parses the main configuration file and overlays command line
//! arguments on top of it. Command line arguments always take priority over the configuration
//! file.
//!
//! Features:
//! - `use_bpaf`: Enable BPAF support for command line argument parsing.

#[cfg(feature = "use_bpaf")]
mod bpaf_config;
pub mod mount;

use std::{
    fmt::Display,
    path::{Path, PathBuf},
    str::FromStr,
};

use fdc1772_core::{
    coreconfig::{CrcErrorPolicy, DriveConfig, FdcConfig},
    device_types::{encoding::TrackEncoding, floppy_image::FloppyImageType},
};

#[cfg(feature = "use_bpaf")]
pub use bpaf_config::{cli_args, CmdLineArgs};

use anyhow::{anyhow, Context};
use cfg_if::cfg_if;
use mount::{MountSpec, MountableDeviceType};
use serde_derive::Deserialize;

#[cfg(not(feature = "use_bpaf"))]
#[derive(Debug, Default)]
pub struct CmdLineArgs {
    pub config_file: Option<PathBuf>,
    pub mounts: Vec<MountSpec>,
    pub encoding: Option<TrackEncoding>,
    pub create: Option<FloppyImageType>,
    pub write_protect: bool,
    pub abort_on_crc: bool,
    pub read: Vec<SectorAddress>,
    pub dump: Option<PathBuf>,
    pub hexdump: bool,
}

const fn _default_false() -> bool {
    false
}
const fn _default_timeout_ms() -> u64 {
    5_000
}

/// A sector address as typed by a user: `cylinder:head:sector`.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct SectorAddress {
    pub c: u8,
    pub h: u8,
    pub s: u8,
}

impl FromStr for SectorAddress {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let parts: Vec<&str> = s.trim().split(':').collect();
        if parts.len() != 3 {
            return Err(format!("Expected c:h:s, got: {s}"));
        }
        let field = |i: usize| {
            parts[i]
                .parse::<u8>()
                .map_err(|_| format!("Invalid sector address component: {}", parts[i]))
        };
        Ok(SectorAddress {
            c: field(0)?,
            h: field(1)?,
            s: field(2)?,
        })
    }
}

impl Display for SectorAddress {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}:{}", self.c, self.h, self.s)
    }
}

#[derive(Debug, Default, Deserialize)]
pub struct Media {
    pub image: Option<PathBuf>,
    #[serde(default = "_default_false")]
    pub write_protect: bool,
    #[serde(default)]
    pub encoding: TrackEncoding,
    /// Format of a blank disk to insert when no image is given.
    pub create: Option<FloppyImageType>,
}

#[derive(Debug, Deserialize)]
pub struct Headless {
    /// Sectors to read, as `c:h:s` strings.
    #[serde(default)]
    pub read: Vec<String>,
    pub dump: Option<PathBuf>,
    #[serde(default = "_default_false")]
    pub hexdump: bool,
    /// Upper bound on emulated time for any single command.
    #[serde(default = "_default_timeout_ms")]
    pub timeout_ms: u64,
}

impl Default for Headless {
    fn default() -> Self {
        Self {
            read: Vec::new(),
            dump: None,
            hexdump: false,
            timeout_ms: _default_timeout_ms(),
        }
    }
}

impl Headless {
    pub fn sectors(&self) -> Result<Vec<SectorAddress>, anyhow::Error> {
        self.read
            .iter()
            .map(|s| s.parse::<SectorAddress>().map_err(|e| anyhow!(e)))
            .collect()
    }
}

#[derive(Debug, Default, Deserialize)]
pub struct ConfigFileParams {
    #[serde(default)]
    pub fdc: FdcConfig,
    #[serde(default)]
    pub drive: DriveConfig,
    #[serde(default)]
    pub media: Media,
    #[serde(default)]
    pub headless: Headless,
}

impl ConfigFileParams {
    pub fn overlay(&mut self, shell_args: CmdLineArgs) {
        for mount in shell_args.mounts {
            if mount.device != MountableDeviceType::Floppy || mount.index != 0 {
                log::warn!("Ignoring mount of {:?} on unit {}: only fd:0 exists", mount.path, mount.index);
                continue;
            }
            self.media.write_protect |= mount.flag("wp");
            if let Some(enc) = mount.option("enc") {
                match enc.parse::<TrackEncoding>() {
                    Ok(enc) => self.media.encoding = enc,
                    Err(_) => log::warn!("Ignoring unknown encoding in mount: {}", enc),
                }
            }
            self.media.image = Some(mount.path);
        }

        if let Some(format) = shell_args.create {
            self.media.create = Some(format);
        }
        if let Some(encoding) = shell_args.encoding {
            self.media.encoding = encoding;
        }
        self.media.write_protect |= shell_args.write_protect;
        if shell_args.abort_on_crc {
            self.fdc.crc_error_policy = CrcErrorPolicy::AbortTransfer;
        }

        self.headless
            .read
            .extend(shell_args.read.iter().map(|a| a.to_string()));
        if let Some(dump) = shell_args.dump {
            self.headless.dump = Some(dump);
        }
        self.headless.hexdump |= shell_args.hexdump;

        // The density input follows the mounted image.
        self.fdc.double_density = self.media.encoding.is_mfm();
    }
}

pub fn read_config(toml_string: impl AsRef<str>, shell_args: CmdLineArgs) -> Result<ConfigFileParams, anyhow::Error> {
    let mut toml_args: ConfigFileParams = toml::from_str(toml_string.as_ref()).context("Invalid configuration")?;

    // Command line arguments override config file arguments
    toml_args.overlay(shell_args);

    Ok(toml_args)
}

fn shell_args() -> CmdLineArgs {
    let shell_args: CmdLineArgs;

    cfg_if! {
        if #[cfg(feature = "use_bpaf")] {
            log::debug!("Reading command line arguments...");
            shell_args = cli_args().run();
        } else {
            log::debug!("Argument reading disabled...");
            shell_args = CmdLineArgs::default();
        }
    }
    shell_args
}

/// Read the TOML configuration from a file path, parse and overlay command line arguments.
/// A missing file at the default path is not an error; defaults are used instead.
pub fn read_config_file<P>(default_path: P) -> Result<ConfigFileParams, anyhow::Error>
where
    P: AsRef<Path>,
{
    let shell_args = shell_args();

    // Allow configuration file path to be overridden by command line argument 'config_file'
    let toml_string = if let Some(configfile_path) = shell_args.config_file.as_ref() {
        std::fs::read_to_string(configfile_path)
            .with_context(|| format!("Failed to read configuration file: {}", configfile_path.display()))?
    }
    else {
        match std::fs::read_to_string(default_path.as_ref()) {
            Ok(s) => s,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                log::debug!("No configuration file at {}, using defaults", default_path.as_ref().display());
                String::new()
            }
            Err(e) => return Err(e.into()),
        }
    };

    read_config(toml_string, shell_args)
}

/// Read the TOML configuration from a string, parse and overlay command line arguments.
pub fn read_config_string(toml_string: impl AsRef<str>) -> Result<ConfigFileParams, anyhow::Error> {
    read_config(toml_string, shell_args())
}

#[cfg(test)]
mod tests {
    use super::*;

    const CONFIG: &str = r#"
        [fdc]
        clock_hz = 16000000
        step_rates_us = [6000, 12000, 2000, 3000]
        crc_error_policy = "AbortTransfer"

        [drive]
        cylinders = 82

        [media]
        image = "disks/test.st"
        encoding = "fm"
        create = "180k"

        [headless]
        read = ["0:0:1", "1:0:10"]
    "#;

    #[test]
    fn test_read_config() {
        let config = read_config(CONFIG, CmdLineArgs::default()).unwrap();
        assert_eq!(config.fdc.clock_hz, 16_000_000);
        assert_eq!(config.fdc.crc_error_policy, CrcErrorPolicy::AbortTransfer);
        assert_eq!(config.fdc.settle_time_us, 15_000);
        assert!(!config.fdc.double_density);
        assert_eq!(config.drive.cylinders, 82);
        assert_eq!(config.media.encoding, TrackEncoding::Fm);
        assert_eq!(config.media.create, Some(FloppyImageType::Image180K));
        assert_eq!(
            config.headless.sectors().unwrap(),
            vec![SectorAddress { c: 0, h: 0, s: 1 }, SectorAddress { c: 1, h: 0, s: 10 }]
        );
    }

    #[test]
    fn test_empty_config_uses_defaults() {
        let config = read_config("", CmdLineArgs::default()).unwrap();
        assert_eq!(config.fdc.motor_off_revolutions, 9);
        assert!(config.fdc.double_density);
        assert!(config.media.image.is_none());
        assert_eq!(config.headless.timeout_ms, 5_000);
    }

    #[test]
    fn test_command_line_overrides_file() {
        let args = CmdLineArgs {
            mounts: vec!["fd:0:other.st?wp&enc=mfm".parse().unwrap()],
            read: vec!["2:1:3".parse().unwrap()],
            create: Some(FloppyImageType::Image720K),
            hexdump: true,
            ..Default::default()
        };
        let config = read_config(CONFIG, args).unwrap();
        assert_eq!(config.media.image, Some(PathBuf::from("other.st")));
        assert!(config.media.write_protect);
        assert_eq!(config.media.encoding, TrackEncoding::Mfm);
        assert!(config.fdc.double_density);
        assert_eq!(config.headless.read.len(), 3);
        assert_eq!(config.media.create, Some(FloppyImageType::Image720K));
        assert!(config.headless.hexdump);
    }

    #[test]
    fn test_bad_sector_address() {
        assert!("1:2".parse::<SectorAddress>().is_err());
        assert!("1:2:x".parse::<SectorAddress>().is_err());
        assert_eq!("3:1:9".parse::<SectorAddress>(), Ok(SectorAddress { c: 3, h: 1, s: 9 }));
    }
}
