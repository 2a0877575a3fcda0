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

    mount.rs

    Parsing of media mount specifications given on the command line.
*/
use std::{collections::HashMap, path::PathBuf, str::FromStr};

#[derive(Debug, PartialEq)]
pub enum MountableDeviceType {
    Floppy,
}

/// A mount request of the form `fd:0:disk.st?wp&enc=fm`.
#[derive(Debug, PartialEq)]
pub struct MountSpec {
    pub device:  MountableDeviceType,
    pub index:   usize,
    pub path:    PathBuf,
    pub options: HashMap<String, String>,
}

impl MountSpec {
    /// True if the named option was given, either bare or with a truthy value.
    pub fn flag(&self, name: &str) -> bool {
        self.options
            .get(name)
            .is_some_and(|v| matches!(v.as_str(), "true" | "1" | "yes" | "on"))
    }

    pub fn option(&self, name: &str) -> Option<&str> {
        self.options.get(name).map(|s| s.as_str())
    }
}

impl FromStr for MountSpec {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        // Split once for optional options
        let (main, opt_str) = match s.split_once('?') {
            Some((left, right)) => (left, Some(right)),
            None => (s, None),
        };

        let mut parts = main.splitn(3, ':');

        let device_str = parts.next().ok_or("Missing device type")?;
        let index_str = parts.next().ok_or("Missing device unit")?;
        let path_str = parts.next().ok_or("Missing file path")?;

        let device = match device_str {
            "fd" => MountableDeviceType::Floppy,
            other => return Err(format!("Unknown device type: {other}")),
        };

        let index: usize = index_str
            .parse()
            .map_err(|_| format!("Invalid device index: {index_str}"))?;

        if path_str.is_empty() {
            return Err("Missing file path".to_string());
        }
        let path = PathBuf::from(path_str);
        let mut options = HashMap::new();

        if let Some(opts) = opt_str {
            for entry in opts.split('&').filter(|e| !e.is_empty()) {
                let (k, v) = entry.split_once('=').unwrap_or((entry, "true"));
                options.insert(k.to_string(), v.to_string());
            }
        }

        Ok(MountSpec {
            device,
            index,
            path,
            options,
        })
    }
}
