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

//! fdc1772 headless front-end main library component.

#![forbid(unsafe_code)]

mod host;

use std::time::Instant;

use anyhow::{anyhow, Context, Error};
use colored::Colorize;

use fdc1772_common::util::{format_duration, format_nanos, hex_dump};
use fdc1772_config::{ConfigFileParams, SectorAddress};
use fdc1772_core::device_types::floppy_image::FloppyImage;

use crate::host::{describe_status, Host, SectorRead};

pub const CONFIG_FILE: &str = "./fdc1772.toml";

#[derive(Default)]
struct Counter {
    sectors: usize,
    errors:  usize,
    bytes:   usize,
}

pub fn run() {
    env_logger::init();

    // First we resolve the configuration by parsing the configuration toml and merging it with
    // command line arguments.
    let config = match fdc1772_config::read_config_file(CONFIG_FILE) {
        Ok(config) => config,
        Err(e) => match e.downcast_ref::<std::io::Error>() {
            Some(e) => {
                eprintln!("IO error reading configuration file:\n{}", e);
                std::process::exit(1);
            }
            None => {
                eprintln!(
                    "Failed to parse configuration file. There may be a typo or otherwise invalid toml:\n{:#}",
                    e
                );
                std::process::exit(1);
            }
        },
    };

    if let Err(e) = run_headless(config) {
        eprintln!("{} {:#}", "Error:".red().bold(), e);
        std::process::exit(1);
    }
}

fn load_disk(config: &ConfigFileParams) -> Result<FloppyImage, Error> {
    let encoding = config.media.encoding;
    let (image, source) = match (&config.media.image, config.media.create) {
        (Some(path), _) => {
            let data =
                std::fs::read(path).with_context(|| format!("Failed to read disk image: {}", path.display()))?;
            let image = FloppyImage::load(data, Some(path.as_path()), encoding)
                .with_context(|| format!("Failed to load disk image: {}", path.display()))?;
            (image, path.display().to_string())
        }
        (None, Some(format)) => {
            let image = FloppyImage::create(format, encoding)
                .with_context(|| format!("Failed to create {} disk", format))?;
            (image, format!("blank {} disk", format))
        }
        (None, None) => {
            return Err(anyhow!(
                "No disk image specified. Use --mount fd:0:<image>, --create <format> or set [media] image."
            ))
        }
    };
    image.set_write_protect(config.media.write_protect)?;
    println!(
        "Loaded {} as {} c:{} h:{}{}",
        source,
        encoding.to_string().to_uppercase(),
        image.cylinders(),
        image.heads(),
        if config.media.write_protect { " (write protected)" } else { "" }
    );
    Ok(image)
}

fn report(addr: SectorAddress, read: &SectorRead, counter: &mut Counter, hexdump: bool) {
    counter.sectors += 1;
    counter.bytes += read.data.len();
    let status = describe_status(read.status);
    if read.ok() {
        println!("{:>9}  {:4} bytes  {}", addr.to_string(), read.data.len(), status.green());
    }
    else {
        counter.errors += 1;
        println!("{:>9}  {:4} bytes  {}", addr.to_string(), read.data.len(), status.red());
    }
    if hexdump && !read.data.is_empty() {
        print!("{}", hex_dump(&read.data, 0));
    }
}

fn run_headless(config: ConfigFileParams) -> Result<(), Error> {
    let image = load_disk(&config)?;
    let sectors = config.headless.sectors()?;

    let mut host = Host::new(&config);
    host.insert(image.medium());

    let host_start = Instant::now();
    host.restore()?;

    let mut counter = Counter::default();
    for addr in &sectors {
        let read = host.read_sector(*addr)?;
        report(*addr, &read, &mut counter, config.headless.hexdump);
    }

    if let Some(dump_path) = &config.headless.dump {
        let mut out = Vec::new();
        for c in 0..image.cylinders() {
            for h in 0..image.heads() {
                let mut ids = image.track_ids(c, h).to_vec();
                ids.sort_by_key(|id| id.sector);
                for id in ids {
                    let addr = SectorAddress {
                        c: c as u8,
                        h,
                        s: id.sector,
                    };
                    let mut read = host.read_sector(addr)?;
                    if !read.ok() {
                        report(addr, &read, &mut counter, false);
                    }
                    else {
                        counter.sectors += 1;
                        counter.bytes += read.data.len();
                    }
                    read.data.resize(id.size(), 0);
                    out.extend_from_slice(&read.data);
                }
            }
        }
        std::fs::write(dump_path, &out)
            .with_context(|| format!("Failed to write dump: {}", dump_path.display()))?;
        println!("Wrote {} bytes to {}", out.len(), dump_path.display());
    }

    if sectors.is_empty() && config.headless.dump.is_none() {
        let read = host.read_address(0, 0)?;
        if read.ok() && read.data.len() >= 4 {
            println!(
                "First ID on track 0: c:{} h:{} s:{} n:{}",
                read.data[0], read.data[1], read.data[2], read.data[3]
            );
        }
        else {
            println!("Read Address on track 0: {}", describe_status(read.status).red());
        }
    }

    log::debug!("Final controller state: {:?}", host.fdc().get_debug_state());

    let summary = format!(
        "{} sectors, {} bytes, {} errors in {} emulated ({} host)",
        counter.sectors,
        counter.bytes,
        counter.errors,
        format_nanos(host.fdc().now().as_ns()),
        format_duration(host_start.elapsed())
    );
    if counter.errors == 0 {
        println!("{}", summary.green());
    }
    else {
        println!("{}", summary.yellow());
    }
    Ok(())
}
