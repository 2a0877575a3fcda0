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

    bpaf_config::mod.rs

    Command line arguments, parsed with bpaf.
*/

use std::path::PathBuf;

use crate::{mount::MountSpec, SectorAddress};
use fdc1772_core::device_types::{encoding::TrackEncoding, floppy_image::FloppyImageType};

use bpaf::{Bpaf, Parser};

fn mount_arg() -> impl Parser<Vec<MountSpec>> {
    bpaf::short('m')
        .long("mount")
        .help("Mount media with syntax: fd:0:disk.st")
        .argument::<String>("mountspec")
        .parse(|s| s.parse::<MountSpec>())
        .many()
}

fn read_arg() -> impl Parser<Vec<SectorAddress>> {
    bpaf::short('r')
        .long("read")
        .help("Read a sector through the controller, as c:h:s")
        .argument::<String>("chs")
        .parse(|s| s.parse::<SectorAddress>())
        .many()
}

#[derive(Debug, Default, Bpaf)]
#[bpaf(options, version, generate(cli_args))]
pub struct CmdLineArgs {
    #[bpaf(long("config_file"), long("configfile"))]
    pub config_file: Option<PathBuf>,

    #[bpaf(external(mount_arg))]
    pub mounts: Vec<MountSpec>,

    /// Recording density of the mounted image: fm or mfm
    #[bpaf(long)]
    pub encoding: Option<TrackEncoding>,

    /// Insert a blank formatted disk instead of an image: 160k, 180k, 320k, 360k or 720k
    #[bpaf(long)]
    pub create: Option<FloppyImageType>,

    #[bpaf(long("write_protect"), long("wp"), switch)]
    pub write_protect: bool,

    /// Terminate read sector on a data CRC error without transferring the sector
    #[bpaf(long, switch)]
    pub abort_on_crc: bool,

    #[bpaf(external(read_arg))]
    pub read: Vec<SectorAddress>,

    /// Dump every sector of the disk, read through the controller, to a raw image
    #[bpaf(long)]
    pub dump: Option<PathBuf>,

    #[bpaf(long, switch)]
    pub hexdump: bool,
}
