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

    device_types::floppy_image.rs

    Bridges a fluxfox disk image and the flux level medium seen by the
    drive. Sectors read from the image are rendered onto flux tracks, and
    tracks written by the controller are decoded and written back.
*/

use std::{
    io::Cursor,
    path::Path,
    sync::{Arc, RwLock},
};

use fluxfox::prelude::{
    DiskCh,
    DiskChsnQuery,
    DiskImage,
    ImageBuilder,
    RwScope,
    StandardFormat,
    TrackDataResolution,
};
use serde_derive::Deserialize;
use strum_macros::{Display, EnumString};

use crate::{
    device_traits::flux_medium::MediumRef,
    device_types::{
        encoding::TrackEncoding,
        flux_disk::{FluxDisk, MediaError},
        track_format::{decode_ibm_track, SectorId, SectorSpec},
    },
};

macro_rules! write_lock {
    ($arc_lock:expr) => {{
        match $arc_lock.try_write() {
            Ok(guard) => guard,
            Err(_) => return Err(MediaError::LockFailed),
        }
    }};
}

/// Blank image formats a double density drive can handle.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Deserialize, Display, EnumString)]
pub enum FloppyImageType {
    #[serde(rename = "160k")]
    #[strum(serialize = "160k")]
    Image160K,
    #[serde(rename = "180k")]
    #[strum(serialize = "180k")]
    Image180K,
    #[serde(rename = "320k")]
    #[strum(serialize = "320k")]
    Image320K,
    #[serde(rename = "360k")]
    #[strum(serialize = "360k")]
    Image360K,
    #[serde(rename = "720k")]
    #[strum(serialize = "720k")]
    Image720K,
}

impl From<FloppyImageType> for StandardFormat {
    fn from(value: FloppyImageType) -> Self {
        match value {
            FloppyImageType::Image160K => StandardFormat::PcFloppy160,
            FloppyImageType::Image180K => StandardFormat::PcFloppy180,
            FloppyImageType::Image320K => StandardFormat::PcFloppy320,
            FloppyImageType::Image360K => StandardFormat::PcFloppy360,
            FloppyImageType::Image720K => StandardFormat::PcFloppy720,
        }
    }
}

pub struct FloppyImage {
    image: Arc<RwLock<DiskImage>>,
    flux: Arc<RwLock<FluxDisk>>,
    encoding: TrackEncoding,
    cylinders: u16,
    heads: u8,
    /// Sector IDs of each track in physical order, indexed by `cylinder * heads + head`.
    ids: Vec<Vec<SectorId>>,
}

impl FloppyImage {
    /// Load any image format fluxfox recognizes. `path` is used as a hint for format detection.
    pub fn load(src_vec: Vec<u8>, path: Option<&Path>, encoding: TrackEncoding) -> Result<Self, MediaError> {
        let mut image_buffer = Cursor::new(src_vec);
        let image = DiskImage::load(&mut image_buffer, path, None, None)?;
        Self::attach(image, encoding)
    }

    /// Create a blank, formatted image.
    pub fn create(format: FloppyImageType, encoding: TrackEncoding) -> Result<Self, MediaError> {
        let image = ImageBuilder::new()
            .with_standard_format(StandardFormat::from(format))
            .with_resolution(TrackDataResolution::BitStream)
            .with_creator_tag(b"fdc1772")
            .build()?;
        Self::attach(image, encoding)
    }

    /// Render every sector of `image` onto flux tracks.
    pub fn attach(mut image: DiskImage, encoding: TrackEncoding) -> Result<Self, MediaError> {
        let cylinders = image.image_format().geometry.c();
        let heads = image.image_format().geometry.h();
        log::debug!("Attaching floppy image, c:{} h:{} encoding: {}", cylinders, heads, encoding);

        let mut flux = FluxDisk::new(cylinders, heads);
        let mut ids = vec![Vec::new(); cylinders as usize * heads as usize];
        let sector_map = image.sector_map();

        for (h, tracks) in sector_map.iter().enumerate() {
            for (c, entries) in tracks.iter().enumerate() {
                let (c, h) = (c as u16, h as u8);
                if c >= cylinders || h >= heads {
                    log::warn!("attach(): track c:{} h:{} is outside the image geometry", c, h);
                    continue;
                }

                let mut specs = Vec::with_capacity(entries.len());
                for entry in entries {
                    let chsn = &entry.chsn;
                    let Some(size_code) = SectorId::size_code_for(chsn.n_size())
                    else {
                        log::warn!(
                            "attach(): skipping sector c:{} h:{} s:{} with unsupported size {}",
                            chsn.c(),
                            chsn.h(),
                            chsn.s(),
                            chsn.n_size()
                        );
                        continue;
                    };
                    let id = SectorId::new(chsn.c() as u8, chsn.h(), chsn.s(), size_code);
                    let attributes = &entry.attributes;

                    let mut data = Vec::new();
                    if !attributes.no_dam {
                        let result = image.read_sector(
                            DiskCh::new(c, h),
                            DiskChsnQuery::new(chsn.c(), chsn.h(), chsn.s(), size_code),
                            None,
                            None,
                            RwScope::DataOnly,
                            false,
                        )?;
                        if result.not_found {
                            log::warn!("attach(): sector {} listed in the sector map but not found", id);
                            continue;
                        }
                        data.extend_from_slice(&result.read_buf[result.data_range]);
                    }
                    data.resize(id.size(), 0);

                    let mut spec = SectorSpec::new(id, data);
                    spec.deleted = attributes.deleted_mark;
                    spec.bad_id_crc = !attributes.address_crc_valid;
                    spec.bad_data_crc = !attributes.no_dam && !attributes.data_crc_valid;
                    spec.no_dam = attributes.no_dam;
                    specs.push(spec);
                }

                if specs.is_empty() {
                    continue;
                }
                flux.format_track(c, h, encoding, &specs)?;
                ids[c as usize * heads as usize + h as usize] = specs.iter().map(|s| s.id).collect();
            }
        }

        Ok(Self {
            image: image.into_arc(),
            flux: Arc::new(RwLock::new(flux)),
            encoding,
            cylinders,
            heads,
            ids,
        })
    }

    /// The handle a drive reads and writes through.
    pub fn medium(&self) -> MediumRef {
        self.flux.clone()
    }

    pub fn image(&self) -> Arc<RwLock<DiskImage>> {
        self.image.clone()
    }

    pub fn encoding(&self) -> TrackEncoding {
        self.encoding
    }

    pub fn cylinders(&self) -> u16 {
        self.cylinders
    }

    pub fn heads(&self) -> u8 {
        self.heads
    }

    /// Sector IDs of a track as loaded from the image.
    pub fn track_ids(&self, cylinder: u16, head: u8) -> &[SectorId] {
        if cylinder >= self.cylinders || head >= self.heads {
            return &[];
        }
        &self.ids[cylinder as usize * self.heads as usize + head as usize]
    }

    pub fn set_write_protect(&self, state: bool) -> Result<(), MediaError> {
        write_lock!(self.flux).set_write_protect(state);
        Ok(())
    }

    /// Decode every track written since the last flush and store its sectors in the image.
    /// Sectors with a bad ID or data CRC are left as they were. Returns the number of sectors
    /// written.
    pub fn flush(&self) -> Result<usize, MediaError> {
        let mut flux = write_lock!(self.flux);
        let mut image = write_lock!(self.image);
        let mut written = 0;

        for (c, h) in flux.take_dirty() {
            let Some(track) = flux.track(c, h)
            else {
                continue;
            };
            for sector in decode_ibm_track(self.encoding, track) {
                let Some(data) = &sector.data
                else {
                    continue;
                };
                if !sector.id_crc_valid || !sector.data_crc_valid {
                    log::debug!("flush(): skipping damaged sector {} on c:{} h:{}", sector.id, c, h);
                    continue;
                }
                let id = sector.id;
                let result = image.write_sector(
                    DiskCh::new(c, h),
                    DiskChsnQuery::new(id.cylinder as u16, id.head, id.sector, id.size_code),
                    None,
                    data,
                    RwScope::DataOnly,
                    sector.deleted,
                    false,
                )?;
                if result.not_found {
                    log::warn!("flush(): sector {} on c:{} h:{} not present in image", id, c, h);
                    continue;
                }
                written += 1;
            }
        }
        log::debug!("flush(): wrote {} sectors", written);
        Ok(written)
    }
}
