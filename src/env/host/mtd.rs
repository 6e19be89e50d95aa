// Copyright 2022-2023 Google LLC
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//      http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! File-backed flash device for host builds.
//!
//! [`FileMtd`] implements the [`MtdDevice`] interface but doesn't interface with an actual flash
//! device. Instead it uses a host-based file to persist the flash state.

use crate::api::device::{DeviceError, DeviceResult, MtdDevice};
use std::fs::{File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::Path;

/// Geometry of a file-backed flash device.
#[derive(Clone, Copy, Debug)]
pub struct FileMtdOptions {
    pub page_size: usize,
    pub pages_per_sector: usize,
    pub sector_count: usize,
}

impl FileMtdOptions {
    fn capacity(&self) -> usize {
        self.page_size * self.pages_per_sector * self.sector_count
    }
}

/// Simulates a flash device using a host-based file.
pub struct FileMtd {
    options: FileMtdOptions,

    /// All operations first seek to the needed position.
    backing_file: File,
}

impl FileMtd {
    /// Opens or creates the backing file at `path`.
    ///
    /// A new file is filled with erased bytes. An existing file must have the size described by
    /// `options`.
    pub fn new(path: &Path, options: FileMtdOptions) -> DeviceResult<FileMtd> {
        let mut backing_file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .open(path)?;
        let file_len = backing_file.metadata()?.len();
        let capacity = options.capacity();

        if file_len == 0 {
            backing_file.seek(SeekFrom::Start(0))?;
            let page = vec![0xffu8; options.page_size];
            for _ in 0..capacity / options.page_size {
                backing_file.write_all(&page)?;
            }
        } else if file_len != capacity as u64 {
            // Opening a file saved with a different geometry is not supported.
            return Err(DeviceError::CustomError);
        }
        Ok(FileMtd {
            options,
            backing_file,
        })
    }

    fn seek(&mut self, page: usize, offset: usize, length: usize) -> DeviceResult<()> {
        let start = page
            .checked_mul(self.options.page_size)
            .and_then(|start| start.checked_add(offset))
            .ok_or(DeviceError::OutOfBounds)?;
        match start.checked_add(length) {
            Some(end) if end <= self.options.capacity() => (),
            _ => return Err(DeviceError::OutOfBounds),
        }
        self.backing_file.seek(SeekFrom::Start(start as u64))?;
        Ok(())
    }
}

impl MtdDevice for FileMtd {
    fn page_size(&self) -> usize {
        self.options.page_size
    }

    fn pages_per_sector(&self) -> usize {
        self.options.pages_per_sector
    }

    fn sector_count(&self) -> usize {
        self.options.sector_count
    }

    fn init(&mut self) -> DeviceResult<()> {
        self.backing_file.metadata()?;
        Ok(())
    }

    fn read_page(&mut self, buf: &mut [u8], page: usize, offset: usize) -> DeviceResult<()> {
        self.seek(page, offset, buf.len())?;
        self.backing_file.read_exact(buf)?;
        Ok(())
    }

    fn write_page_raw(&mut self, data: &[u8], page: usize, offset: usize) -> DeviceResult<()> {
        self.seek(page, offset, data.len())?;
        self.backing_file.write_all(data)?;
        Ok(())
    }

    fn erase_sector(&mut self, sector: usize, count: usize) -> DeviceResult<()> {
        let sector_size = self.sector_size().ok_or(DeviceError::OutOfBounds)?;
        let first_page = sector
            .checked_mul(self.options.pages_per_sector)
            .ok_or(DeviceError::OutOfBounds)?;
        let length = count
            .checked_mul(sector_size)
            .ok_or(DeviceError::OutOfBounds)?;
        self.seek(first_page, 0, length)?;
        let erased = vec![0xffu8; sector_size];
        for _ in 0..count {
            self.backing_file.write_all(&erased)?;
        }
        Ok(())
    }
}
