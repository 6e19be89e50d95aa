// Copyright 2019-2023 Google LLC
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

//! Primitives consumed by the storage backends.
//!
//! Neither the flash driver nor the file system is part of this crate. Platforms implement
//! [`MtdDevice`] for their flash regions and [`FileSystem`] for their mounted file system.

/// Represents a possible device error.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DeviceError {
    /// Arguments are not correctly aligned.
    NotAligned,

    /// Arguments are out of bounds.
    OutOfBounds,

    /// The requested file does not exist.
    NotFound,

    /// Implementation-specific error.
    CustomError,
}

pub type DeviceResult<T> = Result<T, DeviceError>;

#[cfg(feature = "std")]
impl From<std::io::Error> for DeviceError {
    fn from(error: std::io::Error) -> Self {
        match error.kind() {
            std::io::ErrorKind::NotFound => DeviceError::NotFound,
            _ => DeviceError::CustomError,
        }
    }
}

/// Abstracts a memory technology device, typically one flash region.
///
/// The geometry is reported by the device and never cached by the backends.
pub trait MtdDevice {
    /// The size of a page in bytes.
    ///
    /// A page is the unit of reads and writes.
    fn page_size(&self) -> usize;

    /// The number of pages in a sector.
    ///
    /// A sector is the smallest unit of erasable flash.
    fn pages_per_sector(&self) -> usize;

    /// The number of sectors of the device.
    fn sector_count(&self) -> usize;

    /// Brings up the device.
    fn init(&mut self) -> DeviceResult<()>;

    /// Reads `buf.len()` bytes starting `offset` bytes after the start of `page`.
    ///
    /// The offset may exceed the page size, the read then continues on the following pages.
    fn read_page(&mut self, buf: &mut [u8], page: usize, offset: usize) -> DeviceResult<()>;

    /// Writes `data` starting `offset` bytes after the start of `page`, without erasing.
    ///
    /// The offset may exceed the page size, the write then continues on the following pages.
    fn write_page_raw(&mut self, data: &[u8], page: usize, offset: usize) -> DeviceResult<()>;

    /// Erases `count` sectors starting at `sector`.
    fn erase_sector(&mut self, sector: usize, count: usize) -> DeviceResult<()>;

    /// The size of a sector in bytes, `None` if it does not fit a `usize`.
    fn sector_size(&self) -> Option<usize> {
        self.page_size().checked_mul(self.pages_per_sector())
    }
}

impl<T: MtdDevice + ?Sized> MtdDevice for &mut T {
    fn page_size(&self) -> usize {
        (**self).page_size()
    }

    fn pages_per_sector(&self) -> usize {
        (**self).pages_per_sector()
    }

    fn sector_count(&self) -> usize {
        (**self).sector_count()
    }

    fn init(&mut self) -> DeviceResult<()> {
        (**self).init()
    }

    fn read_page(&mut self, buf: &mut [u8], page: usize, offset: usize) -> DeviceResult<()> {
        (**self).read_page(buf, page, offset)
    }

    fn write_page_raw(&mut self, data: &[u8], page: usize, offset: usize) -> DeviceResult<()> {
        (**self).write_page_raw(data, page, offset)
    }

    fn erase_sector(&mut self, sector: usize, count: usize) -> DeviceResult<()> {
        (**self).erase_sector(sector, count)
    }
}

/// How a file is opened.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum OpenMode {
    /// Opens an existing file for reading.
    Read,

    /// Opens a file for writing, creating it if missing and keeping its content.
    Write,

    /// Opens a file for writing, creating it if missing and discarding its content.
    Truncate,
}

/// An open file. Dropping it closes the file.
pub trait File {
    /// Reads at most `buf.len()` bytes at `offset`.
    ///
    /// Returns the number of bytes read, which is smaller than requested at the end of the file.
    fn read_at(&mut self, offset: usize, buf: &mut [u8]) -> DeviceResult<usize>;

    /// Writes all of `data` at `offset`.
    fn write_at(&mut self, offset: usize, data: &[u8]) -> DeviceResult<()>;

    /// Flushes written data to the medium.
    fn sync(&mut self) -> DeviceResult<()>;
}

/// Abstracts a mounted file system addressed by absolute paths.
pub trait FileSystem {
    type File: File;

    /// Opens the file at `path`.
    ///
    /// # Errors
    ///
    /// Returns [`DeviceError::NotFound`] when opening a missing file for reading.
    fn open(&self, path: &str, mode: OpenMode) -> DeviceResult<Self::File>;

    /// Removes the file at `path`.
    ///
    /// # Errors
    ///
    /// Returns [`DeviceError::NotFound`] if there is no such file.
    fn remove(&self, path: &str) -> DeviceResult<()>;

    /// Moves the file at `from` to `to`, replacing any file at `to`.
    ///
    /// The replacement is atomic: after a power loss, `to` holds either its previous content or
    /// the content of `from`.
    ///
    /// # Errors
    ///
    /// Returns [`DeviceError::NotFound`] if there is no file at `from`.
    fn rename(&self, from: &str, to: &str) -> DeviceResult<()>;

    /// Returns whether `path` is an existing directory.
    fn is_dir(&self, path: &str) -> bool;
}
