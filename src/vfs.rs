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

//! File system backend
//!
//! Images are staged into a fixed list of files, addressed by their exact path. The sequence
//! number is persisted as decimal text in its own file, so it survives reboots. It is replaced
//! through a scratch file, so an interrupted update keeps the previous value.

use crate::api::component::TextBuffer;
use crate::api::customization::Customization;
use crate::api::device::{DeviceError, File, FileSystem, OpenMode};
use crate::env::Env;
use crate::storage::{StorageDriver, StorageError, StorageResult};
use core::fmt::Write;

/// Maximum number of digits of a persisted sequence number.
const MAX_SEQ_NO_DIGITS: usize = 10;

/// Size of the buffer holding the sequence number file.
///
/// Longer files are invalid.
const SEQ_NO_FILE_LEN: usize = 16;

/// Parses the content of the sequence number file.
///
/// Surrounding whitespace is ignored. Anything else than 1 to 10 decimal digits fitting 32 bits
/// is invalid.
fn parse_seq_no(content: &[u8]) -> Option<u32> {
    let text = core::str::from_utf8(content).ok()?.trim();
    if text.is_empty()
        || text.len() > MAX_SEQ_NO_DIGITS
        || !text.bytes().all(|byte| byte.is_ascii_digit())
    {
        return None;
    }
    text.parse().ok()
}

/// Storage backend over a fixed list of files.
pub struct VfsStorage<'f, E: Env, F: FileSystem> {
    env: E,
    fs: F,
    files: &'f [&'f str],
    active_file: usize,

    /// File opened by the last start, until finished or erased.
    staged: Option<F::File>,
}

impl<'f, E: Env, F: FileSystem> VfsStorage<'f, E, F> {
    /// Creates the backend. The first file is active.
    pub fn new(env: E, fs: F, files: &'f [&'f str]) -> Self {
        VfsStorage {
            env,
            fs,
            files,
            active_file: 0,
            staged: None,
        }
    }

    pub fn files(&self) -> &'f [&'f str] {
        self.files
    }

    pub fn active_file(&self) -> usize {
        self.active_file
    }

    pub fn file_system(&self) -> &F {
        &self.fs
    }

    fn active_path(&self) -> StorageResult<&'f str> {
        self.files
            .get(self.active_file)
            .copied()
            .ok_or(StorageError::StorageFault)
    }

    fn check_range(&self, offset: usize, length: usize) -> StorageResult<()> {
        match offset.checked_add(length) {
            Some(end) if end <= self.env.customization().vfs_max_file_size() => Ok(()),
            _ => Err(StorageError::CapacityExceeded),
        }
    }

    /// Reads the persisted sequence number, `None` if it was never stored.
    fn load_seq_no(&self) -> StorageResult<Option<u32>> {
        let path = self.env.customization().vfs_seq_no_location();
        let mut file = match self.fs.open(path, OpenMode::Read) {
            Ok(file) => file,
            Err(DeviceError::NotFound) => return Ok(None),
            Err(error) => {
                debug_storage!(self.env, "Failed to open {}: {:?}", path, error);
                return Err(StorageError::StorageFault);
            }
        };
        let mut content = [0; SEQ_NO_FILE_LEN];
        let length = file.read_at(0, &mut content)?;
        let seq_no = match length {
            SEQ_NO_FILE_LEN => None,
            _ => parse_seq_no(&content[..length]),
        };
        match seq_no {
            Some(seq_no) => Ok(Some(seq_no)),
            None => {
                debug_storage!(self.env, "Invalid sequence number in {}", path);
                Err(StorageError::StorageFault)
            }
        }
    }
}

impl<'f, E: Env, F: FileSystem> StorageDriver for VfsStorage<'f, E, F> {
    fn init(&mut self) -> StorageResult<()> {
        let mount_point = self.env.customization().vfs_mount_point();
        if !self.fs.is_dir(mount_point) {
            debug_storage!(self.env, "Mount point {} is missing", mount_point);
            return Err(StorageError::StorageFault);
        }
        Ok(())
    }

    fn start(&mut self, len: usize) -> StorageResult<()> {
        let path = self.active_path()?;
        self.check_range(0, len)?;
        self.staged = None;
        match self.fs.open(path, OpenMode::Truncate) {
            Ok(file) => {
                self.staged = Some(file);
                Ok(())
            }
            Err(error) => {
                debug_storage!(self.env, "Failed to open {}: {:?}", path, error);
                Err(StorageError::StorageFault)
            }
        }
    }

    fn write(&mut self, buf: &[u8], offset: usize) -> StorageResult<()> {
        self.check_range(offset, buf.len())?;
        let file = self.staged.as_mut().ok_or(StorageError::StorageFault)?;
        file.write_at(offset, buf)?;
        Ok(())
    }

    fn finish(&mut self) -> StorageResult<()> {
        let mut file = self.staged.take().ok_or(StorageError::StorageFault)?;
        file.sync()?;
        Ok(())
    }

    fn read(&mut self, buf: &mut [u8], offset: usize) -> StorageResult<()> {
        let path = self.active_path()?;
        self.check_range(offset, buf.len())?;
        let mut file = self.fs.open(path, OpenMode::Read)?;
        if file.read_at(offset, buf)? != buf.len() {
            return Err(StorageError::StorageFault);
        }
        Ok(())
    }

    fn install(&mut self) -> StorageResult<()> {
        Ok(())
    }

    fn erase(&mut self) -> StorageResult<()> {
        let path = self.active_path()?;
        self.staged = None;
        match self.fs.remove(path) {
            Ok(()) | Err(DeviceError::NotFound) => Ok(()),
            Err(error) => {
                debug_storage!(self.env, "Failed to remove {}: {:?}", path, error);
                Err(StorageError::StorageFault)
            }
        }
    }

    fn has_location(&self, location: &str) -> bool {
        self.files.iter().any(|file| *file == location)
    }

    fn set_active_location(&mut self, location: &str) -> StorageResult<()> {
        self.active_file = self
            .files
            .iter()
            .position(|file| *file == location)
            .ok_or(StorageError::LocationNotFound)?;
        Ok(())
    }

    fn get_seq_no(&self) -> StorageResult<u32> {
        let seq_no = self.load_seq_no()?.ok_or(StorageError::StorageFault)?;
        debug_storage!(self.env, "Retrieved sequence number: {}", seq_no);
        Ok(seq_no)
    }

    fn set_seq_no(&mut self, seq_no: u32) -> StorageResult<()> {
        if let Some(current) = self.load_seq_no()? {
            if seq_no <= current {
                debug_storage!(
                    self.env,
                    "Rejected sequence number {}, current is {}",
                    seq_no,
                    current
                );
                return Err(StorageError::SequenceRollback);
            }
        }
        let mut text = TextBuffer::<SEQ_NO_FILE_LEN>::new();
        writeln!(text, "{}", seq_no).map_err(|_| StorageError::StorageFault)?;
        let path = self.env.customization().vfs_seq_no_location();
        let scratch = self.env.customization().vfs_seq_no_scratch_location();
        // The stored value is only replaced once the new one is fully on the medium.
        let written = self.fs.open(scratch, OpenMode::Truncate).and_then(|mut file| {
            file.write_at(0, text.as_bytes())?;
            file.sync()
        });
        if let Err(error) = written.and_then(|()| self.fs.rename(scratch, path)) {
            debug_storage!(self.env, "Failed to store sequence number: {:?}", error);
            return Err(StorageError::StorageFault);
        }
        debug_storage!(self.env, "Stored sequence number: {}", seq_no);
        Ok(())
    }

    fn separator(&self) -> char {
        self.env.customization().vfs_location_separator()
    }
}
