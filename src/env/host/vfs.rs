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

//! Host file system rooted at a directory.
//!
//! Absolute storage paths like `/nvm0/SEQNO.txt` resolve below the root directory, so a simulator
//! keeps its mount points in a scratch directory.

use crate::api::device::{DeviceResult, File, FileSystem, OpenMode};
use std::fs::{self, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

pub struct HostFileSystem {
    root: PathBuf,
}

pub struct HostFile {
    file: fs::File,
}

impl HostFileSystem {
    pub fn new(root: &Path) -> Self {
        HostFileSystem {
            root: root.to_path_buf(),
        }
    }

    /// Creates the directory `path`, e.g. a mount point.
    pub fn create_dir(&self, path: &str) -> DeviceResult<()> {
        fs::create_dir_all(self.resolve(path))?;
        Ok(())
    }

    fn resolve(&self, path: &str) -> PathBuf {
        self.root.join(path.trim_start_matches('/'))
    }
}

impl FileSystem for HostFileSystem {
    type File = HostFile;

    fn open(&self, path: &str, mode: OpenMode) -> DeviceResult<HostFile> {
        let mut options = OpenOptions::new();
        match mode {
            OpenMode::Read => options.read(true),
            OpenMode::Write => options.read(true).write(true).create(true),
            OpenMode::Truncate => options.read(true).write(true).create(true).truncate(true),
        };
        let file = options.open(self.resolve(path))?;
        Ok(HostFile { file })
    }

    fn remove(&self, path: &str) -> DeviceResult<()> {
        fs::remove_file(self.resolve(path))?;
        Ok(())
    }

    fn rename(&self, from: &str, to: &str) -> DeviceResult<()> {
        fs::rename(self.resolve(from), self.resolve(to))?;
        Ok(())
    }

    fn is_dir(&self, path: &str) -> bool {
        self.resolve(path).is_dir()
    }
}

impl File for HostFile {
    fn read_at(&mut self, offset: usize, buf: &mut [u8]) -> DeviceResult<usize> {
        self.file.seek(SeekFrom::Start(offset as u64))?;
        let mut length = 0;
        while length < buf.len() {
            match self.file.read(&mut buf[length..])? {
                0 => break,
                count => length += count,
            }
        }
        Ok(length)
    }

    fn write_at(&mut self, offset: usize, data: &[u8]) -> DeviceResult<()> {
        self.file.seek(SeekFrom::Start(offset as u64))?;
        self.file.write_all(data)?;
        Ok(())
    }

    fn sync(&mut self) -> DeviceResult<()> {
        self.file.sync_all()?;
        Ok(())
    }
}
