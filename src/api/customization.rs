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

//! This file contains all customizable constants.
//!
//! If you adapt them, make sure to run the tests before flashing the firmware.

pub trait Customization {
    // ###########################################################################
    // Location grammar of the flash region backend.
    // ###########################################################################

    /// Prefix of every flash region location, followed by the decimal region index.
    ///
    /// # Invariant
    ///
    /// - The prefix must start and end with `mtd_location_separator()`.
    /// - The prefix must contain at least one character besides the separators.
    ///
    /// With the default `.mtd.`, the first region is addressed as `.mtd.0`.
    fn mtd_location_prefix(&self) -> &str;

    /// Separator used to render component names for the flash region backend.
    ///
    /// # Invariant
    ///
    /// - The separator must not be a decimal digit or the NUL character.
    fn mtd_location_separator(&self) -> char;

    // ###########################################################################
    // File system backend.
    // ###########################################################################

    /// Directory under which staged files and the sequence number live.
    ///
    /// # Invariant
    ///
    /// - The mount point must be an absolute path.
    fn vfs_mount_point(&self) -> &str;

    /// File holding the sequence number as decimal text.
    ///
    /// # Invariant
    ///
    /// - The file must be located under `vfs_mount_point()`.
    fn vfs_seq_no_location(&self) -> &str;

    /// Scratch file the new sequence number is written to before replacing the stored one.
    ///
    /// # Invariant
    ///
    /// - The file must be located under `vfs_mount_point()`.
    /// - The file must differ from `vfs_seq_no_location()`.
    ///
    /// The file system must rename files atomically within the mount point, so an interrupted
    /// update leaves the previous sequence number in place.
    fn vfs_seq_no_scratch_location(&self) -> &str;

    /// Separator used to render component names for the file system backend.
    ///
    /// # Invariant
    ///
    /// - The separator must not be the NUL character.
    fn vfs_location_separator(&self) -> char;

    /// Capacity in bytes of each staged file.
    ///
    /// # Invariant
    ///
    /// - The capacity must be positive.
    ///
    /// File systems usually grow files on demand. Set this to the space reserved for an image so
    /// that oversized payloads are rejected before writing starts.
    fn vfs_max_file_size(&self) -> usize;
}

#[derive(Clone)]
pub struct CustomizationImpl {
    pub mtd_location_prefix: &'static str,
    pub mtd_location_separator: char,
    pub vfs_mount_point: &'static str,
    pub vfs_seq_no_location: &'static str,
    pub vfs_seq_no_scratch_location: &'static str,
    pub vfs_location_separator: char,
    pub vfs_max_file_size: usize,
}

pub const DEFAULT_CUSTOMIZATION: CustomizationImpl = CustomizationImpl {
    mtd_location_prefix: ".mtd.",
    mtd_location_separator: '.',
    vfs_mount_point: "/nvm0",
    vfs_seq_no_location: "/nvm0/SEQNO.txt",
    vfs_seq_no_scratch_location: "/nvm0/SEQNO.tmp",
    vfs_location_separator: '/',
    vfs_max_file_size: usize::MAX,
};

impl Customization for CustomizationImpl {
    fn mtd_location_prefix(&self) -> &str {
        self.mtd_location_prefix
    }

    fn mtd_location_separator(&self) -> char {
        self.mtd_location_separator
    }

    fn vfs_mount_point(&self) -> &str {
        self.vfs_mount_point
    }

    fn vfs_seq_no_location(&self) -> &str {
        self.vfs_seq_no_location
    }

    fn vfs_seq_no_scratch_location(&self) -> &str {
        self.vfs_seq_no_scratch_location
    }

    fn vfs_location_separator(&self) -> char {
        self.vfs_location_separator
    }

    fn vfs_max_file_size(&self) -> usize {
        self.vfs_max_file_size
    }
}

pub fn is_valid(customization: &impl Customization) -> bool {
    let separator = customization.mtd_location_separator();
    if separator.is_ascii_digit() || separator == '\0' {
        return false;
    }

    // The prefix is framed by separators and names something in between.
    let prefix = customization.mtd_location_prefix();
    if !prefix.starts_with(separator)
        || !prefix.ends_with(separator)
        || prefix.chars().count() < 3
    {
        return false;
    }

    if customization.vfs_location_separator() == '\0' {
        return false;
    }

    let mount_point = customization.vfs_mount_point();
    if !mount_point.starts_with('/') {
        return false;
    }

    // The sequence number files live under the mount point.
    let seq_no_location = customization.vfs_seq_no_location();
    let scratch_location = customization.vfs_seq_no_scratch_location();
    if !is_below(seq_no_location, mount_point)
        || !is_below(scratch_location, mount_point)
        || seq_no_location == scratch_location
    {
        return false;
    }

    customization.vfs_max_file_size() > 0
}

fn is_below(path: &str, dir: &str) -> bool {
    match path.strip_prefix(dir) {
        Some(file) => file.len() > 1 && file.starts_with('/'),
        None => false,
    }
}
