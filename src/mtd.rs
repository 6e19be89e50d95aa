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

//! Flash region backend
//!
//! Images are staged into fixed-size flash regions. Regions are addressed as
//! `<prefix><index>`, e.g. `.mtd.0` for the first region with the default prefix.
//!
//! # Sequence number
//!
//! The sequence number is kept in memory and reset to 0 by [`init`](StorageDriver::init). It is
//! not persisted, so anti-rollback protection of this backend does not survive a reboot.
//! Platforms needing it should also register a backend persisting its sequence number, the
//! registry reports the highest number of all backends.

use crate::api::customization::Customization;
use crate::api::device::MtdDevice;
use crate::env::Env;
use crate::storage::{StorageDriver, StorageError, StorageResult};
use core::sync::atomic::{AtomicU32, Ordering};

/// Maximum number of digits of a region index.
const MAX_INDEX_DIGITS: usize = 5;

/// One flash area and how many of its bytes hold the staged image.
pub struct MtdRegion<D> {
    dev: Option<D>,
    occupied: usize,
}

impl<D: MtdDevice> MtdRegion<D> {
    pub fn new(dev: D) -> Self {
        MtdRegion {
            dev: Some(dev),
            occupied: 0,
        }
    }

    /// Creates a declared region without a device, which fails initialization.
    pub fn unconfigured() -> Self {
        MtdRegion {
            dev: None,
            occupied: 0,
        }
    }

    /// Returns the highest offset written since the last start or erase.
    pub fn occupied(&self) -> usize {
        self.occupied
    }

    pub fn device(&self) -> Option<&D> {
        self.dev.as_ref()
    }

    pub fn device_mut(&mut self) -> Option<&mut D> {
        self.dev.as_mut()
    }

    /// Returns the capacity in bytes, from the geometry reported by the device.
    pub fn capacity(&self) -> StorageResult<usize> {
        let dev = self.dev.as_ref().ok_or(StorageError::StorageFault)?;
        dev.sector_size()
            .and_then(|sector_size| sector_size.checked_mul(dev.sector_count()))
            .ok_or(StorageError::StorageFault)
    }

    /// Checks that `length` bytes at `offset` fit the region.
    fn check_range(&self, offset: usize, length: usize) -> StorageResult<usize> {
        let capacity = self.capacity()?;
        match offset.checked_add(length) {
            Some(end) if end <= capacity => Ok(end),
            _ => Err(StorageError::CapacityExceeded),
        }
    }

    fn dev_mut(&mut self) -> StorageResult<&mut D> {
        self.dev.as_mut().ok_or(StorageError::StorageFault)
    }
}

/// Resolves a region location to its index.
///
/// The location must be `prefix` followed by 1 to 5 decimal digits, forming an index smaller
/// than `region_count`. Longer digit runs like `.mtd.000001` are rejected rather than truncated
/// to their first 5 digits, so a location never aliases another region.
pub fn parse_location(prefix: &str, location: &str, region_count: usize) -> Option<usize> {
    let digits = location.strip_prefix(prefix)?;
    if digits.is_empty()
        || digits.len() > MAX_INDEX_DIGITS
        || !digits.bytes().all(|byte| byte.is_ascii_digit())
    {
        return None;
    }
    let index = digits.parse::<usize>().ok()?;
    (index < region_count).then_some(index)
}

/// Storage backend over a fixed list of flash regions.
pub struct MtdStorage<'r, E: Env, D> {
    env: E,
    regions: &'r mut [MtdRegion<D>],
    active_region: usize,
    sequence_no: AtomicU32,
}

impl<'r, E: Env, D: MtdDevice> MtdStorage<'r, E, D> {
    /// Creates the backend. The first region is active.
    pub fn new(env: E, regions: &'r mut [MtdRegion<D>]) -> Self {
        MtdStorage {
            env,
            regions,
            active_region: 0,
            sequence_no: AtomicU32::new(0),
        }
    }

    pub fn regions(&self) -> &[MtdRegion<D>] {
        self.regions
    }

    pub fn active_region(&self) -> usize {
        self.active_region
    }

    fn active(&mut self) -> StorageResult<&mut MtdRegion<D>> {
        self.regions
            .get_mut(self.active_region)
            .ok_or(StorageError::StorageFault)
    }

    fn resolve(&self, location: &str) -> Option<usize> {
        let prefix = self.env.customization().mtd_location_prefix();
        parse_location(prefix, location, self.regions.len())
    }
}

impl<'r, E: Env, D: MtdDevice> StorageDriver for MtdStorage<'r, E, D> {
    fn init(&mut self) -> StorageResult<()> {
        self.sequence_no.store(0, Ordering::Release);
        for (index, region) in self.regions.iter_mut().enumerate() {
            let dev = match region.dev.as_mut() {
                Some(dev) => dev,
                None => {
                    debug_storage!(self.env, "Flash region {} has no device", index);
                    return Err(StorageError::StorageFault);
                }
            };
            if let Err(error) = dev.init() {
                debug_storage!(self.env, "Flash region {} failed init: {:?}", index, error);
                return Err(StorageError::StorageFault);
            }
        }
        Ok(())
    }

    fn start(&mut self, len: usize) -> StorageResult<()> {
        let region = self.active()?;
        if len > region.capacity()? {
            return Err(StorageError::CapacityExceeded);
        }
        region.occupied = 0;
        Ok(())
    }

    fn write(&mut self, buf: &[u8], offset: usize) -> StorageResult<()> {
        let region = self.active()?;
        let end = region.check_range(offset, buf.len())?;
        region.dev_mut()?.write_page_raw(buf, 0, offset)?;
        // Chunks may arrive out of order, so only the highest written offset counts.
        region.occupied = region.occupied.max(end);
        Ok(())
    }

    fn finish(&mut self) -> StorageResult<()> {
        Ok(())
    }

    fn read(&mut self, buf: &mut [u8], offset: usize) -> StorageResult<()> {
        let region = self.active()?;
        region.check_range(offset, buf.len())?;
        region.dev_mut()?.read_page(buf, 0, offset)?;
        Ok(())
    }

    fn install(&mut self) -> StorageResult<()> {
        Ok(())
    }

    fn erase(&mut self) -> StorageResult<()> {
        let index = self.active_region;
        let region = self.active()?;
        if region.occupied == 0 {
            return Ok(());
        }
        let dev = region.dev.as_mut().ok_or(StorageError::StorageFault)?;
        let sector_size = match dev.sector_size() {
            Some(sector_size) if sector_size > 0 => sector_size,
            _ => return Err(StorageError::StorageFault),
        };
        // Round up, erasing less would mix old and new image bytes.
        let sectors = (region.occupied - 1) / sector_size + 1;
        let result = dev.erase_sector(0, sectors);
        if result.is_ok() {
            region.occupied = 0;
        }
        debug_storage!(
            self.env,
            "Erased {} sectors of flash region {}: {:?}",
            sectors,
            index,
            result
        );
        Ok(result?)
    }

    fn has_location(&self, location: &str) -> bool {
        self.resolve(location).is_some()
    }

    fn set_active_location(&mut self, location: &str) -> StorageResult<()> {
        self.active_region = self
            .resolve(location)
            .ok_or(StorageError::LocationNotFound)?;
        Ok(())
    }

    fn get_seq_no(&self) -> StorageResult<u32> {
        let seq_no = self.sequence_no.load(Ordering::Acquire);
        debug_storage!(self.env, "Retrieved sequence number: {}", seq_no);
        Ok(seq_no)
    }

    fn set_seq_no(&mut self, seq_no: u32) -> StorageResult<()> {
        let stored = self
            .sequence_no
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |current| {
                (current < seq_no).then_some(seq_no)
            });
        match stored {
            Ok(_) => {
                debug_storage!(self.env, "Stored sequence number: {}", seq_no);
                Ok(())
            }
            Err(current) => {
                debug_storage!(
                    self.env,
                    "Rejected sequence number {}, current is {}",
                    seq_no,
                    current
                );
                Err(StorageError::SequenceRollback)
            }
        }
    }

    fn separator(&self) -> char {
        self.env.customization().mtd_location_separator()
    }
}
