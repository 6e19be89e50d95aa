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

//! Registry of all storage backends
//!
//! The platform builds the registry once at startup from every backend it carries. Backends are
//! consulted in registration order and none can be added or removed afterwards.

use crate::api::component::{render_name, ComponentName, TextBuffer, MAX_COMPONENT_NAME_LEN};
use crate::storage::{Storage, StorageDriver, StorageError, StorageResult};

/// Maximum number of registered backends.
pub const MAX_STORAGES: usize = 64;

/// Storage handle as held by the registry.
pub type DynStorage<'s, 'h> = Storage<'h, dyn StorageDriver + 's>;

/// Outcome of an operation applied to every backend.
///
/// Every backend is attempted regardless of earlier failures.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct BulkReport {
    attempted: usize,
    /// Bit `i` is set if backend `i` failed.
    failed: u64,
    first_error: Option<StorageError>,
}

impl BulkReport {
    fn new() -> Self {
        BulkReport {
            attempted: 0,
            failed: 0,
            first_error: None,
        }
    }

    fn record(&mut self, index: usize, result: StorageResult<()>) {
        self.attempted += 1;
        if let Err(error) = result {
            self.failed |= 1 << index;
            self.first_error.get_or_insert(error);
        }
    }

    /// Returns whether every backend succeeded.
    pub fn is_ok(&self) -> bool {
        self.failed == 0
    }

    /// Returns the number of backends attempted.
    pub fn attempted(&self) -> usize {
        self.attempted
    }

    /// Returns whether backend `index` failed.
    pub fn failed(&self, index: usize) -> bool {
        index < MAX_STORAGES && self.failed & (1 << index) != 0
    }

    /// Iterates over the indices of the failed backends.
    pub fn failures(&self) -> impl Iterator<Item = usize> + '_ {
        (0..self.attempted).filter(move |&index| self.failed(index))
    }

    pub fn failure_count(&self) -> usize {
        self.failed.count_ones() as usize
    }

    /// Returns the error of the first failed backend.
    pub fn first_error(&self) -> Option<StorageError> {
        self.first_error
    }

    /// Converts the report to the error of the first failed backend, if any.
    pub fn into_result(self) -> StorageResult<()> {
        match self.first_error {
            None => Ok(()),
            Some(error) => Err(error),
        }
    }
}

/// Ordered table of storage backends.
pub struct Registry<'r, 's, 'h> {
    storages: &'r mut [&'s mut DynStorage<'s, 'h>],
}

impl<'r, 's, 'h> Registry<'r, 's, 'h> {
    /// Creates the registry over `storages`, in lookup order.
    ///
    /// # Panics
    ///
    /// Panics if more than [`MAX_STORAGES`] backends are given.
    pub fn new(storages: &'r mut [&'s mut DynStorage<'s, 'h>]) -> Self {
        assert!(storages.len() <= MAX_STORAGES);
        Registry { storages }
    }

    pub fn len(&self) -> usize {
        self.storages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.storages.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &DynStorage<'s, 'h>> + '_ {
        self.storages.iter().map(|storage| &**storage)
    }

    pub fn get_mut(&mut self, index: usize) -> Option<&mut DynStorage<'s, 'h>> {
        Some(&mut **self.storages.get_mut(index)?)
    }

    /// Returns the first backend knowing `location`.
    pub fn find_by_id(&mut self, location: &str) -> Option<&mut DynStorage<'s, 'h>> {
        let index = self.position(location)?;
        self.get_mut(index)
    }

    /// Returns the first backend knowing the location named by `component`.
    ///
    /// The component name is rendered with the separator of each backend in turn. Backends for
    /// which the name can't be rendered are skipped.
    pub fn find_by_component(
        &mut self,
        component: &(impl ComponentName + ?Sized),
    ) -> Option<&mut DynStorage<'s, 'h>> {
        let mut buffer = TextBuffer::<MAX_COMPONENT_NAME_LEN>::new();
        let index = self.storages.iter().position(|storage| {
            match render_name(component, storage.separator(), &mut buffer) {
                Some(location) => storage.has_location(location),
                None => false,
            }
        })?;
        self.get_mut(index)
    }

    /// Like [`find_by_id`](Self::find_by_id), also making `location` active.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::LocationNotFound`] if no backend knows `location`.
    pub fn select(&mut self, location: &str) -> StorageResult<&mut DynStorage<'s, 'h>> {
        let storage = self
            .find_by_id(location)
            .ok_or(StorageError::LocationNotFound)?;
        storage.set_active_location(location)?;
        Ok(storage)
    }

    /// Initializes every backend.
    pub fn init_all(&mut self) -> BulkReport {
        let mut report = BulkReport::new();
        for (index, storage) in self.storages.iter_mut().enumerate() {
            report.record(index, storage.init());
        }
        report
    }

    /// Returns the highest sequence number of all backends.
    ///
    /// Backends failing to report a number are ignored.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::StorageFault`] if no backend reported a number.
    pub fn get_highest_seq_no(&self) -> StorageResult<u32> {
        self.storages
            .iter()
            .filter_map(|storage| storage.get_seq_no().ok())
            .max()
            .ok_or(StorageError::StorageFault)
    }

    /// Checks that `seq_no` is newer than every sequence number known.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::SequenceRollback`] if it's not, and the error of
    /// [`get_highest_seq_no`](Self::get_highest_seq_no) if there is no sequence number.
    pub fn check_seq_no(&self, seq_no: u32) -> StorageResult<()> {
        if seq_no <= self.get_highest_seq_no()? {
            return Err(StorageError::SequenceRollback);
        }
        Ok(())
    }

    /// Stores `seq_no` in every backend.
    ///
    /// Backends rejecting it, e.g. because they already hold a higher number, don't stop the
    /// others.
    pub fn set_seq_no_all(&mut self, seq_no: u32) -> BulkReport {
        let mut report = BulkReport::new();
        for (index, storage) in self.storages.iter_mut().enumerate() {
            report.record(index, storage.set_seq_no(seq_no));
        }
        report
    }

    fn position(&self, location: &str) -> Option<usize> {
        self.storages
            .iter()
            .position(|storage| storage.has_location(location))
    }
}
