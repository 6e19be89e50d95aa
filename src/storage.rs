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

//! Storage capability table and handle.

use crate::api::device::DeviceError;
use crate::hook::{
    Hook, HookChain, HookError, HookRemoval, HookStage, InstallInfo, InterruptControl,
};

/// Represents a possible storage error.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum StorageError {
    /// Backend-level failure.
    ///
    /// The device is absent or failed, the location is not configured, or persisted state is
    /// unreadable.
    StorageFault,

    /// The requested range exceeds the capacity of the active region or file.
    CapacityExceeded,

    /// The sequence number is not strictly greater than the stored one.
    SequenceRollback,

    /// No storage knows the requested location.
    LocationNotFound,
}

pub type StorageResult<T> = Result<T, StorageError>;

impl From<DeviceError> for StorageError {
    fn from(_: DeviceError) -> Self {
        StorageError::StorageFault
    }
}

/// Operations every storage backend implements.
///
/// All operations except [`init`](StorageDriver::init) and the location lookups act on the
/// active location, see [`set_active_location`](StorageDriver::set_active_location).
pub trait StorageDriver {
    /// Brings up every region or file system owned by the backend.
    ///
    /// Called once at system start.
    fn init(&mut self) -> StorageResult<()>;

    /// Prepares the active location for a fresh image of `len` bytes.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::CapacityExceeded`] if `len` exceeds the capacity.
    fn start(&mut self, len: usize) -> StorageResult<()>;

    /// Writes `buf` at `offset` of the active location.
    ///
    /// Offsets need not be sequential.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::CapacityExceeded`] if the write ends after the capacity.
    fn write(&mut self, buf: &[u8], offset: usize) -> StorageResult<()>;

    /// Marks the write sequence complete.
    fn finish(&mut self) -> StorageResult<()>;

    /// Fills `buf` from `offset` of the active location.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::CapacityExceeded`] if the read ends after the capacity.
    fn read(&mut self, buf: &mut [u8], offset: usize) -> StorageResult<()>;

    /// Finalizes the staged image as the active firmware.
    fn install(&mut self) -> StorageResult<()>;

    /// Reclaims the active location.
    fn erase(&mut self) -> StorageResult<()>;

    /// Returns whether `location` addresses this backend.
    ///
    /// This has no side effect.
    fn has_location(&self, location: &str) -> bool;

    /// Makes `location` the active location.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::LocationNotFound`] if the location doesn't address this backend.
    fn set_active_location(&mut self, location: &str) -> StorageResult<()>;

    /// Returns the highest accepted sequence number.
    fn get_seq_no(&self) -> StorageResult<u32>;

    /// Stores `seq_no` as the highest accepted sequence number.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::SequenceRollback`] if `seq_no` is not strictly greater than the
    /// stored value, which is then left unchanged.
    fn set_seq_no(&mut self, seq_no: u32) -> StorageResult<()>;

    /// Separator used to render component names in this backend's location syntax.
    fn separator(&self) -> char;
}

/// Storage backend together with its install hooks.
///
/// A `&mut Storage<'h, B>` coerces to `&mut Storage<'h, dyn StorageDriver>` for any backend `B`,
/// which is how backends are registered.
pub struct Storage<'h, D: ?Sized> {
    pre: HookChain<'h>,
    post: HookChain<'h>,
    driver: D,
}

impl<'h, D: StorageDriver> Storage<'h, D> {
    pub fn new(driver: D) -> Self {
        Storage {
            pre: HookChain::new(),
            post: HookChain::new(),
            driver,
        }
    }

    /// Creates a storage whose hook chains are mutated with interrupts disabled.
    pub fn with_interrupt_control(driver: D, irq: &'static dyn InterruptControl) -> Self {
        Storage {
            pre: HookChain::with_interrupt_control(irq),
            post: HookChain::with_interrupt_control(irq),
            driver,
        }
    }

    pub fn into_driver(self) -> D {
        self.driver
    }
}

impl<'h, D: StorageDriver + ?Sized> Storage<'h, D> {
    pub fn driver(&self) -> &D {
        &self.driver
    }

    pub fn driver_mut(&mut self) -> &mut D {
        &mut self.driver
    }

    pub fn init(&mut self) -> StorageResult<()> {
        self.driver.init()
    }

    pub fn start(&mut self, len: usize) -> StorageResult<()> {
        self.driver.start(len)
    }

    pub fn write(&mut self, buf: &[u8], offset: usize) -> StorageResult<()> {
        self.driver.write(buf, offset)
    }

    pub fn finish(&mut self) -> StorageResult<()> {
        self.driver.finish()
    }

    pub fn read(&mut self, buf: &mut [u8], offset: usize) -> StorageResult<()> {
        self.driver.read(buf, offset)
    }

    pub fn install(&mut self) -> StorageResult<()> {
        self.driver.install()
    }

    pub fn erase(&mut self) -> StorageResult<()> {
        self.driver.erase()
    }

    pub fn has_location(&self, location: &str) -> bool {
        self.driver.has_location(location)
    }

    pub fn set_active_location(&mut self, location: &str) -> StorageResult<()> {
        self.driver.set_active_location(location)
    }

    pub fn get_seq_no(&self) -> StorageResult<u32> {
        self.driver.get_seq_no()
    }

    pub fn set_seq_no(&mut self, seq_no: u32) -> StorageResult<()> {
        self.driver.set_seq_no(seq_no)
    }

    pub fn separator(&self) -> char {
        self.driver.separator()
    }

    pub fn pre_hooks(&self) -> &HookChain<'h> {
        &self.pre
    }

    pub fn post_hooks(&self) -> &HookChain<'h> {
        &self.post
    }

    pub fn add_pre_hook(&self, hook: &'h Hook<'h>) -> Result<(), HookError> {
        self.pre.add(hook)
    }

    pub fn add_post_hook(&self, hook: &'h Hook<'h>) -> Result<(), HookError> {
        self.post.add(hook)
    }

    pub fn remove_pre_hook(&self, hook: &'h Hook<'h>) -> HookRemoval {
        self.pre.remove(hook)
    }

    pub fn remove_post_hook(&self, hook: &'h Hook<'h>) -> HookRemoval {
        self.post.remove(hook)
    }

    /// Installs the staged image as generation `seq_no`.
    ///
    /// The steps are:
    /// - Run the pre-install hooks. The first failure aborts the commit.
    /// - Store the sequence number. A rollback aborts the commit.
    /// - Install.
    /// - Run all post-install hooks. The first failure is returned.
    ///
    /// The caller verifies the image before committing.
    pub fn commit(&mut self, seq_no: u32) -> StorageResult<()> {
        self.pre.run(&InstallInfo {
            stage: HookStage::PreInstall,
            seq_no,
        })?;
        self.driver.set_seq_no(seq_no)?;
        self.driver.install()?;
        self.post.run_all(&InstallInfo {
            stage: HookStage::PostInstall,
            seq_no,
        })
    }
}
