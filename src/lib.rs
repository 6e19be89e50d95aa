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

// The documentation is easier to read from a browser:
// - Run: cargo doc --document-private-items --features=std
// - Open: target/doc/suit_storage/index.html

//! Storage layer for staging SUIT firmware updates
//!
//! A firmware image arrives in chunks and is persisted to one of several backing stores. Each
//! store implements the same [capability table](StorageDriver) and is wrapped in a
//! [`Storage`] handle that carries its pre-install and post-install [hook chains](HookChain).
//! All handles are collected once into a [`Registry`], which resolves a store from a location
//! string or a manifest component and aggregates the anti-rollback sequence numbers.
//!
//! # Backends
//!
//! -   [`MtdStorage`] stages images into fixed-size flash regions addressed as `.mtd.<index>`.
//! -   [`VfsStorage`] stages images into a fixed set of files addressed by their path.
//!
//! The underlying block device and file system are collaborators described by
//! [`MtdDevice`](api::device::MtdDevice) and [`FileSystem`](api::device::FileSystem). The
//! [`env::test`] module provides RAM-backed versions of both for tests, the [`env::host`]
//! module file-backed versions for host builds.
//!
//! # Update sequence
//!
//! The manifest engine resolves a storage, then calls [`Storage::start`], a number of
//! [`Storage::write`], [`Storage::finish`] and finally [`Storage::commit`]. Committing runs the
//! pre-install hooks, stores the sequence number (which must strictly increase), installs and
//! runs the post-install hooks. On failure the caller may [`Storage::erase`] the partial image.
//!
//! There is no internal locking around this sequence: at most one update is in flight and it is
//! driven by a single caller. Only hook chains may be mutated concurrently, from contexts that
//! can be interrupted.

#![cfg_attr(not(any(test, feature = "std")), no_std)]

// Those macros should eventually be split into trace, debug, info, warn, and error macros when
// adding either the defmt or log feature and crate dependency.
#[cfg(feature = "debug_storage")]
macro_rules! debug_storage {
    ($env: expr, $($rest:tt)*) => {{
        use core::fmt::Write;
        let _ = writeln!($env.write(), $($rest)*);
    }};
}
#[cfg(not(feature = "debug_storage"))]
macro_rules! debug_storage {
    ($env: expr, $fmt: literal $(, $arg: expr)* $(,)?) => {
        // To avoid unused variable warnings.
        let _ = &$env;
        $(let _ = &$arg;)*
    };
}

pub mod api;
pub mod env;
pub mod hook;
pub mod mtd;
pub mod registry;
pub mod storage;
pub mod vfs;

pub use self::hook::{Hook, HookChain, HookError, HookRemoval, HookStage, InstallInfo};
pub use self::mtd::{MtdRegion, MtdStorage};
pub use self::registry::{BulkReport, DynStorage, Registry, MAX_STORAGES};
pub use self::storage::{Storage, StorageDriver, StorageError, StorageResult};
pub use self::vfs::VfsStorage;
