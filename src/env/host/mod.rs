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

//! Environment for running the storage layer on a host, e.g. in a simulator.

use crate::api::customization::{CustomizationImpl, DEFAULT_CUSTOMIZATION};
use crate::env::Env;
use std::io::Write;

pub mod mtd;
pub mod vfs;

pub struct HostEnv {
    customization: CustomizationImpl,
}

/// Debug output to the standard error.
pub struct HostWrite;

impl core::fmt::Write for HostWrite {
    fn write_str(&mut self, s: &str) -> core::fmt::Result {
        std::io::stderr()
            .write_all(s.as_bytes())
            .map_err(|_| core::fmt::Error)
    }
}

impl HostEnv {
    pub fn new() -> Self {
        HostEnv::with_customization(DEFAULT_CUSTOMIZATION)
    }

    pub fn with_customization(customization: CustomizationImpl) -> Self {
        HostEnv { customization }
    }
}

impl Default for HostEnv {
    fn default() -> Self {
        Self::new()
    }
}

impl Env for HostEnv {
    type Write = HostWrite;
    type Customization = CustomizationImpl;

    fn write(&self) -> Self::Write {
        HostWrite
    }

    fn customization(&self) -> &Self::Customization {
        &self.customization
    }
}
