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

//! Environment and collaborators for tests.
//!
//! Nothing here touches real hardware or the host file system.

use crate::api::customization::{CustomizationImpl, DEFAULT_CUSTOMIZATION};
use crate::env::Env;


#[derive(Clone)]
pub struct TestEnv {
    customization: CustomizationImpl,
}

pub struct TestWrite;

impl core::fmt::Write for TestWrite {
    fn write_str(&mut self, _: &str) -> core::fmt::Result {
        Ok(())
    }
}

impl TestEnv {
    pub fn new() -> Self {
        TestEnv {
            customization: DEFAULT_CUSTOMIZATION,
        }
    }

    pub fn customization_mut(&mut self) -> &mut CustomizationImpl {
        &mut self.customization
    }
}

impl Default for TestEnv {
    fn default() -> Self {
        Self::new()
    }
}

impl Env for TestEnv {
    type Write = TestWrite;
    type Customization = CustomizationImpl;

    fn write(&self) -> Self::Write {
        TestWrite
    }

    fn customization(&self) -> &Self::Customization {
        &self.customization
    }
}
