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

use crate::api::customization::Customization;

#[cfg(feature = "std")]
pub mod host;
#[cfg(any(test, feature = "std"))]
pub mod test;

/// Describes what the storage backends need from the platform.
pub trait Env {
    type Write: core::fmt::Write;
    type Customization: Customization;

    /// Creates a write instance for debugging.
    ///
    /// This API doesn't return a reference such that drop may flush. Embedded environments route
    /// it to their console, host environments to the standard error.
    fn write(&self) -> Self::Write;

    fn customization(&self) -> &Self::Customization;
}
