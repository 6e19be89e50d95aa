//! APIs for the environment.
//!
//! The storage backends sit on top of collaborators they do not implement: a block device, a file
//! system and the manifest engine that names components. Each collaborator has an API described by
//! a trait. This module gathers those APIs and the build-time customization.

pub mod component;
pub mod customization;
pub mod device;
