//! Shared test utilities for mesh firmware distribution.
//!
//! - [`mod@must`] - Unwrap helpers with good error messages and `#[track_caller]`
//! - [`fixtures`] - Deterministic firmware images and manifests
//! - [`repository`] - In-memory [`FirmwareRepository`](meshota_manifest::FirmwareRepository)
//! - [`lines`] - Helpers for inspecting encoded protocol output
//!
//! ```toml
//! [dev-dependencies]
//! meshota-test-helpers = { workspace = true }
//! ```

#![deny(unsafe_op_in_unsafe_fn)]
#![allow(clippy::unwrap_used, clippy::panic, reason = "test support code")]

pub mod fixtures;
pub mod lines;
pub mod must;
pub mod repository;

pub use fixtures::{FirmwareFixture, SENDER_ROLE, firmware_image, manifest_json, sender_manifest};
pub use must::*;
pub use repository::StaticRepository;
