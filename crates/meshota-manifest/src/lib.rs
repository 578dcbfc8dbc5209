//! Firmware manifest resolution, download and verification.
//!
//! The gateway learns which image each node role should run from a JSON
//! manifest published over HTTP:
//!
//! ```json
//! {
//!   "version": "2.1.1",
//!   "assets": { "sender": "https://fw.example/sender-2.1.1.bin" },
//!   "sha256": { "sender": "9f86d081884c7d659a2feaa0c55ad015a3bf4f1b2b0b822cd15d6c15b0f00a08" }
//! }
//! ```
//!
//! - [`ManifestResolver`] fetches and caches the manifest with a TTL
//! - [`FirmwareFetcher`] streams an image into memory with size and time bounds
//! - [`verify`] compares a SHA-256 digest case-insensitively
//! - [`FirmwareRepository`] is the seam the gateway depends on; [`prepare_firmware`]
//!   composes resolve, download and verify so no session is created on failure

#![deny(unsafe_op_in_unsafe_fn, clippy::unwrap_used)]
#![warn(missing_docs, rust_2018_idioms)]

pub mod fetcher;
pub mod manifest;
pub mod prelude;
pub mod repository;
pub mod resolver;
pub mod version;

pub use fetcher::{FetcherConfig, FirmwareFetcher, compute_digest, is_valid_digest, verify};
pub use manifest::{Manifest, RoleAsset};
pub use repository::{FirmwareRepository, HttpFirmwareRepository, PreparedFirmware, prepare_firmware};
pub use resolver::{ManifestResolver, ResolverConfig};
pub use version::{FirmwareVersion, is_newer};
