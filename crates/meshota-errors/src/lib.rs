//! Shared error taxonomy for mesh firmware distribution.
//!
//! Every component of the update pipeline (manifest resolver, firmware
//! fetcher, gateway session manager, bridge router and node client) reports
//! failures through [`OtaError`]. The taxonomy is deliberately flat so that a
//! failure can be surfaced verbatim to an operator or mapped to the short
//! `reason` code carried in `ota_abort` / `ota_result` messages.
//!
//! # Example
//!
//! ```
//! use meshota_errors::prelude::*;
//!
//! fn require_manifest(present: bool) -> Result<()> {
//!     if !present {
//!         return Err(OtaError::ManifestUnavailable("no cached manifest".into()));
//!     }
//!     Ok(())
//! }
//!
//! assert!(require_manifest(false).is_err());
//! ```

#![deny(unsafe_op_in_unsafe_fn, clippy::unwrap_used)]
#![warn(missing_docs, rust_2018_idioms)]
#![cfg_attr(docsrs, feature(doc_cfg))]

pub mod ota;
pub mod prelude;

pub use ota::{ErrorCategory, OtaError};

/// A specialized `Result` type for update pipeline operations.
pub type Result<T> = std::result::Result<T, OtaError>;
