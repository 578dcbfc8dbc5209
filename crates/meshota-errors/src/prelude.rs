//! Prelude module for convenient error handling imports.
//!
//! ```
//! use meshota_errors::prelude::*;
//!
//! fn check(idx: u32) -> Result<u32> {
//!     if idx > 10 {
//!         return Err(OtaError::Timeout);
//!     }
//!     Ok(idx)
//! }
//! # assert!(check(1).is_ok());
//! ```

pub use crate::{
    Result,
    ota::{ErrorCategory, OtaError},
};
