//! Convenience re-exports.

pub use crate::fetcher::{FetcherConfig, FirmwareFetcher, compute_digest, verify};
pub use crate::manifest::{Manifest, RoleAsset};
pub use crate::repository::{FirmwareRepository, PreparedFirmware, prepare_firmware};
pub use crate::resolver::{ManifestResolver, ResolverConfig};
pub use crate::version::{FirmwareVersion, is_newer};
pub use meshota_errors::{OtaError, Result};
