//! The firmware source the gateway depends on.

use std::sync::Arc;

use async_trait::async_trait;
use meshota_errors::{OtaError, Result};
use tracing::{info, warn};

use crate::fetcher::{FirmwareFetcher, compute_digest, verify};
use crate::manifest::Manifest;
use crate::resolver::ManifestResolver;

/// Source of manifests and firmware images.
#[async_trait]
pub trait FirmwareRepository: Send + Sync {
    /// Manifest, refreshed when stale or when `force` is set
    async fn manifest(&self, force: bool) -> Result<Arc<Manifest>>;

    /// Cached manifest without network access
    fn cached_manifest(&self) -> Option<Arc<Manifest>>;

    /// Download an image
    async fn download(&self, url: &str) -> Result<Vec<u8>>;
}

/// [`FirmwareRepository`] backed by HTTP.
pub struct HttpFirmwareRepository {
    resolver: ManifestResolver,
    fetcher: FirmwareFetcher,
}

impl HttpFirmwareRepository {
    /// Combine a resolver and a fetcher.
    pub fn new(resolver: ManifestResolver, fetcher: FirmwareFetcher) -> Self {
        Self { resolver, fetcher }
    }

    /// Underlying resolver
    pub fn resolver(&self) -> &ManifestResolver {
        &self.resolver
    }
}

#[async_trait]
impl FirmwareRepository for HttpFirmwareRepository {
    async fn manifest(&self, force: bool) -> Result<Arc<Manifest>> {
        self.resolver.fetch(force).await
    }

    fn cached_manifest(&self) -> Option<Arc<Manifest>> {
        self.resolver.current()
    }

    async fn download(&self, url: &str) -> Result<Vec<u8>> {
        self.fetcher.download(url).await
    }
}

/// A downloaded, verified image ready to be offered.
#[derive(Debug, Clone)]
pub struct PreparedFirmware {
    /// Role the image is for
    pub role: String,
    /// Manifest version of the image
    pub version: String,
    /// Image bytes, immutable from here on
    pub bytes: Arc<[u8]>,
    /// Digest computed over `bytes`
    pub digest: String,
    /// Whether the digest was checked against the manifest
    pub verified: bool,
}

impl PreparedFirmware {
    /// Image size in bytes
    pub fn size(&self) -> usize {
        self.bytes.len()
    }
}

/// Resolve, download and verify the image for `role`.
///
/// Any failure is returned before the caller creates session state:
/// `ManifestUnavailable` when no manifest can be obtained, `FirmwareNotFound`
/// when the role is unknown or the download fails, and `IntegrityMismatch`
/// when the manifest digest does not match.
pub async fn prepare_firmware<R>(repo: &R, role: &str) -> Result<PreparedFirmware>
where
    R: FirmwareRepository + ?Sized,
{
    let manifest = repo.manifest(false).await.map_err(|e| match e {
        OtaError::ManifestUnavailable(_) => e,
        other => OtaError::ManifestUnavailable(other.to_string()),
    })?;

    let asset = manifest
        .resolve_role(role)
        .map_err(|e| OtaError::firmware_not_found(role, e.to_string()))?;

    let bytes = repo
        .download(&asset.url)
        .await
        .map_err(|e| OtaError::firmware_not_found(role, e.to_string()))?;

    if bytes.is_empty() {
        return Err(OtaError::firmware_not_found(role, "image is empty"));
    }
    if u32::try_from(bytes.len()).is_err() {
        return Err(OtaError::firmware_not_found(role, "image too large to offer"));
    }

    let digest = compute_digest(&bytes);
    let verified = match &asset.expected_hash {
        Some(expected) => {
            if !verify(&bytes, expected) {
                return Err(OtaError::IntegrityMismatch {
                    expected: expected.clone(),
                    actual: digest,
                });
            }
            true
        }
        None => {
            warn!("No sha256 in manifest for role {}, skipping verification", role);
            false
        }
    };

    info!(
        "Prepared firmware {} for role {}: {} bytes, sha256 {}",
        manifest.version(),
        role,
        bytes.len(),
        digest
    );

    Ok(PreparedFirmware {
        role: role.to_string(),
        version: manifest.version().to_string(),
        bytes: Arc::from(bytes),
        digest,
        verified,
    })
}
