//! In-memory firmware repository.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use async_trait::async_trait;
use meshota_errors::{OtaError, Result};
use meshota_manifest::{FirmwareRepository, Manifest};
use parking_lot::RwLock;

use crate::fixtures::{FirmwareFixture, sender_manifest};

/// Serves a fixed manifest and images from memory, counting requests.
#[derive(Default)]
pub struct StaticRepository {
    manifest: RwLock<Option<Arc<Manifest>>>,
    images: RwLock<HashMap<String, Vec<u8>>>,
    manifest_unavailable: AtomicBool,
    manifest_fetches: AtomicUsize,
    downloads: AtomicUsize,
}

impl StaticRepository {
    /// Empty repository: no manifest, no images.
    pub fn new() -> Self {
        Self::default()
    }

    /// Repository publishing `fixture` as `version` for the sender role.
    pub fn for_fixture(version: &str, fixture: &FirmwareFixture) -> Result<Self> {
        let repo = Self::new();
        repo.set_manifest(sender_manifest(version, &fixture.url, Some(&fixture.digest))?);
        repo.add_image(&fixture.url, fixture.bytes.clone());
        Ok(repo)
    }

    /// Replace the manifest
    pub fn set_manifest(&self, manifest: Manifest) {
        *self.manifest.write() = Some(Arc::new(manifest));
    }

    /// Serve `bytes` at `url`
    pub fn add_image(&self, url: &str, bytes: Vec<u8>) {
        self.images.write().insert(url.to_string(), bytes);
    }

    /// Make manifest requests fail
    pub fn set_manifest_unavailable(&self, unavailable: bool) {
        self.manifest_unavailable.store(unavailable, Ordering::SeqCst);
    }

    /// Manifest requests served
    pub fn manifest_fetches(&self) -> usize {
        self.manifest_fetches.load(Ordering::SeqCst)
    }

    /// Download requests served
    pub fn downloads(&self) -> usize {
        self.downloads.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl FirmwareRepository for StaticRepository {
    async fn manifest(&self, _force: bool) -> Result<Arc<Manifest>> {
        self.manifest_fetches.fetch_add(1, Ordering::SeqCst);
        if self.manifest_unavailable.load(Ordering::SeqCst) {
            return Err(OtaError::ManifestUnavailable("manifest host unreachable".to_string()));
        }
        self.manifest
            .read()
            .clone()
            .ok_or_else(|| OtaError::ManifestUnavailable("no manifest published".to_string()))
    }

    fn cached_manifest(&self) -> Option<Arc<Manifest>> {
        self.manifest.read().clone()
    }

    async fn download(&self, url: &str) -> Result<Vec<u8>> {
        self.downloads.fetch_add(1, Ordering::SeqCst);
        self.images
            .read()
            .get(url)
            .cloned()
            .ok_or_else(|| OtaError::download_failed(url, "status 404 - Not Found"))
    }
}
