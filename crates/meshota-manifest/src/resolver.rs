//! Cached manifest resolution.

use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::Context;
use chrono::Utc;
use meshota_errors::{OtaError, Result};
use parking_lot::RwLock;
use reqwest::Client;
use tracing::{debug, info, warn};

use crate::manifest::{Manifest, RoleAsset};

/// Configuration for the manifest resolver
#[derive(Debug, Clone)]
pub struct ResolverConfig {
    /// Manifest URL
    pub manifest_url: String,
    /// How long a fetched manifest is served from cache
    pub ttl: Duration,
    /// HTTP timeout for the manifest request
    pub http_timeout: Duration,
}

impl Default for ResolverConfig {
    fn default() -> Self {
        Self {
            manifest_url: "http://localhost:8000/firmware/manifest.json".to_string(),
            ttl: Duration::from_secs(300),
            http_timeout: Duration::from_secs(15),
        }
    }
}

impl ResolverConfig {
    /// Create a configuration for the given manifest URL
    pub fn new(manifest_url: impl Into<String>) -> Self {
        Self {
            manifest_url: manifest_url.into(),
            ..Default::default()
        }
    }

    /// Set the cache time-to-live
    pub fn with_ttl(mut self, ttl: Duration) -> Self {
        self.ttl = ttl;
        self
    }

    /// Set the HTTP timeout
    pub fn with_http_timeout(mut self, timeout: Duration) -> Self {
        self.http_timeout = timeout;
        self
    }
}

/// Internal state for the resolver
#[derive(Default)]
struct ResolverState {
    /// The published manifest
    manifest: Option<Arc<Manifest>>,
    /// When the manifest was last refreshed
    last_refresh: Option<Instant>,
}

/// Fetches the manifest over HTTP and serves it from cache until the TTL
/// elapses.
///
/// Readers get an `Arc<Manifest>` snapshot. A refresh swaps the pointer
/// under a short write lock, so a reader holding the old snapshot keeps a
/// consistent view and never observes a partially parsed document. No lock
/// is held across the network request.
pub struct ManifestResolver {
    config: ResolverConfig,
    client: Client,
    state: RwLock<ResolverState>,
}

impl ManifestResolver {
    /// Create a resolver.
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be initialised.
    pub fn new(config: ResolverConfig) -> anyhow::Result<Self> {
        let client = Client::builder()
            .timeout(config.http_timeout)
            .user_agent(concat!("meshota-gateway/", env!("CARGO_PKG_VERSION")))
            .build()
            .context("Failed to create HTTP client")?;
        Ok(Self {
            config,
            client,
            state: RwLock::new(ResolverState::default()),
        })
    }

    /// Get the current configuration
    pub fn config(&self) -> &ResolverConfig {
        &self.config
    }

    /// Check if the cached manifest has outlived its TTL
    pub fn needs_refresh(&self) -> bool {
        let state = self.state.read();
        match (&state.manifest, state.last_refresh) {
            (Some(_), Some(last)) => last.elapsed() >= self.config.ttl,
            _ => true,
        }
    }

    /// Return the manifest, fetching it when stale or when `force` is set.
    ///
    /// When a non-forced refresh fails and an older manifest is cached, the
    /// old manifest is returned and the next call retries.
    pub async fn fetch(&self, force: bool) -> Result<Arc<Manifest>> {
        if !force
            && !self.needs_refresh()
            && let Some(manifest) = self.current()
        {
            return Ok(manifest);
        }

        match self.fetch_remote().await {
            Ok(manifest) => {
                let manifest = Arc::new(manifest);
                let mut state = self.state.write();
                state.manifest = Some(Arc::clone(&manifest));
                state.last_refresh = Some(Instant::now());
                info!(
                    "Manifest refreshed: version {} with {} roles",
                    manifest.version(),
                    manifest.assets().len()
                );
                Ok(manifest)
            }
            Err(e) => match self.current() {
                Some(stale) if !force => {
                    warn!("Manifest refresh failed: {}, serving cached version {}", e, stale.version());
                    Ok(stale)
                }
                _ => Err(e),
            },
        }
    }

    async fn fetch_remote(&self) -> Result<Manifest> {
        let url = &self.config.manifest_url;
        debug!("Fetching manifest from: {}", url);

        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| OtaError::ManifestUnavailable(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(OtaError::ManifestUnavailable(format!(
                "manifest server returned {} - {}",
                status.as_u16(),
                status.canonical_reason().unwrap_or("Unknown")
            )));
        }

        let body = response
            .text()
            .await
            .map_err(|e| OtaError::ManifestUnavailable(e.to_string()))?;

        Manifest::parse(&body, Utc::now())
    }

    /// The cached manifest, regardless of age.
    pub fn current(&self) -> Option<Arc<Manifest>> {
        self.state.read().manifest.clone()
    }

    /// Resolve a role against the cached manifest without network access.
    pub fn resolve_role(&self, role: &str) -> Result<RoleAsset> {
        let manifest = self
            .current()
            .ok_or_else(|| OtaError::ManifestUnavailable("no manifest cached".to_string()))?;
        manifest.resolve_role(role)
    }

    /// Mark the cache stale so the next `fetch` goes to the network.
    pub fn invalidate(&self) {
        self.state.write().last_refresh = None;
    }
}
