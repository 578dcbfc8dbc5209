//! Deterministic firmware images and manifests.

use std::collections::BTreeMap;

use chrono::Utc;
use meshota_errors::Result;
use meshota_manifest::{Manifest, compute_digest};

/// Role used throughout the fixtures.
pub const SENDER_ROLE: &str = "sender";

/// Image of `len` bytes with a fixed, non-repeating-per-chunk pattern.
pub fn firmware_image(len: usize) -> Vec<u8> {
    (0..len)
        .map(|i| (i.wrapping_mul(31).wrapping_add(7) % 256) as u8)
        .collect()
}

/// An image with its digest and the URL it is served from.
#[derive(Debug, Clone)]
pub struct FirmwareFixture {
    /// Image bytes
    pub bytes: Vec<u8>,
    /// Lowercase hex SHA-256 of `bytes`
    pub digest: String,
    /// URL used in the manifest
    pub url: String,
}

impl FirmwareFixture {
    /// Image of `len` bytes served at `url`.
    pub fn new(len: usize, url: impl Into<String>) -> Self {
        let bytes = firmware_image(len);
        let digest = compute_digest(&bytes);
        Self {
            bytes,
            digest,
            url: url.into(),
        }
    }
}

/// Manifest publishing `version` for [`SENDER_ROLE`].
pub fn sender_manifest(version: &str, url: &str, digest: Option<&str>) -> Result<Manifest> {
    let assets = BTreeMap::from([(SENDER_ROLE.to_string(), url.to_string())]);
    let sha256 = digest
        .map(|d| BTreeMap::from([(SENDER_ROLE.to_string(), d.to_string())]))
        .unwrap_or_default();
    Manifest::new(version, assets, sha256, Utc::now())
}

/// Manifest document as served over HTTP.
pub fn manifest_json(version: &str, role: &str, url: &str, digest: Option<&str>) -> String {
    match digest {
        Some(d) => format!(
            r#"{{"version":"{version}","assets":{{"{role}":"{url}"}},"sha256":{{"{role}":"{d}"}}}}"#
        ),
        None => format!(r#"{{"version":"{version}","assets":{{"{role}":"{url}"}}}}"#),
    }
}
