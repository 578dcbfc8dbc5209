//! Manifest document model and validation.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use meshota_errors::{OtaError, Result};
use serde::Serialize;
use serde_json::Value;
use tracing::warn;

use crate::fetcher::is_valid_digest;

/// A validated firmware manifest.
///
/// Only constructed through [`Manifest::parse`] or [`Manifest::new`], both of
/// which guarantee a non-empty `version` and at least one asset.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Manifest {
    version: String,
    assets: BTreeMap<String, String>,
    sha256: BTreeMap<String, String>,
    fetched_at: DateTime<Utc>,
}

/// Where to get a role's image and how to check it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RoleAsset {
    /// Role the asset was resolved for
    pub role: String,
    /// Image URL
    pub url: String,
    /// Expected lowercase hex digest, if the manifest provides a valid one
    pub expected_hash: Option<String>,
}

impl Manifest {
    /// Build a manifest from already-validated parts.
    pub fn new(
        version: impl Into<String>,
        assets: BTreeMap<String, String>,
        sha256: BTreeMap<String, String>,
        fetched_at: DateTime<Utc>,
    ) -> Result<Self> {
        let version = version.into();
        if version.trim().is_empty() {
            return Err(OtaError::ManifestMalformed("empty version".to_string()));
        }
        let assets: BTreeMap<String, String> = assets
            .into_iter()
            .filter(|(_, url)| !url.trim().is_empty())
            .collect();
        if assets.is_empty() {
            return Err(OtaError::ManifestMalformed("no assets".to_string()));
        }
        let sha256 = sha256
            .into_iter()
            .filter_map(|(role, digest)| {
                if is_valid_digest(&digest) {
                    Some((role, digest.to_ascii_lowercase()))
                } else {
                    warn!("Ignoring malformed sha256 for role {}: {:?}", role, digest);
                    None
                }
            })
            .collect();
        Ok(Self {
            version,
            assets,
            sha256,
            fetched_at,
        })
    }

    /// Parse a manifest payload.
    ///
    /// `version` and `assets` are required. A missing or non-object `sha256`
    /// map only disables verification. Unknown top-level keys and any
    /// formatting whitespace are ignored.
    pub fn parse(payload: &str, fetched_at: DateTime<Utc>) -> Result<Self> {
        let doc: Value = serde_json::from_str(payload.trim())
            .map_err(|e| OtaError::ManifestMalformed(format!("invalid JSON: {e}")))?;
        let Value::Object(root) = doc else {
            return Err(OtaError::ManifestMalformed(
                "top level is not an object".to_string(),
            ));
        };

        let version = root
            .get("version")
            .and_then(Value::as_str)
            .ok_or_else(|| OtaError::ManifestMalformed("missing version".to_string()))?;

        let assets = root
            .get("assets")
            .and_then(Value::as_object)
            .map(string_map)
            .ok_or_else(|| OtaError::ManifestMalformed("missing assets".to_string()))?;

        let sha256 = match root.get("sha256") {
            Some(Value::Object(map)) => string_map(map),
            Some(_) => {
                warn!("Manifest sha256 field is not an object, integrity checks disabled");
                BTreeMap::new()
            }
            None => BTreeMap::new(),
        };

        Self::new(version, assets, sha256, fetched_at)
    }

    /// Look up the asset for `role`.
    pub fn resolve_role(&self, role: &str) -> Result<RoleAsset> {
        let url = self
            .assets
            .get(role)
            .ok_or_else(|| OtaError::RoleNotFound(role.to_string()))?;
        Ok(RoleAsset {
            role: role.to_string(),
            url: url.clone(),
            expected_hash: self.sha256.get(role).cloned(),
        })
    }

    /// Published firmware version.
    pub fn version(&self) -> &str {
        &self.version
    }

    /// Role → URL map.
    pub fn assets(&self) -> &BTreeMap<String, String> {
        &self.assets
    }

    /// Role → digest map (valid digests only).
    pub fn sha256(&self) -> &BTreeMap<String, String> {
        &self.sha256
    }

    /// When this manifest was fetched.
    pub fn fetched_at(&self) -> DateTime<Utc> {
        self.fetched_at
    }
}

fn string_map(map: &serde_json::Map<String, Value>) -> BTreeMap<String, String> {
    map.iter()
        .filter_map(|(k, v)| v.as_str().map(|s| (k.clone(), s.to_string())))
        .collect()
}
