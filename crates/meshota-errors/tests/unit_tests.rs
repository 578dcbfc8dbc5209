//! Unit tests for all error variants.
//!
//! Tests Display implementations, categories and wire reason codes.

use std::collections::HashSet;

use meshota_errors::{ErrorCategory, OtaError, Result};

fn all_variants() -> Vec<OtaError> {
    vec![
        OtaError::ManifestUnavailable("offline".into()),
        OtaError::ManifestMalformed("missing version".into()),
        OtaError::RoleNotFound("sender".into()),
        OtaError::firmware_not_found("sender", "404"),
        OtaError::download_failed("http://fw/a.bin", "status 500"),
        OtaError::DownloadIncomplete {
            expected: 2000,
            received: 1024,
        },
        OtaError::IntegrityMismatch {
            expected: "ab".into(),
            actual: "cd".into(),
        },
        OtaError::SessionAlreadyActive(7),
        OtaError::NodeUnknown(9),
        OtaError::ChunkDecodeFailed("bad base64".into()),
        OtaError::ChunkWriteFailed("flash full".into()),
        OtaError::Timeout,
        OtaError::AbortedByPeer("timeout".into()),
    ]
}

#[test]
fn test_all_variants_display() -> Result<()> {
    for variant in all_variants() {
        let msg = variant.to_string();
        assert!(!msg.is_empty(), "OtaError variant should have display message");
    }
    Ok(())
}

#[test]
fn test_std_error_impl() -> Result<()> {
    let err = OtaError::Timeout;
    let _: &dyn std::error::Error = &err;
    Ok(())
}

#[test]
fn test_reason_codes_are_unique_snake_case() -> Result<()> {
    let mut seen = HashSet::new();
    for variant in all_variants() {
        let reason = variant.reason();
        assert!(
            reason.chars().all(|c| c.is_ascii_lowercase() || c == '_'),
            "reason {reason} should be snake_case"
        );
        assert!(seen.insert(reason), "duplicate reason {reason}");
    }
    Ok(())
}

#[test]
fn test_categories() -> Result<()> {
    assert_eq!(
        OtaError::ManifestMalformed(String::new()).category(),
        ErrorCategory::Manifest
    );
    assert_eq!(
        OtaError::DownloadIncomplete {
            expected: 1,
            received: 0
        }
        .category(),
        ErrorCategory::Transfer
    );
    assert_eq!(OtaError::SessionAlreadyActive(1).category(), ErrorCategory::Session);
    assert_eq!(
        OtaError::ChunkDecodeFailed(String::new()).category(),
        ErrorCategory::Node
    );
    assert_eq!(ErrorCategory::Transfer.to_string(), "Transfer");
    Ok(())
}

#[test]
fn test_display_includes_context() -> Result<()> {
    let err = OtaError::download_failed("http://fw/a.bin", "status 404");
    let msg = err.to_string();
    assert!(msg.contains("http://fw/a.bin"));
    assert!(msg.contains("status 404"));

    let err = OtaError::SessionAlreadyActive(42);
    assert!(err.to_string().contains("42"));
    Ok(())
}

#[test]
fn test_recoverability() -> Result<()> {
    assert!(OtaError::Timeout.is_recoverable());
    assert!(OtaError::ManifestUnavailable("dns".into()).is_recoverable());
    assert!(!OtaError::ManifestMalformed("x".into()).is_recoverable());
    assert!(!OtaError::RoleNotFound("x".into()).is_recoverable());
    Ok(())
}
