//! Property-based tests for error formatting.

use meshota_errors::OtaError;
use proptest::prelude::*;

proptest! {
    #![proptest_config(ProptestConfig::with_cases(100))]

    #[test]
    fn prop_download_incomplete_display_contains_counts(expected in 1u64..1_000_000, received in 0u64..1_000_000) {
        let err = OtaError::DownloadIncomplete { expected, received };
        let msg = err.to_string();
        prop_assert!(msg.contains(&expected.to_string()));
        prop_assert!(msg.contains(&received.to_string()));
        prop_assert_eq!(err.reason(), "download_incomplete");
    }

    #[test]
    fn prop_session_errors_carry_node_id(node in any::<u32>()) {
        let active = OtaError::SessionAlreadyActive(node);
        let unknown = OtaError::NodeUnknown(node);
        prop_assert!(active.to_string().contains(&node.to_string()));
        prop_assert!(unknown.to_string().contains(&node.to_string()));
        prop_assert!(active.is_recoverable());
    }
}
