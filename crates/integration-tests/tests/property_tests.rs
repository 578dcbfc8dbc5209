//! Image delivery holds for any image and chunk size.

use meshota_gateway::GatewayConfig;
use meshota_integration_tests::MeshNetwork;
use proptest::prelude::*;

fn deliver(len: usize, chunk_size: u32, corrupt: Option<u32>) -> Result<bool, TestCaseError> {
    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_time()
        .build()
        .map_err(|e| TestCaseError::fail(e.to_string()))?;
    runtime.block_on(async {
        let config = GatewayConfig {
            chunk_size,
            ..GatewayConfig::default()
        };
        let mut net = MeshNetwork::with_config("3.0.0", len, config)
            .map_err(|e| TestCaseError::fail(e.to_string()))?;
        if let Some(idx) = corrupt {
            net.faults.corrupt_once.insert(idx);
        }
        net.add_node(7, "2.9.9")
            .map_err(|e| TestCaseError::fail(e.to_string()))?;
        net.settle()
            .await
            .map_err(|e| TestCaseError::fail(e.to_string()))?;
        let image = net.node(7).and_then(|n| n.writer().image());
        Ok(image == Some(net.fixture.bytes.as_slice()))
    })
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(32))]

    #[test]
    fn prop_image_arrives_intact(len in 1usize..4000, chunk_size in 64u32..=1024) {
        prop_assert!(deliver(len, chunk_size, None)?);
    }

    #[test]
    fn prop_single_corruption_is_recovered(
        len in 1usize..4000,
        chunk_size in 64u32..=1024,
        corrupt in 0u32..8,
    ) {
        prop_assert!(deliver(len, chunk_size, Some(corrupt))?);
    }
}
