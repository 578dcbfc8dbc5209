//! Convenience re-exports.

pub use crate::config::BridgeConfig;
pub use crate::nodes::{MeshNode, NodeTable};
pub use crate::priority::{Priority, PriorityClassifier};
pub use crate::queue::{AdmissionQueue, QueuedMessage};
pub use crate::router::{BridgeRouter, BridgeStats};
pub use crate::transport::{MeshFrame, MeshOutbox, MeshTransport, SerialLink};
