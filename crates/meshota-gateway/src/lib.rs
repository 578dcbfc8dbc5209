//! Gateway side of mesh firmware distribution.
//!
//! The gateway sits between the internet and the mesh bridge's serial link.
//! It keeps a registry of nodes, decides when a node should be updated, and
//! runs one pull-driven [`session::UpdateSession`] per node being updated.
//!
//! # Architecture
//!
//! - [`registry`]: node records with liveness tracking
//! - [`session`]: the per-node update state machine and its manager
//! - [`auto`]: automatic update switch and per-node cooldown
//! - [`gateway`]: line dispatcher and operator operations
//! - [`service`]: single-task async host with a command handle
//! - [`config`]: JSON configuration with validation
//!
//! # Flow
//!
//! ```text
//! ota_check_forward ─▶ auto policy ─▶ prepare_firmware ─▶ ota_offer
//! ota_accept        ─▶ refresh activity
//! ota_next(idx)     ─▶ ota_chunk(idx) | ota_end
//! ota_result        ─▶ session removed, node back online
//! tick              ─▶ ota_abort(timeout) for idle sessions
//! ```

#![deny(unsafe_op_in_unsafe_fn, clippy::unwrap_used)]
#![warn(missing_docs, rust_2018_idioms)]

pub mod auto;
pub mod config;
pub mod gateway;
pub mod prelude;
pub mod registry;
pub mod service;
pub mod session;

pub use config::GatewayConfig;
pub use gateway::{Gateway, GatewayStats, ManifestSummary};
pub use registry::{NodeRecord, NodeRegistry, NodeStatus};
pub use service::{GatewayHandle, GatewayService, SerialChannels, ServiceError};
pub use session::{SessionId, SessionManager, SessionOrigin, SessionOutcome};
