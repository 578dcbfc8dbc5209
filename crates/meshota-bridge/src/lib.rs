//! Mesh bridge router.
//!
//! The bridge joins the gateway's serial link to the radio mesh. It never
//! interprets firmware transfers: `ota_*` lines are forwarded verbatim in
//! both directions, addressed by a scanned `target_node` on the way down.
//! All other node traffic is classified by raw-text priority markers and
//! admitted through a dual queue that sheds normal traffic under load.
//!
//! ```text
//!            ota_*  ──────────────────────────────▶
//!   mesh ──▶ other  ─▶ classify ─▶ admit ─▶ queue ─▶ drain ─▶ serial
//!   mesh ◀── ota_* (target_node) ◀──────────────────────────── serial
//! ```
//!
//! The router is synchronous and clock-driven: the host feeds it lines and
//! calls [`BridgeRouter::poll`] with the current time.

#![deny(unsafe_op_in_unsafe_fn, clippy::unwrap_used)]
#![warn(missing_docs, rust_2018_idioms)]

pub mod config;
pub mod nodes;
pub mod prelude;
pub mod priority;
pub mod queue;
pub mod router;
pub mod transport;

pub use config::{BridgeConfig, DEFAULT_PRIORITY_MARKERS};
pub use priority::{Priority, PriorityClassifier};
pub use queue::{AdmissionQueue, QueuedMessage};
pub use router::{BridgeRouter, BridgeStats};
pub use transport::{MeshFrame, MeshOutbox, MeshTransport, SerialLink};
