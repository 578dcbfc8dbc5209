//! End-to-end update scenarios.
//!
//! [`mesh::MeshNetwork`] wires the real gateway, bridge router and node
//! update clients together in memory, with explicit time and optional fault
//! injection on the mesh hop:
//!
//! ```text
//! Gateway ──serial lines──▶ BridgeRouter ──MeshOutbox──▶ UpdateClient(s)
//!    ▲                          │  ▲                          │
//!    └──────serial lines────────┘  └────────UplinkOutbox──────┘
//! ```

#![deny(rust_2018_idioms)]
#![deny(unused_must_use)]
#![deny(clippy::unwrap_used)]

pub mod mesh;

pub use mesh::{BRIDGE_ID, LinkFaults, MeshNetwork, SimClient};
