//! Node-side firmware update client.
//!
//! A node announces its role and running version with `ota_check`. When the
//! gateway answers with an offer for a different version, the client pulls
//! the image one chunk at a time, writing each chunk as it arrives and
//! hashing it incrementally. On `ota_end` it checks the size and the offered
//! digest, finalizes the image, reports the result and restarts.
//!
//! Failures never leave the node stuck: bad chunks are retried up to a
//! budget, a silent gateway is detected by the stall timer, and an abort
//! from either side returns the client to idle with the partial image
//! discarded.
//!
//! The client is synchronous and owns no transport; see [`seams`] for the
//! writer, device and uplink traits it drives.

#![deny(unsafe_op_in_unsafe_fn, clippy::unwrap_used)]
#![warn(missing_docs, rust_2018_idioms)]

pub mod client;
pub mod config;
pub mod prelude;
pub mod seams;
pub mod state;

pub use client::UpdateClient;
pub use config::ClientConfig;
pub use seams::{BufferedWriter, DeviceControl, FirmwareWriter, MeshUplink, RestartCounter, UplinkOutbox};
pub use state::{UpdateClientState, UpdatePhase};
