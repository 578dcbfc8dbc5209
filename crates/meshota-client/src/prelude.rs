//! Convenience re-exports.

pub use crate::client::UpdateClient;
pub use crate::config::ClientConfig;
pub use crate::seams::{
    BufferedWriter, DeviceControl, FirmwareWriter, MeshUplink, RestartCounter, UplinkOutbox,
};
pub use crate::state::{UpdateClientState, UpdatePhase};
