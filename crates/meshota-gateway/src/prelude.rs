//! Convenience re-exports.

pub use crate::auto::AutoUpdatePolicy;
pub use crate::config::GatewayConfig;
pub use crate::gateway::{Gateway, GatewayStats, ManifestSummary};
pub use crate::registry::{NodeRecord, NodeRegistry, NodeReport, NodeStatus};
pub use crate::service::{GatewayHandle, GatewayService, SerialChannels, ServiceError};
pub use crate::session::{
    SessionCounters, SessionId, SessionManager, SessionOrigin, SessionOutcome, SessionRecord,
    SessionSettings, SessionSnapshot, UpdateSession,
};
pub use meshota_errors::{OtaError, Result};
