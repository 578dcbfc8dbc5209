//! Wire protocol for mesh firmware distribution.
//!
//! Every record exchanged between the gateway, the mesh bridge and the nodes
//! is a single line of JSON carrying a `type` discriminator. This crate owns:
//!
//! - [`OtaMessage`]: the update-protocol message catalog (`ota_*` types)
//! - [`NodeId`]: mesh node identifier, tolerant of string and numeric forms
//! - [`scan`]: cheap field scans used by the bridge's transparent forwarding path
//! - [`codec`]: text-safe chunk encoding
//! - [`framing`]: newline framing over byte streams
//!
//! # Example
//!
//! ```
//! use meshota_protocol::{NodeId, OtaMessage};
//!
//! let line = r#"{"type":"ota_next","source_node":42,"idx":3}"#;
//! let msg = OtaMessage::decode(line)?;
//! assert_eq!(msg, OtaMessage::OtaNext { source_node: NodeId(42), idx: 3 });
//! # Ok::<(), meshota_protocol::ProtocolError>(())
//! ```

#![deny(unsafe_op_in_unsafe_fn, clippy::unwrap_used)]
#![warn(missing_docs, rust_2018_idioms)]

pub mod codec;
pub mod error;
pub mod framing;
pub mod message;
pub mod node;
pub mod scan;

pub use codec::{chunk_count, decode_chunk, encode_chunk};
pub use error::ProtocolError;
pub use framing::LineBuffer;
pub use message::{MessageSink, OtaMessage};
pub use node::NodeId;

/// Chunk size used when none is configured.
pub const DEFAULT_CHUNK_SIZE: u32 = 512;

/// Prefix shared by every update-protocol message type.
pub const OTA_TYPE_PREFIX: &str = "ota_";
