//! Mesh node identifiers.

use std::fmt;
use std::str::FromStr;

use serde::de::{self, Visitor};
use serde::{Deserialize, Deserializer, Serialize, Serializer};

/// 32-bit mesh node id.
///
/// Serialized as a number. Deserialization accepts both a number and a
/// decimal string, since `target_node` travels as a string on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct NodeId(pub u32);

impl NodeId {
    /// Raw numeric id.
    pub fn get(self) -> u32 {
        self.0
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<u32> for NodeId {
    fn from(id: u32) -> Self {
        NodeId(id)
    }
}

impl FromStr for NodeId {
    type Err = std::num::ParseIntError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        s.trim().parse().map(NodeId)
    }
}

impl Serialize for NodeId {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u32(self.0)
    }
}

struct NodeIdVisitor;

impl Visitor<'_> for NodeIdVisitor {
    type Value = NodeId;

    fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("a node id as number or decimal string")
    }

    fn visit_u64<E: de::Error>(self, v: u64) -> Result<NodeId, E> {
        u32::try_from(v)
            .map(NodeId)
            .map_err(|e| E::custom(format!("node id {v} out of range: {e}")))
    }

    fn visit_i64<E: de::Error>(self, v: i64) -> Result<NodeId, E> {
        u32::try_from(v)
            .map(NodeId)
            .map_err(|e| E::custom(format!("node id {v} out of range: {e}")))
    }

    fn visit_str<E: de::Error>(self, v: &str) -> Result<NodeId, E> {
        v.parse()
            .map_err(|e| E::custom(format!("invalid node id {v:?}: {e}")))
    }
}

impl<'de> Deserialize<'de> for NodeId {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        deserializer.deserialize_any(NodeIdVisitor)
    }
}

/// Serialize a node id as a decimal string (`target_node` wire form).
pub(crate) fn serialize_as_string<S: Serializer>(id: &NodeId, s: S) -> Result<S::Ok, S::Error> {
    s.collect_str(id)
}

pub(crate) fn serialize_opt_as_string<S: Serializer>(
    id: &Option<NodeId>,
    s: S,
) -> Result<S::Ok, S::Error> {
    match id {
        Some(id) => s.collect_str(id),
        None => s.serialize_none(),
    }
}
