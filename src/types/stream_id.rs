//! Stream identifier type using TypeID format.
//!
//! Every normalized stream carries one `StreamId`, stamped onto each chunk it
//! produces. Format: `chat_01h455vb4pex5vsknk084sn02q`

use mti::prelude::*;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;

/// Identifier of one in-flight chat stream.
///
/// Time-sortable and globally unique, so chunks from concurrent streams can
/// be told apart once they reach a shared consumer.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct StreamId(MagicTypeId);

/// Error returned when a string is not a valid stream ID.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InvalidStreamId {
    /// TypeID parsing failed
    Parse(String),
    /// Wrong prefix (expected "chat")
    WrongPrefix {
        /// The expected prefix
        expected: &'static str,
        /// The actual prefix found
        actual: String,
    },
}

impl fmt::Display for InvalidStreamId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Parse(e) => write!(f, "invalid stream ID: {e}"),
            Self::WrongPrefix { expected, actual } => {
                write!(f, "expected stream ID prefix '{expected}', got '{actual}'")
            }
        }
    }
}

impl std::error::Error for InvalidStreamId {}

impl StreamId {
    /// The TypeID prefix for stream identifiers.
    pub const PREFIX: &'static str = "chat";

    /// Generates a fresh stream ID backed by a UUIDv7.
    #[must_use]
    pub fn new() -> Self {
        Self(Self::PREFIX.create_type_id::<V7>())
    }

    /// Parses a stream ID, validating the "chat" prefix.
    ///
    /// # Errors
    ///
    /// Returns `InvalidStreamId::Parse` if the string is not a TypeID, or
    /// `InvalidStreamId::WrongPrefix` if it belongs to another ID family.
    pub fn parse(s: &str) -> Result<Self, InvalidStreamId> {
        let id = MagicTypeId::from_str(s).map_err(|e| InvalidStreamId::Parse(e.to_string()))?;

        let prefix = id.prefix().as_str();
        if prefix != Self::PREFIX {
            return Err(InvalidStreamId::WrongPrefix {
                expected: Self::PREFIX,
                actual: prefix.to_string(),
            });
        }

        Ok(Self(id))
    }
}

impl Default for StreamId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for StreamId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for StreamId {
    type Err = InvalidStreamId;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl Serialize for StreamId {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        self.0.to_string().serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for StreamId {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        Self::parse(&s).map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_ids_carry_chat_prefix() {
        let id = StreamId::new();
        assert!(id.to_string().starts_with("chat_"));
    }

    #[test]
    fn parse_accepts_generated_ids() {
        let id = StreamId::new();
        let parsed = StreamId::parse(&id.to_string()).unwrap();
        assert_eq!(id, parsed);
    }

    #[test]
    fn parse_rejects_foreign_prefix() {
        let result = StreamId::parse("corr_01h455vb4pex5vsknk084sn02q");
        assert!(matches!(
            result,
            Err(InvalidStreamId::WrongPrefix {
                expected: "chat",
                ..
            })
        ));
    }

    #[test]
    fn parse_rejects_garbage() {
        assert!(matches!(
            StreamId::parse("chat-123"),
            Err(InvalidStreamId::Parse(_))
        ));
    }

    #[test]
    fn concurrent_streams_get_distinct_ids() {
        assert_ne!(StreamId::new(), StreamId::new());
    }

    #[test]
    fn serializes_as_plain_string() {
        let id = StreamId::new();
        let json = serde_json::to_value(&id).unwrap();
        assert_eq!(json, serde_json::Value::String(id.to_string()));

        let back: StreamId = serde_json::from_value(json).unwrap();
        assert_eq!(back, id);
    }
}
