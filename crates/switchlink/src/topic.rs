// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Per-topic delivery policy.
//!
//! A [`TopicConfig`] is recorded once per topic name on each endpoint. The
//! two endpoints own independent copies: only the serialization method
//! crosses the link (see [`crate::control`]), every other field is a local
//! hint.
//!
//! # Example
//!
//! ```
//! use switchlink::{Priority, SerializationMethod, TopicConfig};
//!
//! let config = TopicConfig::default()
//!     .with_priority(Priority::High)
//!     .with_serialization(SerializationMethod::SchemaBased);
//! assert_eq!(config.priority, Priority::High);
//! ```

use std::fmt;
use std::str::FromStr;
use std::time::Duration;

/// Delivery priority of a topic.
///
/// The shared-memory transport dequeues higher priorities first. The TCP
/// transport is a single ordered stream and ignores it.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Priority {
    /// Bulk / background traffic
    Lowest,
    /// Below normal
    Low,
    /// Normal traffic
    #[default]
    Medium,
    /// Above normal
    High,
    /// Latency critical traffic
    Highest,
}

impl Priority {
    /// Numeric rank used by the shared-memory queue (higher = sooner).
    pub fn rank(self) -> u32 {
        match self {
            Priority::Lowest => 0,
            Priority::Low => 1,
            Priority::Medium => 2,
            Priority::High => 3,
            Priority::Highest => 4,
        }
    }
}

/// Packetization hint.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum Packetization {
    /// Send as soon as the message is available
    Immediate,
    /// Transport default
    #[default]
    Default,
    /// Batching allowed within the topic's latency budget
    SuggestLatency,
}

/// How a topic's payloads are encoded by the bus.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum SerializationMethod {
    /// Binary dump of the event structure
    #[default]
    StructBinary,
    /// Schema-described encoding (payload is an opaque string on the bus)
    SchemaBased,
}

impl SerializationMethod {
    /// Name carried by control announcements.
    pub fn wire_name(self) -> &'static str {
        match self {
            SerializationMethod::StructBinary => "STRUCT_BINARY",
            SerializationMethod::SchemaBased => "SCHEMA_BASED",
        }
    }

    /// Parse an announced method name.
    ///
    /// Accepts the legacy names `BOOST` and `PROTOBUF`. Any other name is
    /// treated as schema-based, which is what older peers assumed for
    /// anything that is not a binary struct dump.
    pub fn from_wire_name(name: &str) -> Self {
        match name {
            "STRUCT_BINARY" | "BOOST" => SerializationMethod::StructBinary,
            "SCHEMA_BASED" | "PROTOBUF" => SerializationMethod::SchemaBased,
            other => {
                log::debug!(
                    "[CONTROL] unknown serialization method {:?}, assuming SCHEMA_BASED",
                    other
                );
                SerializationMethod::SchemaBased
            }
        }
    }
}

impl fmt::Display for SerializationMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.wire_name())
    }
}

impl FromStr for Priority {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "lowest" => Ok(Priority::Lowest),
            "low" => Ok(Priority::Low),
            "medium" => Ok(Priority::Medium),
            "high" => Ok(Priority::High),
            "highest" => Ok(Priority::Highest),
            _ => Err(format!("unknown priority: {}", s)),
        }
    }
}

/// Delivery policy of one networked topic.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct TopicConfig {
    /// Queue priority (shared memory only)
    pub priority: Priority,
    /// Retransmission request. Neither transport retransmits; kept for
    /// configuration compatibility.
    pub retransmit: bool,
    /// Whether the consumer tolerates reordering
    pub allow_out_of_order: bool,
    /// Packetization hint
    pub packetization: Packetization,
    /// Latency budget hint
    pub latency: Option<Duration>,
    /// Payload encoding used by the bus
    pub serialization_method: SerializationMethod,
}

impl TopicConfig {
    /// Config with only the serialization method set, as mirrored from a
    /// peer announcement.
    pub fn announced(method: SerializationMethod) -> Self {
        Self {
            serialization_method: method,
            ..Default::default()
        }
    }

    /// Builder: set priority
    pub fn with_priority(mut self, priority: Priority) -> Self {
        self.priority = priority;
        self
    }

    /// Builder: set packetization and latency budget
    pub fn with_packetization(mut self, packetization: Packetization, latency: Option<Duration>) -> Self {
        self.packetization = packetization;
        self.latency = latency;
        self
    }

    /// Builder: allow out-of-order delivery
    pub fn with_out_of_order(mut self, allow: bool) -> Self {
        self.allow_out_of_order = allow;
        self
    }

    /// Builder: set serialization method
    pub fn with_serialization(mut self, method: SerializationMethod) -> Self {
        self.serialization_method = method;
        self
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = TopicConfig::default();
        assert_eq!(config.priority, Priority::Medium);
        assert!(!config.retransmit);
        assert_eq!(config.packetization, Packetization::Default);
        assert_eq!(config.latency, None);
        assert_eq!(config.serialization_method, SerializationMethod::StructBinary);
    }

    #[test]
    fn test_priority_rank_is_ordered() {
        let all = [
            Priority::Lowest,
            Priority::Low,
            Priority::Medium,
            Priority::High,
            Priority::Highest,
        ];
        for pair in all.windows(2) {
            assert!(pair[0].rank() < pair[1].rank());
            assert!(pair[0] < pair[1]);
        }
    }

    #[test]
    fn test_wire_names() {
        for method in [SerializationMethod::StructBinary, SerializationMethod::SchemaBased] {
            assert_eq!(SerializationMethod::from_wire_name(method.wire_name()), method);
        }
        assert_eq!(
            SerializationMethod::from_wire_name("BOOST"),
            SerializationMethod::StructBinary
        );
        assert_eq!(
            SerializationMethod::from_wire_name("PROTOBUF"),
            SerializationMethod::SchemaBased
        );
        assert_eq!(
            SerializationMethod::from_wire_name("msgpack"),
            SerializationMethod::SchemaBased
        );
    }

    #[test]
    fn test_announced_defaults_everything_else() {
        let config = TopicConfig::announced(SerializationMethod::SchemaBased);
        assert_eq!(config.serialization_method, SerializationMethod::SchemaBased);
        assert_eq!(config.priority, Priority::Medium);
        assert_eq!(config.latency, None);
    }

    #[test]
    fn test_builder_methods() {
        let config = TopicConfig::default()
            .with_priority(Priority::Highest)
            .with_packetization(Packetization::SuggestLatency, Some(Duration::from_millis(5)))
            .with_out_of_order(true);
        assert_eq!(config.priority, Priority::Highest);
        assert_eq!(config.packetization, Packetization::SuggestLatency);
        assert_eq!(config.latency, Some(Duration::from_millis(5)));
        assert!(config.allow_out_of_order);
    }

    #[test]
    fn test_priority_from_str() {
        assert_eq!("HIGH".parse::<Priority>(), Ok(Priority::High));
        assert!("urgent".parse::<Priority>().is_err());
    }
}
