// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Topic bootstrap between peers.
//!
//! When a topic is created locally, the backend sends an announcement on the
//! reserved [`CONTROL_TOPIC`] so the peer marks the topic as networked too.
//!
//! ```text
//! payload = "create_topic" <name> ':' <serialization method>
//! ```
//!
//! Only the serialization method crosses the link. The receiving side
//! records every other [`TopicConfig`] field at its default.

use crate::error::{Error, Result};
use crate::metrics::LinkMetrics;
use crate::registry::{TopicOrigin, TopicRegistry};
use crate::topic::{SerializationMethod, TopicConfig};

/// Reserved topic carrying control announcements.
pub const CONTROL_TOPIC: &str = "switchlink_control";

/// Tag opening every topic announcement.
pub const CREATE_TOPIC_TAG: &str = "create_topic";

/// Separator between topic name and serialization method.
pub const DELIMITER: char = ':';

/// Build the announcement payload for a topic.
pub fn encode_announcement(name: &str, method: SerializationMethod) -> Vec<u8> {
    let mut out = String::with_capacity(CREATE_TOPIC_TAG.len() + name.len() + 1 + 16);
    out.push_str(CREATE_TOPIC_TAG);
    out.push_str(name);
    out.push(DELIMITER);
    out.push_str(method.wire_name());
    out.into_bytes()
}

/// Parse an announcement payload into `(topic name, method)`.
///
/// The body is split on the first delimiter; names never contain one
/// (see [`validate_topic_name`]).
pub fn parse_announcement(payload: &[u8]) -> Result<(String, SerializationMethod)> {
    let text = std::str::from_utf8(payload)
        .map_err(|_| Error::Protocol("control message is not UTF-8".to_string()))?;

    let body = text.strip_prefix(CREATE_TOPIC_TAG).ok_or_else(|| {
        Error::Protocol(format!("control message without {:?} tag", CREATE_TOPIC_TAG))
    })?;

    let (name, method) = body
        .split_once(DELIMITER)
        .ok_or_else(|| Error::Protocol("control message without delimiter".to_string()))?;

    if name.is_empty() {
        return Err(Error::Protocol("control message with empty topic name".to_string()));
    }

    Ok((name.to_string(), SerializationMethod::from_wire_name(method)))
}

/// Check that a name can be networked.
///
/// Rejects empty names, names containing the delimiter, and the control
/// topic itself.
pub fn validate_topic_name(name: &str) -> Result<()> {
    if name.is_empty() {
        return Err(Error::InvalidConfig("topic name is empty".to_string()));
    }
    if name == CONTROL_TOPIC {
        return Err(Error::InvalidConfig(format!(
            "topic name {:?} is reserved",
            CONTROL_TOPIC
        )));
    }
    if name.contains(DELIMITER) {
        return Err(Error::InvalidConfig(format!(
            "topic name {:?} contains {:?}",
            name, DELIMITER
        )));
    }
    Ok(())
}

/// Apply a received control payload to the registry.
///
/// Malformed messages are logged and dropped.
pub fn handle(registry: &TopicRegistry, metrics: &LinkMetrics, payload: &[u8]) {
    match parse_announcement(payload) {
        Ok((name, method)) => {
            log::debug!("[CONTROL] peer announced topic '{}' ({})", name, method);
            registry.insert(&name, TopicConfig::announced(method), TopicOrigin::Announced);
            metrics.record_announcement();
        }
        Err(e) => {
            log::warn!("[CONTROL] dropping control message: {}", e);
            metrics.record_control_rejected();
        }
    }
}
