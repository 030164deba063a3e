// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! # switchlink - topic replication between two bus instances
//!
//! Mirrors publish traffic for selected topics from one in-process
//! publish/subscribe bus to a peer bus running in another process or on
//! another machine.
//!
//! ## Architecture
//!
//! ```text
//! +---------------------------------------------------------------------+
//! |                          Plugins / Bus                              |
//! |     topic_create -> is_topic_networked -> topic_send                |
//! +---------------------------------------------------------------------+
//! |                     NetworkBackend (facade)                         |
//! |   TopicRegistry | Control announcements | Delivery to TopicBus      |
//! +---------------------------------------------------------------------+
//! |                           Transports                                |
//! |   TCP (length-prefixed frames)  |  SHM (checksummed envelopes,      |
//! |                                 |       priority message queues)    |
//! +---------------------------------------------------------------------+
//! ```
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use switchlink::{create_backend, BackendConfig, MemoryBus, TopicConfig};
//!
//! fn main() -> switchlink::Result<()> {
//!     let bus = Arc::new(MemoryBus::new());
//!     let backend = create_backend(BackendConfig::from_env()?, bus)?;
//!
//!     backend.topic_create("pose", TopicConfig::default());
//!     backend.topic_send("pose", b"\x01\x02\x03");
//!     Ok(())
//! }
//! ```
//!
//! ## Modules Overview
//!
//! - [`backend`] - the `NetworkBackend` contract and backend selection
//! - [`control`] - topic announcement sub-protocol
//! - [`topic`] - per-topic delivery policy
//! - [`transport`] - TCP and shared-memory endpoints

/// `NetworkBackend` trait, delivery path and backend selection.
pub mod backend;
/// Bus collaborator seam (`TopicBus`) and an in-memory implementation.
pub mod bus;
/// Backend selection and environment-driven configuration.
pub mod config;
/// Control topic announcements (topic bootstrap between peers).
pub mod control;
mod error;
/// Link counters shared by both transports.
pub mod metrics;
/// Thread-safe topic registry.
pub mod registry;
/// Topic delivery policy (`TopicConfig`).
pub mod topic;
/// TCP and shared-memory transports.
pub mod transport;

pub use backend::{create_backend, NetworkBackend};
pub use bus::{MemoryBus, TopicBus};
pub use config::{BackendConfig, BackendKind};
pub use control::CONTROL_TOPIC;
pub use error::{Error, Result};
pub use metrics::{LinkMetrics, LinkMetricsSnapshot};
pub use registry::TopicRegistry;
pub use topic::{Packetization, Priority, SerializationMethod, TopicConfig};
pub use transport::shm::{ShmBackend, ShmConfig};
pub use transport::tcp::{TcpBackend, TcpConfig};
pub use transport::{LinkState, Role};
