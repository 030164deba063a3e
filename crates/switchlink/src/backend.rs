// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Network backend contract.
//!
//! [`NetworkBackend`] is the only surface plugins see. Transports implement
//! the small required part (`transmit`, `stop`, accessors); the topic-level
//! operations are provided on top of it and behave identically for every
//! transport:
//!
//! - `topic_create` records the topic locally and announces it to the peer
//! - `is_topic_networked` answers from the registry
//! - `topic_send` forwards payloads of networked topics and drops the rest
//!
//! Received messages go through [`Dispatcher::deliver`], which routes control
//! announcements to the registry and ordinary payloads to the local bus.

use crate::bus::TopicBus;
use crate::config::BackendConfig;
use crate::control::{self, CONTROL_TOPIC};
use crate::error::Result;
use crate::metrics::LinkMetrics;
use crate::registry::{TopicOrigin, TopicRegistry};
use crate::topic::{Priority, TopicConfig};
use crate::transport::shm::ShmBackend;
use crate::transport::tcp::TcpBackend;
use crate::transport::{LinkState, Role};
use std::sync::Arc;

/// Replication of selected topics to a single peer.
pub trait NetworkBackend: Send + Sync {
    /// Role this endpoint was built with.
    fn role(&self) -> Role;

    /// Current lifecycle state.
    fn state(&self) -> LinkState;

    /// Networked topics known to this endpoint.
    fn registry(&self) -> &TopicRegistry;

    /// Link counters.
    fn metrics(&self) -> &LinkMetrics;

    /// Hand one message to the transport, blocking until it is accepted.
    fn transmit(&self, topic: &str, payload: &[u8], config: &TopicConfig) -> Result<()>;

    /// Stop the receive thread and release the connection.
    fn stop(&self);

    /// Mark `name` as networked and announce it to the peer.
    ///
    /// Calling it again for the same name replaces the stored config and
    /// re-announces. Invalid names are logged and ignored.
    fn topic_create(&self, name: &str, config: TopicConfig) {
        if let Err(e) = control::validate_topic_name(name) {
            log::warn!("[BACKEND] topic_create ignored: {}", e);
            return;
        }

        let announcement = control::encode_announcement(name, config.serialization_method);
        if self.registry().insert(name, config, TopicOrigin::Local).is_some() {
            log::debug!("[BACKEND] topic '{}' re-created, config replaced", name);
        }

        if let Err(e) = self.transmit(CONTROL_TOPIC, &announcement, &control_config()) {
            log::warn!("[BACKEND] announcing topic '{}' failed: {}", name, e);
            self.metrics().record_send_error();
        }
    }

    /// Whether the topic was created locally or announced by the peer.
    fn is_topic_networked(&self, name: &str) -> bool {
        self.registry().contains(name)
    }

    /// Forward a payload to the peer.
    ///
    /// Does nothing (besides logging) for topics that are not networked.
    /// Transport failures are logged and counted, never returned.
    fn topic_send(&self, name: &str, payload: &[u8]) {
        let Some(config) = self.registry().config(name) else {
            log::debug!("[BACKEND] topic '{}' is not networked, dropping send", name);
            self.metrics().record_not_networked();
            return;
        };

        if let Err(e) = self.transmit(name, payload, &config) {
            log::warn!("[BACKEND] send on topic '{}' failed: {}", name, e);
            self.metrics().record_send_error();
        }
    }
}

/// Config used for control announcements.
///
/// Highest priority, so on the shared-memory transport an announcement is
/// dequeued ahead of data already queued for the same topic.
pub(crate) fn control_config() -> TopicConfig {
    TopicConfig::default().with_priority(Priority::Highest)
}

/// Receive-side routing shared by both transports.
#[derive(Clone)]
pub(crate) struct Dispatcher {
    pub(crate) registry: Arc<TopicRegistry>,
    pub(crate) metrics: Arc<LinkMetrics>,
    bus: Arc<dyn TopicBus>,
}

impl Dispatcher {
    pub(crate) fn new(bus: Arc<dyn TopicBus>) -> Self {
        Self {
            registry: Arc::new(TopicRegistry::new()),
            metrics: Arc::new(LinkMetrics::new()),
            bus,
        }
    }

    /// Route one received message.
    pub(crate) fn deliver(&self, topic: &str, payload: Vec<u8>) {
        if topic == CONTROL_TOPIC {
            control::handle(&self.registry, &self.metrics, &payload);
            return;
        }

        if !self.bus.topic_exists(topic) {
            log::debug!("[BACKEND] no local topic '{}', dropping {} bytes", topic, payload.len());
            self.metrics.record_unknown_topic();
            return;
        }

        let config = self.registry.config(topic).unwrap_or_default();
        self.bus.deserialize_and_put(topic, payload, &config);
        self.metrics.record_delivered();
    }
}

/// Build the backend selected by `config`.
///
/// Blocks until the link is established (TCP) or the queues are
/// created/attached (shared memory). Setup failures are returned.
pub fn create_backend(config: BackendConfig, bus: Arc<dyn TopicBus>) -> Result<Box<dyn NetworkBackend>> {
    config.validate()?;
    log::info!("[BACKEND] starting {} backend", config.kind());

    let backend: Box<dyn NetworkBackend> = match config {
        BackendConfig::Tcp(tcp) => Box::new(TcpBackend::new(tcp, bus)?),
        BackendConfig::Shm(shm) => Box::new(ShmBackend::new(shm, bus)?),
    };
    Ok(backend)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bus::MemoryBus;
    use crate::error::Error;
    use crate::topic::SerializationMethod;
    use parking_lot::Mutex;

    /// Backend that records transmitted messages instead of sending them.
    struct LoopbackBackend {
        dispatcher: Dispatcher,
        sent: Mutex<Vec<(String, Vec<u8>, TopicConfig)>>,
        fail: bool,
    }

    impl LoopbackBackend {
        fn new(bus: Arc<dyn TopicBus>) -> Self {
            Self {
                dispatcher: Dispatcher::new(bus),
                sent: Mutex::new(Vec::new()),
                fail: false,
            }
        }
    }

    impl NetworkBackend for LoopbackBackend {
        fn role(&self) -> Role {
            Role::Server
        }

        fn state(&self) -> LinkState {
            LinkState::Running
        }

        fn registry(&self) -> &TopicRegistry {
            &self.dispatcher.registry
        }

        fn metrics(&self) -> &LinkMetrics {
            &self.dispatcher.metrics
        }

        fn transmit(&self, topic: &str, payload: &[u8], config: &TopicConfig) -> Result<()> {
            if self.fail {
                return Err(Error::Stopped);
            }
            self.sent
                .lock()
                .push((topic.to_string(), payload.to_vec(), config.clone()));
            Ok(())
        }

        fn stop(&self) {}
    }

    #[test]
    fn test_topic_create_announces() {
        let backend = LoopbackBackend::new(Arc::new(MemoryBus::new()));
        backend.topic_create(
            "pose",
            TopicConfig::default().with_serialization(SerializationMethod::SchemaBased),
        );

        assert!(backend.is_topic_networked("pose"));
        let sent = backend.sent.lock();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].0, CONTROL_TOPIC);
        assert_eq!(sent[0].1, b"create_topicpose:SCHEMA_BASED".to_vec());
        assert_eq!(sent[0].2.priority, Priority::Highest);
    }

    #[test]
    fn test_topic_create_rejects_bad_names() {
        let backend = LoopbackBackend::new(Arc::new(MemoryBus::new()));
        backend.topic_create("a:b", TopicConfig::default());
        backend.topic_create(CONTROL_TOPIC, TopicConfig::default());
        backend.topic_create("", TopicConfig::default());

        assert!(backend.registry().is_empty());
        assert!(backend.sent.lock().is_empty());
    }

    #[test]
    fn test_topic_send_requires_networked_topic() {
        let backend = LoopbackBackend::new(Arc::new(MemoryBus::new()));
        backend.topic_send("pose", b"\x01");
        assert!(backend.sent.lock().is_empty());
        assert_eq!(backend.metrics().snapshot().not_networked_drops, 1);

        backend.topic_create("pose", TopicConfig::default().with_priority(Priority::Low));
        backend.topic_send("pose", b"\x01\x02\x03");

        let sent = backend.sent.lock();
        assert_eq!(sent.len(), 2);
        assert_eq!(sent[1].0, "pose");
        assert_eq!(sent[1].1, vec![1, 2, 3]);
        assert_eq!(sent[1].2.priority, Priority::Low);
    }

    #[test]
    fn test_transmit_failure_is_absorbed() {
        let mut backend = LoopbackBackend::new(Arc::new(MemoryBus::new()));
        backend.fail = true;

        backend.topic_create("pose", TopicConfig::default());
        backend.topic_send("pose", b"x");

        // Local registration survives the failed announcement
        assert!(backend.is_topic_networked("pose"));
        assert_eq!(backend.metrics().snapshot().send_errors, 2);
    }

    #[test]
    fn test_deliver_routes_control() {
        let bus = Arc::new(MemoryBus::new());
        let dispatcher = Dispatcher::new(bus.clone());

        dispatcher.deliver(CONTROL_TOPIC, b"create_topicpose:STRUCT_BINARY".to_vec());

        assert!(dispatcher.registry.contains("pose"));
        assert_eq!(bus.total_events(), 0);
    }

    #[test]
    fn test_deliver_drops_unknown_topic() {
        let bus = Arc::new(MemoryBus::with_topics(&["pose"]));
        let dispatcher = Dispatcher::new(bus.clone());

        dispatcher.deliver("unknown", vec![1, 2]);

        assert_eq!(bus.total_events(), 0);
        assert_eq!(dispatcher.metrics.snapshot().unknown_topic_drops, 1);
    }

    #[test]
    fn test_deliver_uses_recorded_config() {
        let bus = Arc::new(MemoryBus::with_topics(&["pose", "imu"]));
        let dispatcher = Dispatcher::new(bus.clone());
        dispatcher.deliver(CONTROL_TOPIC, b"create_topicpose:SCHEMA_BASED".to_vec());

        dispatcher.deliver("pose", vec![1]);
        dispatcher.deliver("imu", vec![2]);

        assert_eq!(
            bus.events("pose")[0].serialization_method,
            SerializationMethod::SchemaBased
        );
        // No registry entry: default config
        assert_eq!(
            bus.events("imu")[0].serialization_method,
            SerializationMethod::StructBinary
        );
        assert_eq!(dispatcher.metrics.snapshot().delivered, 2);
    }
}
