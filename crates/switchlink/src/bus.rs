// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Seam towards the in-process publish/subscribe bus.
//!
//! The backend only needs two things from the bus: whether a topic exists
//! locally, and a way to inject a received payload as a new event. Payload
//! decoding belongs to the bus; the backend hands over the raw bytes and the
//! locally recorded [`TopicConfig`] so the bus can pick the right codec.

use crate::topic::{SerializationMethod, TopicConfig};
use parking_lot::{Condvar, Mutex};
use std::collections::HashMap;
use std::time::{Duration, Instant};

/// Bus operations consumed by network backends.
pub trait TopicBus: Send + Sync {
    /// Whether the local bus has a topic with this name.
    fn topic_exists(&self, name: &str) -> bool;

    /// Decode `payload` according to `config` and publish it on `name`
    /// as if a local writer had put it.
    fn deserialize_and_put(&self, name: &str, payload: Vec<u8>, config: &TopicConfig);
}

/// One event injected into a [`MemoryBus`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct BusEvent {
    /// Raw payload bytes
    pub payload: Vec<u8>,
    /// Codec the bus was asked to use
    pub serialization_method: SerializationMethod,
}

/// In-memory bus that records injected events per topic.
///
/// Topics must be registered before events for them are accepted, which
/// mirrors a real bus where a reader or writer has to create the topic.
#[derive(Debug, Default)]
pub struct MemoryBus {
    topics: Mutex<HashMap<String, Vec<BusEvent>>>,
    arrived: Condvar,
}

impl MemoryBus {
    /// Create an empty bus.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a bus with the given topics registered.
    pub fn with_topics(names: &[&str]) -> Self {
        let bus = Self::new();
        for name in names {
            bus.register_topic(name);
        }
        bus
    }

    /// Register a topic so that events for it are accepted.
    pub fn register_topic(&self, name: &str) {
        self.topics.lock().entry(name.to_string()).or_default();
    }

    /// Events received on a topic, in arrival order.
    pub fn events(&self, name: &str) -> Vec<BusEvent> {
        self.topics.lock().get(name).cloned().unwrap_or_default()
    }

    /// Payloads received on a topic, in arrival order.
    pub fn payloads(&self, name: &str) -> Vec<Vec<u8>> {
        self.events(name).into_iter().map(|e| e.payload).collect()
    }

    /// Total number of events across all topics.
    pub fn total_events(&self) -> usize {
        self.topics.lock().values().map(Vec::len).sum()
    }

    /// Block until `name` holds at least `count` events or `timeout` expires.
    ///
    /// Returns `true` if the count was reached.
    pub fn wait_for(&self, name: &str, count: usize, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        let mut topics = self.topics.lock();
        loop {
            if topics.get(name).map_or(0, Vec::len) >= count {
                return true;
            }
            if self.arrived.wait_until(&mut topics, deadline).timed_out() {
                return topics.get(name).map_or(0, Vec::len) >= count;
            }
        }
    }
}

impl TopicBus for MemoryBus {
    fn topic_exists(&self, name: &str) -> bool {
        self.topics.lock().contains_key(name)
    }

    fn deserialize_and_put(&self, name: &str, payload: Vec<u8>, config: &TopicConfig) {
        let mut topics = self.topics.lock();
        if let Some(events) = topics.get_mut(name) {
            events.push(BusEvent {
                payload,
                serialization_method: config.serialization_method,
            });
            self.arrived.notify_all();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;

    #[test]
    fn test_unregistered_topic_ignored() {
        let bus = MemoryBus::new();
        assert!(!bus.topic_exists("pose"));
        bus.deserialize_and_put("pose", vec![1], &TopicConfig::default());
        assert_eq!(bus.total_events(), 0);
    }

    #[test]
    fn test_events_recorded_in_order() {
        let bus = MemoryBus::with_topics(&["pose"]);
        bus.deserialize_and_put("pose", vec![1], &TopicConfig::default());
        bus.deserialize_and_put(
            "pose",
            vec![2],
            &TopicConfig::announced(SerializationMethod::SchemaBased),
        );

        let events = bus.events("pose");
        assert_eq!(events.len(), 2);
        assert_eq!(events[0].payload, vec![1]);
        assert_eq!(events[1].serialization_method, SerializationMethod::SchemaBased);
    }

    #[test]
    fn test_wait_for_wakes_on_arrival() {
        let bus = Arc::new(MemoryBus::with_topics(&["imu"]));
        let producer = Arc::clone(&bus);
        let handle = thread::spawn(move || {
            thread::sleep(Duration::from_millis(20));
            producer.deserialize_and_put("imu", vec![7], &TopicConfig::default());
        });

        assert!(bus.wait_for("imu", 1, Duration::from_secs(5)));
        handle.join().expect("producer panicked");
    }

    #[test]
    fn test_wait_for_times_out() {
        let bus = MemoryBus::with_topics(&["imu"]);
        assert!(!bus.wait_for("imu", 1, Duration::from_millis(20)));
    }
}
