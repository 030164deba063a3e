// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Link metrics.
//!
//! Counters shared by the TCP and shared-memory backends. Every runtime drop
//! path increments a counter here, since drops never surface to callers.
//!
//! # Example
//!
//! ```
//! use switchlink::LinkMetrics;
//!
//! let metrics = LinkMetrics::new();
//! metrics.record_message_sent(1024);
//!
//! let snapshot = metrics.snapshot();
//! assert_eq!(snapshot.messages_sent, 1);
//! assert_eq!(snapshot.bytes_sent, 1024);
//! ```

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

/// Counters for one link.
#[derive(Debug)]
pub struct LinkMetrics {
    // Traffic
    /// Messages handed to the transport (control included)
    messages_sent: AtomicU64,
    /// Messages received and validated (control included)
    messages_received: AtomicU64,
    /// Bytes written to the transport (framing included)
    bytes_sent: AtomicU64,
    /// Bytes read from the transport (framing included)
    bytes_received: AtomicU64,

    // Drops
    /// Payloads delivered to the local bus
    delivered: AtomicU64,
    /// Received payloads for topics unknown to the local bus
    unknown_topic_drops: AtomicU64,
    /// `topic_send` calls on topics that are not networked
    not_networked_drops: AtomicU64,
    /// Sends that failed in the transport
    send_errors: AtomicU64,
    /// Envelopes whose payload checksum did not match
    checksum_failures: AtomicU64,
    /// Frames or envelopes that could not be parsed
    malformed: AtomicU64,

    // Control
    /// Topic announcements accepted from the peer
    announcements_received: AtomicU64,
    /// Control messages dropped as malformed
    control_rejected: AtomicU64,

    /// When metrics collection started
    start_time: Instant,
}

impl LinkMetrics {
    /// Create a zeroed metrics instance.
    pub fn new() -> Self {
        Self {
            messages_sent: AtomicU64::new(0),
            messages_received: AtomicU64::new(0),
            bytes_sent: AtomicU64::new(0),
            bytes_received: AtomicU64::new(0),
            delivered: AtomicU64::new(0),
            unknown_topic_drops: AtomicU64::new(0),
            not_networked_drops: AtomicU64::new(0),
            send_errors: AtomicU64::new(0),
            checksum_failures: AtomicU64::new(0),
            malformed: AtomicU64::new(0),
            announcements_received: AtomicU64::new(0),
            control_rejected: AtomicU64::new(0),
            start_time: Instant::now(),
        }
    }

    /// Record a message written to the transport.
    pub fn record_message_sent(&self, bytes: usize) {
        self.messages_sent.fetch_add(1, Ordering::Relaxed);
        self.bytes_sent.fetch_add(bytes as u64, Ordering::Relaxed);
    }

    /// Record a validated message read from the transport.
    pub fn record_message_received(&self) {
        self.messages_received.fetch_add(1, Ordering::Relaxed);
    }

    /// Record raw bytes read from the transport.
    pub fn record_bytes_received(&self, bytes: usize) {
        self.bytes_received.fetch_add(bytes as u64, Ordering::Relaxed);
    }

    /// Record a payload injected into the local bus.
    pub fn record_delivered(&self) {
        self.delivered.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a payload dropped because the bus does not know its topic.
    pub fn record_unknown_topic(&self) {
        self.unknown_topic_drops.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a send dropped because its topic is not networked.
    pub fn record_not_networked(&self) {
        self.not_networked_drops.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a transport send failure.
    pub fn record_send_error(&self) {
        self.send_errors.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a checksum mismatch.
    pub fn record_checksum_failure(&self) {
        self.checksum_failures.fetch_add(1, Ordering::Relaxed);
    }

    /// Record an unparseable frame or envelope.
    pub fn record_malformed(&self) {
        self.malformed.fetch_add(1, Ordering::Relaxed);
    }

    /// Record an accepted topic announcement.
    pub fn record_announcement(&self) {
        self.announcements_received.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a rejected control message.
    pub fn record_control_rejected(&self) {
        self.control_rejected.fetch_add(1, Ordering::Relaxed);
    }

    /// Time since metrics collection started.
    pub fn uptime(&self) -> Duration {
        self.start_time.elapsed()
    }

    /// Point-in-time copy of all counters.
    pub fn snapshot(&self) -> LinkMetricsSnapshot {
        LinkMetricsSnapshot {
            messages_sent: self.messages_sent.load(Ordering::Relaxed),
            messages_received: self.messages_received.load(Ordering::Relaxed),
            bytes_sent: self.bytes_sent.load(Ordering::Relaxed),
            bytes_received: self.bytes_received.load(Ordering::Relaxed),
            delivered: self.delivered.load(Ordering::Relaxed),
            unknown_topic_drops: self.unknown_topic_drops.load(Ordering::Relaxed),
            not_networked_drops: self.not_networked_drops.load(Ordering::Relaxed),
            send_errors: self.send_errors.load(Ordering::Relaxed),
            checksum_failures: self.checksum_failures.load(Ordering::Relaxed),
            malformed: self.malformed.load(Ordering::Relaxed),
            announcements_received: self.announcements_received.load(Ordering::Relaxed),
            control_rejected: self.control_rejected.load(Ordering::Relaxed),
            uptime: self.uptime(),
        }
    }
}

impl Default for LinkMetrics {
    fn default() -> Self {
        Self::new()
    }
}

/// Snapshot of [`LinkMetrics`].
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct LinkMetricsSnapshot {
    pub messages_sent: u64,
    pub messages_received: u64,
    pub bytes_sent: u64,
    pub bytes_received: u64,
    pub delivered: u64,
    pub unknown_topic_drops: u64,
    pub not_networked_drops: u64,
    pub send_errors: u64,
    pub checksum_failures: u64,
    pub malformed: u64,
    pub announcements_received: u64,
    pub control_rejected: u64,
    pub uptime: Duration,
}

impl LinkMetricsSnapshot {
    /// Total runtime drops of any kind.
    pub fn total_drops(&self) -> u64 {
        self.unknown_topic_drops
            + self.not_networked_drops
            + self.send_errors
            + self.checksum_failures
            + self.malformed
            + self.control_rejected
    }
}
