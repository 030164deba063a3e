// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Shared-memory transport.
//!
//! Two endpoints on the same host exchange checksummed envelopes through a
//! pair of named priority queues in POSIX shared memory.
//!
//! # Architecture
//!
//! ```text
//! Server process                              Client process
//! +------------------+     {prefix}_s2c      +------------------+
//! | ShmBackend       | --------------------> | ShmBackend       |
//! |  (creates both)  |                       |  (attaches both) |
//! |                  | <-------------------- |                  |
//! +------------------+     {prefix}_c2s      +------------------+
//! ```
//!
//! - Each queue is a [`ShmMessageQueue`]: fixed slot count and size, a
//!   futex lock, futex-based blocking on full/empty
//! - Higher [`Priority`](crate::Priority) is dequeued first, FIFO within a
//!   priority
//! - Every message is an [`Envelope`] whose CRC-32 is verified on receipt;
//!   mismatches are logged and dropped
//!
//! # Platform Support
//!
//! Linux is the target (futex syscalls). Other Unix platforms fall back to
//! short sleeps instead of futex waits.

mod config;
mod endpoint;
pub mod envelope;
pub mod futex;
pub mod queue;
pub mod segment;

pub use config::{ShmConfig, DEFAULT_QUEUE_PREFIX};
pub use endpoint::ShmBackend;
pub use envelope::{Envelope, ENVELOPE_HEADER_SIZE, ENVELOPE_MAGIC};
pub use queue::{QueuedMessage, ShmMessageQueue};
pub use segment::ShmSegment;

use std::fmt;
use std::io;

/// Shared-memory layer errors.
#[derive(Debug)]
pub enum ShmError {
    /// Shared memory segment creation failed
    SegmentCreate(io::Error),

    /// Shared memory segment open failed
    SegmentOpen(io::Error),

    /// Memory mapping failed
    Mmap(io::Error),

    /// Segment exists but does not hold a compatible queue
    InvalidLayout(String),

    /// Message larger than a queue slot
    PayloadTooLarge { size: usize, capacity: usize },

    /// Zero or oversized queue limit
    InvalidCapacity(usize),

    /// Invalid segment name
    InvalidName(String),

    /// Segment not found
    NotFound(String),

    /// Envelope bytes are truncated or inconsistent
    MalformedEnvelope(String),

    /// Payload checksum does not match the envelope
    ChecksumMismatch { expected: i64, actual: i64 },
}

impl fmt::Display for ShmError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::SegmentCreate(e) => write!(f, "Shared memory segment creation failed: {e}"),
            Self::SegmentOpen(e) => write!(f, "Shared memory segment open failed: {e}"),
            Self::Mmap(e) => write!(f, "Memory mapping failed: {e}"),
            Self::InvalidLayout(msg) => write!(f, "Incompatible queue layout: {msg}"),
            Self::PayloadTooLarge { size, capacity } => {
                write!(
                    f,
                    "Payload too large: {size} bytes exceeds slot capacity {capacity}"
                )
            }
            Self::InvalidCapacity(cap) => write!(f, "Invalid queue limit: {cap}"),
            Self::InvalidName(name) => write!(f, "Invalid segment name: {name}"),
            Self::NotFound(name) => write!(f, "Segment not found: {name}"),
            Self::MalformedEnvelope(msg) => write!(f, "Malformed envelope: {msg}"),
            Self::ChecksumMismatch { expected, actual } => {
                write!(f, "Checksum mismatch: expected {expected}, computed {actual}")
            }
        }
    }
}

impl std::error::Error for ShmError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::SegmentCreate(e) | Self::SegmentOpen(e) | Self::Mmap(e) => Some(e),
            _ => None,
        }
    }
}

/// Result type for SHM operations
pub type Result<T> = std::result::Result<T, ShmError>;
