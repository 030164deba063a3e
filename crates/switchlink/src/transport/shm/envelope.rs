// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Checksummed message envelope carried by the shared-memory queues.
//!
//! # Wire Format
//!
//! All integers little-endian:
//!
//! ```text
//! +-------+-----------+-------------+----------+-------------------+-------+---------+
//! | magic | topic_len | payload_len | checksum | send_timestamp_ns | topic | payload |
//! | u32   | u32       | u32         | i64      | u64               |       |         |
//! +-------+-----------+-------------+----------+-------------------+-------+---------+
//! ```
//!
//! The checksum is the CRC-32 of the payload only, widened to `i64`.

use super::{Result, ShmError};
use std::time::{SystemTime, UNIX_EPOCH};

/// "SLEV" in little-endian
pub const ENVELOPE_MAGIC: u32 = u32::from_le_bytes(*b"SLEV");

/// Fixed part of an encoded envelope.
pub const ENVELOPE_HEADER_SIZE: usize = 4 + 4 + 4 + 8 + 8;

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Envelope {
    pub topic: String,
    pub payload: Vec<u8>,
    pub checksum: i64,
    /// Sender wall clock, nanoseconds since the Unix epoch
    pub send_timestamp_ns: u64,
}

impl Envelope {
    /// Wrap a payload, computing its checksum and stamping the send time.
    pub fn new(topic: &str, payload: Vec<u8>) -> Self {
        let send_timestamp_ns = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_nanos() as u64)
            .unwrap_or(0);
        Self {
            topic: topic.to_string(),
            checksum: checksum_of(&payload),
            payload,
            send_timestamp_ns,
        }
    }

    /// Size of [`encode`](Self::encode)'s output.
    pub fn encoded_len(&self) -> usize {
        ENVELOPE_HEADER_SIZE + self.topic.len() + self.payload.len()
    }

    pub fn encode(&self) -> Vec<u8> {
        let mut buf = Vec::with_capacity(self.encoded_len());
        buf.extend_from_slice(&ENVELOPE_MAGIC.to_le_bytes());
        buf.extend_from_slice(&(self.topic.len() as u32).to_le_bytes());
        buf.extend_from_slice(&(self.payload.len() as u32).to_le_bytes());
        buf.extend_from_slice(&self.checksum.to_le_bytes());
        buf.extend_from_slice(&self.send_timestamp_ns.to_le_bytes());
        buf.extend_from_slice(self.topic.as_bytes());
        buf.extend_from_slice(&self.payload);
        buf
    }

    /// Parse an envelope. The checksum is not verified here.
    pub fn decode(buf: &[u8]) -> Result<Self> {
        if buf.len() < ENVELOPE_HEADER_SIZE {
            return Err(ShmError::MalformedEnvelope(format!(
                "{} bytes, header needs {}",
                buf.len(),
                ENVELOPE_HEADER_SIZE
            )));
        }

        let magic = read_u32(buf, 0);
        if magic != ENVELOPE_MAGIC {
            return Err(ShmError::MalformedEnvelope(format!("bad magic {:#010x}", magic)));
        }

        let topic_len = read_u32(buf, 4) as usize;
        let payload_len = read_u32(buf, 8) as usize;
        let checksum = read_u64(buf, 12) as i64;
        let send_timestamp_ns = read_u64(buf, 20);

        let expected = ENVELOPE_HEADER_SIZE + topic_len + payload_len;
        if buf.len() != expected {
            return Err(ShmError::MalformedEnvelope(format!(
                "{} bytes, lengths announce {}",
                buf.len(),
                expected
            )));
        }

        let topic_end = ENVELOPE_HEADER_SIZE + topic_len;
        let topic = std::str::from_utf8(&buf[ENVELOPE_HEADER_SIZE..topic_end])
            .map_err(|_| ShmError::MalformedEnvelope("topic is not UTF-8".to_string()))?
            .to_string();

        Ok(Self {
            topic,
            payload: buf[topic_end..].to_vec(),
            checksum,
            send_timestamp_ns,
        })
    }

    /// Recompute the payload checksum and compare.
    pub fn verify(&self) -> Result<()> {
        let actual = checksum_of(&self.payload);
        if actual != self.checksum {
            return Err(ShmError::ChecksumMismatch {
                expected: self.checksum,
                actual,
            });
        }
        Ok(())
    }
}

/// CRC-32 of `payload`, widened to `i64`.
pub fn checksum_of(payload: &[u8]) -> i64 {
    crc32fast::hash(payload) as i64
}

fn read_u32(buf: &[u8], at: usize) -> u32 {
    u32::from_le_bytes([buf[at], buf[at + 1], buf[at + 2], buf[at + 3]])
}

fn read_u64(buf: &[u8], at: usize) -> u64 {
    let mut bytes = [0u8; 8];
    bytes.copy_from_slice(&buf[at..at + 8]);
    u64::from_le_bytes(bytes)
}
