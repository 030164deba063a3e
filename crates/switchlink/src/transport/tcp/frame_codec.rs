// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Length-prefix framing codec for topic messages over TCP.
//!
//! TCP is a stream protocol without message boundaries. Each topic message
//! is framed as:
//!
//! ```text
//! +------------------+------------------+------------+---------+
//! | total_len (4B LE)| name_len (4B LE) | topic name | payload |
//! +------------------+------------------+------------+---------+
//! ```
//!
//! `total_len` counts the whole frame, both length fields included, so
//! `total_len = 8 + name_len + payload_len`.
//!
//! # Example
//!
//! ```
//! use switchlink::transport::tcp::FrameCodec;
//!
//! let frame = FrameCodec::encode("pose", b"\x01\x02\x03");
//! assert_eq!(&frame[..4], &15u32.to_le_bytes());
//!
//! let mut codec = FrameCodec::with_default_max();
//! codec.feed(&frame);
//! let decoded = codec.decode_buffered().unwrap().unwrap();
//! assert_eq!(decoded.topic, "pose");
//! assert_eq!(decoded.payload, b"\x01\x02\x03");
//! ```

use crate::error::{Error, Result};

/// Frame header size (two u32 length fields).
pub const FRAME_HEADER_SIZE: usize = 8;

/// Default maximum frame size (16 MB).
pub const DEFAULT_MAX_FRAME_SIZE: usize = 16 * 1024 * 1024;

/// One decoded topic message.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Frame {
    /// Topic name
    pub topic: String,
    /// Opaque payload bytes
    pub payload: Vec<u8>,
}

/// Size of the frame that [`FrameCodec::encode`] would produce.
pub fn encoded_len(topic: &str, payload: &[u8]) -> usize {
    FRAME_HEADER_SIZE + topic.len() + payload.len()
}

/// Length-prefix frame codec for the TCP transport.
///
/// Bytes read from the socket are appended with [`feed`](Self::feed);
/// complete frames are then pulled with
/// [`decode_buffered`](Self::decode_buffered) until it returns `Ok(None)`.
/// A partial frame stays buffered until the rest arrives.
#[derive(Debug)]
pub struct FrameCodec {
    /// Accumulation buffer
    buffer: Vec<u8>,

    /// Read position in `buffer`
    pos: usize,

    /// Maximum allowed frame size (anti-OOM protection)
    max_size: usize,

    /// Statistics: frames decoded
    frames_decoded: u64,

    /// Statistics: payload bytes decoded
    bytes_decoded: u64,

    /// Statistics: frames rejected (too large or malformed)
    frames_rejected: u64,
}

impl FrameCodec {
    /// Create a new frame codec with the specified max frame size.
    pub fn new(max_size: usize) -> Self {
        Self {
            buffer: Vec::with_capacity(16384),
            pos: 0,
            max_size,
            frames_decoded: 0,
            bytes_decoded: 0,
            frames_rejected: 0,
        }
    }

    /// Create a codec with default max size (16 MB).
    pub fn with_default_max() -> Self {
        Self::new(DEFAULT_MAX_FRAME_SIZE)
    }

    /// Get maximum allowed frame size.
    pub fn max_size(&self) -> usize {
        self.max_size
    }

    /// Get number of frames successfully decoded.
    pub fn frames_decoded(&self) -> u64 {
        self.frames_decoded
    }

    /// Get total payload bytes decoded.
    pub fn bytes_decoded(&self) -> u64 {
        self.bytes_decoded
    }

    /// Get number of frames rejected.
    pub fn frames_rejected(&self) -> u64 {
        self.frames_rejected
    }

    /// Number of bytes buffered but not yet decoded.
    pub fn buffered_len(&self) -> usize {
        self.buffer.len() - self.pos
    }

    /// Drop all buffered bytes (e.g. after a connection reset).
    pub fn reset(&mut self) {
        self.buffer.clear();
        self.pos = 0;
    }

    /// Encode a topic message into a framed buffer.
    pub fn encode(topic: &str, payload: &[u8]) -> Vec<u8> {
        let mut frame = Vec::with_capacity(encoded_len(topic, payload));
        Self::encode_into(topic, payload, &mut frame);
        frame
    }

    /// Encode a topic message, appending to an existing buffer.
    pub fn encode_into(topic: &str, payload: &[u8], buf: &mut Vec<u8>) {
        let total = encoded_len(topic, payload) as u32;
        buf.extend_from_slice(&total.to_le_bytes());
        buf.extend_from_slice(&(topic.len() as u32).to_le_bytes());
        buf.extend_from_slice(topic.as_bytes());
        buf.extend_from_slice(payload);
    }

    /// Append received bytes to the accumulation buffer.
    pub fn feed(&mut self, data: &[u8]) {
        // Compact once more than half the buffer has been consumed
        if self.pos > 0 && self.pos > self.buffer.len() / 2 {
            self.buffer.drain(..self.pos);
            self.pos = 0;
        }
        self.buffer.extend_from_slice(data);
    }

    /// Try to decode one complete frame from the accumulation buffer.
    ///
    /// Returns:
    /// - `Ok(Some(frame))` - A complete frame was decoded
    /// - `Ok(None)` - Need more data
    /// - `Err(Error::Protocol)` - The stream is corrupt; the connection
    ///   should be dropped
    pub fn decode_buffered(&mut self) -> Result<Option<Frame>> {
        let available = &self.buffer[self.pos..];

        let (name_len, total_len) = match peek_frame_header(available, self.max_size) {
            ParseResult::Incomplete(_) => return Ok(None),
            ParseResult::TooLarge(len) => {
                self.frames_rejected += 1;
                return Err(Error::Protocol(format!(
                    "frame too large: {} bytes (max {})",
                    len, self.max_size
                )));
            }
            ParseResult::Malformed { total_len, name_len } => {
                self.frames_rejected += 1;
                return Err(Error::Protocol(format!(
                    "malformed frame: total_len {} cannot hold name_len {}",
                    total_len, name_len
                )));
            }
            ParseResult::Complete {
                name_len,
                total_len,
            } => (name_len, total_len),
        };

        let name_end = FRAME_HEADER_SIZE + name_len;
        let topic = match std::str::from_utf8(&available[FRAME_HEADER_SIZE..name_end]) {
            Ok(s) => s.to_string(),
            Err(_) => {
                self.frames_rejected += 1;
                return Err(Error::Protocol("topic name is not UTF-8".to_string()));
            }
        };
        let payload = available[name_end..total_len].to_vec();

        self.pos += total_len;
        if self.pos == self.buffer.len() {
            self.buffer.clear();
            self.pos = 0;
        }

        self.frames_decoded += 1;
        self.bytes_decoded += payload.len() as u64;

        Ok(Some(Frame { topic, payload }))
    }
}

/// Result of attempting to parse a frame from a buffer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ParseResult {
    /// Complete frame found
    Complete {
        /// Topic name length
        name_len: usize,
        /// Whole frame length
        total_len: usize,
    },
    /// Need this many more bytes
    Incomplete(usize),
    /// Frame length exceeds maximum
    TooLarge(usize),
    /// Length fields are inconsistent
    Malformed {
        /// Announced frame length
        total_len: usize,
        /// Announced name length
        name_len: usize,
    },
}

/// Parse a frame header from a buffer without consuming.
pub fn peek_frame_header(buf: &[u8], max_size: usize) -> ParseResult {
    if buf.len() < FRAME_HEADER_SIZE {
        return ParseResult::Incomplete(FRAME_HEADER_SIZE - buf.len());
    }

    let total_len = u32::from_le_bytes([buf[0], buf[1], buf[2], buf[3]]) as usize;
    let name_len = u32::from_le_bytes([buf[4], buf[5], buf[6], buf[7]]) as usize;

    if total_len > max_size {
        return ParseResult::TooLarge(total_len);
    }

    if total_len < FRAME_HEADER_SIZE || name_len > total_len - FRAME_HEADER_SIZE {
        return ParseResult::Malformed {
            total_len,
            name_len,
        };
    }

    if buf.len() < total_len {
        return ParseResult::Incomplete(total_len - buf.len());
    }

    ParseResult::Complete {
        name_len,
        total_len,
    }
}

// ============================================================================
// Tests
// ============================================================================
