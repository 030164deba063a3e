// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! TCP transport.
//!
//! One connection between a server and a client endpoint. Messages are
//! length-prefixed frames carrying the topic name and the opaque payload:
//!
//! ```text
//! +-------------------------------------------------------------+
//! |                        TcpBackend                           |
//! |   topic_send --> FrameCodec::encode --> write_all (caller)  |
//! |                                                             |
//! |   I/O thread: read (256 KiB) --> FrameCodec --> Dispatcher  |
//! +-------------------------------------------------------------+
//! ```
//!
//! Frames are delivered in send order. There is no retransmission and no
//! reconnection: once the peer hangs up, the link is stopped.

mod config;
mod endpoint;
pub mod frame_codec;

pub use config::{TcpConfig, DEFAULT_CLIENT_ADDR, DEFAULT_SERVER_ADDR};
pub use endpoint::TcpBackend;
pub use frame_codec::{peek_frame_header, Frame, FrameCodec, ParseResult, DEFAULT_MAX_FRAME_SIZE, FRAME_HEADER_SIZE};
