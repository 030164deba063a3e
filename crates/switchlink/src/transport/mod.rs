// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Point-to-point transports.
//!
//! Both transports connect exactly two endpoints for the lifetime of the
//! process. Each endpoint owns one background thread that receives from the
//! peer; sends run on the caller's thread.

pub mod shm;
pub mod tcp;

use std::fmt;
use std::sync::atomic::{AtomicU8, Ordering};

/// Endpoint role, fixed at construction.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum Role {
    /// Accepts the connection / creates the queues
    #[default]
    Server,
    /// Connects to the server / attaches to its queues
    Client,
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Role::Server => f.write_str("server"),
            Role::Client => f.write_str("client"),
        }
    }
}

/// Endpoint lifecycle.
///
/// ```text
/// Uninit -> Connecting -> Ready -> Running -> Stopping -> Stopped
/// ```
///
/// A setup failure goes straight from `Connecting` to `Stopped`. A peer
/// hang-up goes from `Running` to `Stopped`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[repr(u8)]
pub enum LinkState {
    Uninit = 0,
    Connecting = 1,
    Ready = 2,
    Running = 3,
    Stopping = 4,
    Stopped = 5,
}

impl LinkState {
    fn from_u8(v: u8) -> Self {
        match v {
            0 => LinkState::Uninit,
            1 => LinkState::Connecting,
            2 => LinkState::Ready,
            3 => LinkState::Running,
            4 => LinkState::Stopping,
            _ => LinkState::Stopped,
        }
    }
}

/// Lock-free cell holding a [`LinkState`].
#[derive(Debug)]
pub(crate) struct AtomicLinkState(AtomicU8);

impl AtomicLinkState {
    pub(crate) fn new(state: LinkState) -> Self {
        Self(AtomicU8::new(state as u8))
    }

    pub(crate) fn load(&self) -> LinkState {
        LinkState::from_u8(self.0.load(Ordering::Acquire))
    }

    pub(crate) fn store(&self, state: LinkState) {
        self.0.store(state as u8, Ordering::Release);
    }

    /// Move to `next` only if the current state is `from`.
    pub(crate) fn transition(&self, from: LinkState, next: LinkState) -> bool {
        self.0
            .compare_exchange(from as u8, next as u8, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_state_transitions() {
        let state = AtomicLinkState::new(LinkState::Uninit);
        state.store(LinkState::Ready);
        assert!(!state.transition(LinkState::Connecting, LinkState::Running));
        assert!(state.transition(LinkState::Ready, LinkState::Running));
        assert_eq!(state.load(), LinkState::Running);
    }

    #[test]
    fn test_role_display() {
        assert_eq!(Role::Client.to_string(), "client");
        assert_eq!(Role::default(), Role::Server);
    }
}
