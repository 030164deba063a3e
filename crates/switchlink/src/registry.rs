// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Networked topic registry.
//!
//! Written by caller threads (`topic_create`) and by the endpoint's
//! background thread (control announcements), so every access takes the
//! lock. Entries are never removed.

use crate::topic::TopicConfig;
use parking_lot::RwLock;
use std::collections::HashMap;

/// Where a registry entry came from.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TopicOrigin {
    /// Created by a local `topic_create`
    Local,
    /// Mirrored from a peer announcement
    Announced,
}

#[derive(Clone, Debug)]
struct Entry {
    config: TopicConfig,
    origin: TopicOrigin,
}

/// Thread-safe `topic_name -> TopicConfig` map.
///
/// Membership in the map is what makes a topic networked.
#[derive(Debug, Default)]
pub struct TopicRegistry {
    topics: RwLock<HashMap<String, Entry>>,
}

impl TopicRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a topic. Last write wins.
    ///
    /// Returns the previous config if the name was already present.
    pub fn insert(&self, name: &str, config: TopicConfig, origin: TopicOrigin) -> Option<TopicConfig> {
        self.topics
            .write()
            .insert(name.to_string(), Entry { config, origin })
            .map(|prev| prev.config)
    }

    /// Whether the topic is networked.
    pub fn contains(&self, name: &str) -> bool {
        self.topics.read().contains_key(name)
    }

    /// Locally recorded config for a topic.
    pub fn config(&self, name: &str) -> Option<TopicConfig> {
        self.topics.read().get(name).map(|e| e.config.clone())
    }

    /// Origin of a topic entry.
    pub fn origin(&self, name: &str) -> Option<TopicOrigin> {
        self.topics.read().get(name).map(|e| e.origin)
    }

    /// Number of networked topics.
    pub fn len(&self) -> usize {
        self.topics.read().len()
    }

    /// Whether no topic is networked yet.
    pub fn is_empty(&self) -> bool {
        self.topics.read().is_empty()
    }

    /// Sorted list of networked topic names.
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.topics.read().keys().cloned().collect();
        names.sort();
        names
    }
}
