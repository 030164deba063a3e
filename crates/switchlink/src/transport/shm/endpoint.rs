// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Shared-memory endpoint.

use super::config::ShmConfig;
use super::envelope::Envelope;
use super::queue::ShmMessageQueue;
use crate::backend::{Dispatcher, NetworkBackend};
use crate::bus::TopicBus;
use crate::error::{Error, Result};
use crate::metrics::LinkMetrics;
use crate::registry::TopicRegistry;
use crate::topic::TopicConfig;
use crate::transport::{AtomicLinkState, LinkState, Role};
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

struct Shared {
    state: AtomicLinkState,
    running: AtomicBool,
}

/// Network backend over a pair of shared-memory queues.
///
/// The server's queues are unlinked when the backend is dropped. A process
/// that exits without running destructors (`std::process::exit`, a fatal
/// signal, abort) leaves both names behind; the next server started with the
/// same prefix unlinks and re-creates them, so stale messages never reach a
/// new client.
pub struct ShmBackend {
    config: ShmConfig,
    dispatcher: Dispatcher,
    shared: Arc<Shared>,
    send_queue: ShmMessageQueue,
    recv_thread: Mutex<Option<JoinHandle<()>>>,
}

impl ShmBackend {
    /// Create (server) or attach to (client) the queue pair and start the
    /// receive thread.
    ///
    /// The client sleeps `attach_delay` first so a server started at the
    /// same time has created the queues.
    pub fn new(config: ShmConfig, bus: Arc<dyn TopicBus>) -> Result<Self> {
        config.validate().map_err(|e| Error::InvalidConfig(e.to_string()))?;

        let shared = Arc::new(Shared {
            state: AtomicLinkState::new(LinkState::Connecting),
            running: AtomicBool::new(true),
        });

        let (send_name, recv_name) = config.queue_names();
        let (send_queue, recv_queue) = match config.mode {
            Role::Server => (
                ShmMessageQueue::create(&send_name, config.max_msg_count, config.max_msg_size)?,
                ShmMessageQueue::create(&recv_name, config.max_msg_count, config.max_msg_size)?,
            ),
            Role::Client => {
                if !config.attach_delay.is_zero() {
                    log::debug!("[SHM] waiting {:?} before attaching", config.attach_delay);
                    thread::sleep(config.attach_delay);
                }
                (
                    ShmMessageQueue::open(&send_name, config.max_msg_count, config.max_msg_size)?,
                    ShmMessageQueue::open(&recv_name, config.max_msg_count, config.max_msg_size)?,
                )
            }
        };
        shared.state.store(LinkState::Ready);

        let dispatcher = Dispatcher::new(bus);
        let thread_dispatcher = dispatcher.clone();
        let thread_shared = Arc::clone(&shared);
        let poll_interval = config.poll_interval;
        let handle = thread::Builder::new()
            .name(format!("switchlink-shm-{}", config.mode))
            .spawn(move || receive_loop(recv_queue, thread_dispatcher, thread_shared, poll_interval))
            .map_err(|e| Error::Setup(format!("spawn receive thread: {}", e)))?;

        shared.state.transition(LinkState::Ready, LinkState::Running);
        log::info!(
            "[SHM] {} attached (send {}, receive {})",
            config.mode,
            send_name,
            recv_name
        );

        Ok(Self {
            config,
            dispatcher,
            shared,
            send_queue,
            recv_thread: Mutex::new(Some(handle)),
        })
    }

    /// Endpoint configuration.
    pub fn config(&self) -> &ShmConfig {
        &self.config
    }
}

impl NetworkBackend for ShmBackend {
    fn role(&self) -> Role {
        self.config.mode
    }

    fn state(&self) -> LinkState {
        self.shared.state.load()
    }

    fn registry(&self) -> &TopicRegistry {
        &self.dispatcher.registry
    }

    fn metrics(&self) -> &LinkMetrics {
        &self.dispatcher.metrics
    }

    fn transmit(&self, topic: &str, payload: &[u8], config: &TopicConfig) -> Result<()> {
        if !self.shared.running.load(Ordering::Acquire) {
            return Err(Error::Stopped);
        }

        let bytes = Envelope::new(topic, payload.to_vec()).encode();
        if bytes.len() > self.config.max_msg_size {
            return Err(Error::PayloadTooLarge {
                size: bytes.len(),
                limit: self.config.max_msg_size,
            });
        }

        let priority = config.priority.rank();
        // Blocks while the queue is full, re-checking for stop() each interval
        while !self
            .send_queue
            .send_timeout(&bytes, priority, self.config.poll_interval)?
        {
            if !self.shared.running.load(Ordering::Acquire) {
                return Err(Error::Stopped);
            }
        }

        self.dispatcher.metrics.record_message_sent(bytes.len());
        Ok(())
    }

    fn stop(&self) {
        if self.shared.running.swap(false, Ordering::AcqRel) {
            if self.shared.state.load() != LinkState::Stopped {
                self.shared.state.store(LinkState::Stopping);
            }
            log::debug!("[SHM] {} stopping", self.config.mode);
        }
    }
}

impl Drop for ShmBackend {
    fn drop(&mut self) {
        self.stop();
        if let Some(handle) = self.recv_thread.lock().take() {
            if handle.thread().id() != thread::current().id() && handle.join().is_err() {
                log::error!("[SHM] receive thread panicked");
            }
        }
    }
}

fn receive_loop(
    queue: ShmMessageQueue,
    dispatcher: Dispatcher,
    shared: Arc<Shared>,
    poll_interval: std::time::Duration,
) {
    while shared.running.load(Ordering::Acquire) {
        match queue.receive_timeout(poll_interval) {
            Ok(Some(msg)) => {
                dispatcher.metrics.record_bytes_received(msg.data.len());
                handle_envelope(&msg.data, &dispatcher);
            }
            Ok(None) => {}
            Err(e) => {
                log::error!("[SHM] receive on {} failed: {}", queue.name(), e);
                break;
            }
        }
    }

    shared.running.store(false, Ordering::Release);
    shared.state.store(LinkState::Stopped);
    log::debug!("[SHM] receive thread exiting");
    // `queue` drops here; a server-created queue is unlinked
}

fn handle_envelope(bytes: &[u8], dispatcher: &Dispatcher) {
    let envelope = match Envelope::decode(bytes) {
        Ok(envelope) => envelope,
        Err(e) => {
            log::warn!("[SHM] dropping message: {}", e);
            dispatcher.metrics.record_malformed();
            return;
        }
    };

    if let Err(e) = envelope.verify() {
        log::warn!("[SHM] dropping message on topic '{}': {}", envelope.topic, e);
        dispatcher.metrics.record_checksum_failure();
        return;
    }

    dispatcher.metrics.record_message_received();
    dispatcher.deliver(&envelope.topic, envelope.payload);
}
