// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! TCP endpoint.
//!
//! A background thread establishes the single connection (accept as server,
//! connect as client), hands a writer clone back to the constructor, waits
//! for the constructor to acknowledge it, then runs the blocking
//! read/reassembly loop until EOF, a protocol error or `stop()`.
//!
//! A constructor that gives up (setup error or ready timeout) clears the
//! running flag and joins the thread, so the listening socket is closed by
//! the time `new` returns.

use super::config::TcpConfig;
use super::frame_codec::{encoded_len, FrameCodec};
use crate::backend::{Dispatcher, NetworkBackend};
use crate::bus::TopicBus;
use crate::error::{Error, Result};
use crate::metrics::LinkMetrics;
use crate::registry::TopicRegistry;
use crate::topic::TopicConfig;
use crate::transport::{AtomicLinkState, LinkState, Role};
use crossbeam::channel::{self, RecvTimeoutError};
use parking_lot::Mutex;
use socket2::{Domain, Protocol, Socket, Type};
use std::io::{ErrorKind, Read, Write};
use std::net::{Shutdown, SocketAddr, TcpListener, TcpStream};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

/// Interval at which a pending accept re-checks the running flag.
const ACCEPT_POLL_INTERVAL: Duration = Duration::from_millis(10);

/// State shared with the I/O thread.
struct Shared {
    state: AtomicLinkState,
    running: AtomicBool,
}

/// Network backend over a single TCP connection.
pub struct TcpBackend {
    config: TcpConfig,
    dispatcher: Dispatcher,
    shared: Arc<Shared>,
    /// Sends are serialized so frames never interleave on the stream
    writer: Mutex<TcpStream>,
    /// Handle used by `stop()`; never locked, so a send stalled in
    /// `write_all` cannot hold up shutdown
    closer: TcpStream,
    peer_addr: Option<SocketAddr>,
    io_thread: Mutex<Option<JoinHandle<()>>>,
}

impl TcpBackend {
    /// Establish the link and start the read loop.
    ///
    /// Blocks until the connection is up. Bind, listen, accept and connect
    /// failures are returned as [`Error::Setup`]; by then the I/O thread has
    /// exited and the address is free for another attempt.
    pub fn new(config: TcpConfig, bus: Arc<dyn TopicBus>) -> Result<Self> {
        config.validate().map_err(|e| Error::InvalidConfig(e.to_string()))?;

        let dispatcher = Dispatcher::new(bus);
        let shared = Arc::new(Shared {
            state: AtomicLinkState::new(LinkState::Uninit),
            running: AtomicBool::new(true),
        });
        let (ready_tx, ready_rx) = channel::bounded::<Result<TcpStream>>(1);
        let (ack_tx, ack_rx) = channel::bounded::<()>(1);

        let thread_config = config.clone();
        let thread_dispatcher = dispatcher.clone();
        let thread_shared = Arc::clone(&shared);
        let handle = thread::Builder::new()
            .name(format!("switchlink-tcp-{}", config.role))
            .spawn(move || {
                io_thread(thread_config, thread_dispatcher, thread_shared, ready_tx, ack_rx)
            })
            .map_err(|e| Error::Setup(format!("spawn I/O thread: {}", e)))?;

        let ready = match config.ready_timeout {
            Some(timeout) => ready_rx.recv_timeout(timeout).map_err(|e| match e {
                RecvTimeoutError::Timeout => {
                    Error::Setup(format!("link not ready after {:?}", timeout))
                }
                RecvTimeoutError::Disconnected => {
                    Error::Setup("I/O thread exited during setup".to_string())
                }
            }),
            None => ready_rx
                .recv()
                .map_err(|_| Error::Setup("I/O thread exited during setup".to_string())),
        };

        let established = ready.and_then(|r| r).and_then(|writer| {
            let closer = writer
                .try_clone()
                .map_err(|e| Error::Setup(format!("clone stream: {}", e)))?;
            Ok((writer, closer))
        });

        let (writer, closer) = match established {
            Ok(pair) => pair,
            Err(e) => {
                // Pending accept/connect sees the flag; a handed-over stream
                // is dropped when the thread finds the ack channel closed
                shared.running.store(false, Ordering::Release);
                drop(ack_tx);
                if handle.join().is_err() {
                    log::error!("[TCP] I/O thread panicked during setup");
                }
                return Err(e);
            }
        };

        shared.state.transition(LinkState::Ready, LinkState::Running);
        if ack_tx.send(()).is_err() {
            let _ = handle.join();
            return Err(Error::Setup("I/O thread exited during setup".to_string()));
        }
        let peer_addr = writer.peer_addr().ok();
        log::info!(
            "[TCP] {} link up (peer {})",
            config.role,
            peer_addr.map_or_else(|| "?".to_string(), |a| a.to_string())
        );

        Ok(Self {
            config,
            dispatcher,
            shared,
            writer: Mutex::new(writer),
            closer,
            peer_addr,
            io_thread: Mutex::new(Some(handle)),
        })
    }

    /// Address of the connected peer.
    pub fn peer_addr(&self) -> Option<SocketAddr> {
        self.peer_addr
    }

    /// Endpoint configuration.
    pub fn config(&self) -> &TcpConfig {
        &self.config
    }
}

impl NetworkBackend for TcpBackend {
    fn role(&self) -> Role {
        self.config.role
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

    fn transmit(&self, topic: &str, payload: &[u8], _config: &TopicConfig) -> Result<()> {
        if !self.shared.running.load(Ordering::Acquire) {
            return Err(Error::Stopped);
        }

        let size = encoded_len(topic, payload);
        if size > self.config.max_frame_size {
            return Err(Error::PayloadTooLarge {
                size,
                limit: self.config.max_frame_size,
            });
        }

        let frame = FrameCodec::encode(topic, payload);
        self.writer.lock().write_all(&frame)?;
        self.dispatcher.metrics.record_message_sent(frame.len());
        Ok(())
    }

    fn stop(&self) {
        if !self.shared.running.swap(false, Ordering::AcqRel) {
            return;
        }
        if self.shared.state.load() != LinkState::Stopped {
            self.shared.state.store(LinkState::Stopping);
        }
        // Unblocks the read in the I/O thread and any sender stuck in write_all
        if let Err(e) = self.closer.shutdown(Shutdown::Both) {
            log::debug!("[TCP] shutdown: {}", e);
        }
        log::debug!("[TCP] {} link stopping", self.config.role);
    }
}

impl Drop for TcpBackend {
    fn drop(&mut self) {
        self.stop();
        if let Some(handle) = self.io_thread.lock().take() {
            if handle.thread().id() != thread::current().id() && handle.join().is_err() {
                log::error!("[TCP] I/O thread panicked");
            }
        }
    }
}

// ============================================================================
// I/O thread
// ============================================================================

fn io_thread(
    config: TcpConfig,
    dispatcher: Dispatcher,
    shared: Arc<Shared>,
    ready_tx: channel::Sender<Result<TcpStream>>,
    ack_rx: channel::Receiver<()>,
) {
    shared.state.store(LinkState::Connecting);

    let stream = match establish(&config, &shared.running) {
        Ok(stream) => stream,
        Err(e) => {
            if shared.running.load(Ordering::Acquire) {
                log::error!("[TCP] {} setup failed: {}", config.role, e);
            } else {
                log::debug!("[TCP] {} setup cancelled", config.role);
            }
            shared.state.store(LinkState::Stopped);
            let _ = ready_tx.send(Err(e));
            return;
        }
    };

    let writer = match stream.try_clone() {
        Ok(writer) => writer,
        Err(e) => {
            shared.state.store(LinkState::Stopped);
            let _ = ready_tx.send(Err(Error::Setup(format!("clone stream: {}", e))));
            return;
        }
    };

    shared.state.store(LinkState::Ready);
    // No ack means the constructor gave up and nobody owns this connection
    if ready_tx.send(Ok(writer)).is_err() || ack_rx.recv().is_err() {
        log::debug!("[TCP] {} setup abandoned, closing connection", config.role);
        let _ = stream.shutdown(Shutdown::Both);
        shared.state.store(LinkState::Stopped);
        return;
    }

    read_loop(stream, &config, &dispatcher, &shared.running);

    shared.running.store(false, Ordering::Release);
    shared.state.store(LinkState::Stopped);
    log::debug!("[TCP] {} I/O thread exiting", config.role);
}

fn establish(config: &TcpConfig, running: &AtomicBool) -> Result<TcpStream> {
    match config.role {
        Role::Server => accept_one(config, running),
        Role::Client => connect_with_retries(config, running),
    }
}

fn new_socket(addr: SocketAddr, nodelay: bool) -> std::io::Result<Socket> {
    let socket = Socket::new(Domain::for_address(addr), Type::STREAM, Some(Protocol::TCP))?;
    // SO_REUSEADDR allows rapid rebind after restart (TIME_WAIT)
    socket.set_reuse_address(true)?;
    socket.set_nodelay(nodelay)?;
    Ok(socket)
}

fn accept_one(config: &TcpConfig, running: &AtomicBool) -> Result<TcpStream> {
    let addr = config.server_addr;
    let setup = |what: &str, e: std::io::Error| Error::Setup(format!("{} {}: {}", what, addr, e));

    let socket = new_socket(addr, config.nodelay).map_err(|e| setup("socket", e))?;
    socket.bind(&addr.into()).map_err(|e| setup("bind", e))?;
    socket
        .listen(config.listen_backlog)
        .map_err(|e| setup("listen", e))?;

    let listener: TcpListener = socket.into();
    listener
        .set_nonblocking(true)
        .map_err(|e| setup("set_nonblocking on", e))?;
    log::debug!("[TCP] listening on {}", addr);

    let (stream, peer) = loop {
        if !running.load(Ordering::Acquire) {
            return Err(Error::Stopped);
        }
        match listener.accept() {
            Ok(accepted) => break accepted,
            Err(e) if e.kind() == ErrorKind::WouldBlock => thread::sleep(ACCEPT_POLL_INTERVAL),
            Err(e) if e.kind() == ErrorKind::Interrupted => {}
            Err(e) => return Err(setup("accept on", e)),
        }
    };
    // Accepted sockets may inherit O_NONBLOCK
    stream
        .set_nonblocking(false)
        .map_err(|e| setup("set_nonblocking on", e))?;
    stream
        .set_nodelay(config.nodelay)
        .map_err(|e| setup("set_nodelay on", e))?;
    log::debug!("[TCP] accepted {}", peer);
    // The listener is dropped here: exactly one connection per server
    Ok(stream)
}

fn connect_with_retries(config: &TcpConfig, running: &AtomicBool) -> Result<TcpStream> {
    let mut last_error = None;

    for attempt in 1..=config.connect_attempts {
        if !running.load(Ordering::Acquire) {
            return Err(Error::Stopped);
        }

        match connect_once(config) {
            Ok(stream) => return Ok(stream),
            Err(e) => {
                log::debug!(
                    "[TCP] connect to {} failed (attempt {}/{}): {}",
                    config.server_addr,
                    attempt,
                    config.connect_attempts,
                    e
                );
                last_error = Some(e);
                if attempt < config.connect_attempts {
                    thread::sleep(config.connect_retry_delay);
                }
            }
        }
    }

    Err(Error::Setup(format!(
        "connect to {} failed after {} attempt(s): {}",
        config.server_addr,
        config.connect_attempts,
        last_error.map_or_else(|| "no attempt made".to_string(), |e| e.to_string())
    )))
}

fn connect_once(config: &TcpConfig) -> std::io::Result<TcpStream> {
    let socket = new_socket(config.server_addr, config.nodelay)?;
    if let Some(local) = config.client_addr {
        socket.bind(&local.into())?;
    }
    socket.connect_timeout(&config.server_addr.into(), config.connect_timeout)?;
    Ok(socket.into())
}

fn read_loop(mut stream: TcpStream, config: &TcpConfig, dispatcher: &Dispatcher, running: &AtomicBool) {
    let mut codec = FrameCodec::new(config.max_frame_size);
    let mut buf = vec![0u8; config.read_buffer_size];
    let metrics = &dispatcher.metrics;

    while running.load(Ordering::Acquire) {
        let n = match stream.read(&mut buf) {
            Ok(0) => {
                log::info!("[TCP] peer closed the connection");
                return;
            }
            Ok(n) => n,
            Err(e) if e.kind() == ErrorKind::Interrupted => continue,
            Err(e) => {
                if running.load(Ordering::Acquire) {
                    log::warn!("[TCP] read failed: {}", e);
                }
                return;
            }
        };

        metrics.record_bytes_received(n);
        codec.feed(&buf[..n]);

        loop {
            match codec.decode_buffered() {
                Ok(Some(frame)) => {
                    metrics.record_message_received();
                    dispatcher.deliver(&frame.topic, frame.payload);
                }
                Ok(None) => break,
                Err(e) => {
                    log::error!("[TCP] closing connection: {}", e);
                    metrics.record_malformed();
                    let _ = stream.shutdown(Shutdown::Both);
                    return;
                }
            }
        }
    }
}
