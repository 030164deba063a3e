// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

#![allow(clippy::uninlined_format_args)] // Test readability over pedantic
#![allow(clippy::cast_possible_truncation)] // Test parameters

//! End-to-end tests over a loopback TCP link.
//!
//! Each test builds a server and a client backend in the same process, each
//! with its own `MemoryBus`, on a fresh loopback port.

mod common;

use common::{free_loopback_addr, wait_until, WAIT};
use std::io::Write;
use std::net::{SocketAddr, TcpStream};
use std::sync::Arc;
use std::thread;
use std::time::Duration;
use switchlink::registry::TopicOrigin;
use switchlink::{
    Error, LinkState, MemoryBus, NetworkBackend, Role, SerializationMethod, TcpBackend, TcpConfig,
    TopicConfig,
};

/// Connect a server (on `server_bus`) and a client (on `client_bus`).
fn link(server_bus: Arc<MemoryBus>, client_bus: Arc<MemoryBus>) -> (TcpBackend, TcpBackend) {
    let addr = free_loopback_addr();

    let server = thread::spawn(move || {
        TcpBackend::new(TcpConfig::server(addr).with_ready_timeout(WAIT), server_bus)
    });
    let client = TcpBackend::new(
        TcpConfig::client(addr).with_connect_retries(200, Duration::from_millis(25)),
        client_bus,
    )
    .expect("client setup");
    let server = server
        .join()
        .expect("server thread panicked")
        .expect("server setup");

    (server, client)
}

#[test]
fn test_pose_delivered_exactly_once() {
    let bus_a = Arc::new(MemoryBus::with_topics(&["pose"]));
    let bus_b = Arc::new(MemoryBus::with_topics(&["pose"]));
    let (a, b) = link(bus_a, bus_b.clone());

    assert_eq!(a.role(), Role::Server);
    assert_eq!(b.role(), Role::Client);
    assert_eq!(a.state(), LinkState::Running);

    a.topic_create("pose", TopicConfig::default());
    assert!(wait_until(WAIT, || b.is_topic_networked("pose")));

    a.topic_send("pose", b"\x01\x02\x03");
    assert!(bus_b.wait_for("pose", 1, WAIT));

    // Nothing else trickles in
    thread::sleep(Duration::from_millis(50));
    let events = bus_b.events("pose");
    assert_eq!(events.len(), 1);
    assert_eq!(events[0].payload, vec![1, 2, 3]);
    assert_eq!(events[0].serialization_method, SerializationMethod::StructBinary);
}

#[test]
fn test_control_bootstrap_mirrors_serialization_method() {
    let (a, b) = link(Arc::new(MemoryBus::new()), Arc::new(MemoryBus::new()));

    a.topic_create(
        "pose",
        TopicConfig::default().with_serialization(SerializationMethod::SchemaBased),
    );

    assert!(wait_until(WAIT, || b.is_topic_networked("pose")));
    assert_eq!(b.registry().origin("pose"), Some(TopicOrigin::Announced));
    assert_eq!(
        b.registry().config("pose").map(|c| c.serialization_method),
        Some(SerializationMethod::SchemaBased)
    );
    assert_eq!(b.metrics().snapshot().announcements_received, 1);
}

#[test]
fn test_both_directions() {
    let bus_a = Arc::new(MemoryBus::with_topics(&["imu"]));
    let bus_b = Arc::new(MemoryBus::with_topics(&["pose"]));
    let (a, b) = link(bus_a.clone(), bus_b.clone());

    a.topic_create("pose", TopicConfig::default());
    b.topic_create("imu", TopicConfig::default());
    assert!(wait_until(WAIT, || a.is_topic_networked("imu")
        && b.is_topic_networked("pose")));

    a.topic_send("pose", b"from server");
    b.topic_send("imu", b"from client");

    assert!(bus_b.wait_for("pose", 1, WAIT));
    assert!(bus_a.wait_for("imu", 1, WAIT));
    assert_eq!(bus_b.payloads("pose"), vec![b"from server".to_vec()]);
    assert_eq!(bus_a.payloads("imu"), vec![b"from client".to_vec()]);
}

#[test]
fn test_send_order_preserved() {
    let bus_b = Arc::new(MemoryBus::with_topics(&["seq"]));
    let (a, b) = link(Arc::new(MemoryBus::new()), bus_b.clone());

    a.topic_create("seq", TopicConfig::default());
    assert!(wait_until(WAIT, || b.is_topic_networked("seq")));

    for i in 0u32..500 {
        a.topic_send("seq", &i.to_le_bytes());
    }

    assert!(bus_b.wait_for("seq", 500, WAIT));
    let received: Vec<u32> = bus_b
        .payloads("seq")
        .iter()
        .map(|p| u32::from_le_bytes([p[0], p[1], p[2], p[3]]))
        .collect();
    assert_eq!(received, (0u32..500).collect::<Vec<_>>());
}

#[test]
fn test_unknown_topic_dropped_on_receiver() {
    // B's bus knows "pose" but not "nav"
    let bus_b = Arc::new(MemoryBus::with_topics(&["pose"]));
    let (a, b) = link(Arc::new(MemoryBus::new()), bus_b.clone());

    a.topic_create("nav", TopicConfig::default());
    a.topic_create("pose", TopicConfig::default());
    assert!(wait_until(WAIT, || b.is_topic_networked("pose")));

    a.topic_send("nav", b"lost");
    // TCP keeps order, so "pose" arriving means "nav" was processed
    a.topic_send("pose", b"kept");
    assert!(bus_b.wait_for("pose", 1, WAIT));

    assert!(bus_b.events("nav").is_empty());
    assert_eq!(bus_b.total_events(), 1);
    assert_eq!(b.metrics().snapshot().unknown_topic_drops, 1);
    assert_eq!(a.metrics().snapshot().send_errors, 0);
}

#[test]
fn test_send_on_non_networked_topic_is_noop() {
    let bus_b = Arc::new(MemoryBus::with_topics(&["pose"]));
    let (a, _b) = link(Arc::new(MemoryBus::new()), bus_b.clone());

    a.topic_send("pose", b"\x01");

    let snap = a.metrics().snapshot();
    assert_eq!(snap.not_networked_drops, 1);
    assert_eq!(snap.messages_sent, 0);
    assert_eq!(bus_b.total_events(), 0);
}

#[test]
fn test_large_payload() {
    let bus_b = Arc::new(MemoryBus::with_topics(&["cloud"]));
    let (a, b) = link(Arc::new(MemoryBus::new()), bus_b.clone());

    a.topic_create("cloud", TopicConfig::default());
    assert!(wait_until(WAIT, || b.is_topic_networked("cloud")));

    // Spans several 256 KiB reads
    let payload: Vec<u8> = (0..1_000_000u32).map(|i| (i % 251) as u8).collect();
    a.topic_send("cloud", &payload);

    assert!(bus_b.wait_for("cloud", 1, WAIT));
    assert_eq!(bus_b.payloads("cloud")[0], payload);
}

#[test]
fn test_oversized_send_rejected_locally() {
    let addr = free_loopback_addr();
    let server = thread::spawn(move || {
        TcpBackend::new(
            TcpConfig::server(addr).with_max_frame_size(64),
            Arc::new(MemoryBus::new()),
        )
    });
    let client = TcpBackend::new(
        TcpConfig::client(addr).with_connect_retries(200, Duration::from_millis(25)),
        Arc::new(MemoryBus::new()),
    )
    .expect("client setup");
    let server = server.join().expect("server thread").expect("server setup");

    server.registry().insert("t", TopicConfig::default(), TopicOrigin::Local);
    let err = server
        .transmit("t", &[0u8; 128], &TopicConfig::default())
        .unwrap_err();
    assert!(matches!(err, Error::PayloadTooLarge { limit: 64, .. }));
    drop(client);
}

#[test]
fn test_stop_ends_both_sides() {
    let (a, b) = link(Arc::new(MemoryBus::new()), Arc::new(MemoryBus::new()));

    b.stop();
    assert!(wait_until(WAIT, || b.state() == LinkState::Stopped));
    // Server read loop sees EOF
    assert!(wait_until(WAIT, || a.state() == LinkState::Stopped));

    // Sends after the peer left are absorbed
    a.topic_create("pose", TopicConfig::default());
    a.topic_send("pose", b"late");
    assert!(a.metrics().snapshot().send_errors >= 1);
    assert!(matches!(
        b.transmit("pose", b"x", &TopicConfig::default()),
        Err(Error::Stopped)
    ));
}

#[test]
fn test_client_setup_failure_is_returned() {
    // Nobody listens on this port
    let addr = free_loopback_addr();
    let result = TcpBackend::new(
        TcpConfig::client(addr).with_connect_retries(2, Duration::from_millis(10)),
        Arc::new(MemoryBus::new()),
    );
    assert!(matches!(result, Err(Error::Setup(_))));
}

#[test]
fn test_server_bind_failure_is_returned() {
    let taken = std::net::TcpListener::bind("127.0.0.1:0").expect("bind");
    let addr = taken.local_addr().expect("addr");

    let result = TcpBackend::new(TcpConfig::server(addr), Arc::new(MemoryBus::new()));
    assert!(matches!(result, Err(Error::Setup(_))));
}

#[test]
fn test_ready_timeout_without_peer() {
    let addr = free_loopback_addr();
    let result = TcpBackend::new(
        TcpConfig::server(addr).with_ready_timeout(Duration::from_millis(50)),
        Arc::new(MemoryBus::new()),
    );
    assert!(matches!(result, Err(Error::Setup(_))));

    // Nothing is left listening on the address
    assert!(TcpStream::connect(addr).is_err());
}

#[test]
fn test_server_retry_after_ready_timeout() {
    let addr = free_loopback_addr();
    let first = TcpBackend::new(
        TcpConfig::server(addr).with_ready_timeout(Duration::from_millis(50)),
        Arc::new(MemoryBus::new()),
    );
    assert!(matches!(first, Err(Error::Setup(_))));

    let server = thread::spawn(move || {
        TcpBackend::new(
            TcpConfig::server(addr).with_ready_timeout(WAIT),
            Arc::new(MemoryBus::new()),
        )
    });
    let client = TcpBackend::new(
        TcpConfig::client(addr).with_connect_retries(200, Duration::from_millis(25)),
        Arc::new(MemoryBus::new()),
    )
    .expect("client setup");
    let server = server
        .join()
        .expect("server thread panicked")
        .expect("second server binds the same address");

    assert_eq!(server.state(), LinkState::Running);
    assert_eq!(client.state(), LinkState::Running);
}

#[test]
fn test_stop_not_blocked_by_stalled_send() {
    let addr = free_loopback_addr();
    let server = thread::spawn(move || {
        TcpBackend::new(
            TcpConfig::server(addr).with_ready_timeout(WAIT),
            Arc::new(MemoryBus::new()),
        )
    });

    let mut raw = None;
    assert!(wait_until(WAIT, || {
        raw = TcpStream::connect(addr).ok();
        raw.is_some()
    }));
    let server = Arc::new(server.join().expect("server thread").expect("server setup"));
    // Peer never reads, so the socket buffers fill up and write_all parks
    let _raw = raw.expect("connected");

    server.topic_create("bulk", TopicConfig::default());
    let sender = {
        let server = Arc::clone(&server);
        thread::spawn(move || {
            let payload = vec![0u8; 8 << 20];
            for _ in 0..16 {
                server.topic_send("bulk", &payload);
            }
        })
    };
    thread::sleep(Duration::from_millis(300));

    let (done_tx, done_rx) = crossbeam::channel::bounded(1);
    let stopper = {
        let server = Arc::clone(&server);
        thread::spawn(move || {
            server.stop();
            let _ = done_tx.send(());
        })
    };
    assert!(
        done_rx.recv_timeout(WAIT).is_ok(),
        "stop() waited on a stalled send"
    );

    stopper.join().expect("stop thread");
    sender.join().expect("sender returns once the link is down");
    assert!(wait_until(WAIT, || server.state() == LinkState::Stopped));
    assert!(server.metrics().snapshot().send_errors >= 1);
}

#[test]
fn test_oversized_frame_closes_connection() {
    let addr: SocketAddr = free_loopback_addr();
    let server = thread::spawn(move || {
        TcpBackend::new(
            TcpConfig::server(addr).with_ready_timeout(WAIT),
            Arc::new(MemoryBus::new()),
        )
    });

    let mut raw = None;
    assert!(wait_until(WAIT, || {
        raw = TcpStream::connect(addr).ok();
        raw.is_some()
    }));
    let server = server.join().expect("server thread").expect("server setup");

    let mut raw = raw.expect("connected");
    let mut bogus = Vec::new();
    bogus.extend_from_slice(&u32::MAX.to_le_bytes());
    bogus.extend_from_slice(&4u32.to_le_bytes());
    raw.write_all(&bogus).expect("write");

    assert!(wait_until(WAIT, || server.state() == LinkState::Stopped));
    assert_eq!(server.metrics().snapshot().malformed, 1);
}
