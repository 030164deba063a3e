// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! switchlink-probe - Run one side of a link and exchange test messages
//!
//! Start one probe as server and one as client (same host or two hosts);
//! each prints what it receives and a metrics summary on exit.

use clap::Parser;
use colored::*;
use std::collections::HashSet;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;
use switchlink::{
    create_backend, BackendConfig, BackendKind, LinkMetricsSnapshot, LinkState, NetworkBackend,
    Priority, ShmConfig, TcpConfig, TopicBus, TopicConfig,
};

/// Run one side of a switchlink
#[derive(Parser, Debug)]
#[command(name = "switchlink-probe")]
#[command(version = "0.1.0")]
#[command(about = "Exchange test messages over a switchlink")]
struct Args {
    /// Transport: tcp, shm (default: SWITCHLINK_* environment)
    #[arg(short, long)]
    backend: Option<BackendKind>,

    /// Run as client (default: server)
    #[arg(short, long)]
    client: bool,

    /// TCP server address
    #[arg(short, long, default_value = "127.0.0.1:5590")]
    server: SocketAddr,

    /// SHM queue name prefix
    #[arg(long, default_value = "/switchlink")]
    prefix: String,

    /// Topic to create and publish on
    #[arg(short, long, default_value = "probe")]
    topic: String,

    /// Topic priority: lowest, low, medium, high, highest
    #[arg(short, long, default_value = "medium")]
    priority: Priority,

    /// Messages to send (0 = listen only)
    #[arg(short = 'n', long, default_value = "10")]
    count: u64,

    /// Payload size in bytes (at least 8)
    #[arg(long, default_value = "64")]
    size: usize,

    /// Interval between messages in milliseconds
    #[arg(short, long, default_value = "100")]
    interval: u64,

    /// Disable colored output
    #[arg(long)]
    no_color: bool,

    /// Quiet mode - only print the summary
    #[arg(short = 'q', long)]
    quiet: bool,
}

/// Bus stand-in that prints every delivered message.
struct PrintBus {
    topics: HashSet<String>,
    received: AtomicU64,
    quiet: bool,
}

impl TopicBus for PrintBus {
    fn topic_exists(&self, name: &str) -> bool {
        self.topics.contains(name)
    }

    fn deserialize_and_put(&self, name: &str, payload: Vec<u8>, config: &TopicConfig) {
        let n = self.received.fetch_add(1, Ordering::Relaxed) + 1;
        if self.quiet {
            return;
        }
        let seq = payload
            .get(..8)
            .and_then(|b| b.try_into().ok())
            .map(u64::from_le_bytes);
        println!(
            "{} {} {} bytes, seq {}, {}",
            format!("#{}", n).dimmed(),
            name.cyan(),
            payload.len(),
            seq.map_or_else(|| "-".to_string(), |s| s.to_string()),
            config.serialization_method.wire_name().dimmed()
        );
    }
}

fn main() {
    // Initialize logger for RUST_LOG-based debug output
    env_logger::init();

    let args = Args::parse();

    if args.no_color || !is_tty() {
        colored::control::set_override(false);
    }

    if let Err(e) = run(&args) {
        eprintln!("{}: {}", "Error".red().bold(), e);
        std::process::exit(1);
    }
}

fn backend_config(args: &Args) -> Result<BackendConfig, Box<dyn std::error::Error>> {
    let config = match args.backend {
        None => BackendConfig::from_env()?,
        Some(BackendKind::Tcp) => BackendConfig::Tcp(if args.client {
            TcpConfig::client(args.server).with_connect_retries(20, Duration::from_millis(500))
        } else {
            TcpConfig::server(args.server)
        }),
        Some(BackendKind::Shm) => {
            let shm = if args.client {
                ShmConfig::client()
            } else {
                ShmConfig::server()
            };
            BackendConfig::Shm(shm.with_queue_prefix(args.prefix.clone()))
        }
    };
    Ok(config)
}

fn run(args: &Args) -> Result<(), Box<dyn std::error::Error>> {
    let running = Arc::new(AtomicBool::new(true));
    let r = running.clone();
    ctrlc::set_handler(move || {
        r.store(false, Ordering::SeqCst);
    })?;

    let config = backend_config(args)?;
    if !args.quiet {
        println!(
            "{} {} {} on topic {}",
            "switchlink-probe".bold(),
            config.kind().to_string().green(),
            config.role().to_string().green(),
            args.topic.cyan()
        );
        println!("{}", "Waiting for peer...".dimmed());
    }

    let bus = Arc::new(PrintBus {
        topics: HashSet::from([args.topic.clone()]),
        received: AtomicU64::new(0),
        quiet: args.quiet,
    });
    let backend = create_backend(config, bus.clone())?;
    if !args.quiet {
        println!("{}", "Link up.".green());
    }

    backend.topic_create(&args.topic, TopicConfig::default().with_priority(args.priority));

    let size = args.size.max(8);
    let mut payload = vec![0u8; size];
    for seq in 0..args.count {
        if !running.load(Ordering::SeqCst) || backend.state() == LinkState::Stopped {
            break;
        }
        payload[..8].copy_from_slice(&seq.to_le_bytes());
        backend.topic_send(&args.topic, &payload);
        thread::sleep(Duration::from_millis(args.interval));
    }

    // Keep receiving until Ctrl+C or the peer leaves
    while running.load(Ordering::SeqCst) && backend.state() != LinkState::Stopped {
        thread::sleep(Duration::from_millis(100));
    }
    backend.stop();
    let snap = backend.metrics().snapshot();
    // Ctrl+C lands here too; a server backend unlinks its SHM queues on drop
    drop(backend);

    print_summary(&snap, bus.received.load(Ordering::Relaxed));
    Ok(())
}

fn print_summary(snap: &LinkMetricsSnapshot, printed: u64) {
    println!();
    println!("{}", "--- link summary ---".bold());
    println!("  uptime:          {:.1?}", snap.uptime);
    println!("  sent:            {} msgs, {} bytes", snap.messages_sent, snap.bytes_sent);
    println!(
        "  received:        {} msgs, {} bytes",
        snap.messages_received, snap.bytes_received
    );
    println!("  delivered:       {} ({} printed)", snap.delivered, printed);
    println!("  announcements:   {}", snap.announcements_received);

    let drops = snap.total_drops();
    let line = format!(
        "  drops:           {} (unknown {}, not networked {}, send errors {}, checksum {}, malformed {})",
        drops,
        snap.unknown_topic_drops,
        snap.not_networked_drops,
        snap.send_errors,
        snap.checksum_failures,
        snap.malformed
    );
    if drops == 0 {
        println!("{}", line);
    } else {
        println!("{}", line.yellow());
    }
}

fn is_tty() -> bool {
    #[cfg(unix)]
    unsafe {
        libc::isatty(libc::STDOUT_FILENO) != 0
    }
    #[cfg(not(unix))]
    {
        true
    }
}
