//! relink デモ
//!
//! - `listen`: 接続を受け付け、受信したデータをそのまま送り返す
//! - `connect`: 接続して N 個のメッセージを送り、エコーを待って切断する
//!
//! ログは `RUST_LOG=debug` などで制御する。

use std::net::SocketAddr;
use std::process::ExitCode;
use std::thread;
use std::time::{Duration, Instant};

use clap::{Parser, Subcommand};
use log::{error, info, warn};
use relink_core::TransportConfig;
use relink_host::{Endpoint, HostError, LinkEvent};

/// ポーリング間隔
const POLL_INTERVAL: Duration = Duration::from_millis(2);

/// Reliable message transport over UDP (demo).
#[derive(Parser)]
#[command(name = "relink-demo", author, version, about)]
struct Cli {
    #[command(subcommand)]
    mode: Mode,

    /// Connection timeout in milliseconds.
    #[arg(long, default_value_t = relink_core::CONNECTION_TIMEOUT_MS)]
    timeout_ms: u64,

    /// Pretimeout warning threshold in milliseconds.
    #[arg(long, default_value_t = relink_core::PRETIMEOUT_MS)]
    pretimeout_ms: u64,

    /// Retransmit interval in milliseconds.
    #[arg(long, default_value_t = relink_core::RETRANSMIT_INTERVAL_MS)]
    retransmit_ms: u64,

    /// Maximum packets resent per retransmit interval.
    #[arg(long, default_value_t = relink_core::RESEND_PACKETS_PER_TICK)]
    resend_per_tick: u32,

    /// Maximum packets of unsent messages flushed when an ACK arrives (0 disables).
    #[arg(long, default_value_t = relink_core::RESEND_PACKETS_ON_ACK)]
    resend_on_ack: u32,
}

#[derive(Subcommand)]
enum Mode {
    /// Accept connections and echo every message back.
    Listen {
        /// Local address to bind.
        #[arg(short, long, default_value = "127.0.0.1:7400")]
        bind: SocketAddr,
    },
    /// Connect, send messages, wait for the echoes and disconnect.
    Connect {
        /// Remote address of a listening peer.
        #[arg(short, long)]
        peer: SocketAddr,

        /// Local address to bind.
        #[arg(short, long, default_value = "127.0.0.1:0")]
        bind: SocketAddr,

        /// Number of messages to send.
        #[arg(short, long, default_value_t = 10)]
        count: u32,

        /// Message text (a sequence number is appended).
        #[arg(short, long, default_value = "hello")]
        message: String,

        /// Send unreliably instead of reliably.
        #[arg(long)]
        unreliable: bool,
    },
}

fn main() -> ExitCode {
    env_logger::init();

    let cli = Cli::parse();
    let config = TransportConfig::default()
        .with_connection_timeout_ms(cli.timeout_ms)
        .with_pretimeout_ms(cli.pretimeout_ms)
        .with_retransmit_interval_ms(cli.retransmit_ms)
        .with_resend_packets_per_tick(cli.resend_per_tick)
        .with_resend_packets_on_ack(cli.resend_on_ack);

    let result = match cli.mode {
        Mode::Listen { bind } => listen(bind, config),
        Mode::Connect {
            peer,
            bind,
            count,
            message,
            unreliable,
        } => connect(bind, peer, config, count, &message, !unreliable),
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            error!("{err}");
            ExitCode::FAILURE
        }
    }
}

fn listen(bind: SocketAddr, config: TransportConfig) -> Result<(), HostError> {
    let mut endpoint = Endpoint::bind(bind, config)?.with_auto_accept(true);
    info!("listening on {}", endpoint.local_addr()?);

    loop {
        for event in endpoint.poll()? {
            match event {
                LinkEvent::ConnectionRequested => info!("connection request from {:?}", endpoint.peer_addr()),
                LinkEvent::Connected => info!("connected"),
                LinkEvent::Disconnected => info!("peer disconnected: {}", endpoint.stats_json()?),
                LinkEvent::TimedOut => warn!("peer timed out"),
                LinkEvent::Data(payload) => {
                    if let Err(err) = endpoint.send(&payload, true) {
                        warn!("echo failed: {err}");
                    }
                }
            }
        }
        thread::sleep(POLL_INTERVAL);
    }
}

fn connect(
    bind: SocketAddr,
    peer: SocketAddr,
    config: TransportConfig,
    count: u32,
    message: &str,
    reliable: bool,
) -> Result<(), HostError> {
    let deadline = Duration::from_millis(config.connection_timeout_ms);
    let mut endpoint = Endpoint::bind(bind, config)?;
    endpoint.connect(peer)?;

    wait_for(&mut endpoint, deadline, |event| *event == LinkEvent::Connected)?;
    info!("connected to {peer}");

    for i in 0..count {
        endpoint.send(format!("{message} #{i}").as_bytes(), reliable)?;
    }
    endpoint.ping()?;

    let mut echoes = 0;
    let started = Instant::now();
    while echoes < count && started.elapsed() < deadline {
        for event in endpoint.poll()? {
            match event {
                LinkEvent::Data(payload) => {
                    echoes += 1;
                    info!("echo: {}", String::from_utf8_lossy(&payload));
                }
                LinkEvent::Disconnected | LinkEvent::TimedOut => return Err(HostError::NotConnected),
                _ => {}
            }
        }
        thread::sleep(POLL_INTERVAL);
    }
    if echoes < count {
        warn!("received {echoes} of {count} echoes");
    }

    // PingEcho を受け取るため少し待つ
    let settle = Instant::now();
    while settle.elapsed() < Duration::from_millis(100) {
        endpoint.poll()?;
        thread::sleep(POLL_INTERVAL);
    }

    println!("{}", endpoint.stats_json()?);
    endpoint.disconnect()?;
    Ok(())
}

/// 条件を満たすイベントが来るまでポーリングする
fn wait_for(
    endpoint: &mut Endpoint,
    deadline: Duration,
    mut done: impl FnMut(&LinkEvent) -> bool,
) -> Result<(), HostError> {
    let started = Instant::now();
    while started.elapsed() < deadline {
        for event in endpoint.poll()? {
            if event == LinkEvent::TimedOut {
                return Err(HostError::NotConnected);
            }
            if done(&event) {
                return Ok(());
            }
        }
        thread::sleep(POLL_INTERVAL);
    }
    Err(HostError::NotConnected)
}
