//! `magcardd`: the card reader emulator daemon.
//!
//! Owns the serial line to the game board and runs the three long-lived
//! loops: the ring-bus relay board (when the cabinet wiring calls for it),
//! the packet-dispatch engine and the control-plane listener. All three
//! share one reader state machine and one run flag.

mod config;
mod engine;

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use anyhow::Context;
use clap::Parser;
use tokio::task;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use magcard_control::{ControlServer, ControlServerConfig};
use magcard_core::Result;
use magcard_reader::{CardReader, shared};
use magcard_relay::{QueuePort, RelayBoard, RelayQueues};
use magcard_storage::FileTrackStore;
use magcard_transport::SerialLink;

use config::DaemonConfig;
use engine::PacketEngine;

#[derive(Parser, Debug)]
#[command(name = "magcardd", about = "Arcade magnetic-card reader emulator", version)]
struct Args {
    /// JSON configuration file.
    #[arg(long)]
    config: Option<PathBuf>,

    /// Serial device to the game board.
    #[arg(long)]
    serial: Option<String>,

    /// Card image path used until the control plane picks one.
    #[arg(long)]
    card: Option<PathBuf>,

    /// Control-plane bind address.
    #[arg(long)]
    control_addr: Option<SocketAddr>,

    /// Drive the serial line directly instead of emulating the ring-bus
    /// conversion board.
    #[arg(long)]
    direct: bool,

    /// Emulate a unit without a card-slot shutter.
    #[arg(long)]
    no_shutter: bool,

    /// Insert a virtual card whenever a poll observes an empty unit.
    #[arg(long)]
    auto_insert: bool,
}

impl Args {
    fn apply(&self, config: &mut DaemonConfig) {
        if let Some(serial) = &self.serial {
            config.serial.path = serial.clone();
        }
        if let Some(card) = &self.card {
            config.card_path = card.clone();
        }
        if let Some(addr) = self.control_addr {
            config.control_addr = addr;
        }
        if self.direct {
            config.relay_mode = false;
        }
        if self.no_shutter {
            config.reader.shutter_mode = false;
        }
        if self.auto_insert {
            config.reader.auto_insert_on_poll = true;
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let args = Args::parse();
    let mut config = DaemonConfig::load(args.config.as_deref()).context("loading configuration")?;
    args.apply(&mut config);

    info!(version = magcard_core::VERSION, "magcardd starting");
    info!(
        serial = %config.serial.path,
        baud = config.serial.baud_rate,
        relay = config.relay_mode,
        shutter = config.reader.shutter_mode,
        parity = config.serial.even_parity,
        flow = config.serial.flow_control,
        card = %config.card_path.display(),
        "configuration"
    );

    let serial = SerialLink::open(&config.serial).context("opening serial line")?;

    let reader = shared(CardReader::new(
        Box::new(FileTrackStore::new()),
        config.card_path.clone(),
        config.reader,
    ));
    let running = Arc::new(AtomicBool::new(true));

    let control = ControlServer::bind(
        ControlServerConfig {
            bind_addr: config.control_addr,
        },
        reader.clone(),
    )
    .await
    .context("binding control plane")?;
    let control_task = tokio::spawn(control.run());

    let (mut engine_task, relay_task) = if config.relay_mode {
        let queues = RelayQueues::new(config.queue_capacity);
        let board = RelayBoard::new(serial, queues.clone(), running.clone());
        let relay_task = task::spawn_blocking(move || board.run());

        let engine = PacketEngine::new(QueuePort::new(queues), reader.clone(), running.clone());
        (task::spawn_blocking(move || engine.run()), Some(relay_task))
    } else {
        let engine = PacketEngine::new(serial, reader.clone(), running.clone());
        (task::spawn_blocking(move || engine.run()), None)
    };

    let mut failed = false;
    let mut engine_done = false;
    tokio::select! {
        _ = tokio::signal::ctrl_c() => {
            info!("shutdown requested");
        }
        result = &mut engine_task => {
            // The engine only ends on its own after a fatal error or a
            // relay-triggered stop.
            failed |= log_loop_exit("packet engine", flatten(result));
            engine_done = true;
        }
    }
    running.store(false, Ordering::Relaxed);

    // Stop order: relay board first, then the engine, then the control
    // listener; the serial line closes when its owning loop drops it.
    if let Some(relay_task) = relay_task {
        failed |= log_loop_exit("relay board", flatten(relay_task.await));
    }
    if !engine_done {
        failed |= log_loop_exit("packet engine", flatten(engine_task.await));
    }
    control_task.abort();

    info!("magcardd stopped");
    if failed {
        anyhow::bail!("a service loop failed; see the log");
    }
    Ok(())
}

fn flatten(result: std::result::Result<Result<()>, tokio::task::JoinError>) -> anyhow::Result<()> {
    match result {
        Ok(Ok(())) => Ok(()),
        Ok(Err(e)) => Err(e.into()),
        Err(e) => Err(e).context("loop task panicked"),
    }
}

/// Log a loop's exit, returning `true` when it failed.
fn log_loop_exit(name: &str, result: anyhow::Result<()>) -> bool {
    match result {
        Ok(()) => {
            info!(loop_name = name, "loop finished");
            false
        }
        Err(e) => {
            error!(loop_name = name, error = %e, "loop failed");
            true
        }
    }
}
