//! `magcardctl`: operator front end for the card reader emulator.
//!
//! Talks the control protocol to a running `magcardd` to virtually insert,
//! eject and inspect cards.

use std::net::SocketAddr;

use anyhow::Context;
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use magcard_control::ControlClient;

#[derive(Parser, Debug)]
#[command(name = "magcardctl", about = "Control a running card reader emulator", version)]
struct Cli {
    /// Control address of the emulator daemon.
    #[arg(long, default_value = "127.0.0.1:2000")]
    addr: SocketAddr,

    #[command(subcommand)]
    command: CliCommand,
}

#[derive(Subcommand, Debug)]
enum CliCommand {
    /// Show whether a card is inserted.
    Status,

    /// Insert the card stored at PATH (a path as seen by the daemon).
    Insert { path: String },

    /// Eject the current card.
    Eject,
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")))
        .init();

    let cli = Cli::parse();
    let client = ControlClient::new(cli.addr);
    let context = || format!("cannot reach magcardd at {}, is it running?", cli.addr);

    match cli.command {
        CliCommand::Status => {
            let inserted = client.status().await.with_context(context)?;
            println!("{}", if inserted { "inserted" } else { "ejected" });
        }
        CliCommand::Insert { path } => {
            client.insert(&path).await.with_context(context)?;
            println!("card inserted");
        }
        CliCommand::Eject => {
            client.eject().await.with_context(context)?;
            println!("card ejected");
        }
    }

    Ok(())
}
