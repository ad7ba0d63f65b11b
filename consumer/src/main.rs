use std::ffi::OsString;
use std::io;

use anyhow::{Context, Result};
use clap::Parser;
use courier_consumer::{fetch, fetch_into_handoff};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "courier-consume")]
#[command(about = "Receive a secret payload from a local producer")]
struct Args {
    #[arg(short, long, default_value = "warn")]
    log_level: String,

    /// Rendezvous address printed by the producer
    endpoint: String,

    /// Command to exec with the payload path published in COURIER_FILE;
    /// with no command the payload streams to stdout
    #[arg(trailing_var_arg = true, allow_hyphen_values = true)]
    command: Vec<OsString>,
}

fn main() -> Result<()> {
    let args = Args::parse();

    // stdout may carry the payload; diagnostics go to stderr only
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&args.log_level)),
        )
        .with_writer(io::stderr)
        .init();

    if args.command.is_empty() {
        fetch(&args.endpoint, &io::stdout()).context("could not receive payload")?;
        Ok(())
    } else {
        let handoff = fetch_into_handoff(&args.endpoint).context("could not receive payload")?;
        // exec only returns on failure
        let err = handoff.exec(&args.command);
        Err(err).context("could not execute command")
    }
}
