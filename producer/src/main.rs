use std::io::{self, Write};
use std::os::fd::AsRawFd;

use anyhow::{Context, Result};
use clap::Parser;
use courier_producer::{ProduceSession, SourceSpec};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "courier-produce")]
#[command(about = "Serve a secret payload to one privileged local consumer")]
struct Args {
    #[arg(short, long, default_value = "warn")]
    log_level: String,

    /// File to serve, or "-" to stream standard input
    file: String,
}

fn main() -> Result<()> {
    let args = Args::parse();

    // stdout carries the rendezvous address; diagnostics go to stderr only
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&args.log_level)),
        )
        .with_writer(io::stderr)
        .init();

    let session = ProduceSession::bind().context("could not establish rendezvous")?;
    publish_endpoint(session.endpoint().name())
        .context("could not publish rendezvous address")?;

    let source = SourceSpec::parse(&args.file);
    session.serve(&source).context("could not deliver payload")?;
    Ok(())
}

/// Writes the address to stdout for the invoking caller, then seals the
/// stream so a capturing shell sees end-of-file while we keep serving.
fn publish_endpoint(name: &str) -> io::Result<()> {
    let mut out = io::stdout().lock();
    out.write_all(name.as_bytes())?;
    out.flush()?;
    drop(out);

    let null = std::fs::OpenOptions::new().write(true).open("/dev/null")?;
    // SAFETY: replaces descriptor 1 with the null device; the kernel closes
    // the caller's pipe end and the descriptor number stays occupied, so
    // nothing can accidentally write into a reused fd 1.
    if unsafe { libc::dup2(null.as_raw_fd(), libc::STDOUT_FILENO) } < 0 {
        return Err(io::Error::last_os_error());
    }
    Ok(())
}
