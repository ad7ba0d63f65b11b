//! Courier consumer library.
//!
//! A consumer connects to a producer's single-use rendezvous address and
//! receives the payload either onto its own stdout or into an anonymous
//! handoff file whose process-relative path is published to a command that
//! replaces the consumer via exec. Payload bytes move through kernel pipes
//! only; the consumer never buffers them in user space.

mod sink;

pub use sink::HandoffFile;

use std::os::fd::AsFd;

use courier_common::{hardening, rendezvous, transfer, Result};

/// Streams the payload at `endpoint` into any writable descriptor.
///
/// Core dumps are disabled before the connection is made. Returns the number
/// of bytes delivered; a producer that rejected us simply closes the
/// connection, which shows up here as zero bytes.
pub fn fetch<D: AsFd>(endpoint: &str, dst: &D) -> Result<u64> {
    hardening::disable_core_dumps()?;
    let conn = rendezvous::connect(endpoint)?;
    transfer::copy_stream(&conn, dst)
}

/// Receives the payload into an anonymous handoff file, ready for exec.
pub fn fetch_into_handoff(endpoint: &str) -> Result<HandoffFile> {
    hardening::disable_core_dumps()?;
    let conn = rendezvous::connect(endpoint)?;
    let handoff = HandoffFile::create()?;
    transfer::copy_stream(&conn, handoff.file())?;
    Ok(handoff)
}
