use std::io;

use nix::errno::Errno;

/// Result alias used across the Courier crates.
pub type Result<T, E = Error> = std::result::Result<T, E>;

/// Everything that can go wrong between binding the rendezvous socket and
/// the last payload byte reaching its sink.
///
/// Every variant is terminal for the process that hits it: there is no retry
/// layer, and callers are expected to release their descriptors and mappings
/// on the way out (ownership and `Drop` take care of that) before reporting
/// the failure.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("could not bind rendezvous socket: {0}")]
    Bind(#[source] io::Error),

    #[error("rendezvous socket has no usable address")]
    Address,

    #[error("could not accept peer connection: {0}")]
    Accept(#[source] io::Error),

    #[error("could not connect to rendezvous endpoint: {0}")]
    Connect(#[source] io::Error),

    #[error("peer uid={uid} gid={gid} is not privileged")]
    Forbidden { uid: u32, gid: u32 },

    #[error("could not open payload source: {0}")]
    Source(#[source] io::Error),

    #[error("could not lock payload memory: {0}")]
    Lock(#[source] io::Error),

    #[error("payload transfer failed: {0}")]
    Transfer(#[source] io::Error),

    #[error("secret handoff failed: {0}")]
    Handoff(#[source] io::Error),

    #[error("could not disable core dumps: {0}")]
    Hardening(#[source] io::Error),
}

/// Converts a nix errno into the `std::io::Error` carried by our variants.
pub(crate) fn errno_io(errno: Errno) -> io::Error {
    io::Error::from_raw_os_error(errno as i32)
}
