//! Courier producer library.
//!
//! A producer binds a single-use rendezvous socket, hands its kernel-chosen
//! address to whoever launched it, serves the payload to exactly one
//! privileged consumer, and terminates. The payload is either a file mapped
//! read-only and pinned against swap, or the producer's own stdin streamed
//! straight through kernel pipes.

mod source;

pub use source::{MappedSecret, SourceSpec};

use std::io;
use std::os::unix::net::UnixListener;

use courier_common::{hardening, peer_creds, rendezvous, transfer, Endpoint, Result};

/// A bound rendezvous that has not served its consumer yet.
pub struct ProduceSession {
    listener: UnixListener,
    endpoint: Endpoint,
}

impl ProduceSession {
    /// Disables core dumps, then binds the rendezvous socket.
    ///
    /// Hardening comes first: no secret byte is touched before the process
    /// can no longer dump core.
    pub fn bind() -> Result<Self> {
        hardening::disable_core_dumps()?;
        let (listener, endpoint) = rendezvous::listen()?;
        Ok(Self { listener, endpoint })
    }

    /// The address to hand to whoever relays it to the consumer.
    pub fn endpoint(&self) -> &Endpoint {
        &self.endpoint
    }

    /// Serves the payload to exactly one privileged consumer, then returns.
    ///
    /// Blocks until a peer connects, gates it on kernel credentials, and
    /// only then opens the payload source. The locked mapping, the relay
    /// pipe and the connection are all released on every path out of here.
    pub fn serve(self, source: &SourceSpec) -> Result<()> {
        let conn = rendezvous::accept_single(self.listener)?;
        peer_creds::authorize(&conn)?;

        match source {
            SourceSpec::File(path) => {
                let secret = MappedSecret::open(path)?;
                transfer::copy_mapped(&conn, secret.as_bytes())?;
                tracing::info!(bytes = secret.len(), "payload served from locked mapping");
            }
            SourceSpec::Stdin => {
                let delivered = transfer::copy_stream(&io::stdin(), &conn)?;
                tracing::info!(bytes = delivered, "payload served from stdin");
            }
        }
        Ok(())
    }
}
