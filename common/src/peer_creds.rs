use std::os::unix::net::UnixStream;

use nix::sys::socket::{getsockopt, sockopt::PeerCredentials};

use crate::error::{errno_io, Error, Result};

/// Identity the kernel recorded for the peer at connect time.
///
/// Retrieved over `SO_PEERCRED`, so the peer cannot forge it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PeerIdentity {
    /// Effective user ID of the connecting process
    pub uid: u32,
    /// Effective group ID of the connecting process
    pub gid: u32,
    /// Process ID of the connecting process
    pub pid: i32,
}

/// Retrieves the credentials of the process on the other end of the stream.
pub fn peer_identity(stream: &UnixStream) -> Result<PeerIdentity> {
    let creds =
        getsockopt(stream, PeerCredentials).map_err(|e| Error::Accept(errno_io(e)))?;

    Ok(PeerIdentity {
        uid: creds.uid(),
        gid: creds.gid(),
        pid: creds.pid(),
    })
}

/// Admits the peer only if it runs as the privileged identity (uid 0, gid 0).
///
/// This is the sole access-control gate in the system. It runs once,
/// immediately after accept and strictly before any payload byte moves; a
/// rejected connection is dropped by the caller's error path without ever
/// being read from or written to.
pub fn authorize(stream: &UnixStream) -> Result<()> {
    let peer = peer_identity(stream)?;
    if peer.uid != 0 || peer.gid != 0 {
        tracing::warn!(uid = peer.uid, gid = peer.gid, pid = peer.pid, "rejecting unprivileged peer");
        return Err(Error::Forbidden {
            uid: peer.uid,
            gid: peer.gid,
        });
    }
    tracing::debug!(pid = peer.pid, "peer authorized");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn own_ids() -> (u32, u32) {
        // SAFETY: geteuid/getegid cannot fail.
        unsafe { (libc::geteuid(), libc::getegid()) }
    }

    #[test]
    fn socketpair_reports_our_own_identity() {
        let (a, _b) = UnixStream::pair().unwrap();
        let peer = peer_identity(&a).unwrap();
        let (uid, gid) = own_ids();
        assert_eq!(peer.uid, uid);
        assert_eq!(peer.gid, gid);
        assert_eq!(peer.pid, std::process::id() as i32);
    }

    #[test]
    fn admission_follows_effective_identity() {
        let (a, _b) = UnixStream::pair().unwrap();
        let (uid, gid) = own_ids();
        match authorize(&a) {
            Ok(()) => assert!(uid == 0 && gid == 0),
            Err(Error::Forbidden { uid: u, gid: g }) => {
                assert!(uid != 0 || gid != 0);
                assert_eq!((u, g), (uid, gid));
            }
            Err(other) => panic!("unexpected error: {other}"),
        }
    }
}
