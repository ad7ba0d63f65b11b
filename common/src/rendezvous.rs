use std::os::fd::{AsRawFd, FromRawFd, OwnedFd};
use std::os::unix::net::{UnixListener, UnixStream};
use std::{fmt, io, mem, ptr};

use crate::error::{Error, Result};

/// Kernel-assigned abstract-namespace address of a live rendezvous socket.
///
/// Valid only while the producer that bound it is still listening, and
/// consumed by exactly one connect attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Endpoint {
    name: String,
}

impl Endpoint {
    /// The printable name, without the leading NUL of the abstract namespace.
    pub fn name(&self) -> &str {
        &self.name
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.name)
    }
}

/// Binds a listener to a kernel-chosen address in the abstract namespace.
///
/// Binding with only the address family populated triggers Linux autobind:
/// the kernel picks a unique abstract name, so nothing appears on any
/// filesystem and no stale path can be hijacked or needs cleanup afterwards.
/// The backlog is 1; a single consumer is all that is ever expected, and the
/// OS turns away everyone else.
pub fn listen() -> Result<(UnixListener, Endpoint)> {
    // SAFETY: plain socket(2); the result is checked before use.
    let raw = unsafe { libc::socket(libc::AF_UNIX, libc::SOCK_STREAM | libc::SOCK_CLOEXEC, 0) };
    if raw < 0 {
        return Err(Error::Bind(io::Error::last_os_error()));
    }
    // SAFETY: we own the descriptor we just created.
    let fd = unsafe { OwnedFd::from_raw_fd(raw) };

    // SAFETY: a zeroed sockaddr_un is a valid unnamed address once the
    // family is set.
    let mut addr: libc::sockaddr_un = unsafe { mem::zeroed() };
    addr.sun_family = libc::AF_UNIX as libc::sa_family_t;

    let family_len = mem::size_of::<libc::sa_family_t>();
    // SAFETY: addr outlives the call; passing only the family field as the
    // address length is what requests an autobound name.
    let rc = unsafe {
        libc::bind(
            fd.as_raw_fd(),
            &addr as *const _ as *const libc::sockaddr,
            family_len as libc::socklen_t,
        )
    };
    if rc < 0 {
        return Err(Error::Bind(io::Error::last_os_error()));
    }

    let mut addrlen = mem::size_of::<libc::sockaddr_un>() as libc::socklen_t;
    // SAFETY: addr and addrlen are valid out-parameters sized just above.
    let rc = unsafe {
        libc::getsockname(
            fd.as_raw_fd(),
            &mut addr as *mut _ as *mut libc::sockaddr,
            &mut addrlen,
        )
    };
    if rc < 0 {
        return Err(Error::Bind(io::Error::last_os_error()));
    }

    // sun_path[0] holds the abstract-namespace NUL; the usable name follows.
    let path_len = (addrlen as usize).saturating_sub(family_len);
    if path_len <= 1 {
        return Err(Error::Address);
    }
    let name: Vec<u8> = addr.sun_path[1..path_len].iter().map(|&c| c as u8).collect();
    let name = String::from_utf8(name).map_err(|_| Error::Address)?;

    // SAFETY: listen(2) on the bound socket we own.
    if unsafe { libc::listen(fd.as_raw_fd(), 1) } < 0 {
        return Err(Error::Bind(io::Error::last_os_error()));
    }

    tracing::debug!(endpoint = %name, "rendezvous socket listening");
    Ok((UnixListener::from(fd), Endpoint { name }))
}

/// Waits for the one expected peer, then retires the listener.
///
/// The accepted connection is created non-blocking so the transfer loops can
/// treat EAGAIN as zero progress. The listener is consumed by value: whether
/// the accept succeeds or fails, the endpoint stops existing when this
/// returns, which is what makes the rendezvous single-use.
pub fn accept_single(listener: UnixListener) -> Result<UnixStream> {
    // SAFETY: accept4(2) on our listening socket; the peer address is not
    // needed, credentials come from SO_PEERCRED later.
    let raw = unsafe {
        libc::accept4(
            listener.as_raw_fd(),
            ptr::null_mut(),
            ptr::null_mut(),
            libc::SOCK_NONBLOCK | libc::SOCK_CLOEXEC,
        )
    };
    if raw < 0 {
        return Err(Error::Accept(io::Error::last_os_error()));
    }
    tracing::debug!("peer connected, retiring listener");
    // SAFETY: accept4 handed us ownership of the new descriptor.
    Ok(unsafe { UnixStream::from_raw_fd(raw) })
}

/// Connects to a producer's abstract endpoint by name.
pub fn connect(name: &str) -> Result<UnixStream> {
    let bytes = name.as_bytes();

    // SAFETY: zeroed sockaddr_un; family and path are filled in below.
    let mut addr: libc::sockaddr_un = unsafe { mem::zeroed() };
    addr.sun_family = libc::AF_UNIX as libc::sa_family_t;
    if bytes.is_empty() || bytes.len() > addr.sun_path.len() - 1 {
        return Err(Error::Address);
    }
    for (dst, &src) in addr.sun_path[1..].iter_mut().zip(bytes) {
        *dst = src as libc::c_char;
    }
    // sun_path[0] stays NUL: that is what selects the abstract namespace.

    // SAFETY: plain socket(2); the result is checked before use.
    let raw = unsafe { libc::socket(libc::AF_UNIX, libc::SOCK_STREAM | libc::SOCK_CLOEXEC, 0) };
    if raw < 0 {
        return Err(Error::Connect(io::Error::last_os_error()));
    }
    // SAFETY: we own the descriptor we just created.
    let fd = unsafe { OwnedFd::from_raw_fd(raw) };

    let addrlen = (mem::size_of::<libc::sa_family_t>() + 1 + bytes.len()) as libc::socklen_t;
    // SAFETY: addr is fully initialized and addrlen covers its used prefix.
    let rc = unsafe {
        libc::connect(
            fd.as_raw_fd(),
            &addr as *const _ as *const libc::sockaddr,
            addrlen,
        )
    };
    if rc < 0 {
        return Err(Error::Connect(io::Error::last_os_error()));
    }
    Ok(UnixStream::from(fd))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::{ErrorKind, Read, Write};
    use std::thread;

    #[test]
    fn autobind_assigns_a_name() {
        let (_listener, endpoint) = listen().unwrap();
        assert!(!endpoint.name().is_empty());
    }

    #[test]
    fn endpoints_are_unique_per_listener() {
        let (_a, ep_a) = listen().unwrap();
        let (_b, ep_b) = listen().unwrap();
        assert_ne!(ep_a, ep_b);
    }

    #[test]
    fn accepted_connection_is_nonblocking() {
        let (listener, endpoint) = listen().unwrap();
        let name = endpoint.name().to_string();
        let client = thread::spawn(move || connect(&name).unwrap());

        let mut conn = accept_single(listener).unwrap();
        let _peer = client.join().unwrap();

        let mut buf = [0u8; 1];
        let err = conn.read(&mut buf).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::WouldBlock);
    }

    #[test]
    fn rendezvous_is_single_use() {
        let (listener, endpoint) = listen().unwrap();
        let name = endpoint.name().to_string();
        let client = thread::spawn(move || connect(&name).unwrap());

        let conn = accept_single(listener).unwrap();
        let mut peer = client.join().unwrap();
        peer.write_all(b"x").unwrap();
        drop(conn);

        // The listener closed the moment the first peer was accepted, so the
        // address must no longer resolve.
        assert!(matches!(
            connect(endpoint.name()),
            Err(Error::Connect(_))
        ));
    }

    #[test]
    fn connect_rejects_oversized_names() {
        let name = "x".repeat(200);
        assert!(matches!(connect(&name), Err(Error::Address)));
    }
}
