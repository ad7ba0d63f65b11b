//! Zero-copy transfer engine.
//!
//! Payload bytes move descriptor-to-descriptor through a kernel relay pipe,
//! via `vmsplice`/`splice`. No user-space buffer ever holds them, so nothing
//! outside an explicitly locked mapping can be retained, logged, or paged to
//! swap by this process.

use std::io;
use std::os::fd::{AsFd, AsRawFd, BorrowedFd, OwnedFd};

use nix::poll::{poll, PollFd, PollFlags, PollTimeout};
use nix::unistd::pipe;

use crate::error::{errno_io, Error, Result};

/// Bytes attempted per splice step in stream mode; one atomic-write unit.
const CHUNK: usize = libc::PIPE_BUF;

/// A fresh unidirectional kernel pipe, created per transfer and closed with
/// the transfer.
struct RelayPipe {
    read: OwnedFd,
    write: OwnedFd,
}

impl RelayPipe {
    fn new() -> Result<Self> {
        let (read, write) = pipe().map_err(|e| Error::Transfer(errno_io(e)))?;
        Ok(Self { read, write })
    }
}

/// Outcome of one non-blocking splice step.
enum Step {
    /// Bytes moved; 0 from a read step means the source is exhausted.
    Moved(usize),
    /// EAGAIN: zero progress for this step on this iteration, not an error.
    WouldBlock,
}

/// One `splice` attempt, non-blocking, page-moving where the kernel can.
fn splice_step(from: BorrowedFd<'_>, to: BorrowedFd<'_>, len: usize) -> Result<Step> {
    // SAFETY: both descriptors are live for the duration of the call and no
    // user-space buffer is involved.
    let n = unsafe {
        libc::splice(
            from.as_raw_fd(),
            std::ptr::null_mut(),
            to.as_raw_fd(),
            std::ptr::null_mut(),
            len,
            libc::SPLICE_F_MOVE | libc::SPLICE_F_NONBLOCK,
        )
    };
    if n < 0 {
        let err = io::Error::last_os_error();
        if err.raw_os_error() == Some(libc::EAGAIN) {
            return Ok(Step::WouldBlock);
        }
        return Err(Error::Transfer(err));
    }
    Ok(Step::Moved(n as usize))
}

/// One `vmsplice` attempt: gifts the given pages into the pipe instead of
/// copying them.
fn gift_step(pipe_in: BorrowedFd<'_>, bytes: &[u8]) -> Result<Step> {
    let iov = libc::iovec {
        iov_base: bytes.as_ptr() as *mut libc::c_void,
        iov_len: bytes.len(),
    };
    // SAFETY: iov points into a slice the caller keeps alive until the whole
    // transfer completes; the pipe end is live.
    let n = unsafe {
        libc::vmsplice(
            pipe_in.as_raw_fd(),
            &iov,
            1,
            libc::SPLICE_F_GIFT | libc::SPLICE_F_NONBLOCK,
        )
    };
    if n < 0 {
        let err = io::Error::last_os_error();
        if err.raw_os_error() == Some(libc::EAGAIN) {
            return Ok(Step::WouldBlock);
        }
        return Err(Error::Transfer(err));
    }
    Ok(Step::Moved(n as usize))
}

/// Blocks until the source has bytes to read or its peer hung up.
///
/// Unix sockets ignore their non-blocking flag for the splice fast path, so
/// without this wait the read loop would spin instead of sleeping. This is
/// the engine's only designed blocking point, and it waits indefinitely.
fn wait_readable<F: AsFd>(fd: &F) -> Result<()> {
    let mut fds = [PollFd::new(
        fd.as_fd(),
        PollFlags::POLLIN | PollFlags::from_bits_retain(libc::POLLRDHUP),
    )];
    poll(&mut fds, PollTimeout::NONE).map_err(|e| Error::Transfer(errno_io(e)))?;
    Ok(())
}

/// Moves an entire in-memory payload into `dst` without copying it through
/// user space.
///
/// Two independent counters track progress: `gifted` (payload pages moved
/// into the relay pipe) and `sent` (pipe contents moved on to `dst`). The
/// two steps need not advance in lockstep; the transfer is complete only
/// when every byte has left the pipe, i.e. `sent == bytes.len()`.
pub fn copy_mapped<D: AsFd>(dst: &D, bytes: &[u8]) -> Result<()> {
    if bytes.is_empty() {
        return Ok(());
    }

    let relay = RelayPipe::new()?;
    let mut gifted = 0usize;
    let mut sent = 0usize;

    while sent < bytes.len() {
        if gifted < bytes.len() {
            if let Step::Moved(n) = gift_step(relay.write.as_fd(), &bytes[gifted..])? {
                gifted += n;
            }
        }
        if let Step::Moved(n) = splice_step(relay.read.as_fd(), dst.as_fd(), bytes.len() - sent)? {
            sent += n;
        }
    }

    tracing::debug!(bytes = sent, "payload delivered from locked mapping");
    Ok(())
}

/// Streams `src` into `dst` through the relay pipe until the source is
/// exhausted, one bounded chunk per step.
///
/// End-of-stream is a read step that moves zero bytes; the loop then keeps
/// draining whatever still sits in the pipe, and terminates only once
/// `forwarded == received` with no more source bytes coming. Returns the
/// number of bytes delivered.
pub fn copy_stream<S: AsFd, D: AsFd>(src: &S, dst: &D) -> Result<u64> {
    let relay = RelayPipe::new()?;
    let mut received: u64 = 0;
    let mut forwarded: u64 = 0;
    let mut exhausted = false;

    while !exhausted || forwarded < received {
        if !exhausted {
            wait_readable(src)?;
            match splice_step(src.as_fd(), relay.write.as_fd(), CHUNK)? {
                Step::Moved(0) => exhausted = true,
                Step::Moved(n) => received += n as u64,
                Step::WouldBlock => {}
            }
        }
        if let Step::Moved(n) = splice_step(relay.read.as_fd(), dst.as_fd(), CHUNK)? {
            forwarded += n as u64;
        }
    }

    tracing::debug!(bytes = forwarded, "payload streamed through relay pipe");
    Ok(forwarded)
}
