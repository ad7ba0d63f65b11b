//! Courier Common Library
//!
//! This crate provides the shared machinery used by both the Courier producer
//! and consumer. It includes:
//!
//! - Rendezvous sockets in the Linux abstract namespace (kernel-assigned,
//!   single-use addresses)
//! - Peer credential retrieval and the privileged-peer admission gate
//! - A zero-copy transfer engine built on a kernel relay pipe
//! - Process hardening applied before any secret material is touched
//!
//! # Features
//!
//! - **Unguessable addresses**: the kernel autobinds every listener, so no
//!   path exists on disk and nothing can be squatted or left stale
//! - **Kernel-enforced identity**: peers are admitted on `SO_PEERCRED`, not
//!   on anything the peer sends
//! - **No user-space copies**: payload bytes move fd-to-fd through a pipe via
//!   `splice`/`vmsplice` and never land in a heap buffer
//!
//! Linux only: abstract sockets, `SO_PEERCRED` and the splice family have no
//! portable equivalents, and this crate does not pretend otherwise.

/// Well-known names and tunables shared by both processes
pub mod config;

/// Error taxonomy for every stage of a handoff
pub mod error;

/// Core-dump suppression and related process hardening
pub mod hardening;

/// Peer credential retrieval and the admission policy
pub mod peer_creds;

/// Single-use abstract-namespace rendezvous sockets
pub mod rendezvous;

/// Zero-copy fd-to-fd transfer engine
pub mod transfer;

// Re-export commonly used types for convenience
pub use error::{Error, Result};
pub use peer_creds::PeerIdentity;
pub use rendezvous::Endpoint;
