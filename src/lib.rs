//! A browser-resident remote terminal multiplexer client: connects to a
//! server hosting live terminal panels, renders them from a stream of
//! compressed frames, and provides a bidirectional rsync-style file-transfer
//! subsystem with resumption, delta sync, and disk-backed caching.
//!
//! This crate is a library with no `[[bin]]` target; a host embedder wires
//! it to a transport, a window, and an event loop.

pub mod cache;
pub mod command;
pub mod config;
pub mod control;
pub mod delta;
pub mod error;
pub mod frame;
pub mod panel;
pub mod split;
pub mod tabs;
pub mod transfer;
pub mod transport;
pub mod worker;
pub mod zip;

pub use error::{Error, ErrorTag, Result};
