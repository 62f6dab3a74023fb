//! Framed binary messaging over byte-oriented transports.
//!
//! A [`Connection`] moves raw bytes over TCP, UDP or a serial line. A
//! [`FrameCodec`] turns the accumulated bytes into [`Frame`]s and recovers
//! from corruption. A [`Peer`] pairs the two and runs the receive loop, and
//! a [`ConnectionManager`] closes everything at shutdown.

pub mod codec;
pub mod diagnostics;
pub mod network;
pub mod runtime;
pub mod service;

pub use codec::{drain_frames, AsciiFrameCodec, Frame, FrameCodec, LengthPrefixedCodec};
pub use network::{Connection, EndpointDescriptor, Listener};
pub use runtime::{ConnectionManager, Peer, PeerState};
pub use service::{AppConfig, AppError, AppResult, FrameHandler, Server};
