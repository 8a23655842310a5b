//! Side channel for bulk binary transfers.
//!
//! Thumbnails and uploaded images never travel over the control
//! WebSocket. The device announces an ephemeral TCP (optionally TLS)
//! endpoint in a `conn_info` reply, and the payload is exchanged there
//! using length-prefixed JSON headers followed by raw bytes.
//!
//! # Wire format
//!
//! See [`wire`] module for the binary frame layout.

pub mod client;
pub mod error;
pub mod tls;
pub mod wire;

pub use client::SideChannel;
pub use error::DataChannelError;
pub use wire::{Frame, FrameHeader};

use std::time::Duration;

/// Write buffer size for uploads (256 KB).
pub const SIDE_BUFFER_SIZE: usize = 256 * 1024;

/// Timeout for the TCP connect and TLS handshake.
pub const SIDE_CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// Timeout for moving the frames once connected.
pub const SIDE_TRANSFER_TIMEOUT: Duration = Duration::from_secs(30);
