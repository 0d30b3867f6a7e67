//! `seamtrack-hal` – robot controller link.
//!
//! # Modules
//!
//! - [`crc`] – word-wise CRC shared by both directions of the protocol.
//! - [`wire`] – [`OutgoingFrame`][wire::OutgoingFrame] and
//!   [`IncomingFrame`][wire::IncomingFrame]: explicit little-endian
//!   encode / decode of the fixed-size records.
//! - [`transport`] – [`Transport`][transport::Transport] seam and the
//!   production [`TcpTransport`][transport::TcpTransport].
//! - [`link`] – [`RobotLink`][link::RobotLink]: outgoing queue, background
//!   communication cycle, published robot status and link health.

pub mod crc;
pub mod link;
pub mod transport;
pub mod wire;

pub use link::{LinkConfig, MotionLink, RobotLink};
pub use transport::{TcpTransport, Transport};
