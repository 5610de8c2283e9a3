//! midi-relay: a single-connection MIDI file relay
//!
//! Listens on a TCP port, accepts one client, and either sends the
//! configured MIDI file (`GET\n\n`) or stores an uploaded one (`PUT\n\n`),
//! then stops.
//!
//! Features:
//! - Serve-one-then-stop TCP responder
//! - Fetch and upload client for the same protocol
//! - Configuration via CLI arguments or TOML file

pub mod client;
pub mod config;
pub mod connection;
pub mod error;
pub mod protocol;
pub mod server;

pub use error::{Error, Result};
pub use server::{start, Server, SessionReport};
