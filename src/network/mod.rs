//! Network Module
//!
//! TCP server and client handling.
//!
//! ## Architecture
//! - Single acceptor thread polling the listener
//! - One thread per connection, all sharing one `WorldMap`
//! - Blocking client for tools and tests

mod server;
mod connection;
mod client;

pub use server::Server;
pub use connection::{CloseSignal, Connection, ConnectionHandle, ConnectionId, ConnectionState};
pub use client::Client;
