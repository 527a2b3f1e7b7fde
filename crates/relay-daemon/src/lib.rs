//! relay-daemon library: Exposes internal modules for testing.
//!
//! This is a thin library layer over the relay components,
//! allowing integration tests to drive a real server.

pub mod config;
pub mod connection;
pub mod error;
pub mod redis_store;
pub mod server;

#[cfg(test)]
mod test_support;

// Re-export key types for convenience
pub use config::{Config, StoreBackend, StoreConfig};
pub use connection::{ConnectionHandler, ConnectionState, Departure, HandlerConfig, PeerStream};
pub use error::RelayError;
pub use redis_store::RedisStore;
pub use server::{ConnectionSource, RelayServer};
