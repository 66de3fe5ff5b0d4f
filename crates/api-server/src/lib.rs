#![warn(clippy::unwrap_used)]

pub mod forward;
pub mod rest;
pub mod server;

pub use forward::RemoteForwarder;
pub use server::RelayServer;
