//! SMS relay: forwards received SMS to HTTP destinations and sends the
//! outgoing SMS they hand back.

pub mod activity;
pub mod client;
pub mod config;
pub mod device;
pub mod engine;
pub mod error;
pub mod filter;
pub mod logging;
pub mod message;
pub mod scheduler;
pub mod store;
