//! DeltaFi - Drive the remote arbitrage agent from your terminal.

pub mod amount;
pub mod app;
pub mod client;
pub mod config;
pub mod dedup;
pub mod error;
pub mod identity;
pub mod lifecycle;
pub mod poller;
pub mod protocol;
pub mod reveal;
pub mod screens;
pub mod snapshot;
pub mod tokens;

pub use app::{App, AppMessage};
