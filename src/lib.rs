//! Liveness monitor for Rust game servers.
//!
//! Polls a server with an A2S_INFO query at a fixed interval and relays
//! every result (UP or DOWN) to the console, an append-only log file, a
//! Discord webhook, or the Discord channel that asked for it.

pub mod bot;
pub mod config;
pub mod endpoint;
pub mod error;
pub mod notify;
pub mod process;
pub mod query;
pub mod report;
pub mod session;
pub mod worker;

pub use config::Config;
pub use endpoint::{DEFAULT_PORT, Endpoint};
pub use error::Error;
pub use process::{serve_bot, watch_server};
pub use query::{QueryResult, Status, query};
