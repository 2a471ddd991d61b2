use chrono::{DateTime, SecondsFormat, Utc};

use crate::endpoint::Endpoint;
use crate::query::QueryResult;

/// ISO-8601 UTC timestamp with second precision, e.g. `2025-01-01T12:00:00+00:00`.
#[must_use]
pub fn iso_timestamp(ts: &DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Secs, false)
}

/// One poll outcome for one endpoint, as handed to every notifier.
#[derive(Debug, Clone)]
pub struct Report {
    pub endpoint: Endpoint,
    pub result: QueryResult,
}

impl Report {
    #[must_use]
    pub fn new(endpoint: Endpoint, result: QueryResult) -> Self {
        Self { endpoint, result }
    }

    #[must_use]
    pub fn timestamp(&self) -> String {
        iso_timestamp(&self.result.timestamp)
    }

    /// `<timestamp> <host>:<port> <UP|DOWN>` followed by a newline.
    #[must_use]
    pub fn log_line(&self) -> String {
        format!(
            "{} {} {}\n",
            self.timestamp(),
            self.endpoint,
            self.result.status()
        )
    }

    #[must_use]
    pub fn console_line(&self) -> String {
        let ts = self.timestamp();
        match &self.result.server_name {
            Some(name) if self.result.alive => format!("{ts} 🟢 {} is UP — {name}", self.endpoint),
            _ => format!("{ts} 🔴 {} is DOWN", self.endpoint),
        }
    }

    /// Markdown message for chat sinks.
    #[must_use]
    pub fn chat_message(&self) -> String {
        let ts = self.timestamp();
        match &self.result.server_name {
            Some(name) if self.result.alive => format!(
                "✅ **Rust Server is UP**\n`{}`\n**Name:** {name}\n🕒 {ts}",
                self.endpoint
            ),
            _ => format!("❌ **Rust Server is DOWN**\n`{}`\n🕒 {ts}", self.endpoint),
        }
    }
}
