//! Notification sinks.
//!
//! Every poll produces a [`Report`] that is handed to each configured
//! [`Notifier`]. Sinks report their own failures as `Err`; the poll loop logs
//! them and keeps going.

use async_trait::async_trait;
use log::debug;
use reqwest::Client;
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::fs::{File, OpenOptions};
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;

use crate::endpoint::Endpoint;
use crate::error::Error;
use crate::report::{Report, iso_timestamp};

/// Upper bound for a single webhook or chat API call.
pub const SEND_TIMEOUT: Duration = Duration::from_secs(5);

pub const DISCORD_API_BASE: &str = "https://discord.com/api/v10";

#[async_trait]
pub trait Notifier: Send + Sync {
    /// Short label used in diagnostics.
    fn name(&self) -> &'static str;

    async fn notify(&self, report: &Report) -> Result<(), Error>;
}

/// Prints the status line to stdout.
#[derive(Debug, Default)]
pub struct ConsoleNotifier;

#[async_trait]
impl Notifier for ConsoleNotifier {
    fn name(&self) -> &'static str {
        "console"
    }

    async fn notify(&self, report: &Report) -> Result<(), Error> {
        println!("{}", report.console_line());
        Ok(())
    }
}

/// Append-only poll log, one line per poll.
///
/// The file stays open for the lifetime of the notifier.
#[derive(Debug)]
pub struct LogFileNotifier {
    path: PathBuf,
    file: Mutex<File>,
}

impl LogFileNotifier {
    /// Opens `dir/<endpoint log name>` for append and writes the session header.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Io`] if the file cannot be opened or written.
    pub async fn open(dir: &Path, endpoint: &Endpoint, interval: Duration) -> Result<Self, Error> {
        let path = dir.join(endpoint.log_file_name());
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .await?;

        let header = format!(
            "# Monitoring started {} host={} port={} interval={}s\n",
            iso_timestamp(&chrono::Utc::now()),
            endpoint.host(),
            endpoint.port(),
            interval.as_secs()
        );
        file.write_all(header.as_bytes()).await?;
        file.flush().await?;

        Ok(Self {
            path,
            file: Mutex::new(file),
        })
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[async_trait]
impl Notifier for LogFileNotifier {
    fn name(&self) -> &'static str {
        "log file"
    }

    async fn notify(&self, report: &Report) -> Result<(), Error> {
        let mut file = self.file.lock().await;
        file.write_all(report.log_line().as_bytes()).await?;
        file.flush().await?;
        Ok(())
    }
}

#[derive(Serialize)]
struct DiscordMessage {
    content: String,
}

/// Posts `{"content": ...}` to a Discord-compatible webhook.
///
/// The webhook URL carries its token, so errors are stripped of the URL.
pub struct WebhookNotifier {
    client: Client,
    webhook_url: String,
    discord_id: Option<u64>,
}

impl WebhookNotifier {
    /// # Errors
    ///
    /// Returns [`Error::HttpRequest`] if the HTTP client cannot be built.
    pub fn new(webhook_url: impl Into<String>, discord_id: Option<u64>) -> Result<Self, Error> {
        let client = Client::builder().timeout(SEND_TIMEOUT).build()?;
        Ok(Self {
            client,
            webhook_url: webhook_url.into(),
            discord_id,
        })
    }
}

#[async_trait]
impl Notifier for WebhookNotifier {
    fn name(&self) -> &'static str {
        "webhook"
    }

    async fn notify(&self, report: &Report) -> Result<(), Error> {
        // If discord_id is None, we don't want to mention anyone
        let tag = self.discord_id.map_or(String::new(), |id| format!("<@{id}> "));

        let payload = DiscordMessage {
            content: format!("{tag}{}", report.chat_message()),
        };

        self.client
            .post(&self.webhook_url)
            .json(&payload)
            .send()
            .await
            .map_err(reqwest::Error::without_url)?
            .error_for_status()
            .map_err(reqwest::Error::without_url)?;
        Ok(())
    }
}

/// Bot-authenticated client for posting into Discord channels.
pub struct DiscordRest {
    client: Client,
    api_base: String,
    bot_token: String,
}

impl std::fmt::Debug for DiscordRest {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DiscordRest")
            .field("api_base", &self.api_base)
            .field("bot_token", &"<redacted>")
            .finish_non_exhaustive()
    }
}

impl DiscordRest {
    /// # Errors
    ///
    /// Returns [`Error::HttpRequest`] if the HTTP client cannot be built.
    pub fn new(api_base: impl Into<String>, bot_token: impl Into<String>) -> Result<Self, Error> {
        let client = Client::builder().timeout(SEND_TIMEOUT).build()?;
        Ok(Self {
            client,
            api_base: api_base.into().trim_end_matches('/').to_string(),
            bot_token: bot_token.into(),
        })
    }

    /// Posts a plain message to `channel_id`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::HttpRequest`] on transport failure or a non-2xx response.
    pub async fn send_message(&self, channel_id: u64, content: &str) -> Result<(), Error> {
        let url = format!("{}/channels/{channel_id}/messages", self.api_base);
        debug!("Posting message to channel {channel_id}");

        self.client
            .post(url)
            .header(reqwest::header::AUTHORIZATION, format!("Bot {}", self.bot_token))
            .json(&DiscordMessage {
                content: content.to_string(),
            })
            .send()
            .await
            .map_err(reqwest::Error::without_url)?
            .error_for_status()
            .map_err(reqwest::Error::without_url)?;
        Ok(())
    }
}

/// Sends status messages to the chat channel that started the session.
#[derive(Debug)]
pub struct ChannelNotifier {
    rest: std::sync::Arc<DiscordRest>,
    channel_id: u64,
}

impl ChannelNotifier {
    #[must_use]
    pub fn new(rest: std::sync::Arc<DiscordRest>, channel_id: u64) -> Self {
        Self { rest, channel_id }
    }
}

#[async_trait]
impl Notifier for ChannelNotifier {
    fn name(&self) -> &'static str {
        "channel"
    }

    async fn notify(&self, report: &Report) -> Result<(), Error> {
        self.rest
            .send_message(self.channel_id, &report.chat_message())
            .await
    }
}
