//! Chat command front end.
//!
//! Two commands drive the [`SessionManager`]: `monitor` starts a session for
//! the invoking channel and `stop` tears down every session of that channel.
//! Commands arrive as text lines of the form `<channel_id> <command>`; public
//! replies are posted back to the channel, ephemeral ones only reach the
//! operator console.

use log::{error, info, warn};
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncBufRead, AsyncBufReadExt};
use tokio::select;
use tokio_util::sync::CancellationToken;

use crate::endpoint::Endpoint;
use crate::error::Error;
use crate::notify::{DiscordRest, Notifier};
use crate::session::{SessionKey, SessionManager, StartOutcome};

pub const DEFAULT_INTERVAL_SECS: u64 = 10;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Monitor { server: String, interval_secs: u64 },
    Stop,
}

impl FromStr for Command {
    type Err = Error;

    /// Accepts `monitor <server> [interval]` and `stop`, with an optional
    /// leading `/` and optional `server:` / `interval:` option names.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut words = s.split_whitespace();
        let name = words
            .next()
            .ok_or_else(|| Error::InvalidCommand("empty command".to_string()))?;

        match name.trim_start_matches('/') {
            "monitor" => {
                let server = words
                    .next()
                    .map(|w| w.strip_prefix("server:").unwrap_or(w).to_string())
                    .filter(|w| !w.is_empty())
                    .ok_or_else(|| Error::InvalidCommand("monitor needs a server".to_string()))?;

                let interval_secs = match words.next() {
                    Some(w) => w
                        .strip_prefix("interval:")
                        .unwrap_or(w)
                        .parse::<u64>()
                        .map_err(|_| Error::InvalidCommand(format!("invalid interval '{w}'")))?,
                    None => DEFAULT_INTERVAL_SECS,
                };
                if interval_secs == 0 {
                    return Err(Error::InvalidCommand(
                        "interval must be at least 1 second".to_string(),
                    ));
                }

                if let Some(extra) = words.next() {
                    return Err(Error::InvalidCommand(format!("unexpected argument '{extra}'")));
                }
                Ok(Command::Monitor {
                    server,
                    interval_secs,
                })
            }
            "stop" => match words.next() {
                Some(extra) => Err(Error::InvalidCommand(format!("unexpected argument '{extra}'"))),
                None => Ok(Command::Stop),
            },
            other => Err(Error::InvalidCommand(format!("unknown command '{other}'"))),
        }
    }
}

/// Response to a command. Ephemeral replies are only shown to the requester.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reply {
    pub content: String,
    pub ephemeral: bool,
}

impl Reply {
    fn public(content: String) -> Self {
        Self {
            content,
            ephemeral: false,
        }
    }

    fn ephemeral(content: String) -> Self {
        Self {
            content,
            ephemeral: true,
        }
    }
}

/// Builds the notifiers for a session started from `channel_id`.
pub type SinkFactory = Box<dyn Fn(u64, &Endpoint) -> Vec<Arc<dyn Notifier>> + Send + Sync>;

pub struct Bot {
    sessions: SessionManager,
    sinks: SinkFactory,
}

impl Bot {
    #[must_use]
    pub fn new(sessions: SessionManager, sinks: SinkFactory) -> Self {
        Self { sessions, sinks }
    }

    #[must_use]
    pub fn sessions(&self) -> &SessionManager {
        &self.sessions
    }

    /// Executes `command` on behalf of `channel_id`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidEndpoint`] if a `monitor` server string does not parse.
    pub async fn handle(&self, channel_id: u64, command: Command) -> Result<Reply, Error> {
        match command {
            Command::Monitor {
                server,
                interval_secs,
            } => {
                let endpoint: Endpoint = server.parse()?;
                let key = SessionKey::new(channel_id, endpoint.clone());
                let notifiers = (self.sinks)(channel_id, &endpoint);

                match self
                    .sessions
                    .start(key, Duration::from_secs(interval_secs), notifiers)
                    .await
                {
                    StartOutcome::Started => Ok(Reply::public(format!(
                        "🎮 Started monitoring `{endpoint}` every {interval_secs}s."
                    ))),
                    StartOutcome::AlreadyMonitoring => Ok(Reply::ephemeral(format!(
                        "⚠️ Already monitoring `{endpoint}` in this channel."
                    ))),
                }
            }
            Command::Stop => {
                let stopped = self.sessions.stop_channel(channel_id).await;
                if stopped.is_empty() {
                    Ok(Reply::ephemeral(
                        "⚠️ No active monitoring tasks in this channel.".to_string(),
                    ))
                } else {
                    let list: Vec<String> = stopped.iter().map(ToString::to_string).collect();
                    Ok(Reply::public(format!(
                        "🛑 Stopped monitoring: {}",
                        list.join(", ")
                    )))
                }
            }
        }
    }

    /// Parses and runs one `<channel_id> <command>` line.
    ///
    /// Returns `None` for blank lines. Bad input becomes an ephemeral reply.
    pub async fn handle_line(&self, line: &str) -> Option<(u64, Reply)> {
        let line = line.trim();
        if line.is_empty() {
            return None;
        }

        let Some((channel, rest)) = line.split_once(char::is_whitespace) else {
            let reply = format!("⚠️ Expected '<channel_id> <command>', got '{line}'");
            return Some((0, Reply::ephemeral(reply)));
        };
        let Ok(channel_id) = channel.parse::<u64>() else {
            let reply = format!("⚠️ Invalid channel id '{channel}'");
            return Some((0, Reply::ephemeral(reply)));
        };

        let reply = match rest.parse::<Command>() {
            Ok(command) => self.handle(channel_id, command).await,
            Err(e) => Err(e),
        };

        Some(match reply {
            Ok(reply) => (channel_id, reply),
            Err(e) => (channel_id, Reply::ephemeral(format!("⚠️ {e}"))),
        })
    }
}

/// Reads command lines from `reader` until EOF or cancellation.
///
/// Public replies are posted to their channel through `rest` when available;
/// every reply is also echoed to stdout.
///
/// # Errors
///
/// Returns [`Error::Io`] if reading from `reader` fails.
pub async fn run_console<R>(
    bot: &Bot,
    reader: R,
    rest: Option<Arc<DiscordRest>>,
    token: CancellationToken,
) -> Result<(), Error>
where
    R: AsyncBufRead + Unpin,
{
    let mut lines = reader.lines();
    info!("Bot ready, waiting for commands ('<channel_id> monitor <host[:port]> [interval]' or '<channel_id> stop')");

    loop {
        let line = select! {
            line = lines.next_line() => line?,
            () = token.cancelled() => {
                info!("Shutdown requested, closing command console");
                break;
            }
        };
        let Some(line) = line else {
            info!("Command input closed");
            break;
        };

        let Some((channel_id, reply)) = bot.handle_line(&line).await else {
            continue;
        };
        println!("[{channel_id}] {}", reply.content);

        if reply.ephemeral {
            warn!("{}", reply.content);
            continue;
        }
        if let Some(rest) = &rest
            && let Err(e) = rest.send_message(channel_id, &reply.content).await
        {
            error!("Failed to post reply to channel {channel_id}: {e}");
        }
    }

    Ok(())
}
