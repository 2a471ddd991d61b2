use log::{info, warn};
use std::io::{BufRead, Write};
use std::sync::Arc;
use std::time::Duration;
use tokio::io::BufReader;
use tokio_util::sync::CancellationToken;

use crate::bot::{self, Bot};
use crate::config::Config;
use crate::endpoint::Endpoint;
use crate::error::Error;
use crate::notify::{
    ChannelNotifier, ConsoleNotifier, DISCORD_API_BASE, DiscordRest, LogFileNotifier, Notifier,
    WebhookNotifier,
};
use crate::session::SessionManager;
use crate::worker;

/// Fills in the server and interval for watch mode, asking on `input` for
/// whatever was not given on the command line. An empty interval answer
/// keeps the configured default.
///
/// # Errors
///
/// Returns an error for an unparsable server or interval, a zero interval,
/// or a failed read.
pub fn resolve_watch_target<R: BufRead, W: Write>(
    config: &Config,
    server: Option<String>,
    interval: Option<u64>,
    input: &mut R,
    output: &mut W,
) -> Result<(Endpoint, Duration), Error> {
    let server = match server {
        Some(server) => server,
        None => prompt(
            "🌐 Enter server IP or domain:port (e.g., biweekly.eu.moose.gg:28010): ",
            input,
            output,
        )?,
    };
    let endpoint: Endpoint = server.parse()?;

    let interval_secs = match interval {
        Some(secs) => secs,
        None => {
            let question = format!(
                "⏳ Ping interval in seconds (default {}): ",
                config.config.interval_secs
            );
            let answer = prompt(&question, input, output)?;
            if answer.is_empty() {
                config.config.interval_secs
            } else {
                answer
                    .parse()
                    .map_err(|_| Error::Config(format!("invalid interval '{answer}'")))?
            }
        }
    };
    if interval_secs == 0 {
        return Err(Error::Config("interval must be at least 1 second".to_string()));
    }

    Ok((endpoint, Duration::from_secs(interval_secs)))
}

fn prompt<R: BufRead, W: Write>(
    question: &str,
    input: &mut R,
    output: &mut W,
) -> Result<String, Error> {
    write!(output, "{question}")?;
    output.flush()?;

    let mut line = String::new();
    input.read_line(&mut line)?;
    Ok(line.trim().to_string())
}

/// Monitors a single server until `token` is cancelled.
///
/// Every poll is printed, appended to `<log_dir>/<host>_<port>_ping.log`, and
/// posted to the webhook when one is configured.
///
/// # Errors
///
/// Fails before the first poll if the log file cannot be opened or the
/// webhook client cannot be built.
pub async fn watch_server(
    config: &Config,
    endpoint: Endpoint,
    interval: Duration,
    token: CancellationToken,
) -> Result<(), Error> {
    let timeout = worker::query_timeout_for(interval, config.query_timeout());

    // Initial configuration logging
    info!("Starting Rust server monitoring...");
    info!("Check interval: {} seconds", interval.as_secs());
    info!("Timeout: {} ms", timeout.as_millis());

    let log_file = LogFileNotifier::open(&config.config.log_dir, &endpoint, interval).await?;
    info!("Appending poll results to {}", log_file.path().display());

    let mut notifiers: Vec<Arc<dyn Notifier>> = vec![
        Arc::new(ConsoleNotifier) as Arc<dyn Notifier>,
        Arc::new(log_file),
    ];

    match (&config.config.webhook_url, config.config.discord_id) {
        (Some(webhook_url), discord_id) => {
            info!("Webhook is set, a notification will be sent on every check");
            if discord_id.is_none() {
                warn!("Discord ID is not set, notifications will not tag any user");
            }
            notifiers.push(Arc::new(WebhookNotifier::new(webhook_url.clone(), discord_id)?));
        }
        (None, _) => warn!("Webhook is not set, no notifications will be sent"),
    }

    println!("🎮 Monitoring Rust server {endpoint} every {}s — Press Ctrl+C to stop", interval.as_secs());
    worker::monitor_endpoint(&endpoint, interval, timeout, &notifiers, token).await;
    println!("🛑 Monitoring stopped by user.");

    Ok(())
}

/// Runs the command console of the chat bot until stdin closes or `token`
/// is cancelled, then stops every session.
///
/// # Errors
///
/// Fails at startup if no bot token is configured.
pub async fn serve_bot(config: &Config, token: CancellationToken) -> Result<(), Error> {
    let rest = Arc::new(DiscordRest::new(DISCORD_API_BASE, config.bot_token()?)?);
    let sessions = SessionManager::new(token.child_token(), config.query_timeout());

    let channel_rest = Arc::clone(&rest);
    let bot = Bot::new(
        sessions,
        Box::new(move |channel_id: u64, _: &Endpoint| {
            let channel: Arc<dyn Notifier> =
                Arc::new(ChannelNotifier::new(Arc::clone(&channel_rest), channel_id));
            vec![Arc::new(ConsoleNotifier) as Arc<dyn Notifier>, channel]
        }),
    );

    let result = bot::run_console(
        &bot,
        BufReader::new(tokio::io::stdin()),
        Some(rest),
        token,
    )
    .await;

    bot.sessions().shutdown().await;
    info!("All monitoring sessions stopped");
    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::query::tests::{info_reply, spawn_responder};
    use tokio::time::sleep;

    #[tokio::test]
    async fn test_watch_writes_log_until_cancelled() {
        let dir = tempfile::tempdir().expect("Failed to create temp dir");
        let endpoint = spawn_responder(vec![Some(info_reply("Alpha"))]).await;

        let mut config = Config::default();
        config.config.log_dir = dir.path().to_path_buf();

        let token = CancellationToken::new();
        let canceller = {
            let token = token.clone();
            tokio::spawn(async move {
                sleep(Duration::from_millis(300)).await;
                token.cancel();
            })
        };

        watch_server(&config, endpoint.clone(), Duration::from_secs(60), token)
            .await
            .unwrap();
        canceller.await.unwrap();

        let content = std::fs::read_to_string(dir.path().join(endpoint.log_file_name())).unwrap();
        let lines: Vec<&str> = content.lines().collect();
        assert_eq!(lines.len(), 2);
        assert!(lines[1].ends_with(&format!(" {endpoint} UP")));
    }

    #[test]
    fn test_resolve_prompts_for_missing_values() {
        let config = Config::default();
        let mut input: &[u8] = b"play.example.com:28010\n\n";
        let mut output = Vec::new();

        let (endpoint, interval) =
            resolve_watch_target(&config, None, None, &mut input, &mut output).unwrap();

        assert_eq!(endpoint.to_string(), "play.example.com:28010");
        assert_eq!(interval, Duration::from_secs(10));
        let shown = String::from_utf8(output).unwrap();
        assert!(shown.contains("Enter server IP"));
        assert!(shown.contains("(default 10)"));
    }

    #[test]
    fn test_resolve_skips_prompts_for_given_values() {
        let config = Config::default();
        let mut input: &[u8] = b"";
        let mut output = Vec::new();

        let (endpoint, interval) = resolve_watch_target(
            &config,
            Some("10.0.0.1".to_string()),
            Some(30),
            &mut input,
            &mut output,
        )
        .unwrap();

        assert_eq!(endpoint.port(), 28015);
        assert_eq!(interval, Duration::from_secs(30));
        assert!(output.is_empty());
    }

    #[test]
    fn test_resolve_rejects_bad_interval() {
        let config = Config::default();
        for answer in [&b"ten\n"[..], &b"0\n"[..]] {
            let mut input = answer;
            let result = resolve_watch_target(
                &config,
                Some("host".to_string()),
                None,
                &mut input,
                &mut Vec::<u8>::new(),
            );
            assert!(matches!(result, Err(Error::Config(_))));
        }
    }

    #[tokio::test]
    async fn test_bot_requires_token() {
        let mut config = Config::default();
        config.config.bot_token = None;

        let result = serve_bot(&config, CancellationToken::new()).await;
        assert!(matches!(result, Err(Error::Config(_))));
    }
}
