//! Registry of running monitor sessions.
//!
//! A session is one poll loop bound to a (channel, endpoint) pair. The
//! registry guarantees at most one live session per key; starts and stops for
//! the same key may race from different command handlers, so every mutation
//! goes through one mutex.

use log::{info, warn};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::endpoint::Endpoint;
use crate::notify::Notifier;
use crate::worker;

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SessionKey {
    pub channel_id: u64,
    pub endpoint: Endpoint,
}

impl SessionKey {
    #[must_use]
    pub fn new(channel_id: u64, endpoint: Endpoint) -> Self {
        Self {
            channel_id,
            endpoint,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Idle,
    Running,
    Stopped,
    Crashed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StartOutcome {
    Started,
    AlreadyMonitoring,
}

struct Session {
    token: CancellationToken,
    handle: JoinHandle<()>,
}

impl Session {
    fn state(&self) -> SessionState {
        match (self.handle.is_finished(), self.token.is_cancelled()) {
            (false, _) => SessionState::Running,
            (true, true) => SessionState::Stopped,
            (true, false) => SessionState::Crashed,
        }
    }
}

pub struct SessionManager {
    sessions: Mutex<HashMap<SessionKey, Session>>,
    shutdown: CancellationToken,
    query_timeout: Duration,
}

impl SessionManager {
    /// Sessions are cancelled individually on stop, and all at once when
    /// `shutdown` is cancelled.
    #[must_use]
    pub fn new(shutdown: CancellationToken, query_timeout: Duration) -> Self {
        Self {
            sessions: Mutex::new(HashMap::new()),
            shutdown,
            query_timeout,
        }
    }

    /// Starts a poll loop for `key` unless one is already running.
    ///
    /// A previous session for the same key that has crashed is pruned and
    /// replaced.
    pub async fn start(
        &self,
        key: SessionKey,
        interval: Duration,
        notifiers: Vec<Arc<dyn Notifier>>,
    ) -> StartOutcome {
        let mut sessions = self.sessions.lock().await;

        if let Some(existing) = sessions.get(&key) {
            match existing.state() {
                SessionState::Running => {
                    warn!(
                        "Channel {} is already monitoring {}",
                        key.channel_id, key.endpoint
                    );
                    return StartOutcome::AlreadyMonitoring;
                }
                state => {
                    warn!(
                        "Replacing {state:?} session for {} in channel {}",
                        key.endpoint, key.channel_id
                    );
                    sessions.remove(&key);
                }
            }
        }

        let token = self.shutdown.child_token();
        let timeout = worker::query_timeout_for(interval, self.query_timeout);
        let handle = {
            let token = token.clone();
            let endpoint = key.endpoint.clone();
            tokio::spawn(async move {
                worker::monitor_endpoint(&endpoint, interval, timeout, &notifiers, token).await;
            })
        };

        info!(
            "Started session for {} in channel {}",
            key.endpoint, key.channel_id
        );
        sessions.insert(key, Session { token, handle });
        StartOutcome::Started
    }

    /// Cancels and removes every session of `channel_id`.
    ///
    /// Returns the stopped endpoints in sorted order; empty if none were active.
    pub async fn stop_channel(&self, channel_id: u64) -> Vec<Endpoint> {
        let mut sessions = self.sessions.lock().await;

        let keys: Vec<SessionKey> = sessions
            .keys()
            .filter(|key| key.channel_id == channel_id)
            .cloned()
            .collect();

        let mut stopped = Vec::with_capacity(keys.len());
        for key in keys {
            if let Some(session) = sessions.remove(&key) {
                session.token.cancel();
                stopped.push(key.endpoint);
            }
        }
        stopped.sort();

        if !stopped.is_empty() {
            info!("Stopped {} session(s) in channel {channel_id}", stopped.len());
        }
        stopped
    }

    /// Cancels every session and waits for the loops to wind down.
    pub async fn shutdown(&self) {
        self.shutdown.cancel();
        let drained: Vec<(SessionKey, Session)> = self.sessions.lock().await.drain().collect();

        for (key, session) in drained {
            if let Err(e) = session.handle.await {
                warn!("Session for {} ended abnormally: {e}", key.endpoint);
            }
        }
    }

    pub async fn state(&self, key: &SessionKey) -> SessionState {
        self.sessions
            .lock()
            .await
            .get(key)
            .map_or(SessionState::Idle, Session::state)
    }

    pub async fn contains(&self, key: &SessionKey) -> bool {
        self.sessions.lock().await.contains_key(key)
    }

    pub async fn len(&self) -> usize {
        self.sessions.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.sessions.lock().await.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;
    use crate::notify::tests::RecordingNotifier;
    use crate::report::Report;
    use async_trait::async_trait;
    use tokio::time::sleep;

    const QUERY_TIMEOUT: Duration = Duration::from_millis(100);

    struct PanickingNotifier;

    #[async_trait]
    impl Notifier for PanickingNotifier {
        fn name(&self) -> &'static str {
            "panicking"
        }

        async fn notify(&self, _report: &Report) -> Result<(), Error> {
            panic!("sink exploded");
        }
    }

    fn key(channel_id: u64, server: &str) -> SessionKey {
        SessionKey::new(channel_id, server.parse().unwrap())
    }

    fn sinks(notifier: Arc<dyn Notifier>) -> Vec<Arc<dyn Notifier>> {
        vec![notifier]
    }

    fn manager() -> SessionManager {
        SessionManager::new(CancellationToken::new(), QUERY_TIMEOUT)
    }

    #[tokio::test]
    async fn test_duplicate_start_is_rejected() {
        let manager = manager();
        let recorder = Arc::new(RecordingNotifier::default());
        let interval = Duration::from_secs(60);

        let first = manager
            .start(key(1, "127.0.0.1:9"), interval, sinks(recorder.clone()))
            .await;
        let second = manager
            .start(key(1, "127.0.0.1:9"), interval, sinks(recorder.clone()))
            .await;

        assert_eq!(first, StartOutcome::Started);
        assert_eq!(second, StartOutcome::AlreadyMonitoring);
        assert_eq!(manager.len().await, 1);

        // Same endpoint in another channel is a different session.
        let other = manager
            .start(key(2, "127.0.0.1:9"), interval, sinks(recorder.clone()))
            .await;
        assert_eq!(other, StartOutcome::Started);
        assert_eq!(manager.len().await, 2);

        sleep(Duration::from_millis(500)).await;
        assert_eq!(recorder.count(), 2, "one poll per session, not per start call");

        manager.shutdown().await;
    }

    #[tokio::test]
    async fn test_stop_channel_cancels_all_its_sessions() {
        let manager = manager();
        let interval = Duration::from_secs(60);
        let a = key(7, "127.0.0.1:9");
        let b = key(7, "127.0.0.2:28015");
        let other = key(8, "127.0.0.1:9");

        for k in [&a, &b, &other] {
            let notifier: Arc<dyn Notifier> = Arc::new(RecordingNotifier::default());
            manager.start(k.clone(), interval, vec![notifier]).await;
        }
        assert_eq!(manager.state(&a).await, SessionState::Running);

        let stopped = manager.stop_channel(7).await;
        assert_eq!(stopped, vec![a.endpoint.clone(), b.endpoint.clone()]);
        assert!(!manager.contains(&a).await);
        assert!(!manager.contains(&b).await);
        assert_eq!(manager.state(&a).await, SessionState::Idle);
        assert!(manager.contains(&other).await);

        assert!(manager.stop_channel(7).await.is_empty());
        manager.shutdown().await;
        assert!(manager.is_empty().await);
    }

    #[tokio::test]
    async fn test_panicking_sink_keeps_session_running() {
        let manager = manager();
        let k = key(3, "127.0.0.1:9");
        let recorder = Arc::new(RecordingNotifier::default());
        let notifiers: Vec<Arc<dyn Notifier>> = vec![
            Arc::new(PanickingNotifier) as Arc<dyn Notifier>,
            recorder.clone() as Arc<dyn Notifier>,
        ];

        manager.start(k.clone(), Duration::from_millis(50), notifiers).await;
        sleep(Duration::from_millis(500)).await;

        assert_eq!(manager.state(&k).await, SessionState::Running);
        assert!(
            recorder.count() >= 2,
            "loop stopped after {} poll(s)",
            recorder.count()
        );

        manager.shutdown().await;
    }

    #[tokio::test]
    async fn test_finished_session_states() {
        let crashed = Session {
            token: CancellationToken::new(),
            handle: tokio::spawn(async {}),
        };
        let stopped = Session {
            token: CancellationToken::new(),
            handle: tokio::spawn(async {}),
        };
        stopped.token.cancel();
        sleep(Duration::from_millis(50)).await;

        assert_eq!(crashed.state(), SessionState::Crashed);
        assert_eq!(stopped.state(), SessionState::Stopped);
    }

    #[tokio::test]
    async fn test_shutdown_stops_running_sessions() {
        let root = CancellationToken::new();
        let manager = SessionManager::new(root.clone(), QUERY_TIMEOUT);
        let k = key(4, "127.0.0.1:9");

        manager
            .start(k.clone(), Duration::from_secs(60), sinks(Arc::new(RecordingNotifier::default())))
            .await;

        tokio::time::timeout(Duration::from_secs(5), manager.shutdown())
            .await
            .expect("shutdown should not hang");
        assert!(root.is_cancelled());
        assert!(manager.is_empty().await);
    }
}
