//! Polling reconciliation against providers that have no push channel.
//!
//! Each poller is a spawned task tied to a `PollerHandle`; dropping the handle
//! cancels the task, so a view that goes away takes its timers with it.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{mpsc, Notify};
use tokio_util::sync::CancellationToken;

use super::pr_cache::PrCache;
use super::store::SessionStore;
use crate::provider::{Providers, SandboxProvider, SessionStats};
use crate::session::{ProviderKind, Session, SessionKey};

pub const LIST_POLL_INTERVAL: Duration = Duration::from_secs(60);
pub const DETAIL_POLL_INTERVAL: Duration = Duration::from_secs(5);
pub const STATS_POLL_INTERVAL: Duration = Duration::from_secs(1);
/// How long the "session is gone" notice stays before returning to the list.
pub const GONE_NOTICE_DELAY: Duration = Duration::from_secs(2);

#[derive(Debug, Clone)]
pub enum PollEvent {
    /// Visible sessions after a successful listing.
    List(Vec<Session>),
    ListFailed(String),
    Detail(Session),
    DetailFailed { key: SessionKey, message: String },
    /// The provider no longer knows the session.
    Gone(SessionKey),
    Stats { key: SessionKey, stats: SessionStats },
    /// The stats poller for this session ended on its own.
    StatsEnded(SessionKey),
}

pub struct PollerHandle {
    cancel: CancellationToken,
    wake: Arc<Notify>,
}

impl PollerHandle {
    fn new() -> Self {
        Self {
            cancel: CancellationToken::new(),
            wake: Arc::new(Notify::new()),
        }
    }

    /// Poll now instead of waiting for the next tick.
    pub fn refresh(&self) {
        self.wake.notify_one();
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }
}

impl Drop for PollerHandle {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

/// Sleep for `interval`, or less if woken. `false` once cancelled.
async fn wait_tick(cancel: &CancellationToken, wake: &Notify, interval: Duration) -> bool {
    tokio::select! {
        _ = cancel.cancelled() => false,
        _ = tokio::time::sleep(interval) => true,
        _ = wake.notified() => true,
    }
}

pub fn spawn_list_poller(
    providers: Providers,
    store: SessionStore,
    tx: mpsc::UnboundedSender<PollEvent>,
) -> PollerHandle {
    let handle = PollerHandle::new();
    let cancel = handle.cancel.clone();
    let wake = handle.wake.clone();

    tokio::spawn(async move {
        loop {
            let event = tokio::select! {
                _ = cancel.cancelled() => break,
                result = providers.list_all() => match result {
                    Ok(sessions) => {
                        store.replace_all(sessions);
                        PollEvent::List(store.visible())
                    }
                    Err(e) => {
                        tracing::warn!("Session list poll failed: {}", e);
                        PollEvent::ListFailed(e.to_string())
                    }
                },
            };
            if tx.send(event).is_err() {
                break;
            }
            if !wait_tick(&cancel, &wake, LIST_POLL_INTERVAL).await {
                break;
            }
        }
        tracing::debug!("list poller stopped");
    });

    handle
}

/// Poll one session. Ends after reporting `Gone`.
pub fn spawn_detail_poller(
    providers: Providers,
    store: SessionStore,
    key: SessionKey,
    pr_cache: Option<PrCache>,
    tx: mpsc::UnboundedSender<PollEvent>,
) -> PollerHandle {
    let handle = PollerHandle::new();
    let cancel = handle.cancel.clone();
    let wake = handle.wake.clone();

    tokio::spawn(async move {
        loop {
            let (event, gone) = tokio::select! {
                _ = cancel.cancelled() => break,
                result = providers.get_session(&key) => match result {
                    Ok(Some(session)) => {
                        store.upsert(session.clone());
                        if let Some(cache) = &pr_cache {
                            cache.get(&session);
                        }
                        (PollEvent::Detail(session), false)
                    }
                    Ok(None) => {
                        store.retire(&key);
                        (PollEvent::Gone(key.clone()), true)
                    }
                    Err(e) => {
                        tracing::warn!("Detail poll for {} failed: {}", key, e);
                        store.mark_unknown(&key);
                        (
                            PollEvent::DetailFailed {
                                key: key.clone(),
                                message: e.to_string(),
                            },
                            false,
                        )
                    }
                },
            };
            if tx.send(event).is_err() || gone {
                break;
            }
            if !wait_tick(&cancel, &wake, DETAIL_POLL_INTERVAL).await {
                break;
            }
        }
        tracing::debug!("detail poller for {} stopped", key);
    });

    handle
}

/// Resource usage for a running local session. `None` for other providers.
/// The task ends once the provider stops reporting stats.
pub fn spawn_stats_poller(
    provider: Arc<dyn SandboxProvider>,
    key: SessionKey,
    tx: mpsc::UnboundedSender<PollEvent>,
) -> Option<PollerHandle> {
    if key.provider != ProviderKind::Local || provider.kind() != ProviderKind::Local {
        return None;
    }

    let handle = PollerHandle::new();
    let cancel = handle.cancel.clone();
    let wake = handle.wake.clone();

    tokio::spawn(async move {
        loop {
            let stats = tokio::select! {
                _ = cancel.cancelled() => break,
                result = provider.stats(&key.id) => result,
            };
            match stats {
                Ok(Some(stats)) => {
                    if tx
                        .send(PollEvent::Stats {
                            key: key.clone(),
                            stats,
                        })
                        .is_err()
                    {
                        break;
                    }
                }
                Ok(None) => {
                    let _ = tx.send(PollEvent::StatsEnded(key.clone()));
                    break;
                }
                Err(e) => tracing::debug!("stats for {} failed: {}", key, e),
            }
            if !wait_tick(&cancel, &wake, STATS_POLL_INTERVAL).await {
                break;
            }
        }
    });

    Some(handle)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::provider::mock::MockProvider;
    use crate::session::SessionStatus;
    use tokio::time::Instant;

    fn session(id: &str, status: SessionStatus) -> Session {
        let mut s = Session::new(id, id, ProviderKind::Local);
        s.status = status;
        s
    }

    fn providers(local: Arc<MockProvider>) -> Providers {
        Providers::new(
            local,
            Arc::new(MockProvider::new(ProviderKind::Cloud)),
            ProviderKind::Local,
        )
    }

    #[tokio::test(start_paused = true)]
    async fn test_detail_converges_within_interval() {
        let local = Arc::new(MockProvider::with_sessions(
            ProviderKind::Local,
            vec![session("a", SessionStatus::Running)],
        ));
        let store = SessionStore::new();
        let (tx, mut rx) = mpsc::unbounded_channel();
        let key = SessionKey::new(ProviderKind::Local, "a");
        let _handle = spawn_detail_poller(providers(local.clone()), store.clone(), key, None, tx);

        match rx.recv().await.unwrap() {
            PollEvent::Detail(s) => assert_eq!(s.status, SessionStatus::Running),
            other => panic!("unexpected {:?}", other),
        }

        local.set_status("a", SessionStatus::Exited { exit_code: 1 });
        let changed = Instant::now();
        match rx.recv().await.unwrap() {
            PollEvent::Detail(s) => assert_eq!(s.status, SessionStatus::Exited { exit_code: 1 }),
            other => panic!("unexpected {:?}", other),
        }
        assert!(changed.elapsed() <= DETAIL_POLL_INTERVAL);
        assert_eq!(
            store.snapshot()[0].status,
            SessionStatus::Exited { exit_code: 1 }
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_list_converges_within_interval() {
        let local = Arc::new(MockProvider::with_sessions(
            ProviderKind::Local,
            vec![session("a", SessionStatus::Running)],
        ));
        let store = SessionStore::new();
        let (tx, mut rx) = mpsc::unbounded_channel();
        let _handle = spawn_list_poller(providers(local.clone()), store.clone(), tx);

        assert!(matches!(rx.recv().await.unwrap(), PollEvent::List(l) if l.len() == 1));

        local.set_status("a", SessionStatus::Stopped);
        let changed = Instant::now();
        match rx.recv().await.unwrap() {
            PollEvent::List(l) => assert_eq!(l[0].status, SessionStatus::Stopped),
            other => panic!("unexpected {:?}", other),
        }
        assert!(changed.elapsed() <= LIST_POLL_INTERVAL);
    }

    #[tokio::test(start_paused = true)]
    async fn test_list_refresh_skips_wait() {
        let local = Arc::new(MockProvider::new(ProviderKind::Local));
        let store = SessionStore::new();
        let (tx, mut rx) = mpsc::unbounded_channel();
        let handle = spawn_list_poller(providers(local.clone()), store, tx);
        rx.recv().await.unwrap();

        local.insert(session("new", SessionStatus::Running));
        let asked = Instant::now();
        handle.refresh();
        match rx.recv().await.unwrap() {
            PollEvent::List(l) => assert_eq!(l.len(), 1),
            other => panic!("unexpected {:?}", other),
        }
        assert!(asked.elapsed() < Duration::from_secs(1));
    }

    #[tokio::test(start_paused = true)]
    async fn test_detail_gone_retires_record() {
        let local = Arc::new(MockProvider::with_sessions(
            ProviderKind::Local,
            vec![session("a", SessionStatus::Running)],
        ));
        let store = SessionStore::new();
        store.replace_all(local.sessions());
        let (tx, mut rx) = mpsc::unbounded_channel();
        let key = SessionKey::new(ProviderKind::Local, "a");
        let _handle =
            spawn_detail_poller(providers(local.clone()), store.clone(), key.clone(), None, tx);
        rx.recv().await.unwrap();

        local.forget("a");
        assert!(matches!(rx.recv().await.unwrap(), PollEvent::Gone(k) if k == key));
        assert!(store.snapshot().is_empty());
        // The poller ends after Gone.
        assert!(rx.recv().await.is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_detail_failure_marks_unknown() {
        let local = Arc::new(MockProvider::with_sessions(
            ProviderKind::Local,
            vec![session("a", SessionStatus::Running)],
        ));
        local.fail_gets(true);
        let store = SessionStore::new();
        store.replace_all(local.sessions());
        let (tx, mut rx) = mpsc::unbounded_channel();
        let key = SessionKey::new(ProviderKind::Local, "a");
        let _handle = spawn_detail_poller(providers(local), store.clone(), key, None, tx);

        assert!(matches!(
            rx.recv().await.unwrap(),
            PollEvent::DetailFailed { .. }
        ));
        assert_eq!(store.snapshot()[0].status, SessionStatus::Unknown);
    }

    #[tokio::test(start_paused = true)]
    async fn test_dropping_handle_stops_polling() {
        let local = Arc::new(MockProvider::new(ProviderKind::Local));
        let (tx, mut rx) = mpsc::unbounded_channel();
        let handle = spawn_list_poller(providers(local.clone()), SessionStore::new(), tx);
        rx.recv().await.unwrap();

        drop(handle);
        tokio::time::sleep(LIST_POLL_INTERVAL * 3).await;
        let lists = local.calls().iter().filter(|c| *c == "list").count();
        assert_eq!(lists, 1);
        assert!(rx.recv().await.is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_stats_only_for_local() {
        let cloud: Arc<dyn SandboxProvider> = Arc::new(MockProvider::new(ProviderKind::Cloud));
        let (tx, _rx) = mpsc::unbounded_channel();
        assert!(spawn_stats_poller(cloud, SessionKey::new(ProviderKind::Cloud, "a"), tx).is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_stats_stop_when_session_stops() {
        let local = Arc::new(MockProvider::with_sessions(
            ProviderKind::Local,
            vec![session("a", SessionStatus::Running)],
        ));
        let (tx, mut rx) = mpsc::unbounded_channel();
        let provider: Arc<dyn SandboxProvider> = local.clone();
        let _handle =
            spawn_stats_poller(provider, SessionKey::new(ProviderKind::Local, "a"), tx).unwrap();

        assert!(matches!(rx.recv().await.unwrap(), PollEvent::Stats { .. }));
        local.set_status("a", SessionStatus::Stopped);
        // One more tick sees no stats, says so, and the task ends.
        let mut last = None;
        while let Some(event) = rx.recv().await {
            last = Some(event);
        }
        assert!(matches!(last, Some(PollEvent::StatsEnded(k)) if k.id == "a"));
    }
}
