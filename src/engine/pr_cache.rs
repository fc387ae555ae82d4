//! Stale-while-revalidate cache of PR metadata per session.

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use tokio::time::Instant;

use crate::collab::{PrInfo, PrLookup};
use crate::session::{Session, SessionKey};

pub const PR_CACHE_TTL: Duration = Duration::from_secs(60);

#[derive(Debug, Clone)]
struct Entry {
    info: Option<PrInfo>,
    last_checked: Instant,
}

#[derive(Default)]
struct State {
    entries: HashMap<SessionKey, Entry>,
    in_flight: HashSet<SessionKey>,
}

#[derive(Clone)]
pub struct PrCache {
    state: Arc<Mutex<State>>,
    lookup: Arc<dyn PrLookup>,
}

impl PrCache {
    pub fn new(lookup: Arc<dyn PrLookup>) -> Self {
        Self {
            state: Arc::new(Mutex::new(State::default())),
            lookup,
        }
    }

    fn lock(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(|p| p.into_inner())
    }

    /// The cached entry, however old. `None` when never fetched.
    pub fn peek(&self, key: &SessionKey) -> Option<Option<PrInfo>> {
        self.lock().entries.get(key).map(|e| e.info.clone())
    }

    pub fn is_stale(&self, key: &SessionKey) -> bool {
        match self.lock().entries.get(key) {
            Some(entry) => entry.last_checked.elapsed() >= PR_CACHE_TTL,
            None => true,
        }
    }

    /// Return whatever is cached right away; if that is missing or older than
    /// the TTL, refresh in the background.
    pub fn get(&self, session: &Session) -> Option<PrInfo> {
        let key = session.key();
        let cached = self.peek(&key).flatten();
        if self.is_stale(&key) {
            self.spawn_refresh(session);
        }
        cached
    }

    fn spawn_refresh(&self, session: &Session) {
        let key = session.key();
        if !self.lock().in_flight.insert(key) {
            return;
        }
        let cache = self.clone();
        let session = session.clone();
        tokio::spawn(async move {
            cache.refresh(&session).await;
        });
    }

    pub async fn refresh(&self, session: &Session) -> Option<PrInfo> {
        let key = session.key();
        let info = self
            .lookup
            .get_pr_for_branch(&session.repo, &session.branch)
            .await;

        let mut state = self.lock();
        state.in_flight.remove(&key);
        state.entries.insert(
            key,
            Entry {
                info: info.clone(),
                last_checked: Instant::now(),
            },
        );
        info
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::ProviderKind;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct CountingLookup {
        calls: AtomicUsize,
    }

    #[async_trait]
    impl PrLookup for CountingLookup {
        async fn get_pr_for_branch(&self, _repo: &str, branch: &str) -> Option<PrInfo> {
            let n = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
            Some(PrInfo {
                number: n as u64,
                title: format!("PR for {}", branch),
                state: "OPEN".to_string(),
                url: String::new(),
                is_draft: false,
            })
        }
    }

    fn session() -> Session {
        let mut s = Session::new("a", "alpha", ProviderKind::Local);
        s.repo = "acme/widgets".to_string();
        s.branch = "alpha".to_string();
        s
    }

    async fn settle() {
        for _ in 0..10 {
            tokio::task::yield_now().await;
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_stale_while_revalidate() {
        let lookup = Arc::new(CountingLookup {
            calls: AtomicUsize::new(0),
        });
        let cache = PrCache::new(lookup.clone());
        let s = session();

        // Nothing cached yet: empty answer, background fetch.
        assert!(cache.get(&s).is_none());
        settle().await;
        assert_eq!(lookup.calls.load(Ordering::SeqCst), 1);

        // Fresh: served from cache without a lookup.
        assert_eq!(cache.get(&s).map(|p| p.number), Some(1));
        settle().await;
        assert_eq!(lookup.calls.load(Ordering::SeqCst), 1);

        // Stale: the old value is returned immediately, then refreshed.
        tokio::time::advance(PR_CACHE_TTL).await;
        assert_eq!(cache.get(&s).map(|p| p.number), Some(1));
        settle().await;
        assert_eq!(lookup.calls.load(Ordering::SeqCst), 2);
        assert_eq!(cache.peek(&s.key()).flatten().map(|p| p.number), Some(2));
    }

    #[tokio::test(start_paused = true)]
    async fn test_refresh_not_duplicated_while_in_flight() {
        let lookup = Arc::new(CountingLookup {
            calls: AtomicUsize::new(0),
        });
        let cache = PrCache::new(lookup.clone());
        let s = session();

        cache.get(&s);
        cache.get(&s);
        cache.get(&s);
        settle().await;
        assert_eq!(lookup.calls.load(Ordering::SeqCst), 1);
    }
}
