//! Background task queue for destructive operations.
//!
//! `enqueue` hides the target in the pending-delete overlay before returning.
//! The overlay entry is cleared when the operation finishes either way, so a
//! failed removal makes the session reappear on the next reconcile.

use std::future::Future;
use std::sync::Arc;

use tokio::sync::{mpsc, Semaphore};
use tokio::task::JoinHandle;

use super::store::SessionStore;
use crate::provider::{Providers, Result};
use crate::session::SessionKey;

#[derive(Debug, Clone)]
pub struct TaskEvent {
    pub label: String,
    pub key: SessionKey,
    pub result: std::result::Result<(), String>,
}

#[derive(Clone)]
pub struct TaskQueue {
    store: SessionStore,
    events: mpsc::UnboundedSender<TaskEvent>,
    limit: Option<Arc<Semaphore>>,
}

impl TaskQueue {
    /// `max_concurrent` bounds how many tasks run at once; `None` is unbounded.
    pub fn new(
        store: SessionStore,
        max_concurrent: Option<usize>,
    ) -> (Self, mpsc::UnboundedReceiver<TaskEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let limit = max_concurrent
            .filter(|n| *n > 0)
            .map(|n| Arc::new(Semaphore::new(n)));
        (
            Self {
                store,
                events: tx,
                limit,
            },
            rx,
        )
    }

    pub fn enqueue<F>(&self, label: impl Into<String>, key: SessionKey, op: F) -> JoinHandle<()>
    where
        F: Future<Output = Result<()>> + Send + 'static,
    {
        let label = label.into();
        self.store.mark_pending(key.clone());

        let store = self.store.clone();
        let events = self.events.clone();
        let limit = self.limit.clone();
        tokio::spawn(async move {
            let _permit = match &limit {
                Some(sem) => sem.clone().acquire_owned().await.ok(),
                None => None,
            };

            let result = op.await;
            match &result {
                Ok(()) => {
                    tracing::info!("{} {} finished", label, key);
                    store.retire(&key);
                }
                Err(e) => tracing::warn!("{} {} failed: {}", label, key, e),
            }
            store.clear_pending(&key);

            let _ = events.send(TaskEvent {
                label,
                key,
                result: result.map_err(|e| e.to_string()),
            });
        })
    }

    pub fn enqueue_remove(&self, providers: &Providers, key: SessionKey) -> JoinHandle<()> {
        let provider = providers.get(key.provider);
        let id = key.id.clone();
        self.enqueue("Remove", key, async move { provider.remove(&id).await })
    }

    /// Remove every visible session that has exited or stopped.
    pub fn clean(&self, providers: &Providers) -> Vec<JoinHandle<()>> {
        self.store
            .visible()
            .into_iter()
            .filter(|s| s.status.is_finished())
            .map(|s| self.enqueue_remove(providers, s.key()))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::provider::mock::MockProvider;
    use crate::provider::ProviderError;
    use crate::session::{ProviderKind, Session, SessionStatus};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

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

    #[tokio::test]
    async fn test_enqueue_hides_immediately_and_retires_on_success() {
        let store = SessionStore::new();
        store.replace_all(vec![session("a", SessionStatus::Running)]);
        let (queue, mut events) = TaskQueue::new(store.clone(), None);
        let key = SessionKey::new(ProviderKind::Local, "a");

        let handle = queue.enqueue("Remove", key.clone(), async { Ok(()) });
        assert!(store.visible().is_empty());

        handle.await.unwrap();
        let event = events.recv().await.unwrap();
        assert_eq!(event.key, key);
        assert!(event.result.is_ok());
        assert!(!store.is_pending(&key));
        assert!(store.snapshot().is_empty());
    }

    #[tokio::test]
    async fn test_failed_task_makes_session_reappear() {
        let store = SessionStore::new();
        store.replace_all(vec![session("b", SessionStatus::Exited { exit_code: 1 })]);
        let (queue, mut events) = TaskQueue::new(store.clone(), None);
        let key = SessionKey::new(ProviderKind::Local, "b");

        queue.enqueue("Remove", key.clone(), async {
            Err(ProviderError::Command("boom".to_string()))
        });
        assert!(store.visible().is_empty());

        let event = events.recv().await.unwrap();
        assert_eq!(event.result, Err("boom".to_string()));
        let visible = store.visible();
        assert_eq!(visible.len(), 1);
        assert_eq!(visible[0].status, SessionStatus::Exited { exit_code: 1 });
    }

    #[tokio::test]
    async fn test_clean_removes_only_finished() {
        let store = SessionStore::new();
        let local = Arc::new(MockProvider::with_sessions(
            ProviderKind::Local,
            vec![
                session("a", SessionStatus::Running),
                session("b", SessionStatus::Exited { exit_code: 0 }),
                session("c", SessionStatus::Stopped),
            ],
        ));
        store.replace_all(local.sessions());
        let (queue, _events) = TaskQueue::new(store.clone(), None);

        for handle in queue.clean(&providers(local.clone())) {
            handle.await.unwrap();
        }

        let left: Vec<String> = local.sessions().into_iter().map(|s| s.id).collect();
        assert_eq!(left, vec!["a"]);
        assert_eq!(store.visible().len(), 1);
    }

    #[tokio::test]
    async fn test_limit_bounds_concurrency() {
        let store = SessionStore::new();
        let (queue, _events) = TaskQueue::new(store, Some(1));
        let running = Arc::new(AtomicUsize::new(0));
        let peak = Arc::new(AtomicUsize::new(0));

        let mut handles = Vec::new();
        for i in 0..3 {
            let running = running.clone();
            let peak = peak.clone();
            let key = SessionKey::new(ProviderKind::Local, format!("s{}", i));
            handles.push(queue.enqueue("Remove", key, async move {
                let now = running.fetch_add(1, Ordering::SeqCst) + 1;
                peak.fetch_max(now, Ordering::SeqCst);
                tokio::time::sleep(Duration::from_millis(10)).await;
                running.fetch_sub(1, Ordering::SeqCst);
                Ok(())
            }));
        }
        for handle in handles {
            handle.await.unwrap();
        }
        assert_eq!(peak.load(Ordering::SeqCst), 1);
    }
}
