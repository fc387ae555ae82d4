//! The shared session set and the pending-delete overlay.
//!
//! Both are only ever replaced wholesale: readers get an `Arc` snapshot and
//! never observe a half-applied update.

use std::collections::HashSet;
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};

use crate::session::{Session, SessionKey, SessionStatus};

#[derive(Default)]
struct Inner {
    sessions: Arc<Vec<Session>>,
    pending: Arc<HashSet<SessionKey>>,
}

#[derive(Clone, Default)]
pub struct SessionStore {
    inner: Arc<RwLock<Inner>>,
}

impl SessionStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn read(&self) -> RwLockReadGuard<'_, Inner> {
        self.inner.read().unwrap_or_else(|p| p.into_inner())
    }

    fn write(&self) -> RwLockWriteGuard<'_, Inner> {
        self.inner.write().unwrap_or_else(|p| p.into_inner())
    }

    fn update(&self, f: impl FnOnce(&mut Vec<Session>)) {
        let mut inner = self.write();
        let mut next = (*inner.sessions).clone();
        f(&mut next);
        inner.sessions = Arc::new(next);
    }

    pub fn replace_all(&self, sessions: Vec<Session>) {
        self.write().sessions = Arc::new(sessions);
    }

    pub fn upsert(&self, session: Session) {
        self.update(|sessions| {
            let key = session.key();
            match sessions.iter_mut().find(|s| s.key() == key) {
                Some(existing) => *existing = session,
                None => sessions.insert(0, session),
            }
        });
    }

    /// Drop a record whose existence the provider no longer confirms.
    pub fn retire(&self, key: &SessionKey) {
        self.update(|sessions| sessions.retain(|s| &s.key() != key));
    }

    pub fn mark_unknown(&self, key: &SessionKey) {
        self.update(|sessions| {
            if let Some(s) = sessions.iter_mut().find(|s| &s.key() == key) {
                s.status = SessionStatus::Unknown;
            }
        });
    }

    /// Everything the providers last reported, overlay included.
    pub fn snapshot(&self) -> Arc<Vec<Session>> {
        self.read().sessions.clone()
    }

    /// What views may show: the snapshot minus pending deletes.
    pub fn visible(&self) -> Vec<Session> {
        let inner = self.read();
        inner
            .sessions
            .iter()
            .filter(|s| !inner.pending.contains(&s.key()))
            .cloned()
            .collect()
    }

    pub fn get(&self, key: &SessionKey) -> Option<Session> {
        let inner = self.read();
        if inner.pending.contains(key) {
            return None;
        }
        inner.sessions.iter().find(|s| &s.key() == key).cloned()
    }

    pub fn mark_pending(&self, key: SessionKey) {
        let mut inner = self.write();
        let mut next = (*inner.pending).clone();
        next.insert(key);
        inner.pending = Arc::new(next);
    }

    pub fn clear_pending(&self, key: &SessionKey) {
        let mut inner = self.write();
        let mut next = (*inner.pending).clone();
        next.remove(key);
        inner.pending = Arc::new(next);
    }

    pub fn is_pending(&self, key: &SessionKey) -> bool {
        self.read().pending.contains(key)
    }

    pub fn pending(&self) -> Arc<HashSet<SessionKey>> {
        self.read().pending.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::ProviderKind;

    fn session(id: &str, status: SessionStatus) -> Session {
        let mut s = Session::new(id, id, ProviderKind::Local);
        s.status = status;
        s
    }

    #[test]
    fn test_pending_ids_are_never_visible() {
        let store = SessionStore::new();
        store.replace_all(vec![
            session("a", SessionStatus::Running),
            session("b", SessionStatus::Exited { exit_code: 1 }),
        ]);
        let b = SessionKey::new(ProviderKind::Local, "b");
        store.mark_pending(b.clone());

        let ids: Vec<String> = store.visible().into_iter().map(|s| s.id).collect();
        assert_eq!(ids, vec!["a"]);
        assert!(store.get(&b).is_none());

        // A fresh provider listing that still reports b does not bring it back.
        store.replace_all(vec![
            session("a", SessionStatus::Running),
            session("b", SessionStatus::Exited { exit_code: 1 }),
        ]);
        assert_eq!(store.visible().len(), 1);

        store.clear_pending(&b);
        assert_eq!(store.visible().len(), 2);
    }

    #[test]
    fn test_keys_are_per_provider() {
        let store = SessionStore::new();
        let local = session("x", SessionStatus::Running);
        let mut cloud = session("x", SessionStatus::Stopped);
        cloud.provider = ProviderKind::Cloud;
        store.replace_all(vec![local, cloud]);

        store.mark_pending(SessionKey::new(ProviderKind::Cloud, "x"));
        let visible = store.visible();
        assert_eq!(visible.len(), 1);
        assert_eq!(visible[0].provider, ProviderKind::Local);
    }

    #[test]
    fn test_upsert_replaces_whole_record() {
        let store = SessionStore::new();
        store.replace_all(vec![session("a", SessionStatus::Running)]);
        let before = store.snapshot();

        store.upsert(session("a", SessionStatus::Exited { exit_code: 0 }));
        store.upsert(session("c", SessionStatus::Running));

        // Old snapshots are untouched.
        assert_eq!(before[0].status, SessionStatus::Running);
        let now = store.snapshot();
        assert_eq!(now.len(), 2);
        assert_eq!(now[0].id, "c");
        assert_eq!(now[1].status, SessionStatus::Exited { exit_code: 0 });
    }

    #[test]
    fn test_retire_and_mark_unknown() {
        let store = SessionStore::new();
        store.replace_all(vec![
            session("a", SessionStatus::Running),
            session("b", SessionStatus::Running),
        ]);
        store.mark_unknown(&SessionKey::new(ProviderKind::Local, "a"));
        store.retire(&SessionKey::new(ProviderKind::Local, "b"));

        let now = store.snapshot();
        assert_eq!(now.len(), 1);
        assert_eq!(now[0].status, SessionStatus::Unknown);
    }
}
