use std::sync::Arc;

use super::{CloudProvider, ErrorKind, LocalProvider, Result, SandboxProvider};
use crate::collab::CloudAuth;
use crate::session::{Config, ProviderKind, Session, SessionKey};

/// Both drivers, keyed by kind, with one of them active.
#[derive(Clone)]
pub struct Providers {
    local: Arc<dyn SandboxProvider>,
    cloud: Arc<dyn SandboxProvider>,
    active: ProviderKind,
}

impl Providers {
    pub fn new(
        local: Arc<dyn SandboxProvider>,
        cloud: Arc<dyn SandboxProvider>,
        active: ProviderKind,
    ) -> Self {
        Self {
            local,
            cloud,
            active,
        }
    }

    pub fn from_config(config: &Config, cloud_auth: Arc<dyn CloudAuth>) -> Result<Self> {
        let local = Arc::new(LocalProvider::new(config.local.clone()));
        let cloud = Arc::new(CloudProvider::new(config.cloud.clone(), cloud_auth)?);
        Ok(Self::new(
            local,
            cloud,
            config.sandbox_provider.unwrap_or_default(),
        ))
    }

    pub fn get(&self, kind: ProviderKind) -> Arc<dyn SandboxProvider> {
        match kind {
            ProviderKind::Local => self.local.clone(),
            ProviderKind::Cloud => self.cloud.clone(),
        }
    }

    pub fn active_kind(&self) -> ProviderKind {
        self.active
    }

    pub fn active(&self) -> Arc<dyn SandboxProvider> {
        self.get(self.active)
    }

    pub fn set_active(&mut self, kind: ProviderKind) {
        self.active = kind;
    }

    /// Active provider first, then the other.
    pub fn in_order(&self) -> [ProviderKind; 2] {
        [self.active, self.active.other()]
    }

    /// Sessions across both providers. A provider that is not set up is
    /// skipped; any other failure fails the listing.
    pub async fn list_all(&self) -> Result<Vec<Session>> {
        let mut sessions = Vec::new();
        for kind in self.in_order() {
            match self.get(kind).list().await {
                Ok(mut found) => sessions.append(&mut found),
                Err(e) if e.kind() == ErrorKind::SetupNeeded => {
                    tracing::debug!("Skipping {} provider in listing: {}", kind, e);
                }
                Err(e) => return Err(e),
            }
        }
        Ok(sessions)
    }

    pub async fn get_session(&self, key: &SessionKey) -> Result<Option<Session>> {
        self.get(key.provider).get(&key.id).await
    }

    /// Whether any listed session already uses `branch`. Listing failures
    /// count as "not taken".
    pub async fn branch_taken(&self, branch: &str) -> bool {
        match self.list_all().await {
            Ok(sessions) => sessions.iter().any(|s| s.branch == branch),
            Err(e) => {
                tracing::warn!("Could not list sessions to check branch '{}': {}", branch, e);
                false
            }
        }
    }
}
