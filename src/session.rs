//! Per-user store context
//!
//! A [`Session`] owns one instance of every store for a signed-in user. Sessions
//! are created on first use through the [`SessionRegistry`] and torn down on
//! sign-out or after sitting idle, which drops every cached listing.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::sync::{Mutex, RwLock};
use tracing::info;
use uuid::Uuid;

use crate::data::TableService;
use crate::domain::entities::{Address, BrowsingHistoryItem, Notification, Store, Wallet};
use crate::store::{EntityStore, FollowStore, Scope, TransactionLog};
use crate::Result;

pub struct Session {
    user_id: Uuid,
    last_activity: Mutex<Instant>,
    pub addresses: EntityStore<Address>,
    pub wallets: EntityStore<Wallet>,
    pub stores: EntityStore<Store>,
    pub notifications: EntityStore<Notification>,
    pub history: EntityStore<BrowsingHistoryItem>,
    pub follows: FollowStore,
    pub transactions: TransactionLog,
}

impl Session {
    /// Empty stores for `user_id`; the transaction log is read from `data_dir`.
    pub async fn open(tables: Arc<dyn TableService>, data_dir: impl Into<PathBuf>, user_id: Uuid) -> Result<Self> {
        let log_path = data_dir.into().join("transactions").join(format!("{user_id}.json"));
        Ok(Self {
            user_id,
            last_activity: Mutex::new(Instant::now()),
            addresses: EntityStore::new(tables.clone()),
            wallets: EntityStore::new(tables.clone()),
            stores: EntityStore::new(tables.clone()),
            notifications: EntityStore::new(tables.clone()),
            history: EntityStore::new(tables.clone()),
            follows: FollowStore::new(tables),
            transactions: TransactionLog::open(log_path).await?,
        })
    }

    pub fn user_id(&self) -> Uuid {
        self.user_id
    }

    async fn touch(&self) {
        *self.last_activity.lock().await = Instant::now();
    }

    async fn idle_for(&self) -> Duration {
        self.last_activity.lock().await.elapsed()
    }

    /// Fetch every remote-backed listing concurrently.
    #[tracing::instrument(skip(self), fields(user_id = %self.user_id))]
    pub async fn load(&self) -> Result<()> {
        let scope = Scope::Owner(self.user_id);
        tokio::try_join!(
            self.addresses.fetch(scope),
            self.wallets.fetch(scope),
            self.stores.fetch(scope),
            self.notifications.fetch(scope),
            self.history.fetch(scope),
            self.follows.fetch(self.user_id),
        )?;
        Ok(())
    }

    /// Drop every cached listing. The transaction log stays on disk.
    pub async fn invalidate(&self) {
        tokio::join!(
            self.addresses.invalidate(),
            self.wallets.invalidate(),
            self.stores.invalidate(),
            self.notifications.invalidate(),
            self.history.invalidate(),
            self.follows.invalidate(),
        );
    }
}

/// Live sessions keyed by user.
pub struct SessionRegistry {
    tables: Arc<dyn TableService>,
    data_dir: PathBuf,
    sessions: RwLock<HashMap<Uuid, Arc<Session>>>,
}

impl SessionRegistry {
    pub fn new(tables: Arc<dyn TableService>, data_dir: impl Into<PathBuf>) -> Self {
        Self { tables, data_dir: data_dir.into(), sessions: RwLock::new(HashMap::new()) }
    }

    pub fn tables(&self) -> Arc<dyn TableService> {
        self.tables.clone()
    }

    /// The session of `user_id`, created on first use.
    pub async fn open(&self, user_id: Uuid) -> Result<Arc<Session>> {
        if let Some(session) = self.sessions.read().await.get(&user_id).cloned() {
            session.touch().await;
            return Ok(session);
        }
        let mut sessions = self.sessions.write().await;
        if let Some(session) = sessions.get(&user_id).cloned() {
            session.touch().await;
            return Ok(session);
        }
        let session = Arc::new(Session::open(self.tables.clone(), &self.data_dir, user_id).await?);
        sessions.insert(user_id, session.clone());
        info!(%user_id, "session opened");
        Ok(session)
    }

    pub async fn get(&self, user_id: Uuid) -> Option<Arc<Session>> {
        self.sessions.read().await.get(&user_id).cloned()
    }

    /// Clear the user's caches and forget the session. Returns whether one existed.
    pub async fn sign_out(&self, user_id: Uuid) -> bool {
        let removed = self.sessions.write().await.remove(&user_id);
        match removed {
            Some(session) => {
                session.invalidate().await;
                info!(%user_id, "session closed");
                true
            }
            None => false,
        }
    }

    pub async fn active(&self) -> usize {
        self.sessions.read().await.len()
    }

    /// Close every session untouched for at least `ttl`. Returns how many closed.
    pub async fn evict_idle(&self, ttl: Duration) -> usize {
        let mut expired = Vec::new();
        {
            let mut sessions = self.sessions.write().await;
            let mut idle = Vec::new();
            for (user_id, session) in sessions.iter() {
                if session.idle_for().await >= ttl {
                    idle.push(*user_id);
                }
            }
            for user_id in idle {
                if let Some(session) = sessions.remove(&user_id) {
                    expired.push(session);
                }
            }
        }
        for session in &expired {
            session.invalidate().await;
        }
        if !expired.is_empty() {
            info!(count = expired.len(), "idle sessions closed");
        }
        expired.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::entities::{NewAddress, NewNotification, NotificationKind};
    use crate::testing::RecordingTables;
    use tempfile::TempDir;

    fn registry(dir: &TempDir) -> SessionRegistry {
        SessionRegistry::new(Arc::new(RecordingTables::new()) as Arc<dyn TableService>, dir.path())
    }

    #[tokio::test]
    async fn test_open_returns_the_same_session() {
        let dir = TempDir::new().unwrap();
        let sessions = registry(&dir);
        let user = Uuid::new_v4();
        let first = sessions.open(user).await.unwrap();
        let second = sessions.open(user).await.unwrap();
        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(sessions.active().await, 1);
    }

    #[tokio::test]
    async fn test_load_and_sign_out() {
        let dir = TempDir::new().unwrap();
        let sessions = registry(&dir);
        let user = Uuid::new_v4();
        let session = sessions.open(user).await.unwrap();
        session
            .notifications
            .create(NewNotification {
                user_id: user,
                title: "Welcome".into(),
                message: "Thanks for joining Bizury".into(),
                kind: NotificationKind::System,
                link: None,
            })
            .await
            .unwrap();
        session
            .addresses
            .create(NewAddress {
                user_id: user,
                label: Some("Work".into()),
                recipient_name: "Tunde Bakare".into(),
                phone: "+2348099999999".into(),
                street: "3 Broad Street".into(),
                city: "Lagos".into(),
                state: None,
                postal_code: None,
                country: "Nigeria".into(),
                is_default: true,
            })
            .await
            .unwrap();

        session.invalidate().await;
        session.load().await.unwrap();
        assert_eq!(session.notifications.items().await.len(), 1);
        assert_eq!(session.addresses.items().await.len(), 1);

        assert!(sessions.sign_out(user).await);
        assert!(session.addresses.items().await.is_empty());
        assert!(session.notifications.scope().await.is_none());
        assert!(sessions.get(user).await.is_none());
        assert!(!sessions.sign_out(user).await);
    }

    #[tokio::test]
    async fn test_evict_idle_sessions() {
        let dir = TempDir::new().unwrap();
        let sessions = registry(&dir);
        let user = Uuid::new_v4();
        sessions.open(user).await.unwrap();

        assert_eq!(sessions.evict_idle(Duration::from_secs(3600)).await, 0);
        assert_eq!(sessions.active().await, 1);
        assert_eq!(sessions.evict_idle(Duration::ZERO).await, 1);
        assert_eq!(sessions.active().await, 0);
        assert!(sessions.get(user).await.is_none());
    }

    #[tokio::test]
    async fn test_corrupt_transaction_log_does_not_block_session() {
        let dir = TempDir::new().unwrap();
        let user = Uuid::new_v4();
        let log_dir = dir.path().join("transactions");
        std::fs::create_dir_all(&log_dir).unwrap();
        std::fs::write(log_dir.join(format!("{user}.json")), b"not json").unwrap();

        let session = registry(&dir).open(user).await.unwrap();
        assert!(session.transactions.transactions().await.is_empty());
        session.load().await.unwrap();
    }
}
