//! Followed stores
//!
//! The listing holds the followed [`Store`] records, reached through the
//! `store_follows` relation and ordered by when they were followed, newest first.
//! Follow and unfollow both write that same relation.

use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;

use tracing::{info, warn};
use uuid::Uuid;

use super::{decode, owner_filter, to_row, Cache, Scope, Snapshot};
use crate::data::{Filter, Query, TableService};
use crate::domain::entities::{Entity, NewFollow, Store, StoreFollow};
use crate::{Result, StoreError};

pub struct FollowStore {
    tables: Arc<dyn TableService>,
    cache: Cache<Store>,
}

impl FollowStore {
    pub fn new(tables: Arc<dyn TableService>) -> Self {
        Self { tables, cache: Cache::new() }
    }

    pub async fn snapshot(&self) -> Snapshot<Store> { self.cache.snapshot().await }
    pub async fn items(&self) -> Vec<Store> { self.cache.items().await }
    pub fn loading(&self) -> bool { self.cache.loading() }
    pub async fn error(&self) -> Option<String> { self.cache.error().await }

    pub async fn is_following(&self, store_id: Uuid) -> bool {
        self.cache.find(|s| s.id == store_id).await.is_some()
    }

    pub async fn invalidate(&self) {
        self.cache.reset().await;
    }

    #[tracing::instrument(skip(self))]
    pub async fn fetch(&self, user_id: Uuid) -> Result<Vec<Store>> {
        let stores = self.remote(self.load(user_id)).await?;
        self.cache.replace(Scope::Owner(user_id), stores.clone()).await;
        Ok(stores)
    }

    async fn load(&self, user_id: Uuid) -> Result<Vec<Store>> {
        let query = Query::new()
            .filter(owner_filter(StoreFollow::SCOPE_COLUMN, user_id))
            .order_desc(StoreFollow::ORDER_COLUMN);
        let follows = self
            .tables
            .select(StoreFollow::TABLE, &query)
            .await?
            .into_iter()
            .map(decode::<StoreFollow>)
            .collect::<Result<Vec<_>>>()?;
        if follows.is_empty() {
            return Ok(Vec::new());
        }

        let ids = Filter::is_in("id", follows.iter().map(|f| f.store_id.to_string()));
        let mut stores: HashMap<Uuid, Store> = self
            .tables
            .select(Store::TABLE, &Query::new().filter(ids))
            .await?
            .into_iter()
            .map(|row| decode::<Store>(row).map(|s| (s.id, s)))
            .collect::<Result<_>>()?;

        // follows of deleted stores drop out
        Ok(follows.iter().filter_map(|f| stores.remove(&f.store_id)).collect())
    }

    #[tracing::instrument(skip(self))]
    pub async fn follow(&self, user_id: Uuid, store_id: Uuid) -> Result<StoreFollow> {
        let row = to_row(&NewFollow { user_id, store_id })?;
        let follow = self
            .remote(async { decode::<StoreFollow>(self.tables.insert(StoreFollow::TABLE, row).await?) })
            .await?;
        info!("store followed");
        self.resync(user_id).await;
        Ok(follow)
    }

    /// Stop following a store from the cached listing.
    #[tracing::instrument(skip(self))]
    pub async fn unfollow(&self, user_id: Uuid, store_id: Uuid) -> Result<()> {
        if !self.is_following(store_id).await {
            return Err(StoreError::NotFound { entity: Store::NAME, id: store_id });
        }
        let filters = [owner_filter(StoreFollow::SCOPE_COLUMN, user_id), Filter::eq("store_id", store_id.to_string())];
        self.remote(async { Ok::<_, StoreError>(self.tables.delete(StoreFollow::TABLE, &filters).await?) })
            .await?;
        info!("store unfollowed");
        self.resync(user_id).await;
        Ok(())
    }

    /// Followers of a store, for merchant dashboards.
    pub async fn follower_count(&self, store_id: Uuid) -> Result<usize> {
        let query = Query::new().eq("store_id", store_id.to_string());
        let rows = self.remote(async { Ok::<_, StoreError>(self.tables.select(StoreFollow::TABLE, &query).await?) }).await?;
        Ok(rows.len())
    }

    async fn remote<R>(&self, step: impl Future<Output = Result<R>>) -> Result<R> {
        self.cache.track(StoreFollow::TABLE, step).await
    }

    async fn resync(&self, user_id: Uuid) {
        if let Err(e) = self.fetch(user_id).await {
            warn!(error = %e, "resync after follow change failed");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::entities::NewStore;
    use crate::store::EntityStore;
    use crate::testing::RecordingTables;

    async fn seed_store(tables: &Arc<dyn TableService>, name: &str) -> Store {
        let stores = EntityStore::<Store>::new(tables.clone());
        stores.create(NewStore::named(Uuid::new_v4(), name, "owner@shop.example").unwrap()).await.unwrap()
    }

    #[tokio::test]
    async fn test_follows_listed_newest_first() {
        let tables = Arc::new(RecordingTables::new()) as Arc<dyn TableService>;
        let a = seed_store(&tables, "Adire House").await;
        let b = seed_store(&tables, "Beads and Bangles").await;
        let follows = FollowStore::new(tables);
        let user = Uuid::new_v4();

        follows.follow(user, a.id).await.unwrap();
        follows.follow(user, b.id).await.unwrap();

        let listed: Vec<Uuid> = follows.items().await.iter().map(|s| s.id).collect();
        assert_eq!(listed, vec![b.id, a.id]);
        assert!(follows.is_following(a.id).await);
        assert_eq!(follows.follower_count(a.id).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_unfollow() {
        let tables = Arc::new(RecordingTables::new()) as Arc<dyn TableService>;
        let a = seed_store(&tables, "Adire House").await;
        let follows = FollowStore::new(tables);
        let user = Uuid::new_v4();

        follows.follow(user, a.id).await.unwrap();
        follows.unfollow(user, a.id).await.unwrap();
        assert!(follows.fetch(user).await.unwrap().is_empty());
        assert!(follows.unfollow(user, a.id).await.unwrap_err().is_not_found());
    }

    #[tokio::test]
    async fn test_double_follow_is_a_constraint_error() {
        let tables = Arc::new(RecordingTables::new()) as Arc<dyn TableService>;
        let a = seed_store(&tables, "Adire House").await;
        let follows = FollowStore::new(tables);
        let user = Uuid::new_v4();

        follows.follow(user, a.id).await.unwrap();
        let err = follows.follow(user, a.id).await.unwrap_err();
        assert!(matches!(&err, StoreError::Remote(e) if e.is_constraint()));
        assert!(follows.error().await.is_some());
        assert_eq!(follows.items().await.len(), 1);
    }
}
