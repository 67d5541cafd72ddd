//! Data-access stores.
//!
//! An [`EntityStore`] caches the listing of one table for one scope and exposes
//! CRUD calls against the data service. Every successful single-record mutation
//! re-fetches the listing so the cache converges on the remote state; bulk
//! deletes patch the cache locally instead.
//!
//! `update`, `delete` and `set_default` read the record's owner from the
//! cached copy, so they fail with [`StoreError::NotFound`] before any remote
//! call when the id has not been fetched.

mod cache;
pub mod follows;
pub mod history;
pub mod notifications;
pub mod stores;
pub mod transactions;

use std::future::Future;
use std::sync::Arc;

use chrono::Utc;
use serde::Serialize;
use serde_json::Value;
use tracing::{debug, info, warn};
use uuid::Uuid;
use validator::Validate;

use crate::data::{Filter, Query, Row, TableService};
use crate::domain::entities::Entity;
use crate::{Result, StoreError};

pub(crate) use cache::Cache;
pub use cache::Snapshot;
pub use follows::FollowStore;
pub use transactions::TransactionLog;

/// Which records a listing covers.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Scope {
    /// Records owned by one user.
    Owner(Uuid),
    /// Every record; admin listings.
    All,
}

pub(crate) fn owner_filter(column: &str, owner: Uuid) -> Filter {
    Filter::eq(column, owner.to_string())
}

pub(crate) fn id_filter(id: Uuid) -> Filter {
    Filter::eq("id", id.to_string())
}

pub(crate) fn to_row(payload: &impl Serialize) -> Result<Row> {
    match serde_json::to_value(payload)? {
        Value::Object(row) => Ok(row),
        _ => Err(StoreError::NotAnObject),
    }
}

pub(crate) fn decode<T: Entity>(row: Row) -> Result<T> {
    serde_json::from_value(Value::Object(row)).map_err(|source| StoreError::Malformed { entity: T::NAME, source })
}

pub struct EntityStore<T: Entity> {
    tables: Arc<dyn TableService>,
    cache: Cache<T>,
}

impl<T: Entity> EntityStore<T> {
    pub fn new(tables: Arc<dyn TableService>) -> Self {
        Self { tables, cache: Cache::new() }
    }

    pub async fn snapshot(&self) -> Snapshot<T> { self.cache.snapshot().await }
    pub async fn items(&self) -> Vec<T> { self.cache.items().await }
    pub async fn get(&self, id: Uuid) -> Option<T> { self.cache.find(|item| item.id() == id).await }
    pub fn loading(&self) -> bool { self.cache.loading() }
    pub async fn error(&self) -> Option<String> { self.cache.error().await }
    /// Scope of the last successful fetch.
    pub async fn scope(&self) -> Option<Scope> { self.cache.scope().await }

    /// Drop the cached listing, error and scope.
    pub async fn invalidate(&self) {
        self.cache.reset().await;
    }

    /// Load every record in `scope`, newest first, replacing the cache. On failure
    /// the previous listing stays and the error message is recorded.
    #[tracing::instrument(skip(self), fields(table = T::TABLE))]
    pub async fn fetch(&self, scope: Scope) -> Result<Vec<T>> {
        let _loading = self.cache.begin();
        match self.load(scope).await {
            Ok(items) => {
                debug!(count = items.len(), "listing refreshed");
                self.cache.replace(scope, items.clone()).await;
                Ok(items)
            }
            Err(e) => {
                warn!(error = %e, "fetch failed");
                self.cache.record_error(e.to_string()).await;
                Err(e)
            }
        }
    }

    /// Re-fetch with the scope of the last fetch. No-op before the first fetch.
    pub async fn reconcile(&self) -> Result<Vec<T>> {
        match self.cache.scope().await {
            Some(scope) => self.fetch(scope).await,
            None => Ok(Vec::new()),
        }
    }

    async fn load(&self, scope: Scope) -> Result<Vec<T>> {
        let mut query = Query::new().order_desc(T::ORDER_COLUMN);
        if let Scope::Owner(owner) = scope {
            query = query.filter(owner_filter(T::SCOPE_COLUMN, owner));
        }
        let rows = self.tables.select(T::TABLE, &query).await?;
        rows.into_iter().map(decode::<T>).collect()
    }

    pub(crate) async fn remote<R>(&self, step: impl Future<Output = Result<R>>) -> Result<R> {
        self.cache.track(T::TABLE, step).await
    }

    /// Re-fetch after a mutation. The mutation already succeeded, so a failed
    /// refresh is only recorded in the error flag.
    pub(crate) async fn resync(&self, owner: Uuid) {
        let scope = self.cache.scope().await.unwrap_or(Scope::Owner(owner));
        if let Err(e) = self.fetch(scope).await {
            warn!(table = T::TABLE, error = %e, "resync after mutation failed");
        }
    }

    pub(crate) async fn require(&self, id: Uuid) -> Result<T> {
        self.get(id).await.ok_or(StoreError::NotFound { entity: T::NAME, id })
    }

    pub(crate) fn tables(&self) -> &dyn TableService {
        self.tables.as_ref()
    }

    pub(crate) fn cache(&self) -> &Cache<T> {
        &self.cache
    }

    /// Insert a new record. When it claims the exclusive flag, the flag is first
    /// cleared on the rest of the owner's records.
    #[tracing::instrument(skip(self, input), fields(table = T::TABLE))]
    pub async fn create(&self, input: T::New) -> Result<T> {
        input.validate()?;
        let owner = T::scope_of(&input);
        let row = to_row(&input)?;
        let exclusive = T::EXCLUSIVE_FLAG.filter(|_| T::claims_flag(&input));

        let created = self
            .remote(async {
                let inserted = match exclusive {
                    Some(flag) => {
                        let scope = owner_filter(T::SCOPE_COLUMN, owner);
                        self.tables.insert_exclusive(T::TABLE, &scope, flag, row).await?
                    }
                    None => self.tables.insert(T::TABLE, row).await?,
                };
                decode::<T>(inserted)
            })
            .await?;

        info!(id = %created.id(), "record created");
        self.resync(owner).await;
        Ok(created)
    }

    #[tracing::instrument(skip(self, patch), fields(table = T::TABLE))]
    pub async fn update(&self, id: Uuid, patch: T::Patch) -> Result<T> {
        patch.validate()?;
        let cached = self.require(id).await?;
        let owner = cached.scope();
        let exclusive = T::EXCLUSIVE_FLAG.filter(|_| T::patch_claims_flag(&patch));
        let mut row = to_row(&patch)?;
        if let Some(column) = T::TOUCH_COLUMN {
            row.insert(column.to_string(), serde_json::to_value(Utc::now())?);
        }

        let updated = self
            .remote(async {
                if let Some(flag) = exclusive {
                    let scope = owner_filter(T::SCOPE_COLUMN, owner);
                    self.tables.set_exclusive(T::TABLE, &scope, flag, &Value::String(id.to_string())).await?;
                }
                let rows = self.tables.update(T::TABLE, row, &[id_filter(id)]).await?;
                let row = rows.into_iter().next().ok_or(StoreError::NotFound { entity: T::NAME, id })?;
                decode::<T>(row)
            })
            .await?;

        info!(%id, "record updated");
        self.resync(owner).await;
        Ok(updated)
    }

    #[tracing::instrument(skip(self), fields(table = T::TABLE))]
    pub async fn delete(&self, id: Uuid) -> Result<()> {
        let cached = self.require(id).await?;
        let removed = self
            .remote(async { Ok::<_, StoreError>(self.tables.delete(T::TABLE, &[id_filter(id)]).await?) })
            .await?;
        if removed == 0 {
            debug!(%id, "record was already gone remotely");
        }
        info!(%id, "record deleted");
        self.resync(cached.scope()).await;
        Ok(())
    }

    /// Flag `id` as the owner's default and clear the flag everywhere else.
    #[tracing::instrument(skip(self), fields(table = T::TABLE))]
    pub async fn set_default(&self, id: Uuid) -> Result<()> {
        let flag = T::EXCLUSIVE_FLAG.ok_or(StoreError::Unsupported(T::NAME))?;
        let cached = self.require(id).await?;
        let scope = owner_filter(T::SCOPE_COLUMN, cached.scope());
        self.remote(async {
            self.tables.set_exclusive(T::TABLE, &scope, flag, &Value::String(id.to_string())).await?;
            Ok::<_, StoreError>(())
        })
        .await?;
        info!(%id, "default changed");
        self.resync(cached.scope()).await;
        Ok(())
    }

    /// Delete `ids` in one remote call, then drop them from the cache without
    /// re-fetching. Every id must be in the cached listing, and an owner-scoped
    /// store only deletes rows of that owner.
    #[tracing::instrument(skip(self, ids), fields(table = T::TABLE, count = ids.len()))]
    pub async fn delete_many(&self, ids: &[Uuid]) -> Result<u64> {
        if ids.is_empty() {
            return Ok(0);
        }
        for &id in ids {
            self.require(id).await?;
        }
        let mut filters = vec![Filter::is_in("id", ids.iter().map(Uuid::to_string))];
        if let Some(Scope::Owner(owner)) = self.cache.scope().await {
            filters.push(owner_filter(T::SCOPE_COLUMN, owner));
        }
        let removed = self
            .remote(async { Ok::<_, StoreError>(self.tables.delete(T::TABLE, &filters).await?) })
            .await?;
        self.cache.retain(|item| !ids.contains(&item.id())).await;
        info!(removed, "records deleted");
        Ok(removed)
    }
}
