//! Merchant store moderation

use uuid::Uuid;

use super::EntityStore;
use crate::domain::entities::{Store, StorePatch, StoreStatus};
use crate::Result;

impl EntityStore<Store> {
    /// Move a store to `status`; used by admins approving or suspending merchants.
    pub async fn set_status(&self, id: Uuid, status: StoreStatus) -> Result<Store> {
        self.update(id, StorePatch { status: Some(status), ..Default::default() }).await
    }

    /// Cached stores currently visible to customers.
    pub async fn visible(&self) -> Vec<Store> {
        self.items().await.into_iter().filter(|s| s.status.is_visible()).collect()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::data::TableService;
    use crate::domain::entities::NewStore;
    use crate::testing::RecordingTables;
    use crate::Scope;

    #[tokio::test]
    async fn test_admin_approves_pending_store() {
        let tables = Arc::new(RecordingTables::new()) as Arc<dyn TableService>;
        let merchant = EntityStore::<Store>::new(tables.clone());
        let admin = EntityStore::<Store>::new(tables);

        let owner = Uuid::new_v4();
        let created = merchant.create(NewStore::named(owner, "Kente Corner", "hello@kente.example").unwrap()).await.unwrap();
        assert_eq!(created.status, StoreStatus::Pending);

        admin.fetch(Scope::All).await.unwrap();
        assert!(admin.visible().await.is_empty());
        let approved = admin.set_status(created.id, StoreStatus::Active).await.unwrap();
        assert_eq!(approved.status, StoreStatus::Active);
        assert_eq!(admin.visible().await.len(), 1);
        assert_eq!(admin.scope().await, Some(Scope::All));
    }

    #[tokio::test]
    async fn test_duplicate_slug_is_rejected() {
        let store = EntityStore::<Store>::new(Arc::new(RecordingTables::new()) as Arc<dyn TableService>);
        let input = NewStore::named(Uuid::new_v4(), "Kente Corner", "a@kente.example").unwrap();
        store.create(input.clone()).await.unwrap();
        let err = store.create(input).await.unwrap_err();
        assert!(matches!(&err, crate::StoreError::Remote(e) if e.is_constraint()));
        assert_eq!(store.items().await.len(), 1);
    }
}
