//! Browsing history

use tracing::info;
use uuid::Uuid;

use super::{decode, owner_filter, to_row, EntityStore};
use crate::data::Filter;
use crate::domain::entities::{BrowsingHistoryItem, Entity, NewHistoryEntry};
use crate::{Result, StoreError};

impl EntityStore<BrowsingHistoryItem> {
    /// Record a product view: bumps `view_count` on the existing (user, product)
    /// row, or inserts a first view.
    #[tracing::instrument(skip(self))]
    pub async fn add_to_history(&self, user_id: Uuid, product_id: Uuid) -> Result<BrowsingHistoryItem> {
        let entry = NewHistoryEntry::first_view(user_id, product_id);
        let row = to_row(&entry)?;
        let key = [owner_filter("user_id", user_id), Filter::eq("product_id", product_id.to_string())];

        let item = self
            .remote(async {
                let row = self
                    .tables()
                    .record_visit(BrowsingHistoryItem::TABLE, &key, "view_count", BrowsingHistoryItem::ORDER_COLUMN, row)
                    .await?;
                decode::<BrowsingHistoryItem>(row)
            })
            .await?;

        info!(view_count = item.view_count, "product view recorded");
        self.resync(user_id).await;
        Ok(item)
    }

    /// Remove every history entry of `user_id`.
    #[tracing::instrument(skip(self))]
    pub async fn clear_history(&self, user_id: Uuid) -> Result<u64> {
        let removed = self
            .remote(async {
                let filters = [owner_filter(BrowsingHistoryItem::SCOPE_COLUMN, user_id)];
                Ok::<_, StoreError>(self.tables().delete(BrowsingHistoryItem::TABLE, &filters).await?)
            })
            .await?;
        info!(removed, "history cleared");
        self.resync(user_id).await;
        Ok(removed)
    }

    /// Whether `product_id` appears in the cached history.
    pub async fn has_viewed(&self, product_id: Uuid) -> bool {
        self.cache().find(|item| item.product_id == product_id).await.is_some()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::data::TableService;
    use crate::testing::RecordingTables;

    fn setup() -> EntityStore<BrowsingHistoryItem> {
        EntityStore::new(Arc::new(RecordingTables::new()) as Arc<dyn TableService>)
    }

    #[tokio::test]
    async fn test_repeat_views_increment_one_record() {
        let store = setup();
        let (user, product) = (Uuid::new_v4(), Uuid::new_v4());
        store.add_to_history(user, product).await.unwrap();
        let second = store.add_to_history(user, product).await.unwrap();

        assert_eq!(second.view_count, 2);
        let items = store.items().await;
        assert_eq!(items.len(), 1);
        assert_eq!(items[0].view_count, 2);
        assert!(store.has_viewed(product).await);
    }

    #[tokio::test]
    async fn test_history_is_ordered_by_last_view() {
        let store = setup();
        let user = Uuid::new_v4();
        let (first, second) = (Uuid::new_v4(), Uuid::new_v4());
        store.add_to_history(user, first).await.unwrap();
        store.add_to_history(user, second).await.unwrap();
        store.add_to_history(user, first).await.unwrap();

        let order: Vec<Uuid> = store.items().await.iter().map(|i| i.product_id).collect();
        assert_eq!(order, vec![first, second]);
    }

    #[tokio::test]
    async fn test_clear_history_only_touches_one_user() {
        let store = setup();
        let (me, other, product) = (Uuid::new_v4(), Uuid::new_v4(), Uuid::new_v4());
        store.add_to_history(me, product).await.unwrap();
        store.add_to_history(other, product).await.unwrap();

        assert_eq!(store.clear_history(me).await.unwrap(), 1);
        assert!(store.fetch(crate::Scope::Owner(me)).await.unwrap().is_empty());
        assert_eq!(store.fetch(crate::Scope::Owner(other)).await.unwrap().len(), 1);
    }
}
