//! Notification helpers

use serde_json::Value;
use tracing::info;
use uuid::Uuid;

use super::{owner_filter, EntityStore};
use crate::data::{Filter, Row};
use crate::domain::entities::{Entity, Notification, NotificationPatch};
use crate::{Result, StoreError};

impl EntityStore<Notification> {
    pub async fn mark_read(&self, id: Uuid) -> Result<Notification> {
        self.update(id, NotificationPatch { is_read: Some(true) }).await
    }

    /// Mark every unread notification of `user_id` as read in one call.
    #[tracing::instrument(skip(self))]
    pub async fn mark_all_read(&self, user_id: Uuid) -> Result<u64> {
        let mut patch = Row::new();
        patch.insert("is_read".to_string(), Value::Bool(true));
        let filters = [owner_filter(Notification::SCOPE_COLUMN, user_id), Filter::eq("is_read", false)];

        let updated = self
            .remote(async {
                let rows = self.tables().update(Notification::TABLE, patch, &filters).await?;
                Ok::<_, StoreError>(rows.len() as u64)
            })
            .await?;
        info!(updated, "notifications marked read");
        self.resync(user_id).await;
        Ok(updated)
    }

    pub async fn unread_count(&self) -> usize {
        self.items().await.iter().filter(|n| !n.is_read).count()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::data::TableService;
    use crate::domain::entities::{NewNotification, NotificationKind};
    use crate::testing::RecordingTables;

    fn notice(user_id: Uuid, title: &str) -> NewNotification {
        NewNotification {
            user_id,
            title: title.into(),
            message: "Your order has shipped".into(),
            kind: NotificationKind::Order,
            link: None,
        }
    }

    #[tokio::test]
    async fn test_mark_read_and_mark_all_read() {
        let store = EntityStore::<Notification>::new(Arc::new(RecordingTables::new()) as Arc<dyn TableService>);
        let user = Uuid::new_v4();
        let first = store.create(notice(user, "Order #1")).await.unwrap();
        store.create(notice(user, "Order #2")).await.unwrap();
        store.create(notice(user, "Order #3")).await.unwrap();
        assert_eq!(store.unread_count().await, 3);

        assert!(store.mark_read(first.id).await.unwrap().is_read);
        assert_eq!(store.unread_count().await, 2);

        assert_eq!(store.mark_all_read(user).await.unwrap(), 2);
        assert_eq!(store.unread_count().await, 0);
    }
}
