//! Product browsing history

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use validator::Validate;

use super::{Entity, NoChanges};

/// One row per (user, product); repeat views bump `view_count`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct BrowsingHistoryItem {
    pub id: Uuid,
    pub user_id: Uuid,
    pub product_id: Uuid,
    #[serde(default = "first_view")]
    pub view_count: i64,
    pub viewed_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
}

fn first_view() -> i64 { 1 }

#[derive(Clone, Debug, Serialize, Deserialize, Validate)]
pub struct NewHistoryEntry {
    pub user_id: Uuid,
    pub product_id: Uuid,
    pub view_count: i64,
    pub viewed_at: DateTime<Utc>,
}

impl NewHistoryEntry {
    pub fn first_view(user_id: Uuid, product_id: Uuid) -> Self {
        Self { user_id, product_id, view_count: first_view(), viewed_at: Utc::now() }
    }
}

impl Entity for BrowsingHistoryItem {
    type New = NewHistoryEntry;
    type Patch = NoChanges;

    const NAME: &'static str = "history entry";
    const TABLE: &'static str = "browsing_history";
    const ORDER_COLUMN: &'static str = "viewed_at";
    const TOUCH_COLUMN: Option<&'static str> = None;

    fn id(&self) -> Uuid { self.id }
    fn scope(&self) -> Uuid { self.user_id }
    fn scope_of(input: &NewHistoryEntry) -> Uuid { input.user_id }
}
