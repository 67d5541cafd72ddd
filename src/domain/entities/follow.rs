//! Customers following merchant stores

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use validator::Validate;

use super::{Entity, NoChanges};

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct StoreFollow {
    pub id: Uuid,
    pub user_id: Uuid,
    pub store_id: Uuid,
    pub created_at: DateTime<Utc>,
}

#[derive(Clone, Debug, Serialize, Deserialize, Validate)]
pub struct NewFollow {
    pub user_id: Uuid,
    pub store_id: Uuid,
}

impl Entity for StoreFollow {
    type New = NewFollow;
    type Patch = NoChanges;

    const NAME: &'static str = "follow";
    const TABLE: &'static str = "store_follows";
    const TOUCH_COLUMN: Option<&'static str> = None;

    fn id(&self) -> Uuid { self.id }
    fn scope(&self) -> Uuid { self.user_id }
    fn scope_of(input: &NewFollow) -> Uuid { input.user_id }
}
