//! In-app notifications

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use validator::Validate;

use super::Entity;

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NotificationKind {
    Order,
    Payment,
    Store,
    #[default]
    System,
    Promotion,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Notification {
    pub id: Uuid,
    pub user_id: Uuid,
    pub title: String,
    pub message: String,
    #[serde(default)]
    pub kind: NotificationKind,
    pub link: Option<String>,
    #[serde(default)]
    pub is_read: bool,
    pub created_at: DateTime<Utc>,
}

#[derive(Clone, Debug, Serialize, Deserialize, Validate)]
pub struct NewNotification {
    pub user_id: Uuid,
    #[validate(length(min = 1, max = 120))]
    pub title: String,
    #[validate(length(min = 1, max = 2000))]
    pub message: String,
    #[serde(default)]
    pub kind: NotificationKind,
    #[validate(length(max = 500))]
    pub link: Option<String>,
}

#[derive(Clone, Debug, Default, Serialize, Deserialize, Validate)]
pub struct NotificationPatch {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub is_read: Option<bool>,
}

impl Entity for Notification {
    type New = NewNotification;
    type Patch = NotificationPatch;

    const NAME: &'static str = "notification";
    const TABLE: &'static str = "notifications";
    const TOUCH_COLUMN: Option<&'static str> = None;

    fn id(&self) -> Uuid { self.id }
    fn scope(&self) -> Uuid { self.user_id }
    fn scope_of(input: &NewNotification) -> Uuid { input.user_id }
}
