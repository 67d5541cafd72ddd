//! Change events
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChangeAction {
    Created,
    Updated,
    Deleted,
    DefaultChanged,
    Viewed,
    Followed,
    Unfollowed,
}

impl ChangeAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Created => "created",
            Self::Updated => "updated",
            Self::Deleted => "deleted",
            Self::DefaultChanged => "default_changed",
            Self::Viewed => "viewed",
            Self::Followed => "followed",
            Self::Unfollowed => "unfollowed",
        }
    }
}

/// Emitted after a mutation succeeded remotely.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ChangeEvent {
    pub table: String,
    pub action: ChangeAction,
    pub record_ids: Vec<Uuid>,
    pub user_id: Option<Uuid>,
    pub occurred_at: DateTime<Utc>,
}

impl ChangeEvent {
    pub fn new(table: &str, action: ChangeAction, record_ids: Vec<Uuid>, user_id: Option<Uuid>) -> Self {
        Self { table: table.to_string(), action, record_ids, user_id, occurred_at: Utc::now() }
    }

    /// NATS subject, e.g. `bizury.wallets.deleted`.
    pub fn subject(&self) -> String {
        format!("bizury.{}.{}", self.table, self.action.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_subject() {
        let event = ChangeEvent::new("addresses", ChangeAction::DefaultChanged, vec![Uuid::new_v4()], None);
        assert_eq!(event.subject(), "bizury.addresses.default_changed");
    }
}
