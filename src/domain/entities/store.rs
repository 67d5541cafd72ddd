//! Merchant stores

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use validator::Validate;

use super::Entity;
use crate::domain::value_objects::{Slug, SlugError};

/// Review state of a store. New stores wait for an admin.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StoreStatus {
    #[default]
    Pending,
    Active,
    Suspended,
    Rejected,
}

impl StoreStatus {
    pub fn is_visible(&self) -> bool { matches!(self, Self::Active) }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Store {
    pub id: Uuid,
    pub owner_id: Uuid,
    pub name: String,
    pub slug: Slug,
    pub description: Option<String>,
    pub logo_url: Option<String>,
    pub contact_email: String,
    #[serde(default)]
    pub status: StoreStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Clone, Debug, Serialize, Deserialize, Validate)]
pub struct NewStore {
    pub owner_id: Uuid,
    #[validate(length(min = 2, max = 80))]
    pub name: String,
    pub slug: Slug,
    #[validate(length(max = 1000))]
    pub description: Option<String>,
    #[validate(url)]
    pub logo_url: Option<String>,
    #[validate(email)]
    pub contact_email: String,
}

impl NewStore {
    /// Store payload with the slug derived from the name.
    pub fn named(owner_id: Uuid, name: &str, contact_email: &str) -> Result<Self, SlugError> {
        Ok(Self {
            owner_id,
            name: name.trim().to_string(),
            slug: Slug::from_name(name)?,
            description: None,
            logo_url: None,
            contact_email: contact_email.to_string(),
        })
    }
}

#[derive(Clone, Debug, Default, Serialize, Deserialize, Validate)]
pub struct StorePatch {
    #[serde(skip_serializing_if = "Option::is_none")]
    #[validate(length(min = 2, max = 80))]
    pub name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    #[validate(length(max = 1000))]
    pub description: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    #[validate(url)]
    pub logo_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    #[validate(email)]
    pub contact_email: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<StoreStatus>,
}

impl Entity for Store {
    type New = NewStore;
    type Patch = StorePatch;

    const NAME: &'static str = "store";
    const TABLE: &'static str = "stores";
    const SCOPE_COLUMN: &'static str = "owner_id";

    fn id(&self) -> Uuid { self.id }
    fn scope(&self) -> Uuid { self.owner_id }
    fn scope_of(input: &NewStore) -> Uuid { input.owner_id }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_named_store_derives_slug() {
        let store = NewStore::named(Uuid::new_v4(), " Kano Leather Works ", "hello@kanoleather.ng").unwrap();
        assert_eq!(store.slug.as_str(), "kano-leather-works");
        assert_eq!(store.name, "Kano Leather Works");
        assert!(store.validate().is_ok());
    }

    #[test]
    fn test_invalid_contact_email() {
        let mut store = NewStore::named(Uuid::new_v4(), "Aba Shoes", "shop@aba.ng").unwrap();
        store.contact_email = "not-an-email".into();
        assert!(store.validate().is_err());
    }

    #[test]
    fn test_slug_checked_on_decode() {
        let bad = serde_json::json!({
            "owner_id": Uuid::new_v4(), "name": "Aba Shoes", "slug": "Aba Shoes",
            "description": null, "logo_url": null, "contact_email": "shop@aba.ng"
        });
        assert!(serde_json::from_value::<NewStore>(bad).is_err());
    }
}
