//! Shipping addresses

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use validator::Validate;

use super::Entity;

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Address {
    pub id: Uuid,
    pub user_id: Uuid,
    pub label: Option<String>,
    pub recipient_name: String,
    pub phone: String,
    pub street: String,
    pub city: String,
    pub state: Option<String>,
    pub postal_code: Option<String>,
    pub country: String,
    #[serde(default)]
    pub is_default: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Clone, Debug, Serialize, Deserialize, Validate)]
pub struct NewAddress {
    pub user_id: Uuid,
    #[validate(length(max = 40))]
    pub label: Option<String>,
    #[validate(length(min = 2, max = 120))]
    pub recipient_name: String,
    #[validate(length(min = 7, max = 20))]
    pub phone: String,
    #[validate(length(min = 3, max = 200))]
    pub street: String,
    #[validate(length(min = 2, max = 80))]
    pub city: String,
    #[validate(length(max = 80))]
    pub state: Option<String>,
    #[validate(length(max = 20))]
    pub postal_code: Option<String>,
    #[validate(length(min = 2, max = 80))]
    pub country: String,
    #[serde(default)]
    pub is_default: bool,
}

#[derive(Clone, Debug, Default, Serialize, Deserialize, Validate)]
pub struct AddressPatch {
    #[serde(skip_serializing_if = "Option::is_none")]
    #[validate(length(max = 40))]
    pub label: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    #[validate(length(min = 2, max = 120))]
    pub recipient_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    #[validate(length(min = 7, max = 20))]
    pub phone: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    #[validate(length(min = 3, max = 200))]
    pub street: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    #[validate(length(min = 2, max = 80))]
    pub city: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    #[validate(length(max = 80))]
    pub state: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    #[validate(length(max = 20))]
    pub postal_code: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    #[validate(length(min = 2, max = 80))]
    pub country: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub is_default: Option<bool>,
}

impl Entity for Address {
    type New = NewAddress;
    type Patch = AddressPatch;

    const NAME: &'static str = "address";
    const TABLE: &'static str = "addresses";
    const EXCLUSIVE_FLAG: Option<&'static str> = Some("is_default");

    fn id(&self) -> Uuid { self.id }
    fn scope(&self) -> Uuid { self.user_id }
    fn scope_of(input: &NewAddress) -> Uuid { input.user_id }
    fn claims_flag(input: &NewAddress) -> bool { input.is_default }
    fn patch_claims_flag(patch: &AddressPatch) -> bool { patch.is_default == Some(true) }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample(user_id: Uuid) -> NewAddress {
        NewAddress {
            user_id,
            label: Some("Home".into()),
            recipient_name: "Chioma Obi".into(),
            phone: "+2348012345678".into(),
            street: "12 Admiralty Way".into(),
            city: "Lekki".into(),
            state: Some("Lagos".into()),
            postal_code: None,
            country: "Nigeria".into(),
            is_default: true,
        }
    }

    #[test]
    fn test_new_address_validation() {
        let mut input = sample(Uuid::new_v4());
        assert!(input.validate().is_ok());
        input.recipient_name = "C".into();
        assert!(input.validate().is_err());
    }

    #[test]
    fn test_patch_serializes_only_changes() {
        let patch = AddressPatch { city: Some("Ikeja".into()), ..Default::default() };
        assert_eq!(serde_json::to_value(&patch).unwrap(), serde_json::json!({"city": "Ikeja"}));
        assert!(!Address::patch_claims_flag(&patch));
    }
}
