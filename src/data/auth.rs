//! Administrative interface to the authentication service.
//!
//! Accounts live outside the data tables; these calls provision, update and
//! remove them on behalf of admins and the merchant onboarding flow.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use validator::Validate;

use super::DataResult;

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    #[default]
    Customer,
    Merchant,
    Admin,
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct AuthUser {
    pub id: Uuid,
    pub email: String,
    #[serde(default)]
    pub role: Role,
    #[serde(default)]
    pub metadata: serde_json::Value,
    pub created_at: DateTime<Utc>,
}

#[derive(Clone, Debug, Serialize, Deserialize, Validate)]
pub struct NewAuthUser {
    #[validate(email)]
    pub email: String,
    #[validate(length(min = 8, max = 72))]
    pub password: String,
    #[serde(default)]
    pub role: Role,
    #[serde(default)]
    pub metadata: serde_json::Value,
}

#[derive(Clone, Debug, Default, Serialize, Deserialize, Validate)]
pub struct AuthUserUpdate {
    #[validate(email)]
    pub email: Option<String>,
    #[validate(length(min = 8, max = 72))]
    pub password: Option<String>,
    pub role: Option<Role>,
    pub metadata: Option<serde_json::Value>,
}

#[async_trait]
pub trait AuthAdmin: Send + Sync {
    async fn create_user(&self, user: NewAuthUser) -> DataResult<AuthUser>;
    async fn update_user(&self, id: Uuid, update: AuthUserUpdate) -> DataResult<AuthUser>;
    async fn delete_user(&self, id: Uuid) -> DataResult<()>;
}
