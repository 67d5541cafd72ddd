//! Merchant onboarding
//!
//! Provisions a merchant auth account and its first store. The store starts
//! `pending` until an admin approves it. When the store cannot be created the
//! account is deleted again so the email can be reused.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::json;
use thiserror::Error;
use tracing::{error, info, warn};
use validator::{Validate, ValidationErrors};

use crate::data::{AuthAdmin, AuthUser, DataError, NewAuthUser, Role, TableService};
use crate::domain::entities::{Entity, NewStore, Store};
use crate::domain::value_objects::{Slug, SlugError};
use crate::store::{decode, to_row};
use crate::StoreError;

#[derive(Clone, Debug, Serialize, Deserialize, Validate)]
pub struct MerchantApplication {
    #[validate(length(min = 2, max = 120))]
    pub full_name: String,
    #[validate(email)]
    pub email: String,
    #[validate(length(min = 8, max = 72))]
    pub password: String,
    #[validate(length(min = 7, max = 20))]
    pub phone: Option<String>,
    #[validate(length(min = 2, max = 80))]
    pub store_name: String,
    #[validate(length(max = 1000))]
    pub store_description: Option<String>,
}

#[derive(Clone, Debug, Serialize)]
pub struct OnboardedMerchant {
    pub user: AuthUser,
    pub store: Store,
}

#[derive(Error, Debug)]
pub enum OnboardingError {
    #[error("validation failed: {0}")]
    Validation(#[from] ValidationErrors),

    #[error("store name cannot be turned into a slug: {0}")]
    InvalidStoreName(#[from] SlugError),

    #[error("account provisioning failed: {0}")]
    Auth(DataError),

    #[error("store creation failed: {0}")]
    Store(#[from] StoreError),
}

pub struct Onboarding {
    auth: Arc<dyn AuthAdmin>,
    tables: Arc<dyn TableService>,
}

impl Onboarding {
    pub fn new(auth: Arc<dyn AuthAdmin>, tables: Arc<dyn TableService>) -> Self {
        Self { auth, tables }
    }

    #[tracing::instrument(skip(self, application), fields(email = %application.email))]
    pub async fn onboard_merchant(&self, application: MerchantApplication) -> Result<OnboardedMerchant, OnboardingError> {
        application.validate()?;
        let slug = Slug::from_name(&application.store_name)?;

        let user = self
            .auth
            .create_user(NewAuthUser {
                email: application.email.clone(),
                password: application.password.clone(),
                role: Role::Merchant,
                metadata: json!({ "full_name": application.full_name, "phone": application.phone }),
            })
            .await
            .map_err(OnboardingError::Auth)?;

        let store = NewStore {
            owner_id: user.id,
            name: application.store_name.trim().to_string(),
            slug,
            description: application.store_description.clone(),
            logo_url: None,
            contact_email: user.email.clone(),
        };

        match self.insert_store(&store).await {
            Ok(store) => {
                info!(user_id = %user.id, store_id = %store.id, "merchant onboarded");
                Ok(OnboardedMerchant { user, store })
            }
            Err(e) => {
                warn!(user_id = %user.id, error = %e, "store creation failed, removing account");
                if let Err(cleanup) = self.auth.delete_user(user.id).await {
                    error!(user_id = %user.id, error = %cleanup, "account rollback failed");
                }
                Err(e.into())
            }
        }
    }

    async fn insert_store(&self, store: &NewStore) -> crate::Result<Store> {
        store.validate()?;
        let row = self.tables.insert(Store::TABLE, to_row(store)?).await?;
        decode::<Store>(row)
    }
}
