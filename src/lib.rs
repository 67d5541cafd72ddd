//! Bizury Marketplace
//!
//! Data-access layer behind the Bizury storefront and merchant dashboard.
//!
//! ## Features
//! - Cached per-entity stores over a remote table service
//! - Addresses and wallets with a single default per user
//! - Browsing history, store follows and notifications
//! - Locally persisted wallet transactions
//! - Merchant onboarding and admin account management

pub mod api;
pub mod config;
pub mod data;
pub mod domain;
pub mod onboarding;
pub mod session;
pub mod store;

#[cfg(test)]
pub(crate) mod testing;

use thiserror::Error;
use uuid::Uuid;

use crate::data::DataError;

pub use crate::domain::entities::Entity;
pub use crate::session::{Session, SessionRegistry};
pub use crate::store::{EntityStore, FollowStore, Scope, Snapshot, TransactionLog};

// =============================================================================
// Error Types
// =============================================================================

#[derive(Error, Debug)]
pub enum StoreError {
    /// Remote call failed; the message is the service's own.
    #[error(transparent)]
    Remote(#[from] DataError),

    /// The record is not in the local cache.
    #[error("{entity} {id} not found")]
    NotFound { entity: &'static str, id: Uuid },

    #[error("validation failed: {0}")]
    Validation(#[from] validator::ValidationErrors),

    #[error("balance: {0}")]
    Money(#[from] crate::domain::value_objects::MoneyError),

    #[error("{0} records have no default flag")]
    Unsupported(&'static str),

    #[error("malformed {entity} record: {source}")]
    Malformed { entity: &'static str, source: serde_json::Error },

    #[error("payload did not serialize to a JSON object")]
    NotAnObject,

    #[error("transaction log: {0}")]
    Persistence(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl StoreError {
    pub fn is_not_found(&self) -> bool {
        match self {
            Self::NotFound { .. } => true,
            Self::Remote(e) => e.is_not_found(),
            _ => false,
        }
    }
}

pub type Result<T> = std::result::Result<T, StoreError>;
