//! Managed records
//!
//! Each record maps onto one remote table through [`Entity`]. Insert payloads
//! (`New*`) omit the server-generated fields; patches carry only the fields to
//! change.

pub mod address;
pub mod follow;
pub mod history;
pub mod notification;
pub mod store;
pub mod transaction;
pub mod wallet;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::fmt::Debug;
use uuid::Uuid;
use validator::{Validate, ValidationErrors};

pub use address::{Address, AddressPatch, NewAddress};
pub use follow::{NewFollow, StoreFollow};
pub use history::{BrowsingHistoryItem, NewHistoryEntry};
pub use notification::{NewNotification, Notification, NotificationKind, NotificationPatch};
pub use store::{NewStore, Store, StorePatch, StoreStatus};
pub use transaction::{NewTransaction, Transaction, TransactionKind, TransactionPatch, TransactionStatus};
pub use wallet::{NewWallet, Wallet, WalletPatch, WalletStatus};

/// Table mapping of a managed record.
pub trait Entity: Clone + Debug + Serialize + DeserializeOwned + Send + Sync + 'static {
    type New: Serialize + DeserializeOwned + Validate + Send + Sync + 'static;
    type Patch: Serialize + DeserializeOwned + Validate + Send + Sync + 'static;

    /// Human-readable name used in error messages.
    const NAME: &'static str;
    const TABLE: &'static str;
    /// Column holding the owning user.
    const SCOPE_COLUMN: &'static str = "user_id";
    /// Recency column listings are ordered by, newest first.
    const ORDER_COLUMN: &'static str = "created_at";
    /// Boolean column at most one record per scope may have set.
    const EXCLUSIVE_FLAG: Option<&'static str> = None;
    /// Column stamped on every update.
    const TOUCH_COLUMN: Option<&'static str> = Some("updated_at");

    fn id(&self) -> Uuid;
    fn scope(&self) -> Uuid;
    fn scope_of(input: &Self::New) -> Uuid;

    fn claims_flag(_input: &Self::New) -> bool { false }
    fn patch_claims_flag(_patch: &Self::Patch) -> bool { false }
}

/// Patch for records that are never edited in place.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct NoChanges {}

impl Validate for NoChanges {
    fn validate(&self) -> Result<(), ValidationErrors> { Ok(()) }
}
