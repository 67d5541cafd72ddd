//! Wallet transactions kept on the device

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use validator::{Validate, ValidationError};

use super::wallet::validate_currency;
use crate::domain::value_objects::Money;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransactionKind {
    Deposit,
    Withdrawal,
    Payment,
    Refund,
}

impl TransactionKind {
    /// Whether the transaction adds to the holder's balance.
    pub fn is_credit(&self) -> bool { matches!(self, Self::Deposit | Self::Refund) }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransactionStatus {
    #[default]
    Pending,
    Completed,
    Failed,
    Cancelled,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Transaction {
    pub id: Uuid,
    pub user_id: Uuid,
    pub kind: TransactionKind,
    pub amount: Decimal,
    pub currency: String,
    pub status: TransactionStatus,
    pub reference: Option<String>,
    pub description: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Transaction {
    pub fn money(&self) -> Money { Money::new(self.amount, &self.currency) }

    pub(crate) fn apply(&mut self, patch: TransactionPatch) {
        if let Some(status) = patch.status { self.status = status; }
        if let Some(reference) = patch.reference { self.reference = Some(reference); }
        if let Some(description) = patch.description { self.description = Some(description); }
        self.updated_at = Utc::now();
    }
}

fn validate_amount(amount: &Decimal) -> Result<(), ValidationError> {
    if *amount > Decimal::ZERO { Ok(()) } else { Err(ValidationError::new("amount_not_positive")) }
}

#[derive(Clone, Debug, Serialize, Deserialize, Validate)]
pub struct NewTransaction {
    pub user_id: Uuid,
    pub kind: TransactionKind,
    #[validate(custom = "validate_amount")]
    pub amount: Decimal,
    #[validate(custom = "validate_currency")]
    pub currency: String,
    #[serde(default)]
    pub status: TransactionStatus,
    #[validate(length(max = 120))]
    pub reference: Option<String>,
    #[validate(length(max = 500))]
    pub description: Option<String>,
}

impl NewTransaction {
    pub(crate) fn into_record(self) -> Transaction {
        let now = Utc::now();
        Transaction {
            id: Uuid::now_v7(),
            user_id: self.user_id,
            kind: self.kind,
            amount: self.amount,
            currency: self.currency,
            status: self.status,
            reference: self.reference,
            description: self.description,
            created_at: now,
            updated_at: now,
        }
    }
}

#[derive(Clone, Debug, Default, Serialize, Deserialize, Validate)]
pub struct TransactionPatch {
    pub status: Option<TransactionStatus>,
    #[validate(length(max = 120))]
    pub reference: Option<String>,
    #[validate(length(max = 500))]
    pub description: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn deposit(amount: Decimal) -> NewTransaction {
        NewTransaction {
            user_id: Uuid::new_v4(),
            kind: TransactionKind::Deposit,
            amount,
            currency: "USDT".into(),
            status: TransactionStatus::Pending,
            reference: None,
            description: None,
        }
    }

    #[test]
    fn test_amount_must_be_positive() {
        assert!(deposit(dec!(25.50)).validate().is_ok());
        assert!(deposit(dec!(0)).validate().is_err());
        assert!(deposit(dec!(-3)).validate().is_err());
    }

    #[test]
    fn test_apply_merges_fields() {
        let mut tx = deposit(dec!(10)).into_record();
        tx.apply(TransactionPatch { status: Some(TransactionStatus::Completed), ..Default::default() });
        assert_eq!(tx.status, TransactionStatus::Completed);
        assert_eq!(tx.amount, dec!(10));
        assert_eq!(tx.money().currency(), "USDT");
    }
}
