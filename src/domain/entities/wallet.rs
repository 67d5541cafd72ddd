//! Crypto wallets used for checkout and payouts

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use validator::{Validate, ValidationError};

use super::Entity;
use crate::domain::value_objects::Money;

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WalletStatus {
    #[default]
    Active,
    Frozen,
    Closed,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Wallet {
    pub id: Uuid,
    pub user_id: Uuid,
    pub label: String,
    pub currency: String,
    pub network: String,
    pub wallet_address: String,
    #[serde(default)]
    pub balance: Decimal,
    #[serde(default)]
    pub status: WalletStatus,
    #[serde(default)]
    pub is_default: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Wallet {
    pub fn balance(&self) -> Money { Money::new(self.balance, &self.currency) }
}

/// Currency codes are upper-case tickers: `USDT`, `BTC`, `NGN`.
pub(crate) fn validate_currency(code: &str) -> Result<(), ValidationError> {
    let ok = (2..=10).contains(&code.len()) && code.chars().all(|c| c.is_ascii_uppercase() || c.is_ascii_digit());
    if ok { Ok(()) } else { Err(ValidationError::new("currency")) }
}

#[derive(Clone, Debug, Serialize, Deserialize, Validate)]
pub struct NewWallet {
    pub user_id: Uuid,
    #[validate(length(min = 1, max = 60))]
    pub label: String,
    #[validate(custom = "validate_currency")]
    pub currency: String,
    #[validate(length(min = 2, max = 20))]
    pub network: String,
    #[validate(length(min = 26, max = 128))]
    pub wallet_address: String,
    #[serde(default)]
    pub is_default: bool,
}

#[derive(Clone, Debug, Default, Serialize, Deserialize, Validate)]
pub struct WalletPatch {
    #[serde(skip_serializing_if = "Option::is_none")]
    #[validate(length(min = 1, max = 60))]
    pub label: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<WalletStatus>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub is_default: Option<bool>,
}

impl Entity for Wallet {
    type New = NewWallet;
    type Patch = WalletPatch;

    const NAME: &'static str = "wallet";
    const TABLE: &'static str = "wallets";
    const EXCLUSIVE_FLAG: Option<&'static str> = Some("is_default");

    fn id(&self) -> Uuid { self.id }
    fn scope(&self) -> Uuid { self.user_id }
    fn scope_of(input: &NewWallet) -> Uuid { input.user_id }
    fn claims_flag(input: &NewWallet) -> bool { input.is_default }
    fn patch_claims_flag(patch: &WalletPatch) -> bool { patch.is_default == Some(true) }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_currency_codes() {
        assert!(validate_currency("USDT").is_ok());
        assert!(validate_currency("usdt").is_err());
        assert!(validate_currency("X").is_err());
    }

    #[test]
    fn test_decodes_row_with_server_defaults_missing() {
        let wallet: Wallet = serde_json::from_value(json!({
            "id": "0b9d6c1e-3f5a-4c2b-9f0e-1a2b3c4d5e6f",
            "user_id": "7a1e2d3c-4b5a-4968-8776-655443322110",
            "label": "Main",
            "currency": "USDT",
            "network": "TRC20",
            "wallet_address": "TQn9Y2khEsLJW1ChVWFMSMeRDow5KcbLSE",
            "created_at": "2024-05-01T10:00:00Z",
            "updated_at": "2024-05-01T10:00:00Z"
        }))
        .unwrap();
        assert_eq!(wallet.status, WalletStatus::Active);
        assert_eq!(wallet.balance().amount(), Decimal::ZERO);
        assert!(!wallet.is_default);
    }
}
