//! Value Objects for the marketplace

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;

/// URL handle of a merchant store (`lagos-gadgets`).
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Slug(String);

impl Slug {
    pub const MAX_LEN: usize = 60;

    /// Parse an already-formed slug. Only `a-z`, `0-9` and single inner hyphens are accepted.
    pub fn new(value: impl Into<String>) -> Result<Self, SlugError> {
        let value = value.into();
        if value.is_empty() { return Err(SlugError::Empty); }
        if value.len() > Self::MAX_LEN { return Err(SlugError::TooLong); }
        let valid_chars = value.chars().all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-');
        if !valid_chars || value.starts_with('-') || value.ends_with('-') || value.contains("--") {
            return Err(SlugError::InvalidCharacters);
        }
        Ok(Self(value))
    }

    /// Derive a slug from a display name: `"Lagos Gadgets & Co"` becomes `lagos-gadgets-co`.
    pub fn from_name(name: &str) -> Result<Self, SlugError> {
        let mut slug = String::with_capacity(name.len());
        for c in name.trim().to_lowercase().chars() {
            if c.is_ascii_alphanumeric() {
                slug.push(c);
            } else if !slug.is_empty() && !slug.ends_with('-') {
                slug.push('-');
            }
        }
        while slug.ends_with('-') { slug.pop(); }
        slug.truncate(Self::MAX_LEN);
        while slug.ends_with('-') { slug.pop(); }
        Self::new(slug)
    }

    pub fn as_str(&self) -> &str { &self.0 }
}

impl fmt::Display for Slug {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { write!(f, "{}", self.0) }
}

impl TryFrom<String> for Slug {
    type Error = SlugError;
    fn try_from(value: String) -> Result<Self, Self::Error> { Self::new(value) }
}

impl From<Slug> for String {
    fn from(slug: Slug) -> Self { slug.0 }
}

#[derive(Debug, Clone, PartialEq, Eq)] pub enum SlugError { Empty, TooLong, InvalidCharacters }
impl std::error::Error for SlugError {}
impl fmt::Display for SlugError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Empty => write!(f, "slug empty"),
            Self::TooLong => write!(f, "slug too long"),
            Self::InvalidCharacters => write!(f, "slug may only contain a-z, 0-9 and single hyphens"),
        }
    }
}

/// Money value object. Currency codes cover fiat (`NGN`) and tokens (`USDT`).
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Money { amount: Decimal, currency: String }

impl Money {
    pub fn new(amount: Decimal, currency: &str) -> Self { Self { amount, currency: currency.to_uppercase() } }
    pub fn zero(currency: &str) -> Self { Self::new(Decimal::ZERO, currency) }
    pub fn amount(&self) -> Decimal { self.amount }
    pub fn currency(&self) -> &str { &self.currency }
    pub fn add(&self, other: &Money) -> Result<Money, MoneyError> {
        if self.currency != other.currency { return Err(MoneyError::CurrencyMismatch); }
        let amount = self.amount.checked_add(other.amount).ok_or(MoneyError::Overflow)?;
        Ok(Money::new(amount, &self.currency))
    }
    pub fn subtract(&self, other: &Money) -> Result<Money, MoneyError> {
        if self.currency != other.currency { return Err(MoneyError::CurrencyMismatch); }
        let amount = self.amount.checked_sub(other.amount).ok_or(MoneyError::Overflow)?;
        Ok(Money::new(amount, &self.currency))
    }
}

impl fmt::Display for Money {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { write!(f, "{} {}", self.amount, self.currency) }
}

#[derive(Debug, Clone, PartialEq, Eq)] pub enum MoneyError { CurrencyMismatch, Overflow }
impl std::error::Error for MoneyError {}
impl fmt::Display for MoneyError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::CurrencyMismatch => write!(f, "Currency mismatch"),
            Self::Overflow => write!(f, "amount out of range"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    #[test]
    fn test_slug_from_name() {
        let slug = Slug::from_name("  Lagos Gadgets & Co ").unwrap();
        assert_eq!(slug.as_str(), "lagos-gadgets-co");
    }
    #[test]
    fn test_slug_rejects_bad_input() {
        assert_eq!(Slug::new(""), Err(SlugError::Empty));
        assert_eq!(Slug::new("Caps"), Err(SlugError::InvalidCharacters));
        assert_eq!(Slug::new("a--b"), Err(SlugError::InvalidCharacters));
        assert_eq!(Slug::from_name("!!!"), Err(SlugError::Empty));
    }
    #[test]
    fn test_money_arithmetic() {
        let a = Money::new(Decimal::new(100, 0), "usdt");
        let b = Money::new(Decimal::new(40, 0), "USDT");
        assert_eq!(a.add(&b).unwrap().amount(), Decimal::new(140, 0));
        assert_eq!(a.subtract(&b).unwrap().amount(), Decimal::new(60, 0));
        assert_eq!(a.add(&Money::zero("NGN")), Err(MoneyError::CurrencyMismatch));
    }
    #[test]
    fn test_money_overflow_is_an_error() {
        let max = Money::new(Decimal::MAX, "USDT");
        let one = Money::new(Decimal::ONE, "USDT");
        assert_eq!(max.add(&one), Err(MoneyError::Overflow));
        assert_eq!(Money::new(Decimal::MIN, "USDT").subtract(&one), Err(MoneyError::Overflow));
    }
}
