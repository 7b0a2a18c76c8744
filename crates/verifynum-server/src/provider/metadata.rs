//! Credit intent carried on the checkout as provider metadata.
//!
//! Only the server creates checkouts, so these values are trusted as set.
//! The provider may echo numbers back as strings or as JSON numbers.

use std::str::FromStr;

use bigdecimal::BigDecimal;
use serde_json::{Map, Value};

use crate::models::{is_bounded_amount, CreditQuote, CUSTOM_PACKAGE_ID};

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum MetadataError {
    #[error("metadata.userId is missing")]
    MissingUserId,

    #[error("metadata.{0} is missing")]
    Missing(&'static str),

    #[error("metadata.{field} is not a valid amount: {value}")]
    Invalid { field: &'static str, value: String },

    #[error("metadata.totalCredits is negative")]
    Negative,

    #[error("amount {amount} + bonus {bonus} does not equal total {total}")]
    Inconsistent {
        amount: BigDecimal,
        bonus: BigDecimal,
        total: BigDecimal,
    },
}

/// `{userId, amount, bonusPercent, bonusAmount, totalCredits, packageId}`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CheckoutMetadata {
    pub user_id: String,
    pub amount: BigDecimal,
    pub bonus_percent: u32,
    pub bonus_amount: BigDecimal,
    pub total_credits: BigDecimal,
    pub package_id: String,
}

impl CheckoutMetadata {
    pub fn new(user_id: String, quote: &CreditQuote, package_id: String) -> Self {
        Self {
            user_id,
            amount: quote.amount.clone(),
            bonus_percent: quote.bonus_percent,
            bonus_amount: quote.bonus_amount.clone(),
            total_credits: quote.total_credits.clone(),
            package_id,
        }
    }

    /// String-valued map as sent to the provider.
    pub fn to_map(&self) -> Map<String, Value> {
        let mut map = Map::new();
        map.insert("userId".into(), Value::String(self.user_id.clone()));
        map.insert("amount".into(), Value::String(self.amount.to_string()));
        map.insert(
            "bonusPercent".into(),
            Value::String(self.bonus_percent.to_string()),
        );
        map.insert(
            "bonusAmount".into(),
            Value::String(self.bonus_amount.to_string()),
        );
        map.insert(
            "totalCredits".into(),
            Value::String(self.total_credits.to_string()),
        );
        map.insert("packageId".into(), Value::String(self.package_id.clone()));
        map
    }

    /// Strict parse used before crediting: every amount must be present
    /// and consistent.
    pub fn from_map(map: &Map<String, Value>) -> Result<Self, MetadataError> {
        let user_id = metadata_user_id(map).ok_or(MetadataError::MissingUserId)?;
        let amount = decimal_field(map, "amount")?.ok_or(MetadataError::Missing("amount"))?;
        let bonus_amount =
            decimal_field(map, "bonusAmount")?.unwrap_or_else(|| BigDecimal::from(0));
        let total_credits =
            decimal_field(map, "totalCredits")?.ok_or(MetadataError::Missing("totalCredits"))?;

        if total_credits < BigDecimal::from(0) {
            return Err(MetadataError::Negative);
        }
        if &amount + &bonus_amount != total_credits {
            return Err(MetadataError::Inconsistent {
                amount,
                bonus: bonus_amount,
                total: total_credits,
            });
        }

        let bonus_percent = map
            .get("bonusPercent")
            .and_then(scalar_text)
            .and_then(|s| s.parse::<u32>().ok())
            .unwrap_or(0);
        let package_id = map
            .get("packageId")
            .and_then(scalar_text)
            .filter(|s| !s.is_empty())
            .unwrap_or_else(|| CUSTOM_PACKAGE_ID.to_string());

        Ok(Self {
            user_id,
            amount,
            bonus_percent,
            bonus_amount,
            total_credits,
            package_id,
        })
    }
}

/// `metadata.userId` if present and non-empty.
pub fn metadata_user_id(map: &Map<String, Value>) -> Option<String> {
    map.get("userId")
        .and_then(scalar_text)
        .filter(|s| !s.trim().is_empty())
}

/// Reads an optional decimal that may be a string or a number.
pub fn decimal_field(
    map: &Map<String, Value>,
    field: &'static str,
) -> Result<Option<BigDecimal>, MetadataError> {
    let Some(value) = map.get(field) else {
        return Ok(None);
    };
    if value.is_null() {
        return Ok(None);
    }
    let text = scalar_text(value).ok_or_else(|| MetadataError::Invalid {
        field,
        value: value.to_string(),
    })?;
    match BigDecimal::from_str(text.trim()) {
        Ok(amount) if is_bounded_amount(&amount) => Ok(Some(amount)),
        _ => Err(MetadataError::Invalid { field, value: text }),
    }
}

fn scalar_text(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}
