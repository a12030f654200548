use bigdecimal::BigDecimal;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A cleaned token transfer, one row of the monthly transfer stream.
///
/// Addresses are account identifiers as issued by the ETL layer, normally
/// chain-qualified (`1_0xabc...`). Amounts are raw integer token units.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TransferRecord {
    pub chain_id: i64,
    pub from_address: String,
    pub to_address: String,
    #[serde(with = "decimal_string")]
    pub amount: BigDecimal,
    pub transfer_id: String,
    #[serde(with = "chrono::serde::ts_seconds")]
    pub timestamp: DateTime<Utc>,
    pub token_id: String,
}

/// Amounts travel through CSV as exact decimal strings; numeric inference
/// would round wei-scale values through `f64`.
pub mod decimal_string {
    use std::str::FromStr;

    use bigdecimal::BigDecimal;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &BigDecimal, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&value.to_string())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<BigDecimal, D::Error> {
        let raw = String::deserialize(deserializer)?;
        BigDecimal::from_str(raw.trim()).map_err(serde::de::Error::custom)
    }

    /// Nullable variant; `None` is written as an empty field.
    pub mod option {
        use std::str::FromStr;

        use bigdecimal::BigDecimal;
        use serde::{Deserialize, Deserializer, Serializer};

        pub fn serialize<S: Serializer>(
            value: &Option<BigDecimal>,
            serializer: S,
        ) -> Result<S::Ok, S::Error> {
            match value {
                Some(v) => serializer.serialize_some(&v.to_string()),
                None => serializer.serialize_none(),
            }
        }

        pub fn deserialize<'de, D: Deserializer<'de>>(
            deserializer: D,
        ) -> Result<Option<BigDecimal>, D::Error> {
            match Option::<String>::deserialize(deserializer)? {
                Some(raw) if !raw.trim().is_empty() => BigDecimal::from_str(raw.trim())
                    .map(Some)
                    .map_err(serde::de::Error::custom),
                _ => Ok(None),
            }
        }
    }
}

/// Strip the `<chain_id>_` qualifier and lowercase, leaving the bare `0x` address.
pub fn bare_address(account: &str) -> String {
    let trimmed = account.trim();
    let bare = match trimmed.split_once('_') {
        Some((prefix, rest)) if prefix.chars().all(|c| c.is_ascii_digit()) => rest,
        _ => trimmed,
    };
    bare.to_lowercase()
}
