//! Endpoint handlers, one module per resource.

pub mod certificates;
pub mod consumer;
pub mod courses;
pub mod learning;
pub mod progress;
pub mod repositories;
pub mod rewards;
pub mod stats;
pub mod transactions;
pub mod users;
pub mod verify;

use poc_core::{normalize_address, Address};
use serde::{de, Deserialize, Deserializer};

use crate::error::{invalid_field, ApiError};

pub(crate) fn now() -> i64 {
    chrono::Utc::now().timestamp()
}

pub(crate) fn parse_address(field: &'static str, raw: &str) -> Result<Address, ApiError> {
    normalize_address(raw).map_err(|e| invalid_field(field, e.to_string()))
}

pub(crate) fn require_address(
    field: &'static str,
    raw: Option<&str>,
) -> Result<Address, ApiError> {
    match raw {
        Some(raw) if !raw.trim().is_empty() => parse_address(field, raw),
        _ => Err(invalid_field(field, format!("{} is required", field))),
    }
}

pub(crate) fn require_text<'a>(field: &'static str, raw: &'a str) -> Result<&'a str, ApiError> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Err(invalid_field(field, format!("{} is required", field)));
    }
    Ok(trimmed)
}

/// Id for an off-chain transaction record.
pub(crate) fn synthetic_hash() -> String {
    format!(
        "0x{}{}",
        uuid::Uuid::new_v4().simple(),
        uuid::Uuid::new_v4().simple()
    )
}

#[derive(Deserialize)]
#[serde(untagged)]
enum NumberOrString {
    Number(u64),
    Text(String),
}

impl NumberOrString {
    fn into_u64<E: de::Error>(self) -> Result<u64, E> {
        match self {
            NumberOrString::Number(n) => Ok(n),
            NumberOrString::Text(s) => s
                .trim()
                .parse()
                .map_err(|_| E::custom(format!("invalid number: {:?}", s))),
        }
    }
}

/// Accept `7` or `"7"`; the dashboard sends both.
pub(crate) fn flexible_u64<'de, D: Deserializer<'de>>(deserializer: D) -> Result<u64, D::Error> {
    NumberOrString::deserialize(deserializer)?.into_u64()
}

pub(crate) fn flexible_u32<'de, D: Deserializer<'de>>(deserializer: D) -> Result<u32, D::Error> {
    let value = flexible_u64(deserializer)?;
    u32::try_from(value).map_err(|_| de::Error::custom(format!("number out of range: {}", value)))
}

pub(crate) fn flexible_opt_u64<'de, D: Deserializer<'de>>(
    deserializer: D,
) -> Result<Option<u64>, D::Error> {
    Option::<NumberOrString>::deserialize(deserializer)?
        .map(NumberOrString::into_u64)
        .transpose()
}

pub(crate) fn flexible_opt_u32<'de, D: Deserializer<'de>>(
    deserializer: D,
) -> Result<Option<u32>, D::Error> {
    flexible_opt_u64(deserializer)?
        .map(|v| {
            u32::try_from(v)
                .map_err(|_| de::Error::custom(format!("number out of range: {}", v)))
        })
        .transpose()
}
