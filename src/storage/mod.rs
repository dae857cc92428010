//! Storage accessor seam.
//!
//! The table store itself lives outside this crate. Each entity type is
//! backed by an [`EntityStorage`] that answers point and multi-get lookups
//! with native table items; [`normalize`] turns those into plain [`Record`]s.

use std::collections::HashMap;

use async_trait::async_trait;
use serde_json::{Number, Value};
use thiserror::Error;

use crate::domain::{EntityKey, Record};

/// Native attribute value as returned by the table store client.
#[derive(Debug, Clone, PartialEq)]
pub enum AttributeValue {
    S(String),
    /// Numbers travel as strings on the wire.
    N(String),
    Bool(bool),
    Null,
    Ss(Vec<String>),
    L(Vec<AttributeValue>),
    M(HashMap<String, AttributeValue>),
}

impl AttributeValue {
    pub fn s(value: impl Into<String>) -> Self {
        Self::S(value.into())
    }

    pub fn n(value: impl ToString) -> Self {
        Self::N(value.to_string())
    }
}

/// One native table item.
pub type Item = HashMap<String, AttributeValue>;

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("storage backend error: {0}")]
    Backend(String),
    #[error("storage request timed out")]
    Timeout,
    #[error("storage request was throttled")]
    Throttled,
}

impl StorageError {
    pub fn backend(err: impl std::fmt::Display) -> Self {
        Self::Backend(err.to_string())
    }
}

/// Per-entity storage accessor consumed by the loaders.
///
/// `batch_get` may return items in any order and may omit keys that have no
/// record; callers re-key the result by the entity's identity fields.
#[async_trait]
pub trait EntityStorage: Send + Sync {
    async fn get(&self, key: &EntityKey) -> Result<Option<Item>, StorageError>;

    async fn batch_get(&self, keys: &[EntityKey]) -> Result<Vec<Item>, StorageError>;
}

/// Convert a native item into a plain attribute mapping.
pub fn normalize(item: Item) -> Record {
    item.into_iter()
        .map(|(name, value)| (name, normalize_value(value)))
        .collect()
}

fn normalize_value(value: AttributeValue) -> Value {
    match value {
        AttributeValue::S(text) => Value::String(text),
        AttributeValue::N(text) => parse_number(&text).map_or(Value::String(text), Value::Number),
        AttributeValue::Bool(flag) => Value::Bool(flag),
        AttributeValue::Null => Value::Null,
        AttributeValue::Ss(items) => Value::Array(items.into_iter().map(Value::String).collect()),
        AttributeValue::L(items) => Value::Array(items.into_iter().map(normalize_value).collect()),
        AttributeValue::M(map) => Value::Object(normalize(map)),
    }
}

fn parse_number(text: &str) -> Option<Number> {
    let trimmed = text.trim();
    if let Ok(value) = trimmed.parse::<i64>() {
        return Some(Number::from(value));
    }
    if let Ok(value) = trimmed.parse::<u64>() {
        return Some(Number::from(value));
    }
    trimmed.parse::<f64>().ok().and_then(Number::from_f64)
}
