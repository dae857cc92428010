//! Entity identity types shared by the loader, registry and purger.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Number, Value};
use uuid::Uuid;

/// Plain attribute mapping every storage record is normalized into.
pub type Record = Map<String, Value>;

/// Enumerated entity types that participate in batched, cached reads.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityType {
    CorporationProfile,
    Place,
    ContactProfile,
    /// Attribute bag attached to a corporation, partitioned by corporation type.
    CorporationAttributes,
    /// Attribute bag attached to a contact, partitioned by contact type.
    ContactAttributes,
}

impl EntityType {
    pub const ALL: [Self; 5] = [
        Self::CorporationProfile,
        Self::Place,
        Self::ContactProfile,
        Self::CorporationAttributes,
        Self::ContactAttributes,
    ];

    pub const fn as_str(self) -> &'static str {
        match self {
            Self::CorporationProfile => "corporation_profile",
            Self::Place => "place",
            Self::ContactProfile => "contact_profile",
            Self::CorporationAttributes => "corporation_attributes",
            Self::ContactAttributes => "contact_attributes",
        }
    }

    /// Resolve a configuration-supplied entity name.
    pub fn parse(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|entity| entity.as_str() == name)
    }
}

impl fmt::Display for EntityType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ============================================================================
// Canonical key parts
// ============================================================================

/// A value that can appear in an entity key or cache key argument tuple.
///
/// Every implementation must produce exactly one string for a logical value,
/// so `7`, `7u64`, `json!(7)` and `json!(7.0)` all map to `"7"`.
pub trait KeyPart {
    fn canonical(&self) -> String;
}

impl KeyPart for str {
    fn canonical(&self) -> String {
        self.to_owned()
    }
}

impl KeyPart for String {
    fn canonical(&self) -> String {
        self.clone()
    }
}

impl<T: KeyPart + ?Sized> KeyPart for &T {
    fn canonical(&self) -> String {
        (**self).canonical()
    }
}

impl KeyPart for bool {
    fn canonical(&self) -> String {
        self.to_string()
    }
}

impl KeyPart for Uuid {
    fn canonical(&self) -> String {
        self.hyphenated().to_string()
    }
}

macro_rules! integer_key_part {
    ($($ty:ty),*) => {
        $(impl KeyPart for $ty {
            fn canonical(&self) -> String {
                self.to_string()
            }
        })*
    };
}

integer_key_part!(i8, i16, i32, i64, i128, u8, u16, u32, u64, u128, isize, usize);

impl KeyPart for Number {
    fn canonical(&self) -> String {
        if let Some(value) = self.as_i64() {
            return value.to_string();
        }
        if let Some(value) = self.as_u64() {
            return value.to_string();
        }
        match self.as_f64() {
            // 2^53: beyond this an f64 no longer represents every integer.
            Some(value) if value.fract() == 0.0 && value.abs() < 9_007_199_254_740_992.0 => {
                (value as i64).to_string()
            }
            Some(value) => value.to_string(),
            None => self.to_string(),
        }
    }
}

impl KeyPart for Value {
    fn canonical(&self) -> String {
        match self {
            Self::String(value) => value.clone(),
            Self::Number(number) => number.canonical(),
            Self::Bool(flag) => flag.canonical(),
            Self::Null => String::new(),
            other => other.to_string(),
        }
    }
}

// ============================================================================
// Keys
// ============================================================================

/// Ordered tuple uniquely addressing one record of an entity type.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct EntityKey(Vec<String>);

impl EntityKey {
    pub fn new<I, P>(parts: I) -> Self
    where
        I: IntoIterator<Item = P>,
        P: KeyPart,
    {
        Self(parts.into_iter().map(|part| part.canonical()).collect())
    }

    pub fn parts(&self) -> &[String] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Display for EntityKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({})", self.0.join(", "))
    }
}

/// Named key values, used for request context keys and for the identifying
/// keys handed to the purger after a write.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct KeyValues(BTreeMap<String, String>);

impl KeyValues {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style insert.
    pub fn with(mut self, name: impl Into<String>, value: impl KeyPart) -> Self {
        self.insert(name, value);
        self
    }

    pub fn insert(&mut self, name: impl Into<String>, value: impl KeyPart) {
        self.0.insert(name.into(), value.canonical());
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.0.get(name).map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.0.iter().map(|(name, value)| (name.as_str(), value.as_str()))
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl<K: Into<String>, V: KeyPart> FromIterator<(K, V)> for KeyValues {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut values = Self::new();
        for (name, value) in iter {
            values.insert(name, value);
        }
        values
    }
}

impl fmt::Display for KeyValues {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut first = true;
        for (name, value) in &self.0 {
            if !first {
                f.write_str(",")?;
            }
            write!(f, "{name}={value}")?;
            first = false;
        }
        Ok(())
    }
}
