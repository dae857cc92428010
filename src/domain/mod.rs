pub mod entities;
pub mod error;

pub use entities::{EntityKey, EntityType, KeyPart, KeyValues, Record};
pub use error::ConfigError;
