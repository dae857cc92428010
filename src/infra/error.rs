use thiserror::Error;

use crate::config::LoadError;
use crate::domain::ConfigError;

#[derive(Debug, Error)]
pub enum InfraError {
    #[error("telemetry initialization failed: {0}")]
    Telemetry(String),
    #[error("settings error: {0}")]
    Settings(#[from] LoadError),
    #[error("configuration error: {0}")]
    Configuration(#[from] ConfigError),
}

impl InfraError {
    pub fn telemetry(message: impl Into<String>) -> Self {
        Self::Telemetry(message.into())
    }
}
