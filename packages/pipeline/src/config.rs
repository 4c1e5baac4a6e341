//! Remote service configuration.
//!
//! Defaults are embedded from `services.toml` at compile time. A user file
//! with the same layout replaces them entirely.

use std::{path::Path, time::Duration};

use curve_number_landcover::LandCoverConfig;
use curve_number_soil::SoilConfig;
use serde::{Deserialize, Serialize};

const DEFAULT_SERVICES_TOML: &str = include_str!("../services.toml");

/// Errors raised while loading configuration or building the HTTP client.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// The configuration file could not be read.
    #[error("Cannot read config {path}: {source}")]
    Io {
        /// Path that failed.
        path: String,
        /// Underlying error.
        source: std::io::Error,
    },

    /// The TOML is malformed or missing keys.
    #[error("Invalid service config: {0}")]
    Toml(#[from] toml::de::Error),

    /// The HTTP client could not be constructed.
    #[error("Cannot build HTTP client: {0}")]
    Client(#[from] reqwest::Error),
}

/// Settings shared by every HTTP request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HttpConfig {
    /// `User-Agent` header.
    pub user_agent: String,
    /// Whole-request timeout. No timeout when absent.
    #[serde(default)]
    pub timeout_secs: Option<u64>,
}

/// All remote service settings for a run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServiceConfig {
    /// NLCD WMS.
    pub land_cover: LandCoverConfig,
    /// SSURGO services.
    pub soil: SoilConfig,
    /// HTTP client settings.
    pub http: HttpConfig,
}

impl ServiceConfig {
    /// Parses the embedded defaults.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Toml`] if the embedded file is malformed.
    pub fn embedded() -> Result<Self, ConfigError> {
        Self::from_toml(DEFAULT_SERVICES_TOML)
    }

    /// Parses a TOML document.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Toml`] on malformed input.
    pub fn from_toml(text: &str) -> Result<Self, ConfigError> {
        Ok(toml::de::from_str(text)?)
    }

    /// Loads a TOML file.
    ///
    /// # Errors
    ///
    /// * [`ConfigError::Io`] if the file cannot be read
    /// * [`ConfigError::Toml`] if it is malformed
    pub fn from_path(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.display().to_string(),
            source,
        })?;
        log::info!("Loading service config from {}", path.display());
        Self::from_toml(&text)
    }

    /// Builds the HTTP client every source shares.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Client`] if the TLS backend cannot initialize.
    pub fn build_client(&self) -> Result<reqwest::Client, ConfigError> {
        let mut builder = reqwest::Client::builder().user_agent(&self.http.user_agent);
        if let Some(secs) = self.http.timeout_secs {
            builder = builder.timeout(Duration::from_secs(secs));
        }
        Ok(builder.build()?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn embedded_defaults_match_built_in_configs() {
        let config = ServiceConfig::embedded().unwrap();
        assert_eq!(config.land_cover, LandCoverConfig::default());
        assert_eq!(config.soil, SoilConfig::default());
        assert_eq!(config.http.timeout_secs, None);
        assert!(!config.http.user_agent.is_empty());
    }

    #[test]
    fn user_file_can_set_timeout() {
        let text = DEFAULT_SERVICES_TOML.replace("# timeout_secs = 300", "timeout_secs = 60");
        let config = ServiceConfig::from_toml(&text).unwrap();
        assert_eq!(config.http.timeout_secs, Some(60));
    }

    #[test]
    fn missing_section_is_an_error() {
        let err = ServiceConfig::from_toml("[http]\nuser_agent = \"x\"\n").unwrap_err();
        assert!(matches!(err, ConfigError::Toml(_)));
    }
}
