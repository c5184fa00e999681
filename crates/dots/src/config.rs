// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Protocol constants and transceiver configuration.
//!
//! Configuration can be built programmatically or loaded from TOML:
//!
//! ```toml
//! name = "dots-host"
//!
//! [auth]
//! default_secret = "fallback"
//!
//! [auth.secrets]
//! sensor-guest = "s3cr3t"
//! ```

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;
use thiserror::Error;

pub use crate::types::property_set::PROPERTY_CAPACITY;

/// Connection id of the host.
pub const HOST_ID: u32 = 1;

/// Connection id assigned to the first accepted guest.
pub const FIRST_GUEST_ID: u32 = 2;

/// Id of a guest before the host assigned one.
pub const UNINITIALIZED_ID: u32 = 0;

/// Name a host announces when none is configured.
pub const DEFAULT_HOST_NAME: &str = "DotsHostTransceiver";

/// Configuration errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("TOML parse error: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

impl From<ConfigError> for crate::error::Error {
    fn from(e: ConfigError) -> Self {
        Self::Config(e.to_string())
    }
}

fn default_host_name() -> String {
    DEFAULT_HOST_NAME.to_string()
}

/// Random name of an unnamed guest.
fn default_guest_name() -> String {
    let id = uuid::Uuid::new_v4().simple().to_string();
    format!("dots-guest-{}", &id[..8])
}

fn check_name(kind: &str, name: &str) -> Result<(), ConfigError> {
    if name.trim().is_empty() {
        return Err(ConfigError::Invalid(format!("{} name must not be empty", kind)));
    }
    Ok(())
}

/// Guest transceiver configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GuestConfig {
    /// Name announced to the host. Random when not configured.
    #[serde(default = "default_guest_name")]
    pub name: String,

    /// Secret used to answer an authentication challenge.
    #[serde(default)]
    pub auth_secret: Option<String>,

    /// Types whose descriptors are sent while the cache is preloaded.
    #[serde(default)]
    pub preload_publish_types: Vec<String>,

    /// Types subscribed while the cache is preloaded.
    #[serde(default)]
    pub preload_subscribe_types: Vec<String>,
}

impl Default for GuestConfig {
    fn default() -> Self {
        Self {
            name: default_guest_name(),
            auth_secret: None,
            preload_publish_types: Vec::new(),
            preload_subscribe_types: Vec::new(),
        }
    }
}

impl GuestConfig {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Default::default()
        }
    }

    /// Set the authentication secret.
    pub fn auth_secret(mut self, secret: impl Into<String>) -> Self {
        self.auth_secret = Some(secret.into());
        self
    }

    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml_str(&content)
    }

    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        check_name("guest", &self.name)?;

        for type_name in self
            .preload_publish_types
            .iter()
            .chain(&self.preload_subscribe_types)
        {
            if type_name.is_empty() {
                return Err(ConfigError::Invalid(format!(
                    "guest '{}' has an empty preload type name",
                    self.name
                )));
            }
        }

        Ok(())
    }
}

/// Host transceiver configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HostConfig {
    /// Name announced to guests.
    #[serde(default = "default_host_name")]
    pub name: String,

    /// Guest authentication. Guests are admitted without a challenge when absent.
    #[serde(default)]
    pub auth: Option<AuthConfig>,
}

impl Default for HostConfig {
    fn default() -> Self {
        Self {
            name: default_host_name(),
            auth: None,
        }
    }
}

impl HostConfig {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            auth: None,
        }
    }

    pub fn with_auth(mut self, auth: AuthConfig) -> Self {
        self.auth = Some(auth);
        self
    }

    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml_str(&content)
    }

    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        check_name("host", &self.name)?;

        if let Some(auth) = &self.auth {
            auth.validate()?;
        }

        Ok(())
    }
}

/// Shared secrets of the guests a host admits.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthConfig {
    /// Secret of guests without an entry in `secrets`.
    #[serde(default)]
    pub default_secret: Option<String>,

    /// Secret per guest name.
    #[serde(default)]
    pub secrets: BTreeMap<String, String>,
}

impl AuthConfig {
    pub fn with_default_secret(secret: impl Into<String>) -> Self {
        Self {
            default_secret: Some(secret.into()),
            secrets: BTreeMap::new(),
        }
    }

    pub fn secret(mut self, guest_name: impl Into<String>, secret: impl Into<String>) -> Self {
        self.secrets.insert(guest_name.into(), secret.into());
        self
    }

    /// Secret configured for `guest_name`, falling back to the default.
    pub fn secret_for(&self, guest_name: &str) -> Option<&str> {
        self.secrets
            .get(guest_name)
            .or(self.default_secret.as_ref())
            .map(String::as_str)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.secrets.keys().any(String::is_empty) {
            return Err(ConfigError::Invalid("auth secret with empty guest name".into()));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_defaults() {
        let host = HostConfig::default();
        assert_eq!(host.name, "DotsHostTransceiver");
        assert!(host.auth.is_none());
        assert!(host.validate().is_ok());

        let guest = GuestConfig::default();
        assert!(guest.name.starts_with("dots-guest-"));
        assert_ne!(guest.name, GuestConfig::default().name);
        assert!(guest.auth_secret.is_none());
        assert!(guest.validate().is_ok());
        assert_eq!(PROPERTY_CAPACITY, 32);
    }

    #[test]
    fn test_host_from_toml() {
        let config = HostConfig::from_toml_str(
            r#"
            name = "central"

            [auth]
            default_secret = "fallback"

            [auth.secrets]
            sensor = "s3cr3t"
            "#,
        )
        .expect("valid config");

        assert_eq!(config.name, "central");
        let auth = config.auth.expect("auth section");
        assert_eq!(auth.secret_for("sensor"), Some("s3cr3t"));
        assert_eq!(auth.secret_for("other"), Some("fallback"));
    }

    #[test]
    fn test_guest_from_file() {
        let mut file = tempfile::NamedTempFile::new().expect("temp file");
        writeln!(
            file,
            r#"
            name = "sensor"
            auth_secret = "s3cr3t"
            preload_subscribe_types = ["Temperature"]
            "#
        )
        .expect("write config");

        let config = GuestConfig::from_file(file.path()).expect("valid config");
        assert_eq!(config.name, "sensor");
        assert_eq!(config.auth_secret.as_deref(), Some("s3cr3t"));
        assert_eq!(config.preload_subscribe_types, vec!["Temperature".to_string()]);
        assert!(config.preload_publish_types.is_empty());
    }

    #[test]
    fn test_invalid_configs() {
        assert!(matches!(
            HostConfig::from_toml_str("name = \"\""),
            Err(ConfigError::Invalid(_))
        ));
        assert!(matches!(
            GuestConfig::from_toml_str("name = 5"),
            Err(ConfigError::Toml(_))
        ));
        assert!(matches!(
            GuestConfig::from_file("/nonexistent/dots/guest.toml"),
            Err(ConfigError::Io(_))
        ));

        let error: crate::error::Error = ConfigError::Invalid("bad".into()).into();
        assert!(error.to_string().contains("bad"));
    }
}
