//! Scheme constants and endpoint configuration with validation.

use serde::{Deserialize, Serialize};
use std::env;
use std::time::Duration;
use thiserror::Error;

/// Fixed parameters shared by every participant of the token scheme.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TokenSchemeConfig {
    /// Relay mailbox name.
    pub message_box: String,
    /// Key derivation protocol identifier.
    pub protocol_id: String,
    /// Key index within the protocol.
    pub key_id: String,
    /// Ledger basket that classifies token outputs.
    pub basket: String,
    /// Overlay topic tokens are published under.
    pub topic: String,
    /// Nominal on-ledger value of every token output.
    pub satoshis: u64,
}

impl Default for TokenSchemeConfig {
    fn default() -> Self {
        Self {
            message_box: "TyPoints-Box".to_string(),
            protocol_id: "tokens".to_string(),
            key_id: "1".to_string(),
            basket: "TyPoints2".to_string(),
            topic: "TyPoints".to_string(),
            satoshis: 1000,
        }
    }
}

impl TokenSchemeConfig {
    /// Validate configuration
    pub fn validate(&self) -> Result<(), ConfigError> {
        for (name, value) in [
            ("message_box", &self.message_box),
            ("protocol_id", &self.protocol_id),
            ("key_id", &self.key_id),
            ("basket", &self.basket),
            ("topic", &self.topic),
        ] {
            if value.trim().is_empty() {
                return Err(ConfigError::EmptyField(name));
            }
        }
        if self.satoshis == 0 {
            return Err(ConfigError::ZeroNominalValue);
        }
        Ok(())
    }
}

/// Remote service endpoints.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EndpointConfig {
    /// Overlay submit/lookup host.
    pub overlay_host: String,
    /// Message relay host.
    pub message_box_host: String,
    /// Whole-request timeout.
    pub request_timeout: Duration,
    /// TCP connect timeout.
    pub connect_timeout: Duration,
}

impl Default for EndpointConfig {
    fn default() -> Self {
        Self {
            overlay_host: "https://confederacy.babbage.systems".to_string(),
            message_box_host: "https://peerserv.babbage.systems".to_string(),
            request_timeout: Duration::from_secs(30),
            connect_timeout: Duration::from_secs(10),
        }
    }
}

impl EndpointConfig {
    /// Create configuration from environment variables.
    ///
    /// # Environment Variables
    ///
    /// - `TP_OVERLAY_HOST`: overlay host
    /// - `TP_MESSAGE_BOX_HOST`: relay host
    /// - `TP_REQUEST_TIMEOUT_SECS`: request timeout (default: 30)
    /// - `TP_CONNECT_TIMEOUT_SECS`: connect timeout (default: 10)
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            overlay_host: env::var("TP_OVERLAY_HOST").unwrap_or(defaults.overlay_host),
            message_box_host: env::var("TP_MESSAGE_BOX_HOST")
                .unwrap_or(defaults.message_box_host),
            request_timeout: env::var("TP_REQUEST_TIMEOUT_SECS")
                .ok()
                .and_then(|v| v.parse().ok())
                .map(Duration::from_secs)
                .unwrap_or(defaults.request_timeout),
            connect_timeout: env::var("TP_CONNECT_TIMEOUT_SECS")
                .ok()
                .and_then(|v| v.parse().ok())
                .map(Duration::from_secs)
                .unwrap_or(defaults.connect_timeout),
        }
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<(), ConfigError> {
        for (name, host) in [
            ("overlay_host", &self.overlay_host),
            ("message_box_host", &self.message_box_host),
        ] {
            if host.trim().is_empty() {
                return Err(ConfigError::EmptyField(name));
            }
            if !(host.starts_with("http://") || host.starts_with("https://")) {
                return Err(ConfigError::InvalidHost(host.clone()));
            }
        }
        if self.request_timeout.is_zero() || self.connect_timeout.is_zero() {
            return Err(ConfigError::InvalidTimeout);
        }
        Ok(())
    }
}

/// Configuration errors.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ConfigError {
    /// A required string field is empty.
    #[error("{0} cannot be empty")]
    EmptyField(&'static str),

    /// Host is missing an http(s) scheme.
    #[error("host must start with http:// or https://: {0}")]
    InvalidHost(String),

    /// A timeout is zero.
    #[error("timeouts cannot be 0")]
    InvalidTimeout,

    /// Token outputs need a non-zero nominal value.
    #[error("nominal output value cannot be 0")]
    ZeroNominalValue,
}

impl From<ConfigError> for super::errors::TokenLedgerError {
    fn from(err: ConfigError) -> Self {
        Self::Config(err.to_string())
    }
}
