//! Client configuration.
//!
//! Defaults point at the production services. Hosts (the FFI caller,
//! integration tests) override any subset through `ClientConfig::from_json`;
//! missing keys keep their defaults.

use serde::{Deserialize, Serialize};

use crate::error::ApiError;

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    pub auth: AuthConfig,
    pub store: StoreConfig,
}

impl ClientConfig {
    pub fn from_json(raw: &str) -> Result<Self, ApiError> {
        serde_json::from_str(raw).map_err(|e| ApiError::InvalidInput(format!("config: {e}")))
    }

    /// Point both backends at one server, as the mock server exposes them.
    pub fn for_host(origin: &str) -> Self {
        let origin = origin.trim_end_matches('/');
        Self {
            auth: AuthConfig {
                base_url: origin.to_string(),
                ..AuthConfig::default()
            },
            store: StoreConfig {
                base_url: format!("{origin}/parse/classes"),
                ..StoreConfig::default()
            },
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AuthConfig {
    pub base_url: String,
    /// Length of the anti-XSSI junk prefix on every response body.
    pub xssi_prefix_len: usize,
    pub signup_url: String,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            base_url: "https://www.udacity.com".to_string(),
            xssi_prefix_len: 5,
            signup_url: "https://www.udacity.com/account/auth#!/signup".to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    pub base_url: String,
    pub collection: String,
    pub application_id: String,
    pub rest_api_key: String,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            base_url: "https://parse.udacity.com/parse/classes".to_string(),
            collection: "StudentLocation".to_string(),
            application_id: "QrX47CA9cyuGewLdsL7o5Eb8iug6Em8ye0dnAbIr".to_string(),
            rest_api_key: "QuWThTdiRmTux3YaDseUSEpUKo7aBYM737yKd4gY".to_string(),
        }
    }
}
