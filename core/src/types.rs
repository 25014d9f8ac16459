//! Domain types: location records, the authenticated session, and the
//! payloads sent to the location store.
//!
//! # Design
//! A `LocationRecord` only exists if `objectId`, `latitude` and `longitude`
//! decode; every other field is optional and a wrongly-typed value is read
//! as absent instead of failing the record.

use serde::{Deserialize, Deserializer, Serialize};

use crate::error::ApiError;

/// One peer-submitted location, as listed by the store.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct LocationRecord {
    #[serde(rename = "objectId")]
    pub record_id: String,
    #[serde(rename = "uniqueKey", default, deserialize_with = "lenient_string")]
    pub owner_key: Option<String>,
    #[serde(rename = "firstName", default, deserialize_with = "lenient_string")]
    pub first_name: Option<String>,
    #[serde(rename = "lastName", default, deserialize_with = "lenient_string")]
    pub last_name: Option<String>,
    #[serde(rename = "mapString", default, deserialize_with = "lenient_string")]
    pub display_location: Option<String>,
    #[serde(rename = "mediaURL", default, deserialize_with = "lenient_string")]
    pub media_url: Option<String>,
    pub latitude: f64,
    pub longitude: f64,
}

impl LocationRecord {
    /// Decode one element of a `results` array; `None` if it is not a valid
    /// record.
    pub fn from_json(value: &serde_json::Value) -> Option<Self> {
        serde_json::from_value(value.clone()).ok()
    }

    /// First and last name joined by a space, skipping empty parts.
    pub fn display_name(&self) -> String {
        [self.first_name.as_deref(), self.last_name.as_deref()]
            .into_iter()
            .flatten()
            .filter(|part| !part.is_empty())
            .collect::<Vec<_>>()
            .join(" ")
    }

    pub fn subtitle(&self) -> Option<&str> {
        self.media_url.as_deref()
    }
}

fn lenient_string<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = serde_json::Value::deserialize(deserializer)?;
    Ok(value.as_str().map(str::to_string))
}

/// The authenticated user. Either every field is known or there is no
/// session at all.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Session {
    pub session_id: String,
    pub owner_key: String,
    pub first_name: String,
    pub last_name: String,
}

/// Body of an upsert: every field the store keeps, strings coerced, the
/// coordinates numeric.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LocationPayload {
    #[serde(rename = "uniqueKey")]
    pub owner_key: String,
    #[serde(rename = "firstName")]
    pub first_name: String,
    #[serde(rename = "lastName")]
    pub last_name: String,
    #[serde(rename = "mapString")]
    pub display_location: String,
    #[serde(rename = "mediaURL")]
    pub media_url: String,
    pub latitude: f64,
    pub longitude: f64,
}

impl From<&LocationRecord> for LocationPayload {
    fn from(record: &LocationRecord) -> Self {
        Self {
            owner_key: record.owner_key.clone().unwrap_or_default(),
            first_name: record.first_name.clone().unwrap_or_default(),
            last_name: record.last_name.clone().unwrap_or_default(),
            display_location: record.display_location.clone().unwrap_or_default(),
            media_url: record.media_url.clone().unwrap_or_default(),
            latitude: record.latitude,
            longitude: record.longitude,
        }
    }
}

/// What a user enters when posting their location.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LocationDraft {
    pub display_location: String,
    pub media_url: String,
    pub latitude: f64,
    pub longitude: f64,
}

impl LocationDraft {
    pub fn validate(&self) -> Result<(), ApiError> {
        if self.display_location.trim().is_empty() {
            return Err(ApiError::InvalidInput("location must not be empty".to_string()));
        }
        let url = self.media_url.trim();
        let has_scheme = ["http://", "https://"].iter().any(|scheme| {
            url.len() > scheme.len()
                && url
                    .get(..scheme.len())
                    .is_some_and(|prefix| prefix.eq_ignore_ascii_case(scheme))
        });
        if !has_scheme {
            return Err(ApiError::InvalidInput(
                "link must start with http:// or https://".to_string(),
            ));
        }
        if !(-90.0..=90.0).contains(&self.latitude) || !(-180.0..=180.0).contains(&self.longitude) {
            return Err(ApiError::InvalidInput("coordinates out of range".to_string()));
        }
        Ok(())
    }

    pub fn into_payload(self, session: &Session) -> LocationPayload {
        LocationPayload {
            owner_key: session.owner_key.clone(),
            first_name: session.first_name.clone(),
            last_name: session.last_name.clone(),
            display_location: self.display_location,
            media_url: self.media_url,
            latitude: self.latitude,
            longitude: self.longitude,
        }
    }
}
