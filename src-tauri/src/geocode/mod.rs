//! Reverse geocoding of the selected location for the bottom bar.
//!
//! The service itself is external; this module only shapes the request,
//! extracts the address text and maps failures to localized placeholders.

use std::future::Future;
use std::pin::Pin;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

use crate::models::geo::LngLat;

pub type GeocodeFuture<'a> = Pin<Box<dyn Future<Output = Result<String, GeocodeError>> + Send + 'a>>;

#[derive(Debug, Error)]
pub enum GeocodeError {
    #[error("geocoder request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("geocoder returned HTTP {0}")]
    Status(u16),
    #[error("geocoder response has no address: {0}")]
    NoAddress(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum Locale {
    #[default]
    #[serde(rename = "zh-HK")]
    ZhHk,
    #[serde(rename = "en")]
    En,
}

impl Locale {
    pub fn language_tag(self) -> &'static str {
        match self {
            Locale::ZhHk => "zh-HK",
            Locale::En => "en",
        }
    }

    /// Placeholder shown instead of an address when geocoding fails.
    pub fn failure_text(self) -> &'static str {
        match self {
            Locale::ZhHk => "無法取得地址",
            Locale::En => "Address unavailable",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct GeocoderConfig {
    pub enabled: bool,
    /// Nominatim-compatible `reverse` endpoint.
    pub endpoint: String,
    /// Minimum spacing between lookups; a selection change is looked up at
    /// most this long after it happens.
    pub min_interval_ms: u64,
    pub timeout_ms: u64,
    pub locale: Locale,
    pub user_agent: String,
}

impl Default for GeocoderConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            endpoint: "https://nominatim.openstreetmap.org/reverse".to_string(),
            min_interval_ms: 1_000,
            timeout_ms: 10_000,
            locale: Locale::ZhHk,
            user_agent: concat!("hkmap/", env!("CARGO_PKG_VERSION")).to_string(),
        }
    }
}

pub trait ReverseGeocoder: Send + Sync {
    fn reverse_geocode(&self, at: LngLat) -> GeocodeFuture<'_>;
}

/// HTTP geocoder speaking the Nominatim `reverse` JSON API.
pub struct HttpReverseGeocoder {
    client: reqwest::Client,
    endpoint: String,
    locale: Locale,
}

impl HttpReverseGeocoder {
    pub fn new(config: &GeocoderConfig) -> Result<Self, GeocodeError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_millis(config.timeout_ms.max(1)))
            .user_agent(config.user_agent.clone())
            .build()?;
        Ok(Self {
            client,
            endpoint: config.endpoint.clone(),
            locale: config.locale,
        })
    }

    async fn lookup(&self, at: LngLat) -> Result<String, GeocodeError> {
        let lat = at.lat.to_string();
        let lon = at.lng.to_string();
        let response = self
            .client
            .get(&self.endpoint)
            .query(&[
                ("format", "jsonv2"),
                ("lat", lat.as_str()),
                ("lon", lon.as_str()),
                ("accept-language", self.locale.language_tag()),
            ])
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(GeocodeError::Status(status.as_u16()));
        }
        let body: Value = response.json().await?;
        extract_address(&body)
    }
}

impl ReverseGeocoder for HttpReverseGeocoder {
    fn reverse_geocode(&self, at: LngLat) -> GeocodeFuture<'_> {
        Box::pin(self.lookup(at))
    }
}

/// Pulls a display address out of a reverse-geocoding response.
///
/// Prefers a short "road, suburb" form and falls back to `display_name`.
pub fn extract_address(body: &Value) -> Result<String, GeocodeError> {
    if let Some(error) = body.get("error").and_then(Value::as_str) {
        return Err(GeocodeError::NoAddress(error.to_string()));
    }

    if let Some(address) = body.get("address") {
        let parts: Vec<&str> = ["road", "suburb"]
            .iter()
            .filter_map(|key| address.get(*key).and_then(Value::as_str))
            .filter(|part| !part.trim().is_empty())
            .collect();
        if !parts.is_empty() {
            return Ok(parts.join(", "));
        }
    }

    body.get("display_name")
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|name| !name.is_empty())
        .map(str::to_string)
        .ok_or_else(|| GeocodeError::NoAddress("missing display_name".to_string()))
}
