//! StaDa station data API client.

use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use serde::Deserialize;

use super::StationsError;

/// Default base URL for the StaDa API (DB API Marketplace).
const DEFAULT_BASE_URL: &str =
    "https://apis.deutschebahn.com/db-api-marketplace/apis/station-data/v2";

/// Wrapper for the station dataset response.
#[derive(Debug, Deserialize)]
pub struct StadaResponse {
    pub result: Vec<StadaStation>,
}

/// Minimal DTO for one station record - we only need name and eva numbers.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StadaStation {
    pub name: String,
    #[serde(default)]
    pub eva_numbers: Vec<StadaEvaNumber>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StadaEvaNumber {
    pub number: u32,
    pub geographic_coordinates: Option<StadaCoordinates>,
}

/// GeoJSON point carried by the dataset: longitude first, then latitude.
#[derive(Debug, Clone, Deserialize)]
pub struct StadaCoordinates {
    pub coordinates: Vec<f64>,
}

/// Configuration for the StaDa API client.
#[derive(Debug, Clone)]
pub struct StadaClientConfig {
    /// Client id for the DB-Client-Id header
    pub client_id: String,
    /// API key for the DB-Api-Key header
    pub api_key: String,
    /// Base URL for the API
    pub base_url: String,
    /// Request timeout in seconds
    pub timeout_secs: u64,
}

impl StadaClientConfig {
    /// Create a new config with the given credentials.
    pub fn new(client_id: impl Into<String>, api_key: impl Into<String>) -> Self {
        Self {
            client_id: client_id.into(),
            api_key: api_key.into(),
            base_url: DEFAULT_BASE_URL.to_string(),
            timeout_secs: 30,
        }
    }

    /// Set a custom base URL (for testing).
    pub fn with_base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = url.into();
        self
    }
}

/// Client for the StaDa station data API.
#[derive(Debug, Clone)]
pub struct StadaClient {
    http: reqwest::Client,
    base_url: String,
}

impl StadaClient {
    /// Create a new StaDa API client.
    pub fn new(config: StadaClientConfig) -> Result<Self, StationsError> {
        let mut headers = HeaderMap::new();

        let client_id =
            HeaderValue::from_str(&config.client_id).map_err(|_| StationsError::Api {
                status: 0,
                message: "Invalid client id format".to_string(),
            })?;
        let api_key = HeaderValue::from_str(&config.api_key).map_err(|_| StationsError::Api {
            status: 0,
            message: "Invalid API key format".to_string(),
        })?;
        headers.insert(HeaderName::from_static("db-client-id"), client_id);
        headers.insert(HeaderName::from_static("db-api-key"), api_key);

        let http = reqwest::Client::builder()
            .default_headers(headers)
            .timeout(std::time::Duration::from_secs(config.timeout_secs))
            .build()?;

        Ok(Self {
            http,
            base_url: config.base_url,
        })
    }

    /// Fetch the full station dataset.
    pub async fn fetch_stations(&self) -> Result<StadaResponse, StationsError> {
        let url = format!("{}/stations", self.base_url);

        let response = self.http.get(&url).send().await?;
        let status = response.status();

        if status == reqwest::StatusCode::UNAUTHORIZED || status == reqwest::StatusCode::FORBIDDEN {
            return Err(StationsError::Unauthorized);
        }

        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(StationsError::Api {
                status: status.as_u16(),
                message: body,
            });
        }

        let body = response.text().await?;
        Ok(serde_json::from_str(&body)?)
    }
}
