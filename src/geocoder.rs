use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::AUTHORIZATION;
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use tracing::{debug, warn};

use crate::config::AppConfig;
use crate::distance::Coordinate;
use crate::errors::{AppError, AppResult};

/// An empty result set is `NotFound`, never an error.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ResolutionOutcome {
    Resolved(Coordinate),
    NotFound,
}

impl ResolutionOutcome {
    pub fn coordinate(&self) -> Option<Coordinate> {
        match self {
            ResolutionOutcome::Resolved(coordinate) => Some(*coordinate),
            ResolutionOutcome::NotFound => None,
        }
    }
}

#[async_trait]
pub trait AddressLookup: Send + Sync {
    async fn lookup(&self, query: &str) -> AppResult<ResolutionOutcome>;
}

#[derive(Debug, Deserialize)]
struct AddressSearchResponse {
    #[serde(default)]
    documents: Option<Vec<AddressDocument>>,
}

#[derive(Debug, Deserialize)]
struct AddressDocument {
    x: String,
    y: String,
}

impl AddressDocument {
    fn coordinate(&self) -> AppResult<Coordinate> {
        let lon = parse_degrees(&self.x, "x")?;
        let lat = parse_degrees(&self.y, "y")?;
        Ok(Coordinate::new(lat, lon))
    }
}

fn parse_degrees(value: &str, field: &str) -> AppResult<f64> {
    value
        .trim()
        .parse::<f64>()
        .ok()
        .filter(|v| v.is_finite())
        .ok_or_else(|| AppError::Parse(format!("invalid {field} coordinate \"{value}\"")))
}

pub struct HttpGeocoder {
    http: reqwest::Client,
    endpoint: String,
    auth_scheme: String,
    api_key: SecretString,
}

impl HttpGeocoder {
    pub fn from_config(config: &AppConfig) -> AppResult<Self> {
        let api_key = config
            .geocoder_api_key
            .clone()
            .ok_or_else(|| AppError::Config("GEOCODER_API_KEY is not set".into()))?;

        if config.geocoder_accept_invalid_certs {
            warn!(
                endpoint = %config.geocoder_endpoint,
                "TLS certificate validation is disabled for the geocoder channel"
            );
        }

        let http = reqwest::Client::builder()
            .user_agent(concat!("card-distance-monitor/", env!("CARGO_PKG_VERSION")))
            .timeout(Duration::from_secs(config.geocoder_timeout_secs))
            .danger_accept_invalid_certs(config.geocoder_accept_invalid_certs)
            .build()?;

        Ok(Self {
            http,
            endpoint: config.geocoder_endpoint.clone(),
            auth_scheme: config.geocoder_auth_scheme.clone(),
            api_key,
        })
    }
}

#[async_trait]
impl AddressLookup for HttpGeocoder {
    async fn lookup(&self, query: &str) -> AppResult<ResolutionOutcome> {
        let response = self
            .http
            .get(&self.endpoint)
            .query(&[("query", query)])
            .header(
                AUTHORIZATION,
                format!("{} {}", self.auth_scheme, self.api_key.expose_secret()),
            )
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(AppError::UpstreamStatus {
                status: status.as_u16(),
                query: query.to_string(),
            });
        }

        let body = response.text().await?;
        let parsed: AddressSearchResponse = serde_json::from_str(&body).map_err(|err| {
            AppError::Parse(format!("unexpected geocoder response for \"{query}\": {err}"))
        })?;

        let documents = parsed.documents.unwrap_or_default();
        debug!(query, results = documents.len(), "geocoder response");
        match documents.first() {
            Some(document) => Ok(ResolutionOutcome::Resolved(document.coordinate()?)),
            None => Ok(ResolutionOutcome::NotFound),
        }
    }
}
