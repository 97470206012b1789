use std::time::Duration;
use std::{env, io};

use secrecy::SecretString;
use serde::Serialize;
use tracing::debug;

use crate::table::ColumnSchema;

const DEFAULT_GEOCODER_ENDPOINT: &str = "https://dapi.kakao.com/v2/local/search/address.json";
const DEFAULT_AUTH_SCHEME: &str = "KakaoAK";
const DEFAULT_MIN_INTERVAL_MS: u64 = 100;
const DEFAULT_THRESHOLD_KM: f64 = 2.0;

#[derive(Clone, Debug)]
pub struct AppConfig {
    pub geocoder_endpoint: String,
    pub geocoder_api_key: Option<SecretString>,
    pub geocoder_auth_scheme: String,
    pub geocoder_timeout_secs: u64,
    pub geocoder_accept_invalid_certs: bool,
    pub geocoder_min_interval_ms: u64,
    pub distance_threshold_km: f64,
    pub columns: ColumnSchema,
}

#[derive(Clone, Debug, Serialize)]
pub struct PublicAppConfig {
    pub geocoder_endpoint: String,
    pub geocoder_auth_scheme: String,
    pub geocoder_timeout_secs: u64,
    pub geocoder_accept_invalid_certs: bool,
    pub geocoder_min_interval_ms: u64,
    pub distance_threshold_km: f64,
    pub columns: ColumnSchema,
    pub has_geocoder_key: bool,
}

impl AppConfig {
    pub fn from_env() -> Self {
        load_dotenv_if_applicable();
        let defaults = ColumnSchema::default();
        Self {
            geocoder_endpoint: env::var("GEOCODER_ENDPOINT")
                .ok()
                .filter(|v| !v.trim().is_empty())
                .unwrap_or_else(|| DEFAULT_GEOCODER_ENDPOINT.to_string()),
            geocoder_api_key: env::var("GEOCODER_API_KEY")
                .ok()
                .filter(|v| !v.trim().is_empty())
                .map(SecretString::from),
            geocoder_auth_scheme: env::var("GEOCODER_AUTH_SCHEME")
                .unwrap_or_else(|_| DEFAULT_AUTH_SCHEME.to_string()),
            geocoder_timeout_secs: parse_u64("GEOCODER_TIMEOUT_SECS", 10).max(1),
            geocoder_accept_invalid_certs: parse_bool("GEOCODER_ACCEPT_INVALID_CERTS", false),
            geocoder_min_interval_ms: parse_u64(
                "GEOCODER_MIN_INTERVAL_MS",
                DEFAULT_MIN_INTERVAL_MS,
            ),
            distance_threshold_km: parse_f64("DISTANCE_THRESHOLD_KM", DEFAULT_THRESHOLD_KM),
            columns: ColumnSchema {
                merchant_line1: parse_usize("MERCHANT_ADDRESS1_COLUMN", defaults.merchant_line1),
                merchant_line2: parse_usize("MERCHANT_ADDRESS2_COLUMN", defaults.merchant_line2),
                home_line1: parse_usize("HOME_ADDRESS1_COLUMN", defaults.home_line1),
                home_line2: parse_usize("HOME_ADDRESS2_COLUMN", defaults.home_line2),
            },
        }
    }

    pub fn min_interval(&self) -> Duration {
        Duration::from_millis(self.geocoder_min_interval_ms)
    }

    pub fn public_profile(&self) -> PublicAppConfig {
        PublicAppConfig {
            geocoder_endpoint: self.geocoder_endpoint.clone(),
            geocoder_auth_scheme: self.geocoder_auth_scheme.clone(),
            geocoder_timeout_secs: self.geocoder_timeout_secs,
            geocoder_accept_invalid_certs: self.geocoder_accept_invalid_certs,
            geocoder_min_interval_ms: self.geocoder_min_interval_ms,
            distance_threshold_km: self.distance_threshold_km,
            columns: self.columns,
            has_geocoder_key: self.geocoder_api_key.is_some(),
        }
    }
}

fn load_dotenv_if_applicable() {
    if !should_load_dotenv() {
        debug!("skipping .env load outside dev mode");
        return;
    }

    if let Err(err) = dotenvy::dotenv() {
        match &err {
            dotenvy::Error::Io(io_err) if io_err.kind() == io::ErrorKind::NotFound => {}
            _ => debug!(?err, "unable to load .env file"),
        }
    }
}

fn should_load_dotenv() -> bool {
    cfg!(debug_assertions) || parse_bool("ALLOW_DOTENV", false)
}

fn parse_bool(key: &str, default: bool) -> bool {
    env::var(key)
        .map(|v| matches!(v.trim(), "1" | "true" | "TRUE" | "True"))
        .unwrap_or(default)
}

fn parse_u64(key: &str, default: u64) -> u64 {
    env::var(key)
        .ok()
        .and_then(|v| v.trim().parse::<u64>().ok())
        .unwrap_or(default)
}

fn parse_usize(key: &str, default: usize) -> usize {
    env::var(key)
        .ok()
        .and_then(|v| v.trim().parse::<usize>().ok())
        .unwrap_or(default)
}

fn parse_f64(key: &str, default: f64) -> f64 {
    env::var(key)
        .ok()
        .and_then(|v| v.trim().parse::<f64>().ok())
        .filter(|v| v.is_finite() && *v >= 0.0)
        .unwrap_or(default)
}
