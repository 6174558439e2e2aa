#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions)]

//! eBird API v2 reference data.
//!
//! Fetches the taxonomy, the world country list, and per-region hotspot
//! lists from `api.ebird.org`, plus display names for region codes from
//! the `OpenBirding` API. The hotspot download for a whole build runs in
//! the background; see [`background`].

pub mod background;
mod retry;

use std::collections::HashMap;
use std::time::Duration;

use bird_targets_database::DbError;
use bird_targets_models::{HotspotRecord, SpeciesRecord};
use serde::Deserialize;
use thiserror::Error;

use crate::background::DeferredLogSender;

/// eBird API v2 base URL.
pub const API_BASE_URL: &str = "https://api.ebird.org/v2";

/// `OpenBirding` region-name endpoint.
pub const REGION_NAMES_URL: &str = "http://api.openbirding.org/api/v1/regions";

/// Header carrying the eBird API key.
const API_TOKEN_HEADER: &str = "X-eBirdApiToken";

/// Per-request timeout.
const REQUEST_TIMEOUT: Duration = Duration::from_secs(60);

const USER_AGENT: &str = "bird-targets/0.1";

/// Errors from eBird and `OpenBirding` requests.
#[derive(Debug, Error)]
pub enum EbirdError {
    /// HTTP transport error.
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// Non-success HTTP status.
    #[error("HTTP {status} from {url}")]
    Status {
        /// Request URL without query string.
        url: String,
        /// Status code.
        status: u16,
    },

    /// The API answered with an `errors` object.
    #[error("eBird API error for {region}: {message}")]
    Api {
        /// Region that was requested.
        region: String,
        /// Error detail from the response.
        message: String,
    },

    /// Response body did not have the expected shape.
    #[error("Unexpected response from {url}: {message}")]
    Decode {
        /// Request URL without query string.
        url: String,
        /// Description of the mismatch.
        message: String,
    },

    /// The endpoint needs an API key and none is configured.
    #[error("EBIRD_API_KEY is required")]
    MissingApiKey,

    /// Writing downloaded rows failed.
    #[error(transparent)]
    Database(#[from] DbError),

    /// The background task panicked or was cancelled.
    #[error("Background task failed: {message}")]
    Task {
        /// Join error description.
        message: String,
    },
}

/// A country from the eBird region list.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct Country {
    /// ISO country code (`US`).
    pub code: String,
    /// Display name.
    pub name: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct TaxonomyEntry {
    sci_name: String,
    com_name: String,
    species_code: String,
    taxon_order: f64,
}

/// Client for the reference-data endpoints.
#[derive(Debug, Clone)]
pub struct EbirdClient {
    http: reqwest::Client,
    api_key: Option<String>,
    base_url: String,
    deferred: Option<DeferredLogSender>,
}

impl EbirdClient {
    /// Builds a client; `api_key` is sent with every eBird request.
    ///
    /// # Errors
    ///
    /// Returns [`EbirdError::Http`] if the HTTP client cannot be built.
    pub fn new(api_key: Option<String>) -> Result<Self, EbirdError> {
        let http = reqwest::Client::builder()
            .user_agent(USER_AGENT)
            .timeout(REQUEST_TIMEOUT)
            .build()?;
        Ok(Self {
            http,
            api_key: api_key.filter(|k| !k.is_empty()),
            base_url: API_BASE_URL.to_string(),
            deferred: None,
        })
    }

    /// Points eBird requests at another base URL (a mirror or proxy).
    #[must_use]
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }

    /// Sends retry notices to `log` instead of the logger.
    #[must_use]
    pub fn with_deferred_log(mut self, log: DeferredLogSender) -> Self {
        self.deferred = Some(log);
        self
    }

    /// Whether an API key is configured.
    #[must_use]
    pub const fn has_api_key(&self) -> bool {
        self.api_key.is_some()
    }

    fn ebird_get(&self, path: &str) -> reqwest::RequestBuilder {
        let request = self
            .http
            .get(format!("{}/{path}", self.base_url))
            .query(&[("fmt", "json")]);
        match &self.api_key {
            Some(key) => request.header(API_TOKEN_HEADER, key),
            None => request,
        }
    }

    /// Downloads the species-level eBird taxonomy.
    ///
    /// IDs are assigned from 1 in the order the API returns entries, which
    /// is taxonomic order.
    ///
    /// # Errors
    ///
    /// Returns [`EbirdError`] if the request fails or the body is not a
    /// taxonomy list.
    pub async fn fetch_taxonomy(&self) -> Result<Vec<SpeciesRecord>, EbirdError> {
        let body =
            retry::send_json(
                || self.ebird_get("ref/taxonomy/ebird").query(&[("cat", "species")]),
                self.deferred.as_ref(),
            )
            .await?;
        parse_taxonomy(body)
    }

    /// Lists every country.
    ///
    /// # Errors
    ///
    /// Returns [`EbirdError::MissingApiKey`] without a key, or any request
    /// or decode error.
    pub async fn fetch_countries(&self) -> Result<Vec<Country>, EbirdError> {
        if !self.has_api_key() {
            return Err(EbirdError::MissingApiKey);
        }
        let body = retry::send_json(
            || self.ebird_get("ref/region/list/country/world"),
            self.deferred.as_ref(),
        )
        .await?;
        serde_json::from_value(body).map_err(|e| EbirdError::Decode {
            url: format!("{}/ref/region/list/country/world", self.base_url),
            message: e.to_string(),
        })
    }

    /// Lists the hotspots in a country, state, or county.
    ///
    /// # Errors
    ///
    /// Returns [`EbirdError::Api`] when the API answers with an `errors`
    /// object, [`EbirdError::MissingApiKey`] without a key, or any request
    /// or decode error.
    pub async fn fetch_hotspots(&self, region: &str) -> Result<Vec<HotspotRecord>, EbirdError> {
        if !self.has_api_key() {
            return Err(EbirdError::MissingApiKey);
        }
        let path = format!("ref/hotspot/{region}");
        let body = retry::send_json(|| self.ebird_get(&path), self.deferred.as_ref()).await?;
        parse_hotspots(region, body)
    }

    /// Fetches display names keyed by region code.
    ///
    /// # Errors
    ///
    /// Returns [`EbirdError`] if the request fails or the body is not a
    /// string map.
    pub async fn fetch_region_names(&self) -> Result<HashMap<String, String>, EbirdError> {
        let body =
            retry::send_json(|| self.http.get(REGION_NAMES_URL), self.deferred.as_ref()).await?;
        serde_json::from_value(body).map_err(|e| EbirdError::Decode {
            url: REGION_NAMES_URL.to_string(),
            message: e.to_string(),
        })
    }
}

fn parse_taxonomy(body: serde_json::Value) -> Result<Vec<SpeciesRecord>, EbirdError> {
    let entries: Vec<TaxonomyEntry> =
        serde_json::from_value(body).map_err(|e| EbirdError::Decode {
            url: format!("{API_BASE_URL}/ref/taxonomy/ebird"),
            message: e.to_string(),
        })?;

    Ok((1_i64..)
        .zip(entries)
        .map(|(id, entry)| SpeciesRecord {
            id,
            sci_name: entry.sci_name,
            name: entry.com_name,
            code: entry.species_code,
            taxon_order: entry.taxon_order,
        })
        .collect())
}

fn parse_hotspots(region: &str, body: serde_json::Value) -> Result<Vec<HotspotRecord>, EbirdError> {
    if let Some(errors) = body.get("errors") {
        return Err(EbirdError::Api {
            region: region.to_string(),
            message: errors.to_string(),
        });
    }

    let mut hotspots: Vec<HotspotRecord> =
        serde_json::from_value(body).map_err(|e| EbirdError::Decode {
            url: format!("{API_BASE_URL}/ref/hotspot/{region}"),
            message: e.to_string(),
        })?;

    for hotspot in &mut hotspots {
        let trimmed = hotspot.name.trim();
        if trimmed.len() != hotspot.name.len() {
            hotspot.name = trimmed.to_string();
        }
    }

    Ok(hotspots)
}
