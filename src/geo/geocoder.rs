//! Address resolution.
//!
//! Every lookup resolves to `Some(point)` or `None`. Transport errors,
//! timeouts, non-success responses, unparsable bodies and empty result sets
//! all collapse into `None` so that delivery creation never fails because of
//! the lookup service.

use std::sync::Arc;

use async_trait::async_trait;
use serde::Deserialize;
use tracing::{debug, warn};

use crate::config::{GeocoderBackend, GeocoderSettings};
use crate::error::AppError;
use crate::geo::GeoPoint;

#[async_trait]
pub trait Geocoder: Send + Sync {
    /// Resolve a free-text address to its best matching point.
    async fn locate(&self, address: &str) -> Option<GeoPoint>;

    fn name(&self) -> &'static str;
}

pub fn from_settings(settings: &GeocoderSettings) -> Result<Arc<dyn Geocoder>, AppError> {
    match &settings.backend {
        GeocoderBackend::Nominatim => Ok(Arc::new(NominatimGeocoder::new(settings)?)),
        GeocoderBackend::Static(point) => Ok(Arc::new(StaticGeocoder::new(Some(*point)))),
    }
}

/// One entry of the search response. Coordinates arrive as strings.
#[derive(Debug, Deserialize)]
struct SearchMatch {
    lat: String,
    lon: String,
}

pub struct NominatimGeocoder {
    base_url: String,
    country: String,
    client: reqwest::Client,
}

impl NominatimGeocoder {
    pub fn new(settings: &GeocoderSettings) -> Result<Self, AppError> {
        let client = reqwest::Client::builder()
            .user_agent(settings.user_agent.clone())
            .timeout(settings.timeout)
            .build()
            .map_err(|err| AppError::Internal(format!("failed to build geocoder client: {err}")))?;

        Ok(Self {
            base_url: settings.base_url.trim_end_matches('/').to_string(),
            country: settings.country.clone(),
            client,
        })
    }

    fn search_url(&self, address: &str) -> String {
        let query = format!("{}, {}", address.trim(), self.country);
        format!(
            "{}/search?q={}&format=json&limit=1",
            self.base_url,
            urlencoding::encode(&query)
        )
    }

    async fn search(&self, address: &str) -> Result<Option<GeoPoint>, String> {
        let response = self
            .client
            .get(self.search_url(address))
            .send()
            .await
            .map_err(|err| format!("request failed: {err}"))?;

        if !response.status().is_success() {
            return Err(format!("unexpected status {}", response.status()));
        }

        let matches: Vec<SearchMatch> = response
            .json()
            .await
            .map_err(|err| format!("malformed response: {err}"))?;

        let Some(best) = matches.first() else {
            return Ok(None);
        };

        let lat = best
            .lat
            .parse::<f64>()
            .map_err(|err| format!("invalid latitude {:?}: {err}", best.lat))?;
        let lng = best
            .lon
            .parse::<f64>()
            .map_err(|err| format!("invalid longitude {:?}: {err}", best.lon))?;

        let point = GeoPoint { lat, lng };
        if !point.is_valid() {
            return Err(format!("coordinates out of range: {lat}, {lng}"));
        }

        Ok(Some(point))
    }
}

#[async_trait]
impl Geocoder for NominatimGeocoder {
    async fn locate(&self, address: &str) -> Option<GeoPoint> {
        match self.search(address).await {
            Ok(Some(point)) => {
                debug!(address, lat = point.lat, lng = point.lng, "address resolved");
                Some(point)
            }
            Ok(None) => {
                warn!(address, "address lookup returned no match");
                None
            }
            Err(err) => {
                warn!(address, error = %err, "address lookup failed");
                None
            }
        }
    }

    fn name(&self) -> &'static str {
        "nominatim"
    }
}

/// Resolves every address to the same answer.
pub struct StaticGeocoder {
    answer: Option<GeoPoint>,
}

impl StaticGeocoder {
    pub fn new(answer: Option<GeoPoint>) -> Self {
        Self { answer }
    }
}

#[async_trait]
impl Geocoder for StaticGeocoder {
    async fn locate(&self, _address: &str) -> Option<GeoPoint> {
        self.answer
    }

    fn name(&self) -> &'static str {
        "static"
    }
}
