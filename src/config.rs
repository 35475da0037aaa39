use std::env;
use std::time::Duration;

use crate::error::AppError;
use crate::geo::GeoPoint;

#[derive(Debug, Clone)]
pub struct Config {
    pub http_port: u16,
    pub log_level: String,
    pub event_buffer_size: usize,
    pub dispatch: DispatchSettings,
    pub geocoder: GeocoderSettings,
}

/// Fixed reference values used by route optimization, ETA estimation and the
/// delivery simulator.
#[derive(Debug, Clone)]
pub struct DispatchSettings {
    /// Starting point of every optimized route.
    pub depot: GeoPoint,
    /// Origin used for the ETA computed when a delivery is created.
    pub warehouse: GeoPoint,
    pub average_speed_kmh: f64,
    /// Upper bound, in degrees, of the random drift applied per simulated stage.
    pub position_jitter_deg: f64,
    pub simulation_step: Duration,
}

impl Default for DispatchSettings {
    fn default() -> Self {
        Self {
            depot: GeoPoint {
                lat: 4.074_986_5,
                lng: 11.552_591_7,
            },
            warehouse: GeoPoint {
                lat: 3.866,
                lng: 11.517,
            },
            average_speed_kmh: 30.0,
            position_jitter_deg: 0.0002,
            simulation_step: Duration::from_secs(5),
        }
    }
}

impl DispatchSettings {
    pub fn validate(&self) -> Result<(), AppError> {
        if !self.depot.is_valid() {
            return Err(AppError::Internal(
                "invalid DEPOT_LAT/DEPOT_LNG: out of range".to_string(),
            ));
        }
        if !self.warehouse.is_valid() {
            return Err(AppError::Internal(
                "invalid WAREHOUSE_LAT/WAREHOUSE_LNG: out of range".to_string(),
            ));
        }
        if !(self.average_speed_kmh.is_finite() && self.average_speed_kmh > 0.0) {
            return Err(AppError::Internal(
                "invalid AVERAGE_SPEED_KMH: must be a finite value > 0".to_string(),
            ));
        }
        if !(self.position_jitter_deg.is_finite() && self.position_jitter_deg >= 0.0) {
            return Err(AppError::Internal(
                "invalid POSITION_JITTER_DEG: must be a finite value >= 0".to_string(),
            ));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum GeocoderBackend {
    Nominatim,
    /// Answers every lookup with one fixed point. Meant for local runs.
    Static(GeoPoint),
}

#[derive(Debug, Clone)]
pub struct GeocoderSettings {
    pub backend: GeocoderBackend,
    pub base_url: String,
    pub country: String,
    pub user_agent: String,
    pub timeout: Duration,
}

impl Default for GeocoderSettings {
    fn default() -> Self {
        Self {
            backend: GeocoderBackend::Nominatim,
            base_url: "https://nominatim.openstreetmap.org".to_string(),
            country: "Cameroon".to_string(),
            user_agent: "delivery-tracker/1.0".to_string(),
            timeout: Duration::from_secs(10),
        }
    }
}

impl Config {
    pub fn from_env() -> Result<Self, AppError> {
        let _ = dotenvy::dotenv();

        let defaults = DispatchSettings::default();
        let dispatch = DispatchSettings {
            depot: GeoPoint {
                lat: parse_or_default("DEPOT_LAT", defaults.depot.lat)?,
                lng: parse_or_default("DEPOT_LNG", defaults.depot.lng)?,
            },
            warehouse: GeoPoint {
                lat: parse_or_default("WAREHOUSE_LAT", defaults.warehouse.lat)?,
                lng: parse_or_default("WAREHOUSE_LNG", defaults.warehouse.lng)?,
            },
            average_speed_kmh: parse_or_default("AVERAGE_SPEED_KMH", defaults.average_speed_kmh)?,
            position_jitter_deg: parse_or_default(
                "POSITION_JITTER_DEG",
                defaults.position_jitter_deg,
            )?,
            simulation_step: Duration::from_millis(parse_or_default(
                "SIMULATION_STEP_MS",
                defaults.simulation_step.as_millis() as u64,
            )?),
        };

        dispatch.validate()?;

        let geocoder_defaults = GeocoderSettings::default();
        let backend = match env::var("GEOCODER_BACKEND")
            .unwrap_or_else(|_| "nominatim".to_string())
            .as_str()
        {
            "nominatim" => GeocoderBackend::Nominatim,
            "static" => GeocoderBackend::Static(GeoPoint {
                lat: parse_or_default("STATIC_GEOCODER_LAT", dispatch.warehouse.lat)?,
                lng: parse_or_default("STATIC_GEOCODER_LNG", dispatch.warehouse.lng)?,
            }),
            other => {
                return Err(AppError::Internal(format!(
                    "invalid GEOCODER_BACKEND: {other}, expected nominatim/static"
                )));
            }
        };

        let geocoder = GeocoderSettings {
            backend,
            base_url: env::var("GEOCODER_URL").unwrap_or(geocoder_defaults.base_url),
            country: env::var("GEOCODER_COUNTRY").unwrap_or(geocoder_defaults.country),
            user_agent: env::var("GEOCODER_USER_AGENT").unwrap_or(geocoder_defaults.user_agent),
            timeout: Duration::from_secs(parse_or_default(
                "GEOCODER_TIMEOUT_SECS",
                geocoder_defaults.timeout.as_secs(),
            )?),
        };

        Ok(Self {
            http_port: parse_or_default("HTTP_PORT", 3000)?,
            log_level: env::var("LOG_LEVEL").unwrap_or_else(|_| "info".to_string()),
            event_buffer_size: parse_or_default("EVENT_BUFFER_SIZE", 1024)?,
            dispatch,
            geocoder,
        })
    }
}

fn parse_or_default<T>(key: &str, default: T) -> Result<T, AppError>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    match env::var(key) {
        Ok(raw) => raw
            .parse::<T>()
            .map_err(|err| AppError::Internal(format!("invalid {key}: {err}"))),
        Err(_) => Ok(default),
    }
}
