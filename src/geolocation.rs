//! Device position and reverse geocoding.
//!
//! Acquiring a fix and reverse-geocoding it are strictly sequential. Neither
//! step is retried: every failure reaches the caller once, with its own
//! human-readable reason.

use std::future::Future;
use std::sync::Mutex;
use std::time::{Duration, Instant};

use anyhow::Context;
use reqwest::{Client, Url};

use crate::aliases::AliasTable;
use crate::error::GeolocationError;
use crate::postal_code;
use crate::types::{GeolocationResult, ReverseGeocodeAddress, ReverseGeocodeResponse};

pub const DEFAULT_NOMINATIM_URL: &str = "https://nominatim.openstreetmap.org/reverse";
pub const DEFAULT_USER_AGENT: &str = "SOS-Cidadao-App/1.0";

/// How a position should be acquired
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PositionOptions {
    pub high_accuracy: bool,
    /// Upper bound for acquiring a fix
    pub timeout: Duration,
    /// Oldest cached fix that may be returned instead of a fresh one
    pub maximum_age: Duration,
}

impl Default for PositionOptions {
    fn default() -> Self {
        Self {
            high_accuracy: true,
            timeout: Duration::from_secs(10),
            maximum_age: Duration::from_secs(60),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Coordinates {
    pub latitude: f64,
    pub longitude: f64,
}

impl Coordinates {
    /// `None` unless both values are finite and within WGS84 bounds
    pub fn new(latitude: f64, longitude: f64) -> Option<Self> {
        let valid = latitude.is_finite()
            && longitude.is_finite()
            && (-90.0..=90.0).contains(&latitude)
            && (-180.0..=180.0).contains(&longitude);
        valid.then_some(Self {
            latitude,
            longitude,
        })
    }
}

/// Source of the device's current position
pub trait PositionProvider: Send + Sync {
    fn current_position(
        &self,
        options: &PositionOptions,
    ) -> impl Future<Output = Result<Coordinates, GeolocationError>> + Send;
}

/// Converts coordinates into a structured address
pub trait ReverseGeocoder: Send + Sync {
    fn reverse(
        &self,
        coordinates: Coordinates,
    ) -> impl Future<Output = Result<ReverseGeocodeAddress, GeolocationError>> + Send;
}

/// Position supplied up front, e.g. from the command line or an HTTP request
#[derive(Debug, Clone, Copy)]
pub struct FixedPosition(pub Coordinates);

impl PositionProvider for FixedPosition {
    async fn current_position(
        &self,
        _options: &PositionOptions,
    ) -> Result<Coordinates, GeolocationError> {
        Ok(self.0)
    }
}

/// Reuses the last fix while it is younger than `maximum_age`
pub struct CachedPosition<P> {
    inner: P,
    last_fix: Mutex<Option<(Coordinates, Instant)>>,
}

impl<P: PositionProvider> CachedPosition<P> {
    pub fn new(inner: P) -> Self {
        Self {
            inner,
            last_fix: Mutex::new(None),
        }
    }

    fn cached(&self, maximum_age: Duration) -> Option<Coordinates> {
        let guard = self.last_fix.lock().ok()?;
        guard
            .as_ref()
            .filter(|(_, at)| at.elapsed() <= maximum_age)
            .map(|(coords, _)| *coords)
    }
}

impl<P: PositionProvider> PositionProvider for CachedPosition<P> {
    async fn current_position(
        &self,
        options: &PositionOptions,
    ) -> Result<Coordinates, GeolocationError> {
        if let Some(coords) = self.cached(options.maximum_age) {
            tracing::debug!("using cached position");
            return Ok(coords);
        }
        let coords = self.inner.current_position(options).await?;
        if let Ok(mut guard) = self.last_fix.lock() {
            *guard = Some((coords, Instant::now()));
        }
        Ok(coords)
    }
}

/// Client for the Nominatim reverse-geocoding service
#[derive(Debug, Clone)]
pub struct NominatimClient {
    http_client: Client,
    base_url: Url,
    user_agent: String,
}

impl NominatimClient {
    pub fn new(base_url: &str, user_agent: &str, timeout: Duration) -> anyhow::Result<Self> {
        let http_client = Client::builder()
            .timeout(timeout)
            .build()
            .context("Failed to create HTTP client")?;
        let base_url = Url::parse(base_url)
            .with_context(|| format!("Invalid reverse-geocoding URL: {}", base_url))?;
        Ok(Self {
            http_client,
            base_url,
            user_agent: user_agent.to_string(),
        })
    }
}

impl ReverseGeocoder for NominatimClient {
    async fn reverse(
        &self,
        coordinates: Coordinates,
    ) -> Result<ReverseGeocodeAddress, GeolocationError> {
        let lat = coordinates.latitude.to_string();
        let lon = coordinates.longitude.to_string();
        tracing::debug!(%lat, %lon, "reverse geocoding");

        let response = self
            .http_client
            .get(self.base_url.clone())
            .query(&[
                ("format", "json"),
                ("lat", lat.as_str()),
                ("lon", lon.as_str()),
                ("addressdetails", "1"),
                ("accept-language", "pt-BR"),
            ])
            .header(reqwest::header::USER_AGENT, &self.user_agent)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(GeolocationError::ReverseGeocoding(format!(
                "service returned {}",
                status
            )));
        }

        let body: ReverseGeocodeResponse = response.json().await?;
        Ok(body.address.unwrap_or_default())
    }
}

/// Build the result from a reverse-geocoded address, normalizing the state to its UF
pub fn build_result(
    coordinates: Coordinates,
    address: &ReverseGeocodeAddress,
    aliases: &AliasTable,
) -> GeolocationResult {
    let non_empty = |s: Option<&str>| {
        s.map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_string)
    };

    let city = non_empty(address.locality());
    let state = non_empty(address.state.as_deref()).map(|name| aliases.state_abbreviation(&name));
    let postal_code = address
        .postcode
        .as_deref()
        .map(postal_code::digits_only)
        .filter(|d| !d.is_empty());

    let parts: Vec<&str> = [
        address.road.as_deref(),
        address.neighborhood(),
        city.as_deref(),
    ]
    .into_iter()
    .flatten()
    .map(str::trim)
    .filter(|s| !s.is_empty())
    .collect();
    let address_line = (!parts.is_empty()).then(|| parts.join(", "));

    GeolocationResult {
        latitude: coordinates.latitude,
        longitude: coordinates.longitude,
        postal_code,
        city,
        state,
        address_line,
    }
}

/// Acquire a fix, then reverse-geocode it
pub struct GeolocationService<'a, P, G> {
    provider: &'a P,
    geocoder: &'a G,
    aliases: &'a AliasTable,
    options: PositionOptions,
}

impl<'a, P: PositionProvider, G: ReverseGeocoder> GeolocationService<'a, P, G> {
    pub fn new(provider: &'a P, geocoder: &'a G, aliases: &'a AliasTable) -> Self {
        Self {
            provider,
            geocoder,
            aliases,
            options: PositionOptions::default(),
        }
    }

    pub fn with_options(mut self, options: PositionOptions) -> Self {
        self.options = options;
        self
    }

    pub async fn locate(&self) -> Result<GeolocationResult, GeolocationError> {
        let coordinates = tokio::time::timeout(
            self.options.timeout,
            self.provider.current_position(&self.options),
        )
        .await
        .map_err(|_| GeolocationError::Timeout)?
        .inspect_err(|e| tracing::warn!(error = %e, "could not acquire position"))?;

        self.describe(coordinates).await
    }

    pub async fn describe(
        &self,
        coordinates: Coordinates,
    ) -> Result<GeolocationResult, GeolocationError> {
        let address = self
            .geocoder
            .reverse(coordinates)
            .await
            .inspect_err(|e| tracing::warn!(error = %e, "reverse geocoding failed"))?;
        Ok(build_result(coordinates, &address, self.aliases))
    }
}
