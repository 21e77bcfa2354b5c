use std::future::Future;
use std::time::Duration;

use anyhow::Context;
use reqwest::{Client, StatusCode, Url};

use crate::error::LookupError;
use crate::postal_code;
use crate::types::{AddressResult, AddressSearchResponse, ViaCepRecord};

pub const DEFAULT_VIACEP_URL: &str = "https://viacep.com.br/ws";

/// Address searches return at most this many candidates
pub const MAX_ADDRESS_CANDIDATES: usize = 10;

/// Source of address records for postal codes and place names.
///
/// `Ok(None)` / `Ok(vec![])` mean the service answered without a match;
/// `Err` means the call itself failed.
pub trait AddressResolver: Send + Sync {
    fn lookup_by_postal_code(
        &self,
        postal_code: &str,
    ) -> impl Future<Output = Result<Option<AddressResult>, LookupError>> + Send;

    fn lookup_by_address(
        &self,
        state: &str,
        city: &str,
        street: Option<&str>,
    ) -> impl Future<Output = Result<Vec<AddressResult>, LookupError>> + Send;
}

/// Client for the public ViaCEP address service
#[derive(Debug, Clone)]
pub struct ViaCepClient {
    http_client: Client,
    base_url: Url,
}

impl ViaCepClient {
    pub fn new(base_url: &str, timeout: Duration) -> anyhow::Result<Self> {
        let http_client = Client::builder()
            .timeout(timeout)
            .build()
            .context("Failed to create HTTP client")?;
        Self::with_client(http_client, base_url)
    }

    pub fn with_client(http_client: Client, base_url: &str) -> anyhow::Result<Self> {
        let base_url = Url::parse(base_url.trim_end_matches('/'))
            .with_context(|| format!("Invalid ViaCEP base URL: {}", base_url))?;
        if base_url.cannot_be_a_base() {
            anyhow::bail!("ViaCEP base URL cannot carry a path: {}", base_url);
        }
        Ok(Self {
            http_client,
            base_url,
        })
    }

    /// `{base}/{segments...}/json/`, each segment percent-encoded
    fn endpoint(&self, segments: &[&str]) -> Result<Url, LookupError> {
        let mut url = self.base_url.clone();
        url.path_segments_mut()
            .map_err(|_| LookupError::Resolution("invalid base URL".to_string()))?
            .pop_if_empty()
            .extend(segments)
            .push("json")
            .push("");
        Ok(url)
    }

    async fn fetch(&self, url: Url) -> Result<Option<String>, LookupError> {
        tracing::debug!(%url, "querying address service");
        let response = self.http_client.get(url).send().await?;
        let status = response.status();

        // The service answers 400 for queries it considers malformed (for
        // example city names shorter than three letters).
        if status == StatusCode::BAD_REQUEST {
            return Ok(None);
        }
        if !status.is_success() {
            return Err(LookupError::Resolution(format!(
                "address service returned {}",
                status
            )));
        }
        Ok(Some(response.text().await?))
    }
}

impl AddressResolver for ViaCepClient {
    async fn lookup_by_postal_code(
        &self,
        postal_code: &str,
    ) -> Result<Option<AddressResult>, LookupError> {
        let digits = postal_code::normalize(postal_code)
            .ok_or_else(|| LookupError::InvalidInput(postal_code.to_string()))?;

        let Some(body) = self.fetch(self.endpoint(&[&digits])?).await? else {
            return Ok(None);
        };
        let record: ViaCepRecord = serde_json::from_str(&body)
            .map_err(|e| LookupError::Resolution(format!("Failed to parse response: {}", e)))?;

        if record.is_error() {
            tracing::debug!(postal_code = %digits, "postal code not found");
            return Ok(None);
        }
        Ok(Some(record.into_address()))
    }

    async fn lookup_by_address(
        &self,
        state: &str,
        city: &str,
        street: Option<&str>,
    ) -> Result<Vec<AddressResult>, LookupError> {
        let state = state.to_uppercase();
        let mut segments = vec![state.as_str(), city];
        if let Some(street) = street.filter(|s| !s.trim().is_empty()) {
            segments.push(street);
        }

        let Some(body) = self.fetch(self.endpoint(&segments)?).await? else {
            return Ok(Vec::new());
        };
        let response: AddressSearchResponse = serde_json::from_str(&body)
            .map_err(|e| LookupError::Resolution(format!("Failed to parse response: {}", e)))?;

        let records = match response {
            AddressSearchResponse::Many(records) => records,
            AddressSearchResponse::Single(_) => Vec::new(),
        };
        Ok(records
            .into_iter()
            .filter(|r| !r.is_error())
            .take(MAX_ADDRESS_CANDIDATES)
            .map(ViaCepRecord::into_address)
            .collect())
    }
}
