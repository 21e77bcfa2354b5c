//! Smart location lookup: turns free text into a single [`AddressResult`].
//!
//! Steps, first match wins:
//! 1. exactly 8 digits after stripping punctuation: postal-code lookup, no fall-through
//! 2. whole input is a known city or abbreviation: address search in that state
//! 3. `"<city>, <UF>"` or `"<city> - <UF>"`: address search with the parsed parts
//! 4. nothing matched

use std::sync::LazyLock;

use regex::Regex;

use crate::aliases::AliasTable;
use crate::error::LookupError;
use crate::postal_code;
use crate::resolver::AddressResolver;
use crate::types::AddressResult;

static CITY_STATE_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)^(.+?)\s*[,\-]\s*([a-z]{2})$").expect("city/state pattern is valid")
});

/// Split `"<city>, <UF>"` or `"<city> - <UF>"` into its parts
pub fn parse_city_state(input: &str) -> Option<(String, String)> {
    let caps = CITY_STATE_PATTERN.captures(input.trim())?;
    let city = caps.get(1)?.as_str().trim();
    if city.is_empty() {
        return None;
    }
    Some((city.to_string(), caps.get(2)?.as_str().to_uppercase()))
}

/// Classifies input and drives the resolver; holds no state between calls
pub struct SmartLookup<'a, R> {
    resolver: &'a R,
    aliases: &'a AliasTable,
}

impl<'a, R: AddressResolver> SmartLookup<'a, R> {
    pub fn new(resolver: &'a R, aliases: &'a AliasTable) -> Self {
        Self { resolver, aliases }
    }

    pub async fn resolve(&self, input: &str) -> Result<AddressResult, LookupError> {
        let query = input.trim().to_lowercase();
        if query.is_empty() {
            return Err(LookupError::InvalidInput("empty query".to_string()));
        }

        if let Some(digits) = postal_code::normalize(&query) {
            tracing::debug!(postal_code = %digits, "input looks like a postal code");
            return self
                .resolver
                .lookup_by_postal_code(&digits)
                .await?
                .ok_or(LookupError::NotFound);
        }

        let mut last_failure = None;

        if let Some(state) = self.aliases.state_for_city(&query) {
            tracing::debug!(city = %query, state, "city resolved through alias table");
            match self.first_candidate(state, &query).await {
                Ok(Some(address)) => return Ok(address),
                Ok(None) => {}
                Err(e) => last_failure = Some(e),
            }
        }

        if let Some((city, state)) = parse_city_state(&query) {
            tracing::debug!(city = %city, state = %state, "input parsed as city and state");
            match self.first_candidate(&state, &city).await {
                Ok(Some(address)) => return Ok(address),
                Ok(None) => {}
                Err(e) => last_failure = Some(e),
            }
        }

        Err(last_failure.unwrap_or(LookupError::NotFound))
    }

    async fn first_candidate(
        &self,
        state: &str,
        city: &str,
    ) -> Result<Option<AddressResult>, LookupError> {
        let candidates = self.resolver.lookup_by_address(state, city, None).await;
        if let Err(e) = &candidates {
            tracing::warn!(state, city, error = %e, "address search failed");
        }
        Ok(candidates?.into_iter().next())
    }
}
