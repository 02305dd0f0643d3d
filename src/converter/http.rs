//! HTTP Rate Provider
//!
//! Fetches a point-in-time rate from a currencyapi-style endpoint:
//!
//! ```text
//! GET {api_url}?base_currency=RUB&currencies=USD
//! {"data": {"USD": {"code": "USD", "value": 0.0108}}}
//! ```

use async_trait::async_trait;
use rust_decimal::Decimal;
use serde::Deserialize;
use std::collections::HashMap;
use std::str::FromStr;
use std::time::Duration;
use tracing::debug;

use super::RateProvider;
use super::error::ConversionError;
use crate::config::CurrencyApiConfig;
use crate::money::Currency;

#[derive(Deserialize, Debug)]
struct RatesResponse {
    data: HashMap<String, RateEntry>,
}

#[derive(Deserialize, Debug)]
struct RateEntry {
    value: serde_json::Number,
}

/// Rate provider backed by an external HTTP API
pub struct HttpRateProvider {
    client: reqwest::Client,
    api_url: String,
    api_key: Option<String>,
}

impl HttpRateProvider {
    /// Build a provider whose every request is bounded by `timeout`
    pub fn new(
        api_url: impl Into<String>,
        api_key: Option<String>,
        timeout: Duration,
    ) -> Result<Self, ConversionError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| ConversionError::Unreachable(e.to_string()))?;

        Ok(Self {
            client,
            api_url: api_url.into(),
            api_key,
        })
    }

    pub fn from_config(config: &CurrencyApiConfig) -> Result<Self, ConversionError> {
        Self::new(
            config.api_url.clone(),
            config.api_key.clone(),
            Duration::from_millis(config.timeout_ms),
        )
    }
}

#[async_trait]
impl RateProvider for HttpRateProvider {
    fn name(&self) -> &'static str {
        "http"
    }

    async fn rate(&self, base: Currency, quote: Currency) -> Result<Decimal, ConversionError> {
        let mut request = self
            .client
            .get(&self.api_url)
            .query(&[("base_currency", base.code()), ("currencies", quote.code())]);
        if let Some(key) = &self.api_key {
            request = request.query(&[("apikey", key.as_str())]);
        }

        let response = request.send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(ConversionError::Status(status.as_u16()));
        }

        let body = response.text().await?;
        let rate = parse_rate(&body, base, quote)?;
        debug!(base = %base, quote = %quote, rate = %rate, "Fetched exchange rate");
        Ok(rate)
    }
}

/// Extract `data.<quote>.value` from a provider payload
pub(crate) fn parse_rate(body: &str, base: Currency, quote: Currency) -> Result<Decimal, ConversionError> {
    let parsed: RatesResponse = serde_json::from_str(body)
        .map_err(|e| ConversionError::InvalidPayload(e.to_string()))?;

    let entry = parsed
        .data
        .get(quote.code())
        .ok_or(ConversionError::MissingRate { base, quote })?;

    let raw = entry.value.to_string();
    let rate = Decimal::from_str(&raw)
        .or_else(|_| Decimal::from_scientific(&raw))
        .map_err(|e| ConversionError::InvalidPayload(format!("rate '{}': {}", raw, e)))?;

    if rate <= Decimal::ZERO {
        return Err(ConversionError::InvalidPayload(format!(
            "non-positive rate {}",
            rate
        )));
    }
    Ok(rate)
}
