//! Currency Converter
//!
//! Converts an amount between two account currencies using a point-in-time
//! rate from an external provider, rounded to minor units.
//!
//! Every conversion is a fresh provider round-trip unless a rate cache is
//! configured (`currency.cache_ttl_secs > 0`).

pub mod error;
pub mod http;

pub use error::ConversionError;
pub use http::HttpRateProvider;

use async_trait::async_trait;
use cached::{Cached, TimedCache};
use rust_decimal::Decimal;
use std::sync::{Arc, Mutex};
use tracing::debug;

use crate::money::{Currency, round_minor};

/// Source of exchange rates keyed by (base, quote)
#[async_trait]
pub trait RateProvider: Send + Sync {
    /// Provider name for logging
    fn name(&self) -> &'static str;

    /// How many units of `quote` one unit of `base` buys
    async fn rate(&self, base: Currency, quote: Currency) -> Result<Decimal, ConversionError>;
}

/// Currency converter with an optional short-lived rate cache
pub struct CurrencyConverter {
    provider: Arc<dyn RateProvider>,
    cache: Option<Mutex<TimedCache<(Currency, Currency), Decimal>>>,
}

impl CurrencyConverter {
    /// Converter without caching
    pub fn new(provider: Arc<dyn RateProvider>) -> Self {
        Self {
            provider,
            cache: None,
        }
    }

    /// Converter caching each rate for `ttl_secs` (0 disables the cache)
    pub fn with_cache(provider: Arc<dyn RateProvider>, ttl_secs: u64) -> Self {
        let cache = (ttl_secs > 0).then(|| Mutex::new(TimedCache::with_lifespan(ttl_secs)));
        Self { provider, cache }
    }

    /// Convert `amount` from `from` into `to`
    ///
    /// Same-currency conversions return `amount` untouched without calling
    /// the provider.
    pub async fn convert(
        &self,
        from: Currency,
        to: Currency,
        amount: Decimal,
    ) -> Result<Decimal, ConversionError> {
        if from == to {
            return Ok(amount);
        }

        let rate = self.rate(from, to).await?;
        let converted = round_minor(amount * rate);
        debug!(
            from = %from,
            to = %to,
            amount = %amount,
            rate = %rate,
            converted = %converted,
            provider = self.provider.name(),
            "Converted amount"
        );
        Ok(converted)
    }

    async fn rate(&self, base: Currency, quote: Currency) -> Result<Decimal, ConversionError> {
        if let Some(hit) = self.cached_rate(base, quote) {
            return Ok(hit);
        }

        let rate = self.provider.rate(base, quote).await?;

        if let Some(cache) = &self.cache
            && let Ok(mut cache) = cache.lock()
        {
            cache.cache_set((base, quote), rate);
        }
        Ok(rate)
    }

    fn cached_rate(&self, base: Currency, quote: Currency) -> Option<Decimal> {
        let cache = self.cache.as_ref()?;
        let mut cache = cache.lock().ok()?;
        cache.cache_get(&(base, quote)).copied()
    }
}


#[cfg(test)]
pub use mock::MockRateProvider;
