//! BTC/USD price cache backing the catalog endpoint's `price_usd_cents`
//! annotation. A stale price is kept on fetch failure rather than surfaced
//! as an error, since the catalog is informational only.

use std::time::Duration;
use std::time::Instant;

use rust_decimal::Decimal;
use rust_decimal::RoundingStrategy;
use serde::Deserialize;
use tokio::sync::Mutex;

const FETCH_TIMEOUT: Duration = Duration::from_secs(8);

#[derive(Debug, Clone, Copy)]
struct CachedPrice {
    usd: f64,
    updated_at: Instant,
}

pub struct BtcPriceCache {
    source: Option<String>,
    cache_duration: Duration,
    client: reqwest::Client,
    inner: Mutex<Option<CachedPrice>>,
}

#[derive(Deserialize)]
struct CoingeckoResponse {
    bitcoin: CoingeckoBitcoin,
}

#[derive(Deserialize)]
struct CoingeckoBitcoin {
    usd: Option<f64>,
}

impl BtcPriceCache {
    pub fn new(source: Option<String>, cache_seconds: u64) -> Self {
        Self {
            source,
            cache_duration: Duration::from_secs(cache_seconds),
            client: reqwest::Client::new(),
            inner: Mutex::new(None),
        }
    }

    /// Returns the cached BTC/USD price if configured and reachable; `None`
    /// if `btc_price.source` is unset or every fetch so far has failed.
    pub async fn get(&self) -> Option<f64> {
        let Some(source) = self.source.as_deref() else {
            return None;
        };

        {
            let guard = self.inner.lock().await;
            if let Some(cached) = *guard {
                if cached.updated_at.elapsed() < self.cache_duration {
                    return Some(cached.usd);
                }
            }
        }

        let mut guard = self.inner.lock().await;
        if let Some(cached) = *guard {
            if cached.updated_at.elapsed() < self.cache_duration {
                return Some(cached.usd);
            }
        }

        if let Some(price) = self.fetch(source).await {
            *guard = Some(CachedPrice { usd: price, updated_at: Instant::now() });
        }

        guard.map(|c| c.usd)
    }

    async fn fetch(&self, source: &str) -> Option<f64> {
        let response = self.client.get(source).timeout(FETCH_TIMEOUT).send().await.ok()?;
        let response = response.error_for_status().ok()?;
        let payload: CoingeckoResponse = response.json().await.ok()?;
        payload.bitcoin.usd
    }
}

/// Converts a sat amount into USD cents at the given BTC/USD price, rounded
/// half-up to one decimal place, matching `_sats_to_usd_cents`.
pub fn sats_to_usd_cents(sats: i64, btc_usd: Option<f64>) -> Option<f64> {
    let btc_usd = btc_usd?;
    let sats = Decimal::from(sats);
    let btc_usd = Decimal::try_from(btc_usd).ok()?;
    let cents = sats * btc_usd / Decimal::from(100_000_000) * Decimal::from(100);
    let rounded = cents.round_dp_with_strategy(1, RoundingStrategy::MidpointAwayFromZero);
    rounded.to_string().parse().ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn converts_sats_to_usd_cents() {
        let cents = sats_to_usd_cents(10, Some(60_000.0)).unwrap();
        assert!((cents - 0.6).abs() < 0.01);
    }

    #[test]
    fn returns_none_without_a_price() {
        assert_eq!(sats_to_usd_cents(10, None), None);
    }
}
