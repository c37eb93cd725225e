use std::collections::HashSet;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use governor::{
    clock::DefaultClock,
    state::{InMemoryState, NotKeyed},
    Quota, RateLimiter,
};
use tokio::sync::watch;
use tokio::time::sleep;
use tracing::{debug, warn};

use arcana_common::data::Trade;
use arcana_common::error::ErrorClassification;

use crate::config::{RateSettings, SourceSettings};
use crate::source::{SourceError, SourceResult, TradeSource};

use super::types::{ProductsResponse, TickerResponse};

/// Source identifier written into every trade row.
const SOURCE_NAME: &str = "coinbase";

/// Path prefix of the public (unauthenticated) market endpoints.
const API_PREFIX: &str = "/api/v3/brokerage/market";

/// Exponential backoff ladder for transient failures.
const RETRY_BACKOFF_SECS: [u64; 4] = [2, 4, 8, 16];

/// Retries after the initial attempt.
const MAX_RETRIES: usize = RETRY_BACKOFF_SECS.len();

/// HTTP request timeout.
const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Coinbase source settings.
#[derive(Debug, Clone)]
pub struct CoinbaseSettings {
    /// API base URL.
    pub base_url: String,
    /// Trades per page. The upstream cap is undocumented — 1000 works,
    /// 2500+ returns server errors — so this is configuration, not a
    /// constant.
    pub page_limit: usize,
    /// Minimum delay between requests in seconds.
    pub min_delay_seconds: f64,
}

impl Default for CoinbaseSettings {
    fn default() -> Self {
        Self {
            base_url: "https://api.coinbase.com".to_string(),
            page_limit: 1000,
            min_delay_seconds: 0.12,
        }
    }
}

impl CoinbaseSettings {
    pub fn from_config(source: &SourceSettings, rate: &RateSettings) -> Self {
        Self {
            base_url: source.base_url.clone(),
            page_limit: source.page_limit,
            min_delay_seconds: rate.min_delay_seconds,
        }
    }
}

/// Fetches trade data from the Coinbase Advanced Trade API.
///
/// The API returns the newest trades first, at most one page per call.
/// [`fetch_window`](TradeSource::fetch_window) walks backward through the
/// window by moving the end bound below the earliest trade of each full
/// page — every call yields useful data and the walk terminates on the
/// first short page.
pub struct CoinbaseSource {
    settings: CoinbaseSettings,
    http: reqwest::Client,
    limiter: RateLimiter<NotKeyed, InMemoryState, DefaultClock>,
    shutdown: Option<watch::Receiver<bool>>,
}

impl CoinbaseSource {
    pub fn new(settings: CoinbaseSettings) -> Self {
        let min_delay = settings.min_delay_seconds.max(0.001);
        let quota = Quota::with_period(Duration::from_secs_f64(min_delay))
            .expect("rate-limit period must be positive");

        Self {
            settings,
            http: reqwest::Client::builder()
                .timeout(REQUEST_TIMEOUT)
                .build()
                .expect("failed to build HTTP client"),
            limiter: RateLimiter::direct(quota),
            shutdown: None,
        }
    }

    /// Attach a cancellation signal. In-flight retries finish their
    /// current attempt, not the full ladder, before surfacing
    /// [`SourceError::Cancelled`].
    pub fn with_shutdown(mut self, shutdown: watch::Receiver<bool>) -> Self {
        self.shutdown = Some(shutdown);
        self
    }

    fn is_cancelled(&self) -> bool {
        self.shutdown.as_ref().is_some_and(|rx| *rx.borrow())
    }

    /// Sleep for a backoff interval; returns true if cancellation arrived
    /// while waiting.
    async fn backoff(&self, wait: Duration) -> bool {
        match &self.shutdown {
            Some(rx) => {
                let mut rx = rx.clone();
                tokio::select! {
                    _ = sleep(wait) => false,
                    res = rx.wait_for(|stop| *stop) => res.is_ok(),
                }
            }
            None => {
                sleep(wait).await;
                false
            }
        }
    }

    /// One rate-limited GET with the standard retry ladder.
    async fn get_with_retry<T>(&self, endpoint: &str, params: &[(&str, String)]) -> SourceResult<T>
    where
        T: serde::de::DeserializeOwned,
    {
        let mut attempt = 0usize;
        loop {
            if self.is_cancelled() {
                return Err(SourceError::Cancelled);
            }
            self.limiter.until_ready().await;

            match self.get_once(endpoint, params).await {
                Ok(value) => return Ok(value),
                Err(err) if err.is_transient() && attempt < MAX_RETRIES => {
                    let wait = Duration::from_secs(RETRY_BACKOFF_SECS[attempt]);
                    warn!(
                        "request to {} failed (attempt {}/{}): {}. Retrying in {:?}...",
                        endpoint,
                        attempt + 1,
                        MAX_RETRIES,
                        err,
                        wait
                    );
                    attempt += 1;
                    if self.backoff(wait).await {
                        return Err(SourceError::Cancelled);
                    }
                }
                Err(err) => return Err(err),
            }
        }
    }

    async fn get_once<T>(&self, endpoint: &str, params: &[(&str, String)]) -> SourceResult<T>
    where
        T: serde::de::DeserializeOwned,
    {
        let url = format!("{}{}{}", self.settings.base_url, API_PREFIX, endpoint);
        let response = self
            .http
            .get(&url)
            .query(params)
            .send()
            .await
            .map_err(|e| SourceError::Request(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(SourceError::Status {
                status: status.as_u16(),
                body: truncate(&body, 200),
            });
        }

        response
            .json::<T>()
            .await
            .map_err(|e| SourceError::Parse(e.to_string()))
    }

    /// Fetch a single page of trades for `[start, end]`, ascending.
    async fn fetch_page(
        &self,
        pair: &str,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> SourceResult<Vec<Trade>> {
        let endpoint = format!("/products/{pair}/ticker");
        let params = [
            ("limit", self.settings.page_limit.to_string()),
            ("start", start.timestamp().to_string()),
            ("end", end.timestamp().to_string()),
        ];

        let payload: TickerResponse = self.get_with_retry(&endpoint, &params).await?;
        let mut trades = payload
            .trades
            .into_iter()
            .map(|raw| raw.into_trade(SOURCE_NAME, pair))
            .collect::<Result<Vec<_>, _>>()?;
        trades.sort_by(|a, b| a.timestamp.cmp(&b.timestamp));
        Ok(trades)
    }
}

fn truncate(s: &str, max: usize) -> String {
    if s.len() <= max {
        s.to_string()
    } else {
        let mut cut = max;
        while !s.is_char_boundary(cut) {
            cut -= 1;
        }
        format!("{}…", &s[..cut])
    }
}

#[async_trait]
impl TradeSource for CoinbaseSource {
    fn name(&self) -> &str {
        SOURCE_NAME
    }

    async fn fetch_window(
        &self,
        pair: &str,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> SourceResult<Vec<Trade>> {
        let mut all: Vec<Trade> = Vec::new();
        let mut seen: HashSet<String> = HashSet::new();
        let mut cursor_end = end;
        let mut pages = 0u32;

        loop {
            let page = self.fetch_page(pair, start, cursor_end).await?;
            pages += 1;

            let page_len = page.len();
            let earliest = page.first().map(|t| t.timestamp);
            let mut fresh = 0usize;
            for trade in page {
                if seen.insert(trade.trade_id.clone()) {
                    fresh += 1;
                    all.push(trade);
                }
            }

            // A short page means the remaining range is fully captured.
            if page_len < self.settings.page_limit {
                break;
            }

            // A full page with nothing new: the cursor cannot advance past
            // this instant. Pragmatically impossible at minute windows.
            if fresh == 0 {
                return Err(SourceError::WindowTooBusy {
                    pair: pair.to_string(),
                    end: cursor_end,
                    limit: self.settings.page_limit,
                });
            }

            let Some(earliest) = earliest else { break };
            if earliest <= start {
                break;
            }

            // Move the end bound to the earliest second seen. Flooring
            // re-includes that instant; the id dedup absorbs the overlap.
            cursor_end =
                DateTime::from_timestamp(earliest.timestamp(), 0).unwrap_or(earliest);
        }

        all.retain(|t| t.timestamp >= start && t.timestamp < end);
        all.sort_by(|a, b| {
            a.timestamp
                .cmp(&b.timestamp)
                .then_with(|| a.trade_id.cmp(&b.trade_id))
        });

        if pages > 1 {
            debug!(
                "paginated {} pages for {} [{} -> {}]: {} trades",
                pages,
                pair,
                start.format("%Y-%m-%d %H:%M"),
                end.format("%Y-%m-%d %H:%M"),
                all.len()
            );
        }

        Ok(all)
    }

    async fn supported_pairs(&self) -> SourceResult<Vec<String>> {
        let payload: ProductsResponse = self.get_with_retry("/products", &[]).await?;
        Ok(payload
            .products
            .into_iter()
            .filter(|p| !p.is_disabled)
            .map(|p| p.product_id)
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_settings_match_public_limits() {
        let settings = CoinbaseSettings::default();
        assert_eq!(settings.page_limit, 1000);
        assert_eq!(settings.min_delay_seconds, 0.12);
    }

    #[test]
    fn cancellation_flag_is_observed() {
        let (tx, rx) = watch::channel(false);
        let source = CoinbaseSource::new(CoinbaseSettings::default()).with_shutdown(rx);
        assert!(!source.is_cancelled());
        tx.send(true).ok();
        assert!(source.is_cancelled());
    }

    #[test]
    fn truncate_respects_char_boundaries() {
        assert_eq!(truncate("short", 200), "short");
        let long = "é".repeat(300);
        let cut = truncate(&long, 201);
        assert!(cut.len() <= 205);
    }
}
