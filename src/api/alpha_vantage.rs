use crate::config::MarketConfig;
use crate::models::{DataSource, Quote};
use crate::{Error, Result};
use governor::{Quota, RateLimiter};
use reqwest::Client;
use serde::Deserialize;
use std::collections::HashMap;
use std::num::NonZeroU32;
use std::sync::Arc;
use std::time::Duration;

const ALPHA_VANTAGE_API_BASE: &str = "https://www.alphavantage.co";

type AlphaVantageRateLimiter = RateLimiter<
    governor::state::direct::NotKeyed,
    governor::state::InMemoryState,
    governor::clock::DefaultClock,
>;

/// Alpha Vantage `GLOBAL_QUOTE` client
///
/// Cloneable; clones share the rate limiter. The free tier allows a handful of calls per
/// minute, so every request waits for a permit first.
#[derive(Clone)]
pub struct AlphaVantageClient {
    client: Client,
    api_key: String,
    base_url: String,
    suffix: String,
    rate_limiter: Arc<AlphaVantageRateLimiter>,
}

#[derive(Debug, Deserialize)]
struct GlobalQuoteResponse {
    #[serde(rename = "Global Quote", default)]
    global_quote: HashMap<String, String>,
    /// Present when the API key hit its call limit
    #[serde(rename = "Note")]
    note: Option<String>,
    #[serde(rename = "Information")]
    information: Option<String>,
}

impl AlphaVantageClient {
    pub fn new(config: &MarketConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .build()?;

        let rpm = NonZeroU32::new(config.alpha_vantage_requests_per_minute)
            .unwrap_or(NonZeroU32::MIN);
        let rate_limiter = Arc::new(RateLimiter::direct(Quota::per_minute(rpm)));

        let base_url = if config.alpha_vantage_base_url.is_empty() {
            ALPHA_VANTAGE_API_BASE.to_string()
        } else {
            config.alpha_vantage_base_url.trim_end_matches('/').to_string()
        };

        Ok(Self {
            client,
            api_key: config.alpha_vantage_api_key.clone(),
            base_url,
            suffix: config.alpha_vantage_suffix.clone(),
            rate_limiter,
        })
    }

    /// Point the client at another host (mock servers)
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }

    /// Latest daily quote for `symbol`
    ///
    /// `Ok(None)` when the API answers without a quote (unknown symbol or call limit).
    pub async fn global_quote(&self, symbol: &str) -> Result<Option<Quote>> {
        self.rate_limiter.until_ready().await;

        let ticker = format!("{}{}", symbol, self.suffix);
        let url = format!("{}/query", self.base_url);

        let response = self
            .client
            .get(&url)
            .query(&[
                ("function", "GLOBAL_QUOTE"),
                ("symbol", ticker.as_str()),
                ("apikey", self.api_key.as_str()),
            ])
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(Error::MarketData(format!(
                "Alpha Vantage returned {} for {}",
                status, ticker
            )));
        }

        let body: GlobalQuoteResponse = response.json().await?;

        if let Some(note) = body.note.or(body.information) {
            tracing::warn!(symbol = %ticker, "Alpha Vantage declined request: {}", note);
            return Ok(None);
        }

        Ok(parse_global_quote(&body.global_quote))
    }
}

fn parse_global_quote(fields: &HashMap<String, String>) -> Option<Quote> {
    let field = |key: &str| -> Option<f64> { fields.get(key)?.trim().parse().ok() };

    let close = field("05. price")?;
    if close <= 0.0 {
        return None;
    }

    Some(Quote {
        open: field("02. open").unwrap_or(close),
        high: field("03. high").unwrap_or(close),
        low: field("04. low").unwrap_or(close),
        close,
        volume: field("06. volume").unwrap_or(0.0),
        source: DataSource::AlphaVantage,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use mockito::Matcher;

    fn client(server: &mockito::ServerGuard) -> AlphaVantageClient {
        AlphaVantageClient::new(&MarketConfig::default())
            .unwrap()
            .with_base_url(server.url())
    }

    #[tokio::test]
    async fn test_global_quote_parses_fields() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("GET", "/query")
            .match_query(Matcher::AllOf(vec![
                Matcher::UrlEncoded("function".into(), "GLOBAL_QUOTE".into()),
                Matcher::UrlEncoded("symbol".into(), "RELIANCE.BSE".into()),
                Matcher::UrlEncoded("apikey".into(), "demo".into()),
            ]))
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(
                r#"{"Global Quote": {
                    "01. symbol": "RELIANCE.BSE",
                    "02. open": "2950.0000",
                    "03. high": "2978.4500",
                    "04. low": "2931.1000",
                    "05. price": "2962.3500",
                    "06. volume": "183421",
                    "07. latest trading day": "2024-03-01",
                    "08. previous close": "2948.2000"
                }}"#,
            )
            .create_async()
            .await;

        let quote = client(&server).global_quote("RELIANCE").await.unwrap().unwrap();

        mock.assert_async().await;
        assert_eq!(quote.close, 2962.35);
        assert_eq!(quote.open, 2950.0);
        assert_eq!(quote.high, 2978.45);
        assert_eq!(quote.low, 2931.1);
        assert_eq!(quote.volume, 183421.0);
        assert_eq!(quote.source, DataSource::AlphaVantage);
    }

    #[tokio::test]
    async fn test_empty_quote_is_none() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/query")
            .match_query(Matcher::Any)
            .with_status(200)
            .with_body(r#"{"Global Quote": {}}"#)
            .create_async()
            .await;

        let quote = client(&server).global_quote("NOPE").await.unwrap();
        assert!(quote.is_none());
    }

    #[tokio::test]
    async fn test_call_limit_note_is_none() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/query")
            .match_query(Matcher::Any)
            .with_status(200)
            .with_body(r#"{"Note": "Thank you for using Alpha Vantage! Our standard API call frequency is 5 calls per minute."}"#)
            .create_async()
            .await;

        let quote = client(&server).global_quote("TCS").await.unwrap();
        assert!(quote.is_none());
    }

    #[tokio::test]
    async fn test_server_error_is_err() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/query")
            .match_query(Matcher::Any)
            .with_status(503)
            .create_async()
            .await;

        let result = client(&server).global_quote("TCS").await;
        assert!(matches!(result, Err(Error::MarketData(_))));
    }

    #[test]
    fn test_parse_rejects_missing_price() {
        let mut fields = HashMap::new();
        fields.insert("02. open".to_string(), "10.0".to_string());
        assert!(parse_global_quote(&fields).is_none());

        fields.insert("05. price".to_string(), "0.0000".to_string());
        assert!(parse_global_quote(&fields).is_none());
    }
}
