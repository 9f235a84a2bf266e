use crate::config::MarketConfig;
use crate::models::{DataSource, Quote};
use crate::{Error, Result};
use reqwest::Client;
use serde::Deserialize;
use std::time::Duration;

const YAHOO_API_BASE: &str = "https://query1.finance.yahoo.com";
// Yahoo rejects requests without a browser-like agent
const USER_AGENT: &str = "Mozilla/5.0 (compatible; papertrader/0.1)";

/// Yahoo Finance chart API client
#[derive(Clone)]
pub struct YahooFinanceClient {
    client: Client,
    base_url: String,
    suffix: String,
}

#[derive(Debug, Deserialize)]
struct ChartResponse {
    chart: Chart,
}

#[derive(Debug, Deserialize)]
struct Chart {
    result: Option<Vec<ChartResult>>,
}

#[derive(Debug, Deserialize)]
struct ChartResult {
    indicators: Indicators,
}

#[derive(Debug, Deserialize)]
struct Indicators {
    quote: Vec<QuoteSeries>,
}

// Yahoo pads holidays and halted sessions with nulls
#[derive(Debug, Deserialize, Default)]
struct QuoteSeries {
    #[serde(default)]
    open: Vec<Option<f64>>,
    #[serde(default)]
    high: Vec<Option<f64>>,
    #[serde(default)]
    low: Vec<Option<f64>>,
    #[serde(default)]
    close: Vec<Option<f64>>,
    #[serde(default)]
    volume: Vec<Option<f64>>,
}

impl YahooFinanceClient {
    pub fn new(config: &MarketConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .user_agent(USER_AGENT)
            .build()?;

        let base_url = if config.yahoo_base_url.is_empty() {
            YAHOO_API_BASE.to_string()
        } else {
            config.yahoo_base_url.trim_end_matches('/').to_string()
        };

        Ok(Self {
            client,
            base_url,
            suffix: config.yahoo_suffix.clone(),
        })
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }

    /// Most recent daily bar for `symbol`, `Ok(None)` when the chart is empty
    pub async fn latest_quote(&self, symbol: &str) -> Result<Option<Quote>> {
        let ticker = format!("{}{}", symbol, self.suffix);
        let url = format!("{}/v8/finance/chart/{}", self.base_url, ticker);

        let response = self
            .client
            .get(&url)
            .query(&[("interval", "1d")])
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(Error::MarketData(format!(
                "Yahoo Finance returned {} for {}",
                status, ticker
            )));
        }

        let body: ChartResponse = response.json().await?;
        let series = body
            .chart
            .result
            .and_then(|mut results| {
                if results.is_empty() {
                    None
                } else {
                    Some(results.swap_remove(0))
                }
            })
            .and_then(|result| result.indicators.quote.into_iter().next());

        Ok(series.and_then(|s| last_bar(&s)))
    }
}

fn last_bar(series: &QuoteSeries) -> Option<Quote> {
    let index = series.close.iter().rposition(|c| matches!(c, Some(v) if *v > 0.0))?;
    let close = series.close[index]?;
    let at = |values: &[Option<f64>]| values.get(index).copied().flatten();

    Some(Quote {
        open: at(&series.open).unwrap_or(close),
        high: at(&series.high).unwrap_or(close),
        low: at(&series.low).unwrap_or(close),
        close,
        volume: at(&series.volume).unwrap_or(0.0),
        source: DataSource::YahooFinance,
    })
}
