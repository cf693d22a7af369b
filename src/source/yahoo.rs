use std::collections::BTreeMap;
use std::time::Duration;

use chrono::{DateTime, NaiveDate, Utc};
use error_stack::{Report, ResultExt};
use futures::future::BoxFuture;
use serde::Deserialize;
use tracing::{debug, info};

use crate::config::SourceConfig;
use crate::error::FetchError;
use crate::model::PricePoint;
use crate::source::PriceSource;

const SOURCE_NAME: &str = "yahoo";
/// A few days of daily bars so weekends and holidays still yield a close.
const CURRENT_RANGE: &str = "5d";
const DAILY_INTERVAL: &str = "1d";
const USER_AGENT: &str = concat!("gold-notifier/", env!("CARGO_PKG_VERSION"));

/// Price feed backed by the Yahoo Finance chart API.
///
/// The asset quote (e.g. gold futures in USD) is optionally divided by an FX
/// quote (e.g. EUR/USD) to express the price in another currency.
pub struct YahooSource {
    client: reqwest::Client,
    base_url: String,
    symbol: String,
    fx_symbol: Option<String>,
}

impl YahooSource {
    pub fn new(config: &SourceConfig) -> Result<Self, Report<FetchError>> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .user_agent(USER_AGENT)
            .build()
            .change_context(request_error())?;

        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_owned(),
            symbol: config.symbol.clone(),
            fx_symbol: config.fx_symbol.clone(),
        })
    }

    async fn fetch_closes(
        &self,
        symbol: &str,
        params: &[(&str, String)],
    ) -> Result<Vec<(NaiveDate, f64)>, Report<FetchError>> {
        let url = format!("{}/v8/finance/chart/{}", self.base_url, symbol);

        let response = self
            .client
            .get(&url)
            .query(params)
            .send()
            .await
            .change_context(request_error())
            .attach_with(|| format!("symbol: {symbol}"))?;

        if !response.status().is_success() {
            return Err(Report::new(FetchError::Status {
                source_name: SOURCE_NAME.into(),
                status: response.status().as_u16(),
            })
            .attach(format!("symbol: {symbol}")));
        }

        let chart: ChartResponse = response
            .json()
            .await
            .change_context(FetchError::ResponseParse {
                source_name: SOURCE_NAME.into(),
            })
            .attach_with(|| format!("symbol: {symbol}"))?;

        let closes = chart.into_daily_closes();
        debug!(symbol, bars = closes.len(), "yahoo chart fetched");
        Ok(closes)
    }
}

impl PriceSource for YahooSource {
    fn name(&self) -> &str {
        SOURCE_NAME
    }

    fn fetch_price(&self) -> BoxFuture<'_, Result<f64, Report<FetchError>>> {
        Box::pin(async move {
            let params = [
                ("range", CURRENT_RANGE.to_owned()),
                ("interval", DAILY_INTERVAL.to_owned()),
            ];

            let base = self.fetch_closes(&self.symbol, &params).await?;
            let base_close = last_close(&base, &self.symbol)?;

            let price = match &self.fx_symbol {
                Some(fx_symbol) => {
                    let fx = self.fetch_closes(fx_symbol, &params).await?;
                    let rate = last_close(&fx, fx_symbol)?;
                    info!(
                        symbol = %self.symbol,
                        quote = base_close,
                        fx_symbol = %fx_symbol,
                        rate,
                        "fetched quote and fx rate"
                    );
                    base_close / rate
                }
                None => base_close,
            };

            validate_reading(price)
        })
    }

    fn fetch_history(&self, days: u32) -> BoxFuture<'_, Result<Vec<PricePoint>, Report<FetchError>>> {
        Box::pin(async move {
            let end = Utc::now();
            let start = end - chrono::Duration::days(i64::from(days));
            let params = [
                ("period1", start.timestamp().to_string()),
                ("period2", end.timestamp().to_string()),
                ("interval", DAILY_INTERVAL.to_owned()),
            ];

            let base = self.fetch_closes(&self.symbol, &params).await?;
            let fx = match &self.fx_symbol {
                Some(fx_symbol) => Some(self.fetch_closes(fx_symbol, &params).await?),
                None => None,
            };

            let points = join_on_date(&base, fx.as_deref());
            if points.is_empty() {
                return Err(Report::new(FetchError::Unavailable {
                    source_name: SOURCE_NAME.into(),
                    symbol: self.symbol.clone(),
                }));
            }
            Ok(points)
        })
    }
}

fn request_error() -> FetchError {
    FetchError::Request {
        source_name: SOURCE_NAME.into(),
    }
}

fn last_close(closes: &[(NaiveDate, f64)], symbol: &str) -> Result<f64, Report<FetchError>> {
    closes.last().map(|(_, close)| *close).ok_or_else(|| {
        Report::new(FetchError::Unavailable {
            source_name: SOURCE_NAME.into(),
            symbol: symbol.to_owned(),
        })
    })
}

fn validate_reading(price: f64) -> Result<f64, Report<FetchError>> {
    if price.is_finite() && price > 0.0 {
        Ok(price)
    } else {
        Err(Report::new(FetchError::InvalidReading { value: price }))
    }
}

/// Divide each base close by the FX close of the same day; days missing from
/// either series are dropped.
fn join_on_date(base: &[(NaiveDate, f64)], fx: Option<&[(NaiveDate, f64)]>) -> Vec<PricePoint> {
    let base: BTreeMap<NaiveDate, f64> = base.iter().copied().collect();
    let Some(fx) = fx else {
        return base
            .into_iter()
            .map(|(date, price)| PricePoint { date, price })
            .collect();
    };
    let fx: BTreeMap<NaiveDate, f64> = fx.iter().copied().collect();

    base.into_iter()
        .filter_map(|(date, close)| {
            let rate = fx.get(&date)?;
            let price = close / rate;
            (price.is_finite() && price > 0.0).then_some(PricePoint { date, price })
        })
        .collect()
}

// ── Chart API response types ──────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
struct ChartResponse {
    chart: Chart,
}

#[derive(Debug, Deserialize)]
struct Chart {
    #[serde(default)]
    result: Option<Vec<ChartResult>>,
}

#[derive(Debug, Deserialize)]
struct ChartResult {
    #[serde(default)]
    timestamp: Vec<i64>,
    indicators: Indicators,
}

#[derive(Debug, Deserialize)]
struct Indicators {
    #[serde(default)]
    quote: Vec<Quote>,
}

#[derive(Debug, Deserialize)]
struct Quote {
    #[serde(default)]
    close: Vec<Option<f64>>,
}

impl ChartResponse {
    /// Non-null finite closes keyed by UTC date, oldest first.
    fn into_daily_closes(self) -> Vec<(NaiveDate, f64)> {
        let Some(result) = self.chart.result.and_then(|r| r.into_iter().next()) else {
            return Vec::new();
        };
        let Some(quote) = result.indicators.quote.into_iter().next() else {
            return Vec::new();
        };

        result
            .timestamp
            .iter()
            .zip(quote.close)
            .filter_map(|(ts, close)| {
                let close = close.filter(|c| c.is_finite())?;
                let date = DateTime::from_timestamp(*ts, 0)?.date_naive();
                Some((date, close))
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn day(d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2026, 3, d).unwrap()
    }

    const SAMPLE: &str = r#"{
        "chart": {
            "result": [{
                "meta": {"symbol": "GC=F", "currency": "USD"},
                "timestamp": [1772409600, 1772496000, 1772582400],
                "indicators": {
                    "quote": [{"close": [4410.5, null, 4432.25]}]
                }
            }],
            "error": null
        }
    }"#;

    #[test]
    fn chart_response_skips_null_closes() {
        let chart: ChartResponse = serde_json::from_str(SAMPLE).unwrap();
        let closes = chart.into_daily_closes();
        assert_eq!(closes.len(), 2);
        assert_eq!(closes[0], (day(2), 4410.5));
        assert_eq!(closes[1], (day(4), 4432.25));
    }

    #[test]
    fn chart_error_payload_yields_no_closes() {
        let json = r#"{"chart": {"result": null, "error": {"code": "Not Found"}}}"#;
        let chart: ChartResponse = serde_json::from_str(json).unwrap();
        assert!(chart.into_daily_closes().is_empty());
    }

    #[test]
    fn last_close_of_empty_series_is_unavailable() {
        let err = last_close(&[], "GC=F").unwrap_err();
        assert!(matches!(
            err.current_context(),
            FetchError::Unavailable { .. }
        ));
    }

    #[test]
    fn invalid_readings_rejected() {
        assert!(validate_reading(f64::NAN).is_err());
        assert!(validate_reading(f64::INFINITY).is_err());
        assert!(validate_reading(0.0).is_err());
        assert!(validate_reading(-3.0).is_err());
        assert_eq!(validate_reading(3999.5).unwrap(), 3999.5);
    }

    #[test]
    fn join_drops_days_missing_from_either_series() {
        let base = [(day(2), 4400.0), (day(3), 4420.0), (day(4), 4440.0)];
        let fx = [(day(2), 1.1), (day(4), 1.11)];

        let points = join_on_date(&base, Some(&fx));
        assert_eq!(points.len(), 2);
        assert_eq!(points[0].date, day(2));
        assert!((points[0].price - 4000.0).abs() < 1e-9);
        assert_eq!(points[1].date, day(4));
        assert!((points[1].price - 4000.0).abs() < 1e-9);
    }

    #[test]
    fn join_without_fx_keeps_base_prices() {
        let base = [(day(3), 4420.0), (day(2), 4400.0)];
        let points = join_on_date(&base, None);
        assert_eq!(
            points,
            vec![
                PricePoint { date: day(2), price: 4400.0 },
                PricePoint { date: day(3), price: 4420.0 },
            ]
        );
    }

    /// Integration test: requires network access. Run with `cargo test -- --ignored`
    #[tokio::test]
    #[ignore]
    async fn integration_fetch_price() {
        let source = YahooSource::new(&SourceConfig::default()).unwrap();
        let price = source.fetch_price().await.unwrap();
        assert!(price > 0.0);
    }

    /// Integration test: requires network access. Run with `cargo test -- --ignored`
    #[tokio::test]
    #[ignore]
    async fn integration_fetch_history() {
        let source = YahooSource::new(&SourceConfig::default()).unwrap();
        let points = source.fetch_history(30).await.unwrap();
        assert!(!points.is_empty());
        assert!(points.windows(2).all(|w| w[0].date < w[1].date));
    }
}
