use chrono::{DateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::CoinId;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Coin {
    pub id: CoinId,
    pub name: String,
    pub symbol: String,
    #[serde(default)]
    pub rank: u32,
    #[serde(default)]
    pub icon: Option<String>,
    #[serde(default)]
    pub price: f64,
    #[serde(default)]
    pub price_btc: Option<f64>,
    #[serde(default)]
    pub volume: Option<f64>,
    #[serde(default)]
    pub market_cap: Option<f64>,
    #[serde(default)]
    pub available_supply: Option<f64>,
    #[serde(default)]
    pub total_supply: Option<f64>,
    #[serde(default)]
    pub price_change1h: Option<f64>,
    #[serde(default)]
    pub price_change1d: Option<f64>,
    #[serde(default)]
    pub price_change1w: Option<f64>,
    #[serde(default)]
    pub website_url: Option<String>,
    #[serde(default)]
    pub twitter_url: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PricePoint {
    pub timestamp: DateTime<Utc>,
    pub price: f64,
}

impl PricePoint {
    /// Builds a point from one `[unix_seconds, price, ..]` chart row.
    ///
    /// Rows with fewer than two columns or an out-of-range timestamp are rejected.
    pub fn from_chart_row(row: &[f64]) -> Option<Self> {
        let (ts, price) = match row {
            [ts, price, ..] => (*ts, *price),
            _ => return None,
        };
        let timestamp = Utc.timestamp_opt(ts as i64, 0).single()?;
        Some(Self { timestamp, price })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Article {
    pub id: String,
    pub title: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub source: Option<String>,
    #[serde(default)]
    pub link: Option<String>,
    #[serde(default, rename = "imgURL")]
    pub image_url: Option<String>,
    /// Milliseconds since the epoch, as served by the API.
    #[serde(default)]
    pub feed_date: Option<i64>,
}

impl Article {
    pub fn published_at(&self) -> Option<DateTime<Utc>> {
        self.feed_date
            .and_then(|ms| Utc.timestamp_millis_opt(ms).single())
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct CoinsResponse {
    pub coins: Vec<Coin>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CoinResponse {
    pub coin: Coin,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ChartResponse {
    pub chart: Vec<Vec<f64>>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct NewsResponse {
    pub news: Vec<Article>,
}

/// Chart window accepted by the charts endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChartPeriod {
    Day,
    Week,
    Month,
    ThreeMonths,
    SixMonths,
    Year,
    All,
}

impl ChartPeriod {
    /// Smallest period covering `days`.
    pub fn covering_days(days: u32) -> Self {
        match days {
            0..=1 => Self::Day,
            2..=7 => Self::Week,
            8..=30 => Self::Month,
            31..=90 => Self::ThreeMonths,
            91..=180 => Self::SixMonths,
            181..=365 => Self::Year,
            _ => Self::All,
        }
    }

    pub fn as_query(self) -> &'static str {
        match self {
            Self::Day => "24h",
            Self::Week => "1w",
            Self::Month => "1m",
            Self::ThreeMonths => "3m",
            Self::SixMonths => "6m",
            Self::Year => "1y",
            Self::All => "all",
        }
    }
}
