//! [`CoinApi`] over the public coinstats REST API.

use std::time::Duration;

use anyhow::Context;
use async_trait::async_trait;
use reqwest::{Client, Response};
use serde::de::DeserializeOwned;
use shared::{
    domain::CoinId,
    error::ErrorCode,
    protocol::{
        Article, ChartPeriod, ChartResponse, Coin, CoinResponse, CoinsResponse, NewsResponse,
        PricePoint,
    },
};
use tracing::{debug, warn};
use url::Url;

use crate::{error::ClientError, CoinApi};

pub struct HttpCoinApi {
    http: Client,
    base_url: Url,
    currency: String,
}

impl HttpCoinApi {
    pub fn new(
        base_url: &str,
        timeout: Duration,
        currency: impl Into<String>,
    ) -> anyhow::Result<Self> {
        let mut base_url =
            Url::parse(base_url).with_context(|| format!("invalid api base url '{base_url}'"))?;
        if !base_url.path().ends_with('/') {
            let path = format!("{}/", base_url.path());
            base_url.set_path(&path);
        }
        let http = Client::builder()
            .timeout(timeout)
            .build()
            .context("failed to build http client")?;
        Ok(Self {
            http,
            base_url,
            currency: currency.into(),
        })
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    /// Appends `segments` to the base path, percent-encoding each one so an id
    /// can never add path levels or query parameters.
    fn endpoint(&self, segments: &[&str]) -> Result<Url, ClientError> {
        if let Some(dots) = segments.iter().find(|s| matches!(**s, "" | "." | "..")) {
            return Err(ClientError::backend(
                ErrorCode::Validation,
                format!("invalid path segment '{dots}'"),
            ));
        }
        let mut url = self.base_url.clone();
        url.path_segments_mut()
            .map_err(|()| anyhow::anyhow!("api base url '{}' cannot hold a path", self.base_url))?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    async fn get_json<T: DeserializeOwned>(
        &self,
        segments: &[&str],
        query: &[(&str, String)],
    ) -> Result<T, ClientError> {
        let url = self.endpoint(segments)?;
        debug!(%url, "http: GET");
        let response = self
            .http
            .get(url.clone())
            .query(query)
            .send()
            .await
            .map_err(map_transport)?;
        let response = check_status(response).await?;
        let body = response.bytes().await.map_err(map_transport)?;
        serde_json::from_slice(&body).map_err(|err| {
            warn!(%url, error = %err, "http: undecodable response");
            ClientError::InvalidResponse(err.to_string())
        })
    }
}

#[async_trait]
impl CoinApi for HttpCoinApi {
    async fn get_coins(&self, limit: u32) -> Result<Vec<Coin>, ClientError> {
        let body: CoinsResponse = self
            .get_json(
                &["coins"],
                &[
                    ("skip", "0".to_string()),
                    ("limit", limit.to_string()),
                    ("currency", self.currency.clone()),
                ],
            )
            .await?;
        Ok(body.coins)
    }

    async fn get_coin(&self, id: &CoinId) -> Result<Coin, ClientError> {
        let body: CoinResponse = self
            .get_json(&["coins", id.as_str()], &[("currency", self.currency.clone())])
            .await?;
        Ok(body.coin)
    }

    async fn get_chart(&self, id: &CoinId, days: u32) -> Result<Vec<PricePoint>, ClientError> {
        let period = ChartPeriod::covering_days(days);
        let body: ChartResponse = self
            .get_json(
                &["charts"],
                &[
                    ("period", period.as_query().to_string()),
                    ("coinId", id.to_string()),
                ],
            )
            .await?;
        let total = body.chart.len();
        let points: Vec<PricePoint> = body
            .chart
            .iter()
            .filter_map(|row| PricePoint::from_chart_row(row))
            .collect();
        if points.len() != total {
            warn!(coin_id = %id, skipped = total - points.len(), "http: dropped malformed chart rows");
        }
        Ok(points)
    }

    async fn get_news(&self, limit: u32) -> Result<Vec<Article>, ClientError> {
        let body: NewsResponse = self
            .get_json(
                &["news"],
                &[("skip", "0".to_string()), ("limit", limit.to_string())],
            )
            .await?;
        Ok(body.news)
    }
}

fn map_transport(err: reqwest::Error) -> ClientError {
    if err.is_timeout() {
        ClientError::Timeout
    } else {
        ClientError::Transport(err)
    }
}

async fn check_status(response: Response) -> Result<Response, ClientError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().await.unwrap_or_default();
    let message = rejection_message(&body).unwrap_or_else(|| {
        status
            .canonical_reason()
            .unwrap_or("request failed")
            .to_string()
    });
    warn!(status = status.as_u16(), %message, "http: request rejected");
    Err(ClientError::backend(
        ErrorCode::from_http_status(status.as_u16()),
        message,
    ))
}

const MAX_PLAIN_MESSAGE: usize = 160;

/// A user-presentable message from an error body: the `message` (or `error`)
/// field of a JSON object, or short single-line plain text. Markup and long
/// bodies yield `None`.
fn rejection_message(body: &str) -> Option<String> {
    let body = body.trim();
    if body.is_empty() {
        return None;
    }
    if let Ok(value) = serde_json::from_str::<serde_json::Value>(body) {
        return ["message", "error"]
            .iter()
            .find_map(|key| value.get(key).and_then(|v| v.as_str()))
            .map(str::trim)
            .filter(|message| !message.is_empty())
            .map(str::to_string);
    }
    let plain = body.len() <= MAX_PLAIN_MESSAGE && !body.contains(['<', '>', '\n', '{']);
    plain.then(|| body.to_string())
}

#[cfg(test)]
#[path = "tests/http_tests.rs"]
mod tests;
