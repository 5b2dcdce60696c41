use std::{
    collections::HashMap,
    sync::{Arc, Mutex},
};

use anyhow::Result;
use axum::{
    extract::{Path, Query, State},
    http::{StatusCode, Uri},
    response::{IntoResponse, Response as AxumResponse},
    routing::get,
    Json, Router,
};
use serde_json::{json, Value};
use tokio::net::TcpListener;

use super::*;
use crate::error::{ErrorInfo, ErrorKind};

type Params = HashMap<String, String>;

#[derive(Clone, Default)]
struct ServerState {
    requests: Arc<Mutex<Vec<(String, Params)>>>,
    paths: Arc<Mutex<Vec<String>>>,
}

impl ServerState {
    fn record(&self, route: &str, params: Params) {
        self.requests.lock().unwrap().push((route.to_string(), params));
    }

    fn record_path(&self, uri: &Uri) {
        self.paths.lock().unwrap().push(uri.to_string());
    }

    fn paths(&self) -> Vec<String> {
        self.paths.lock().unwrap().clone()
    }

    fn last(&self, route: &str) -> Option<Params> {
        self.requests
            .lock()
            .unwrap()
            .iter()
            .rev()
            .find(|(r, _)| r == route)
            .map(|(_, p)| p.clone())
    }
}

fn coin_json(id: &str, rank: u32) -> Value {
    json!({
        "id": id,
        "name": id.to_uppercase(),
        "symbol": "SYM",
        "rank": rank,
        "icon": format!("https://static.test/{id}.png"),
        "price": 1.5,
        "priceBtc": 0.0001,
        "priceChange1d": -2.5,
        "websiteUrl": "https://example.org"
    })
}

async fn handle_coins(State(state): State<ServerState>, Query(params): Query<Params>) -> Json<Value> {
    let limit: u32 = params
        .get("limit")
        .and_then(|l| l.parse().ok())
        .unwrap_or_default();
    state.record("coins", params);
    let coins: Vec<Value> = (0..limit)
        .map(|n| coin_json(&format!("coin-{n}"), n + 1))
        .collect();
    Json(json!({ "coins": coins }))
}

async fn handle_coin(
    State(state): State<ServerState>,
    Path(id): Path<String>,
    Query(params): Query<Params>,
    uri: Uri,
) -> AxumResponse {
    state.record_path(&uri);
    state.record("coin", params);
    if id == "missing" {
        return (StatusCode::NOT_FOUND, "coin not found").into_response();
    }
    Json(json!({ "coin": coin_json(&id, 1) })).into_response()
}

async fn handle_charts(State(state): State<ServerState>, Query(params): Query<Params>) -> Json<Value> {
    state.record("charts", params);
    Json(json!({
        "chart": [
            [1_700_000_000.0, 100.5, 1.0, 2.0],
            [1_700_086_400.0, 101.0],
            [5.0]
        ]
    }))
}

async fn handle_news(State(state): State<ServerState>, Query(params): Query<Params>) -> Json<Value> {
    state.record("news", params);
    Json(json!({
        "news": [{
            "id": "n1",
            "title": "Bitcoin moves",
            "source": "wire",
            "link": "https://news.test/n1",
            "imgURL": "https://news.test/n1.png",
            "feedDate": 1_700_000_000_000i64
        }]
    }))
}

async fn handle_unavailable() -> StatusCode {
    StatusCode::SERVICE_UNAVAILABLE
}

async fn handle_unrouted(State(state): State<ServerState>, uri: Uri) -> StatusCode {
    state.record_path(&uri);
    StatusCode::NOT_FOUND
}

async fn handle_html_error() -> AxumResponse {
    (
        StatusCode::BAD_GATEWAY,
        "<html><body><h1>502 Bad Gateway</h1><hr>nginx</body></html>",
    )
        .into_response()
}

async fn handle_json_error() -> AxumResponse {
    (
        StatusCode::BAD_REQUEST,
        Json(json!({ "status": 400, "message": "limit must be at most 1000" })),
    )
        .into_response()
}

async fn handle_garbage() -> &'static str {
    "<html>not json</html>"
}

async fn handle_slow() -> Json<Value> {
    tokio::time::sleep(Duration::from_secs(2)).await;
    Json(json!({ "news": [] }))
}

async fn spawn_market_server() -> Result<(String, ServerState)> {
    std::env::set_var("NO_PROXY", "127.0.0.1,localhost");
    let listener = TcpListener::bind("127.0.0.1:0").await?;
    let addr = listener.local_addr()?;
    let state = ServerState::default();
    let app = Router::new()
        .route("/v1/coins", get(handle_coins))
        .route("/v1/coins/:id", get(handle_coin))
        .route("/v1/charts", get(handle_charts))
        .route("/v1/news", get(handle_news))
        .route("/down/coins", get(handle_unavailable))
        .route("/garbage/coins", get(handle_garbage))
        .route("/slow/news", get(handle_slow))
        .route("/html/coins", get(handle_html_error))
        .route("/json/coins", get(handle_json_error))
        .fallback(handle_unrouted)
        .with_state(state.clone());
    tokio::spawn(async move {
        let _ = axum::serve(listener, app).await;
    });
    Ok((format!("http://{addr}"), state))
}

fn api(base: &str, path: &str) -> Result<HttpCoinApi> {
    HttpCoinApi::new(&format!("{base}/{path}"), Duration::from_secs(5), "EUR")
}

#[test]
fn base_url_gets_a_trailing_slash() -> Result<()> {
    let api = HttpCoinApi::new("https://api.coinstats.app/public/v1", Duration::from_secs(1), "USD")?;
    assert_eq!(api.base_url().as_str(), "https://api.coinstats.app/public/v1/");
    assert!(HttpCoinApi::new("not a url", Duration::from_secs(1), "USD").is_err());
    Ok(())
}

#[tokio::test]
async fn coins_request_carries_limit_and_currency() -> Result<()> {
    let (base, state) = spawn_market_server().await?;
    let api = api(&base, "v1")?;

    let coins = api.get_coins(3).await?;
    assert_eq!(coins.len(), 3);
    assert_eq!(coins[0].id, CoinId::new("coin-0"));
    assert_eq!(coins[0].price_change1d, Some(-2.5));

    let params = state.last("coins").expect("coins request");
    assert_eq!(params.get("limit").map(String::as_str), Some("3"));
    assert_eq!(params.get("skip").map(String::as_str), Some("0"));
    assert_eq!(params.get("currency").map(String::as_str), Some("EUR"));
    Ok(())
}

#[tokio::test]
async fn single_coin_and_missing_coin() -> Result<()> {
    let (base, _state) = spawn_market_server().await?;
    let api = api(&base, "v1")?;

    let coin = api.get_coin(&CoinId::new("bitcoin")).await?;
    assert_eq!(coin.name, "BITCOIN");

    let err = api
        .get_coin(&CoinId::new("missing"))
        .await
        .expect_err("404 must fail");
    let info = ErrorInfo::classify(&err);
    assert_eq!(info.kind(), ErrorKind::Backend);
    assert_eq!(info.message(), "coin not found");
    Ok(())
}

#[tokio::test]
async fn coin_ids_stay_inside_one_path_segment() -> Result<()> {
    let (base, state) = spawn_market_server().await?;
    let api = api(&base, "v1")?;

    let climbing = api.get_coin(&CoinId::new("../../admin")).await?;
    assert_eq!(climbing.id, CoinId::new("../../admin"));
    let injected = api.get_coin(&CoinId::new("btc?limit=9#x")).await?;
    assert_eq!(injected.id, CoinId::new("btc?limit=9#x"));

    assert_eq!(
        state.paths(),
        vec![
            "/v1/coins/..%2F..%2Fadmin?currency=EUR".to_string(),
            "/v1/coins/btc%3Flimit=9%23x?currency=EUR".to_string(),
        ]
    );
    let params = state.last("coin").expect("coin request");
    assert_eq!(params.len(), 1);

    let err = api
        .get_coin(&CoinId::new(".."))
        .await
        .expect_err("dot segment must not be sent");
    assert_eq!(ErrorInfo::classify(&err).kind(), ErrorKind::Validation);
    assert_eq!(state.paths().len(), 2);
    Ok(())
}

#[tokio::test]
async fn chart_maps_days_to_period_and_drops_short_rows() -> Result<()> {
    let (base, state) = spawn_market_server().await?;
    let api = api(&base, "v1")?;

    let points = api.get_chart(&CoinId::new("ethereum"), 7).await?;
    assert_eq!(points.len(), 2);
    assert_eq!(points[0].price, 100.5);
    assert_eq!(points[1].timestamp.timestamp(), 1_700_086_400);

    let params = state.last("charts").expect("charts request");
    assert_eq!(params.get("period").map(String::as_str), Some("1w"));
    assert_eq!(params.get("coinId").map(String::as_str), Some("ethereum"));
    Ok(())
}

#[tokio::test]
async fn news_decodes_articles() -> Result<()> {
    let (base, state) = spawn_market_server().await?;
    let api = api(&base, "v1")?;

    let news = api.get_news(10).await?;
    assert_eq!(news.len(), 1);
    assert_eq!(news[0].image_url.as_deref(), Some("https://news.test/n1.png"));
    assert_eq!(
        news[0].published_at().map(|at| at.timestamp()),
        Some(1_700_000_000)
    );
    let params = state.last("news").expect("news request");
    assert_eq!(params.get("limit").map(String::as_str), Some("10"));
    Ok(())
}

#[tokio::test]
async fn unavailable_backend_is_a_network_failure() -> Result<()> {
    let (base, _state) = spawn_market_server().await?;
    let err = api(&base, "down")?
        .get_coins(1)
        .await
        .expect_err("503 must fail");
    assert!(matches!(err, ClientError::Backend(ref api) if api.code == ErrorCode::Unavailable));
    assert_eq!(ErrorInfo::classify(&err).kind(), ErrorKind::Network);
    Ok(())
}

#[tokio::test]
async fn markup_error_bodies_fall_back_to_the_status_reason() -> Result<()> {
    let (base, _state) = spawn_market_server().await?;
    let err = api(&base, "html")?
        .get_coins(1)
        .await
        .expect_err("502 must fail");
    let info = ErrorInfo::classify(&err);
    assert_eq!(info.message(), "Bad Gateway");
    Ok(())
}

#[tokio::test]
async fn json_error_bodies_surface_their_message() -> Result<()> {
    let (base, _state) = spawn_market_server().await?;
    let err = api(&base, "json")?
        .get_coins(1)
        .await
        .expect_err("400 must fail");
    assert!(matches!(err, ClientError::Backend(ref api) if api.code == ErrorCode::Validation));
    assert_eq!(ErrorInfo::classify(&err).message(), "limit must be at most 1000");
    Ok(())
}

#[test]
fn long_or_multiline_bodies_are_not_shown() {
    assert_eq!(rejection_message("  coin not found \n"), Some("coin not found".to_string()));
    assert_eq!(rejection_message(&"x".repeat(400)), None);
    assert_eq!(rejection_message("line one\nline two"), None);
    assert_eq!(rejection_message(r#"{"error":"rate limited"}"#), Some("rate limited".to_string()));
    assert_eq!(rejection_message(r#"{"code":42}"#), None);
    assert_eq!(rejection_message(""), None);
}

#[tokio::test]
async fn undecodable_body_is_an_invalid_response() -> Result<()> {
    let (base, _state) = spawn_market_server().await?;
    let err = api(&base, "garbage")?
        .get_coins(1)
        .await
        .expect_err("html must fail");
    assert!(matches!(err, ClientError::InvalidResponse(_)));
    assert_eq!(ErrorInfo::classify(&err).kind(), ErrorKind::Unknown);
    Ok(())
}

#[tokio::test]
async fn slow_responses_time_out() -> Result<()> {
    let (base, _state) = spawn_market_server().await?;
    let api = HttpCoinApi::new(&format!("{base}/slow"), Duration::from_millis(200), "USD")?;
    let err = api.get_news(1).await.expect_err("must time out");
    assert!(matches!(err, ClientError::Timeout));
    assert_eq!(ErrorInfo::classify(&err).kind(), ErrorKind::Network);
    Ok(())
}

#[tokio::test]
async fn unreachable_host_is_a_network_failure() -> Result<()> {
    let listener = TcpListener::bind("127.0.0.1:0").await?;
    let addr = listener.local_addr()?;
    drop(listener);

    let api = HttpCoinApi::new(&format!("http://{addr}/v1"), Duration::from_secs(2), "USD")?;
    let err = api.get_coins(1).await.expect_err("nothing listening");
    assert_eq!(ErrorInfo::classify(&err).kind(), ErrorKind::Network);
    Ok(())
}
