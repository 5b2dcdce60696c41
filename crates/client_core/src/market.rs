//! Coin list, coin detail, chart and news screens.

use std::{sync::Arc, time::Duration};

use async_trait::async_trait;
use shared::{
    domain::CoinId,
    protocol::{Article, Coin, PricePoint},
};

use crate::{
    coordinator::{Action, CallContext, Coordinator, Dispatch, DispatchPolicy, RetryPolicy},
    error::{ClientError, ErrorInfo},
    state::StateReader,
    validation, CoinApi,
};

const MARKET_RETRY: RetryPolicy = RetryPolicy::network(3, Duration::from_millis(500));

pub struct LoadCoins {
    api: Arc<dyn CoinApi>,
}

impl LoadCoins {
    pub fn new(api: Arc<dyn CoinApi>) -> Self {
        Self { api }
    }
}

#[async_trait]
impl Action for LoadCoins {
    type Input = u32;
    type Output = Vec<Coin>;

    const KIND: &'static str = "load_coins";
    const POLICY: DispatchPolicy = DispatchPolicy::Supersede;
    const RETRY: RetryPolicy = MARKET_RETRY;

    async fn execute(&self, _ctx: &CallContext, limit: &u32) -> Result<Vec<Coin>, ClientError> {
        self.api.get_coins(*limit).await
    }
}

pub struct LoadCoin {
    api: Arc<dyn CoinApi>,
}

impl LoadCoin {
    pub fn new(api: Arc<dyn CoinApi>) -> Self {
        Self { api }
    }
}

#[async_trait]
impl Action for LoadCoin {
    type Input = CoinId;
    type Output = Coin;

    const KIND: &'static str = "load_coin";
    const POLICY: DispatchPolicy = DispatchPolicy::Supersede;
    const RETRY: RetryPolicy = MARKET_RETRY;

    fn validate(&self, input: &CoinId) -> Result<(), ErrorInfo> {
        validation::validate_coin_id(input.as_str())
    }

    async fn execute(&self, _ctx: &CallContext, input: &CoinId) -> Result<Coin, ClientError> {
        self.api.get_coin(input).await
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChartRequest {
    pub coin_id: CoinId,
    pub days: u32,
}

pub struct LoadChart {
    api: Arc<dyn CoinApi>,
}

impl LoadChart {
    pub fn new(api: Arc<dyn CoinApi>) -> Self {
        Self { api }
    }
}

#[async_trait]
impl Action for LoadChart {
    type Input = ChartRequest;
    type Output = Vec<PricePoint>;

    const KIND: &'static str = "load_chart";
    const POLICY: DispatchPolicy = DispatchPolicy::Supersede;
    const RETRY: RetryPolicy = MARKET_RETRY;

    fn validate(&self, input: &ChartRequest) -> Result<(), ErrorInfo> {
        validation::validate_coin_id(input.coin_id.as_str())?;
        validation::validate_days(input.days)
    }

    async fn execute(
        &self,
        _ctx: &CallContext,
        input: &ChartRequest,
    ) -> Result<Vec<PricePoint>, ClientError> {
        self.api.get_chart(&input.coin_id, input.days).await
    }
}

pub struct LoadNews {
    api: Arc<dyn CoinApi>,
}

impl LoadNews {
    pub fn new(api: Arc<dyn CoinApi>) -> Self {
        Self { api }
    }
}

#[async_trait]
impl Action for LoadNews {
    type Input = u32;
    type Output = Vec<Article>;

    const KIND: &'static str = "load_news";
    const POLICY: DispatchPolicy = DispatchPolicy::Supersede;
    const RETRY: RetryPolicy = MARKET_RETRY;

    async fn execute(&self, _ctx: &CallContext, limit: &u32) -> Result<Vec<Article>, ClientError> {
        self.api.get_news(*limit).await
    }
}

pub struct MarketController {
    coins: Coordinator<LoadCoins>,
    coin: Coordinator<LoadCoin>,
    chart: Coordinator<LoadChart>,
    news: Coordinator<LoadNews>,
}

impl MarketController {
    pub fn new(api: Arc<dyn CoinApi>) -> Self {
        Self {
            coins: Coordinator::new(LoadCoins::new(Arc::clone(&api))),
            coin: Coordinator::new(LoadCoin::new(Arc::clone(&api))),
            chart: Coordinator::new(LoadChart::new(Arc::clone(&api))),
            news: Coordinator::new(LoadNews::new(api)),
        }
    }

    pub fn load_coins(&self, limit: u32) -> Dispatch {
        self.coins.dispatch(limit)
    }

    pub fn load_coin(&self, coin_id: CoinId) -> Dispatch {
        self.coin.dispatch(coin_id)
    }

    pub fn load_chart(&self, coin_id: CoinId, days: u32) -> Dispatch {
        self.chart.dispatch(ChartRequest { coin_id, days })
    }

    pub fn load_news(&self, limit: u32) -> Dispatch {
        self.news.dispatch(limit)
    }

    pub fn coins(&self) -> StateReader<Vec<Coin>> {
        self.coins.state()
    }

    pub fn coin(&self) -> StateReader<Coin> {
        self.coin.state()
    }

    pub fn chart(&self) -> StateReader<Vec<PricePoint>> {
        self.chart.state()
    }

    pub fn news(&self) -> StateReader<Vec<Article>> {
        self.news.state()
    }
}
