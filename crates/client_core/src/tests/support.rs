//! Scriptable collaborators shared by the unit tests.

use std::{
    collections::{HashMap, VecDeque},
    sync::{
        atomic::{AtomicBool, AtomicI64, Ordering},
        Arc, Mutex,
    },
    time::Duration,
};

use async_trait::async_trait;
use chrono::{TimeZone, Utc};
use shared::{
    domain::{CoinId, FavoriteEntry, UserId, UserProfile},
    error::ErrorCode,
    protocol::{Article, Coin, PricePoint},
};
use tokio::sync::Semaphore;

use crate::{
    error::ClientError,
    local::{ACCOUNT_EXISTS, INVALID_CREDENTIALS},
    state::{AsyncResult, StateSubscription},
    AuthBackend, CoinApi,
};

/// Lets a test observe that a call started and decide when it may finish.
pub(crate) struct Hold {
    enabled: AtomicBool,
    started: Semaphore,
    release: Semaphore,
}

impl Default for Hold {
    fn default() -> Self {
        Self {
            enabled: AtomicBool::new(false),
            started: Semaphore::new(0),
            release: Semaphore::new(0),
        }
    }
}

impl Hold {
    /// Holds every later call until released; forgets calls that already started.
    pub(crate) fn engage(&self) {
        while let Ok(permit) = self.started.try_acquire() {
            permit.forget();
        }
        self.enabled.store(true, Ordering::SeqCst);
    }

    pub(crate) fn release(&self, calls: usize) {
        self.release.add_permits(calls);
    }

    pub(crate) async fn wait_started(&self) {
        tokio::time::timeout(Duration::from_secs(5), self.started.acquire())
            .await
            .expect("call never started")
            .expect("semaphore closed")
            .forget();
    }

    async fn enter(&self) {
        self.started.add_permits(1);
        if self.enabled.load(Ordering::SeqCst) {
            self.release
                .acquire()
                .await
                .expect("semaphore closed")
                .forget();
        }
    }
}

#[derive(Default)]
struct CallLog {
    calls: Mutex<Vec<&'static str>>,
    failures: Mutex<VecDeque<ClientError>>,
}

impl CallLog {
    fn record(&self, op: &'static str) {
        self.calls.lock().unwrap().push(op);
    }

    fn count(&self, op: &str) -> usize {
        self.calls.lock().unwrap().iter().filter(|c| **c == op).count()
    }

    fn total(&self) -> usize {
        self.calls.lock().unwrap().len()
    }

    fn next_failure(&self) -> Option<ClientError> {
        self.failures.lock().unwrap().pop_front()
    }
}

#[derive(Default)]
pub(crate) struct MockCoinApi {
    pub(crate) hold: Hold,
    log: CallLog,
}

impl MockCoinApi {
    pub(crate) fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Queues failures returned by the next calls, in order.
    pub(crate) fn fail_with(&self, errors: impl IntoIterator<Item = ClientError>) {
        self.log.failures.lock().unwrap().extend(errors);
    }

    pub(crate) fn calls(&self, op: &str) -> usize {
        self.log.count(op)
    }

    async fn call(&self, op: &'static str) -> Result<(), ClientError> {
        self.log.record(op);
        self.hold.enter().await;
        match self.log.next_failure() {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }
}

#[async_trait]
impl CoinApi for MockCoinApi {
    async fn get_coins(&self, limit: u32) -> Result<Vec<Coin>, ClientError> {
        self.call("get_coins").await?;
        Ok((0..limit).map(|n| coin(&format!("coin-{n}"))).collect())
    }

    async fn get_coin(&self, id: &CoinId) -> Result<Coin, ClientError> {
        self.call("get_coin").await?;
        Ok(coin(id.as_str()))
    }

    async fn get_chart(&self, _id: &CoinId, days: u32) -> Result<Vec<PricePoint>, ClientError> {
        self.call("get_chart").await?;
        Ok((0..days)
            .map(|day| PricePoint {
                timestamp: Utc
                    .timestamp_opt(1_700_000_000 + i64::from(day) * 86_400, 0)
                    .unwrap(),
                price: 100.0 + f64::from(day),
            })
            .collect())
    }

    async fn get_news(&self, limit: u32) -> Result<Vec<Article>, ClientError> {
        self.call("get_news").await?;
        Ok((0..limit)
            .map(|n| Article {
                id: format!("article-{n}"),
                title: format!("Headline {n}"),
                description: None,
                source: Some("wire".to_string()),
                link: None,
                image_url: None,
                feed_date: Some(1_700_000_000_000),
            })
            .collect())
    }
}

#[derive(Default)]
pub(crate) struct MockAuth {
    pub(crate) hold: Hold,
    log: CallLog,
    accounts: Mutex<HashMap<String, (UserId, String)>>,
    favorites: Mutex<HashMap<UserId, Vec<FavoriteEntry>>>,
    next_id: AtomicI64,
}

impl MockAuth {
    pub(crate) fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub(crate) fn with_account(email: &str, password: &str) -> Arc<Self> {
        let auth = Self::default();
        auth.insert_account(email, password);
        Arc::new(auth)
    }

    pub(crate) fn fail_with(&self, errors: impl IntoIterator<Item = ClientError>) {
        self.log.failures.lock().unwrap().extend(errors);
    }

    pub(crate) fn calls(&self, op: &str) -> usize {
        self.log.count(op)
    }

    pub(crate) fn total_calls(&self) -> usize {
        self.log.total()
    }

    pub(crate) fn favorites_of(&self, user_id: UserId) -> Vec<CoinId> {
        self.favorites
            .lock()
            .unwrap()
            .get(&user_id)
            .map(|entries| entries.iter().map(|e| e.coin_id.clone()).collect())
            .unwrap_or_default()
    }

    fn insert_account(&self, email: &str, password: &str) -> UserId {
        let user_id = UserId(self.next_id.fetch_add(1, Ordering::SeqCst) + 1);
        self.accounts
            .lock()
            .unwrap()
            .insert(email.to_string(), (user_id, password.to_string()));
        user_id
    }

    async fn call(&self, op: &'static str) -> Result<(), ClientError> {
        self.log.record(op);
        self.hold.enter().await;
        match self.log.next_failure() {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }
}

#[async_trait]
impl AuthBackend for MockAuth {
    async fn sign_up(&self, email: &str, password: &str) -> Result<UserId, ClientError> {
        self.call("sign_up").await?;
        if self.accounts.lock().unwrap().contains_key(email) {
            return Err(ClientError::backend(ErrorCode::Conflict, ACCOUNT_EXISTS));
        }
        Ok(self.insert_account(email, password))
    }

    async fn sign_in(&self, email: &str, password: &str) -> Result<UserProfile, ClientError> {
        self.call("sign_in").await?;
        match self.accounts.lock().unwrap().get(email) {
            Some((user_id, stored)) if stored == password => Ok(profile(*user_id, email)),
            _ => Err(ClientError::backend(
                ErrorCode::Unauthorized,
                INVALID_CREDENTIALS,
            )),
        }
    }

    async fn update_profile_picture(
        &self,
        user_id: UserId,
        mime_type: &str,
        _bytes: &[u8],
    ) -> Result<String, ClientError> {
        self.call("update_profile_picture").await?;
        let ext = mime_type.trim_start_matches("image/");
        Ok(format!("https://cdn.test/pictures/{}.{ext}", user_id.0))
    }

    async fn get_favorites(&self, user_id: UserId) -> Result<Vec<FavoriteEntry>, ClientError> {
        self.call("get_favorites").await?;
        Ok(self
            .favorites
            .lock()
            .unwrap()
            .get(&user_id)
            .cloned()
            .unwrap_or_default())
    }

    async fn add_favorite(&self, user_id: UserId, coin_id: &CoinId) -> Result<(), ClientError> {
        self.call("add_favorite").await?;
        let mut favorites = self.favorites.lock().unwrap();
        let entries = favorites.entry(user_id).or_default();
        if !entries.iter().any(|e| &e.coin_id == coin_id) {
            entries.push(FavoriteEntry {
                coin_id: coin_id.clone(),
                added_at: Utc::now(),
            });
        }
        Ok(())
    }

    async fn remove_favorite(&self, user_id: UserId, coin_id: &CoinId) -> Result<(), ClientError> {
        self.call("remove_favorite").await?;
        if let Some(entries) = self.favorites.lock().unwrap().get_mut(&user_id) {
            entries.retain(|e| &e.coin_id != coin_id);
        }
        Ok(())
    }
}

pub(crate) fn coin(id: &str) -> Coin {
    Coin {
        id: CoinId::new(id),
        name: id.to_uppercase(),
        symbol: id.chars().take(3).collect::<String>().to_uppercase(),
        rank: 1,
        icon: None,
        price: 42.0,
        price_btc: None,
        volume: None,
        market_cap: None,
        available_supply: None,
        total_supply: None,
        price_change1h: None,
        price_change1d: None,
        price_change1w: None,
        website_url: None,
        twitter_url: None,
    }
}

pub(crate) fn profile(user_id: UserId, email: &str) -> UserProfile {
    UserProfile {
        user_id,
        email: email.to_string(),
        display_name: None,
        picture_url: None,
        premium: false,
    }
}

/// Smallest valid PNG signature plus IHDR start; enough for format sniffing.
pub(crate) fn png_bytes() -> Vec<u8> {
    let mut bytes = vec![0x89, b'P', b'N', b'G', 0x0D, 0x0A, 0x1A, 0x0A];
    bytes.extend_from_slice(&[0, 0, 0, 13, b'I', b'H', b'D', b'R']);
    bytes.extend_from_slice(&[0; 17]);
    bytes
}

pub(crate) async fn next_state<T>(sub: &mut StateSubscription<T>) -> AsyncResult<T> {
    tokio::time::timeout(Duration::from_secs(5), sub.next())
        .await
        .expect("no state change within 5s")
        .expect("container disposed")
}

pub(crate) async fn settled<T>(sub: &mut StateSubscription<T>) -> AsyncResult<T> {
    tokio::time::timeout(Duration::from_secs(5), sub.next_settled())
        .await
        .expect("no settled state within 5s")
        .expect("container disposed")
}
