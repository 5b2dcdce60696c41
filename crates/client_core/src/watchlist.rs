//! Favorites screen: the signed-in user's watchlist and favorite toggling.

use std::{sync::Arc, time::Duration};

use async_trait::async_trait;
use futures::future::try_join_all;
use shared::{
    domain::{CoinId, FavoriteEntry},
    protocol::Coin,
};
use tracing::debug;

use crate::{
    auth::Authenticator,
    coordinator::{Action, CallContext, Coordinator, Dispatch, DispatchPolicy, RetryPolicy},
    error::{ClientError, ErrorInfo},
    session::SessionGate,
    state::{AsyncResult, StateReader},
    validation, AuthBackend, CoinApi,
};

#[derive(Debug, Clone, PartialEq, Default)]
pub struct Watchlist {
    pub entries: Vec<FavoriteEntry>,
    /// Market data for each entry, in entry order.
    pub coins: Vec<Coin>,
}

impl Watchlist {
    pub fn contains(&self, coin_id: &CoinId) -> bool {
        self.entries.iter().any(|entry| &entry.coin_id == coin_id)
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FavoriteToggle {
    pub coin_id: CoinId,
    /// Whether the coin is a favorite after the toggle.
    pub favorite: bool,
}

pub struct ReloadWatchlist {
    backend: Arc<dyn AuthBackend>,
    api: Arc<dyn CoinApi>,
}

#[async_trait]
impl Action for ReloadWatchlist {
    type Input = ();
    type Output = Watchlist;

    const KIND: &'static str = "reload_watchlist";
    const POLICY: DispatchPolicy = DispatchPolicy::Supersede;
    const RETRY: RetryPolicy = RetryPolicy::network(3, Duration::from_millis(500));

    async fn execute(&self, ctx: &CallContext, _input: &()) -> Result<Watchlist, ClientError> {
        let user = ctx.require_user()?;
        let entries = self.backend.get_favorites(user.user_id).await?;
        let coins = try_join_all(entries.iter().map(|entry| self.api.get_coin(&entry.coin_id))).await?;
        debug!(user_id = user.user_id.0, count = entries.len(), "watchlist: loaded");
        Ok(Watchlist { entries, coins })
    }
}

pub struct ToggleFavorite {
    backend: Arc<dyn AuthBackend>,
}

#[async_trait]
impl Action for ToggleFavorite {
    type Input = CoinId;
    type Output = FavoriteToggle;

    const KIND: &'static str = "toggle_favorite";
    const POLICY: DispatchPolicy = DispatchPolicy::IgnoreWhileLoading;

    fn validate(&self, input: &CoinId) -> Result<(), ErrorInfo> {
        validation::validate_coin_id(input.as_str())
    }

    async fn execute(&self, ctx: &CallContext, input: &CoinId) -> Result<FavoriteToggle, ClientError> {
        let user = ctx.require_user()?;
        let favorites = self.backend.get_favorites(user.user_id).await?;
        let favorite = if favorites.iter().any(|entry| &entry.coin_id == input) {
            self.backend.remove_favorite(user.user_id, input).await?;
            false
        } else {
            self.backend.add_favorite(user.user_id, input).await?;
            true
        };
        debug!(user_id = user.user_id.0, coin_id = %input, favorite, "watchlist: toggled");
        Ok(FavoriteToggle {
            coin_id: input.clone(),
            favorite,
        })
    }
}

pub struct WatchlistController {
    reload: Coordinator<ReloadWatchlist>,
    toggle: Coordinator<ToggleFavorite>,
    gate: SessionGate,
}

impl WatchlistController {
    pub fn new(auth: &Authenticator, api: Arc<dyn CoinApi>) -> Self {
        let gate = auth.gate();
        let backend = Arc::clone(auth.backend());
        Self {
            reload: Coordinator::bound(
                ReloadWatchlist {
                    backend: Arc::clone(&backend),
                    api,
                },
                &gate,
            ),
            toggle: Coordinator::bound(ToggleFavorite { backend }, &gate),
            gate,
        }
    }

    /// Favoriting is only offered to signed-in users.
    pub fn can_edit(&self) -> bool {
        self.gate.is_authed()
    }

    pub fn refresh(&self) -> Dispatch {
        self.reload.dispatch(())
    }

    pub fn toggle(&self, coin_id: CoinId) -> Dispatch {
        self.toggle.dispatch(coin_id)
    }

    /// Latest known favorite state of `coin_id`; a finished toggle wins over the last reload.
    pub fn is_favorite(&self, coin_id: &CoinId) -> bool {
        if let AsyncResult::Success(toggle) = self.toggle.current() {
            if &toggle.coin_id == coin_id {
                return toggle.favorite;
            }
        }
        self.reload
            .current()
            .value()
            .is_some_and(|watchlist| watchlist.contains(coin_id))
    }

    pub fn watchlist(&self) -> StateReader<Watchlist> {
        self.reload.state()
    }

    pub fn toggle_state(&self) -> StateReader<FavoriteToggle> {
        self.toggle.state()
    }
}
