use std::sync::{Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;
use shared::{
    domain::{CoinId, FavoriteEntry, UserId, UserProfile},
    protocol::{Article, Coin, PricePoint},
};

pub mod auth;
pub mod coordinator;
pub mod error;
pub mod feedback;
pub mod http;
pub mod local;
pub mod market;
pub mod profile;
pub mod session;
pub mod state;
pub mod validation;
pub mod watchlist;

pub use auth::{Authenticator, Credentials, SignInController, SignUpController};
pub use coordinator::{Action, CallContext, Coordinator, Dispatch, DispatchPolicy, RetryPolicy};
pub use error::{ClientError, ErrorInfo, ErrorKind, InputField};
pub use feedback::{Feedback, FeedbackMessages, Toast, ToastLevel};
pub use http::HttpCoinApi;
pub use local::LocalAuthBackend;
pub use market::{ChartRequest, MarketController};
pub use profile::{PictureUpload, ProfileController};
pub use session::{
    AuthedUser, Session, SessionAuthority, SessionGate, SessionSubscription, SessionTransition,
    TransitionReason,
};
pub use state::{AsyncResult, Phase, StateContainer, StateReader, StateSubscription};
pub use watchlist::{FavoriteToggle, Watchlist, WatchlistController};

/// Market data REST API.
#[async_trait]
pub trait CoinApi: Send + Sync {
    async fn get_coins(&self, limit: u32) -> Result<Vec<Coin>, ClientError>;
    async fn get_coin(&self, id: &CoinId) -> Result<Coin, ClientError>;
    async fn get_chart(&self, id: &CoinId, days: u32) -> Result<Vec<PricePoint>, ClientError>;
    async fn get_news(&self, limit: u32) -> Result<Vec<Article>, ClientError>;
}

/// Account, profile and favorites backend.
#[async_trait]
pub trait AuthBackend: Send + Sync {
    async fn sign_up(&self, email: &str, password: &str) -> Result<UserId, ClientError>;
    async fn sign_in(&self, email: &str, password: &str) -> Result<UserProfile, ClientError>;
    /// Stores the picture and returns the url it is served from.
    async fn update_profile_picture(
        &self,
        user_id: UserId,
        mime_type: &str,
        bytes: &[u8],
    ) -> Result<String, ClientError>;
    async fn get_favorites(&self, user_id: UserId) -> Result<Vec<FavoriteEntry>, ClientError>;
    async fn add_favorite(&self, user_id: UserId, coin_id: &CoinId) -> Result<(), ClientError>;
    async fn remove_favorite(&self, user_id: UserId, coin_id: &CoinId)
        -> Result<(), ClientError>;
}

/// Locks a std mutex, recovering the data if a previous holder panicked.
pub(crate) fn lock_unpoisoned<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

#[cfg(test)]
#[path = "tests/support.rs"]
mod support;

#[cfg(test)]
#[path = "tests/lib_tests.rs"]
mod tests;
