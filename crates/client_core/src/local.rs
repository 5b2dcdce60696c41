//! [`AuthBackend`] over the local sqlite user-data store.

use anyhow::anyhow;
use argon2::{
    password_hash::{rand_core::OsRng, PasswordHash, PasswordHasher, PasswordVerifier, SaltString},
    Argon2,
};
use async_trait::async_trait;
use shared::{
    domain::{CoinId, FavoriteEntry, PictureId, UserId, UserProfile},
    error::ErrorCode,
};
use storage::{is_unique_violation, NewAccount, Storage, StoredAccount};
use tokio::task;
use tracing::{debug, info};

use crate::{error::ClientError, AuthBackend};

pub const ACCOUNT_EXISTS: &str = "account exists";
pub const INVALID_CREDENTIALS: &str = "invalid credentials";

#[derive(Clone)]
pub struct LocalAuthBackend {
    storage: Storage,
}

impl LocalAuthBackend {
    pub fn new(storage: Storage) -> Self {
        Self { storage }
    }

    async fn existing_account(&self, user_id: UserId) -> Result<StoredAccount, ClientError> {
        self.storage
            .account(user_id)
            .await?
            .ok_or_else(|| ClientError::backend(ErrorCode::Unauthorized, "unknown user"))
    }
}

pub fn picture_url(user_id: UserId, picture_id: PictureId) -> String {
    format!("local://profile-pictures/{}/{}", user_id.0, picture_id.0)
}

/// Argon2id PHC string for `password` under a fresh random salt.
pub fn hash_password(password: &str) -> Result<String, ClientError> {
    let salt = SaltString::generate(&mut OsRng);
    let hash = Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map_err(|err| anyhow!("failed to hash password: {err}"))?;
    Ok(hash.to_string())
}

pub fn verify_password(password: &str, phc: &str) -> Result<bool, ClientError> {
    let parsed =
        PasswordHash::new(phc).map_err(|err| anyhow!("stored password hash is unreadable: {err}"))?;
    Ok(Argon2::default()
        .verify_password(password.as_bytes(), &parsed)
        .is_ok())
}

/// Hashing and verifying take tens of milliseconds of CPU, so they run on the
/// blocking pool.
async fn blocking<T, F>(work: F) -> Result<T, ClientError>
where
    T: Send + 'static,
    F: FnOnce() -> Result<T, ClientError> + Send + 'static,
{
    task::spawn_blocking(work)
        .await
        .map_err(|err| anyhow!("password task failed: {err}"))?
}

fn profile_from_account(account: StoredAccount) -> UserProfile {
    UserProfile {
        user_id: account.user_id,
        picture_url: account
            .picture_id
            .map(|picture_id| picture_url(account.user_id, picture_id)),
        email: account.email,
        display_name: account.display_name,
        premium: account.premium,
    }
}

#[async_trait]
impl AuthBackend for LocalAuthBackend {
    async fn sign_up(&self, email: &str, password: &str) -> Result<UserId, ClientError> {
        let password = password.to_owned();
        let password_hash = blocking(move || hash_password(&password)).await?;
        let created = self
            .storage
            .create_account(NewAccount {
                email,
                password_hash: &password_hash,
                display_name: None,
            })
            .await;
        match created {
            Ok(user_id) => {
                info!(user_id = user_id.0, "local auth: account created");
                Ok(user_id)
            }
            Err(err) if is_unique_violation(&err) => {
                debug!("local auth: duplicate email");
                Err(ClientError::backend(ErrorCode::Conflict, ACCOUNT_EXISTS))
            }
            Err(err) => Err(err.into()),
        }
    }

    async fn sign_in(&self, email: &str, password: &str) -> Result<UserProfile, ClientError> {
        let Some(account) = self.storage.find_account_by_email(email).await? else {
            return Err(ClientError::backend(ErrorCode::Unauthorized, INVALID_CREDENTIALS));
        };
        let password = password.to_owned();
        let phc = account.password_hash.clone();
        if !blocking(move || verify_password(&password, &phc)).await? {
            return Err(ClientError::backend(ErrorCode::Unauthorized, INVALID_CREDENTIALS));
        }
        Ok(profile_from_account(account))
    }

    async fn update_profile_picture(
        &self,
        user_id: UserId,
        mime_type: &str,
        bytes: &[u8],
    ) -> Result<String, ClientError> {
        self.existing_account(user_id).await?;
        let picture_id = self
            .storage
            .store_profile_picture(user_id, mime_type, bytes)
            .await?;
        debug!(user_id = user_id.0, picture_id = picture_id.0, "local auth: picture stored");
        Ok(picture_url(user_id, picture_id))
    }

    async fn get_favorites(&self, user_id: UserId) -> Result<Vec<FavoriteEntry>, ClientError> {
        self.existing_account(user_id).await?;
        Ok(self.storage.list_favorites(user_id).await?)
    }

    async fn add_favorite(&self, user_id: UserId, coin_id: &CoinId) -> Result<(), ClientError> {
        self.existing_account(user_id).await?;
        self.storage.add_favorite(user_id, coin_id).await?;
        Ok(())
    }

    async fn remove_favorite(&self, user_id: UserId, coin_id: &CoinId) -> Result<(), ClientError> {
        self.existing_account(user_id).await?;
        self.storage.remove_favorite(user_id, coin_id).await?;
        Ok(())
    }
}

#[cfg(test)]
#[path = "tests/local_tests.rs"]
mod tests;
