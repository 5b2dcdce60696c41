use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use sqlx::{
    sqlite::{SqliteConnectOptions, SqlitePoolOptions, SqliteRow},
    Pool, Row, Sqlite,
};
use std::{
    fs,
    path::{Path, PathBuf},
    str::FromStr,
};

use shared::domain::{CoinId, FavoriteEntry, PictureId, UserId};

#[derive(Clone)]
pub struct Storage {
    pool: Pool<Sqlite>,
}

#[derive(Debug, Clone)]
pub struct StoredAccount {
    pub user_id: UserId,
    pub email: String,
    /// Argon2 PHC string; carries its own salt and parameters.
    pub password_hash: String,
    pub display_name: Option<String>,
    pub premium: bool,
    pub picture_id: Option<PictureId>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct NewAccount<'a> {
    pub email: &'a str,
    pub password_hash: &'a str,
    pub display_name: Option<&'a str>,
}

#[derive(Debug, Clone)]
pub struct StoredPicture {
    pub picture_id: PictureId,
    pub user_id: UserId,
    pub mime_type: String,
    pub bytes: Vec<u8>,
    pub created_at: DateTime<Utc>,
}

impl Storage {
    pub async fn new(database_url: &str) -> Result<Self> {
        ensure_sqlite_parent_dir_exists(database_url)?;

        let connect_options = SqliteConnectOptions::from_str(database_url)?
            .create_if_missing(true)
            .foreign_keys(true);
        // Every pooled connection to `:memory:` would open its own empty database.
        let max_connections = if database_url.contains(":memory:") { 1 } else { 5 };
        let pool = SqlitePoolOptions::new()
            .max_connections(max_connections)
            .connect_with(connect_options)
            .await
            .with_context(|| format!("failed to open sqlite database '{database_url}'"))?;
        sqlx::migrate!("./migrations")
            .run(&pool)
            .await
            .context("failed to apply user-data migrations")?;
        Ok(Self { pool })
    }

    /// Waits for pooled connections to finish and closes them.
    pub async fn close(&self) {
        self.pool.close().await;
    }

    pub async fn health_check(&self) -> Result<()> {
        let _: i64 = sqlx::query_scalar("SELECT 1")
            .fetch_one(&self.pool)
            .await
            .context("sqlite ping failed")?;
        Ok(())
    }

    /// Inserts a new account. A second account for the same email (case-insensitive)
    /// fails with a unique violation; see [`is_unique_violation`].
    pub async fn create_account(&self, account: NewAccount<'_>) -> Result<UserId> {
        let rec = sqlx::query(
            "INSERT INTO accounts (email, password_hash, display_name, created_at)
             VALUES (?, ?, ?, ?)
             RETURNING id",
        )
        .bind(account.email)
        .bind(account.password_hash)
        .bind(account.display_name)
        .bind(Utc::now())
        .fetch_one(&self.pool)
        .await?;
        Ok(UserId(rec.get::<i64, _>(0)))
    }

    pub async fn find_account_by_email(&self, email: &str) -> Result<Option<StoredAccount>> {
        let row = sqlx::query(
            "SELECT id, email, password_hash, display_name, premium, picture_id, created_at
             FROM accounts WHERE email = ?",
        )
        .bind(email)
        .fetch_optional(&self.pool)
        .await?;
        row.map(|row| account_from_row(&row)).transpose()
    }

    pub async fn account(&self, user_id: UserId) -> Result<Option<StoredAccount>> {
        let row = sqlx::query(
            "SELECT id, email, password_hash, display_name, premium, picture_id, created_at
             FROM accounts WHERE id = ?",
        )
        .bind(user_id.0)
        .fetch_optional(&self.pool)
        .await?;
        row.map(|row| account_from_row(&row)).transpose()
    }

    /// Stores a new picture and makes it the account's current one.
    pub async fn store_profile_picture(
        &self,
        user_id: UserId,
        mime_type: &str,
        bytes: &[u8],
    ) -> Result<PictureId> {
        let mut tx = self.pool.begin().await?;
        let rec = sqlx::query(
            "INSERT INTO profile_pictures (user_id, mime_type, bytes, created_at)
             VALUES (?, ?, ?, ?)
             RETURNING id",
        )
        .bind(user_id.0)
        .bind(mime_type)
        .bind(bytes)
        .bind(Utc::now())
        .fetch_one(&mut *tx)
        .await
        .context("failed to insert profile picture")?;
        let picture_id = PictureId(rec.get::<i64, _>(0));

        let updated = sqlx::query("UPDATE accounts SET picture_id = ? WHERE id = ?")
            .bind(picture_id.0)
            .bind(user_id.0)
            .execute(&mut *tx)
            .await?
            .rows_affected();
        if updated == 0 {
            anyhow::bail!("no account with id {}", user_id.0);
        }
        tx.commit().await?;
        Ok(picture_id)
    }

    pub async fn load_profile_picture(&self, picture_id: PictureId) -> Result<Option<StoredPicture>> {
        let row = sqlx::query(
            "SELECT id, user_id, mime_type, bytes, created_at FROM profile_pictures WHERE id = ?",
        )
        .bind(picture_id.0)
        .fetch_optional(&self.pool)
        .await?;
        row.map(|row| -> Result<StoredPicture> {
            Ok(StoredPicture {
                picture_id: PictureId(row.try_get("id")?),
                user_id: UserId(row.try_get("user_id")?),
                mime_type: row.try_get("mime_type")?,
                bytes: row.try_get("bytes")?,
                created_at: row.try_get("created_at")?,
            })
        })
        .transpose()
    }

    pub async fn list_favorites(&self, user_id: UserId) -> Result<Vec<FavoriteEntry>> {
        let rows = sqlx::query(
            "SELECT coin_id, added_at FROM favorites WHERE user_id = ? ORDER BY added_at, coin_id",
        )
        .bind(user_id.0)
        .fetch_all(&self.pool)
        .await?;
        rows.into_iter()
            .map(|row| {
                Ok(FavoriteEntry {
                    coin_id: CoinId(row.try_get("coin_id")?),
                    added_at: row.try_get("added_at")?,
                })
            })
            .collect()
    }

    /// Returns `false` when the coin was already a favorite.
    pub async fn add_favorite(&self, user_id: UserId, coin_id: &CoinId) -> Result<bool> {
        let inserted = sqlx::query(
            "INSERT INTO favorites (user_id, coin_id, added_at) VALUES (?, ?, ?)
             ON CONFLICT(user_id, coin_id) DO NOTHING",
        )
        .bind(user_id.0)
        .bind(coin_id.as_str())
        .bind(Utc::now())
        .execute(&self.pool)
        .await?
        .rows_affected();
        Ok(inserted > 0)
    }

    /// Returns `false` when the coin was not a favorite.
    pub async fn remove_favorite(&self, user_id: UserId, coin_id: &CoinId) -> Result<bool> {
        let removed = sqlx::query("DELETE FROM favorites WHERE user_id = ? AND coin_id = ?")
            .bind(user_id.0)
            .bind(coin_id.as_str())
            .execute(&self.pool)
            .await?
            .rows_affected();
        Ok(removed > 0)
    }
}

/// True when `err` wraps a sqlite UNIQUE/PRIMARY KEY constraint failure.
pub fn is_unique_violation(err: &anyhow::Error) -> bool {
    err.chain().any(|cause| {
        cause
            .downcast_ref::<sqlx::Error>()
            .and_then(|sqlx_err| sqlx_err.as_database_error())
            .is_some_and(|db_err| db_err.is_unique_violation())
    })
}

fn account_from_row(row: &SqliteRow) -> Result<StoredAccount> {
    Ok(StoredAccount {
        user_id: UserId(row.try_get("id")?),
        email: row.try_get("email")?,
        password_hash: row.try_get("password_hash")?,
        display_name: row.try_get("display_name")?,
        premium: row.try_get("premium")?,
        picture_id: row.try_get::<Option<i64>, _>("picture_id")?.map(PictureId),
        created_at: row.try_get("created_at")?,
    })
}

fn ensure_sqlite_parent_dir_exists(database_url: &str) -> Result<()> {
    let Some(path) = sqlite_path(database_url) else {
        return Ok(());
    };

    let Some(parent) = path.parent() else {
        return Ok(());
    };

    fs::create_dir_all(parent).with_context(|| {
        format!(
            "failed to create parent directory '{}' for database url '{database_url}'",
            parent.display()
        )
    })?;

    Ok(())
}

fn sqlite_path(database_url: &str) -> Option<PathBuf> {
    if database_url.contains(":memory:") || !database_url.starts_with("sqlite:") {
        return None;
    }

    let path = database_url
        .trim_start_matches("sqlite://")
        .trim_start_matches("sqlite:")
        .split('?')
        .next()
        .unwrap_or_default();

    if path.is_empty() {
        return None;
    }

    Some(Path::new(path).to_path_buf())
}

#[cfg(test)]
#[path = "tests/lib_tests.rs"]
mod tests;
