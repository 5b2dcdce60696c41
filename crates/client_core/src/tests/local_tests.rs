use super::*;
use crate::{
    error::{ErrorInfo, ErrorKind},
    support::png_bytes,
};

async fn backend() -> LocalAuthBackend {
    backend_with_storage().await.0
}

async fn backend_with_storage() -> (LocalAuthBackend, Storage) {
    let storage = Storage::new("sqlite::memory:").await.expect("db");
    (LocalAuthBackend::new(storage.clone()), storage)
}

#[tokio::test]
async fn sign_up_then_sign_in_returns_the_profile() {
    let backend = backend().await;
    let user_id = backend
        .sign_up("hodler@example.com", "correct horse")
        .await
        .expect("sign up");

    let profile = backend
        .sign_in("hodler@example.com", "correct horse")
        .await
        .expect("sign in");
    assert_eq!(profile.user_id, user_id);
    assert_eq!(profile.email, "hodler@example.com");
    assert_eq!(profile.picture_url, None);
}

#[tokio::test]
async fn passwords_are_stored_as_salted_argon2_hashes() {
    let (backend, storage) = backend_with_storage().await;
    backend.sign_up("a@example.com", "same").await.expect("a");
    backend.sign_up("b@example.com", "same").await.expect("b");

    let a = storage
        .find_account_by_email("a@example.com")
        .await
        .expect("lookup")
        .expect("a exists");
    let b = storage
        .find_account_by_email("b@example.com")
        .await
        .expect("lookup")
        .expect("b exists");
    assert!(a.password_hash.starts_with("$argon2id$"));
    assert_ne!(a.password_hash, b.password_hash);
    assert!(!a.password_hash.contains("same"));

    assert!(verify_password("same", &a.password_hash).expect("parse"));
    assert!(!verify_password("Same", &a.password_hash).expect("parse"));
    assert!(verify_password("same", "not a phc string").is_err());
}

#[test]
fn each_hash_carries_its_own_salt() {
    let first = hash_password("correct horse").expect("hash");
    let second = hash_password("correct horse").expect("hash");
    assert_ne!(first, second);
    assert!(verify_password("correct horse", &first).expect("parse"));
    assert!(verify_password("correct horse", &second).expect("parse"));
}

#[tokio::test]
async fn duplicate_email_is_a_conflict() {
    let backend = backend().await;
    backend.sign_up("dup@example.com", "pw").await.expect("first");

    let err = backend
        .sign_up("DUP@example.com", "other")
        .await
        .expect_err("duplicate");
    assert!(matches!(err, ClientError::Backend(ref api) if api.code == ErrorCode::Conflict));
    assert_eq!(
        ErrorInfo::classify(&err),
        ErrorInfo::new(ErrorKind::Backend, ACCOUNT_EXISTS)
    );
}

#[tokio::test]
async fn wrong_password_and_unknown_email_are_unauthorized() {
    let backend = backend().await;
    backend.sign_up("me@example.com", "pw").await.expect("sign up");

    for (email, password) in [("me@example.com", "nope"), ("ghost@example.com", "pw")] {
        let err = backend
            .sign_in(email, password)
            .await
            .expect_err("must be rejected");
        let info = ErrorInfo::classify(&err);
        assert_eq!(info.kind(), ErrorKind::Unauthorized);
        assert_eq!(info.message(), INVALID_CREDENTIALS);
    }
}

#[tokio::test]
async fn uploaded_picture_is_visible_on_next_sign_in() {
    let backend = backend().await;
    let user_id = backend.sign_up("pic@example.com", "pw").await.expect("sign up");

    let url = backend
        .update_profile_picture(user_id, "image/png", &png_bytes())
        .await
        .expect("upload");
    assert!(url.starts_with(&format!("local://profile-pictures/{}/", user_id.0)));

    let profile = backend.sign_in("pic@example.com", "pw").await.expect("sign in");
    assert_eq!(profile.picture_url, Some(url));
}

#[tokio::test]
async fn favorites_round_trip_through_storage() {
    let backend = backend().await;
    let user_id = backend.sign_up("fav@example.com", "pw").await.expect("sign up");
    let bitcoin = CoinId::new("bitcoin");
    let solana = CoinId::new("solana");

    backend.add_favorite(user_id, &bitcoin).await.expect("add");
    backend.add_favorite(user_id, &solana).await.expect("add");
    backend.add_favorite(user_id, &bitcoin).await.expect("re-add is a no-op");
    backend.remove_favorite(user_id, &solana).await.expect("remove");

    let favorites = backend.get_favorites(user_id).await.expect("list");
    let ids: Vec<_> = favorites.iter().map(|f| f.coin_id.clone()).collect();
    assert_eq!(ids, vec![bitcoin]);
}

#[tokio::test]
async fn unknown_user_cannot_touch_user_data() {
    let backend = backend().await;
    let err = backend
        .get_favorites(UserId(404))
        .await
        .expect_err("no such user");
    assert!(ErrorInfo::classify(&err).requires_reauth());
}
