//! Credential handling: registration, login, and bearer-token issuance.

use crate::store::StoreAdapter;
use crate::utils::error::{ProxyError, ProxyResult};
use chrono::{Duration, Utc};
use jsonwebtoken::{decode, encode, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

const TOKEN_TTL_HOURS: i64 = 24;

fn jwt_secret() -> String {
    std::env::var("JWT_SECRET").unwrap_or_else(|_| "changeme".to_string())
}

#[derive(Debug, Serialize, Deserialize)]
pub struct Claims {
    pub sub: String,
    pub username: String,
    pub exp: i64,
}

#[derive(Debug, Deserialize)]
pub struct Credentials {
    pub username: String,
    pub password: String,
}

#[derive(Debug, Serialize)]
pub struct TokenResponse {
    pub token: String,
}

/// Hash `password` and create a user; returns [`ProxyError::UserConflict`]
/// if the username is already registered.
pub async fn register(store: &dyn StoreAdapter, credentials: &Credentials) -> ProxyResult<()> {
    let hash = bcrypt::hash(&credentials.password, bcrypt::DEFAULT_COST)
        .map_err(|e| ProxyError::Config(format!("failed to hash password: {}", e)))?;
    let id = Uuid::new_v4().to_string();
    store.create_user(&id, &credentials.username, &hash).await?;
    Ok(())
}

/// Verify `credentials` against the store and, on success, sign a
/// 24-hour HS256 bearer token.
pub async fn login(store: &dyn StoreAdapter, credentials: &Credentials) -> ProxyResult<TokenResponse> {
    let (user_id, hash) = store
        .get_user_by_username(&credentials.username)
        .await?
        .ok_or(ProxyError::InvalidCredentials)?;

    let valid = bcrypt::verify(&credentials.password, &hash)
        .map_err(|e| ProxyError::Config(format!("failed to verify password: {}", e)))?;
    if !valid {
        return Err(ProxyError::InvalidCredentials);
    }

    let claims = Claims {
        sub: user_id,
        username: credentials.username.clone(),
        exp: (Utc::now() + Duration::hours(TOKEN_TTL_HOURS)).timestamp(),
    };
    let token = encode(
        &Header::default(),
        &claims,
        &EncodingKey::from_secret(jwt_secret().as_bytes()),
    )
    .map_err(|e| ProxyError::Config(format!("failed to sign token: {}", e)))?;

    Ok(TokenResponse { token })
}

/// Validate a bearer token, returning its claims on success.
pub fn verify_token(token: &str) -> ProxyResult<Claims> {
    let data = decode::<Claims>(
        token,
        &DecodingKey::from_secret(jwt_secret().as_bytes()),
        &Validation::default(),
    )
    .map_err(|_| ProxyError::InvalidCredentials)?;
    Ok(data.claims)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::Store;

    async fn store() -> Store {
        Store::connect(":memory:").await.unwrap()
    }

    #[tokio::test]
    async fn register_then_login_round_trips() {
        let store = store().await;
        let creds = Credentials {
            username: "alice".to_string(),
            password: "hunter2".to_string(),
        };
        register(&store, &creds).await.unwrap();

        let token = login(&store, &creds).await.unwrap();
        let claims = verify_token(&token.token).unwrap();
        assert_eq!(claims.username, "alice");
    }

    #[tokio::test]
    async fn register_rejects_duplicate_username() {
        let store = store().await;
        let creds = Credentials {
            username: "alice".to_string(),
            password: "hunter2".to_string(),
        };
        register(&store, &creds).await.unwrap();
        assert!(matches!(
            register(&store, &creds).await,
            Err(ProxyError::UserConflict)
        ));
    }

    #[tokio::test]
    async fn login_rejects_wrong_password() {
        let store = store().await;
        let creds = Credentials {
            username: "alice".to_string(),
            password: "hunter2".to_string(),
        };
        register(&store, &creds).await.unwrap();

        let wrong = Credentials {
            username: "alice".to_string(),
            password: "wrong".to_string(),
        };
        assert!(matches!(
            login(&store, &wrong).await,
            Err(ProxyError::InvalidCredentials)
        ));
    }

    #[tokio::test]
    async fn login_rejects_unknown_user() {
        let store = store().await;
        let creds = Credentials {
            username: "nobody".to_string(),
            password: "x".to_string(),
        };
        assert!(matches!(
            login(&store, &creds).await,
            Err(ProxyError::InvalidCredentials)
        ));
    }

    #[test]
    fn verify_token_rejects_garbage() {
        assert!(verify_token("not-a-token").is_err());
    }
}
