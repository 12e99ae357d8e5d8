//! User authentication.
//!
//! Registration hashes passwords with argon2; login verifies and issues an
//! HS256 JWT carrying the user id and account. The middleware validates
//! bearer tokens and injects [`AuthUser`] into request extensions, so the
//! authenticated identity travels on the request, never in globals.

use axum::{
    body::Body,
    extract::State,
    http::{header, Request, StatusCode},
    middleware::Next,
    response::Response,
    Json,
};
use std::sync::Arc;

use anyhow::{anyhow, Context, Result};
use argon2::{
    password_hash::{rand_core::OsRng, PasswordHash, PasswordHasher, PasswordVerifier, SaltString},
    Argon2,
};
use chrono::{Duration, Utc};
use jsonwebtoken::{decode, encode, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};

use crate::core_types::UserId;
use crate::gateway::response::{codes, ApiResponse};
use crate::gateway::state::AppState;
use crate::models::User;
use crate::persistence::{PersistError, PgUserRepository};

/// JWT claims carried by every authenticated request.
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct Claims {
    pub user_id: UserId,
    pub account: String,
    pub exp: usize,
    pub iat: usize,
}

/// Authenticated identity injected into request extensions.
#[derive(Debug, Clone)]
pub struct AuthUser {
    pub user_id: UserId,
    pub account: String,
}

pub struct UserAuthService {
    users: PgUserRepository,
    jwt_secret: String,
    token_ttl: Duration,
}

impl UserAuthService {
    pub fn new(users: PgUserRepository, jwt_secret: String, token_ttl_hours: i64) -> Self {
        Self {
            users,
            jwt_secret,
            token_ttl: Duration::hours(token_ttl_hours),
        }
    }

    /// Register a new user; returns the created row.
    pub async fn register(&self, account: &str, password: &str, name: &str) -> Result<User> {
        let salt = SaltString::generate(&mut OsRng);
        let password_hash = Argon2::default()
            .hash_password(password.as_bytes(), &salt)
            .map_err(|e| anyhow!("password hashing failed: {e}"))?
            .to_string();

        let user = self
            .users
            .create(account, &password_hash, name)
            .await
            .context("failed to insert user")?;
        Ok(user)
    }

    /// Verify credentials and issue a signed token.
    pub async fn login(&self, account: &str, password: &str) -> Result<(String, User)> {
        let user = match self.users.find_by_account(account).await {
            Ok(user) => user,
            Err(PersistError::NotFound) => return Err(anyhow!("invalid account or password")),
            Err(err) => return Err(err.into()),
        };

        let parsed_hash = PasswordHash::new(&user.password)
            .map_err(|e| anyhow!("stored hash is invalid: {e}"))?;
        Argon2::default()
            .verify_password(password.as_bytes(), &parsed_hash)
            .map_err(|_| anyhow!("invalid account or password"))?;

        let token = self.issue_token(user.uid, &user.account)?;
        Ok((token, user))
    }

    pub fn issue_token(&self, user_id: UserId, account: &str) -> Result<String> {
        let now = Utc::now();
        let exp = now
            .checked_add_signed(self.token_ttl)
            .context("token expiry overflow")?;
        let claims = Claims {
            user_id,
            account: account.to_string(),
            exp: exp.timestamp() as usize,
            iat: now.timestamp() as usize,
        };
        let token = encode(
            &Header::default(),
            &claims,
            &EncodingKey::from_secret(self.jwt_secret.as_bytes()),
        )?;
        Ok(token)
    }

    pub fn verify_token(&self, token: &str) -> Result<Claims> {
        let data = decode::<Claims>(
            token,
            &DecodingKey::from_secret(self.jwt_secret.as_bytes()),
            &Validation::default(),
        )?;
        Ok(data.claims)
    }

    pub async fn profile(&self, user_id: UserId) -> Result<User, PersistError> {
        self.users.find_by_id(user_id).await
    }
}

pub async fn jwt_auth_middleware(
    State(state): State<Arc<AppState>>,
    mut request: Request<Body>,
    next: Next,
) -> Result<Response, (StatusCode, Json<ApiResponse<()>>)> {
    let auth_header = request
        .headers()
        .get(header::AUTHORIZATION)
        .and_then(|h| h.to_str().ok())
        .ok_or_else(|| unauthorized("missing Authorization header"))?;

    let token = auth_header
        .strip_prefix("Bearer ")
        .ok_or_else(|| unauthorized("invalid token format"))?;

    match state.auth.verify_token(token) {
        Ok(claims) => {
            request.extensions_mut().insert(AuthUser {
                user_id: claims.user_id,
                account: claims.account,
            });
            Ok(next.run(request).await)
        }
        Err(_) => Err(unauthorized("invalid or expired token")),
    }
}

fn unauthorized(msg: &str) -> (StatusCode, Json<ApiResponse<()>>) {
    (
        StatusCode::UNAUTHORIZED,
        Json(ApiResponse::<()>::error(codes::UNAUTHORIZED, msg)),
    )
}
