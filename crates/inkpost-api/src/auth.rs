use argon2::{
    Argon2, PasswordHash, PasswordHasher, PasswordVerifier,
    password_hash::{SaltString, rand_core::OsRng},
};
use axum::{Json, extract::State, http::StatusCode, response::IntoResponse};
use jsonwebtoken::{DecodingKey, EncodingKey, Header, Validation, decode, encode};
use tracing::info;

use inkpost_types::api::{
    AccessToken, Claims, LoginRequest, MessageResponse, RefreshRequest, RegisterRequest,
    TokenPair,
};
use inkpost_db::models::TakenFields;
use inkpost_types::models::TokenType;

use crate::error::{ApiError, FieldErrors, Validator};
use crate::extract::ApiJson;
use crate::{AppState, with_db};

/// Secret and lifetimes used to issue and check JWTs.
#[derive(Clone)]
pub struct AuthConfig {
    pub jwt_secret: String,
    pub access_ttl: chrono::Duration,
    pub refresh_ttl: chrono::Duration,
}

impl AuthConfig {
    fn ttl(&self, token_type: TokenType) -> chrono::Duration {
        match token_type {
            TokenType::Access => self.access_ttl,
            TokenType::Refresh => self.refresh_ttl,
        }
    }
}

pub async fn register(
    State(state): State<AppState>,
    ApiJson(req): ApiJson<RegisterRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let mut v = Validator::new();
    let username = v.required("username", req.username.as_deref()).map(str::to_owned);
    let email = v.required("email", req.email.as_deref()).map(str::to_owned);
    let password = v.required("password", req.password.as_deref()).map(str::to_owned);
    if let Some(username) = &username {
        check_username(&mut v, username);
    }
    if let Some(email) = &email {
        check_email(&mut v, email);
    }
    v.finish()?;

    // All three are present once validation passed
    let (Some(username), Some(email), Some(password)) = (username, email, password) else {
        return Err(anyhow::anyhow!("register: validated fields missing").into());
    };

    let password_hash = tokio::task::spawn_blocking(move || hash_password(&password))
        .await
        .map_err(|e| anyhow::anyhow!("spawn_blocking join error: {}", e))??;

    let user_id = with_db(&state, move |db| {
        let created = db.create_user(&username, &email, &password_hash)?;
        Ok(created.map_err(|clash| {
            taken_error(clash, "Username already exists.", "Email already exists.")
        }))
    })
    .await??;

    info!("Registered user {}", user_id);
    Ok((
        StatusCode::CREATED,
        Json(MessageResponse::new("User registered successfully")),
    ))
}

pub async fn login(
    State(state): State<AppState>,
    ApiJson(req): ApiJson<LoginRequest>,
) -> Result<Json<TokenPair>, ApiError> {
    let mut v = Validator::new();
    let email = v.required("email", req.email.as_deref()).map(str::to_owned);
    let password = v.required("password", req.password.as_deref()).map(str::to_owned);
    if let Some(email) = &email {
        check_email(&mut v, email);
    }
    v.finish()?;
    let (Some(email), Some(password)) = (email, password) else {
        return Err(anyhow::anyhow!("login: validated fields missing").into());
    };

    let user = with_db(&state, move |db| db.get_user_by_email(&email))
        .await?
        .ok_or_else(|| ApiError::field("non_field_errors", "This email does not exist."))?;

    let hash = user.password.clone();
    let verified = tokio::task::spawn_blocking(move || verify_password(&password, &hash))
        .await
        .map_err(|e| anyhow::anyhow!("spawn_blocking join error: {}", e))??;
    if !verified {
        return Err(ApiError::field("non_field_errors", "Invalid password."));
    }

    Ok(Json(TokenPair {
        access: issue_token(&state.auth, user.id, &user.username, TokenType::Access)?,
        refresh: issue_token(&state.auth, user.id, &user.username, TokenType::Refresh)?,
    }))
}

/// Exchanges a refresh token for a fresh access token.
pub async fn refresh_token(
    State(state): State<AppState>,
    ApiJson(req): ApiJson<RefreshRequest>,
) -> Result<Json<AccessToken>, ApiError> {
    let mut v = Validator::new();
    let refresh = v.required("refresh", req.refresh.as_deref()).map(str::to_owned);
    v.finish()?;
    let Some(refresh) = refresh else {
        return Err(anyhow::anyhow!("refresh: validated field missing").into());
    };

    let claims = decode_token(&state.auth, &refresh, TokenType::Refresh)
        .map_err(|_| ApiError::Unauthorized("Token is invalid or expired".into()))?;

    Ok(Json(AccessToken {
        access: issue_token(&state.auth, claims.user_id, &claims.username, TokenType::Access)?,
    }))
}

/// Field errors for a username or email another account already holds.
pub(crate) fn taken_error(
    clash: TakenFields,
    username_message: &str,
    email_message: &str,
) -> ApiError {
    let mut errors = FieldErrors::new();
    if clash.username {
        errors.insert("username".into(), vec![username_message.into()]);
    }
    if clash.email {
        errors.insert("email".into(), vec![email_message.into()]);
    }
    ApiError::Validation(errors)
}

// -- Credentials --

pub fn hash_password(password: &str) -> anyhow::Result<String> {
    let salt = SaltString::generate(&mut OsRng);
    let hash = Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map_err(|e| anyhow::anyhow!("password hashing failed: {}", e))?;
    Ok(hash.to_string())
}

/// False on a wrong password; errors only on an unreadable stored hash.
pub fn verify_password(password: &str, stored_hash: &str) -> anyhow::Result<bool> {
    let parsed =
        PasswordHash::new(stored_hash).map_err(|e| anyhow::anyhow!("bad password hash: {}", e))?;
    Ok(Argon2::default()
        .verify_password(password.as_bytes(), &parsed)
        .is_ok())
}

pub fn issue_token(
    config: &AuthConfig,
    user_id: i64,
    username: &str,
    token_type: TokenType,
) -> anyhow::Result<String> {
    let claims = Claims {
        user_id,
        username: username.to_string(),
        token_type,
        exp: (chrono::Utc::now() + config.ttl(token_type)).timestamp() as usize,
    };

    let token = encode(
        &Header::default(),
        &claims,
        &EncodingKey::from_secret(config.jwt_secret.as_bytes()),
    )?;

    Ok(token)
}

/// Validates signature and expiry, then checks the token is of the expected kind.
pub fn decode_token(
    config: &AuthConfig,
    token: &str,
    expected: TokenType,
) -> anyhow::Result<Claims> {
    let data = decode::<Claims>(
        token,
        &DecodingKey::from_secret(config.jwt_secret.as_bytes()),
        &Validation::default(),
    )?;
    if data.claims.token_type != expected {
        anyhow::bail!("expected a {:?} token", expected);
    }
    Ok(data.claims)
}

// -- Field checks shared with profile updates --

pub(crate) fn check_username(v: &mut Validator, username: &str) {
    v.max_chars("username", username, 150);
    let valid = username
        .chars()
        .all(|c| c.is_alphanumeric() || matches!(c, '@' | '.' | '+' | '-' | '_'));
    if !valid {
        v.add(
            "username",
            "Enter a valid username. This value may contain only letters, numbers, and @/./+/-/_ characters.",
        );
    }
}

pub(crate) fn check_email(v: &mut Validator, email: &str) {
    v.max_chars("email", email, 254);
    let valid = match email.rsplit_once('@') {
        Some((local, domain)) => {
            !local.is_empty()
                && !local.chars().any(char::is_whitespace)
                && domain.contains('.')
                && !domain.starts_with('.')
                && !domain.ends_with('.')
                && !domain.chars().any(|c| c.is_whitespace() || c == '@')
        }
        None => false,
    };
    if !valid {
        v.add("email", "Enter a valid email address.");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> AuthConfig {
        AuthConfig {
            jwt_secret: "test-secret".into(),
            access_ttl: chrono::Duration::minutes(5),
            refresh_ttl: chrono::Duration::days(1),
        }
    }

    #[test]
    fn password_hash_round_trip() {
        let hash = hash_password("correct horse").unwrap();
        assert!(hash.starts_with("$argon2id$"));
        assert!(verify_password("correct horse", &hash).unwrap());
        assert!(!verify_password("wrong", &hash).unwrap());
    }

    #[test]
    fn refresh_token_is_not_an_access_token() {
        let config = config();
        let refresh = issue_token(&config, 7, "alice", TokenType::Refresh).unwrap();
        assert!(decode_token(&config, &refresh, TokenType::Access).is_err());

        let claims = decode_token(&config, &refresh, TokenType::Refresh).unwrap();
        assert_eq!(claims.user_id, 7);
        assert_eq!(claims.username, "alice");
    }

    #[test]
    fn tokens_from_another_secret_are_rejected() {
        let token = issue_token(&config(), 1, "alice", TokenType::Access).unwrap();
        let other = AuthConfig {
            jwt_secret: "other".into(),
            ..config()
        };
        assert!(decode_token(&other, &token, TokenType::Access).is_err());
    }

    #[test]
    fn expired_tokens_are_rejected() {
        let config = AuthConfig {
            access_ttl: chrono::Duration::minutes(-5),
            ..config()
        };
        let token = issue_token(&config, 1, "alice", TokenType::Access).unwrap();
        assert!(decode_token(&config, &token, TokenType::Access).is_err());
    }

    #[test]
    fn email_and_username_checks() {
        let mut v = Validator::new();
        check_email(&mut v, "alice@example.com");
        check_username(&mut v, "alice.b-2");
        assert!(v.finish().is_ok());

        for bad in ["alice", "alice@", "@example.com", "a b@example.com", "alice@example"] {
            let mut v = Validator::new();
            check_email(&mut v, bad);
            assert!(v.finish().is_err(), "{} accepted", bad);
        }

        let mut v = Validator::new();
        check_username(&mut v, "has space");
        assert!(v.finish().is_err());
    }
}
