use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use sqlx::SqliteExecutor;
use time::{Duration, OffsetDateTime};
use uuid::Uuid;

use crate::{AppError, AppResult, db};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TokenType {
    Access,
    Refresh,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct Claims {
    pub user_id: i64,
    pub token_type: TokenType,
    pub jti: String,
    pub iat: i64,
    pub exp: i64,
}

#[derive(Debug, Serialize)]
pub struct TokenPair {
    pub refresh: String,
    pub access: String,
}

/// HS256 signing material plus the lifetimes of both token kinds.
#[derive(Clone)]
pub struct JwtKeys {
    encoding: EncodingKey,
    decoding: DecodingKey,
    access_ttl: Duration,
    refresh_ttl: Duration,
}

impl JwtKeys {
    pub fn new(secret: &[u8], access_ttl: Duration, refresh_ttl: Duration) -> Self {
        Self {
            encoding: EncodingKey::from_secret(secret),
            decoding: DecodingKey::from_secret(secret),
            access_ttl,
            refresh_ttl,
        }
    }

    fn encode(&self, user_id: i64, token_type: TokenType) -> anyhow::Result<String> {
        let now = OffsetDateTime::now_utc();
        let ttl = match token_type {
            TokenType::Access => self.access_ttl,
            TokenType::Refresh => self.refresh_ttl,
        };
        let claims = Claims {
            user_id,
            token_type,
            jti: Uuid::now_v7().simple().to_string(),
            iat: now.unix_timestamp(),
            exp: (now + ttl).unix_timestamp(),
        };
        Ok(jsonwebtoken::encode(&Header::new(Algorithm::HS256), &claims, &self.encoding)?)
    }

    pub fn pair(&self, user_id: i64) -> anyhow::Result<TokenPair> {
        Ok(TokenPair {
            refresh: self.encode(user_id, TokenType::Refresh)?,
            access: self.encode(user_id, TokenType::Access)?,
        })
    }

    /// Checks signature, expiry and that the token is of the `expected` kind.
    pub fn decode(&self, token: &str, expected: TokenType) -> AppResult<Claims> {
        let claims = jsonwebtoken::decode::<Claims>(token, &self.decoding, &Validation::new(Algorithm::HS256))
            .map_err(|e| {
                tracing::debug!(error = %e, "rejected token");
                AppError::unauthorized("Token is invalid or expired")
            })?
            .claims;
        if claims.token_type != expected {
            return Err(AppError::unauthorized("Token has wrong type"));
        }
        Ok(claims)
    }
}

pub async fn is_blacklisted(db: impl SqliteExecutor<'_>, jti: &str) -> sqlx::Result<bool> {
    let row: Option<(String,)> = sqlx::query_as("SELECT jti FROM blacklisted_tokens WHERE jti=?")
        .bind(jti)
        .fetch_optional(db)
        .await?;
    Ok(row.is_some())
}

pub async fn blacklist(db: impl SqliteExecutor<'_>, claims: &Claims) -> sqlx::Result<()> {
    let expires_at = OffsetDateTime::from_unix_timestamp(claims.exp).unwrap_or_else(|_| db::now());
    sqlx::query("INSERT OR IGNORE INTO blacklisted_tokens (jti,user_id,expires_at,blacklisted_at) VALUES (?,?,?,?)")
        .bind(&claims.jti)
        .bind(claims.user_id)
        .bind(expires_at)
        .bind(db::now())
        .execute(db)
        .await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn keys() -> JwtKeys {
        JwtKeys::new(b"test-secret", Duration::minutes(5), Duration::days(1))
    }

    #[test]
    fn pair_decodes_by_kind() {
        let keys = keys();
        let pair = keys.pair(42).unwrap();

        let access = keys.decode(&pair.access, TokenType::Access).unwrap();
        assert_eq!(access.user_id, 42);
        let refresh = keys.decode(&pair.refresh, TokenType::Refresh).unwrap();
        assert_ne!(access.jti, refresh.jti);

        assert!(keys.decode(&pair.refresh, TokenType::Access).is_err());
        assert!(keys.decode(&pair.access, TokenType::Refresh).is_err());
    }

    #[test]
    fn foreign_and_expired_tokens_fail() {
        let other = JwtKeys::new(b"other", Duration::minutes(5), Duration::days(1));
        let pair = other.pair(1).unwrap();
        assert!(keys().decode(&pair.access, TokenType::Access).is_err());

        let stale = JwtKeys::new(b"test-secret", Duration::minutes(-10), Duration::days(1));
        let pair = stale.pair(1).unwrap();
        let err = keys().decode(&pair.access, TokenType::Access).unwrap_err();
        assert_eq!(err.status(), axum::http::StatusCode::UNAUTHORIZED);
    }
}
