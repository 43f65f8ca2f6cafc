use rand::Rng;
use sqlx::SqlitePool;
use time::Duration;

use crate::{AppError, AppResult, db};

use super::User;

pub fn generate_otp() -> String {
    rand::rng().random_range(100_000..1_000_000).to_string()
}

/// Stores a fresh code on the user and resets verification.
pub async fn issue_otp(db_pool: &SqlitePool, user_id: i64, ttl_minutes: i64) -> sqlx::Result<String> {
    let otp = generate_otp();
    sqlx::query("UPDATE users SET otp=?, otp_exp=?, otp_verified=0 WHERE id=?")
        .bind(&otp)
        .bind(db::now() + Duration::minutes(ttl_minutes))
        .bind(user_id)
        .execute(db_pool)
        .await?;
    Ok(otp)
}

/// Finds the unverified, unexpired owner of `otp` and marks it verified.
///
/// Codes are not unique across users; `email` narrows the match when given,
/// otherwise the most recently created matching user wins.
pub async fn verify_otp(db_pool: &SqlitePool, otp: &str, email: Option<&str>) -> AppResult<User> {
    let candidates: Vec<User> = match email {
        Some(email) => sqlx::query_as(
            "SELECT * FROM users WHERE otp=? AND otp_verified=0 AND email=? ORDER BY id DESC",
        )
        .bind(otp)
        .bind(email.trim())
        .fetch_all(db_pool)
        .await?,
        None => sqlx::query_as("SELECT * FROM users WHERE otp=? AND otp_verified=0 ORDER BY id DESC")
            .bind(otp)
            .fetch_all(db_pool)
            .await?,
    };

    let now = db::now();
    let Some(mut user) = candidates
        .into_iter()
        .find(|u| u.otp_exp.is_some_and(|exp| exp >= now))
    else {
        return Err(AppError::bad_request("Invalid or expired OTP."));
    };

    sqlx::query("UPDATE users SET otp_verified=1 WHERE id=?")
        .bind(user.id)
        .execute(db_pool)
        .await?;
    user.otp_verified = true;
    Ok(user)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn codes_are_six_digits() {
        for _ in 0..100 {
            let otp = generate_otp();
            assert_eq!(otp.len(), 6);
            assert!(otp.chars().all(|c| c.is_ascii_digit()));
        }
    }
}
