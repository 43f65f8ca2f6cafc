use std::fmt;

use serde::{Deserialize, Serialize};
use sqlx::{FromRow, SqliteExecutor};
use time::OffsetDateTime;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "lowercase")]
#[sqlx(rename_all = "lowercase")]
pub enum UserType {
    Customer,
    Professional,
}

impl UserType {
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "customer" => Some(Self::Customer),
            "professional" => Some(Self::Professional),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Customer => "customer",
            Self::Professional => "professional",
        }
    }
}

impl fmt::Display for UserType {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Clone, Debug, FromRow)]
pub struct User {
    pub id: i64,
    pub email: String,
    pub password_hash: Option<String>,
    pub name: String,
    pub user_type: Option<UserType>,
    pub profile_pic: Option<String>,
    pub youtube_link: Option<String>,
    pub instagram_link: Option<String>,
    pub tiktok_link: Option<String>,
    pub is_active: bool,
    pub otp: Option<String>,
    pub otp_exp: Option<OffsetDateTime>,
    pub otp_verified: bool,
    pub created_at: OffsetDateTime,
}

impl User {
    pub async fn by_id(db: impl SqliteExecutor<'_>, id: i64) -> sqlx::Result<Option<User>> {
        sqlx::query_as("SELECT * FROM users WHERE id=?")
            .bind(id)
            .fetch_optional(db)
            .await
    }

    /// Case-insensitive lookup.
    pub async fn by_email(db: impl SqliteExecutor<'_>, email: &str) -> sqlx::Result<Option<User>> {
        sqlx::query_as("SELECT * FROM users WHERE email=? COLLATE NOCASE")
            .bind(email.trim())
            .fetch_optional(db)
            .await
    }

    /// Name to show other people; the email when no name was given.
    pub fn display_name(&self) -> &str {
        if self.name.trim().is_empty() { &self.email } else { &self.name }
    }

    pub fn is_professional(&self) -> bool {
        self.user_type == Some(UserType::Professional)
    }

    pub fn profile(&self) -> Profile {
        Profile {
            name: self.name.clone(),
            email: self.email.clone(),
            profile_pic: self.profile_pic.clone(),
            user_type: self.user_type,
            is_active: self.is_active,
            youtube_link: self.youtube_link.clone(),
            instagram_link: self.instagram_link.clone(),
            tiktok_link: self.tiktok_link.clone(),
        }
    }
}

/// What a user sees of their own account.
#[derive(Debug, Serialize)]
pub struct Profile {
    pub name: String,
    pub email: String,
    pub profile_pic: Option<String>,
    pub user_type: Option<UserType>,
    pub is_active: bool,
    pub youtube_link: Option<String>,
    pub instagram_link: Option<String>,
    pub tiktok_link: Option<String>,
}

/// Inserts an active user without a role. `password_hash` is `None` for social accounts.
pub async fn create_user(
    db: impl SqliteExecutor<'_>,
    email: &str,
    name: &str,
    password_hash: Option<&str>,
) -> sqlx::Result<i64> {
    let (id,): (i64,) = sqlx::query_as(
        "INSERT INTO users (email,password_hash,name,created_at) VALUES (?,?,?,?) RETURNING id",
    )
    .bind(email.trim())
    .bind(password_hash)
    .bind(name)
    .bind(crate::db::now())
    .fetch_one(db)
    .await?;

    tracing::info!(user_id = id, email, "user created");
    Ok(id)
}
