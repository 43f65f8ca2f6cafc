use axum::{debug_handler, extract::State};
use serde::Deserialize;
use serde_json::{Value, json};
use sqlx::SqlitePool;
use validator::Validate;

use crate::{
    AppError, AppResult, AppState, GetField,
    config::Settings,
    res::{self, ApiResponse, JsonBody},
    validate::{FieldErrors, trimmed},
};

use super::{ClientProvider, JwtKeys, User, clients, user::create_user};

const FETCH_FAILED: &str = "Failed to fetch Google user info. Token may be expired or invalid.";
const EMAIL_TAKEN: &str = "You already have an account in this email.";

/// The parts of a provider profile a login needs.
#[derive(Debug, Clone, PartialEq)]
pub struct SocialProfile {
    pub provider: ClientProvider,
    pub uid: String,
    pub email: Option<String>,
    pub given_name: Option<String>,
    pub family_name: Option<String>,
    pub name: Option<String>,
    pub picture: Option<String>,
    pub extra_data: Value,
}

impl SocialProfile {
    pub fn from_userinfo(provider: ClientProvider, info: Value) -> AppResult<Self> {
        let uid = match provider {
            // v3 userinfo calls it `sub`, v2 `id`
            ClientProvider::Google => info
                .get_opt_str_field("sub")
                .or_else(|| info.get_opt_str_field("id")),
            ClientProvider::Github => info.get("id").and_then(|id| match id {
                Value::Number(n) => Some(n.to_string()),
                Value::String(s) => Some(s.clone()),
                _ => None,
            }),
        }
        .ok_or_else(|| AppError::bad_request(format!("{provider} profile has no id")))?;

        let picture = match provider {
            ClientProvider::Google => info.get_opt_str_field("picture"),
            ClientProvider::Github => info.get_opt_str_field("avatar_url"),
        };

        Ok(Self {
            provider,
            uid,
            email: info.get_opt_str_field("email"),
            given_name: info.get_opt_str_field("given_name"),
            family_name: info.get_opt_str_field("family_name"),
            name: info.get_opt_str_field("name"),
            picture,
            extra_data: info,
        })
    }

    /// Given + family name, else the provider's display name.
    fn display_name(&self) -> Option<String> {
        let combined = [self.given_name.as_deref(), self.family_name.as_deref()]
            .into_iter()
            .flatten()
            .collect::<Vec<_>>()
            .join(" ");
        Some(combined).filter(|n| !n.is_empty()).or_else(|| self.name.clone())
    }
}

async fn linked_user(db_pool: &SqlitePool, profile: &SocialProfile) -> sqlx::Result<Option<i64>> {
    let row: Option<(i64,)> = sqlx::query_as("SELECT user_id FROM social_accounts WHERE provider=? AND uid=?")
        .bind(profile.provider.as_str())
        .bind(&profile.uid)
        .fetch_optional(db_pool)
        .await?;
    Ok(row.map(|(id,)| id))
}

/// Signs a provider-authenticated user in, creating and linking the account on first use.
///
/// An unlinked provider identity whose email is already registered is refused
/// rather than silently merged into the existing account.
pub async fn complete_social_login(
    db_pool: &SqlitePool,
    jwt: &JwtKeys,
    profile: SocialProfile,
) -> AppResult<ApiResponse> {
    let linked = linked_user(db_pool, &profile).await?;

    if linked.is_none() {
        let Some(email) = profile.email.as_deref() else {
            return Err(AppError::bad_request("Social account has no email address."));
        };
        if User::by_email(db_pool, email).await?.is_some() {
            tracing::info!(provider = %profile.provider, "social signup blocked, email taken");
            return Err(AppError::bad_request(EMAIL_TAKEN).with_data(json!({ "detail": EMAIL_TAKEN })));
        }
    }

    let mut tx = db_pool.begin().await?;

    let user_id = match linked {
        Some(user_id) => {
            sqlx::query("UPDATE social_accounts SET extra_data=? WHERE provider=? AND uid=?")
                .bind(profile.extra_data.to_string())
                .bind(profile.provider.as_str())
                .bind(&profile.uid)
                .execute(&mut *tx)
                .await?;
            user_id
        }
        None => {
            let email = profile.email.as_deref().unwrap_or_default();
            let user_id = create_user(&mut *tx, email, "", None).await?;
            sqlx::query("INSERT INTO social_accounts (user_id,provider,uid,extra_data,created_at) VALUES (?,?,?,?,?)")
                .bind(user_id)
                .bind(profile.provider.as_str())
                .bind(&profile.uid)
                .bind(profile.extra_data.to_string())
                .bind(crate::db::now())
                .execute(&mut *tx)
                .await?;
            user_id
        }
    };

    let Some(mut user) = User::by_id(&mut *tx, user_id).await? else {
        return Err(AppError::unauthorized("User not found or inactive"));
    };
    if !user.is_active {
        return Err(AppError::unauthorized("User not found or inactive"));
    }

    let name = profile
        .display_name()
        .or_else(|| Some(user.name.clone()).filter(|n| !n.trim().is_empty()))
        .unwrap_or_else(|| user.email.clone());
    if user.profile_pic.is_none() {
        user.profile_pic = profile.picture.clone();
    }

    sqlx::query("UPDATE users SET name=?, profile_pic=?, otp=NULL, otp_exp=NULL, otp_verified=1 WHERE id=?")
        .bind(&name)
        .bind(&user.profile_pic)
        .bind(user.id)
        .execute(&mut *tx)
        .await?;
    tx.commit().await?;

    user.name = name;
    user.otp = None;
    user.otp_exp = None;
    user.otp_verified = true;

    tracing::info!(user_id = user.id, provider = %profile.provider, "social login");
    let tokens = jwt.pair(user.id)?;
    res::ok("Login successful", json!({ "tokens": tokens, "profile": user.profile() }))
}

#[derive(Deserialize, Validate)]
pub(crate) struct GoogleLoginRequest {
    #[serde(default, deserialize_with = "trimmed")]
    #[validate(required(message = "This field is required."))]
    access_token: Option<String>,
}

#[debug_handler(state = AppState)]
pub(crate) async fn google_login(
    State(db_pool): State<SqlitePool>,
    State(jwt): State<JwtKeys>,
    State(http): State<reqwest::Client>,
    State(settings): State<Settings>,
    JsonBody(body): JsonBody<GoogleLoginRequest>,
) -> AppResult<ApiResponse> {
    FieldErrors::of(&body).check("Social login failed.")?;
    let Some(access_token) = body.access_token else {
        return Err(AppError::bad_request("Social login failed."));
    };

    let info = clients::fetch_userinfo(&http, ClientProvider::Google, &settings.google_userinfo_url, &access_token)
        .await
        .map_err(|e| {
            tracing::warn!(error = %e, "google user info failed");
            AppError::bad_request(FETCH_FAILED).with_data(json!({ "detail": e.to_string() }))
        })?;

    let profile = SocialProfile::from_userinfo(ClientProvider::Google, info)?;
    complete_social_login(&db_pool, &jwt, profile).await
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn google_profile_names() {
        let profile = SocialProfile::from_userinfo(
            ClientProvider::Google,
            json!({"sub": "1", "email": "a@b.co", "given_name": "Ada", "family_name": "Lovelace", "name": "Countess"}),
        )
        .unwrap();
        assert_eq!(profile.display_name().as_deref(), Some("Ada Lovelace"));

        let profile = SocialProfile::from_userinfo(ClientProvider::Google, json!({"id": "2", "name": "Countess"})).unwrap();
        assert_eq!(profile.uid, "2");
        assert_eq!(profile.display_name().as_deref(), Some("Countess"));
    }

    #[test]
    fn github_ids_are_numbers() {
        let profile = SocialProfile::from_userinfo(
            ClientProvider::Github,
            json!({"id": 583231, "login": "octocat", "avatar_url": "https://x/y.png", "email": null}),
        )
        .unwrap();
        assert_eq!(profile.uid, "583231");
        assert_eq!(profile.email, None);
        assert_eq!(profile.picture.as_deref(), Some("https://x/y.png"));
        assert_eq!(profile.display_name(), None);
    }

    #[test]
    fn profiles_need_an_id() {
        assert!(SocialProfile::from_userinfo(ClientProvider::Google, json!({"email": "a@b.co"})).is_err());
    }
}
