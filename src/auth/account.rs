use axum::{debug_handler, extract::State};
use serde::Deserialize;
use serde_json::json;
use sqlx::SqlitePool;
use validator::{Validate, ValidationError};

use crate::{
    AppError, AppResult, AppState,
    res::{self, ApiResponse, JsonBody},
    validate::{FieldErrors, trimmed},
};

use super::{AuthUser, UserType};

#[derive(Deserialize, Validate)]
pub(crate) struct ChooseRoleRequest {
    #[serde(default, deserialize_with = "trimmed")]
    #[validate(required(message = "This field is required."), custom(function = "role_choice"))]
    user_type: Option<String>,
}

fn role_choice(choice: &str) -> Result<(), ValidationError> {
    match UserType::parse(choice) {
        Some(_) => Ok(()),
        None => Err(ValidationError::new("invalid_choice")
            .with_message(format!("\"{choice}\" is not a valid choice.").into())),
    }
}

#[debug_handler(state = AppState)]
pub(crate) async fn choose_role(
    State(db_pool): State<SqlitePool>,
    AuthUser(user): AuthUser,
    JsonBody(body): JsonBody<ChooseRoleRequest>,
) -> AppResult<ApiResponse> {
    FieldErrors::of(&body).check("Role Selection Failed")?;
    let Some(choice) = body.user_type else {
        return Err(AppError::bad_request("Role Selection Failed"));
    };
    let user_type = UserType::parse(&choice);

    if user.user_type.is_some() {
        return Err(AppError::bad_request("Role already selected."));
    }

    sqlx::query("UPDATE users SET user_type=? WHERE id=?")
        .bind(user_type)
        .bind(user.id)
        .execute(&db_pool)
        .await?;

    tracing::info!(user_id = user.id, role = %choice, "role selected");
    res::ok("Role selected successfully.", json!({}))
}

#[debug_handler(state = AppState)]
pub(crate) async fn get_profile(AuthUser(user): AuthUser) -> AppResult<ApiResponse> {
    res::ok("Your request Accepted", user.profile())
}

/// Partial update; an empty string clears an optional field.
#[derive(Deserialize, Validate)]
pub(crate) struct ProfileUpdate {
    #[validate(length(max = 255, message = "Ensure this field has no more than 255 characters."))]
    name: Option<String>,
    profile_pic: Option<String>,
    youtube_link: Option<String>,
    instagram_link: Option<String>,
    tiktok_link: Option<String>,
}

fn cleared(value: String) -> Option<String> {
    Some(value.trim().to_owned()).filter(|v| !v.is_empty())
}

#[debug_handler(state = AppState)]
pub(crate) async fn update_profile(
    State(db_pool): State<SqlitePool>,
    AuthUser(mut user): AuthUser,
    JsonBody(body): JsonBody<ProfileUpdate>,
) -> AppResult<ApiResponse> {
    FieldErrors::of(&body).check("Profile updated failed")?;

    if let Some(name) = body.name {
        user.name = name.trim().to_owned();
    }
    if let Some(pic) = body.profile_pic {
        user.profile_pic = cleared(pic);
    }
    if let Some(link) = body.youtube_link {
        user.youtube_link = cleared(link);
    }
    if let Some(link) = body.instagram_link {
        user.instagram_link = cleared(link);
    }
    if let Some(link) = body.tiktok_link {
        user.tiktok_link = cleared(link);
    }

    sqlx::query("UPDATE users SET name=?, profile_pic=?, youtube_link=?, instagram_link=?, tiktok_link=? WHERE id=?")
        .bind(&user.name)
        .bind(&user.profile_pic)
        .bind(&user.youtube_link)
        .bind(&user.instagram_link)
        .bind(&user.tiktok_link)
        .bind(user.id)
        .execute(&db_pool)
        .await?;

    res::ok("Profile updated", user.profile())
}
