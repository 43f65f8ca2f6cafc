use axum::{debug_handler, extract::State};
use serde_json::Value;
use sqlx::SqlitePool;

use crate::{
    AppError, AppResult, AppState,
    auth::{AuthUser, User},
    db,
    res::{self, ApiResponse, JsonBody},
};

use super::NotificationPreference;

fn professional_only(user: &User) -> AppResult<()> {
    if !user.is_professional() {
        return Err(AppError::forbidden("Only professionals have preferences."));
    }
    Ok(())
}

/// Loose truthiness: `1`, `"yes"` and `[0]` are all true; `0`, `""`, `null` false.
fn truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().is_some_and(|n| n != 0.0),
        Value::String(s) => !s.is_empty(),
        Value::Array(a) => !a.is_empty(),
        Value::Object(o) => !o.is_empty(),
    }
}

#[debug_handler(state = AppState)]
pub(crate) async fn get_preferences(
    State(db_pool): State<SqlitePool>,
    AuthUser(user): AuthUser,
) -> AppResult<ApiResponse> {
    professional_only(&user)?;
    let pref = NotificationPreference::get_or_create(&db_pool, user.id).await?;
    res::ok("fetch your data successfully", pref)
}

#[debug_handler(state = AppState)]
pub(crate) async fn put_preferences(
    State(db_pool): State<SqlitePool>,
    AuthUser(user): AuthUser,
    JsonBody(body): JsonBody<Value>,
) -> AppResult<ApiResponse> {
    professional_only(&user)?;
    let mut pref = NotificationPreference::get_or_create(&db_pool, user.id).await?;

    if let Some(v) = body.get("new_booking_notifications") {
        pref.new_booking_notifications = truthy(v);
    }
    if let Some(v) = body.get("appointment_reminders") {
        pref.appointment_reminders = truthy(v);
    }
    if let Some(v) = body.get("client_messages") {
        pref.client_messages = truthy(v);
    }

    sqlx::query(
        "UPDATE notification_preferences \
         SET new_booking_notifications=?, appointment_reminders=?, client_messages=?, updated_at=? \
         WHERE professional_id=?",
    )
    .bind(pref.new_booking_notifications)
    .bind(pref.appointment_reminders)
    .bind(pref.client_messages)
    .bind(db::now())
    .bind(user.id)
    .execute(&db_pool)
    .await?;

    tracing::info!(user_id = user.id, "notification preferences updated");
    res::ok("Preferences updated", pref)
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn truthiness() {
        assert!(truthy(&json!(true)));
        assert!(truthy(&json!(1)));
        assert!(truthy(&json!("false")));
        assert!(!truthy(&json!(0)));
        assert!(!truthy(&json!("")));
        assert!(!truthy(&json!(null)));
        assert!(!truthy(&json!([])));
    }
}
