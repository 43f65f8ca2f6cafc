use serde::{Deserialize, Serialize};
use serde_json::Value;
use sqlx::{FromRow, SqliteExecutor, types::Json};
use time::OffsetDateTime;

use crate::{auth::UserType, db};

/// Categories a professional can opt out of.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NotificationKind {
    NewBooking,
    AppointmentReminder,
    ClientMessage,
}

#[derive(Debug, Clone, FromRow, Serialize)]
pub struct Notification {
    pub id: i64,
    #[serde(rename = "receiver")]
    pub receiver_id: i64,
    pub title: String,
    pub message: String,
    pub user_type: UserType,
    pub is_read: bool,
    pub meta: Json<Value>,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
}

#[derive(Debug, Clone, FromRow, Serialize)]
pub struct NotificationPreference {
    #[serde(skip)]
    pub professional_id: i64,
    pub new_booking_notifications: bool,
    pub appointment_reminders: bool,
    pub client_messages: bool,
    #[serde(skip)]
    pub updated_at: OffsetDateTime,
}

impl NotificationPreference {
    pub fn allows(&self, kind: NotificationKind) -> bool {
        match kind {
            NotificationKind::NewBooking => self.new_booking_notifications,
            NotificationKind::AppointmentReminder => self.appointment_reminders,
            NotificationKind::ClientMessage => self.client_messages,
        }
    }

    pub async fn find(db: impl SqliteExecutor<'_>, professional_id: i64) -> sqlx::Result<Option<Self>> {
        sqlx::query_as("SELECT * FROM notification_preferences WHERE professional_id=?")
            .bind(professional_id)
            .fetch_optional(db)
            .await
    }

    /// Returns the stored row, inserting the all-enabled default first if needed.
    pub async fn get_or_create(db: impl SqliteExecutor<'_>, professional_id: i64) -> sqlx::Result<Self> {
        sqlx::query_as(
            "INSERT INTO notification_preferences (professional_id,updated_at) VALUES (?,?) \
             ON CONFLICT (professional_id) DO UPDATE SET professional_id=excluded.professional_id \
             RETURNING *",
        )
        .bind(professional_id)
        .bind(db::now())
        .fetch_one(db)
        .await
    }
}
