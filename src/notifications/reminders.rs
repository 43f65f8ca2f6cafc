use std::time::Duration;

use serde_json::json;
use sqlx::SqlitePool;
use time::macros::format_description;
use tokio::task::JoinHandle;

use crate::{
    AppResult,
    auth::{User, UserType},
    channels::ChannelLayer,
    db,
    zoom::ZoomMeeting,
};

use super::{NotificationKind, create_notification};

pub const REMINDER_INTERVAL: Duration = Duration::from_secs(5 * 60);
pub const REMINDER_TITLE: &str = "Upcoming Meeting Reminder";

async fn already_reminded(db_pool: &SqlitePool, receiver_id: i64, meeting_id: &str) -> sqlx::Result<bool> {
    let found: Option<(i64,)> = sqlx::query_as(
        "SELECT 1 FROM notifications \
         WHERE receiver_id=? AND title=? AND json_extract(meta,'$.meeting_id')=? LIMIT 1",
    )
    .bind(receiver_id)
    .bind(REMINDER_TITLE)
    .bind(meeting_id)
    .fetch_optional(db_pool)
    .await?;
    Ok(found.is_some())
}

/// Reminds host and registered participant of scheduled meetings starting
/// within the hour. Returns how many reminders were stored.
#[tracing::instrument(skip_all)]
pub async fn send_meeting_reminders(db_pool: &SqlitePool, channels: &ChannelLayer) -> AppResult<usize> {
    let now = db::now();
    let meetings = ZoomMeeting::starting_between(db_pool, now, now + time::Duration::hours(1)).await?;
    if meetings.is_empty() {
        tracing::debug!("no upcoming meetings");
        return Ok(0);
    }

    let mut sent = 0;
    for meeting in meetings {
        let start = meeting
            .scheduled_time
            .format(format_description!("[hour]:[minute]"))
            .unwrap_or_default();

        let receivers = [Some(meeting.host_id), meeting.participant_id];
        for receiver_id in receivers.into_iter().flatten() {
            if already_reminded(db_pool, receiver_id, &meeting.id).await? {
                continue;
            }
            let Some(receiver) = User::by_id(db_pool, receiver_id).await? else {
                continue;
            };

            let message = format!("Your meeting \"{}\" starts at {start} UTC.", meeting.topic);
            let stored = create_notification(
                db_pool,
                channels,
                &receiver,
                REMINDER_TITLE,
                &message,
                receiver.user_type.unwrap_or(UserType::Customer),
                json!({ "meeting_id": meeting.id }),
                Some(NotificationKind::AppointmentReminder),
            )
            .await?;
            if stored.is_some() {
                sent += 1;
            }
        }
    }

    tracing::info!(sent, "meeting reminders sent");
    Ok(sent)
}

/// Runs [`send_meeting_reminders`] every [`REMINDER_INTERVAL`] until the runtime stops.
pub fn spawn(db_pool: SqlitePool, channels: ChannelLayer) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(REMINDER_INTERVAL);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        loop {
            ticker.tick().await;
            if let Err(e) = send_meeting_reminders(&db_pool, &channels).await {
                tracing::error!(error = %e, "meeting reminder run failed");
            }
        }
    })
}
