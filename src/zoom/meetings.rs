use axum::{debug_handler, extract::State};
use serde::{Deserialize, Serialize};
use serde_json::json;
use sqlx::SqlitePool;
use time::{Duration, OffsetDateTime, PrimitiveDateTime, format_description::well_known::Rfc3339, macros::format_description};
use validator::Validate;

use crate::{
    AppError, AppResult, AppState,
    auth::{AuthUser, User, UserType},
    channels::ChannelLayer,
    chat::Directory,
    db,
    mail::Mailer,
    notifications::{NotificationKind, create_notification},
    presence::Presence,
    res::{self, ApiResponse, JsonBody, PathParam},
    validate::{FieldErrors, trimmed},
};

use super::{MeetingStatus, NewMeeting, ZoomClient, ZoomMeeting};

const NOT_FOUND: &str = "Meeting not found or access denied";

#[derive(Serialize)]
struct MeetingView {
    #[serde(flatten)]
    meeting: ZoomMeeting,
    host_name: Option<String>,
}

async fn view(dir: &mut Directory<'_>, meeting: ZoomMeeting) -> AppResult<MeetingView> {
    let host_name = dir.get(Some(meeting.host_id)).await?.map(|host| host.name);
    Ok(MeetingView { meeting, host_name })
}

/// RFC 3339, or a bare `YYYY-MM-DDTHH:MM[:SS]` read as UTC.
fn parse_time(raw: &str) -> Option<OffsetDateTime> {
    let raw = raw.trim();
    if let Ok(at) = OffsetDateTime::parse(raw, &Rfc3339) {
        return Some(at);
    }
    PrimitiveDateTime::parse(raw, format_description!("[year]-[month]-[day]T[hour]:[minute]:[second]"))
        .or_else(|_| PrimitiveDateTime::parse(raw, format_description!("[year]-[month]-[day]T[hour]:[minute]")))
        .ok()
        .map(PrimitiveDateTime::assume_utc)
}

fn invitation(meeting: &ZoomMeeting, host: &User) -> String {
    let when = meeting
        .scheduled_time
        .format(format_description!(
            "[month repr:long] [day], [year] at [hour repr:12]:[minute] [period] UTC"
        ))
        .unwrap_or_default();
    format!(
        "You're invited to join a Zoom meeting:\n\n\
         Topic: {}\n\
         Time: {when}\n\
         Duration: {} minutes\n\n\
         Join URL: {}\n\
         Meeting ID: {}\n\
         Password: {}\n\n\
         Host: {}\n",
        meeting.topic,
        meeting.duration,
        meeting.join_url,
        meeting.zoom_meeting_id,
        meeting.password,
        host.display_name(),
    )
}

/// A participant is linked only when the email belongs to a registered user.
async fn find_participant(db_pool: &SqlitePool, email: Option<&str>) -> AppResult<Option<User>> {
    match email {
        Some(email) => Ok(User::by_email(db_pool, email).await?),
        None => Ok(None),
    }
}

#[debug_handler(state = AppState)]
pub(crate) async fn list_meetings(
    State(db_pool): State<SqlitePool>,
    State(presence): State<Presence>,
    AuthUser(user): AuthUser,
) -> AppResult<ApiResponse> {
    let meetings = ZoomMeeting::for_user(&db_pool, user.id).await?;

    let mut dir = Directory::new(&db_pool, &presence);
    let mut views = Vec::with_capacity(meetings.len());
    for meeting in meetings {
        views.push(view(&mut dir, meeting).await?);
    }
    res::ok("fetch your data successfully", views)
}

#[derive(Deserialize, Validate)]
pub(crate) struct CreateMeeting {
    #[serde(default, deserialize_with = "trimmed")]
    #[validate(length(max = 200, message = "Ensure this field has no more than 200 characters."))]
    topic: Option<String>,
    #[serde(default, deserialize_with = "trimmed")]
    agenda: Option<String>,
    #[serde(default, deserialize_with = "trimmed")]
    scheduled_time: Option<String>,
    #[validate(range(min = 15, max = 480, message = "Ensure this value is between 15 and 480."))]
    duration: Option<i64>,
    #[serde(default, deserialize_with = "trimmed")]
    #[validate(email(message = "Enter a valid email address."))]
    participant_email: Option<String>,
}

#[debug_handler(state = AppState)]
#[allow(clippy::too_many_arguments)]
pub(crate) async fn create_meeting(
    State(db_pool): State<SqlitePool>,
    State(channels): State<ChannelLayer>,
    State(presence): State<Presence>,
    State(mailer): State<Mailer>,
    State(zoom): State<ZoomClient>,
    AuthUser(host): AuthUser,
    JsonBody(body): JsonBody<CreateMeeting>,
) -> AppResult<ApiResponse> {
    let mut errors = FieldErrors::of(&body);
    let topic = body.topic.as_deref().unwrap_or("Professional Meeting");

    let now = db::now();
    let scheduled_time = match body.scheduled_time.as_deref() {
        None => now + Duration::minutes(30),
        Some(raw) => match parse_time(raw) {
            Some(at) if at > now => at,
            Some(_) => {
                errors.add("scheduled_time", "Time must be in future");
                now
            }
            None => {
                errors.add("scheduled_time", "Datetime has wrong format.");
                now
            }
        },
    };

    errors.check("Meeting creation failed")?;

    let duration = body.duration.unwrap_or(60);
    let participant_email = body.participant_email.as_deref();
    let agenda = body.agenda.as_deref().unwrap_or_default();
    let created = zoom
        .create_meeting(topic, duration, scheduled_time, agenda)
        .await
        .map_err(|e| AppError::bad_request(format!("Error: {e}")))?;

    let participant = find_participant(&db_pool, participant_email).await?;
    let meeting = ZoomMeeting::insert(
        &db_pool,
        NewMeeting {
            topic: created.topic.as_deref().unwrap_or(topic),
            duration: created.duration.unwrap_or(duration),
            created: &created,
            host_id: host.id,
            participant_id: participant.as_ref().map(|p| p.id),
            participant_email,
            agenda: Some(agenda),
            scheduled_time,
            status: MeetingStatus::Scheduled,
        },
    )
    .await?;
    tracing::info!(meeting_id = meeting.id, host = host.id, "meeting scheduled");

    if let Some(email) = participant_email
        && let Err(e) = mailer
            .send(email, &format!("Zoom Meeting: {}", meeting.topic), invitation(&meeting, &host))
            .await
    {
        tracing::error!(error = ?e, meeting_id = meeting.id, "invitation email failed");
    }

    if let Some(participant) = &participant {
        let when = meeting.scheduled_time.format(&Rfc3339).unwrap_or_default();
        let notified = create_notification(
            &db_pool,
            &channels,
            participant,
            "New Meeting Scheduled",
            &format!("{} scheduled \"{}\" for {when}.", host.display_name(), meeting.topic),
            participant.user_type.unwrap_or(UserType::Customer),
            json!({ "meeting_id": meeting.id }),
            Some(NotificationKind::NewBooking),
        )
        .await;
        if let Err(e) = notified {
            tracing::error!(error = %e, meeting_id = meeting.id, "meeting notification failed");
        }
    }

    let mut dir = Directory::new(&db_pool, &presence);
    res::created("Meeting created successfully", view(&mut dir, meeting).await?)
}

#[debug_handler(state = AppState)]
pub(crate) async fn get_meeting(
    PathParam(id): PathParam<String>,
    State(db_pool): State<SqlitePool>,
    State(presence): State<Presence>,
    AuthUser(user): AuthUser,
) -> AppResult<ApiResponse> {
    let Some(meeting) = ZoomMeeting::visible_to(&db_pool, &id, user.id, false).await? else {
        return Err(AppError::not_found(NOT_FOUND));
    };
    let mut dir = Directory::new(&db_pool, &presence);
    res::ok("fetch your data successfully", view(&mut dir, meeting).await?)
}

/// Partial update of the local row; absent fields are left alone and an empty
/// agenda clears it.
#[derive(Deserialize, Validate)]
pub(crate) struct UpdateMeeting {
    #[serde(default, deserialize_with = "trimmed")]
    #[validate(length(max = 200, message = "Ensure this field has no more than 200 characters."))]
    topic: Option<String>,
    agenda: Option<String>,
    #[serde(default, deserialize_with = "trimmed")]
    scheduled_time: Option<String>,
    #[validate(range(min = 15, max = 480, message = "Ensure this value is between 15 and 480."))]
    duration: Option<i64>,
    #[serde(default, deserialize_with = "trimmed")]
    status: Option<String>,
}

#[debug_handler(state = AppState)]
pub(crate) async fn update_meeting(
    PathParam(id): PathParam<String>,
    State(db_pool): State<SqlitePool>,
    State(presence): State<Presence>,
    AuthUser(user): AuthUser,
    JsonBody(body): JsonBody<UpdateMeeting>,
) -> AppResult<ApiResponse> {
    let Some(mut meeting) = ZoomMeeting::visible_to(&db_pool, &id, user.id, false).await? else {
        return Err(AppError::not_found(NOT_FOUND));
    };

    let mut errors = FieldErrors::of(&body);
    if let Some(raw) = body.scheduled_time.as_deref() {
        match parse_time(raw) {
            Some(at) => meeting.scheduled_time = at,
            None => errors.add("scheduled_time", "Datetime has wrong format."),
        }
    }
    if let Some(status) = body.status.as_deref() {
        match MeetingStatus::parse(status) {
            Some(status) => meeting.status = status,
            None => errors.add("status", format!("\"{status}\" is not a valid choice.")),
        }
    }
    errors.check("Meeting update failed")?;

    if let Some(topic) = body.topic {
        meeting.topic = topic;
    }
    if let Some(agenda) = body.agenda {
        meeting.agenda = Some(agenda.trim().to_owned()).filter(|a| !a.is_empty());
    }
    if let Some(duration) = body.duration {
        meeting.duration = duration;
    }

    meeting.updated_at = db::now();
    sqlx::query(
        "UPDATE zoom_meetings SET topic=?, agenda=?, scheduled_time=?, duration=?, status=?, updated_at=? \
         WHERE id=?",
    )
    .bind(&meeting.topic)
    .bind(&meeting.agenda)
    .bind(meeting.scheduled_time)
    .bind(meeting.duration)
    .bind(meeting.status)
    .bind(meeting.updated_at)
    .bind(&meeting.id)
    .execute(&db_pool)
    .await?;

    let mut dir = Directory::new(&db_pool, &presence);
    res::ok("Meeting updated", view(&mut dir, meeting).await?)
}

#[debug_handler(state = AppState)]
pub(crate) async fn delete_meeting(
    PathParam(id): PathParam<String>,
    State(db_pool): State<SqlitePool>,
    AuthUser(user): AuthUser,
) -> AppResult<ApiResponse> {
    let Some(meeting) = ZoomMeeting::visible_to(&db_pool, &id, user.id, false).await? else {
        return Err(AppError::not_found(NOT_FOUND));
    };
    sqlx::query("DELETE FROM zoom_meetings WHERE id=?")
        .bind(&meeting.id)
        .execute(&db_pool)
        .await?;
    tracing::info!(meeting_id = meeting.id, user_id = user.id, "meeting deleted");
    res::ok("Meeting deleted", json!({ "id": meeting.id }))
}

#[derive(Deserialize, Validate)]
pub(crate) struct InstantMeeting {
    #[serde(default, deserialize_with = "trimmed")]
    #[validate(length(max = 200, message = "Ensure this field has no more than 200 characters."))]
    topic: Option<String>,
    #[serde(default, deserialize_with = "trimmed")]
    #[validate(email(message = "Enter a valid email address."))]
    participant_email: Option<String>,
}

#[debug_handler(state = AppState)]
pub(crate) async fn instant_meeting(
    State(db_pool): State<SqlitePool>,
    State(zoom): State<ZoomClient>,
    AuthUser(host): AuthUser,
    JsonBody(body): JsonBody<InstantMeeting>,
) -> AppResult<ApiResponse> {
    FieldErrors::of(&body).check("Meeting creation failed")?;
    let topic = body.topic.as_deref().unwrap_or("Instant Meeting");
    let participant_email = body.participant_email.as_deref();

    let now = db::now();
    let created = zoom
        .create_meeting(topic, 60, now, "")
        .await
        .map_err(|e| AppError::bad_request(format!("Error: {e}")))?;

    let participant = find_participant(&db_pool, participant_email).await?;
    let meeting = ZoomMeeting::insert(
        &db_pool,
        NewMeeting {
            created: &created,
            host_id: host.id,
            participant_id: participant.map(|p| p.id),
            participant_email,
            topic,
            agenda: None,
            scheduled_time: now,
            duration: 60,
            status: MeetingStatus::Started,
        },
    )
    .await?;
    tracing::info!(meeting_id = meeting.id, host = host.id, "instant meeting started");

    res::ok(
        "Instant meeting created",
        json!({
            "meeting_id": meeting.id,
            "zoom_meeting_id": meeting.zoom_meeting_id,
            "start_url": meeting.start_url,
            "join_url": meeting.join_url,
            "password": meeting.password,
            "topic": meeting.topic,
        }),
    )
}

#[debug_handler(state = AppState)]
pub(crate) async fn join_meeting(
    PathParam(id): PathParam<String>,
    State(db_pool): State<SqlitePool>,
    AuthUser(user): AuthUser,
) -> AppResult<ApiResponse> {
    let Some(meeting) = ZoomMeeting::visible_to(&db_pool, &id, user.id, false).await? else {
        return Err(AppError::not_found(NOT_FOUND));
    };
    res::ok(
        "fetch your data successfully",
        json!({
            "join_url": meeting.join_url,
            "meeting_id": meeting.zoom_meeting_id,
            "password": meeting.password,
            "topic": meeting.topic,
        }),
    )
}

#[debug_handler(state = AppState)]
pub(crate) async fn start_meeting(
    PathParam(id): PathParam<String>,
    State(db_pool): State<SqlitePool>,
    AuthUser(user): AuthUser,
) -> AppResult<ApiResponse> {
    let Some(meeting) = ZoomMeeting::visible_to(&db_pool, &id, user.id, true).await? else {
        return Err(AppError::not_found(NOT_FOUND));
    };
    sqlx::query("UPDATE zoom_meetings SET status=?, updated_at=? WHERE id=?")
        .bind(MeetingStatus::Started)
        .bind(db::now())
        .bind(&meeting.id)
        .execute(&db_pool)
        .await?;

    res::ok(
        "fetch your data successfully",
        json!({
            "start_url": meeting.start_url,
            "meeting_id": meeting.zoom_meeting_id,
            "password": meeting.password,
            "topic": meeting.topic,
        }),
    )
}

#[debug_handler(state = AppState)]
pub(crate) async fn test_connection(
    State(zoom): State<ZoomClient>,
    AuthUser(_user): AuthUser,
) -> AppResult<ApiResponse> {
    match zoom.test_connection().await {
        Ok(summary) => res::ok(
            "Zoom connection successful!",
            json!({
                "user_id": summary.user_id,
                "email": summary.email,
                "account_id": summary.account_id,
                "read_scope": summary.read_scope,
                "api_ready": true,
            }),
        ),
        Err(e) => {
            tracing::error!(error = %e, "zoom connection test failed");
            Err(AppError::bad_request(format!("Connection test failed: {e}"))
                .with_data(json!({ "api_ready": false })))
        }
    }
}

#[cfg(test)]
mod tests {
    use time::macros::datetime;

    use super::*;

    #[test]
    fn times_accept_offsets_or_naive_utc() {
        assert_eq!(parse_time("2030-01-02T03:04:05+01:00"), Some(datetime!(2030-01-02 02:04:05 UTC)));
        assert_eq!(parse_time("2030-01-02T03:04:05Z"), Some(datetime!(2030-01-02 03:04:05 UTC)));
        assert_eq!(parse_time("2030-01-02T03:04"), Some(datetime!(2030-01-02 03:04 UTC)));
        assert_eq!(parse_time("tomorrow"), None);
    }
}
