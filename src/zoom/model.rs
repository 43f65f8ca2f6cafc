use serde::{Deserialize, Serialize};
use sqlx::{FromRow, SqliteExecutor};
use time::OffsetDateTime;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "lowercase")]
#[sqlx(rename_all = "lowercase")]
pub enum MeetingStatus {
    Scheduled,
    Started,
    Ended,
    Cancelled,
}

impl MeetingStatus {
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "scheduled" => Some(Self::Scheduled),
            "started" => Some(Self::Started),
            "ended" => Some(Self::Ended),
            "cancelled" => Some(Self::Cancelled),
            _ => None,
        }
    }
}

#[derive(Clone, Debug, FromRow, Serialize)]
pub struct ZoomMeeting {
    pub id: String,
    pub zoom_meeting_id: String,
    #[serde(rename = "host")]
    pub host_id: i64,
    #[serde(rename = "participant")]
    pub participant_id: Option<i64>,
    pub participant_email: Option<String>,
    pub topic: String,
    pub agenda: Option<String>,
    #[serde(with = "time::serde::rfc3339")]
    pub scheduled_time: OffsetDateTime,
    pub duration: i64,
    pub join_url: String,
    pub start_url: String,
    pub password: String,
    pub status: MeetingStatus,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
    #[serde(skip)]
    pub updated_at: OffsetDateTime,
}

/// What Zoom hands back for a freshly created meeting.
#[derive(Clone, Debug, Deserialize)]
pub struct CreatedMeeting {
    pub id: serde_json::Value,
    pub topic: Option<String>,
    pub duration: Option<i64>,
    pub join_url: String,
    pub start_url: String,
    #[serde(default)]
    pub password: String,
}

impl CreatedMeeting {
    /// Zoom ids are numbers, but nothing stops them arriving as strings.
    pub fn zoom_id(&self) -> String {
        match &self.id {
            serde_json::Value::String(s) => s.clone(),
            other => other.to_string(),
        }
    }
}

/// Columns for a new row; everything else is defaulted by `insert`.
pub struct NewMeeting<'a> {
    pub created: &'a CreatedMeeting,
    pub host_id: i64,
    pub participant_id: Option<i64>,
    pub participant_email: Option<&'a str>,
    pub topic: &'a str,
    pub agenda: Option<&'a str>,
    pub scheduled_time: OffsetDateTime,
    pub duration: i64,
    pub status: MeetingStatus,
}

impl ZoomMeeting {
    pub async fn insert(db: impl SqliteExecutor<'_>, new: NewMeeting<'_>) -> sqlx::Result<Self> {
        let now = crate::db::now();
        sqlx::query_as(
            "INSERT INTO zoom_meetings \
             (id,zoom_meeting_id,host_id,participant_id,participant_email,topic,agenda,\
              scheduled_time,duration,join_url,start_url,password,status,created_at,updated_at) \
             VALUES (?,?,?,?,?,?,?,?,?,?,?,?,?,?,?) RETURNING *",
        )
        .bind(uuid::Uuid::now_v7().to_string())
        .bind(new.created.zoom_id())
        .bind(new.host_id)
        .bind(new.participant_id)
        .bind(new.participant_email)
        .bind(new.topic)
        .bind(new.agenda)
        .bind(new.scheduled_time)
        .bind(new.duration)
        .bind(&new.created.join_url)
        .bind(&new.created.start_url)
        .bind(&new.created.password)
        .bind(new.status)
        .bind(now)
        .bind(now)
        .fetch_one(db)
        .await
    }

    /// Looks a meeting up by row id or Zoom id, visible to its host and participant.
    pub async fn visible_to(
        db: impl SqliteExecutor<'_>,
        key: &str,
        user_id: i64,
        host_only: bool,
    ) -> sqlx::Result<Option<Self>> {
        let column = if uuid::Uuid::parse_str(key).is_ok() { "id" } else { "zoom_meeting_id" };
        let access = if host_only {
            "host_id=?"
        } else {
            "(host_id=? OR participant_id=?)"
        };
        let sql = format!("SELECT * FROM zoom_meetings WHERE {column}=? AND {access}");

        let mut query = sqlx::query_as::<_, Self>(&sql).bind(key).bind(user_id);
        if !host_only {
            query = query.bind(user_id);
        }
        query.fetch_optional(db).await
    }

    pub async fn for_user(db: impl SqliteExecutor<'_>, user_id: i64) -> sqlx::Result<Vec<Self>> {
        sqlx::query_as(
            "SELECT * FROM zoom_meetings WHERE host_id=? OR participant_id=? \
             ORDER BY julianday(scheduled_time) DESC",
        )
        .bind(user_id)
        .bind(user_id)
        .fetch_all(db)
        .await
    }

    /// Scheduled meetings whose start falls in `[from, until]`.
    pub async fn starting_between(
        db: impl SqliteExecutor<'_>,
        from: OffsetDateTime,
        until: OffsetDateTime,
    ) -> sqlx::Result<Vec<Self>> {
        sqlx::query_as(
            "SELECT * FROM zoom_meetings WHERE status='scheduled' \
             AND julianday(scheduled_time) BETWEEN julianday(?) AND julianday(?) \
             ORDER BY julianday(scheduled_time)",
        )
        .bind(from)
        .bind(until)
        .fetch_all(db)
        .await
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn zoom_ids_come_back_as_text() {
        let created: CreatedMeeting = serde_json::from_value(json!({
            "id": 85746352341_i64,
            "topic": "Consult",
            "join_url": "https://zoom.us/j/1",
            "start_url": "https://zoom.us/s/1",
        }))
        .unwrap();
        assert_eq!(created.zoom_id(), "85746352341");
        assert_eq!(created.password, "");

        let created: CreatedMeeting = serde_json::from_value(json!({
            "id": "123",
            "join_url": "j",
            "start_url": "s",
            "password": "abc",
        }))
        .unwrap();
        assert_eq!(created.zoom_id(), "123");
    }
}
