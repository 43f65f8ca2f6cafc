use axum::{Router, routing::{get, post}};

use crate::AppState;

mod client;
mod meetings;
mod model;

pub use client::{ConnectionSummary, ZoomClient, ZoomError, zoom_time};
pub use model::{CreatedMeeting, MeetingStatus, NewMeeting, ZoomMeeting};

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/meetings", get(meetings::list_meetings).post(meetings::create_meeting))
        .route(
            "/meetings/{id}",
            get(meetings::get_meeting)
                .patch(meetings::update_meeting)
                .delete(meetings::delete_meeting),
        )
        .route("/instant-meeting", post(meetings::instant_meeting))
        .route("/join/{id}", get(meetings::join_meeting))
        .route("/start/{id}", get(meetings::start_meeting))
        .route("/test", get(meetings::test_connection))
}
