mod common;

use std::sync::atomic::Ordering;

use axum::http::{Method, StatusCode};
use common::TestApp;
use serde_json::json;

#[tokio::test]
async fn scheduling_links_mails_and_notifies_the_participant() {
    let app = TestApp::new().await;
    let (_, host_token) = app.professional("host@example.com").await;
    let (_, guest_token) = app.customer("guest@example.com").await;

    let (status, body) = app
        .post(
            "/zoom/meetings",
            Some(&host_token),
            json!({"topic": "Intro call", "duration": 45, "participant_email": "guest@example.com"}),
        )
        .await;
    assert_eq!(status, StatusCode::CREATED, "{body}");
    let meeting = &body["data"];
    assert_eq!(meeting["topic"], "Intro call");
    assert_eq!(meeting["duration"], 45);
    assert_eq!(meeting["status"], "scheduled");
    assert_eq!(meeting["host_name"], "host");
    assert!(meeting["participant"].is_i64());
    assert_eq!(meeting["password"], "pw123");

    let mail = app.state.mailer.sent().await;
    assert_eq!(mail.len(), 1);
    assert_eq!(mail[0].to, "guest@example.com");
    assert_eq!(mail[0].subject, "Zoom Meeting: Intro call");
    assert!(mail[0].body.contains(meeting["join_url"].as_str().unwrap()));

    let (_, body) = app.get("/notifications", &guest_token).await;
    assert_eq!(body["data"]["total"], 1);
    assert_eq!(body["data"]["items"][0]["meta"]["meeting_id"], meeting["id"]);

    let (_, body) = app.get("/zoom/meetings", &guest_token).await;
    assert_eq!(body["data"].as_array().unwrap().len(), 1);

    let (_, stranger_token) = app.customer("stranger@example.com").await;
    let (status, body) = app.get("/zoom/meetings", &stranger_token).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"], json!([]));
}

#[tokio::test]
async fn unknown_participants_get_mail_but_no_link() {
    let app = TestApp::new().await;
    let (_, host_token) = app.customer("host@example.com").await;

    let (status, body) = app
        .post("/zoom/meetings", Some(&host_token), json!({"participant_email": "outsider@example.com"}))
        .await;
    assert_eq!(status, StatusCode::CREATED, "{body}");
    assert_eq!(body["data"]["topic"], "Professional Meeting");
    assert_eq!(body["data"]["duration"], 60);
    assert!(body["data"]["participant"].is_null());
    assert_eq!(body["data"]["participant_email"], "outsider@example.com");
    assert_eq!(app.state.mailer.sent().await.len(), 1);
}

#[tokio::test]
async fn scheduling_validates_input() {
    let app = TestApp::new().await;
    let (_, token) = app.customer("host@example.com").await;

    let (status, body) = app
        .post(
            "/zoom/meetings",
            Some(&token),
            json!({
                "topic": "t".repeat(201),
                "duration": 5,
                "scheduled_time": "2001-01-01T00:00:00Z",
                "participant_email": "nope",
            }),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["data"]["scheduled_time"][0], "Time must be in future");
    assert!(body["data"]["topic"].is_array());
    assert!(body["data"]["duration"].is_array());
    assert!(body["data"]["participant_email"].is_array());
    assert_eq!(app.zoom.create_calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn scope_errors_retry_once_with_a_fresh_token() {
    let app = TestApp::new().await;
    let (_, token) = app.customer("host@example.com").await;

    app.zoom.scope_failures.store(1, Ordering::SeqCst);
    let (status, body) = app.post("/zoom/meetings", Some(&token), json!({})).await;
    assert_eq!(status, StatusCode::CREATED, "{body}");
    assert_eq!(app.zoom.create_calls.load(Ordering::SeqCst), 2);
    assert_eq!(app.zoom.token_calls.load(Ordering::SeqCst), 2);

    // the fresh token is cached for the next request
    app.post("/zoom/meetings", Some(&token), json!({})).await;
    assert_eq!(app.zoom.token_calls.load(Ordering::SeqCst), 2);

    app.zoom.scope_failures.store(2, Ordering::SeqCst);
    let (status, body) = app.post("/zoom/meetings", Some(&token), json!({})).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["message"].as_str().unwrap().starts_with("Error: Meeting creation failed: 400"));
}

#[tokio::test]
async fn missing_credentials_fail_cleanly() {
    let app = TestApp::with_zoom(false).await;
    let (_, token) = app.customer("host@example.com").await;

    let (status, body) = app.post("/zoom/meetings", Some(&token), json!({})).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["message"], "Error: Zoom credentials are not configured");

    let (status, body) = app.post("/zoom/instant-meeting", Some(&token), json!({})).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["message"], "Error: Zoom credentials are not configured");

    let (status, body) = app.get("/zoom/test", &token).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["data"]["api_ready"], false);
}

#[tokio::test]
async fn join_start_and_access_rules() {
    let app = TestApp::new().await;
    let (_, host_token) = app.professional("host@example.com").await;
    let (_, guest_token) = app.customer("guest@example.com").await;
    let (_, stranger_token) = app.customer("stranger@example.com").await;

    let (_, body) = app
        .post("/zoom/meetings", Some(&host_token), json!({"participant_email": "guest@example.com"}))
        .await;
    let id = body["data"]["id"].as_str().unwrap().to_owned();
    let zoom_id = body["data"]["zoom_meeting_id"].as_str().unwrap().to_owned();

    // either id works for join
    for key in [&id, &zoom_id] {
        let (status, body) = app.get(&format!("/zoom/join/{key}"), &guest_token).await;
        assert_eq!(status, StatusCode::OK, "{body}");
        assert_eq!(body["data"]["meeting_id"], zoom_id);
    }

    let (status, body) = app.get(&format!("/zoom/join/{id}"), &stranger_token).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["message"], "Meeting not found or access denied");
    let (status, _) = app.get(&format!("/zoom/meetings/{id}"), &stranger_token).await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    // only the host may start
    let (status, _) = app.get(&format!("/zoom/start/{id}"), &guest_token).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    let (status, body) = app.get(&format!("/zoom/start/{zoom_id}"), &host_token).await;
    assert_eq!(status, StatusCode::OK);
    assert!(body["data"]["start_url"].is_string());

    let (_, body) = app.get(&format!("/zoom/meetings/{id}"), &guest_token).await;
    assert_eq!(body["data"]["status"], "started");
}

#[tokio::test]
async fn meetings_can_be_edited_and_removed() {
    let app = TestApp::new().await;
    let (_, token) = app.customer("host@example.com").await;
    let (_, body) = app.post("/zoom/meetings", Some(&token), json!({"topic": "Old"})).await;
    let uri = format!("/zoom/meetings/{}", body["data"]["id"].as_str().unwrap());

    let (status, body) = app
        .request(
            Method::PATCH,
            &uri,
            Some(&token),
            Some(json!({"topic": "New", "duration": 90, "status": "cancelled"})),
        )
        .await;
    assert_eq!(status, StatusCode::OK, "{body}");
    assert_eq!(body["data"]["topic"], "New");
    assert_eq!(body["data"]["duration"], 90);
    assert_eq!(body["data"]["status"], "cancelled");

    let (status, body) = app
        .request(Method::PATCH, &uri, Some(&token), Some(json!({"status": "paused"})))
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["data"]["status"].is_array());

    let (status, _) = app.request(Method::DELETE, &uri, Some(&token), None).await;
    assert_eq!(status, StatusCode::OK);
    let (status, _) = app.get(&uri, &token).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn instant_meetings_start_immediately() {
    let app = TestApp::new().await;
    let (_, token) = app.customer("host@example.com").await;

    let (status, body) = app.post("/zoom/instant-meeting", Some(&token), json!({})).await;
    assert_eq!(status, StatusCode::OK, "{body}");
    assert_eq!(body["data"]["topic"], "Instant Meeting");

    let (_, body) = app.get("/zoom/meetings", &token).await;
    assert_eq!(body["data"][0]["status"], "started");
    assert_eq!(body["data"][0]["duration"], 60);
}

#[tokio::test]
async fn connection_test_reports_the_account() {
    let app = TestApp::new().await;
    let (_, token) = app.customer("host@example.com").await;

    let (status, body) = app.get("/zoom/test", &token).await;
    assert_eq!(status, StatusCode::OK, "{body}");
    assert_eq!(body["data"]["email"], "host@zoom.test");
    assert_eq!(body["data"]["api_ready"], true);
    assert_eq!(body["data"]["read_scope"], true);

    let (status, _) = app.request(Method::GET, "/zoom/test", None, None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}
