mod common;

use axum::http::{Method, StatusCode};
use common::TestApp;
use prochat::{
    auth::UserType,
    channels::user_group,
    db,
    notifications::{NotificationKind, create_notification, reminders},
    zoom::{CreatedMeeting, MeetingStatus, NewMeeting, ZoomMeeting},
};
use serde_json::{Value, json};

#[tokio::test]
async fn created_notifications_are_pushed_and_listed() {
    let app = TestApp::new().await;
    let (user, token) = app.customer("n@example.com").await;
    let mut rx = app.state.channels.group_add(&user_group(user.id)).await;

    for n in 0..3 {
        create_notification(
            app.pool(),
            &app.state.channels,
            &user,
            &format!("title {n}"),
            "body",
            UserType::Customer,
            Value::Null,
            None,
        )
        .await
        .unwrap()
        .unwrap();
    }

    let frame: Value = serde_json::from_str(&rx.recv().await.unwrap()).unwrap();
    assert_eq!(frame["type"], "send_notification");
    assert_eq!(frame["message"]["title"], "title 0");
    assert_eq!(frame["message"]["meta"], json!({}));

    let (status, body) = app.get("/notifications?page_size=2", &token).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["total"], 3);
    assert_eq!(body["data"]["unread"], 3);
    assert_eq!(body["data"]["items"].as_array().unwrap().len(), 2);
    assert_eq!(body["data"]["items"][0]["title"], "title 2");
    let newest = body["data"]["items"][0]["id"].as_i64().unwrap();

    let (_, body) = app
        .request(Method::PATCH, &format!("/notifications/{newest}/read"), Some(&token), None)
        .await;
    assert_eq!(body["data"]["updated"], 1);

    let (_, body) = app.get("/notifications?is_read=0", &token).await;
    assert_eq!(body["data"]["total"], 2);
    let (_, body) = app.get("/notifications/unread-count", &token).await;
    assert_eq!(body["data"]["unread"], 2);

    let (status, body) = app.post("/notifications/mark-read", Some(&token), json!({"ids": ["1"]})).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["message"], "ids must be list[int]");

    let (_, body) = app.post("/notifications/mark-all-read", Some(&token), json!({})).await;
    assert_eq!(body["data"]["updated"], 2);
}

#[tokio::test]
async fn pages_past_the_end_are_empty() {
    let app = TestApp::new().await;
    let (user, token) = app.customer("far@example.com").await;
    create_notification(app.pool(), &app.state.channels, &user, "only", "body", UserType::Customer, Value::Null, None)
        .await
        .unwrap();

    let uri = format!("/notifications?page={}&page_size=100", i64::MAX);
    let (status, body) = app.get(&uri, &token).await;
    assert_eq!(status, StatusCode::OK, "{body}");
    assert_eq!(body["data"]["total"], 1);
    assert_eq!(body["data"]["items"], json!([]));
}

#[tokio::test]
async fn others_notifications_are_untouched() {
    let app = TestApp::new().await;
    let (owner, _) = app.customer("owner@example.com").await;
    let (_, intruder) = app.customer("intruder@example.com").await;
    let stored = create_notification(
        app.pool(),
        &app.state.channels,
        &owner,
        "mine",
        "body",
        UserType::Customer,
        json!({"k": 1}),
        None,
    )
    .await
    .unwrap()
    .unwrap();

    let (_, body) = app
        .post("/notifications/mark-read", Some(&intruder), json!({"ids": [stored.id]}))
        .await;
    assert_eq!(body["data"]["updated"], 0);
    let (_, body) = app.get("/notifications", &intruder).await;
    assert_eq!(body["data"]["total"], 0);
}

#[tokio::test]
async fn preferences_gate_professional_notifications() {
    let app = TestApp::new().await;
    let (pro, pro_token) = app.professional("pro@example.com").await;
    let (_, customer_token) = app.customer("cus@example.com").await;

    let (status, body) = app.get("/notifications/preferences", &customer_token).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(body["message"], "Only professionals have preferences.");

    let (_, body) = app.get("/notifications/preferences", &pro_token).await;
    assert_eq!(body["data"]["new_booking_notifications"], true);

    let (status, body) = app
        .request(
            Method::PUT,
            "/notifications/preferences",
            Some(&pro_token),
            Some(json!({"new_booking_notifications": 0})),
        )
        .await;
    assert_eq!(status, StatusCode::OK, "{body}");
    assert_eq!(body["data"]["new_booking_notifications"], false);
    assert_eq!(body["data"]["client_messages"], true);

    let suppressed = create_notification(
        app.pool(),
        &app.state.channels,
        &pro,
        "New Meeting Scheduled",
        "x",
        UserType::Professional,
        json!({}),
        Some(NotificationKind::NewBooking),
    )
    .await
    .unwrap();
    assert!(suppressed.is_none());

    let allowed = create_notification(
        app.pool(),
        &app.state.channels,
        &pro,
        "Reminder",
        "x",
        UserType::Professional,
        json!({}),
        Some(NotificationKind::AppointmentReminder),
    )
    .await
    .unwrap();
    assert!(allowed.is_some());
}

#[tokio::test]
async fn test_notification_is_pushed_not_stored() {
    let app = TestApp::new().await;
    let (user, token) = app.customer("t@example.com").await;
    let mut rx = app.state.channels.group_add(&user_group(user.id)).await;

    let (status, body) = app.post("/notifications/test", Some(&token), json!({"message": "hey"})).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["delivered"], 1);

    let frame: Value = serde_json::from_str(&rx.recv().await.unwrap()).unwrap();
    assert_eq!(frame["message"]["message"], "hey");
    let (_, body) = app.get("/notifications", &token).await;
    assert_eq!(body["data"]["total"], 0);
}

async fn meeting_at(app: &TestApp, host: i64, participant: Option<i64>, minutes: i64, status: MeetingStatus) -> ZoomMeeting {
    let created = CreatedMeeting {
        id: json!(format!("z{host}-{minutes}-{status:?}")),
        topic: None,
        duration: None,
        join_url: "https://zoom.test/j".to_owned(),
        start_url: "https://zoom.test/s".to_owned(),
        password: String::new(),
    };
    ZoomMeeting::insert(
        app.pool(),
        NewMeeting {
            created: &created,
            host_id: host,
            participant_id: participant,
            participant_email: None,
            topic: "Consult",
            agenda: None,
            scheduled_time: db::now() + time::Duration::minutes(minutes),
            duration: 60,
            status,
        },
    )
    .await
    .unwrap()
}

#[tokio::test]
async fn reminders_go_out_once_per_meeting() {
    let app = TestApp::new().await;
    let (pro, pro_token) = app.professional("host@example.com").await;
    let (customer, customer_token) = app.customer("guest@example.com").await;

    meeting_at(&app, pro.id, Some(customer.id), 30, MeetingStatus::Scheduled).await;
    // out of the window or not scheduled
    meeting_at(&app, pro.id, Some(customer.id), 180, MeetingStatus::Scheduled).await;
    meeting_at(&app, pro.id, Some(customer.id), 20, MeetingStatus::Cancelled).await;

    let sent = reminders::send_meeting_reminders(app.pool(), &app.state.channels).await.unwrap();
    assert_eq!(sent, 2);
    let again = reminders::send_meeting_reminders(app.pool(), &app.state.channels).await.unwrap();
    assert_eq!(again, 0);

    let (_, body) = app.get("/notifications", &customer_token).await;
    assert_eq!(body["data"]["total"], 1);
    assert_eq!(body["data"]["items"][0]["title"], reminders::REMINDER_TITLE);
    assert_eq!(body["data"]["items"][0]["user_type"], "customer");

    let (_, body) = app.get("/notifications", &pro_token).await;
    assert_eq!(body["data"]["items"][0]["user_type"], "professional");
}

#[tokio::test]
async fn reminder_preference_is_honoured() {
    let app = TestApp::new().await;
    let (pro, pro_token) = app.professional("host@example.com").await;
    app.request(
        Method::PUT,
        "/notifications/preferences",
        Some(&pro_token),
        Some(json!({"appointment_reminders": false})),
    )
    .await;

    meeting_at(&app, pro.id, None, 10, MeetingStatus::Scheduled).await;
    let sent = reminders::send_meeting_reminders(app.pool(), &app.state.channels).await.unwrap();
    assert_eq!(sent, 0);
}
