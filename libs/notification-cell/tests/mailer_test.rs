use assert_matches::assert_matches;
use wiremock::matchers::{body_partial_json, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use notification_cell::{HttpMailer, Mailer, NotificationError, NotificationMessage};
use shared_config::AppConfig;

fn config_for(relay_url: &str) -> AppConfig {
    AppConfig {
        port: 0,
        database_url: "postgres://unused".to_string(),
        jwt_secret: "unused".to_string(),
        mail_service_url: relay_url.to_string(),
        mail_from: "info@yourcare.example".to_string(),
    }
}

fn sample_message() -> NotificationMessage {
    NotificationMessage::new("patient@example.com", "appointment_confirmed")
        .field("patient_name", "Ada Obi")
        .field("appointment_type", "lab_test")
        .field("appointment_date", "2026-09-01")
}

#[tokio::test]
async fn posts_the_message_to_the_relay() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/send"))
        .and(header("Content-Type", "application/json"))
        .and(body_partial_json(serde_json::json!({
            "to": "patient@example.com",
            "template": "appointment_confirmed",
            "fields": { "patient_name": "Ada Obi" }
        })))
        .respond_with(ResponseTemplate::new(200))
        .expect(1)
        .mount(&server)
        .await;

    let mailer = HttpMailer::new(&config_for(&format!("{}/send", server.uri()))).unwrap();
    mailer.send(sample_message()).await.unwrap();
}

#[tokio::test]
async fn surfaces_relay_rejections() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(500).set_body_string("relay down"))
        .mount(&server)
        .await;

    let mailer = HttpMailer::new(&config_for(&server.uri())).unwrap();
    let err = mailer.send(sample_message()).await.unwrap_err();

    match err {
        NotificationError::RelayError { message } => assert!(message.contains("500")),
        other => panic!("unexpected error: {other:?}"),
    }
}

#[test]
fn refuses_to_build_without_a_relay_url() {
    let err = HttpMailer::new(&config_for("")).err();
    assert_matches!(err, Some(NotificationError::NotConfigured));
}
