// libs/appointment-cell/tests/live_integration_test.rs
//
// End-to-end lifecycle tests against a real Postgres instance. Gated
// behind LIVE_INTEGRATION_TESTS=true so a plain `cargo test` stays
// hermetic; set DATABASE_URL to a migrated database to run them.

use std::sync::{Arc, Mutex};

use assert_matches::assert_matches;
use async_trait::async_trait;
use chrono::{Duration, NaiveDate, NaiveTime, Utc};

use appointment_cell::models::{
    ActorRole, AppointmentError, AppointmentStatus, CreateLabTestAppointmentRequest,
};
use appointment_cell::services::appointment::AppointmentService;
use appointment_cell::services::notification::{NotificationEvent, NotificationTrigger};
use appointment_cell::services::reschedule::RescheduleService;
use notification_cell::{Mailer, NotificationError, NotificationMessage};
use shared_config::AppConfig;
use shared_database::Database;

fn should_run_live_tests() -> bool {
    std::env::var("LIVE_INTEGRATION_TESTS").unwrap_or_default() == "true"
}

/// Mailer that records every message instead of delivering it.
#[derive(Clone, Default)]
struct CapturingMailer {
    sent: Arc<Mutex<Vec<NotificationMessage>>>,
}

impl CapturingMailer {
    fn messages(&self) -> Vec<NotificationMessage> {
        self.sent.lock().unwrap().clone()
    }
}

#[async_trait]
impl Mailer for CapturingMailer {
    async fn send(&self, message: NotificationMessage) -> Result<(), NotificationError> {
        self.sent.lock().unwrap().push(message);
        Ok(())
    }
}

struct TestHarness {
    db: Database,
    mailer: CapturingMailer,
    appointments: AppointmentService,
    reschedules: RescheduleService,
    user_id: i64,
    admin_id: i64,
    test_type_id: i64,
    hospital_id: i64,
}

async fn harness() -> TestHarness {
    let config = AppConfig::from_env();
    let db = Database::connect(&config).await.expect("database connection");

    let mailer = CapturingMailer::default();
    let notifications = NotificationTrigger::new(db.clone(), Arc::new(mailer.clone()));
    let appointments = AppointmentService::new(db.clone(), notifications.clone());
    let reschedules = RescheduleService::new(appointments.clone(), notifications);

    let suffix = Utc::now().timestamp_nanos_opt().unwrap_or_default();
    let user_id: i64 = sqlx::query_scalar(
        "INSERT INTO users (name, email, is_admin) VALUES ($1, $2, false) RETURNING id",
    )
    .bind("Ada Obi")
    .bind(format!("ada.{}@example.com", suffix))
    .fetch_one(db.pool())
    .await
    .expect("seed user");

    let admin_id: i64 = sqlx::query_scalar(
        "INSERT INTO users (name, email, is_admin) VALUES ($1, $2, true) RETURNING id",
    )
    .bind("Clinic Admin")
    .bind(format!("admin.{}@example.com", suffix))
    .fetch_one(db.pool())
    .await
    .expect("seed admin");

    let test_type_id: i64 =
        sqlx::query_scalar("INSERT INTO lab_tests (name) VALUES ($1) RETURNING id")
            .bind("Full Blood Count")
            .fetch_one(db.pool())
            .await
            .expect("seed lab test");

    let hospital_id: i64 =
        sqlx::query_scalar("INSERT INTO hospitals (name) VALUES ($1) RETURNING id")
            .bind("Yourcare General")
            .fetch_one(db.pool())
            .await
            .expect("seed hospital");

    TestHarness {
        db,
        mailer,
        appointments,
        reschedules,
        user_id,
        admin_id,
        test_type_id,
        hospital_id,
    }
}

fn hospital_request(h: &TestHarness) -> CreateLabTestAppointmentRequest {
    CreateLabTestAppointmentRequest {
        appointment_datetime: Utc::now() + Duration::days(3),
        test_type_id: h.test_type_id,
        pickup_type: "hospital".to_string(),
        home_location: None,
        hospital_id: Some(h.hospital_id),
        additional_instructions: None,
    }
}

#[tokio::test]
async fn creating_a_hospital_pickup_appointment_seeds_pending_state() {
    if !should_run_live_tests() {
        return;
    }
    let h = harness().await;

    let id = h
        .appointments
        .create_lab_test(h.user_id, hospital_request(&h))
        .await
        .unwrap();

    let detail = h
        .appointments
        .get_detail(id, Some(h.user_id), ActorRole::Patient)
        .await
        .unwrap();

    assert_eq!(detail.appointment.status, AppointmentStatus::Pending);
    let lab = detail.lab_test_details.expect("lab detail row");
    assert_eq!(lab.hospital_id, Some(h.hospital_id));
    assert_eq!(detail.status_history.len(), 1);
    assert_eq!(detail.status_history[0].status, AppointmentStatus::Pending);
    assert_eq!(
        detail.status_history[0].notes.as_deref(),
        Some("Appointment created")
    );
}

#[tokio::test]
async fn home_pickup_without_an_address_writes_nothing() {
    if !should_run_live_tests() {
        return;
    }
    let h = harness().await;

    let mut request = hospital_request(&h);
    request.pickup_type = "home".to_string();
    request.hospital_id = None;

    let err = h
        .appointments
        .create_lab_test(h.user_id, request)
        .await
        .unwrap_err();
    assert_matches!(err, AppointmentError::Validation(_));

    let count: i64 =
        sqlx::query_scalar("SELECT COUNT(*) FROM appointments WHERE user_id = $1")
            .bind(h.user_id)
            .fetch_one(h.db.pool())
            .await
            .unwrap();
    assert_eq!(count, 0);
}

#[tokio::test]
async fn a_failed_detail_insert_rolls_the_whole_creation_back() {
    if !should_run_live_tests() {
        return;
    }
    let h = harness().await;

    // Nonexistent test type trips the foreign key after the appointment
    // row has already been inserted.
    let mut request = hospital_request(&h);
    request.test_type_id = i64::MAX;

    let err = h
        .appointments
        .create_lab_test(h.user_id, request)
        .await
        .unwrap_err();
    assert_matches!(err, AppointmentError::Database(_));

    let count: i64 =
        sqlx::query_scalar("SELECT COUNT(*) FROM appointments WHERE user_id = $1")
            .bind(h.user_id)
            .fetch_one(h.db.pool())
            .await
            .unwrap();
    assert_eq!(count, 0);
}

#[tokio::test]
async fn accepting_an_offer_copies_the_proposed_slot() {
    if !should_run_live_tests() {
        return;
    }
    let h = harness().await;

    let id = h
        .appointments
        .create_lab_test(h.user_id, hospital_request(&h))
        .await
        .unwrap();

    let date: NaiveDate = "2026-09-05".parse().unwrap();
    let time: NaiveTime = "14:00:00".parse().unwrap();
    let offer_id = h
        .reschedules
        .offer(id, h.admin_id, Some(date), Some(time), None)
        .await
        .unwrap();

    h.reschedules.accept(id, h.user_id, offer_id).await.unwrap();

    let detail = h
        .appointments
        .get_detail(id, Some(h.user_id), ActorRole::Patient)
        .await
        .unwrap();
    assert_eq!(detail.appointment.status, AppointmentStatus::RescheduleAccepted);

    let when = detail.appointment.appointment_datetime.expect("datetime set");
    assert_eq!(when.date_naive(), date);
    assert_eq!(when.time(), time);

    let offer = &detail.reschedule_offers[0];
    assert_eq!(offer.id, offer_id);
    assert_eq!(
        detail.status_history.last().unwrap().notes.as_deref(),
        Some("User accepted reschedule offer")
    );
}

#[tokio::test]
async fn rejecting_an_offer_reverts_to_pending_and_allows_another() {
    if !should_run_live_tests() {
        return;
    }
    let h = harness().await;

    let id = h
        .appointments
        .create_lab_test(h.user_id, hospital_request(&h))
        .await
        .unwrap();

    let date: NaiveDate = "2026-09-05".parse().unwrap();
    let time: NaiveTime = "14:00:00".parse().unwrap();
    let first = h
        .reschedules
        .offer(id, h.admin_id, Some(date), Some(time), None)
        .await
        .unwrap();

    h.reschedules
        .reject(id, h.user_id, first, Some("traveling that week".to_string()))
        .await
        .unwrap();

    let detail = h
        .appointments
        .get_detail(id, Some(h.user_id), ActorRole::Patient)
        .await
        .unwrap();
    assert_eq!(detail.appointment.status, AppointmentStatus::Pending);
    assert_eq!(
        detail.status_history.last().unwrap().notes.as_deref(),
        Some("User rejected reschedule offer: traveling that week")
    );

    // The rejected offer no longer blocks a fresh one.
    let second = h
        .reschedules
        .offer(id, h.admin_id, Some(date), Some(time), None)
        .await
        .unwrap();
    assert_ne!(first, second);

    // The resolved offer cannot be accepted anymore.
    let err = h.reschedules.accept(id, h.user_id, first).await.unwrap_err();
    assert_matches!(err, AppointmentError::OfferNotFound);
}

#[tokio::test]
async fn confirming_a_completed_appointment_changes_nothing() {
    if !should_run_live_tests() {
        return;
    }
    let h = harness().await;

    let id = h
        .appointments
        .create_lab_test(h.user_id, hospital_request(&h))
        .await
        .unwrap();

    h.appointments.confirm(id, h.admin_id, None).await.unwrap();
    h.appointments
        .mark_status(id, h.admin_id, AppointmentStatus::InProgress, None)
        .await
        .unwrap();
    h.appointments
        .mark_status(id, h.admin_id, AppointmentStatus::Completed, None)
        .await
        .unwrap();

    let before = h.appointments.history(id, None).await.unwrap();

    let err = h.appointments.confirm(id, h.admin_id, None).await.unwrap_err();
    assert_matches!(err, AppointmentError::InvalidTransition { .. });

    let after = h.appointments.history(id, None).await.unwrap();
    assert_eq!(before.len(), after.len());
    assert_eq!(after.last().unwrap().status, AppointmentStatus::Completed);
}

#[tokio::test]
async fn rejection_persists_the_reason_and_notifies_the_patient() {
    if !should_run_live_tests() {
        return;
    }
    let h = harness().await;

    let id = h
        .appointments
        .create_lab_test(h.user_id, hospital_request(&h))
        .await
        .unwrap();

    h.appointments
        .reject(id, h.admin_id, "test unavailable".to_string(), None)
        .await
        .unwrap();

    let detail = h.appointments.get_detail(id, None, ActorRole::Admin).await.unwrap();
    assert_eq!(detail.appointment.status, AppointmentStatus::Rejected);
    assert_eq!(
        detail.appointment.rejection_reason.as_deref(),
        Some("test unavailable")
    );
    assert!(detail.next_actions.is_empty());

    // Drive the notification synchronously so the assertion does not
    // race the detached task spawned by the reject call.
    let notifications = NotificationTrigger::new(h.db.clone(), Arc::new(h.mailer.clone()));
    notifications
        .dispatch(id, NotificationEvent::Rejected)
        .await
        .unwrap();

    let message = h
        .mailer
        .messages()
        .into_iter()
        .find(|m| m.template == "appointment_rejected")
        .expect("rejection notification");
    assert_eq!(message.fields.get("patient_name").map(String::as_str), Some("Ada Obi"));
    assert_eq!(
        message.fields.get("rejection_reason").map(String::as_str),
        Some("test unavailable")
    );
}

#[tokio::test]
async fn patients_cannot_touch_someone_elses_appointment() {
    if !should_run_live_tests() {
        return;
    }
    let h = harness().await;

    let id = h
        .appointments
        .create_lab_test(h.user_id, hospital_request(&h))
        .await
        .unwrap();

    let stranger = h.admin_id; // any other user id
    let err = h
        .appointments
        .get_detail(id, Some(stranger), ActorRole::Patient)
        .await
        .unwrap_err();
    assert_matches!(err, AppointmentError::NotFound);

    let err = h
        .appointments
        .cancel(id, stranger, ActorRole::Patient, None)
        .await
        .unwrap_err();
    assert_matches!(err, AppointmentError::NotFound);
}
