// libs/appointment-cell/src/services/notification.rs
use std::sync::Arc;

use chrono::{DateTime, NaiveDate, NaiveTime, Utc};
use sqlx::PgPool;
use tracing::{debug, warn};

use notification_cell::{Mailer, NotificationMessage};
use shared_database::Database;

use crate::models::AppointmentStatus;

/// Status changes that produce a patient-facing notification.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NotificationEvent {
    Confirmed,
    Rejected,
    RescheduleOffered,
}

impl NotificationEvent {
    pub fn for_status(status: AppointmentStatus) -> Option<Self> {
        match status {
            AppointmentStatus::Confirmed => Some(NotificationEvent::Confirmed),
            AppointmentStatus::Rejected => Some(NotificationEvent::Rejected),
            AppointmentStatus::RescheduleOffered => Some(NotificationEvent::RescheduleOffered),
            _ => None,
        }
    }

    pub fn template(&self) -> &'static str {
        match self {
            NotificationEvent::Confirmed => "appointment_confirmed",
            NotificationEvent::Rejected => "appointment_rejected",
            NotificationEvent::RescheduleOffered => "appointment_reschedule_offered",
        }
    }
}

/// Everything a notification template needs, loaded in one read after the
/// mutating transaction has committed.
#[derive(Debug, Clone, sqlx::FromRow)]
struct NotificationContext {
    patient_name: String,
    patient_email: String,
    appointment_type: String,
    appointment_datetime: Option<DateTime<Utc>>,
    rejection_reason: Option<String>,
    test_name: Option<String>,
}

#[derive(Debug, Clone, sqlx::FromRow)]
struct PendingOfferSlot {
    proposed_date: NaiveDate,
    proposed_time: NaiveTime,
}

/// Hands committed status changes to the mailer on a detached task.
/// Delivery is best-effort: failures are logged and never reach the
/// caller, and nothing here runs inside a mutating transaction.
#[derive(Clone)]
pub struct NotificationTrigger {
    db: Database,
    mailer: Arc<dyn Mailer>,
}

impl NotificationTrigger {
    pub fn new(db: Database, mailer: Arc<dyn Mailer>) -> Self {
        Self { db, mailer }
    }

    /// Fire-and-forget entry point called after a transaction commits.
    pub fn status_changed(&self, appointment_id: i64, status: AppointmentStatus) {
        let Some(event) = NotificationEvent::for_status(status) else {
            return;
        };

        let trigger = self.clone();
        tokio::spawn(async move {
            if let Err(err) = trigger.dispatch(appointment_id, event).await {
                warn!(
                    "Failed to send '{}' notification for appointment {}: {}",
                    event.template(),
                    appointment_id,
                    err
                );
            }
        });
    }

    /// Loads the notification context and sends the message. Public so
    /// tests can drive it without racing a spawned task.
    pub async fn dispatch(
        &self,
        appointment_id: i64,
        event: NotificationEvent,
    ) -> Result<(), anyhow::Error> {
        let pool = self.db.pool();

        let context = sqlx::query_as::<_, NotificationContext>(
            r#"
            SELECT
                u.name AS patient_name,
                u.email AS patient_email,
                a.appointment_type::text AS appointment_type,
                a.appointment_datetime,
                a.rejection_reason,
                lt.name AS test_name
            FROM appointments a
            JOIN users u ON u.id = a.user_id
            LEFT JOIN lab_test_appointments lta ON lta.appointment_id = a.id
            LEFT JOIN lab_tests lt ON lt.id = lta.test_type_id
            WHERE a.id = $1
            "#,
        )
        .bind(appointment_id)
        .fetch_one(pool)
        .await?;

        let offer = if event == NotificationEvent::RescheduleOffered {
            sqlx::query_as::<_, PendingOfferSlot>(
                r#"
                SELECT proposed_date, proposed_time
                FROM reschedule_offers
                WHERE appointment_id = $1 AND status = 'pending'
                ORDER BY created_at DESC, id DESC
                LIMIT 1
                "#,
            )
            .bind(appointment_id)
            .fetch_optional(pool)
            .await?
        } else {
            None
        };

        let message = build_message(event, &context, offer.as_ref());
        debug!(
            "Dispatching '{}' notification for appointment {}",
            event.template(),
            appointment_id
        );
        self.mailer.send(message).await?;
        Ok(())
    }
}

fn build_message(
    event: NotificationEvent,
    context: &NotificationContext,
    offer: Option<&PendingOfferSlot>,
) -> NotificationMessage {
    let mut message = NotificationMessage::new(&context.patient_email, event.template())
        .field("patient_name", &context.patient_name)
        .field("appointment_type", &context.appointment_type)
        .field_opt("test_name", context.test_name.as_deref());

    if let Some(when) = context.appointment_datetime {
        message = message
            .field("appointment_date", when.format("%Y-%m-%d").to_string())
            .field("appointment_time", when.format("%H:%M").to_string());
    }

    if event == NotificationEvent::Rejected {
        message = message.field_opt("rejection_reason", context.rejection_reason.as_deref());
    }

    if let Some(slot) = offer {
        message = message
            .field("proposed_date", slot.proposed_date.format("%Y-%m-%d").to_string())
            .field("proposed_time", slot.proposed_time.format("%H:%M").to_string());
    }

    message
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_context() -> NotificationContext {
        NotificationContext {
            patient_name: "Ada Obi".to_string(),
            patient_email: "ada@example.com".to_string(),
            appointment_type: "lab_test".to_string(),
            appointment_datetime: "2026-09-01T09:30:00Z".parse().ok(),
            rejection_reason: Some("test unavailable".to_string()),
            test_name: Some("Full Blood Count".to_string()),
        }
    }

    #[test]
    fn only_three_statuses_notify() {
        assert_eq!(
            NotificationEvent::for_status(AppointmentStatus::Confirmed),
            Some(NotificationEvent::Confirmed)
        );
        assert_eq!(
            NotificationEvent::for_status(AppointmentStatus::Rejected),
            Some(NotificationEvent::Rejected)
        );
        assert_eq!(
            NotificationEvent::for_status(AppointmentStatus::RescheduleOffered),
            Some(NotificationEvent::RescheduleOffered)
        );
        assert_eq!(NotificationEvent::for_status(AppointmentStatus::Canceled), None);
        assert_eq!(NotificationEvent::for_status(AppointmentStatus::Completed), None);
        assert_eq!(NotificationEvent::for_status(AppointmentStatus::Pending), None);
    }

    #[test]
    fn confirmation_message_carries_the_schedule() {
        let message = build_message(NotificationEvent::Confirmed, &sample_context(), None);

        assert_eq!(message.recipient, "ada@example.com");
        assert_eq!(message.template, "appointment_confirmed");
        assert_eq!(message.fields.get("patient_name").map(String::as_str), Some("Ada Obi"));
        assert_eq!(message.fields.get("appointment_date").map(String::as_str), Some("2026-09-01"));
        assert_eq!(message.fields.get("appointment_time").map(String::as_str), Some("09:30"));
        assert_eq!(
            message.fields.get("test_name").map(String::as_str),
            Some("Full Blood Count")
        );
        assert!(message.fields.get("rejection_reason").is_none());
    }

    #[test]
    fn rejection_message_carries_the_reason() {
        let message = build_message(NotificationEvent::Rejected, &sample_context(), None);
        assert_eq!(message.template, "appointment_rejected");
        assert_eq!(
            message.fields.get("rejection_reason").map(String::as_str),
            Some("test unavailable")
        );
    }

    #[test]
    fn offer_message_carries_the_proposed_slot() {
        let slot = PendingOfferSlot {
            proposed_date: "2026-09-05".parse().unwrap(),
            proposed_time: "14:00:00".parse().unwrap(),
        };
        let message =
            build_message(NotificationEvent::RescheduleOffered, &sample_context(), Some(&slot));

        assert_eq!(message.template, "appointment_reschedule_offered");
        assert_eq!(message.fields.get("proposed_date").map(String::as_str), Some("2026-09-05"));
        assert_eq!(message.fields.get("proposed_time").map(String::as_str), Some("14:00"));
    }
}
