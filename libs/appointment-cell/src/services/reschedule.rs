// libs/appointment-cell/src/services/reschedule.rs
use chrono::{NaiveDate, NaiveDateTime, NaiveTime};
use sqlx::{Postgres, Transaction};
use tracing::info;

use crate::models::{
    ActorRole, AppointmentAction, AppointmentError, AppointmentStatus, OfferStatus,
    RescheduleOffer,
};
use crate::services::appointment::AppointmentService;
use crate::services::audit::AuditService;
use crate::services::lifecycle::LifecycleService;
use crate::services::notification::NotificationTrigger;

/// Reschedule negotiation: an admin proposes an alternative slot, the
/// patient accepts or rejects it. Each verb is one transaction; an offer
/// resolution is never visible without the matching appointment change.
#[derive(Clone)]
pub struct RescheduleService {
    appointments: AppointmentService,
    lifecycle: LifecycleService,
    audit: AuditService,
    notifications: NotificationTrigger,
}

impl RescheduleService {
    pub fn new(appointments: AppointmentService, notifications: NotificationTrigger) -> Self {
        Self {
            appointments,
            lifecycle: LifecycleService::new(),
            audit: AuditService::new(),
            notifications,
        }
    }

    /// Admin proposes a new slot. Legal from any status where the table
    /// lists `reschedule` (or `offer_new_reschedule` while an offer is
    /// already out). The appointment moves to `reschedule_offered` with a
    /// fresh pending offer.
    pub async fn offer(
        &self,
        appointment_id: i64,
        admin_id: i64,
        proposed_date: Option<NaiveDate>,
        proposed_time: Option<NaiveTime>,
        notes: Option<String>,
    ) -> Result<i64, AppointmentError> {
        let (date, time) = match (proposed_date, proposed_time) {
            (Some(date), Some(time)) => (date, time),
            _ => {
                return Err(AppointmentError::Validation(
                    "proposed date and time are required for a reschedule offer".to_string(),
                ))
            }
        };

        let offer_id = self
            .appointments
            .bounded(async {
                let mut tx = self.appointments.pool().begin().await?;

                let current = self
                    .appointments
                    .lock_appointment(&mut tx, appointment_id, None)
                    .await?;

                let allowed = self.lifecycle.is_allowed(
                    current.status,
                    ActorRole::Admin,
                    AppointmentAction::Reschedule,
                ) || self.lifecycle.is_allowed(
                    current.status,
                    ActorRole::Admin,
                    AppointmentAction::OfferNewReschedule,
                );
                if !allowed {
                    return Err(AppointmentError::InvalidTransition {
                        status: current.status,
                        action: AppointmentAction::Reschedule,
                    });
                }

                // A new offer supersedes any outstanding one; at most a
                // single pending offer exists per appointment.
                sqlx::query(
                    "UPDATE reschedule_offers SET status = 'rejected', updated_at = NOW() \
                     WHERE appointment_id = $1 AND status = 'pending'",
                )
                .bind(appointment_id)
                .execute(&mut *tx)
                .await?;

                let offer_id: i64 = sqlx::query_scalar(
                    r#"
                    INSERT INTO reschedule_offers
                        (appointment_id, proposed_date, proposed_time, admin_notes, status)
                    VALUES ($1, $2, $3, $4, 'pending')
                    RETURNING id
                    "#,
                )
                .bind(appointment_id)
                .bind(date)
                .bind(time)
                .bind(&notes)
                .fetch_one(&mut *tx)
                .await?;

                self.set_status(&mut tx, appointment_id, AppointmentStatus::RescheduleOffered)
                    .await?;
                self.audit
                    .record(
                        &mut tx,
                        appointment_id,
                        AppointmentStatus::RescheduleOffered,
                        notes.as_deref().or(Some("Reschedule offered")),
                        Some(admin_id),
                    )
                    .await?;

                tx.commit().await?;
                Ok(offer_id)
            })
            .await?;

        info!(
            "Admin {} offered reschedule {} on appointment {}",
            admin_id, offer_id, appointment_id
        );
        self.notifications
            .status_changed(appointment_id, AppointmentStatus::RescheduleOffered);
        Ok(offer_id)
    }

    /// Patient accepts a pending offer: the proposed slot is copied onto
    /// the appointment and the status becomes `reschedule_accepted`.
    pub async fn accept(
        &self,
        appointment_id: i64,
        patient_id: i64,
        offer_id: i64,
    ) -> Result<(), AppointmentError> {
        self.appointments
            .bounded(async {
                let mut tx = self.appointments.pool().begin().await?;

                let current = self
                    .appointments
                    .lock_appointment(&mut tx, appointment_id, Some(patient_id))
                    .await?;
                self.lifecycle.ensure_allowed(
                    current.status,
                    ActorRole::Patient,
                    AppointmentAction::AcceptReschedule,
                )?;

                let offer = self.lock_pending_offer(&mut tx, appointment_id, offer_id).await?;

                self.resolve_offer(&mut tx, offer.id, OfferStatus::Accepted).await?;

                let new_datetime =
                    NaiveDateTime::new(offer.proposed_date, offer.proposed_time).and_utc();
                sqlx::query(
                    r#"
                    UPDATE appointments
                    SET appointment_datetime = $1, status = 'reschedule_accepted', updated_at = NOW()
                    WHERE id = $2
                    "#,
                )
                .bind(new_datetime)
                .bind(appointment_id)
                .execute(&mut *tx)
                .await?;

                self.audit
                    .record(
                        &mut tx,
                        appointment_id,
                        AppointmentStatus::RescheduleAccepted,
                        Some("User accepted reschedule offer"),
                        Some(patient_id),
                    )
                    .await?;

                tx.commit().await?;
                Ok(())
            })
            .await?;

        info!(
            "User {} accepted reschedule offer {} on appointment {}",
            patient_id, offer_id, appointment_id
        );
        Ok(())
    }

    /// Patient rejects a pending offer. The appointment reverts to
    /// `pending` so the admin can renegotiate from scratch.
    pub async fn reject(
        &self,
        appointment_id: i64,
        patient_id: i64,
        offer_id: i64,
        reason: Option<String>,
    ) -> Result<(), AppointmentError> {
        let note = match reason.as_deref().filter(|r| !r.trim().is_empty()) {
            Some(reason) => format!("User rejected reschedule offer: {}", reason),
            None => "User rejected reschedule offer".to_string(),
        };

        self.appointments
            .bounded(async {
                let mut tx = self.appointments.pool().begin().await?;

                let current = self
                    .appointments
                    .lock_appointment(&mut tx, appointment_id, Some(patient_id))
                    .await?;
                self.lifecycle.ensure_allowed(
                    current.status,
                    ActorRole::Patient,
                    AppointmentAction::RejectReschedule,
                )?;

                let offer = self.lock_pending_offer(&mut tx, appointment_id, offer_id).await?;

                self.resolve_offer(&mut tx, offer.id, OfferStatus::Rejected).await?;
                self.set_status(&mut tx, appointment_id, AppointmentStatus::Pending).await?;
                self.audit
                    .record(
                        &mut tx,
                        appointment_id,
                        AppointmentStatus::Pending,
                        Some(&note),
                        Some(patient_id),
                    )
                    .await?;

                tx.commit().await?;
                Ok(())
            })
            .await?;

        info!(
            "User {} rejected reschedule offer {} on appointment {}",
            patient_id, offer_id, appointment_id
        );
        Ok(())
    }

    /// Locks the referenced offer if it belongs to the appointment and is
    /// still pending. Anything else is an `OfferNotFound`.
    async fn lock_pending_offer(
        &self,
        tx: &mut Transaction<'_, Postgres>,
        appointment_id: i64,
        offer_id: i64,
    ) -> Result<RescheduleOffer, AppointmentError> {
        let offer = sqlx::query_as::<_, RescheduleOffer>(
            r#"
            SELECT id, appointment_id, proposed_date, proposed_time, admin_notes, status,
                   created_at, updated_at
            FROM reschedule_offers
            WHERE id = $1 AND appointment_id = $2 AND status = 'pending'
            FOR UPDATE
            "#,
        )
        .bind(offer_id)
        .bind(appointment_id)
        .fetch_optional(&mut **tx)
        .await?;

        offer.ok_or(AppointmentError::OfferNotFound)
    }

    async fn resolve_offer(
        &self,
        tx: &mut Transaction<'_, Postgres>,
        offer_id: i64,
        status: OfferStatus,
    ) -> Result<(), AppointmentError> {
        sqlx::query("UPDATE reschedule_offers SET status = $1, updated_at = NOW() WHERE id = $2")
            .bind(status)
            .bind(offer_id)
            .execute(&mut **tx)
            .await?;
        Ok(())
    }

    async fn set_status(
        &self,
        tx: &mut Transaction<'_, Postgres>,
        appointment_id: i64,
        status: AppointmentStatus,
    ) -> Result<(), AppointmentError> {
        sqlx::query("UPDATE appointments SET status = $1, updated_at = NOW() WHERE id = $2")
            .bind(status)
            .bind(appointment_id)
            .execute(&mut **tx)
            .await?;
        Ok(())
    }
}
