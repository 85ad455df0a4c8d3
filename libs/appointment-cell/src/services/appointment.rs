// libs/appointment-cell/src/services/appointment.rs
use std::future::Future;
use std::time::Duration;

use sqlx::{PgPool, Postgres, QueryBuilder, Transaction};
use tracing::info;

use shared_database::Database;

use crate::models::{
    ActorRole, AdminAppointmentFilter, Appointment, AppointmentAction, AppointmentError,
    AppointmentFilter, AppointmentKind, AppointmentListing, AppointmentStatus,
    CreateDoctorAppointmentRequest, CreateLabTestAppointmentRequest, DetailedAppointment,
    DoctorDetail, LabTestDetail, RescheduleOffer, StatusLogEntry,
};
use crate::services::audit::AuditService;
use crate::services::lifecycle::LifecycleService;
use crate::services::notification::NotificationTrigger;

/// Every unit of work must finish inside this window or the transaction
/// is abandoned and rolled back.
const UNIT_OF_WORK_DEADLINE: Duration = Duration::from_secs(5);

/// Orchestrates appointment reads and lifecycle mutations. Holds no
/// per-request state; all cross-request coordination is delegated to the
/// database's row locks.
#[derive(Clone)]
pub struct AppointmentService {
    db: Database,
    lifecycle: LifecycleService,
    audit: AuditService,
    notifications: NotificationTrigger,
}

impl AppointmentService {
    pub fn new(db: Database, notifications: NotificationTrigger) -> Self {
        Self {
            db,
            lifecycle: LifecycleService::new(),
            audit: AuditService::new(),
            notifications,
        }
    }

    pub fn lifecycle(&self) -> &LifecycleService {
        &self.lifecycle
    }

    pub(crate) fn pool(&self) -> &PgPool {
        self.db.pool()
    }

    /// Bounds a unit of work by the fixed deadline. On expiry the
    /// transaction is dropped, which rolls it back.
    pub(crate) async fn bounded<T, F>(&self, work: F) -> Result<T, AppointmentError>
    where
        F: Future<Output = Result<T, AppointmentError>>,
    {
        match tokio::time::timeout(UNIT_OF_WORK_DEADLINE, work).await {
            Ok(result) => result,
            Err(_) => Err(AppointmentError::Timeout),
        }
    }

    // ==========================================================================
    // CREATION
    // ==========================================================================

    /// Creates a lab-test appointment: validates the pickup mode before
    /// anything touches storage, then inserts the appointment row, the
    /// detail row and the first history entry in one transaction.
    pub async fn create_lab_test(
        &self,
        user_id: i64,
        request: CreateLabTestAppointmentRequest,
    ) -> Result<i64, AppointmentError> {
        let pickup = request.validated_pickup()?;

        self.bounded(async {
            let mut tx = self.pool().begin().await?;

            let appointment_id = self
                .insert_appointment(
                    &mut tx,
                    user_id,
                    AppointmentKind::LabTest,
                    request.appointment_datetime,
                )
                .await?;

            sqlx::query(
                r#"
                INSERT INTO lab_test_appointments
                    (appointment_id, test_type_id, pickup_type, home_location, hospital_id, additional_instructions)
                VALUES ($1, $2, $3, $4, $5, $6)
                "#,
            )
            .bind(appointment_id)
            .bind(request.test_type_id)
            .bind(pickup)
            .bind(&request.home_location)
            .bind(request.hospital_id)
            .bind(&request.additional_instructions)
            .execute(&mut *tx)
            .await?;

            self.audit
                .record(
                    &mut tx,
                    appointment_id,
                    AppointmentStatus::Pending,
                    Some("Appointment created"),
                    Some(user_id),
                )
                .await?;

            tx.commit().await?;
            info!("Created lab test appointment {} for user {}", appointment_id, user_id);
            Ok(appointment_id)
        })
        .await
    }

    /// Creates a doctor-visit appointment. Same transactional shape as
    /// lab tests, with the doctor detail row instead.
    pub async fn create_doctor_visit(
        &self,
        user_id: i64,
        request: CreateDoctorAppointmentRequest,
    ) -> Result<i64, AppointmentError> {
        self.bounded(async {
            let mut tx = self.pool().begin().await?;

            let appointment_id = self
                .insert_appointment(
                    &mut tx,
                    user_id,
                    AppointmentKind::Doctor,
                    request.appointment_datetime,
                )
                .await?;

            sqlx::query(
                r#"
                INSERT INTO doctor_appointments
                    (appointment_id, doctor_id, reason_for_visit, symptoms, additional_notes)
                VALUES ($1, $2, $3, $4, $5)
                "#,
            )
            .bind(appointment_id)
            .bind(request.doctor_id)
            .bind(&request.reason_for_visit)
            .bind(&request.symptoms)
            .bind(&request.additional_notes)
            .execute(&mut *tx)
            .await?;

            self.audit
                .record(
                    &mut tx,
                    appointment_id,
                    AppointmentStatus::Pending,
                    Some("Appointment created"),
                    Some(user_id),
                )
                .await?;

            tx.commit().await?;
            info!("Created doctor appointment {} for user {}", appointment_id, user_id);
            Ok(appointment_id)
        })
        .await
    }

    async fn insert_appointment(
        &self,
        tx: &mut Transaction<'_, Postgres>,
        user_id: i64,
        kind: AppointmentKind,
        datetime: chrono::DateTime<chrono::Utc>,
    ) -> Result<i64, AppointmentError> {
        let id: i64 = sqlx::query_scalar(
            r#"
            INSERT INTO appointments (user_id, appointment_type, appointment_datetime, status)
            VALUES ($1, $2, $3, 'pending')
            RETURNING id
            "#,
        )
        .bind(user_id)
        .bind(kind)
        .bind(datetime)
        .fetch_one(&mut **tx)
        .await?;

        Ok(id)
    }

    // ==========================================================================
    // READS
    // ==========================================================================

    /// Single-appointment detail view. When `owner_id` is supplied the
    /// lookup is scoped to that owner, so a cross-tenant read is
    /// indistinguishable from a missing appointment.
    pub async fn get_detail(
        &self,
        appointment_id: i64,
        owner_id: Option<i64>,
        role: ActorRole,
    ) -> Result<DetailedAppointment, AppointmentError> {
        let appointment = self.fetch_appointment(appointment_id, owner_id).await?;

        let (lab_test_details, doctor_details) = self.fetch_details(&appointment).await?;
        let status_history = self.audit.history(self.pool(), appointment_id).await?;

        let reschedule_offers = sqlx::query_as::<_, RescheduleOffer>(
            r#"
            SELECT id, appointment_id, proposed_date, proposed_time, admin_notes, status,
                   created_at, updated_at
            FROM reschedule_offers
            WHERE appointment_id = $1
            ORDER BY created_at ASC, id ASC
            "#,
        )
        .bind(appointment_id)
        .fetch_all(self.pool())
        .await?;

        let next_actions = self.lifecycle.next_actions(appointment.status, role).to_vec();

        Ok(DetailedAppointment {
            appointment,
            lab_test_details,
            doctor_details,
            status_history,
            reschedule_offers,
            next_actions,
        })
    }

    /// Status history, owner-scoped the same way as `get_detail`.
    pub async fn history(
        &self,
        appointment_id: i64,
        owner_id: Option<i64>,
    ) -> Result<Vec<StatusLogEntry>, AppointmentError> {
        self.fetch_appointment(appointment_id, owner_id).await?;
        self.audit.history(self.pool(), appointment_id).await
    }

    /// Patient-facing listing. `upcoming` sorts ascending from now,
    /// `history` descending into the past, otherwise newest first.
    pub async fn list_filtered(
        &self,
        filter: AppointmentFilter,
    ) -> Result<Vec<AppointmentListing>, AppointmentError> {
        let mut builder = QueryBuilder::<Postgres>::new(
            "SELECT id, user_id, appointment_type, appointment_datetime, status, admin_notes, \
             rejection_reason, provider_id, created_at, updated_at FROM appointments WHERE 1=1",
        );

        if let Some(user_id) = filter.user_id {
            builder.push(" AND user_id = ").push_bind(user_id);
        }
        if let Some(date) = filter.date {
            builder.push(" AND appointment_datetime::date = ").push_bind(date);
        }
        if filter.upcoming {
            builder.push(" AND appointment_datetime >= NOW() ORDER BY appointment_datetime ASC");
        } else if filter.history {
            builder.push(" AND appointment_datetime < NOW() ORDER BY appointment_datetime DESC");
        } else {
            builder.push(" ORDER BY appointment_datetime DESC");
        }

        let appointments = builder
            .build_query_as::<Appointment>()
            .fetch_all(self.pool())
            .await?;

        self.with_details(appointments).await
    }

    /// Admin listing across all patients with status/kind sets, a date
    /// range, a provider filter and page-based pagination.
    pub async fn admin_list(
        &self,
        filter: AdminAppointmentFilter,
    ) -> Result<Vec<AppointmentListing>, AppointmentError> {
        let mut builder = QueryBuilder::<Postgres>::new(
            "SELECT id, user_id, appointment_type, appointment_datetime, status, admin_notes, \
             rejection_reason, provider_id, created_at, updated_at FROM appointments WHERE 1=1",
        );

        if !filter.status.is_empty() {
            builder.push(" AND status = ANY(").push_bind(filter.status.clone()).push(")");
        }
        if !filter.appointment_type.is_empty() {
            builder
                .push(" AND appointment_type = ANY(")
                .push_bind(filter.appointment_type.clone())
                .push(")");
        }
        if let Some(from) = filter.date_from {
            builder.push(" AND appointment_datetime::date >= ").push_bind(from);
        }
        if let Some(to) = filter.date_to {
            builder.push(" AND appointment_datetime::date <= ").push_bind(to);
        }
        if let Some(provider_id) = filter.provider_id {
            builder.push(" AND provider_id = ").push_bind(provider_id);
        }

        let (limit, offset) = page_window(filter.page, filter.limit);
        builder
            .push(" ORDER BY created_at DESC LIMIT ")
            .push_bind(limit)
            .push(" OFFSET ")
            .push_bind(offset);

        let appointments = builder
            .build_query_as::<Appointment>()
            .fetch_all(self.pool())
            .await?;

        self.with_details(appointments).await
    }

    /// The ordered list of lifecycle stages, for client pickers.
    pub fn status_stages(&self) -> Vec<AppointmentStatus> {
        AppointmentStatus::ALL.to_vec()
    }

    async fn fetch_appointment(
        &self,
        appointment_id: i64,
        owner_id: Option<i64>,
    ) -> Result<Appointment, AppointmentError> {
        let appointment = match owner_id {
            Some(owner) => {
                sqlx::query_as::<_, Appointment>(
                    "SELECT id, user_id, appointment_type, appointment_datetime, status, \
                     admin_notes, rejection_reason, provider_id, created_at, updated_at \
                     FROM appointments WHERE id = $1 AND user_id = $2",
                )
                .bind(appointment_id)
                .bind(owner)
                .fetch_optional(self.pool())
                .await?
            }
            None => {
                sqlx::query_as::<_, Appointment>(
                    "SELECT id, user_id, appointment_type, appointment_datetime, status, \
                     admin_notes, rejection_reason, provider_id, created_at, updated_at \
                     FROM appointments WHERE id = $1",
                )
                .bind(appointment_id)
                .fetch_optional(self.pool())
                .await?
            }
        };

        appointment.ok_or(AppointmentError::NotFound)
    }

    async fn fetch_details(
        &self,
        appointment: &Appointment,
    ) -> Result<(Option<LabTestDetail>, Option<DoctorDetail>), AppointmentError> {
        match appointment.appointment_type {
            AppointmentKind::LabTest => {
                let detail = sqlx::query_as::<_, LabTestDetail>(
                    "SELECT id, appointment_id, test_type_id, pickup_type, home_location, \
                     hospital_id, additional_instructions \
                     FROM lab_test_appointments WHERE appointment_id = $1",
                )
                .bind(appointment.id)
                .fetch_optional(self.pool())
                .await?;
                Ok((detail, None))
            }
            AppointmentKind::Doctor => {
                let detail = sqlx::query_as::<_, DoctorDetail>(
                    "SELECT id, appointment_id, doctor_id, reason_for_visit, symptoms, \
                     additional_notes \
                     FROM doctor_appointments WHERE appointment_id = $1",
                )
                .bind(appointment.id)
                .fetch_optional(self.pool())
                .await?;
                Ok((None, detail))
            }
        }
    }

    async fn with_details(
        &self,
        appointments: Vec<Appointment>,
    ) -> Result<Vec<AppointmentListing>, AppointmentError> {
        let mut listings = Vec::with_capacity(appointments.len());
        for appointment in appointments {
            let (lab_test_details, doctor_details) = self.fetch_details(&appointment).await?;
            listings.push(AppointmentListing {
                appointment,
                lab_test_details,
                doctor_details,
            });
        }
        Ok(listings)
    }

    // ==========================================================================
    // LIFECYCLE MUTATIONS
    // ==========================================================================

    /// Admin confirms a pending or reschedule-accepted appointment.
    pub async fn confirm(
        &self,
        appointment_id: i64,
        admin_id: i64,
        notes: Option<String>,
    ) -> Result<AppointmentStatus, AppointmentError> {
        self.apply_action(
            appointment_id,
            admin_id,
            ActorRole::Admin,
            AppointmentAction::Confirm,
            notes,
            None,
        )
        .await
    }

    /// Admin rejects an appointment. A rejection reason is mandatory and
    /// persisted alongside the status change.
    pub async fn reject(
        &self,
        appointment_id: i64,
        admin_id: i64,
        rejection_reason: String,
        notes: Option<String>,
    ) -> Result<AppointmentStatus, AppointmentError> {
        if rejection_reason.trim().is_empty() {
            return Err(AppointmentError::Validation(
                "rejection reason is required".to_string(),
            ));
        }

        self.apply_action(
            appointment_id,
            admin_id,
            ActorRole::Admin,
            AppointmentAction::Reject,
            notes,
            Some(rejection_reason),
        )
        .await
    }

    /// Cancels an appointment. Patients may only cancel their own;
    /// the owner scope makes someone else's appointment a `NotFound`.
    pub async fn cancel(
        &self,
        appointment_id: i64,
        actor_id: i64,
        role: ActorRole,
        notes: Option<String>,
    ) -> Result<AppointmentStatus, AppointmentError> {
        self.apply_scoped_action(
            appointment_id,
            actor_id,
            role,
            match role {
                ActorRole::Patient => Some(actor_id),
                ActorRole::Admin => None,
            },
            AppointmentAction::Cancel,
            notes,
            None,
        )
        .await
    }

    /// Admin moves an appointment through its execution stages. Only the
    /// statuses with a matching verb in the transition table are
    /// reachable this way.
    pub async fn mark_status(
        &self,
        appointment_id: i64,
        admin_id: i64,
        status: AppointmentStatus,
        notes: Option<String>,
    ) -> Result<AppointmentStatus, AppointmentError> {
        let action = match status {
            AppointmentStatus::InProgress => AppointmentAction::MarkInProgress,
            AppointmentStatus::Completed => AppointmentAction::MarkCompleted,
            AppointmentStatus::NoShow => AppointmentAction::MarkNoShow,
            other => {
                return Err(AppointmentError::Validation(format!(
                    "status '{}' cannot be set directly",
                    other
                )))
            }
        };

        self.apply_action(appointment_id, admin_id, ActorRole::Admin, action, notes, None)
            .await
    }

    /// Replaces the admin notes on an appointment. Notes are working
    /// memory, not lifecycle state, so no history entry is written.
    pub async fn update_admin_notes(
        &self,
        appointment_id: i64,
        notes: String,
    ) -> Result<(), AppointmentError> {
        self.bounded(async {
            let result = sqlx::query(
                "UPDATE appointments SET admin_notes = $1, updated_at = NOW() WHERE id = $2",
            )
            .bind(&notes)
            .bind(appointment_id)
            .execute(self.pool())
            .await?;

            if result.rows_affected() == 0 {
                return Err(AppointmentError::NotFound);
            }
            Ok(())
        })
        .await
    }

    async fn apply_action(
        &self,
        appointment_id: i64,
        actor_id: i64,
        role: ActorRole,
        action: AppointmentAction,
        notes: Option<String>,
        rejection_reason: Option<String>,
    ) -> Result<AppointmentStatus, AppointmentError> {
        self.apply_scoped_action(
            appointment_id,
            actor_id,
            role,
            None,
            action,
            notes,
            rejection_reason,
        )
        .await
    }

    /// Shared body of every lifecycle verb: lock the row, re-validate the
    /// transition against the fresh status, write the update and its
    /// history entry, commit, then hand the change to the notifier.
    #[allow(clippy::too_many_arguments)]
    async fn apply_scoped_action(
        &self,
        appointment_id: i64,
        actor_id: i64,
        role: ActorRole,
        owner_id: Option<i64>,
        action: AppointmentAction,
        notes: Option<String>,
        rejection_reason: Option<String>,
    ) -> Result<AppointmentStatus, AppointmentError> {
        let target = self
            .lifecycle
            .target_status(action)
            .ok_or_else(|| AppointmentError::Validation(format!(
                "action '{}' is not a direct status change",
                action
            )))?;

        let new_status = self
            .bounded(async {
                let mut tx = self.pool().begin().await?;

                let current = self
                    .lock_appointment(&mut tx, appointment_id, owner_id)
                    .await?;
                self.lifecycle.ensure_allowed(current.status, role, action)?;

                sqlx::query(
                    r#"
                    UPDATE appointments
                    SET status = $1,
                        rejection_reason = COALESCE($2, rejection_reason),
                        admin_notes = COALESCE($3, admin_notes),
                        updated_at = NOW()
                    WHERE id = $4
                    "#,
                )
                .bind(target)
                .bind(&rejection_reason)
                .bind(&notes)
                .bind(appointment_id)
                .execute(&mut *tx)
                .await?;

                self.audit
                    .record(&mut tx, appointment_id, target, notes.as_deref(), Some(actor_id))
                    .await?;

                tx.commit().await?;
                Ok(target)
            })
            .await?;

        info!(
            "Appointment {} moved to '{}' by {} {}",
            appointment_id,
            new_status,
            match role {
                ActorRole::Patient => "user",
                ActorRole::Admin => "admin",
            },
            actor_id
        );

        self.notifications.status_changed(appointment_id, new_status);
        Ok(new_status)
    }

    /// Row-locked read inside a transaction, so a concurrent writer on
    /// the same appointment is serialized and legality is checked against
    /// the committed state, not a stale snapshot.
    pub(crate) async fn lock_appointment(
        &self,
        tx: &mut Transaction<'_, Postgres>,
        appointment_id: i64,
        owner_id: Option<i64>,
    ) -> Result<Appointment, AppointmentError> {
        let appointment = match owner_id {
            Some(owner) => {
                sqlx::query_as::<_, Appointment>(
                    "SELECT id, user_id, appointment_type, appointment_datetime, status, \
                     admin_notes, rejection_reason, provider_id, created_at, updated_at \
                     FROM appointments WHERE id = $1 AND user_id = $2 FOR UPDATE",
                )
                .bind(appointment_id)
                .bind(owner)
                .fetch_optional(&mut **tx)
                .await?
            }
            None => {
                sqlx::query_as::<_, Appointment>(
                    "SELECT id, user_id, appointment_type, appointment_datetime, status, \
                     admin_notes, rejection_reason, provider_id, created_at, updated_at \
                     FROM appointments WHERE id = $1 FOR UPDATE",
                )
                .bind(appointment_id)
                .fetch_optional(&mut **tx)
                .await?
            }
        };

        appointment.ok_or(AppointmentError::NotFound)
    }
}

/// Clamps caller-supplied pagination to a sane window. Saturating math
/// keeps absurd page numbers from overflowing the offset.
fn page_window(page: i64, limit: i64) -> (i64, i64) {
    let limit = limit.max(1);
    let offset = page.max(1).saturating_sub(1).saturating_mul(limit);
    (limit, offset)
}

#[cfg(test)]
mod tests {
    use super::page_window;

    #[test]
    fn pagination_is_one_indexed() {
        assert_eq!(page_window(1, 50), (50, 0));
        assert_eq!(page_window(3, 50), (50, 100));
    }

    #[test]
    fn nonsense_pagination_is_clamped() {
        assert_eq!(page_window(0, 0), (1, 0));
        assert_eq!(page_window(-5, -10), (1, 0));
    }

    #[test]
    fn huge_page_numbers_saturate_instead_of_overflowing() {
        let (limit, offset) = page_window(i64::MAX, i64::MAX);
        assert_eq!(limit, i64::MAX);
        assert_eq!(offset, i64::MAX);
    }
}
