// libs/appointment-cell/src/services/audit.rs
use sqlx::{PgPool, Postgres, Transaction};

use crate::models::{AppointmentError, AppointmentStatus, StatusLogEntry};

/// Append-only status history. Entries are only ever written inside the
/// transaction that performs the status change they document, so the
/// history and the appointment row can never disagree.
#[derive(Debug, Clone, Copy, Default)]
pub struct AuditService;

impl AuditService {
    pub fn new() -> Self {
        Self
    }

    /// Appends one history entry through the caller's transaction.
    pub async fn record(
        &self,
        tx: &mut Transaction<'_, Postgres>,
        appointment_id: i64,
        status: AppointmentStatus,
        notes: Option<&str>,
        changed_by_user_id: Option<i64>,
    ) -> Result<(), AppointmentError> {
        sqlx::query(
            r#"
            INSERT INTO appointment_status_history (appointment_id, status, notes, changed_by_user_id)
            VALUES ($1, $2, $3, $4)
            "#,
        )
        .bind(appointment_id)
        .bind(status)
        .bind(notes)
        .bind(changed_by_user_id)
        .execute(&mut **tx)
        .await?;

        Ok(())
    }

    /// Full history for an appointment, oldest first. An appointment with
    /// no history yields an empty list, not an error.
    pub async fn history(
        &self,
        pool: &PgPool,
        appointment_id: i64,
    ) -> Result<Vec<StatusLogEntry>, AppointmentError> {
        let entries = sqlx::query_as::<_, StatusLogEntry>(
            r#"
            SELECT id, appointment_id, status, notes, changed_by_user_id, changed_at
            FROM appointment_status_history
            WHERE appointment_id = $1
            ORDER BY changed_at ASC, id ASC
            "#,
        )
        .bind(appointment_id)
        .fetch_all(pool)
        .await?;

        Ok(entries)
    }
}
