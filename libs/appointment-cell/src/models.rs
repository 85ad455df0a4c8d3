// libs/appointment-cell/src/models.rs
use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, NaiveDate, NaiveTime, Utc};
use serde::{Deserialize, Serialize};

use shared_models::error::AppError;

// ==============================================================================
// CORE APPOINTMENT MODELS
// ==============================================================================

/// The appointment state machine. `Pending` is the unique initial state;
/// `Completed`, `Canceled`, `Rejected` and `NoShow` are terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "snake_case")]
#[sqlx(type_name = "appointment_status", rename_all = "snake_case")]
pub enum AppointmentStatus {
    Pending,
    Confirmed,
    Scheduled,
    RescheduleOffered,
    RescheduleAccepted,
    InProgress,
    Completed,
    Canceled,
    Rejected,
    NoShow,
}

impl AppointmentStatus {
    /// Every status, in the order stages are presented to clients.
    pub const ALL: [AppointmentStatus; 10] = [
        AppointmentStatus::Pending,
        AppointmentStatus::Confirmed,
        AppointmentStatus::Scheduled,
        AppointmentStatus::RescheduleOffered,
        AppointmentStatus::RescheduleAccepted,
        AppointmentStatus::InProgress,
        AppointmentStatus::Completed,
        AppointmentStatus::Canceled,
        AppointmentStatus::Rejected,
        AppointmentStatus::NoShow,
    ];

    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            AppointmentStatus::Completed
                | AppointmentStatus::Canceled
                | AppointmentStatus::Rejected
                | AppointmentStatus::NoShow
        )
    }
}

impl fmt::Display for AppointmentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            AppointmentStatus::Pending => "pending",
            AppointmentStatus::Confirmed => "confirmed",
            AppointmentStatus::Scheduled => "scheduled",
            AppointmentStatus::RescheduleOffered => "reschedule_offered",
            AppointmentStatus::RescheduleAccepted => "reschedule_accepted",
            AppointmentStatus::InProgress => "in_progress",
            AppointmentStatus::Completed => "completed",
            AppointmentStatus::Canceled => "canceled",
            AppointmentStatus::Rejected => "rejected",
            AppointmentStatus::NoShow => "no_show",
        };
        write!(f, "{}", s)
    }
}

impl FromStr for AppointmentStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(AppointmentStatus::Pending),
            "confirmed" => Ok(AppointmentStatus::Confirmed),
            "scheduled" => Ok(AppointmentStatus::Scheduled),
            "reschedule_offered" => Ok(AppointmentStatus::RescheduleOffered),
            "reschedule_accepted" => Ok(AppointmentStatus::RescheduleAccepted),
            "in_progress" => Ok(AppointmentStatus::InProgress),
            "completed" => Ok(AppointmentStatus::Completed),
            "canceled" => Ok(AppointmentStatus::Canceled),
            "rejected" => Ok(AppointmentStatus::Rejected),
            "no_show" => Ok(AppointmentStatus::NoShow),
            other => Err(format!("unknown appointment status '{}'", other)),
        }
    }
}

/// Discriminator between the two appointment kinds; decides which detail
/// record accompanies the appointment row.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "snake_case")]
#[sqlx(type_name = "appointment_kind", rename_all = "snake_case")]
pub enum AppointmentKind {
    LabTest,
    Doctor,
}

impl fmt::Display for AppointmentKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AppointmentKind::LabTest => write!(f, "lab_test"),
            AppointmentKind::Doctor => write!(f, "doctor"),
        }
    }
}

impl FromStr for AppointmentKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "lab_test" => Ok(AppointmentKind::LabTest),
            "doctor" => Ok(AppointmentKind::Doctor),
            other => Err(format!("unknown appointment kind '{}'", other)),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "snake_case")]
#[sqlx(type_name = "pickup_type", rename_all = "snake_case")]
pub enum PickupType {
    Home,
    Hospital,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "snake_case")]
#[sqlx(type_name = "offer_status", rename_all = "snake_case")]
pub enum OfferStatus {
    Pending,
    Accepted,
    Rejected,
}

/// Who is acting on an appointment. Derived from the identity context,
/// never from request payloads.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActorRole {
    Patient,
    Admin,
}

/// The closed set of verbs a caller may invoke on an appointment. Which
/// of them are legal at any moment is a pure function of (status, role).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AppointmentAction {
    Cancel,
    Confirm,
    Reject,
    Reschedule,
    OfferNewReschedule,
    AcceptReschedule,
    RejectReschedule,
    MarkInProgress,
    MarkCompleted,
    MarkNoShow,
}

impl fmt::Display for AppointmentAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            AppointmentAction::Cancel => "cancel",
            AppointmentAction::Confirm => "confirm",
            AppointmentAction::Reject => "reject",
            AppointmentAction::Reschedule => "reschedule",
            AppointmentAction::OfferNewReschedule => "offer_new_reschedule",
            AppointmentAction::AcceptReschedule => "accept_reschedule",
            AppointmentAction::RejectReschedule => "reject_reschedule",
            AppointmentAction::MarkInProgress => "mark_in_progress",
            AppointmentAction::MarkCompleted => "mark_completed",
            AppointmentAction::MarkNoShow => "mark_no_show",
        };
        write!(f, "{}", s)
    }
}

// ==============================================================================
// PERSISTED ENTITIES
// ==============================================================================

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Appointment {
    pub id: i64,
    pub user_id: i64,
    pub appointment_type: AppointmentKind,
    pub appointment_datetime: Option<DateTime<Utc>>,
    pub status: AppointmentStatus,
    pub admin_notes: Option<String>,
    pub rejection_reason: Option<String>,
    pub provider_id: Option<i64>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Lab-test detail record. Immutable after creation: only the owning
/// appointment's status and notes mutate.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct LabTestDetail {
    pub id: i64,
    pub appointment_id: i64,
    pub test_type_id: i64,
    pub pickup_type: PickupType,
    pub home_location: Option<String>,
    pub hospital_id: Option<i64>,
    pub additional_instructions: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct DoctorDetail {
    pub id: i64,
    pub appointment_id: i64,
    pub doctor_id: i64,
    pub reason_for_visit: Option<String>,
    pub symptoms: Option<String>,
    pub additional_notes: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct RescheduleOffer {
    pub id: i64,
    pub appointment_id: i64,
    pub proposed_date: NaiveDate,
    pub proposed_time: NaiveTime,
    pub admin_notes: Option<String>,
    pub status: OfferStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// One entry of the append-only status history. The history, not the
/// mutable appointment row, is the durable record of what happened when.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct StatusLogEntry {
    pub id: i64,
    pub appointment_id: i64,
    pub status: AppointmentStatus,
    pub notes: Option<String>,
    pub changed_by_user_id: Option<i64>,
    pub changed_at: DateTime<Utc>,
}

// ==============================================================================
// REQUEST / RESPONSE MODELS
// ==============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateLabTestAppointmentRequest {
    pub appointment_datetime: DateTime<Utc>,
    pub test_type_id: i64,
    pub pickup_type: String,
    pub home_location: Option<String>,
    pub hospital_id: Option<i64>,
    pub additional_instructions: Option<String>,
}

impl CreateLabTestAppointmentRequest {
    /// Enforce pickup-mode exclusivity before anything touches storage.
    pub fn validated_pickup(&self) -> Result<PickupType, AppointmentError> {
        match self.pickup_type.as_str() {
            "home" => {
                if self.home_location.as_deref().map_or(true, str::is_empty) {
                    return Err(AppointmentError::Validation(
                        "home location is required for home pickup type".to_string(),
                    ));
                }
                if self.hospital_id.is_some() {
                    return Err(AppointmentError::Validation(
                        "hospital must not be set for home pickup type".to_string(),
                    ));
                }
                Ok(PickupType::Home)
            }
            "hospital" => {
                if self.hospital_id.is_none() {
                    return Err(AppointmentError::Validation(
                        "hospital ID is required for hospital pickup type".to_string(),
                    ));
                }
                if self.home_location.is_some() {
                    return Err(AppointmentError::Validation(
                        "home location must not be set for hospital pickup type".to_string(),
                    ));
                }
                Ok(PickupType::Hospital)
            }
            _ => Err(AppointmentError::Validation(
                "invalid pickup type".to_string(),
            )),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateDoctorAppointmentRequest {
    pub appointment_datetime: DateTime<Utc>,
    pub doctor_id: i64,
    pub reason_for_visit: Option<String>,
    pub symptoms: Option<String>,
    pub additional_notes: Option<String>,
}

/// Patient-facing listing filter.
#[derive(Debug, Clone, Default)]
pub struct AppointmentFilter {
    pub user_id: Option<i64>,
    pub date: Option<NaiveDate>,
    pub upcoming: bool,
    pub history: bool,
}

/// Admin listing filter with page-based pagination (1-indexed).
#[derive(Debug, Clone)]
pub struct AdminAppointmentFilter {
    pub status: Vec<AppointmentStatus>,
    pub appointment_type: Vec<AppointmentKind>,
    pub date_from: Option<NaiveDate>,
    pub date_to: Option<NaiveDate>,
    pub provider_id: Option<i64>,
    pub page: i64,
    pub limit: i64,
}

impl Default for AdminAppointmentFilter {
    fn default() -> Self {
        Self {
            status: Vec::new(),
            appointment_type: Vec::new(),
            date_from: None,
            date_to: None,
            provider_id: None,
            page: 1,
            limit: 50,
        }
    }
}

/// Body for admin lifecycle actions (confirm / reject / reschedule / cancel).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AdminAppointmentAction {
    pub notes: Option<String>,
    pub rejection_reason: Option<String>,
    pub proposed_date: Option<NaiveDate>,
    pub proposed_time: Option<NaiveTime>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AdminStatusUpdateRequest {
    pub status: AppointmentStatus,
    pub notes: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UpdateNotesRequest {
    pub notes: String,
}

/// Patient response to a reschedule offer.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RescheduleDecisionRequest {
    pub offer_id: i64,
    pub reason: Option<String>,
}

/// Listing entry: appointment plus its kind-specific detail.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppointmentListing {
    #[serde(flatten)]
    pub appointment: Appointment,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub lab_test_details: Option<LabTestDetail>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub doctor_details: Option<DoctorDetail>,
}

/// Single-appointment read model: current state, detail, ordered history,
/// offers, and the viewer's legal next actions.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DetailedAppointment {
    #[serde(flatten)]
    pub appointment: Appointment,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub lab_test_details: Option<LabTestDetail>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub doctor_details: Option<DoctorDetail>,
    pub status_history: Vec<StatusLogEntry>,
    pub reschedule_offers: Vec<RescheduleOffer>,
    pub next_actions: Vec<AppointmentAction>,
}

// ==============================================================================
// ERROR TYPES
// ==============================================================================

#[derive(Debug, thiserror::Error)]
pub enum AppointmentError {
    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Action '{action}' is not allowed while the appointment is '{status}'")]
    InvalidTransition {
        status: AppointmentStatus,
        action: AppointmentAction,
    },

    #[error("Appointment not found")]
    NotFound,

    #[error("Reschedule offer not found")]
    OfferNotFound,

    #[error("Database error: {0}")]
    Database(String),

    #[error("Operation exceeded its deadline")]
    Timeout,
}

impl From<sqlx::Error> for AppointmentError {
    fn from(err: sqlx::Error) -> Self {
        match err {
            sqlx::Error::RowNotFound => AppointmentError::NotFound,
            other => AppointmentError::Database(other.to_string()),
        }
    }
}

impl From<AppointmentError> for AppError {
    fn from(err: AppointmentError) -> Self {
        match err {
            AppointmentError::Validation(msg) => AppError::ValidationError(msg),
            AppointmentError::InvalidTransition { .. } => AppError::Conflict(err.to_string()),
            AppointmentError::NotFound | AppointmentError::OfferNotFound => {
                AppError::NotFound(err.to_string())
            }
            AppointmentError::Database(msg) => AppError::Database(msg),
            AppointmentError::Timeout => AppError::Internal(err.to_string()),
        }
    }
}
