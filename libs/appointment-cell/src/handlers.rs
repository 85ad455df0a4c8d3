use axum::{
    extract::{Extension, Path, Query, State},
    Json,
};
use chrono::NaiveDate;
use serde::Deserialize;
use serde_json::{json, Value};

use shared_models::auth::AuthUser;
use shared_models::error::AppError;

use crate::models::{
    ActorRole, AdminAppointmentAction, AdminAppointmentFilter, AdminStatusUpdateRequest,
    AppointmentFilter, AppointmentKind, AppointmentStatus, CreateDoctorAppointmentRequest,
    CreateLabTestAppointmentRequest, RescheduleDecisionRequest, UpdateNotesRequest,
};
use crate::services::appointment::AppointmentService;
use crate::services::notification::NotificationTrigger;
use crate::services::reschedule::RescheduleService;
use crate::AppState;

fn appointment_service(state: &AppState) -> AppointmentService {
    let notifications = NotificationTrigger::new(state.db.clone(), state.mailer.clone());
    AppointmentService::new(state.db.clone(), notifications)
}

fn reschedule_service(state: &AppState) -> RescheduleService {
    let notifications = NotificationTrigger::new(state.db.clone(), state.mailer.clone());
    let appointments = AppointmentService::new(state.db.clone(), notifications.clone());
    RescheduleService::new(appointments, notifications)
}

// ==============================================================================
// PATIENT HANDLERS
// ==============================================================================

#[derive(Debug, Deserialize)]
pub struct ListQuery {
    pub date: Option<NaiveDate>,
    #[serde(default)]
    pub upcoming: bool,
    #[serde(default)]
    pub history: bool,
}

#[axum::debug_handler]
pub async fn create_lab_test_appointment(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    Json(request): Json<CreateLabTestAppointmentRequest>,
) -> Result<Json<Value>, AppError> {
    let service = appointment_service(&state);

    let appointment_id = service.create_lab_test(user.id, request).await?;

    Ok(Json(json!({
        "id": appointment_id,
        "status": AppointmentStatus::Pending,
    })))
}

#[axum::debug_handler]
pub async fn create_doctor_appointment(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    Json(request): Json<CreateDoctorAppointmentRequest>,
) -> Result<Json<Value>, AppError> {
    let service = appointment_service(&state);

    let appointment_id = service.create_doctor_visit(user.id, request).await?;

    Ok(Json(json!({
        "id": appointment_id,
        "status": AppointmentStatus::Pending,
    })))
}

#[axum::debug_handler]
pub async fn list_my_appointments(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    Query(query): Query<ListQuery>,
) -> Result<Json<Value>, AppError> {
    let service = appointment_service(&state);

    let filter = AppointmentFilter {
        user_id: Some(user.id),
        date: query.date,
        upcoming: query.upcoming,
        history: query.history,
    };
    let appointments = service.list_filtered(filter).await?;
    let count = appointments.len();

    Ok(Json(json!({
        "appointments": appointments,
        "count": count,
    })))
}

#[axum::debug_handler]
pub async fn get_my_appointment(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    Path(appointment_id): Path<i64>,
) -> Result<Json<Value>, AppError> {
    let service = appointment_service(&state);

    let detail = service
        .get_detail(appointment_id, Some(user.id), ActorRole::Patient)
        .await?;

    Ok(Json(json!(detail)))
}

#[axum::debug_handler]
pub async fn get_my_appointment_history(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    Path(appointment_id): Path<i64>,
) -> Result<Json<Value>, AppError> {
    let service = appointment_service(&state);

    let history = service.history(appointment_id, Some(user.id)).await?;

    Ok(Json(json!({ "history": history })))
}

#[axum::debug_handler]
pub async fn cancel_my_appointment(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    Path(appointment_id): Path<i64>,
) -> Result<Json<Value>, AppError> {
    let service = appointment_service(&state);

    let status = service
        .cancel(appointment_id, user.id, ActorRole::Patient, None)
        .await?;

    Ok(Json(json!({ "id": appointment_id, "status": status })))
}

#[axum::debug_handler]
pub async fn accept_reschedule_offer(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    Path(appointment_id): Path<i64>,
    Json(request): Json<RescheduleDecisionRequest>,
) -> Result<Json<Value>, AppError> {
    let service = reschedule_service(&state);

    service.accept(appointment_id, user.id, request.offer_id).await?;

    Ok(Json(json!({
        "id": appointment_id,
        "status": AppointmentStatus::RescheduleAccepted,
    })))
}

#[axum::debug_handler]
pub async fn reject_reschedule_offer(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    Path(appointment_id): Path<i64>,
    Json(request): Json<RescheduleDecisionRequest>,
) -> Result<Json<Value>, AppError> {
    let service = reschedule_service(&state);

    service
        .reject(appointment_id, user.id, request.offer_id, request.reason)
        .await?;

    Ok(Json(json!({
        "id": appointment_id,
        "status": AppointmentStatus::Pending,
    })))
}

#[axum::debug_handler]
pub async fn get_status_stages(State(state): State<AppState>) -> Result<Json<Value>, AppError> {
    let service = appointment_service(&state);

    Ok(Json(json!({ "stages": service.status_stages() })))
}

// ==============================================================================
// ADMIN HANDLERS
// ==============================================================================

#[derive(Debug, Deserialize)]
pub struct AdminListQuery {
    /// Comma-separated status names.
    pub status: Option<String>,
    /// Comma-separated appointment kinds.
    pub appointment_type: Option<String>,
    pub date_from: Option<NaiveDate>,
    pub date_to: Option<NaiveDate>,
    pub provider_id: Option<i64>,
    pub page: Option<i64>,
    pub limit: Option<i64>,
}

impl AdminListQuery {
    fn into_filter(self) -> Result<AdminAppointmentFilter, AppError> {
        let mut filter = AdminAppointmentFilter::default();

        if let Some(raw) = self.status {
            for part in raw.split(',').map(str::trim).filter(|s| !s.is_empty()) {
                let status: AppointmentStatus =
                    part.parse().map_err(AppError::ValidationError)?;
                filter.status.push(status);
            }
        }
        if let Some(raw) = self.appointment_type {
            for part in raw.split(',').map(str::trim).filter(|s| !s.is_empty()) {
                let kind: AppointmentKind = part.parse().map_err(AppError::ValidationError)?;
                filter.appointment_type.push(kind);
            }
        }

        filter.date_from = self.date_from;
        filter.date_to = self.date_to;
        filter.provider_id = self.provider_id;
        if let Some(page) = self.page {
            filter.page = page;
        }
        if let Some(limit) = self.limit {
            filter.limit = limit;
        }

        Ok(filter)
    }
}

#[axum::debug_handler]
pub async fn admin_list_appointments(
    State(state): State<AppState>,
    Extension(_admin): Extension<AuthUser>,
    Query(query): Query<AdminListQuery>,
) -> Result<Json<Value>, AppError> {
    let service = appointment_service(&state);

    let filter = query.into_filter()?;
    let page = filter.page;
    let limit = filter.limit;
    let appointments = service.admin_list(filter).await?;

    Ok(Json(json!({
        "appointments": appointments,
        "page": page,
        "limit": limit,
    })))
}

#[axum::debug_handler]
pub async fn admin_get_appointment(
    State(state): State<AppState>,
    Extension(_admin): Extension<AuthUser>,
    Path(appointment_id): Path<i64>,
) -> Result<Json<Value>, AppError> {
    let service = appointment_service(&state);

    let detail = service.get_detail(appointment_id, None, ActorRole::Admin).await?;

    Ok(Json(json!(detail)))
}

#[axum::debug_handler]
pub async fn admin_get_appointment_history(
    State(state): State<AppState>,
    Extension(_admin): Extension<AuthUser>,
    Path(appointment_id): Path<i64>,
) -> Result<Json<Value>, AppError> {
    let service = appointment_service(&state);

    let history = service.history(appointment_id, None).await?;

    Ok(Json(json!({ "history": history })))
}

#[axum::debug_handler]
pub async fn admin_confirm_appointment(
    State(state): State<AppState>,
    Extension(admin): Extension<AuthUser>,
    Path(appointment_id): Path<i64>,
    Json(request): Json<AdminAppointmentAction>,
) -> Result<Json<Value>, AppError> {
    let service = appointment_service(&state);

    let status = service.confirm(appointment_id, admin.id, request.notes).await?;

    Ok(Json(json!({ "id": appointment_id, "status": status })))
}

#[axum::debug_handler]
pub async fn admin_reject_appointment(
    State(state): State<AppState>,
    Extension(admin): Extension<AuthUser>,
    Path(appointment_id): Path<i64>,
    Json(request): Json<AdminAppointmentAction>,
) -> Result<Json<Value>, AppError> {
    let service = appointment_service(&state);

    let reason = request
        .rejection_reason
        .ok_or_else(|| AppError::ValidationError("rejection reason is required".to_string()))?;
    let status = service
        .reject(appointment_id, admin.id, reason, request.notes)
        .await?;

    Ok(Json(json!({ "id": appointment_id, "status": status })))
}

#[axum::debug_handler]
pub async fn admin_offer_reschedule(
    State(state): State<AppState>,
    Extension(admin): Extension<AuthUser>,
    Path(appointment_id): Path<i64>,
    Json(request): Json<AdminAppointmentAction>,
) -> Result<Json<Value>, AppError> {
    let service = reschedule_service(&state);

    let offer_id = service
        .offer(
            appointment_id,
            admin.id,
            request.proposed_date,
            request.proposed_time,
            request.notes,
        )
        .await?;

    Ok(Json(json!({
        "id": appointment_id,
        "offer_id": offer_id,
        "status": AppointmentStatus::RescheduleOffered,
    })))
}

#[axum::debug_handler]
pub async fn admin_cancel_appointment(
    State(state): State<AppState>,
    Extension(admin): Extension<AuthUser>,
    Path(appointment_id): Path<i64>,
    Json(request): Json<AdminAppointmentAction>,
) -> Result<Json<Value>, AppError> {
    let service = appointment_service(&state);

    let status = service
        .cancel(appointment_id, admin.id, ActorRole::Admin, request.notes)
        .await?;

    Ok(Json(json!({ "id": appointment_id, "status": status })))
}

#[axum::debug_handler]
pub async fn admin_update_status(
    State(state): State<AppState>,
    Extension(admin): Extension<AuthUser>,
    Path(appointment_id): Path<i64>,
    Json(request): Json<AdminStatusUpdateRequest>,
) -> Result<Json<Value>, AppError> {
    let service = appointment_service(&state);

    let status = service
        .mark_status(appointment_id, admin.id, request.status, request.notes)
        .await?;

    Ok(Json(json!({ "id": appointment_id, "status": status })))
}

#[axum::debug_handler]
pub async fn admin_update_notes(
    State(state): State<AppState>,
    Extension(_admin): Extension<AuthUser>,
    Path(appointment_id): Path<i64>,
    Json(request): Json<UpdateNotesRequest>,
) -> Result<Json<Value>, AppError> {
    let service = appointment_service(&state);

    service.update_admin_notes(appointment_id, request.notes).await?;

    Ok(Json(json!({ "id": appointment_id, "updated": true })))
}
