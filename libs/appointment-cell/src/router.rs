use axum::{
    middleware,
    routing::{delete, get, post, put},
    Router,
};

use shared_utils::extractor::{auth_middleware, require_admin};

use crate::handlers::*;
use crate::AppState;

/// Patient-facing routes. Every route runs behind the auth middleware;
/// ownership scoping inside the services does the rest.
pub fn create_appointment_router(state: AppState) -> Router {
    Router::new()
        .route("/lab-test", post(create_lab_test_appointment))
        .route("/doctor", post(create_doctor_appointment))
        .route("/", get(list_my_appointments))
        .route("/status-stages", get(get_status_stages))
        .route("/{id}", get(get_my_appointment))
        .route("/{id}", delete(cancel_my_appointment))
        .route("/{id}/history", get(get_my_appointment_history))
        .route("/{id}/reschedule/accept", put(accept_reschedule_offer))
        .route("/{id}/reschedule/reject", put(reject_reschedule_offer))
        .layer(middleware::from_fn_with_state(
            state.config.clone(),
            auth_middleware,
        ))
        .with_state(state)
}

/// Admin routes: auth plus the admin gate.
pub fn create_admin_appointment_router(state: AppState) -> Router {
    Router::new()
        .route("/", get(admin_list_appointments))
        .route("/{id}", get(admin_get_appointment))
        .route("/{id}/history", get(admin_get_appointment_history))
        .route("/{id}/confirm", post(admin_confirm_appointment))
        .route("/{id}/reject", post(admin_reject_appointment))
        .route("/{id}/reschedule", post(admin_offer_reschedule))
        .route("/{id}/cancel", post(admin_cancel_appointment))
        .route("/{id}/status", post(admin_update_status))
        .route("/{id}/notes", put(admin_update_notes))
        .layer(middleware::from_fn(require_admin))
        .layer(middleware::from_fn_with_state(
            state.config.clone(),
            auth_middleware,
        ))
        .with_state(state)
}
