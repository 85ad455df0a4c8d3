use axum::{routing::get, Router};

use appointment_cell::router::{create_admin_appointment_router, create_appointment_router};
use appointment_cell::AppState;

pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/", get(|| async { "Yourcare appointments API is running!" }))
        .nest("/appointments", create_appointment_router(state.clone()))
        .nest("/admin/appointments", create_admin_appointment_router(state))
}
