pub mod handlers;
pub mod models;
pub mod router;
pub mod services;

use std::sync::Arc;

use notification_cell::Mailer;
use shared_config::AppConfig;
use shared_database::Database;

pub use models::*;
pub use router::{create_admin_appointment_router, create_appointment_router};
pub use services::appointment::AppointmentService;
pub use services::lifecycle::LifecycleService;
pub use services::notification::{NotificationEvent, NotificationTrigger};
pub use services::reschedule::RescheduleService;

/// Shared state for the appointment routers: configuration, the
/// connection pool and the mail delivery collaborator.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<AppConfig>,
    pub db: Database,
    pub mailer: Arc<dyn Mailer>,
}

impl AppState {
    pub fn new(config: Arc<AppConfig>, db: Database, mailer: Arc<dyn Mailer>) -> Self {
        Self { config, db, mailer }
    }
}
