pub mod appointment;
pub mod audit;
pub mod lifecycle;
pub mod notification;
pub mod reschedule;
