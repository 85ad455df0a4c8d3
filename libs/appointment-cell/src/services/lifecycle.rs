// libs/appointment-cell/src/services/lifecycle.rs
use crate::models::{ActorRole, AppointmentAction, AppointmentError, AppointmentStatus};

/// Pure transition guard for the appointment state machine. Knows which
/// actions each role may take from each status and nothing else; every
/// mutating verb in the cell consults it before touching storage.
#[derive(Debug, Clone, Copy, Default)]
pub struct LifecycleService;

impl LifecycleService {
    pub fn new() -> Self {
        Self
    }

    /// Legal next actions for a role at a given status. Terminal statuses
    /// return an empty slice for both roles.
    pub fn next_actions(
        &self,
        status: AppointmentStatus,
        role: ActorRole,
    ) -> &'static [AppointmentAction] {
        use AppointmentAction::*;
        use AppointmentStatus::*;

        match (status, role) {
            (Pending, ActorRole::Patient) => &[Cancel],
            (Pending, ActorRole::Admin) => &[Confirm, Reject, Reschedule, Cancel],

            (Confirmed, ActorRole::Patient) => &[Cancel],
            (Confirmed, ActorRole::Admin) => &[Reschedule, Cancel, MarkInProgress],

            (Scheduled, ActorRole::Patient) => &[Cancel],
            (Scheduled, ActorRole::Admin) => &[Reschedule, Cancel, MarkInProgress],

            (RescheduleOffered, ActorRole::Patient) => {
                &[AcceptReschedule, RejectReschedule, Cancel]
            }
            (RescheduleOffered, ActorRole::Admin) => &[Cancel, OfferNewReschedule],

            (RescheduleAccepted, ActorRole::Patient) => &[Cancel],
            (RescheduleAccepted, ActorRole::Admin) => &[Confirm, Cancel, MarkInProgress],

            (InProgress, ActorRole::Patient) => &[],
            (InProgress, ActorRole::Admin) => &[MarkCompleted, MarkNoShow],

            (Completed | Canceled | Rejected | NoShow, _) => &[],
        }
    }

    pub fn is_allowed(
        &self,
        status: AppointmentStatus,
        role: ActorRole,
        action: AppointmentAction,
    ) -> bool {
        self.next_actions(status, role).contains(&action)
    }

    /// Guard used by every mutating verb: errors without touching storage
    /// when the action is not in the table for (status, role).
    pub fn ensure_allowed(
        &self,
        status: AppointmentStatus,
        role: ActorRole,
        action: AppointmentAction,
    ) -> Result<(), AppointmentError> {
        if self.is_allowed(status, role, action) {
            Ok(())
        } else {
            Err(AppointmentError::InvalidTransition { status, action })
        }
    }

    /// The status an appointment lands in when an action is applied.
    /// Reschedule verbs are handled by the negotiation service and do not
    /// appear here.
    pub fn target_status(&self, action: AppointmentAction) -> Option<AppointmentStatus> {
        match action {
            AppointmentAction::Confirm => Some(AppointmentStatus::Confirmed),
            AppointmentAction::Reject => Some(AppointmentStatus::Rejected),
            AppointmentAction::Cancel => Some(AppointmentStatus::Canceled),
            AppointmentAction::MarkInProgress => Some(AppointmentStatus::InProgress),
            AppointmentAction::MarkCompleted => Some(AppointmentStatus::Completed),
            AppointmentAction::MarkNoShow => Some(AppointmentStatus::NoShow),
            AppointmentAction::Reschedule
            | AppointmentAction::OfferNewReschedule
            | AppointmentAction::AcceptReschedule
            | AppointmentAction::RejectReschedule => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;
    use AppointmentAction::*;
    use AppointmentStatus::*;

    #[test]
    fn patients_can_only_cancel_pending_appointments() {
        let lifecycle = LifecycleService::new();
        assert_eq!(lifecycle.next_actions(Pending, ActorRole::Patient), &[Cancel]);
    }

    #[test]
    fn admins_drive_the_pending_appointment_forward() {
        let lifecycle = LifecycleService::new();
        assert_eq!(
            lifecycle.next_actions(Pending, ActorRole::Admin),
            &[Confirm, Reject, Reschedule, Cancel]
        );
    }

    #[test]
    fn patients_decide_on_reschedule_offers() {
        let lifecycle = LifecycleService::new();
        assert_eq!(
            lifecycle.next_actions(RescheduleOffered, ActorRole::Patient),
            &[AcceptReschedule, RejectReschedule, Cancel]
        );
        assert_eq!(
            lifecycle.next_actions(RescheduleOffered, ActorRole::Admin),
            &[Cancel, OfferNewReschedule]
        );
    }

    #[test]
    fn in_progress_appointments_only_close_out() {
        let lifecycle = LifecycleService::new();
        assert!(lifecycle.next_actions(InProgress, ActorRole::Patient).is_empty());
        assert_eq!(
            lifecycle.next_actions(InProgress, ActorRole::Admin),
            &[MarkCompleted, MarkNoShow]
        );
    }

    #[test]
    fn terminal_statuses_offer_nothing_to_either_role() {
        let lifecycle = LifecycleService::new();
        for status in [Completed, Canceled, Rejected, NoShow] {
            assert!(lifecycle.next_actions(status, ActorRole::Patient).is_empty());
            assert!(lifecycle.next_actions(status, ActorRole::Admin).is_empty());
        }
    }

    #[test]
    fn ensure_allowed_rejects_off_table_actions() {
        let lifecycle = LifecycleService::new();

        let err = lifecycle
            .ensure_allowed(Completed, ActorRole::Admin, Confirm)
            .unwrap_err();
        assert_matches!(
            err,
            AppointmentError::InvalidTransition { status: Completed, action: Confirm }
        );

        assert!(lifecycle
            .ensure_allowed(Pending, ActorRole::Admin, Confirm)
            .is_ok());
    }

    #[test]
    fn lifecycle_actions_map_to_their_statuses() {
        let lifecycle = LifecycleService::new();
        assert_eq!(lifecycle.target_status(Confirm), Some(Confirmed));
        assert_eq!(lifecycle.target_status(Reject), Some(Rejected));
        assert_eq!(lifecycle.target_status(Cancel), Some(Canceled));
        assert_eq!(lifecycle.target_status(MarkNoShow), Some(NoShow));
        assert_eq!(lifecycle.target_status(Reschedule), None);
    }
}
