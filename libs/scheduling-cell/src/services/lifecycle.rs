use tracing::{debug, warn};

use crate::models::{SchedulingError, WizardAction, WizardState};

/// Table of which wizard actions each state accepts.
#[derive(Debug, Default, Clone, Copy)]
pub struct WizardLifecycleService;

impl WizardLifecycleService {
    pub fn new() -> Self {
        Self
    }

    /// Validate that `action` is allowed in `state`
    pub fn validate_action(
        &self,
        state: WizardState,
        action: WizardAction,
    ) -> Result<(), SchedulingError> {
        debug!("Validating wizard action {:?} in state {:?}", action, state);

        if !self.get_allowed_actions(state).contains(&action) {
            warn!("Invalid wizard action attempted: {:?} in {:?}", action, state);
            return match (state, action) {
                (WizardState::Submitting, WizardAction::Submit) => Err(SchedulingError::AlreadySubmitting),
                (_, WizardAction::Submit) => Err(SchedulingError::NotReady),
                _ => Err(SchedulingError::InvalidTransition { state, action }),
            };
        }

        Ok(())
    }

    /// Get all actions accepted in a given state
    pub fn get_allowed_actions(&self, state: WizardState) -> Vec<WizardAction> {
        match state {
            WizardState::ChoosingTherapist => vec![
                WizardAction::SelectTherapist,
                WizardAction::Back,
                WizardAction::Advance,
            ],
            WizardState::ChoosingDate => vec![
                WizardAction::SelectDate,
                WizardAction::Back,
                WizardAction::Advance,
            ],
            WizardState::ChoosingTimeSlotAndDependent => vec![
                WizardAction::SelectDate,
                WizardAction::SelectTimeSlot,
                WizardAction::SelectDependent,
                WizardAction::RetryAvailability,
                WizardAction::Back,
            ],
            WizardState::Ready => vec![
                WizardAction::SelectDate,
                WizardAction::SelectTimeSlot,
                WizardAction::SelectDependent,
                WizardAction::RetryAvailability,
                WizardAction::Back,
                WizardAction::Submit,
            ],
            // Waiting on the booking call; only close is possible
            WizardState::Submitting => vec![],
            WizardState::Completed => vec![],
        }
    }
}
