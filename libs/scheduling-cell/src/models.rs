use std::fmt;

use chrono::{DateTime, NaiveDate, NaiveTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

use dependent_cell::models::Dependent;
use shared_models::error::AppError;
use therapist_cell::models::{calendar_date, clock_time, slot_end, SlotGroup, Therapist, TimeSlot};

pub const BOOKING_FAILED_FALLBACK: &str = "Unable to book the appointment. Please try again.";
pub const NO_DEPENDENTS_MESSAGE: &str =
    "No dependents found. Add a child from your profile before booking a session.";

// ==============================================================================
// WIZARD STEPS AND STATES
// ==============================================================================

/// Visual step of the booking wizard. Slot and dependent share the last step.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WizardStep {
    Therapist,
    Date,
    TimeSlotAndDependent,
}

impl WizardStep {
    pub fn previous(&self) -> Option<WizardStep> {
        match self {
            WizardStep::Therapist => None,
            WizardStep::Date => Some(WizardStep::Therapist),
            WizardStep::TimeSlotAndDependent => Some(WizardStep::Date),
        }
    }

    pub fn next(&self) -> Option<WizardStep> {
        match self {
            WizardStep::Therapist => Some(WizardStep::Date),
            WizardStep::Date => Some(WizardStep::TimeSlotAndDependent),
            WizardStep::TimeSlotAndDependent => None,
        }
    }

    /// 1-based position for "Step n of 3" labels.
    pub fn number(&self) -> u8 {
        match self {
            WizardStep::Therapist => 1,
            WizardStep::Date => 2,
            WizardStep::TimeSlotAndDependent => 3,
        }
    }
}

/// Derived wizard state. A failed booking has no state of its own: `submit`
/// reports it as `BookingOutcome::Failed` and the wizard drops straight back to
/// `Ready` or `ChoosingTimeSlotAndDependent`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WizardState {
    ChoosingTherapist,
    ChoosingDate,
    ChoosingTimeSlotAndDependent,
    Ready,
    Submitting,
    Completed,
}

impl fmt::Display for WizardState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            WizardState::ChoosingTherapist => "choosing a therapist",
            WizardState::ChoosingDate => "choosing a date",
            WizardState::ChoosingTimeSlotAndDependent => "choosing a time slot and dependent",
            WizardState::Ready => "ready to submit",
            WizardState::Submitting => "submitting",
            WizardState::Completed => "completed",
        };
        f.write_str(label)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WizardAction {
    SelectTherapist,
    SelectDate,
    SelectTimeSlot,
    SelectDependent,
    Back,
    Advance,
    RetryAvailability,
    Submit,
}

impl fmt::Display for WizardAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            WizardAction::SelectTherapist => "select a therapist",
            WizardAction::SelectDate => "select a date",
            WizardAction::SelectTimeSlot => "select a time slot",
            WizardAction::SelectDependent => "select a dependent",
            WizardAction::Back => "go back",
            WizardAction::Advance => "continue",
            WizardAction::RetryAvailability => "reload availability",
            WizardAction::Submit => "submit",
        };
        f.write_str(label)
    }
}

// ==============================================================================
// SELECTION
// ==============================================================================

/// The wizard's working tuple. Fields fill in order; changing an earlier field
/// resets every later one.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Selection {
    therapist_id: Option<Uuid>,
    #[serde(with = "optional_calendar_date")]
    date: Option<NaiveDate>,
    time_slot: Option<TimeSlot>,
    dependent_id: Option<Uuid>,
}

impl Selection {
    pub fn therapist_id(&self) -> Option<Uuid> {
        self.therapist_id
    }

    pub fn date(&self) -> Option<NaiveDate> {
        self.date
    }

    pub fn time_slot(&self) -> Option<TimeSlot> {
        self.time_slot
    }

    pub fn dependent_id(&self) -> Option<Uuid> {
        self.dependent_id
    }

    pub fn set_therapist(&mut self, therapist_id: Uuid) {
        self.therapist_id = Some(therapist_id);
        self.clear_after(WizardStep::Therapist);
    }

    pub fn set_date(&mut self, date: NaiveDate) -> Result<(), SchedulingError> {
        if self.therapist_id.is_none() {
            return Err(SchedulingError::Validation("Choose a therapist before a date".to_string()));
        }
        self.date = Some(date);
        self.clear_after(WizardStep::Date);
        Ok(())
    }

    pub fn set_time_slot(&mut self, slot: TimeSlot) -> Result<(), SchedulingError> {
        if self.date.is_none() {
            return Err(SchedulingError::Validation("Choose a date before a time slot".to_string()));
        }
        self.time_slot = Some(slot);
        Ok(())
    }

    pub fn set_dependent(&mut self, dependent_id: Uuid) -> Result<(), SchedulingError> {
        if self.date.is_none() {
            return Err(SchedulingError::Validation("Choose a date before a dependent".to_string()));
        }
        self.dependent_id = Some(dependent_id);
        Ok(())
    }

    pub fn clear_time_slot(&mut self) {
        self.time_slot = None;
    }

    /// Clears every field belonging to steps after `step`.
    pub fn clear_after(&mut self, step: WizardStep) {
        match step {
            WizardStep::Therapist => {
                self.date = None;
                self.time_slot = None;
                self.dependent_id = None;
            }
            WizardStep::Date => {
                self.time_slot = None;
                self.dependent_id = None;
            }
            WizardStep::TimeSlotAndDependent => {}
        }
    }

    /// Clears the fields chosen on `step` itself and everything after it.
    pub fn clear_from(&mut self, step: WizardStep) {
        match step {
            WizardStep::Therapist => {
                self.therapist_id = None;
                self.clear_after(WizardStep::Therapist);
            }
            WizardStep::Date => {
                self.date = None;
                self.clear_after(WizardStep::Date);
            }
            WizardStep::TimeSlotAndDependent => {
                self.time_slot = None;
                self.dependent_id = None;
            }
        }
    }

    /// Whether the field(s) owned by `step` are chosen.
    pub fn has_choice_for(&self, step: WizardStep) -> bool {
        match step {
            WizardStep::Therapist => self.therapist_id.is_some(),
            WizardStep::Date => self.date.is_some(),
            WizardStep::TimeSlotAndDependent => self.time_slot.is_some() && self.dependent_id.is_some(),
        }
    }

    pub fn is_complete(&self) -> bool {
        self.therapist_id.is_some()
            && self.date.is_some()
            && self.time_slot.is_some()
            && self.dependent_id.is_some()
    }

    pub fn is_empty(&self) -> bool {
        self.therapist_id.is_none()
            && self.date.is_none()
            && self.time_slot.is_none()
            && self.dependent_id.is_none()
    }
}

mod optional_calendar_date {
    use chrono::NaiveDate;
    use serde::Serializer;

    pub fn serialize<S: Serializer>(date: &Option<NaiveDate>, serializer: S) -> Result<S::Ok, S::Error> {
        match date {
            Some(d) => serializer.serialize_some(&d.format("%Y-%m-%d").to_string()),
            None => serializer.serialize_none(),
        }
    }
}

// ==============================================================================
// ASYNC LOAD TRACKING
// ==============================================================================

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LoadState<T> {
    Idle,
    Loading,
    Loaded(T),
    Failed { message: String },
}

impl<T> LoadState<T> {
    pub fn is_loading(&self) -> bool {
        matches!(self, LoadState::Loading)
    }

    pub fn value(&self) -> Option<&T> {
        match self {
            LoadState::Loaded(value) => Some(value),
            _ => None,
        }
    }

    pub fn status(&self) -> LoadStatus {
        match self {
            LoadState::Idle => LoadStatus::Idle,
            LoadState::Loading => LoadStatus::Loading,
            LoadState::Loaded(_) => LoadStatus::Loaded,
            LoadState::Failed { message } => LoadStatus::Failed {
                message: message.clone(),
                retryable: true,
            },
        }
    }
}

/// Data-free view of a `LoadState`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum LoadStatus {
    Idle,
    Loading,
    Loaded,
    Failed { message: String, retryable: bool },
}

/// Identity of one availability request: the session and the `(therapist, date)` it was issued for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct AvailabilityTag {
    pub session_id: Uuid,
    pub therapist_id: Uuid,
    pub date: NaiveDate,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoadDisposition {
    Applied,
    Discarded,
}

// ==============================================================================
// BOOKING
// ==============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BookingRequest {
    #[serde(with = "calendar_date")]
    pub date: NaiveDate,
    #[serde(with = "clock_time")]
    pub start_time: NaiveTime,
    #[serde(with = "slot_end")]
    pub end_time: NaiveTime,
    pub parent_id: Uuid,
    pub therapist_id: Uuid,
    pub dependent_id: Uuid,
}

impl BookingRequest {
    /// Builds the request from a fully populated selection.
    pub fn from_selection(selection: &Selection, parent_id: Uuid) -> Result<Self, SchedulingError> {
        match (
            selection.therapist_id(),
            selection.date(),
            selection.time_slot(),
            selection.dependent_id(),
        ) {
            (Some(therapist_id), Some(date), Some(slot), Some(dependent_id)) => Ok(Self {
                date,
                start_time: slot.start(),
                end_time: slot.end(),
                parent_id,
                therapist_id,
                dependent_id,
            }),
            _ => Err(SchedulingError::NotReady),
        }
    }

    pub fn time_slot(&self) -> Result<TimeSlot, AppError> {
        TimeSlot::new(self.start_time, self.end_time)
    }
}

/// The appointment as created by the booking backend.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BookingConfirmation {
    pub id: Uuid,
    pub therapist_id: Uuid,
    pub dependent_id: Uuid,
    pub parent_id: Uuid,
    #[serde(with = "calendar_date")]
    pub date: NaiveDate,
    #[serde(with = "clock_time")]
    pub start_time: NaiveTime,
    #[serde(with = "slot_end")]
    pub end_time: NaiveTime,
    #[serde(default = "default_status")]
    pub status: String,
    pub created_at: Option<DateTime<Utc>>,
}

fn default_status() -> String {
    "scheduled".to_string()
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum BookingOutcome {
    Completed { confirmation: BookingConfirmation },
    Failed { message: String, conflict: bool },
}

impl BookingOutcome {
    pub fn is_completed(&self) -> bool {
        matches!(self, BookingOutcome::Completed { .. })
    }
}

/// Why the submit action is disabled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SubmitBlocker {
    Incomplete,
    NoDependents,
    InProgress,
    Finished,
}

impl SubmitBlocker {
    pub fn message(&self) -> &'static str {
        match self {
            SubmitBlocker::Incomplete => "Choose a time slot and a dependent to continue.",
            SubmitBlocker::NoDependents => NO_DEPENDENTS_MESSAGE,
            SubmitBlocker::InProgress => "Your booking is being submitted.",
            SubmitBlocker::Finished => "This appointment has already been booked.",
        }
    }
}

// ==============================================================================
// VIEW
// ==============================================================================

/// Snapshot of everything the presentation layer renders.
#[derive(Debug, Clone, Serialize)]
pub struct WizardView {
    pub session_id: Uuid,
    pub state: WizardState,
    pub step: WizardStep,
    pub selection: Selection,
    pub therapists: Vec<Therapist>,
    pub therapists_status: LoadStatus,
    pub visible_dates: Vec<NaiveDate>,
    pub can_page_back: bool,
    pub can_page_forward: bool,
    pub slot_groups: Vec<SlotGroup>,
    pub slots_status: LoadStatus,
    pub dependents: Vec<Dependent>,
    pub dependents_status: LoadStatus,
    pub submit_blocker: Option<SubmitBlocker>,
    pub last_failure: Option<String>,
    pub confirmation: Option<BookingConfirmation>,
}

impl WizardView {
    pub fn is_ready(&self) -> bool {
        self.state == WizardState::Ready
    }

    pub fn can_submit(&self) -> bool {
        self.submit_blocker.is_none()
    }

    pub fn slot_count(&self) -> usize {
        self.slot_groups.iter().map(|g| g.slots.len()).sum()
    }
}

// ==============================================================================
// ERRORS
// ==============================================================================

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SchedulingError {
    #[error("Cannot {action} while {state}")]
    InvalidTransition { state: WizardState, action: WizardAction },

    #[error("Booking is not ready: choose a therapist, date, time slot and dependent")]
    NotReady,

    #[error("{}", NO_DEPENDENTS_MESSAGE)]
    NoDependents,

    #[error("A booking is already being submitted")]
    AlreadySubmitting,

    #[error("The booking wizard is not open")]
    WizardClosed,

    #[error("Therapist {0} is not in the directory")]
    UnknownTherapist(Uuid),

    #[error("Dependent {0} is not registered to this parent")]
    UnknownDependent(Uuid),

    #[error("Time slot {0} is not available")]
    SlotUnavailable(TimeSlot),

    #[error("Date {0} is outside the booking window")]
    DateOutsideWindow(NaiveDate),

    #[error("Validation error: {0}")]
    Validation(String),
}
