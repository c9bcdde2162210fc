use chrono::NaiveDate;
use tracing::{debug, info, warn};
use uuid::Uuid;

use dependent_cell::models::Dependent;
use shared_models::error::AppError;
use therapist_cell::models::{partition_slots, Therapist, TimeSlot};

use crate::models::{
    AvailabilityTag, BookingConfirmation, BookingOutcome, BookingRequest, LoadDisposition,
    LoadState, SchedulingError, Selection, SubmitBlocker, WizardAction, WizardState, WizardStep,
    WizardView, BOOKING_FAILED_FALLBACK,
};
use crate::services::date_window::DateWindow;
use crate::services::lifecycle::WizardLifecycleService;

/// Result of resolving a booking call against the wizard.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubmitResolution {
    pub outcome: BookingOutcome,
    /// Availability to reload after a conflict.
    pub refetch: Option<AvailabilityTag>,
}

/// The booking wizard's state machine for one open session.
///
/// It performs no I/O. Every network call is represented by a ticket handed
/// out by a `begin_*`/`select_*` method and a matching `apply_*` method that
/// accepts the response only while it still describes the live selection.
#[derive(Debug, Clone)]
pub struct SchedulingWizard {
    session_id: Uuid,
    parent_id: Uuid,
    window: DateWindow,
    page_start: NaiveDate,
    step: WizardStep,
    selection: Selection,
    submitting: bool,
    confirmation: Option<BookingConfirmation>,
    therapists: LoadState<Vec<Therapist>>,
    dependents: LoadState<Vec<Dependent>>,
    slots: LoadState<Vec<TimeSlot>>,
    last_failure: Option<String>,
    lifecycle: WizardLifecycleService,
}

impl SchedulingWizard {
    pub fn new(parent_id: Uuid, window: DateWindow) -> Self {
        let session_id = Uuid::new_v4();
        debug!("Opening scheduling wizard session {} for parent {}", session_id, parent_id);

        Self {
            session_id,
            parent_id,
            window,
            page_start: window.today(),
            step: WizardStep::Therapist,
            selection: Selection::default(),
            submitting: false,
            confirmation: None,
            therapists: LoadState::Idle,
            dependents: LoadState::Idle,
            slots: LoadState::Idle,
            last_failure: None,
            lifecycle: WizardLifecycleService::new(),
        }
    }

    pub fn session_id(&self) -> Uuid {
        self.session_id
    }

    pub fn parent_id(&self) -> Uuid {
        self.parent_id
    }

    pub fn window(&self) -> &DateWindow {
        &self.window
    }

    pub fn step(&self) -> WizardStep {
        self.step
    }

    pub fn selection(&self) -> &Selection {
        &self.selection
    }

    pub fn therapists(&self) -> &LoadState<Vec<Therapist>> {
        &self.therapists
    }

    pub fn dependents(&self) -> &LoadState<Vec<Dependent>> {
        &self.dependents
    }

    pub fn slots(&self) -> &LoadState<Vec<TimeSlot>> {
        &self.slots
    }

    pub fn last_failure(&self) -> Option<&str> {
        self.last_failure.as_deref()
    }

    pub fn confirmation(&self) -> Option<&BookingConfirmation> {
        self.confirmation.as_ref()
    }

    pub fn state(&self) -> WizardState {
        if self.confirmation.is_some() {
            return WizardState::Completed;
        }
        if self.submitting {
            return WizardState::Submitting;
        }

        match self.step {
            WizardStep::Therapist => WizardState::ChoosingTherapist,
            WizardStep::Date => WizardState::ChoosingDate,
            WizardStep::TimeSlotAndDependent if self.selection.is_complete() => WizardState::Ready,
            WizardStep::TimeSlotAndDependent => WizardState::ChoosingTimeSlotAndDependent,
        }
    }

    /// True exactly when all four selection fields are chosen.
    pub fn is_ready(&self) -> bool {
        self.selection.is_complete()
    }

    // ==========================================================================
    // DIRECTORY AND DEPENDENTS
    // ==========================================================================

    /// Marks the directory as loading. `None` if it is already loading or loaded.
    pub fn begin_directory_load(&mut self) -> Option<Uuid> {
        match self.therapists {
            LoadState::Idle | LoadState::Failed { .. } => {
                self.therapists = LoadState::Loading;
                Some(self.session_id)
            }
            LoadState::Loading | LoadState::Loaded(_) => None,
        }
    }

    pub fn apply_directory(
        &mut self,
        session_id: Uuid,
        result: Result<Vec<Therapist>, AppError>,
    ) -> LoadDisposition {
        if session_id != self.session_id || !self.therapists.is_loading() {
            warn!("Discarding therapist directory response for session {}", session_id);
            return LoadDisposition::Discarded;
        }

        self.therapists = match result {
            Ok(therapists) => {
                info!("Therapist directory loaded with {} entries", therapists.len());
                LoadState::Loaded(therapists)
            }
            Err(e) => {
                warn!("Therapist directory failed to load: {}", e);
                LoadState::Failed {
                    message: e.user_message("Unable to load therapists"),
                }
            }
        };
        LoadDisposition::Applied
    }

    pub fn begin_dependents_load(&mut self) -> Option<Uuid> {
        match self.dependents {
            LoadState::Idle | LoadState::Failed { .. } => {
                self.dependents = LoadState::Loading;
                Some(self.session_id)
            }
            LoadState::Loading | LoadState::Loaded(_) => None,
        }
    }

    pub fn apply_dependents(
        &mut self,
        session_id: Uuid,
        result: Result<Vec<Dependent>, AppError>,
    ) -> LoadDisposition {
        if session_id != self.session_id || !self.dependents.is_loading() {
            warn!("Discarding dependents response for session {}", session_id);
            return LoadDisposition::Discarded;
        }

        self.dependents = match result {
            Ok(dependents) => {
                if dependents.is_empty() {
                    info!("Parent {} has no dependents; booking will be blocked", self.parent_id);
                }
                LoadState::Loaded(dependents)
            }
            Err(e) => {
                warn!("Dependents failed to load: {}", e);
                LoadState::Failed {
                    message: e.user_message("Unable to load your dependents"),
                }
            }
        };
        LoadDisposition::Applied
    }

    // ==========================================================================
    // SELECTIONS
    // ==========================================================================

    pub fn select_therapist(&mut self, therapist_id: Uuid) -> Result<(), SchedulingError> {
        self.lifecycle.validate_action(self.state(), WizardAction::SelectTherapist)?;

        match &self.therapists {
            LoadState::Loaded(therapists) if therapists.iter().any(|t| t.id == therapist_id) => {}
            LoadState::Loaded(_) => return Err(SchedulingError::UnknownTherapist(therapist_id)),
            _ => {
                return Err(SchedulingError::Validation(
                    "The therapist directory has not loaded".to_string(),
                ))
            }
        }

        self.selection.set_therapist(therapist_id);
        self.slots = LoadState::Idle;
        self.step = WizardStep::Date;
        self.last_failure = None;

        info!("Therapist {} selected in session {}", therapist_id, self.session_id);
        Ok(())
    }

    /// Sets the date and returns the availability request to issue for it.
    pub fn select_date(&mut self, date: NaiveDate) -> Result<AvailabilityTag, SchedulingError> {
        self.lifecycle.validate_action(self.state(), WizardAction::SelectDate)?;

        if !self.window.contains(date) {
            return Err(SchedulingError::DateOutsideWindow(date));
        }

        self.selection.set_date(date)?;
        self.step = WizardStep::TimeSlotAndDependent;
        self.last_failure = None;
        if !self.window.page(self.page_start).contains(&date) {
            self.page_start = self.window.page_containing(date);
        }

        info!("Date {} selected in session {}", date, self.session_id);
        self.issue_availability_request()
    }

    pub fn select_time_slot(&mut self, slot: TimeSlot) -> Result<WizardState, SchedulingError> {
        self.lifecycle.validate_action(self.state(), WizardAction::SelectTimeSlot)?;

        let offered = self.slots.value().is_some_and(|slots| slots.contains(&slot));
        if !offered {
            return Err(SchedulingError::SlotUnavailable(slot));
        }

        self.selection.set_time_slot(slot)?;
        self.last_failure = None;
        debug!("Time slot {} selected", slot);
        Ok(self.state())
    }

    pub fn select_dependent(&mut self, dependent_id: Uuid) -> Result<WizardState, SchedulingError> {
        self.lifecycle.validate_action(self.state(), WizardAction::SelectDependent)?;

        let registered = self
            .dependents
            .value()
            .is_some_and(|dependents| dependents.iter().any(|d| d.id == dependent_id));
        if !registered {
            return Err(SchedulingError::UnknownDependent(dependent_id));
        }

        self.selection.set_dependent(dependent_id)?;
        debug!("Dependent {} selected", dependent_id);
        Ok(self.state())
    }

    /// Moves one step earlier. Choices on the step being left are cleared,
    /// choices on earlier steps are kept.
    pub fn back(&mut self) -> Result<WizardStep, SchedulingError> {
        self.lifecycle.validate_action(self.state(), WizardAction::Back)?;

        if let Some(previous) = self.step.previous() {
            self.selection.clear_from(self.step);
            if self.step == WizardStep::TimeSlotAndDependent {
                self.slots = LoadState::Idle;
            }
            self.step = previous;
            self.last_failure = None;
            debug!("Wizard moved back to {:?}", previous);
        }

        Ok(self.step)
    }

    /// Moves forward over a step whose choice is already made (after `back`).
    /// Entering the slot step reissues the availability request.
    pub fn advance(&mut self) -> Result<Option<AvailabilityTag>, SchedulingError> {
        let state = self.state();
        self.lifecycle.validate_action(state, WizardAction::Advance)?;

        if !self.selection.has_choice_for(self.step) {
            return Err(SchedulingError::Validation(format!(
                "Complete step {} before continuing",
                self.step.number()
            )));
        }

        match self.step {
            WizardStep::Therapist => {
                self.step = WizardStep::Date;
                Ok(None)
            }
            WizardStep::Date => {
                self.step = WizardStep::TimeSlotAndDependent;
                self.issue_availability_request().map(Some)
            }
            WizardStep::TimeSlotAndDependent => Err(SchedulingError::InvalidTransition {
                state,
                action: WizardAction::Advance,
            }),
        }
    }

    pub fn retry_availability(&mut self) -> Result<AvailabilityTag, SchedulingError> {
        self.lifecycle.validate_action(self.state(), WizardAction::RetryAvailability)?;
        self.issue_availability_request()
    }

    /// Tag for the live `(therapist, date)` pair, if both are chosen.
    pub fn current_tag(&self) -> Option<AvailabilityTag> {
        match (self.selection.therapist_id(), self.selection.date()) {
            (Some(therapist_id), Some(date)) => Some(AvailabilityTag {
                session_id: self.session_id,
                therapist_id,
                date,
            }),
            _ => None,
        }
    }

    fn issue_availability_request(&mut self) -> Result<AvailabilityTag, SchedulingError> {
        let tag = self.current_tag().ok_or_else(|| {
            SchedulingError::Validation("Choose a therapist and date first".to_string())
        })?;
        self.slots = LoadState::Loading;
        Ok(tag)
    }

    /// Applies an availability response if its tag still matches the live
    /// selection; otherwise the response is stale and dropped.
    pub fn apply_availability(
        &mut self,
        tag: AvailabilityTag,
        result: Result<Vec<TimeSlot>, AppError>,
    ) -> LoadDisposition {
        let live = self.step == WizardStep::TimeSlotAndDependent
            && self.confirmation.is_none()
            && self.current_tag() == Some(tag);

        if !live {
            warn!(
                "Discarding stale availability for therapist {} on {} (session {})",
                tag.therapist_id, tag.date, tag.session_id
            );
            return LoadDisposition::Discarded;
        }

        match result {
            Ok(slots) => {
                debug!("Applying {} slots for {}", slots.len(), tag.date);
                if let Some(chosen) = self.selection.time_slot() {
                    if !self.submitting && !slots.contains(&chosen) {
                        info!("Selected slot {} is no longer offered; clearing it", chosen);
                        self.selection.clear_time_slot();
                    }
                }
                self.slots = LoadState::Loaded(slots);
            }
            Err(e) => {
                warn!("Availability failed to load for {}: {}", tag.date, e);
                self.slots = LoadState::Failed {
                    message: e.user_message("Unable to load available times"),
                };
            }
        }

        LoadDisposition::Applied
    }

    // ==========================================================================
    // DATE PAGING
    // ==========================================================================

    pub fn visible_dates(&self) -> Vec<NaiveDate> {
        self.window.page(self.page_start)
    }

    pub fn page_back(&mut self) -> Vec<NaiveDate> {
        self.page_start = self.window.page_back(self.page_start);
        self.visible_dates()
    }

    pub fn page_forward(&mut self) -> Vec<NaiveDate> {
        self.page_start = self.window.page_forward(self.page_start);
        self.visible_dates()
    }

    // ==========================================================================
    // SUBMISSION
    // ==========================================================================

    pub fn submit_blocker(&self) -> Option<SubmitBlocker> {
        if self.confirmation.is_some() {
            return Some(SubmitBlocker::Finished);
        }
        if self.submitting {
            return Some(SubmitBlocker::InProgress);
        }
        if self.dependents.value().is_some_and(|d| d.is_empty()) {
            return Some(SubmitBlocker::NoDependents);
        }
        if self.state() != WizardState::Ready {
            return Some(SubmitBlocker::Incomplete);
        }
        None
    }

    pub fn can_submit(&self) -> bool {
        self.submit_blocker().is_none()
    }

    /// Moves to `Submitting` and returns the single request to send.
    pub fn begin_submit(&mut self) -> Result<BookingRequest, SchedulingError> {
        if self.submit_blocker() == Some(SubmitBlocker::NoDependents) {
            return Err(SchedulingError::NoDependents);
        }
        self.lifecycle.validate_action(self.state(), WizardAction::Submit)?;

        let request = BookingRequest::from_selection(&self.selection, self.parent_id)?;
        self.submitting = true;
        self.last_failure = None;

        info!(
            "Submitting booking for therapist {} on {} at {}",
            request.therapist_id,
            request.date,
            request.start_time.format("%H:%M")
        );
        Ok(request)
    }

    /// Resolves the in-flight booking. On success the selection is discarded;
    /// on failure it is kept, except that a conflicting slot is cleared and
    /// its availability is reloaded.
    pub fn finish_submit(
        &mut self,
        result: Result<BookingConfirmation, AppError>,
    ) -> SubmitResolution {
        self.submitting = false;
        let outcome = booking_outcome(&result);

        let refetch = match result {
            Ok(confirmation) => {
                info!("Booking {} confirmed in session {}", confirmation.id, self.session_id);
                self.selection = Selection::default();
                self.slots = LoadState::Idle;
                self.confirmation = Some(confirmation);
                None
            }
            Err(err) => {
                let conflict = is_booking_conflict(&err);
                warn!("Booking failed (conflict: {}): {}", conflict, err);
                self.last_failure = Some(err.user_message(BOOKING_FAILED_FALLBACK));

                if conflict {
                    self.selection.clear_time_slot();
                    self.issue_availability_request().ok()
                } else {
                    None
                }
            }
        };

        SubmitResolution { outcome, refetch }
    }

    pub fn view(&self) -> WizardView {
        WizardView {
            session_id: self.session_id,
            state: self.state(),
            step: self.step,
            selection: self.selection.clone(),
            therapists: self.therapists.value().cloned().unwrap_or_default(),
            therapists_status: self.therapists.status(),
            visible_dates: self.visible_dates(),
            can_page_back: self.window.can_page_back(self.page_start),
            can_page_forward: self.window.can_page_forward(self.page_start),
            slot_groups: self
                .slots
                .value()
                .map(|slots| partition_slots(slots))
                .unwrap_or_default(),
            slots_status: self.slots.status(),
            dependents: self.dependents.value().cloned().unwrap_or_default(),
            dependents_status: self.dependents.status(),
            submit_blocker: self.submit_blocker(),
            last_failure: self.last_failure.clone(),
            confirmation: self.confirmation.clone(),
        }
    }
}

/// Maps a booking call result to the outcome shown to the parent.
pub fn booking_outcome(result: &Result<BookingConfirmation, AppError>) -> BookingOutcome {
    match result {
        Ok(confirmation) => BookingOutcome::Completed {
            confirmation: confirmation.clone(),
        },
        Err(err) => BookingOutcome::Failed {
            message: err.user_message(BOOKING_FAILED_FALLBACK),
            conflict: is_booking_conflict(err),
        },
    }
}

fn is_booking_conflict(err: &AppError) -> bool {
    err.is_conflict() || err.message().to_lowercase().contains("already booked")
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;
    use chrono::{Days, NaiveTime};

    fn today() -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 6, 3).unwrap()
    }

    fn june(day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 6, day).unwrap()
    }

    fn slot(start: &str, end: &str) -> TimeSlot {
        TimeSlot::parse(start, end).unwrap()
    }

    fn therapist(name: &str) -> Therapist {
        Therapist {
            id: Uuid::new_v4(),
            name: name.to_string(),
            avatar_url: None,
            specialties: vec!["Speech".to_string()],
        }
    }

    fn dependent(name: &str) -> Dependent {
        Dependent {
            id: Uuid::new_v4(),
            name: name.to_string(),
            age: 6,
            avatar_url: None,
        }
    }

    fn confirmation_for(request: &BookingRequest) -> BookingConfirmation {
        BookingConfirmation {
            id: Uuid::new_v4(),
            therapist_id: request.therapist_id,
            dependent_id: request.dependent_id,
            parent_id: request.parent_id,
            date: request.date,
            start_time: request.start_time,
            end_time: request.end_time,
            status: "scheduled".to_string(),
            created_at: None,
        }
    }

    struct Fixture {
        wizard: SchedulingWizard,
        t1: Therapist,
        t2: Therapist,
        emma: Dependent,
    }

    fn loaded_wizard(dependents: Vec<Dependent>) -> (SchedulingWizard, Vec<Therapist>) {
        let therapists = vec![therapist("T1"), therapist("T2")];
        let mut wizard = SchedulingWizard::new(Uuid::new_v4(), DateWindow::starting(today()));

        let session = wizard.begin_directory_load().unwrap();
        wizard.apply_directory(session, Ok(therapists.clone()));
        let session = wizard.begin_dependents_load().unwrap();
        wizard.apply_dependents(session, Ok(dependents));

        (wizard, therapists)
    }

    fn fixture() -> Fixture {
        let emma = dependent("Emma");
        let (wizard, therapists) = loaded_wizard(vec![emma.clone(), dependent("Noah")]);
        Fixture {
            wizard,
            t1: therapists[0].clone(),
            t2: therapists[1].clone(),
            emma,
        }
    }

    fn ready(fx: &mut Fixture) -> AvailabilityTag {
        fx.wizard.select_therapist(fx.t1.id).unwrap();
        let tag = fx.wizard.select_date(june(10)).unwrap();
        fx.wizard.apply_availability(tag, Ok(vec![slot("09:00", "09:30"), slot("14:00", "14:30")]));
        fx.wizard.select_time_slot(slot("14:00", "14:30")).unwrap();
        fx.wizard.select_dependent(fx.emma.id).unwrap();
        tag
    }

    #[test]
    fn test_new_wizard_is_empty() {
        let wizard = SchedulingWizard::new(Uuid::new_v4(), DateWindow::starting(today()));
        assert_eq!(wizard.state(), WizardState::ChoosingTherapist);
        assert!(wizard.selection().is_empty());
        assert_eq!(wizard.visible_dates().len(), 7);
        assert_eq!(wizard.view().therapists_status, crate::models::LoadStatus::Idle);
    }

    #[test]
    fn test_directory_loads_once() {
        let mut fx = fixture();
        assert!(fx.wizard.begin_directory_load().is_none());
        assert_eq!(fx.wizard.view().therapists.len(), 2);
    }

    #[test]
    fn test_directory_failure_is_retryable_and_empty() {
        let mut wizard = SchedulingWizard::new(Uuid::new_v4(), DateWindow::starting(today()));
        let session = wizard.begin_directory_load().unwrap();
        wizard.apply_directory(session, Err(AppError::Network("timed out".into())));

        let view = wizard.view();
        assert!(view.therapists.is_empty());
        assert_matches!(view.therapists_status, crate::models::LoadStatus::Failed { retryable: true, .. });

        assert_eq!(wizard.begin_directory_load(), Some(session));
    }

    #[test]
    fn test_reference_scenario_reaches_ready() {
        let mut fx = fixture();
        fx.wizard.select_therapist(fx.t1.id).unwrap();
        assert_eq!(fx.wizard.state(), WizardState::ChoosingDate);

        let tag = fx.wizard.select_date(june(10)).unwrap();
        assert_eq!(fx.wizard.state(), WizardState::ChoosingTimeSlotAndDependent);
        assert!(fx.wizard.slots().is_loading());

        let applied = fx.wizard.apply_availability(
            tag,
            Ok(vec![slot("09:00", "09:30"), slot("14:00", "14:30")]),
        );
        assert_eq!(applied, LoadDisposition::Applied);

        let view = fx.wizard.view();
        assert_eq!(view.slot_groups.len(), 2);
        assert_eq!(view.slot_groups[0].slots, vec![slot("09:00", "09:30")]);
        assert_eq!(view.slot_groups[1].slots, vec![slot("14:00", "14:30")]);

        assert_eq!(
            fx.wizard.select_time_slot(slot("14:00", "14:30")).unwrap(),
            WizardState::ChoosingTimeSlotAndDependent
        );
        assert_eq!(fx.wizard.select_dependent(fx.emma.id).unwrap(), WizardState::Ready);
        assert!(fx.wizard.is_ready());
        assert!(fx.wizard.can_submit());
    }

    #[test]
    fn test_dependent_then_slot_also_reaches_ready() {
        let mut fx = fixture();
        fx.wizard.select_therapist(fx.t1.id).unwrap();
        let tag = fx.wizard.select_date(june(10)).unwrap();
        fx.wizard.apply_availability(tag, Ok(vec![slot("09:00", "09:30")]));

        fx.wizard.select_dependent(fx.emma.id).unwrap();
        assert_eq!(fx.wizard.state(), WizardState::ChoosingTimeSlotAndDependent);
        fx.wizard.select_time_slot(slot("09:00", "09:30")).unwrap();
        assert_eq!(fx.wizard.state(), WizardState::Ready);
    }

    #[test]
    fn test_ready_iff_selection_complete() {
        let mut fx = fixture();
        assert_eq!(fx.wizard.is_ready(), fx.wizard.state() == WizardState::Ready);

        fx.wizard.select_therapist(fx.t1.id).unwrap();
        assert!(!fx.wizard.is_ready());
        let tag = fx.wizard.select_date(june(10)).unwrap();
        fx.wizard.apply_availability(tag, Ok(vec![slot("09:00", "09:30")]));
        fx.wizard.select_time_slot(slot("09:00", "09:30")).unwrap();
        assert!(!fx.wizard.is_ready());
        assert_ne!(fx.wizard.state(), WizardState::Ready);

        fx.wizard.select_dependent(fx.emma.id).unwrap();
        assert!(fx.wizard.is_ready());
        assert_eq!(fx.wizard.state(), WizardState::Ready);

        fx.wizard.back().unwrap();
        assert!(!fx.wizard.is_ready());
        assert_ne!(fx.wizard.state(), WizardState::Ready);
    }

    #[test]
    fn test_changing_date_clears_slot_and_dependent_only() {
        let mut fx = fixture();
        ready(&mut fx);

        fx.wizard.select_date(june(11)).unwrap();
        let selection = fx.wizard.selection();
        assert_eq!(selection.therapist_id(), Some(fx.t1.id));
        assert_eq!(selection.date(), Some(june(11)));
        assert!(selection.time_slot().is_none());
        assert!(selection.dependent_id().is_none());
        assert_eq!(fx.wizard.state(), WizardState::ChoosingTimeSlotAndDependent);
    }

    #[test]
    fn test_reselecting_therapist_after_back_clears_everything_after() {
        let mut fx = fixture();
        ready(&mut fx);

        assert_eq!(fx.wizard.back().unwrap(), WizardStep::Date);
        assert_eq!(fx.wizard.back().unwrap(), WizardStep::Therapist);
        assert_eq!(fx.wizard.selection().therapist_id(), Some(fx.t1.id));
        assert!(fx.wizard.selection().date().is_none());

        fx.wizard.select_therapist(fx.t2.id).unwrap();
        let selection = fx.wizard.selection();
        assert_eq!(selection.therapist_id(), Some(fx.t2.id));
        assert!(selection.date().is_none());
        assert!(selection.time_slot().is_none());
        assert!(selection.dependent_id().is_none());
    }

    #[test]
    fn test_back_keeps_earlier_choices() {
        let mut fx = fixture();
        ready(&mut fx);

        fx.wizard.back().unwrap();
        assert_eq!(fx.wizard.state(), WizardState::ChoosingDate);
        assert_eq!(fx.wizard.selection().therapist_id(), Some(fx.t1.id));
        assert_eq!(fx.wizard.selection().date(), Some(june(10)));
        assert!(fx.wizard.selection().time_slot().is_none());

        // Back on the first step stays put.
        fx.wizard.back().unwrap();
        assert_eq!(fx.wizard.back().unwrap(), WizardStep::Therapist);
        assert_eq!(fx.wizard.selection().therapist_id(), Some(fx.t1.id));
    }

    #[test]
    fn test_advance_after_back_refetches_availability() {
        let mut fx = fixture();
        ready(&mut fx);
        fx.wizard.back().unwrap();

        let tag = fx.wizard.advance().unwrap().unwrap();
        assert_eq!(tag.date, june(10));
        assert_eq!(fx.wizard.state(), WizardState::ChoosingTimeSlotAndDependent);
        assert!(fx.wizard.slots().is_loading());
    }

    #[test]
    fn test_advance_requires_choice() {
        let mut fx = fixture();
        assert_matches!(fx.wizard.advance(), Err(SchedulingError::Validation(_)));

        fx.wizard.select_therapist(fx.t1.id).unwrap();
        fx.wizard.back().unwrap();
        assert_eq!(fx.wizard.advance().unwrap(), None);
        assert_eq!(fx.wizard.state(), WizardState::ChoosingDate);
    }

    #[test]
    fn test_therapist_cannot_be_selected_out_of_order() {
        let mut fx = fixture();
        fx.wizard.select_therapist(fx.t1.id).unwrap();

        assert_eq!(
            fx.wizard.select_therapist(fx.t2.id),
            Err(SchedulingError::InvalidTransition {
                state: WizardState::ChoosingDate,
                action: WizardAction::SelectTherapist,
            })
        );
        assert_eq!(fx.wizard.selection().therapist_id(), Some(fx.t1.id));
    }

    #[test]
    fn test_selection_validation() {
        let mut fx = fixture();
        assert_eq!(
            fx.wizard.select_therapist(Uuid::nil()),
            Err(SchedulingError::UnknownTherapist(Uuid::nil()))
        );

        fx.wizard.select_therapist(fx.t1.id).unwrap();
        let too_far = today().checked_add_days(Days::new(30)).unwrap();
        assert_eq!(fx.wizard.select_date(too_far), Err(SchedulingError::DateOutsideWindow(too_far)));
        assert_eq!(
            fx.wizard.select_date(june(2)),
            Err(SchedulingError::DateOutsideWindow(june(2)))
        );

        let tag = fx.wizard.select_date(june(10)).unwrap();
        assert_eq!(
            fx.wizard.select_time_slot(slot("09:00", "09:30")),
            Err(SchedulingError::SlotUnavailable(slot("09:00", "09:30")))
        );
        fx.wizard.apply_availability(tag, Ok(vec![slot("09:00", "09:30")]));
        assert_eq!(
            fx.wizard.select_time_slot(slot("10:00", "10:30")),
            Err(SchedulingError::SlotUnavailable(slot("10:00", "10:30")))
        );
        assert_eq!(
            fx.wizard.select_dependent(Uuid::nil()),
            Err(SchedulingError::UnknownDependent(Uuid::nil()))
        );
    }

    #[test]
    fn test_selecting_far_date_moves_visible_page() {
        let mut fx = fixture();
        fx.wizard.select_therapist(fx.t1.id).unwrap();
        fx.wizard.select_date(june(20)).unwrap();

        assert!(fx.wizard.visible_dates().contains(&june(20)));
        assert!(fx.wizard.view().can_page_back);
    }

    #[test]
    fn test_stale_availability_is_discarded() {
        let mut fx = fixture();
        fx.wizard.select_therapist(fx.t1.id).unwrap();

        let d1 = fx.wizard.select_date(june(10)).unwrap();
        let d2 = fx.wizard.select_date(june(11)).unwrap();

        let d2_slots = vec![slot("16:00", "16:30")];
        assert_eq!(fx.wizard.apply_availability(d2, Ok(d2_slots.clone())), LoadDisposition::Applied);
        assert_eq!(
            fx.wizard.apply_availability(d1, Ok(vec![slot("09:00", "09:30")])),
            LoadDisposition::Discarded
        );

        assert_eq!(fx.wizard.slots().value(), Some(&d2_slots));
    }

    #[test]
    fn test_stale_failure_does_not_clobber_loaded_slots() {
        let mut fx = fixture();
        fx.wizard.select_therapist(fx.t1.id).unwrap();

        let d1 = fx.wizard.select_date(june(10)).unwrap();
        let d2 = fx.wizard.select_date(june(11)).unwrap();
        fx.wizard.apply_availability(d2, Ok(vec![slot("16:00", "16:30")]));
        fx.wizard.apply_availability(d1, Err(AppError::Network("reset".into())));

        assert_eq!(fx.wizard.view().slots_status, crate::models::LoadStatus::Loaded);
    }

    #[test]
    fn test_availability_from_other_session_is_discarded() {
        let mut fx = fixture();
        fx.wizard.select_therapist(fx.t1.id).unwrap();
        let mut tag = fx.wizard.select_date(june(10)).unwrap();
        tag.session_id = Uuid::new_v4();

        assert_eq!(fx.wizard.apply_availability(tag, Ok(vec![])), LoadDisposition::Discarded);
        assert!(fx.wizard.slots().is_loading());
    }

    #[test]
    fn test_availability_failure_shows_zero_slots_with_retry() {
        let mut fx = fixture();
        fx.wizard.select_therapist(fx.t1.id).unwrap();
        let tag = fx.wizard.select_date(june(10)).unwrap();
        fx.wizard.apply_availability(tag, Err(AppError::ExternalService("".into())));

        let view = fx.wizard.view();
        assert_eq!(view.slot_count(), 0);
        assert_matches!(
            view.slots_status,
            crate::models::LoadStatus::Failed { ref message, retryable: true } if message == "Unable to load available times"
        );

        let retry = fx.wizard.retry_availability().unwrap();
        assert_eq!(retry, tag);
        fx.wizard.apply_availability(retry, Ok(vec![slot("09:00", "09:30")]));
        assert_eq!(fx.wizard.view().slot_count(), 1);
    }

    #[test]
    fn test_reload_without_chosen_slot_clears_it() {
        let mut fx = fixture();
        let tag = ready(&mut fx);

        let retry = fx.wizard.retry_availability().unwrap();
        assert_eq!(retry, tag);
        fx.wizard.apply_availability(retry, Ok(vec![slot("09:00", "09:30")]));

        assert!(fx.wizard.selection().time_slot().is_none());
        assert_eq!(fx.wizard.selection().dependent_id(), Some(fx.emma.id));
        assert_eq!(fx.wizard.state(), WizardState::ChoosingTimeSlotAndDependent);
    }

    #[test]
    fn test_no_dependents_blocks_submission_but_allows_slots() {
        let (mut wizard, therapists) = loaded_wizard(vec![]);
        wizard.select_therapist(therapists[0].id).unwrap();
        let tag = wizard.select_date(june(10)).unwrap();
        wizard.apply_availability(tag, Ok(vec![slot("09:00", "09:30")]));

        assert!(wizard.select_time_slot(slot("09:00", "09:30")).is_ok());
        assert_eq!(wizard.submit_blocker(), Some(SubmitBlocker::NoDependents));
        assert_eq!(wizard.begin_submit(), Err(SchedulingError::NoDependents));
        assert_eq!(
            wizard.view().submit_blocker.map(|b| b.message()),
            Some(crate::models::NO_DEPENDENTS_MESSAGE)
        );
    }

    #[test]
    fn test_submit_requires_ready() {
        let mut fx = fixture();
        fx.wizard.select_therapist(fx.t1.id).unwrap();
        assert_eq!(fx.wizard.begin_submit(), Err(SchedulingError::NotReady));
        assert_eq!(fx.wizard.submit_blocker(), Some(SubmitBlocker::Incomplete));
    }

    #[test]
    fn test_duplicate_submit_is_rejected() {
        let mut fx = fixture();
        ready(&mut fx);

        let request = fx.wizard.begin_submit().unwrap();
        assert_eq!(request.dependent_id, fx.emma.id);
        assert_eq!(request.start_time, NaiveTime::from_hms_opt(14, 0, 0).unwrap());
        assert_eq!(fx.wizard.state(), WizardState::Submitting);
        assert_eq!(fx.wizard.begin_submit(), Err(SchedulingError::AlreadySubmitting));
        assert_eq!(fx.wizard.submit_blocker(), Some(SubmitBlocker::InProgress));
        assert_matches!(fx.wizard.select_date(june(12)), Err(SchedulingError::InvalidTransition { .. }));
    }

    #[test]
    fn test_successful_submit_completes_and_discards_selection() {
        let mut fx = fixture();
        ready(&mut fx);

        let request = fx.wizard.begin_submit().unwrap();
        let confirmation = confirmation_for(&request);
        let resolution = fx.wizard.finish_submit(Ok(confirmation.clone()));

        assert_eq!(resolution.outcome, BookingOutcome::Completed { confirmation: confirmation.clone() });
        assert_eq!(resolution.refetch, None);
        assert_eq!(fx.wizard.state(), WizardState::Completed);
        assert!(fx.wizard.selection().is_empty());
        assert_eq!(fx.wizard.confirmation(), Some(&confirmation));
        assert_eq!(fx.wizard.submit_blocker(), Some(SubmitBlocker::Finished));
    }

    #[test]
    fn test_conflict_clears_slot_and_refetches() {
        let mut fx = fixture();
        let tag = ready(&mut fx);

        fx.wizard.begin_submit().unwrap();
        let resolution = fx.wizard.finish_submit(Err(AppError::Conflict(
            "This slot was just booked by someone else".into(),
        )));

        assert_eq!(
            resolution.outcome,
            BookingOutcome::Failed {
                message: "This slot was just booked by someone else".to_string(),
                conflict: true,
            }
        );
        assert_eq!(resolution.refetch, Some(tag));

        let selection = fx.wizard.selection();
        assert_eq!(selection.therapist_id(), Some(fx.t1.id));
        assert_eq!(selection.date(), Some(june(10)));
        assert_eq!(selection.dependent_id(), Some(fx.emma.id));
        assert!(selection.time_slot().is_none());
        assert_eq!(fx.wizard.state(), WizardState::ChoosingTimeSlotAndDependent);
        assert_eq!(fx.wizard.last_failure(), Some("This slot was just booked by someone else"));

        fx.wizard.apply_availability(tag, Ok(vec![slot("09:00", "09:30")]));
        fx.wizard.select_time_slot(slot("09:00", "09:30")).unwrap();
        assert_eq!(fx.wizard.state(), WizardState::Ready);
        assert_eq!(fx.wizard.last_failure(), None);
    }

    #[test]
    fn test_generic_failure_keeps_full_selection() {
        let mut fx = fixture();
        ready(&mut fx);

        fx.wizard.begin_submit().unwrap();
        let resolution = fx.wizard.finish_submit(Err(AppError::ExternalService(String::new())));

        assert_eq!(
            resolution.outcome,
            BookingOutcome::Failed {
                message: BOOKING_FAILED_FALLBACK.to_string(),
                conflict: false,
            }
        );
        assert_eq!(resolution.refetch, None);
        assert_eq!(fx.wizard.state(), WizardState::Ready);
        assert!(fx.wizard.selection().is_complete());
        assert!(fx.wizard.can_submit());
    }

    #[test]
    fn test_already_booked_message_counts_as_conflict() {
        let outcome = booking_outcome(&Err(AppError::BadRequest("Slot already booked".into())));
        assert_eq!(
            outcome,
            BookingOutcome::Failed { message: "Slot already booked".to_string(), conflict: true }
        );
    }
}
