use std::sync::Arc;

use chrono::NaiveDate;
use tokio::sync::Mutex;
use tracing::{debug, info};
use uuid::Uuid;

use dependent_cell::services::{DependentRegistry, DependentService};
use shared_config::{AppConfig, SchedulingConfig};
use therapist_cell::models::TimeSlot;
use therapist_cell::services::{
    AvailabilityProvider, AvailabilityService, TherapistDirectory, TherapistDirectoryService,
};

use crate::models::{AvailabilityTag, BookingOutcome, LoadDisposition, SchedulingError, WizardView};
use crate::services::booking::{BookingGateway, BookingService};
use crate::services::date_window::DateWindow;
use crate::services::notifier::{BookingEventReceiver, BookingNotifier};
use crate::services::wizard::{booking_outcome, SchedulingWizard};

/// Drives one booking wizard against its collaborators.
///
/// The wizard lock is never held across a network call: each operation takes
/// a ticket under the lock, awaits the collaborator unlocked, then re-locks to
/// hand the tagged response back to the wizard.
pub struct SchedulingWizardController {
    directory: Arc<dyn TherapistDirectory>,
    availability: Arc<dyn AvailabilityProvider>,
    dependents: Arc<dyn DependentRegistry>,
    booking: Arc<dyn BookingGateway>,
    notifier: BookingNotifier,
    scheduling: SchedulingConfig,
    wizard: Mutex<Option<SchedulingWizard>>,
}

impl SchedulingWizardController {
    pub fn new(
        directory: Arc<dyn TherapistDirectory>,
        availability: Arc<dyn AvailabilityProvider>,
        dependents: Arc<dyn DependentRegistry>,
        booking: Arc<dyn BookingGateway>,
        scheduling: SchedulingConfig,
    ) -> Self {
        Self {
            directory,
            availability,
            dependents,
            booking,
            notifier: BookingNotifier::default(),
            scheduling,
            wizard: Mutex::new(None),
        }
    }

    /// Wires the HTTP collaborators from configuration.
    pub fn from_config(config: &AppConfig, auth_token: Option<&str>) -> Self {
        let mut directory = TherapistDirectoryService::new(config);
        let mut availability = AvailabilityService::new(config);
        let mut dependents = DependentService::new(config);
        let mut booking = BookingService::new(config);

        if let Some(token) = auth_token {
            directory = directory.with_auth_token(token);
            availability = availability.with_auth_token(token);
            dependents = dependents.with_auth_token(token);
            booking = booking.with_auth_token(token);
        }

        Self::new(
            Arc::new(directory),
            Arc::new(availability),
            Arc::new(dependents),
            Arc::new(booking),
            config.scheduling,
        )
    }

    pub fn with_notifier(mut self, notifier: BookingNotifier) -> Self {
        self.notifier = notifier;
        self
    }

    /// Receives a `BookingEvent::Succeeded` after every accepted booking.
    pub fn subscribe(&self) -> BookingEventReceiver {
        self.notifier.subscribe()
    }

    /// Opens a fresh wizard anchored on today's local date.
    pub async fn open(&self, parent_id: Uuid) -> Result<WizardView, SchedulingError> {
        self.open_with_window(parent_id, DateWindow::from_local_clock(self.scheduling)).await
    }

    /// Opens a fresh wizard, replacing any previous one, and loads the
    /// directory and dependents concurrently.
    pub async fn open_with_window(
        &self,
        parent_id: Uuid,
        window: DateWindow,
    ) -> Result<WizardView, SchedulingError> {
        let (session_id, load_directory, load_dependents) = {
            let mut guard = self.wizard.lock().await;
            let mut wizard = SchedulingWizard::new(parent_id, window);
            let directory_ticket = wizard.begin_directory_load();
            let dependents_ticket = wizard.begin_dependents_load();
            let session_id = wizard.session_id();
            *guard = Some(wizard);
            (session_id, directory_ticket.is_some(), dependents_ticket.is_some())
        };

        info!("Scheduling wizard opened (session {})", session_id);

        let (therapists, dependents) = futures::join!(
            async {
                if load_directory {
                    Some(self.directory.list_therapists().await)
                } else {
                    None
                }
            },
            async {
                if load_dependents {
                    Some(self.dependents.list_dependents(parent_id).await)
                } else {
                    None
                }
            }
        );

        let mut guard = self.wizard.lock().await;
        let wizard = guard.as_mut().ok_or(SchedulingError::WizardClosed)?;
        if let Some(result) = therapists {
            wizard.apply_directory(session_id, result);
        }
        if let Some(result) = dependents {
            wizard.apply_dependents(session_id, result);
        }
        Ok(wizard.view())
    }

    /// Discards the wizard and every choice in it.
    pub async fn close(&self) {
        let mut guard = self.wizard.lock().await;
        if let Some(wizard) = guard.take() {
            info!("Scheduling wizard closed (session {})", wizard.session_id());
        }
    }

    pub async fn is_open(&self) -> bool {
        self.wizard.lock().await.is_some()
    }

    pub async fn snapshot(&self) -> Option<WizardView> {
        self.wizard.lock().await.as_ref().map(SchedulingWizard::view)
    }

    pub async fn retry_directory(&self) -> Result<WizardView, SchedulingError> {
        let session_id = {
            let mut guard = self.wizard.lock().await;
            let wizard = guard.as_mut().ok_or(SchedulingError::WizardClosed)?;
            match wizard.begin_directory_load() {
                Some(session_id) => session_id,
                None => return Ok(wizard.view()),
            }
        };

        let result = self.directory.list_therapists().await;

        let mut guard = self.wizard.lock().await;
        let wizard = guard.as_mut().ok_or(SchedulingError::WizardClosed)?;
        wizard.apply_directory(session_id, result);
        Ok(wizard.view())
    }

    pub async fn retry_dependents(&self) -> Result<WizardView, SchedulingError> {
        let (session_id, parent_id) = {
            let mut guard = self.wizard.lock().await;
            let wizard = guard.as_mut().ok_or(SchedulingError::WizardClosed)?;
            match wizard.begin_dependents_load() {
                Some(session_id) => (session_id, wizard.parent_id()),
                None => return Ok(wizard.view()),
            }
        };

        let result = self.dependents.list_dependents(parent_id).await;

        let mut guard = self.wizard.lock().await;
        let wizard = guard.as_mut().ok_or(SchedulingError::WizardClosed)?;
        wizard.apply_dependents(session_id, result);
        Ok(wizard.view())
    }

    pub async fn select_therapist(&self, therapist_id: Uuid) -> Result<WizardView, SchedulingError> {
        self.with_wizard(|wizard| wizard.select_therapist(therapist_id)).await
    }

    pub async fn select_date(&self, date: NaiveDate) -> Result<WizardView, SchedulingError> {
        let tag = self.with_wizard_raw(|wizard| wizard.select_date(date)).await?;
        self.load_availability(tag).await
    }

    pub async fn select_time_slot(&self, slot: TimeSlot) -> Result<WizardView, SchedulingError> {
        self.with_wizard(|wizard| wizard.select_time_slot(slot).map(|_| ())).await
    }

    pub async fn select_dependent(&self, dependent_id: Uuid) -> Result<WizardView, SchedulingError> {
        self.with_wizard(|wizard| wizard.select_dependent(dependent_id).map(|_| ())).await
    }

    pub async fn back(&self) -> Result<WizardView, SchedulingError> {
        self.with_wizard(|wizard| wizard.back().map(|_| ())).await
    }

    pub async fn advance(&self) -> Result<WizardView, SchedulingError> {
        match self.with_wizard_raw(|wizard| wizard.advance()).await? {
            Some(tag) => self.load_availability(tag).await,
            None => self.current_view().await,
        }
    }

    pub async fn retry_availability(&self) -> Result<WizardView, SchedulingError> {
        let tag = self.with_wizard_raw(|wizard| wizard.retry_availability()).await?;
        self.load_availability(tag).await
    }

    pub async fn page_back(&self) -> Result<WizardView, SchedulingError> {
        self.with_wizard(|wizard| {
            wizard.page_back();
            Ok(())
        })
        .await
    }

    pub async fn page_forward(&self) -> Result<WizardView, SchedulingError> {
        self.with_wizard(|wizard| {
            wizard.page_forward();
            Ok(())
        })
        .await
    }

    /// Sends the booking. Success is broadcast to subscribers even if the
    /// wizard was closed while the call was in flight.
    pub async fn submit(&self) -> Result<BookingOutcome, SchedulingError> {
        let (session_id, request) = self
            .with_wizard_raw(|wizard| {
                let request = wizard.begin_submit()?;
                Ok((wizard.session_id(), request))
            })
            .await?;

        let result = self.booking.book_appointment(request).await;

        if let Ok(confirmation) = &result {
            self.notifier.notify_booking_succeeded(confirmation.clone());
        }

        let (outcome, refetch) = {
            let mut guard = self.wizard.lock().await;
            match guard.as_mut() {
                Some(wizard) if wizard.session_id() == session_id => {
                    let resolution = wizard.finish_submit(result);
                    (resolution.outcome, resolution.refetch)
                }
                _ => {
                    debug!("Wizard session {} ended before its booking resolved", session_id);
                    (booking_outcome(&result), None)
                }
            }
        };

        if let Some(tag) = refetch {
            if let Err(e) = self.load_availability(tag).await {
                debug!("Skipped availability reload after conflict: {}", e);
            }
        }

        Ok(outcome)
    }

    async fn load_availability(&self, tag: AvailabilityTag) -> Result<WizardView, SchedulingError> {
        let result = self
            .availability
            .get_availability(tag.therapist_id, tag.date)
            .await;

        let mut guard = self.wizard.lock().await;
        let wizard = guard.as_mut().ok_or(SchedulingError::WizardClosed)?;
        if wizard.apply_availability(tag, result) == LoadDisposition::Discarded {
            debug!("Availability for {} arrived after the selection moved on", tag.date);
        }
        Ok(wizard.view())
    }

    async fn current_view(&self) -> Result<WizardView, SchedulingError> {
        let guard = self.wizard.lock().await;
        guard
            .as_ref()
            .map(SchedulingWizard::view)
            .ok_or(SchedulingError::WizardClosed)
    }

    async fn with_wizard<F>(&self, op: F) -> Result<WizardView, SchedulingError>
    where
        F: FnOnce(&mut SchedulingWizard) -> Result<(), SchedulingError>,
    {
        let mut guard = self.wizard.lock().await;
        let wizard = guard.as_mut().ok_or(SchedulingError::WizardClosed)?;
        op(wizard)?;
        Ok(wizard.view())
    }

    async fn with_wizard_raw<T, F>(&self, op: F) -> Result<T, SchedulingError>
    where
        F: FnOnce(&mut SchedulingWizard) -> Result<T, SchedulingError>,
    {
        let mut guard = self.wizard.lock().await;
        let wizard = guard.as_mut().ok_or(SchedulingError::WizardClosed)?;
        op(wizard)
    }
}
