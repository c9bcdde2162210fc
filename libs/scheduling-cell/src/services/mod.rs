pub mod booking;
pub mod controller;
pub mod date_window;
pub mod lifecycle;
pub mod notifier;
pub mod wizard;

pub use booking::{BookingGateway, BookingService};
pub use controller::SchedulingWizardController;
pub use date_window::DateWindow;
pub use lifecycle::WizardLifecycleService;
pub use notifier::{BookingEvent, BookingNotifier};
pub use wizard::{SchedulingWizard, SubmitResolution};
