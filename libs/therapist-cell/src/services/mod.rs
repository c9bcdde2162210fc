pub mod directory;
pub mod availability;

pub use directory::{TherapistDirectory, TherapistDirectoryService};
pub use availability::{AvailabilityProvider, AvailabilityService};
