pub mod registry;

pub use registry::{DependentRegistry, DependentService};
