pub mod specialization;

pub use specialization::{SpecializationOrchestrator, SpecializationOutcome, SpecializeOptions};
