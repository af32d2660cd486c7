mod coordinator;
mod error;
mod state_machine;
mod types;

pub use coordinator::UploadCoordinator;
pub use error::{UploadError, UploadResult};
pub use state_machine::UploadStateMachine;
pub use types::{UploadEvent, UploadOutcome};
