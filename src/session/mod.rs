pub mod error;
pub mod registry;
pub mod types;

pub use error::{SessionError, SessionResult};
pub use registry::{SessionRegistry, TargetGuard};
pub use types::{UploadPhase, UploadSession, UploadTarget};
