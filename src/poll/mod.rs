//! Polling of long-running device tasks such as model conversion.

mod error;
mod poller;
mod source;
mod types;

pub use error::{PollError, PollResult};
pub use poller::StatusPoller;
pub use source::{HttpStatusSource, StatusSource};
pub use types::{parse_status_reply, RawStatus, StatusData, StatusReply, TaskStatus};
