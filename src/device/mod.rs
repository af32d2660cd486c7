//! In-process stand-in for the camera's upload API, served with axum.

mod error;
mod simulator;

pub use error::{DeviceError, DeviceResult};
pub use simulator::{parse_content_range, DeviceSimulator, FaultPlan, ReceivedFile, TASK_STATUS_PATH};
