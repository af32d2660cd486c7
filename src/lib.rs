//! Chunked upload client for edge devices.
//!
//! Uploads a local file to a device endpoint in four phases: open a remote
//! session, compute the MD5 of the file, stream it in fixed-size byte ranges,
//! then ask the device to verify the digest.

pub mod chunk;
pub mod config;
pub mod coordinator;
pub mod device;
pub mod integrity;
pub mod metrics;
pub mod poll;
pub mod progress;
pub mod remote;
pub mod session;
