//! The device side of an upload, seen from the client.

mod error;
mod http;
mod memory;
mod types;

pub use error::{RemoteError, RemoteResult};
pub use http::HttpRemote;
pub use memory::{MemoryRemote, RemoteCall};
pub use types::{parse_begin_reply, parse_device_reply, BeginReply, DeviceReply, SESSION_ID_HEADER};

use crate::chunk::ByteRange;
use crate::integrity::Md5Digest;
use crate::session::UploadTarget;
use async_trait::async_trait;
use bytes::Bytes;

/// Remote half of the begin / chunk / finalize protocol for one target.
#[async_trait]
pub trait UploadRemote: Send + Sync {
    fn target(&self) -> UploadTarget;

    /// Open a session and return the id the device issued
    async fn begin_session(&self) -> RemoteResult<String>;

    /// Persist one byte range. Must only return Ok once the device has it.
    async fn upload_chunk(
        &self,
        session_id: &str,
        range: ByteRange,
        total_bytes: u64,
        data: Bytes,
    ) -> RemoteResult<()>;

    /// Ask the device to check everything it received against `digest`
    async fn finalize(
        &self,
        session_id: &str,
        file_name: &str,
        digest: &Md5Digest,
    ) -> RemoteResult<()>;
}
