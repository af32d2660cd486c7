use crate::chunk::ByteRange;
use crate::integrity::{HashAccumulator, Md5Digest};
use crate::remote::error::{RemoteError, RemoteResult};
use crate::remote::UploadRemote;
use crate::session::UploadTarget;
use async_trait::async_trait;
use bytes::Bytes;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::time::Duration;

/// One call observed by a [`MemoryRemote`], in arrival order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RemoteCall {
    Begin,
    Chunk { session_id: String, range: ByteRange },
    Finalize { session_id: String, file_name: String, md5sum: String },
}

#[derive(Default)]
struct Faults {
    omit_session_id: bool,
    reject_digest: bool,
    /// chunk index -> remaining failures
    failing_chunks: HashMap<u32, u32>,
    chunk_delay: Option<Duration>,
}

#[derive(Default)]
struct MemoryState {
    calls: Vec<RemoteCall>,
    sessions: HashMap<String, Vec<u8>>,
    completed: HashMap<String, Vec<u8>>,
    faults: Faults,
}

/// In-process device: keeps uploaded bytes in memory and verifies the MD5
/// at finalize like the real firmware. Used for dry runs and tests.
pub struct MemoryRemote {
    target: UploadTarget,
    state: Mutex<MemoryState>,
}

impl MemoryRemote {
    pub fn new(target: UploadTarget) -> Self {
        Self {
            target,
            state: Mutex::new(MemoryState::default()),
        }
    }

    /// `begin` answers without a session id
    pub fn omit_session_id(self) -> Self {
        self.state.lock().faults.omit_session_id = true;
        self
    }

    /// `finalize` reports a digest mismatch regardless of content
    pub fn reject_digest(self) -> Self {
        self.state.lock().faults.reject_digest = true;
        self
    }

    /// Chunk `index` fails its first `times` attempts
    pub fn fail_chunk(self, index: u32, times: u32) -> Self {
        self.state.lock().faults.failing_chunks.insert(index, times);
        self
    }

    /// Hold every chunk request for `delay` before answering
    pub fn with_chunk_delay(self, delay: Duration) -> Self {
        self.state.lock().faults.chunk_delay = Some(delay);
        self
    }

    pub fn calls(&self) -> Vec<RemoteCall> {
        self.state.lock().calls.clone()
    }

    pub fn chunk_ranges(&self) -> Vec<ByteRange> {
        self.state
            .lock()
            .calls
            .iter()
            .filter_map(|call| match call {
                RemoteCall::Chunk { range, .. } => Some(*range),
                _ => None,
            })
            .collect()
    }

    pub fn finalize_count(&self) -> usize {
        self.state
            .lock()
            .calls
            .iter()
            .filter(|call| matches!(call, RemoteCall::Finalize { .. }))
            .count()
    }

    /// Bytes of a verified upload, keyed by file name
    pub fn completed_file(&self, file_name: &str) -> Option<Vec<u8>> {
        self.state.lock().completed.get(file_name).cloned()
    }
}

#[async_trait]
impl UploadRemote for MemoryRemote {
    fn target(&self) -> UploadTarget {
        self.target
    }

    async fn begin_session(&self) -> RemoteResult<String> {
        let mut state = self.state.lock();
        state.calls.push(RemoteCall::Begin);
        if state.faults.omit_session_id {
            return Err(RemoteError::MissingSessionId);
        }

        let session_id = uuid::Uuid::new_v4().to_string();
        state.sessions.insert(session_id.clone(), Vec::new());
        Ok(session_id)
    }

    async fn upload_chunk(
        &self,
        session_id: &str,
        range: ByteRange,
        total_bytes: u64,
        data: Bytes,
    ) -> RemoteResult<()> {
        let delay = {
            let mut state = self.state.lock();
            state.calls.push(RemoteCall::Chunk {
                session_id: session_id.to_string(),
                range,
            });
            state.faults.chunk_delay
        };
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        let mut state = self.state.lock();
        if let Some(remaining) = state.faults.failing_chunks.get_mut(&range.index) {
            if *remaining > 0 {
                *remaining -= 1;
                return Err(RemoteError::Status {
                    status: 500,
                    body: format!("simulated failure for chunk {}", range.index),
                });
            }
        }

        let buffer = state
            .sessions
            .get_mut(session_id)
            .ok_or_else(|| RemoteError::UnknownSession(session_id.to_string()))?;
        if range.start != buffer.len() as u64 || range.end > total_bytes {
            return Err(RemoteError::Status {
                status: 416,
                body: range.content_range(total_bytes),
            });
        }
        buffer.extend_from_slice(&data);
        Ok(())
    }

    async fn finalize(
        &self,
        session_id: &str,
        file_name: &str,
        digest: &Md5Digest,
    ) -> RemoteResult<()> {
        let mut state = self.state.lock();
        state.calls.push(RemoteCall::Finalize {
            session_id: session_id.to_string(),
            file_name: file_name.to_string(),
            md5sum: digest.to_hex(),
        });

        let data = state
            .sessions
            .remove(session_id)
            .ok_or_else(|| RemoteError::UnknownSession(session_id.to_string()))?;

        if state.faults.reject_digest || HashAccumulator::digest_bytes(&data) != *digest {
            return Err(RemoteError::Rejected {
                code: -1,
                message: "md5 mismatch".into(),
            });
        }

        state.completed.insert(file_name.to_string(), data);
        Ok(())
    }
}
