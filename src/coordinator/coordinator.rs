use crate::chunk::{BandwidthLimiter, ChunkUploader};
use crate::config::UplinkConfig;
use crate::coordinator::error::{UploadError, UploadResult};
use crate::coordinator::state_machine::UploadStateMachine;
use crate::coordinator::types::{UploadEvent, UploadOutcome};
use crate::integrity::{FileFingerprint, HashAccumulator};
use crate::metrics::UploadMetrics;
use crate::progress::{NotificationCenter, ProgressEvent, ProgressReporter};
use crate::remote::{RemoteError, UploadRemote};
use crate::session::{
    SessionError, SessionRegistry, TargetGuard, UploadPhase, UploadSession, UploadTarget,
};
use std::path::Path;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

/// Drives one file through begin, hash, transfer and finalize.
///
/// Every call to [`upload`](Self::upload) is a brand-new session: nothing
/// from an earlier attempt is reused, and a failed attempt restarts from
/// byte 0 with a fresh session id.
pub struct UploadCoordinator {
    remote: Arc<dyn UploadRemote>,
    hasher: HashAccumulator,
    uploader: ChunkUploader,
    reporter: ProgressReporter,
    registry: SessionRegistry,
    notifications: Option<NotificationCenter>,
    session_timeout: Option<Duration>,
}

impl UploadCoordinator {
    pub fn new(
        remote: Arc<dyn UploadRemote>,
        hasher: HashAccumulator,
        uploader: ChunkUploader,
    ) -> Self {
        Self {
            remote,
            hasher,
            uploader,
            reporter: ProgressReporter::new(),
            registry: SessionRegistry::new(),
            notifications: None,
            session_timeout: None,
        }
    }

    /// Build hasher, uploader and timeouts from a validated config.
    pub fn from_config(remote: Arc<dyn UploadRemote>, config: &UplinkConfig) -> UploadResult<Self> {
        config
            .validate()
            .map_err(|e| UploadError::Config(e.to_string()))?;

        let hasher = HashAccumulator::new(config.hash_window)
            .map_err(|e| UploadError::Config(e.to_string()))?;
        let uploader = ChunkUploader::new(config.chunk_size)
            .map_err(|e| UploadError::Config(e.to_string()))?
            .with_timeout(config.chunk_timeout())
            .with_retry(config.retry.clone())
            .with_limiter(BandwidthLimiter::new(config.bandwidth_limit_bps));

        let mut coordinator = Self::new(remote, hasher, uploader);
        coordinator.session_timeout = config.session_timeout();
        Ok(coordinator)
    }

    pub fn with_reporter(mut self, reporter: ProgressReporter) -> Self {
        self.reporter = reporter;
        self
    }

    /// Share the one-upload-per-target bookkeeping with other coordinators.
    pub fn with_registry(mut self, registry: SessionRegistry) -> Self {
        self.registry = registry;
        self
    }

    pub fn with_notifications(mut self, notifications: NotificationCenter) -> Self {
        self.notifications = Some(notifications);
        self
    }

    pub fn with_session_timeout(mut self, timeout: Duration) -> Self {
        self.session_timeout = Some(timeout);
        self
    }

    pub fn reporter(&self) -> &ProgressReporter {
        &self.reporter
    }

    pub fn target(&self) -> UploadTarget {
        self.remote.target()
    }

    pub async fn upload(&self, path: &Path) -> UploadResult<UploadOutcome> {
        self.upload_with_cancel(path, CancellationToken::new()).await
    }

    /// Run all four phases. Cancelling `cancel` aborts the in-flight request
    /// and ends the run with [`UploadError::Cancelled`].
    pub async fn upload_with_cancel(
        &self,
        path: &Path,
        cancel: CancellationToken,
    ) -> UploadResult<UploadOutcome> {
        let target = self.remote.target();
        let file_name = path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .ok_or_else(|| UploadError::InvalidFile(format!("{}: no file name", path.display())))?;
        target
            .validate_file_name(&file_name)
            .map_err(|e| UploadError::InvalidFile(e.to_string()))?;

        let fingerprint = FileFingerprint::capture(path)
            .await
            .map_err(|e| UploadError::InvalidFile(e.to_string()))?;
        if fingerprint.len == 0 {
            return Err(UploadError::InvalidFile(format!("{file_name} is empty")));
        }

        let guard = self.registry.acquire(target).map_err(|e| match e {
            SessionError::AlreadyActive(target) => UploadError::AlreadyInProgress(target),
            other => UploadError::Session(other),
        })?;

        self.reporter.reset();
        let machine = UploadStateMachine::new();
        let metrics = UploadMetrics::start(target.as_str(), fingerprint.len);
        info!(%target, file = %file_name, bytes = fingerprint.len, "Starting upload");

        let run = self.run(path, &file_name, fingerprint, &machine, &guard, &cancel);
        let result = match self.session_timeout {
            Some(limit) => match tokio::time::timeout(limit, run).await {
                Ok(result) => result,
                Err(_) => Err(UploadError::Timeout(limit)),
            },
            None => run.await,
        };

        match result {
            Ok(outcome) => {
                info!(
                    %target,
                    session_id = %outcome.session_id,
                    md5 = %outcome.digest,
                    elapsed_ms = outcome.elapsed.as_millis() as u64,
                    "Upload verified"
                );
                metrics.complete();
                self.notify_success(&outcome);
                Ok(outcome)
            }
            Err(err) => {
                let failed_in = failure_phase(&err, machine.current_state());
                if !machine.current_state().is_terminal() {
                    machine.transition(UploadEvent::Fail {
                        reason: err.to_string(),
                    })?;
                }
                error!(%target, phase = failed_in.label(), kind = err.kind(), "{}", err);
                self.reporter
                    .update(ProgressEvent::new(UploadPhase::Failed, 0, err.to_string()));
                metrics.fail(failed_in.label());
                if let Some(center) = &self.notifications {
                    center.error(err.to_string());
                }
                Err(err)
            }
        }
    }

    async fn run(
        &self,
        path: &Path,
        file_name: &str,
        fingerprint: FileFingerprint,
        machine: &UploadStateMachine,
        guard: &TargetGuard,
        cancel: &CancellationToken,
    ) -> UploadResult<UploadOutcome> {
        let started = Instant::now();
        let target = self.remote.target();

        // Phase 1: session id
        let session_id = tokio::select! {
            _ = cancel.cancelled() => return Err(UploadError::Cancelled),
            reply = self.remote.begin_session() => reply.map_err(|e| match e {
                RemoteError::Schema(msg) => UploadError::Schema(msg),
                other => UploadError::NoSessionId(other.to_string()),
            })?,
        };
        machine.transition(UploadEvent::SessionOpened {
            session_id: session_id.clone(),
        })?;
        guard.set_session_id(&session_id);

        let mut session = UploadSession::new(
            session_id.clone(),
            target,
            file_name.to_string(),
            fingerprint.len,
            self.uploader.chunk_size(),
        )?;
        info!(%target, %session_id, "Session started");
        self.reporter.update(ProgressEvent::new(
            UploadPhase::SessionStarted,
            0,
            format!("session {session_id} started"),
        ));

        // Phase 2: checksum
        fingerprint.ensure_unchanged(path).await?;
        session.set_phase(machine.transition(UploadEvent::HashStarted)?);
        self.reporter
            .update(ProgressEvent::new(UploadPhase::Hashing, 0, "computing checksum"));

        let digest = self
            .hasher
            .digest_file(path, cancel, |p| {
                self.reporter.update(
                    ProgressEvent::new(
                        UploadPhase::Hashing,
                        p.percent,
                        format!("computing checksum {}%", p.percent),
                    )
                    .with_bytes(p.bytes_hashed),
                );
            })
            .await?;
        session.set_digest(digest)?;
        info!(%session_id, md5 = %digest, "Checksum computed");

        // Phase 3: chunks
        fingerprint
            .ensure_unchanged(path)
            .await
            .map_err(|e| UploadError::TransferFailure {
                offset: 0,
                reason: e.to_string(),
            })?;
        session.set_phase(machine.transition(UploadEvent::TransferStarted)?);
        self.reporter
            .update(ProgressEvent::new(UploadPhase::Transferring, 0, "uploading"));

        let mut bookkeeping: Option<SessionError> = None;
        let total_chunks = self.uploader.plan(fingerprint.len).total_chunks();
        self.uploader
            .upload(path, &session_id, self.remote.as_ref(), cancel, |p| {
                if let Err(e) = session.record_transferred(p.bytes_sent) {
                    bookkeeping.get_or_insert(e);
                }
                self.reporter.update(
                    ProgressEvent::new(
                        UploadPhase::Transferring,
                        p.percent,
                        format!("uploading {}%", p.percent),
                    )
                    .with_bytes(p.bytes_sent),
                );
            })
            .await?;
        if let Some(e) = bookkeeping {
            return Err(e.into());
        }
        if !session.is_fully_transferred() {
            return Err(UploadError::TransferFailure {
                offset: session.bytes_transferred(),
                reason: "transfer ended before the last byte".into(),
            });
        }
        info!(%session_id, chunks = total_chunks, "All chunks acknowledged");

        // Phase 4: verification
        if cancel.is_cancelled() {
            return Err(UploadError::Cancelled);
        }
        session.set_phase(machine.transition(UploadEvent::FinalizeStarted)?);
        self.reporter.update(ProgressEvent::new(
            UploadPhase::Finalizing,
            0,
            "verifying checksum on device",
        ));

        tokio::select! {
            _ = cancel.cancelled() => return Err(UploadError::Cancelled),
            reply = self.remote.finalize(&session_id, file_name, &digest) => {
                reply.map_err(|e| match e {
                    RemoteError::Rejected { code, message } => {
                        UploadError::VerificationFailure(format!("{message} (code {code})"))
                    }
                    RemoteError::Schema(msg) => UploadError::Schema(msg),
                    other => UploadError::VerificationFailure(other.to_string()),
                })?
            }
        };
        session.set_phase(machine.transition(UploadEvent::Verified)?);
        self.reporter.update(ProgressEvent::new(
            UploadPhase::Succeeded,
            100,
            format!("{file_name} uploaded and verified"),
        ));

        Ok(UploadOutcome {
            session_id,
            target,
            file_name: file_name.to_string(),
            total_bytes: fingerprint.len,
            total_chunks,
            digest,
            elapsed: started.elapsed(),
        })
    }

    fn notify_success(&self, outcome: &UploadOutcome) {
        if let Some(center) = &self.notifications {
            center.success(format!(
                "{} uploaded to {}",
                outcome.file_name, outcome.target
            ));
        }
    }
}

/// Phase a failure is counted under. Errors tied to a phase name it
/// themselves; the rest take the machine's phase, with `Idle` meaning the
/// session never opened.
fn failure_phase(err: &UploadError, current: UploadPhase) -> UploadPhase {
    let phase = match err.phase() {
        UploadPhase::Idle | UploadPhase::Failed => current,
        phase => phase,
    };
    match phase {
        UploadPhase::Idle | UploadPhase::Failed | UploadPhase::Succeeded => {
            UploadPhase::SessionStarted
        }
        phase => phase,
    }
}
