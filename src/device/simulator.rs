use crate::device::error::{DeviceError, DeviceResult};
use crate::integrity::{HashAccumulator, Md5Digest};
use crate::poll::{StatusReply, TaskStatus};
use crate::remote::{DeviceReply, SESSION_ID_HEADER};
use crate::session::UploadTarget;
use axum::{
    body::Bytes,
    extract::{DefaultBodyLimit, Query, State},
    http::{header::CONTENT_RANGE, HeaderMap},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use dashmap::DashMap;
use parking_lot::RwLock;
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use tokio::net::TcpListener;
use tower_http::trace::TraceLayer;

/// Status endpoint for the simulated model conversion task.
pub const TASK_STATUS_PATH: &str = "/model/task-status";

const MAX_BODY_BYTES: usize = 16 * 1024 * 1024;

/// Faults the simulator injects into otherwise well-formed exchanges.
#[derive(Debug, Clone, Default)]
pub struct FaultPlan {
    /// Every attempt at this chunk index answers HTTP 500
    pub fail_chunk: Option<u32>,
    /// Finalize reports a digest mismatch regardless of content
    pub force_mismatch: bool,
    /// Begin answers `{"code":0}` without a `file-id`
    pub omit_session_id: bool,
    /// Conversion task ends in `error` with this message
    pub fail_task: Option<String>,
}

/// A file that passed verification.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReceivedFile {
    pub target: UploadTarget,
    pub file_name: String,
    pub md5: Md5Digest,
    pub len: u64,
}

struct PendingUpload {
    target: UploadTarget,
    data: Vec<u8>,
    chunks: u32,
}

#[derive(Default)]
struct DeviceState {
    sessions: DashMap<String, PendingUpload>,
    received: RwLock<Vec<ReceivedFile>>,
    faults: RwLock<FaultPlan>,
    save_dir: Option<PathBuf>,
    task_polls: AtomicU32,
}

/// Accepts begin / chunk / finalize on every [`UploadTarget`] endpoint and
/// checks the MD5 the way the camera firmware does.
#[derive(Clone, Default)]
pub struct DeviceSimulator {
    state: Arc<DeviceState>,
}

#[derive(Debug, Deserialize)]
struct UploadQuery {
    #[serde(rename = "upload-type")]
    upload_type: Option<String>,
    id: Option<String>,
    start: Option<String>,
    #[serde(rename = "File-name")]
    file_name: Option<String>,
    md5sum: Option<String>,
}

impl DeviceSimulator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Also write verified files under `dir`.
    pub fn with_save_dir(dir: impl Into<PathBuf>) -> Self {
        Self {
            state: Arc::new(DeviceState {
                save_dir: Some(dir.into()),
                ..Default::default()
            }),
        }
    }

    pub fn set_faults(&self, faults: FaultPlan) {
        *self.state.faults.write() = faults;
    }

    pub fn received(&self) -> Vec<ReceivedFile> {
        self.state.received.read().clone()
    }

    /// Sessions opened but not yet finalized
    pub fn pending_sessions(&self) -> usize {
        self.state.sessions.len()
    }

    pub fn router(&self) -> Router {
        let mut router = Router::new();
        for target in UploadTarget::ALL {
            router = router.route(
                target.endpoint(),
                post(
                    move |State(state): State<Arc<DeviceState>>,
                          Query(query): Query<UploadQuery>,
                          headers: HeaderMap,
                          body: Bytes| async move {
                        handle_upload(state, target, query, headers, body).await
                    },
                ),
            );
        }

        router
            .route(TASK_STATUS_PATH, get(task_status))
            .layer(DefaultBodyLimit::max(MAX_BODY_BYTES))
            .layer(TraceLayer::new_for_http())
            .with_state(self.state.clone())
    }

    /// [`router`](Self::router) mounted under `prefix`, e.g. `/cgi-bin/entry.cgi`.
    pub fn router_at(&self, prefix: &str) -> Router {
        let prefix = prefix.trim_end_matches('/');
        if prefix.is_empty() {
            self.router()
        } else {
            Router::new().nest(prefix, self.router())
        }
    }

    pub async fn serve(self, listener: TcpListener) -> std::io::Result<()> {
        axum::serve(listener, self.router()).await
    }
}

async fn handle_upload(
    state: Arc<DeviceState>,
    target: UploadTarget,
    query: UploadQuery,
    headers: HeaderMap,
    body: Bytes,
) -> DeviceResult<Response> {
    if query.upload_type.as_deref() == Some("resumable") {
        return Ok(begin(&state, target));
    }
    if let Some(session_id) = query.id {
        return append_chunk(&state, &session_id, &headers, body);
    }
    if let Some(session_id) = query.start {
        let file_name = query
            .file_name
            .ok_or_else(|| DeviceError::InvalidRequest("missing File-name".into()))?;
        let md5sum = query
            .md5sum
            .ok_or_else(|| DeviceError::InvalidRequest("missing md5sum".into()))?;
        return finalize(&state, &session_id, &file_name, &md5sum).await;
    }
    Err(DeviceError::InvalidRequest(
        "expected upload-type, id or start".into(),
    ))
}

fn begin(state: &DeviceState, target: UploadTarget) -> Response {
    let session_id = uuid::Uuid::new_v4().to_string();
    state.sessions.insert(
        session_id.clone(),
        PendingUpload {
            target,
            data: Vec::new(),
            chunks: 0,
        },
    );
    tracing::debug!(%target, %session_id, "upload session opened");

    if state.faults.read().omit_session_id {
        return Json(DeviceReply {
            code: 0,
            msg: None,
        })
        .into_response();
    }
    ([(SESSION_ID_HEADER, session_id)], Json(DeviceReply::ok("ok"))).into_response()
}

fn append_chunk(
    state: &DeviceState,
    session_id: &str,
    headers: &HeaderMap,
    body: Bytes,
) -> DeviceResult<Response> {
    let range = headers
        .get(CONTENT_RANGE)
        .and_then(|value| value.to_str().ok())
        .ok_or_else(|| DeviceError::InvalidRequest("missing Content-Range".into()))?;
    let (start, end, total) = parse_content_range(range)
        .ok_or_else(|| DeviceError::InvalidRequest(format!("bad Content-Range {range:?}")))?;

    let mut pending = state
        .sessions
        .get_mut(session_id)
        .ok_or_else(|| DeviceError::UnknownSession(session_id.to_string()))?;

    if state.faults.read().fail_chunk == Some(pending.chunks) {
        return Err(DeviceError::InjectedFailure(pending.chunks));
    }
    let received = pending.data.len() as u64;
    if start != received {
        return Err(DeviceError::RangeMismatch {
            expected: received,
            got: start,
        });
    }
    if end - start + 1 != body.len() as u64 {
        return Err(DeviceError::InvalidRequest(format!(
            "{range} does not match a {} byte body",
            body.len()
        )));
    }

    pending.data.extend_from_slice(&body);
    pending.chunks += 1;
    tracing::debug!(session_id, start, end, total, "chunk stored");
    Ok(Json(DeviceReply::ok("ok")).into_response())
}

async fn finalize(
    state: &DeviceState,
    session_id: &str,
    file_name: &str,
    md5sum: &str,
) -> DeviceResult<Response> {
    let (_, pending) = state
        .sessions
        .remove(session_id)
        .ok_or_else(|| DeviceError::UnknownSession(session_id.to_string()))?;

    let actual = HashAccumulator::digest_bytes(&pending.data);
    let claimed = md5sum.trim().to_ascii_lowercase();
    if state.faults.read().force_mismatch || actual.to_hex() != claimed {
        tracing::warn!(session_id, %actual, claimed, "md5 mismatch, upload discarded");
        return Ok(Json(DeviceReply::error(-1, "md5 mismatch")).into_response());
    }

    // Never let the client pick a directory.
    let safe_name = Path::new(file_name)
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .ok_or_else(|| DeviceError::InvalidRequest(format!("bad File-name {file_name:?}")))?;

    if let Some(dir) = &state.save_dir {
        tokio::fs::write(dir.join(&safe_name), &pending.data)
            .await
            .map_err(|e| DeviceError::Storage(format!("{safe_name}: {e}")))?;
    }

    tracing::info!(target = %pending.target, file = %safe_name, bytes = pending.data.len(), "upload verified");
    state.received.write().push(ReceivedFile {
        target: pending.target,
        file_name: safe_name,
        md5: actual,
        len: pending.data.len() as u64,
    });
    Ok(Json(DeviceReply::ok("ok")).into_response())
}

/// Advances one step per poll: init, 25, 50, 75, done.
async fn task_status(State(state): State<Arc<DeviceState>>) -> Json<StatusReply> {
    let poll = state.task_polls.fetch_add(1, Ordering::SeqCst);
    let failure = state.faults.read().fail_task.clone();

    let status = match (poll, failure) {
        (0, _) => TaskStatus::Init,
        (_, Some(msg)) => TaskStatus::Error(msg),
        (1..=3, None) => TaskStatus::Progress((poll * 25) as u8),
        (_, None) => TaskStatus::Done,
    };
    Json(StatusReply::with_status(&status))
}

/// Parse `bytes <start>-<end>/<total>` (end inclusive).
pub fn parse_content_range(value: &str) -> Option<(u64, u64, u64)> {
    let rest = value.trim().strip_prefix("bytes ")?;
    let (range, total) = rest.split_once('/')?;
    let (start, end) = range.split_once('-')?;

    let start: u64 = start.trim().parse().ok()?;
    let end: u64 = end.trim().parse().ok()?;
    let total: u64 = total.trim().parse().ok()?;
    (start <= end && end < total).then_some((start, end, total))
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use http_body_util::BodyExt;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tower::ServiceExt;
    use tracing::span::{Attributes, Id};
    use tracing_subscriber::layer::{Context, Layer, SubscriberExt};
    use tracing_subscriber::util::SubscriberInitExt;

    async fn send(app: &Router, uri: &str, range: Option<&str>, body: Vec<u8>) -> Response {
        let mut request = Request::post(uri);
        if let Some(range) = range {
            request = request.header(CONTENT_RANGE, range);
        }
        app.clone()
            .oneshot(request.body(Body::from(body)).unwrap())
            .await
            .unwrap()
    }

    async fn reply(response: Response) -> DeviceReply {
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        serde_json::from_slice(&bytes).unwrap()
    }

    async fn begin_session(app: &Router) -> String {
        let response = send(app, "/config/upload?upload-type=resumable", None, Vec::new()).await;
        assert_eq!(response.status(), StatusCode::OK);
        response.headers()[SESSION_ID_HEADER]
            .to_str()
            .unwrap()
            .to_string()
    }

    #[test]
    fn test_parse_content_range() {
        assert_eq!(
            parse_content_range("bytes 0-524287/1000000"),
            Some((0, 524_287, 1_000_000))
        );
        assert_eq!(parse_content_range("bytes 5-4/10"), None);
        assert_eq!(parse_content_range("0-4/10"), None);
        assert_eq!(parse_content_range("bytes a-4/10"), None);
        assert_eq!(parse_content_range("bytes 0-10/10"), None);
        assert_eq!(
            parse_content_range("bytes 0-18446744073709551615/1"),
            None
        );
    }

    #[tokio::test]
    async fn test_full_exchange() {
        let sim = DeviceSimulator::new();
        let app = sim.router();
        let sid = begin_session(&app).await;

        let data = b"hello device".to_vec();
        let uri = format!("/config/upload?id={sid}");
        let response = send(&app, &uri, Some("bytes 0-4/12"), data[..5].to_vec()).await;
        assert_eq!(response.status(), StatusCode::OK);
        let response = send(&app, &uri, Some("bytes 5-11/12"), data[5..].to_vec()).await;
        assert_eq!(response.status(), StatusCode::OK);

        let md5 = HashAccumulator::digest_bytes(&data);
        let uri = format!("/config/upload?start={sid}&File-name=dev.conf&md5sum={md5}");
        let body = reply(send(&app, &uri, None, Vec::new()).await).await;
        assert!(body.is_ok());

        let received = sim.received();
        assert_eq!(received.len(), 1);
        assert_eq!(received[0].target, UploadTarget::Config);
        assert_eq!(received[0].md5, md5);
        assert_eq!(sim.pending_sessions(), 0);
    }

    #[tokio::test]
    async fn test_out_of_order_chunk_rejected() {
        let sim = DeviceSimulator::new();
        let app = sim.router();
        let sid = begin_session(&app).await;

        let uri = format!("/config/upload?id={sid}");
        let response = send(&app, &uri, Some("bytes 5-9/10"), vec![0; 5]).await;
        assert_eq!(response.status(), StatusCode::RANGE_NOT_SATISFIABLE);
    }

    #[tokio::test]
    async fn test_oversized_range_end_rejected() {
        let sim = DeviceSimulator::new();
        let app = sim.router();
        let sid = begin_session(&app).await;

        let uri = format!("/config/upload?id={sid}");
        let response = send(&app, &uri, Some("bytes 0-18446744073709551615/1"), vec![0]).await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    struct RequestSpans(Arc<AtomicUsize>);

    impl<S: tracing::Subscriber> Layer<S> for RequestSpans {
        fn on_new_span(&self, attrs: &Attributes<'_>, _: &Id, _: Context<'_, S>) {
            if attrs.metadata().name() == "request" {
                self.0.fetch_add(1, Ordering::SeqCst);
            }
        }
    }

    #[tokio::test]
    async fn test_prefixed_router_traces_once() {
        let spans = Arc::new(AtomicUsize::new(0));
        let _default = tracing_subscriber::registry()
            .with(RequestSpans(spans.clone()))
            .set_default();

        let sim = DeviceSimulator::new();
        let app = sim.router_at("/cgi-bin/entry.cgi/");
        let response = send(
            &app,
            "/cgi-bin/entry.cgi/config/upload?upload-type=resumable",
            None,
            Vec::new(),
        )
        .await;

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(spans.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_digest_mismatch_reply() {
        let sim = DeviceSimulator::new();
        let app = sim.router();
        let sid = begin_session(&app).await;

        let uri = format!("/config/upload?id={sid}");
        send(&app, &uri, Some("bytes 0-2/3"), vec![1, 2, 3]).await;
        let uri = format!(
            "/config/upload?start={sid}&File-name=x.conf&md5sum=00000000000000000000000000000000"
        );
        let body = reply(send(&app, &uri, None, Vec::new()).await).await;

        assert_eq!(body.code, -1);
        assert_eq!(body.msg.as_deref(), Some("md5 mismatch"));
        assert!(sim.received().is_empty());
    }

    #[tokio::test]
    async fn test_injected_faults() {
        let sim = DeviceSimulator::new();
        sim.set_faults(FaultPlan {
            fail_chunk: Some(0),
            omit_session_id: true,
            ..Default::default()
        });
        let app = sim.router();

        let response = send(&app, "/model/upload?upload-type=resumable", None, Vec::new()).await;
        assert!(response.headers().get(SESSION_ID_HEADER).is_none());

        let sid = sim
            .state
            .sessions
            .iter()
            .next()
            .map(|entry| entry.key().clone())
            .unwrap();
        let uri = format!("/model/upload?id={sid}");
        let response = send(&app, &uri, Some("bytes 0-0/1"), vec![7]).await;
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[tokio::test]
    async fn test_task_status_sequence() {
        let sim = DeviceSimulator::new();
        let app = sim.router();

        let mut seen = Vec::new();
        for _ in 0..5 {
            let response = app
                .clone()
                .oneshot(Request::get(TASK_STATUS_PATH).body(Body::empty()).unwrap())
                .await
                .unwrap();
            let bytes = response.into_body().collect().await.unwrap().to_bytes();
            seen.push(crate::poll::parse_status_reply(&bytes).unwrap());
        }

        assert_eq!(
            seen,
            vec![
                TaskStatus::Init,
                TaskStatus::Progress(25),
                TaskStatus::Progress(50),
                TaskStatus::Progress(75),
                TaskStatus::Done,
            ]
        );
    }
}
