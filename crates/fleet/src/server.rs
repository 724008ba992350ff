//! HTTP dispatch API for the coordinator.
//!
//! Workers pull jobs over four routes: a version gate, a claim endpoint, a
//! source image download and a multipart report endpoint that carries both
//! heartbeats and result uploads. A loopback shutdown route lets the
//! heartbeat monitor stop the server once the queues drain.
//!
//! All file transfer is streamed; bodies are never buffered whole.

use crate::intake::deliver_outputs;
use crate::protocol::{JobDescriptor, ReportState};
use crate::queue::{QueueManager, TouchOutcome};
use axum::body::Body;
use axum::extract::multipart::Field;
use axum::extract::{ConnectInfo, DefaultBodyLimit, Multipart, Path, State};
use axum::http::{header, HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use std::io;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use thiserror::Error;
use tokio::io::AsyncWriteExt;
use tokio::net::TcpListener;
use tokio::sync::Notify;
use tokio_util::io::ReaderStream;
use tracing::{error, info, warn};
use uuid::Uuid;

/// Errors that can occur while running the dispatch server
#[derive(Debug, Error)]
pub enum ServerError {
    #[error("Server IO error: {0}")]
    Io(#[from] io::Error),
}

/// Shared state of the dispatch routes.
#[derive(Clone)]
pub struct AppState {
    /// Job queues and assignment state.
    pub queue: Arc<QueueManager>,
    /// Output directory receiving results and consumed images.
    pub out_path: PathBuf,
    /// Graceful-shutdown signal, triggered by `POST /shutdown`.
    pub shutdown: Arc<Notify>,
}

impl AppState {
    pub fn new(queue: Arc<QueueManager>, out_path: PathBuf) -> Self {
        Self {
            queue,
            out_path,
            shutdown: Arc::new(Notify::new()),
        }
    }
}

/// Worker host identity: `X-Forwarded-For` when present, else the peer IP.
fn client_address(headers: &HeaderMap, peer: SocketAddr) -> String {
    headers
        .get("x-forwarded-for")
        .and_then(|v| v.to_str().ok())
        .map(|s| s.trim().to_string())
        .unwrap_or_else(|| peer.ip().to_string())
}

/// Handler for GET /version
async fn version() -> Json<&'static str> {
    Json(crate::VERSION)
}

/// Handler for GET /jobs/ (claim one waiting job).
async fn claim_job(
    State(state): State<AppState>,
    headers: HeaderMap,
    ConnectInfo(peer): ConnectInfo<SocketAddr>,
) -> Json<Option<JobDescriptor>> {
    let host = client_address(&headers, peer);
    Json(state.queue.claim(&host).map(|job| job.descriptor()))
}

/// Handler for GET /jobs/{id} (stream the source image).
///
/// An id that is not currently working gets an empty body; the worker
/// treats that as "job gone".
async fn fetch_job_input(
    State(state): State<AppState>,
    Path(job_id): Path<Uuid>,
) -> Response {
    let Some(job) = state.queue.working_snapshot(job_id) else {
        warn!("Job {} not found!", job_id);
        return ().into_response();
    };

    match attachment_response(&job.source_path, &job.source_name).await {
        Ok(response) => response,
        Err(e) => {
            error!("Failed to stream {}: {}", job.source_path.display(), e);
            ().into_response()
        }
    }
}

/// Streamed attachment response with length and filename headers.
async fn attachment_response(path: &std::path::Path, name: &str) -> io::Result<Response> {
    let file = tokio::fs::File::open(path).await?;
    let len = file.metadata().await?.len();
    let body = Body::from_stream(ReaderStream::new(file));

    Response::builder()
        .status(StatusCode::OK)
        .header(header::CONTENT_TYPE, "application/octet-stream")
        .header(header::CONTENT_LENGTH, len)
        .header(
            header::CONTENT_DISPOSITION,
            format!("attachment; filename=\"{}\"", name),
        )
        .body(body)
        .map_err(io::Error::other)
}

/// Handler for POST /jobs/{id} (heartbeat or result upload).
///
/// File parts are streamed into the job's staging directory under their
/// field name; the `state` field decides what happens afterwards.
async fn report_job(
    State(state): State<AppState>,
    Path(job_id): Path<Uuid>,
    headers: HeaderMap,
    ConnectInfo(peer): ConnectInfo<SocketAddr>,
    mut multipart: Multipart,
) -> Response {
    let Some(job) = state.queue.working_snapshot(job_id) else {
        warn!("Job {} not found!", job_id);
        return ().into_response();
    };
    let host = client_address(&headers, peer);

    let mut reported = None;
    loop {
        let field = match multipart.next_field().await {
            Ok(Some(field)) => field,
            Ok(None) => break,
            Err(e) => {
                error!("Malformed upload for job {}: {}", job_id, e);
                return ().into_response();
            }
        };
        let Some(name) = field.name().map(str::to_string) else {
            continue;
        };

        if name == "state" {
            reported = field.text().await.ok().as_deref().and_then(ReportState::parse);
            continue;
        }

        // Any other field is a result file named by the field itself.
        let Some(file_name) = std::path::Path::new(&name)
            .file_name()
            .map(|n| n.to_os_string())
        else {
            warn!("Ignoring upload field with unusable name {:?}", name);
            continue;
        };
        let dest = job.temp_path.join(file_name);
        info!("Copying {} from {} [{}]", name, host, job_id);
        match save_field(field, &dest).await {
            Ok(()) => {
                state.queue.record_file(job_id, dest);
            }
            Err(e) => error!("Failed to store {} for job {}: {}", name, job_id, e),
        }
    }

    match reported {
        Some(ReportState::Done) => finish_job(&state, job_id).await,
        Some(ReportState::Working) => {
            if state.queue.touch(job_id, &host) == TouchOutcome::Reassigned {
                error!("Job response from unknown host");
            }
        }
        None => warn!("Job {} POST without a valid state field", job_id),
    }

    ().into_response()
}

/// Stream one multipart field to disk.
async fn save_field(mut field: Field<'_>, dest: &std::path::Path) -> io::Result<()> {
    let mut file = tokio::fs::File::create(dest).await?;
    while let Some(chunk) = field.chunk().await.map_err(io::Error::other)? {
        file.write_all(&chunk).await?;
    }
    file.flush().await
}

/// Land a finished job's files and mark it done.
///
/// The moves run to completion before the handler responds, so a worker's
/// successful DONE POST corresponds to durable coordinator state.
async fn finish_job(state: &AppState, job_id: Uuid) {
    let Some(job) = state.queue.working_snapshot(job_id) else {
        return;
    };

    let out_path = state.out_path.clone();
    let moved = tokio::task::spawn_blocking(move || deliver_outputs(&job, &out_path)).await;
    if let Err(e) = moved {
        error!("Result intake for job {} panicked: {}", job_id, e);
        return;
    }

    match state.queue.complete(job_id) {
        Some(job) => info!("Job {} done", job.id),
        // Timed out and was requeued while the files were moving
        None => error!("Job {} finished but was no longer assigned", job_id),
    }
}

/// Handler for POST /shutdown (stop the server gracefully).
async fn shutdown(State(state): State<AppState>) {
    info!("Shutdown requested");
    state.shutdown.notify_one();
}

/// Creates the axum Router with the dispatch endpoints
pub fn create_dispatch_router(state: AppState) -> Router {
    Router::new()
        .route("/version", get(version))
        .route("/jobs/", get(claim_job))
        .route("/jobs/:job_id", get(fetch_job_input).post(report_job))
        .route("/shutdown", post(shutdown))
        // Result uploads are multi-gigabyte; no request body cap.
        .layer(DefaultBodyLimit::disable())
        .with_state(state)
}

/// Runs the dispatch server until a shutdown is requested.
pub async fn run_dispatch_server(
    listener: TcpListener,
    state: AppState,
) -> Result<(), ServerError> {
    let shutdown = state.shutdown.clone();
    let app = create_dispatch_router(state);

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(async move { shutdown.notified().await })
    .await?;

    Ok(())
}
