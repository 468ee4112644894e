//! Unix domain socket server for skill requests.
//!
//! Listens on a filesystem socket using the `interprocess` crate. Each
//! accepted connection carries exactly one request and receives exactly
//! one response, after which the daemon shuts down its write side,
//! discards whatever the client is still sending, and drops the
//! connection; end-of-stream is the client's end-of-response.
//!
//! ## Protocol
//!
//! Request (one JSON object; trailing newline and half-close optional):
//! ```json
//! {"package": "dojutsu-agent", "function": "run", "args": ["write a function", "gsk_…", "groq"]}
//! ```
//!
//! Response (one JSON object, then EOF):
//! ```json
//! {"byakugan": "…", "mode_sage": "…", "jougan": "…", "skill_selection": "…", "code": "…",
//!  "execution": "…", "skills_used": ["dev-expert"], "timing": {"byakugan": 2.1}, "total_time": 9.8}
//! {"execution": "", "skills_used": [], "timing": {}, "total_time": 0.0, "error": "unknown skill: …"}
//! ```

use std::io::ErrorKind;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use interprocess::local_socket::{tokio::prelude::*, GenericFilePath, ListenerOptions};
use tokio::io::AsyncReadExt;
use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use tokio_util::codec::Framed;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{debug, info, info_span, warn, Instrument};

use super::codec::RequestCodec;
use crate::config::GlobalConfig;
use crate::models::SkillResult;
use crate::pipeline::executor::PipelineExecutor;
use crate::pipeline::registry::SkillRegistry;
use crate::{AppError, Result};

/// Connection type produced by the listener.
pub type IpcStream = interprocess::local_socket::tokio::Stream;

/// How long a finished connection keeps reading unconsumed client bytes.
const DRAIN_TIMEOUT: Duration = Duration::from_secs(2);

/// Most unconsumed client bytes read and discarded per connection.
const DRAIN_MAX_BYTES: u64 = 4 * 1_048_576;

/// Process-scoped state shared read-only by every connection.
#[derive(Debug)]
pub struct DaemonState {
    /// Frozen skill table.
    pub registry: Arc<SkillRegistry>,
    /// Deadline-bounded stage runner.
    pub executor: PipelineExecutor,
    /// Budget for receiving a complete request.
    pub request_read_timeout: Duration,
    /// Payload cap handed to the codec.
    pub max_request_bytes: usize,
    /// Admission control; one permit per in-flight connection.
    pub admission: Arc<Semaphore>,
}

impl DaemonState {
    /// Assemble state from `config` and a built registry.
    #[must_use]
    pub fn new(config: &GlobalConfig, registry: SkillRegistry) -> Self {
        Self {
            registry: Arc::new(registry),
            executor: PipelineExecutor::new(config.timeouts.pipeline()),
            request_read_timeout: config.timeouts.request_read(),
            max_request_bytes: config.max_request_bytes,
            admission: Arc::new(Semaphore::new(config.max_concurrent_connections)),
        }
    }
}

/// Spawn the listener task on `socket_path`.
///
/// The task accepts until `ct` is cancelled, then waits for in-flight
/// connections (each bounded by its own deadlines) and removes the socket
/// file.
///
/// # Errors
///
/// Returns `AppError::Ipc` if the socket path is held by a live daemon or
/// the listener cannot be created.
pub fn spawn_ipc_server(
    state: Arc<DaemonState>,
    socket_path: &Path,
    ct: CancellationToken,
) -> Result<tokio::task::JoinHandle<()>> {
    prepare_socket_path(socket_path)?;

    let listener_name = socket_path
        .to_fs_name::<GenericFilePath>()
        .map_err(|err| {
            AppError::Ipc(format!("invalid socket path '{}': {err}", socket_path.display()))
        })?;

    let listener = ListenerOptions::new()
        .name(listener_name)
        .create_tokio()
        .map_err(|err| AppError::Ipc(format!("failed to create ipc listener: {err}")))?;

    restrict_permissions(socket_path);
    info!(socket = %socket_path.display(), "IPC server listening");

    let socket_path = socket_path.to_path_buf();
    let handle = tokio::spawn(async move {
        let span = info_span!("ipc_server", socket = %socket_path.display());
        async move {
            let tracker = TaskTracker::new();
            loop {
                tokio::select! {
                    () = ct.cancelled() => {
                        info!("IPC server shutting down");
                        break;
                    }
                    accept_result = listener.accept() => {
                        match accept_result {
                            Ok(stream) => {
                                let permit = Arc::clone(&state.admission).try_acquire_owned().ok();
                                tracker.spawn(handle_connection(stream, Arc::clone(&state), permit));
                            }
                            Err(err) => {
                                warn!(%err, "IPC accept failed");
                            }
                        }
                    }
                }
            }

            drop(listener);
            tracker.close();
            if !tracker.is_empty() {
                info!(in_flight = tracker.len(), "waiting for in-flight connections");
            }
            tracker.wait().await;
            remove_socket_file(&socket_path);
            info!("IPC server stopped");
        }
        .instrument(span)
        .await;
    });

    Ok(handle)
}

/// Serve one connection: read, route, execute, write, close, drain.
///
/// Every path ends with a written result and a closed connection; a
/// missing `permit` means admission control rejected the connection.
/// Unread client bytes are drained before the socket is dropped; closing
/// with pending input resets the connection.
pub async fn handle_connection(
    stream: IpcStream,
    state: Arc<DaemonState>,
    permit: Option<OwnedSemaphorePermit>,
) {
    let conn_id = uuid::Uuid::new_v4();
    let span = info_span!("ipc_conn", %conn_id);
    async move {
        let mut framed = Framed::new(stream, RequestCodec::new(state.max_request_bytes));

        let result = match permit {
            Some(_permit) => serve(&mut framed, &state).await,
            None => {
                warn!("connection rejected: concurrency limit reached");
                SkillResult::failure(&AppError::Busy(
                    "too many concurrent connections, retry later".into(),
                ))
            }
        };

        if !result.is_success() {
            debug!(error = %result.error, "responding with error");
        }

        if let Err(err) = framed.send(result).await {
            warn!(%err, "failed to write ipc response");
        }
        if let Err(err) = SinkExt::<SkillResult>::close(&mut framed).await {
            debug!(%err, "failed to shut down ipc connection");
        }
        drain_input(framed.into_inner()).await;

        info!("IPC connection closed");
    }
    .instrument(span)
    .await;
}

/// Read the request and run its pipeline; never fails.
async fn serve(framed: &mut Framed<IpcStream, RequestCodec>, state: &DaemonState) -> SkillResult {
    let request = match tokio::time::timeout(state.request_read_timeout, framed.next()).await {
        Err(_) => {
            return SkillResult::failure(&AppError::Timeout(format!(
                "no complete request received within {:?}",
                state.request_read_timeout
            )))
        }
        Ok(None) => {
            return SkillResult::failure(&AppError::Codec(
                "connection closed before a request was received".into(),
            ))
        }
        Ok(Some(Err(err))) => return SkillResult::failure(&err),
        Ok(Some(Ok(request))) => request,
    };

    info!(skill = %request.skill_key(), args = request.args.len(), "request received");

    let pipeline = match state.registry.lookup(&request.package, &request.function) {
        Ok(pipeline) => pipeline,
        Err(err) => {
            warn!(skill = %request.skill_key(), "unknown skill requested");
            return SkillResult::failure(&err);
        }
    };

    state.executor.execute(&pipeline, &request).await
}

/// Read and discard client input until EOF, a byte cap, or a short timeout.
async fn drain_input(stream: IpcStream) {
    let mut rest = stream.take(DRAIN_MAX_BYTES);
    match tokio::time::timeout(DRAIN_TIMEOUT, tokio::io::copy(&mut rest, &mut tokio::io::sink())).await {
        Ok(Ok(0)) => {}
        Ok(Ok(bytes)) => debug!(bytes, "discarded unread request bytes"),
        Ok(Err(err)) => debug!(%err, "drain stopped"),
        Err(_) => debug!("drain timed out"),
    }
}

/// Clear a stale socket file; refuse if another daemon still answers on it.
fn prepare_socket_path(path: &Path) -> Result<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent).map_err(|err| {
                AppError::Ipc(format!("cannot create socket directory {}: {err}", parent.display()))
            })?;
        }
    }

    if !path.exists() {
        return Ok(());
    }

    if std::os::unix::net::UnixStream::connect(path).is_ok() {
        return Err(AppError::Ipc(format!(
            "another daemon is already listening on {}",
            path.display()
        )));
    }

    warn!(socket = %path.display(), "removing stale socket file");
    std::fs::remove_file(path)
        .map_err(|err| AppError::Ipc(format!("cannot remove stale socket {}: {err}", path.display())))
}

fn restrict_permissions(path: &Path) {
    use std::os::unix::fs::PermissionsExt;

    if let Err(err) = std::fs::set_permissions(path, std::fs::Permissions::from_mode(0o600)) {
        warn!(socket = %path.display(), %err, "failed to restrict socket permissions");
    }
}

fn remove_socket_file(path: &Path) {
    match std::fs::remove_file(path) {
        Ok(()) => debug!(socket = %path.display(), "socket file removed"),
        Err(err) if err.kind() == ErrorKind::NotFound => {}
        Err(err) => warn!(socket = %path.display(), %err, "failed to remove socket file"),
    }
}
