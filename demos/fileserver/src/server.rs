//! File server implementation.

use crate::transfers::Transfers;
use axum::{
    Json, Router,
    body::Bytes,
    extract::{
        DefaultBodyLimit, Multipart, Query, State,
        multipart::MultipartError,
        ws::{Message, WebSocket, WebSocketUpgrade, rejection::WebSocketUpgradeRejection},
    },
    http::{
        StatusCode,
        header::{CONTENT_DISPOSITION, CONTENT_TYPE},
    },
    response::{IntoResponse, Response},
    routing::{get, post},
};
use serde::{Deserialize, Serialize};
use std::io;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant, UNIX_EPOCH};
use tokio::io::AsyncWriteExt;
use tokio::net::TcpListener;
use tokio::sync::{Mutex, watch};
use webssh_core::{
    ApiResponse, CheckData, DirEntry, TransferId, TransferProgress, TransferState,
    UploadAccepted, UploadMetadata, endpoint, field, final_segment,
};

/// How the server lays out its files and paces uploads.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Every target is a directory directly below this root. A target whose
    /// directory does not exist is reported as unreachable.
    pub root: PathBuf,
    /// Path all endpoints are mounted under, e.g. `/webssh`.
    pub prefix: String,
    /// Largest accepted upload request body, in bytes.
    pub max_upload: usize,
    /// Bytes written per progress step.
    pub chunk_size: usize,
    /// Pause before each step, to make progress observable.
    pub chunk_delay: Duration,
    /// How long finished transfers stay queryable.
    pub retention: Duration,
}

impl ServerConfig {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            prefix: String::new(),
            max_upload: 64 * 1024 * 1024,
            chunk_size: 256 * 1024,
            chunk_delay: Duration::ZERO,
            retention: Duration::from_secs(600),
        }
    }
}

struct ServerState {
    config: ServerConfig,
    transfers: Mutex<Transfers>,
}

impl ServerState {
    /// Resolve a target to its directory, failing like an SSH dial would.
    async fn connect(&self, ssh_info: &str) -> Result<PathBuf, String> {
        if ssh_info.is_empty() || ssh_info == "." || ssh_info == ".." || ssh_info.contains(['/', '\\'])
        {
            return Err("invalid ssh info".to_string());
        }
        let host = self.config.root.join(ssh_info);
        match tokio::fs::metadata(&host).await {
            Ok(meta) if meta.is_dir() => Ok(host),
            _ => Err("ssh: handshake failed: unknown host".to_string()),
        }
    }
}

type AppState = Arc<ServerState>;

/// Build the router with every endpoint mounted under the configured prefix.
pub fn router(config: ServerConfig) -> Router {
    let prefix = normalize_prefix(&config.prefix);
    let max_upload = config.max_upload;
    let state = Arc::new(ServerState {
        transfers: Mutex::new(Transfers::new(config.retention)),
        config,
    });

    let routes = Router::new()
        .route(endpoint::LIST, get(list))
        .route(
            endpoint::UPLOAD,
            post(upload).layer(DefaultBodyLimit::max(max_upload)),
        )
        .route(endpoint::DOWNLOAD, get(download))
        .route(endpoint::PROGRESS, get(progress))
        .route(endpoint::CHECK, get(check))
        .with_state(state);

    if prefix.is_empty() {
        routes
    } else {
        Router::new().nest(&prefix, routes)
    }
}

/// Serve on an already bound listener.
pub async fn serve(listener: TcpListener, config: ServerConfig) -> anyhow::Result<()> {
    let addr = listener.local_addr()?;
    tracing::info!(
        "Serving {} on http://{}{}",
        config.root.display(),
        addr,
        normalize_prefix(&config.prefix)
    );
    axum::serve(listener, router(config)).await?;
    Ok(())
}

pub async fn run(addr: SocketAddr, config: ServerConfig) -> anyhow::Result<()> {
    let listener = TcpListener::bind(addr).await?;
    serve(listener, config).await
}

fn normalize_prefix(prefix: &str) -> String {
    let trimmed = prefix.trim_matches('/');
    if trimmed.is_empty() {
        String::new()
    } else {
        format!("/{trimmed}")
    }
}

/// Map a remote absolute path below a target directory.
fn resolve(host: &Path, remote: &str) -> Result<PathBuf, String> {
    let mut path = host.to_path_buf();
    for part in remote.split('/') {
        match part {
            "" | "." => {}
            ".." => return Err(format!("{remote}: path escapes the filesystem root")),
            part => path.push(part),
        }
    }
    Ok(path)
}

fn io_message(remote: &str, e: io::Error) -> String {
    match e.kind() {
        io::ErrorKind::NotFound => format!("open {remote}: no such file or directory"),
        _ => format!("{remote}: {e}"),
    }
}

fn reply<T: Serialize>(started: Instant, result: Result<T, String>) -> Json<ApiResponse<T>> {
    let envelope = match result {
        Ok(data) => ApiResponse::ok(data),
        Err(msg) => ApiResponse::error(msg),
    };
    Json(envelope.with_duration(format!("{:?}", started.elapsed())))
}

#[derive(Deserialize)]
struct FileQuery {
    #[serde(default)]
    path: String,
    #[serde(rename = "sshInfo", default)]
    ssh_info: String,
}

#[derive(Deserialize)]
struct ProgressQuery {
    #[serde(default)]
    id: String,
}

async fn list(
    State(state): State<AppState>,
    Query(query): Query<FileQuery>,
) -> Json<ApiResponse<Vec<DirEntry>>> {
    let started = Instant::now();
    reply(started, read_listing(&state, &query).await)
}

async fn read_listing(state: &ServerState, query: &FileQuery) -> Result<Vec<DirEntry>, String> {
    let host = state.connect(&query.ssh_info).await?;
    let dir = resolve(&host, &query.path)?;
    let mut reader = tokio::fs::read_dir(&dir)
        .await
        .map_err(|e| io_message(&query.path, e))?;

    let mut entries = Vec::new();
    while let Some(entry) = reader
        .next_entry()
        .await
        .map_err(|e| io_message(&query.path, e))?
    {
        let meta = entry
            .metadata()
            .await
            .map_err(|e| io_message(&query.path, e))?;
        let modify_time = meta
            .modified()
            .ok()
            .and_then(|t| t.duration_since(UNIX_EPOCH).ok())
            .map(|d| d.as_secs().to_string())
            .unwrap_or_default();
        entries.push(DirEntry {
            name: entry.file_name().to_string_lossy().into_owned(),
            size: meta.len(),
            modify_time,
            is_dir: meta.is_dir(),
        });
    }
    // Directories first, then by name.
    entries.sort_by(|a, b| b.is_dir.cmp(&a.is_dir).then_with(|| a.name.cmp(&b.name)));
    Ok(entries)
}

#[derive(Default)]
struct UploadForm {
    ssh_info: String,
    remote_dir: String,
    file: Option<(String, Bytes)>,
}

async fn read_upload_form(multipart: &mut Multipart) -> Result<UploadForm, MultipartError> {
    let mut form = UploadForm::default();
    while let Some(part) = multipart.next_field().await? {
        let name = part.name().map(str::to_string);
        match name.as_deref() {
            Some(field::SSH_INFO) => form.ssh_info = part.text().await?,
            Some(field::PATH) => form.remote_dir = part.text().await?,
            Some(field::FILE) => {
                let name = part.file_name().unwrap_or_default().to_string();
                form.file = Some((name, part.bytes().await?));
            }
            _ => {}
        }
    }
    Ok(form)
}

async fn upload(State(state): State<AppState>, mut multipart: Multipart) -> Response {
    let started = Instant::now();
    let form = match read_upload_form(&mut multipart).await {
        Ok(form) => form,
        Err(e) => {
            tracing::warn!("Rejected upload: {}", e.body_text());
            let body = reply::<UploadAccepted>(started, Err(e.body_text()));
            return (e.status(), body).into_response();
        }
    };
    reply(started, accept_upload(&state, form).await).into_response()
}

async fn accept_upload(state: &AppState, form: UploadForm) -> Result<UploadAccepted, String> {
    let Some((name, data)) = form.file else {
        return Err("missing file part".to_string());
    };
    UploadMetadata::new(form.remote_dir.clone(), name.clone())
        .validate()
        .map_err(|e| e.to_string())?;
    let host = state.connect(&form.ssh_info).await?;
    let dir = resolve(&host, &form.remote_dir)?;

    let (id, tx) = state.transfers.lock().await.start(data.len() as u64);
    tracing::info!(
        "Accepted upload {} of {} ({} bytes) into {}",
        id,
        name,
        data.len(),
        form.remote_dir
    );
    tokio::spawn(write_upload(state.clone(), id.clone(), tx, dir.join(name), data));
    Ok(UploadAccepted { transfer_id: id })
}

/// Write an accepted upload to disk, publishing progress after each chunk.
async fn write_upload(
    state: AppState,
    id: TransferId,
    tx: watch::Sender<TransferProgress>,
    dest: PathBuf,
    data: Bytes,
) {
    let total = data.len() as u64;
    match write_chunks(&state.config, &tx, &dest, &data).await {
        Ok(()) => {
            tx.send_modify(|p| {
                p.bytes_transferred = total;
                p.state = TransferState::Completed;
            });
            tracing::info!("Transfer {} completed ({} bytes)", id, total);
        }
        Err(e) => {
            tx.send_modify(|p| {
                p.state = TransferState::Failed;
                p.message = Some(e.to_string());
            });
            tracing::warn!("Transfer {} failed: {}", id, e);
        }
    }
    state.transfers.lock().await.finish(&id);
}

async fn write_chunks(
    config: &ServerConfig,
    tx: &watch::Sender<TransferProgress>,
    dest: &Path,
    data: &[u8],
) -> io::Result<()> {
    if let Some(parent) = dest.parent() {
        tokio::fs::create_dir_all(parent).await?;
    }
    let mut file = tokio::fs::File::create(dest).await?;
    let mut written = 0u64;
    for chunk in data.chunks(config.chunk_size.max(1)) {
        if !config.chunk_delay.is_zero() {
            tokio::time::sleep(config.chunk_delay).await;
        }
        file.write_all(chunk).await?;
        written += chunk.len() as u64;
        tx.send_modify(|p| {
            p.bytes_transferred = written;
            p.state = TransferState::InProgress;
        });
    }
    file.flush().await
}

async fn download(State(state): State<AppState>, Query(query): Query<FileQuery>) -> Response {
    let started = Instant::now();
    match read_download(&state, &query).await {
        Ok((name, bytes)) => {
            let disposition = format!("attachment; filename=\"{}\"", name.replace('"', "_"));
            (
                [
                    (CONTENT_TYPE, "application/octet-stream".to_string()),
                    (CONTENT_DISPOSITION, disposition),
                ],
                bytes,
            )
                .into_response()
        }
        // Failures keep status 200 and carry the reason in the envelope.
        Err(msg) => {
            tracing::debug!("Download of {} failed: {}", query.path, msg);
            reply::<()>(started, Err(msg)).into_response()
        }
    }
}

async fn read_download(state: &ServerState, query: &FileQuery) -> Result<(String, Vec<u8>), String> {
    let name = final_segment(&query.path).map_err(|e| e.to_string())?.to_string();
    let host = state.connect(&query.ssh_info).await?;
    let path = resolve(&host, &query.path)?;
    let meta = tokio::fs::metadata(&path)
        .await
        .map_err(|e| io_message(&query.path, e))?;
    if meta.is_dir() {
        return Err(format!("{}: is a directory", query.path));
    }
    let bytes = tokio::fs::read(&path)
        .await
        .map_err(|e| io_message(&query.path, e))?;
    Ok((name, bytes))
}

async fn progress(
    State(state): State<AppState>,
    Query(query): Query<ProgressQuery>,
    ws: Result<WebSocketUpgrade, WebSocketUpgradeRejection>,
) -> Response {
    let started = Instant::now();
    let id = TransferId::new(query.id);
    let unknown = || format!("transfer {id} not found");

    match ws {
        Ok(ws) => {
            let receiver = state.transfers.lock().await.subscribe(&id);
            let Some(rx) = receiver else {
                let body = reply::<TransferProgress>(started, Err(unknown()));
                return (StatusCode::NOT_FOUND, body).into_response();
            };
            ws.on_upgrade(move |socket| push_progress(socket, id, rx))
        }
        Err(_) => {
            let snapshot = state.transfers.lock().await.snapshot(&id);
            match snapshot {
                Some(progress) => reply(started, Ok(progress)).into_response(),
                None => {
                    let body = reply::<TransferProgress>(started, Err(unknown()));
                    (StatusCode::NOT_FOUND, body).into_response()
                }
            }
        }
    }
}

/// Send the current snapshot, then every change, closing after a terminal one.
async fn push_progress(
    mut socket: WebSocket,
    id: TransferId,
    mut rx: watch::Receiver<TransferProgress>,
) {
    tracing::debug!("Progress subscriber attached to {}", id);
    loop {
        let snapshot = rx.borrow_and_update().clone();
        let frame = match serde_json::to_string(&snapshot) {
            Ok(frame) => frame,
            Err(e) => {
                tracing::warn!("Failed to encode progress for {}: {}", id, e);
                return;
            }
        };
        if socket.send(Message::Text(frame.into())).await.is_err() {
            tracing::debug!("Progress subscriber for {} went away", id);
            return;
        }
        if snapshot.is_terminal() {
            break;
        }
        if !wait_for_change(&mut socket, &mut rx).await {
            tracing::debug!("Progress subscriber for {} detached", id);
            return;
        }
    }
    let _ = socket.send(Message::Close(None)).await;
}

/// Returns false when the subscriber leaves or the transfer is dropped.
async fn wait_for_change(
    socket: &mut WebSocket,
    rx: &mut watch::Receiver<TransferProgress>,
) -> bool {
    loop {
        tokio::select! {
            changed = rx.changed() => return changed.is_ok(),
            incoming = socket.recv() => match incoming {
                Some(Ok(Message::Close(_))) | Some(Err(_)) | None => return false,
                Some(Ok(_)) => {}
            },
        }
    }
}

async fn check(
    State(state): State<AppState>,
    Query(query): Query<FileQuery>,
) -> Json<ApiResponse<CheckData>> {
    let started = Instant::now();
    let result = state
        .connect(&query.ssh_info)
        .await
        .map(|_| CheckData::default());
    reply(started, result)
}
