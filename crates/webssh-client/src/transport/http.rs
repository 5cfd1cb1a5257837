//! HTTP and WebSocket transport.

use super::{ProgressFrames, Transport, UploadPayload};
use crate::{ClientConfig, ConfigError, Operation, TransferError};
use bytes::Bytes;
use futures_util::StreamExt;
use reqwest::header::CONTENT_TYPE;
use reqwest::multipart::{Form, Part};
use serde::de::DeserializeOwned;
use std::sync::Arc;
use tokio_tungstenite::tungstenite::{self, Message};
use webssh_core::{
    ApiResponse, CheckData, DirEntry, Target, TransferId, TransferProgress, UploadAccepted,
    UploadMetadata, endpoint, field,
};

/// Talks to a webssh server over HTTP, with a WebSocket per progress
/// subscription.
///
/// Cloning is cheap; clones share the connection pool.
#[derive(Debug, Clone)]
pub struct HttpTransport {
    http: reqwest::Client,
    config: Arc<ClientConfig>,
}

impl HttpTransport {
    pub fn new(config: ClientConfig) -> Result<Self, ConfigError> {
        let http = reqwest::Client::builder()
            .build()
            .map_err(|e| ConfigError::Client(e.to_string()))?;
        Ok(Self::with_client(config, http))
    }

    /// Use a preconfigured `reqwest` client (proxies, custom roots, ...).
    pub fn with_client(config: ClientConfig, http: reqwest::Client) -> Self {
        Self {
            http,
            config: Arc::new(config),
        }
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    /// Send a request and fail on transport errors or non-2xx statuses.
    async fn send(
        &self,
        operation: Operation,
        subject: &str,
        request: reqwest::RequestBuilder,
    ) -> Result<reqwest::Response, TransferError> {
        let response = request
            .send()
            .await
            .map_err(|e| TransferError::transport(operation, subject, e))?;

        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        let body = response.text().await.unwrap_or_default();
        let detail = serde_json::from_str::<ApiResponse<serde_json::Value>>(&body)
            .map(|envelope| envelope.msg)
            .unwrap_or(body);
        Err(TransferError::from_status(
            operation,
            subject,
            status.as_u16(),
            detail,
        ))
    }

    /// Decode a JSON envelope, returning its payload.
    async fn envelope<T: DeserializeOwned>(
        operation: Operation,
        subject: &str,
        response: reqwest::Response,
    ) -> Result<Result<Option<T>, String>, TransferError> {
        let envelope: ApiResponse<T> = response.json().await.map_err(|e| {
            TransferError::transport(operation, subject, format!("invalid response: {e}"))
        })?;
        Ok(envelope.into_result())
    }
}

fn missing_data(operation: Operation, subject: &str) -> TransferError {
    TransferError::transport(operation, subject, "response carried no data")
}

fn transfer_subject(id: &TransferId) -> String {
    format!("transfer {id}")
}

impl Transport for HttpTransport {
    async fn submit_upload(
        &self,
        target: &Target,
        metadata: &UploadMetadata,
        payload: UploadPayload,
    ) -> Result<TransferId, TransferError> {
        let operation = Operation::Upload;
        let subject = target.to_string();
        let len = payload.len();

        let part = Part::stream_with_length(payload.into_reqwest_body(), len)
            .file_name(metadata.file_name.clone());
        let form = Form::new()
            .text(field::SSH_INFO, target.as_raw().to_string())
            .text(field::PATH, metadata.remote_dir.clone())
            .part(field::FILE, part);

        let url = self.config.endpoint_url(endpoint::UPLOAD);
        tracing::debug!("POST {} ({} bytes)", url, len);
        let response = self
            .send(operation, &subject, self.http.post(url).multipart(form))
            .await?;

        match Self::envelope::<UploadAccepted>(operation, &subject, response).await? {
            Ok(Some(accepted)) => Ok(accepted.transfer_id),
            Ok(None) => Err(missing_data(operation, &subject)),
            Err(reason) => Err(TransferError::Rejected {
                operation,
                subject,
                reason,
            }),
        }
    }

    async fn download(&self, target: &Target, path: &str) -> Result<Bytes, TransferError> {
        let operation = Operation::Download;
        let subject = target.to_string();
        let url = self.config.endpoint_url(endpoint::DOWNLOAD);
        tracing::debug!("GET {} path={}", url, path);

        let request = self
            .http
            .get(url)
            .query(&[(field::PATH, path), (field::SSH_INFO, target.as_raw())]);
        let response = self.send(operation, &subject, request).await?;

        let is_json = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .is_some_and(|v| v.starts_with("application/json"));

        let bytes = response
            .bytes()
            .await
            .map_err(|e| TransferError::transport(operation, &subject, e))?;

        // Failed downloads come back as a JSON envelope with status 200. A
        // genuine JSON file without the envelope shape passes through.
        if is_json {
            if let Ok(envelope) = serde_json::from_slice::<ApiResponse<serde_json::Value>>(&bytes) {
                if !envelope.is_success() {
                    return Err(TransferError::from_remote_message(
                        operation,
                        subject,
                        envelope.msg,
                    ));
                }
            }
        }

        Ok(bytes)
    }

    async fn query_progress(&self, id: &TransferId) -> Result<TransferProgress, TransferError> {
        let operation = Operation::PollProgress;
        let subject = transfer_subject(id);
        let url = self.config.endpoint_url(endpoint::PROGRESS);

        let request = self.http.get(url).query(&[(field::ID, id.as_str())]);
        let response = self.send(operation, &subject, request).await?;

        match Self::envelope::<TransferProgress>(operation, &subject, response).await? {
            Ok(Some(progress)) => Ok(progress),
            Ok(None) => Err(missing_data(operation, &subject)),
            Err(message) => Err(TransferError::from_remote_message(
                operation, subject, message,
            )),
        }
    }

    async fn open_progress(&self, id: &TransferId) -> Result<ProgressFrames, TransferError> {
        let operation = Operation::Subscribe;
        let subject = transfer_subject(id);
        let url = self.config.progress_ws_url(id);
        tracing::debug!("Opening progress channel {}", url);

        let (ws, _) = tokio_tungstenite::connect_async(url.as_str())
            .await
            .map_err(|e| match e {
                tungstenite::Error::Http(response) => {
                    let body = response
                        .body()
                        .as_deref()
                        .map(String::from_utf8_lossy)
                        .unwrap_or_default()
                        .into_owned();
                    TransferError::from_status(
                        operation,
                        subject.clone(),
                        response.status().as_u16(),
                        body,
                    )
                }
                other => TransferError::transport(operation, subject.clone(), other),
            })?;

        let frames = ws.filter_map(move |msg| {
            let subject = subject.clone();
            async move {
                let decoded: Result<TransferProgress, _> = match msg {
                    Ok(Message::Text(text)) => serde_json::from_str(text.as_str()),
                    Ok(Message::Binary(data)) => serde_json::from_slice(&data),
                    Ok(_) => return None,
                    Err(e) => return Some(Err(TransferError::transport(operation, subject, e))),
                };
                match decoded {
                    Ok(progress) => Some(Ok(progress)),
                    Err(e) => {
                        tracing::warn!("Discarding malformed progress frame for {}: {}", subject, e);
                        None
                    }
                }
            }
        });

        Ok(frames.boxed())
    }

    async fn list_directory(
        &self,
        target: &Target,
        path: &str,
    ) -> Result<Vec<DirEntry>, TransferError> {
        let operation = Operation::ListDirectory;
        let subject = target.to_string();
        let url = self.config.endpoint_url(endpoint::LIST);

        let request = self
            .http
            .get(url)
            .query(&[(field::PATH, path), (field::SSH_INFO, target.as_raw())]);
        let response = self.send(operation, &subject, request).await?;

        match Self::envelope::<Vec<DirEntry>>(operation, &subject, response).await? {
            Ok(entries) => Ok(entries.unwrap_or_default()),
            Err(message) => Err(TransferError::from_remote_message(
                operation, subject, message,
            )),
        }
    }

    async fn check_reachable(&self, target: &Target) -> Result<bool, TransferError> {
        let operation = Operation::CheckReachable;
        let subject = target.to_string();
        let url = self.config.endpoint_url(endpoint::CHECK);

        let request = self
            .http
            .get(url)
            .query(&[(field::SSH_INFO, target.as_raw())]);
        let response = self.send(operation, &subject, request).await?;

        match Self::envelope::<CheckData>(operation, &subject, response).await? {
            Ok(data) => {
                tracing::debug!(
                    "{} reachable (save_pass={})",
                    subject,
                    data.unwrap_or_default().save_pass
                );
                Ok(true)
            }
            Err(message) => {
                tracing::debug!("{} unreachable: {}", subject, message);
                Ok(false)
            }
        }
    }
}
