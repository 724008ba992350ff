//! Worker-side HTTP client for the dispatch protocol.
//!
//! Wraps the four coordinator interactions: version gate, claim, streamed
//! input download and multipart report POST (heartbeat or result upload).

use crate::protocol::{JobDescriptor, ReportState};
use futures_util::StreamExt;
use reqwest::header::CONTENT_DISPOSITION;
use reqwest::multipart::{Form, Part};
use std::path::{Path, PathBuf};
use thiserror::Error;
use tokio::io::AsyncWriteExt;
use tokio_util::io::ReaderStream;
use uuid::Uuid;

/// Error type for coordinator interactions
#[derive(Debug, Error)]
pub enum ClientError {
    /// Request failed or returned a non-success status
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// Local IO error while spooling a transfer
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// The coordinator no longer knows the job (empty download body)
    #[error("Job is no longer available on the coordinator")]
    JobGone,

    /// The download response carried no Content-Length
    #[error("Download response carried no Content-Length")]
    MissingLength,

    /// The spooled file size does not match the announced length
    #[error("Downloaded {actual} bytes but Content-Length was {expected}")]
    SizeMismatch { expected: u64, actual: u64 },
}

/// HTTP client bound to one coordinator address.
#[derive(Debug, Clone)]
pub struct Client {
    base_url: String,
    http: reqwest::Client,
}

impl Client {
    /// Client for the coordinator at `ip:port`.
    pub fn new(ip: &str, port: u16) -> Self {
        Self {
            base_url: format!("http://{}:{}", ip, port),
            http: reqwest::Client::new(),
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path)
    }

    /// GET /version: the coordinator's version string.
    pub async fn fetch_version(&self) -> Result<String, ClientError> {
        let response = self.http.get(self.url("version")).send().await?;
        Ok(response.error_for_status()?.json().await?)
    }

    /// GET /jobs/ claims one job; `None` means the queue is drained.
    pub async fn claim_job(&self) -> Result<Option<JobDescriptor>, ClientError> {
        let response = self.http.get(self.url("jobs/")).send().await?;
        Ok(response.error_for_status()?.json().await?)
    }

    /// GET /jobs/{id} streams the source image into `dir`.
    ///
    /// The file name comes from the `Content-Disposition` header; after the
    /// download the on-disk size must equal the announced `Content-Length`.
    pub async fn fetch_input(&self, job_id: Uuid, dir: &Path) -> Result<PathBuf, ClientError> {
        let response = self
            .http
            .get(self.url(&format!("jobs/{}", job_id)))
            .send()
            .await?
            .error_for_status()?;

        let filename = response
            .headers()
            .get(CONTENT_DISPOSITION)
            .and_then(|v| v.to_str().ok())
            .and_then(parse_attachment_filename)
            .ok_or(ClientError::JobGone)?;
        let expected = response.content_length().ok_or(ClientError::MissingLength)?;

        let path = dir.join(&filename);
        let mut file = tokio::fs::File::create(&path).await?;
        let mut stream = response.bytes_stream();
        while let Some(chunk) = stream.next().await {
            file.write_all(&chunk?).await?;
        }
        file.flush().await?;

        let actual = tokio::fs::metadata(&path).await?.len();
        if actual != expected {
            return Err(ClientError::SizeMismatch { expected, actual });
        }
        Ok(path)
    }

    /// POST /jobs/{id} with `state=WORKING` and no files, i.e. a heartbeat.
    pub async fn report_working(&self, job_id: Uuid) -> Result<(), ClientError> {
        let form = Form::new().text("state", ReportState::Working.as_str());
        self.http
            .post(self.url(&format!("jobs/{}", job_id)))
            .multipart(form)
            .send()
            .await?
            .error_for_status()?;
        Ok(())
    }

    /// POST /jobs/{id} with `state=DONE` and one streamed part per output.
    ///
    /// HTTP success is final; there is no retry.
    pub async fn send_results(
        &self,
        job_id: Uuid,
        dir: &Path,
        files: &[String],
    ) -> Result<(), ClientError> {
        let mut form = Form::new().text("state", ReportState::Done.as_str());

        for name in files {
            let file = tokio::fs::File::open(dir.join(name)).await?;
            let len = file.metadata().await?.len();
            let body = reqwest::Body::wrap_stream(ReaderStream::new(file));
            let part = Part::stream_with_length(body, len).file_name(name.clone());
            form = form.part(name.clone(), part);
        }

        self.http
            .post(self.url(&format!("jobs/{}", job_id)))
            .multipart(form)
            .send()
            .await?
            .error_for_status()?;
        Ok(())
    }
}

/// Extract the attachment file name from a `Content-Disposition` header.
///
/// Quotes are stripped and only the leaf of the name is kept, so a header
/// cannot steer the download outside the scratch directory.
pub fn parse_attachment_filename(header: &str) -> Option<String> {
    let idx = header.find("filename=")?;
    let raw = header[idx + "filename=".len()..].trim().trim_matches('"');
    let leaf = raw.rsplit(['/', '\\']).next()?;
    if leaf.is_empty() {
        None
    } else {
        Some(leaf.to_string())
    }
}
