use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;

use reqwest::header::{HeaderMap, CONTENT_TYPE};
use sitegrab_core::DownloadStatus;

use crate::mirror::MirrorReport;

pub type JobId = u64;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JobProgress {
    pub job_id: JobId,
    pub downloaded: u64,
    /// Declared body length, `-1` when the server did not send one.
    pub total: i64,
}

#[derive(Debug, Clone)]
pub enum EngineEvent {
    Started {
        job_id: JobId,
        url: String,
        status: Arc<DownloadStatus>,
    },
    Progress(JobProgress),
    /// Bytes transferred during the last second.
    Rate { job_id: JobId, bytes_per_second: u64 },
    /// A mirror job stored one more resource.
    Saved {
        job_id: JobId,
        url: String,
        path: PathBuf,
    },
    JobCompleted {
        job_id: JobId,
        result: Result<JobOutcome, FetchError>,
    },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JobOutcome {
    Downloaded {
        url: String,
        path: PathBuf,
        bytes: u64,
    },
    Mirrored(MirrorReport),
}

/// A completed transfer: where the body went and what the server said.
#[derive(Debug, Clone)]
pub struct FetchResult {
    pub local_file: PathBuf,
    pub headers: HeaderMap,
    pub status_code: u16,
    pub final_url: String,
    pub bytes_written: u64,
}

impl FetchResult {
    pub fn content_type(&self) -> Option<&str> {
        self.headers
            .get(CONTENT_TYPE)
            .and_then(|value| value.to_str().ok())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{kind}: {message}")]
pub struct FetchError {
    pub kind: FailureKind,
    pub message: String,
}

impl FetchError {
    pub(crate) fn new(kind: FailureKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FailureKind {
    Configuration,
    InvalidUrl,
    StatusNotAllowed(u16),
    Timeout,
    RedirectLimitExceeded,
    Network,
    /// The sink factory could not open a destination.
    Sink,
    /// Reading the body or writing it to the sink failed mid-stream.
    Transfer,
    Cancelled,
}

impl fmt::Display for FailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FailureKind::Configuration => write!(f, "configuration error"),
            FailureKind::InvalidUrl => write!(f, "invalid url"),
            FailureKind::StatusNotAllowed(code) => write!(f, "http status {code} not allowed"),
            FailureKind::Timeout => write!(f, "timeout"),
            FailureKind::RedirectLimitExceeded => write!(f, "redirect limit exceeded"),
            FailureKind::Network => write!(f, "network error"),
            FailureKind::Sink => write!(f, "cannot open destination"),
            FailureKind::Transfer => write!(f, "transfer error"),
            FailureKind::Cancelled => write!(f, "cancelled"),
        }
    }
}
