//! Errors that leave a module boundary. Per-request and per-strategy faults are
//! absorbed into [`FetchOutcome`](crate::download::fetcher::FetchOutcome) and
//! [`ReassemblyAttempt`](crate::merge::ReassemblyAttempt) values instead.

use std::io;
use std::path::PathBuf;

use thiserror::Error;

use crate::download::fetcher::FetchOutcome;

#[derive(Debug, Error)]
pub enum DownloadError {
    #[error("invalid URL {url}: {source}")]
    InvalidUrl {
        url: String,
        #[source]
        source: url::ParseError,
    },

    #[error("could not fetch the first fragment {url} ({outcome})")]
    FirstFragmentUnavailable { url: String, outcome: FetchOutcome },

    #[error("output file already exists: {}", .0.display())]
    OutputExists(PathBuf),

    #[error("could not combine fragments into {}", .0.display())]
    Reassembly(PathBuf),

    #[error("failed to build HTTP client: {0}")]
    Client(#[source] reqwest::Error),

    #[error("invalid header {0:?}, expected \"Name: value\"")]
    InvalidHeader(String),

    #[error("failed to read job file {}: {source}", path.display())]
    Job {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("file I/O error: {0}")]
    Io(#[from] io::Error),
}

/// A failed HTTP exchange that never produced a status code.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum TransportError {
    #[error("request timed out")]
    Timeout,

    #[error("connection failed: {0}")]
    Connect(String),

    #[error("request failed: {0}")]
    Request(String),

    #[error("failed to read response body: {0}")]
    Body(String),
}

impl From<reqwest::Error> for TransportError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            TransportError::Timeout
        } else if err.is_connect() {
            TransportError::Connect(err.to_string())
        } else if err.is_body() || err.is_decode() {
            TransportError::Body(err.to_string())
        } else {
            TransportError::Request(err.to_string())
        }
    }
}

/// Why one reassembly strategy gave up.
#[derive(Debug, Error)]
pub enum StrategyError {
    #[error("{tool} could not be started: {source}")]
    ToolUnavailable {
        tool: String,
        #[source]
        source: io::Error,
    },

    #[error("{tool} exited with {code:?}")]
    ExitCode { tool: String, code: Option<i32> },

    #[error("header does not carry the target container signature")]
    SignatureMismatch,

    #[error("file I/O error: {0}")]
    Io(#[from] io::Error),
}
