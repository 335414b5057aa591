use std::fmt;
use std::path::{Path, PathBuf};

use url::Url;

use crate::download::client::HttpClient;
use crate::error::TransportError;
use crate::options::RetryPolicy;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FragmentRequest {
    pub url: Url,
    pub destination: PathBuf,
}

impl FragmentRequest {
    pub fn new(url: Url, destination: impl Into<PathBuf>) -> Self {
        Self { url, destination: destination.into() }
    }
}

/// What went wrong with one request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FetchFault {
    Status(u16),
    Transport(TransportError),
    Write(String),
}

impl fmt::Display for FetchFault {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            FetchFault::Status(code) => write!(f, "status {}", code),
            FetchFault::Transport(err) => write!(f, "{}", err),
            FetchFault::Write(err) => write!(f, "write failed: {}", err),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FetchOutcome {
    /// body persisted, carries the number of bytes written
    Success(u64),
    /// 403/404: the sequence has no fragment here
    NotFound(u16),
    /// transient fault on attempt `attempt` (0 based), another try follows
    Retryable { error: FetchFault, attempt: usize },
    GivenUp { attempts: usize, last: FetchFault },
}

impl FetchOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, FetchOutcome::Success(_))
    }
}

impl fmt::Display for FetchOutcome {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            FetchOutcome::Success(bytes) => write!(f, "{} bytes", bytes),
            FetchOutcome::NotFound(code) => write!(f, "not available, status {}", code),
            FetchOutcome::Retryable { error, attempt } => {
                write!(f, "attempt {} failed: {}", attempt + 1, error)
            }
            FetchOutcome::GivenUp { attempts, last } => {
                write!(f, "gave up after {} attempts: {}", attempts, last)
            }
        }
    }
}

/// Bounded-retry GET of single fragments over one shared client.
pub struct Fetcher<C: HttpClient> {
    client: C,
    policy: RetryPolicy,
}

impl<C: HttpClient> Fetcher<C> {
    pub fn new(client: C, policy: RetryPolicy) -> Self {
        Self { client, policy }
    }

    #[cfg(test)]
    pub fn client(&self) -> &C {
        &self.client
    }

    /// Fetches `request.url` into `request.destination`.
    ///
    /// Never returns [`FetchOutcome::Retryable`]; when the outcome is not a success no file
    /// is left at the destination.
    pub async fn fetch(&self, request: &FragmentRequest) -> FetchOutcome {
        let mut attempt = 0;
        loop {
            match self.attempt(request, attempt).await {
                FetchOutcome::Retryable { error, attempt: failed } => {
                    if failed >= self.policy.max_retries {
                        tracing::warn!(
                            "Giving up on {} after {} attempts: {}",
                            request.url,
                            failed + 1,
                            error
                        );
                        return FetchOutcome::GivenUp { attempts: failed + 1, last: error };
                    }

                    tracing::warn!("Error fetching {} ({}), retrying", request.url, error);
                    tokio::time::sleep(self.policy.backoff(failed)).await;
                    attempt = failed + 1;
                }
                outcome => return outcome,
            }
        }
    }

    async fn attempt(&self, request: &FragmentRequest, attempt: usize) -> FetchOutcome {
        let response = match self.client.get(&request.url).await {
            Ok(response) => response,
            Err(err) => {
                return FetchOutcome::Retryable { error: FetchFault::Transport(err), attempt };
            }
        };

        match response.status {
            200..=299 => {}
            403 | 404 => {
                tracing::info!(
                    "Fragment not available (status {}): {}",
                    response.status,
                    request.url
                );
                return FetchOutcome::NotFound(response.status);
            }
            status => {
                return FetchOutcome::Retryable { error: FetchFault::Status(status), attempt };
            }
        }

        match tokio::fs::write(&request.destination, &response.body).await {
            Ok(_) => FetchOutcome::Success(response.body.len() as u64),
            Err(err) => {
                tracing::error!("Error writing {}: {}", request.destination.display(), err);
                remove_partial(&request.destination).await;
                FetchOutcome::GivenUp {
                    attempts: attempt + 1,
                    last: FetchFault::Write(err.to_string()),
                }
            }
        }
    }
}

async fn remove_partial(path: &Path) {
    if tokio::fs::try_exists(path).await.unwrap_or(false) {
        if let Err(err) = tokio::fs::remove_file(path).await {
            tracing::warn!("Could not remove partial file {}: {}", path.display(), err);
        }
    }
}
