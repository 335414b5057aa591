use async_trait::async_trait;
use bytes::Bytes;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue, ACCEPT, CONNECTION, REFERER};
use url::Url;

use crate::error::{DownloadError, TransportError};
use crate::options::Options;

pub const USER_AGENT: &str = concat!(
    "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/537.36 ",
    "(KHTML, like Gecko) Chrome/91.0.4472.124 Safari/537.36"
);

/// Status and body of a completed GET.
#[derive(Debug, Clone)]
pub struct HttpResponse {
    pub status: u16,
    pub body: Bytes,
}

/// The one HTTP capability the fetch pipeline needs.
///
/// [`DownloadClient`] is the production implementation; tests plug in a scripted server.
#[async_trait]
pub trait HttpClient: Send + Sync {
    async fn get(&self, url: &Url) -> Result<HttpResponse, TransportError>;
}

/// Keep-alive session shared by every fragment request of one run.
pub struct DownloadClient {
    client: reqwest::Client,
}

impl DownloadClient {
    pub fn new(options: &Options) -> Result<Self, DownloadError> {
        let mut headers = HeaderMap::new();
        headers.insert(ACCEPT, HeaderValue::from_static("*/*"));
        headers.insert(CONNECTION, HeaderValue::from_static("keep-alive"));

        for (name, value) in &options.headers {
            let name = HeaderName::from_bytes(name.as_bytes())
                .map_err(|_| DownloadError::InvalidHeader(name.clone()))?;
            let value = HeaderValue::from_str(value)
                .map_err(|_| DownloadError::InvalidHeader(value.clone()))?;
            headers.insert(name, value);
        }

        let client = reqwest::Client::builder()
            .user_agent(USER_AGENT)
            .default_headers(headers)
            .timeout(options.retry.timeout)
            .gzip(true)
            .brotli(true)
            .deflate(true)
            .build()
            .map_err(DownloadError::Client)?;

        Ok(Self { client })
    }
}

#[async_trait]
impl HttpClient for DownloadClient {
    async fn get(&self, url: &Url) -> Result<HttpResponse, TransportError> {
        let mut request = self.client.get(url.as_str());
        if let Ok(referer) = HeaderValue::from_str(&referer(url)) {
            request = request.header(REFERER, referer);
        }

        let response = request.send().await?;
        let status = response.status().as_u16();
        let body = response.bytes().await?;

        Ok(HttpResponse { status, body })
    }
}

/// Origin of `url` with a trailing slash, e.g. `https://cdn.example/`.
pub fn referer(url: &Url) -> String {
    format!("{}/", url.origin().ascii_serialization())
}

/// Parses a `Name: value` command line header.
pub fn parse_header(raw: &str) -> Result<(String, String), DownloadError> {
    match raw.split_once(':') {
        Some((name, value)) if !name.trim().is_empty() => {
            Ok((name.trim().to_string(), value.trim().to_string()))
        }
        _ => Err(DownloadError::InvalidHeader(raw.to_string())),
    }
}
