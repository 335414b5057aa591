//! In-memory HTTP server for exercising the fetch pipeline without a network.

use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;
use bytes::Bytes;
use url::Url;

use crate::download::client::{HttpClient, HttpResponse};
use crate::error::TransportError;

type Handler = dyn Fn(&str, usize) -> Result<HttpResponse, TransportError> + Send + Sync;

/// Answers each GET through `handler(url, nth_request_for_that_url)` and records every request.
pub struct ScriptedServer {
    handler: Box<Handler>,
    hits: Mutex<HashMap<String, usize>>,
    requests: Mutex<Vec<String>>,
}

impl ScriptedServer {
    pub fn new<F>(handler: F) -> Self
    where
        F: Fn(&str, usize) -> Result<HttpResponse, TransportError> + Send + Sync + 'static,
    {
        Self {
            handler: Box::new(handler),
            hits: Mutex::new(HashMap::new()),
            requests: Mutex::new(Vec::new()),
        }
    }

    /// Serves `body` for every url accepted by `accept`, 404 for the rest.
    pub fn serving<F>(accept: F, body: &'static [u8]) -> Self
    where
        F: Fn(&str) -> bool + Send + Sync + 'static,
    {
        Self::new(move |url, _| if accept(url) { ok(body) } else { status(404) })
    }

    pub fn hits(&self, url: &str) -> usize {
        self.hits.lock().unwrap().get(url).copied().unwrap_or(0)
    }

    pub fn requests(&self) -> Vec<String> {
        self.requests.lock().unwrap().clone()
    }
}

#[async_trait]
impl HttpClient for ScriptedServer {
    async fn get(&self, url: &Url) -> Result<HttpResponse, TransportError> {
        let nth = {
            let mut hits = self.hits.lock().unwrap();
            let counter = hits.entry(url.to_string()).or_insert(0);
            *counter += 1;
            *counter - 1
        };
        self.requests.lock().unwrap().push(url.to_string());

        (self.handler)(url.as_str(), nth)
    }
}

pub fn ok(body: &[u8]) -> Result<HttpResponse, TransportError> {
    Ok(HttpResponse { status: 200, body: Bytes::copy_from_slice(body) })
}

pub fn status(code: u16) -> Result<HttpResponse, TransportError> {
    Ok(HttpResponse { status: code, body: Bytes::new() })
}
