//! Blocking HTTP client for [`HttpTransport`](dolphin_client::HttpTransport).

use crate::error::HttpResult;
use dolphin_client::HttpClient;
use dolphin_protocol::{HttpResponse, CLIENT_ID_HEADER, JSON_MIME_TYPE};
use reqwest::blocking::Client;
use reqwest::header::CONTENT_TYPE;
use std::time::Duration;
use tracing::trace;

/// Default request timeout; must exceed the server's max poll time.
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(60);

/// Posts command batches with `reqwest`'s blocking client.
///
/// Must not be called from inside a Tokio runtime.
#[derive(Debug, Clone)]
pub struct ReqwestClient {
    client: Client,
}

impl ReqwestClient {
    /// Creates a client with [`DEFAULT_REQUEST_TIMEOUT`].
    pub fn new() -> HttpResult<Self> {
        Self::with_timeout(DEFAULT_REQUEST_TIMEOUT)
    }

    /// Creates a client with a request timeout.
    pub fn with_timeout(timeout: Duration) -> HttpResult<Self> {
        let client = Client::builder().timeout(timeout).build()?;
        Ok(Self { client })
    }
}

impl HttpClient for ReqwestClient {
    fn post(&self, url: &str, client_id: Option<&str>, body: String) -> Result<HttpResponse, String> {
        let mut request = self
            .client
            .post(url)
            .header(CONTENT_TYPE, JSON_MIME_TYPE)
            .body(body);
        if let Some(id) = client_id {
            request = request.header(CLIENT_ID_HEADER, id);
        }

        let response = request.send().map_err(|e| e.to_string())?;
        let status = response.status().as_u16();
        let client_id = response
            .headers()
            .get(CLIENT_ID_HEADER)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);
        let body = response.text().map_err(|e| e.to_string())?;
        trace!(url, status, bytes = body.len(), "response received");
        Ok(HttpResponse {
            status,
            client_id,
            body,
        })
    }
}
