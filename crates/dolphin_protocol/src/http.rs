//! HTTP exchange types and wire constants.
//!
//! The core never touches sockets. Both peers exchange [`HttpResponse`]
//! values through the `HttpClient` seam on the client and the
//! `handle_request` entry point on the server.

/// Header carrying the session (client) id in both directions.
pub const CLIENT_ID_HEADER: &str = "dolphin_platform_intern_dolphinClientId";

/// Content type of request and response bodies.
pub const JSON_MIME_TYPE: &str = "application/json;charset=utf-8";

/// Default path of the single remoting endpoint.
pub const DEFAULT_ENDPOINT: &str = "/dolphin";

/// Status codes produced by the server facade.
pub mod status {
    /// Request served.
    pub const OK: u16 = 200;
    /// Malformed request body.
    pub const BAD_REQUEST: u16 = 400;
    /// The client id does not name a live session.
    pub const REQUEST_TIMEOUT: u16 = 408;
    /// Too many live sessions.
    pub const SERVICE_UNAVAILABLE: u16 = 503;
    /// Fatal error while handling the request.
    pub const INTERNAL_SERVER_ERROR: u16 = 500;
}

/// A response to one remoting POST.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpResponse {
    /// HTTP status code.
    pub status: u16,
    /// Session id echoed in [`CLIENT_ID_HEADER`].
    pub client_id: Option<String>,
    /// Encoded command array, or an error message for non-2xx statuses.
    pub body: String,
}

impl HttpResponse {
    /// Creates a successful response.
    pub fn ok(client_id: impl Into<String>, body: impl Into<String>) -> Self {
        Self {
            status: status::OK,
            client_id: Some(client_id.into()),
            body: body.into(),
        }
    }

    /// Creates an error response without a session id.
    pub fn error(status: u16, message: impl Into<String>) -> Self {
        Self {
            status,
            client_id: None,
            body: message.into(),
        }
    }

    /// Returns true for 2xx statuses.
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn response_constructors() {
        let ok = HttpResponse::ok("abc", "[]");
        assert!(ok.is_success());
        assert_eq!(ok.client_id.as_deref(), Some("abc"));

        let err = HttpResponse::error(status::REQUEST_TIMEOUT, "session expired");
        assert!(!err.is_success());
        assert_eq!(err.client_id, None);
    }
}
