//! Axum endpoint in front of a [`DolphinServer`].

use crate::error::HttpResult;
use axum::body::Bytes;
use axum::extract::State;
use axum::http::header::CONTENT_TYPE;
use axum::http::{HeaderMap, HeaderName, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::post;
use axum::Router;
use dolphin_protocol::{CLIENT_ID_HEADER, JSON_MIME_TYPE};
use dolphin_server::DolphinServer;
use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing::{error, info, warn};

/// Builds a router serving the remoting endpoint at the configured path.
pub fn router(server: Arc<DolphinServer>) -> Router {
    let path = server.config().endpoint_path.clone();
    Router::new()
        .route(&path, post(handle_post))
        .with_state(server)
}

/// Binds `addr` and serves until `shutdown` resolves.
pub async fn serve<F>(server: Arc<DolphinServer>, addr: SocketAddr, shutdown: F) -> HttpResult<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    let listener = TcpListener::bind(addr).await?;
    serve_listener(server, listener, shutdown).await
}

/// Serves on an already bound listener until `shutdown` resolves.
pub async fn serve_listener<F>(
    server: Arc<DolphinServer>,
    listener: TcpListener,
    shutdown: F,
) -> HttpResult<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    let local_addr = listener.local_addr()?;
    info!(
        addr = %local_addr,
        endpoint = %server.config().endpoint_path,
        "dolphin endpoint listening"
    );
    axum::serve(listener, router(server))
        .with_graceful_shutdown(shutdown)
        .await?;
    info!("dolphin endpoint stopped");
    Ok(())
}

async fn handle_post(
    State(server): State<Arc<DolphinServer>>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    let client_id = headers
        .get(CLIENT_ID_HEADER)
        .and_then(|value| value.to_str().ok())
        .map(str::to_string);
    let body = match String::from_utf8(body.to_vec()) {
        Ok(body) => body,
        Err(err) => {
            warn!(error = %err, "request body is not UTF-8");
            return (StatusCode::BAD_REQUEST, err.to_string()).into_response();
        }
    };

    // Long polls block the calling thread.
    let handled =
        tokio::task::spawn_blocking(move || server.handle_request(client_id.as_deref(), &body)).await;
    let response = match handled {
        Ok(response) => response,
        Err(err) => {
            error!(error = %err, "request handler panicked");
            return StatusCode::INTERNAL_SERVER_ERROR.into_response();
        }
    };

    let status = StatusCode::from_u16(response.status).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
    let mut out = HeaderMap::new();
    if let Some(id) = response.client_id.as_deref() {
        match (
            HeaderName::from_bytes(CLIENT_ID_HEADER.as_bytes()),
            HeaderValue::from_str(id),
        ) {
            (Ok(name), Ok(value)) => {
                out.insert(name, value);
            }
            _ => warn!(client_id = id, "session id is not a valid header value"),
        }
    }
    if response.is_success() {
        out.insert(CONTENT_TYPE, HeaderValue::from_static(JSON_MIME_TYPE));
    }
    (status, out, response.body).into_response()
}
