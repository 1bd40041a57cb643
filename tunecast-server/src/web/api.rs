//! Configuration and RPC endpoints.
//!
//! RPC methods only accept POST. An optional parameters value is read from a
//! JSON request body of at most [`MAX_RPC_BODY_SIZE`] bytes. Successful calls
//! answer 204 No Content; failures answer with a `{"Error": "..."}` body.

use std::sync::Arc;

use axum::{
    extract::{
        rejection::{BytesRejection, FailedToBufferBody},
        DefaultBodyLimit, State,
    },
    http::{
        header::{ALLOW, CONTENT_TYPE},
        HeaderMap, Method, StatusCode,
    },
    response::{IntoResponse, Response},
    Json,
};
use bytes::Bytes;
use log::{debug, warn};
use serde::de::DeserializeOwned;
use thiserror::Error;
use tunecast_protocol::{RpcErrorBody, TuneParams};

use crate::tuner::{Tuner, TunerError};
use crate::web::state::WebState;

/// Largest accepted RPC request body.
pub const MAX_RPC_BODY_SIZE: usize = 1024;

/// Body limit layer for the RPC routes.
pub fn rpc_body_limit() -> DefaultBodyLimit {
    DefaultBodyLimit::max(MAX_RPC_BODY_SIZE)
}

type RpcBody = Result<Bytes, BytesRejection>;

/// Errors reported to RPC clients.
#[derive(Debug, Error)]
pub enum RpcError {
    #[error("unable to read RPC body")]
    ReadBody,

    #[error("RPC body exceeded maximum size")]
    BodyTooLarge,

    #[error("must have Content-Type: application/json")]
    InvalidBodyType,

    #[error("unable to decode RPC body")]
    InvalidBody,

    #[error("channel name required")]
    ChannelNameRequired,

    #[error(transparent)]
    Tuner(#[from] TunerError),

    #[error("tuner task failed: {0}")]
    Internal(String),
}

impl RpcError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            RpcError::ReadBody | RpcError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
            RpcError::BodyTooLarge => StatusCode::PAYLOAD_TOO_LARGE,
            RpcError::InvalidBodyType => StatusCode::UNSUPPORTED_MEDIA_TYPE,
            RpcError::InvalidBody | RpcError::ChannelNameRequired => StatusCode::BAD_REQUEST,
            RpcError::Tuner(TunerError::ChannelNotFound(_)) => StatusCode::BAD_REQUEST,
            RpcError::Tuner(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for RpcError {
    fn into_response(self) -> Response {
        (self.status_code(), Json(RpcErrorBody::new(&self))).into_response()
    }
}

/// List the names of all configured channels.
pub async fn get_channels(State(state): State<Arc<WebState>>) -> Json<Vec<String>> {
    Json(state.tuner.channel_names())
}

/// `POST /api/rpc/tune`
pub async fn rpc_tune(
    State(state): State<Arc<WebState>>,
    method: Method,
    headers: HeaderMap,
    body: RpcBody,
) -> Response {
    if method != Method::POST {
        return method_not_allowed();
    }
    respond(tune(&state, &headers, body).await)
}

/// `POST /api/rpc/stop`
pub async fn rpc_stop(
    State(state): State<Arc<WebState>>,
    method: Method,
    headers: HeaderMap,
    body: RpcBody,
) -> Response {
    if method != Method::POST {
        return method_not_allowed();
    }
    respond(stop(&state, &headers, body).await)
}

async fn tune(state: &WebState, headers: &HeaderMap, body: RpcBody) -> Result<(), RpcError> {
    let params: TuneParams = read_params(headers, body)?;
    let channel_name = match params.channel_name {
        Some(name) if !name.is_empty() => name,
        _ => return Err(RpcError::ChannelNameRequired),
    };

    debug!("[API] Tune requested: {}", channel_name);
    run_tuner(&state.tuner, move |tuner| tuner.tune(&channel_name)).await
}

async fn stop(state: &WebState, headers: &HeaderMap, body: RpcBody) -> Result<(), RpcError> {
    // Stop takes no parameters, but a malformed body is still an error.
    let _: serde_json::Value = read_params(headers, body)?;

    debug!("[API] Stop requested");
    run_tuner(&state.tuner, |tuner| tuner.stop()).await
}

fn respond(result: Result<(), RpcError>) -> Response {
    match result {
        Ok(()) => StatusCode::NO_CONTENT.into_response(),
        Err(e) => {
            if e.status_code().is_server_error() {
                warn!("[API] RPC failed: {}", e);
            }
            e.into_response()
        }
    }
}

fn method_not_allowed() -> Response {
    (StatusCode::METHOD_NOT_ALLOWED, [(ALLOW, "POST")]).into_response()
}

/// Run a blocking tuner operation off the async workers.
async fn run_tuner<F>(tuner: &Arc<Tuner>, op: F) -> Result<(), RpcError>
where
    F: FnOnce(&Tuner) -> Result<(), TunerError> + Send + 'static,
{
    let tuner = Arc::clone(tuner);
    tokio::task::spawn_blocking(move || op(&tuner))
        .await
        .map_err(|e| RpcError::Internal(e.to_string()))?
        .map_err(RpcError::from)
}

/// Decode RPC parameters from the request body. An empty body yields the
/// default parameters.
fn read_params<T>(headers: &HeaderMap, body: RpcBody) -> Result<T, RpcError>
where
    T: DeserializeOwned + Default,
{
    let body = body.map_err(|rejection| match rejection {
        BytesRejection::FailedToBufferBody(FailedToBufferBody::LengthLimitError(_)) => {
            RpcError::BodyTooLarge
        }
        _ => RpcError::ReadBody,
    })?;
    if body.is_empty() {
        return Ok(T::default());
    }

    let is_json = headers
        .get(CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .map(|v| v == "application/json")
        .unwrap_or(false);
    if !is_json {
        return Err(RpcError::InvalidBodyType);
    }

    serde_json::from_slice(&body).map_err(|_| RpcError::InvalidBody)
}
