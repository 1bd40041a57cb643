//! WebSocket that streams tuner status to the client.

use std::sync::Arc;

use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::State;
use axum::response::Response;
use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use log::{debug, info, warn};
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;

use crate::tuner::Status;
use crate::web::state::WebState;

/// `GET /api/socket/tuner-status`
pub async fn tuner_status_socket(
    ws: WebSocketUpgrade,
    State(state): State<Arc<WebState>>,
) -> Response {
    let id = state.next_socket_id();
    ws.on_upgrade(move |socket| serve(socket, state, id))
}

async fn serve(socket: WebSocket, state: Arc<WebState>, id: u64) {
    info!("[StatusSocket {}] Connected", id);

    let (sink, mut stream) = socket.split();
    let sink = Arc::new(Mutex::new(sink));
    let shutdown = CancellationToken::new();

    let watch = state.tuner.watch_status({
        let sink = Arc::clone(&sink);
        let shutdown = shutdown.clone();
        move |status: Status| {
            let sink = Arc::clone(&sink);
            let shutdown = shutdown.clone();
            async move {
                debug!("[StatusSocket {}] Sending status {:?}", id, status.state());
                if let Err(e) = send_status(&sink, &status).await {
                    debug!("[StatusSocket {}] Send failed: {}", id, e);
                    shutdown.cancel();
                }
            }
        }
    });

    let reason = tokio::select! {
        _ = shutdown.cancelled() => Some("send failed".to_string()),
        result = drain_client(&mut stream) => result.err().map(|e| e.to_string()),
    };

    watch.cancel();
    watch.wait().await;

    if let Err(e) = sink.lock().await.close().await {
        debug!("[StatusSocket {}] Close failed: {}", id, e);
    }

    match reason {
        Some(reason) => warn!("[StatusSocket {}] Finished: {}", id, reason),
        None => info!("[StatusSocket {}] Finished", id),
    }
}

async fn send_status(
    sink: &Mutex<SplitSink<WebSocket, Message>>,
    status: &Status,
) -> Result<(), axum::Error> {
    let text = status_frame(status).map_err(axum::Error::new)?;
    sink.lock().await.send(Message::Text(text.into())).await
}

/// JSON text of the status message for `status`.
fn status_frame(status: &Status) -> Result<String, serde_json::Error> {
    serde_json::to_string(&status.to_message())
}

/// Read and discard client messages until the client goes away.
async fn drain_client(stream: &mut SplitStream<WebSocket>) -> Result<(), axum::Error> {
    while let Some(msg) = stream.next().await {
        if let Message::Close(_) = msg? {
            break;
        }
    }
    Ok(())
}
