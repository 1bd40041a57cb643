//! WebSocket signaling for a WebRTC peer that receives the tuner's tracks.
//!
//! The server drives negotiation. Every time the tuner publishes new tracks,
//! the session swaps the tracks on its peer connection, creates an offer,
//! waits for ICE gathering to finish, and sends `{"SDP": <offer>}`. The
//! client replies with `{"SDP": <answer>}`.

use std::sync::Arc;

use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::State;
use axum::response::Response;
use futures_util::stream::SplitStream;
use futures_util::{SinkExt, StreamExt};
use log::{debug, info, warn};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use webrtc::peer_connection::configuration::RTCConfiguration;
use webrtc::peer_connection::sdp::session_description::RTCSessionDescription;
use webrtc::peer_connection::RTCPeerConnection;
use webrtc::rtp_transceiver::rtp_transceiver_direction::RTCRtpTransceiverDirection;
use webrtc::rtp_transceiver::RTCRtpTransceiverInit;
use webrtc::track::track_local::TrackLocal;

use crate::tuner::{TrackPair, Tracks};
use crate::web::state::WebState;

/// Signaling message in either direction.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SdpMessage {
    #[serde(rename = "SDP")]
    pub sdp: RTCSessionDescription,
}

#[derive(Debug, Error)]
pub enum PeerSocketError {
    #[error("webrtc: {0}")]
    WebRtc(#[from] webrtc::Error),

    #[error("invalid signaling message: {0}")]
    Json(#[from] serde_json::Error),

    #[error("socket: {0}")]
    Socket(#[from] axum::Error),

    #[error("peer connection has no local description")]
    NoLocalDescription,

    #[error("socket writer closed")]
    WriterClosed,
}

/// `GET /api/socket/webrtc-peer`
pub async fn webrtc_peer_socket(
    ws: WebSocketUpgrade,
    State(state): State<Arc<WebState>>,
) -> Response {
    let id = state.next_socket_id();
    ws.on_upgrade(move |socket| serve(socket, state, id))
}

async fn serve(socket: WebSocket, state: Arc<WebState>, id: u64) {
    info!("[PeerSocket {}] Connected", id);

    let peer = match state
        .webrtc
        .new_peer_connection(RTCConfiguration::default())
        .await
    {
        Ok(peer) => Arc::new(peer),
        Err(e) => {
            warn!("[PeerSocket {}] Failed to create peer connection: {}", id, e);
            return;
        }
    };

    let (mut sink, mut stream) = socket.split();
    let shutdown = CancellationToken::new();

    // Offers go through a single-slot queue, so a slow client slows the
    // watch handler down and track updates coalesce.
    let (outbox, mut offers) = mpsc::channel::<SdpMessage>(1);
    let writer = tokio::spawn({
        let shutdown = shutdown.clone();
        async move {
            loop {
                let msg = tokio::select! {
                    _ = shutdown.cancelled() => break,
                    msg = offers.recv() => match msg {
                        Some(msg) => msg,
                        None => break,
                    },
                };
                let sent = match serde_json::to_string(&msg) {
                    Ok(text) => sink.send(Message::Text(text.into())).await,
                    Err(e) => Err(axum::Error::new(e)),
                };
                if let Err(e) = sent {
                    debug!("[PeerSocket {}] Send failed: {}", id, e);
                    shutdown.cancel();
                    break;
                }
            }
            let _ = sink.close().await;
        }
    });

    let session = Arc::new(PeerSession::new(id, Arc::clone(&peer), outbox));
    let watch = state.tuner.watch_tracks({
        let shutdown = shutdown.clone();
        move |tracks: Tracks| {
            let session = Arc::clone(&session);
            let shutdown = shutdown.clone();
            async move {
                if let Err(e) = session.handle_tracks(&tracks).await {
                    warn!("[PeerSocket {}] Failed to update tracks: {}", id, e);
                    shutdown.cancel();
                }
            }
        }
    });

    let result = tokio::select! {
        _ = shutdown.cancelled() => Ok(()),
        result = read_answers(&peer, &mut stream) => result,
    };

    // Stopping the writer first unblocks a handler waiting to send an offer.
    shutdown.cancel();
    if let Err(e) = writer.await {
        warn!("[PeerSocket {}] Writer task failed: {}", id, e);
    }
    watch.cancel();
    watch.wait().await;

    if let Err(e) = peer.close().await {
        debug!("[PeerSocket {}] Failed to close peer connection: {}", id, e);
    }

    match result {
        Ok(()) => info!("[PeerSocket {}] Finished", id),
        Err(e) => warn!("[PeerSocket {}] Finished: {}", id, e),
    }
}

/// Apply session answers from the client until it goes away.
async fn read_answers(
    peer: &RTCPeerConnection,
    stream: &mut SplitStream<WebSocket>,
) -> Result<(), PeerSocketError> {
    while let Some(msg) = stream.next().await {
        let answer: SdpMessage = match msg? {
            Message::Text(text) => serde_json::from_str(&text)?,
            Message::Binary(data) => serde_json::from_slice(&data)?,
            Message::Close(_) => break,
            _ => continue,
        };
        peer.set_remote_description(answer.sdp).await?;
    }
    Ok(())
}

/// Signaling state of one connected peer.
pub struct PeerSession {
    id: u64,
    peer: Arc<RTCPeerConnection>,
    outbox: mpsc::Sender<SdpMessage>,
}

impl PeerSession {
    pub fn new(id: u64, peer: Arc<RTCPeerConnection>, outbox: mpsc::Sender<SdpMessage>) -> Self {
        Self { id, peer, outbox }
    }

    /// Publish `tracks` on the peer connection and renegotiate.
    pub async fn handle_tracks(&self, tracks: &Tracks) -> Result<(), PeerSocketError> {
        if tracks.is_empty() {
            debug!("[PeerSocket {}] Tracks removed", self.id);
        } else {
            debug!("[PeerSocket {}] Received tracks: {:?}", self.id, tracks.pair());
        }
        self.replace_tracks(tracks).await?;
        self.renegotiate().await
    }

    async fn replace_tracks(&self, tracks: &Tracks) -> Result<(), PeerSocketError> {
        for sender in self.peer.get_senders().await {
            self.peer.remove_track(&sender).await?;
        }

        match tracks.pair() {
            Some(pair) => self.add_tracks(pair).await,
            None => Ok(()),
        }
    }

    async fn add_tracks(&self, pair: &TrackPair) -> Result<(), PeerSocketError> {
        let video: Arc<dyn TrackLocal + Send + Sync> = Arc::clone(&pair.video) as _;
        let audio: Arc<dyn TrackLocal + Send + Sync> = Arc::clone(&pair.audio) as _;

        if self.has_transceivers().await {
            self.peer.add_track(video).await?;
            self.peer.add_track(audio).await?;
        } else {
            for track in [video, audio] {
                let init = RTCRtpTransceiverInit {
                    direction: RTCRtpTransceiverDirection::Sendonly,
                    send_encodings: vec![],
                };
                self.peer.add_transceiver_from_track(track, Some(init)).await?;
            }
        }
        Ok(())
    }

    async fn renegotiate(&self) -> Result<(), PeerSocketError> {
        // Nothing to negotiate until the first tracks define the transceivers.
        if !self.has_transceivers().await {
            return Ok(());
        }

        let offer = self.peer.create_offer(None).await?;
        let mut gathered = self.peer.gathering_complete_promise().await;
        self.peer.set_local_description(offer).await?;
        let _ = gathered.recv().await;

        let sdp = self
            .peer
            .local_description()
            .await
            .ok_or(PeerSocketError::NoLocalDescription)?;
        self.outbox
            .send(SdpMessage { sdp })
            .await
            .map_err(|_| PeerSocketError::WriterClosed)
    }

    async fn has_transceivers(&self) -> bool {
        !self.peer.get_transceivers().await.is_empty()
    }
}
