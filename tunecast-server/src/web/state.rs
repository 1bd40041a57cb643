//! Web server shared state.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use webrtc::api::interceptor_registry::register_default_interceptors;
use webrtc::api::media_engine::MediaEngine;
use webrtc::api::{APIBuilder, API};
use webrtc::interceptor::registry::Registry;

use crate::tuner::{self, Tuner};

/// State shared by every request handler.
pub struct WebState {
    /// The tuner driven by the API.
    pub tuner: Arc<Tuner>,
    /// WebRTC API whose media engine offers only the tuner's codecs.
    pub webrtc: API,
    next_socket_id: AtomicU64,
}

impl WebState {
    pub fn new(tuner: Arc<Tuner>) -> Result<Self, webrtc::Error> {
        Ok(Self {
            tuner,
            webrtc: new_webrtc_api()?,
            next_socket_id: AtomicU64::new(1),
        })
    }

    /// Allocate an id used to tag one socket's log lines.
    pub fn next_socket_id(&self) -> u64 {
        self.next_socket_id.fetch_add(1, Ordering::Relaxed)
    }
}

fn new_webrtc_api() -> Result<API, webrtc::Error> {
    let mut media_engine = MediaEngine::default();
    tuner::register_codecs(&mut media_engine)?;

    let registry = register_default_interceptors(Registry::new(), &mut media_engine)?;

    Ok(APIBuilder::new()
        .with_media_engine(media_engine)
        .with_interceptor_registry(registry)
        .build())
}
