//! The tuner: one device, one pipeline, any number of observers.

use std::future::Future;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use log::{debug, info, warn};
use tunecast_protocol::Channel;

use super::status::{Status, TunerError};
use super::tracks::{track_sink, TrackPair, Tracks};
use crate::pipeline::{describe, Pipeline, PipelineBackend, PipelineError, SinkKind, VideoPipeline};
use crate::watch::{Value, Watch};

/// Manages a single physical tuner device.
///
/// Clients tune to a channel or stop the tuner, and watch its status and its
/// WebRTC tracks. After any call to [`tune`](Self::tune) or
/// [`stop`](Self::stop) returns, either a pipeline is running and live tracks
/// are published, or no pipeline exists and the published tracks are empty.
///
/// `tune` and `stop` block while the pipeline changes state. Call them from a
/// thread that may block, e.g. through [`tokio::task::spawn_blocking`].
pub struct Tuner {
    channels: Vec<Channel>,
    backend: Box<dyn PipelineBackend>,
    video_pipeline: VideoPipeline,

    /// Held for the whole of every `tune` and `stop`.
    pipeline: Mutex<Option<Box<dyn Pipeline>>>,

    status: Value<Status>,
    tracks: Value<Tracks>,
}

impl Tuner {
    /// Create a stopped tuner for the channels in `channels`.
    pub fn new(
        channels: Vec<Channel>,
        backend: Box<dyn PipelineBackend>,
        video_pipeline: VideoPipeline,
    ) -> Self {
        Self {
            channels,
            backend,
            video_pipeline,
            pipeline: Mutex::new(None),
            status: Value::new(Status::stopped()),
            tracks: Value::new(Tracks::empty()),
        }
    }

    /// Names of all known channels, in channel list order.
    pub fn channel_names(&self) -> Vec<String> {
        self.channels.iter().map(|ch| ch.name.clone()).collect()
    }

    /// Current status.
    pub fn status(&self) -> Status {
        self.status.get()
    }

    /// Currently published tracks.
    #[cfg(test)]
    pub fn tracks(&self) -> Tracks {
        self.tracks.get()
    }

    /// Watch for changes to the tuner status. See [`Value::watch`].
    pub fn watch_status<F, Fut>(&self, handler: F) -> Watch
    where
        F: Fn(Status) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        self.status.watch(handler)
    }

    /// Watch for changes to the published tracks. See [`Value::watch`].
    pub fn watch_tracks<F, Fut>(&self, handler: F) -> Watch
    where
        F: Fn(Tracks) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        self.tracks.watch(handler)
    }

    /// Tune to the named channel, replacing any running pipeline.
    ///
    /// An unknown channel name changes nothing. Any other failure leaves the
    /// tuner stopped with the error in its status.
    pub fn tune(&self, channel_name: &str) -> Result<(), TunerError> {
        let channel = self
            .channels
            .iter()
            .find(|ch| ch.name == channel_name)
            .cloned()
            .ok_or_else(|| TunerError::ChannelNotFound(channel_name.to_string()))?;

        let mut pipeline = self.lock_pipeline();

        info!(
            "[Tuner] Tuning to {} ({} Hz, {}, program {})",
            channel.name, channel.frequency, channel.modulation, channel.program_id
        );
        self.status.set(Status::Starting(channel.clone()));

        match self.start_pipeline(&mut pipeline, &channel) {
            Ok(tracks) => {
                info!("[Tuner] Playing {}", channel.name);
                self.status.set(Status::Playing(channel));
                self.tracks.set(Tracks::live(tracks));
                Ok(())
            }
            Err(err) => {
                warn!("[Tuner] Failed to tune to {}: {}", channel.name, err);
                if let Err(e) = close_pipeline(&mut pipeline) {
                    warn!("[Tuner] Failed to clean up pipeline: {}", e);
                }
                self.status.set(Status::failed(err.clone()));
                self.tracks.set(Tracks::empty());
                Err(err)
            }
        }
    }

    /// Stop any running pipeline and release the device.
    pub fn stop(&self) -> Result<(), TunerError> {
        let mut pipeline = self.lock_pipeline();

        let result = close_pipeline(&mut pipeline).map_err(TunerError::from);
        match &result {
            Ok(()) => {
                info!("[Tuner] Stopped");
                self.status.set(Status::stopped());
            }
            Err(err) => {
                warn!("[Tuner] Failed to stop pipeline: {}", err);
                self.status.set(Status::failed(err.clone()));
            }
        }
        self.tracks.set(Tracks::empty());
        result
    }

    /// Replace any pipeline in `slot` with a started one for `channel`.
    ///
    /// On error, `slot` may still hold a partially set up pipeline.
    fn start_pipeline(
        &self,
        slot: &mut Option<Box<dyn Pipeline>>,
        channel: &Channel,
    ) -> Result<TrackPair, TunerError> {
        close_pipeline(slot)?;

        let description = describe(channel, self.video_pipeline);
        debug!("[Tuner] Pipeline for {}:\n{}", channel.name, description);
        let pipeline = slot.insert(self.backend.launch(&description)?);

        let tracks = TrackPair::new();
        pipeline.set_sink(SinkKind::Video, track_sink(Arc::clone(&tracks.video)))?;
        pipeline.set_sink(SinkKind::Audio, track_sink(Arc::clone(&tracks.audio)))?;
        pipeline.start()?;

        Ok(tracks)
    }

    fn lock_pipeline(&self) -> MutexGuard<'_, Option<Box<dyn Pipeline>>> {
        self.pipeline.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Close the pipeline in `slot`, if any. The slot is empty afterwards even if
/// closing fails.
fn close_pipeline(slot: &mut Option<Box<dyn Pipeline>>) -> Result<(), PipelineError> {
    match slot.take() {
        Some(pipeline) => {
            debug!("[Tuner] Closing pipeline");
            pipeline.close()
        }
        None => Ok(()),
    }
}
