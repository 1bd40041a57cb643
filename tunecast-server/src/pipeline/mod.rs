//! Media pipeline management for live ATSC signals.
//!
//! A pipeline tunes the DVB device, demuxes one program, and produces encoded
//! video and audio buffers through named sinks. The tuner only sees the
//! [`PipelineBackend`] and [`Pipeline`] traits. The GStreamer implementation
//! is behind the `gstreamer` cargo feature.

mod description;

#[cfg(feature = "gstreamer")]
mod gst;

#[cfg(feature = "gstreamer")]
pub use gst::GstBackend;

#[cfg(test)]
pub(crate) mod fake;

pub use description::{describe, VideoPipeline};

use std::time::Duration;

use thiserror::Error;

/// Pipeline-related errors.
#[cfg_attr(not(feature = "gstreamer"), allow(dead_code))]
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum PipelineError {
    /// The pipeline description could not be turned into a pipeline.
    #[error("failed to initialize pipeline: {0}")]
    Launch(String),

    /// The pipeline refused a state change (e.g. the device is busy or
    /// there is no signal).
    #[error("failed to change pipeline state: {0}")]
    StateChange(String),

    /// The description does not contain the requested sink element.
    #[error("pipeline has no sink named {0:?}")]
    MissingSink(&'static str),

    /// No pipeline backend was compiled in.
    #[error("no media pipeline backend available (build with the \"gstreamer\" feature)")]
    Unsupported,
}

/// Data streams a pipeline can deliver.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SinkKind {
    /// H.264 Constrained Baseline video, as WebRTC requires.
    Video,
    /// Opus audio.
    Audio,
}

impl SinkKind {
    /// Name of the sink element in the pipeline description.
    pub fn element_name(&self) -> &'static str {
        match self {
            SinkKind::Video => "videosink",
            SinkKind::Audio => "audiosink",
        }
    }
}

/// Receives one encoded buffer and its duration.
///
/// Sinks are called from the pipeline's own streaming threads.
pub type Sink = Box<dyn Fn(&[u8], Duration) + Send + Sync>;

/// Creates pipelines from textual descriptions.
pub trait PipelineBackend: Send + Sync {
    /// Build a stopped pipeline from `description`.
    fn launch(&self, description: &str) -> Result<Box<dyn Pipeline>, PipelineError>;
}

/// One live instance of a media pipeline.
///
/// All methods may block while the pipeline changes state.
pub trait Pipeline: Send {
    /// Route a data stream to `sink`. Must be called before [`start`](Self::start).
    fn set_sink(&mut self, kind: SinkKind, sink: Sink) -> Result<(), PipelineError>;

    /// Start tuning and streaming.
    fn start(&mut self) -> Result<(), PipelineError>;

    /// Stop the pipeline and release the device and every other resource.
    fn close(self: Box<Self>) -> Result<(), PipelineError>;
}

/// Backend used when no real pipeline implementation was compiled in.
#[derive(Debug, Default, Clone, Copy)]
pub struct UnsupportedBackend;

impl PipelineBackend for UnsupportedBackend {
    fn launch(&self, _description: &str) -> Result<Box<dyn Pipeline>, PipelineError> {
        Err(PipelineError::Unsupported)
    }
}

/// Select the pipeline backend compiled into this build.
pub fn default_backend() -> Result<Box<dyn PipelineBackend>, PipelineError> {
    #[cfg(feature = "gstreamer")]
    {
        Ok(Box::new(GstBackend::new()?))
    }

    #[cfg(not(feature = "gstreamer"))]
    {
        log::warn!("[Pipeline] Built without the gstreamer feature; tuning will fail");
        Ok(Box::new(UnsupportedBackend))
    }
}
