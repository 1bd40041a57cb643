//! Tuner status and errors.

use thiserror::Error;
use tunecast_protocol::{Channel, StatusMessage, TunerState};

use crate::pipeline::PipelineError;

/// Errors returned by tuner operations.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum TunerError {
    /// The requested channel is not in the channel list.
    #[error("channel not found: {0}")]
    ChannelNotFound(String),

    #[error(transparent)]
    Pipeline(#[from] PipelineError),
}

/// Operating status of the tuner.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Status {
    /// No pipeline is running. `error` holds the failure that stopped the
    /// tuner, if it did not stop on request.
    Stopped { error: Option<TunerError> },
    /// A pipeline for the channel is being started.
    Starting(Channel),
    /// The pipeline is running and tracks carry the channel.
    Playing(Channel),
}

impl Status {
    pub fn stopped() -> Self {
        Status::Stopped { error: None }
    }

    pub fn failed(error: TunerError) -> Self {
        Status::Stopped { error: Some(error) }
    }

    pub fn state(&self) -> TunerState {
        match self {
            Status::Stopped { .. } => TunerState::Stopped,
            Status::Starting(_) => TunerState::Starting,
            Status::Playing(_) => TunerState::Playing,
        }
    }

    pub fn channel(&self) -> Option<&Channel> {
        match self {
            Status::Starting(ch) | Status::Playing(ch) => Some(ch),
            Status::Stopped { .. } => None,
        }
    }

    pub fn error(&self) -> Option<&TunerError> {
        match self {
            Status::Stopped { error } => error.as_ref(),
            _ => None,
        }
    }

    /// Wire representation pushed to status clients.
    pub fn to_message(&self) -> StatusMessage {
        let mut msg = StatusMessage::new(self.state());
        if let Some(ch) = self.channel() {
            msg = msg.with_channel(ch.name.clone());
        }
        if let Some(err) = self.error() {
            msg = msg.with_error(err.to_string());
        }
        msg
    }
}

impl Default for Status {
    fn default() -> Self {
        Self::stopped()
    }
}
