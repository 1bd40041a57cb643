//! Tuner management.
//!
//! This module provides:
//! - [`Tuner`]: Owns the device pipeline and publishes status and tracks
//! - [`Status`]: Stopped / Starting / Playing, with the failure that stopped it
//! - [`Tracks`]: The WebRTC tracks fed by the running pipeline

pub mod controller;
pub mod status;
pub mod tracks;

pub use controller::Tuner;
pub use status::{Status, TunerError};
pub use tracks::{register_codecs, TrackPair, Tracks};
