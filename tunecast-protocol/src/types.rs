//! Channel descriptors for ATSC tuners.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Number of colon-separated fields on every `channels.conf` line.
/// Must match the number of fields in [`Channel`].
pub const CHANNEL_FIELD_COUNT: usize = 6;

/// Modulation of an ATSC channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Modulation {
    /// Over-the-air 8-level vestigial sideband. `VSB_8` (as written by
    /// w_scan2) is normalized to this value.
    #[serde(rename = "8VSB")]
    Vsb8,
    /// Cable QAM-64.
    #[serde(rename = "QAM_64")]
    Qam64,
    /// Cable QAM-256.
    #[serde(rename = "QAM_256")]
    Qam256,
}

impl Modulation {
    /// The normalized name used in `channels.conf`.
    pub fn as_str(&self) -> &'static str {
        match self {
            Modulation::Vsb8 => "8VSB",
            Modulation::Qam64 => "QAM_64",
            Modulation::Qam256 => "QAM_256",
        }
    }

    /// The value accepted by the DVB source element's `modulation` property.
    pub fn source_name(&self) -> &'static str {
        match self {
            Modulation::Vsb8 => "8vsb",
            Modulation::Qam64 => "qam-64",
            Modulation::Qam256 => "qam-256",
        }
    }
}

impl fmt::Display for Modulation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error returned when a modulation name is not recognized.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnknownModulation(pub String);

impl FromStr for Modulation {
    type Err = UnknownModulation;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "8VSB" | "VSB_8" => Ok(Modulation::Vsb8),
            "QAM_64" => Ok(Modulation::Qam64),
            "QAM_256" => Ok(Modulation::Qam256),
            other => Err(UnknownModulation(other.to_string())),
        }
    }
}

/// Definition of a single ATSC television channel.
///
/// Channels are parsed once at startup and never change afterwards.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Channel {
    /// Display name, unique within a channel list.
    pub name: String,
    /// Carrier frequency in Hz.
    pub frequency: u64,
    pub modulation: Modulation,
    pub video_pid: u32,
    pub audio_pid: u32,
    /// MPEG-TS program number selected by the demuxer.
    pub program_id: u32,
}

impl fmt::Display for Channel {
    /// Formats the channel as a `channels.conf` line.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}:{}:{}:{}:{}:{}",
            self.name,
            self.frequency,
            self.modulation,
            self.video_pid,
            self.audio_pid,
            self.program_id
        )
    }
}
