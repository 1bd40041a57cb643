//! Error types for the tunecast channel list and wire formats.

use thiserror::Error;

/// Errors produced while reading a `channels.conf` file.
///
/// Line numbers are 1-based.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ChannelsConfError {
    /// A line did not split into the expected number of fields.
    #[error("channels.conf line {line} has {found} fields, expected {expected}")]
    FieldCount {
        line: usize,
        found: usize,
        expected: usize,
    },

    /// A numeric field could not be parsed as an unsigned integer.
    #[error("channels.conf line {line} has invalid field value {value:?}")]
    InvalidNumber { line: usize, value: String },

    /// The modulation field named an unsupported modulation.
    #[error("channels.conf line {line} has unknown modulation {value:?}")]
    UnknownModulation { line: usize, value: String },

    /// The underlying reader failed.
    #[error("unable to read channels.conf: {0}")]
    Io(String),
}
