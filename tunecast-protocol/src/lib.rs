//! Channel list and wire message definitions for tunecast.
//!
//! This crate holds everything the server shares with its clients and its
//! configuration files:
//!
//! - [`Channel`] and [`Modulation`]: ATSC channel descriptors
//! - [`parse_channels_conf`]: reader for azap-style `channels.conf` files
//! - [`StatusMessage`]: tuner status pushed over the status socket
//! - [`TuneParams`] / [`RpcErrorBody`]: RPC request and error bodies
//!
//! # Example
//!
//! ```rust
//! use std::io::Cursor;
//! use tunecast_protocol::{parse_channels_conf, Modulation};
//!
//! let conf = "KCTS-HD:189000000:8VSB:49:52:3\nWLFI:255000000:QAM_256:66:68:4";
//! let channels = parse_channels_conf(Cursor::new(conf)).unwrap();
//!
//! assert_eq!(channels[0].name, "KCTS-HD");
//! assert_eq!(channels[1].modulation, Modulation::Qam256);
//! ```

pub mod channels;
pub mod error;
pub mod message;
pub mod types;

pub use channels::{format_channels_conf, parse_channels_conf};
pub use error::ChannelsConfError;
pub use message::{RpcErrorBody, StatusMessage, TuneParams, TunerState};
pub use types::{Channel, Modulation, UnknownModulation, CHANNEL_FIELD_COUNT};
