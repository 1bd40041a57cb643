//! JSON messages exchanged with browser clients.

use serde::{Deserialize, Serialize};

/// Operating state of the tuner as seen by clients.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TunerState {
    Stopped,
    Starting,
    Playing,
}

/// One tuner status update pushed over the status socket.
///
/// ```rust
/// use tunecast_protocol::{StatusMessage, TunerState};
///
/// let msg = StatusMessage::new(TunerState::Playing).with_channel("KCTS-HD");
/// assert_eq!(msg.channel_name.as_deref(), Some("KCTS-HD"));
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct StatusMessage {
    pub state: TunerState,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub channel_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl StatusMessage {
    pub fn new(state: TunerState) -> Self {
        Self {
            state,
            channel_name: None,
            error: None,
        }
    }

    pub fn with_channel(mut self, name: impl Into<String>) -> Self {
        self.channel_name = Some(name.into());
        self
    }

    pub fn with_error(mut self, error: impl Into<String>) -> Self {
        self.error = Some(error.into());
        self
    }
}

/// Parameters of the `tune` RPC.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct TuneParams {
    #[serde(default)]
    pub channel_name: Option<String>,
}

/// Body of every RPC error response.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct RpcErrorBody {
    pub error: String,
}

impl RpcErrorBody {
    pub fn new(error: impl ToString) -> Self {
        Self {
            error: error.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_message_omits_empty_fields() {
        let msg = StatusMessage::new(TunerState::Stopped);
        assert_eq!(serde_json::to_string(&msg).unwrap(), r#"{"State":"Stopped"}"#);
    }

    #[test]
    fn test_status_message_full_shape() {
        let msg = StatusMessage::new(TunerState::Starting).with_channel("KIDS");
        assert_eq!(
            serde_json::to_string(&msg).unwrap(),
            r#"{"State":"Starting","ChannelName":"KIDS"}"#
        );

        let msg = StatusMessage::new(TunerState::Stopped).with_error("no signal");
        assert_eq!(
            serde_json::to_string(&msg).unwrap(),
            r#"{"State":"Stopped","Error":"no signal"}"#
        );
    }

    #[test]
    fn test_tune_params() {
        let params: TuneParams = serde_json::from_str(r#"{"ChannelName":"WORLD"}"#).unwrap();
        assert_eq!(params.channel_name.as_deref(), Some("WORLD"));

        let params: TuneParams = serde_json::from_str("{}").unwrap();
        assert_eq!(params.channel_name, None);
    }

    #[test]
    fn test_rpc_error_body() {
        let body = RpcErrorBody::new("channel not found");
        assert_eq!(
            serde_json::to_string(&body).unwrap(),
            r#"{"Error":"channel not found"}"#
        );
    }
}
