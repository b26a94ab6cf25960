use std::fmt::Display;

use serde::{Deserialize, Serialize};
use serde_json::Value;

// -------------------------------------------------------------------------------------------------------

/// Correlates an outbound call with the response that fulfills it.
/// Sent as `callbackId` on calls and echoed back as `responseId` on responses.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CallbackId(pub String);

impl Display for CallbackId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for CallbackId {
    fn from(value: &str) -> Self {
        CallbackId(value.to_string())
    }
}

// -------------------------------------------------------------------------------------------------------

/// The message as it travels between the two peers.
///
/// Both shapes share one json object layout; an envelope is a response exactly when it
/// carries a non-empty `responseId`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(from = "WireEnvelope", into = "WireEnvelope")]
pub enum Envelope {
    Call {
        handler_name: String,
        data: Value,
        callback_id: Option<CallbackId>,
    },
    Response {
        handler_name: String,
        response_id: CallbackId,
        response_data: Value,
    },
}

impl Envelope {
    pub fn call(
        handler_name: impl Into<String>,
        data: Value,
        callback_id: Option<CallbackId>,
    ) -> Self {
        Envelope::Call {
            handler_name: handler_name.into(),
            data,
            callback_id,
        }
    }

    pub fn response(
        handler_name: impl Into<String>,
        response_id: CallbackId,
        response_data: Value,
    ) -> Self {
        Envelope::Response {
            handler_name: handler_name.into(),
            response_id,
            response_data,
        }
    }

    pub fn handler_name(&self) -> &str {
        match self {
            Envelope::Call { handler_name, .. } | Envelope::Response { handler_name, .. } => {
                handler_name
            }
        }
    }

    pub fn is_response(&self) -> bool {
        matches!(self, Envelope::Response { .. })
    }

    pub fn encode(&self) -> anyhow::Result<String> {
        Ok(serde_json::to_string(self)?)
    }

    pub fn decode(text: &str) -> anyhow::Result<Self> {
        Ok(serde_json::from_str(text)?)
    }

    pub fn decode_slice(bytes: &[u8]) -> anyhow::Result<Self> {
        Ok(serde_json::from_slice(bytes)?)
    }
}

// -------------------------------------------------------------------------------------------------------

/// flat json layout shared by both envelope shapes
#[derive(Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct WireEnvelope {
    #[serde(default)]
    handler_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    data: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    callback_id: Option<CallbackId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    response_id: Option<CallbackId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    response_data: Option<Value>,
}

impl From<WireEnvelope> for Envelope {
    fn from(wire: WireEnvelope) -> Self {
        // empty ids count as absent
        let response_id = wire.response_id.filter(|id| !id.0.is_empty());
        let callback_id = wire.callback_id.filter(|id| !id.0.is_empty());

        match response_id {
            Some(response_id) => Envelope::Response {
                handler_name: wire.handler_name,
                response_id,
                response_data: wire.response_data.unwrap_or(Value::Null),
            },
            None => Envelope::Call {
                handler_name: wire.handler_name,
                data: wire.data.unwrap_or(Value::Null),
                callback_id,
            },
        }
    }
}

impl From<Envelope> for WireEnvelope {
    fn from(envelope: Envelope) -> Self {
        match envelope {
            Envelope::Call {
                handler_name,
                data,
                callback_id,
            } => WireEnvelope {
                handler_name,
                data: Some(data),
                callback_id,
                ..Default::default()
            },
            Envelope::Response {
                handler_name,
                response_id,
                response_data,
            } => WireEnvelope {
                handler_name,
                response_id: Some(response_id),
                response_data: Some(response_data),
                ..Default::default()
            },
        }
    }
}
