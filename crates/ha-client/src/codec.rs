//! Wire format for the websocket API
//!
//! Outgoing commands are internally tagged JSON objects with a client
//! assigned `id`; incoming frames are decoded into [`IncomingMessage`].

use ha_core::Event;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

use crate::error::{ClientError, ClientResult};

// =============================================================================
// Outgoing
// =============================================================================

/// A command sent to the hub; the `id` is added by [`encode_command`]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Command {
    SubscribeEvents {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        event_type: Option<String>,
    },
    UnsubscribeEvents {
        subscription: u64,
    },
    CallService {
        domain: String,
        service: String,
        #[serde(default)]
        service_data: Value,
    },
    GetStates,
    GetServices,
    GetConfig,
    GetPanels,
    Ping,
}

impl Command {
    /// The `type` field of the frame
    pub fn kind(&self) -> &'static str {
        match self {
            Command::SubscribeEvents { .. } => "subscribe_events",
            Command::UnsubscribeEvents { .. } => "unsubscribe_events",
            Command::CallService { .. } => "call_service",
            Command::GetStates => "get_states",
            Command::GetServices => "get_services",
            Command::GetConfig => "get_config",
            Command::GetPanels => "get_panels",
            Command::Ping => "ping",
        }
    }
}

#[derive(Serialize)]
struct AuthMessage<'a> {
    #[serde(rename = "type")]
    msg_type: &'static str,
    access_token: &'a str,
}

/// Serialize `{...command, "id": id}`
pub fn encode_command(id: u64, command: &Command) -> ClientResult<String> {
    let mut frame = serde_json::to_value(command)?;
    match frame.as_object_mut() {
        Some(object) => {
            object.insert("id".to_string(), Value::from(id));
        }
        None => {
            return Err(ClientError::Protocol(format!(
                "{} did not serialize to an object",
                command.kind()
            )))
        }
    }
    Ok(frame.to_string())
}

/// Serialize the `auth` frame answering `auth_required`
pub fn encode_auth(access_token: &str) -> ClientResult<String> {
    Ok(serde_json::to_string(&AuthMessage {
        msg_type: "auth",
        access_token,
    })?)
}

// =============================================================================
// Incoming
// =============================================================================

/// A frame received from the hub
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum IncomingMessage {
    AuthRequired {
        #[serde(default)]
        ha_version: Option<String>,
    },
    AuthOk {
        #[serde(default)]
        ha_version: Option<String>,
    },
    AuthInvalid {
        #[serde(default)]
        message: Option<String>,
    },
    Result(ResultFrame),
    Event(EventFrame),
    Pong {
        id: u64,
    },
    /// Any frame type this client does not handle
    #[serde(other)]
    Unknown,
}

/// `{id, type: "result", success, result?, error?}`
#[derive(Debug, Clone, Deserialize)]
pub struct ResultFrame {
    pub id: u64,
    pub success: bool,
    #[serde(default)]
    pub result: Option<Value>,
    #[serde(default)]
    pub error: Option<ErrorInfo>,
}

impl ResultFrame {
    /// The command's outcome: the result on success, a command error otherwise
    pub fn into_outcome(self) -> ClientResult<Value> {
        if self.success {
            return Ok(self.result.unwrap_or(Value::Null));
        }
        let error = self.error.unwrap_or_default();
        Err(ClientError::Command {
            code: error.code,
            message: error.message,
        })
    }
}

/// Error detail of a failed command
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ErrorInfo {
    /// Older hubs send numeric codes, newer ones strings
    #[serde(default, deserialize_with = "code_as_string")]
    pub code: String,
    #[serde(default)]
    pub message: String,
}

fn code_as_string<'de, D: Deserializer<'de>>(deserializer: D) -> Result<String, D::Error> {
    Ok(match Value::deserialize(deserializer)? {
        Value::String(s) => s,
        Value::Null => String::new(),
        other => other.to_string(),
    })
}

/// `{id?, type: "event", event}`
#[derive(Debug, Clone, Deserialize)]
pub struct EventFrame {
    #[serde(default)]
    pub id: Option<u64>,
    pub event: Event<Value>,
}

/// Parse one text frame
pub fn decode(text: &str) -> ClientResult<IncomingMessage> {
    Ok(serde_json::from_str(text)?)
}
