//! Documents carried inside frames.
//!
//! Outbound:
//! ```json
//! {"v": 1, "client_id": "1234567890"}
//! {"cmd": "SET_ACTIVITY", "args": {"pid": 4242, "activity": {...}}, "nonce": "4242-7"}
//! ```
//!
//! Inbound replies and events share one shape, distinguished by `cmd`/`evt`:
//! ```json
//! {"cmd": "DISPATCH", "evt": "READY", "data": {"v": 1, "user": {...}}}
//! {"cmd": "SET_ACTIVITY", "evt": "ERROR", "nonce": "4242-7", "data": {"code": 4000, "message": "..."}}
//! ```

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// RPC protocol version sent in the handshake.
pub const RPC_VERSION: u32 = 1;

pub const CMD_SET_ACTIVITY: &str = "SET_ACTIVITY";
pub const EVT_READY: &str = "READY";
pub const EVT_ERROR: &str = "ERROR";

/// Opcode 0 payload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Handshake {
	pub v: u32,
	pub client_id: String,
}

impl Handshake {
	pub fn new(client_id: impl Into<String>) -> Self {
		Self {
			v: RPC_VERSION,
			client_id: client_id.into(),
		}
	}
}

/// Opcode 1 payload sent by the client.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Command {
	pub cmd: String,
	pub args: Value,
	pub nonce: String,
}

impl Command {
	/// Builds a `SET_ACTIVITY` command around an already serialized activity.
	pub fn set_activity(pid: u32, activity: Value, nonce: impl Into<String>) -> Self {
		Self {
			cmd: CMD_SET_ACTIVITY.to_string(),
			args: serde_json::json!({ "pid": pid, "activity": activity }),
			nonce: nonce.into(),
		}
	}
}

/// Any document received from the peer.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Incoming {
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub cmd: Option<String>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub evt: Option<String>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub nonce: Option<String>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub data: Option<Value>,
}

impl Incoming {
	pub fn is_ready(&self) -> bool {
		self.evt.as_deref() == Some(EVT_READY)
	}

	pub fn is_error(&self) -> bool {
		self.evt.as_deref() == Some(EVT_ERROR)
	}

	/// Error details of an `evt: "ERROR"` reply or a close frame.
	pub fn error_data(&self) -> Option<ErrorData> {
		self.data.as_ref().and_then(|d| serde_json::from_value(d.clone()).ok())
	}

	/// User reported in the READY payload, if any.
	pub fn ready_user(&self) -> Option<ReadyUser> {
		self.data
			.as_ref()
			.and_then(|d| d.get("user"))
			.and_then(|u| serde_json::from_value(u.clone()).ok())
	}
}

/// `{code, message}` as sent in error replies and close frames.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorData {
	#[serde(default)]
	pub code: i64,
	#[serde(default)]
	pub message: String,
}

/// Subset of the user object in the READY event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReadyUser {
	pub id: String,
	pub username: String,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub global_name: Option<String>,
}
