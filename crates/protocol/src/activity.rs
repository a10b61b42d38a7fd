//! Activity document and its nested parts.
//!
//! Optional fields are omitted from the serialized form when absent, at every
//! level of nesting. The peer treats an explicit `null` differently from a
//! missing key for several of these fields, so nothing here ever serializes
//! as `null`.

use std::time::{SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};

/// Lowest accepted value of [`Activity::kind`].
pub const MIN_ACTIVITY_KIND: i32 = 0;
/// Highest accepted value of [`Activity::kind`].
pub const MAX_ACTIVITY_KIND: i32 = 4;

/// Activity type shown by the peer ("Playing ...", "Listening to ...").
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(i32)]
pub enum ActivityKind {
	Playing = 0,
	Streaming = 1,
	Listening = 2,
	Watching = 3,
	Custom = 4,
}

impl From<ActivityKind> for i32 {
	fn from(kind: ActivityKind) -> Self {
		kind as i32
	}
}

/// Start/end unix timestamps (ms) rendered as elapsed/remaining time.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Timestamps {
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub start: Option<i64>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub end: Option<i64>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Emoji {
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub name: Option<String>,
	/// Snowflake id, kept as a string.
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub id: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Party {
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub id: Option<String>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub size: Option<u32>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub max: Option<u32>,
}

/// Image keys and hover texts.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Assets {
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub large_image: Option<String>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub large_text: Option<String>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub small_image: Option<String>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub small_text: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Secrets {
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub join: Option<String>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub spectate: Option<String>,
	#[serde(default, skip_serializing_if = "Option::is_none", rename = "match")]
	pub match_secret: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Button {
	pub label: String,
	pub url: String,
}

impl Button {
	pub fn new(label: impl Into<String>, url: impl Into<String>) -> Self {
		Self {
			label: label.into(),
			url: url.into(),
		}
	}
}

/// The presence document pushed with every `SET_ACTIVITY` command.
///
/// `Default` yields sentinel values (`name = ""`, `kind = -1`,
/// `created_at = -1`) that fail [`Activity::validate`]. Nothing is checked on
/// construction or assignment; validity only matters when a session is about
/// to send the document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Activity {
	pub name: String,
	#[serde(rename = "type")]
	pub kind: i32,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub url: Option<String>,
	pub created_at: i64,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub timestamps: Option<Timestamps>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub status_display_type: Option<i32>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub details: Option<String>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub details_url: Option<String>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub state: Option<String>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub state_url: Option<String>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub emoji: Option<Emoji>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub party: Option<Party>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub assets: Option<Assets>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub secrets: Option<Secrets>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub instance: Option<bool>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub flags: Option<u32>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub buttons: Option<Vec<Button>>,
}

impl Default for Activity {
	fn default() -> Self {
		Self {
			name: String::new(),
			kind: -1,
			url: None,
			created_at: -1,
			timestamps: None,
			status_display_type: None,
			details: None,
			details_url: None,
			state: None,
			state_url: None,
			emoji: None,
			party: None,
			assets: None,
			secrets: None,
			instance: None,
			flags: None,
			buttons: None,
		}
	}
}

/// Required-field violation found by [`Activity::validate`].
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{reason}")]
pub struct InvalidActivity {
	pub reason: String,
}

impl Activity {
	/// Creates a valid activity stamped with the current time.
	pub fn new(name: impl Into<String>, kind: ActivityKind) -> Self {
		Self {
			name: name.into(),
			kind: kind.into(),
			created_at: unix_millis(),
			..Self::default()
		}
	}

	pub fn with_details(mut self, details: impl Into<String>) -> Self {
		self.details = Some(details.into());
		self
	}

	pub fn with_state(mut self, state: impl Into<String>) -> Self {
		self.state = Some(state.into());
		self
	}

	pub fn with_timestamps(mut self, start: Option<i64>, end: Option<i64>) -> Self {
		self.timestamps = Some(Timestamps { start, end });
		self
	}

	pub fn with_assets(mut self, assets: Assets) -> Self {
		self.assets = Some(assets);
		self
	}

	pub fn with_party(mut self, party: Party) -> Self {
		self.party = Some(party);
		self
	}

	pub fn with_button(mut self, button: Button) -> Self {
		self.buttons.get_or_insert_with(Vec::new).push(button);
		self
	}

	/// Checks the required fields.
	pub fn validate(&self) -> Result<(), InvalidActivity> {
		if self.name.is_empty() {
			return Err(invalid("'name' is required"));
		}
		if !(MIN_ACTIVITY_KIND..=MAX_ACTIVITY_KIND).contains(&self.kind) {
			return Err(invalid(format!(
				"'type' is required to be between {MIN_ACTIVITY_KIND} and {MAX_ACTIVITY_KIND} (inclusive), got {}",
				self.kind
			)));
		}
		if self.created_at < 0 {
			return Err(invalid(format!("'created_at' is negative ({})", self.created_at)));
		}
		Ok(())
	}
}

fn invalid(reason: impl Into<String>) -> InvalidActivity {
	InvalidActivity { reason: reason.into() }
}

/// Milliseconds since the unix epoch, saturating at 0 for clocks set before it.
pub fn unix_millis() -> i64 {
	SystemTime::now()
		.duration_since(UNIX_EPOCH)
		.map(|d| i64::try_from(d.as_millis()).unwrap_or(i64::MAX))
		.unwrap_or(0)
}
