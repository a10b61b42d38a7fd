//! The activity held by a session and the payload built from it.

use parking_lot::Mutex;
use presence_protocol::Activity;
use serde_json::Value;

use crate::error::{Error, Result};

/// Latest activity, shared between the application and the session loop.
///
/// Writes replace the document wholesale. Payloads are validated and
/// serialized while the lock is held, so a concurrent [`ActivityStore::set`]
/// lands either entirely before or entirely after a build.
#[derive(Debug, Default)]
pub struct ActivityStore {
	current: Mutex<Activity>,
}

impl ActivityStore {
	pub fn new(activity: Activity) -> Self {
		Self {
			current: Mutex::new(activity),
		}
	}

	/// Replaces the held activity. No validation happens here.
	pub fn set(&self, activity: Activity) {
		*self.current.lock() = activity;
	}

	/// Copy of the held activity.
	pub fn snapshot(&self) -> Activity {
		self.current.lock().clone()
	}

	/// Checks the held activity's required fields.
	pub fn validate(&self) -> Result<()> {
		self.current.lock().validate().map_err(Error::from)
	}

	/// Validates and serializes the held activity into its wire shape.
	pub fn build_payload(&self) -> Result<Value> {
		let current = self.current.lock();
		current.validate()?;
		serde_json::to_value(&*current).map_err(|err| Error::InvalidActivity { reason: err.to_string() })
	}
}
