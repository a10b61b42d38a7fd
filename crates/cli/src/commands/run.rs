//! `presence run`: publish one activity until interrupted.

use std::path::Path;
use std::time::Duration;

use anyhow::{Context, Result};
use presence::{Activity, Callbacks, FixedLocator, Session, SessionConfig, unix_millis};
use serde_json::Value;
use tracing::{debug, error, info, warn};

use crate::cli::RunArgs;

pub(super) async fn execute(args: RunArgs) -> Result<()> {
	let activity = load_activity(&args.activity)?;
	let config = session_config(&args)?;

	let mut builder = Session::builder(args.client_id.clone()).events(log_events(config)).activity(activity);
	if let Some(socket) = args.socket.clone() {
		builder = builder.locator(FixedLocator(socket));
	}
	let session = builder.build();
	let run = session.run(config);

	let interrupt = session.clone();
	tokio::spawn(async move {
		match tokio::signal::ctrl_c().await {
			Ok(()) => {
				info!(target = "presence", "interrupt received, stopping");
				interrupt.stop();
			}
			Err(err) => warn!(target = "presence", error = %err, "cannot listen for ctrl-c"),
		}
	});

	run.await.context("presence session ended")
}

/// Reads an activity document in wire shape (`type` key, snake_case fields).
///
/// A missing `created_at` is stamped with the current time.
pub fn load_activity(path: &Path) -> Result<Activity> {
	let text = std::fs::read_to_string(path).with_context(|| format!("failed to read {}", path.display()))?;
	let mut document: Value = serde_json::from_str(&text).with_context(|| format!("{} is not valid JSON", path.display()))?;

	if let Some(fields) = document.as_object_mut() {
		fields.entry("created_at").or_insert_with(|| Value::from(unix_millis()));
	}

	let activity: Activity =
		serde_json::from_value(document).with_context(|| format!("{} is not an activity document", path.display()))?;
	activity
		.validate()
		.with_context(|| format!("invalid activity in {}", path.display()))?;
	Ok(activity)
}

/// Config file (if any), then command-line overrides.
pub fn session_config(args: &RunArgs) -> Result<SessionConfig> {
	let mut config = match &args.config {
		Some(path) => load_config(path)?,
		None => SessionConfig::default(),
	};

	if let Some(ms) = args.interval_ms {
		config.update_interval = Duration::from_millis(ms);
	}
	if args.no_retry {
		config.retry = false;
	}
	if let Some(ms) = args.retry_delay_ms {
		config.retry_delay = Duration::from_millis(ms);
	}
	Ok(config)
}

pub fn load_config(path: &Path) -> Result<SessionConfig> {
	let text = std::fs::read_to_string(path).with_context(|| format!("failed to read {}", path.display()))?;
	serde_json::from_str(&text).with_context(|| format!("invalid session config in {}", path.display()))
}

fn log_events(config: SessionConfig) -> Callbacks {
	Callbacks::new()
		.on_connect(|| info!(target = "presence", "connected"))
		.on_handshake(|| info!(target = "presence", "handshake accepted"))
		.on_activity_set(|| debug!(target = "presence", "activity updated"))
		.on_disconnect(|| info!(target = "presence", "disconnected"))
		.on_error(move |err| {
			if err.ends_run(&config) {
				error!(target = "presence", error = %err, "session error");
			} else {
				warn!(target = "presence", error = %err, "session error");
			}
		})
}
