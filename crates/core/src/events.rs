//! Lifecycle notifications.
//!
//! A session reports what it is doing through a [`SessionEvents`]
//! implementation. Every method has a no-op default, so an implementor only
//! overrides the events it cares about, and [`NoopEvents`] stands for "no
//! callbacks at all".
//!
//! Events are invoked on the session's own execution context. A panic inside
//! an event handler is caught and logged; it never stops the session.

use std::panic::{AssertUnwindSafe, catch_unwind};

use tracing::warn;

use crate::error::Error;

/// Sink for session lifecycle events.
pub trait SessionEvents: Send + Sync {
	/// The socket connection was established.
	fn on_connect(&self) {}

	/// A connection was closed (after a failure, or on stop).
	fn on_disconnect(&self) {}

	/// The peer accepted the handshake.
	fn on_handshake(&self) {}

	/// An activity update was written to the socket.
	fn on_activity_set(&self) {}

	/// Something went wrong. Recoverable errors are followed by the session's
	/// own retry; fatal ones also end the run.
	fn on_error(&self, _error: &Error) {}
}

/// Ignores every event.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopEvents;

impl SessionEvents for NoopEvents {}

type Hook = Box<dyn Fn() + Send + Sync>;
type ErrorHook = Box<dyn Fn(&Error) + Send + Sync>;

/// Closure-backed [`SessionEvents`].
///
/// ```ignore
/// let events = Callbacks::new()
///     .on_connect(|| println!("connected"))
///     .on_error(|err| eprintln!("{err}"));
/// ```
#[derive(Default)]
pub struct Callbacks {
	connect: Option<Hook>,
	disconnect: Option<Hook>,
	handshake: Option<Hook>,
	activity_set: Option<Hook>,
	error: Option<ErrorHook>,
}

impl Callbacks {
	pub fn new() -> Self {
		Self::default()
	}

	pub fn on_connect(mut self, f: impl Fn() + Send + Sync + 'static) -> Self {
		self.connect = Some(Box::new(f));
		self
	}

	pub fn on_disconnect(mut self, f: impl Fn() + Send + Sync + 'static) -> Self {
		self.disconnect = Some(Box::new(f));
		self
	}

	pub fn on_handshake(mut self, f: impl Fn() + Send + Sync + 'static) -> Self {
		self.handshake = Some(Box::new(f));
		self
	}

	pub fn on_activity_set(mut self, f: impl Fn() + Send + Sync + 'static) -> Self {
		self.activity_set = Some(Box::new(f));
		self
	}

	pub fn on_error(mut self, f: impl Fn(&Error) + Send + Sync + 'static) -> Self {
		self.error = Some(Box::new(f));
		self
	}
}

impl std::fmt::Debug for Callbacks {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.debug_struct("Callbacks")
			.field("connect", &self.connect.is_some())
			.field("disconnect", &self.disconnect.is_some())
			.field("handshake", &self.handshake.is_some())
			.field("activity_set", &self.activity_set.is_some())
			.field("error", &self.error.is_some())
			.finish()
	}
}

impl SessionEvents for Callbacks {
	fn on_connect(&self) {
		if let Some(f) = &self.connect {
			f();
		}
	}

	fn on_disconnect(&self) {
		if let Some(f) = &self.disconnect {
			f();
		}
	}

	fn on_handshake(&self) {
		if let Some(f) = &self.handshake {
			f();
		}
	}

	fn on_activity_set(&self) {
		if let Some(f) = &self.activity_set {
			f();
		}
	}

	fn on_error(&self, error: &Error) {
		if let Some(f) = &self.error {
			f(error);
		}
	}
}

/// Runs one event handler, containing any panic it raises.
pub(crate) fn dispatch(event: &'static str, f: impl FnOnce()) {
	if let Err(payload) = catch_unwind(AssertUnwindSafe(f)) {
		let message = payload
			.downcast_ref::<&str>()
			.map(|s| (*s).to_string())
			.or_else(|| payload.downcast_ref::<String>().cloned())
			.unwrap_or_else(|| "non-string panic payload".to_string());
		warn!(target = "presence.session", event, panic = %message, "event handler panicked");
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use std::sync::Arc;
	use std::sync::atomic::{AtomicUsize, Ordering};

	#[test]
	fn callbacks_invoke_only_registered_hooks() {
		let hits = Arc::new(AtomicUsize::new(0));
		let counter = Arc::clone(&hits);
		let events = Callbacks::new().on_connect(move || {
			counter.fetch_add(1, Ordering::SeqCst);
		});

		SessionEvents::on_connect(&events);
		SessionEvents::on_disconnect(&events);
		SessionEvents::on_error(&events, &Error::EndpointNotFound);

		assert_eq!(hits.load(Ordering::SeqCst), 1);
	}

	#[test]
	fn error_hook_receives_error() {
		let seen = Arc::new(parking_lot::Mutex::new(Vec::new()));
		let sink = Arc::clone(&seen);
		let events = Callbacks::new().on_error(move |err| sink.lock().push(err.to_string()));

		SessionEvents::on_error(&events, &Error::EndpointNotFound);

		assert_eq!(*seen.lock(), vec!["No Discord socket found".to_string()]);
	}

	#[test]
	fn dispatch_contains_panics() {
		let events = Callbacks::new().on_handshake(|| panic!("boom"));
		dispatch("handshake", || SessionEvents::on_handshake(&events));

		let ran = Arc::new(AtomicUsize::new(0));
		let flag = Arc::clone(&ran);
		dispatch("connect", move || {
			flag.fetch_add(1, Ordering::SeqCst);
		});
		assert_eq!(ran.load(Ordering::SeqCst), 1);
	}

	#[test]
	fn noop_events_do_nothing() {
		let events: &dyn SessionEvents = &NoopEvents;
		events.on_connect();
		events.on_error(&Error::AlreadyRunning);
	}
}
