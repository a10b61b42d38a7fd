//! Handle to a session running on its background thread.

use std::thread::JoinHandle;

use tracing::debug;

use crate::error::{Error, Result};
use crate::session::Session;

/// Owner of a background run started with [`Session::start`].
///
/// The caller decides how the run ends relative to its own shutdown:
/// [`join`](Self::join) waits for it, [`detach`](Self::detach) lets it run
/// unobserved. Dropping the handle without either requests a stop, unless
/// the run already ended, but does not wait.
#[must_use = "dropping the handle stops the session; call detach() to keep it running"]
pub struct SessionHandle {
	session: Session,
	thread: Option<JoinHandle<Result<()>>>,
}

impl SessionHandle {
	pub(crate) fn new(session: Session, thread: JoinHandle<Result<()>>) -> Self {
		Self {
			session,
			thread: Some(thread),
		}
	}

	/// The session being run, e.g. to update its activity.
	pub fn session(&self) -> &Session {
		&self.session
	}

	/// Requests a stop without waiting for it.
	pub fn stop(&self) {
		self.session.stop();
	}

	pub fn is_finished(&self) -> bool {
		self.thread.as_ref().is_none_or(JoinHandle::is_finished)
	}

	/// Blocks until the run ends and returns its outcome.
	pub fn join(mut self) -> Result<()> {
		match self.thread.take() {
			Some(thread) => thread.join().map_err(|_| Error::Panicked)?,
			None => Ok(()),
		}
	}

	/// Requests a stop and waits for the run to end.
	pub fn stop_and_join(self) -> Result<()> {
		self.stop();
		self.join()
	}

	/// Lets the run continue without a handle.
	pub fn detach(mut self) {
		self.thread.take();
	}
}

impl Drop for SessionHandle {
	fn drop(&mut self) {
		// A finished run may have been followed by a new one on the same session.
		if self.thread.as_ref().is_some_and(|thread| !thread.is_finished()) {
			debug!(target = "presence.session", "session handle dropped, stopping");
			self.session.stop();
		}
	}
}

impl std::fmt::Debug for SessionHandle {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.debug_struct("SessionHandle")
			.field("session", &self.session)
			.field("finished", &self.is_finished())
			.finish()
	}
}
