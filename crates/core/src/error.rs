//! Error taxonomy for the presence session.

use std::path::PathBuf;

use presence_protocol::InvalidActivity;
use presence_runtime::TransportError;

use crate::config::SessionConfig;

/// Result type alias for presence operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors raised by a [`Session`](crate::Session).
///
/// Most variants are recoverable and only ever reach the caller through
/// [`SessionEvents::on_error`](crate::SessionEvents::on_error); see
/// [`Error::is_fatal`] for the ones that end a run.
#[derive(Debug, thiserror::Error)]
pub enum Error {
	/// No peer socket exists. Treated as "peer not running", never retried.
	#[error("No Discord socket found")]
	EndpointNotFound,

	#[error("Couldn't connect to Discord at {}: {source}", path.display())]
	Connect {
		path: PathBuf,
		#[source]
		source: std::io::Error,
	},

	/// The peer answered the handshake with something other than READY.
	#[error("Handshake failed: {0}")]
	HandshakeRejected(String),

	/// The handshake reply could not be read or parsed.
	#[error("Handshake failed: {0}")]
	HandshakeMalformed(String),

	#[error("Error sending activity: {0}")]
	Send(#[source] TransportError),

	#[error("Error receiving from Discord: {0}")]
	Receive(#[source] TransportError),

	/// The peer sent a close frame.
	#[error("Discord closed the connection ({code}): {message}")]
	PeerClosed { code: i64, message: String },

	/// The peer rejected a command; the connection stays up.
	#[error("Discord rejected command ({code}): {message}")]
	CommandRejected { code: i64, message: String },

	#[error("Invalid activity: {reason}")]
	InvalidActivity { reason: String },

	/// `run` or `start` was called while the session was already running.
	#[error("session is already running")]
	AlreadyRunning,

	#[error("failed to set up session runtime: {0}")]
	Runtime(#[source] std::io::Error),

	#[error("session thread panicked")]
	Panicked,
}

impl Error {
	/// Whether this error ends the run under every configuration.
	///
	/// [`Error::Connect`] is not listed: it ends the run only when
	/// [`SessionConfig::retry`](crate::SessionConfig::retry) is off, in which
	/// case it is also the error the run resolves to.
	pub fn is_fatal(&self) -> bool {
		matches!(
			self,
			Error::EndpointNotFound | Error::InvalidActivity { .. } | Error::AlreadyRunning | Error::Runtime(_) | Error::Panicked
		)
	}

	/// Whether this error ends a run configured with `config`.
	pub fn ends_run(&self, config: &SessionConfig) -> bool {
		self.is_fatal() || (matches!(self, Error::Connect { .. }) && !config.retry)
	}
}

impl From<InvalidActivity> for Error {
	fn from(err: InvalidActivity) -> Self {
		Error::InvalidActivity { reason: err.reason }
	}
}

impl From<TransportError> for Error {
	fn from(err: TransportError) -> Self {
		match err {
			TransportError::Connect { path, source } => Error::Connect { path, source },
			other => Error::Receive(other),
		}
	}
}
