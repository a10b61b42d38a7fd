//! Session state machine.
//!
//! A [`Session`] drives one logical connection to the peer:
//!
//! ```text
//! Idle -> Locating -> Connecting -> Handshaking -> Active -> Closing
//!                        ^              |             |         |
//!                        +--------------+-------------+---------+  (reconnect)
//! ```
//!
//! Each step owns the transport it operates on and hands it to the next step
//! by value, so there is never more than one live connection and nothing
//! outside the current step can touch it.
//!
//! # Stop semantics
//!
//! [`Session::stop`] flips a watch channel. The flag is sampled before every
//! step, and both suspension points (connect backoff and the update interval)
//! race their timer against it, so a stop never waits out a sleep.
//!
//! # Retry policy
//!
//! | Failure | Behavior |
//! |---------|----------|
//! | no socket found | fatal, reported once |
//! | connect failed | retry after `retry_delay` if `retry`, else fatal |
//! | handshake rejected/malformed | close, back off, reconnect (ignores `retry`) |
//! | send/receive failed, peer closed | close, reconnect |
//! | invalid activity | fatal, no frame is sent for it |

use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::Duration;

use parking_lot::{Mutex, RwLock};
use presence_protocol::{Activity, Command, ErrorData, Frame, Handshake, Incoming, Opcode};
use presence_runtime::{EndpointLocator, SocketLocator, Transport};
use tokio::sync::watch;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::activity::ActivityStore;
use crate::config::{SessionConfig, whole_millis};
use crate::error::{Error, Result};
use crate::events::{NoopEvents, SessionEvents, dispatch};
use crate::handle::SessionHandle;

/// Where the state machine currently is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SessionState {
	Idle,
	Locating,
	Connecting,
	Handshaking,
	Active,
	Closing,
}

/// Presence client for one application id.
///
/// Cheap to clone; clones share the same activity, configuration and run.
#[derive(Clone)]
pub struct Session {
	inner: Arc<Inner>,
}

struct Inner {
	client_id: String,
	pid: u32,
	activity: ActivityStore,
	config: RwLock<SessionConfig>,
	events: Arc<dyn SessionEvents>,
	locator: Arc<dyn EndpointLocator>,
	stop_tx: watch::Sender<bool>,
	running: AtomicBool,
	state: Mutex<SessionState>,
	nonce: AtomicU64,
}

/// Builder for [`Session`] with non-default collaborators.
pub struct SessionBuilder {
	client_id: String,
	activity: Activity,
	config: SessionConfig,
	events: Arc<dyn SessionEvents>,
	locator: Arc<dyn EndpointLocator>,
}

impl SessionBuilder {
	pub fn events(mut self, events: impl SessionEvents + 'static) -> Self {
		self.events = Arc::new(events);
		self
	}

	pub fn shared_events(mut self, events: Arc<dyn SessionEvents>) -> Self {
		self.events = events;
		self
	}

	pub fn locator(mut self, locator: impl EndpointLocator + 'static) -> Self {
		self.locator = Arc::new(locator);
		self
	}

	pub fn activity(mut self, activity: Activity) -> Self {
		self.activity = activity;
		self
	}

	pub fn config(mut self, config: SessionConfig) -> Self {
		self.config = config;
		self
	}

	pub fn build(self) -> Session {
		let (stop_tx, _) = watch::channel(false);
		Session {
			inner: Arc::new(Inner {
				client_id: self.client_id,
				pid: std::process::id(),
				activity: ActivityStore::new(self.activity),
				config: RwLock::new(self.config),
				events: self.events,
				locator: self.locator,
				stop_tx,
				running: AtomicBool::new(false),
				state: Mutex::new(SessionState::Idle),
				nonce: AtomicU64::new(0),
			}),
		}
	}
}

impl Session {
	/// Session with the filesystem socket locator and no event handlers.
	pub fn new(client_id: impl Into<String>) -> Self {
		Self::builder(client_id).build()
	}

	pub fn builder(client_id: impl Into<String>) -> SessionBuilder {
		SessionBuilder {
			client_id: client_id.into(),
			activity: Activity::default(),
			config: SessionConfig::default(),
			events: Arc::new(NoopEvents),
			locator: Arc::new(SocketLocator::new()),
		}
	}

	pub fn client_id(&self) -> &str {
		&self.inner.client_id
	}

	/// Replaces the activity pushed on the next update.
	///
	/// The activity is not validated here; an invalid one surfaces as
	/// [`Error::InvalidActivity`] when the session next tries to send it.
	pub fn set_activity(&self, activity: Activity) {
		self.inner.activity.set(activity);
	}

	/// Copy of the current activity.
	pub fn activity(&self) -> Activity {
		self.inner.activity.snapshot()
	}

	pub fn config(&self) -> SessionConfig {
		*self.inner.config.read()
	}

	/// Takes effect after the current interval elapses.
	pub fn set_update_interval(&self, interval: Duration) {
		let mut config = self.inner.config.write();
		config.update_interval = interval;
		config.warn_if_aggressive();
	}

	/// Takes effect on the next failed connection attempt.
	pub fn set_retry(&self, retry: bool) {
		self.inner.config.write().retry = retry;
	}

	pub fn set_retry_delay(&self, delay: Duration) {
		self.inner.config.write().retry_delay = delay;
	}

	pub fn set_handshake_timeout(&self, timeout: Duration) {
		self.inner.config.write().handshake_timeout = timeout;
	}

	pub fn state(&self) -> SessionState {
		*self.inner.state.lock()
	}

	pub fn is_running(&self) -> bool {
		self.inner.running.load(Ordering::SeqCst)
	}

	/// Asks the running loop to wind down. Idempotent and callable from any
	/// thread; returns before the connection is closed.
	pub fn stop(&self) {
		if !self.inner.stop_tx.send_replace(true) {
			debug!(target = "presence.session", "stop requested");
		}
	}

	/// Claims the session and returns a future that runs the state machine
	/// until stopped or a fatal error occurs.
	///
	/// The claim happens here, not on first poll: a [`Session::stop`] issued
	/// after this call ends the returned future even if it has not been polled
	/// yet. The future is `'static` and can be handed to `tokio::spawn`.
	///
	/// Resolves to `Ok(())` after [`Session::stop`], or the fatal error.
	pub fn run(&self, config: SessionConfig) -> impl Future<Output = Result<()>> + Send + 'static {
		let claimed = self.acquire();
		let inner = Arc::clone(&self.inner);
		async move {
			let guard = claimed?;
			inner.drive(config, guard).await
		}
	}

	/// Blocking form of [`Session::run`] on a private current-thread runtime.
	///
	/// Must not be called from inside a tokio runtime.
	pub fn run_blocking(&self, config: SessionConfig) -> Result<()> {
		let guard = self.acquire()?;
		let runtime = build_runtime()?;
		runtime.block_on(Arc::clone(&self.inner).drive(config, guard))
	}

	/// Runs the state machine on a dedicated background thread.
	pub fn start(&self, config: SessionConfig) -> Result<SessionHandle> {
		let guard = self.acquire()?;
		let runtime = build_runtime()?;
		let inner = Arc::clone(&self.inner);
		let thread = std::thread::Builder::new()
			.name("presence-session".to_string())
			.spawn(move || runtime.block_on(inner.drive(config, guard)))
			.map_err(Error::Runtime)?;
		Ok(SessionHandle::new(self.clone(), thread))
	}

	fn acquire(&self) -> Result<RunGuard> {
		if self
			.inner
			.running
			.compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
			.is_err()
		{
			return Err(Error::AlreadyRunning);
		}
		self.inner.stop_tx.send_replace(false);
		Ok(RunGuard {
			inner: Arc::clone(&self.inner),
		})
	}
}

impl std::fmt::Debug for Session {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.debug_struct("Session")
			.field("client_id", &self.inner.client_id)
			.field("state", &self.state())
			.field("running", &self.is_running())
			.finish()
	}
}

fn build_runtime() -> Result<tokio::runtime::Runtime> {
	tokio::runtime::Builder::new_current_thread().enable_all().build().map_err(Error::Runtime)
}

/// Marks the session as running for as long as a drive is in progress.
struct RunGuard {
	inner: Arc<Inner>,
}

impl Drop for RunGuard {
	fn drop(&mut self) {
		*self.inner.state.lock() = SessionState::Idle;
		self.inner.running.store(false, Ordering::SeqCst);
	}
}

/// What Closing does once the transport is down.
enum AfterClose {
	Reconnect,
	Backoff,
	Finish(Result<()>),
}

enum Step {
	Locate,
	Connect {
		path: PathBuf,
	},
	Handshake {
		path: PathBuf,
		transport: Transport,
	},
	Active {
		path: PathBuf,
		transport: Transport,
	},
	Close {
		path: PathBuf,
		transport: Transport,
		then: AfterClose,
	},
	Done(Result<()>),
}

impl Step {
	fn state(&self) -> SessionState {
		match self {
			Step::Locate => SessionState::Locating,
			Step::Connect { .. } => SessionState::Connecting,
			Step::Handshake { .. } => SessionState::Handshaking,
			Step::Active { .. } => SessionState::Active,
			Step::Close { .. } => SessionState::Closing,
			Step::Done(_) => SessionState::Idle,
		}
	}

	/// The step to take instead of `self` once stop has been requested.
	fn stopping(self) -> Step {
		match self {
			Step::Locate | Step::Connect { .. } => Step::Done(Ok(())),
			Step::Handshake { path, transport } | Step::Active { path, transport } => Step::Close {
				path,
				transport,
				then: AfterClose::Finish(Ok(())),
			},
			other => other,
		}
	}
}

impl Inner {
	async fn drive(self: Arc<Self>, config: SessionConfig, _guard: RunGuard) -> Result<()> {
		*self.config.write() = config;
		config.warn_if_aggressive();
		info!(
			target = "presence.session",
			client_id = %self.client_id,
			interval_ms = whole_millis(config.update_interval),
			retry = config.retry,
			"session starting"
		);

		let mut step = Step::Locate;
		loop {
			if self.stop_requested() {
				step = step.stopping();
			}
			self.enter(step.state());
			step = match step {
				Step::Locate => self.locate().await,
				Step::Connect { path } => self.connect(path).await,
				Step::Handshake { path, transport } => self.handshake(path, transport).await,
				Step::Active { path, transport } => self.active(path, transport).await,
				Step::Close { path, transport, then } => self.close(path, transport, then).await,
				Step::Done(outcome) => {
					match &outcome {
						Ok(()) => info!(target = "presence.session", "session stopped"),
						Err(err) => warn!(target = "presence.session", error = %err, "session ended"),
					}
					return outcome;
				}
			};
		}
	}

	async fn locate(&self) -> Step {
		if let Err(err) = self.activity.validate() {
			self.report(&err);
			return Step::Done(Err(err));
		}

		let locator = Arc::clone(&self.locator);
		let mut stop = self.stop_tx.subscribe();
		let found = tokio::select! {
			found = tokio::task::spawn_blocking(move || locator.locate()) => found.unwrap_or_else(|err| {
				warn!(target = "presence.session", error = %err, "endpoint locator failed");
				None
			}),
			_ = stopped(&mut stop) => return Step::Done(Ok(())),
		};

		match found {
			Some(path) => {
				info!(target = "presence.session", path = %path.display(), "found socket");
				Step::Connect { path }
			}
			None => {
				let err = Error::EndpointNotFound;
				self.report(&err);
				Step::Done(Err(err))
			}
		}
	}

	async fn connect(&self, path: PathBuf) -> Step {
		if let Err(err) = self.activity.validate() {
			self.report(&err);
			return Step::Done(Err(err));
		}

		match Transport::connect(&path).await {
			Ok(transport) => {
				info!(target = "presence.session", path = %path.display(), "connected");
				self.emit("connect", |events| events.on_connect());
				Step::Handshake { path, transport }
			}
			Err(err) => {
				let err = Error::from(err);
				let config = self.current_config();
				self.report(&err);
				if !config.retry {
					return Step::Done(Err(err));
				}
				debug!(
					target = "presence.session",
					delay_ms = whole_millis(config.retry_delay),
					"retrying connect"
				);
				if self.pause(config.retry_delay).await {
					return Step::Done(Ok(()));
				}
				Step::Connect { path }
			}
		}
	}

	async fn handshake(&self, path: PathBuf, mut transport: Transport) -> Step {
		if let Err(err) = transport.send_frame(Opcode::Handshake, &Handshake::new(&self.client_id)).await {
			self.report(&Error::Send(err));
			return Step::Close {
				path,
				transport,
				then: AfterClose::Backoff,
			};
		}

		let timeout = self.current_config().handshake_timeout;
		let mut stop = self.stop_tx.subscribe();
		let reply = tokio::select! {
			reply = tokio::time::timeout(timeout, transport.receive()) => reply,
			_ = stopped(&mut stop) => {
				return Step::Close { path, transport, then: AfterClose::Finish(Ok(())) };
			}
		};

		let outcome = match reply {
			Err(_) => Err(Error::HandshakeMalformed(format!("no reply within {}ms", timeout.as_millis()))),
			Ok(Err(err)) => Err(Error::HandshakeMalformed(err.to_string())),
			Ok(Ok(frame)) => check_ready(frame),
		};

		match outcome {
			Ok(ready) => {
				match ready.ready_user() {
					Some(user) => info!(target = "presence.session", user = %user.username, "handshake complete"),
					None => info!(target = "presence.session", "handshake complete"),
				}
				self.emit("handshake", |events| events.on_handshake());
				Step::Active { path, transport }
			}
			Err(err) => {
				self.report(&err);
				Step::Close {
					path,
					transport,
					then: AfterClose::Backoff,
				}
			}
		}
	}

	async fn active(&self, path: PathBuf, mut transport: Transport) -> Step {
		let mut stop = self.stop_tx.subscribe();
		loop {
			if self.stop_requested() {
				return Step::Close {
					path,
					transport,
					then: AfterClose::Finish(Ok(())),
				};
			}

			let payload = match self.activity.build_payload() {
				Ok(payload) => payload,
				Err(err) => {
					self.report(&err);
					return Step::Close {
						path,
						transport,
						then: AfterClose::Finish(Err(err)),
					};
				}
			};

			let nonce = self.next_nonce();
			let command = Command::set_activity(self.pid, payload, nonce.clone());
			if let Err(err) = transport.send_frame(Opcode::Frame, &command).await {
				self.report(&Error::Send(err));
				return Step::Close {
					path,
					transport,
					then: AfterClose::Reconnect,
				};
			}
			debug!(target = "presence.session", nonce = %nonce, "activity sent");
			self.emit("activity_set", |events| events.on_activity_set());

			let deadline = Instant::now() + self.current_config().update_interval;
			loop {
				tokio::select! {
					_ = tokio::time::sleep_until(deadline) => break,
					_ = stopped(&mut stop) => {
						return Step::Close { path, transport, then: AfterClose::Finish(Ok(())) };
					}
					inbound = transport.receive() => {
						let handled = match inbound {
							Ok(frame) => self.handle_inbound(&mut transport, frame).await,
							Err(err) => Err(Error::Receive(err)),
						};
						if let Err(err) = handled {
							self.report(&err);
							return Step::Close { path, transport, then: AfterClose::Reconnect };
						}
					}
				}
			}
		}
	}

	/// Handles a frame that arrived between updates. An error means the
	/// connection is lost.
	async fn handle_inbound(&self, transport: &mut Transport, frame: Frame) -> Result<()> {
		match frame.op() {
			Some(Opcode::Ping) => transport.send_frame(Opcode::Pong, &frame.payload).await.map_err(Error::Send),
			Some(Opcode::Pong) => Ok(()),
			Some(Opcode::Close) => {
				let data: ErrorData = serde_json::from_value(frame.payload).unwrap_or_default();
				Err(Error::PeerClosed {
					code: data.code,
					message: data.message,
				})
			}
			_ => {
				match serde_json::from_value::<Incoming>(frame.payload) {
					Ok(reply) if reply.is_error() => {
						let data = reply.error_data().unwrap_or_default();
						self.report(&Error::CommandRejected {
							code: data.code,
							message: data.message,
						});
					}
					Ok(reply) => debug!(
						target = "presence.session",
						cmd = reply.cmd.as_deref().unwrap_or(""),
						evt = reply.evt.as_deref().unwrap_or(""),
						nonce = reply.nonce.as_deref().unwrap_or(""),
						"reply received"
					),
					Err(err) => debug!(target = "presence.session", error = %err, "ignoring unrecognised frame"),
				}
				Ok(())
			}
		}
	}

	async fn close(&self, path: PathBuf, mut transport: Transport, then: AfterClose) -> Step {
		transport.close().await;
		drop(transport);
		info!(target = "presence.session", path = %path.display(), "disconnected");
		self.emit("disconnect", |events| events.on_disconnect());

		match then {
			AfterClose::Finish(outcome) => Step::Done(outcome),
			_ if self.stop_requested() => Step::Done(Ok(())),
			AfterClose::Reconnect => Step::Connect { path },
			AfterClose::Backoff => {
				if self.pause(self.current_config().retry_delay).await {
					Step::Done(Ok(()))
				} else {
					Step::Connect { path }
				}
			}
		}
	}

	fn enter(&self, state: SessionState) {
		let mut current = self.state.lock();
		if *current != state {
			debug!(target = "presence.session", from = ?*current, to = ?state, "state change");
			*current = state;
		}
	}

	fn current_config(&self) -> SessionConfig {
		*self.config.read()
	}

	fn stop_requested(&self) -> bool {
		*self.stop_tx.borrow()
	}

	/// Sleeps for `duration` unless stopped first. Returns true when stopped.
	async fn pause(&self, duration: Duration) -> bool {
		let mut stop = self.stop_tx.subscribe();
		tokio::select! {
			_ = tokio::time::sleep(duration) => self.stop_requested(),
			_ = stopped(&mut stop) => true,
		}
	}

	fn next_nonce(&self) -> String {
		let n = self.nonce.fetch_add(1, Ordering::SeqCst) + 1;
		format!("{}-{}", self.pid, n)
	}

	fn emit(&self, event: &'static str, f: impl FnOnce(&dyn SessionEvents)) {
		let events = self.events.as_ref();
		dispatch(event, || f(events));
	}

	fn report(&self, err: &Error) {
		warn!(target = "presence.session", error = %err, "session error");
		self.emit("error", |events| events.on_error(err));
	}
}

/// Accepts a handshake reply only if it is a READY event.
fn check_ready(frame: Frame) -> Result<Incoming> {
	if frame.op() == Some(Opcode::Close) {
		let data: ErrorData = serde_json::from_value(frame.payload).unwrap_or_default();
		return Err(Error::HandshakeRejected(format!("peer closed ({}): {}", data.code, data.message)));
	}
	let reply: Incoming = serde_json::from_value(frame.payload).map_err(|err| Error::HandshakeMalformed(err.to_string()))?;
	if !reply.is_ready() {
		let evt = reply.evt.as_deref().unwrap_or("none");
		let detail = reply.error_data().map(|d| format!(": {}", d.message)).unwrap_or_default();
		return Err(Error::HandshakeRejected(format!("expected READY, got {evt}{detail}")));
	}
	Ok(reply)
}

/// Resolves once the stop flag is set.
async fn stopped(rx: &mut watch::Receiver<bool>) {
	loop {
		if *rx.borrow_and_update() {
			return;
		}
		if rx.changed().await.is_err() {
			std::future::pending::<()>().await;
		}
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use serde_json::json;

	#[test]
	fn ready_reply_is_accepted() {
		let frame = Frame::new(Opcode::Frame, json!({"cmd": "DISPATCH", "evt": "READY", "data": {"v": 1}}));
		assert!(check_ready(frame).is_ok());
	}

	#[test]
	fn error_reply_is_rejected() {
		let frame = Frame::new(Opcode::Frame, json!({"evt": "ERROR", "data": {"code": 4000, "message": "Invalid Client ID"}}));
		match check_ready(frame) {
			Err(Error::HandshakeRejected(msg)) => assert!(msg.contains("Invalid Client ID"), "{msg}"),
			other => panic!("expected rejection, got {other:?}"),
		}
	}

	#[test]
	fn close_frame_is_rejected() {
		let frame = Frame::new(Opcode::Close, json!({"code": 4000, "message": "Invalid Client ID"}));
		assert!(matches!(check_ready(frame), Err(Error::HandshakeRejected(_))));
	}

	#[test]
	fn non_object_reply_is_malformed() {
		let frame = Frame::new(Opcode::Frame, json!([1, 2, 3]));
		assert!(matches!(check_ready(frame), Err(Error::HandshakeMalformed(_))));
	}

	#[test]
	fn nonces_increase_and_carry_pid() {
		let session = Session::new("1");
		let first = session.inner.next_nonce();
		let second = session.inner.next_nonce();
		let pid = std::process::id();
		assert_eq!(first, format!("{pid}-1"));
		assert_eq!(second, format!("{pid}-2"));
	}

	#[test]
	fn stop_is_idempotent_without_run() {
		let session = Session::new("1");
		session.stop();
		session.stop();
		assert_eq!(session.state(), SessionState::Idle);
		assert!(!session.is_running());
	}

	#[test]
	fn setters_update_config() {
		let session = Session::new("1");
		session.set_update_interval(Duration::from_secs(30));
		session.set_retry(false);
		session.set_retry_delay(Duration::from_millis(250));
		let config = session.config();
		assert_eq!(config.update_interval, Duration::from_secs(30));
		assert!(!config.retry);
		assert_eq!(config.retry_delay, Duration::from_millis(250));
	}

	#[test]
	fn stopping_maps_connected_steps_to_close() {
		assert!(matches!(Step::Locate.stopping(), Step::Done(Ok(()))));
		assert!(matches!(
			Step::Connect {
				path: PathBuf::from("/x")
			}
			.stopping(),
			Step::Done(Ok(()))
		));
	}
}
