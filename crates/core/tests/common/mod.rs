//! Fake presence peer and event recorder shared by session tests.

#![allow(dead_code)]

use std::net::Shutdown;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use presence::{Error, SessionEvents};
use presence_protocol::{Frame, Opcode, encode_frame};
use presence_runtime::transport::read_frame;
use serde_json::{Value, json};
use tempfile::TempDir;
use tokio::io::AsyncWriteExt;
use tokio::net::{UnixListener, UnixStream};
use tokio::sync::mpsc;

pub const CLIENT_ID: &str = "1234567890";

/// Lifecycle event as seen by the application.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Seen {
	Connect,
	Disconnect,
	Handshake,
	ActivitySet,
	Error(String),
}

/// Records every event in order.
#[derive(Default)]
pub struct Recorder {
	seen: Mutex<Vec<Seen>>,
}

impl Recorder {
	pub fn new() -> Arc<Self> {
		Arc::new(Self::default())
	}

	pub fn seen(&self) -> Vec<Seen> {
		self.seen.lock().clone()
	}

	pub fn count(&self, event: &Seen) -> usize {
		self.seen.lock().iter().filter(|e| *e == event).count()
	}

	pub fn errors(&self) -> Vec<String> {
		self.seen
			.lock()
			.iter()
			.filter_map(|e| match e {
				Seen::Error(msg) => Some(msg.clone()),
				_ => None,
			})
			.collect()
	}

	fn push(&self, event: Seen) {
		self.seen.lock().push(event);
	}
}

impl SessionEvents for Recorder {
	fn on_connect(&self) {
		self.push(Seen::Connect);
	}

	fn on_disconnect(&self) {
		self.push(Seen::Disconnect);
	}

	fn on_handshake(&self) {
		self.push(Seen::Handshake);
	}

	fn on_activity_set(&self) {
		self.push(Seen::ActivitySet);
	}

	fn on_error(&self, error: &Error) {
		self.push(Seen::Error(error.to_string()));
	}
}

/// How the fake peer answers a handshake.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Reply {
	Ready,
	ErrorEvent,
	Garbage,
	CloseFrame,
	Silent,
}

/// What the fake peer does after the first activity frame on a connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AfterFirst {
	Nothing,
	HangUp,
	Ping,
	RejectCommand,
	/// Shuts down the peer's read side but keeps the connection open, so the
	/// client's next write fails while its reads stay pending.
	StopReading,
}

#[derive(Debug, Clone, Copy)]
pub struct Script {
	pub reply: Reply,
	pub after_first: AfterFirst,
}

impl Script {
	pub fn ready() -> Self {
		Self {
			reply: Reply::Ready,
			after_first: AfterFirst::Nothing,
		}
	}

	pub fn reply(reply: Reply) -> Self {
		Self {
			reply,
			after_first: AfterFirst::Nothing,
		}
	}

	pub fn then(mut self, after_first: AfterFirst) -> Self {
		self.after_first = after_first;
		self
	}
}

/// Something the fake peer observed.
#[derive(Debug, Clone, PartialEq)]
pub enum PeerEvent {
	Accepted(usize),
	Handshake(Value),
	Frame(usize, Frame),
	Closed(usize),
}

/// Unix socket peer speaking the presence protocol. Connection `n` follows
/// `scripts[n]`, or the last script once they run out.
pub struct FakePeer {
	_dir: TempDir,
	path: PathBuf,
	events: mpsc::UnboundedReceiver<PeerEvent>,
	log: Vec<PeerEvent>,
}

impl FakePeer {
	pub fn spawn(scripts: Vec<Script>) -> Self {
		let dir = TempDir::new().expect("temp dir should be created");
		let path = dir.path().join("discord-ipc-0");
		let listener = UnixListener::bind(&path).expect("listener should bind");
		let (tx, events) = mpsc::unbounded_channel();

		tokio::spawn(async move {
			let mut conn = 0usize;
			while let Ok((stream, _)) = listener.accept().await {
				let script = scripts[conn.min(scripts.len() - 1)];
				let _ = tx.send(PeerEvent::Accepted(conn));
				tokio::spawn(serve(conn, stream, script, tx.clone()));
				conn += 1;
			}
		});

		Self {
			_dir: dir,
			path,
			events,
			log: Vec::new(),
		}
	}

	pub fn path(&self) -> &Path {
		&self.path
	}

	/// Waits for an event matching `pred`, keeping everything seen so far.
	pub async fn expect(&mut self, mut pred: impl FnMut(&PeerEvent) -> bool) -> PeerEvent {
		if let Some(found) = self.log.iter().find(|e| pred(e)) {
			return found.clone();
		}
		let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
		loop {
			let event = tokio::time::timeout_at(deadline, self.events.recv())
				.await
				.expect("timed out waiting for peer event")
				.expect("peer task ended");
			self.log.push(event.clone());
			if pred(&event) {
				return event;
			}
		}
	}

	/// Everything observed so far, draining pending events.
	pub fn drain(&mut self) -> Vec<PeerEvent> {
		while let Ok(event) = self.events.try_recv() {
			self.log.push(event);
		}
		self.log.clone()
	}

	pub fn activity_frames(&mut self) -> Vec<Frame> {
		self.drain()
			.into_iter()
			.filter_map(|e| match e {
				PeerEvent::Frame(_, frame) if frame.payload["cmd"] == "SET_ACTIVITY" => Some(frame),
				_ => None,
			})
			.collect()
	}

	pub fn accepted(&mut self) -> usize {
		self.drain().iter().filter(|e| matches!(e, PeerEvent::Accepted(_))).count()
	}
}

async fn serve(conn: usize, mut stream: UnixStream, script: Script, tx: mpsc::UnboundedSender<PeerEvent>) {
	let Ok(hello) = read_frame(&mut stream).await else {
		let _ = tx.send(PeerEvent::Closed(conn));
		return;
	};
	let _ = tx.send(PeerEvent::Handshake(hello.payload));

	match script.reply {
		Reply::Ready => {
			write(
				&mut stream,
				Opcode::Frame,
				&json!({"cmd": "DISPATCH", "evt": "READY", "data": {"v": 1, "user": {"id": "1", "username": "ferris"}}}),
			)
			.await
		}
		Reply::ErrorEvent => {
			write(
				&mut stream,
				Opcode::Frame,
				&json!({"cmd": "DISPATCH", "evt": "ERROR", "data": {"code": 4000, "message": "Invalid Client ID"}}),
			)
			.await
		}
		Reply::CloseFrame => write(&mut stream, Opcode::Close, &json!({"code": 4000, "message": "Invalid Client ID"})).await,
		Reply::Garbage => {
			let mut bytes = Vec::new();
			bytes.extend_from_slice(&1i32.to_le_bytes());
			bytes.extend_from_slice(&4i32.to_le_bytes());
			bytes.extend_from_slice(b"{{{{");
			let _ = stream.write_all(&bytes).await;
		}
		Reply::Silent => {}
	}

	let mut first = true;
	loop {
		match read_frame(&mut stream).await {
			Ok(frame) => {
				let nonce = frame.payload["nonce"].clone();
				let _ = tx.send(PeerEvent::Frame(conn, frame));
				if first {
					first = false;
					match script.after_first {
						AfterFirst::Nothing => {}
						AfterFirst::HangUp => break,
						AfterFirst::StopReading => {
							if let Ok(held) = stop_reading(stream) {
								tokio::time::sleep(Duration::from_secs(5)).await;
								drop(held);
							}
							let _ = tx.send(PeerEvent::Closed(conn));
							return;
						}
						AfterFirst::Ping => write(&mut stream, Opcode::Ping, &json!({"ping": 1})).await,
						AfterFirst::RejectCommand => {
							write(
								&mut stream,
								Opcode::Frame,
								&json!({"cmd": "SET_ACTIVITY", "evt": "ERROR", "nonce": nonce, "data": {"code": 4002, "message": "rate limited"}}),
							)
							.await
						}
					}
				}
			}
			Err(_) => break,
		}
	}
	let _ = tx.send(PeerEvent::Closed(conn));
}

fn stop_reading(stream: UnixStream) -> std::io::Result<UnixStream> {
	let stream = stream.into_std()?;
	stream.shutdown(Shutdown::Read)?;
	UnixStream::from_std(stream)
}

async fn write(stream: &mut UnixStream, opcode: Opcode, document: &Value) {
	let bytes = encode_frame(opcode, document).expect("frame should encode");
	let _ = stream.write_all(&bytes).await;
}

/// Polls `cond` until it holds, panicking after five seconds.
pub async fn eventually(what: &str, mut cond: impl FnMut() -> bool) {
	let result = tokio::time::timeout(Duration::from_secs(5), async {
		while !cond() {
			tokio::time::sleep(Duration::from_millis(5)).await;
		}
	})
	.await;
	assert!(result.is_ok(), "timed out waiting for: {what}");
}
