//! Framed transport over the peer's local stream socket.
//!
//! A [`Transport`] owns exactly one connection. The stream is split on
//! construction: the write half stays with the transport for [`Transport::send`],
//! the read half moves into a background task that decodes frames and hands
//! them over an unbounded channel. Receiving from the channel is
//! cancellation-safe, so callers can race [`Transport::receive`] against
//! timers and stop signals without losing a half-read frame.
//!
//! There are no timeouts in here; the caller decides how long to wait.

use std::path::{Path, PathBuf};

use presence_protocol::{FRAME_HEADER_LEN, Frame, FrameError, FrameHeader, encode_frame};
use serde::Serialize;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt, ReadHalf, WriteHalf};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, trace};

/// Platform stream used to reach the peer.
#[cfg(unix)]
pub type IpcStream = tokio::net::UnixStream;
/// Platform stream used to reach the peer.
#[cfg(windows)]
pub type IpcStream = tokio::net::windows::named_pipe::NamedPipeClient;

#[derive(Debug, thiserror::Error)]
pub enum TransportError {
	#[error("failed to connect to {}: {source}", path.display())]
	Connect {
		path: PathBuf,
		#[source]
		source: std::io::Error,
	},
	#[error("write failed: {0}")]
	Write(#[source] std::io::Error),
	#[error("read failed: {0}")]
	Read(#[source] std::io::Error),
	#[error("connection closed")]
	Closed,
	#[error("malformed frame: {0}")]
	Malformed(#[from] FrameError),
}

type Inbound = Result<Frame, TransportError>;

/// One live connection to the peer.
pub struct Transport<S = IpcStream> {
	writer: Option<WriteHalf<S>>,
	inbound: mpsc::UnboundedReceiver<Inbound>,
	reader: JoinHandle<()>,
}

impl Transport<IpcStream> {
	/// Opens the peer socket at `path`.
	#[cfg(unix)]
	pub async fn connect(path: &Path) -> Result<Self, TransportError> {
		let stream = tokio::net::UnixStream::connect(path).await.map_err(|source| TransportError::Connect {
			path: path.to_path_buf(),
			source,
		})?;
		debug!(target = "presence.transport", path = %path.display(), "connected");
		Ok(Self::new(stream))
	}

	/// Opens the peer named pipe at `path`.
	#[cfg(windows)]
	pub async fn connect(path: &Path) -> Result<Self, TransportError> {
		let stream = tokio::net::windows::named_pipe::ClientOptions::new()
			.open(path)
			.map_err(|source| TransportError::Connect {
				path: path.to_path_buf(),
				source,
			})?;
		debug!(target = "presence.transport", path = %path.display(), "connected");
		Ok(Self::new(stream))
	}
}

impl<S> Transport<S>
where
	S: AsyncRead + AsyncWrite + Send + 'static,
{
	/// Wraps an already connected stream. Must be called inside a tokio runtime.
	pub fn new(stream: S) -> Self {
		let (read_half, write_half) = tokio::io::split(stream);
		let (tx, inbound) = mpsc::unbounded_channel();
		let reader = tokio::spawn(read_loop(read_half, tx));
		Self {
			writer: Some(write_half),
			inbound,
			reader,
		}
	}

	/// Writes the whole buffer. A short write is an error, never a partial success.
	pub async fn send(&mut self, bytes: &[u8]) -> Result<(), TransportError> {
		let writer = self.writer.as_mut().ok_or(TransportError::Closed)?;
		writer.write_all(bytes).await.map_err(TransportError::Write)?;
		writer.flush().await.map_err(TransportError::Write)
	}

	/// Encodes `document` and sends it as one frame.
	pub async fn send_frame<T>(&mut self, opcode: impl Into<i32>, document: &T) -> Result<(), TransportError>
	where
		T: Serialize + ?Sized,
	{
		let opcode = opcode.into();
		let bytes = encode_frame(opcode, document)?;
		trace!(target = "presence.transport", opcode, len = bytes.len(), "send frame");
		self.send(&bytes).await
	}

	/// Next frame from the peer.
	///
	/// Returns [`TransportError::Closed`] once the peer has hung up and every
	/// buffered frame has been delivered.
	pub async fn receive(&mut self) -> Result<Frame, TransportError> {
		match self.inbound.recv().await {
			Some(result) => result,
			None => Err(TransportError::Closed),
		}
	}

	/// Shuts the connection down. Safe to call more than once.
	pub async fn close(&mut self) {
		if let Some(mut writer) = self.writer.take() {
			if let Err(err) = writer.shutdown().await {
				trace!(target = "presence.transport", error = %err, "shutdown failed");
			}
			debug!(target = "presence.transport", "closed");
		}
		self.reader.abort();
		self.inbound.close();
	}

	pub fn is_closed(&self) -> bool {
		self.writer.is_none()
	}
}

impl<S> Drop for Transport<S> {
	fn drop(&mut self) {
		self.reader.abort();
	}
}

async fn read_loop<R>(mut reader: ReadHalf<R>, tx: mpsc::UnboundedSender<Inbound>)
where
	R: AsyncRead,
{
	loop {
		let result = read_frame(&mut reader).await;
		let failed = result.is_err();
		if let Ok(frame) = &result {
			trace!(target = "presence.transport", opcode = frame.opcode, "received frame");
		}
		if tx.send(result).is_err() || failed {
			break;
		}
	}
}

/// Reads one frame: exactly 8 header bytes, then exactly `length` body bytes.
///
/// EOF before the first header byte is [`TransportError::Closed`]; EOF anywhere
/// later is a truncated frame.
pub async fn read_frame<R>(reader: &mut R) -> Result<Frame, TransportError>
where
	R: AsyncRead + Unpin,
{
	let mut head = [0u8; FRAME_HEADER_LEN];
	let got = read_full(reader, &mut head).await?;
	if got == 0 {
		return Err(TransportError::Closed);
	}
	if got < FRAME_HEADER_LEN {
		return Err(FrameError::Truncated {
			expected: FRAME_HEADER_LEN,
			actual: got,
		}
		.into());
	}
	let header = FrameHeader::parse(head)?;

	let mut body = vec![0u8; header.length];
	let got = read_full(reader, &mut body).await?;
	if got < header.length {
		return Err(FrameError::Truncated {
			expected: header.length,
			actual: got,
		}
		.into());
	}
	Ok(Frame::from_body(header, &body)?)
}

async fn read_full<R>(reader: &mut R, buf: &mut [u8]) -> Result<usize, TransportError>
where
	R: AsyncRead + Unpin,
{
	let mut filled = 0;
	while filled < buf.len() {
		let n = reader.read(&mut buf[filled..]).await.map_err(TransportError::Read)?;
		if n == 0 {
			break;
		}
		filled += n;
	}
	Ok(filled)
}
