//! Frame codec: 8-byte header + JSON document.
//!
//! Every message on the IPC socket is one frame:
//!
//! ```text
//! +----------------+----------------+------------------------+
//! | opcode: i32 LE | length: i32 LE | length bytes of JSON   |
//! +----------------+----------------+------------------------+
//! ```
//!
//! The header is two signed 32-bit little-endian integers with no padding,
//! followed by exactly `length` bytes of UTF-8 JSON with no terminator. This
//! is the peer's native layout on every platform it ships on, so the byte
//! order is fixed here rather than taken from the host.

use serde::Serialize;
use serde_json::Value;

/// Size of the fixed frame header in bytes.
pub const FRAME_HEADER_LEN: usize = 8;

/// Largest payload accepted in either direction (16 MiB).
pub const MAX_FRAME_LEN: usize = 16 * 1024 * 1024;

/// Frame purpose tag.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(i32)]
pub enum Opcode {
	Handshake = 0,
	Frame = 1,
	Close = 2,
	Ping = 3,
	Pong = 4,
}

impl Opcode {
	pub fn code(self) -> i32 {
		self as i32
	}
}

impl From<Opcode> for i32 {
	fn from(op: Opcode) -> Self {
		op.code()
	}
}

impl TryFrom<i32> for Opcode {
	type Error = i32;

	fn try_from(value: i32) -> Result<Self, Self::Error> {
		match value {
			0 => Ok(Self::Handshake),
			1 => Ok(Self::Frame),
			2 => Ok(Self::Close),
			3 => Ok(Self::Ping),
			4 => Ok(Self::Pong),
			other => Err(other),
		}
	}
}

/// Decoding/encoding failure. Every variant means the frame is malformed;
/// no partially decoded document is ever returned.
#[derive(Debug, thiserror::Error)]
pub enum FrameError {
	#[error("truncated frame: expected {expected} bytes, got {actual}")]
	Truncated { expected: usize, actual: usize },
	#[error("{0} trailing bytes after frame")]
	TrailingBytes(usize),
	#[error("invalid frame length {0}")]
	InvalidLength(i32),
	#[error("frame payload of {0} bytes exceeds limit")]
	TooLarge(usize),
	#[error("invalid frame payload: {0}")]
	Json(#[from] serde_json::Error),
}

/// Decoded fixed-size header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameHeader {
	pub opcode: i32,
	pub length: usize,
}

impl FrameHeader {
	/// Parses a header, rejecting negative or oversized lengths.
	pub fn parse(bytes: [u8; FRAME_HEADER_LEN]) -> Result<Self, FrameError> {
		let opcode = i32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]);
		let raw_len = i32::from_le_bytes([bytes[4], bytes[5], bytes[6], bytes[7]]);
		let length = usize::try_from(raw_len).map_err(|_| FrameError::InvalidLength(raw_len))?;
		if length > MAX_FRAME_LEN {
			return Err(FrameError::TooLarge(length));
		}
		Ok(Self { opcode, length })
	}

	pub fn to_bytes(self) -> [u8; FRAME_HEADER_LEN] {
		let mut out = [0u8; FRAME_HEADER_LEN];
		out[..4].copy_from_slice(&self.opcode.to_le_bytes());
		// `length` is bounded by MAX_FRAME_LEN, which fits in i32.
		out[4..].copy_from_slice(&(self.length as i32).to_le_bytes());
		out
	}
}

/// One decoded frame.
#[derive(Debug, Clone, PartialEq)]
pub struct Frame {
	pub opcode: i32,
	pub payload: Value,
}

impl Frame {
	pub fn new(opcode: impl Into<i32>, payload: Value) -> Self {
		Self {
			opcode: opcode.into(),
			payload,
		}
	}

	/// Known opcode, or `None` for values outside the protocol table.
	pub fn op(&self) -> Option<Opcode> {
		Opcode::try_from(self.opcode).ok()
	}

	/// Parses the body that follows `header`. `body` must be exactly `header.length` bytes.
	pub fn from_body(header: FrameHeader, body: &[u8]) -> Result<Self, FrameError> {
		if body.len() != header.length {
			return Err(FrameError::Truncated {
				expected: header.length,
				actual: body.len(),
			});
		}
		let payload = serde_json::from_slice(body)?;
		Ok(Self {
			opcode: header.opcode,
			payload,
		})
	}
}

/// Encodes `document` as a single frame tagged with `opcode`.
pub fn encode_frame<T: Serialize + ?Sized>(opcode: impl Into<i32>, document: &T) -> Result<Vec<u8>, FrameError> {
	let payload = serde_json::to_vec(document)?;
	if payload.len() > MAX_FRAME_LEN {
		return Err(FrameError::TooLarge(payload.len()));
	}
	let header = FrameHeader {
		opcode: opcode.into(),
		length: payload.len(),
	};
	let mut out = Vec::with_capacity(FRAME_HEADER_LEN + payload.len());
	out.extend_from_slice(&header.to_bytes());
	out.extend_from_slice(&payload);
	Ok(out)
}

/// Decodes a buffer holding exactly one frame.
pub fn decode_frame(bytes: &[u8]) -> Result<Frame, FrameError> {
	let Some((head, rest)) = bytes.split_first_chunk::<FRAME_HEADER_LEN>() else {
		return Err(FrameError::Truncated {
			expected: FRAME_HEADER_LEN,
			actual: bytes.len(),
		});
	};
	let header = FrameHeader::parse(*head)?;
	if rest.len() < header.length {
		return Err(FrameError::Truncated {
			expected: header.length,
			actual: rest.len(),
		});
	}
	if rest.len() > header.length {
		return Err(FrameError::TrailingBytes(rest.len() - header.length));
	}
	Frame::from_body(header, rest)
}
