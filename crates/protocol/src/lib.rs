//! Wire types for the local presence RPC protocol.
//!
//! This crate contains the serde-serializable documents exchanged with the
//! presence peer over its local IPC socket, and the binary frame codec that
//! carries them.
//!
//! # Design Philosophy
//!
//! Types in this crate are:
//! * Pure data: No I/O, no behavior beyond (de)serialization and validation
//! * 1:1 with the wire: Field names and optionality match what the peer expects
//! * Stable: Changes only when the wire protocol changes
//!
//! Connection handling lives in `presence-runtime`, the session state machine
//! in `presence-rs`.

pub mod activity;
pub mod frame;
pub mod message;

pub use activity::*;
pub use frame::{FRAME_HEADER_LEN, Frame, FrameError, FrameHeader, MAX_FRAME_LEN, Opcode, decode_frame, encode_frame};
pub use message::*;
