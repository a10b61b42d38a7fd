//! IPC plumbing for the presence client: the socket transport and the
//! endpoint locator that finds the peer's socket.

pub mod locator;
pub mod transport;

pub use locator::{EndpointLocator, FixedLocator, SocketLocator};
pub use transport::{IpcStream, Transport, TransportError};
