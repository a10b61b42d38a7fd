//! Rich presence client for the local Discord RPC socket.
//!
//! A [`Session`] finds the peer's IPC socket, connects, performs the
//! versioned handshake and then pushes the current [`Activity`] every update
//! interval until stopped, reconnecting on failure.
//!
//! ```ignore
//! use presence::{Activity, ActivityKind, Callbacks, Session, SessionConfig};
//!
//! let session = Session::builder("1234567890")
//!     .events(Callbacks::new().on_error(|err| eprintln!("{err}")))
//!     .build();
//! session.set_activity(Activity::new("Editing", ActivityKind::Playing).with_state("main.rs"));
//!
//! let handle = session.start(SessionConfig::default())?;
//! // ... later
//! handle.stop_and_join()?;
//! ```

pub mod activity;
pub mod config;
pub mod error;
pub mod events;
pub mod handle;
pub mod session;

pub use activity::ActivityStore;
pub use config::SessionConfig;
pub use error::{Error, Result};
pub use events::{Callbacks, NoopEvents, SessionEvents};
pub use handle::SessionHandle;
pub use presence_protocol::{Activity, ActivityKind, Assets, Button, Emoji, Party, Secrets, Timestamps, unix_millis};
pub use presence_runtime::{EndpointLocator, FixedLocator, SocketLocator};
pub use session::{Session, SessionBuilder, SessionState};
