//! Discovery of the peer's IPC socket.
//!
//! The peer listens on `discord-ipc-<n>` (n = 0..=9) inside the user's
//! runtime or temp directory, or inside a sandbox sub-directory of it when
//! installed through Flatpak or Snap. On Windows the same names live in the
//! named-pipe namespace.

use std::path::{Path, PathBuf};

use tracing::{debug, trace};

/// Socket name prefix used by the peer.
pub const SOCKET_PREFIX: &str = "discord-ipc-";
/// Number of socket slots the peer may use.
pub const SOCKET_SLOTS: u8 = 10;

/// Sandbox directories the peer may create under a runtime/temp root.
const SANDBOX_DIRS: &[&str] = &[
	"app/com.discordapp.Discord",
	"app/com.discordapp.DiscordCanary",
	".flatpak/com.discordapp.Discord/xdg-run",
	"snap.discord",
	"snap.discord-canary",
];

/// Finds the peer's socket. Implementations may be slow; callers run them off
/// the async executor.
pub trait EndpointLocator: Send + Sync {
	fn locate(&self) -> Option<PathBuf>;
}

/// Always returns the configured path, without checking it.
#[derive(Debug, Clone)]
pub struct FixedLocator(pub PathBuf);

impl EndpointLocator for FixedLocator {
	fn locate(&self) -> Option<PathBuf> {
		Some(self.0.clone())
	}
}

/// Scans the well-known socket directories.
#[derive(Debug, Clone)]
pub struct SocketLocator {
	roots: Vec<PathBuf>,
}

impl Default for SocketLocator {
	fn default() -> Self {
		Self::new()
	}
}

impl SocketLocator {
	/// Locator over the roots derived from the environment.
	pub fn new() -> Self {
		Self { roots: default_roots() }
	}

	/// Locator over explicit roots, in priority order.
	pub fn with_roots(roots: Vec<PathBuf>) -> Self {
		Self { roots }
	}

	pub fn roots(&self) -> &[PathBuf] {
		&self.roots
	}

	/// Every candidate path, in the order they are probed.
	pub fn candidates(&self) -> Vec<PathBuf> {
		let mut dirs = Vec::new();
		for root in &self.roots {
			dirs.push(root.clone());
			dirs.extend(SANDBOX_DIRS.iter().map(|sub| root.join(sub)));
		}

		let mut out = Vec::with_capacity(dirs.len() * SOCKET_SLOTS as usize);
		for slot in 0..SOCKET_SLOTS {
			for dir in &dirs {
				out.push(dir.join(format!("{SOCKET_PREFIX}{slot}")));
			}
		}
		out
	}

	/// One level below each root, for sandbox layouts not listed above.
	fn scan_subdirs(&self) -> Option<PathBuf> {
		for root in &self.roots {
			let Ok(entries) = std::fs::read_dir(root) else {
				continue;
			};
			let mut subdirs: Vec<PathBuf> = entries
				.filter_map(|entry| entry.ok())
				.filter(|entry| entry.file_type().map(|t| t.is_dir()).unwrap_or(false))
				.map(|entry| entry.path())
				.collect();
			subdirs.sort();
			for dir in subdirs {
				for slot in 0..SOCKET_SLOTS {
					let candidate = dir.join(format!("{SOCKET_PREFIX}{slot}"));
					if is_socket(&candidate) {
						return Some(candidate);
					}
				}
			}
		}
		None
	}
}

impl EndpointLocator for SocketLocator {
	fn locate(&self) -> Option<PathBuf> {
		for candidate in self.candidates() {
			trace!(target = "presence.locator", path = %candidate.display(), "probing");
			if is_socket(&candidate) {
				debug!(target = "presence.locator", path = %candidate.display(), "found socket");
				return Some(candidate);
			}
		}

		let found = self.scan_subdirs();
		match &found {
			Some(path) => debug!(target = "presence.locator", path = %path.display(), "found socket in subdirectory"),
			None => debug!(target = "presence.locator", roots = ?self.roots, "no socket found"),
		}
		found
	}
}

#[cfg(unix)]
fn default_roots() -> Vec<PathBuf> {
	let mut roots: Vec<PathBuf> = Vec::new();
	for key in ["XDG_RUNTIME_DIR", "TMPDIR", "TMP", "TEMP"] {
		if let Some(value) = std::env::var_os(key).filter(|v| !v.is_empty()) {
			roots.push(PathBuf::from(value));
		}
	}
	roots.push(PathBuf::from("/tmp"));
	roots.dedup();
	roots
}

#[cfg(windows)]
fn default_roots() -> Vec<PathBuf> {
	vec![PathBuf::from(r"\\.\pipe")]
}

#[cfg(not(any(unix, windows)))]
fn default_roots() -> Vec<PathBuf> {
	Vec::new()
}

#[cfg(unix)]
fn is_socket(path: &Path) -> bool {
	use std::os::unix::fs::FileTypeExt;

	std::fs::metadata(path).map(|meta| meta.file_type().is_socket()).unwrap_or(false)
}

#[cfg(not(unix))]
fn is_socket(path: &Path) -> bool {
	path.exists()
}

#[cfg(all(test, unix))]
mod tests {
	use super::*;
	use std::os::unix::net::UnixListener;
	use tempfile::TempDir;

	#[test]
	fn finds_socket_in_root() {
		let tmp = TempDir::new().unwrap();
		let path = tmp.path().join("discord-ipc-0");
		let _listener = UnixListener::bind(&path).unwrap();

		let locator = SocketLocator::with_roots(vec![tmp.path().to_path_buf()]);
		assert_eq!(locator.locate(), Some(path));
	}

	#[test]
	fn prefers_lowest_slot() {
		let tmp = TempDir::new().unwrap();
		let _high = UnixListener::bind(tmp.path().join("discord-ipc-3")).unwrap();
		let _low = UnixListener::bind(tmp.path().join("discord-ipc-1")).unwrap();

		let locator = SocketLocator::with_roots(vec![tmp.path().to_path_buf()]);
		assert_eq!(locator.locate(), Some(tmp.path().join("discord-ipc-1")));
	}

	#[test]
	fn finds_socket_in_flatpak_dir() {
		let tmp = TempDir::new().unwrap();
		let dir = tmp.path().join("app/com.discordapp.Discord");
		std::fs::create_dir_all(&dir).unwrap();
		let _listener = UnixListener::bind(dir.join("discord-ipc-0")).unwrap();

		let locator = SocketLocator::with_roots(vec![tmp.path().to_path_buf()]);
		assert_eq!(locator.locate(), Some(dir.join("discord-ipc-0")));
	}

	#[test]
	fn falls_back_to_unlisted_subdirectory() {
		let tmp = TempDir::new().unwrap();
		let dir = tmp.path().join("snap.discord-ptb");
		std::fs::create_dir_all(&dir).unwrap();
		let _listener = UnixListener::bind(dir.join("discord-ipc-2")).unwrap();

		let locator = SocketLocator::with_roots(vec![tmp.path().to_path_buf()]);
		assert_eq!(locator.locate(), Some(dir.join("discord-ipc-2")));
	}

	#[test]
	fn regular_file_is_not_a_socket() {
		let tmp = TempDir::new().unwrap();
		std::fs::write(tmp.path().join("discord-ipc-0"), b"").unwrap();

		let locator = SocketLocator::with_roots(vec![tmp.path().to_path_buf()]);
		assert_eq!(locator.locate(), None);
	}

	#[test]
	fn empty_roots_find_nothing() {
		assert_eq!(SocketLocator::with_roots(Vec::new()).locate(), None);
	}

	#[test]
	fn candidates_cover_every_slot_and_sandbox() {
		let locator = SocketLocator::with_roots(vec![PathBuf::from("/run/user/1000")]);
		let candidates = locator.candidates();
		assert_eq!(candidates.len(), (SANDBOX_DIRS.len() + 1) * SOCKET_SLOTS as usize);
		assert_eq!(candidates[0], PathBuf::from("/run/user/1000/discord-ipc-0"));
		assert!(candidates.contains(&PathBuf::from("/run/user/1000/snap.discord/discord-ipc-9")));
	}

	#[test]
	fn fixed_locator_returns_its_path() {
		let locator = FixedLocator(PathBuf::from("/nowhere/discord-ipc-0"));
		assert_eq!(locator.locate(), Some(PathBuf::from("/nowhere/discord-ipc-0")));
	}
}
