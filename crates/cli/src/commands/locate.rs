use anyhow::{Context, Result, bail};
use presence::{EndpointLocator, SocketLocator};
use tracing::debug;

pub(super) async fn execute() -> Result<()> {
	let locator = SocketLocator::new();
	debug!(target = "presence", roots = ?locator.roots(), "searching for socket");

	let found = tokio::task::spawn_blocking(move || locator.locate())
		.await
		.context("socket search task failed")?;

	match found {
		Some(path) => {
			println!("{}", path.display());
			Ok(())
		}
		None => bail!("No Discord socket found"),
	}
}
