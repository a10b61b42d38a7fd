mod locate;
pub mod run;

use anyhow::Result;

use crate::cli::Commands;

pub async fn dispatch(command: Commands) -> Result<()> {
	match command {
		Commands::Run(args) => run::execute(args).await,
		Commands::Locate => locate::execute().await,
	}
}
