use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

#[derive(Parser, Debug)]
#[command(name = "presence")]
#[command(about = "Publish rich presence over the local Discord IPC socket")]
#[command(version)]
pub struct Cli {
	/// Increase verbosity (-v info, -vv debug, -vvv trace)
	#[arg(short, long, global = true, action = clap::ArgAction::Count)]
	pub verbose: u8,

	#[command(subcommand)]
	pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
	/// Push an activity until interrupted
	Run(RunArgs),

	/// Print the socket path a session would connect to
	Locate,
}

#[derive(Args, Debug, Clone)]
pub struct RunArgs {
	/// Application id registered with Discord
	#[arg(long, value_name = "ID")]
	pub client_id: String,

	/// Activity document (JSON, wire field names)
	#[arg(long, value_name = "FILE")]
	pub activity: PathBuf,

	/// Session config (JSON: updateIntervalMs, retry, retryDelayMs, handshakeTimeoutMs)
	#[arg(long, value_name = "FILE")]
	pub config: Option<PathBuf>,

	/// Delay between activity updates (ms)
	#[arg(long, value_name = "MS")]
	pub interval_ms: Option<u64>,

	/// Give up after the first failed connect
	#[arg(long)]
	pub no_retry: bool,

	/// Delay between connect attempts (ms)
	#[arg(long, value_name = "MS")]
	pub retry_delay_ms: Option<u64>,

	/// Connect to this socket instead of searching for one
	#[arg(long, value_name = "PATH")]
	pub socket: Option<PathBuf>,
}
