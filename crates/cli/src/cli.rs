use std::path::PathBuf;

use clap::{Parser, Subcommand};

#[derive(Parser, Debug)]
#[command(name = "bq")]
#[command(about = "Broadcast queries across live peer sessions")]
#[command(version)]
pub struct Cli {
	/// Increase verbosity (-v info, -vv debug)
	#[arg(short, long, global = true, action = clap::ArgAction::Count)]
	pub verbose: u8,

	/// Override the shared state directory (registry, token, selection store)
	#[arg(long, global = true, value_name = "DIR")]
	pub state_dir: Option<PathBuf>,

	#[command(subcommand)]
	pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
	/// Register this session and serve its query endpoint
	Serve {
		/// Port for the embedded query server (0 picks a free port)
		#[arg(short, long, default_value_t = 0)]
		port: u16,

		/// Document files (JSON) this session opens; the first one is the
		/// primary document announced in the registry
		#[arg(required = true, value_name = "FILE")]
		documents: Vec<PathBuf>,

		/// Stable session id (generated when omitted)
		#[arg(long, value_name = "ID")]
		session_id: Option<String>,

		/// Read two-key chords from stdin to trigger broadcast queries
		#[arg(long)]
		keys: bool,
	},

	/// List live sessions from the shared registry
	Sessions {
		/// Include stale records
		#[arg(long)]
		all: bool,
	},

	/// Broadcast one query to every live session
	Query {
		/// Query name: count, select, or categories
		name: String,

		/// Category for select queries
		#[arg(short, long, value_name = "NAME")]
		category: Option<String>,

		/// Merge identity results into the persisted selection store
		#[arg(long)]
		merge: bool,
	},

	/// Inspect or clear the persisted selection store
	Selection {
		#[command(subcommand)]
		action: SelectionAction,
	},
}

#[derive(Subcommand, Debug)]
pub enum SelectionAction {
	/// Print accumulated entries in insertion order
	Show,
	/// Drop every accumulated entry
	Clear,
}
