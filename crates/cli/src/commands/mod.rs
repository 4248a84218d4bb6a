//! Subcommand implementations.

mod keys;
mod query;
mod selection;
mod serve;
mod sessions;
pub mod table;

use crate::cli::{Cli, Command, SelectionAction};

pub async fn run(cli: Cli) -> anyhow::Result<()> {
	let state_dir = crate::paths::state_dir(cli.state_dir.as_deref());

	match cli.command {
		Command::Serve { port, documents, session_id, keys } => {
			serve::run(&state_dir, port, &documents, session_id, keys).await
		}
		Command::Sessions { all } => sessions::run(&state_dir, all),
		Command::Query { name, category, merge } => {
			query::run(&state_dir, &name, category, merge).await
		}
		Command::Selection { action } => match action {
			SelectionAction::Show => selection::show(&state_dir),
			SelectionAction::Clear => selection::clear(&state_dir),
		},
	}
}
