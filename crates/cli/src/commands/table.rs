//! Static dispatch table from command names to query kinds.
//!
//! Built once at compile time; there is no runtime discovery of handlers by
//! name. Chord mode and the `query` subcommand both resolve through here.

use anyhow::bail;
use bq_protocol::envelope::QueryKind;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommandId {
	CountByCategory,
	SelectByCategory,
	ListCategories,
}

pub fn lookup_command(name: &str) -> Option<CommandId> {
	match name {
		"count" | "counts" => Some(CommandId::CountByCategory),
		"select" | "sel" => Some(CommandId::SelectByCategory),
		"categories" | "cats" => Some(CommandId::ListCategories),
		_ => None,
	}
}

pub fn command_name(id: CommandId) -> &'static str {
	match id {
		CommandId::CountByCategory => "count",
		CommandId::SelectByCategory => "select",
		CommandId::ListCategories => "categories",
	}
}

/// Instantiates the query for a command, validating its parameters.
pub fn build_query(id: CommandId, category: Option<String>) -> anyhow::Result<QueryKind> {
	match id {
		CommandId::CountByCategory => Ok(QueryKind::CountByCategory),
		CommandId::ListCategories => Ok(QueryKind::ListCategories),
		CommandId::SelectByCategory => match category {
			Some(category) => Ok(QueryKind::SelectByCategory { category }),
			None => bail!("'select' requires --category"),
		},
	}
}
