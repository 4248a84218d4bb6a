use std::path::Path;

use anyhow::bail;
use bq_core::dispatch::DispatchOutcome;
use bq_core::selection::{SelectionStore, entries_from_outcome};
use bq_core::{AuthToken, DispatchEngine, SessionRegistry, now_ts};
use bq_protocol::report::ReportRecord;

use super::table;

pub async fn run(
	state_dir: &Path,
	name: &str,
	category: Option<String>,
	merge: bool,
) -> anyhow::Result<()> {
	let Some(id) = table::lookup_command(name) else {
		bail!("unknown query '{name}' (expected count, select, or categories)");
	};
	let query = table::build_query(id, category)?;

	let registry = SessionRegistry::open(state_dir);
	let targets = registry.list_live(now_ts());
	if targets.is_empty() {
		println!("no live sessions");
		return Ok(());
	}

	let token = AuthToken::load_or_create(state_dir)?;
	let engine = DispatchEngine::new(token)?;
	let outcome = engine.dispatch(&targets, &query).await;
	render_outcome(&outcome);

	if merge {
		let store = SelectionStore::open(state_dir);
		let merged = store.accumulate(entries_from_outcome(&outcome))?;
		println!("selection store holds {} entries", merged.len());
	}
	Ok(())
}

pub(crate) fn render_outcome(outcome: &DispatchOutcome) {
	if outcome.is_empty() {
		println!("no usable responses ({} targets failed)", outcome.failures.len());
	}

	for (group, per_doc) in &outcome.results {
		println!("{group}");
		for (document, records) in per_doc {
			for record in records {
				match record {
					ReportRecord::Count(n) => println!("  {document}: {n}"),
					ReportRecord::Identity(identity) => println!(
						"  {document}: {} (id {})",
						identity.unique_id, identity.element_id
					),
				}
			}
		}
	}

	for failure in &outcome.failures {
		eprintln!("warning: {}", failure.error);
	}
}
