use std::path::Path;

use bq_core::SelectionStore;

pub fn show(state_dir: &Path) -> anyhow::Result<()> {
	let store = SelectionStore::open(state_dir);
	let entries = store.load();
	if entries.is_empty() {
		println!("selection store is empty");
		return Ok(());
	}
	for entry in &entries {
		println!(
			"{}  {} (id {})  from {}",
			entry.document_title, entry.unique_id, entry.element_id, entry.session_id,
		);
	}
	println!("{} entries", entries.len());
	Ok(())
}

pub fn clear(state_dir: &Path) -> anyhow::Result<()> {
	let store = SelectionStore::open(state_dir);
	let count = store.load().len();
	store.save(&[])?;
	println!("cleared {count} entries");
	Ok(())
}
