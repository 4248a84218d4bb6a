use std::path::Path;

use bq_core::{SessionRegistry, now_ts};

pub fn run(state_dir: &Path, all: bool) -> anyhow::Result<()> {
	let registry = SessionRegistry::open(state_dir);
	let now = now_ts();
	let records = if all { registry.list_all() } else { registry.list_live(now) };

	if records.is_empty() {
		println!("no {}sessions registered", if all { "" } else { "live " });
		return Ok(());
	}

	for record in records {
		let liveness = if record.is_live(now) { "live" } else { "stale" };
		println!(
			"{}  {}:{}  pid {}  heartbeat {}s ago ({})  {}",
			record.session_id,
			record.hostname,
			record.port,
			record.process_id,
			record.heartbeat_age(now),
			liveness,
			record.document_title,
		);
	}
	Ok(())
}
