//! Interactive two-key chord mode.
//!
//! Reads one key per stdin line. A chord is 'b' followed by a command key
//! inside the arming window; anything else resets the detector. Fired chords
//! broadcast the mapped query to every live session, with this session
//! evaluated in process.

use std::time::Duration;

use bq_core::chord::{ChordDetector, ChordEvent};
use bq_core::{DispatchEngine, SessionRegistry, now_ts};
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::debug;

use super::table::CommandId;
use super::{query, table};

const CHORD_WINDOW: Duration = Duration::from_millis(1500);

pub async fn run(engine: DispatchEngine, registry: SessionRegistry) -> anyhow::Result<()> {
	let mut detector = ChordDetector::new(CHORD_WINDOW);
	let mut lines = BufReader::new(tokio::io::stdin()).lines();

	println!("chord mode: 'b' then 'c' broadcasts counts, 'b' then 'g' broadcasts categories");
	while let Some(line) = lines.next_line().await? {
		let key = line.trim();
		if key.is_empty() {
			continue;
		}
		match detector.press(key) {
			ChordEvent::Armed => {}
			ChordEvent::Fired { first, second } => {
				let Some(id) = chord_command(&first, &second) else {
					debug!(target = "bq.chord", first = %first, second = %second, "unbound chord");
					continue;
				};
				let query_kind = table::build_query(id, None)?;
				let targets = registry.list_live(now_ts());
				let outcome = engine.dispatch(&targets, &query_kind).await;
				query::render_outcome(&outcome);
			}
		}
	}
	Ok(())
}

fn chord_command(first: &str, second: &str) -> Option<CommandId> {
	match (first, second) {
		("b", "c") => Some(CommandId::CountByCategory),
		("b", "g") => Some(CommandId::ListCategories),
		_ => None,
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn bound_chords_resolve_to_commands() {
		assert_eq!(chord_command("b", "c"), Some(CommandId::CountByCategory));
		assert_eq!(chord_command("b", "g"), Some(CommandId::ListCategories));
	}

	#[test]
	fn unbound_chords_resolve_to_nothing() {
		assert_eq!(chord_command("c", "b"), None);
		assert_eq!(chord_command("b", "x"), None);
	}
}
