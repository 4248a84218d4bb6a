//! Persisted, deduplicated cross-session selection store.
//!
//! Repeated dispatches accumulate identity tuples here. The store behaves as
//! a set keyed on `(document_title, unique_id)` with insertion order
//! preserved: first-seen wins, new entries append in incoming order. Saves
//! are full atomic rewrites; a torn write would corrupt every future load.

use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};

use bq_protocol::report::ReportRecord;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::dispatch::DispatchOutcome;

/// Selection store file name under the shared state directory.
pub const SELECTION_FILE: &str = "selection.json";

/// One accumulated element identity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SelectionEntry {
	pub document_title: String,
	pub unique_id: String,
	pub element_id: String,
	#[serde(default)]
	pub document_path: String,
	#[serde(default)]
	pub session_id: String,
}

impl SelectionEntry {
	/// Composite dedup key.
	pub fn key(&self) -> (&str, &str) {
		(&self.document_title, &self.unique_id)
	}
}

/// Handle on the persisted selection file.
#[derive(Debug, Clone)]
pub struct SelectionStore {
	path: PathBuf,
}

impl SelectionStore {
	pub fn new(path: impl Into<PathBuf>) -> Self {
		Self { path: path.into() }
	}

	pub fn open(state_dir: &Path) -> Self {
		Self::new(state_dir.join(SELECTION_FILE))
	}

	pub fn path(&self) -> &Path {
		&self.path
	}

	/// Previously persisted entries in insertion order; a missing or corrupt
	/// store yields an empty sequence, never an error.
	pub fn load(&self) -> Vec<SelectionEntry> {
		fs::read_to_string(&self.path)
			.ok()
			.and_then(|content| serde_json::from_str(&content).ok())
			.unwrap_or_default()
	}

	/// Full atomic rewrite via temp file and rename.
	pub fn save(&self, entries: &[SelectionEntry]) -> crate::Result<()> {
		if let Some(parent) = self.path.parent() {
			fs::create_dir_all(parent)?;
		}
		let tmp = self.path.with_extension(format!("tmp.{}", std::process::id()));
		fs::write(&tmp, serde_json::to_string_pretty(entries)?)?;
		fs::rename(&tmp, &self.path)?;
		debug!(target = "bq.selection", count = entries.len(), "selection store saved");
		Ok(())
	}

	/// Loads, merges, saves; returns the merged sequence.
	pub fn accumulate(&self, incoming: Vec<SelectionEntry>) -> crate::Result<Vec<SelectionEntry>> {
		let mut entries = self.load();
		merge(&mut entries, incoming);
		self.save(&entries)?;
		Ok(entries)
	}
}

/// Appends each incoming entry whose composite key is not already present.
/// First-seen wins; existing order is preserved and new entries append in
/// incoming order. Returns how many were appended.
pub fn merge(existing: &mut Vec<SelectionEntry>, incoming: Vec<SelectionEntry>) -> usize {
	let mut seen: HashSet<(String, String)> = existing
		.iter()
		.map(|e| (e.document_title.clone(), e.unique_id.clone()))
		.collect();
	let before = existing.len();
	for entry in incoming {
		let key = (entry.document_title.clone(), entry.unique_id.clone());
		if seen.insert(key) {
			existing.push(entry);
		}
	}
	existing.len() - before
}

/// Flattens a dispatch aggregate into selection entries, in group order then
/// document order. Count records carry no identity and are skipped.
pub fn entries_from_outcome(outcome: &DispatchOutcome) -> Vec<SelectionEntry> {
	let mut entries = Vec::new();
	for per_doc in outcome.results.values() {
		for (document_title, records) in per_doc {
			for record in records {
				if let ReportRecord::Identity(identity) = record {
					entries.push(SelectionEntry {
						document_title: document_title.clone(),
						unique_id: identity.unique_id.clone(),
						element_id: identity.element_id.clone(),
						document_path: identity.document_path.clone().unwrap_or_default(),
						session_id: identity.session_id.clone().unwrap_or_default(),
					});
				}
			}
		}
	}
	entries
}
