//! Line protocol for session report output.
//!
//! Report text interleaves arbitrary diagnostic lines with two reserved
//! forms, all pipe-delimited:
//!
//! ```text
//! CATEGORY|Walls          grouping line: detail lines that follow belong to "Walls"
//! ELEMENT|guid1|101       identity detail (2 or 4 payload fields)
//! COUNT|42                count detail
//! ```
//!
//! The parser is single-pass and stateful: it tracks the current group and
//! attaches every detail line to it until the next grouping line. Lines it
//! does not recognize are ignored, which keeps old controllers compatible
//! with sessions that emit new diagnostics. A detail line with the wrong
//! field count is skipped; a detail line before any grouping line is dropped.

use serde::{Deserialize, Serialize};

/// Grouping line tag.
pub const CATEGORY_TAG: &str = "CATEGORY";
/// Identity detail line tag.
pub const ELEMENT_TAG: &str = "ELEMENT";
/// Count detail line tag.
pub const COUNT_TAG: &str = "COUNT";
/// Emitted by a session when the requested document title matches nothing.
pub const DOCUMENT_NOT_FOUND_TAG: &str = "DOCUMENT-NOT-FOUND";

/// Identity tuple for one element in one document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IdentityRecord {
	pub unique_id: String,
	pub element_id: String,
	/// Present only in the 4-field `ELEMENT` form.
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub document_path: Option<String>,
	/// Present only in the 4-field `ELEMENT` form.
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub session_id: Option<String>,
}

/// One leaf record attached to a group.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ReportRecord {
	Count(u64),
	Identity(IdentityRecord),
}

/// All records attached to one grouping line.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReportGroup {
	pub name: String,
	pub records: Vec<ReportRecord>,
}

/// Parsed report, groups in first-seen order.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Report {
	pub groups: Vec<ReportGroup>,
}

impl Report {
	pub fn is_empty(&self) -> bool {
		self.groups.is_empty()
	}

	/// Records for `name`, if that group appeared.
	pub fn group(&self, name: &str) -> Option<&[ReportRecord]> {
		self.groups.iter().find(|g| g.name == name).map(|g| g.records.as_slice())
	}
}

/// Single-pass stateful parser over report lines.
#[derive(Debug, Default)]
pub struct ReportParser {
	current: Option<usize>,
	report: Report,
}

impl ReportParser {
	pub fn new() -> Self {
		Self::default()
	}

	/// Parses a whole report body in one call.
	pub fn parse(text: &str) -> Report {
		let mut parser = Self::new();
		for line in text.lines() {
			parser.push_line(line);
		}
		parser.finish()
	}

	/// Feeds one line; unrecognized or malformed lines are ignored.
	pub fn push_line(&mut self, line: &str) {
		let line = line.trim_end_matches('\r');
		let mut parts = line.splitn(2, '|');
		let tag = parts.next().unwrap_or_default();
		let rest = parts.next();

		match (tag, rest) {
			(CATEGORY_TAG, Some(name)) if !name.is_empty() => {
				// A repeated grouping line reopens the existing group so
				// re-declared categories do not split their records.
				let idx = match self.report.groups.iter().position(|g| g.name == name) {
					Some(idx) => idx,
					None => {
						self.report.groups.push(ReportGroup { name: name.to_string(), records: Vec::new() });
						self.report.groups.len() - 1
					}
				};
				self.current = Some(idx);
			}
			(ELEMENT_TAG, Some(rest)) => {
				if let Some(record) = parse_identity(rest) {
					self.attach(ReportRecord::Identity(record));
				}
			}
			(COUNT_TAG, Some(rest)) => {
				if let Ok(n) = rest.trim().parse::<u64>() {
					self.attach(ReportRecord::Count(n));
				}
			}
			// Diagnostics, DOCUMENT-NOT-FOUND markers, blank lines.
			_ => {}
		}
	}

	/// Consumes the parser, returning the accumulated report.
	pub fn finish(self) -> Report {
		self.report
	}

	fn attach(&mut self, record: ReportRecord) {
		// Detail lines before the first grouping line have no home; drop
		// them rather than inventing a phantom group.
		if let Some(idx) = self.current {
			self.report.groups[idx].records.push(record);
		}
	}
}

fn parse_identity(rest: &str) -> Option<IdentityRecord> {
	let fields: Vec<&str> = rest.split('|').collect();
	match fields.as_slice() {
		[unique_id, element_id] => Some(IdentityRecord {
			unique_id: unique_id.to_string(),
			element_id: element_id.to_string(),
			document_path: None,
			session_id: None,
		}),
		[unique_id, element_id, document_path, session_id] => Some(IdentityRecord {
			unique_id: unique_id.to_string(),
			element_id: element_id.to_string(),
			document_path: Some(document_path.to_string()),
			session_id: Some(session_id.to_string()),
		}),
		_ => None,
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	fn identity(uid: &str, eid: &str) -> ReportRecord {
		ReportRecord::Identity(IdentityRecord {
			unique_id: uid.into(),
			element_id: eid.into(),
			document_path: None,
			session_id: None,
		})
	}

	#[test]
	fn groups_collect_their_detail_lines() {
		let report = ReportParser::parse(
			"CATEGORY|Walls\nELEMENT|guid1|101\nELEMENT|guid2|102\nCATEGORY|Doors\nELEMENT|guid3|201",
		);
		assert_eq!(report.groups.len(), 2);
		assert_eq!(
			report.group("Walls").unwrap(),
			&[identity("guid1", "101"), identity("guid2", "102")]
		);
		assert_eq!(report.group("Doors").unwrap(), &[identity("guid3", "201")]);
	}

	#[test]
	fn detail_before_any_group_is_dropped() {
		let report = ReportParser::parse("ELEMENT|orphan|1\nCATEGORY|Walls\nELEMENT|guid1|101");
		assert_eq!(report.groups.len(), 1);
		assert_eq!(report.group("Walls").unwrap(), &[identity("guid1", "101")]);
	}

	#[test]
	fn unrecognized_lines_are_ignored() {
		let report = ReportParser::parse(
			"starting scan...\nCATEGORY|Walls\ndebug: 2 candidates\nCOUNT|2\nDOCUMENT-NOT-FOUND|Tower B",
		);
		assert_eq!(report.group("Walls").unwrap(), &[ReportRecord::Count(2)]);
	}

	#[test]
	fn wrong_field_count_is_skipped() {
		let report = ReportParser::parse("CATEGORY|Walls\nELEMENT|only-one\nELEMENT|a|b|c\nELEMENT|guid1|101");
		assert_eq!(report.group("Walls").unwrap(), &[identity("guid1", "101")]);
	}

	#[test]
	fn non_numeric_count_is_skipped() {
		let report = ReportParser::parse("CATEGORY|Walls\nCOUNT|many\nCOUNT|3");
		assert_eq!(report.group("Walls").unwrap(), &[ReportRecord::Count(3)]);
	}

	#[test]
	fn four_field_identity_keeps_provenance() {
		let report = ReportParser::parse("CATEGORY|Walls\nELEMENT|guid1|101|C:/models/a.rvt|sess-1");
		let ReportRecord::Identity(rec) = &report.group("Walls").unwrap()[0] else {
			panic!("expected identity record");
		};
		assert_eq!(rec.document_path.as_deref(), Some("C:/models/a.rvt"));
		assert_eq!(rec.session_id.as_deref(), Some("sess-1"));
	}

	#[test]
	fn repeated_group_reopens_rather_than_splits() {
		let report = ReportParser::parse("CATEGORY|Walls\nCOUNT|1\nCATEGORY|Doors\nCATEGORY|Walls\nCOUNT|2");
		assert_eq!(
			report.group("Walls").unwrap(),
			&[ReportRecord::Count(1), ReportRecord::Count(2)]
		);
	}

	#[test]
	fn empty_input_yields_empty_report() {
		assert!(ReportParser::parse("").is_empty());
	}
}
