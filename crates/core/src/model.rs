//! In-memory document model and the evaluation seam.
//!
//! [`Evaluate`] is the capability the host application supplies: "run this
//! structured query against current in-memory state, return report text".
//! [`DocumentSet`] is the built-in implementation over a set of open
//! documents. Queries take the read lock; document mutations take the write
//! lock, so a query never observes a half-applied edit.

use bq_protocol::envelope::QueryKind;
use bq_protocol::report::{CATEGORY_TAG, COUNT_TAG, DOCUMENT_NOT_FOUND_TAG, ELEMENT_TAG};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};

/// One model element with its stable identity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Element {
	pub unique_id: String,
	pub element_id: String,
	pub category: String,
}

/// One open document and its elements.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Document {
	pub title: String,
	pub path: String,
	#[serde(default)]
	pub elements: Vec<Element>,
}

/// Evaluation capability supplied by the host application.
pub trait Evaluate: Send + Sync {
	/// Evaluates `query` against the document titled `document`, returning
	/// report protocol text. Implementations report an unknown title via a
	/// `DOCUMENT-NOT-FOUND` line, not an error; errors are reserved for
	/// genuine evaluation faults.
	fn evaluate(&self, query: &QueryKind, document: &str) -> crate::Result<String>;
}

/// The session's open documents behind a read/write lock.
pub struct DocumentSet {
	session_id: String,
	inner: RwLock<Vec<Document>>,
}

impl DocumentSet {
	pub fn new(session_id: impl Into<String>, documents: Vec<Document>) -> Self {
		Self { session_id: session_id.into(), inner: RwLock::new(documents) }
	}

	pub fn session_id(&self) -> &str {
		&self.session_id
	}

	/// Titles of all open documents, in open order.
	pub fn titles(&self) -> Vec<String> {
		self.inner.read().iter().map(|d| d.title.clone()).collect()
	}

	/// Opens (or replaces) a document. Takes the write lock; in-flight
	/// queries finish against the previous state.
	pub fn open_document(&self, document: Document) {
		let mut docs = self.inner.write();
		if let Some(slot) = docs.iter_mut().find(|d| d.title == document.title) {
			*slot = document;
		} else {
			docs.push(document);
		}
	}

	fn render(&self, query: &QueryKind, doc: &Document) -> String {
		let mut out = String::new();
		match query {
			QueryKind::ListCategories => {
				for category in categories_in_order(doc) {
					push_line(&mut out, &[CATEGORY_TAG, category]);
				}
			}
			QueryKind::CountByCategory => {
				for category in categories_in_order(doc) {
					let count = doc.elements.iter().filter(|e| e.category == category).count();
					push_line(&mut out, &[CATEGORY_TAG, category]);
					push_line(&mut out, &[COUNT_TAG, &count.to_string()]);
				}
			}
			QueryKind::SelectByCategory { category } => {
				push_line(&mut out, &[CATEGORY_TAG, category]);
				for element in doc.elements.iter().filter(|e| &e.category == category) {
					push_line(
						&mut out,
						&[
							ELEMENT_TAG,
							&element.unique_id,
							&element.element_id,
							&doc.path,
							&self.session_id,
						],
					);
				}
			}
		}
		out
	}
}

impl Evaluate for DocumentSet {
	fn evaluate(&self, query: &QueryKind, document: &str) -> crate::Result<String> {
		let docs = self.inner.read();
		match docs.iter().find(|d| d.title == document) {
			Some(doc) => Ok(self.render(query, doc)),
			None => {
				let mut out = String::new();
				push_line(&mut out, &[DOCUMENT_NOT_FOUND_TAG, document]);
				Ok(out)
			}
		}
	}
}

fn categories_in_order(doc: &Document) -> Vec<&str> {
	let mut seen = Vec::new();
	for element in &doc.elements {
		if !seen.contains(&element.category.as_str()) {
			seen.push(element.category.as_str());
		}
	}
	seen
}

fn push_line(out: &mut String, fields: &[&str]) {
	out.push_str(&fields.join("|"));
	out.push('\n');
}

#[cfg(test)]
mod tests {
	use bq_protocol::report::{ReportParser, ReportRecord};

	use super::*;

	fn sample() -> DocumentSet {
		DocumentSet::new(
			"sess-1",
			vec![Document {
				title: "Tower A".into(),
				path: "C:/models/tower-a.rvt".into(),
				elements: vec![
					Element { unique_id: "guid1".into(), element_id: "101".into(), category: "Walls".into() },
					Element { unique_id: "guid2".into(), element_id: "102".into(), category: "Walls".into() },
					Element { unique_id: "guid3".into(), element_id: "201".into(), category: "Doors".into() },
				],
			}],
		)
	}

	#[test]
	fn count_by_category_parses_back() {
		let docs = sample();
		let output = docs.evaluate(&QueryKind::CountByCategory, "Tower A").unwrap();
		let report = ReportParser::parse(&output);
		assert_eq!(report.group("Walls").unwrap(), &[ReportRecord::Count(2)]);
		assert_eq!(report.group("Doors").unwrap(), &[ReportRecord::Count(1)]);
	}

	#[test]
	fn select_by_category_carries_provenance() {
		let docs = sample();
		let query = QueryKind::SelectByCategory { category: "Walls".into() };
		let output = docs.evaluate(&query, "Tower A").unwrap();
		let report = ReportParser::parse(&output);
		let records = report.group("Walls").unwrap();
		assert_eq!(records.len(), 2);
		let ReportRecord::Identity(first) = &records[0] else {
			panic!("expected identity record");
		};
		assert_eq!(first.unique_id, "guid1");
		assert_eq!(first.session_id.as_deref(), Some("sess-1"));
		assert_eq!(first.document_path.as_deref(), Some("C:/models/tower-a.rvt"));
	}

	#[test]
	fn unknown_document_emits_not_found_line_not_error() {
		let docs = sample();
		let output = docs.evaluate(&QueryKind::CountByCategory, "Tower B").unwrap();
		assert!(output.contains("DOCUMENT-NOT-FOUND|Tower B"));
		assert!(ReportParser::parse(&output).is_empty());
	}

	#[test]
	fn select_unknown_category_yields_empty_group() {
		let docs = sample();
		let query = QueryKind::SelectByCategory { category: "Roofs".into() };
		let output = docs.evaluate(&query, "Tower A").unwrap();
		let report = ReportParser::parse(&output);
		assert_eq!(report.group("Roofs").unwrap().len(), 0);
	}

	#[test]
	fn open_document_replaces_same_title() {
		let docs = sample();
		docs.open_document(Document { title: "Tower A".into(), path: "D:/new.rvt".into(), elements: vec![] });
		let output = docs.evaluate(&QueryKind::ListCategories, "Tower A").unwrap();
		assert!(ReportParser::parse(&output).is_empty());
		assert_eq!(docs.titles(), vec!["Tower A".to_string()]);
	}
}
