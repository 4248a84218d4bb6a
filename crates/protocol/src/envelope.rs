//! Request/response envelope for the session query endpoint.
//!
//! A controller POSTs a [`QueryRequest`] to a session's fixed [`QUERY_PATH`],
//! carrying the shared secret in the [`TOKEN_HEADER`] header. The session
//! always answers HTTP 200 with a [`QueryResponse`]; transport-level success
//! never implies `success == true`. Evaluation faults travel inside the
//! envelope's `error` field, never as HTTP status codes.

use serde::{Deserialize, Serialize};

/// Header carrying the shared dispatch token.
pub const TOKEN_HEADER: &str = "x-bq-token";

/// Fixed endpoint path every session serves.
pub const QUERY_PATH: &str = "/query";

/// The closed set of queries a session can evaluate.
///
/// There is deliberately no free-form payload kind: a session only ever
/// evaluates one of these structured queries against one of its open
/// documents, so a hostile or faulty request cannot reach beyond its own
/// evaluation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum QueryKind {
	/// Emit one `COUNT` line per category.
	CountByCategory,
	/// Emit an `ELEMENT` identity line for every element in `category`.
	SelectByCategory {
		/// Category name, matched exactly.
		category: String,
	},
	/// Emit `CATEGORY` lines only, one per known category.
	ListCategories,
}

/// One query addressed to one document inside one session.
///
/// `document` disambiguates between multiple open documents in the receiving
/// session; a title that matches nothing yields a `DOCUMENT-NOT-FOUND` report
/// line, not an envelope failure.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueryRequest {
	pub query: QueryKind,
	pub document: String,
}

/// Response envelope, the sole RPC contract.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueryResponse {
	pub success: bool,
	/// Raw multi-line report text, parsed by [`crate::report::ReportParser`].
	#[serde(default)]
	pub output: String,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub error: Option<String>,
}

impl QueryResponse {
	/// Successful evaluation carrying report text.
	pub fn ok(output: impl Into<String>) -> Self {
		Self { success: true, output: output.into(), error: None }
	}

	/// Evaluation fault captured into the envelope.
	pub fn fault(message: impl Into<String>) -> Self {
		Self { success: false, output: String::new(), error: Some(message.into()) }
	}

	/// Token mismatch; nothing was evaluated.
	pub fn auth_rejected() -> Self {
		Self { success: false, output: String::new(), error: Some("auth".into()) }
	}
}
