//! Embedded query endpoint for one session.
//!
//! One route, `POST /query`, token-gated via the shared secret header. The
//! envelope is the sole contract: auth rejections, malformed bodies, and
//! evaluation faults all come back as HTTP 200 with `success:false`; a fault
//! must never escape as a transport-level error.

use std::sync::Arc;

use axum::extract::State;
use axum::http::HeaderMap;
use axum::routing::post;
use axum::{Json, Router};
use bq_core::model::Evaluate;
use bq_core::{AuthToken, DocumentSet};
use bq_protocol::envelope::{QUERY_PATH, QueryRequest, QueryResponse, TOKEN_HEADER};
use tracing::debug;

#[derive(Clone)]
pub struct ServerState {
	pub token: AuthToken,
	pub documents: Arc<DocumentSet>,
}

pub fn router(state: ServerState) -> Router {
	Router::new().route(QUERY_PATH, post(handle_query)).with_state(state)
}

async fn handle_query(
	State(state): State<ServerState>,
	headers: HeaderMap,
	body: String,
) -> Json<QueryResponse> {
	let presented = headers
		.get(TOKEN_HEADER)
		.and_then(|value| value.to_str().ok())
		.unwrap_or_default();
	if !state.token.verify(presented) {
		debug!(target = "bq.server", "rejected query with bad token");
		return Json(QueryResponse::auth_rejected());
	}

	let request: QueryRequest = match serde_json::from_str(&body) {
		Ok(request) => request,
		Err(err) => return Json(QueryResponse::fault(format!("invalid request: {err}"))),
	};

	debug!(target = "bq.server", document = %request.document, "evaluating query");
	let response = match state.documents.evaluate(&request.query, &request.document) {
		Ok(output) => QueryResponse::ok(output),
		Err(err) => QueryResponse::fault(err.to_string()),
	};
	Json(response)
}
