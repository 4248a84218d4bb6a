//! Fan-out/fan-in query dispatch across live sessions.
//!
//! The engine partitions targets into the local session (evaluated in
//! process, no network hop) and remote sessions (one authenticated POST
//! each, all launched together). Every call carries its own timeout, every
//! failure is recorded per target, and the aggregate is the best-effort
//! union over the targets that produced usable output: one slow or dead
//! session never delays or aborts the others.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use bq_protocol::envelope::{QUERY_PATH, QueryKind, QueryRequest, QueryResponse, TOKEN_HEADER};
use bq_protocol::report::{ReportParser, ReportRecord};
use futures::stream::{FuturesUnordered, StreamExt};
use tokio::sync::watch;
use tracing::{debug, warn};

use crate::error::BqError;
use crate::model::Evaluate;
use crate::registry::SessionRecord;
use crate::token::AuthToken;

/// Ceiling for one outbound call. Matches the registry liveness window: a
/// session that cannot answer within it is indistinguishable from a dead one.
pub const CALL_TIMEOUT: Duration = Duration::from_secs(120);

/// One target that produced no usable data, and why.
#[derive(Debug)]
pub struct TargetFailure {
	pub session_id: String,
	pub error: BqError,
}

/// Best-effort aggregate over all dispatched targets.
#[derive(Debug, Default)]
pub struct DispatchOutcome {
	/// Parsed records keyed by group, then by target document title.
	pub results: BTreeMap<String, BTreeMap<String, Vec<ReportRecord>>>,
	/// Sessions that returned a usable envelope, in completion order.
	pub responded: Vec<String>,
	/// Per-target failures; these never abort the dispatch.
	pub failures: Vec<TargetFailure>,
}

impl DispatchOutcome {
	/// True when zero targets produced usable data. This is the empty-result
	/// condition reported to the caller, not an error.
	pub fn is_empty(&self) -> bool {
		self.responded.is_empty()
	}

	fn absorb(&mut self, target: &SessionRecord, output: &str) {
		let report = ReportParser::parse(output);
		for group in report.groups {
			self.results
				.entry(group.name)
				.or_default()
				.entry(target.document_title.clone())
				.or_default()
				.extend(group.records);
		}
		self.responded.push(target.session_id.clone());
	}

	fn fail(&mut self, session_id: &str, error: BqError) {
		warn!(target = "bq.dispatch", session_id, error = %error, "target dropped from aggregation");
		self.failures.push(TargetFailure { session_id: session_id.to_string(), error });
	}
}

struct LocalSession {
	session_id: String,
	evaluator: Arc<dyn Evaluate>,
}

/// Broadcast engine bound to one shared token.
pub struct DispatchEngine {
	token: AuthToken,
	client: reqwest::Client,
	local: Option<LocalSession>,
}

impl DispatchEngine {
	pub fn new(token: AuthToken) -> crate::Result<Self> {
		Self::with_timeout(token, CALL_TIMEOUT)
	}

	pub fn with_timeout(token: AuthToken, timeout: Duration) -> crate::Result<Self> {
		let client = reqwest::Client::builder()
			// The token is the sole authentication factor; a session fronted
			// by a self-signed certificate is still a valid target.
			.danger_accept_invalid_certs(true)
			.timeout(timeout)
			.build()?;
		Ok(Self { token, client, local: None })
	}

	/// Declares the current session so its target is evaluated in process.
	pub fn with_local(mut self, session_id: impl Into<String>, evaluator: Arc<dyn Evaluate>) -> Self {
		self.local = Some(LocalSession { session_id: session_id.into(), evaluator });
		self
	}

	/// Dispatches `query` to every target and joins on all calls.
	pub async fn dispatch(&self, targets: &[SessionRecord], query: &QueryKind) -> DispatchOutcome {
		let (_stop, cancel) = watch::channel(false);
		self.dispatch_with_cancel(targets, query, cancel).await
	}

	/// Like [`dispatch`](Self::dispatch), but ends early once `cancel`
	/// flips to `true`. Results collected before the cancellation point are
	/// kept; not-yet-completed calls are recorded as cancelled, never
	/// retracted.
	pub async fn dispatch_with_cancel(
		&self,
		targets: &[SessionRecord],
		query: &QueryKind,
		mut cancel: watch::Receiver<bool>,
	) -> DispatchOutcome {
		let mut outcome = DispatchOutcome::default();
		let (locals, remotes): (Vec<&SessionRecord>, Vec<&SessionRecord>) =
			targets.iter().partition(|t| self.is_local(t));

		debug!(
			target = "bq.dispatch",
			local = locals.len(),
			remote = remotes.len(),
			"dispatching query"
		);

		// The local target shares no mutable state with the fan-out, so it
		// can run up front without affecting remote latency.
		if let Some(local) = &self.local {
			for target in &locals {
				match local.evaluator.evaluate(query, &target.document_title) {
					Ok(output) => outcome.absorb(target, &output),
					Err(err) => outcome.fail(
						&target.session_id,
						BqError::Fault {
							session_id: target.session_id.clone(),
							message: err.to_string(),
						},
					),
				}
			}
		}

		// Fan-out: every remote call writes only its own slot; aggregation
		// happens strictly after the join, so no lock is needed.
		let mut slots: Vec<Option<std::result::Result<String, BqError>>> =
			remotes.iter().map(|_| None).collect();
		{
			let mut calls: FuturesUnordered<_> = remotes
				.iter()
				.enumerate()
				.map(|(idx, target)| {
					let call = self.call_remote(target, query);
					async move { (idx, call.await) }
				})
				.collect();

			let drain = async {
				while let Some((idx, result)) = calls.next().await {
					slots[idx] = Some(result);
				}
			};
			tokio::select! {
				() = drain => {}
				() = wait_cancelled(&mut cancel) => {
					debug!(target = "bq.dispatch", "dispatch cancelled, keeping partial results");
				}
			}
		}

		for (slot, target) in slots.into_iter().zip(&remotes) {
			match slot {
				Some(Ok(output)) => outcome.absorb(target, &output),
				Some(Err(error)) => outcome.fail(&target.session_id, error),
				None => outcome.fail(
					&target.session_id,
					BqError::Cancelled { session_id: target.session_id.clone() },
				),
			}
		}

		debug!(
			target = "bq.dispatch",
			responded = outcome.responded.len(),
			failed = outcome.failures.len(),
			"dispatch joined"
		);
		outcome
	}

	fn is_local(&self, target: &SessionRecord) -> bool {
		self.local.as_ref().is_some_and(|l| l.session_id == target.session_id)
	}

	async fn call_remote(
		&self,
		target: &SessionRecord,
		query: &QueryKind,
	) -> std::result::Result<String, BqError> {
		let url = format!("http://{}:{}{}", target.hostname, target.port, QUERY_PATH);
		let request = QueryRequest {
			query: query.clone(),
			document: target.document_title.clone(),
		};

		let transport = |err: reqwest::Error| BqError::Transport {
			session_id: target.session_id.clone(),
			message: transport_message(&err),
		};

		let response = self
			.client
			.post(&url)
			.header(TOKEN_HEADER, self.token.expose())
			.json(&request)
			.send()
			.await
			.map_err(transport)?;
		let envelope: QueryResponse = response.json().await.map_err(transport)?;

		if envelope.success {
			Ok(envelope.output)
		} else if envelope.error.as_deref() == Some("auth") {
			Err(BqError::Auth { session_id: target.session_id.clone() })
		} else {
			Err(BqError::Fault {
				session_id: target.session_id.clone(),
				message: envelope.error.unwrap_or_else(|| "unspecified fault".to_string()),
			})
		}
	}
}

async fn wait_cancelled(cancel: &mut watch::Receiver<bool>) {
	loop {
		if *cancel.borrow() {
			return;
		}
		if cancel.changed().await.is_err() {
			// Sender gone: cancellation can never arrive.
			std::future::pending::<()>().await;
		}
	}
}

fn transport_message(err: &reqwest::Error) -> String {
	if err.is_timeout() {
		"request timeout".to_string()
	} else if err.is_connect() {
		"connection refused or unreachable".to_string()
	} else {
		err.to_string()
	}
}

#[cfg(test)]
mod tests {
	use std::net::SocketAddr;
	use std::time::Instant;

	use axum::routing::post;
	use axum::{Json, Router};
	use bq_protocol::envelope::QueryResponse;

	use super::*;
	use crate::model::{Document, DocumentSet, Element};

	const WINDOW: Duration = Duration::from_secs(5);

	fn record(id: &str, title: &str, addr: SocketAddr) -> SessionRecord {
		SessionRecord {
			session_id: id.to_string(),
			document_title: title.to_string(),
			document_path: format!("C:/models/{title}.rvt"),
			port: addr.port(),
			hostname: addr.ip().to_string(),
			process_id: 1,
			registered_at: 0,
			last_heartbeat: 0,
		}
	}

	async fn spawn_server(envelope: QueryResponse, delay: Duration) -> SocketAddr {
		let app = Router::new().route(
			QUERY_PATH,
			post(move || {
				let envelope = envelope.clone();
				async move {
					tokio::time::sleep(delay).await;
					Json(envelope)
				}
			}),
		);
		let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
		let addr = listener.local_addr().unwrap();
		tokio::spawn(async move {
			axum::serve(listener, app).await.unwrap();
		});
		addr
	}

	fn engine() -> DispatchEngine {
		DispatchEngine::with_timeout(AuthToken::from_value("t"), WINDOW).unwrap()
	}

	#[tokio::test]
	async fn partial_failure_keeps_the_successes() {
		let good = spawn_server(
			QueryResponse::ok("CATEGORY|Walls\nCOUNT|2"),
			Duration::ZERO,
		)
		.await;
		let faulty = spawn_server(QueryResponse::fault("boom"), Duration::ZERO).await;
		// Bind then drop to get a port that refuses connections.
		let refused = {
			let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
			listener.local_addr().unwrap()
		};

		let targets = vec![
			record("s-good", "Tower A", good),
			record("s-fault", "Tower B", faulty),
			record("s-dead", "Tower C", refused),
		];
		let outcome = engine().dispatch(&targets, &QueryKind::CountByCategory).await;

		assert_eq!(outcome.responded, vec!["s-good".to_string()]);
		assert_eq!(outcome.results["Walls"]["Tower A"], vec![ReportRecord::Count(2)]);
		assert_eq!(outcome.failures.len(), 2);
		assert!(outcome.failures.iter().any(|f| {
			f.session_id == "s-fault" && matches!(f.error, BqError::Fault { .. })
		}));
		assert!(outcome.failures.iter().any(|f| {
			f.session_id == "s-dead" && matches!(f.error, BqError::Transport { .. })
		}));
	}

	#[tokio::test]
	async fn auth_rejection_is_classified() {
		let addr = spawn_server(QueryResponse::auth_rejected(), Duration::ZERO).await;
		let targets = vec![record("s1", "Tower A", addr)];
		let outcome = engine().dispatch(&targets, &QueryKind::ListCategories).await;

		assert!(outcome.is_empty());
		assert!(matches!(outcome.failures[0].error, BqError::Auth { .. }));
	}

	#[tokio::test]
	async fn slow_target_times_out_without_delaying_result() {
		let slow = spawn_server(QueryResponse::ok(""), Duration::from_secs(30)).await;
		let fast = spawn_server(QueryResponse::ok("CATEGORY|Doors\nCOUNT|1"), Duration::ZERO).await;
		let targets = vec![record("s-slow", "Tower A", slow), record("s-fast", "Tower B", fast)];

		let engine = DispatchEngine::with_timeout(
			AuthToken::from_value("t"),
			Duration::from_millis(300),
		)
		.unwrap();
		let started = Instant::now();
		let outcome = engine.dispatch(&targets, &QueryKind::CountByCategory).await;

		assert!(started.elapsed() < Duration::from_secs(5));
		assert_eq!(outcome.responded, vec!["s-fast".to_string()]);
		assert!(matches!(outcome.failures[0].error, BqError::Transport { .. }));
	}

	#[tokio::test]
	async fn fan_out_is_concurrent_not_sequential() {
		let delay = Duration::from_millis(250);
		let a = spawn_server(QueryResponse::ok("CATEGORY|Walls\nCOUNT|1"), delay).await;
		let b = spawn_server(QueryResponse::ok("CATEGORY|Walls\nCOUNT|2"), delay).await;
		let c = spawn_server(QueryResponse::ok("CATEGORY|Walls\nCOUNT|3"), delay).await;
		let targets = vec![
			record("s1", "Tower A", a),
			record("s2", "Tower B", b),
			record("s3", "Tower C", c),
		];

		let started = Instant::now();
		let outcome = engine().dispatch(&targets, &QueryKind::CountByCategory).await;
		let elapsed = started.elapsed();

		assert_eq!(outcome.responded.len(), 3);
		// Bounded by the slowest target, not the sum of all three.
		assert!(elapsed < delay * 2, "fan-out took {elapsed:?}");
	}

	#[tokio::test]
	async fn local_target_is_evaluated_in_process() {
		let docs = DocumentSet::new(
			"local-1",
			vec![Document {
				title: "Tower A".into(),
				path: "C:/models/a.rvt".into(),
				elements: vec![Element {
					unique_id: "guid1".into(),
					element_id: "101".into(),
					category: "Walls".into(),
				}],
			}],
		);
		// Port 1 would refuse instantly; the local path must never touch it.
		let unreachable: SocketAddr = "127.0.0.1:1".parse().unwrap();
		let targets = vec![record("local-1", "Tower A", unreachable)];

		let outcome = engine()
			.with_local("local-1", Arc::new(docs))
			.dispatch(&targets, &QueryKind::CountByCategory)
			.await;

		assert_eq!(outcome.responded, vec!["local-1".to_string()]);
		assert!(outcome.failures.is_empty());
		assert_eq!(outcome.results["Walls"]["Tower A"], vec![ReportRecord::Count(1)]);
	}

	#[tokio::test]
	async fn zero_usable_responses_is_empty_not_error() {
		let refused = {
			let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
			listener.local_addr().unwrap()
		};
		let targets = vec![record("s1", "Tower A", refused)];
		let outcome = engine().dispatch(&targets, &QueryKind::CountByCategory).await;

		assert!(outcome.is_empty());
		assert!(outcome.results.is_empty());
		assert_eq!(outcome.failures.len(), 1);
	}

	#[tokio::test]
	async fn cancellation_keeps_completed_results() {
		let fast = spawn_server(QueryResponse::ok("CATEGORY|Walls\nCOUNT|1"), Duration::ZERO).await;
		let slow = spawn_server(QueryResponse::ok(""), Duration::from_secs(30)).await;
		let targets = vec![record("s-fast", "Tower A", fast), record("s-slow", "Tower B", slow)];

		let (stop, cancel) = watch::channel(false);
		tokio::spawn(async move {
			tokio::time::sleep(Duration::from_millis(300)).await;
			let _ = stop.send(true);
		});

		let started = Instant::now();
		let outcome = engine()
			.dispatch_with_cancel(&targets, &QueryKind::CountByCategory, cancel)
			.await;

		assert!(started.elapsed() < Duration::from_secs(5));
		assert_eq!(outcome.responded, vec!["s-fast".to_string()]);
		assert!(matches!(outcome.failures[0].error, BqError::Cancelled { .. }));
	}
}
