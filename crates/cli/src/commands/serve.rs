use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use bq_core::model::Document;
use bq_core::{AuthToken, DispatchEngine, DocumentSet, SessionRecord, SessionRegistry, now_ts};
use tracing::{info, warn};

use crate::server::{ServerState, router};

const HEARTBEAT_INTERVAL: Duration = Duration::from_secs(30);

pub async fn run(
	state_dir: &Path,
	port: u16,
	document_files: &[PathBuf],
	session_id: Option<String>,
	keys: bool,
) -> anyhow::Result<()> {
	let token = AuthToken::load_or_create(state_dir)?;
	let session_id = session_id.unwrap_or_else(generate_session_id);
	let docs = load_documents(document_files)?;
	let Some(primary) = docs.first().cloned() else {
		anyhow::bail!("at least one document file is required");
	};
	let documents = Arc::new(DocumentSet::new(session_id.clone(), docs));

	let listener = tokio::net::TcpListener::bind(("127.0.0.1", port))
		.await
		.with_context(|| format!("failed to bind query server on port {port}"))?;
	let addr = listener.local_addr()?;

	let registry = SessionRegistry::open(state_dir);
	let record = SessionRecord {
		session_id: session_id.clone(),
		document_title: primary.title.clone(),
		document_path: primary.path.clone(),
		port: addr.port(),
		hostname: addr.ip().to_string(),
		process_id: std::process::id(),
		registered_at: now_ts(),
		last_heartbeat: now_ts(),
	};
	registry.register(&record)?;
	info!(target = "bq.server", session_id = %session_id, port = addr.port(), "session registered");

	// Our record stays live only as long as this task keeps refreshing it;
	// stale records are never deleted, just ignored by readers.
	let heartbeat = {
		let registry = registry.clone();
		let mut record = record.clone();
		tokio::spawn(async move {
			let mut interval = tokio::time::interval(HEARTBEAT_INTERVAL);
			interval.tick().await;
			loop {
				interval.tick().await;
				if let Err(err) = registry.heartbeat(&mut record, now_ts()) {
					warn!(target = "bq.registry", error = %err, "heartbeat write failed");
				}
			}
		})
	};

	if keys {
		let engine = DispatchEngine::new(token.clone())?
			.with_local(session_id.clone(), Arc::clone(&documents) as Arc<dyn bq_core::Evaluate>);
		tokio::spawn(super::keys::run(engine, registry.clone()));
	}

	let state = ServerState { token, documents };
	println!("session {session_id} serving '{}' on {addr}", primary.title);

	let serve = async { axum::serve(listener, router(state)).await };
	tokio::select! {
		result = serve => {
			result.context("query server failed")?;
		}
		_ = tokio::signal::ctrl_c() => {
			info!(target = "bq.server", "received Ctrl+C, shutting down");
		}
	}
	heartbeat.abort();
	Ok(())
}

fn load_documents(files: &[PathBuf]) -> anyhow::Result<Vec<Document>> {
	files
		.iter()
		.map(|path| {
			let content = std::fs::read_to_string(path)
				.with_context(|| format!("failed to read document file {}", path.display()))?;
			serde_json::from_str(&content)
				.with_context(|| format!("invalid document file {}", path.display()))
		})
		.collect()
}

fn generate_session_id() -> String {
	use std::time::{SystemTime, UNIX_EPOCH};
	let seed = SystemTime::now()
		.duration_since(UNIX_EPOCH)
		.unwrap_or_default()
		.as_nanos();
	format!("sess-{:012x}", seed ^ u128::from(std::process::id()))
}
