//! Shared session registry with heartbeat-based liveness.
//!
//! Every session process appends itself to one registry file shared by all
//! sessions on the machine; nobody owns the file, each process owns only its
//! own line. Writes go through a read–replace–rename cycle so a concurrent
//! writer can never corrupt an unrelated entry, and stale records are never
//! deleted explicitly: liveness is decided purely by heartbeat age at read
//! time.
//!
//! Storage is line-oriented CSV:
//!
//! ```text
//! document_title,document_path,session_id,port,hostname,process_id,registered_at,last_heartbeat
//! ```
//!
//! Blank lines and `#` comments are skipped; rows with missing fields are
//! malformed and skipped. The six trailing fields never contain commas, so
//! lines are split from the right and only the title/path head is split on
//! its first comma. Titles are sanitized on register since a comma there is
//! not representable.

use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::debug;

/// A record is live iff its heartbeat age is strictly under this many
/// seconds; an age of exactly 120s is stale.
pub const LIVENESS_WINDOW_SECS: u64 = 120;

/// Registry file name under the shared state directory.
pub const REGISTRY_FILE: &str = "sessions.csv";

// title,path + 6 structural tail fields
const FIELD_COUNT: usize = 8;
const TAIL_FIELDS: usize = 6;

/// One session's registry entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionRecord {
	pub session_id: String,
	pub document_title: String,
	pub document_path: String,
	pub port: u16,
	pub hostname: String,
	pub process_id: u32,
	pub registered_at: u64,
	pub last_heartbeat: u64,
}

impl SessionRecord {
	/// Heartbeat age relative to `now`, saturating at zero for clock skew.
	pub fn heartbeat_age(&self, now: u64) -> u64 {
		now.saturating_sub(self.last_heartbeat)
	}

	/// Strictly-under-window liveness check.
	pub fn is_live(&self, now: u64) -> bool {
		self.heartbeat_age(now) < LIVENESS_WINDOW_SECS
	}

	/// Refreshes the heartbeat timestamp in place.
	pub fn touch(&mut self, now: u64) {
		self.last_heartbeat = now;
	}

	fn to_line(&self) -> String {
		format!(
			"{},{},{},{},{},{},{},{}",
			sanitize_field(&self.document_title),
			self.document_path,
			self.session_id,
			self.port,
			self.hostname,
			self.process_id,
			self.registered_at,
			self.last_heartbeat,
		)
	}

	fn from_line(line: &str) -> Option<Self> {
		let mut tail = [""; TAIL_FIELDS];
		let mut rest = line;
		// Peel the structural tail off from the right; whatever remains is
		// the title,path head.
		for slot in tail.iter_mut().rev() {
			let idx = rest.rfind(',')?;
			*slot = &rest[idx + 1..];
			rest = &rest[..idx];
		}
		let (title, path) = rest.split_once(',')?;
		let [session_id, port, hostname, process_id, registered_at, last_heartbeat] = tail;
		if session_id.is_empty() || hostname.is_empty() {
			return None;
		}
		Some(Self {
			session_id: session_id.to_string(),
			document_title: title.to_string(),
			document_path: path.to_string(),
			port: port.parse().ok()?,
			hostname: hostname.to_string(),
			process_id: process_id.parse().ok()?,
			registered_at: registered_at.parse().ok()?,
			last_heartbeat: last_heartbeat.parse().ok()?,
		})
	}
}

/// Handle on the shared registry file.
#[derive(Debug, Clone)]
pub struct SessionRegistry {
	path: PathBuf,
}

impl SessionRegistry {
	pub fn new(path: impl Into<PathBuf>) -> Self {
		Self { path: path.into() }
	}

	/// Registry under the shared state directory.
	pub fn open(state_dir: &Path) -> Self {
		Self::new(state_dir.join(REGISTRY_FILE))
	}

	pub fn path(&self) -> &Path {
		&self.path
	}

	/// Idempotently writes/overwrites the caller's own entry.
	///
	/// Every other line, including ones this reader cannot parse, is carried
	/// over verbatim: a half-written line from a concurrent writer must
	/// survive our rewrite. The replacement file lands via rename so readers
	/// never observe a torn registry.
	pub fn register(&self, record: &SessionRecord) -> crate::Result<()> {
		if let Some(parent) = self.path.parent() {
			fs::create_dir_all(parent)?;
		}

		let existing = fs::read_to_string(&self.path).unwrap_or_default();
		let mut lines: Vec<String> = existing
			.lines()
			.filter(|line| {
				SessionRecord::from_line(line).is_none_or(|r| r.session_id != record.session_id)
			})
			.map(str::to_string)
			.collect();
		lines.push(record.to_line());

		let tmp = self.path.with_extension(format!("tmp.{}", std::process::id()));
		fs::write(&tmp, lines.join("\n") + "\n")?;
		fs::rename(&tmp, &self.path)?;
		debug!(target = "bq.registry", session_id = %record.session_id, port = record.port, "registered session");
		Ok(())
	}

	/// Re-registers with a fresh heartbeat timestamp.
	pub fn heartbeat(&self, record: &mut SessionRecord, now: u64) -> crate::Result<()> {
		record.touch(now);
		self.register(record)
	}

	/// Every parseable record, regardless of age.
	pub fn list_all(&self) -> Vec<SessionRecord> {
		let content = match fs::read_to_string(&self.path) {
			Ok(c) => c,
			// No registry yet means no sessions, not a failure.
			Err(_) => return Vec::new(),
		};
		content
			.lines()
			.map(str::trim)
			.filter(|line| !line.is_empty() && !line.starts_with('#'))
			.filter_map(SessionRecord::from_line)
			.collect()
	}

	/// Records whose heartbeat age is strictly under the liveness window.
	/// Malformed lines are skipped, never an error.
	pub fn list_live(&self, now: u64) -> Vec<SessionRecord> {
		self.list_all().into_iter().filter(|r| r.is_live(now)).collect()
	}
}

fn sanitize_field(value: &str) -> String {
	value.replace(',', " ").replace('\n', " ")
}

/// Current Unix timestamp in seconds.
pub fn now_ts() -> u64 {
	std::time::SystemTime::now()
		.duration_since(std::time::UNIX_EPOCH)
		.unwrap_or_default()
		.as_secs()
}
