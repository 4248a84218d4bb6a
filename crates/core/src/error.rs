use thiserror::Error;

pub type Result<T> = std::result::Result<T, BqError>;

#[derive(Debug, Error)]
pub enum BqError {
	/// The target rejected our token. The target is counted unreachable;
	/// dispatch continues.
	#[error("authentication rejected by session {session_id}")]
	Auth { session_id: String },

	/// Timeout, connection refused, or a malformed HTTP exchange. Same
	/// treatment as an auth rejection.
	#[error("transport failure for session {session_id}: {message}")]
	Transport { session_id: String, message: String },

	/// The target's evaluation faulted; the fault arrived inside the
	/// envelope, never as a transport error.
	#[error("evaluation fault in session {session_id}: {message}")]
	Fault { session_id: String, message: String },

	/// The overall dispatch was cancelled before this target answered.
	#[error("dispatch cancelled before session {session_id} answered")]
	Cancelled { session_id: String },

	#[error("no document titled '{0}' is open in this session")]
	UnknownDocument(String),

	#[error(transparent)]
	Io(#[from] std::io::Error),

	#[error(transparent)]
	Json(#[from] serde_json::Error),

	#[error(transparent)]
	Http(#[from] reqwest::Error),
}

impl BqError {
	/// Session the failure is attributed to, when there is one.
	pub fn session_id(&self) -> Option<&str> {
		match self {
			BqError::Auth { session_id }
			| BqError::Transport { session_id, .. }
			| BqError::Fault { session_id, .. }
			| BqError::Cancelled { session_id } => Some(session_id),
			_ => None,
		}
	}
}
