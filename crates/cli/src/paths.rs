//! Shared state directory resolution.
//!
//! Every session on a machine must resolve the same directory, since the
//! registry, token, and selection store in it are the cross-session contract.

use std::path::{Path, PathBuf};

/// Resolves the shared state directory.
///
/// Priority: explicit `--state-dir`, then `BQ_STATE_DIR`, then
/// `$XDG_DATA_HOME/bq`, then `$HOME/.local/share/bq`.
pub fn state_dir(overridden: Option<&Path>) -> PathBuf {
	if let Some(dir) = overridden {
		return dir.to_path_buf();
	}
	if let Some(dir) = std::env::var_os("BQ_STATE_DIR") {
		return PathBuf::from(dir);
	}

	std::env::var_os("XDG_DATA_HOME")
		.map(PathBuf::from)
		.or_else(|| {
			std::env::var_os("HOME").map(|h| PathBuf::from(h).join(".local").join("share"))
		})
		.unwrap_or_else(|| PathBuf::from("."))
		.join("bq")
}
