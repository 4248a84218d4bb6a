//! Shared dispatch secret.
//!
//! One plain-text token per registry lifetime, stored next to the registry
//! file. The token is the sole authentication factor for dispatch calls;
//! transport identity is deliberately not verified (loopback trust model).

use std::fs;
use std::path::Path;

/// Token file name under the shared state directory.
pub const TOKEN_FILE: &str = "token";

/// The shared secret, trimmed of surrounding whitespace.
#[derive(Debug, Clone)]
pub struct AuthToken(String);

impl AuthToken {
	/// Wraps an existing secret, trimming stray whitespace/newlines.
	pub fn from_value(value: impl AsRef<str>) -> Self {
		Self(value.as_ref().trim().to_string())
	}

	/// Loads the shared token, generating and persisting one on first use.
	pub fn load_or_create(state_dir: &Path) -> crate::Result<Self> {
		let path = state_dir.join(TOKEN_FILE);
		match fs::read_to_string(&path) {
			Ok(content) if !content.trim().is_empty() => Ok(Self::from_value(content)),
			_ => {
				fs::create_dir_all(state_dir)?;
				let token = generate_token();
				fs::write(&path, &token)?;
				#[cfg(unix)]
				{
					use std::os::unix::fs::PermissionsExt;
					fs::set_permissions(&path, fs::Permissions::from_mode(0o600))?;
				}
				Ok(Self(token))
			}
		}
	}

	/// Raw secret, for attaching to outbound requests.
	pub fn expose(&self) -> &str {
		&self.0
	}

	/// Constant-time comparison against a presented token.
	///
	/// Only the length is allowed to short-circuit; byte differences are
	/// folded so the comparison time does not depend on where they occur.
	pub fn verify(&self, presented: &str) -> bool {
		let ours = self.0.as_bytes();
		let theirs = presented.trim().as_bytes();
		if ours.len() != theirs.len() {
			return false;
		}
		let mut diff = 0u8;
		for (a, b) in ours.iter().zip(theirs) {
			diff |= a ^ b;
		}
		diff == 0
	}
}

fn generate_token() -> String {
	use std::time::{SystemTime, UNIX_EPOCH};
	let seed = SystemTime::now()
		.duration_since(UNIX_EPOCH)
		.unwrap_or_default()
		.as_nanos();
	let pid = u128::from(std::process::id());
	format!("{:032x}", seed.rotate_left(17) ^ (pid << 64) ^ 0xDEAD_BEEF_CAFE_BABE)
}

#[cfg(test)]
mod tests {
	use tempfile::tempdir;

	use super::*;

	#[test]
	fn verify_accepts_exact_and_padded_input() {
		let token = AuthToken::from_value("secret-1\n");
		assert!(token.verify("secret-1"));
		assert!(token.verify("  secret-1\n"));
	}

	#[test]
	fn verify_rejects_wrong_or_truncated_token() {
		let token = AuthToken::from_value("secret-1");
		assert!(!token.verify("secret-2"));
		assert!(!token.verify("secret"));
		assert!(!token.verify(""));
	}

	#[test]
	fn load_or_create_persists_and_reloads() {
		let dir = tempdir().unwrap();
		let first = AuthToken::load_or_create(dir.path()).unwrap();
		let second = AuthToken::load_or_create(dir.path()).unwrap();
		assert_eq!(first.expose(), second.expose());
		assert!(!first.expose().is_empty());
	}

	#[test]
	fn empty_token_file_is_regenerated() {
		let dir = tempdir().unwrap();
		fs::write(dir.path().join(TOKEN_FILE), "\n").unwrap();
		let token = AuthToken::load_or_create(dir.path()).unwrap();
		assert!(!token.expose().is_empty());
	}
}
