//! Two-key chord detection.
//!
//! A chord is two key presses inside one arming window: the first press arms
//! a cancellable timer, the second press within the window fires, and timer
//! expiry resets to idle. The state machine itself is synchronous and owns
//! no timer; [`ChordDetector`] is the async shell that holds the one
//! outstanding timer task and aborts it on every transition out of armed.

use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tracing::trace;

/// Detector state: idle, or armed and waiting for the second key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChordState {
	Idle,
	Armed { first: String },
}

/// Outcome of one key press.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChordEvent {
	/// First key of a potential chord; the arming window is now open.
	Armed,
	/// Second key arrived inside the window.
	Fired { first: String, second: String },
}

/// The pure two-state machine, driven by `press` and `expire`.
#[derive(Debug, Default)]
pub struct ChordMachine {
	state: Option<String>,
}

impl ChordMachine {
	pub fn new() -> Self {
		Self::default()
	}

	pub fn state(&self) -> ChordState {
		match &self.state {
			Some(first) => ChordState::Armed { first: first.clone() },
			None => ChordState::Idle,
		}
	}

	/// Feeds one key press. Idle arms; armed fires with whatever key came
	/// second, then returns to idle.
	pub fn press(&mut self, key: &str) -> ChordEvent {
		match self.state.take() {
			None => {
				self.state = Some(key.to_string());
				ChordEvent::Armed
			}
			Some(first) => ChordEvent::Fired { first, second: key.to_string() },
		}
	}

	/// Arming window elapsed; returns `true` if the machine was armed.
	pub fn expire(&mut self) -> bool {
		self.state.take().is_some()
	}
}

/// Async shell pairing the machine with one cancellable timer task.
pub struct ChordDetector {
	machine: Arc<Mutex<ChordMachine>>,
	window: Duration,
	timer: Option<tokio::task::JoinHandle<()>>,
}

impl ChordDetector {
	pub fn new(window: Duration) -> Self {
		Self {
			machine: Arc::new(Mutex::new(ChordMachine::new())),
			window,
			timer: None,
		}
	}

	pub fn is_armed(&self) -> bool {
		matches!(self.machine.lock().state(), ChordState::Armed { .. })
	}

	/// Feeds one key press, managing the arming timer.
	pub fn press(&mut self, key: &str) -> ChordEvent {
		// Any press supersedes the outstanding window.
		if let Some(timer) = self.timer.take() {
			timer.abort();
		}

		let event = self.machine.lock().press(key);
		if matches!(event, ChordEvent::Armed) {
			let machine = Arc::clone(&self.machine);
			let window = self.window;
			self.timer = Some(tokio::spawn(async move {
				tokio::time::sleep(window).await;
				if machine.lock().expire() {
					trace!(target = "bq.chord", "arming window elapsed, chord reset");
				}
			}));
		}
		event
	}
}

impl Drop for ChordDetector {
	fn drop(&mut self) {
		if let Some(timer) = self.timer.take() {
			timer.abort();
		}
	}
}
