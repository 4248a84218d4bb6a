//! Cross-session query dispatch: registry, auth, fan-out engine, and the
//! persisted selection store.

pub mod chord;
pub mod dispatch;
pub mod error;
pub mod model;
pub mod registry;
pub mod selection;
pub mod token;

pub use dispatch::{DispatchEngine, DispatchOutcome, TargetFailure};
pub use error::{BqError, Result};
pub use model::{Document, DocumentSet, Element, Evaluate};
pub use registry::{LIVENESS_WINDOW_SECS, SessionRecord, SessionRegistry, now_ts};
pub use selection::{SelectionEntry, SelectionStore};
pub use token::AuthToken;
