//! The data-owning modules behind the rule engine.
//!
//! Each concept owns its state (in-memory DashMap tables), validates its
//! own input, and knows nothing about the others — all cross-concept
//! behavior lives in `crate::syncs`. Errors are payloads, not `Err`: a
//! rejected invocation is a fact for rules to match.

pub mod dictionary;
pub mod file_tracker;
pub mod library;
pub mod password;
pub mod sessioning;

pub use dictionary::Dictionary;
pub use file_tracker::FileTracker;
pub use library::Library;
pub use password::PasswordAuthentication;
pub use sessioning::Sessioning;
