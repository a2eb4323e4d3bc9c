//! Event dispatch and conversation storage.
//!
//! Provides:
//! - `Dispatcher` - Route events to handlers under a concurrency ceiling
//! - Conversation storage implementations (memory)

pub mod dispatcher;
pub mod storage;

pub use dispatcher::{Dispatcher, DispatcherConfig, Outcome};
