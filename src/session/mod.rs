//! Bounded per-user conversation history
//!
//! Durable when a Postgres URL is configured, in-memory otherwise, and
//! degrades to in-memory if the store fails mid-flight.

pub mod cache;
pub mod turn;

pub use cache::{SessionCache, SessionCacheConfig, SessionStats};
pub use turn::{ConversationTurn, TurnMetadata, TurnRole};
