//! Campus Assistant Resilience & Policy Layer
//!
//! The availability and safety core behind the university dashboard's AI
//! assistant:
//! - Monitors the remote AI backend with bounded retries and backoff
//! - Keeps a persisted, bounded conversation history per user
//! - Classifies queries against role capabilities before dispatch
//! - Composes answers from a layered fallback chain:
//!   specialized agent → generative enhancement → static fallback
//!
//! PIPELINE:
//! INPUT → PERSIST → POLICY GATE → GROUNDED DRAFT → ENHANCE? → PERSIST

pub mod agent;
pub mod api;
pub mod backend;
pub mod error;
pub mod health;
pub mod models;
pub mod pipeline;
pub mod policy;
pub mod retry;
pub mod session;

pub use error::Result;

// Re-export common types
pub use models::*;
pub use policy::PolicyEngine;
