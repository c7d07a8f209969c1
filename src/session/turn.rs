//! Conversation turn types
//!
//! A turn is immutable once written; the cache only appends, trims and
//! clears whole turns.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Sender of a turn
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum TurnRole {
    User,
    Assistant,
}

/// How an assistant turn was produced
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct TurnMetadata {
    /// Policy category the query classified into
    pub query_type: String,
    /// "records", "enhanced", "policy" or "system"
    pub data_source: String,
    pub processing_time_ms: u64,
}

/// A single message in a conversation session
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConversationTurn {
    pub turn_id: Uuid,
    pub role: TurnRole,
    pub content: String,
    pub timestamp: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub metadata: Option<TurnMetadata>,
}

impl ConversationTurn {
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            turn_id: Uuid::new_v4(),
            role: TurnRole::User,
            content: content.into(),
            timestamp: Utc::now(),
            metadata: None,
        }
    }

    pub fn assistant(content: impl Into<String>, metadata: Option<TurnMetadata>) -> Self {
        Self {
            turn_id: Uuid::new_v4(),
            role: TurnRole::Assistant,
            content: content.into(),
            timestamp: Utc::now(),
            metadata,
        }
    }

    /// Synthetic greeting a reset session is re-seeded with.
    pub fn welcome() -> Self {
        Self::assistant(
            "Hi! I'm your campus assistant. Ask me about your courses, \
             grades, assignments or announcements.",
            Some(TurnMetadata {
                query_type: "greeting".to_string(),
                data_source: "system".to_string(),
                processing_time_ms: 0,
            }),
        )
    }

    /// Rough serialized footprint, used by session stats.
    pub fn approx_size_bytes(&self) -> usize {
        // uuid + timestamp + role + framing is ~100 bytes serialized
        let metadata_len = self
            .metadata
            .as_ref()
            .map(|m| m.query_type.len() + m.data_source.len() + 24)
            .unwrap_or(0);
        100 + self.content.len() + metadata_len
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_user_turn_creation() {
        let turn = ConversationTurn::user("what's my grade in CS101");
        assert_eq!(turn.role, TurnRole::User);
        assert!(turn.metadata.is_none());
        assert!(turn.approx_size_bytes() > turn.content.len());
    }

    #[test]
    fn test_welcome_turn_is_system_assistant() {
        let turn = ConversationTurn::welcome();
        assert_eq!(turn.role, TurnRole::Assistant);
        let meta = turn.metadata.expect("welcome turn carries metadata");
        assert_eq!(meta.data_source, "system");
    }

    #[test]
    fn test_turn_serialization_roundtrip() {
        let turn = ConversationTurn::assistant(
            "You scored 92/100.",
            Some(TurnMetadata {
                query_type: "grades".to_string(),
                data_source: "records".to_string(),
                processing_time_ms: 12,
            }),
        );

        let json = serde_json::to_string(&turn).unwrap();
        let back: ConversationTurn = serde_json::from_str(&json).unwrap();
        assert_eq!(back.turn_id, turn.turn_id);
        assert_eq!(back.metadata, turn.metadata);
    }
}
