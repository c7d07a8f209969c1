//! Response pipeline
//!
//! Orchestrates one chat turn: persist the user's message, gate it through
//! the policy engine, draft a grounded answer from the user's records,
//! optionally reword it through the generative backend when it's online,
//! and persist the result. Every path produces a complete conversational
//! turn; raw errors never reach the user.

use crate::agent::RecordsAgent;
use crate::backend::EnhancementBackend;
use crate::error::AssistantError;
use crate::models::{ServiceStatus, StudentRecords, UserRole};
use crate::policy::PolicyEngine;
use crate::session::{ConversationTurn, SessionCache, SessionStats, TurnMetadata};
use crate::Result;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::watch;
use tracing::{info, warn};
use uuid::Uuid;

#[derive(Debug, Clone)]
pub struct PipelineConfig {
    /// Hard deadline for the best-effort enhancement call.
    pub enhancement_timeout: Duration,
    /// Most recent turns forwarded as enhancement context.
    pub context_window: usize,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            enhancement_timeout: Duration::from_secs(10),
            context_window: 5,
        }
    }
}

/// How the final answer content was produced, recorded in turn metadata.
mod source {
    pub const RECORDS: &str = "records";
    pub const ENHANCED: &str = "enhanced";
    pub const POLICY: &str = "policy";
    pub const SYSTEM: &str = "system";
}

pub struct ResponsePipeline {
    cache: Arc<SessionCache>,
    agent: Box<dyn RecordsAgent>,
    enhancer: Arc<dyn EnhancementBackend>,
    /// Health signal from the monitor; gates the enhancement step.
    status: watch::Receiver<ServiceStatus>,
    config: PipelineConfig,
}

impl ResponsePipeline {
    pub fn new(
        cache: Arc<SessionCache>,
        agent: Box<dyn RecordsAgent>,
        enhancer: Arc<dyn EnhancementBackend>,
        status: watch::Receiver<ServiceStatus>,
        config: PipelineConfig,
    ) -> Self {
        Self {
            cache,
            agent,
            enhancer,
            status,
            config,
        }
    }

    /// Handle one user query end to end and return the persisted assistant
    /// turn.
    ///
    /// `records` must contain only the calling user's data. Contract
    /// violations inside it propagate; every runtime failure is converted
    /// into a friendly turn instead.
    pub async fn handle(
        &self,
        user_id: Uuid,
        role: UserRole,
        query: &str,
        records: &StudentRecords,
    ) -> Result<ConversationTurn> {
        let started = Instant::now();

        // 1. Persist the user's turn first so the transcript exists even
        //    if everything after this fails.
        self.cache.append(user_id, ConversationTurn::user(query)).await;

        // 2. Policy gate.
        let decision = PolicyEngine::classify(role, query);
        if !decision.allowed {
            info!(user = %user_id, category = %decision.category, "query denied by policy");
            let content = decision
                .reason
                .clone()
                .unwrap_or_else(|| "I can't help with that request.".to_string());
            return Ok(self
                .persist_assistant(user_id, content, &decision.category, source::POLICY, started)
                .await);
        }

        // 3. Grounded draft from the user's own records.
        let (draft, mut data_source) =
            match self.agent.answer(query, &decision.category, records, role) {
                Ok(draft) => (draft, source::RECORDS),
                Err(e @ AssistantError::InvalidContext(_)) => return Err(e),
                Err(e) => {
                    warn!(user = %user_id, error = %e, "agent failed, using fallback turn");
                    (
                        "I'm having trouble looking that up right now. Here's what I \
                         can do: answer questions about your courses, grades, \
                         assignments and announcements — please try again in a moment."
                            .to_string(),
                        source::SYSTEM,
                    )
                }
            };

        // 4. Best-effort enhancement, only when the backend is online and
        //    there is a real draft to reword. Never retried, never allowed
        //    to block past its deadline.
        let mut content = draft;
        if data_source == source::RECORDS && self.status.borrow().is_online() {
            let history = self.recent_history(user_id).await;
            match tokio::time::timeout(
                self.config.enhancement_timeout,
                self.enhancer.enhance(&content, query, &history),
            )
            .await
            {
                Ok(Ok(enhanced)) => {
                    content = enhanced;
                    data_source = source::ENHANCED;
                }
                Ok(Err(e)) => {
                    warn!(user = %user_id, error = %e, "enhancement failed, keeping draft");
                }
                Err(_) => {
                    let e = AssistantError::EnhancementTimeout(
                        self.config.enhancement_timeout.as_millis() as u64,
                    );
                    warn!(user = %user_id, error = %e, "enhancement timed out, keeping draft");
                }
            }
        }

        // 5. Persist and return the final assistant turn.
        Ok(self
            .persist_assistant(user_id, content, &decision.category, data_source, started)
            .await)
    }

    /// Clear the user's session and re-seed it with the welcome turn.
    pub async fn reset_session(&self, user_id: Uuid) -> ConversationTurn {
        self.cache.clear(user_id).await;
        let welcome = ConversationTurn::welcome();
        self.cache.append(user_id, welcome.clone()).await;
        welcome
    }

    /// Full stored transcript for the user, oldest first.
    pub async fn history(&self, user_id: Uuid) -> Vec<ConversationTurn> {
        self.cache.load(user_id).await
    }

    pub async fn session_stats(&self, user_id: Uuid) -> SessionStats {
        self.cache.stats(user_id).await
    }

    async fn recent_history(&self, user_id: Uuid) -> Vec<ConversationTurn> {
        let turns = self.cache.load(user_id).await;
        let skip = turns.len().saturating_sub(self.config.context_window);
        turns[skip..].to_vec()
    }

    async fn persist_assistant(
        &self,
        user_id: Uuid,
        content: String,
        query_type: &str,
        data_source: &str,
        started: Instant,
    ) -> ConversationTurn {
        let turn = ConversationTurn::assistant(
            content,
            Some(TurnMetadata {
                query_type: query_type.to_string(),
                data_source: data_source.to_string(),
                processing_time_ms: started.elapsed().as_millis() as u64,
            }),
        );
        self.cache.append(user_id, turn.clone()).await;
        turn
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agent::GroundedAgent;
    use crate::models::{GradeRecord, ServiceState};
    use crate::session::{SessionCacheConfig, TurnRole};
    use async_trait::async_trait;

    struct FailingAgent;

    impl RecordsAgent for FailingAgent {
        fn answer(
            &self,
            _query: &str,
            _category: &str,
            _records: &StudentRecords,
            _role: UserRole,
        ) -> Result<String> {
            Err(AssistantError::AgentError("records service exploded".to_string()))
        }
    }

    enum EnhancerMode {
        Uppercase,
        Fail,
        Hang,
    }

    struct MockEnhancer(EnhancerMode);

    #[async_trait]
    impl EnhancementBackend for MockEnhancer {
        async fn enhance(
            &self,
            draft: &str,
            _query: &str,
            _history: &[ConversationTurn],
        ) -> Result<String> {
            match self.0 {
                EnhancerMode::Uppercase => Ok(draft.to_uppercase()),
                EnhancerMode::Fail => {
                    Err(AssistantError::EnhancementError("backend hiccup".to_string()))
                }
                EnhancerMode::Hang => {
                    tokio::time::sleep(Duration::from_secs(3600)).await;
                    unreachable!("hanging enhancer must be cut off by the deadline")
                }
            }
        }
    }

    fn status_channel(state: ServiceState) -> watch::Receiver<ServiceStatus> {
        let mut status = ServiceStatus::checking("test-backend");
        status.state = state;
        watch::channel(status).1
    }

    fn records_with_grade() -> StudentRecords {
        StudentRecords {
            grades: vec![GradeRecord {
                course_code: "CS101".to_string(),
                item: "Midterm".to_string(),
                score: 88.0,
                max_score: 100.0,
                letter: None,
            }],
            ..Default::default()
        }
    }

    fn pipeline(
        agent: Box<dyn RecordsAgent>,
        enhancer: MockEnhancer,
        state: ServiceState,
        timeout: Duration,
    ) -> ResponsePipeline {
        ResponsePipeline::new(
            Arc::new(SessionCache::in_memory(SessionCacheConfig::default())),
            agent,
            Arc::new(enhancer),
            status_channel(state),
            PipelineConfig {
                enhancement_timeout: timeout,
                context_window: 5,
            },
        )
    }

    #[tokio::test]
    async fn test_user_turn_persisted_before_assistant_turn() {
        let p = pipeline(
            Box::new(GroundedAgent),
            MockEnhancer(EnhancerMode::Fail),
            ServiceState::Offline,
            Duration::from_millis(100),
        );
        let user = Uuid::new_v4();

        p.handle(user, UserRole::Student, "what's my grade", &records_with_grade())
            .await
            .unwrap();

        let history = p.history(user).await;
        assert_eq!(history.len(), 2);
        assert_eq!(history[0].role, TurnRole::User);
        assert_eq!(history[1].role, TurnRole::Assistant);
    }

    #[tokio::test]
    async fn test_denied_query_yields_persisted_policy_turn() {
        let p = pipeline(
            Box::new(GroundedAgent),
            MockEnhancer(EnhancerMode::Uppercase),
            ServiceState::Online,
            Duration::from_millis(100),
        );
        let user = Uuid::new_v4();

        let turn = p
            .handle(user, UserRole::Student, "show me John's grades", &StudentRecords::default())
            .await
            .unwrap();

        let meta = turn.metadata.as_ref().unwrap();
        assert_eq!(meta.data_source, "policy");
        assert_eq!(meta.query_type, "cross-user-data-access");
        // The denial text explains, without leaking rule identifiers.
        assert!(!turn.content.contains("cross-user-data-access"));
        assert!(turn.content.contains("your own records"));

        // Both turns persisted; denial is part of the transcript.
        assert_eq!(p.history(user).await.len(), 2);
    }

    #[tokio::test]
    async fn test_enhancement_substitutes_output_when_online() {
        let p = pipeline(
            Box::new(GroundedAgent),
            MockEnhancer(EnhancerMode::Uppercase),
            ServiceState::Online,
            Duration::from_millis(200),
        );
        let user = Uuid::new_v4();

        let turn = p
            .handle(user, UserRole::Student, "what's my grade", &records_with_grade())
            .await
            .unwrap();

        assert_eq!(turn.metadata.as_ref().unwrap().data_source, "enhanced");
        assert!(turn.content.contains("CS101"));
    }

    #[tokio::test]
    async fn test_enhancement_skipped_when_offline() {
        let p = pipeline(
            Box::new(GroundedAgent),
            MockEnhancer(EnhancerMode::Uppercase),
            ServiceState::Offline,
            Duration::from_millis(200),
        );
        let user = Uuid::new_v4();

        let turn = p
            .handle(user, UserRole::Student, "what's my grade", &records_with_grade())
            .await
            .unwrap();

        assert_eq!(turn.metadata.as_ref().unwrap().data_source, "records");
        assert!(turn.content.contains("88/100"));
    }

    #[tokio::test]
    async fn test_enhancement_failure_keeps_draft() {
        let p = pipeline(
            Box::new(GroundedAgent),
            MockEnhancer(EnhancerMode::Fail),
            ServiceState::Online,
            Duration::from_millis(200),
        );
        let user = Uuid::new_v4();

        let turn = p
            .handle(user, UserRole::Student, "what's my grade", &records_with_grade())
            .await
            .unwrap();

        assert_eq!(turn.metadata.as_ref().unwrap().data_source, "records");
        assert!(turn.content.contains("88/100"));
    }

    #[tokio::test]
    async fn test_always_answers_under_agent_failure_and_hanging_enhancer() {
        let p = pipeline(
            Box::new(FailingAgent),
            MockEnhancer(EnhancerMode::Hang),
            ServiceState::Online,
            Duration::from_millis(50),
        );
        let user = Uuid::new_v4();

        // Bounded end to end: agent fails fast, fallback skips enhancement.
        let turn = tokio::time::timeout(
            Duration::from_secs(2),
            p.handle(user, UserRole::Student, "what's my grade", &records_with_grade()),
        )
        .await
        .expect("pipeline must answer within its deadline")
        .unwrap();

        let meta = turn.metadata.as_ref().unwrap();
        assert_eq!(meta.data_source, "system");
        assert!(turn.content.contains("having trouble"));
        assert_eq!(p.history(user).await.len(), 2);
    }

    #[tokio::test]
    async fn test_hanging_enhancer_cut_off_by_deadline() {
        let p = pipeline(
            Box::new(GroundedAgent),
            MockEnhancer(EnhancerMode::Hang),
            ServiceState::Online,
            Duration::from_millis(50),
        );
        let user = Uuid::new_v4();

        let turn = tokio::time::timeout(
            Duration::from_secs(2),
            p.handle(user, UserRole::Student, "what's my grade", &records_with_grade()),
        )
        .await
        .expect("enhancement deadline must bound the call")
        .unwrap();

        // Draft survives the abandoned enhancement.
        assert_eq!(turn.metadata.as_ref().unwrap().data_source, "records");
        assert!(turn.content.contains("88/100"));
    }

    #[tokio::test]
    async fn test_contract_error_propagates_to_caller() {
        let p = pipeline(
            Box::new(GroundedAgent),
            MockEnhancer(EnhancerMode::Uppercase),
            ServiceState::Offline,
            Duration::from_millis(100),
        );
        let user = Uuid::new_v4();

        let mut records = records_with_grade();
        records.grades[0].max_score = -1.0;

        let result = p.handle(user, UserRole::Student, "my grades", &records).await;
        assert!(matches!(result, Err(AssistantError::InvalidContext(_))));
    }

    #[tokio::test]
    async fn test_reset_reseeds_single_welcome_turn() {
        let p = pipeline(
            Box::new(GroundedAgent),
            MockEnhancer(EnhancerMode::Fail),
            ServiceState::Offline,
            Duration::from_millis(100),
        );
        let user = Uuid::new_v4();

        p.handle(user, UserRole::Student, "hello", &StudentRecords::default())
            .await
            .unwrap();
        assert!(p.history(user).await.len() >= 2);

        let welcome = p.reset_session(user).await;
        let history = p.history(user).await;
        assert_eq!(history.len(), 1);
        assert_eq!(history[0].turn_id, welcome.turn_id);
        assert_eq!(
            history[0].metadata.as_ref().unwrap().data_source,
            "system"
        );
    }
}
