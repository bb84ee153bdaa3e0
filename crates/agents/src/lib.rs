use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;

use anyhow::Result;
use chrono::{Duration, Utc};
use faq_core::{
    compose_reply, CatalogOverview, ChatInput, ChatReply, ConversationSession, ConversationTurn,
    FeedbackRecord, FeedbackSummary, IntentMatcher, MatchResult, ReplyOutcome, Speaker,
};
use faq_ml::{GenerationError, GenerationRequest, HistoryTurn, TextGenerator};
use faq_observability::AppMetrics;
use faq_storage::{FeedbackRepository, SessionRepository};
use parking_lot::Mutex;
use serde::Serialize;
use tokio::sync::Mutex as TurnLock;
use tracing::{info, instrument, warn};
use uuid::Uuid;

pub const MAX_SESSION_TURNS: usize = 40;
pub const SESSION_TTL_HOURS: i64 = 24;
const MAX_SUGGESTIONS: usize = 3;

#[derive(Debug, Clone, Serialize)]
pub struct Inspection {
    pub query: String,
    pub normalized: String,
    pub result: MatchResult,
}

#[derive(Clone)]
pub struct FaqAgent<S, G>
where
    S: SessionRepository + FeedbackRepository,
    G: TextGenerator,
{
    matcher: Arc<IntentMatcher>,
    generator: Arc<G>,
    store: Arc<S>,
    metrics: Arc<AppMetrics>,
    // One turn at a time per session, otherwise concurrent upserts drop turns.
    session_locks: Arc<Mutex<HashMap<String, Arc<TurnLock<()>>>>>,
}

impl<S, G> FaqAgent<S, G>
where
    S: SessionRepository + FeedbackRepository,
    G: TextGenerator,
{
    pub fn new(
        matcher: Arc<IntentMatcher>,
        generator: Arc<G>,
        store: Arc<S>,
        metrics: Arc<AppMetrics>,
    ) -> Self {
        Self {
            matcher,
            generator,
            store,
            metrics,
            session_locks: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    #[instrument(skip(self, input))]
    pub async fn handle_chat(&self, input: ChatInput) -> Result<ChatReply> {
        let started = Instant::now();
        self.metrics.inc_request();

        let session_id = input
            .session_id
            .filter(|id| !id.trim().is_empty())
            .unwrap_or_else(|| Uuid::new_v4().to_string());

        let lock = self.session_lock(&session_id);
        let reply = {
            let _turn = lock.lock().await;
            self.run_turn(&session_id, &input.text).await
        };
        self.release_session_lock(&session_id, lock);
        let reply = reply?;

        self.metrics.observe_latency(started.elapsed());
        info!(
            session_id = %session_id,
            intent = reply.intent.as_deref().unwrap_or("-"),
            source = reply.source.as_str(),
            "chat handled"
        );

        Ok(reply)
    }

    async fn run_turn(&self, session_id: &str, text: &str) -> Result<ChatReply> {
        let mut session = self
            .store
            .load_session(session_id)
            .await?
            .unwrap_or_else(|| ConversationSession {
                session_id: session_id.to_string(),
                expires_at: Utc::now() + Duration::hours(SESSION_TTL_HOURS),
                turns: Vec::new(),
            });

        let normalized = self.matcher.normalize(text);
        let outcome = match self.matcher.match_normalized(&normalized) {
            matched @ MatchResult::Matched { .. } => {
                self.metrics.inc_faq_hit();
                ReplyOutcome::Faq(matched)
            }
            MatchResult::NoMatch => {
                self.metrics.inc_no_match();
                self.fallback_outcome(text, &session).await
            }
        };

        let reply = compose_reply(session_id, &normalized, outcome);

        session.expires_at = Utc::now() + Duration::hours(SESSION_TTL_HOURS);
        session.turns.push(ConversationTurn {
            at: Utc::now(),
            user_text: text.to_string(),
            bot_text: reply.reply_text.clone(),
            source: reply.source,
            intent: reply.intent.clone(),
        });
        if session.turns.len() > MAX_SESSION_TURNS {
            let keep_from = session.turns.len() - MAX_SESSION_TURNS;
            session.turns = session.turns.split_off(keep_from);
        }
        self.store.upsert_session(&session).await?;

        Ok(reply)
    }

    fn session_lock(&self, session_id: &str) -> Arc<TurnLock<()>> {
        self.session_locks
            .lock()
            .entry(session_id.to_string())
            .or_default()
            .clone()
    }

    fn release_session_lock(&self, session_id: &str, lock: Arc<TurnLock<()>>) {
        let mut locks = self.session_locks.lock();
        // The map and `lock` are the only holders: no turn is waiting.
        if Arc::strong_count(&lock) == 2 {
            locks.remove(session_id);
        }
    }

    async fn fallback_outcome(&self, query: &str, session: &ConversationSession) -> ReplyOutcome {
        let request = GenerationRequest::new(query, history_of(session));

        match self.generator.generate(&request).await {
            Ok(text) => {
                self.metrics.inc_fallback();
                ReplyOutcome::Generated {
                    text,
                    model: self.generator.model_name().to_string(),
                }
            }
            Err(GenerationError::Disabled) => ReplyOutcome::Clarification {
                suggestions: self.suggestions_for(query),
            },
            Err(error) => {
                self.metrics.inc_fallback();
                self.metrics.inc_fallback_error();
                warn!(error = %error, model = self.generator.model_name(), "fallback generation failed");
                ReplyOutcome::Clarification {
                    suggestions: self.suggestions_for(query),
                }
            }
        }
    }

    fn suggestions_for(&self, query: &str) -> Vec<String> {
        let suggestions = self.matcher.suggest(query, MAX_SUGGESTIONS);
        if suggestions.is_empty() {
            self.matcher.suggested_questions().to_vec()
        } else {
            suggestions
        }
    }

    pub fn inspect(&self, query: &str) -> Inspection {
        let normalized = self.matcher.normalize(query);
        let result = self.matcher.match_normalized(&normalized);
        Inspection {
            query: query.to_string(),
            normalized,
            result,
        }
    }

    /// Starter questions shown when a conversation opens.
    pub fn suggestions(&self) -> &[String] {
        self.matcher.suggested_questions()
    }

    pub fn catalog_overview(&self) -> CatalogOverview {
        self.matcher.overview()
    }

    pub fn fallback_model(&self) -> &str {
        self.generator.model_name()
    }

    pub async fn history(&self, session_id: &str) -> Result<Option<ConversationSession>> {
        self.store.load_session(session_id).await
    }

    pub async fn reset_session(&self, session_id: &str) -> Result<bool> {
        let removed = self.store.clear_session(session_id).await?;
        info!(session_id = %session_id, removed, "session reset");
        Ok(removed)
    }

    pub async fn submit_feedback(
        &self,
        session_id: Option<String>,
        helpful: bool,
        comment: Option<String>,
    ) -> Result<FeedbackRecord> {
        let record = FeedbackRecord {
            feedback_id: Uuid::new_v4().to_string(),
            session_id,
            helpful,
            comment: comment
                .map(|value| value.trim().to_string())
                .filter(|value| !value.is_empty()),
            created_at: Utc::now(),
        };
        self.store.record_feedback(record.clone()).await?;
        Ok(record)
    }

    pub async fn feedback_summary(&self) -> Result<FeedbackSummary> {
        self.store.feedback_summary().await
    }

    pub async fn purge_expired_sessions(&self) -> Result<u64> {
        self.store.purge_expired(Utc::now()).await
    }
}

fn history_of(session: &ConversationSession) -> Vec<HistoryTurn> {
    session
        .turns
        .iter()
        .flat_map(|turn| {
            [
                HistoryTurn {
                    speaker: Speaker::User,
                    text: turn.user_text.clone(),
                },
                HistoryTurn {
                    speaker: Speaker::Bot,
                    text: turn.bot_text.clone(),
                },
            ]
        })
        .collect()
}
