use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// One canonical topic of the catalog, its answer and the phrases that trigger it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FaqEntry {
    pub intent: String,
    pub answer: String,
    pub variants: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum MatchResult {
    Matched {
        intent: String,
        answer: String,
        variant: String,
    },
    NoMatch,
}

impl MatchResult {
    pub fn is_match(&self) -> bool {
        matches!(self, Self::Matched { .. })
    }

    pub fn intent(&self) -> Option<&str> {
        match self {
            Self::Matched { intent, .. } => Some(intent.as_str()),
            Self::NoMatch => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReplySource {
    Faq,
    Generated,
    Clarification,
}

impl ReplySource {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Faq => "faq",
            Self::Generated => "generated",
            Self::Clarification => "clarification",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Speaker {
    User,
    Bot,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConversationTurn {
    pub at: DateTime<Utc>,
    pub user_text: String,
    pub bot_text: String,
    pub source: ReplySource,
    pub intent: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConversationSession {
    pub session_id: String,
    pub expires_at: DateTime<Utc>,
    pub turns: Vec<ConversationTurn>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatInput {
    pub session_id: Option<String>,
    pub text: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatReply {
    pub session_id: String,
    pub reply_text: String,
    pub source: ReplySource,
    pub intent: Option<String>,
    pub matched_variant: Option<String>,
    pub suggestions: Vec<String>,
    pub json_payload: Value,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FeedbackRecord {
    pub feedback_id: String,
    pub session_id: Option<String>,
    pub helpful: bool,
    pub comment: Option<String>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeedbackSummary {
    pub helpful: u64,
    pub not_helpful: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IntentOverview {
    pub intent: String,
    pub variants: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CatalogOverview {
    pub intents: Vec<IntentOverview>,
    pub suggested_questions: Vec<String>,
}
