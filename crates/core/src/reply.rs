use serde_json::json;

use crate::models::{ChatReply, MatchResult, ReplySource};

pub const REPLY_HEADER: &str = "**¡Aquí tienes la información que necesitas!**";
pub const REPLY_FOOTER: &str = "Si tienes más dudas, ¡no dudes en preguntar!";
pub const CLARIFICATION_TEXT: &str =
    "No encontré una respuesta para tu consulta. ¿Podrías reformularla o elegir uno de estos temas?";

/// What the agent decided to answer with for a single turn.
#[derive(Debug, Clone)]
pub enum ReplyOutcome {
    Faq(MatchResult),
    Generated { text: String, model: String },
    Clarification { suggestions: Vec<String> },
}

pub fn frame_answer(body: &str) -> String {
    format!("{REPLY_HEADER}\n\n{}\n\n{REPLY_FOOTER}", body.trim())
}

pub fn compose_reply(session_id: &str, normalized: &str, outcome: ReplyOutcome) -> ChatReply {
    match outcome {
        ReplyOutcome::Faq(MatchResult::Matched {
            intent,
            answer,
            variant,
        }) => ChatReply {
            session_id: session_id.to_string(),
            reply_text: frame_answer(&answer),
            source: ReplySource::Faq,
            json_payload: json!({
                "normalized": normalized,
                "intent": intent,
                "variant": variant,
            }),
            intent: Some(intent),
            matched_variant: Some(variant),
            suggestions: Vec::new(),
        },
        ReplyOutcome::Faq(MatchResult::NoMatch) => {
            let outcome = ReplyOutcome::Clarification {
                suggestions: Vec::new(),
            };
            compose_reply(session_id, normalized, outcome)
        }
        ReplyOutcome::Generated { text, model } => ChatReply {
            session_id: session_id.to_string(),
            reply_text: frame_answer(&text),
            source: ReplySource::Generated,
            intent: None,
            matched_variant: None,
            suggestions: Vec::new(),
            json_payload: json!({
                "normalized": normalized,
                "generator": model,
            }),
        },
        ReplyOutcome::Clarification { suggestions } => {
            let mut reply_text = CLARIFICATION_TEXT.to_string();
            for suggestion in &suggestions {
                reply_text.push_str("\n- ");
                reply_text.push_str(suggestion);
            }

            ChatReply {
                session_id: session_id.to_string(),
                reply_text,
                source: ReplySource::Clarification,
                intent: None,
                matched_variant: None,
                json_payload: json!({
                    "normalized": normalized,
                    "no_match": true,
                }),
                suggestions,
            }
        }
    }
}
