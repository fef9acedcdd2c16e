//! services/api/src/adapters/feedback_llm.rs
//!
//! This module contains the adapter that asks an OpenAI chat model to critique a poem.
//! It implements the `FeedbackService` port from the core crate and falls back to
//! the local heuristic whenever the model call or its answer is unusable.

use async_openai::{
    config::OpenAIConfig,
    error::OpenAIError,
    types::chat::{
        ChatCompletionRequestMessage, ChatCompletionRequestSystemMessageArgs,
        ChatCompletionRequestUserMessageArgs, CreateChatCompletionRequestArgs, ResponseFormat,
    },
    Client,
};
use async_trait::async_trait;
use raven_core::{
    domain::{Feedback, Poem},
    feedback::HeuristicFeedback,
    ports::{FeedbackService, PortError, PortResult},
};
use serde::Deserialize;
use tracing::warn;

const SYSTEM_INSTRUCTIONS: &str = r#"You are a warm but honest poetry mentor.
Read the poem and its theme, then answer with a single JSON object and nothing else:
{"score": <integer 3-10>, "strengths": [<short phrases>], "suggestions": [<short phrases>], "overall": "<two or three encouraging sentences>"}
Keep strengths and suggestions to at most four entries each."#;

//=========================================================================================
// The Main Adapter Struct
//=========================================================================================

/// An adapter that implements `FeedbackService` using an OpenAI-compatible LLM.
pub struct OpenAiFeedbackAdapter {
    client: Client<OpenAIConfig>,
    model: String,
    fallback: HeuristicFeedback,
}

impl OpenAiFeedbackAdapter {
    /// Creates a new `OpenAiFeedbackAdapter`.
    pub fn new(client: Client<OpenAIConfig>, model: String, fallback: HeuristicFeedback) -> Self {
        Self {
            client,
            model,
            fallback,
        }
    }

    async fn ask_model(&self, poem: &Poem) -> PortResult<Feedback> {
        let messages = vec![
            ChatCompletionRequestMessage::System(
                ChatCompletionRequestSystemMessageArgs::default()
                    .content(SYSTEM_INSTRUCTIONS)
                    .build()
                    .map_err(|e| PortError::Unexpected(e.to_string()))?,
            ),
            ChatCompletionRequestMessage::User(
                ChatCompletionRequestUserMessageArgs::default()
                    .content(format!(
                        "Theme: {}\nTitle: {}\n\n{}",
                        poem.theme, poem.title, poem.content
                    ))
                    .build()
                    .map_err(|e| PortError::Unexpected(e.to_string()))?,
            ),
        ];

        let request = CreateChatCompletionRequestArgs::default()
            .model(&self.model)
            .messages(messages)
            .response_format(ResponseFormat::JsonObject)
            .max_completion_tokens(400u32)
            .temperature(0.7)
            .build()
            .map_err(|e| PortError::Unexpected(e.to_string()))?;

        let response = self
            .client
            .chat()
            .create(request)
            .await
            .map_err(|e: OpenAIError| PortError::Unexpected(e.to_string()))?;

        let text = response
            .choices
            .first()
            .and_then(|choice| choice.message.content.clone())
            .ok_or_else(|| PortError::Unexpected("No critique generated".to_string()))?;

        parse_critique(&text)
    }
}

//=========================================================================================
// Answer Parsing
//=========================================================================================

#[derive(Deserialize)]
struct RawCritique {
    score: i64,
    #[serde(default)]
    strengths: Vec<String>,
    #[serde(default)]
    suggestions: Vec<String>,
    overall: String,
}

/// Reads the model's JSON answer, tolerating a surrounding code fence, and
/// clamps the score into the accepted band.
pub fn parse_critique(text: &str) -> PortResult<Feedback> {
    let trimmed = text.trim();
    let body = trimmed
        .strip_prefix("```json")
        .or_else(|| trimmed.strip_prefix("```"))
        .and_then(|rest| rest.strip_suffix("```"))
        .unwrap_or(trimmed)
        .trim();

    let raw: RawCritique = serde_json::from_str(body)
        .map_err(|e| PortError::Unexpected(format!("Unreadable critique: {e}")))?;
    if raw.overall.trim().is_empty() {
        return Err(PortError::Unexpected("Critique has no overall remark".to_string()));
    }

    Ok(Feedback {
        score: Feedback::clamp_score(raw.score),
        strengths: raw.strengths,
        suggestions: raw.suggestions,
        overall: raw.overall.trim().to_string(),
    })
}

//=========================================================================================
// `FeedbackService` Trait Implementation
//=========================================================================================

#[async_trait]
impl FeedbackService for OpenAiFeedbackAdapter {
    async fn critique(&self, poem: &Poem) -> PortResult<Feedback> {
        match self.ask_model(poem).await {
            Ok(feedback) => Ok(feedback),
            Err(e) => {
                warn!(poem_id = %poem.id, error = %e, "Model critique failed, using heuristic");
                self.fallback.critique(poem).await
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn plain_json_answer_is_parsed() {
        let feedback = parse_critique(
            r#"{"score": 8, "strengths": ["Imagery"], "suggestions": [], "overall": "Lovely."}"#,
        )
        .unwrap();
        assert_eq!(feedback.score, 8);
        assert_eq!(feedback.strengths, vec!["Imagery"]);
        assert_eq!(feedback.overall, "Lovely.");
    }

    #[test]
    fn fenced_answer_is_parsed_and_score_clamped() {
        let text = "```json\n{\"score\": 14, \"overall\": \"Bold work.\"}\n```";
        let feedback = parse_critique(text).unwrap();
        assert_eq!(feedback.score, 10);
        assert!(feedback.strengths.is_empty());
    }

    #[test]
    fn prose_or_empty_overall_is_rejected() {
        assert!(parse_critique("What a poem!").is_err());
        assert!(parse_critique(r#"{"score": 5, "overall": "  "}"#).is_err());
    }
}
