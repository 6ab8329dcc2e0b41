//! LLM-backed command extraction
//!
//! Sends the aggregated utterance plus session context to an
//! OpenAI-compatible chat-completions endpoint and parses the JSON reply
//! into candidate commands. Any transport or parse failure degrades to an
//! empty list; the extractor boundary never throws.

use async_trait::async_trait;
use serde::Deserialize;

use super::{CandidateCommand, CommandAction, CommandExtractor, ConversationTurn};
use crate::config::LlmConfig;

const SYSTEM_PROMPT: &str = "\
You convert restaurant inventory speech into JSON commands. \
Respond with only a JSON object {\"commands\": [...]} where each command is \
{\"action\": \"add\"|\"remove\"|\"set\"|\"undo\"|\"unknown\", \
\"item\": string, \"quantity\": number, \"unit\": string, \
\"confidence\": number between 0 and 1}. \
Omit fields you did not hear. Report what was actually said; never invent \
items or quantities. An utterance may contain several commands or none.";

/// Chat-completions request body
#[derive(serde::Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    max_tokens: u32,
    messages: Vec<ChatMessage<'a>>,
}

#[derive(serde::Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: String,
}

/// Chat-completions response body
#[derive(Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Deserialize)]
struct ChatChoice {
    message: ChatChoiceMessage,
}

#[derive(Deserialize)]
struct ChatChoiceMessage {
    content: String,
}

/// One command as the model reports it, all fields optional
#[derive(Debug, Deserialize)]
struct RawCommand {
    action: Option<String>,
    item: Option<String>,
    quantity: Option<f64>,
    unit: Option<String>,
    confidence: Option<f32>,
}

/// Extracts commands via an OpenAI-compatible chat endpoint
pub struct LlmExtractor {
    client: reqwest::Client,
    api_key: String,
    config: LlmConfig,
}

impl LlmExtractor {
    /// Create a new LLM extractor
    #[must_use]
    pub fn new(api_key: String, config: LlmConfig) -> Self {
        Self {
            client: reqwest::Client::new(),
            api_key,
            config,
        }
    }

    /// Build the user message carrying utterance and session context
    fn build_prompt(
        utterance: &str,
        conversation_history: &[ConversationTurn],
        recent_commands: &[CandidateCommand],
    ) -> String {
        let mut prompt = String::new();

        if !conversation_history.is_empty() {
            prompt.push_str("Recent conversation:\n");
            for turn in conversation_history {
                prompt.push_str("- ");
                prompt.push_str(&turn.text);
                prompt.push('\n');
            }
            prompt.push('\n');
        }

        if !recent_commands.is_empty() {
            prompt.push_str("Recent commands:\n");
            for cmd in recent_commands {
                prompt.push_str(&format!(
                    "- {} {} {} {}\n",
                    cmd.action.as_str(),
                    cmd.quantity.map_or_else(|| "?".to_string(), |q| q.to_string()),
                    cmd.unit.as_deref().unwrap_or("?"),
                    cmd.item.as_deref().unwrap_or("?"),
                ));
            }
            prompt.push('\n');
        }

        prompt.push_str("Utterance: ");
        prompt.push_str(utterance);
        prompt
    }

    /// Parse the model reply: `{"commands": [...]}` or a bare array
    /// (back-compat with earlier prompt versions)
    fn parse_reply(content: &str) -> Option<Vec<RawCommand>> {
        // Models occasionally fence the JSON despite instructions
        let trimmed = content
            .trim()
            .trim_start_matches("```json")
            .trim_start_matches("```")
            .trim_end_matches("```")
            .trim();

        let value: serde_json::Value = serde_json::from_str(trimmed).ok()?;

        let array = match value {
            serde_json::Value::Object(mut obj) => obj.remove("commands")?,
            array @ serde_json::Value::Array(_) => array,
            _ => return None,
        };

        serde_json::from_value(array).ok()
    }

    fn coerce(raw: RawCommand) -> CandidateCommand {
        let action = raw
            .action
            .as_deref()
            .map_or(CommandAction::Unknown, CommandAction::parse);

        CandidateCommand::new(
            action,
            raw.item,
            raw.quantity,
            raw.unit,
            raw.confidence.unwrap_or(0.5),
        )
    }
}

#[async_trait]
impl CommandExtractor for LlmExtractor {
    async fn extract(
        &self,
        utterance: &str,
        conversation_history: &[ConversationTurn],
        recent_commands: &[CandidateCommand],
    ) -> Vec<CandidateCommand> {
        let request = ChatRequest {
            model: &self.config.model,
            max_tokens: self.config.max_tokens,
            messages: vec![
                ChatMessage {
                    role: "system",
                    content: SYSTEM_PROMPT.to_string(),
                },
                ChatMessage {
                    role: "user",
                    content: Self::build_prompt(utterance, conversation_history, recent_commands),
                },
            ],
        };

        let response = match self
            .client
            .post(format!("{}/chat/completions", self.config.base_url))
            .header("Authorization", format!("Bearer {}", self.api_key))
            .json(&request)
            .send()
            .await
        {
            Ok(response) => response,
            Err(e) => {
                tracing::warn!(error = %e, "extraction request failed");
                return Vec::new();
            }
        };

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            tracing::warn!(status = %status, body = %body, "extraction API error");
            return Vec::new();
        }

        let reply: ChatResponse = match response.json().await {
            Ok(reply) => reply,
            Err(e) => {
                tracing::warn!(error = %e, "failed to parse extraction response");
                return Vec::new();
            }
        };

        let Some(content) = reply.choices.first().map(|c| c.message.content.as_str()) else {
            tracing::warn!("extraction response had no choices");
            return Vec::new();
        };

        let Some(raw_commands) = Self::parse_reply(content) else {
            tracing::warn!(content = %content, "extraction reply was not valid command JSON");
            return Vec::new();
        };

        let commands: Vec<CandidateCommand> =
            raw_commands.into_iter().map(Self::coerce).collect();

        tracing::debug!(
            utterance = %utterance,
            count = commands.len(),
            "extracted candidate commands"
        );

        commands
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_commands_object() {
        let raw = parse_ok(r#"{"commands": [{"action": "add", "item": "coffee", "quantity": 5, "unit": "lb", "confidence": 0.9}]}"#);
        assert_eq!(raw.len(), 1);
        assert_eq!(raw[0].action.as_deref(), Some("add"));
    }

    #[test]
    fn parses_bare_array() {
        let raw = parse_ok(r#"[{"action": "undo"}]"#);
        assert_eq!(raw.len(), 1);
        assert_eq!(raw[0].action.as_deref(), Some("undo"));
    }

    #[test]
    fn parses_fenced_json() {
        let raw = parse_ok("```json\n{\"commands\": []}\n```");
        assert!(raw.is_empty());
    }

    #[test]
    fn malformed_reply_is_none() {
        assert!(LlmExtractor::parse_reply("I added the coffee for you!").is_none());
        assert!(LlmExtractor::parse_reply(r#"{"answer": 42}"#).is_none());
    }

    #[test]
    fn coerce_fills_defaults() {
        let cmd = LlmExtractor::coerce(RawCommand {
            action: None,
            item: Some("flour".to_string()),
            quantity: Some(3.0),
            unit: None,
            confidence: None,
        });
        assert_eq!(cmd.action, CommandAction::Unknown);
        assert!((cmd.confidence - 0.5).abs() < f32::EPSILON);
        assert!(!cmd.is_complete);
    }

    #[test]
    fn coerce_marks_complete_commands() {
        let cmd = LlmExtractor::coerce(RawCommand {
            action: Some("set".to_string()),
            item: Some("milk".to_string()),
            quantity: Some(10.0),
            unit: Some("gallons".to_string()),
            confidence: Some(0.95),
        });
        assert!(cmd.is_complete);
    }

    fn parse_ok(content: &str) -> Vec<RawCommand> {
        LlmExtractor::parse_reply(content).unwrap()
    }
}
