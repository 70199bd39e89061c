//! Prompt assembly under a character budget.
//!
//! The history window is built by scanning history newest-first and
//! emitting oldest-first: the model should see the most recent exchange
//! even when the backlog does not fit. The budget is derived once, at
//! construction, from the estimated token space minus everything in the
//! outer template that is not history; a persona too large to leave room
//! for a usable window is a configuration error, not something to degrade
//! around per request.

use std::sync::Arc;

use futures_util::StreamExt;
use tracing::warn;

use banter_types::config::{PersonaConfig, PromptConfig};
use banter_types::error::{ConfigError, TemplateError};
use banter_types::message::{MessageId, UserId};

use crate::image::IMAGE_LOG_MARKER;
use crate::ports::HistoryStream;
use crate::sanitize::sanitize_message;
use crate::template::{TemplateName, TemplateStore, TemplateToken};

/// Builds generation prompts from persona, templates, and history.
#[derive(Debug)]
pub struct PromptAssembler {
    ai_name: String,
    persona: String,
    templates: Arc<TemplateStore>,
    history_lines: usize,
    max_history_chars: usize,
    /// Pre-rendered "generating an image" notice.
    image_coming: String,
}

impl PromptAssembler {
    /// Compute the history budget and fail fast if it is unusable.
    ///
    /// `max_history_chars` is the estimated character space of the model
    /// context minus the outer template rendered with empty history and
    /// the image notice in place (the worst-case non-history footprint).
    pub fn new(
        persona: &PersonaConfig,
        prompt: &PromptConfig,
        templates: Arc<TemplateStore>,
    ) -> Result<Self, ConfigError> {
        let image_coming = templates.format(
            TemplateName::ImageComing,
            &[(TemplateToken::AiName, &persona.ai_name)],
        )?;

        let assembler = Self {
            ai_name: persona.ai_name.clone(),
            persona: persona.persona.clone(),
            templates,
            history_lines: prompt.history_lines,
            max_history_chars: 0,
            image_coming,
        };

        let rendered_empty = assembler.render_outer("", &assembler.image_coming)?;
        let available = prompt
            .est_token_space_chars()
            .saturating_sub(rendered_empty.len());
        let needed = prompt.required_history_chars();
        if available < needed {
            return Err(ConfigError::HistoryBudgetTooSmall { needed, available });
        }

        Ok(Self {
            max_history_chars: available,
            ..assembler
        })
    }

    /// Character budget available for the history window.
    pub fn max_history_chars(&self) -> usize {
        self.max_history_chars
    }

    /// Build the history block from a newest-first message stream.
    ///
    /// Stops consuming at the throttle boundary (exclusive) or when the
    /// next line would overflow the budget -- a line is included whole or
    /// not at all. Self-authored image-log messages and empty messages are
    /// skipped without touching the budget. The collected lines come out
    /// oldest-first, concatenated with nothing beyond what the line
    /// template supplies.
    pub async fn assemble_history(
        &self,
        self_id: UserId,
        mut history: HistoryStream,
        throttle: Option<MessageId>,
    ) -> Result<String, TemplateError> {
        let mut remaining = self.max_history_chars;
        let mut lines: Vec<String> = Vec::new();

        while let Some(raw) = history.next().await {
            if throttle == Some(raw.id) {
                break;
            }

            let clean = sanitize_message(&raw, self_id);

            if clean.is_from_bot && clean.text.contains(IMAGE_LOG_MARKER) {
                continue;
            }
            if clean.text.is_empty() {
                continue;
            }

            let author = if clean.is_from_bot {
                self.ai_name.as_str()
            } else {
                clean.author_name.as_str()
            };
            let line = self.templates.format(
                TemplateName::HistoryLine,
                &[
                    (TemplateToken::UserName, author),
                    (TemplateToken::UserMessage, &clean.text),
                ],
            )?;

            if line.len() > remaining {
                let discarded = self.history_lines.saturating_sub(lines.len());
                warn!(
                    discarded_lines = discarded,
                    "ran out of prompt space, discarding chat history"
                );
                break;
            }

            remaining -= line.len();
            lines.push(line);
        }

        lines.reverse();
        Ok(lines.concat())
    }

    /// Render the outer prompt with the assembled history block.
    pub fn assemble_prompt(
        &self,
        history: &str,
        image_pending: bool,
    ) -> Result<String, TemplateError> {
        let notice = if image_pending {
            self.image_coming.as_str()
        } else {
            ""
        };
        self.render_outer(history, notice)
    }

    fn render_outer(&self, history: &str, image_notice: &str) -> Result<String, TemplateError> {
        self.templates.format(
            TemplateName::Prompt,
            &[
                (TemplateToken::AiName, &self.ai_name),
                (TemplateToken::Persona, &self.persona),
                (TemplateToken::MessageHistory, history),
                (TemplateToken::ImageComing, image_notice),
            ],
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use banter_types::message::{ChannelKind, ConversationId, InboundMessage};
    use chrono::Utc;
    use futures_util::stream;
    use std::collections::BTreeMap;

    const SELF_ID: UserId = UserId(42);

    fn boxed(messages: Vec<InboundMessage>) -> HistoryStream {
        Box::pin(stream::iter(messages))
    }

    fn raw(id: u64, author: u64, text: &str) -> InboundMessage {
        InboundMessage {
            id: banter_types::message::MessageId(id),
            conversation: ConversationId(1),
            conversation_name: Some("general".to_string()),
            kind: ChannelKind::Group,
            author: UserId(author),
            author_name: format!("user{author}"),
            author_is_bot: author == SELF_ID.0,
            mentions: Vec::new(),
            text: text.to_string(),
            timestamp: Utc::now(),
            nsfw: false,
        }
    }

    /// An assembler with a bare `{MESSAGE_HISTORY}` outer template and a
    /// pass-through line template, so character accounting is exact.
    fn bare_assembler(budget_chars: usize, history_lines: usize) -> PromptAssembler {
        let mut overrides = BTreeMap::new();
        overrides.insert("prompt".to_string(), "{MESSAGE_HISTORY}".to_string());
        overrides.insert("history_line".to_string(), "{USER_MESSAGE}".to_string());
        let templates = Arc::new(TemplateStore::with_defaults(&overrides).unwrap());

        let persona = PersonaConfig {
            ai_name: "Rosie".to_string(),
            persona: String::new(),
        };
        let prompt = PromptConfig {
            history_lines,
            est_chars_per_line: 1,
            max_token_space: budget_chars,
            est_chars_per_token: 1,
            templates: BTreeMap::new(),
        };
        PromptAssembler::new(&persona, &prompt, templates).unwrap()
    }

    fn default_assembler() -> PromptAssembler {
        let templates = Arc::new(TemplateStore::with_defaults(&BTreeMap::new()).unwrap());
        let persona = PersonaConfig {
            ai_name: "Rosie".to_string(),
            persona: "A cheerful robot.".to_string(),
        };
        PromptAssembler::new(&persona, &PromptConfig::default(), templates).unwrap()
    }

    #[test]
    fn construction_fails_when_budget_too_small() {
        let templates = Arc::new(TemplateStore::with_defaults(&BTreeMap::new()).unwrap());
        let persona = PersonaConfig {
            ai_name: "Rosie".to_string(),
            // Persona bigger than the whole estimated token space.
            persona: "x".repeat(10_000),
        };
        let prompt = PromptConfig {
            max_token_space: 1024,
            est_chars_per_token: 4,
            ..Default::default()
        };
        let err = PromptAssembler::new(&persona, &prompt, templates).unwrap_err();
        assert!(matches!(err, ConfigError::HistoryBudgetTooSmall { .. }));
    }

    #[tokio::test]
    async fn history_is_emitted_oldest_first() {
        let assembler = default_assembler();
        // Newest first, as a history source delivers them.
        let history = boxed(vec![
            raw(3, 1, "third"),
            raw(2, 1, "second"),
            raw(1, 1, "first"),
        ]);
        let block = assembler
            .assemble_history(SELF_ID, history, None)
            .await
            .unwrap();
        assert_eq!(
            block,
            "user1 says: first\nuser1 says: second\nuser1 says: third\n"
        );
    }

    #[tokio::test]
    async fn self_messages_use_ai_name() {
        let assembler = default_assembler();
        let history = boxed(vec![raw(1, SELF_ID.0, "hello, I am a robot")]);
        let block = assembler
            .assemble_history(SELF_ID, history, None)
            .await
            .unwrap();
        assert_eq!(block, "Rosie says: hello, I am a robot\n");
    }

    #[tokio::test]
    async fn image_log_messages_from_self_are_skipped() {
        let assembler = default_assembler();
        let history = boxed(vec![
            raw(2, 1, "nice"),
            raw(
                1,
                SELF_ID.0,
                "user1 tried to make an image with the prompt: 'a cat'",
            ),
        ]);
        let block = assembler
            .assemble_history(SELF_ID, history, None)
            .await
            .unwrap();
        assert_eq!(block, "user1 says: nice\n");
    }

    #[tokio::test]
    async fn image_log_text_from_users_is_kept() {
        let assembler = default_assembler();
        let history = boxed(vec![raw(
            1,
            1,
            "someone tried to make an image with the prompt once",
        )]);
        let block = assembler
            .assemble_history(SELF_ID, history, None)
            .await
            .unwrap();
        assert!(block.contains("user1 says:"));
    }

    #[tokio::test]
    async fn empty_messages_are_skipped() {
        let assembler = default_assembler();
        let history = boxed(vec![raw(2, 1, "real"), raw(1, 2, "   \n\t ")]);
        let block = assembler
            .assemble_history(SELF_ID, history, None)
            .await
            .unwrap();
        assert_eq!(block, "user1 says: real\n");
    }

    #[tokio::test]
    async fn throttle_boundary_is_exclusive_and_stops_the_scan() {
        let assembler = default_assembler();
        let history = boxed(vec![
            raw(5, 1, "newest"),
            raw(4, 1, "kept"),
            raw(3, 1, "boundary"),
            raw(2, 1, "hidden"),
            raw(1, 1, "older hidden"),
        ]);
        let block = assembler
            .assemble_history(SELF_ID, history, Some(banter_types::message::MessageId(3)))
            .await
            .unwrap();
        assert_eq!(block, "user1 says: kept\nuser1 says: newest\n");
    }

    #[tokio::test]
    async fn budget_is_never_exceeded_and_lines_are_never_split() {
        // Budget of 400 chars; 20 lines of 30 chars each: exactly 13 fit.
        let assembler = bare_assembler(400, 20);
        assert_eq!(assembler.max_history_chars(), 400);

        let messages: Vec<InboundMessage> = (0..20)
            .map(|i| raw(100 - i, 1, &format!("{:030}", i)))
            .collect();
        let block = assembler
            .assemble_history(SELF_ID, boxed(messages), None)
            .await
            .unwrap();

        assert_eq!(block.len(), 390);
        let lines: Vec<&str> = block
            .as_str()
            .as_bytes()
            .chunks(30)
            .map(|chunk| std::str::from_utf8(chunk).unwrap())
            .collect();
        assert_eq!(lines.len(), 13);
        // Oldest included line is the 13th-from-newest; emission is
        // oldest-first so it comes out on top.
        assert_eq!(lines[0], format!("{:030}", 12));
        assert_eq!(lines[12], format!("{:030}", 0));
    }

    #[tokio::test]
    async fn oversized_single_line_yields_empty_history() {
        let assembler = bare_assembler(10, 2);
        let history = boxed(vec![raw(1, 1, "this is far longer than ten chars")]);
        let block = assembler
            .assemble_history(SELF_ID, history, None)
            .await
            .unwrap();
        assert_eq!(block, "");
    }

    #[test]
    fn assemble_prompt_substitutes_notice_only_when_pending() {
        let assembler = default_assembler();
        let with = assembler.assemble_prompt("user1 says: hi\n", true).unwrap();
        assert!(with.contains("currently generating an image"));

        let without = assembler.assemble_prompt("user1 says: hi\n", false).unwrap();
        assert!(!without.contains("currently generating an image"));
        assert!(without.contains("user1 says: hi"));
    }
}
