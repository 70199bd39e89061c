//! User-supplied text sanitization.
//!
//! Newlines, carriage returns, and tabs are replaced with spaces before any
//! user text reaches a prompt, so a user cannot inject lines that appear to
//! come from the system or from a different participant.

use banter_types::message::{ConversationMessage, InboundMessage, UserId, DIRECT_CONTEXT_NAME};

/// Replace every newline, carriage return, and tab with a single space.
///
/// Idempotent: `sanitize_text(sanitize_text(s)) == sanitize_text(s)`.
pub fn sanitize_text(raw: &str) -> String {
    raw.replace(['\n', '\r', '\t'], " ")
}

/// Produce the normalized view of a raw platform message.
///
/// Sanitizes the author name and body, trims the body, marks whether the
/// message was authored by this bot, and substitutes the fixed placeholder
/// for the context name when the message came from a private exchange.
pub fn sanitize_message(raw: &InboundMessage, self_id: UserId) -> ConversationMessage {
    ConversationMessage {
        author_name: sanitize_text(&raw.author_name),
        text: sanitize_text(&raw.text).trim().to_string(),
        is_from_bot: raw.author == self_id,
        id: raw.id,
        timestamp: raw.timestamp,
        context_name: raw
            .conversation_name
            .as_deref()
            .map(sanitize_text)
            .unwrap_or_else(|| DIRECT_CONTEXT_NAME.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use banter_types::message::{ChannelKind, ConversationId, MessageId};
    use chrono::Utc;

    fn raw_message(text: &str, conversation_name: Option<&str>) -> InboundMessage {
        InboundMessage {
            id: MessageId(1),
            conversation: ConversationId(1),
            conversation_name: conversation_name.map(|s| s.to_string()),
            kind: ChannelKind::Group,
            author: UserId(10),
            author_name: "alice\nsmith".to_string(),
            author_is_bot: false,
            mentions: Vec::new(),
            text: text.to_string(),
            timestamp: Utc::now(),
            nsfw: false,
        }
    }

    #[test]
    fn strips_newlines_tabs_and_carriage_returns() {
        let out = sanitize_text("a\nb\rc\td");
        assert_eq!(out, "a b c d");
        assert!(!out.contains('\n'));
        assert!(!out.contains('\r'));
        assert!(!out.contains('\t'));
    }

    #[test]
    fn is_idempotent() {
        for s in ["", "plain", "a\n\r\tb", "\n\n\n", "mixed \t text\r\n"] {
            let once = sanitize_text(s);
            assert_eq!(sanitize_text(&once), once);
        }
    }

    #[test]
    fn leaves_other_characters_alone() {
        let s = "héllo wörld! 🤖 {braces} [brackets]";
        assert_eq!(sanitize_text(s), s);
    }

    #[test]
    fn message_body_is_trimmed() {
        let msg = sanitize_message(&raw_message("  hi there \n", Some("general")), UserId(99));
        assert_eq!(msg.text, "hi there");
    }

    #[test]
    fn author_name_is_sanitized() {
        let msg = sanitize_message(&raw_message("hi", Some("general")), UserId(99));
        assert_eq!(msg.author_name, "alice smith");
    }

    #[test]
    fn direct_exchange_gets_placeholder_context() {
        let msg = sanitize_message(&raw_message("hi", None), UserId(99));
        assert_eq!(msg.context_name, DIRECT_CONTEXT_NAME);

        let msg = sanitize_message(&raw_message("hi", Some("general")), UserId(99));
        assert_eq!(msg.context_name, "general");
    }

    #[test]
    fn marks_self_authored_messages() {
        let msg = sanitize_message(&raw_message("hi", None), UserId(10));
        assert!(msg.is_from_bot);

        let msg = sanitize_message(&raw_message("hi", None), UserId(99));
        assert!(!msg.is_from_bot);
    }
}
