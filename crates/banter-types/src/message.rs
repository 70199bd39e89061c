//! Platform message types for banter.
//!
//! These types model the traffic between the chat platform and the engine:
//! the raw inbound view delivered by the platform adapter, the sanitized
//! view the prompt pipeline works with, and the handle returned when a
//! message is sent.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use std::fmt;

/// Fixed placeholder used as the conversation-context name for messages
/// that originate outside any named conversation (a private exchange).
pub const DIRECT_CONTEXT_NAME: &str = "DM";

/// Opaque, comparable identifier of a single message.
///
/// Ordering follows the platform's snowflake ordering; the engine only
/// relies on equality (the repetition throttle boundary is matched by
/// equality while scanning history newest-first).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct MessageId(pub u64);

/// Identifier of a conversation (channel, thread, or direct exchange).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ConversationId(pub u64);

/// Identifier of a platform account, human or bot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct UserId(pub u64);

impl fmt::Display for MessageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl fmt::Display for ConversationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Whether a conversation is a private exchange or a shared channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChannelKind {
    Direct,
    Group,
}

/// A raw inbound message as delivered by the platform adapter.
///
/// Text and author name are unsanitized; the engine passes them through
/// the sanitizer before any of it reaches a prompt.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InboundMessage {
    pub id: MessageId,
    pub conversation: ConversationId,
    /// Name of the containing conversation, when there is one. `None` for
    /// direct exchanges.
    pub conversation_name: Option<String>,
    pub kind: ChannelKind,
    pub author: UserId,
    pub author_name: String,
    /// Whether the author is a bot or automated account.
    pub author_is_bot: bool,
    /// Accounts explicitly mentioned in the message body.
    pub mentions: Vec<UserId>,
    pub text: String,
    pub timestamp: DateTime<Utc>,
    /// Whether the conversation allows adult content; forwarded verbatim
    /// to the image backend.
    pub nsfw: bool,
}

/// A normalized view of one message, produced by the sanitizer.
///
/// Immutable once constructed: author name and text are sanitized, the
/// text is trimmed, and the context name falls back to
/// [`DIRECT_CONTEXT_NAME`] for private exchanges.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConversationMessage {
    pub author_name: String,
    pub text: String,
    pub is_from_bot: bool,
    pub id: MessageId,
    pub timestamp: DateTime<Utc>,
    pub context_name: String,
}

/// Handle to a message the bot has sent, as returned by the outbound sink.
///
/// Carries just enough for repetition tracking: the platform-assigned id
/// and the text that went out.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SentMessage {
    pub id: MessageId,
    pub text: String,
}

/// A generated image ready to be posted to a conversation.
#[derive(Clone)]
pub struct GeneratedImage {
    pub bytes: Vec<u8>,
    /// The prompt the image was generated from.
    pub prompt: String,
}

impl fmt::Debug for GeneratedImage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GeneratedImage")
            .field("bytes_len", &self.bytes.len())
            .field("prompt", &self.prompt)
            .finish()
    }
}
