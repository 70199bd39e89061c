//! Repetition detection for the bot's own output.
//!
//! Generation backends occasionally wedge into a loop, repeating the same
//! sentence turn after turn because that sentence is now the most recent
//! and most reinforced context. `RepetitionTracker` catches this with a
//! blunt equal-string check after canonicalization and answers with a
//! throttle point: the oldest message the next prompt build should refuse
//! to look past, forcing the window to start fresh.

use dashmap::DashMap;
use tracing::{debug, warn};

use banter_types::message::{ConversationId, MessageId, SentMessage};

/// Per-conversation repetition state.
#[derive(Debug, Default)]
struct RepetitionState {
    last_canonical: String,
    throttle_message_id: Option<MessageId>,
    repeat_count: u32,
}

/// Tracks consecutive identical bot messages per conversation.
///
/// The throttle boundary, once set, is only ever overwritten by a newer
/// boundary. A non-repeating message resets the counter but leaves the
/// boundary in place: the model's tendency to loop on that thread does not
/// vanish from a single non-repeat.
#[derive(Debug)]
pub struct RepetitionTracker {
    threshold: u32,
    conversations: DashMap<ConversationId, RepetitionState>,
}

impl RepetitionTracker {
    /// Create a tracker. `threshold` is the repeat count at which history
    /// gets throttled; 1 means two identical messages in a row trigger it.
    pub fn new(threshold: u32) -> Self {
        Self {
            threshold,
            conversations: DashMap::new(),
        }
    }

    /// The boundary the next prompt build should stop at, if one is set.
    pub fn throttle_point(&self, conversation: ConversationId) -> Option<MessageId> {
        self.conversations
            .get(&conversation)
            .and_then(|state| state.throttle_message_id)
    }

    /// Record a message the bot just sent.
    pub fn record_bot_message(&self, conversation: ConversationId, sent: &SentMessage) {
        let canonical = canonical_text(&sent.text);
        let mut state = self.conversations.entry(conversation).or_default();

        if state.last_canonical == canonical {
            state.repeat_count += 1;
        } else {
            state.repeat_count = 0;
        }

        debug!(
            conversation = %conversation,
            repeat_count = state.repeat_count,
            "repetition count updated"
        );

        if state.repeat_count >= self.threshold {
            warn!(
                conversation = %conversation,
                message_id = %sent.id,
                "repetition found, throttling history for this conversation"
            );
            state.throttle_message_id = Some(sent.id);
        }

        state.last_canonical = canonical;
    }
}

/// Canonical form for repetition comparison: trimmed and lowercased.
fn canonical_text(text: &str) -> String {
    text.trim().to_lowercase()
}
