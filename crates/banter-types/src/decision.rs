//! Response decision types.
//!
//! The decision policy reports not just whether to respond but why, so the
//! orchestrator can log declines at debug and accepts at info with a
//! stable, greppable reason tag.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Why the policy accepted or declined an inbound message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResponseReason {
    /// Private exchange; the bot answers all of these unless configured off.
    DirectMessage,
    /// A configured wakeword appeared as a whole word.
    WakeWord,
    /// The bot was explicitly mentioned.
    Mention,
    /// Won the time-decayed unsolicited-response draw.
    Unsolicited,

    /// Author is a bot or automated account (including self).
    BotAuthor,
    /// Private exchange, but direct messages are configured to be ignored.
    DirectIgnored,
    /// The message mentions other parties but not this bot.
    MentionsOthers,
    /// Nothing left after trimming (attachment-only posts, for example).
    EmptyMessage,
    /// No recent direct response in this conversation to justify chiming in.
    NoRecentActivity,
    /// Reached the unsolicited draw and lost it.
    LostDraw,
}

impl ResponseReason {
    /// Whether this reason is an accept reason.
    pub fn is_accept(self) -> bool {
        matches!(
            self,
            ResponseReason::DirectMessage
                | ResponseReason::WakeWord
                | ResponseReason::Mention
                | ResponseReason::Unsolicited
        )
    }
}

impl fmt::Display for ResponseReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let tag = match self {
            ResponseReason::DirectMessage => "direct_message",
            ResponseReason::WakeWord => "wake_word",
            ResponseReason::Mention => "mention",
            ResponseReason::Unsolicited => "unsolicited",
            ResponseReason::BotAuthor => "bot_author",
            ResponseReason::DirectIgnored => "direct_ignored",
            ResponseReason::MentionsOthers => "mentions_others",
            ResponseReason::EmptyMessage => "empty_message",
            ResponseReason::NoRecentActivity => "no_recent_activity",
            ResponseReason::LostDraw => "lost_draw",
        };
        write!(f, "{tag}")
    }
}

/// Outcome of evaluating the response policy for one inbound message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResponseDecision {
    pub respond: bool,
    pub reason: ResponseReason,
}

impl ResponseDecision {
    pub fn accept(reason: ResponseReason) -> Self {
        Self {
            respond: true,
            reason,
        }
    }

    pub fn decline(reason: ResponseReason) -> Self {
        Self {
            respond: false,
            reason,
        }
    }
}
