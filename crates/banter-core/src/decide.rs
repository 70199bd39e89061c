//! The engage-or-ignore policy.
//!
//! Direct address (private message, wakeword, mention) always gets a
//! response. Everything else is gated by a time-decayed probability: the
//! bot may chime in uninvited, but only in conversations where it was
//! directly addressed recently, and less and less often as that exchange
//! goes cold.

use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use dashmap::DashMap;
use regex::Regex;
use tracing::trace;

use banter_types::config::{BehaviorConfig, DecayEntry};
use banter_types::decision::{ResponseDecision, ResponseReason};
use banter_types::error::ConfigError;
use banter_types::message::{ChannelKind, ConversationId, InboundMessage, UserId};

use crate::ports::RandomSource;

/// Decides, per inbound message, whether the bot responds.
///
/// Owns the per-conversation record of when the bot last answered a direct
/// address. Entries are purged lazily on every evaluation that reaches the
/// unsolicited stage, so the map stays bounded to recently-active
/// conversations.
pub struct ResponsePolicy {
    self_id: UserId,
    ignore_direct_messages: bool,
    wakeword_patterns: Vec<Regex>,
    decay: Vec<DecayEntry>,
    max_decay: Duration,
    interrobang_bonus: f64,
    last_direct_response: DashMap<ConversationId, DateTime<Utc>>,
    random: Arc<dyn RandomSource>,
}

impl ResponsePolicy {
    /// Build the policy from behavior config.
    ///
    /// Wakewords are compiled to case-insensitive whole-word patterns, so
    /// "bot" matches "hey bot!" but not "robotics".
    pub fn new(
        self_id: UserId,
        behavior: &BehaviorConfig,
        random: Arc<dyn RandomSource>,
    ) -> Result<Self, ConfigError> {
        let wakeword_patterns = behavior
            .wakewords
            .iter()
            .map(|word| {
                Regex::new(&format!(r"(?i)\b{}\b", regex::escape(word))).map_err(|err| {
                    ConfigError::InvalidWakeword {
                        word: word.clone(),
                        detail: err.to_string(),
                    }
                })
            })
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Self {
            self_id,
            ignore_direct_messages: behavior.ignore_direct_messages,
            wakeword_patterns,
            decay: behavior.unsolicited_decay.clone(),
            max_decay: Duration::seconds(behavior.max_decay_seconds() as i64),
            interrobang_bonus: behavior.interrobang_bonus,
            last_direct_response: DashMap::new(),
            random,
        })
    }

    /// Evaluate the policy for one inbound message.
    ///
    /// A direct accept records the message's timestamp as the
    /// conversation's last direct response as a side effect.
    pub fn should_respond(&self, message: &InboundMessage) -> ResponseDecision {
        // Never answer bots, including ourselves. Feedback loops between
        // two bots do not end on their own.
        if message.author_is_bot || message.author == self.self_id {
            return ResponseDecision::decline(ResponseReason::BotAuthor);
        }

        if message.kind == ChannelKind::Direct {
            if self.ignore_direct_messages {
                return ResponseDecision::decline(ResponseReason::DirectIgnored);
            }
            self.record_direct_response(message);
            return ResponseDecision::accept(ResponseReason::DirectMessage);
        }

        if self
            .wakeword_patterns
            .iter()
            .any(|pattern| pattern.is_match(&message.text))
        {
            self.record_direct_response(message);
            return ResponseDecision::accept(ResponseReason::WakeWord);
        }

        if message.mentions.contains(&self.self_id) {
            self.record_direct_response(message);
            return ResponseDecision::accept(ResponseReason::Mention);
        }

        // Not addressed to us. If others were, this is a targeted exchange
        // we should stay out of.
        if !message.mentions.is_empty() {
            return ResponseDecision::decline(ResponseReason::MentionsOthers);
        }

        // Attachment-only posts and the like.
        if message.text.trim().is_empty() {
            return ResponseDecision::decline(ResponseReason::EmptyMessage);
        }

        self.purge_stale(message.timestamp);

        let Some(last) = self
            .last_direct_response
            .get(&message.conversation)
            .map(|entry| *entry.value())
        else {
            return ResponseDecision::decline(ResponseReason::NoRecentActivity);
        };

        let chance = self.unsolicited_chance(message, last);
        let sample = self.random.sample();
        trace!(
            conversation = %message.conversation,
            chance,
            sample,
            "unsolicited response draw"
        );
        if sample < chance {
            ResponseDecision::accept(ResponseReason::Unsolicited)
        } else {
            ResponseDecision::decline(ResponseReason::LostDraw)
        }
    }

    fn record_direct_response(&self, message: &InboundMessage) {
        self.last_direct_response
            .insert(message.conversation, message.timestamp);
    }

    /// Drop conversations whose last direct response is older than the
    /// largest decay threshold. Runs on every evaluation cycle that
    /// reaches the unsolicited stage, not on a timer.
    fn purge_stale(&self, now: DateTime<Utc>) {
        let cutoff = now - self.max_decay;
        self.last_direct_response
            .retain(|_, timestamp| *timestamp >= cutoff);
    }

    /// Probability of an unsolicited response for this message.
    ///
    /// First decay-table row whose threshold exceeds the elapsed time
    /// wins; past the table the base chance is zero. A trailing `?` adds
    /// the bonus, a trailing `!` adds it again; a total above 1.0 simply
    /// means certainty.
    fn unsolicited_chance(&self, message: &InboundMessage, last: DateTime<Utc>) -> f64 {
        let elapsed = message
            .timestamp
            .signed_duration_since(last)
            .num_seconds()
            .max(0) as u64;

        let mut chance = 0.0;
        for entry in &self.decay {
            if elapsed < entry.threshold_seconds {
                chance = entry.chance;
                break;
            }
        }

        if message.text.ends_with('?') {
            chance += self.interrobang_bonus;
        }
        if message.text.ends_with('!') {
            chance += self.interrobang_bonus;
        }

        chance
    }
}
