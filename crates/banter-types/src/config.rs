//! Configuration for the banter engine.
//!
//! Deserialized from a TOML file; every field has a serde default so a
//! minimal config (or none at all) yields a working local setup.
//! [`BanterConfig::validate`] is called once at startup and any violation
//! is fatal -- a misconfigured bot must not come up half-working.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::error::ConfigError;

/// One row of the unsolicited-response decay table: if the elapsed time
/// since the last direct response is below `threshold_seconds`, the bot
/// chimes in with probability `chance`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DecayEntry {
    pub threshold_seconds: u64,
    pub chance: f64,
}

/// Top-level configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct BanterConfig {
    pub persona: PersonaConfig,
    pub behavior: BehaviorConfig,
    pub prompt: PromptConfig,
    pub textgen: TextGenConfig,
    pub image: ImageConfig,
    pub log: LogConfig,
}

/// Who the bot is.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PersonaConfig {
    /// Name the bot speaks as; also substituted for its own display name
    /// in history lines.
    pub ai_name: String,
    /// Free-form persona text injected into the prompt.
    pub persona: String,
}

impl Default for PersonaConfig {
    fn default() -> Self {
        Self {
            ai_name: "banter".to_string(),
            persona: String::new(),
        }
    }
}

/// When the bot engages.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BehaviorConfig {
    /// Words that trigger a direct response when they appear as a whole
    /// word, case-insensitively, anywhere in a message.
    pub wakewords: Vec<String>,
    /// Ignore private exchanges entirely.
    pub ignore_direct_messages: bool,
    /// Decay table for unsolicited responses. Thresholds must be strictly
    /// ascending; the first matching row wins; elapsed time past the last
    /// row means chance zero.
    pub unsolicited_decay: Vec<DecayEntry>,
    /// Added to the chance when a message ends with `?`, and added again
    /// when it ends with `!`.
    pub interrobang_bonus: f64,
    /// Consecutive identical bot messages tolerated before history is
    /// throttled. 1 means two identical messages in a row trigger it.
    pub repetition_threshold: u32,
}

impl Default for BehaviorConfig {
    fn default() -> Self {
        Self {
            wakewords: vec!["banter".to_string()],
            ignore_direct_messages: false,
            unsolicited_decay: vec![
                DecayEntry {
                    threshold_seconds: 60,
                    chance: 0.90,
                },
                DecayEntry {
                    threshold_seconds: 120,
                    chance: 0.70,
                },
                DecayEntry {
                    threshold_seconds: 300,
                    chance: 0.50,
                },
            ],
            interrobang_bonus: 0.3,
            repetition_threshold: 1,
        }
    }
}

impl BehaviorConfig {
    /// Largest decay threshold, i.e. how long a conversation stays "warm"
    /// after a direct response. Entries older than this are purged.
    pub fn max_decay_seconds(&self) -> u64 {
        self.unsolicited_decay
            .iter()
            .map(|e| e.threshold_seconds)
            .max()
            .unwrap_or(0)
    }
}

/// Prompt sizing and template overrides.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PromptConfig {
    /// How many history lines to request per prompt.
    pub history_lines: usize,
    /// Estimated characters per rendered history line, used only to size
    /// the minimum required history budget.
    pub est_chars_per_line: usize,
    /// Model context size, in tokens.
    pub max_token_space: usize,
    /// Estimated characters per token.
    pub est_chars_per_token: usize,
    /// Overrides for named templates; values are validated against each
    /// template's token allow-list at startup.
    pub templates: BTreeMap<String, String>,
}

impl Default for PromptConfig {
    fn default() -> Self {
        Self {
            history_lines: 20,
            est_chars_per_line: 30,
            max_token_space: 2048,
            est_chars_per_token: 4,
            templates: BTreeMap::new(),
        }
    }
}

impl PromptConfig {
    /// Estimated character space the model context affords in total.
    pub fn est_token_space_chars(&self) -> usize {
        self.max_token_space * self.est_chars_per_token
    }

    /// Minimum character budget that must remain for history.
    pub fn required_history_chars(&self) -> usize {
        self.history_lines * self.est_chars_per_line
    }
}

/// Text-generation backend connection.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TextGenConfig {
    /// Base URL of an OpenAI-compatible endpoint. The default points at a
    /// local text-generation-webui instance.
    pub base_url: String,
    pub model: String,
    /// Optional bearer token. Local backends usually need none.
    pub api_key: Option<String>,
    pub max_tokens: u32,
    pub temperature: Option<f64>,
    pub stop_sequences: Vec<String>,
}

impl Default for TextGenConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:5000/v1".to_string(),
            model: String::new(),
            api_key: None,
            max_tokens: 400,
            temperature: Some(0.7),
            stop_sequences: Vec::new(),
        }
    }
}

/// Image-generation backend connection (optional feature).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ImageConfig {
    pub enabled: bool,
    /// Base URL of a Stable Diffusion WebUI instance.
    pub base_url: String,
    /// Words that mark a message as an image request.
    pub image_words: Vec<String>,
    pub sampling_steps: u32,
    pub width: u32,
    pub height: u32,
}

impl Default for ImageConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            base_url: "http://localhost:7860".to_string(),
            image_words: [
                "draw", "drawing", "photo", "pic", "picture", "image", "sketch",
            ]
            .iter()
            .map(|s| s.to_string())
            .collect(),
            sampling_steps: 30,
            width: 512,
            height: 512,
        }
    }
}

/// Log output format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    Pretty,
    Json,
}

/// Logging and trace export.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LogConfig {
    pub format: LogFormat,
    /// Bridge tracing spans to an OpenTelemetry stdout exporter.
    pub otel: bool,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            format: LogFormat::Pretty,
            otel: false,
        }
    }
}

impl BanterConfig {
    /// Validate cross-field invariants that serde cannot express.
    ///
    /// The prompt budget itself is validated later, when the assembler is
    /// constructed and the outer template's rendered size is known.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.prompt.history_lines == 0 {
            return Err(ConfigError::ZeroHistoryLines);
        }

        let decay = &self.behavior.unsolicited_decay;
        for (index, entry) in decay.iter().enumerate() {
            if entry.chance < 0.0 {
                return Err(ConfigError::NegativeChance { index });
            }
            if index > 0 && entry.threshold_seconds <= decay[index - 1].threshold_seconds {
                return Err(ConfigError::DecayTableNotAscending { index });
            }
        }

        if self.behavior.wakewords.is_empty() && self.behavior.ignore_direct_messages {
            return Err(ConfigError::Unreachable);
        }

        Ok(())
    }
}
