use thiserror::Error;

/// Configuration errors, fatal at startup.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("could not read config file '{path}': {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("could not parse config file '{path}': {source}")]
    Parse {
        path: String,
        #[source]
        source: toml::de::Error,
    },

    #[error(
        "history budget too small: the rendered prompt template leaves {available} \
         characters but at least {needed} are required; shorten the persona or \
         reduce history_lines"
    )]
    HistoryBudgetTooSmall { needed: usize, available: usize },

    #[error("unsolicited decay table thresholds must be strictly ascending (entry {index})")]
    DecayTableNotAscending { index: usize },

    #[error("unsolicited decay table chance must be non-negative (entry {index})")]
    NegativeChance { index: usize },

    #[error("history_lines must be greater than zero")]
    ZeroHistoryLines,

    #[error("no wakewords configured and direct messages are ignored; the bot would never respond")]
    Unreachable,

    #[error("could not compile wakeword pattern for '{word}': {detail}")]
    InvalidWakeword { word: String, detail: String },

    #[error("could not compile image-request pattern for '{word}': {detail}")]
    InvalidImageWord { word: String, detail: String },

    #[error(transparent)]
    Template(#[from] TemplateError),
}

/// Template registration and lookup errors.
///
/// Substitution itself cannot fail: every format string is validated
/// against its token allow-list when registered.
#[derive(Debug, Error)]
pub enum TemplateError {
    #[error("template '{template}' references a token not in its allow-list: {detail}")]
    DisallowedToken { template: String, detail: String },

    #[error("template '{template}' contains a stray brace")]
    StrayBrace { template: String },

    #[error("no template registered under '{0}'")]
    UnknownTemplate(String),
}

/// Errors from the generation backends (text or image).
///
/// All of these are transient from the engine's point of view: the cycle
/// that hit them is logged and counted as a failure, and no retry is made.
#[derive(Debug, Error)]
pub enum BackendError {
    #[error("backend error: {message}")]
    Provider { message: String },

    #[error("stream error: {0}")]
    Stream(String),

    #[error("authentication failed")]
    AuthenticationFailed,

    #[error("rate limited")]
    RateLimited,

    #[error("invalid request: {0}")]
    InvalidRequest(String),
}

/// Errors posting a message back to the platform.
#[derive(Debug, Error)]
pub enum DeliveryError {
    #[error("send failed: {0}")]
    Send(String),
}

/// Errors fetching conversation history.
#[derive(Debug, Error)]
pub enum HistoryError {
    #[error("history fetch failed: {0}")]
    Fetch(String),
}
