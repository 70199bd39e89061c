//! Named templates for prompt text and user-facing messages.
//!
//! Every template declares the set of tokens it may reference. Format
//! strings (defaults or config overrides) are validated against that
//! allow-list when the store is built, so substitution itself can never
//! fail at request time. Tokens look like `{AI_NAME}`; any other brace in
//! a template is rejected.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::fmt;
use std::str::FromStr;

use banter_types::error::TemplateError;

/// All templates the engine renders.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TemplateName {
    /// The outer generation prompt.
    Prompt,
    /// One line of rendered chat history inside `{MESSAGE_HISTORY}`.
    HistoryLine,
    /// Notice inserted into the prompt while an image is being generated.
    ImageComing,
    /// Caption posted alongside a generated image.
    ImageCaption,
    /// User-visible message when image generation fails.
    ImageError,
}

impl TemplateName {
    /// Every template, in registration order.
    pub const ALL: [TemplateName; 5] = [
        TemplateName::Prompt,
        TemplateName::HistoryLine,
        TemplateName::ImageComing,
        TemplateName::ImageCaption,
        TemplateName::ImageError,
    ];

    /// Tokens this template is allowed to reference.
    pub fn allowed_tokens(self) -> &'static [TemplateToken] {
        match self {
            TemplateName::Prompt => &[
                TemplateToken::AiName,
                TemplateToken::Persona,
                TemplateToken::MessageHistory,
                TemplateToken::ImageComing,
            ],
            TemplateName::HistoryLine => {
                &[TemplateToken::UserName, TemplateToken::UserMessage]
            }
            TemplateName::ImageComing => &[TemplateToken::AiName],
            TemplateName::ImageCaption => {
                &[TemplateToken::UserName, TemplateToken::ImagePrompt]
            }
            TemplateName::ImageError => {
                &[TemplateToken::UserName, TemplateToken::ImagePrompt]
            }
        }
    }

    /// Built-in format string used when the config provides no override.
    pub fn default_format(self) -> &'static str {
        match self {
            TemplateName::Prompt => {
                "You are in a chat room with multiple participants.\n\
                 Below is a transcript of recent messages in the conversation.\n\
                 Write the next one to three messages you would send in this\n\
                 conversation, from the point of view of the participant named\n\
                 {AI_NAME}.\n\
                 \n\
                 {PERSONA}\n\
                 \n\
                 All responses you write must be from the point of view of\n\
                 {AI_NAME}.\n\
                 ### Transcript:\n\
                 {MESSAGE_HISTORY}\n\
                 {IMAGE_COMING}\n"
            }
            TemplateName::HistoryLine => "{USER_NAME} says: {USER_MESSAGE}\n",
            TemplateName::ImageComing => {
                "{AI_NAME}: is currently generating an image, as requested.\n"
            }
            TemplateName::ImageCaption => {
                "{USER_NAME} tried to make an image with the prompt:\n    '{IMAGE_PROMPT}'\n"
            }
            TemplateName::ImageError => {
                "Something went wrong generating your image. Sorry about that!\n"
            }
        }
    }
}

impl fmt::Display for TemplateName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            TemplateName::Prompt => "prompt",
            TemplateName::HistoryLine => "history_line",
            TemplateName::ImageComing => "image_coming",
            TemplateName::ImageCaption => "image_caption",
            TemplateName::ImageError => "image_error",
        };
        write!(f, "{name}")
    }
}

impl FromStr for TemplateName {
    type Err = TemplateError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "prompt" => Ok(TemplateName::Prompt),
            "history_line" => Ok(TemplateName::HistoryLine),
            "image_coming" => Ok(TemplateName::ImageComing),
            "image_caption" => Ok(TemplateName::ImageCaption),
            "image_error" => Ok(TemplateName::ImageError),
            other => Err(TemplateError::UnknownTemplate(other.to_string())),
        }
    }
}

/// Substitution tokens available to templates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TemplateToken {
    AiName,
    Persona,
    MessageHistory,
    ImageComing,
    UserName,
    UserMessage,
    ImagePrompt,
}

impl TemplateToken {
    pub fn as_str(self) -> &'static str {
        match self {
            TemplateToken::AiName => "AI_NAME",
            TemplateToken::Persona => "PERSONA",
            TemplateToken::MessageHistory => "MESSAGE_HISTORY",
            TemplateToken::ImageComing => "IMAGE_COMING",
            TemplateToken::UserName => "USER_NAME",
            TemplateToken::UserMessage => "USER_MESSAGE",
            TemplateToken::ImagePrompt => "IMAGE_PROMPT",
        }
    }

    /// The token as it appears inside a template, braces included.
    pub fn braced(self) -> String {
        format!("{{{}}}", self.as_str())
    }
}

/// A single validated template.
#[derive(Debug, Clone)]
struct TemplateFormatter {
    template: String,
}

impl TemplateFormatter {
    fn new(
        name: TemplateName,
        format_str: &str,
        allowed: &[TemplateToken],
    ) -> Result<Self, TemplateError> {
        Self::validate(name, format_str, allowed)?;
        Ok(Self {
            template: format_str.to_string(),
        })
    }

    /// Reject format strings referencing tokens outside the allow-list, or
    /// containing braces that are not part of an allowed token.
    fn validate(
        name: TemplateName,
        format_str: &str,
        allowed: &[TemplateToken],
    ) -> Result<(), TemplateError> {
        let mut allowed_close: HashSet<usize> = HashSet::new();

        for (idx, ch) in format_str.char_indices() {
            if ch != '{' {
                continue;
            }
            let tail = &format_str[idx..];
            let matched = allowed.iter().find(|token| tail.starts_with(&token.braced()));
            match matched {
                Some(token) => {
                    allowed_close.insert(idx + token.braced().len() - 1);
                }
                None => {
                    let snippet: String = tail.chars().take(24).collect();
                    return Err(TemplateError::DisallowedToken {
                        template: name.to_string(),
                        detail: snippet,
                    });
                }
            }
        }

        for (idx, ch) in format_str.char_indices() {
            if ch == '}' && !allowed_close.contains(&idx) {
                return Err(TemplateError::StrayBrace {
                    template: name.to_string(),
                });
            }
        }

        Ok(())
    }

    /// Substitute the supplied token values in a single pass over the
    /// original template. Substituted values are never re-scanned, so user
    /// text containing something token-shaped stays literal.
    fn format(&self, args: &[(TemplateToken, &str)]) -> String {
        let mut out = String::with_capacity(self.template.len());
        let mut rest = self.template.as_str();

        'scan: while let Some(pos) = rest.find('{') {
            out.push_str(&rest[..pos]);
            let tail = &rest[pos..];
            for (token, value) in args {
                let braced = token.braced();
                if tail.starts_with(&braced) {
                    out.push_str(value);
                    rest = &tail[braced.len()..];
                    continue 'scan;
                }
            }
            // Allowed token with no value supplied for this call: keep it.
            out.push('{');
            rest = &tail[1..];
        }

        out.push_str(rest);
        out
    }
}

/// All templates, validated and ready to render.
#[derive(Debug, Clone)]
pub struct TemplateStore {
    templates: HashMap<TemplateName, TemplateFormatter>,
}

impl TemplateStore {
    /// Build the store from the built-in defaults, applying any overrides.
    ///
    /// Overrides are keyed by the template's string name and are validated
    /// against the same allow-lists as the defaults. An override for an
    /// unknown template name is an error.
    pub fn with_defaults(overrides: &BTreeMap<String, String>) -> Result<Self, TemplateError> {
        for key in overrides.keys() {
            TemplateName::from_str(key)?;
        }

        let mut templates = HashMap::new();
        for name in TemplateName::ALL {
            let format_str = overrides
                .get(&name.to_string())
                .map(String::as_str)
                .unwrap_or_else(|| name.default_format());
            templates.insert(
                name,
                TemplateFormatter::new(name, format_str, name.allowed_tokens())?,
            );
        }

        Ok(Self { templates })
    }

    /// Render a template with the given token values.
    pub fn format(
        &self,
        name: TemplateName,
        args: &[(TemplateToken, &str)],
    ) -> Result<String, TemplateError> {
        let formatter = self
            .templates
            .get(&name)
            .ok_or_else(|| TemplateError::UnknownTemplate(name.to_string()))?;
        Ok(formatter.format(args))
    }
}
