//! Image request detection.
//!
//! A message like "draw me a picture of a lighthouse" is an image request:
//! one of the configured image words appears as a whole word, and whatever
//! follows it becomes the image prompt. The engine fires generation off as
//! a detached task; this module only does the pattern matching.

use regex::Regex;

use banter_types::error::ConfigError;

/// Marker phrase identifying the bot's own image-log messages in history.
///
/// The image caption template embeds this phrase, so prompt assembly can
/// recognize those messages as system-generated logs rather than real
/// conversation and skip them.
pub const IMAGE_LOG_MARKER: &str = "tried to make an image with the prompt";

/// Anything shorter than this after the image word is noise, not a prompt.
const MIN_IMAGE_PROMPT_LENGTH: usize = 3;

/// Matches messages that ask for an image and extracts the prompt.
#[derive(Debug)]
pub struct ImageRequestDetector {
    patterns: Vec<Regex>,
}

impl ImageRequestDetector {
    /// Compile one pattern per image word: the word as a whole word,
    /// optionally followed by "of"/"with" and a colon, with the rest of
    /// the line captured as the prompt.
    pub fn new(image_words: &[String]) -> Result<Self, ConfigError> {
        let patterns = image_words
            .iter()
            .map(|word| {
                Regex::new(&format!(
                    r"(?i)^.*\b{}\b\s*(?:of|with)?\s*:?\s*(.*)$",
                    regex::escape(word)
                ))
                .map_err(|err| ConfigError::InvalidImageWord {
                    word: word.clone(),
                    detail: err.to_string(),
                })
            })
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Self { patterns })
    }

    /// Extract an image prompt from sanitized message text, if there is one.
    pub fn extract_prompt(&self, text: &str) -> Option<String> {
        for pattern in &self.patterns {
            if let Some(captures) = pattern.captures(text) {
                let prompt = captures[1].trim();
                if prompt.len() < MIN_IMAGE_PROMPT_LENGTH {
                    continue;
                }
                return Some(prompt.to_string());
            }
        }
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use banter_types::config::ImageConfig;

    fn detector() -> ImageRequestDetector {
        ImageRequestDetector::new(&ImageConfig::default().image_words).unwrap()
    }

    #[test]
    fn extracts_prompt_after_image_word() {
        let prompt = detector().extract_prompt("can you draw a lighthouse at dusk");
        assert_eq!(prompt.as_deref(), Some("a lighthouse at dusk"));
    }

    #[test]
    fn handles_of_and_colon_connectives() {
        let detector = detector();
        assert_eq!(
            detector
                .extract_prompt("send me a picture of: a red fox")
                .as_deref(),
            Some("a red fox")
        );
        assert_eq!(
            detector
                .extract_prompt("make a photo with two moons")
                .as_deref(),
            Some("two moons")
        );
    }

    #[test]
    fn image_word_must_be_whole_word() {
        assert_eq!(detector().extract_prompt("the picturesque village"), None);
    }

    #[test]
    fn is_case_insensitive() {
        assert!(detector()
            .extract_prompt("DRAW a tiny boat please")
            .is_some());
    }

    #[test]
    fn too_short_prompts_are_rejected() {
        assert_eq!(detector().extract_prompt("nice pic xy"), None);
        assert_eq!(detector().extract_prompt("draw"), None);
    }

    #[test]
    fn plain_chat_is_not_an_image_request() {
        assert_eq!(detector().extract_prompt("how are you today"), None);
    }

    #[test]
    fn caption_template_contains_the_marker() {
        use crate::template::TemplateName;
        assert!(TemplateName::ImageCaption
            .default_format()
            .contains(IMAGE_LOG_MARKER));
    }
}
