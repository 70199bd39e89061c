//! Collaborator traits ("ports") consumed by the engine.
//!
//! The platform adapter, generation backends, and randomness are reached
//! only through these traits. Uses native async fn in traits (RPITIT) for
//! single-shot calls, and `Pin<Box<dyn Stream>>` where a lazy sequence is
//! returned -- the assembler must be able to stop pulling history without
//! fetching the entire backlog, and the sentence stream may be long-lived.

use std::pin::Pin;

use futures_util::Stream;

use banter_types::error::{BackendError, DeliveryError, HistoryError};
use banter_types::message::{ConversationId, GeneratedImage, InboundMessage, SentMessage};

/// A newest-first, finite, lazy stream of raw messages.
pub type HistoryStream = Pin<Box<dyn Stream<Item = InboundMessage> + Send + 'static>>;

/// A possibly long-running stream of sentence-granularity reply chunks.
pub type SentenceStream =
    Pin<Box<dyn Stream<Item = Result<String, BackendError>> + Send + 'static>>;

/// Source of recent conversation history.
///
/// Implementations yield messages newest-first and stop after at most
/// `limit` items; the consumer may stop pulling earlier.
pub trait HistorySource: Send + Sync {
    fn recent_messages(
        &self,
        conversation: ConversationId,
        limit: usize,
    ) -> impl std::future::Future<Output = Result<HistoryStream, HistoryError>> + Send;
}

/// Streaming text-generation backend.
///
/// Takes a fully assembled prompt and yields the reply as discrete
/// sentences. May fail mid-stream with a transport-level error.
pub trait TextGenerator: Send + Sync {
    fn generate_sentences(&self, prompt: String) -> SentenceStream;
}

/// Image-generation backend (optional collaborator).
pub trait ImageBackend: Send + Sync {
    fn generate(
        &self,
        prompt: &str,
        nsfw: bool,
    ) -> impl std::future::Future<Output = Result<GeneratedImage, BackendError>> + Send;
}

/// Outbound message delivery to the platform.
///
/// Returns a handle to the sent message; the engine needs its id for
/// repetition tracking.
pub trait OutboundSink: Send + Sync {
    fn send_text(
        &self,
        conversation: ConversationId,
        text: &str,
    ) -> impl std::future::Future<Output = Result<SentMessage, DeliveryError>> + Send;

    fn send_image(
        &self,
        conversation: ConversationId,
        caption: &str,
        image: GeneratedImage,
    ) -> impl std::future::Future<Output = Result<SentMessage, DeliveryError>> + Send;
}

/// Source of uniform samples in `[0, 1)` for the unsolicited-response draw.
///
/// Injected rather than read from a global RNG so tests can supply
/// deterministic sequences.
pub trait RandomSource: Send + Sync {
    fn sample(&self) -> f64;
}

/// Production randomness backed by the thread-local RNG.
#[derive(Debug, Clone, Copy, Default)]
pub struct ThreadRandom;

impl RandomSource for ThreadRandom {
    fn sample(&self) -> f64 {
        rand::random::<f64>()
    }
}

/// Placeholder image backend for deployments without one configured.
///
/// Never called by the engine (no backend means no image detection), but
/// gives callers a concrete type for the `None` case.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoImageBackend;

impl ImageBackend for NoImageBackend {
    async fn generate(&self, _prompt: &str, _nsfw: bool) -> Result<GeneratedImage, BackendError> {
        Err(BackendError::InvalidRequest(
            "no image backend configured".to_string(),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn thread_random_samples_in_unit_interval() {
        let random = ThreadRandom;
        for _ in 0..1000 {
            let sample = random.sample();
            assert!((0.0..1.0).contains(&sample));
        }
    }

    #[tokio::test]
    async fn no_image_backend_refuses() {
        let backend = NoImageBackend;
        let err = backend.generate("a cat", false).await.unwrap_err();
        assert!(matches!(err, BackendError::InvalidRequest(_)));
    }
}
