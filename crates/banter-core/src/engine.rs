//! The response cycle orchestrator.
//!
//! One inbound message drives at most one cycle: decide, maybe kick off
//! image generation, assemble the prompt, stream sentences back, filter
//! out role-label echoes, and feed everything sent into the repetition
//! tracker. Errors are contained here -- a failed cycle is logged and
//! counted, and the dispatch layer never sees it.

use std::sync::Arc;

use futures_util::StreamExt;
use tracing::{debug, error, info, warn};

use banter_types::config::BanterConfig;
use banter_types::decision::ResponseReason;
use banter_types::error::{
    BackendError, ConfigError, DeliveryError, HistoryError, TemplateError,
};
use banter_types::message::{InboundMessage, UserId};

use crate::decide::ResponsePolicy;
use crate::image::ImageRequestDetector;
use crate::ports::{HistorySource, ImageBackend, OutboundSink, RandomSource, TextGenerator};
use crate::prompt::PromptAssembler;
use crate::repetition::RepetitionTracker;
use crate::sanitize::sanitize_text;
use crate::stats::AggregateStats;
use crate::template::{TemplateName, TemplateStore, TemplateToken};

/// How a response cycle ended. Informational only; errors never escape
/// the cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CycleOutcome {
    /// The policy declined; nothing happened. The common case.
    Declined(ResponseReason),
    /// The cycle ran to completion (including an impersonation abort,
    /// which keeps whatever was already sent).
    Completed { sentences: u32 },
    /// A backend, delivery, or history error ended the cycle early.
    Failed,
}

/// Anything that can end a cycle early. Private: callers only see
/// [`CycleOutcome::Failed`] and the log line.
#[derive(Debug, thiserror::Error)]
enum CycleError {
    #[error(transparent)]
    History(#[from] HistoryError),
    #[error(transparent)]
    Template(#[from] TemplateError),
    #[error(transparent)]
    Backend(#[from] BackendError),
    #[error(transparent)]
    Delivery(#[from] DeliveryError),
}

/// Coordinates one full response cycle per qualifying inbound message.
pub struct ResponseEngine<H, G, S, I> {
    ai_name: String,
    self_id: UserId,
    history_lines: usize,
    history: Arc<H>,
    textgen: Arc<G>,
    sink: Arc<S>,
    image: Option<Arc<I>>,
    image_detector: Option<ImageRequestDetector>,
    templates: Arc<TemplateStore>,
    policy: ResponsePolicy,
    repetition: RepetitionTracker,
    assembler: PromptAssembler,
    stats: AggregateStats,
}

impl<H, G, S, I> ResponseEngine<H, G, S, I>
where
    H: HistorySource,
    G: TextGenerator,
    S: OutboundSink + 'static,
    I: ImageBackend + 'static,
{
    /// Build the engine and everything it owns from configuration.
    ///
    /// Fails fast on any configuration problem: invalid decay table, bad
    /// template override, or an unusable history budget.
    pub fn new(
        config: &BanterConfig,
        self_id: UserId,
        history: Arc<H>,
        textgen: Arc<G>,
        sink: Arc<S>,
        image: Option<Arc<I>>,
        random: Arc<dyn RandomSource>,
    ) -> Result<Self, ConfigError> {
        config.validate()?;

        let templates = Arc::new(TemplateStore::with_defaults(&config.prompt.templates)?);
        let assembler =
            PromptAssembler::new(&config.persona, &config.prompt, Arc::clone(&templates))?;
        let policy = ResponsePolicy::new(self_id, &config.behavior, random)?;
        let repetition = RepetitionTracker::new(config.behavior.repetition_threshold);
        let image_detector = image
            .as_ref()
            .map(|_| ImageRequestDetector::new(&config.image.image_words))
            .transpose()?;

        Ok(Self {
            ai_name: config.persona.ai_name.clone(),
            self_id,
            history_lines: config.prompt.history_lines,
            history,
            textgen,
            sink,
            image,
            image_detector,
            templates,
            policy,
            repetition,
            assembler,
            stats: AggregateStats::new(),
        })
    }

    /// Aggregate statistics for reporting.
    pub fn stats(&self) -> &AggregateStats {
        &self.stats
    }

    /// Run one response cycle for an inbound message.
    pub async fn handle_message(&self, message: &InboundMessage) -> CycleOutcome {
        let decision = self.policy.should_respond(message);
        if !decision.respond {
            debug!(
                conversation = %message.conversation,
                reason = %decision.reason,
                "not responding"
            );
            return CycleOutcome::Declined(decision.reason);
        }

        info!(
            conversation = %message.conversation,
            author = %sanitize_text(&message.author_name),
            reason = %decision.reason,
            "responding"
        );

        let image_pending = self.maybe_request_image(message);

        match self.run_cycle(message, image_pending).await {
            Ok(sentences) => CycleOutcome::Completed { sentences },
            Err(err) => {
                error!(
                    conversation = %message.conversation,
                    error = %err,
                    "response cycle failed"
                );
                self.stats.record_failure();
                CycleOutcome::Failed
            }
        }
    }

    async fn run_cycle(
        &self,
        message: &InboundMessage,
        image_pending: bool,
    ) -> Result<u32, CycleError> {
        let history = self
            .history
            .recent_messages(message.conversation, self.history_lines)
            .await?;
        let throttle = self.repetition.throttle_point(message.conversation);
        let history_block = self
            .assembler
            .assemble_history(self.self_id, history, throttle)
            .await?;
        let prompt = self.assembler.assemble_prompt(&history_block, image_pending)?;

        let mut request = self.stats.request_arrived(&prompt);
        let role_label = format!("{} says:", self.ai_name);

        let mut sentences = self.textgen.generate_sentences(prompt);
        while let Some(item) = sentences.next().await {
            let sentence = item?;

            // The model sometimes re-emits its own role label as a bare
            // line; drop it and keep streaming.
            if sentence == role_label {
                warn!(sentence = %sentence, "filtered role label from response, continuing");
                continue;
            }

            // A line ending in " says:" means the model has started
            // speaking as someone else. Stop the whole response there.
            if sentence.ends_with(" says:") {
                warn!(sentence = %sentence, "response impersonating another speaker, aborting");
                break;
            }

            let sent = self.sink.send_text(message.conversation, &sentence).await?;
            self.repetition.record_bot_message(message.conversation, &sent);
            request.record_sentence(sentence.len());
        }

        let count = request.sentences();
        self.stats.record_success(request);
        Ok(count)
    }

    /// Detect an image request and, if a backend is configured, kick off
    /// generation as a detached task. Returns whether an image is pending.
    ///
    /// The task owns everything it needs; its failures are logged and
    /// turned into a user-visible error message, never propagated.
    fn maybe_request_image(&self, message: &InboundMessage) -> bool {
        let (Some(backend), Some(detector)) = (&self.image, &self.image_detector) else {
            return false;
        };

        let text = sanitize_text(&message.text);
        let Some(prompt) = detector.extract_prompt(&text) else {
            return false;
        };

        info!(conversation = %message.conversation, prompt = %prompt, "image requested");

        let backend = Arc::clone(backend);
        let sink = Arc::clone(&self.sink);
        let templates = Arc::clone(&self.templates);
        let conversation = message.conversation;
        let author = sanitize_text(&message.author_name);
        let nsfw = message.nsfw;

        tokio::spawn(async move {
            let args = [
                (TemplateToken::UserName, author.as_str()),
                (TemplateToken::ImagePrompt, prompt.as_str()),
            ];
            match backend.generate(&prompt, nsfw).await {
                Ok(image) => {
                    let caption = match templates.format(TemplateName::ImageCaption, &args) {
                        Ok(caption) => caption,
                        Err(err) => {
                            error!(error = %err, "could not render image caption");
                            String::new()
                        }
                    };
                    if let Err(err) = sink.send_image(conversation, &caption, image).await {
                        error!(conversation = %conversation, error = %err, "could not post image");
                    }
                }
                Err(err) => {
                    error!(conversation = %conversation, error = %err, "image generation failed");
                    match templates.format(TemplateName::ImageError, &args) {
                        Ok(notice) => {
                            if let Err(err) = sink.send_text(conversation, &notice).await {
                                error!(
                                    conversation = %conversation,
                                    error = %err,
                                    "could not post image error notice"
                                );
                            }
                        }
                        Err(err) => error!(error = %err, "could not render image error notice"),
                    }
                }
            }
        });

        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ports::{HistoryStream, NoImageBackend, SentenceStream};
    use banter_types::message::{
        ChannelKind, ConversationId, GeneratedImage, MessageId, SentMessage,
    };
    use chrono::Utc;
    use futures_util::stream;
    use std::sync::atomic::{AtomicU64, Ordering};
    use std::sync::Mutex;
    use std::time::Duration;

    const SELF_ID: UserId = UserId(42);
    const CONV: ConversationId = ConversationId(7);

    /// Fixed-sample random source.
    struct FixedRandom(f64);

    impl RandomSource for FixedRandom {
        fn sample(&self) -> f64 {
            self.0
        }
    }

    /// Newest-first canned history.
    struct VecHistory(Vec<InboundMessage>);

    impl HistorySource for VecHistory {
        async fn recent_messages(
            &self,
            _conversation: ConversationId,
            limit: usize,
        ) -> Result<HistoryStream, HistoryError> {
            let messages: Vec<InboundMessage> =
                self.0.iter().take(limit).cloned().collect();
            Ok(Box::pin(stream::iter(messages)))
        }
    }

    /// Canned sentence stream; records every prompt it was asked to
    /// complete.
    struct ScriptedGenerator {
        sentences: Vec<String>,
        fail_after: Option<usize>,
        prompts: Mutex<Vec<String>>,
    }

    impl ScriptedGenerator {
        fn new(sentences: &[&str]) -> Self {
            Self {
                sentences: sentences.iter().map(|s| s.to_string()).collect(),
                fail_after: None,
                prompts: Mutex::new(Vec::new()),
            }
        }

        fn failing_after(sentences: &[&str], after: usize) -> Self {
            Self {
                fail_after: Some(after),
                ..Self::new(sentences)
            }
        }

        fn last_prompt(&self) -> Option<String> {
            self.prompts.lock().unwrap().last().cloned()
        }
    }

    impl TextGenerator for ScriptedGenerator {
        fn generate_sentences(&self, prompt: String) -> SentenceStream {
            self.prompts.lock().unwrap().push(prompt);
            let mut items: Vec<Result<String, BackendError>> = self
                .sentences
                .iter()
                .cloned()
                .map(Ok)
                .collect();
            if let Some(after) = self.fail_after {
                items.truncate(after);
                items.push(Err(BackendError::Stream("connection reset".to_string())));
            }
            Box::pin(stream::iter(items))
        }
    }

    /// Records outbound traffic and mints sequential message ids.
    struct RecordingSink {
        next_id: AtomicU64,
        texts: Mutex<Vec<String>>,
        images: Mutex<Vec<(String, String)>>,
        fail_sends: bool,
    }

    impl RecordingSink {
        fn new() -> Self {
            Self {
                next_id: AtomicU64::new(1000),
                texts: Mutex::new(Vec::new()),
                images: Mutex::new(Vec::new()),
                fail_sends: false,
            }
        }

        fn failing() -> Self {
            Self {
                fail_sends: true,
                ..Self::new()
            }
        }

        fn sent_texts(&self) -> Vec<String> {
            self.texts.lock().unwrap().clone()
        }
    }

    impl OutboundSink for RecordingSink {
        async fn send_text(
            &self,
            _conversation: ConversationId,
            text: &str,
        ) -> Result<SentMessage, DeliveryError> {
            if self.fail_sends {
                return Err(DeliveryError::Send("gateway closed".to_string()));
            }
            let id = self.next_id.fetch_add(1, Ordering::SeqCst);
            self.texts.lock().unwrap().push(text.to_string());
            Ok(SentMessage {
                id: MessageId(id),
                text: text.to_string(),
            })
        }

        async fn send_image(
            &self,
            _conversation: ConversationId,
            caption: &str,
            image: GeneratedImage,
        ) -> Result<SentMessage, DeliveryError> {
            let id = self.next_id.fetch_add(1, Ordering::SeqCst);
            self.images
                .lock()
                .unwrap()
                .push((caption.to_string(), image.prompt.clone()));
            Ok(SentMessage {
                id: MessageId(id),
                text: caption.to_string(),
            })
        }
    }

    /// Image backend that always produces a tiny image.
    struct FakeImageBackend;

    impl ImageBackend for FakeImageBackend {
        async fn generate(
            &self,
            prompt: &str,
            _nsfw: bool,
        ) -> Result<GeneratedImage, BackendError> {
            Ok(GeneratedImage {
                bytes: vec![1, 2, 3],
                prompt: prompt.to_string(),
            })
        }
    }

    fn config(ai_name: &str, wakewords: &[&str]) -> BanterConfig {
        let mut config = BanterConfig::default();
        config.persona.ai_name = ai_name.to_string();
        config.behavior.wakewords = wakewords.iter().map(|s| s.to_string()).collect();
        config
    }

    fn inbound(text: &str) -> InboundMessage {
        InboundMessage {
            id: MessageId(1),
            conversation: CONV,
            conversation_name: Some("general".to_string()),
            kind: ChannelKind::Group,
            author: UserId(10),
            author_name: "alice".to_string(),
            author_is_bot: false,
            mentions: Vec::new(),
            text: text.to_string(),
            timestamp: Utc::now(),
            nsfw: false,
        }
    }

    fn engine(
        config: &BanterConfig,
        history: Vec<InboundMessage>,
        generator: ScriptedGenerator,
    ) -> ResponseEngine<VecHistory, ScriptedGenerator, RecordingSink, NoImageBackend> {
        ResponseEngine::new(
            config,
            SELF_ID,
            Arc::new(VecHistory(history)),
            Arc::new(generator),
            Arc::new(RecordingSink::new()),
            None,
            Arc::new(FixedRandom(0.999)),
        )
        .unwrap()
    }

    #[tokio::test]
    async fn wakeword_message_gets_a_streamed_response() {
        let config = config("Rosie", &["rosie"]);
        let engine = engine(
            &config,
            vec![inbound("hey rosie, how are you?")],
            ScriptedGenerator::new(&["I'm doing great!", "How about you?"]),
        );

        let outcome = engine.handle_message(&inbound("hey rosie, how are you?")).await;
        assert_eq!(outcome, CycleOutcome::Completed { sentences: 2 });
        assert_eq!(
            engine.sink.sent_texts(),
            vec!["I'm doing great!", "How about you?"]
        );
        assert_eq!(engine.stats().snapshot().successes, 1);
    }

    #[tokio::test]
    async fn unaddressed_message_is_declined_without_side_effects() {
        let config = config("Rosie", &["rosie"]);
        let engine = engine(
            &config,
            vec![],
            ScriptedGenerator::new(&["should never be generated"]),
        );

        let outcome = engine.handle_message(&inbound("just chatting")).await;
        assert!(matches!(outcome, CycleOutcome::Declined(_)));
        assert!(engine.sink.sent_texts().is_empty());
        assert_eq!(engine.stats().snapshot().requests, 0);
    }

    #[tokio::test]
    async fn role_label_echo_is_dropped_and_streaming_continues() {
        let config = config("Rosie", &["rosie"]);
        let engine = engine(
            &config,
            vec![],
            ScriptedGenerator::new(&["Rosie says:", "Actual content."]),
        );

        let outcome = engine.handle_message(&inbound("rosie hello")).await;
        assert_eq!(outcome, CycleOutcome::Completed { sentences: 1 });
        assert_eq!(engine.sink.sent_texts(), vec!["Actual content."]);
    }

    #[tokio::test]
    async fn impersonation_aborts_the_rest_of_the_stream() {
        let config = config("Rosie", &["rosie"]);
        let engine = engine(
            &config,
            vec![],
            ScriptedGenerator::new(&[
                "Rosie says:",
                "Bob says:",
                "this must never be sent",
            ]),
        );

        let outcome = engine.handle_message(&inbound("rosie hello")).await;
        // "Rosie says:" dropped with the stream continuing; "Bob says:"
        // aborts before anything further is consumed.
        assert_eq!(outcome, CycleOutcome::Completed { sentences: 0 });
        assert!(engine.sink.sent_texts().is_empty());
    }

    #[tokio::test]
    async fn mid_stream_backend_error_fails_the_cycle() {
        let config = config("Rosie", &["rosie"]);
        let engine = engine(
            &config,
            vec![],
            ScriptedGenerator::failing_after(&["First sentence.", "never sent"], 1),
        );

        let outcome = engine.handle_message(&inbound("rosie hello")).await;
        assert_eq!(outcome, CycleOutcome::Failed);
        // The sentence before the error still went out.
        assert_eq!(engine.sink.sent_texts(), vec!["First sentence."]);
        let snapshot = engine.stats().snapshot();
        assert_eq!(snapshot.failures, 1);
        assert_eq!(snapshot.successes, 0);
    }

    #[tokio::test]
    async fn send_failure_fails_the_cycle() {
        let config = config("Rosie", &["rosie"]);
        let engine = ResponseEngine::new(
            &config,
            SELF_ID,
            Arc::new(VecHistory(vec![])),
            Arc::new(ScriptedGenerator::new(&["Hello."])),
            Arc::new(RecordingSink::failing()),
            None::<Arc<NoImageBackend>>,
            Arc::new(FixedRandom(0.999)),
        )
        .unwrap();

        let outcome = engine.handle_message(&inbound("rosie hello")).await;
        assert_eq!(outcome, CycleOutcome::Failed);
        assert_eq!(engine.stats().snapshot().failures, 1);
    }

    #[tokio::test]
    async fn repeated_sentences_throttle_the_next_prompt() {
        let mut config = config("Rosie", &["rosie"]);
        config.behavior.repetition_threshold = 1;
        // Make budget accounting trivial for the prompt inspection below.
        config
            .prompt
            .templates
            .insert("prompt".to_string(), "{MESSAGE_HISTORY}".to_string());
        config.prompt.est_chars_per_line = 1;

        let engine = engine(
            &config,
            vec![],
            ScriptedGenerator::new(&["ok.", "ok."]),
        );

        let outcome = engine.handle_message(&inbound("rosie hello")).await;
        assert_eq!(outcome, CycleOutcome::Completed { sentences: 2 });

        // Two identical sentences in one cycle: the second send (id 1001)
        // trips the tracker.
        assert_eq!(
            engine.repetition.throttle_point(CONV),
            Some(MessageId(1001))
        );
    }

    #[tokio::test]
    async fn throttled_history_is_hidden_from_the_prompt() {
        let mut config = config("Rosie", &["rosie"]);
        config
            .prompt
            .templates
            .insert("prompt".to_string(), "{MESSAGE_HISTORY}".to_string());
        config.prompt.est_chars_per_line = 1;

        let mut old = inbound("old message before the boundary");
        old.id = MessageId(1);
        let mut boundary = inbound("the boundary itself");
        boundary.id = MessageId(2);
        let mut fresh = inbound("fresh message after the boundary");
        fresh.id = MessageId(3);

        // Newest first.
        let engine = engine(
            &config,
            vec![fresh, boundary, old],
            ScriptedGenerator::new(&["fine."]),
        );

        // Install a throttle boundary at message 2 by repeating through
        // the tracker directly.
        engine.repetition.record_bot_message(
            CONV,
            &SentMessage {
                id: MessageId(2),
                text: "dup".to_string(),
            },
        );
        engine.repetition.record_bot_message(
            CONV,
            &SentMessage {
                id: MessageId(2),
                text: "dup".to_string(),
            },
        );
        assert_eq!(engine.repetition.throttle_point(CONV), Some(MessageId(2)));

        engine.handle_message(&inbound("rosie hello")).await;
        let prompt = engine.textgen.last_prompt().unwrap();
        assert!(prompt.contains("fresh message after the boundary"));
        assert!(!prompt.contains("the boundary itself"));
        assert!(!prompt.contains("old message before the boundary"));
    }

    #[tokio::test]
    async fn image_request_spawns_detached_generation() {
        let mut config = config("Rosie", &["rosie"]);
        config.image.enabled = true;

        let sink = Arc::new(RecordingSink::new());
        let engine = ResponseEngine::new(
            &config,
            SELF_ID,
            Arc::new(VecHistory(vec![])),
            Arc::new(ScriptedGenerator::new(&["Here it comes."])),
            Arc::clone(&sink),
            Some(Arc::new(FakeImageBackend)),
            Arc::new(FixedRandom(0.999)),
        )
        .unwrap();

        let outcome = engine
            .handle_message(&inbound("rosie, draw a lighthouse at dusk"))
            .await;
        assert_eq!(outcome, CycleOutcome::Completed { sentences: 1 });

        // The prompt carried the image-coming notice.
        let prompt = engine.textgen.last_prompt().unwrap();
        assert!(prompt.contains("currently generating an image"));

        // The detached task posts the image shortly after.
        for _ in 0..50 {
            if !sink.images.lock().unwrap().is_empty() {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        let images = sink.images.lock().unwrap().clone();
        assert_eq!(images.len(), 1);
        let (caption, prompt) = &images[0];
        assert_eq!(prompt, "a lighthouse at dusk");
        assert!(caption.contains("tried to make an image with the prompt"));
    }

    #[tokio::test]
    async fn image_failure_sends_error_notice_and_text_flow_continues() {
        struct FailingImageBackend;
        impl ImageBackend for FailingImageBackend {
            async fn generate(
                &self,
                _prompt: &str,
                _nsfw: bool,
            ) -> Result<GeneratedImage, BackendError> {
                Err(BackendError::Provider {
                    message: "sd offline".to_string(),
                })
            }
        }

        let mut config = config("Rosie", &["rosie"]);
        config.image.enabled = true;

        let sink = Arc::new(RecordingSink::new());
        let engine = ResponseEngine::new(
            &config,
            SELF_ID,
            Arc::new(VecHistory(vec![])),
            Arc::new(ScriptedGenerator::new(&["Still talking."])),
            Arc::clone(&sink),
            Some(Arc::new(FailingImageBackend)),
            Arc::new(FixedRandom(0.999)),
        )
        .unwrap();

        let outcome = engine
            .handle_message(&inbound("rosie, draw a broken teapot"))
            .await;
        // Text response is unaffected by the image failure.
        assert_eq!(outcome, CycleOutcome::Completed { sentences: 1 });

        for _ in 0..50 {
            if sink.sent_texts().len() >= 2 {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        let texts = sink.sent_texts();
        assert!(texts.contains(&"Still talking.".to_string()));
        assert!(texts
            .iter()
            .any(|t| t.contains("Something went wrong generating your image")));
    }

    #[tokio::test]
    async fn history_reaches_the_prompt() {
        let mut config = config("Rosie", &["rosie"]);
        config
            .prompt
            .templates
            .insert("prompt".to_string(), "{MESSAGE_HISTORY}".to_string());
        config.prompt.est_chars_per_line = 1;

        let mut earlier = inbound("I was here first");
        earlier.id = MessageId(1);
        earlier.author_name = "bob".to_string();

        let engine = engine(&config, vec![earlier], ScriptedGenerator::new(&["hi."]));
        engine.handle_message(&inbound("rosie hello")).await;

        let prompt = engine.textgen.last_prompt().unwrap();
        assert_eq!(prompt, "bob says: I was here first\n");
    }
}
