//! Local REPL chat loop.
//!
//! Runs the full engine against the real text-generation backend without
//! any chat platform: stdin lines become direct messages, replies print to
//! stdout. History lives in a bounded in-memory ring so the prompt window
//! and repetition throttle behave exactly as they would on a platform.

use std::collections::VecDeque;
use std::sync::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use chrono::Utc;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::error;

use banter_core::engine::ResponseEngine;
use banter_core::ports::{
    HistorySource, HistoryStream, OutboundSink, ThreadRandom,
};
use banter_infra::image::SdWebUiClient;
use banter_infra::textgen::OpenAiCompatGenerator;
use banter_types::config::BanterConfig;
use banter_types::error::{DeliveryError, HistoryError};
use banter_types::message::{
    ChannelKind, ConversationId, GeneratedImage, InboundMessage, MessageId, SentMessage, UserId,
};

const REPL_CONVERSATION: ConversationId = ConversationId(1);
const REPL_USER: UserId = UserId(1);
const BOT_USER: UserId = UserId(2);

/// Monotonic message id allocator for the local session.
struct IdCounter(AtomicU64);

impl IdCounter {
    fn new() -> Self {
        Self(AtomicU64::new(1))
    }

    fn next(&self) -> MessageId {
        MessageId(self.0.fetch_add(1, Ordering::SeqCst))
    }
}

/// Bounded newest-first ring of the session's messages.
struct InMemoryHistory {
    messages: Mutex<VecDeque<InboundMessage>>,
    capacity: usize,
}

impl InMemoryHistory {
    fn new(capacity: usize) -> Self {
        Self {
            messages: Mutex::new(VecDeque::new()),
            capacity,
        }
    }

    fn record(&self, message: InboundMessage) {
        let mut messages = self.messages.lock().expect("history lock poisoned");
        messages.push_front(message);
        messages.truncate(self.capacity);
    }
}

impl HistorySource for InMemoryHistory {
    async fn recent_messages(
        &self,
        _conversation: ConversationId,
        limit: usize,
    ) -> Result<HistoryStream, HistoryError> {
        let messages: Vec<InboundMessage> = {
            let guard = self.messages.lock().expect("history lock poisoned");
            guard.iter().take(limit).cloned().collect()
        };
        Ok(Box::pin(futures_util::stream::iter(messages)))
    }
}

/// Prints outbound messages and feeds them back into the session history.
struct StdoutSink {
    ai_name: String,
    history: Arc<InMemoryHistory>,
    ids: Arc<IdCounter>,
}

impl StdoutSink {
    fn deliver(&self, text: &str) -> SentMessage {
        println!("{} {}", console::style(format!("{}>", self.ai_name)).cyan(), text);
        let id = self.ids.next();
        self.history.record(InboundMessage {
            id,
            conversation: REPL_CONVERSATION,
            conversation_name: None,
            kind: ChannelKind::Direct,
            author: BOT_USER,
            author_name: self.ai_name.clone(),
            author_is_bot: true,
            mentions: Vec::new(),
            text: text.to_string(),
            timestamp: Utc::now(),
            nsfw: false,
        });
        SentMessage {
            id,
            text: text.to_string(),
        }
    }
}

impl OutboundSink for StdoutSink {
    async fn send_text(
        &self,
        _conversation: ConversationId,
        text: &str,
    ) -> Result<SentMessage, DeliveryError> {
        Ok(self.deliver(text))
    }

    async fn send_image(
        &self,
        _conversation: ConversationId,
        caption: &str,
        image: GeneratedImage,
    ) -> Result<SentMessage, DeliveryError> {
        let sent = self.deliver(caption);
        let path = format!("banter-image-{}.png", sent.id);
        tokio::fs::write(&path, &image.bytes)
            .await
            .map_err(|err| DeliveryError::Send(err.to_string()))?;
        println!("{}", console::style(format!("(image saved to {path})")).dim());
        Ok(sent)
    }
}

/// Run the interactive chat loop until EOF or `/quit`.
pub async fn run(config: BanterConfig) -> anyhow::Result<()> {
    let history = Arc::new(InMemoryHistory::new(200));
    let ids = Arc::new(IdCounter::new());
    let sink = Arc::new(StdoutSink {
        ai_name: config.persona.ai_name.clone(),
        history: Arc::clone(&history),
        ids: Arc::clone(&ids),
    });
    let textgen = Arc::new(OpenAiCompatGenerator::new(&config.textgen));
    let image = config
        .image
        .enabled
        .then(|| Arc::new(SdWebUiClient::new(&config.image)));

    let engine = ResponseEngine::new(
        &config,
        BOT_USER,
        Arc::clone(&history),
        textgen,
        Arc::clone(&sink),
        image,
        Arc::new(ThreadRandom),
    )?;

    println!(
        "Chatting with {} ({}). {} to exit, {} for stats.",
        console::style(&config.persona.ai_name).cyan().bold(),
        console::style(&config.textgen.base_url).dim(),
        console::style("/quit").yellow(),
        console::style("/stats").yellow(),
    );

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    while let Some(line) = lines.next_line().await? {
        let line = line.trim();
        match line {
            "" => continue,
            "/quit" => break,
            "/stats" => {
                engine.stats().log_summary();
                continue;
            }
            _ => {}
        }

        let message = InboundMessage {
            id: ids.next(),
            conversation: REPL_CONVERSATION,
            conversation_name: None,
            kind: ChannelKind::Direct,
            author: REPL_USER,
            author_name: "you".to_string(),
            author_is_bot: false,
            mentions: Vec::new(),
            text: line.to_string(),
            timestamp: Utc::now(),
            nsfw: false,
        };
        history.record(message.clone());

        if let banter_core::engine::CycleOutcome::Failed = engine.handle_message(&message).await {
            error!("response failed; see log for details");
        }
    }

    engine.stats().log_summary();
    Ok(())
}
