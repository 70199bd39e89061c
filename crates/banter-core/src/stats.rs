//! Aggregate response statistics.
//!
//! Operational logging only: the engine records request arrival, each
//! sentence sent, and the final success or failure. Nothing in the core
//! reads these numbers back.

use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use tracing::{debug, info};
use uuid::Uuid;

/// Statistics for a single in-flight response cycle.
#[derive(Debug)]
pub struct RequestStats {
    request_id: Uuid,
    started: Instant,
    prompt_chars: usize,
    time_to_first_sentence: Option<Duration>,
    sentences: u32,
    chars_sent: usize,
}

impl RequestStats {
    fn new(prompt_chars: usize) -> Self {
        Self {
            request_id: Uuid::now_v7(),
            started: Instant::now(),
            prompt_chars,
            time_to_first_sentence: None,
            sentences: 0,
            chars_sent: 0,
        }
    }

    /// Record one sentence successfully delivered to the platform.
    pub fn record_sentence(&mut self, chars: usize) {
        if self.time_to_first_sentence.is_none() {
            self.time_to_first_sentence = Some(self.started.elapsed());
        }
        self.sentences += 1;
        self.chars_sent += chars;
    }

    pub fn sentences(&self) -> u32 {
        self.sentences
    }
}

#[derive(Debug, Default)]
struct Totals {
    requests: u64,
    successes: u64,
    failures: u64,
    sentences: u64,
    chars_sent: u64,
    response_time: Duration,
}

/// A point-in-time copy of the aggregate counters.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatsSnapshot {
    pub requests: u64,
    pub successes: u64,
    pub failures: u64,
    pub sentences: u64,
    pub chars_sent: u64,
}

/// Running totals across all response cycles.
///
/// Cloning produces a shared view; the engine and any reporting hook see
/// the same counters.
#[derive(Debug, Clone, Default)]
pub struct AggregateStats {
    totals: Arc<Mutex<Totals>>,
}

impl AggregateStats {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a request arriving and start its per-request stats.
    pub fn request_arrived(&self, prompt: &str) -> RequestStats {
        let stats = RequestStats::new(prompt.len());
        {
            let mut totals = self.totals.lock().expect("stats lock poisoned");
            totals.requests += 1;
        }
        debug!(
            request_id = %stats.request_id,
            prompt_chars = stats.prompt_chars,
            "response request started"
        );
        stats
    }

    /// Fold a completed cycle into the totals and log its summary.
    pub fn record_success(&self, request: RequestStats) {
        let elapsed = request.started.elapsed();
        {
            let mut totals = self.totals.lock().expect("stats lock poisoned");
            totals.successes += 1;
            totals.sentences += u64::from(request.sentences);
            totals.chars_sent += request.chars_sent as u64;
            totals.response_time += elapsed;
        }
        info!(
            request_id = %request.request_id,
            sentences = request.sentences,
            chars_sent = request.chars_sent,
            elapsed_ms = elapsed.as_millis() as u64,
            first_sentence_ms = request
                .time_to_first_sentence
                .map(|d| d.as_millis() as u64),
            "response complete"
        );
    }

    /// Record a cycle that ended in an error.
    pub fn record_failure(&self) {
        let mut totals = self.totals.lock().expect("stats lock poisoned");
        totals.failures += 1;
    }

    /// Write a one-line summary of the running totals to the log.
    pub fn log_summary(&self) {
        let snapshot = self.snapshot();
        let totals = self.totals.lock().expect("stats lock poisoned");
        let avg_ms = if snapshot.successes > 0 {
            totals.response_time.as_millis() as u64 / snapshot.successes
        } else {
            0
        };
        drop(totals);
        info!(
            requests = snapshot.requests,
            successes = snapshot.successes,
            failures = snapshot.failures,
            sentences = snapshot.sentences,
            chars_sent = snapshot.chars_sent,
            avg_response_ms = avg_ms,
            "aggregate response stats"
        );
    }

    pub fn snapshot(&self) -> StatsSnapshot {
        let totals = self.totals.lock().expect("stats lock poisoned");
        StatsSnapshot {
            requests: totals.requests,
            successes: totals.successes,
            failures: totals.failures,
            sentences: totals.sentences,
            chars_sent: totals.chars_sent,
        }
    }
}
