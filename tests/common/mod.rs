#![allow(dead_code)]

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use minutia::config::PipelineConfig;
use minutia::db::SqliteJobStore;
use minutia::pipeline::{Dispatcher, JobStore, SourceRef, StageExecutor, TriggerQueue};
use minutia::summarization::{PromptSpec, SummarizationProvider, SummarizationStage};
use minutia::transcription::{Transcriber, TranscriptionStage};

pub const VALID_SUMMARY: &str = r#"{
    "summary": "The team reviewed the launch. Ana will own the rollout plan.",
    "decisions": ["Launch on Friday", "Skip the beta"],
    "action_items": [
        {"owner": "Ana", "task": "Write the rollout plan", "due": "2026-10-23"},
        {"owner": "Ben", "task": "Notify support", "due": "unspecified"}
    ]
}"#;

/// One scripted collaborator reply.
#[derive(Debug, Clone)]
pub enum Reply {
    Text(&'static str),
    Error(&'static str),
    /// Never answers; the stage timeout cuts it off.
    Hang,
}

impl Reply {
    async fn play(self, delay: Duration) -> Result<String> {
        tokio::time::sleep(delay).await;
        match self {
            Reply::Text(text) => Ok(text.to_string()),
            Reply::Error(message) => Err(anyhow!(message)),
            Reply::Hang => {
                tokio::time::sleep(Duration::from_secs(3600)).await;
                Err(anyhow!("unreachable"))
            }
        }
    }
}

/// Plays replies in order, then repeats the last one.
pub struct Script {
    replies: Mutex<VecDeque<Reply>>,
    last: Mutex<Reply>,
    delay: Duration,
    calls: AtomicU32,
}

impl Script {
    pub fn new(replies: Vec<Reply>) -> Arc<Self> {
        Self::with_delay(replies, Duration::ZERO)
    }

    pub fn with_delay(replies: Vec<Reply>, delay: Duration) -> Arc<Self> {
        let last = replies.last().cloned().unwrap_or(Reply::Error("no reply scripted"));
        Arc::new(Self {
            replies: Mutex::new(replies.into()),
            last: Mutex::new(last),
            delay,
            calls: AtomicU32::new(0),
        })
    }

    pub fn calls(&self) -> u32 {
        self.calls.load(Ordering::SeqCst)
    }

    async fn next(&self) -> Result<String> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let reply = {
            let mut replies = self.replies.lock().unwrap();
            match replies.pop_front() {
                Some(reply) => {
                    *self.last.lock().unwrap() = reply.clone();
                    reply
                }
                None => self.last.lock().unwrap().clone(),
            }
        };
        reply.play(self.delay).await
    }
}

#[async_trait]
impl Transcriber for Script {
    async fn transcribe(&self, _source: &SourceRef, _content_type: Option<&str>) -> Result<String> {
        self.next().await
    }
}

#[async_trait]
impl SummarizationProvider for Script {
    fn name(&self) -> &'static str {
        "scripted"
    }

    async fn summarize(&self, transcript: &str, _prompt: &PromptSpec) -> Result<String> {
        assert!(!transcript.trim().is_empty(), "summarizer called without transcript");
        self.next().await
    }
}

pub struct Harness {
    pub store: Arc<SqliteJobStore>,
    pub dispatcher: Dispatcher,
    pub queue: TriggerQueue,
    pub transcriber: Arc<Script>,
    pub summarizer: Arc<Script>,
    pub config: PipelineConfig,
}

pub fn pipeline_config() -> PipelineConfig {
    PipelineConfig {
        retry_limit: 3,
        backoff_base_seconds: 0,
        backoff_max_seconds: 0,
        stale_after_seconds: 900,
        sweep_interval_seconds: 60,
    }
}

pub fn harness(transcriber: Arc<Script>, summarizer: Arc<Script>) -> Harness {
    let store = Arc::new(SqliteJobStore::open_in_memory().unwrap());
    let config = pipeline_config();
    let shared: Arc<dyn JobStore> = store.clone();

    let executor = StageExecutor::new(shared, config.clone());
    let transcription = TranscriptionStage::new(
        executor.clone(),
        transcriber.clone(),
        Duration::from_millis(100),
    );
    let summarization = SummarizationStage::new(
        executor,
        summarizer.clone(),
        PromptSpec::default(),
        Duration::from_millis(100),
    )
    .unwrap();
    let (dispatcher, queue) =
        Dispatcher::new(transcription, summarization, Duration::from_millis(10));

    Harness {
        store,
        dispatcher,
        queue,
        transcriber,
        summarizer,
        config,
    }
}
