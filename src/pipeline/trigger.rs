//! Trigger payloads delivered to the stages.
//!
//! Deliveries are at-least-once. Every field is optional on the wire so a
//! malformed notification can be acknowledged instead of redelivered forever.

use serde::{Deserialize, Serialize};

use super::record::{JobId, JobRecord, NewJob, SourceRef};
use super::status::{JobStatus, Stage};

/// Storage-deposit notification that starts transcription.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StorageEvent {
    pub bucket: Option<String>,
    /// Object key within the bucket.
    #[serde(alias = "key")]
    pub name: Option<String>,
    #[serde(rename = "contentType", alias = "content_type")]
    pub content_type: Option<String>,
}

impl StorageEvent {
    pub fn new(bucket: &str, name: &str, content_type: Option<&str>) -> Self {
        Self {
            bucket: Some(bucket.to_string()),
            name: Some(name.to_string()),
            content_type: content_type.map(str::to_string),
        }
    }

    /// The deposited object, if both bucket and key are present. A bucket
    /// name never contains `/`; the stored `bucket/key` form splits on the
    /// first one, so such an event is rejected rather than given an id it
    /// could not be resolved back to.
    pub fn source_ref(&self) -> Option<SourceRef> {
        let bucket = self.bucket.as_deref().map(str::trim).unwrap_or("");
        let key = self.name.as_deref().map(str::trim).unwrap_or("");
        if bucket.is_empty() || key.is_empty() || bucket.contains('/') {
            return None;
        }
        Some(SourceRef::new(bucket, key))
    }

    pub fn new_job(&self) -> Option<NewJob> {
        Some(NewJob {
            source_ref: self.source_ref()?,
            content_type: self.content_type.clone(),
        })
    }
}

/// "Transcription ready" notification that starts summarization.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SummarizeEvent {
    pub job_id: Option<String>,
}

impl SummarizeEvent {
    pub fn for_job(job_id: &JobId) -> Self {
        Self {
            job_id: Some(job_id.to_string()),
        }
    }

    pub fn job_id(&self) -> Option<JobId> {
        self.job_id
            .as_deref()
            .map(str::trim)
            .filter(|id| !id.is_empty())
            .map(JobId::new)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Trigger {
    Transcribe(StorageEvent),
    Summarize(SummarizeEvent),
}

impl Trigger {
    /// The trigger that moves a waiting record forward, if it is waiting.
    pub fn for_record(record: &JobRecord) -> Option<Self> {
        match record.status {
            JobStatus::Pending => Some(Self::Transcribe(StorageEvent::new(
                &record.source_ref.bucket,
                &record.source_ref.key,
                record.content_type.as_deref(),
            ))),
            JobStatus::Transcribed => Some(Self::Summarize(SummarizeEvent::for_job(&record.job_id))),
            _ => None,
        }
    }

    pub fn stage(&self) -> Stage {
        match self {
            Self::Transcribe(_) => Stage::Transcribe,
            Self::Summarize(_) => Stage::Summarize,
        }
    }
}

/// What the delivering system should do with a notification.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Ack {
    /// Handled (or nothing to do). Do not redeliver.
    Handled,
    /// Transient failure; the notification may be redelivered.
    Redeliver,
}
