//! Job record data model.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;

use super::status::{JobStatus, Stage};

/// Stable job identity derived from the source object's location.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct JobId(String);

impl JobId {
    /// Wrap an id received from a trigger or the store.
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Hex SHA-256 over `bucket`, a NUL separator, and `key`. Duplicate
    /// deposits of the same object always map to the same id.
    pub fn from_source(source: &SourceRef) -> Self {
        let mut hasher = Sha256::new();
        hasher.update(source.bucket.as_bytes());
        hasher.update([0u8]);
        hasher.update(source.key.as_bytes());
        Self(format!("{:x}", hasher.finalize()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for JobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Location of the original audio/video object.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceRef {
    pub bucket: String,
    pub key: String,
}

impl SourceRef {
    pub fn new(bucket: impl Into<String>, key: impl Into<String>) -> Self {
        Self {
            bucket: bucket.into(),
            key: key.into(),
        }
    }

    /// Parse the `bucket/key` form stored in the jobs table.
    pub fn parse(value: &str) -> Option<Self> {
        let (bucket, key) = value.split_once('/')?;
        if bucket.is_empty() || key.is_empty() {
            return None;
        }
        Some(Self::new(bucket, key))
    }

    pub fn job_id(&self) -> JobId {
        JobId::from_source(self)
    }
}

impl fmt::Display for SourceRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.bucket, self.key)
    }
}

/// One action item extracted from a meeting.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActionItem {
    pub owner: String,
    pub task: String,
    pub due: String,
}

/// Structured meeting output written by the summarization stage.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MeetingSummary {
    pub summary: String,
    pub decisions: Vec<String>,
    pub action_items: Vec<ActionItem>,
}

/// One record per media item.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobRecord {
    pub job_id: JobId,
    pub status: JobStatus,
    pub source_ref: SourceRef,
    pub content_type: Option<String>,
    pub transcript: Option<String>,
    pub summary: Option<MeetingSummary>,
    pub transcribe_attempts: u32,
    pub summarize_attempts: u32,
    /// Stage whose retry budget ran out, set together with `FAILED`.
    pub failed_stage: Option<Stage>,
    pub last_error: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl JobRecord {
    pub fn attempts(&self, stage: Stage) -> u32 {
        match stage {
            Stage::Transcribe => self.transcribe_attempts,
            Stage::Summarize => self.summarize_attempts,
        }
    }
}

/// Fields for a record created on the first observed trigger.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewJob {
    pub source_ref: SourceRef,
    pub content_type: Option<String>,
}

/// How a conditional update treats one optional field.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum FieldChange<T> {
    #[default]
    Keep,
    Set(T),
    Clear,
}

impl<T: Clone> FieldChange<T> {
    pub fn apply(&self, current: Option<T>) -> Option<T> {
        match self {
            Self::Keep => current,
            Self::Set(value) => Some(value.clone()),
            Self::Clear => None,
        }
    }
}

/// Attempt counter adjustment applied by a conditional update.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AttemptChange {
    Increment(Stage),
    Reset(Stage),
}

/// Target status plus field updates for [`crate::pipeline::JobStore::compare_and_update`].
#[derive(Debug, Clone, PartialEq)]
pub struct JobUpdate {
    pub status: JobStatus,
    pub transcript: FieldChange<String>,
    pub summary: FieldChange<MeetingSummary>,
    pub failed_stage: FieldChange<Stage>,
    pub last_error: FieldChange<String>,
    pub attempts: Vec<AttemptChange>,
    /// Extra guard: only apply when `updated_at` still equals this value.
    pub if_updated_at: Option<DateTime<Utc>>,
}

impl JobUpdate {
    pub fn to(status: JobStatus) -> Self {
        Self {
            status,
            transcript: FieldChange::Keep,
            summary: FieldChange::Keep,
            failed_stage: FieldChange::Keep,
            last_error: FieldChange::Keep,
            attempts: Vec::new(),
            if_updated_at: None,
        }
    }

    pub fn transcript(mut self, change: FieldChange<String>) -> Self {
        self.transcript = change;
        self
    }

    pub fn summary(mut self, change: FieldChange<MeetingSummary>) -> Self {
        self.summary = change;
        self
    }

    pub fn failed_stage(mut self, change: FieldChange<Stage>) -> Self {
        self.failed_stage = change;
        self
    }

    pub fn last_error(mut self, change: FieldChange<String>) -> Self {
        self.last_error = change;
        self
    }

    pub fn increment_attempts(mut self, stage: Stage) -> Self {
        self.attempts.push(AttemptChange::Increment(stage));
        self
    }

    pub fn reset_attempts(mut self, stage: Stage) -> Self {
        self.attempts.push(AttemptChange::Reset(stage));
        self
    }

    pub fn if_updated_at(mut self, updated_at: DateTime<Utc>) -> Self {
        self.if_updated_at = Some(updated_at);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_job_id_is_deterministic() {
        let a = SourceRef::new("b", "k1").job_id();
        let b = SourceRef::new("b", "k1").job_id();
        assert_eq!(a, b);
        assert_eq!(a.as_str().len(), 64);
        assert!(a.as_str().chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn test_job_id_separates_bucket_and_key() {
        let a = SourceRef::new("ab", "c").job_id();
        let b = SourceRef::new("a", "bc").job_id();
        assert_ne!(a, b);
    }

    #[test]
    fn test_source_ref_display_and_parse() {
        let source = SourceRef::new("meetings", "2026/10/19/abc-standup.wav");
        let stored = source.to_string();
        assert_eq!(stored, "meetings/2026/10/19/abc-standup.wav");
        assert_eq!(SourceRef::parse(&stored), Some(source));
        assert_eq!(SourceRef::parse("no-key"), None);
        assert_eq!(SourceRef::parse("/key"), None);
    }

    #[test]
    fn test_field_change_apply() {
        let keep: FieldChange<String> = FieldChange::Keep;
        assert_eq!(keep.apply(Some("a".into())), Some("a".to_string()));
        assert_eq!(
            FieldChange::Set("b".to_string()).apply(Some("a".into())),
            Some("b".to_string())
        );
        assert_eq!(FieldChange::<String>::Clear.apply(Some("a".into())), None);
    }

    #[test]
    fn test_summary_json_shape() {
        let summary = MeetingSummary {
            summary: "Roadmap agreed.".to_string(),
            decisions: vec!["Ship in Q3".to_string()],
            action_items: vec![ActionItem {
                owner: "Ana".to_string(),
                task: "Draft plan".to_string(),
                due: "2026-11-01".to_string(),
            }],
        };
        let json = serde_json::to_value(&summary).unwrap();
        assert_eq!(json["action_items"][0]["owner"], "Ana");
        assert_eq!(json["decisions"][0], "Ship in Q3");
    }
}
