//! Job status values, pipeline stages, and the legal transition graph.
//!
//! ```text
//! PENDING ─claim─▶ TRANSCRIBING ─commit─▶ TRANSCRIBED ─claim─▶ SUMMARIZING ─commit─▶ COMPLETED
//!    ▲                 │    │                  ▲                  │    │
//!    └────retry────────┘    │                  └─────retry────────┘    │
//!    │                      ▼                  │                       ▼
//!    └──────re-drive────  FAILED  ─────────re-drive──────────────── FAILED
//! ```

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Lifecycle status of a job record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum JobStatus {
    Pending,
    Transcribing,
    Transcribed,
    Summarizing,
    Completed,
    Failed,
}

impl JobStatus {
    pub const ALL: [JobStatus; 6] = [
        JobStatus::Pending,
        JobStatus::Transcribing,
        JobStatus::Transcribed,
        JobStatus::Summarizing,
        JobStatus::Completed,
        JobStatus::Failed,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "PENDING",
            Self::Transcribing => "TRANSCRIBING",
            Self::Transcribed => "TRANSCRIBED",
            Self::Summarizing => "SUMMARIZING",
            Self::Completed => "COMPLETED",
            Self::Failed => "FAILED",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed)
    }

    /// The stage currently holding a claim on a record in this status.
    pub fn in_progress_stage(&self) -> Option<Stage> {
        match self {
            Self::Transcribing => Some(Stage::Transcribe),
            Self::Summarizing => Some(Stage::Summarize),
            _ => None,
        }
    }

    /// Whether the pipeline itself may move a record from `self` to `next`.
    ///
    /// Operator re-drives are checked separately by [`JobStatus::can_redrive_to`].
    pub fn can_transition_to(&self, next: JobStatus) -> bool {
        use JobStatus::*;
        matches!(
            (self, next),
            (Pending, Transcribing)
                | (Transcribing, Transcribed)
                | (Transcribing, Pending)
                | (Transcribing, Failed)
                | (Transcribed, Summarizing)
                | (Summarizing, Completed)
                | (Summarizing, Transcribed)
                | (Summarizing, Failed)
        )
    }

    /// Whether an explicit re-drive may reset a record from `self` to `target`.
    pub fn can_redrive_to(&self, target: JobStatus) -> bool {
        matches!(
            (self, target),
            (JobStatus::Failed, JobStatus::Pending) | (JobStatus::Failed, JobStatus::Transcribed)
        )
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for JobStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        JobStatus::ALL
            .into_iter()
            .find(|status| status.as_str().eq_ignore_ascii_case(s))
            .ok_or_else(|| format!("Invalid job status: {}", s))
    }
}

/// One pipeline phase with its precondition / in-progress / completion statuses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Stage {
    Transcribe,
    Summarize,
}

impl Stage {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Transcribe => "transcribe",
            Self::Summarize => "summarize",
        }
    }

    /// Status a record must be in for this stage to claim it.
    pub fn precondition(&self) -> JobStatus {
        match self {
            Self::Transcribe => JobStatus::Pending,
            Self::Summarize => JobStatus::Transcribed,
        }
    }

    pub fn in_progress(&self) -> JobStatus {
        match self {
            Self::Transcribe => JobStatus::Transcribing,
            Self::Summarize => JobStatus::Summarizing,
        }
    }

    pub fn completion(&self) -> JobStatus {
        match self {
            Self::Transcribe => JobStatus::Transcribed,
            Self::Summarize => JobStatus::Completed,
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Stage {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "transcribe" => Ok(Self::Transcribe),
            "summarize" => Ok(Self::Summarize),
            _ => Err(format!("Invalid stage: {}", s)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_as_str_roundtrip() {
        for status in JobStatus::ALL {
            assert_eq!(status.as_str().parse::<JobStatus>().unwrap(), status);
        }
        assert_eq!("transcribed".parse::<JobStatus>().unwrap(), JobStatus::Transcribed);
        assert!("DONE".parse::<JobStatus>().is_err());
    }

    #[test]
    fn test_status_serialization() {
        let json = serde_json::to_string(&JobStatus::Summarizing).unwrap();
        assert_eq!(json, "\"SUMMARIZING\"");
    }

    #[test]
    fn test_stage_status_pairs() {
        assert_eq!(Stage::Transcribe.precondition(), JobStatus::Pending);
        assert_eq!(Stage::Transcribe.in_progress(), JobStatus::Transcribing);
        assert_eq!(Stage::Transcribe.completion(), JobStatus::Transcribed);
        assert_eq!(Stage::Summarize.precondition(), JobStatus::Transcribed);
        assert_eq!(Stage::Summarize.in_progress(), JobStatus::Summarizing);
        assert_eq!(Stage::Summarize.completion(), JobStatus::Completed);
    }

    #[test]
    fn test_every_stage_edge_is_legal() {
        for stage in [Stage::Transcribe, Stage::Summarize] {
            let claimed = stage.in_progress();
            assert!(stage.precondition().can_transition_to(claimed));
            assert!(claimed.can_transition_to(stage.completion()));
            assert!(claimed.can_transition_to(stage.precondition()));
            assert!(claimed.can_transition_to(JobStatus::Failed));
        }
    }

    #[test]
    fn test_exactly_eight_pipeline_transitions() {
        let legal = JobStatus::ALL
            .iter()
            .flat_map(|from| JobStatus::ALL.iter().map(move |to| (*from, *to)))
            .filter(|(from, to)| from.can_transition_to(*to))
            .count();
        assert_eq!(legal, 8);
    }

    #[test]
    fn test_no_backward_or_terminal_exits() {
        assert!(!JobStatus::Transcribed.can_transition_to(JobStatus::Pending));
        assert!(!JobStatus::Completed.can_transition_to(JobStatus::Summarizing));
        assert!(!JobStatus::Pending.can_transition_to(JobStatus::Transcribed));
        for to in JobStatus::ALL {
            assert!(!JobStatus::Completed.can_transition_to(to));
            assert!(!JobStatus::Failed.can_transition_to(to));
        }
    }

    #[test]
    fn test_redrive_only_from_failed() {
        assert!(JobStatus::Failed.can_redrive_to(JobStatus::Pending));
        assert!(JobStatus::Failed.can_redrive_to(JobStatus::Transcribed));
        assert!(!JobStatus::Failed.can_redrive_to(JobStatus::Completed));
        assert!(!JobStatus::Completed.can_redrive_to(JobStatus::Pending));
    }

    #[test]
    fn test_in_progress_stage() {
        assert_eq!(JobStatus::Transcribing.in_progress_stage(), Some(Stage::Transcribe));
        assert_eq!(JobStatus::Summarizing.in_progress_stage(), Some(Stage::Summarize));
        assert_eq!(JobStatus::Pending.in_progress_stage(), None);
    }
}
