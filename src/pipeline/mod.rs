//! Job orchestration: the status graph, the record contract, and the
//! generic stage executor both stages are built on.

pub mod dispatcher;
pub mod executor;
pub mod record;
pub mod redrive;
pub mod status;
pub mod store;
pub mod sweeper;
pub mod trigger;

pub use dispatcher::{Dispatcher, TriggerQueue};
pub use executor::{
    bounded, NoOpReason, PipelineError, StageExecutor, StageFailure, StageOutcome, StageOutput,
};
pub use record::{
    ActionItem, FieldChange, JobId, JobRecord, JobUpdate, MeetingSummary, NewJob, SourceRef,
};
pub use redrive::{reclaim_stale, redrive, RedriveError, RedriveTarget};
pub use status::{JobStatus, Stage};
pub use store::{JobFilter, JobStore, StoreError};
pub use sweeper::{SweepReport, Sweeper};
pub use trigger::{Ack, StorageEvent, SummarizeEvent, Trigger};
