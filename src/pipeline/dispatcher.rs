//! Routes triggers to stages and chains them.
//!
//! After a successful transcription commit the dispatcher emits a
//! `Summarize` trigger on its queue; after a retryable failure it schedules
//! re-delivery of the same trigger once the backoff has elapsed. Both are
//! best effort: the sweeper re-emits anything the queue loses.

use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

use crate::summarization::SummarizationStage;
use crate::transcription::TranscriptionStage;

use super::executor::{PipelineError, StageOutcome};
use super::record::JobId;
use super::trigger::{Ack, StorageEvent, SummarizeEvent, Trigger};

pub type TriggerQueue = mpsc::UnboundedReceiver<Trigger>;

#[derive(Clone)]
pub struct Dispatcher {
    inner: Arc<DispatcherInner>,
}

struct DispatcherInner {
    transcription: TranscriptionStage,
    summarization: SummarizationStage,
    queue: mpsc::UnboundedSender<Trigger>,
    redeliver_after: Duration,
}

impl Dispatcher {
    /// `redeliver_after` is the delay before a trigger acknowledged with
    /// [`Ack::Redeliver`] is put back on the queue.
    pub fn new(
        transcription: TranscriptionStage,
        summarization: SummarizationStage,
        redeliver_after: Duration,
    ) -> (Self, TriggerQueue) {
        let (tx, rx) = mpsc::unbounded_channel();
        let dispatcher = Self {
            inner: Arc::new(DispatcherInner {
                transcription,
                summarization,
                queue: tx,
                redeliver_after,
            }),
        };
        (dispatcher, rx)
    }

    /// Enqueue a trigger for the dispatch loop.
    pub fn submit(&self, trigger: Trigger) {
        if self.inner.queue.send(trigger).is_err() {
            warn!("Trigger queue closed, dropping trigger");
        }
    }

    pub fn submit_after(&self, trigger: Trigger, delay: Duration) {
        let dispatcher = self.clone();
        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            dispatcher.submit(trigger);
        });
    }

    /// Handle one trigger to completion and report how the delivering side
    /// should treat it.
    pub async fn dispatch(&self, trigger: Trigger) -> Ack {
        match &trigger {
            Trigger::Transcribe(event) => self.transcribe(&trigger, event).await,
            Trigger::Summarize(event) => self.summarize(&trigger, event).await,
        }
    }

    async fn transcribe(&self, trigger: &Trigger, event: &StorageEvent) -> Ack {
        let Some(job) = event.new_job() else {
            warn!("Invalid storage event, missing or malformed bucket or name: {:?}", event);
            return Ack::Handled;
        };

        info!(
            source = %job.source_ref,
            content_type = job.content_type.as_deref().unwrap_or("unknown"),
            "Transcription trigger received"
        );

        match self.inner.transcription.handle(&job).await {
            Ok((job_id, outcome)) => {
                if let StageOutcome::Completed(_) = outcome {
                    debug!(job_id = %job_id, "Emitting summarization trigger");
                    self.submit(Trigger::Summarize(SummarizeEvent::for_job(&job_id)));
                }
                self.settle(trigger, &job_id, Ok(outcome))
            }
            Err(e) => self.settle(trigger, &job.source_ref.job_id(), Err(e)),
        }
    }

    async fn summarize(&self, trigger: &Trigger, event: &SummarizeEvent) -> Ack {
        let Some(job_id) = event.job_id() else {
            warn!("Invalid summarize event, missing job_id");
            return Ack::Handled;
        };

        info!(job_id = %job_id, "Summarization trigger received");
        let result = self.inner.summarization.handle(&job_id).await;
        self.settle(trigger, &job_id, result)
    }

    fn settle(
        &self,
        trigger: &Trigger,
        job_id: &JobId,
        result: Result<StageOutcome, PipelineError>,
    ) -> Ack {
        let stage = trigger.stage();
        match result {
            Ok(StageOutcome::Retrying { retry_after, .. }) => {
                self.submit_after(trigger.clone(), retry_after);
                Ack::Handled
            }
            Ok(_) => Ack::Handled,
            Err(PipelineError::Store(e)) => {
                error!(job_id = %job_id, stage = %stage, "Store failure, trigger may be redelivered: {}", e);
                Ack::Redeliver
            }
            Err(e) => {
                // Redelivery cannot fix a missing record or a stage bug.
                error!(job_id = %job_id, stage = %stage, "Data integrity fault: {}", e);
                Ack::Handled
            }
        }
    }

    /// Dispatch loop: each trigger runs on its own task.
    pub async fn run(&self, mut queue: TriggerQueue) {
        info!("Trigger dispatch loop started");
        while let Some(trigger) = queue.recv().await {
            let dispatcher = self.clone();
            tokio::spawn(async move {
                if dispatcher.dispatch(trigger.clone()).await == Ack::Redeliver {
                    dispatcher.submit_after(trigger, dispatcher.inner.redeliver_after);
                }
            });
        }
        info!("Trigger dispatch loop stopped");
    }

    /// Dispatch everything currently queued, including triggers emitted while
    /// draining, without spawning. Used by one-shot commands.
    pub async fn drain(&self, queue: &mut TriggerQueue) -> usize {
        let mut handled = 0;
        while let Ok(trigger) = queue.try_recv() {
            self.dispatch(trigger).await;
            handled += 1;
        }
        handled
    }
}
