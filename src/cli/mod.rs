use anyhow::{anyhow, Result};

use crate::app::Pipeline;
use crate::config::Config;
use crate::pipeline::{Ack, JobId, StorageEvent, SummarizeEvent, Trigger};

pub mod args;
pub mod jobs;

pub use args::{
    Cli, CliCommand, JobsCliArgs, JobsCommand, RedriveCliArgs, SummarizeCliArgs, SweepCliArgs,
    TranscribeCliArgs,
};
pub use jobs::{handle_jobs_command, handle_redrive_command, handle_sweep_command};

/// Deliver one storage event, then keep dispatching whatever it chains
/// (the summarization trigger) until the queue is empty.
pub async fn handle_transcribe_command(config: Config, args: TranscribeCliArgs) -> Result<()> {
    let mut pipeline = Pipeline::from_config(config)?;
    let event = StorageEvent::new(&args.bucket, &args.name, args.content_type.as_deref());
    let job_id = event
        .source_ref()
        .map(|source| source.job_id())
        .ok_or_else(|| anyhow!("Bucket and name must be non-empty, and the bucket may not contain '/'"))?;

    run_trigger(&mut pipeline, Trigger::Transcribe(event)).await?;
    report(&pipeline, &job_id).await
}

pub async fn handle_summarize_command(config: Config, args: SummarizeCliArgs) -> Result<()> {
    let mut pipeline = Pipeline::from_config(config)?;
    let job_id = JobId::new(args.job_id);

    run_trigger(
        &mut pipeline,
        Trigger::Summarize(SummarizeEvent::for_job(&job_id)),
    )
    .await?;
    report(&pipeline, &job_id).await
}

async fn run_trigger(pipeline: &mut Pipeline, trigger: Trigger) -> Result<()> {
    if pipeline.dispatcher.dispatch(trigger).await == Ack::Redeliver {
        return Err(anyhow!(
            "Job store unavailable; the trigger was not processed"
        ));
    }
    pipeline.dispatcher.drain(&mut pipeline.queue).await;
    Ok(())
}

async fn report(pipeline: &Pipeline, job_id: &JobId) -> Result<()> {
    match pipeline.store.get(job_id).await? {
        Some(job) => {
            jobs::print_job(&job);
            if !job.status.is_terminal() {
                println!(
                    "\nJob is {}; a running service will retry it after backoff.",
                    job.status
                );
            }
        }
        None => println!("No job recorded for {}", job_id),
    }
    Ok(())
}
