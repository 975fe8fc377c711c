//! Job inspection and operator commands.

use anyhow::{anyhow, Result};
use chrono::Utc;

use super::args::{JobsCommand, RedriveCliArgs, SweepCliArgs};
use crate::app::{self, Pipeline};
use crate::config::Config;
use crate::pipeline::{self, JobFilter, JobId, JobRecord, JobStatus, Trigger};

pub async fn handle_jobs_command(config: &Config, command: JobsCommand) -> Result<()> {
    let store = app::open_store(config)?;

    match command {
        JobsCommand::List {
            status,
            limit,
            json,
        } => {
            let mut filter = JobFilter::default().with_limit(limit);
            if let Some(status) = status {
                let status: JobStatus = status.parse().map_err(|e: String| anyhow!(e))?;
                filter = filter.with_status(status);
            }
            let jobs = store.list(&filter).await?;

            if json {
                println!("{}", serde_json::to_string_pretty(&jobs)?);
                return Ok(());
            }
            if jobs.is_empty() {
                println!("No jobs found matching your criteria.");
                return Ok(());
            }

            println!("Found {} job(s):\n", jobs.len());
            for job in &jobs {
                print_summary_line(job);
            }
            println!("\nTo see a job in full, use: minutia jobs show <ID>");
        }
        JobsCommand::Show { job_id, json } => {
            let job_id = JobId::new(job_id);
            let job = store
                .get(&job_id)
                .await?
                .ok_or_else(|| anyhow!("Job {} not found", job_id))?;

            if json {
                println!("{}", serde_json::to_string_pretty(&job)?);
            } else {
                print_job(&job);
            }
        }
    }

    Ok(())
}

pub async fn handle_redrive_command(config: &Config, args: RedriveCliArgs) -> Result<()> {
    let store = app::open_store(config)?;
    let job_id = JobId::new(args.job_id);
    let record = pipeline::redrive(store.as_ref(), &job_id, args.to).await?;

    println!("Job {} re-driven to {}", record.job_id, record.status);
    println!("It will be picked up by the next sweep of a running service, or run `minutia sweep` now.");
    Ok(())
}

pub async fn handle_sweep_command(config: Config, args: SweepCliArgs) -> Result<()> {
    if args.reclaim_only {
        let store = app::open_store(&config)?;
        let reclaimed = pipeline::reclaim_stale(store.as_ref(), &config.pipeline, Utc::now()).await?;
        println!("Reclaimed {} stale claim(s)", reclaimed.len());
        for record in &reclaimed {
            print_summary_line(record);
        }
        return Ok(());
    }

    let mut pipeline = Pipeline::from_config(config)?;
    let report = pipeline.sweeper().sweep_once(Utc::now()).await?;

    // Waiting records are re-emitted even if recently touched.
    for status in [JobStatus::Pending, JobStatus::Transcribed] {
        let filter = JobFilter::default().with_status(status);
        for record in pipeline.store.list(&filter).await? {
            if let Some(trigger) = Trigger::for_record(&record) {
                pipeline.dispatcher.submit(trigger);
            }
        }
    }
    let handled = pipeline.dispatcher.drain(&mut pipeline.queue).await;

    println!(
        "Reverted {} and failed {} stale claim(s); dispatched {} trigger(s)",
        report.reverted, report.failed, handled
    );
    Ok(())
}

fn print_summary_line(job: &JobRecord) {
    println!(
        "{}  {:<12}  {}  (updated {})",
        job.job_id,
        job.status.as_str(),
        job.source_ref,
        job.updated_at.format("%Y-%m-%d %H:%M:%S")
    );
}

pub fn print_job(job: &JobRecord) {
    println!("ID: {}", job.job_id);
    println!("Source: {}", job.source_ref);
    if let Some(content_type) = &job.content_type {
        println!("Content type: {}", content_type);
    }
    println!("Status: {}", job.status);
    println!(
        "Attempts: transcribe {}, summarize {}",
        job.transcribe_attempts, job.summarize_attempts
    );
    if let Some(stage) = job.failed_stage {
        println!("Failed stage: {}", stage);
    }
    if let Some(error) = &job.last_error {
        println!("Last error: {}", error);
    }
    println!("Created: {}", job.created_at.to_rfc3339());
    println!("Updated: {}", job.updated_at.to_rfc3339());

    if let Some(transcript) = &job.transcript {
        let display: String = if transcript.chars().count() > 300 {
            format!("{}...", transcript.chars().take(300).collect::<String>())
        } else {
            transcript.clone()
        };
        println!("\nTranscript:\n{}", display);
    }

    if let Some(summary) = &job.summary {
        println!("\nSummary:\n{}", summary.summary);
        if !summary.decisions.is_empty() {
            println!("\nDecisions:");
            for decision in &summary.decisions {
                println!("  - {}", decision);
            }
        }
        if !summary.action_items.is_empty() {
            println!("\nAction items:");
            for item in &summary.action_items {
                println!("  - {}: {} (due {})", item.owner, item.task, item.due);
            }
        }
    }
}
