use clap::{Args as ClapArgs, Parser, Subcommand};
use std::path::PathBuf;

use crate::pipeline::RedriveTarget;

#[derive(Parser, Debug)]
#[command(name = "minutia")]
#[command(about = "Meeting recordings to transcripts, summaries, and action items", long_about = None)]
pub struct Cli {
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Config file (default: ~/.config/minutia/config.toml)
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Option<CliCommand>,
}

#[derive(Subcommand, Debug)]
pub enum CliCommand {
    /// Run the HTTP entry point, trigger loop, and sweeper (default)
    Serve,
    /// Deliver a storage-deposit trigger and process it to completion
    Transcribe(TranscribeCliArgs),
    /// Deliver a transcription-ready trigger for a job
    Summarize(SummarizeCliArgs),
    /// Inspect job records
    Jobs(JobsCliArgs),
    /// Reset a failed job so the pipeline picks it up again
    Redrive(RedriveCliArgs),
    /// Reclaim stale claims and re-emit triggers for waiting jobs
    Sweep(SweepCliArgs),
    /// Print version information
    Version,
}

#[derive(ClapArgs, Debug)]
pub struct TranscribeCliArgs {
    /// Bucket holding the deposited object
    #[arg(short, long)]
    pub bucket: String,
    /// Object key within the bucket
    #[arg(short, long)]
    pub name: String,
    /// Content-type hint, e.g. audio/wav or video/mp4
    #[arg(long)]
    pub content_type: Option<String>,
}

#[derive(ClapArgs, Debug)]
pub struct SummarizeCliArgs {
    pub job_id: String,
}

#[derive(ClapArgs, Debug)]
pub struct JobsCliArgs {
    #[command(subcommand)]
    pub command: JobsCommand,
}

#[derive(Subcommand, Debug)]
pub enum JobsCommand {
    /// List jobs, most recently updated first
    List {
        /// Filter by status (PENDING, TRANSCRIBED, FAILED, ...)
        #[arg(short, long)]
        status: Option<String>,
        /// Maximum number of results to show
        #[arg(short, long, default_value = "20")]
        limit: usize,
        /// Print raw JSON
        #[arg(long)]
        json: bool,
    },
    /// Show one job in full
    Show {
        job_id: String,
        /// Print raw JSON
        #[arg(long)]
        json: bool,
    },
}

#[derive(ClapArgs, Debug)]
pub struct RedriveCliArgs {
    pub job_id: String,
    /// Restart point: `pending` (transcribe again) or `transcribed` (summarize again)
    #[arg(long)]
    pub to: RedriveTarget,
}

#[derive(ClapArgs, Debug)]
pub struct SweepCliArgs {
    /// Only reclaim stale claims; do not process waiting jobs
    #[arg(long)]
    pub reclaim_only: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_no_subcommand_means_serve() {
        let cli = Cli::try_parse_from(["minutia", "-v"]).unwrap();
        assert!(cli.verbose);
        assert!(cli.command.is_none());
    }

    #[test]
    fn test_parse_redrive() {
        let cli =
            Cli::try_parse_from(["minutia", "redrive", "abc", "--to", "transcribed"]).unwrap();
        match cli.command {
            Some(CliCommand::Redrive(args)) => {
                assert_eq!(args.job_id, "abc");
                assert_eq!(args.to, RedriveTarget::Transcribed);
            }
            other => panic!("unexpected command {:?}", other),
        }

        assert!(Cli::try_parse_from(["minutia", "redrive", "abc", "--to", "done"]).is_err());
    }

    #[test]
    fn test_parse_transcribe() {
        let cli = Cli::try_parse_from([
            "minutia",
            "--config",
            "/tmp/m.toml",
            "transcribe",
            "--bucket",
            "b",
            "--name",
            "k1",
            "--content-type",
            "audio/wav",
        ])
        .unwrap();
        assert_eq!(cli.config, Some(PathBuf::from("/tmp/m.toml")));
        match cli.command {
            Some(CliCommand::Transcribe(args)) => {
                assert_eq!(args.bucket, "b");
                assert_eq!(args.content_type.as_deref(), Some("audio/wav"));
            }
            other => panic!("unexpected command {:?}", other),
        }
    }

    #[test]
    fn test_parse_jobs_list_defaults() {
        let cli = Cli::try_parse_from(["minutia", "jobs", "list"]).unwrap();
        match cli.command {
            Some(CliCommand::Jobs(JobsCliArgs {
                command: JobsCommand::List { status, limit, json },
            })) => {
                assert!(status.is_none());
                assert_eq!(limit, 20);
                assert!(!json);
            }
            other => panic!("unexpected command {:?}", other),
        }
    }
}
