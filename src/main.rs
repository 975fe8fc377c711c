use anyhow::Result;
use clap::Parser;
use minutia::{
    app,
    cli::{
        handle_jobs_command, handle_redrive_command, handle_summarize_command,
        handle_sweep_command, handle_transcribe_command, Cli, CliCommand,
    },
    config::Config,
};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let log_level = if cli.verbose { "debug" } else { "info" };
    let env_filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(log_level))
        .unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::fmt().with_env_filter(env_filter).init();

    if let Some(CliCommand::Version) = cli.command {
        println!("minutia {}", env!("CARGO_PKG_VERSION"));
        return Ok(());
    }

    let config = Config::load(cli.config.as_deref())?;

    match cli.command {
        Some(CliCommand::Transcribe(args)) => handle_transcribe_command(config, args).await,
        Some(CliCommand::Summarize(args)) => handle_summarize_command(config, args).await,
        Some(CliCommand::Jobs(args)) => handle_jobs_command(&config, args.command).await,
        Some(CliCommand::Redrive(args)) => handle_redrive_command(&config, args).await,
        Some(CliCommand::Sweep(args)) => handle_sweep_command(config, args).await,
        Some(CliCommand::Serve) | Some(CliCommand::Version) | None => {
            app::run_service(config).await
        }
    }
}
