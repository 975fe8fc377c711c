use crate::api::{ApiServer, ApiState};
use crate::config::Config;
use crate::db::SqliteJobStore;
use crate::pipeline::{Dispatcher, JobStore, StageExecutor, Sweeper, TriggerQueue};
use crate::summarization::{self, SummarizationProvider, SummarizationStage};
use crate::transcription::{MediaTranscriber, Transcriber, TranscriptionStage};
use anyhow::{Context, Result};
use std::sync::Arc;
use tracing::{error, info};

/// Everything a trigger needs, wired from one immutable [`Config`].
pub struct Pipeline {
    pub config: Arc<Config>,
    pub store: Arc<dyn JobStore>,
    pub dispatcher: Dispatcher,
    pub queue: TriggerQueue,
}

impl Pipeline {
    /// Wire stages around explicit collaborators.
    pub fn new(
        config: Config,
        store: Arc<dyn JobStore>,
        transcriber: Arc<dyn Transcriber>,
        summarizer: Arc<dyn SummarizationProvider>,
    ) -> Result<Self> {
        let executor = StageExecutor::new(Arc::clone(&store), config.pipeline.clone());
        let transcription =
            TranscriptionStage::new(executor.clone(), transcriber, config.transcription.timeout());
        let summarization =
            SummarizationStage::from_config(executor, summarizer, &config.summarization)?;

        let (dispatcher, queue) = Dispatcher::new(
            transcription,
            summarization,
            config.pipeline.backoff(1),
        );

        Ok(Self {
            config: Arc::new(config),
            store,
            dispatcher,
            queue,
        })
    }

    /// Wire the configured providers and the on-disk store.
    pub fn from_config(config: Config) -> Result<Self> {
        let store = open_store(&config)?;
        let transcriber: Arc<dyn Transcriber> = Arc::new(MediaTranscriber::from_config(&config)?);
        let summarizer: Arc<dyn SummarizationProvider> =
            Arc::from(summarization::build_provider(&config.summarization)?);
        info!("Using {} for summarization", summarizer.name());
        Self::new(config, store, transcriber, summarizer)
    }

    pub fn sweeper(&self) -> Sweeper {
        Sweeper::new(
            Arc::clone(&self.store),
            self.dispatcher.clone(),
            self.config.pipeline.clone(),
        )
    }

    pub fn api_state(&self) -> ApiState {
        ApiState {
            dispatcher: self.dispatcher.clone(),
            store: Arc::clone(&self.store),
        }
    }
}

pub fn open_store(config: &Config) -> Result<Arc<dyn JobStore>> {
    let path = config.database_path()?;
    let store = SqliteJobStore::open(&path)
        .with_context(|| format!("Failed to open job store at {}", path.display()))?;
    info!("Job store at {:?}", path);
    Ok(Arc::new(store))
}

/// Long-running mode: HTTP entry point, dispatch loop, and sweeper.
pub async fn run_service(config: Config) -> Result<()> {
    info!("Starting minutia service");

    let Pipeline {
        config,
        store,
        dispatcher,
        queue,
    } = Pipeline::from_config(config)?;

    let api_server = ApiServer::new(
        &config.api,
        ApiState {
            dispatcher: dispatcher.clone(),
            store: Arc::clone(&store),
        },
    );
    tokio::spawn(async move {
        if let Err(e) = api_server.start().await {
            error!("API server failed: {}", e);
        }
    });

    let sweeper = Sweeper::new(Arc::clone(&store), dispatcher.clone(), config.pipeline.clone());
    tokio::spawn(async move { sweeper.run().await });

    info!("minutia is ready!");
    info!(
        "Test manually: curl -X POST http://{}:{}/transcribe -d '{{\"bucket\":\"b\",\"name\":\"k1\",\"contentType\":\"audio/wav\"}}'",
        config.api.host, config.api.port
    );

    tokio::select! {
        _ = dispatcher.run(queue) => {}
        result = tokio::signal::ctrl_c() => {
            result.context("Failed to listen for shutdown signal")?;
            info!("Shutdown requested");
        }
    }

    Ok(())
}
