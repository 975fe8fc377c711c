//! End-to-end pipeline behavior against an in-memory store and scripted
//! collaborators.

mod common;

use chrono::{Duration as ChronoDuration, Utc};
use std::sync::Arc;
use std::time::Duration;

use common::{harness, Reply, Script, VALID_SUMMARY};
use minutia::app::Pipeline;
use minutia::config::Config;
use minutia::pipeline::{
    redrive, Ack, JobId, JobStatus, JobStore, JobUpdate, NewJob, RedriveTarget, SourceRef, Stage,
    StorageEvent, SummarizeEvent, Sweeper, Trigger,
};

fn deposit(name: &str) -> Trigger {
    Trigger::Transcribe(StorageEvent::new("b", name, Some("audio/wav")))
}

fn job_id(name: &str) -> JobId {
    SourceRef::new("b", name).job_id()
}

fn summarize(id: &JobId) -> Trigger {
    Trigger::Summarize(SummarizeEvent::for_job(id))
}

#[tokio::test]
async fn test_transcription_commits_and_chains_summarization() {
    let mut h = harness(
        Script::new(vec![Reply::Text("hello world")]),
        Script::new(vec![Reply::Text(VALID_SUMMARY)]),
    );

    assert_eq!(h.dispatcher.dispatch(deposit("k1")).await, Ack::Handled);

    let record = h.store.get(&job_id("k1")).await.unwrap().unwrap();
    assert_eq!(record.status, JobStatus::Transcribed);
    assert_eq!(record.transcript.as_deref(), Some("hello world"));
    assert_eq!(record.transcribe_attempts, 1);
    assert_eq!(record.content_type.as_deref(), Some("audio/wav"));

    let chained = h.queue.try_recv().expect("summarization trigger queued");
    assert_eq!(chained, summarize(&job_id("k1")));

    assert_eq!(h.dispatcher.dispatch(chained).await, Ack::Handled);
    let record = h.store.get(&job_id("k1")).await.unwrap().unwrap();
    assert_eq!(record.status, JobStatus::Completed);
    let summary = record.summary.unwrap();
    assert_eq!(summary.decisions, vec!["Launch on Friday", "Skip the beta"]);
    assert_eq!(summary.action_items[1].due, "unspecified");
    assert_eq!(record.summarize_attempts, 1);
    assert!(record.last_error.is_none());
}

#[tokio::test]
async fn test_duplicate_deposit_after_completion_is_noop() {
    let mut h = harness(
        Script::new(vec![Reply::Text("hello world")]),
        Script::new(vec![Reply::Text(VALID_SUMMARY)]),
    );

    h.dispatcher.dispatch(deposit("k1")).await;
    h.dispatcher.drain(&mut h.queue).await;
    let before = h.store.get(&job_id("k1")).await.unwrap().unwrap();
    assert_eq!(before.status, JobStatus::Completed);

    assert_eq!(h.dispatcher.dispatch(deposit("k1")).await, Ack::Handled);
    assert_eq!(
        h.dispatcher.dispatch(summarize(&job_id("k1"))).await,
        Ack::Handled
    );

    let after = h.store.get(&job_id("k1")).await.unwrap().unwrap();
    assert_eq!(after, before);
    assert_eq!(h.transcriber.calls(), 1);
    assert_eq!(h.summarizer.calls(), 1);
    assert!(h.queue.try_recv().is_err());
}

#[tokio::test]
async fn test_hanging_transcriber_exhausts_retries() {
    let h = harness(
        Script::new(vec![Reply::Hang]),
        Script::new(vec![Reply::Text(VALID_SUMMARY)]),
    );
    let id = job_id("slow.wav");

    for attempt in 1..=2 {
        assert_eq!(h.dispatcher.dispatch(deposit("slow.wav")).await, Ack::Handled);
        let record = h.store.get(&id).await.unwrap().unwrap();
        assert_eq!(record.status, JobStatus::Pending);
        assert_eq!(record.transcribe_attempts, attempt);
        assert!(record.last_error.unwrap().contains("timed out"));
    }

    h.dispatcher.dispatch(deposit("slow.wav")).await;
    let record = h.store.get(&id).await.unwrap().unwrap();
    assert_eq!(record.status, JobStatus::Failed);
    assert_eq!(record.failed_stage, Some(Stage::Transcribe));
    assert_eq!(record.transcribe_attempts, 3);
    assert!(record.transcript.is_none());
    assert!(record.last_error.unwrap().contains("timed out"));

    // Terminal: another delivery neither calls out nor changes the record.
    assert_eq!(h.dispatcher.dispatch(deposit("slow.wav")).await, Ack::Handled);
    assert_eq!(h.transcriber.calls(), 3);
    assert_eq!(h.store.get(&id).await.unwrap().unwrap().transcribe_attempts, 3);
}

#[tokio::test]
async fn test_invalid_summary_fails_then_redrive_completes() {
    let mut h = harness(
        Script::new(vec![Reply::Text("we agreed to launch")]),
        Script::new(vec![
            Reply::Text("Sure! Here is your summary."),
            Reply::Text("Sure! Here is your summary."),
            Reply::Text("{\"summary\": \"missing the rest\"}"),
            Reply::Text(VALID_SUMMARY),
        ]),
    );
    let id = job_id("k2");

    h.dispatcher.dispatch(deposit("k2")).await;
    // Discard the chained trigger and any scheduled re-deliveries; this
    // test delivers summarize triggers by hand.
    while h.queue.try_recv().is_ok() {}

    for _ in 0..3 {
        assert_eq!(h.dispatcher.dispatch(summarize(&id)).await, Ack::Handled);
    }

    let failed = h.store.get(&id).await.unwrap().unwrap();
    assert_eq!(failed.status, JobStatus::Failed);
    assert_eq!(failed.failed_stage, Some(Stage::Summarize));
    assert_eq!(failed.summarize_attempts, 3);
    assert!(failed.summary.is_none());
    assert_eq!(failed.transcript.as_deref(), Some("we agreed to launch"));
    assert!(failed.last_error.unwrap().contains("invalid response"));

    let redriven = redrive(h.store.as_ref(), &id, RedriveTarget::Transcribed)
        .await
        .unwrap();
    assert_eq!(redriven.status, JobStatus::Transcribed);
    assert_eq!(redriven.summarize_attempts, 0);
    assert!(redriven.failed_stage.is_none());
    assert!(redriven.last_error.is_none());

    h.dispatcher.dispatch(summarize(&id)).await;
    let done = h.store.get(&id).await.unwrap().unwrap();
    assert_eq!(done.status, JobStatus::Completed);
    assert_eq!(done.summarize_attempts, 1);
    assert_eq!(done.transcribe_attempts, 1);
    assert_eq!(h.transcriber.calls(), 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_duplicate_triggers_run_work_once() {
    let h = harness(
        Script::with_delay(vec![Reply::Text("hello")], Duration::from_millis(40)),
        Script::new(vec![Reply::Text(VALID_SUMMARY)]),
    );

    let tasks: Vec<_> = (0..4)
        .map(|_| {
            let dispatcher = h.dispatcher.clone();
            tokio::spawn(async move { dispatcher.dispatch(deposit("dup.wav")).await })
        })
        .collect();
    for task in tasks {
        assert_eq!(task.await.unwrap(), Ack::Handled);
    }

    let record = h.store.get(&job_id("dup.wav")).await.unwrap().unwrap();
    assert_eq!(record.status, JobStatus::Transcribed);
    assert_eq!(record.transcribe_attempts, 1);
    assert_eq!(h.transcriber.calls(), 1);
}

#[tokio::test]
async fn test_invalid_events_are_acknowledged() {
    let h = harness(
        Script::new(vec![Reply::Text("hello")]),
        Script::new(vec![Reply::Text(VALID_SUMMARY)]),
    );

    let missing_name = Trigger::Transcribe(StorageEvent {
        bucket: Some("b".to_string()),
        ..StorageEvent::default()
    });
    assert_eq!(h.dispatcher.dispatch(missing_name).await, Ack::Handled);
    assert_eq!(
        h.dispatcher
            .dispatch(Trigger::Summarize(SummarizeEvent::default()))
            .await,
        Ack::Handled
    );
    assert_eq!(
        h.dispatcher
            .dispatch(summarize(&JobId::new("no-such-job")))
            .await,
        Ack::Handled
    );

    let nested_bucket = Trigger::Transcribe(StorageEvent::new("team/a", "k1.wav", None));
    assert_eq!(h.dispatcher.dispatch(nested_bucket).await, Ack::Handled);

    let all = h.store.list(&Default::default()).await.unwrap();
    assert!(all.is_empty());
    assert_eq!(h.transcriber.calls(), 0);
    assert_eq!(h.summarizer.calls(), 0);
}

#[tokio::test]
async fn test_sweeper_reclaims_abandoned_claim() {
    let mut h = harness(
        Script::new(vec![Reply::Text("recovered")]),
        Script::new(vec![Reply::Text(VALID_SUMMARY)]),
    );
    let source = SourceRef::new("b", "standups/2026/crashed.wav");
    let id = source.job_id();
    let job = NewJob {
        source_ref: source,
        content_type: None,
    };

    // A worker claims the record and never comes back.
    h.store.create_if_absent(&id, &job).await.unwrap();
    h.store
        .compare_and_update(
            &id,
            JobStatus::Pending,
            &JobUpdate::to(JobStatus::Transcribing).increment_attempts(Stage::Transcribe),
        )
        .await
        .unwrap()
        .unwrap();

    let store: Arc<dyn JobStore> = h.store.clone();
    let sweeper = Sweeper::new(store, h.dispatcher.clone(), h.config.clone());

    let early = sweeper.sweep_once(Utc::now()).await.unwrap();
    assert_eq!(early.reverted, 0);

    let report = sweeper
        .sweep_once(Utc::now() + ChronoDuration::hours(2))
        .await
        .unwrap();
    assert_eq!(report.reverted, 1);
    assert_eq!(report.failed, 0);
    assert!(report.reemitted >= 1);

    let reverted = h.store.get(&id).await.unwrap().unwrap();
    assert_eq!(reverted.status, JobStatus::Pending);
    assert!(reverted.last_error.unwrap().contains("abandoned"));

    h.dispatcher.drain(&mut h.queue).await;
    let record = h.store.get(&id).await.unwrap().unwrap();
    assert_eq!(record.status, JobStatus::Completed);
    assert_eq!(record.transcribe_attempts, 2);
    assert_eq!(h.store.list(&Default::default()).await.unwrap().len(), 1);
}

#[tokio::test]
async fn test_sweeper_fails_abandoned_claim_without_attempts_left() {
    let h = harness(
        Script::new(vec![Reply::Text("unused")]),
        Script::new(vec![Reply::Text(VALID_SUMMARY)]),
    );
    let source = SourceRef::new("b", "doomed.wav");
    let id = source.job_id();
    h.store
        .create_if_absent(
            &id,
            &NewJob {
                source_ref: source,
                content_type: None,
            },
        )
        .await
        .unwrap();

    let mut update = JobUpdate::to(JobStatus::Transcribing);
    for _ in 0..3 {
        update = update.increment_attempts(Stage::Transcribe);
    }
    h.store
        .compare_and_update(&id, JobStatus::Pending, &update)
        .await
        .unwrap()
        .unwrap();

    let store: Arc<dyn JobStore> = h.store.clone();
    let sweeper = Sweeper::new(store, h.dispatcher.clone(), h.config.clone());
    let report = sweeper
        .sweep_once(Utc::now() + ChronoDuration::hours(2))
        .await
        .unwrap();
    assert_eq!(report.failed, 1);
    assert_eq!(report.reverted, 0);

    let record = h.store.get(&id).await.unwrap().unwrap();
    assert_eq!(record.status, JobStatus::Failed);
    assert_eq!(record.failed_stage, Some(Stage::Transcribe));
    assert_eq!(h.transcriber.calls(), 0);
}

#[tokio::test]
async fn test_sweeper_reemits_lost_trigger() {
    let mut h = harness(
        Script::new(vec![Reply::Text("hello")]),
        Script::new(vec![Reply::Text(VALID_SUMMARY)]),
    );

    // Transcription commits, but the chained trigger is lost.
    h.dispatcher.dispatch(deposit("2026/10/lost.wav")).await;
    while h.queue.try_recv().is_ok() {}
    let id = job_id("2026/10/lost.wav");
    assert_eq!(
        h.store.get(&id).await.unwrap().unwrap().status,
        JobStatus::Transcribed
    );

    let store: Arc<dyn JobStore> = h.store.clone();
    let sweeper = Sweeper::new(store, h.dispatcher.clone(), h.config.clone());
    assert_eq!(sweeper.sweep_once(Utc::now()).await.unwrap().reemitted, 0);

    let report = sweeper
        .sweep_once(Utc::now() + ChronoDuration::minutes(5))
        .await
        .unwrap();
    assert_eq!(report.reemitted, 1);

    h.dispatcher.drain(&mut h.queue).await;
    assert_eq!(
        h.store.get(&id).await.unwrap().unwrap().status,
        JobStatus::Completed
    );
    // The re-emitted trigger resolves to the same record.
    assert_eq!(h.store.list(&Default::default()).await.unwrap().len(), 1);
}

#[tokio::test]
async fn test_dispatch_loop_retries_until_completed() {
    let h = harness(
        Script::new(vec![Reply::Error("upstream 502"), Reply::Text("hello")]),
        Script::new(vec![Reply::Hang, Reply::Text(VALID_SUMMARY)]),
    );
    let dispatcher = h.dispatcher.clone();
    let queue = h.queue;
    tokio::spawn(async move { dispatcher.run(queue).await });

    h.dispatcher.submit(deposit("retry.wav"));

    let id = job_id("retry.wav");
    let record = tokio::time::timeout(Duration::from_secs(5), async {
        loop {
            if let Some(record) = h.store.get(&id).await.unwrap() {
                if record.status.is_terminal() {
                    return record;
                }
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .expect("job reached a terminal status");

    assert_eq!(record.status, JobStatus::Completed);
    assert_eq!(record.transcribe_attempts, 2);
    assert_eq!(h.store.list(&Default::default()).await.unwrap().len(), 1);
    assert_eq!(record.summarize_attempts, 2);
    assert!(record.last_error.is_none());
}

#[tokio::test]
async fn test_pipeline_wires_explicit_collaborators() {
    let store: Arc<dyn JobStore> =
        Arc::new(minutia::db::SqliteJobStore::open_in_memory().unwrap());
    let transcriber = Script::new(vec![Reply::Text("wired")]);
    let summarizer = Script::new(vec![Reply::Text(VALID_SUMMARY)]);

    let mut pipeline = Pipeline::new(
        Config::default(),
        Arc::clone(&store),
        transcriber.clone(),
        summarizer.clone(),
    )
    .unwrap();

    pipeline.dispatcher.dispatch(deposit("wired.wav")).await;
    let handled = pipeline.dispatcher.drain(&mut pipeline.queue).await;
    assert_eq!(handled, 1);

    let record = store.get(&job_id("wired.wav")).await.unwrap().unwrap();
    assert_eq!(record.status, JobStatus::Completed);
    assert_eq!(pipeline.api_state().store.get(&record.job_id).await.unwrap().unwrap(), record);
}
