//! Integration tests for the synthesis orchestrator
//! Tests: engine wait -> aggregation -> chapter merge -> final merge -> cleanup

mod common;

use std::sync::Arc;
use std::time::Duration;

use conversion_core::{
    chapter_output_path, BackgroundTaskHandle, CancellationToken, EngineResponse, NoProgress,
    Orchestrator, OrchestratorConfig, PartialFailure, RunOutcome, RunState, SegmentResult,
};

use common::*;

fn orchestrator(engine: FakeEngine) -> Orchestrator {
    Orchestrator::new(
        Arc::new(engine),
        OrchestratorConfig::default().with_timeout(Duration::from_secs(5)),
    )
}

#[test]
fn test_chapter_output_path() {
    let path = chapter_output_path(std::path::Path::new("/books/livre.mp3"), 3, "mp3");
    assert_eq!(path, std::path::PathBuf::from("/books/livre.mp3_chapter_3.mp3"));
}

#[test]
fn test_config_is_kept() {
    let orchestrator = orchestrator(FakeEngine::Hang);
    assert_eq!(orchestrator.config().synthesis_timeout, Duration::from_secs(5));
    assert_eq!(orchestrator.config().chapter_extension, "mp3");
}

#[tokio::test]
async fn test_complete_run_merges_chapters_in_order() {
    let dir = tempfile::tempdir().unwrap();
    let output = dir.path().join("book.mp3");

    // Arrival order deliberately mixes chapters.
    let results = vec![
        SegmentResult::new(write_fragment(dir.path(), "c2s0.mp3", 400, 2), 2, 1),
        SegmentResult::new(write_fragment(dir.path(), "c0s0.mp3", 1000, 0), 0, 2),
        SegmentResult::new(write_fragment(dir.path(), "c1s0.mp3", 600, 1), 1, 3),
        SegmentResult::new(write_fragment(dir.path(), "c0s1.mp3", 500, 0), 0, 4),
    ];
    let engine = FakeEngine::Respond(completed(results, 4));
    let sink = RecordingSink::default();

    let report = orchestrator(engine)
        .run(request(&output), &CancellationToken::new(), &sink)
        .await;

    assert_eq!(report.outcome, RunOutcome::Success(output.clone()));
    assert_eq!(
        report.states,
        vec![
            RunState::Idle,
            RunState::AwaitingSynthesis,
            RunState::Aggregating,
            RunState::MergingChapters,
            RunState::MergingFinal,
            RunState::Done,
        ]
    );
    assert_eq!(report.chapters_merged, vec![0, 1, 2]);

    // chapter 0 = 1000 + (500 - 128), chapter 1 = 600, chapter 2 = 400
    let expected = 1372 + (600 - 128) + (400 - 128);
    assert_eq!(report.final_size, Some(expected));
    assert_eq!(std::fs::metadata(&output).unwrap().len(), expected);

    let bytes = std::fs::read(&output).unwrap();
    assert!(bytes[..1372].iter().all(|b| *b == 0));
    assert!(bytes[1372..1372 + 472].iter().all(|b| *b == 1));
    assert!(bytes[1372 + 472..].iter().all(|b| *b == 2));

    // Only the final file survives.
    assert_eq!(files_in(dir.path()), vec![output]);

    let completed: Vec<u64> = sink.snapshot().iter().map(|s| s.completed).collect();
    assert_eq!(completed, vec![0, 1, 2, 3, 4]);
}

#[tokio::test]
async fn test_failed_chapter_is_excluded() {
    let dir = tempfile::tempdir().unwrap();
    let output = dir.path().join("book.mp3");

    let results = vec![
        SegmentResult::new(write_fragment(dir.path(), "c0s0.mp3", 300, 0), 0, 1),
        // Chapter 1 fragments never made it to disk.
        SegmentResult::new(dir.path().join("c1s0.mp3"), 1, 2),
        SegmentResult::new(dir.path().join("c1s1.mp3"), 1, 3),
        SegmentResult::new(write_fragment(dir.path(), "c2s0.mp3", 200, 2), 2, 4),
        SegmentResult::new(write_fragment(dir.path(), "c0s1.mp3", 300, 0), 0, 5),
    ];
    let engine = FakeEngine::Respond(completed(results, 5));

    let report = orchestrator(engine)
        .run(request(&output), &CancellationToken::new(), &NoProgress)
        .await;

    assert!(report.outcome.is_success());
    assert_eq!(report.chapters_merged, vec![0, 2]);
    assert!(report.dropped.iter().any(|d| matches!(
        d,
        PartialFailure::ChapterMergeFailed { chapter_index: 1, .. }
    )));

    // chapter 0 = 300 + 172 = 472 zeros, then chapter 2 minus its header = 72 twos
    let bytes = std::fs::read(&output).unwrap();
    assert_eq!(bytes.len(), 472 + 72);
    assert!(bytes[..472].iter().all(|b| *b == 0));
    assert!(bytes[472..].iter().all(|b| *b == 2));
    assert_eq!(files_in(dir.path()), vec![output]);
}

#[tokio::test]
async fn test_timeout_creates_no_intermediates() {
    let dir = tempfile::tempdir().unwrap();
    let output = dir.path().join("book.mp3");
    let orchestrator = Orchestrator::new(
        Arc::new(FakeEngine::Hang),
        OrchestratorConfig::default().with_timeout(Duration::from_millis(50)),
    );

    let report = orchestrator
        .run(request(&output), &CancellationToken::new(), &NoProgress)
        .await;

    assert_eq!(report.outcome, RunOutcome::TimedOut);
    assert_eq!(report.outcome.error_code(), Some("TIMEOUT_ERROR"));
    assert_eq!(
        report.states,
        vec![RunState::Idle, RunState::AwaitingSynthesis, RunState::Done]
    );
    assert!(files_in(dir.path()).is_empty());
}

#[tokio::test]
async fn test_cancel_during_wait() {
    let dir = tempfile::tempdir().unwrap();
    let output = dir.path().join("book.mp3");
    let token = CancellationToken::new();
    let orchestrator = orchestrator(FakeEngine::Hang);

    let canceller = {
        let token = token.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(20)).await;
            token.cancel();
        })
    };

    let report = orchestrator.run(request(&output), &token, &NoProgress).await;
    canceller.await.unwrap();

    assert_eq!(report.outcome, RunOutcome::Cancelled);
    assert!(files_in(dir.path()).is_empty());
}

#[tokio::test]
async fn test_cancel_before_run_wins_over_ready_engine() {
    for _ in 0..50 {
        let dir = tempfile::tempdir().unwrap();
        let output = dir.path().join("book.mp3");
        let results = vec![SegmentResult::new(
            write_fragment(dir.path(), "c0s0.mp3", 300, 0),
            0,
            1,
        )];
        let token = CancellationToken::new();
        token.cancel();

        let report = orchestrator(FakeEngine::Respond(completed(results, 1)))
            .run(request(&output), &token, &NoProgress)
            .await;

        assert_eq!(report.outcome, RunOutcome::Cancelled);
        assert_eq!(
            report.states,
            vec![RunState::Idle, RunState::AwaitingSynthesis, RunState::Done]
        );
        assert!(!output.exists());
    }
}

#[tokio::test]
async fn test_cancel_after_synthesis_is_ignored() {
    let dir = tempfile::tempdir().unwrap();
    let output = dir.path().join("book.mp3");
    let results = vec![SegmentResult::new(
        write_fragment(dir.path(), "c0s0.mp3", 100, 0),
        0,
        1,
    )];
    let token = CancellationToken::new();
    let orchestrator = orchestrator(FakeEngine::Respond(completed(results, 1)));

    // Cancel from inside the progress sink, i.e. once aggregation has begun.
    let sink = {
        let token = token.clone();
        move |_state: conversion_core::ProgressState| token.cancel()
    };
    let report = orchestrator.run(request(&output), &token, &sink).await;

    assert!(token.is_cancelled());
    assert!(report.outcome.is_success());
}

#[tokio::test]
async fn test_engine_reported_failure() {
    let dir = tempfile::tempdir().unwrap();
    let output = dir.path().join("book.mp3");
    let engine = FakeEngine::Respond(EngineResponse::Failed {
        diagnostic: r#"{"error": "Erreur dans synthesize : quota"}"#.to_string(),
    });

    let report = orchestrator(engine)
        .run(request(&output), &CancellationToken::new(), &NoProgress)
        .await;

    match &report.outcome {
        RunOutcome::SynthesisFailed(diagnostic) => assert!(diagnostic.contains("quota")),
        other => panic!("unexpected outcome: {other:?}"),
    }
    assert_eq!(report.outcome.error_code(), Some("SYNTHESIS_ERROR"));
    assert!(!output.exists());
}

#[tokio::test]
async fn test_engine_transport_error() {
    let dir = tempfile::tempdir().unwrap();
    let output = dir.path().join("book.mp3");

    let report = orchestrator(FakeEngine::Error("engine crashed".into()))
        .run(request(&output), &CancellationToken::new(), &NoProgress)
        .await;

    assert_eq!(
        report.outcome,
        RunOutcome::SynthesisFailed("engine crashed".into())
    );
}

#[tokio::test]
async fn test_no_fragments_is_a_merge_failure() {
    let dir = tempfile::tempdir().unwrap();
    let output = dir.path().join("book.mp3");
    let results = vec![SegmentResult::new(dir.path().join("lost.mp3"), 0, 1)];

    let report = orchestrator(FakeEngine::Respond(completed(results, 1)))
        .run(request(&output), &CancellationToken::new(), &NoProgress)
        .await;

    assert!(matches!(report.outcome, RunOutcome::MergeFailed(_)));
    assert_eq!(report.outcome.error_code(), Some("MERGE_ERROR"));
    assert!(files_in(dir.path()).is_empty());
}

#[tokio::test]
async fn test_progress_reaches_background_handle() {
    let dir = tempfile::tempdir().unwrap();
    let output = dir.path().join("book.mp3");
    let results = vec![
        SegmentResult::new(write_fragment(dir.path(), "a.mp3", 200, 0), 0, 1),
        SegmentResult::new(write_fragment(dir.path(), "b.mp3", 200, 0), 0, 2),
    ];
    let handle = BackgroundTaskHandle::acquire("test-run", Duration::from_secs(60));
    let engine = FakeEngine::Slow(Duration::from_millis(10), completed(results, 4));

    let report = orchestrator(engine)
        .run(request(&output), &CancellationToken::new(), &handle)
        .await;
    assert!(report.outcome.is_success());

    let progress = handle.progress();
    assert_eq!(progress.completed, 2);
    assert_eq!(progress.total, 4);
    assert_eq!(progress.percent, 50);
    assert!(handle.release());
}
