//! Integration tests for the message pipeline
//!
//! Covers stage ordering, required-key enforcement, context isolation under
//! concurrency and the end-to-end success and failure paths.

mod support;

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use conduit_common::testing::LogCapture;
use conduit_core::pipeline::culture;
use conduit_core::{
    AckOutcome, ConsumerError, Culture, LogScope, LoggingScopeStage, MessageContext, Pipeline,
    PipelineBuilder, TimingStage,
};
use conduit_domain::constants::CULTURE_CONTEXT_KEY;
use conduit_domain::{
    AckDecision, Envelope, Headers, PipelineConfig, ProcessingErrorAction, ScopedKey,
};
use support::{InvalidOperation, Journal, RecordingStage};
use tokio_util::sync::CancellationToken;

fn tenant_config() -> PipelineConfig {
    PipelineConfig {
        context_keys: vec![ScopedKey::required("tenant"), ScopedKey::optional("trace")],
        logging_keys: vec![ScopedKey::required("tenant")],
        default_culture: Some("en-GB".to_string()),
        inject_culture_into_context: true,
        ..PipelineConfig::default()
    }
}

/// Enter order equals registration order; exit order is its exact reverse.
#[tokio::test]
async fn test_stages_unwind_in_reverse_order() {
    let journal = Journal::default();
    let pipeline = PipelineBuilder::new()
        .stage(RecordingStage::new("a", &journal))
        .stage(RecordingStage::new("b", &journal))
        .stage(RecordingStage::new("c", &journal))
        .build();

    let handler_journal = journal.clone();
    pipeline
        .execute(
            Envelope::new(()),
            move |_, _| async move {
                handler_journal.record("handler");
                Ok::<_, ConsumerError>(())
            },
            &CancellationToken::new(),
        )
        .await
        .unwrap();

    assert_eq!(
        journal.entries(),
        vec!["enter:a", "enter:b", "enter:c", "handler", "exit:c", "exit:b", "exit:a"]
    );
}

/// The last decorator runs first and cleans up last.
#[tokio::test]
async fn test_decorators_wrap_from_outside() {
    let journal = Journal::default();
    let pipeline = PipelineBuilder::new()
        .decorate(RecordingStage::new("context", &journal))
        .decorate(RecordingStage::new("logging", &journal))
        .decorate(RecordingStage::new("culture", &journal))
        .build();

    pipeline
        .execute(
            Envelope::new(()),
            |_, _| async { Ok::<_, ConsumerError>(()) },
            &CancellationToken::new(),
        )
        .await
        .unwrap();

    assert_eq!(
        journal.entries(),
        vec![
            "enter:culture",
            "enter:logging",
            "enter:context",
            "exit:context",
            "exit:logging",
            "exit:culture"
        ]
    );
}

/// Post-processing runs even when the handler fails, and the failure
/// reaches the caller wrapped exactly once.
#[tokio::test]
async fn test_failure_unwinds_every_stage() {
    let journal = Journal::default();
    let pipeline = PipelineBuilder::new()
        .stage(RecordingStage::new("outer", &journal))
        .stage(RecordingStage::new("inner", &journal))
        .build();

    let err = pipeline
        .execute(
            Envelope::new(()),
            |_, _| async { Err(InvalidOperation("state")) },
            &CancellationToken::new(),
        )
        .await
        .unwrap_err();

    assert_eq!(journal.entries(), vec!["enter:outer", "enter:inner", "exit:inner", "exit:outer"]);
    match &err {
        ConsumerError::Processing { source } => {
            assert!(source.downcast_ref::<ConsumerError>().is_none());
            assert_eq!(source.downcast_ref::<InvalidOperation>().map(|e| e.0), Some("state"));
        }
        other => panic!("expected processing error, got {other:?}"),
    }
}

/// A missing required header fails before the handler runs.
#[tokio::test]
async fn test_missing_required_key_skips_handler() {
    let pipeline = Pipeline::from_config(&tenant_config()).unwrap();
    let invoked = Arc::new(AtomicBool::new(false));

    let flag = Arc::clone(&invoked);
    let err = pipeline
        .execute(
            Envelope::with_headers("payload", Headers::new().with("trace", "t-1")),
            move |_, _| async move {
                flag.store(true, Ordering::SeqCst);
                Ok::<_, ConsumerError>(())
            },
            &CancellationToken::new(),
        )
        .await
        .unwrap_err();

    assert!(matches!(err, ConsumerError::MissingRequiredKey { ref key } if key == "tenant"));
    assert!(!invoked.load(Ordering::SeqCst));
}

/// The logging scope stage enforces required keys on its own.
#[tokio::test]
async fn test_logging_stage_enforces_required_keys() {
    let config = PipelineConfig {
        logging_keys: vec![ScopedKey::required("correlation-id")],
        ..PipelineConfig::default()
    };
    let pipeline = Pipeline::from_config(&config).unwrap();

    let err = pipeline
        .execute(
            Envelope::new(()),
            |_, _| async { Ok::<_, ConsumerError>(()) },
            &CancellationToken::new(),
        )
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        ConsumerError::MissingRequiredKey { ref key } if key == "correlation-id"
    ));
}

/// Concurrent messages never observe each other's context values.
#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_contexts_are_isolated() {
    let pipeline = Pipeline::from_config(&tenant_config()).unwrap();
    let mismatches = Arc::new(AtomicUsize::new(0));

    let mut tasks = Vec::new();
    for i in 0..64_u64 {
        let pipeline = pipeline.clone();
        let mismatches = Arc::clone(&mismatches);
        tasks.push(tokio::spawn(async move {
            let tenant = format!("tenant-{i}");
            let headers = Headers::new().with("tenant", tenant.clone());
            pipeline
                .execute(
                    Envelope::with_headers(i, headers),
                    move |_, _| async move {
                        for _ in 0..3 {
                            tokio::time::sleep(Duration::from_millis(i % 5)).await;
                            let seen = MessageContext::current_value("tenant");
                            let scoped = LogScope::current()
                                .and_then(|scope| scope.get("tenant").map(str::to_owned));
                            if seen.as_deref() != Some(tenant.as_str())
                                || scoped.as_deref() != Some(tenant.as_str())
                            {
                                mismatches.fetch_add(1, Ordering::SeqCst);
                            }
                        }
                        Ok::<_, ConsumerError>(())
                    },
                    &CancellationToken::new(),
                )
                .await
        }));
    }

    for task in tasks {
        task.await.unwrap().unwrap();
    }
    assert_eq!(mismatches.load(Ordering::SeqCst), 0);
}

/// Context, logging scope and culture are visible during the call and gone
/// afterwards.
#[tokio::test]
async fn test_success_scopes_exist_only_during_call() {
    let pipeline = Pipeline::from_config(&tenant_config()).unwrap();
    let headers = Headers::new().with("tenant", "acme");

    pipeline
        .execute(
            Envelope::with_headers(42_u32, headers),
            |envelope, _| async move {
                assert_eq!(*envelope.payload(), 42);
                assert_eq!(envelope.header("culture"), Some("en-GB"));

                let context = MessageContext::current().expect("context scope is open");
                assert_eq!(context.get("tenant"), Some("acme"));
                assert!(context.contains_key("trace"));
                assert_eq!(context.get("trace"), None);
                assert_eq!(context.get(CULTURE_CONTEXT_KEY), Some("en-GB"));

                let scope = LogScope::current().expect("logging scope is open");
                assert_eq!(scope.get("tenant"), Some("acme"));
                assert_eq!(culture::current(), Some(Culture::parse("en-GB").unwrap()));
                Ok::<_, ConsumerError>(())
            },
            &CancellationToken::new(),
        )
        .await
        .unwrap();

    assert!(MessageContext::current().is_none());
    assert!(LogScope::current().is_none());
    assert!(culture::current().is_none());
}

/// A culture header overrides the configured default.
#[tokio::test]
async fn test_culture_header_wins_over_default() {
    let pipeline = Pipeline::from_config(&tenant_config()).unwrap();
    let headers = Headers::new().with("tenant", "acme").with("culture", "fr-CA");

    pipeline
        .execute(
            Envelope::with_headers((), headers),
            |_, _| async {
                let active = culture::current().map(|c| c.to_string());
                assert_eq!(active.as_deref(), Some("fr-CA"));
                let injected = MessageContext::current_value(CULTURE_CONTEXT_KEY);
                assert_eq!(injected.as_deref(), Some("fr-CA"));
                Ok::<_, ConsumerError>(())
            },
            &CancellationToken::new(),
        )
        .await
        .unwrap();
}

/// A failing handler surfaces as exactly one processing error carrying the
/// original cause.
#[tokio::test]
async fn test_handler_failure_is_normalized_once() {
    let pipeline = Pipeline::from_config(&tenant_config()).unwrap();
    let headers = Headers::new().with("tenant", "acme");

    let err = pipeline
        .execute(
            Envelope::with_headers((), headers),
            |_, _| async { Err(InvalidOperation("order already shipped")) },
            &CancellationToken::new(),
        )
        .await
        .unwrap_err();

    assert_eq!(err.kind(), "processing");
    let cause = err.downcast_cause::<InvalidOperation>().expect("original cause is kept");
    assert_eq!(cause.0, "order already shipped");
}

/// A handler that returns a `ConsumerError` of its own still fails with a
/// processing error, settled as a handler failure.
#[tokio::test]
async fn test_consumer_error_from_handler_is_a_processing_failure() {
    let pipeline = Pipeline::from_config(&tenant_config()).unwrap();

    for returned in [ConsumerError::missing_key("sku"), ConsumerError::Cancelled] {
        let headers = Headers::new().with("tenant", "acme");
        let outcome = pipeline
            .execute(
                Envelope::with_headers((), headers),
                move |_, _| async move { Err(returned) },
                &CancellationToken::new(),
            )
            .await;

        let err = outcome.as_ref().unwrap_err();
        assert_eq!(err.kind(), "processing");
        assert!(err.downcast_cause::<ConsumerError>().is_some());
        assert_eq!(
            AckDecision::for_outcome(&outcome, ProcessingErrorAction::Requeue),
            AckDecision::NackRequeue
        );
    }
}

/// Handler log events are emitted inside the `message_scope` span, and the
/// timing stage reports failures with elapsed time.
#[tokio::test]
async fn test_logging_scope_and_timing_events() {
    let capture = LogCapture::new();
    let _guard = capture.install();

    let pipeline = PipelineBuilder::new()
        .stage(TimingStage::new("orders"))
        .stage(LoggingScopeStage::new(vec![ScopedKey::required("tenant")]))
        .build();

    let headers = Headers::new().with("tenant", "acme");
    let _ = pipeline
        .execute(
            Envelope::with_headers((), headers),
            |_, _| async {
                tracing::info!("handling order");
                Err(InvalidOperation("boom"))
            },
            &CancellationToken::new(),
        )
        .await;

    let handled = capture.events_with_message("handling order");
    assert_eq!(handled.len(), 1);
    assert_eq!(handled[0]["span"]["name"], "message_scope");
    assert_eq!(handled[0]["span"]["scope"], "tenant=acme");

    let failed = capture.events_with_message("Message processing failed");
    assert_eq!(failed.len(), 1);
    assert_eq!(failed[0]["fields"]["operation"], "orders");
    assert_eq!(failed[0]["fields"]["kind"], "processing");
    assert!(failed[0]["fields"]["elapsed_ms"].is_u64());
}
