/*!
 * Provider rotation through the translation pipeline
 */

use std::sync::Arc;

use booktrans::errors::{FailureKind, TranslationError};
use booktrans::providers::mock::MockProvider;
use booktrans::translation::chunker::Chunk;
use booktrans::translation::glossary::GlossaryStore;
use booktrans::translation::pipeline::PriorContext;
use booktrans::translation::rotation::{AttemptOutcome, RotationPlan};
use booktrans::translation::stop::StopFlag;

use crate::common::{build_pipeline, init_logging, pipeline_settings};

fn chunk(text: &str) -> Chunk {
    Chunk {
        chapter_number: 1,
        sequence_index: 0,
        text: text.to_string(),
        token_count: 3,
    }
}

fn route(name: &str) -> Option<String> {
    Some(name.to_string())
}

#[tokio::test]
async fn test_translate_withEveryProviderFailing_shouldExhaustInRotationOrder() {
    init_logging();
    let provider = MockProvider::failing();
    let calls = provider.clone();
    let pipeline = build_pipeline(
        provider,
        Arc::new(GlossaryStore::in_memory()),
        RotationPlan::routed(["p1", "p2"], 2),
        pipeline_settings(true, false),
    );

    let result = pipeline
        .translate(&chunk("こんにちは"), PriorContext::default(), &StopFlag::new())
        .await;

    assert!(matches!(result, Err(TranslationError::Exhausted { attempts: 4 })));
    assert_eq!(calls.routes(), vec![route("p1"), route("p1"), route("p2"), route("p2")]);
}

#[tokio::test]
async fn test_translate_withFirstProviderDown_shouldSucceedOnSecond() {
    let provider = MockProvider::failing_routes(["p1"]);
    let pipeline = build_pipeline(
        provider,
        Arc::new(GlossaryStore::in_memory()),
        RotationPlan::routed(["p1", "p2", "p3"], 2),
        pipeline_settings(true, false),
    );

    let result = pipeline
        .translate(&chunk("こんにちは"), PriorContext::default(), &StopFlag::new())
        .await
        .unwrap();

    assert_eq!(result.text, "[TRANSLATED] こんにちは");
    let providers: Vec<Option<String>> = result.attempts.iter().map(|a| a.target.provider.clone()).collect();
    assert_eq!(providers, vec![route("p1"), route("p1"), route("p2")]);
    assert_eq!(result.attempts[0].outcome, AttemptOutcome::Failed(FailureKind::Transport));
    assert_eq!(result.attempts[2].outcome, AttemptOutcome::Success);
}

#[tokio::test]
async fn test_translate_withMalformedResponses_shouldNotMergeAnything() {
    let store = Arc::new(GlossaryStore::in_memory());
    let provider = MockProvider::malformed();
    let calls = provider.clone();
    let pipeline = build_pipeline(
        provider,
        Arc::clone(&store),
        RotationPlan::routed(["p1"], 3),
        pipeline_settings(true, false),
    );

    let result = pipeline
        .translate(&chunk("こんにちは"), PriorContext::default(), &StopFlag::new())
        .await;

    assert!(matches!(result, Err(TranslationError::Exhausted { attempts: 3 })));
    assert_eq!(calls.request_count(), 3);
    assert!(store.snapshot().terms.characters.is_empty());
}

#[tokio::test]
async fn test_translate_withCustomEndpoint_shouldSendUnroutedRequests() {
    let provider = MockProvider::failing();
    let calls = provider.clone();
    let pipeline = build_pipeline(
        provider,
        Arc::new(GlossaryStore::in_memory()),
        RotationPlan::single_endpoint(2),
        pipeline_settings(true, false),
    );

    let result = pipeline
        .translate(&chunk("こんにちは"), PriorContext::default(), &StopFlag::new())
        .await;

    assert!(matches!(result, Err(TranslationError::Exhausted { attempts: 2 })));
    assert_eq!(calls.routes(), vec![None, None]);
}

#[tokio::test]
async fn test_translate_withStopAlreadyRaised_shouldNotContactProvider() {
    let provider = MockProvider::working();
    let calls = provider.clone();
    let pipeline = build_pipeline(
        provider,
        Arc::new(GlossaryStore::in_memory()),
        RotationPlan::routed(["p1"], 2),
        pipeline_settings(true, false),
    );
    let stop = StopFlag::new();
    stop.request_stop();

    let result = pipeline.translate(&chunk("こんにちは"), PriorContext::default(), &stop).await;

    assert!(matches!(result, Err(TranslationError::Cancelled)));
    assert_eq!(calls.request_count(), 0);
}
