/*!
 * Chapter scheduling with glossary growth across chunks
 */

use parking_lot::Mutex;
use std::sync::Arc;

use booktrans::document::MemorySource;
use booktrans::errors::ProviderError;
use booktrans::providers::mock::MockProvider;
use booktrans::translation::glossary::{Gender, GlossaryStore};
use booktrans::translation::rotation::RotationPlan;
use booktrans::translation::scheduler::{ChapterEvent, ChapterObserver, LogObserver, SchedulerSettings};
use booktrans::translation::stop::StopFlag;

use crate::common::{build_pipeline, build_scheduler, create_temp_dir, init_logging, pipeline_settings, wordy_text};

#[derive(Default)]
struct RecordingObserver {
    events: Mutex<Vec<(u32, ChapterEvent)>>,
}

impl ChapterObserver for RecordingObserver {
    fn on_event(&self, _worker: usize, chapter_number: u32, event: &ChapterEvent) {
        self.events.lock().push((chapter_number, event.clone()));
    }
}

const FIRST_PART_RESPONSE: &str = r#"```json
{
  "characters": [{"original": "アキラ", "translated": "Akira", "gender": "male"}],
  "places": [],
  "terms": [],
  "complete_translation": "Part one."
}
```"#;

#[tokio::test]
async fn test_run_withNameProposedInFirstChunk_shouldSendItWithSecondChunk() {
    init_logging();
    let dir = create_temp_dir().unwrap();
    let store = Arc::new(GlossaryStore::open(dir.path(), "novel"));
    // 95 lines of 100 words: 9500 tokens, split 7000 + 2500
    let chapter = wordy_text(95, 100, "アキラ", &[0, 80]);
    let source = Arc::new(MemorySource::new("novel", vec![chapter]));

    let provider = MockProvider::with_responder(|_, index| match index {
        0 => Ok(FIRST_PART_RESPONSE.to_string()),
        _ => Ok(MockProvider::translation_payload("Part two.")),
    });
    let calls = provider.clone();
    let pipeline = build_pipeline(
        provider,
        Arc::clone(&store),
        RotationPlan::routed(["p1"], 1),
        pipeline_settings(true, true),
    );
    let scheduler = build_scheduler(
        pipeline,
        source.clone(),
        SchedulerSettings {
            chunk_tokens: 7000,
            ..SchedulerSettings::default()
        },
    );
    let observer = Arc::new(RecordingObserver::default());

    let report = scheduler.run(&[1], observer.clone(), &StopFlag::new()).await;

    assert_eq!(report.completed, vec![1]);
    assert_eq!(source.translations()[&1], "Part one.\n\nPart two.");

    let token_counts: Vec<usize> = observer
        .events
        .lock()
        .iter()
        .filter_map(|(_, event)| match event {
            ChapterEvent::ChunkStarted { tokens, .. } => Some(*tokens),
            _ => None,
        })
        .collect();
    assert_eq!(token_counts, vec![7000, 2500]);

    let requests = calls.calls();
    assert_eq!(requests.len(), 2);
    let mentions_akira = |index: usize| {
        requests[index]
            .messages
            .iter()
            .any(|m| m.content.contains("アキラ : Akira : male"))
    };
    assert!(!mentions_akira(0));
    assert!(mentions_akira(1));

    let reopened = GlossaryStore::open(dir.path(), "novel");
    assert_eq!(reopened.character("アキラ").unwrap().gender, Gender::Male);
}

#[tokio::test]
async fn test_run_withFailingChunk_shouldLeaveOnlyThatChapterUnwritten() {
    let provider = MockProvider::with_responder(|request, _| {
        let chunk = MockProvider::chunk_text(request).unwrap_or_default();
        if chunk.contains("bad") {
            Err(ProviderError::Transport("connection reset".to_string()))
        } else {
            Ok(MockProvider::translation_payload(&chunk.to_uppercase()))
        }
    });
    let pipeline = build_pipeline(
        provider,
        Arc::new(GlossaryStore::in_memory()),
        RotationPlan::routed(["p1", "p2"], 1),
        pipeline_settings(true, false),
    );
    let source = Arc::new(MemorySource::new(
        "book",
        vec!["good one\ngood two".into(), "good three\nbad four".into(), "good five".into()],
    ));
    let scheduler = build_scheduler(
        pipeline,
        source.clone(),
        SchedulerSettings {
            workers: 2,
            chunk_tokens: 2,
            ..SchedulerSettings::default()
        },
    );
    let observer = Arc::new(RecordingObserver::default());

    let report = scheduler.run(&[1, 2, 3], observer.clone(), &StopFlag::new()).await;

    assert_eq!(report.completed, vec![1, 3]);
    assert_eq!(report.failed.len(), 1);
    let translations = source.translations();
    assert_eq!(translations.keys().copied().collect::<Vec<_>>(), vec![1, 3]);
    assert_eq!(translations[&1], "GOOD ONE\n\nGOOD TWO");
    assert!(
        observer
            .events
            .lock()
            .iter()
            .any(|(chapter, event)| *chapter == 2 && matches!(event, ChapterEvent::Failed { .. }))
    );
}

#[tokio::test]
async fn test_run_withContextModeOff_shouldNotGrowGlossary() {
    let store = Arc::new(GlossaryStore::in_memory());
    let provider = MockProvider::with_responder(|_, _| Ok(FIRST_PART_RESPONSE.to_string()));
    let pipeline = build_pipeline(
        provider,
        Arc::clone(&store),
        RotationPlan::routed(["p1"], 1),
        pipeline_settings(false, false),
    );
    let source = Arc::new(MemorySource::new("book", vec!["アキラ".into()]));
    let scheduler = build_scheduler(pipeline, source.clone(), SchedulerSettings::default());

    let report = scheduler
        .run(&[1], Arc::new(RecordingObserver::default()), &StopFlag::new())
        .await;

    assert_eq!(report.completed, vec![1]);
    assert!(store.character("アキラ").is_none());
}

#[tokio::test]
async fn test_run_withPreviousChunksEnabled_shouldCarryEveryEarlierPart() {
    let provider = MockProvider::with_responder(|request, _| {
        let chunk = MockProvider::chunk_text(request).unwrap_or_default();
        Ok(MockProvider::translation_payload(&chunk.to_uppercase()))
    });
    let calls = provider.clone();
    let pipeline = build_pipeline(
        provider,
        Arc::new(GlossaryStore::in_memory()),
        RotationPlan::routed(["p1"], 1),
        pipeline_settings(true, false),
    );
    let source = Arc::new(MemorySource::new("book", vec!["part one\npart two\npart three".into()]));
    let scheduler = build_scheduler(
        pipeline,
        source.clone(),
        SchedulerSettings {
            chunk_tokens: 2,
            send_previous_chunks: true,
            ..SchedulerSettings::default()
        },
    );

    let report = scheduler.run(&[1], Arc::new(LogObserver), &StopFlag::new()).await;

    assert_eq!(report.completed, vec![1]);
    let requests = calls.calls();
    assert_eq!(requests.len(), 3);

    let third = &requests[2].messages;
    let previous_parts: Vec<&str> = third
        .iter()
        .filter(|m| m.role == "user")
        .filter_map(|m| m.content.strip_prefix("CURRENT CHAPTER - PREVIOUS PART:\n"))
        .collect();
    assert_eq!(previous_parts, vec!["part one", "part two"]);

    let replies: Vec<&str> = third
        .iter()
        .filter(|m| m.role == "assistant")
        .map(|m| m.content.as_str())
        .collect();
    assert_eq!(replies.len(), 2);
    assert!(replies[0].contains("PART ONE"));
    assert!(replies[1].contains("PART TWO"));
}
