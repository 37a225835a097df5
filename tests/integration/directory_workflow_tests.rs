/*!
 * Directory input and output through the controller
 */

use std::fs;
use std::path::Path;
use std::sync::Arc;

use booktrans::app_config::{ChapterSelection, Config, Credentials};
use booktrans::app_controller::{Controller, RunResources};
use booktrans::document::{DirectorySource, MarkupConverter, PassthroughConverter, TextConverter};
use booktrans::providers::mock::MockProvider;
use booktrans::translation::scheduler::LogObserver;
use booktrans::translation::stop::StopFlag;

use crate::common::{WordCounter, create_temp_dir, create_test_file, init_logging};

fn controller(config: Config) -> Controller {
    let credentials = Credentials {
        openrouter_api_key: Some("sk-test".into()),
        ..Credentials::default()
    };
    Controller::with_config(config, credentials).unwrap()
}

fn resources(
    provider: MockProvider,
    input: &Path,
    output: &Path,
    converter: Arc<dyn TextConverter>,
) -> RunResources {
    RunResources {
        provider: Arc::new(provider),
        source: Arc::new(DirectorySource::open(input, output).unwrap()),
        converter,
        counter: Arc::new(WordCounter),
        glossary_dir: Some(output.join("context")),
        observer: Arc::new(LogObserver),
    }
}

#[tokio::test]
async fn test_translate_withNumberedFiles_shouldWriteChaptersInNaturalOrder() {
    init_logging();
    let dir = create_temp_dir().unwrap();
    let input = dir.path().join("mybook");
    fs::create_dir_all(&input).unwrap();
    create_test_file(&input, "chapter10.txt", "third").unwrap();
    create_test_file(&input, "chapter2.txt", "second").unwrap();
    create_test_file(&input, "chapter1.txt", "first").unwrap();
    create_test_file(&input, "cover.jpg", "not a chapter").unwrap();
    let output = dir.path().join("out");

    let report = controller(Config::default())
        .translate(
            resources(MockProvider::working(), &input, &output, Arc::new(PassthroughConverter)),
            false,
            &StopFlag::new(),
        )
        .await
        .unwrap();

    assert_eq!(report.completed, vec![1, 2, 3]);
    let chapter = |n: u32| fs::read_to_string(output.join("chapters").join(format!("{}.md", n))).unwrap();
    assert_eq!(chapter(1), "[TRANSLATED] first");
    assert_eq!(chapter(2), "[TRANSLATED] second");
    assert_eq!(chapter(3), "[TRANSLATED] third");
}

#[tokio::test]
async fn test_translate_secondRun_shouldSkipUnlessForced() {
    let dir = create_temp_dir().unwrap();
    let input = dir.path().join("mybook");
    fs::create_dir_all(&input).unwrap();
    create_test_file(&input, "01.md", "one").unwrap();
    create_test_file(&input, "02.md", "two").unwrap();
    let output = dir.path().join("out");
    let controller = controller(Config::default());

    controller
        .translate(
            resources(MockProvider::working(), &input, &output, Arc::new(PassthroughConverter)),
            false,
            &StopFlag::new(),
        )
        .await
        .unwrap();

    let provider = MockProvider::working();
    let calls = provider.clone();
    let report = controller
        .translate(
            resources(provider, &input, &output, Arc::new(PassthroughConverter)),
            false,
            &StopFlag::new(),
        )
        .await
        .unwrap();
    assert_eq!(report.skipped, vec![1, 2]);
    assert_eq!(calls.request_count(), 0);

    let report = controller
        .translate(
            resources(MockProvider::working(), &input, &output, Arc::new(PassthroughConverter)),
            true,
            &StopFlag::new(),
        )
        .await
        .unwrap();
    assert_eq!(report.completed, vec![1, 2]);
}

#[tokio::test]
async fn test_translate_withXhtmlChapter_shouldSendPlainTextAndWriteMarkup() {
    let dir = create_temp_dir().unwrap();
    let input = dir.path().join("mybook");
    fs::create_dir_all(&input).unwrap();
    create_test_file(
        &input,
        "ch1.xhtml",
        "<html><body><h1>第一章</h1>\n<p>こんにちは</p></body></html>",
    )
    .unwrap();
    let output = dir.path().join("out");
    let provider = MockProvider::with_responder(|request, _| {
        let chunk = MockProvider::chunk_text(request).unwrap_or_default();
        let translated = chunk.replace("第一章", "Chapter 1").replace("こんにちは", "Hello & welcome");
        Ok(MockProvider::translation_payload(&translated))
    });
    let calls = provider.clone();

    let report = controller(Config::default())
        .translate(
            resources(provider, &input, &output, Arc::new(MarkupConverter)),
            false,
            &StopFlag::new(),
        )
        .await
        .unwrap();

    assert_eq!(report.completed, vec![1]);
    let sent = MockProvider::chunk_text(&calls.calls()[0]).unwrap();
    assert_eq!(sent, "# 第一章\n\nこんにちは");
    let written = fs::read_to_string(output.join("chapters").join("1.md")).unwrap();
    assert_eq!(written, "<h1>Chapter 1</h1>\n<p>Hello &amp; welcome</p>");
}

#[tokio::test]
async fn test_translate_withGlossaryDir_shouldPersistProposedNames() {
    let dir = create_temp_dir().unwrap();
    let input = dir.path().join("mybook");
    fs::create_dir_all(&input).unwrap();
    create_test_file(&input, "1.txt", "アキラは歩いた。").unwrap();
    let output = dir.path().join("out");
    let provider = MockProvider::with_responder(|_, _| {
        Ok(r#"{"characters": [{"original": "アキラ", "translated": "Akira", "gender": "male"}],
"complete_translation": "Akira walked."}"#
            .to_string())
    });
    let config = Config {
        chapter_selection: ChapterSelection::range(1, Some(1)),
        ..Config::default()
    };

    controller(config)
        .translate(
            resources(provider, &input, &output, Arc::new(PassthroughConverter)),
            false,
            &StopFlag::new(),
        )
        .await
        .unwrap();

    let saved = fs::read_to_string(output.join("context").join("mybook_characters.json")).unwrap();
    assert!(saved.contains("\"アキラ\""));
    assert!(saved.contains("\"Akira\""));
}
