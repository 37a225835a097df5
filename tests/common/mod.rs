/*!
 * Common test utilities for the booktrans test suite
 */

use anyhow::Result;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tempfile::TempDir;

use booktrans::document::{DocumentSource, PassthroughConverter};
use booktrans::providers::SamplingParams;
use booktrans::providers::mock::MockProvider;
use booktrans::translation::chunker::{Chunker, TokenCounter};
use booktrans::translation::filter::FilterCategories;
use booktrans::translation::glossary::GlossaryStore;
use booktrans::translation::pipeline::{PipelineSettings, TranslationPipeline};
use booktrans::translation::prompts::{DefaultPromptAssembler, PromptOptions, PromptTemplates};
use booktrans::translation::rotation::RotationPlan;
use booktrans::translation::scheduler::{ChapterScheduler, SchedulerSettings};

/// One token per whitespace separated word
pub struct WordCounter;

impl TokenCounter for WordCounter {
    fn count(&self, text: &str) -> usize {
        text.split_whitespace().count()
    }
}

/// Route test logs through env_logger; repeated calls are ignored
pub fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

/// Creates a temporary directory for test files
pub fn create_temp_dir() -> Result<TempDir> {
    Ok(TempDir::new()?)
}

/// Creates a test file with the given content in the specified directory
pub fn create_test_file(dir: &Path, filename: &str, content: &str) -> Result<PathBuf> {
    let file_path = dir.join(filename);
    fs::write(&file_path, content)?;
    Ok(file_path)
}

pub fn sampling() -> SamplingParams {
    SamplingParams {
        model: "test/model".to_string(),
        temperature: 0.9,
        max_tokens: 1000,
        frequency_penalty: 0.0,
        top_p: 0.95,
        top_k: 0,
    }
}

pub fn pipeline_settings(context_mode: bool, filter_enabled: bool) -> PipelineSettings {
    PipelineSettings {
        context_mode,
        notes_mode: false,
        filter_enabled,
        filter_categories: FilterCategories::default(),
        sampling: sampling(),
    }
}

/// Pipeline over `provider` with the default prompt assembler
pub fn build_pipeline(
    provider: MockProvider,
    store: Arc<GlossaryStore>,
    plan: RotationPlan,
    settings: PipelineSettings,
) -> TranslationPipeline {
    let assembler = DefaultPromptAssembler::new(
        PromptOptions {
            context_mode: settings.context_mode,
            notes_mode: settings.notes_mode,
            ..PromptOptions::default()
        },
        PromptTemplates::default(),
    );
    TranslationPipeline::new(Arc::new(provider), store, Arc::new(assembler), plan, settings)
}

/// Scheduler counting words as tokens and passing text through unchanged
pub fn build_scheduler(
    pipeline: TranslationPipeline,
    source: Arc<dyn DocumentSource>,
    settings: SchedulerSettings,
) -> ChapterScheduler {
    ChapterScheduler::new(
        Arc::new(pipeline),
        Chunker::new(Arc::new(WordCounter)),
        source,
        Arc::new(PassthroughConverter),
        settings,
    )
}

/// `lines` lines of `words_per_line` words each; `marker` replaces the first
/// word of the listed lines
pub fn wordy_text(lines: usize, words_per_line: usize, marker: &str, marked_lines: &[usize]) -> String {
    (0..lines)
        .map(|i| {
            let mut words = vec!["w"; words_per_line];
            if marked_lines.contains(&i) && words_per_line > 0 {
                words[0] = marker;
            }
            words.join(" ")
        })
        .collect::<Vec<_>>()
        .join("\n")
}
