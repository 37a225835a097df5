use anyhow::{Context, Result};
use indicatif::{MultiProgress, ProgressBar, ProgressStyle};
use log::{info, warn};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use crate::app_config::{Config, Credentials};
use crate::document::{DirectorySource, DocumentSource, MarkupConverter, PassthroughConverter, TextConverter};
use crate::errors::AppError;
use crate::providers::Provider;
use crate::providers::openrouter::{EndpointInfo, EndpointSettings, OPENROUTER_BASE_URL, OpenRouterClient};
use crate::translation::chunker::{Chunker, TiktokenCounter, TokenCounter};
use crate::translation::glossary::GlossaryStore;
use crate::translation::pipeline::{PipelineSettings, TranslationPipeline};
use crate::translation::prompts::{DefaultPromptAssembler, PromptOptions, PromptTemplates};
use crate::translation::scheduler::{
    ChapterEvent, ChapterObserver, ChapterScheduler, LogObserver, SchedulerReport, SchedulerSettings,
};
use crate::translation::stop::StopFlag;

// @module: Application controller for chapter translation

/// Everything a translation run needs besides the configuration
pub struct RunResources {
    pub provider: Arc<dyn Provider>,
    pub source: Arc<dyn DocumentSource>,
    pub converter: Arc<dyn TextConverter>,
    pub counter: Arc<dyn TokenCounter>,
    // @field: Directory for glossary files; None keeps the glossary in memory
    pub glossary_dir: Option<PathBuf>,
    pub observer: Arc<dyn ChapterObserver>,
}

/// Main application controller for book translation
pub struct Controller {
    // @field: App configuration
    config: Config,

    // @field: API keys and endpoint overrides
    credentials: Credentials,
}

impl Controller {
    // @method: Create a new controller, validating before any provider call
    pub fn with_config(mut config: Config, credentials: Credentials) -> Result<Self, AppError> {
        config.normalize();
        config.validate(&credentials)?;
        Ok(Self { config, credentials })
    }

    /// Controller for the provider listing. The endpoint list is public, so
    /// credentials are optional and only the settings are validated.
    pub fn for_listing(mut config: Config, credentials: Credentials) -> Result<Self, AppError> {
        config.normalize();
        config.validate_settings()?;
        Ok(Self { config, credentials })
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Streaming client for OpenRouter or the custom endpoint
    pub fn build_provider(&self) -> Result<Arc<dyn Provider>, AppError> {
        let settings = if self.config.use_custom_endpoint {
            EndpointSettings {
                base_url: self.config.endpoint_url(&self.credentials),
                api_key: self.credentials.custom_endpoint_key.clone().unwrap_or_default(),
                timeout: self.config.timeout_duration(),
            }
        } else {
            EndpointSettings {
                base_url: OPENROUTER_BASE_URL.to_string(),
                api_key: self.credentials.openrouter_api_key.clone().unwrap_or_default(),
                timeout: self.config.timeout_duration(),
            }
        };
        Ok(Arc::new(OpenRouterClient::new(settings)?))
    }

    /// List the OpenRouter providers serving `model`
    pub async fn list_providers(&self, model: &str) -> Result<Vec<EndpointInfo>, AppError> {
        let client = OpenRouterClient::new(EndpointSettings {
            base_url: OPENROUTER_BASE_URL.to_string(),
            api_key: self.credentials.openrouter_api_key.clone().unwrap_or_default(),
            timeout: self.config.timeout_duration(),
        })?;
        Ok(client.list_endpoints(model).await?)
    }

    /// Translate the chapter files of `input_dir` into `output_dir` with a live progress display
    pub async fn run(&self, input_dir: &Path, output_dir: &Path, force: bool) -> Result<SchedulerReport> {
        let source = DirectorySource::open(input_dir, output_dir)
            .with_context(|| format!("Failed to open chapters in {:?}", input_dir))?;
        let converter: Arc<dyn TextConverter> = if source.has_markup() {
            Arc::new(MarkupConverter)
        } else {
            Arc::new(PassthroughConverter)
        };
        let glossary_dir = output_dir.join("context");
        let counter = TiktokenCounter::new(&self.config.token_encoding)?;

        let selected = self.select_chapters(&source)?;
        let multi_progress = MultiProgress::new();
        let observer = Arc::new(ProgressObserver::new(multi_progress.clone(), selected.len()));

        let stop = StopFlag::new();
        let handle = stop.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                warn!("Stop requested, finishing the current chunks");
                handle.request_stop();
            }
        });

        let resources = RunResources {
            provider: self.build_provider()?,
            source: Arc::new(source),
            converter,
            counter: Arc::new(counter),
            glossary_dir: Some(glossary_dir),
            observer: observer.clone(),
        };

        let report = self.translate_chapters(resources, &selected, force, &stop).await?;
        observer.finish();
        Ok(report)
    }

    /// Configured chapter selection resolved against `source`
    pub fn select_chapters(&self, source: &dyn DocumentSource) -> Result<Vec<u32>, AppError> {
        Ok(self.config.chapter_selection.resolve(source.chapter_count())?)
    }

    /// Resolve the chapter selection and run the scheduler over it
    pub async fn translate(&self, resources: RunResources, force: bool, stop: &StopFlag) -> Result<SchedulerReport, AppError> {
        let chapters = self.select_chapters(resources.source.as_ref())?;
        self.translate_chapters(resources, &chapters, force, stop).await
    }

    /// Run the scheduler over already resolved `chapters`
    pub async fn translate_chapters(
        &self,
        resources: RunResources,
        chapters: &[u32],
        force: bool,
        stop: &StopFlag,
    ) -> Result<SchedulerReport, AppError> {
        let config = &self.config;

        let store = match &resources.glossary_dir {
            Some(dir) => GlossaryStore::open(dir, resources.source.document_id()),
            None => GlossaryStore::in_memory(),
        };
        let snapshot = store.snapshot();
        info!(
            "Glossary: {} characters, {} places, {} terms, {} notes",
            snapshot.terms.characters.len(),
            snapshot.terms.places.len(),
            snapshot.terms.terms.len(),
            snapshot.notes.len()
        );

        let templates = match &config.prompts_file {
            Some(path) => PromptTemplates::load(path)?,
            None => PromptTemplates::default(),
        };
        let assembler = DefaultPromptAssembler::new(
            PromptOptions {
                context_mode: config.context_mode,
                notes_mode: config.notes_mode,
                power_steering: config.power_steering,
                target_language: config.target_language.clone(),
            },
            templates,
        );

        info!(
            "Model {} via {} with {} workers",
            config.active_model(),
            resources.provider.name(),
            config.effective_workers(chapters.len())
        );

        let pipeline = TranslationPipeline::new(
            resources.provider,
            Arc::new(store),
            Arc::new(assembler),
            config.rotation_plan(),
            PipelineSettings {
                context_mode: config.context_mode,
                notes_mode: config.notes_mode,
                filter_enabled: config.context_filter_enabled,
                filter_categories: config.filter_categories(),
                sampling: config.sampling_params(),
            },
        );

        let scheduler = ChapterScheduler::new(
            Arc::new(pipeline),
            Chunker::new(resources.counter),
            resources.source,
            resources.converter,
            SchedulerSettings {
                workers: config.concurrent_workers,
                chunk_tokens: config.chunk_tokens,
                send_previous: config.send_previous,
                previous_chapters: config.previous_chapters,
                send_previous_chunks: config.send_previous_chunks,
                force,
            },
        );

        Ok(scheduler.run(chapters, resources.observer, stop).await)
    }
}

fn bar_style(template: &str) -> ProgressStyle {
    ProgressStyle::default_bar()
        .template(template)
        .or_else(|_| ProgressStyle::default_bar().template("{spinner} [{elapsed_precise}] [{bar:40}] {pos}/{len} {msg}"))
        .unwrap_or_else(|_| ProgressStyle::default_bar())
        .progress_chars("█▓▒░")
}

/// Progress display: one bar for chapters plus one chunk bar per worker
pub struct ProgressObserver {
    multi_progress: MultiProgress,
    chapters: ProgressBar,
    workers: Mutex<HashMap<usize, ProgressBar>>,
    failed: AtomicUsize,
}

impl ProgressObserver {
    pub fn new(multi_progress: MultiProgress, total_chapters: usize) -> Self {
        let chapters = multi_progress.add(ProgressBar::new(total_chapters as u64));
        chapters.set_style(bar_style(
            "{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} chapters ({percent}%) {msg} {eta}",
        ));
        Self {
            multi_progress,
            chapters,
            workers: Mutex::new(HashMap::new()),
            failed: AtomicUsize::new(0),
        }
    }

    fn worker_bar(&self, worker: usize) -> ProgressBar {
        self.workers
            .lock()
            .entry(worker)
            .or_insert_with(|| {
                let bar = self.multi_progress.add(ProgressBar::new(0));
                bar.set_style(bar_style("  worker {prefix} [{bar:30.green/white}] {pos}/{len} chunks {msg}"));
                bar.set_prefix((worker + 1).to_string());
                bar
            })
            .clone()
    }

    pub fn finish(&self) {
        for bar in self.workers.lock().values() {
            bar.finish_and_clear();
        }
        let failed = self.failed.load(Ordering::SeqCst);
        if failed > 0 {
            self.chapters.finish_with_message(format!("{} failed", failed));
        } else {
            self.chapters.finish_with_message("done");
        }
    }
}

impl ChapterObserver for ProgressObserver {
    fn on_event(&self, worker: usize, chapter_number: u32, event: &ChapterEvent) {
        let bar = self.worker_bar(worker);
        match event {
            ChapterEvent::Started { chunks } => {
                bar.set_length(*chunks as u64);
                bar.set_position(0);
                bar.set_message(format!("chapter {}", chapter_number));
            }
            ChapterEvent::ChunkStarted { index, total, tokens } => {
                bar.set_position(index.saturating_sub(1) as u64);
                bar.set_message(format!("chapter {} part {}/{} ({} tokens)", chapter_number, index, total, tokens));
            }
            ChapterEvent::Completed => {
                if let Some(length) = bar.length() {
                    bar.set_position(length);
                }
                self.chapters.inc(1);
            }
            ChapterEvent::Failed { .. } => {
                self.failed.fetch_add(1, Ordering::SeqCst);
                self.chapters.inc(1);
            }
        }
        // Also log every event
        LogObserver.on_event(worker, chapter_number, event);
    }
}
