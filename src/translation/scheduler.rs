/*!
 * Chapter scheduling.
 *
 * A fixed number of workers pull chapter jobs from one shared FIFO queue.
 * Every worker is its own tokio task and chunking runs on the blocking pool,
 * so different chapters proceed in parallel. Each worker translates the
 * chunks of its chapter strictly in order. A chapter is written back only
 * when every one of its chunks succeeded.
 */

use futures::future::join_all;
use log::{debug, error, info, warn};
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Instant;

use crate::document::{DocumentSource, TextConverter};
use crate::errors::{DocumentError, TranslationError};
use crate::translation::chunker::{Chunk, Chunker};
use crate::translation::pipeline::{PriorContext, TranslationPipeline};
use crate::translation::prompts::{ChapterContext, ChunkContext};
use crate::translation::stop::StopFlag;

/// A chapter waiting on the queue, already converted to plain text
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChapterJob {
    pub chapter_number: u32,
    pub raw_text: String,
}

/// Progress notifications for one chapter
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChapterEvent {
    Started { chunks: usize },
    /// `index` is 1-based
    ChunkStarted { index: usize, total: usize, tokens: usize },
    Completed,
    Failed { reason: String },
}

/// Receives chapter events from the workers
pub trait ChapterObserver: Send + Sync {
    fn on_event(&self, worker: usize, chapter_number: u32, event: &ChapterEvent);
}

/// Observer that only logs
#[derive(Debug, Clone, Copy, Default)]
pub struct LogObserver;

impl ChapterObserver for LogObserver {
    fn on_event(&self, worker: usize, chapter_number: u32, event: &ChapterEvent) {
        match event {
            ChapterEvent::Started { chunks } => {
                info!("[worker {}] Chapter {}: {} chunks", worker + 1, chapter_number, chunks)
            }
            ChapterEvent::ChunkStarted { index, total, tokens } => debug!(
                "[worker {}] Chapter {}: chunk {}/{} ({} tokens)",
                worker + 1,
                chapter_number,
                index,
                total,
                tokens
            ),
            ChapterEvent::Completed => info!("[worker {}] Chapter {} completed", worker + 1, chapter_number),
            ChapterEvent::Failed { reason } => {
                error!("[worker {}] Chapter {} failed: {}", worker + 1, chapter_number, reason)
            }
        }
    }
}

/// Outcome of translating one chapter
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChapterResult {
    Completed { chapter_number: u32, translated_chunks: Vec<String> },
    Failed { chapter_number: u32, reason: String },
    Cancelled { chapter_number: u32 },
}

impl ChapterResult {
    pub fn chapter_number(&self) -> u32 {
        match self {
            Self::Completed { chapter_number, .. }
            | Self::Failed { chapter_number, .. }
            | Self::Cancelled { chapter_number } => *chapter_number,
        }
    }
}

/// Options that shape scheduling and context passing
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SchedulerSettings {
    pub workers: usize,
    pub chunk_tokens: usize,
    /// Send previously translated chapters as context
    pub send_previous: bool,
    pub previous_chapters: usize,
    /// Send the already translated chunks of the same chapter as context
    pub send_previous_chunks: bool,
    /// Re-translate chapters that already have output
    pub force: bool,
}

impl Default for SchedulerSettings {
    fn default() -> Self {
        Self {
            workers: 1,
            chunk_tokens: 7000,
            send_previous: false,
            previous_chapters: 1,
            send_previous_chunks: false,
            force: false,
        }
    }
}

/// What happened to each selected chapter
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SchedulerReport {
    pub completed: Vec<u32>,
    pub failed: Vec<u32>,
    pub skipped: Vec<u32>,
    /// Stopped mid-chapter or never dequeued because of a stop request
    pub cancelled: Vec<u32>,
}

impl SchedulerReport {
    fn sort(&mut self) {
        self.completed.sort_unstable();
        self.failed.sort_unstable();
        self.skipped.sort_unstable();
        self.cancelled.sort_unstable();
    }
}

/// Shared FIFO of chapter jobs
type JobQueue = Arc<Mutex<VecDeque<ChapterJob>>>;

/// Runs chapters through the pipeline with a pool of workers.
/// Cloning is cheap: clones share the pipeline, source and converter.
#[derive(Clone)]
pub struct ChapterScheduler {
    pipeline: Arc<TranslationPipeline>,
    chunker: Chunker,
    source: Arc<dyn DocumentSource>,
    converter: Arc<dyn TextConverter>,
    settings: SchedulerSettings,
}

impl ChapterScheduler {
    pub fn new(
        pipeline: Arc<TranslationPipeline>,
        chunker: Chunker,
        source: Arc<dyn DocumentSource>,
        converter: Arc<dyn TextConverter>,
        settings: SchedulerSettings,
    ) -> Self {
        Self {
            pipeline,
            chunker,
            source,
            converter,
            settings,
        }
    }

    pub fn settings(&self) -> &SchedulerSettings {
        &self.settings
    }

    /// Translate the selected chapters and write the finished ones back
    pub async fn run(&self, chapters: &[u32], observer: Arc<dyn ChapterObserver>, stop: &StopFlag) -> SchedulerReport {
        let mut report = SchedulerReport::default();
        let mut jobs = VecDeque::new();

        for &chapter_number in chapters {
            if !self.settings.force && self.source.has_translation(chapter_number) {
                info!("Chapter {} already translated, skipping", chapter_number);
                report.skipped.push(chapter_number);
                continue;
            }
            match self.prepare_job(chapter_number) {
                Ok(job) => jobs.push_back(job),
                Err(e) => {
                    let reason = e.to_string();
                    observer.on_event(0, chapter_number, &ChapterEvent::Failed { reason });
                    report.failed.push(chapter_number);
                }
            }
        }

        if jobs.is_empty() {
            report.sort();
            return report;
        }

        let workers = self.settings.workers.clamp(1, jobs.len());
        info!("Translating {} chapters with {} workers", jobs.len(), workers);

        let queue: JobQueue = Arc::new(Mutex::new(jobs));
        let report = Arc::new(Mutex::new(report));
        let start = Instant::now();

        let handles: Vec<_> = (0..workers)
            .map(|worker| {
                let scheduler = self.clone();
                let queue = Arc::clone(&queue);
                let report = Arc::clone(&report);
                let observer = Arc::clone(&observer);
                let stop = stop.clone();
                tokio::spawn(async move { scheduler.worker(worker, queue, report, observer, &stop).await })
            })
            .collect();

        for (worker, outcome) in join_all(handles).await.into_iter().enumerate() {
            if let Err(e) = outcome {
                error!("Worker {} terminated abnormally: {}", worker + 1, e);
            }
        }

        let leftover: Vec<u32> = queue.lock().drain(..).map(|job| job.chapter_number).collect();
        let mut report = std::mem::take(&mut *report.lock());
        report.cancelled.extend(leftover);
        report.sort();

        info!(
            "Finished in {:.1}s: {} completed, {} failed, {} skipped, {} cancelled",
            start.elapsed().as_secs_f64(),
            report.completed.len(),
            report.failed.len(),
            report.skipped.len(),
            report.cancelled.len()
        );
        report
    }

    /// Read and convert a chapter into a queue job
    pub fn prepare_job(&self, chapter_number: u32) -> Result<ChapterJob, DocumentError> {
        let body = self.source.chapter_body(chapter_number)?;
        let raw_text = self.converter.to_plain(&body)?;
        Ok(ChapterJob {
            chapter_number,
            raw_text,
        })
    }

    async fn worker(
        &self,
        worker: usize,
        queue: JobQueue,
        report: Arc<Mutex<SchedulerReport>>,
        observer: Arc<dyn ChapterObserver>,
        stop: &StopFlag,
    ) {
        loop {
            if stop.is_stopped() {
                debug!("Worker {} stopping", worker + 1);
                return;
            }
            let Some(job) = queue.lock().pop_front() else {
                return;
            };
            let chapter_number = job.chapter_number;

            let result = self.translate_chapter(worker, &job, observer.as_ref(), stop).await;
            let result = match result {
                ChapterResult::Completed { translated_chunks, .. } => {
                    match self.write_chapter(chapter_number, &translated_chunks) {
                        Ok(()) => ChapterResult::Completed {
                            chapter_number,
                            translated_chunks,
                        },
                        Err(e) => ChapterResult::Failed {
                            chapter_number,
                            reason: format!("could not write translation: {}", e),
                        },
                    }
                }
                other => other,
            };

            let mut report = report.lock();
            match result {
                ChapterResult::Completed { .. } => {
                    observer.on_event(worker, chapter_number, &ChapterEvent::Completed);
                    report.completed.push(chapter_number);
                }
                ChapterResult::Failed { reason, .. } => {
                    observer.on_event(worker, chapter_number, &ChapterEvent::Failed { reason });
                    report.failed.push(chapter_number);
                }
                ChapterResult::Cancelled { .. } => {
                    warn!("Chapter {} interrupted by stop request", chapter_number);
                    report.cancelled.push(chapter_number);
                }
            }
        }
    }

    /// Translate every chunk of a chapter in order. The first failing chunk
    /// aborts the chapter and discards the chunks translated so far.
    pub async fn translate_chapter(
        &self,
        worker: usize,
        job: &ChapterJob,
        observer: &dyn ChapterObserver,
        stop: &StopFlag,
    ) -> ChapterResult {
        let chapter_number = job.chapter_number;
        let chunks = match self.split_chapter(job).await {
            Ok(chunks) => chunks,
            Err(e) => {
                return ChapterResult::Failed {
                    chapter_number,
                    reason: format!("chunking failed: {}", e),
                };
            }
        };
        observer.on_event(worker, chapter_number, &ChapterEvent::Started { chunks: chunks.len() });

        let previous_chapters = if self.settings.send_previous {
            self.previous_context(chapter_number)
        } else {
            Vec::new()
        };

        let mut translated_chunks = Vec::with_capacity(chunks.len());
        let mut previous_chunks: Vec<ChunkContext> = Vec::new();

        for chunk in &chunks {
            if stop.is_stopped() {
                return ChapterResult::Cancelled { chapter_number };
            }
            observer.on_event(
                worker,
                chapter_number,
                &ChapterEvent::ChunkStarted {
                    index: chunk.sequence_index + 1,
                    total: chunks.len(),
                    tokens: chunk.token_count,
                },
            );

            let prior = PriorContext {
                previous_chapters: &previous_chapters,
                previous_chunks: if self.settings.send_previous_chunks {
                    &previous_chunks[..]
                } else {
                    &[]
                },
            };

            match self.pipeline.translate(chunk, prior, stop).await {
                Ok(translation) => {
                    previous_chunks.push(ChunkContext {
                        original: chunk.text.clone(),
                        translated: translation.text.clone(),
                    });
                    translated_chunks.push(translation.text);
                }
                Err(TranslationError::Cancelled) => return ChapterResult::Cancelled { chapter_number },
                Err(e) => {
                    return ChapterResult::Failed {
                        chapter_number,
                        reason: format!("chunk {}/{}: {}", chunk.sequence_index + 1, chunks.len(), e),
                    };
                }
            }
        }

        ChapterResult::Completed {
            chapter_number,
            translated_chunks,
        }
    }

    /// Token counting is CPU bound, so the split runs off the async workers
    async fn split_chapter(&self, job: &ChapterJob) -> Result<Vec<Chunk>, tokio::task::JoinError> {
        let chunker = self.chunker.clone();
        let chapter_number = job.chapter_number;
        let text = job.raw_text.clone();
        let budget = self.settings.chunk_tokens;
        tokio::task::spawn_blocking(move || chunker.split(chapter_number, &text, budget)).await
    }

    /// Up to `previous_chapters` translated chapters immediately before `chapter_number`
    fn previous_context(&self, chapter_number: u32) -> Vec<ChapterContext> {
        let first = chapter_number
            .saturating_sub(self.settings.previous_chapters as u32)
            .max(1);
        (first..chapter_number)
            .filter_map(|number| {
                let translated = match self.source.translated_body(number) {
                    Ok(Some(body)) => body,
                    Ok(None) => return None,
                    Err(e) => {
                        warn!("Could not read translation of chapter {}: {}", number, e);
                        return None;
                    }
                };
                let context = self.source.chapter_body(number).and_then(|original| {
                    Ok(ChapterContext {
                        chapter_number: number,
                        original: self.converter.to_plain(&original)?,
                        translated: self.converter.to_plain(&translated)?,
                    })
                });
                match context {
                    Ok(context) => Some(context),
                    Err(e) => {
                        warn!("Skipping chapter {} as context: {}", number, e);
                        None
                    }
                }
            })
            .collect()
    }

    fn write_chapter(&self, chapter_number: u32, translated_chunks: &[String]) -> Result<(), DocumentError> {
        let joined = translated_chunks.join("\n\n");
        let markup = self.converter.to_markup(&joined)?;
        self.source.write_translated(chapter_number, &markup)
    }
}
