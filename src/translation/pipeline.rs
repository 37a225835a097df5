/*!
 * Per-chunk translation pipeline.
 *
 * For one chunk: take a glossary snapshot, optionally narrow it to the
 * entries relevant to the chunk, assemble the prompt, run the provider
 * rotation until a structurally valid response arrives, then merge the
 * glossary and notes deltas from that response into the store.
 */

use log::{debug, info};
use std::sync::Arc;

use crate::errors::TranslationError;
use crate::providers::{ChatRequest, Provider, SamplingParams};
use crate::translation::chunker::Chunk;
use crate::translation::filter::{FilterCategories, FilterTraces, MatchTrace, RelevanceFilter};
use crate::translation::glossary::{GlossarySnapshot, GlossaryStore};
use crate::translation::prompts::{ChapterContext, ChunkContext, PromptAssembler, PromptInput};
use crate::translation::response::{TranslationPayload, parse_response};
use crate::translation::rotation::{ProviderAttempt, RotationPlan, run_rotation};
use crate::translation::stop::StopFlag;

/// Callback receiving human-readable note change messages
pub type NoteListener = Arc<dyn Fn(&str) + Send + Sync>;

/// Behaviour switches for the pipeline
#[derive(Debug, Clone, PartialEq)]
pub struct PipelineSettings {
    /// Send and merge characters, places and terms
    pub context_mode: bool,
    /// Send and merge translation notes
    pub notes_mode: bool,
    /// Narrow glossary collections to entries found in the chunk
    pub filter_enabled: bool,
    pub filter_categories: FilterCategories,
    pub sampling: SamplingParams,
}

/// Context carried over from earlier work
#[derive(Debug, Clone, Copy, Default)]
pub struct PriorContext<'a> {
    pub previous_chapters: &'a [ChapterContext],
    pub previous_chunks: &'a [ChunkContext],
}

/// Successful translation of one chunk
#[derive(Debug, Clone)]
pub struct ChunkTranslation {
    pub text: String,
    pub attempts: Vec<ProviderAttempt>,
    /// Present when relevance filtering ran
    pub traces: Option<FilterTraces>,
}

/// Translates chunks against a shared glossary store
pub struct TranslationPipeline {
    provider: Arc<dyn Provider>,
    store: Arc<GlossaryStore>,
    assembler: Arc<dyn PromptAssembler>,
    filter: RelevanceFilter,
    plan: RotationPlan,
    settings: PipelineSettings,
    note_listener: Option<NoteListener>,
}

impl std::fmt::Debug for TranslationPipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TranslationPipeline")
            .field("provider", &self.provider.name())
            .field("plan", &self.plan)
            .field("settings", &self.settings)
            .finish()
    }
}

fn describe_traces(traces: &[MatchTrace]) -> String {
    traces
        .iter()
        .take(5)
        .map(|t| format!("{} -> {} ['{}' {}]", t.original, t.translated, t.matched, t.kind))
        .collect::<Vec<_>>()
        .join(", ")
}

impl TranslationPipeline {
    pub fn new(
        provider: Arc<dyn Provider>,
        store: Arc<GlossaryStore>,
        assembler: Arc<dyn PromptAssembler>,
        plan: RotationPlan,
        settings: PipelineSettings,
    ) -> Self {
        Self {
            provider,
            store,
            assembler,
            filter: RelevanceFilter::default(),
            plan,
            settings,
            note_listener: None,
        }
    }

    pub fn with_filter(mut self, filter: RelevanceFilter) -> Self {
        self.filter = filter;
        self
    }

    pub fn with_note_listener(mut self, listener: NoteListener) -> Self {
        self.note_listener = Some(listener);
        self
    }

    pub fn store(&self) -> &Arc<GlossaryStore> {
        &self.store
    }

    pub fn settings(&self) -> &PipelineSettings {
        &self.settings
    }

    /// Translate a chunk against the store's current glossary
    pub async fn translate(
        &self,
        chunk: &Chunk,
        prior: PriorContext<'_>,
        stop: &StopFlag,
    ) -> Result<ChunkTranslation, TranslationError> {
        let snapshot = self.store.snapshot();
        self.translate_with_snapshot(chunk, &snapshot, prior, stop).await
    }

    /// Translate a chunk against an explicit glossary snapshot
    pub async fn translate_with_snapshot(
        &self,
        chunk: &Chunk,
        snapshot: &GlossarySnapshot,
        prior: PriorContext<'_>,
        stop: &StopFlag,
    ) -> Result<ChunkTranslation, TranslationError> {
        let (glossary, traces) = if self.settings.context_mode && self.settings.filter_enabled {
            let outcome = self.filter.filter(&chunk.text, &snapshot.terms, self.settings.filter_categories);
            for (label, list) in [
                ("Chars", &outcome.traces.characters),
                ("Places", &outcome.traces.places),
                ("Terms", &outcome.traces.terms),
            ] {
                if !list.is_empty() {
                    debug!("  {}: {}", label, describe_traces(list));
                }
            }
            (outcome.subset, Some(outcome.traces))
        } else {
            (snapshot.terms.clone(), None)
        };

        if !prior.previous_chapters.is_empty() {
            info!("Including {} previous chapters as context", prior.previous_chapters.len());
        }
        if !prior.previous_chunks.is_empty() {
            info!("Including {} previous chunks from current chapter", prior.previous_chunks.len());
        }

        let messages = self.assembler.assemble(&PromptInput {
            chunk_text: &chunk.text,
            glossary: &glossary,
            notes: &snapshot.notes,
            previous_chapters: prior.previous_chapters,
            previous_chunks: prior.previous_chunks,
        });

        let run = run_rotation(&self.plan, stop, |target| {
            let request = ChatRequest {
                messages: messages.clone(),
                params: self.settings.sampling.clone(),
                route: target.provider,
            };
            let provider = Arc::clone(&self.provider);
            async move {
                let text = provider.complete(request, stop).await?;
                debug!("Raw response ({} chars)", text.chars().count());
                parse_response(&text)
            }
        })
        .await;

        let payload = run.result?;
        self.merge(&payload);

        Ok(ChunkTranslation {
            text: payload.complete_translation,
            attempts: run.history,
            traces,
        })
    }

    /// Apply glossary and note deltas according to the enabled modes
    fn merge(&self, payload: &TranslationPayload) {
        if self.settings.context_mode {
            self.store.update_characters(&payload.characters);
            self.store.update_places(&payload.places);
            self.store.update_terms(&payload.terms);
        }
        if self.settings.notes_mode {
            let log_change = |message: &str| info!("{}", message);
            match &self.note_listener {
                Some(listener) => {
                    let forward = |message: &str| {
                        log_change(message);
                        listener(message);
                    };
                    self.store.update_notes(&payload.notes, Some(&forward));
                }
                None => {
                    self.store.update_notes(&payload.notes, Some(&log_change));
                }
            }
        }
    }
}
