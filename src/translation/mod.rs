/*!
 * Translation engine for chapter-based books.
 *
 * This module contains the pieces that turn a chapter into translated text.
 * It is split into several submodules:
 *
 * - `chunker`: Token counting and paragraph-aligned chunk splitting
 * - `glossary`: Persistent glossary store and merge rules
 * - `filter`: Relevance filter that narrows the glossary per chunk
 * - `prompts`: Prompt templates and message assembly
 * - `response`: Extraction of the JSON payload from model output
 * - `rotation`: Provider rotation with bounded retries
 * - `pipeline`: Translation of a single chunk
 * - `scheduler`: Concurrent chapter workers
 * - `stop`: Cooperative stop signal
 */

// Re-export main types for easier usage
pub use self::chunker::{Chunk, Chunker, TiktokenCounter, TokenCounter};
pub use self::filter::{FilterCategories, RelevanceFilter};
pub use self::glossary::{GlossarySnapshot, GlossaryStore};
pub use self::pipeline::{PipelineSettings, PriorContext, TranslationPipeline};
pub use self::prompts::{DefaultPromptAssembler, PromptAssembler, PromptOptions, PromptTemplates};
pub use self::rotation::{RotationPlan, run_rotation};
pub use self::scheduler::{ChapterObserver, ChapterScheduler, SchedulerReport, SchedulerSettings};
pub use self::stop::StopFlag;

// Submodules
pub mod chunker;
pub mod filter;
pub mod glossary;
pub mod pipeline;
pub mod prompts;
pub mod response;
pub mod rotation;
pub mod scheduler;
pub mod stop;
