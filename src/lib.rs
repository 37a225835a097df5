/*!
 * # booktrans - chapter-by-chapter book translation with LLMs
 *
 * A Rust library for translating long-form fiction through OpenAI-compatible
 * chat-completion endpoints while keeping names and terms consistent.
 *
 * ## Features
 *
 * - Token-budgeted chunking at paragraph boundaries
 * - Persistent glossary of characters, places, terms and translation notes
 *   that grows as the model proposes new entries
 * - Relevance filtering of the glossary per chunk (exact, fuzzy and CJK matches)
 * - Provider rotation with bounded retries over OpenRouter routes
 * - Concurrent chapter workers with all-or-nothing chapter output
 * - Plain text, Markdown and (X)HTML chapter files
 *
 * ## Architecture
 *
 * The library is organized in these main modules:
 * - `app_config`: Configuration, chapter selection and credentials
 * - `app_controller`: Main application controller and progress display
 * - `document`: Chapter sources and markup conversion
 * - `translation`: Translation engine:
 *   - `translation::chunker`: Token counting and chunk splitting
 *   - `translation::glossary`: Glossary store and merge rules
 *   - `translation::filter`: Glossary relevance filter
 *   - `translation::prompts`: Prompt templates and assembly
 *   - `translation::response`: Model response parsing
 *   - `translation::rotation`: Provider rotation state machine
 *   - `translation::pipeline`: Per-chunk translation
 *   - `translation::scheduler`: Chapter workers
 * - `file_utils`: File system operations
 * - `providers`: Chat-completion clients:
 *   - `providers::openrouter`: OpenRouter and custom endpoint client
 *   - `providers::mock`: Scripted provider for tests
 * - `errors`: Custom error types for the application
 */

// Global lints configuration
// These lints will be allowed but not auto-fixed
#![allow(clippy::uninlined_format_args)]
#![allow(clippy::redundant_closure_for_method_calls)]

// Public modules
pub mod app_config;
pub mod app_controller;
pub mod document;
pub mod errors;
pub mod file_utils;
pub mod providers;
pub mod translation;

// Re-export main types for easier usage
pub use app_config::{ChapterSelection, Config, Credentials};
pub use app_controller::{Controller, RunResources};
pub use document::{DirectorySource, DocumentSource, MarkupConverter, MemorySource, PassthroughConverter, TextConverter};
pub use errors::{AppError, ConfigError, DocumentError, GlossaryError, ProviderError, TranslationError};
pub use translation::{ChapterScheduler, GlossaryStore, SchedulerReport, StopFlag, TranslationPipeline};
