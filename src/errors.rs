/*!
 * Error types for the booktrans application.
 *
 * This module contains custom error types for different parts of the application,
 * using the thiserror crate for ergonomic error definitions.
 */

use std::path::PathBuf;
use thiserror::Error;

/// Errors that can occur when talking to a completion endpoint
#[derive(Error, Debug)]
pub enum ProviderError {
    /// The request could not be sent or the stream broke off
    #[error("Transport failure: {0}")]
    Transport(String),

    /// The attempt did not finish within the configured timeout
    #[error("Request timed out after {0:.1}s")]
    Timeout(f64),

    /// Error returned by the API itself
    #[error("API responded with error: {status_code} - {message}")]
    ApiError {
        /// HTTP status code
        status_code: u16,
        /// Error message from the API
        message: String,
    },

    /// The body could not be decoded into a translation payload
    #[error("Malformed response: {0}")]
    MalformedResponse(String),

    /// The payload decoded but a mandatory field is absent
    #[error("Response is missing mandatory field '{0}'")]
    MissingField(String),

    /// The stop flag was raised while the request was in flight
    #[error("Request cancelled")]
    Cancelled,
}

/// Coarse classification used when logging rotation attempts
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureKind {
    /// Network, HTTP status or timeout problems
    Transport,
    /// Body arrived but was unusable
    MalformedResponse,
    /// Cooperative stop
    Cancelled,
}

impl FailureKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Transport => "transport",
            Self::MalformedResponse => "malformed",
            Self::Cancelled => "cancelled",
        }
    }
}

impl std::fmt::Display for FailureKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl ProviderError {
    /// Classify the error for rotation logging
    pub fn kind(&self) -> FailureKind {
        match self {
            Self::Transport(_) | Self::Timeout(_) | Self::ApiError { .. } => FailureKind::Transport,
            Self::MalformedResponse(_) | Self::MissingField(_) => FailureKind::MalformedResponse,
            Self::Cancelled => FailureKind::Cancelled,
        }
    }
}

impl From<reqwest::Error> for ProviderError {
    fn from(error: reqwest::Error) -> Self {
        Self::Transport(error.to_string())
    }
}

/// Errors raised by the glossary store's persistence layer
#[derive(Error, Debug)]
pub enum GlossaryError {
    /// Reading or writing a collection file failed
    #[error("Glossary I/O error on {path:?}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// A collection file exists but cannot be decoded
    #[error("Glossary file {path:?} is corrupt: {message}")]
    Corrupt { path: PathBuf, message: String },
}

/// Configuration problems detected before any provider call
#[derive(Error, Debug)]
pub enum ConfigError {
    /// A credential needed by the selected endpoint is not set
    #[error("Missing credential: {0}")]
    MissingCredential(String),

    /// The chapter selection string could not be parsed
    #[error("Invalid chapter selection '{input}': {message}")]
    InvalidChapterSelection { input: String, message: String },

    /// A numeric or string option is outside its allowed range
    #[error("Invalid value for '{field}': {message}")]
    InvalidValue { field: String, message: String },

    /// A selected chapter does not exist in the document
    #[error("Chapter {chapter} is out of range (document has {total} chapters)")]
    ChapterOutOfRange { chapter: u32, total: usize },
}

/// Errors from reading chapters or writing translated output
#[derive(Error, Debug)]
pub enum DocumentError {
    /// Filesystem failure
    #[error("Document I/O error on {path:?}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Requested chapter does not exist
    #[error("Chapter {0} does not exist")]
    MissingChapter(u32),

    /// Markup could not be converted to or from plain text
    #[error("Conversion failed: {0}")]
    Conversion(String),
}

/// Errors that can occur during translation
#[derive(Error, Debug)]
pub enum TranslationError {
    /// Error from the provider API
    #[error("Provider error: {0}")]
    Provider(#[from] ProviderError),

    /// Every provider and retry failed
    #[error("All providers exhausted after {attempts} attempts")]
    Exhausted { attempts: usize },

    /// Stop was requested before the chunk finished
    #[error("Translation cancelled")]
    Cancelled,

    /// Chapter text could not be prepared or written back
    #[error("Document error: {0}")]
    Document(#[from] DocumentError),
}

/// Main application error type that wraps all other errors
#[derive(Error, Debug)]
pub enum AppError {
    /// Error from a file operation
    #[error("File error: {0}")]
    File(String),

    /// Invalid configuration
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// Error from a provider
    #[error("Provider error: {0}")]
    Provider(#[from] ProviderError),

    /// Error from translation
    #[error("Translation error: {0}")]
    Translation(#[from] TranslationError),

    /// Error from the glossary store
    #[error("Glossary error: {0}")]
    Glossary(#[from] GlossaryError),

    /// Any other error
    #[error("Unknown error: {0}")]
    Unknown(String),
}

// Utility functions for error conversion
impl From<anyhow::Error> for AppError {
    fn from(error: anyhow::Error) -> Self {
        Self::Unknown(error.to_string())
    }
}

impl From<std::io::Error> for AppError {
    fn from(error: std::io::Error) -> Self {
        Self::File(error.to_string())
    }
}
