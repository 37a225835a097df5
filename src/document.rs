/*!
 * Document collaborators.
 *
 * The translation core never parses a document container itself. It reads
 * chapter bodies through a [`DocumentSource`], normalizes them with a
 * [`TextConverter`] and hands finished chapters back to the source.
 *
 * - `DirectorySource`: one file per chapter in a directory (CLI)
 * - `MemorySource`: chapters held in memory (tests and embedding)
 * - `MarkupConverter` / `PassthroughConverter`: markup normalization
 */

use log::debug;
use once_cell::sync::Lazy;
use parking_lot::Mutex;
use quick_xml::Reader;
use quick_xml::escape::{partial_escape, resolve_html5_entity, unescape_with};
use quick_xml::events::Event;
use regex::Regex;
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use crate::errors::DocumentError;
use crate::file_utils::{CHAPTER_EXTENSIONS, FileManager};

/// Supplies chapter bodies and accepts translated chapters
pub trait DocumentSource: Send + Sync {
    /// Identifier used to key the glossary files
    fn document_id(&self) -> &str;

    fn chapter_count(&self) -> usize;

    /// Markup body of a 1-based chapter
    fn chapter_body(&self, chapter: u32) -> Result<String, DocumentError>;

    /// Previously written translation of a chapter, if any
    fn translated_body(&self, chapter: u32) -> Result<Option<String>, DocumentError>;

    fn write_translated(&self, chapter: u32, body: &str) -> Result<(), DocumentError>;

    fn has_translation(&self, chapter: u32) -> bool {
        matches!(self.translated_body(chapter), Ok(Some(_)))
    }
}

/// Bidirectional markup <-> plain structured text conversion
pub trait TextConverter: Send + Sync {
    fn to_plain(&self, markup: &str) -> Result<String, DocumentError>;
    fn to_markup(&self, plain: &str) -> Result<String, DocumentError>;
}

/// Leaves text untouched in both directions
#[derive(Debug, Clone, Copy, Default)]
pub struct PassthroughConverter;

impl TextConverter for PassthroughConverter {
    fn to_plain(&self, markup: &str) -> Result<String, DocumentError> {
        Ok(markup.to_string())
    }

    fn to_markup(&self, plain: &str) -> Result<String, DocumentError> {
        Ok(plain.to_string())
    }
}

static ANY_TAG: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?s)<[^>]+>").unwrap()
});

static BLANK_RUNS: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"\n\s*\n+").unwrap()
});

/// Elements whose content never reaches the translator
const DROPPED_ELEMENTS: [&[u8]; 4] = [b"head", b"script", b"style", b"title"];

/// Elements separated from their neighbours by a blank line
const BLOCK_ELEMENTS: [&[u8]; 5] = [b"p", b"div", b"li", b"blockquote", b"section"];

fn local_name(name: &[u8]) -> Vec<u8> {
    let local = name
        .iter()
        .rposition(|&b| b == b':')
        .map_or(name, |i| &name[i + 1..]);
    local.to_ascii_lowercase()
}

fn heading_level(name: &[u8]) -> Option<usize> {
    match name {
        [b'h', level @ b'1'..=b'6'] => Some((level - b'0') as usize),
        _ => None,
    }
}

/// Resolve `&name;`, `&#NNN;` and `&#xHHH;` with the full HTML5 entity table
fn resolve_reference(name: &str) -> String {
    let raw = format!("&{};", name);
    match unescape_with(&raw, resolve_html5_entity) {
        Ok(text) => text.into_owned(),
        Err(e) => {
            debug!("Keeping unknown entity {}: {}", raw, e);
            raw
        }
    }
}

/// XHTML stripper: paragraphs and headings become blank-line separated
/// blocks, headings keep a `#` prefix. Text without tags passes through.
#[derive(Debug, Clone, Copy, Default)]
pub struct MarkupConverter;

impl MarkupConverter {
    fn extract_text(markup: &str) -> Result<String, DocumentError> {
        let mut reader = Reader::from_str(markup);
        let config = reader.config_mut();
        config.check_end_names = false;
        config.allow_unmatched_ends = true;
        config.allow_dangling_amp = true;

        let mut text = String::new();
        let mut dropped_depth = 0usize;

        loop {
            match reader.read_event() {
                Ok(Event::Start(e)) => {
                    let name = local_name(e.name().as_ref());
                    if DROPPED_ELEMENTS.contains(&name.as_slice()) {
                        dropped_depth += 1;
                    } else if dropped_depth == 0 {
                        if let Some(level) = heading_level(&name) {
                            text.push_str("\n\n");
                            text.push_str(&"#".repeat(level));
                            text.push(' ');
                        } else if BLOCK_ELEMENTS.contains(&name.as_slice()) {
                            text.push_str("\n\n");
                        } else if name == b"br" {
                            text.push('\n');
                        }
                    }
                }
                Ok(Event::Empty(e)) => {
                    if dropped_depth == 0 && local_name(e.name().as_ref()) == b"br" {
                        text.push('\n');
                    }
                }
                Ok(Event::End(e)) => {
                    let name = local_name(e.name().as_ref());
                    if DROPPED_ELEMENTS.contains(&name.as_slice()) {
                        dropped_depth = dropped_depth.saturating_sub(1);
                    } else if dropped_depth == 0
                        && (heading_level(&name).is_some() || BLOCK_ELEMENTS.contains(&name.as_slice()))
                    {
                        text.push_str("\n\n");
                    }
                }
                Ok(Event::Text(e)) if dropped_depth == 0 => {
                    text.push_str(&String::from_utf8_lossy(e.as_ref()));
                }
                Ok(Event::CData(e)) if dropped_depth == 0 => {
                    text.push_str(&String::from_utf8_lossy(e.as_ref()));
                }
                Ok(Event::GeneralRef(e)) if dropped_depth == 0 => {
                    text.push_str(&resolve_reference(&String::from_utf8_lossy(e.as_ref())));
                }
                Ok(Event::Eof) => break,
                Err(e) => {
                    return Err(DocumentError::Conversion(format!(
                        "malformed markup at byte {}: {}",
                        reader.buffer_position(),
                        e
                    )));
                }
                _ => {}
            }
        }

        Ok(text.replace('\u{a0}', " "))
    }
}

impl TextConverter for MarkupConverter {
    fn to_plain(&self, markup: &str) -> Result<String, DocumentError> {
        if !ANY_TAG.is_match(markup) {
            return Ok(markup.to_string());
        }

        let text = Self::extract_text(markup)?;
        let lines: Vec<&str> = text.lines().map(str::trim).collect();
        let joined = lines.join("\n");
        Ok(BLANK_RUNS.replace_all(joined.trim(), "\n\n").to_string())
    }

    fn to_markup(&self, plain: &str) -> Result<String, DocumentError> {
        let blocks: Vec<String> = plain
            .split("\n\n")
            .map(str::trim)
            .filter(|block| !block.is_empty())
            .map(|block| {
                let level = block.chars().take_while(|c| *c == '#').count();
                if (1..=6).contains(&level) && block[level..].starts_with(' ') {
                    format!("<h{0}>{1}</h{0}>", level, partial_escape(block[level..].trim()))
                } else {
                    let lines: Vec<String> = block.lines().map(|line| partial_escape(line).into_owned()).collect();
                    format!("<p>{}</p>", lines.join("<br/>"))
                }
            })
            .collect();
        Ok(blocks.join("\n"))
    }
}

/// Chapters stored as individual files in a directory
#[derive(Debug, Clone)]
pub struct DirectorySource {
    document_id: String,
    chapters: Vec<PathBuf>,
    output_dir: PathBuf,
}

impl DirectorySource {
    /// Discover chapter files under `input_dir`; translations go to
    /// `<output_dir>/chapters/<n>.md`
    pub fn open(input_dir: &Path, output_dir: &Path) -> Result<Self, DocumentError> {
        if !FileManager::dir_exists(input_dir) {
            return Err(DocumentError::Io {
                path: input_dir.to_path_buf(),
                source: std::io::Error::new(std::io::ErrorKind::NotFound, "input directory not found"),
            });
        }

        let chapters = FileManager::find_files(input_dir, &CHAPTER_EXTENSIONS).map_err(|e| DocumentError::Io {
            path: input_dir.to_path_buf(),
            source: std::io::Error::other(e.to_string()),
        })?;

        let document_id = input_dir
            .canonicalize()
            .ok()
            .and_then(|p| p.file_name().map(|n| n.to_string_lossy().to_string()))
            .unwrap_or_else(|| "document".to_string());

        debug!("Found {} chapter files in {:?}", chapters.len(), input_dir);

        Ok(Self {
            document_id,
            chapters,
            output_dir: output_dir.to_path_buf(),
        })
    }

    pub fn chapter_files(&self) -> &[PathBuf] {
        &self.chapters
    }

    pub fn output_dir(&self) -> &Path {
        &self.output_dir
    }

    /// Whether any chapter file carries HTML markup
    pub fn has_markup(&self) -> bool {
        self.chapters.iter().any(|p| {
            p.extension()
                .map(|e| matches!(e.to_string_lossy().to_lowercase().as_str(), "xhtml" | "html" | "htm"))
                .unwrap_or(false)
        })
    }

    pub fn translated_path(&self, chapter: u32) -> PathBuf {
        self.output_dir.join("chapters").join(format!("{}.md", chapter))
    }

    fn chapter_path(&self, chapter: u32) -> Result<&PathBuf, DocumentError> {
        let index = (chapter as usize).checked_sub(1).ok_or(DocumentError::MissingChapter(chapter))?;
        self.chapters.get(index).ok_or(DocumentError::MissingChapter(chapter))
    }
}

impl DocumentSource for DirectorySource {
    fn document_id(&self) -> &str {
        &self.document_id
    }

    fn chapter_count(&self) -> usize {
        self.chapters.len()
    }

    fn chapter_body(&self, chapter: u32) -> Result<String, DocumentError> {
        let path = self.chapter_path(chapter)?;
        fs::read_to_string(path).map_err(|source| DocumentError::Io {
            path: path.clone(),
            source,
        })
    }

    fn translated_body(&self, chapter: u32) -> Result<Option<String>, DocumentError> {
        let path = self.translated_path(chapter);
        if !FileManager::file_exists(&path) {
            return Ok(None);
        }
        fs::read_to_string(&path)
            .map(Some)
            .map_err(|source| DocumentError::Io { path, source })
    }

    fn write_translated(&self, chapter: u32, body: &str) -> Result<(), DocumentError> {
        self.chapter_path(chapter)?;
        let path = self.translated_path(chapter);
        FileManager::write_to_file(&path, body).map_err(|e| DocumentError::Io {
            path,
            source: std::io::Error::other(e.to_string()),
        })
    }
}

/// Chapters held in memory
#[derive(Debug, Default)]
pub struct MemorySource {
    document_id: String,
    chapters: Vec<String>,
    translated: Mutex<BTreeMap<u32, String>>,
}

impl MemorySource {
    pub fn new(document_id: impl Into<String>, chapters: Vec<String>) -> Self {
        Self {
            document_id: document_id.into(),
            chapters,
            translated: Mutex::new(BTreeMap::new()),
        }
    }

    /// Every translated chapter written so far
    pub fn translations(&self) -> BTreeMap<u32, String> {
        self.translated.lock().clone()
    }
}

impl DocumentSource for MemorySource {
    fn document_id(&self) -> &str {
        &self.document_id
    }

    fn chapter_count(&self) -> usize {
        self.chapters.len()
    }

    fn chapter_body(&self, chapter: u32) -> Result<String, DocumentError> {
        (chapter as usize)
            .checked_sub(1)
            .and_then(|i| self.chapters.get(i))
            .cloned()
            .ok_or(DocumentError::MissingChapter(chapter))
    }

    fn translated_body(&self, chapter: u32) -> Result<Option<String>, DocumentError> {
        Ok(self.translated.lock().get(&chapter).cloned())
    }

    fn write_translated(&self, chapter: u32, body: &str) -> Result<(), DocumentError> {
        if chapter == 0 || chapter as usize > self.chapters.len() {
            return Err(DocumentError::MissingChapter(chapter));
        }
        self.translated.lock().insert(chapter, body.to_string());
        Ok(())
    }
}
