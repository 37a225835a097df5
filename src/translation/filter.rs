/*!
 * Relevance filtering of glossary entries against a chunk.
 *
 * Only entries whose original or translated form appears in the chunk are
 * forwarded to the model. Matching escalates from exact substring through
 * kana-normalized substring to partial matches of CJK terms, with an
 * optional loose pass over term halves for compound names and terms.
 */

use log::{debug, info};

use crate::translation::glossary::{CharacterEntry, GlossarySubset, OrderedEntries, TermEntry};

const HIRAGANA_START: u32 = 0x3041;
const KATAKANA_START: u32 = 0x30A1;
const KATAKANA_END: u32 = 0x30F6;

/// How a glossary entry was found in the chunk
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MatchKind {
    Exact,
    Normalized,
    Partial,
    PartialNormalized,
    NamePart,
    NamePartNormalized,
    Prefix,
    PrefixNormalized,
}

impl MatchKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Exact => "exact",
            Self::Normalized => "normalized",
            Self::Partial => "partial",
            Self::PartialNormalized => "partial_norm",
            Self::NamePart => "name_part",
            Self::NamePartNormalized => "name_part_norm",
            Self::Prefix => "prefix",
            Self::PrefixNormalized => "prefix_norm",
        }
    }
}

impl std::fmt::Display for MatchKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Which half-term fallbacks are allowed for a category
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LooseMode {
    /// No half-term matching
    Strict,
    /// Either half of a name may match (characters)
    NameParts,
    /// Only the leading half may match (specialized terms)
    PrefixOnly,
}

/// One matched entry, for diagnostics
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MatchTrace {
    pub original: String,
    pub translated: String,
    pub matched: String,
    pub kind: MatchKind,
}

/// Match traces grouped by collection
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FilterTraces {
    pub characters: Vec<MatchTrace>,
    pub places: Vec<MatchTrace>,
    pub terms: Vec<MatchTrace>,
}

/// Which collections are narrowed; the rest pass through whole
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FilterCategories {
    pub characters: bool,
    pub places: bool,
    pub terms: bool,
}

impl Default for FilterCategories {
    fn default() -> Self {
        Self {
            characters: true,
            places: true,
            terms: true,
        }
    }
}

/// Tunable thresholds for partial matching
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FilterThresholds {
    /// Shortest partial length as a fraction of the term length
    pub partial_ratio: f64,
    /// Absolute floor for partial lengths
    pub min_partial_len: usize,
    /// Terms shorter than this never use half-term matching
    pub loose_min_term_len: usize,
    /// Shortest raw half accepted
    pub min_half_len: usize,
    /// Shortest normalized half accepted for name parts
    pub name_part_min_norm_len: usize,
    /// Shortest normalized half accepted for prefixes
    pub prefix_min_norm_len: usize,
}

impl Default for FilterThresholds {
    fn default() -> Self {
        Self {
            partial_ratio: 0.7,
            min_partial_len: 2,
            loose_min_term_len: 4,
            min_half_len: 2,
            name_part_min_norm_len: 2,
            prefix_min_norm_len: 3,
        }
    }
}

/// Lowercase and fold katakana onto hiragana
pub fn normalize(text: &str) -> String {
    text.to_lowercase()
        .chars()
        .map(|c| {
            let code = c as u32;
            if (KATAKANA_START..=KATAKANA_END).contains(&code) {
                char::from_u32(code - KATAKANA_START + HIRAGANA_START).unwrap_or(c)
            } else {
                c
            }
        })
        .collect()
}

pub fn is_cjk_char(c: char) -> bool {
    matches!(c as u32,
        0x4E00..=0x9FFF
        | 0x3400..=0x4DBF
        | 0x3040..=0x309F
        | 0x30A0..=0x30FF
        | 0xAC00..=0xD7AF)
}

fn has_cjk(text: &str) -> bool {
    text.chars().any(is_cjk_char)
}

/// Chunk text prepared once for repeated lookups
struct PreparedChunk<'a> {
    raw: &'a str,
    normalized: String,
}

impl<'a> PreparedChunk<'a> {
    fn new(raw: &'a str) -> Self {
        Self {
            raw,
            normalized: normalize(raw),
        }
    }

    fn contains(&self, needle: &str) -> bool {
        self.raw.contains(needle)
    }

    fn contains_normalized(&self, needle: &str) -> bool {
        self.normalized.contains(&normalize(needle))
    }
}

/// Glossary relevance filter
#[derive(Debug, Clone, Default)]
pub struct RelevanceFilter {
    thresholds: FilterThresholds,
}

/// Narrowed glossary together with how each entry matched
#[derive(Debug, Clone, Default)]
pub struct FilterOutcome {
    pub subset: GlossarySubset,
    pub traces: FilterTraces,
}

impl RelevanceFilter {
    pub fn new(thresholds: FilterThresholds) -> Self {
        Self { thresholds }
    }

    /// Find `term` in the chunk, returning the matched text and how it matched.
    pub fn find_match(&self, term: &str, chunk: &str, mode: LooseMode) -> Option<(String, MatchKind)> {
        self.find_in_prepared(term, &PreparedChunk::new(chunk), mode)
    }

    fn find_in_prepared(&self, term: &str, chunk: &PreparedChunk<'_>, mode: LooseMode) -> Option<(String, MatchKind)> {
        if term.is_empty() {
            return None;
        }
        if chunk.contains(term) {
            return Some((term.to_string(), MatchKind::Exact));
        }
        if chunk.contains_normalized(term) {
            return Some((term.to_string(), MatchKind::Normalized));
        }

        let chars: Vec<char> = term.chars().collect();
        let len = chars.len();
        if !has_cjk(term) || len < 2 {
            return None;
        }

        let t = &self.thresholds;
        let min_len = t.min_partial_len.max((len as f64 * t.partial_ratio).ceil() as usize);
        for length in (min_len..len).rev() {
            for start in 0..=(len - length) {
                let partial: String = chars[start..start + length].iter().collect();
                if chunk.contains(&partial) {
                    return Some((partial, MatchKind::Partial));
                }
                if chunk.contains_normalized(&partial) {
                    return Some((partial, MatchKind::PartialNormalized));
                }
            }
        }

        if mode == LooseMode::Strict || len < t.loose_min_term_len {
            return None;
        }

        let prefix_only = mode == LooseMode::PrefixOnly;
        let half = len / 2;
        let first_half: String = chars[..half].iter().collect();

        if half >= t.min_half_len && chunk.contains(&first_half) {
            let kind = if prefix_only { MatchKind::Prefix } else { MatchKind::NamePart };
            return Some((first_half, kind));
        }

        let min_norm_len = if prefix_only { t.prefix_min_norm_len } else { t.name_part_min_norm_len };
        if half >= min_norm_len && chunk.contains_normalized(&first_half) {
            let kind = if prefix_only { MatchKind::PrefixNormalized } else { MatchKind::NamePartNormalized };
            return Some((first_half, kind));
        }

        if mode == LooseMode::NameParts {
            let second_half: String = chars[half..].iter().collect();
            let second_len = len - half;
            if second_len >= t.min_half_len && chunk.contains(&second_half) {
                return Some((second_half, MatchKind::NamePart));
            }
            if second_len >= t.name_part_min_norm_len && chunk.contains_normalized(&second_half) {
                return Some((second_half, MatchKind::NamePartNormalized));
            }
        }

        None
    }

    /// Try the original form first, then the translated form
    fn match_entry(
        &self,
        original: &str,
        translated: &str,
        chunk: &PreparedChunk<'_>,
        mode: LooseMode,
    ) -> Option<MatchTrace> {
        self.find_in_prepared(original, chunk, mode)
            .or_else(|| self.find_in_prepared(translated, chunk, mode))
            .map(|(matched, kind)| MatchTrace {
                original: original.to_string(),
                translated: translated.to_string(),
                matched,
                kind,
            })
    }

    pub fn filter_characters(
        &self,
        chunk: &str,
        characters: &OrderedEntries<CharacterEntry>,
    ) -> (OrderedEntries<CharacterEntry>, Vec<MatchTrace>) {
        let prepared = PreparedChunk::new(chunk);
        let mut relevant = OrderedEntries::new();
        let mut traces = Vec::new();

        for (original, entry) in characters.iter() {
            if let Some(trace) = self.match_entry(original, &entry.translated, &prepared, LooseMode::NameParts) {
                relevant.insert(original, entry.clone());
                traces.push(trace);
            }
        }

        debug!("Character filter: {}/{} matched", relevant.len(), characters.len());
        (relevant, traces)
    }

    pub fn filter_places(
        &self,
        chunk: &str,
        places: &OrderedEntries<String>,
    ) -> (OrderedEntries<String>, Vec<MatchTrace>) {
        let prepared = PreparedChunk::new(chunk);
        let mut relevant = OrderedEntries::new();
        let mut traces = Vec::new();

        for (original, translated) in places.iter() {
            if let Some(trace) = self.match_entry(original, translated, &prepared, LooseMode::Strict) {
                relevant.insert(original, translated.clone());
                traces.push(trace);
            }
        }

        debug!("Place filter: {}/{} matched", relevant.len(), places.len());
        (relevant, traces)
    }

    pub fn filter_terms(
        &self,
        chunk: &str,
        terms: &OrderedEntries<TermEntry>,
    ) -> (OrderedEntries<TermEntry>, Vec<MatchTrace>) {
        let prepared = PreparedChunk::new(chunk);
        let mut relevant = OrderedEntries::new();
        let mut traces = Vec::new();

        for (original, entry) in terms.iter() {
            if let Some(trace) = self.match_entry(original, &entry.translated, &prepared, LooseMode::PrefixOnly) {
                relevant.insert(original, entry.clone());
                traces.push(trace);
            }
        }

        debug!("Term filter: {}/{} matched", relevant.len(), terms.len());
        (relevant, traces)
    }

    /// Narrow the selected collections to the entries relevant to `chunk`.
    /// Collections not selected in `categories` are passed through unchanged.
    pub fn filter(&self, chunk: &str, glossary: &GlossarySubset, categories: FilterCategories) -> FilterOutcome {
        let mut outcome = FilterOutcome::default();

        outcome.subset.characters = if categories.characters {
            let (relevant, traces) = self.filter_characters(chunk, &glossary.characters);
            outcome.traces.characters = traces;
            relevant
        } else {
            glossary.characters.clone()
        };

        outcome.subset.places = if categories.places {
            let (relevant, traces) = self.filter_places(chunk, &glossary.places);
            outcome.traces.places = traces;
            relevant
        } else {
            glossary.places.clone()
        };

        outcome.subset.terms = if categories.terms {
            let (relevant, traces) = self.filter_terms(chunk, &glossary.terms);
            outcome.traces.terms = traces;
            relevant
        } else {
            glossary.terms.clone()
        };

        info!(
            "Context filter: {}/{} chars, {}/{} places, {}/{} terms",
            outcome.subset.characters.len(),
            glossary.characters.len(),
            outcome.subset.places.len(),
            glossary.places.len(),
            outcome.subset.terms.len(),
            glossary.terms.len()
        );

        outcome
    }
}
