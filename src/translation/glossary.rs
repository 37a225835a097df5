/*!
 * Persistent glossary store for a single document.
 *
 * Four collections are kept per document: characters, places, specialized
 * terms and free-form translation notes. Each collection preserves insertion
 * order, is guarded by its own lock and is written through to
 * `<dir>/<document_id>_<collection>.json` after every change.
 */

use log::{debug, error, info, warn};
use parking_lot::Mutex;
use serde::de::{DeserializeOwned, MapAccess, Visitor};
use serde::ser::SerializeMap;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::Value;
use std::collections::HashMap;
use std::fmt;
use std::fs;
use std::marker::PhantomData;
use std::path::{Path, PathBuf};

use crate::errors::GlossaryError;

/// Insertion-ordered string-keyed map
#[derive(Debug, Clone, PartialEq)]
pub struct OrderedEntries<V> {
    entries: Vec<(String, V)>,
    index: HashMap<String, usize>,
}

impl<V> Default for OrderedEntries<V> {
    fn default() -> Self {
        Self {
            entries: Vec::new(),
            index: HashMap::new(),
        }
    }
}

impl<V> OrderedEntries<V> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.index.contains_key(key)
    }

    pub fn get(&self, key: &str) -> Option<&V> {
        self.index.get(key).map(|&i| &self.entries[i].1)
    }

    pub fn get_mut(&mut self, key: &str) -> Option<&mut V> {
        match self.index.get(key) {
            Some(&i) => Some(&mut self.entries[i].1),
            None => None,
        }
    }

    /// Insert or replace. A replaced key keeps its original position.
    pub fn insert(&mut self, key: impl Into<String>, value: V) -> Option<V> {
        let key = key.into();
        if let Some(&i) = self.index.get(&key) {
            return Some(std::mem::replace(&mut self.entries[i].1, value));
        }
        self.index.insert(key.clone(), self.entries.len());
        self.entries.push((key, value));
        None
    }

    pub fn remove(&mut self, key: &str) -> Option<V> {
        let position = self.index.remove(key)?;
        let (_, value) = self.entries.remove(position);
        for slot in self.index.values_mut() {
            if *slot > position {
                *slot -= 1;
            }
        }
        Some(value)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &V)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|(k, _)| k.as_str())
    }
}

impl<V> FromIterator<(String, V)> for OrderedEntries<V> {
    fn from_iter<I: IntoIterator<Item = (String, V)>>(iter: I) -> Self {
        let mut entries = Self::new();
        for (key, value) in iter {
            entries.insert(key, value);
        }
        entries
    }
}

impl<V> IntoIterator for OrderedEntries<V> {
    type Item = (String, V);
    type IntoIter = std::vec::IntoIter<(String, V)>;

    fn into_iter(self) -> Self::IntoIter {
        self.entries.into_iter()
    }
}

impl<V: Serialize> Serialize for OrderedEntries<V> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.entries.len()))?;
        for (key, value) in &self.entries {
            map.serialize_entry(key, value)?;
        }
        map.end()
    }
}

struct OrderedEntriesVisitor<V>(PhantomData<V>);

impl<'de, V: Deserialize<'de>> Visitor<'de> for OrderedEntriesVisitor<V> {
    type Value = OrderedEntries<V>;

    fn expecting(&self, formatter: &mut fmt::Formatter) -> fmt::Result {
        formatter.write_str("a JSON object")
    }

    fn visit_map<A: MapAccess<'de>>(self, mut access: A) -> Result<Self::Value, A::Error> {
        let mut entries = OrderedEntries::new();
        while let Some((key, value)) = access.next_entry::<String, V>()? {
            entries.insert(key, value);
        }
        Ok(entries)
    }
}

impl<'de, V: Deserialize<'de>> Deserialize<'de> for OrderedEntries<V> {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        deserializer.deserialize_map(OrderedEntriesVisitor(PhantomData))
    }
}

/// Grammatical gender recorded for a character
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Gender {
    Male,
    Female,
    #[default]
    NotClear,
}

impl Gender {
    /// Lenient parse; anything unrecognised becomes `NotClear`
    pub fn parse(value: &str) -> Self {
        match value.trim().to_lowercase().as_str() {
            "male" => Self::Male,
            "female" => Self::Female,
            _ => Self::NotClear,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Male => "male",
            Self::Female => "female",
            Self::NotClear => "not_clear",
        }
    }
}

impl<'de> Deserialize<'de> for Gender {
    /// Null, missing or non-string values become `NotClear`
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = Option::<Value>::deserialize(deserializer)?;
        Ok(raw.as_ref().and_then(Value::as_str).map_or(Self::NotClear, Self::parse))
    }
}

/// Category of a specialized term
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TermCategory {
    Spell,
    Weapon,
    Skill,
    Technique,
    Ability,
    Item,
    Artifact,
    #[default]
    Other,
}

impl TermCategory {
    /// Lenient parse; anything unrecognised becomes `Other`
    pub fn parse(value: &str) -> Self {
        match value.trim().to_lowercase().as_str() {
            "spell" => Self::Spell,
            "weapon" => Self::Weapon,
            "skill" => Self::Skill,
            "technique" => Self::Technique,
            "ability" => Self::Ability,
            "item" => Self::Item,
            "artifact" => Self::Artifact,
            _ => Self::Other,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Spell => "spell",
            Self::Weapon => "weapon",
            Self::Skill => "skill",
            Self::Technique => "technique",
            Self::Ability => "ability",
            Self::Item => "item",
            Self::Artifact => "artifact",
            Self::Other => "other",
        }
    }
}

impl<'de> Deserialize<'de> for TermCategory {
    /// Null, missing or non-string values become `Other`
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = Option::<Value>::deserialize(deserializer)?;
        Ok(raw.as_ref().and_then(Value::as_str).map_or(Self::Other, Self::parse))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CharacterEntry {
    pub translated: String,
    #[serde(default)]
    pub gender: Gender,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TermEntry {
    pub translated: String,
    #[serde(default)]
    pub category: TermCategory,
}

/// On-disk character record: either the current object form or a bare
/// translated string written by older versions.
#[derive(Deserialize)]
#[serde(untagged)]
enum StoredCharacter {
    Record(CharacterEntry),
    Legacy(String),
}

impl From<StoredCharacter> for CharacterEntry {
    fn from(stored: StoredCharacter) -> Self {
        match stored {
            StoredCharacter::Record(entry) => entry,
            StoredCharacter::Legacy(translated) => CharacterEntry {
                translated,
                gender: Gender::NotClear,
            },
        }
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum StoredTerm {
    Record(TermEntry),
    Legacy(String),
}

impl From<StoredTerm> for TermEntry {
    fn from(stored: StoredTerm) -> Self {
        match stored {
            StoredTerm::Record(entry) => entry,
            StoredTerm::Legacy(translated) => TermEntry {
                translated,
                category: TermCategory::Other,
            },
        }
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum StoredPlace {
    Plain(String),
    Record { translated: String },
}

impl From<StoredPlace> for String {
    fn from(stored: StoredPlace) -> Self {
        match stored {
            StoredPlace::Plain(translated) | StoredPlace::Record { translated } => translated,
        }
    }
}

/// Character mapping proposed by a model response
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct ProposedCharacter {
    pub original: Option<String>,
    pub translated: Option<String>,
    pub gender: Option<String>,
}

/// Place mapping proposed by a model response
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct ProposedPlace {
    pub original: Option<String>,
    pub translated: Option<String>,
}

/// Term mapping proposed by a model response
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct ProposedTerm {
    pub original: Option<String>,
    pub translated: Option<String>,
    pub category: Option<String>,
}

/// Note operation requested by a model response
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct NoteAction {
    pub action: Option<String>,
    pub key: Option<String>,
    pub note: Option<String>,
}

/// Counts reported by a merge
#[derive(Debug, Default)]
pub struct MergeReport {
    pub added: usize,
    pub updated: usize,
    pub removed: usize,
    /// Set when the write-through save failed; in-memory changes are kept
    pub save_error: Option<GlossaryError>,
}

impl MergeReport {
    pub fn changed(&self) -> bool {
        self.added + self.updated + self.removed > 0
    }
}

/// The three term collections sent to the model
#[derive(Debug, Clone, Default, PartialEq)]
pub struct GlossarySubset {
    pub characters: OrderedEntries<CharacterEntry>,
    pub places: OrderedEntries<String>,
    pub terms: OrderedEntries<TermEntry>,
}

/// Point-in-time copy of every collection
#[derive(Debug, Clone, Default, PartialEq)]
pub struct GlossarySnapshot {
    pub terms: GlossarySubset,
    pub notes: OrderedEntries<String>,
}

/// Locations of the four collection files
#[derive(Debug, Clone)]
pub struct GlossaryPaths {
    pub characters: PathBuf,
    pub places: PathBuf,
    pub terms: PathBuf,
    pub notes: PathBuf,
}

impl GlossaryPaths {
    pub fn new(dir: &Path, document_id: &str) -> Self {
        let file = |suffix: &str| dir.join(format!("{}_{}.json", document_id, suffix));
        Self {
            characters: file("characters"),
            places: file("places"),
            terms: file("terms"),
            notes: file("notes"),
        }
    }
}

/// Per-document glossary with write-through persistence
#[derive(Debug)]
pub struct GlossaryStore {
    paths: Option<GlossaryPaths>,
    characters: Mutex<OrderedEntries<CharacterEntry>>,
    places: Mutex<OrderedEntries<String>>,
    terms: Mutex<OrderedEntries<TermEntry>>,
    notes: Mutex<OrderedEntries<String>>,
}

fn trimmed(value: &Option<String>) -> Option<String> {
    value
        .as_deref()
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}

fn read_collection(path: &Path) -> Result<Option<OrderedEntries<Value>>, GlossaryError> {
    if !path.exists() {
        return Ok(None);
    }
    let content = fs::read_to_string(path).map_err(|source| GlossaryError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    serde_json::from_str(&content)
        .map(Some)
        .map_err(|e| GlossaryError::Corrupt {
            path: path.to_path_buf(),
            message: e.to_string(),
        })
}

/// Load a collection record by record. Records that do not decode are
/// skipped; an unreadable file degrades to an empty collection.
fn load_collection<S, T>(path: &Path, label: &str) -> OrderedEntries<T>
where
    S: DeserializeOwned,
    T: From<S>,
{
    match read_collection(path) {
        Ok(Some(stored)) => {
            let mut entries = OrderedEntries::new();
            for (key, value) in stored.into_iter() {
                match serde_json::from_value::<S>(value) {
                    Ok(record) => {
                        entries.insert(key, T::from(record));
                    }
                    Err(e) => warn!("Skipping {} entry '{}' in {}: {}", label, key, path.display(), e),
                }
            }
            info!("Loaded {} {} from {}", entries.len(), label, path.display());
            entries
        }
        Ok(None) => OrderedEntries::new(),
        Err(e) => {
            error!("Could not load {}, starting empty: {}", label, e);
            OrderedEntries::new()
        }
    }
}

fn write_collection<V: Serialize>(path: &Path, entries: &OrderedEntries<V>) -> Result<(), GlossaryError> {
    let io_error = |source| GlossaryError::Io {
        path: path.to_path_buf(),
        source,
    };
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).map_err(io_error)?;
    }
    let json = serde_json::to_string_pretty(entries).map_err(|e| GlossaryError::Corrupt {
        path: path.to_path_buf(),
        message: e.to_string(),
    })?;
    let staging = path.with_extension("json.tmp");
    fs::write(&staging, json).map_err(io_error)?;
    fs::rename(&staging, path).map_err(io_error)?;
    Ok(())
}

impl GlossaryStore {
    /// Open the store for `document_id` under `dir`, loading existing files.
    pub fn open(dir: &Path, document_id: &str) -> Self {
        let paths = GlossaryPaths::new(dir, document_id);
        let characters = load_collection::<StoredCharacter, CharacterEntry>(&paths.characters, "characters");
        let places = load_collection::<StoredPlace, String>(&paths.places, "places");
        let terms = load_collection::<StoredTerm, TermEntry>(&paths.terms, "terms");
        let notes = load_collection::<String, String>(&paths.notes, "notes");

        Self {
            paths: Some(paths),
            characters: Mutex::new(characters),
            places: Mutex::new(places),
            terms: Mutex::new(terms),
            notes: Mutex::new(notes),
        }
    }

    /// Store without a backing directory
    pub fn in_memory() -> Self {
        Self {
            paths: None,
            characters: Mutex::new(OrderedEntries::new()),
            places: Mutex::new(OrderedEntries::new()),
            terms: Mutex::new(OrderedEntries::new()),
            notes: Mutex::new(OrderedEntries::new()),
        }
    }

    pub fn paths(&self) -> Option<&GlossaryPaths> {
        self.paths.as_ref()
    }

    pub fn snapshot(&self) -> GlossarySnapshot {
        GlossarySnapshot {
            terms: GlossarySubset {
                characters: self.characters.lock().clone(),
                places: self.places.lock().clone(),
                terms: self.terms.lock().clone(),
            },
            notes: self.notes.lock().clone(),
        }
    }

    pub fn character(&self, original: &str) -> Option<CharacterEntry> {
        self.characters.lock().get(original).cloned()
    }

    pub fn place(&self, original: &str) -> Option<String> {
        self.places.lock().get(original).cloned()
    }

    pub fn term(&self, original: &str) -> Option<TermEntry> {
        self.terms.lock().get(original).cloned()
    }

    pub fn note(&self, key: &str) -> Option<String> {
        self.notes.lock().get(key).cloned()
    }

    fn persist<V: Serialize>(
        &self,
        select: impl Fn(&GlossaryPaths) -> &PathBuf,
        entries: &OrderedEntries<V>,
        report: &mut MergeReport,
    ) {
        let Some(paths) = &self.paths else {
            return;
        };
        let path = select(paths);
        match write_collection(path, entries) {
            Ok(()) => debug!("Saved {} entries to {}", entries.len(), path.display()),
            Err(e) => {
                error!("Failed to save glossary: {}", e);
                report.save_error = Some(e);
            }
        }
    }

    /// Merge proposed characters. The translation is replaced on update; the
    /// gender only moves away from `not_clear`, never between known values.
    pub fn update_characters(&self, proposals: &[ProposedCharacter]) -> MergeReport {
        let mut report = MergeReport::default();
        let mut characters = self.characters.lock();

        for proposal in proposals {
            let (Some(original), Some(translated)) = (trimmed(&proposal.original), trimmed(&proposal.translated)) else {
                continue;
            };
            let gender = proposal.gender.as_deref().map(Gender::parse).unwrap_or_default();

            match characters.get_mut(&original) {
                Some(existing) => {
                    existing.translated = translated;
                    if existing.gender == Gender::NotClear && gender != Gender::NotClear {
                        existing.gender = gender;
                    }
                    report.updated += 1;
                }
                None => {
                    characters.insert(original, CharacterEntry { translated, gender });
                    report.added += 1;
                }
            }
        }

        if report.changed() {
            info!("Updated characters: {} added, {} modified", report.added, report.updated);
            self.persist(|p| &p.characters, &*characters, &mut report);
        }
        report
    }

    /// Merge proposed places. Existing places are never overwritten.
    pub fn update_places(&self, proposals: &[ProposedPlace]) -> MergeReport {
        let mut report = MergeReport::default();
        let mut places = self.places.lock();

        for proposal in proposals {
            let (Some(original), Some(translated)) = (trimmed(&proposal.original), trimmed(&proposal.translated)) else {
                continue;
            };
            if !places.contains_key(&original) {
                places.insert(original, translated);
                report.added += 1;
            }
        }

        if report.changed() {
            info!("Added {} new places", report.added);
            self.persist(|p| &p.places, &*places, &mut report);
        }
        report
    }

    /// Merge proposed terms. The translation is replaced on update; the
    /// category only moves away from `other`.
    pub fn update_terms(&self, proposals: &[ProposedTerm]) -> MergeReport {
        let mut report = MergeReport::default();
        let mut terms = self.terms.lock();

        for proposal in proposals {
            let (Some(original), Some(translated)) = (trimmed(&proposal.original), trimmed(&proposal.translated)) else {
                continue;
            };
            let category = proposal.category.as_deref().map(TermCategory::parse).unwrap_or_default();

            match terms.get_mut(&original) {
                Some(existing) => {
                    existing.translated = translated;
                    if existing.category == TermCategory::Other && category != TermCategory::Other {
                        existing.category = category;
                    }
                    report.updated += 1;
                }
                None => {
                    terms.insert(original, TermEntry { translated, category });
                    report.added += 1;
                }
            }
        }

        if report.changed() {
            info!("Updated terms: {} added, {} modified", report.added, report.updated);
            self.persist(|p| &p.terms, &*terms, &mut report);
        }
        report
    }

    /// Apply note actions. `add`/`update` (or no action) set the note text,
    /// `delete`/`remove` drop the key. Each effective change is reported
    /// through `on_change` when given.
    pub fn update_notes(&self, actions: &[NoteAction], on_change: Option<&(dyn Fn(&str) + Send + Sync)>) -> MergeReport {
        let mut report = MergeReport::default();
        let mut notes = self.notes.lock();
        let notify = |message: String| {
            if let Some(callback) = on_change {
                callback(&message);
            }
        };

        for action in actions {
            let Some(key) = trimmed(&action.key) else {
                continue;
            };
            let verb = action.action.as_deref().unwrap_or("add").trim().to_lowercase();

            match verb.as_str() {
                "add" | "update" => {
                    let Some(text) = trimmed(&action.note) else {
                        continue;
                    };
                    match notes.insert(key.clone(), text.clone()) {
                        Some(old) if old != text => {
                            notify(format!("Updated note '{}': '{}' -> '{}'", key, old, text));
                            report.updated += 1;
                        }
                        Some(_) => {}
                        None => {
                            notify(format!("Added note '{}': '{}'", key, text));
                            report.added += 1;
                        }
                    }
                }
                "delete" | "remove" => {
                    if let Some(old) = notes.remove(&key) {
                        notify(format!("Removed note '{}': '{}'", key, old));
                        report.removed += 1;
                    }
                }
                other => debug!("Ignoring unknown note action '{}'", other),
            }
        }

        if report.changed() {
            self.persist(|p| &p.notes, &*notes, &mut report);
        }
        report
    }
}
