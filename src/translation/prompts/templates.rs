/*!
 * Prompt templates for chapter translation.
 *
 * Every template can be overridden from a JSON file whose keys match the
 * field names below; missing keys keep the built-in text. `{number}` is
 * replaced with the position of an instruction in the numbered list and
 * `{target_language}` with the configured target language.
 */

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Full set of prompt fragments used by the default assembler
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PromptTemplates {
    pub system_prompt: String,
    pub character_instruction: String,
    pub places_instruction: String,
    pub terms_instruction: String,
    pub notes_detailed_instruction: String,
    pub notes_management_instruction: String,
    pub notes_reminder: String,
    pub base_instruction: String,
    pub ending_instruction: String,
    pub complete_translation_instruction: String,
}

impl PromptTemplates {
    pub const SYSTEM_PROMPT: &'static str = r#"You are a professional literary translator working on serialized fiction.

## Your Role
- Translate each chapter part into natural, fluent {target_language}
- Preserve tone, voice, humor and the author's paragraph structure
- Keep names, places and specialized terms consistent with the translations you are given
- Never summarize, skip or add content

## Formatting
- Keep paragraph breaks exactly where they are in the source
- Keep headings, scene separators and emphasis markers
- Render honorifics and sound effects consistently across the whole work"#;

    pub const CHARACTER_INSTRUCTION: &'static str = "{number}. \"characters\": every named character in this part with the original name, \
the {target_language} name you used and the gender when the text makes it clear (male, female or not_clear). \
Reuse existing character translations exactly.\n";

    pub const PLACES_INSTRUCTION: &'static str = "{number}. \"places\": every named location in this part with the original name \
and the {target_language} name you used. Reuse existing place translations exactly.\n";

    pub const TERMS_INSTRUCTION: &'static str = "{number}. \"terms\": specialized terms such as spells, weapons, skills, techniques, \
abilities, items and artifacts, with the original term, your translation and its category. \
Reuse existing term translations exactly.\n";

    pub const NOTES_DETAILED_INSTRUCTION: &'static str = "{number}. \"notes\": short translation notes worth remembering for later \
chapters (speech patterns, relationships, recurring wordplay, style decisions). Use action add for a new note, update to \
change an existing key and delete to drop a note that no longer applies.\n";

    pub const NOTES_MANAGEMENT_INSTRUCTION: &'static str = "Keep notes brief and reuse existing keys when refining a note instead of \
creating near-duplicates.\n";

    pub const NOTES_REMINDER: &'static str = "Only emit notes that change something; an empty notes list is fine.\n";

    pub const BASE_INSTRUCTION: &'static str = "Translate the text between [START] and [END] into {target_language}.\n";

    pub const ENDING_INSTRUCTION: &'static str = "Translate the complete text. Do not stop early and do not add commentary.";

    pub const COMPLETE_TRANSLATION_INSTRUCTION: &'static str = "{number}. \"complete_translation\": the full translated text \
of this part, with the original paragraph breaks.\n";

    /// Load templates from a JSON file, falling back to defaults for missing keys
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read prompt templates: {}", path.display()))?;
        serde_json::from_str(&content)
            .with_context(|| format!("Failed to parse prompt templates: {}", path.display()))
    }

    /// Substitute `{number}` and `{target_language}` in a template
    pub fn render(template: &str, number: usize, target_language: &str) -> String {
        template
            .replace("{number}", &number.to_string())
            .replace("{target_language}", target_language)
    }
}

impl Default for PromptTemplates {
    fn default() -> Self {
        Self {
            system_prompt: Self::SYSTEM_PROMPT.to_string(),
            character_instruction: Self::CHARACTER_INSTRUCTION.to_string(),
            places_instruction: Self::PLACES_INSTRUCTION.to_string(),
            terms_instruction: Self::TERMS_INSTRUCTION.to_string(),
            notes_detailed_instruction: Self::NOTES_DETAILED_INSTRUCTION.to_string(),
            notes_management_instruction: Self::NOTES_MANAGEMENT_INSTRUCTION.to_string(),
            notes_reminder: Self::NOTES_REMINDER.to_string(),
            base_instruction: Self::BASE_INSTRUCTION.to_string(),
            ending_instruction: Self::ENDING_INSTRUCTION.to_string(),
            complete_translation_instruction: Self::COMPLETE_TRANSLATION_INSTRUCTION.to_string(),
        }
    }
}
