/*!
 * Prompt assembly for chunk translation.
 *
 * This module provides:
 * - Prompt templates with file overrides
 * - Rendering of glossary, notes and prior context into chat messages
 * - The default message layout used for every chunk
 */

pub mod templates;

use serde_json::Value;
use std::fmt::Debug;

use crate::providers::ChatMessage;
use crate::translation::glossary::{CharacterEntry, GlossarySubset, OrderedEntries, TermEntry};

pub use templates::PromptTemplates;

/// A previously translated chapter sent for context
#[derive(Debug, Clone, PartialEq)]
pub struct ChapterContext {
    pub chapter_number: u32,
    pub original: String,
    pub translated: String,
}

/// An earlier chunk of the chapter being translated
#[derive(Debug, Clone, PartialEq)]
pub struct ChunkContext {
    pub original: String,
    pub translated: String,
}

/// Everything the assembler needs for one chunk
#[derive(Debug, Clone, Copy)]
pub struct PromptInput<'a> {
    pub chunk_text: &'a str,
    pub glossary: &'a GlossarySubset,
    pub notes: &'a OrderedEntries<String>,
    pub previous_chapters: &'a [ChapterContext],
    pub previous_chunks: &'a [ChunkContext],
}

/// Builds the ordered message list for a chunk
pub trait PromptAssembler: Send + Sync + Debug {
    fn assemble(&self, input: &PromptInput<'_>) -> Vec<ChatMessage>;
}

/// Switches that shape the default prompt
#[derive(Debug, Clone, PartialEq)]
pub struct PromptOptions {
    pub context_mode: bool,
    pub notes_mode: bool,
    /// Put the numbered instructions and JSON format in the final user
    /// message instead of the system prompt
    pub power_steering: bool,
    pub target_language: String,
}

impl Default for PromptOptions {
    fn default() -> Self {
        Self {
            context_mode: true,
            notes_mode: false,
            power_steering: false,
            target_language: "English".to_string(),
        }
    }
}

pub fn character_prompt(characters: &OrderedEntries<CharacterEntry>) -> Option<String> {
    if characters.is_empty() {
        return None;
    }
    let lines: Vec<String> = characters
        .iter()
        .map(|(original, entry)| format!("{} : {} : {}", original, entry.translated, entry.gender.as_str()))
        .collect();
    Some(format!("Existing Character Translations:\n{}\n\n", lines.join("\n")))
}

pub fn place_prompt(places: &OrderedEntries<String>) -> Option<String> {
    if places.is_empty() {
        return None;
    }
    let lines: Vec<String> = places
        .iter()
        .map(|(original, translated)| format!("{} : {}", original, translated))
        .collect();
    Some(format!("Existing Place Translations:\n{}\n\n", lines.join("\n")))
}

pub fn terms_prompt(terms: &OrderedEntries<TermEntry>) -> Option<String> {
    if terms.is_empty() {
        return None;
    }
    let lines: Vec<String> = terms
        .iter()
        .map(|(original, entry)| format!("{} : {} : {}", original, entry.translated, entry.category.as_str()))
        .collect();
    Some(format!("Existing Specialized Term Translations:\n{}\n\n", lines.join("\n")))
}

pub fn notes_prompt(notes: &OrderedEntries<String>) -> Option<String> {
    if notes.is_empty() {
        return None;
    }
    let lines: Vec<String> = notes.iter().map(|(key, note)| format!("{} = {}", key, note)).collect();
    Some(format!("Important Translation Notes:\n{}\n\n", lines.join("\n")))
}

/// `{"complete_translation": "..."}` as an assistant turn
fn translation_turn(translated: &str) -> ChatMessage {
    ChatMessage::assistant(format!(
        "{{\"complete_translation\": {}}}",
        Value::String(translated.to_string())
    ))
}

/// Instruction pieces derived from the options
struct Instructions {
    /// Final user message
    user: String,
    /// Appended to the system prompt when power steering is off
    system_additions: String,
}

/// The assembler used by the CLI
#[derive(Debug, Clone, Default)]
pub struct DefaultPromptAssembler {
    options: PromptOptions,
    templates: PromptTemplates,
}

impl DefaultPromptAssembler {
    pub fn new(options: PromptOptions, templates: PromptTemplates) -> Self {
        Self { options, templates }
    }

    pub fn options(&self) -> &PromptOptions {
        &self.options
    }

    fn render(&self, template: &str, number: usize) -> String {
        PromptTemplates::render(template, number, &self.options.target_language)
    }

    /// JSON schema example, keys in the order the model must emit them
    fn json_schema(&self) -> String {
        let mut schema: OrderedEntries<Value> = OrderedEntries::new();
        if self.options.context_mode {
            schema.insert(
                "characters",
                serde_json::json!([{"original": "original_name", "translated": "translated_name", "gender": "male/female/not_clear"}]),
            );
            schema.insert(
                "places",
                serde_json::json!([{"original": "original_place", "translated": "translated_place"}]),
            );
            schema.insert(
                "terms",
                serde_json::json!([{"original": "original_term", "translated": "translated_term", "category": "spell/weapon/skill/technique/ability/item/artifact/other"}]),
            );
        }
        if self.options.notes_mode {
            schema.insert(
                "notes",
                serde_json::json!([{"action": "add/update/delete", "key": "short_identifier", "note": "brief_note_content (not needed for delete action)"}]),
            );
        }
        schema.insert("complete_translation", Value::String("the_translated_text_here".to_string()));
        serde_json::to_string_pretty(&schema).unwrap_or_default()
    }

    fn instructions(&self) -> Instructions {
        let t = &self.templates;
        let mut numbered = Vec::new();

        if self.options.context_mode {
            for template in [&t.character_instruction, &t.places_instruction, &t.terms_instruction] {
                numbered.push(self.render(template, numbered.len() + 1));
            }
        }
        if self.options.notes_mode {
            numbered.push(self.render(&t.notes_detailed_instruction, numbered.len() + 1));
        }
        numbered.push(self.render(&t.complete_translation_instruction, numbered.len() + 1));

        let management = if self.options.notes_mode { t.notes_management_instruction.as_str() } else { "" };
        let reminder = if self.options.notes_mode { t.notes_reminder.as_str() } else { "" };
        let json_format = format!(
            "Respond in utf-8 encoding with ONLY a VALID JSON object in this format:\n```json\n{}\n```\n{}",
            self.json_schema(),
            reminder
        );
        let base = self.render(&t.base_instruction, 0);
        let ending = self.render(&t.ending_instruction, 0);

        if self.options.power_steering {
            Instructions {
                user: format!(
                    "{}ALWAYS list in this EXACT ORDER:\n{}\n{}\n{}\n{}",
                    base,
                    numbered.concat(),
                    management,
                    json_format,
                    ending
                ),
                system_additions: String::new(),
            }
        } else {
            Instructions {
                user: format!("{}{}", base, ending),
                system_additions: format!(
                    "\n\nALWAYS list in this EXACT ORDER:\n{}{}\n\n\n{}",
                    numbered.concat(),
                    management,
                    json_format
                ),
            }
        }
    }
}

impl PromptAssembler for DefaultPromptAssembler {
    fn assemble(&self, input: &PromptInput<'_>) -> Vec<ChatMessage> {
        let instructions = self.instructions();
        let system = format!("{}{}", self.render(&self.templates.system_prompt, 0), instructions.system_additions);
        let mut messages = vec![ChatMessage::system(system)];

        if self.options.context_mode {
            let glossary = input.glossary;
            let prompts = [
                character_prompt(&glossary.characters),
                place_prompt(&glossary.places),
                terms_prompt(&glossary.terms),
            ];
            messages.extend(prompts.into_iter().flatten().map(ChatMessage::user));
        }

        if self.options.notes_mode {
            if let Some(notes) = notes_prompt(input.notes) {
                messages.push(ChatMessage::user(notes));
            }
        }

        for chapter in input.previous_chapters {
            messages.push(ChatMessage::user(format!(
                "PREVIOUS CHAPTER {} (for context only):\n{}",
                chapter.chapter_number, chapter.original
            )));
            messages.push(translation_turn(&chapter.translated));
        }

        for chunk in input.previous_chunks {
            messages.push(ChatMessage::user(format!("CURRENT CHAPTER - PREVIOUS PART:\n{}", chunk.original)));
            messages.push(translation_turn(&chunk.translated));
        }

        messages.push(ChatMessage::user(format!(
            "CURRENT CHAPTER - TEXT TO TRANSLATE:\n```[START]\n{}\n```[END]",
            input.chunk_text
        )));
        messages.push(ChatMessage::user(instructions.user));
        messages
    }
}
