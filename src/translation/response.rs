/*!
 * Extraction and validation of the structured model response.
 */

use log::debug;
use once_cell::sync::Lazy;
use regex::Regex;
use serde::de::DeserializeOwned;
use serde_json::{Map, Value};

use crate::errors::ProviderError;
use crate::translation::glossary::{NoteAction, ProposedCharacter, ProposedPlace, ProposedTerm};

/// Field every valid response must carry
pub const TRANSLATION_FIELD: &str = "complete_translation";

/// Fenced block, optionally labelled json
static FENCED_JSON: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?s)```(?:json)?\s*(\{.*?\})\s*```").unwrap()
});

static BARE_JSON: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?s)(\{.*\})").unwrap()
});

/// Decoded model response
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TranslationPayload {
    pub complete_translation: String,
    pub characters: Vec<ProposedCharacter>,
    pub places: Vec<ProposedPlace>,
    pub terms: Vec<ProposedTerm>,
    pub notes: Vec<NoteAction>,
}

/// Locate the JSON object in a response: the last fenced block if any,
/// otherwise the span from the first `{` to the last `}`.
pub fn extract_json(response: &str) -> Option<&str> {
    if let Some(block) = FENCED_JSON.captures_iter(response).last() {
        return block.get(1).map(|m| m.as_str());
    }
    BARE_JSON.captures(response).and_then(|c| c.get(1)).map(|m| m.as_str())
}

fn items<T: DeserializeOwned>(object: &Map<String, Value>, field: &str) -> Vec<T> {
    let Some(Value::Array(values)) = object.get(field) else {
        return Vec::new();
    };
    values
        .iter()
        .filter(|v| v.is_object())
        .filter_map(|v| match serde_json::from_value(v.clone()) {
            Ok(item) => Some(item),
            Err(e) => {
                debug!("Skipping unusable {} entry: {}", field, e);
                None
            }
        })
        .collect()
}

/// Parse a raw response into a payload, or classify why it is unusable.
pub fn parse_response(response: &str) -> Result<TranslationPayload, ProviderError> {
    let json = extract_json(response)
        .ok_or_else(|| ProviderError::MalformedResponse("no JSON object found in response".to_string()))?;

    let value: Value =
        serde_json::from_str(json).map_err(|e| ProviderError::MalformedResponse(format!("JSON parse error: {}", e)))?;

    let Value::Object(object) = value else {
        return Err(ProviderError::MalformedResponse("response JSON is not an object".to_string()));
    };

    let complete_translation = match object.get(TRANSLATION_FIELD) {
        Some(Value::String(text)) => text.clone(),
        _ => return Err(ProviderError::MissingField(TRANSLATION_FIELD.to_string())),
    };

    Ok(TranslationPayload {
        complete_translation,
        characters: items(&object, "characters"),
        places: items(&object, "places"),
        terms: items(&object, "terms"),
        notes: items(&object, "notes"),
    })
}
