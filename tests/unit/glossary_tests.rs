/*!
 * Tests for the persistent glossary store
 */

use booktrans::translation::glossary::{
    Gender, GlossaryStore, NoteAction, ProposedCharacter, ProposedPlace, ProposedTerm, TermCategory,
};

use crate::common::create_temp_dir;

fn character(original: &str, translated: &str, gender: &str) -> ProposedCharacter {
    ProposedCharacter {
        original: Some(original.to_string()),
        translated: Some(translated.to_string()),
        gender: Some(gender.to_string()),
    }
}

#[test]
fn test_open_shouldNameFilesAfterDocumentAndCollection() {
    let dir = create_temp_dir().unwrap();
    let store = GlossaryStore::open(dir.path(), "novel");

    store.update_characters(&[character("アキラ", "Akira", "male")]);
    store.update_places(&[ProposedPlace {
        original: Some("東京".into()),
        translated: Some("Tokyo".into()),
    }]);

    assert!(dir.path().join("novel_characters.json").exists());
    assert!(dir.path().join("novel_places.json").exists());
    assert!(!dir.path().join("novel_terms.json").exists());
}

#[test]
fn test_open_withTwoDocuments_shouldKeepGlossariesApart() {
    let dir = create_temp_dir().unwrap();
    GlossaryStore::open(dir.path(), "first").update_characters(&[character("アキラ", "Akira", "male")]);

    let other = GlossaryStore::open(dir.path(), "second");

    assert!(other.character("アキラ").is_none());
    assert_eq!(GlossaryStore::open(dir.path(), "first").character("アキラ").unwrap().translated, "Akira");
}

#[test]
fn test_reopen_shouldPreserveInsertionOrder() {
    let dir = create_temp_dir().unwrap();
    let store = GlossaryStore::open(dir.path(), "book");
    store.update_characters(&[
        character("ミナ", "Mina", "female"),
        character("アキラ", "Akira", "male"),
        character("ケン", "Ken", "unknown"),
    ]);

    let reopened = GlossaryStore::open(dir.path(), "book");
    let snapshot = reopened.snapshot();
    let keys: Vec<&str> = snapshot.terms.characters.keys().collect();

    assert_eq!(keys, vec!["ミナ", "アキラ", "ケン"]);
    assert_eq!(reopened.character("ケン").unwrap().gender, Gender::NotClear);
}

#[test]
fn test_updateTerms_withRaceCategory_shouldStoreAsOther() {
    let store = GlossaryStore::in_memory();

    store.update_terms(&[ProposedTerm {
        original: Some("エルフ".into()),
        translated: Some("Elf".into()),
        category: Some("race".into()),
    }]);

    assert_eq!(store.term("エルフ").unwrap().category, TermCategory::Other);
}

#[test]
fn test_updateNotes_withDeleteOfUnknownKey_shouldChangeNothing() {
    let dir = create_temp_dir().unwrap();
    let store = GlossaryStore::open(dir.path(), "book");

    let report = store.update_notes(
        &[NoteAction {
            action: Some("delete".into()),
            key: Some("tone".into()),
            note: None,
        }],
        None,
    );

    assert!(!report.changed());
    assert!(!dir.path().join("book_notes.json").exists());
}

#[test]
fn test_updateNotes_afterReopen_shouldKeepNotes() {
    let dir = create_temp_dir().unwrap();
    GlossaryStore::open(dir.path(), "book").update_notes(
        &[NoteAction {
            action: Some("add".into()),
            key: Some("honorifics".into()),
            note: Some("keep -san".into()),
        }],
        None,
    );

    let reopened = GlossaryStore::open(dir.path(), "book");

    assert_eq!(reopened.note("honorifics").as_deref(), Some("keep -san"));
}
