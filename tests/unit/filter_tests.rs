/*!
 * Tests for glossary relevance filtering
 */

use booktrans::translation::filter::{FilterCategories, MatchKind, RelevanceFilter};
use booktrans::translation::glossary::{CharacterEntry, Gender, GlossarySubset, TermCategory, TermEntry};

fn glossary() -> GlossarySubset {
    let mut subset = GlossarySubset::default();
    subset.characters.insert(
        "佐藤アキラ",
        CharacterEntry {
            translated: "Akira Sato".into(),
            gender: Gender::Male,
        },
    );
    subset.characters.insert(
        "ミナ",
        CharacterEntry {
            translated: "Mina".into(),
            gender: Gender::Female,
        },
    );
    subset.places.insert("東京都庁", "Tokyo Metropolitan Government".to_string());
    subset.places.insert("王都", "Royal Capital".to_string());
    subset.terms.insert(
        "火炎魔法",
        TermEntry {
            translated: "Fire Magic".into(),
            category: TermCategory::Spell,
        },
    );
    subset
}

const CHUNK: &str = "アキラが笑った。火炎が舞い、王都へ向かった。東京に行った。";

#[test]
fn test_filter_withMixedGlossary_shouldKeepOnlyRelevantEntries() {
    let outcome = RelevanceFilter::default().filter(CHUNK, &glossary(), FilterCategories::default());

    assert_eq!(outcome.subset.characters.keys().collect::<Vec<_>>(), vec!["佐藤アキラ"]);
    assert_eq!(outcome.subset.places.keys().collect::<Vec<_>>(), vec!["王都"]);
    assert_eq!(outcome.subset.terms.keys().collect::<Vec<_>>(), vec!["火炎魔法"]);
}

#[test]
fn test_filter_shouldExplainEachMatch() {
    let outcome = RelevanceFilter::default().filter(CHUNK, &glossary(), FilterCategories::default());

    let character = &outcome.traces.characters[0];
    assert_eq!(character.matched, "アキラ");
    assert_eq!(character.kind, MatchKind::NamePart);

    let place = &outcome.traces.places[0];
    assert_eq!(place.kind, MatchKind::Exact);

    let term = &outcome.traces.terms[0];
    assert_eq!(term.matched, "火炎");
    assert_eq!(term.kind, MatchKind::Prefix);
}

#[test]
fn test_filter_withPlaces_shouldNotUseHalfMatches() {
    let outcome = RelevanceFilter::default().filter("東京に行った。", &glossary(), FilterCategories::default());

    assert!(outcome.subset.places.is_empty());
}

#[test]
fn test_filter_withCharactersDisabled_shouldSendAllCharacters() {
    let categories = FilterCategories {
        characters: false,
        ..FilterCategories::default()
    };

    let outcome = RelevanceFilter::default().filter("無関係な文章。", &glossary(), categories);

    assert_eq!(outcome.subset.characters.len(), 2);
    assert!(outcome.traces.characters.is_empty());
    assert!(outcome.subset.terms.is_empty());
}

#[test]
fn test_filter_withHiraganaSpelling_shouldMatchKatakanaEntry() {
    let mut subset = GlossarySubset::default();
    subset.characters.insert(
        "ミナ",
        CharacterEntry {
            translated: "Mina".into(),
            gender: Gender::Female,
        },
    );

    let outcome = RelevanceFilter::default().filter("みなは眠った。", &subset, FilterCategories::default());

    assert_eq!(outcome.traces.characters[0].kind, MatchKind::Normalized);
}
