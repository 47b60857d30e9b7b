//! Rule-based noun lemmatizer.
//!
//! Irregular plurals come from a fixed exception table; everything else goes
//! through suffix detachment. There is no dictionary check, so the rules are
//! deliberately conservative.

use std::collections::HashMap;

use once_cell::sync::Lazy;

static EXCEPTIONS: Lazy<HashMap<&'static str, &'static str>> = Lazy::new(|| {
    [
        ("children", "child"),
        ("people", "person"),
        ("men", "man"),
        ("women", "woman"),
        ("sportsmen", "sportsman"),
        ("sportswomen", "sportswoman"),
        ("businessmen", "businessman"),
        ("businesswomen", "businesswoman"),
        ("feet", "foot"),
        ("teeth", "tooth"),
        ("mice", "mouse"),
        ("geese", "goose"),
        ("lives", "life"),
        ("wives", "wife"),
        ("knives", "knife"),
        ("leaves", "leaf"),
        ("halves", "half"),
        ("wolves", "wolf"),
        ("selves", "self"),
        ("criteria", "criterion"),
        ("phenomena", "phenomenon"),
        ("analyses", "analysis"),
        ("series", "series"),
        ("species", "species"),
        ("news", "news"),
        ("gas", "gas"),
        ("sizes", "size"),
        ("prizes", "prize"),
        ("mazes", "maze"),
        ("specimen", "specimen"),
        ("specimens", "specimen"),
    ]
    .into_iter()
    .collect()
});

/// Suffix rules, longest first: (suffix, replacement).
const SUFFIX_RULES: &[(&str, &str)] = &[
    ("sses", "ss"),
    ("ches", "ch"),
    ("shes", "sh"),
    ("ies", "y"),
    ("xes", "x"),
    ("zes", "z"),
    ("men", "man"),
    ("s", ""),
];

/// Suffixes that look plural but usually are not.
const SINGULAR_ENDINGS: &[&str] = &["ss", "us", "is", "ous"];

pub fn lemmatize_word(word: &str) -> String {
    if let Some(lemma) = EXCEPTIONS.get(word) {
        return lemma.to_string();
    }

    if word.chars().count() <= 3 || !word.chars().all(|c| c.is_alphabetic()) {
        return word.to_string();
    }

    if SINGULAR_ENDINGS.iter().any(|end| word.ends_with(end)) {
        return word.to_string();
    }

    for (suffix, replacement) in SUFFIX_RULES {
        if let Some(stem) = word.strip_suffix(suffix) {
            if stem.chars().count() < 2 {
                continue;
            }
            return format!("{stem}{replacement}");
        }
    }

    word.to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_regular_plurals() {
        assert_eq!(lemmatize_word("influencers"), "influencer");
        assert_eq!(lemmatize_word("activists"), "activist");
        assert_eq!(lemmatize_word("stories"), "story");
        assert_eq!(lemmatize_word("churches"), "church");
        assert_eq!(lemmatize_word("dishes"), "dish");
        assert_eq!(lemmatize_word("boxes"), "box");
        assert_eq!(lemmatize_word("glasses"), "glass");
        assert_eq!(lemmatize_word("quizzes"), "quiz");
        assert_eq!(lemmatize_word("waltzes"), "waltz");
        assert_eq!(lemmatize_word("firemen"), "fireman");
        assert_eq!(lemmatize_word("fishermen"), "fisherman");
    }

    #[test]
    fn test_irregular_plurals() {
        assert_eq!(lemmatize_word("people"), "person");
        assert_eq!(lemmatize_word("women"), "woman");
        assert_eq!(lemmatize_word("children"), "child");
        assert_eq!(lemmatize_word("sizes"), "size");
        assert_eq!(lemmatize_word("specimen"), "specimen");
    }

    #[test]
    fn test_words_left_alone() {
        for word in [
            "bus", "fitness", "status", "analysis", "famous", "usa", "uk", "2024", "e", "omen",
        ] {
            assert_eq!(lemmatize_word(word), word, "word={word}");
        }
    }
}
