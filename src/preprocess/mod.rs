//! Text normalization pipelines applied to summaries and queries before embedding.
//!
//! Six fixed pipelines are selected by an integer option:
//!
//! | code | pipeline |
//! |---|---|
//! | 0 | none |
//! | 1 | lemmatize |
//! | 2 | stem |
//! | 3 | remove stopwords |
//! | 4 | remove stopwords, then stem |
//! | 5 | remove stopwords, then lemmatize |
//!
//! The same function normalizes the corpus and the queries, so a query always
//! lands in the vocabulary its index was built from.

mod lemmatize;
mod stopwords;

use std::fmt;

use rayon::prelude::*;
use rust_stemmers::{Algorithm, Stemmer};
use serde::{Deserialize, Serialize};

pub use lemmatize::lemmatize_word;
pub use stopwords::is_stopword;

/// Word-level transformation applied after optional stopword removal.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum WordTransform {
    Identity,
    Lemmatize,
    Stem,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub enum PreprocessOption {
    None = 0,
    Lemmatize = 1,
    Stem = 2,
    RemoveStopwords = 3,
    StopwordsStem = 4,
    StopwordsLemmatize = 5,
}

#[derive(Debug, thiserror::Error)]
#[error("Unknown preprocessing option {0}: expected 0..=5")]
pub struct InvalidOption(pub u8);

impl PreprocessOption {
    pub const ALL: [PreprocessOption; 6] = [
        PreprocessOption::None,
        PreprocessOption::Lemmatize,
        PreprocessOption::Stem,
        PreprocessOption::RemoveStopwords,
        PreprocessOption::StopwordsStem,
        PreprocessOption::StopwordsLemmatize,
    ];

    pub fn code(self) -> u8 {
        self as u8
    }

    pub fn removes_stopwords(self) -> bool {
        matches!(
            self,
            PreprocessOption::RemoveStopwords
                | PreprocessOption::StopwordsStem
                | PreprocessOption::StopwordsLemmatize
        )
    }

    fn transform(self) -> WordTransform {
        match self {
            PreprocessOption::Lemmatize | PreprocessOption::StopwordsLemmatize => {
                WordTransform::Lemmatize
            }
            PreprocessOption::Stem | PreprocessOption::StopwordsStem => WordTransform::Stem,
            PreprocessOption::None | PreprocessOption::RemoveStopwords => WordTransform::Identity,
        }
    }

    pub fn describe(self) -> &'static str {
        match self {
            PreprocessOption::None => "none",
            PreprocessOption::Lemmatize => "lemmatize",
            PreprocessOption::Stem => "stem",
            PreprocessOption::RemoveStopwords => "remove stopwords",
            PreprocessOption::StopwordsStem => "remove stopwords + stem",
            PreprocessOption::StopwordsLemmatize => "remove stopwords + lemmatize",
        }
    }
}

impl TryFrom<u8> for PreprocessOption {
    type Error = InvalidOption;

    fn try_from(code: u8) -> Result<Self, Self::Error> {
        PreprocessOption::ALL
            .get(code as usize)
            .copied()
            .ok_or(InvalidOption(code))
    }
}

impl From<PreprocessOption> for u8 {
    fn from(option: PreprocessOption) -> Self {
        option.code()
    }
}

impl fmt::Display for PreprocessOption {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.code())
    }
}

/// Applies a [`PreprocessOption`] to already-cleaned text.
pub struct TextNormalizer {
    stemmer: Stemmer,
}

impl TextNormalizer {
    pub fn new() -> Self {
        Self {
            stemmer: Stemmer::create(Algorithm::English),
        }
    }

    /// Normalize one cleaned text (whitespace separated, lowercase tokens).
    pub fn normalize(&self, option: PreprocessOption, text: &str) -> String {
        if option == PreprocessOption::None {
            return text.split_whitespace().collect::<Vec<_>>().join(" ");
        }

        let transform = option.transform();
        text.split_whitespace()
            .filter(|word| !(option.removes_stopwords() && is_stopword(word)))
            .map(|word| match transform {
                WordTransform::Identity => word.to_string(),
                WordTransform::Lemmatize => lemmatize_word(word),
                WordTransform::Stem => self.stemmer.stem(word).into_owned(),
            })
            .collect::<Vec<_>>()
            .join(" ")
    }

    /// Normalize a whole corpus, preserving order.
    pub fn normalize_corpus(&self, option: PreprocessOption, texts: &[String]) -> Vec<String> {
        texts
            .par_iter()
            .map(|text| self.normalize(option, text))
            .collect()
    }
}

impl Default for TextNormalizer {
    fn default() -> Self {
        Self::new()
    }
}
