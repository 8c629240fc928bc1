//! Word-frequency lexicon used by spacing repair and dehyphenation.
//!
//! The bundled list (`data/english_words.txt`) holds common English words,
//! most frequent first, with a tail of vocabulary frequent in drug labels and
//! scientific articles. A word's cost is `ln((rank + 1) * ln N)`, so frequent
//! words are cheap and a segmentation minimizing total cost prefers few,
//! common words.

use std::collections::HashMap;

use lazy_static::lazy_static;

const ENGLISH_WORDS: &str = include_str!("data/english_words.txt");

/// Extra cost for a word only known through suffix stripping.
const INFLECTION_PENALTY: f64 = 1.5;

/// Inflectional suffixes tried by [`Lexicon::stem_rank`], longest first.
const SUFFIXES: &[&str] = &["ers", "ing", "est", "es", "ed", "ly", "er", "s", "d"];

lazy_static! {
    static ref ENGLISH: Lexicon = Lexicon::from_ranked_words(ENGLISH_WORDS.lines());
}

/// Ranked word list.
#[derive(Debug, Clone, Default)]
pub struct Lexicon {
    ranks: HashMap<String, usize>,
    max_len: usize,
}

impl Lexicon {
    /// The bundled English lexicon.
    pub fn english() -> &'static Lexicon {
        &ENGLISH
    }

    /// Build from words in frequency order. Blank lines and repeats are skipped.
    pub fn from_ranked_words<'a, I>(words: I) -> Self
    where
        I: IntoIterator<Item = &'a str>,
    {
        let mut ranks = HashMap::new();
        let mut max_len = 0;
        for word in words.into_iter().map(str::trim).filter(|w| !w.is_empty()) {
            let word = word.to_lowercase();
            if ranks.contains_key(&word) {
                continue;
            }
            max_len = max_len.max(word.chars().count());
            let rank = ranks.len();
            ranks.insert(word, rank);
        }
        Self { ranks, max_len }
    }

    /// Number of words.
    pub fn len(&self) -> usize {
        self.ranks.len()
    }

    /// Is the lexicon empty?
    pub fn is_empty(&self) -> bool {
        self.ranks.is_empty()
    }

    /// Longest word, in characters.
    pub fn max_word_len(&self) -> usize {
        self.max_len
    }

    /// Frequency rank of an exact (lowercase) word.
    pub fn rank(&self, word: &str) -> Option<usize> {
        self.ranks.get(word).copied()
    }

    /// Rank of the word itself, or of its stem after removing an inflection.
    pub fn stem_rank(&self, word: &str) -> Option<(usize, bool)> {
        if let Some(rank) = self.rank(word) {
            return Some((rank, false));
        }
        SUFFIXES.iter().find_map(|suffix| {
            let stem = word.strip_suffix(suffix)?;
            if stem.chars().count() < 3 {
                return None;
            }
            self.rank(stem)
                .or_else(|| {
                    // "used" -> "use", "coding" -> "code"
                    matches!(*suffix, "ed" | "er" | "es" | "est" | "ing")
                        .then(|| self.rank(&format!("{}e", stem)))
                        .flatten()
                })
                .map(|rank| (rank, true))
        })
    }

    /// Is the (lowercase) word known, directly or through an inflection?
    pub fn is_known(&self, word: &str) -> bool {
        self.stem_rank(word).is_some()
    }

    /// Segmentation cost of a word, `None` when unknown.
    pub fn cost(&self, word: &str) -> Option<f64> {
        let (rank, inflected) = self.stem_rank(word)?;
        let n = (self.len().max(2)) as f64;
        let base = ((rank + 1) as f64 * n.ln()).ln();
        Some(if inflected {
            base + INFLECTION_PENALTY
        } else {
            base
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_english_lexicon_loaded() {
        let lexicon = Lexicon::english();
        assert!(lexicon.len() > 1500);
        assert_eq!(lexicon.rank("the"), Some(0));
        assert!(lexicon.is_known("highlights"));
        assert!(!lexicon.is_known("thesehighlights"));
    }

    #[test]
    fn test_frequent_words_are_cheaper() {
        let lexicon = Lexicon::english();
        assert!(lexicon.cost("the").unwrap() < lexicon.cost("include").unwrap());
        assert!(lexicon.cost("qqqq").is_none());
    }

    #[test]
    fn test_inflections() {
        let lexicon = Lexicon::from_ranked_words(["test", "use", "light"]);
        assert_eq!(lexicon.stem_rank("tested"), Some((0, true)));
        assert_eq!(lexicon.stem_rank("used"), Some((1, true)));
        assert_eq!(lexicon.stem_rank("lights"), Some((2, true)));
        assert!(lexicon.cost("lights").unwrap() > lexicon.cost("light").unwrap());
        assert_eq!(lexicon.stem_rank("us"), None);
        assert_eq!(lexicon.stem_rank("testing"), Some((0, true)));
    }

    #[test]
    fn test_repeats_keep_first_rank() {
        let lexicon = Lexicon::from_ranked_words(["a", "", "B", "a", "c"]);
        assert_eq!(lexicon.len(), 3);
        assert_eq!(lexicon.rank("b"), Some(1));
        assert_eq!(lexicon.rank("c"), Some(2));
        assert_eq!(lexicon.max_word_len(), 1);
    }
}
