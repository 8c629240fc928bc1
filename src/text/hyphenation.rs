//! Line joining with dehyphenation.
//!
//! Block text is assembled line by line. Where a line ends in a hyphen the
//! next line may continue the same word (`Govern-` + `ment`) or a hyphenated
//! compound (`content-` + `coding`). The [`HyphenationHandler`] decides:
//!
//! - a soft hyphen (U+00AD) always marks a break inside a word: join without it
//! - a hard hyphen after a compound prefix (`self-`, `non-`, `anti-` ...), or
//!   before a digit or capital, is part of the text: join keeping the hyphen
//! - otherwise join without the hyphen when the joined word is known or the
//!   continuation alone is not a word, and keep the hyphen when both halves
//!   are words but the whole is not
//!
//! Lines that do not end in a hyphen are joined with a single space.

use super::lexicon::Lexicon;

/// Prefixes that form hyphenated compounds.
const COMPOUND_PREFIXES: &[&str] = &[
    "self", "non", "anti", "pre", "post", "re", "co", "ex", "multi", "semi", "sub", "super",
    "ultra", "under", "over", "cross", "inter", "intra", "counter", "mid", "well", "ill", "all",
    "half", "high", "low", "full", "part", "short", "long", "first", "second", "third", "one",
    "two", "three", "dose", "time", "placebo", "age",
];

/// How two consecutive lines are glued.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LineJoin {
    /// Single space between the lines
    Space,
    /// Drop the trailing hyphen and join without a space
    Dehyphenate,
    /// Keep the trailing hyphen and join without a space
    Compound,
}

/// Joins extracted lines, repairing words broken across line ends.
#[derive(Debug, Clone)]
pub struct HyphenationHandler {
    lexicon: &'static Lexicon,
    /// Continuations shorter than this are never joined (list markers, stray letters)
    min_continuation_len: usize,
}

impl Default for HyphenationHandler {
    fn default() -> Self {
        Self::new()
    }
}

impl HyphenationHandler {
    /// Handler over the bundled English lexicon.
    pub fn new() -> Self {
        Self {
            lexicon: Lexicon::english(),
            min_continuation_len: 2,
        }
    }

    /// Set the minimum continuation length.
    pub fn with_min_continuation_len(mut self, len: usize) -> Self {
        self.min_continuation_len = len;
        self
    }

    /// Decide how `line` and the following `next` line are joined.
    pub fn classify(&self, line: &str, next: &str) -> LineJoin {
        let line = line.trim_end();
        let soft = line.ends_with('\u{00AD}');
        let Some(head) = line.strip_suffix('\u{00AD}').or_else(|| line.strip_suffix('-')) else {
            return LineJoin::Space;
        };
        let last_word: &str = head
            .rsplit(|c: char| !c.is_alphabetic())
            .next()
            .unwrap_or_default();
        if last_word.is_empty() {
            return LineJoin::Space;
        }
        let continuation: &str = next
            .trim_start()
            .split(|c: char| !c.is_alphanumeric())
            .next()
            .unwrap_or_default();
        if continuation.chars().count() < self.min_continuation_len {
            return LineJoin::Space;
        }
        if soft {
            return LineJoin::Dehyphenate;
        }

        let first_lower = last_word.to_lowercase();
        let starts_upper_or_digit = continuation
            .chars()
            .next()
            .is_some_and(|c| c.is_uppercase() || c.is_ascii_digit());
        if COMPOUND_PREFIXES.contains(&first_lower.as_str()) || starts_upper_or_digit {
            return LineJoin::Compound;
        }

        let cont_lower = continuation.to_lowercase();
        let joined = format!("{}{}", first_lower, cont_lower);
        if self.lexicon.is_known(&joined) || !self.lexicon.is_known(&cont_lower) {
            LineJoin::Dehyphenate
        } else if self.lexicon.is_known(&first_lower) {
            LineJoin::Compound
        } else {
            LineJoin::Dehyphenate
        }
    }

    /// Join lines into one paragraph.
    ///
    /// # Example
    ///
    /// ```
    /// use pdf_catalog::text::HyphenationHandler;
    ///
    /// let handler = HyphenationHandler::new();
    /// assert_eq!(
    ///     handler.join_lines(&["The Govern-", "ment issued a", "self-", "assessment."]),
    ///     "The Government issued a self-assessment."
    /// );
    /// ```
    pub fn join_lines<S: AsRef<str>>(&self, lines: &[S]) -> String {
        let mut out = String::new();
        let lines: Vec<&str> = lines
            .iter()
            .map(|l| l.as_ref().trim())
            .filter(|l| !l.is_empty())
            .collect();
        for (i, line) in lines.iter().enumerate() {
            let Some(next) = lines.get(i + 1) else {
                out.push_str(line);
                break;
            };
            match self.classify(line, next) {
                LineJoin::Space => {
                    out.push_str(line);
                    out.push(' ');
                },
                LineJoin::Dehyphenate => {
                    let cut = line
                        .strip_suffix('\u{00AD}')
                        .or_else(|| line.strip_suffix('-'))
                        .unwrap_or(line);
                    out.push_str(cut);
                },
                LineJoin::Compound => out.push_str(line),
            }
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn classify(line: &str, next: &str) -> LineJoin {
        HyphenationHandler::new().classify(line, next)
    }

    #[test]
    fn test_plain_lines_get_a_space() {
        assert_eq!(classify("no hyphen", "here"), LineJoin::Space);
        assert_eq!(classify("- bullet", "next"), LineJoin::Space);
        assert_eq!(classify("123-", "456"), LineJoin::Space);
    }

    #[test]
    fn test_split_words_are_joined() {
        assert_eq!(classify("Govern-", "ment of the"), LineJoin::Dehyphenate);
        assert_eq!(classify("the state-", "ment today"), LineJoin::Dehyphenate);
        assert_eq!(classify("pharmaco-", "kinetic data"), LineJoin::Dehyphenate);
    }

    #[test]
    fn test_compounds_keep_hyphen() {
        assert_eq!(classify("self-", "regulation"), LineJoin::Compound);
        assert_eq!(classify("content-", "coding"), LineJoin::Compound);
        assert_eq!(classify("COVID-", "19 vaccine"), LineJoin::Compound);
    }

    #[test]
    fn test_soft_hyphen_always_joins() {
        assert_eq!(classify("self\u{00AD}", "regulation"), LineJoin::Dehyphenate);
        let handler = HyphenationHandler::new();
        assert_eq!(handler.join_lines(&["busi\u{00AD}", "ness today"]), "business today");
    }

    #[test]
    fn test_short_continuation_not_joined() {
        assert_eq!(classify("item-", "a"), LineJoin::Space);
    }

    #[test]
    fn test_join_lines_skips_blank_lines() {
        let handler = HyphenationHandler::new();
        assert_eq!(handler.join_lines(&["one", "  ", "two"]), "one two");
        assert_eq!(handler.join_lines::<&str>(&[]), "");
    }
}
