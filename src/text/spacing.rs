//! Spacing repair for text extracted without word boundaries.
//!
//! Some PDFs position every glyph explicitly and never emit space characters,
//! so their embedded text comes out as `Thesehighlightsdonotincludeall`. The
//! [`SpacingRepairer`] splits such runs into words with a dictionary
//! segmenter: among all ways to cut a run into lexicon words, it picks the one
//! with the lowest total word cost (see [`Lexicon::cost`]).
//!
//! Repair is conservative. It only ever inserts spaces, so every character of
//! the input survives in order, and existing whitespace is kept verbatim.
//! Tokens are left alone when they are:
//!
//! - four characters or shorter
//! - ALL-CAPS and at least six characters long
//! - mixed-case past the first letter (`mRNA`, `iPhone`)
//! - in the preserve set (domain nouns, configurable)
//! - hyphenated, numeric or otherwise not purely alphabetic
//! - already a known word (directly or through an inflection)
//!
//! A segmentation is rejected when it needs a single-letter word other than
//! `a`/`i`, a two-letter word outside a small function-word set, or more than
//! one word per three characters.

use std::collections::HashSet;

use super::lexicon::Lexicon;

/// Domain nouns never split by default.
pub const DEFAULT_PRESERVE_TERMS: &[&str] = &[
    "flublok",
    "influenza",
    "vaccine",
    "intramuscular",
    "immunization",
    "contraindications",
    "anaphylaxis",
    "administration",
    "prescribing",
    "hemagglutinin",
    "pharmacokinetics",
    "pharmacodynamics",
    "bioavailability",
    "immunogenicity",
    "hypersensitivity",
    "thrombocytopenia",
    "subcutaneous",
    "intravenous",
];

/// Two-letter words a segmentation may produce.
const TWO_LETTER_WORDS: &[&str] = &[
    "am", "an", "as", "at", "be", "by", "do", "go", "he", "if", "in", "is", "it", "me", "my",
    "no", "of", "on", "or", "so", "to", "up", "us", "we",
];

/// Tokens up to this many characters are never split.
const MIN_SPLIT_LEN: usize = 5;

/// ALL-CAPS tokens from this length are kept whole.
const CAPS_UNIT_LEN: usize = 6;

/// Dictionary-based word segmenter.
#[derive(Debug, Clone)]
pub struct SpacingRepairer {
    lexicon: &'static Lexicon,
    preserve: HashSet<String>,
}

impl Default for SpacingRepairer {
    fn default() -> Self {
        Self::new()
    }
}

impl SpacingRepairer {
    /// Repairer over the bundled English lexicon and default preserve set.
    pub fn new() -> Self {
        Self {
            lexicon: Lexicon::english(),
            preserve: DEFAULT_PRESERVE_TERMS.iter().map(|t| t.to_string()).collect(),
        }
    }

    /// Use a different lexicon.
    pub fn with_lexicon(mut self, lexicon: &'static Lexicon) -> Self {
        self.lexicon = lexicon;
        self
    }

    /// Add terms that must never be split (matched case-insensitively).
    pub fn with_preserve_terms<I, S>(mut self, terms: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        self.preserve
            .extend(terms.into_iter().map(|t| t.as_ref().to_lowercase()));
        self
    }

    /// Insert missing spaces into `text`.
    ///
    /// # Example
    ///
    /// ```
    /// use pdf_catalog::text::SpacingRepairer;
    ///
    /// let repairer = SpacingRepairer::new();
    /// assert_eq!(
    ///     repairer.repair("Thesehighlightsdonotincludeall"),
    ///     "These highlights do not include all"
    /// );
    /// assert_eq!(repairer.repair("mRNA vaccine"), "mRNA vaccine");
    /// ```
    pub fn repair(&self, text: &str) -> String {
        let punctuated = space_after_punctuation(text);
        let mut out = String::with_capacity(punctuated.len() + punctuated.len() / 4);
        let mut token = String::new();
        for c in punctuated.chars() {
            if c.is_whitespace() {
                if !token.is_empty() {
                    self.push_token(&token, &mut out);
                    token.clear();
                }
                out.push(c);
            } else {
                token.push(c);
            }
        }
        if !token.is_empty() {
            self.push_token(&token, &mut out);
        }
        out
    }

    fn push_token(&self, token: &str, out: &mut String) {
        // Split off leading/trailing punctuation such as quotes or a final period.
        let start = token
            .char_indices()
            .find(|(_, c)| c.is_alphanumeric())
            .map(|(i, _)| i);
        let Some(start) = start else {
            out.push_str(token);
            return;
        };
        let end = token
            .char_indices()
            .rev()
            .find(|(_, c)| c.is_alphanumeric())
            .map(|(i, c)| i + c.len_utf8())
            .unwrap_or(token.len());
        let core = &token[start..end];

        out.push_str(&token[..start]);
        match self.split_core(core) {
            Some(words) => out.push_str(&words.join(" ")),
            None => out.push_str(core),
        }
        out.push_str(&token[end..]);
    }

    /// Split one token into words, or `None` when it should stay as is.
    fn split_core<'t>(&self, core: &'t str) -> Option<Vec<&'t str>> {
        let chars: Vec<char> = core.chars().collect();
        if chars.len() < MIN_SPLIT_LEN || !chars.iter().all(|c| c.is_alphabetic()) {
            return None;
        }
        let has_lower = chars.iter().any(|c| c.is_lowercase());
        if !has_lower && chars.len() >= CAPS_UNIT_LEN {
            return None;
        }
        if has_lower && chars[1..].iter().any(|c| c.is_uppercase()) {
            return None;
        }
        let lower: String = chars
            .iter()
            .map(|c| c.to_lowercase().next().unwrap_or(*c))
            .collect();
        if self.preserve.contains(&lower) || self.lexicon.is_known(&lower) {
            return None;
        }

        let cuts = self.segment(&lower)?;
        if cuts.len() < 2 {
            return None;
        }
        // Cut positions are char offsets; slice the original to keep its case.
        let offsets: Vec<usize> = core.char_indices().map(|(i, _)| i).chain([core.len()]).collect();
        let mut words = Vec::with_capacity(cuts.len());
        let mut from = 0;
        for to in cuts {
            words.push(&core[offsets[from]..offsets[to]]);
            from = to;
        }
        log::trace!("spacing repair: {:?} -> {:?}", core, words);
        Some(words)
    }

    /// Cheapest segmentation of a lowercase run.
    ///
    /// Returns the end offset (in chars) of every word, or `None` when the run
    /// cannot be covered by acceptable words.
    pub fn segment(&self, lower: &str) -> Option<Vec<usize>> {
        let chars: Vec<char> = lower.chars().collect();
        let n = chars.len();
        let max_len = self.lexicon.max_word_len().max(1);
        let mut best: Vec<Option<(f64, usize)>> = vec![None; n + 1];
        best[0] = Some((0.0, 0));

        for end in 1..=n {
            for start in end.saturating_sub(max_len)..end {
                let Some((prefix_cost, _)) = best[start] else {
                    continue;
                };
                let piece: String = chars[start..end].iter().collect();
                let Some(cost) = self.piece_cost(&piece) else {
                    continue;
                };
                let total = prefix_cost + cost;
                if best[end].map_or(true, |(c, _)| total < c) {
                    best[end] = Some((total, start));
                }
            }
        }

        best[n]?;
        let mut cuts = Vec::new();
        let mut end = n;
        while end > 0 {
            cuts.push(end);
            end = best[end]?.1;
        }
        cuts.reverse();
        (cuts.len() * 3 <= n).then_some(cuts)
    }

    fn piece_cost(&self, piece: &str) -> Option<f64> {
        match piece.chars().count() {
            1 if piece != "a" && piece != "i" => None,
            2 if !TWO_LETTER_WORDS.contains(&piece) => None,
            _ => self.lexicon.cost(piece),
        }
    }
}

/// Insert a space after sentence punctuation glued to the next sentence
/// (`end.Next`) and after a comma, semicolon or colon glued to a word
/// (`one,two`). Numbers (`0.5`, `3:00`) and abbreviations (`e.g.`) are untouched.
fn space_after_punctuation(text: &str) -> String {
    let chars: Vec<char> = text.chars().collect();
    let mut out = String::with_capacity(text.len() + 8);
    for (i, &c) in chars.iter().enumerate() {
        out.push(c);
        let (Some(&prev), Some(&next)) = (i.checked_sub(1).and_then(|p| chars.get(p)), chars.get(i + 1))
        else {
            continue;
        };
        let glued = match c {
            '.' | '!' | '?' => prev.is_lowercase() && next.is_uppercase(),
            ',' | ';' | ':' => prev.is_alphabetic() && next.is_alphabetic(),
            _ => false,
        };
        if glued {
            out.push(' ');
        }
    }
    out
}
