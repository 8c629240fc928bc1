//! Unicode cleanup for extracted text.
//!
//! Latin-script only: typographic ligatures are expanded, curly quotes and
//! dash variants map to ASCII, soft hyphens disappear and non-breaking or
//! exotic spaces become plain spaces.

/// Normalize one string.
///
/// # Example
///
/// ```
/// use pdf_catalog::text::normalize;
///
/// assert_eq!(normalize("e\u{FB03}cacy \u{201C}high\u{201D}\u{00A0}dose"), "efficacy \"high\" dose");
/// ```
pub fn normalize(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '\u{FB00}' => out.push_str("ff"),
            '\u{FB01}' => out.push_str("fi"),
            '\u{FB02}' => out.push_str("fl"),
            '\u{FB03}' => out.push_str("ffi"),
            '\u{FB04}' => out.push_str("ffl"),
            '\u{FB05}' | '\u{FB06}' => out.push_str("st"),
            '\u{2018}' | '\u{2019}' | '\u{201A}' | '\u{201B}' | '\u{2032}' => out.push('\''),
            '\u{201C}' | '\u{201D}' | '\u{201E}' | '\u{201F}' | '\u{2033}' => out.push('"'),
            '\u{2010}' | '\u{2011}' | '\u{2012}' | '\u{2013}' | '\u{2014}' | '\u{2015}'
            | '\u{2212}' => out.push('-'),
            '\u{2026}' => out.push_str("..."),
            '\u{00AD}' | '\u{200B}' | '\u{FEFF}' => {},
            '\u{00A0}' | '\u{2000}'..='\u{200A}' | '\u{202F}' | '\u{205F}' | '\u{3000}' => {
                out.push(' ')
            },
            _ => out.push(c),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ligatures() {
        assert_eq!(normalize("\u{FB01}rst \u{FB02}u \u{FB00}ect \u{FB04}e"), "first flu ffect ffle");
    }

    #[test]
    fn test_quotes_and_dashes() {
        assert_eq!(normalize("it\u{2019}s 10\u{2013}20 \u{2014} ok"), "it's 10-20 - ok");
    }

    #[test]
    fn test_invisible_and_space_variants() {
        assert_eq!(normalize("co\u{00AD}operate\u{200B}"), "cooperate");
        assert_eq!(normalize("5\u{202F}mg\u{00A0}dose"), "5 mg dose");
    }

    #[test]
    fn test_plain_text_untouched() {
        let text = "Plain ASCII, with punctuation: (a) 0.5 mL.";
        assert_eq!(normalize(text), text);
    }
}
