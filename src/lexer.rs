// Amount lexer
//
// The registers mix Roman numerals, single-letter unit abbreviations and
// multi-word currency names in free text. Instead of one monolithic pattern,
// the scanner produces typed tokens with byte spans, so the parser can both
// reason over token kinds and recover the exact raw substring of a match
// (raw extracted text is persisted verbatim for manual review).

use crate::numerals::is_roman_char;

/// First letters of the single-letter unit-of-count abbreviations
/// (libra, solidus, denarius, obolus, picta, maille).
const UNIT_PREFIXES: [char; 6] = ['l', 'd', 's', 'o', 'p', 'm'];

#[derive(Debug, Clone, PartialEq)]
pub enum TokenKind {
    /// Contiguous run of Roman numeral characters ("XII", "VM")
    Numeral(String),
    /// Lowercase word ("fl", "tur", "parvorum"); trailing dots are part of
    /// the span but not of the word
    Word(String),
    /// The literal arithmetic sign word "minus"
    Minus,
    /// Literal ':' separating the entry head from the amount segment
    Colon,
    /// Alphabetic run that is neither a numeral nor a lowercase word
    /// ("Item", "Anno"); never part of an amount
    Mixed,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Token {
    pub kind: TokenKind,
    /// Byte span in the scanned text, inclusive of absorbed trailing dots
    pub start: usize,
    pub end: usize,
}

impl Token {
    /// Word whose first letter is a unit-of-count abbreviation
    pub fn is_unit_word(&self) -> bool {
        match &self.kind {
            TokenKind::Word(w) => w.chars().next().is_some_and(|c| UNIT_PREFIXES.contains(&c)),
            _ => false,
        }
    }

    /// Word that can start or continue a currency name
    pub fn is_currency_word(&self) -> bool {
        matches!(&self.kind, TokenKind::Word(_)) && !self.is_unit_word()
    }

    pub fn is_numeral(&self) -> bool {
        matches!(&self.kind, TokenKind::Numeral(_))
    }

    pub fn is_word(&self) -> bool {
        matches!(&self.kind, TokenKind::Word(_))
    }
}

/// Tokenize one amount segment.
///
/// Maximal alphabetic runs are classified as a whole: all Roman characters
/// make a numeral, all lowercase makes a word (or the sign "minus"),
/// anything else is Mixed. A word's span absorbs the dots that follow it
/// ("tur." scans as Word("tur") with a 4-byte span). Everything else except
/// ':' is skipped.
pub fn tokenize(text: &str) -> Vec<Token> {
    let bytes = text.as_bytes();
    let mut tokens = Vec::new();
    let mut i = 0usize;

    while i < bytes.len() {
        let c = bytes[i] as char;

        if c == ':' {
            tokens.push(Token { kind: TokenKind::Colon, start: i, end: i + 1 });
            i += 1;
            continue;
        }

        if !c.is_ascii_alphabetic() {
            i += 1;
            continue;
        }

        // maximal alphabetic run
        let start = i;
        while i < bytes.len() && (bytes[i] as char).is_ascii_alphabetic() {
            i += 1;
        }
        let run = &text[start..i];

        let kind = if run.chars().all(is_roman_char) {
            TokenKind::Numeral(run.to_string())
        } else if run.chars().all(|c| c.is_ascii_lowercase()) {
            if run == "minus" {
                TokenKind::Minus
            } else {
                TokenKind::Word(run.to_string())
            }
        } else {
            TokenKind::Mixed
        };

        // words absorb trailing dots into their span
        let mut end = i;
        if matches!(kind, TokenKind::Word(_) | TokenKind::Minus) {
            while end < bytes.len() && bytes[end] == b'.' {
                end += 1;
            }
            i = end;
        }

        tokens.push(Token { kind, start, end });
    }

    tokens
}

/// Check that two consecutive tokens are separated by whitespace only.
///
/// The amount grammar requires plain whitespace between a numeral and the
/// word that follows it; intervening punctuation breaks the amount
/// ("X, s." is not a subpart).
pub fn adjacent(text: &str, left: &Token, right: &Token) -> bool {
    text[left.end..right.start].chars().all(char::is_whitespace)
}

// ============================================================================
// TESTS
// ============================================================================
