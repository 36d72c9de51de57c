// Amount extraction
//
// Two layers over the token stream from the lexer:
//
// - parse_line: locates the amount-bearing segment of a register line,
//   extracts every simple-amount expression in it and classifies the line
//   as carrying no amount, one simple amount, or a composite amount
//   ("VI fl. XII l. II s. vien. XXI l. gros." is a composite of three).
//
// - decompose_simple: splits one simple-amount expression into its ordered
//   (numeral, unit-of-count) subparts, the raw currency token and the
//   arithmetic sign.
//
// The grammar, in token terms:
//
//   amount      = minus* numeral-run ( currency-form | unit-form )
//   currency-form = currency-word+            (no unit words)
//   unit-form   = unit-word+ ( numeral-run unit-word+ )* trailing-word*
//
// where a numeral-run is one or more whitespace-adjacent numeral tokens
// (compound magnitudes span tokens: "VM IIIC XII") and adjacency always
// means whitespace only; punctuation breaks an amount.

use crate::lexer::{adjacent, tokenize, Token, TokenKind};
use crate::numerals::{complex_roman_to_arabic, is_roman_char};
use crate::resolve::first_with_uncertainty;
use crate::units::UnitOfCount;

/// Classification of one line's amount content
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AmountKind {
    /// No amount-bearing segment, or zero / implausibly many matches
    None,
    Simple,
    Composite,
}

/// Result of scanning one line of register text
#[derive(Debug, Clone)]
pub struct ParsedLine {
    /// The amount-bearing segment (after ':' or from the first Roman
    /// numeral character), when one was located
    pub segment: Option<String>,
    pub kind: AmountKind,
    pub uncertainty: bool,
    /// Raw simple-amount substrings, in reading order
    pub matches: Vec<String>,
    /// Segment contains a "singul..."/"computa..." token: the composite
    /// records an exchange rate
    pub rate_marker: bool,
}

/// One (numeral, unit) subpart of a simple amount
#[derive(Debug, Clone, PartialEq)]
pub struct SubpartExtract {
    pub raw: String,
    pub roman_numeral: Option<String>,
    pub arabic_numeral: Option<i64>,
    pub unit_of_count: Option<UnitOfCount>,
    pub uncertainty: bool,
}

/// Decomposed simple amount, ready for persistence
#[derive(Debug, Clone)]
pub struct SimpleAmount {
    pub raw: String,
    pub currency_extracted: Option<String>,
    /// "minus" when the amount is subtracted within its composite
    pub arithmetic_operator: Option<String>,
    pub uncertainty: bool,
    pub subparts: Vec<SubpartExtract>,
}

/// Composite amounts with more matches than this are implausible and
/// flagged for manual review instead of being extracted
const MAX_COMPOSITE_PARTS: usize = 10;

// ============================================================================
// AMOUNT TEXT PARSER
// ============================================================================

/// Locate the amount-bearing segment of a line: the text after the first
/// ':' when present, otherwise from the first Roman-numeral character
/// after the line's first character.
fn locate_segment(text: &str) -> Option<&str> {
    if let Some(pos) = text.find(':') {
        return Some(text[pos + 1..].trim_start());
    }

    text.char_indices()
        .skip(1)
        .find(|(_, c)| is_roman_char(*c))
        .map(|(i, _)| &text[i..])
}

/// Extract every simple-amount expression from a segment, in order
fn extract_amount_matches(segment: &str) -> Vec<String> {
    let tokens = tokenize(segment);
    let mut matches = Vec::new();
    let mut i = 0usize;

    while i < tokens.len() {
        match match_amount_at(segment, &tokens, i) {
            Some(end) => {
                let raw = &segment[tokens[i].start..tokens[end].end];
                matches.push(raw.to_string());
                i = end + 1;
            }
            None => i += 1,
        }
    }

    matches
}

/// Try to match one amount starting at token index `start`; returns the
/// index of the last token of the match
fn match_amount_at(segment: &str, tokens: &[Token], start: usize) -> Option<usize> {
    let mut i = start;

    // optional leading sign(s)
    while i < tokens.len()
        && tokens[i].kind == TokenKind::Minus
        && i + 1 < tokens.len()
        && adjacent(segment, &tokens[i], &tokens[i + 1])
    {
        i += 1;
    }

    // required numeral run
    let numeral_end = numeral_run_end(segment, tokens, i)?;

    // required following word
    let word_idx = numeral_end + 1;
    if word_idx >= tokens.len() || !adjacent(segment, &tokens[numeral_end], &tokens[word_idx]) {
        return None;
    }

    if tokens[word_idx].is_currency_word() {
        // currency form: numeral + currency words only
        let mut end = word_idx;
        while end + 1 < tokens.len()
            && tokens[end + 1].is_currency_word()
            && adjacent(segment, &tokens[end], &tokens[end + 1])
        {
            end += 1;
        }
        Some(end)
    } else if tokens[word_idx].is_unit_word() {
        // unit form: one or more (numeral-run unit-word+) groups
        let mut end = unit_word_run_end(segment, tokens, word_idx);

        loop {
            let Some(next_numeral_end) = adjacent_numeral_run(segment, tokens, end) else {
                break;
            };
            let unit_idx = next_numeral_end + 1;
            if unit_idx >= tokens.len()
                || !tokens[unit_idx].is_unit_word()
                || !adjacent(segment, &tokens[next_numeral_end], &tokens[unit_idx])
            {
                // that numeral starts the next amount, not a further subpart
                break;
            }
            end = unit_word_run_end(segment, tokens, unit_idx);
        }

        // trailing currency tail: any further words ("tur. parvorum.")
        while end + 1 < tokens.len()
            && tokens[end + 1].is_word()
            && adjacent(segment, &tokens[end], &tokens[end + 1])
        {
            end += 1;
        }
        Some(end)
    } else {
        None
    }
}

/// End index of a whitespace-adjacent numeral run starting at `i`
fn numeral_run_end(segment: &str, tokens: &[Token], i: usize) -> Option<usize> {
    if i >= tokens.len() || !tokens[i].is_numeral() {
        return None;
    }
    let mut end = i;
    while end + 1 < tokens.len()
        && tokens[end + 1].is_numeral()
        && adjacent(segment, &tokens[end], &tokens[end + 1])
    {
        end += 1;
    }
    Some(end)
}

/// Numeral run that directly follows token `after`, if any
fn adjacent_numeral_run(segment: &str, tokens: &[Token], after: usize) -> Option<usize> {
    let next = after + 1;
    if next >= tokens.len() || !adjacent(segment, &tokens[after], &tokens[next]) {
        return None;
    }
    numeral_run_end(segment, tokens, next)
}

/// End index of a run of adjacent unit words starting at `i`
fn unit_word_run_end(segment: &str, tokens: &[Token], i: usize) -> usize {
    let mut end = i;
    while end + 1 < tokens.len()
        && tokens[end + 1].is_unit_word()
        && adjacent(segment, &tokens[end], &tokens[end + 1])
    {
        end += 1;
    }
    end
}

/// Segment token starting "singul" or "computa" (case-insensitive) marks
/// the composite as recording an exchange rate
fn has_rate_marker(segment: &str) -> bool {
    segment
        .split(|c: char| !c.is_ascii_alphabetic())
        .filter(|w| !w.is_empty())
        .any(|w| {
            let lower = w.to_ascii_lowercase();
            lower.starts_with("singul") || lower.starts_with("computa")
        })
}

/// Scan one line of register text for amount expressions
pub fn parse_line(text: &str) -> ParsedLine {
    let Some(segment) = locate_segment(text) else {
        // no ':' and no Roman numeral: nothing to extract, needs review
        return ParsedLine {
            segment: None,
            kind: AmountKind::None,
            uncertainty: true,
            matches: Vec::new(),
            rate_marker: false,
        };
    };

    let matches = extract_amount_matches(segment);
    let count = matches.len();

    let (kind, uncertainty, matches) = if count == 0 || count > MAX_COMPOSITE_PARTS {
        (AmountKind::None, true, Vec::new())
    } else if count == 1 {
        (AmountKind::Simple, false, matches)
    } else {
        (AmountKind::Composite, false, matches)
    };

    let rate_marker = kind == AmountKind::Composite && has_rate_marker(segment);

    ParsedLine {
        segment: Some(segment.to_string()),
        kind,
        uncertainty,
        matches,
        rate_marker,
    }
}

// ============================================================================
// SUBPART DECOMPOSER
// ============================================================================

/// Extract the ordered (numeral-run, unit-word*) subparts of a simple
/// amount ("X" from "X fl. auri"; "IX s." and "VIII d." from
/// "IX s. VIII d. tur. parvorum.")
pub fn extract_subparts(text: &str) -> Vec<SubpartExtract> {
    let tokens = tokenize(text);
    let mut subparts = Vec::new();
    let mut i = 0usize;

    while i < tokens.len() {
        let Some(numeral_end) = numeral_run_end(text, &tokens, i) else {
            i += 1;
            continue;
        };

        // unit words directly after the numeral run
        let mut end = numeral_end;
        let mut first_unit: Option<char> = None;
        while end + 1 < tokens.len()
            && tokens[end + 1].is_unit_word()
            && adjacent(text, &tokens[end], &tokens[end + 1])
        {
            end += 1;
            if first_unit.is_none() {
                if let TokenKind::Word(w) = &tokens[end].kind {
                    first_unit = w.chars().next();
                }
            }
        }

        let raw = &text[tokens[i].start..tokens[end].end];
        let roman = &text[tokens[i].start..tokens[numeral_end].end];
        let (arabic, conversion_uncertain) = complex_roman_to_arabic(Some(roman));

        subparts.push(SubpartExtract {
            raw: raw.to_string(),
            roman_numeral: Some(roman.to_string()),
            arabic_numeral: arabic,
            unit_of_count: first_unit.and_then(UnitOfCount::from_prefix),
            uncertainty: conversion_uncertain,
        });

        i = end + 1;
    }

    subparts
}

/// Raw currency-token candidates of a simple amount: every run of words
/// starting with a non-unit word, including its following words of any
/// kind ("tur. parvorum.")
fn extract_currency_runs(text: &str, tokens: &[Token]) -> Vec<String> {
    let mut runs = Vec::new();
    let mut i = 0usize;

    while i < tokens.len() {
        if !tokens[i].is_currency_word() {
            i += 1;
            continue;
        }
        let mut end = i;
        while end + 1 < tokens.len()
            && tokens[end + 1].is_word()
            && adjacent(text, &tokens[end], &tokens[end + 1])
        {
            end += 1;
        }
        runs.push(text[tokens[i].start..tokens[end].end].to_string());
        i = end + 1;
    }

    runs
}

/// Decompose one simple-amount expression into currency token, sign and
/// subparts. Uncertainty is flagged when several distinct currency runs
/// were found, or when no subpart could be extracted.
pub fn decompose_simple(raw: &str) -> SimpleAmount {
    let tokens = tokenize(raw);

    let (currency_extracted, currency_ambiguous) =
        first_with_uncertainty(extract_currency_runs(raw, &tokens));

    let subparts = extract_subparts(raw);

    let arithmetic_operator = tokens
        .iter()
        .any(|t| t.kind == TokenKind::Minus)
        .then(|| "minus".to_string());

    let uncertainty = currency_ambiguous || subparts.is_empty();

    SimpleAmount {
        raw: raw.to_string(),
        currency_extracted,
        arithmetic_operator,
        uncertainty,
        subparts,
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_segment_after_colon() {
        let parsed = parse_line("Item pro vino empto: X s. vien.");
        assert_eq!(parsed.segment.as_deref(), Some("X s. vien."));
        assert_eq!(parsed.kind, AmountKind::Simple);
    }

    #[test]
    fn test_segment_from_first_roman_character() {
        let parsed = parse_line("minus X s. VIII d. tur. parvorum.");
        assert_eq!(parsed.segment.as_deref(), Some("X s. VIII d. tur. parvorum."));
        assert_eq!(parsed.kind, AmountKind::Simple);
        assert_eq!(parsed.matches, vec!["X s. VIII d. tur. parvorum."]);
        assert!(!parsed.uncertainty);
    }

    #[test]
    fn test_no_amount_found() {
        let parsed = parse_line("pro vino empto");
        assert_eq!(parsed.kind, AmountKind::None);
        assert!(parsed.uncertainty);
        assert!(parsed.matches.is_empty());
    }

    #[test]
    fn test_composite_amount_split_in_order() {
        let parsed = parse_line("Summa: VI fl. XII l. II s. vien. XXI l. gros.");
        assert_eq!(parsed.kind, AmountKind::Composite);
        assert_eq!(
            parsed.matches,
            vec!["VI fl.", "XII l. II s. vien.", "XXI l. gros."]
        );
    }

    #[test]
    fn test_minus_kept_inside_composite_child() {
        let parsed = parse_line("Summa: X s. vien. minus II d. tur.");
        assert_eq!(parsed.kind, AmountKind::Composite);
        assert_eq!(parsed.matches, vec!["X s. vien.", "minus II d. tur."]);
    }

    #[test]
    fn test_too_many_matches_flagged_not_extracted() {
        let mut text = String::from("Summa:");
        for _ in 0..11 {
            text.push_str(" X fl.");
        }
        let parsed = parse_line(&text);
        assert_eq!(parsed.kind, AmountKind::None);
        assert!(parsed.uncertainty);
        assert!(parsed.matches.is_empty());
    }

    #[test]
    fn test_rate_marker_on_composite() {
        let parsed = parse_line("Summa: VI fl. computando XII s. vien. pro floreno");
        assert_eq!(parsed.kind, AmountKind::Composite);
        assert!(parsed.rate_marker);

        let no_marker = parse_line("Summa: VI fl. XII s. vien.");
        assert_eq!(no_marker.kind, AmountKind::Composite);
        assert!(!no_marker.rate_marker);
    }

    #[test]
    fn test_rate_marker_not_set_on_simple() {
        let parsed = parse_line("computando: X s. vien.");
        assert_eq!(parsed.kind, AmountKind::Simple);
        assert!(!parsed.rate_marker);
    }

    #[test]
    fn test_punctuation_breaks_amount() {
        // "X," is not followed by whitespace-adjacent words
        let parsed = parse_line("Item: X, s. vien.");
        assert_eq!(parsed.kind, AmountKind::None);
        assert!(parsed.uncertainty);
    }

    #[test]
    fn test_decompose_unit_form() {
        let simple = decompose_simple("X s. VIII d. tur. parvorum.");
        assert_eq!(simple.currency_extracted.as_deref(), Some("tur. parvorum."));
        assert_eq!(simple.arithmetic_operator, None);
        assert!(!simple.uncertainty);

        assert_eq!(simple.subparts.len(), 2);
        assert_eq!(simple.subparts[0].raw, "X s.");
        assert_eq!(simple.subparts[0].roman_numeral.as_deref(), Some("X"));
        assert_eq!(simple.subparts[0].arabic_numeral, Some(10));
        assert_eq!(simple.subparts[0].unit_of_count, Some(UnitOfCount::Solidus));
        assert_eq!(simple.subparts[1].arabic_numeral, Some(8));
        assert_eq!(simple.subparts[1].unit_of_count, Some(UnitOfCount::Denarius));
    }

    #[test]
    fn test_decompose_currency_form_has_unitless_subpart() {
        let simple = decompose_simple("VI fl. auri");
        assert_eq!(simple.currency_extracted.as_deref(), Some("fl. auri"));
        assert_eq!(simple.subparts.len(), 1);
        assert_eq!(simple.subparts[0].roman_numeral.as_deref(), Some("VI"));
        assert_eq!(simple.subparts[0].arabic_numeral, Some(6));
        assert_eq!(simple.subparts[0].unit_of_count, None);
    }

    #[test]
    fn test_decompose_compound_magnitude_numeral() {
        let simple = decompose_simple("VM IIIC XII fl.");
        assert_eq!(simple.subparts.len(), 1);
        assert_eq!(simple.subparts[0].roman_numeral.as_deref(), Some("VM IIIC XII"));
        assert_eq!(simple.subparts[0].arabic_numeral, Some(5312));
    }

    #[test]
    fn test_decompose_minus_sign() {
        let simple = decompose_simple("minus II d. tur.");
        assert_eq!(simple.arithmetic_operator.as_deref(), Some("minus"));
        assert_eq!(simple.subparts.len(), 1);
        assert_eq!(simple.subparts[0].arabic_numeral, Some(2));
    }

    #[test]
    fn test_decompose_without_subparts_is_uncertain() {
        let simple = decompose_simple("fl. auri");
        assert!(simple.subparts.is_empty());
        assert!(simple.uncertainty);
    }

    #[test]
    fn test_decompose_multiple_currency_runs_is_uncertain() {
        // two distinct word runs separated by a numeral
        let simple = decompose_simple("VI fl. auri II gros. tur.");
        assert!(simple.uncertainty);
        assert_eq!(simple.currency_extracted.as_deref(), Some("fl. auri"));
    }
}
