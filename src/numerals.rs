// Roman numeral conversion
//
// Two layers, matching how the registers write numbers:
// - roman_to_arabic / roman_batch_to_arabic: plain numerals ("MCCCXVII")
// - complex_roman_to_arabic: compound-magnitude numerals that medieval
//   scribes used for large values ("VM IIIC XII" = 5312, "IIIC" = 300)

/// Check if a character belongs to the Roman numeral alphabet
pub fn is_roman_char(c: char) -> bool {
    matches!(c, 'I' | 'V' | 'X' | 'L' | 'C' | 'D' | 'M')
}

fn roman_char_value(c: char) -> Option<i64> {
    match c {
        'I' => Some(1),
        'V' => Some(5),
        'X' => Some(10),
        'L' => Some(50),
        'C' => Some(100),
        'D' => Some(500),
        'M' => Some(1000),
        _ => None,
    }
}

/// Convert a single Roman numeral string.
///
/// Folds characters right-to-left: add the value unless it is smaller than
/// the previously processed (more significant) value, in which case subtract
/// ("IV" = 4, "CM" = 900). Characters outside the value table are skipped
/// and counted; the rest of the numeral is still converted.
///
/// Returns (value, invalid_char_count).
pub fn roman_to_arabic(numeral: &str) -> (i64, usize) {
    let mut value = 0i64;
    let mut prev_value = 0i64;
    let mut invalid = 0usize;

    for c in numeral.chars().rev() {
        let char_value = match roman_char_value(c) {
            Some(v) => v,
            None => {
                invalid += 1;
                continue;
            }
        };
        if char_value < prev_value {
            value -= char_value;
        } else {
            value += char_value;
        }
        prev_value = char_value;
    }

    (value, invalid)
}

/// Convert a batch of Roman numerals.
///
/// The uncertainty flag is set once if any character across the whole batch
/// was invalid.
pub fn roman_batch_to_arabic(numerals: &[&str]) -> (Vec<i64>, bool) {
    let mut values = Vec::with_capacity(numerals.len());
    let mut invalid_total = 0usize;

    for numeral in numerals {
        let (value, invalid) = roman_to_arabic(numeral);
        values.push(value);
        invalid_total += invalid;
    }

    (values, invalid_total > 0)
}

/// Split a compound numeral into its maximal contiguous Roman-numeral groups
/// ("VM IIIC XII" -> ["VM", "IIIC", "XII"]).
pub fn split_numeral_groups(text: &str) -> Vec<&str> {
    let mut groups = Vec::new();
    let mut start: Option<usize> = None;

    for (i, c) in text.char_indices() {
        if is_roman_char(c) {
            if start.is_none() {
                start = Some(i);
            }
        } else if let Some(s) = start.take() {
            groups.push(&text[s..i]);
        }
    }
    if let Some(s) = start {
        groups.push(&text[s..]);
    }

    groups
}

/// Convert a compound-magnitude numeral.
///
/// A group longer than one character ending in 'M' (except the subtractive
/// "CM") is a thousands group: its prefix times 1000. Symmetrically a group
/// ending in 'C' (except "XC") is a hundreds group. Every other group
/// converts directly. Group values are summed.
///
/// A full compound numeral has at most three groups (thousands, hundreds,
/// remainder); zero groups or more than three flags uncertainty, but
/// whatever was found is still summed.
pub fn complex_roman_to_arabic(numeral: Option<&str>) -> (Option<i64>, bool) {
    let numeral = match numeral {
        Some(n) => n,
        None => return (None, true),
    };

    let groups = split_numeral_groups(numeral);
    let mut uncertainty = groups.is_empty() || groups.len() > 3;
    let mut total = 0i64;

    for group in &groups {
        let last_char = group.chars().last().unwrap_or(' ');
        let (value, invalid) = if group.chars().count() > 1 && last_char == 'M' && *group != "CM" {
            let (prefix, invalid) = roman_to_arabic(&group[..group.len() - 1]);
            (prefix * 1000, invalid)
        } else if group.chars().count() > 1 && last_char == 'C' && *group != "XC" {
            let (prefix, invalid) = roman_to_arabic(&group[..group.len() - 1]);
            (prefix * 100, invalid)
        } else {
            roman_to_arabic(group)
        };

        total += value;
        if invalid > 0 {
            uncertainty = true;
        }
    }

    if groups.is_empty() {
        (None, uncertainty)
    } else {
        (Some(total), uncertainty)
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_simple_numerals() {
        assert_eq!(roman_to_arabic("I"), (1, 0));
        assert_eq!(roman_to_arabic("VI"), (6, 0));
        assert_eq!(roman_to_arabic("XII"), (12, 0));
        assert_eq!(roman_to_arabic("MCCCXVII"), (1317, 0));
    }

    #[test]
    fn test_subtractive_numerals() {
        assert_eq!(roman_to_arabic("IV"), (4, 0));
        assert_eq!(roman_to_arabic("IX"), (9, 0));
        assert_eq!(roman_to_arabic("XC"), (90, 0));
        assert_eq!(roman_to_arabic("CM"), (900, 0));
        assert_eq!(roman_to_arabic("MCMXCIX"), (1999, 0));
    }

    #[test]
    fn test_invalid_characters_are_skipped_and_counted() {
        let (value, invalid) = roman_to_arabic("XIIa");
        assert_eq!(value, 12);
        assert_eq!(invalid, 1);
    }

    #[test]
    fn test_batch_uncertainty_is_shared() {
        let (values, uncertain) = roman_batch_to_arabic(&["XII", "VI"]);
        assert_eq!(values, vec![12, 6]);
        assert!(!uncertain);

        let (values, uncertain) = roman_batch_to_arabic(&["XII", "V?I"]);
        assert_eq!(values, vec![12, 6]);
        assert!(uncertain);
    }

    #[test]
    fn test_split_groups() {
        assert_eq!(split_numeral_groups("VM IIIC XII"), vec!["VM", "IIIC", "XII"]);
        assert_eq!(split_numeral_groups("XII"), vec!["XII"]);
        assert_eq!(split_numeral_groups(""), Vec::<&str>::new());
    }

    #[test]
    fn test_complex_thousands_group() {
        assert_eq!(complex_roman_to_arabic(Some("VM")), (Some(5000), false));
        assert_eq!(complex_roman_to_arabic(Some("IIM")), (Some(2000), false));
    }

    #[test]
    fn test_complex_hundreds_group() {
        assert_eq!(complex_roman_to_arabic(Some("IIIC")), (Some(300), false));
        assert_eq!(complex_roman_to_arabic(Some("VIC")), (Some(600), false));
    }

    #[test]
    fn test_complex_subtractive_groups_convert_directly() {
        // "CM" and "XC" are ordinary subtractive numerals, not magnitude groups
        assert_eq!(complex_roman_to_arabic(Some("CM")), (Some(900), false));
        assert_eq!(complex_roman_to_arabic(Some("XC")), (Some(90), false));
    }

    #[test]
    fn test_complex_full_compound() {
        assert_eq!(complex_roman_to_arabic(Some("VM IIIC XII")), (Some(5312), false));
    }

    #[test]
    fn test_complex_bare_magnitude_chars() {
        // a lone "M" or "C" is a plain numeral
        assert_eq!(complex_roman_to_arabic(Some("M")), (Some(1000), false));
        assert_eq!(complex_roman_to_arabic(Some("C XII")), (Some(112), false));
    }

    #[test]
    fn test_complex_group_count_uncertainty() {
        let (value, uncertain) = complex_roman_to_arabic(Some("X X X X"));
        assert_eq!(value, Some(40));
        assert!(uncertain);

        let (value, uncertain) = complex_roman_to_arabic(Some("..."));
        assert_eq!(value, None);
        assert!(uncertain);
    }

    #[test]
    fn test_complex_none_input() {
        assert_eq!(complex_roman_to_arabic(None), (None, true));
    }
}
