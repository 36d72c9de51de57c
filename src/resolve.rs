// Resolve-with-uncertainty
//
// The registers routinely yield several candidates where exactly one is
// expected (currency tokens, numeral runs, ...). The policy is always the
// same: take the first candidate, flag uncertainty for manual review. One
// combinator keeps that policy consistent across every field.

/// Take the first candidate; uncertain when there was more than one.
pub fn first_with_uncertainty<T>(mut candidates: Vec<T>) -> (Option<T>, bool) {
    let uncertain = candidates.len() > 1;
    if candidates.is_empty() {
        (None, false)
    } else {
        (Some(candidates.swap_remove(0)), uncertain)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty() {
        let (value, uncertain) = first_with_uncertainty(Vec::<i32>::new());
        assert_eq!(value, None);
        assert!(!uncertain);
    }

    #[test]
    fn test_single_candidate_is_certain() {
        let (value, uncertain) = first_with_uncertainty(vec!["fl"]);
        assert_eq!(value, Some("fl"));
        assert!(!uncertain);
    }

    #[test]
    fn test_multiple_candidates_take_first_flag_uncertain() {
        let (value, uncertain) = first_with_uncertainty(vec!["tur", "vien"]);
        assert_eq!(value, Some("tur"));
        assert!(uncertain);
    }
}
