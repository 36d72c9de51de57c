// Currency identification
//
// A raw currency token ("fl. auri", "tur. parv.", "gros. tur.") is matched
// against canonical currency names, then against recorded alias names. The
// match key is normally the token's first two letters (the shortest
// abbreviation, "fl", has two); a few chronically ambiguous two-word names
// are special-cased to an explicit canonical name instead.

use anyhow::Result;
use rusqlite::{params, Connection, OptionalExtension};

/// Canonical name searched for tokens containing a word starting "parv"
/// ("parv. tur.", "parve monete", "tur. parv.")
const PARVORUM_CANONICAL: &str = "turonensis parvorum";

/// Canonical name searched for tokens pairing "tur..." with "gr..."
/// ("tur. gros.", "gros. tur.")
const GROSSUS_CANONICAL: &str = "grossus";

/// Derive the search key for a raw currency token
pub fn currency_search_key(currency_extracted: &str) -> String {
    let words: Vec<&str> = currency_extracted
        .split(|c: char| !c.is_ascii_alphabetic())
        .filter(|w| !w.is_empty())
        .collect();

    if words.iter().any(|w| w.starts_with("parv")) {
        return PARVORUM_CANONICAL.to_string();
    }

    let has_tur = words.iter().any(|w| w.starts_with("tur"));
    let has_gr = words.iter().any(|w| w.starts_with("gr"));
    if has_tur && has_gr {
        return GROSSUS_CANONICAL.to_string();
    }

    currency_extracted.chars().take(2).collect()
}

/// Resolve a raw currency token to a canonical currency id.
///
/// Prefix search against canonical names first, then against alias names;
/// the first match wins. None when neither table matches (the amount stays
/// unresolved and eligible for a later run).
pub fn resolve_currency(conn: &Connection, currency_extracted: &str) -> Result<Option<i64>> {
    let key = currency_search_key(currency_extracted);
    let pattern = format!("{}%", key);

    let standardized: Option<i64> = conn
        .query_row(
            "SELECT id FROM currency_standardized
             WHERE currency_name LIKE ?1
             ORDER BY id LIMIT 1",
            params![pattern],
            |row| row.get(0),
        )
        .optional()?;
    if standardized.is_some() {
        return Ok(standardized);
    }

    let variant: Option<i64> = conn
        .query_row(
            "SELECT currency_standardized_id FROM currency_variant
             WHERE currency_variant_name LIKE ?1
             ORDER BY id LIMIT 1",
            params![pattern],
            |row| row.get(0),
        )
        .optional()?;

    Ok(variant)
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::{insert_currency, insert_currency_variant, setup_database};

    fn test_db() -> Connection {
        let conn = Connection::open_in_memory().unwrap();
        setup_database(&conn).unwrap();
        conn
    }

    #[test]
    fn test_search_key_prefix() {
        assert_eq!(currency_search_key("fl. auri"), "fl");
        assert_eq!(currency_search_key("vien."), "vi");
    }

    #[test]
    fn test_search_key_parvorum_special_case() {
        assert_eq!(currency_search_key("parv. tur."), "turonensis parvorum");
        assert_eq!(currency_search_key("tur. parvorum."), "turonensis parvorum");
        assert_eq!(currency_search_key("parve monete"), "turonensis parvorum");
    }

    #[test]
    fn test_search_key_grossus_special_case() {
        assert_eq!(currency_search_key("tur. gros."), "grossus");
        assert_eq!(currency_search_key("turonensium grossorum"), "grossus");
    }

    #[test]
    fn test_resolve_against_canonical_names() {
        let conn = test_db();
        let florenus = insert_currency(&conn, "florenus").unwrap();
        insert_currency(&conn, "viennensis").unwrap();

        assert_eq!(resolve_currency(&conn, "fl. auri").unwrap(), Some(florenus));
    }

    #[test]
    fn test_resolve_falls_back_to_variants() {
        let conn = test_db();
        let viennensis = insert_currency(&conn, "viennensis").unwrap();
        insert_currency_variant(&conn, "wien.", viennensis).unwrap();

        // "wi" matches no canonical name, only the recorded alias
        assert_eq!(resolve_currency(&conn, "wien.").unwrap(), Some(viennensis));
    }

    #[test]
    fn test_resolve_unknown_token() {
        let conn = test_db();
        insert_currency(&conn, "florenus").unwrap();
        assert_eq!(resolve_currency(&conn, "zz.").unwrap(), None);
    }
}
