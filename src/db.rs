use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::units::UnitOfCount;

// ============================================================================
// ENTITIES
// ============================================================================

/// One segmented line of register text.
///
/// The text itself comes from the external segmentation collaborator; the
/// standardized date comes from the date collaborator and is treated as an
/// opaque `YYYY-MM-DD` ordering/lookup key, never reinterpreted.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Line {
    pub id: i64,
    pub line_number: i64,
    pub folio: Option<String>,
    pub text: String,
    pub date_standardized: Option<String>,
    /// Stage-done marker: set once the amount-parse stage has seen the line,
    /// so re-running the stage only picks up unprocessed lines
    pub amount_parsed_at: Option<String>,
}

impl Line {
    /// Idempotency hash for duplicate detection on import.
    /// Deduplication key, not identity: identity is the row id.
    pub fn compute_idempotency_hash(line_number: i64, text: &str) -> String {
        let mut hasher = Sha256::new();
        hasher.update(format!("{}{}", line_number, text));
        format!("{:x}", hasher.finalize())
    }
}

/// Amount expression containing several currency-bearing sub-amounts
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AmountComposite {
    pub id: i64,
    pub line_id: Option<i64>,
    pub extracted: String,
    pub uncertainty: bool,
}

/// Single-currency amount expression.
///
/// Exactly one of line_id / amount_composite_id is set for parse-created
/// rows. Curated rate-definition amounts (see `exchange_rate`) carry
/// neither.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AmountSimple {
    pub id: i64,
    pub line_id: Option<i64>,
    pub amount_composite_id: Option<i64>,
    pub extracted: String,
    pub currency_extracted: Option<String>,
    pub currency_standardized_id: Option<i64>,
    /// "minus" when the amount is subtracted from its composite total
    pub arithmetic_operator: Option<String>,
    pub uncertainty: bool,
    /// Denarius-equivalent value, populated by the smallest-unit stage
    pub smallest_unit_value: Option<f64>,
    pub smallest_unit_uncertainty: Option<bool>,
    /// Bare numeral of a unitless amount, populated by the no-unit stage
    pub no_unit_value: Option<i64>,
}

/// One (Roman numeral, unit-of-count) pair within a simple amount
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AmountSubpart {
    pub id: i64,
    pub amount_simple_id: i64,
    pub extracted: String,
    pub roman_numeral: Option<String>,
    pub arabic_numeral: Option<i64>,
    pub unit_of_count: Option<UnitOfCount>,
    pub uncertainty: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CurrencyStandardized {
    pub id: i64,
    pub currency_name: String,
}

/// Exchange rate between two currencies.
///
/// The rate is anchored to a date through exchange_rate_reference -> line.
/// rate_value means "quote-amount units of target per base-amount unit of
/// source"; it stays null until the rate-value stage computes it from the
/// curated source/target amounts.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExchangeRate {
    pub id: i64,
    pub currency_source_id: Option<i64>,
    pub currency_target_id: Option<i64>,
    pub amount_simple_source_id: Option<i64>,
    pub amount_simple_target_id: Option<i64>,
    pub rate_value: Option<f64>,
}

/// Converted value of a simple or composite amount in one target currency
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConvertedAmount {
    pub id: i64,
    pub amount_simple_id: Option<i64>,
    pub amount_composite_id: Option<i64>,
    pub currency_standardized_id: i64,
    pub exchange_rate_id: Option<i64>,
    pub exchange_rate_id_additional: Option<i64>,
    pub amount_converted: f64,
    /// True when the amount was already in the target currency
    pub amount_original: bool,
}

/// Audit-trail event: every pipeline stage records what it did
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Event {
    pub event_id: String,
    pub timestamp: DateTime<Utc>,
    pub event_type: String,
    pub entity_type: String,
    pub entity_id: String,
    pub data: serde_json::Value,
    pub actor: String,
}

impl Event {
    pub fn new(
        event_type: &str,
        entity_type: &str,
        entity_id: &str,
        data: serde_json::Value,
        actor: &str,
    ) -> Self {
        Self {
            event_id: uuid::Uuid::new_v4().to_string(),
            timestamp: Utc::now(),
            event_type: event_type.to_string(),
            entity_type: entity_type.to_string(),
            entity_id: entity_id.to_string(),
            data,
            actor: actor.to_string(),
        }
    }
}

// ============================================================================
// SCHEMA
// ============================================================================

pub fn setup_database(conn: &Connection) -> Result<()> {
    // Enable WAL mode for crash recovery
    conn.pragma_update(None, "journal_mode", "WAL")?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS line (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            idempotency_hash TEXT UNIQUE NOT NULL,
            line_number INTEGER NOT NULL,
            folio TEXT,
            text TEXT NOT NULL,
            date_standardized TEXT,
            amount_parsed_at TEXT,
            created_at DATETIME DEFAULT CURRENT_TIMESTAMP
        )",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS currency_standardized (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            currency_name TEXT UNIQUE NOT NULL
        )",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS currency_variant (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            currency_variant_name TEXT NOT NULL,
            currency_standardized_id INTEGER NOT NULL
                REFERENCES currency_standardized(id)
        )",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS amount_composite (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            line_id INTEGER REFERENCES line(id),
            amount_composite_extracted TEXT NOT NULL,
            amount_composite_uncertainty INTEGER NOT NULL DEFAULT 0
        )",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS amount_simple (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            line_id INTEGER REFERENCES line(id),
            amount_composite_id INTEGER REFERENCES amount_composite(id),
            amount_simple_extracted TEXT NOT NULL,
            currency_extracted TEXT,
            currency_standardized_id INTEGER REFERENCES currency_standardized(id),
            arithmetic_operator TEXT,
            amount_simple_uncertainty INTEGER NOT NULL DEFAULT 0,
            smallest_unit_value REAL,
            smallest_unit_uncertainty INTEGER,
            no_unit_value INTEGER
        )",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS amount_subpart (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            amount_simple_id INTEGER NOT NULL REFERENCES amount_simple(id),
            subpart_extracted TEXT NOT NULL,
            roman_numeral TEXT,
            arabic_numeral INTEGER,
            unit_of_count TEXT,
            subpart_uncertainty INTEGER NOT NULL DEFAULT 0
        )",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS exchange_rate (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            currency_source_id INTEGER REFERENCES currency_standardized(id),
            currency_target_id INTEGER REFERENCES currency_standardized(id),
            amount_simple_source_id INTEGER REFERENCES amount_simple(id),
            amount_simple_target_id INTEGER REFERENCES amount_simple(id),
            rate_value REAL
        )",
        [],
    )?;

    // One reference per line: the line whose composite carried the
    // "singul"/"computa" marker anchors the rate to that line's date
    conn.execute(
        "CREATE TABLE IF NOT EXISTS exchange_rate_reference (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            line_id INTEGER NOT NULL UNIQUE REFERENCES line(id),
            rate_extracted TEXT,
            exchange_rate_id INTEGER REFERENCES exchange_rate(id)
        )",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS amount_converted (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            amount_simple_id INTEGER REFERENCES amount_simple(id),
            amount_composite_id INTEGER REFERENCES amount_composite(id),
            currency_standardized_id INTEGER NOT NULL
                REFERENCES currency_standardized(id),
            exchange_rate_id INTEGER REFERENCES exchange_rate(id),
            exchange_rate_id_additional INTEGER REFERENCES exchange_rate(id),
            amount_converted REAL NOT NULL,
            amount_original INTEGER
        )",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS events (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            event_id TEXT UNIQUE NOT NULL,
            timestamp TEXT NOT NULL,
            event_type TEXT NOT NULL,
            entity_type TEXT NOT NULL,
            entity_id TEXT NOT NULL,
            data TEXT NOT NULL,
            actor TEXT NOT NULL,
            created_at DATETIME DEFAULT CURRENT_TIMESTAMP
        )",
        [],
    )?;

    // ==========================================================================
    // Indexes
    // ==========================================================================
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_amount_simple_line ON amount_simple(line_id)",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_amount_simple_composite
         ON amount_simple(amount_composite_id)",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_subpart_amount ON amount_subpart(amount_simple_id)",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_converted_simple
         ON amount_converted(amount_simple_id, currency_standardized_id)",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_converted_composite
         ON amount_converted(amount_composite_id, currency_standardized_id)",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_rate_pair
         ON exchange_rate(currency_source_id, currency_target_id)",
        [],
    )?;

    Ok(())
}

// ============================================================================
// LINES
// ============================================================================

/// Insert one line; returns None when the idempotency hash already exists
pub fn insert_line(
    conn: &Connection,
    line_number: i64,
    folio: Option<&str>,
    date_standardized: Option<&str>,
    text: &str,
) -> Result<Option<i64>> {
    let hash = Line::compute_idempotency_hash(line_number, text);

    let result = conn.execute(
        "INSERT INTO line (idempotency_hash, line_number, folio, text, date_standardized)
         VALUES (?1, ?2, ?3, ?4, ?5)",
        params![hash, line_number, folio, text, date_standardized],
    );

    match result {
        Ok(_) => Ok(Some(conn.last_insert_rowid())),
        Err(rusqlite::Error::SqliteFailure(err, _))
            if err.code == rusqlite::ErrorCode::ConstraintViolation =>
        {
            Ok(None)
        }
        Err(e) => Err(e).context("Failed to insert line"),
    }
}

/// Lines the amount-parse stage has not yet processed
pub fn get_unparsed_lines(conn: &Connection) -> Result<Vec<Line>> {
    let mut stmt = conn.prepare(
        "SELECT id, line_number, folio, text, date_standardized, amount_parsed_at
         FROM line
         WHERE amount_parsed_at IS NULL
         ORDER BY id",
    )?;
    let lines = stmt
        .query_map([], |row| {
            Ok(Line {
                id: row.get(0)?,
                line_number: row.get(1)?,
                folio: row.get(2)?,
                text: row.get(3)?,
                date_standardized: row.get(4)?,
                amount_parsed_at: row.get(5)?,
            })
        })?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(lines)
}

pub fn mark_line_parsed(conn: &Connection, line_id: i64) -> Result<()> {
    conn.execute(
        "UPDATE line SET amount_parsed_at = ?1 WHERE id = ?2",
        params![Utc::now().to_rfc3339(), line_id],
    )?;
    Ok(())
}

// ============================================================================
// CURRENCIES
// ============================================================================

pub fn insert_currency(conn: &Connection, currency_name: &str) -> Result<i64> {
    conn.execute(
        "INSERT INTO currency_standardized (currency_name) VALUES (?1)",
        params![currency_name],
    )
    .with_context(|| format!("Failed to insert currency '{}'", currency_name))?;
    Ok(conn.last_insert_rowid())
}

pub fn insert_currency_variant(
    conn: &Connection,
    variant_name: &str,
    currency_standardized_id: i64,
) -> Result<i64> {
    conn.execute(
        "INSERT INTO currency_variant (currency_variant_name, currency_standardized_id)
         VALUES (?1, ?2)",
        params![variant_name, currency_standardized_id],
    )?;
    Ok(conn.last_insert_rowid())
}

pub fn get_currency_by_name(conn: &Connection, currency_name: &str) -> Result<Option<i64>> {
    let id = conn
        .query_row(
            "SELECT id FROM currency_standardized WHERE currency_name = ?1",
            params![currency_name],
            |row| row.get(0),
        )
        .optional()?;
    Ok(id)
}

// ============================================================================
// AMOUNTS
// ============================================================================

pub fn insert_amount_composite(
    conn: &Connection,
    line_id: Option<i64>,
    extracted: &str,
    uncertainty: bool,
) -> Result<i64> {
    conn.execute(
        "INSERT INTO amount_composite (line_id, amount_composite_extracted,
            amount_composite_uncertainty)
         VALUES (?1, ?2, ?3)",
        params![line_id, extracted, uncertainty as i64],
    )?;
    Ok(conn.last_insert_rowid())
}

#[allow(clippy::too_many_arguments)]
pub fn insert_amount_simple(
    conn: &Connection,
    line_id: Option<i64>,
    amount_composite_id: Option<i64>,
    extracted: &str,
    currency_extracted: Option<&str>,
    currency_standardized_id: Option<i64>,
    arithmetic_operator: Option<&str>,
    uncertainty: bool,
) -> Result<i64> {
    conn.execute(
        "INSERT INTO amount_simple (line_id, amount_composite_id, amount_simple_extracted,
            currency_extracted, currency_standardized_id, arithmetic_operator,
            amount_simple_uncertainty)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
        params![
            line_id,
            amount_composite_id,
            extracted,
            currency_extracted,
            currency_standardized_id,
            arithmetic_operator,
            uncertainty as i64,
        ],
    )?;
    Ok(conn.last_insert_rowid())
}

pub fn insert_subpart(
    conn: &Connection,
    amount_simple_id: i64,
    extracted: &str,
    roman_numeral: Option<&str>,
    arabic_numeral: Option<i64>,
    unit_of_count: Option<UnitOfCount>,
    uncertainty: bool,
) -> Result<i64> {
    conn.execute(
        "INSERT INTO amount_subpart (amount_simple_id, subpart_extracted, roman_numeral,
            arabic_numeral, unit_of_count, subpart_uncertainty)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
        params![
            amount_simple_id,
            extracted,
            roman_numeral,
            arabic_numeral,
            unit_of_count.map(|u| u.as_str()),
            uncertainty as i64,
        ],
    )?;
    Ok(conn.last_insert_rowid())
}

fn amount_simple_from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<AmountSimple> {
    Ok(AmountSimple {
        id: row.get(0)?,
        line_id: row.get(1)?,
        amount_composite_id: row.get(2)?,
        extracted: row.get(3)?,
        currency_extracted: row.get(4)?,
        currency_standardized_id: row.get(5)?,
        arithmetic_operator: row.get(6)?,
        uncertainty: row.get::<_, i64>(7)? != 0,
        smallest_unit_value: row.get(8)?,
        smallest_unit_uncertainty: row.get::<_, Option<i64>>(9)?.map(|v| v != 0),
        no_unit_value: row.get(10)?,
    })
}

const AMOUNT_SIMPLE_COLUMNS: &str = "id, line_id, amount_composite_id, \
    amount_simple_extracted, currency_extracted, currency_standardized_id, \
    arithmetic_operator, amount_simple_uncertainty, smallest_unit_value, \
    smallest_unit_uncertainty, no_unit_value";

pub fn get_amount_simple(conn: &Connection, id: i64) -> Result<AmountSimple> {
    let sql = format!("SELECT {} FROM amount_simple WHERE id = ?1", AMOUNT_SIMPLE_COLUMNS);
    let amount = conn
        .query_row(&sql, params![id], amount_simple_from_row)
        .with_context(|| format!("amount_simple {} not found", id))?;
    Ok(amount)
}

pub fn get_amounts_for_line(conn: &Connection, line_id: i64) -> Result<Vec<AmountSimple>> {
    let sql = format!(
        "SELECT {} FROM amount_simple WHERE line_id = ?1 ORDER BY id",
        AMOUNT_SIMPLE_COLUMNS
    );
    let mut stmt = conn.prepare(&sql)?;
    let amounts = stmt
        .query_map(params![line_id], amount_simple_from_row)?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(amounts)
}

pub fn get_amounts_for_composite(
    conn: &Connection,
    amount_composite_id: i64,
) -> Result<Vec<AmountSimple>> {
    let sql = format!(
        "SELECT {} FROM amount_simple WHERE amount_composite_id = ?1 ORDER BY id",
        AMOUNT_SIMPLE_COLUMNS
    );
    let mut stmt = conn.prepare(&sql)?;
    let amounts = stmt
        .query_map(params![amount_composite_id], amount_simple_from_row)?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(amounts)
}

pub fn get_subparts(conn: &Connection, amount_simple_id: i64) -> Result<Vec<AmountSubpart>> {
    let mut stmt = conn.prepare(
        "SELECT id, amount_simple_id, subpart_extracted, roman_numeral, arabic_numeral,
                unit_of_count, subpart_uncertainty
         FROM amount_subpart
         WHERE amount_simple_id = ?1
         ORDER BY id",
    )?;
    let subparts = stmt
        .query_map(params![amount_simple_id], |row| {
            let unit: Option<String> = row.get(5)?;
            Ok(AmountSubpart {
                id: row.get(0)?,
                amount_simple_id: row.get(1)?,
                extracted: row.get(2)?,
                roman_numeral: row.get(3)?,
                arabic_numeral: row.get(4)?,
                unit_of_count: unit.as_deref().and_then(UnitOfCount::from_name),
                uncertainty: row.get::<_, i64>(6)? != 0,
            })
        })?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(subparts)
}

// ============================================================================
// EXCHANGE RATES
// ============================================================================

/// Insert a rate-reference row for a line, deduplicated per line
pub fn insert_rate_reference(conn: &Connection, line_id: i64, extracted: &str) -> Result<bool> {
    let existing: i64 = conn.query_row(
        "SELECT COUNT(*) FROM exchange_rate_reference WHERE line_id = ?1",
        params![line_id],
        |row| row.get(0),
    )?;
    if existing > 0 {
        return Ok(false);
    }
    conn.execute(
        "INSERT INTO exchange_rate_reference (line_id, rate_extracted) VALUES (?1, ?2)",
        params![line_id, extracted],
    )?;
    Ok(true)
}

pub fn insert_exchange_rate(
    conn: &Connection,
    currency_source_id: Option<i64>,
    currency_target_id: Option<i64>,
    amount_simple_source_id: Option<i64>,
    amount_simple_target_id: Option<i64>,
    rate_value: Option<f64>,
) -> Result<i64> {
    conn.execute(
        "INSERT INTO exchange_rate (currency_source_id, currency_target_id,
            amount_simple_source_id, amount_simple_target_id, rate_value)
         VALUES (?1, ?2, ?3, ?4, ?5)",
        params![
            currency_source_id,
            currency_target_id,
            amount_simple_source_id,
            amount_simple_target_id,
            rate_value,
        ],
    )?;
    Ok(conn.last_insert_rowid())
}

/// Anchor an exchange rate to a line's date by filling (or creating) the
/// line's reference row
pub fn link_rate_to_line(conn: &Connection, exchange_rate_id: i64, line_id: i64) -> Result<()> {
    let updated = conn.execute(
        "UPDATE exchange_rate_reference SET exchange_rate_id = ?1 WHERE line_id = ?2",
        params![exchange_rate_id, line_id],
    )?;
    if updated == 0 {
        conn.execute(
            "INSERT INTO exchange_rate_reference (line_id, exchange_rate_id) VALUES (?1, ?2)",
            params![line_id, exchange_rate_id],
        )?;
    }
    Ok(())
}

// ============================================================================
// CONVERTED AMOUNTS
// ============================================================================

fn converted_from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<ConvertedAmount> {
    Ok(ConvertedAmount {
        id: row.get(0)?,
        amount_simple_id: row.get(1)?,
        amount_composite_id: row.get(2)?,
        currency_standardized_id: row.get(3)?,
        exchange_rate_id: row.get(4)?,
        exchange_rate_id_additional: row.get(5)?,
        amount_converted: row.get(6)?,
        amount_original: row.get::<_, Option<i64>>(7)?.unwrap_or(0) != 0,
    })
}

const CONVERTED_COLUMNS: &str = "id, amount_simple_id, amount_composite_id, \
    currency_standardized_id, exchange_rate_id, exchange_rate_id_additional, \
    amount_converted, amount_original";

pub fn get_converted_for_simple(
    conn: &Connection,
    amount_simple_id: i64,
    currency_standardized_id: i64,
) -> Result<Option<ConvertedAmount>> {
    let sql = format!(
        "SELECT {} FROM amount_converted
         WHERE amount_simple_id = ?1 AND currency_standardized_id = ?2",
        CONVERTED_COLUMNS
    );
    let converted = conn
        .query_row(&sql, params![amount_simple_id, currency_standardized_id], converted_from_row)
        .optional()?;
    Ok(converted)
}

pub fn get_converted_for_composite(
    conn: &Connection,
    amount_composite_id: i64,
    currency_standardized_id: i64,
) -> Result<Option<ConvertedAmount>> {
    let sql = format!(
        "SELECT {} FROM amount_converted
         WHERE amount_composite_id = ?1 AND currency_standardized_id = ?2",
        CONVERTED_COLUMNS
    );
    let converted = conn
        .query_row(
            &sql,
            params![amount_composite_id, currency_standardized_id],
            converted_from_row,
        )
        .optional()?;
    Ok(converted)
}

pub fn count_converted(conn: &Connection) -> Result<i64> {
    let count: i64 =
        conn.query_row("SELECT COUNT(*) FROM amount_converted", [], |row| row.get(0))?;
    Ok(count)
}

// ============================================================================
// EVENTS
// ============================================================================

pub fn insert_event(conn: &Connection, event: &Event) -> Result<()> {
    let data_json = serde_json::to_string(&event.data)?;

    conn.execute(
        "INSERT INTO events (
            event_id, timestamp, event_type, entity_type, entity_id, data, actor
        ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
        params![
            event.event_id,
            event.timestamp.to_rfc3339(),
            event.event_type,
            event.entity_type,
            event.entity_id,
            data_json,
            event.actor,
        ],
    )?;

    Ok(())
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn test_db() -> Connection {
        let conn = Connection::open_in_memory().unwrap();
        setup_database(&conn).unwrap();
        conn
    }

    #[test]
    fn test_line_insert_is_idempotent() {
        let conn = test_db();
        let first =
            insert_line(&conn, 1, Some("f.34"), Some("1317-05-01"), "Item pro vino: X s.").unwrap();
        assert!(first.is_some());

        let second =
            insert_line(&conn, 1, Some("f.34"), Some("1317-05-01"), "Item pro vino: X s.").unwrap();
        assert!(second.is_none());
    }

    #[test]
    fn test_amount_ownership_links() {
        let conn = test_db();
        let line_id = insert_line(&conn, 1, None, None, "X s.").unwrap().unwrap();
        let composite_id =
            insert_amount_composite(&conn, Some(line_id), "X s. II fl.", false).unwrap();
        let simple_id = insert_amount_simple(
            &conn,
            None,
            Some(composite_id),
            "X s.",
            None,
            None,
            None,
            false,
        )
        .unwrap();

        let children = get_amounts_for_composite(&conn, composite_id).unwrap();
        assert_eq!(children.len(), 1);
        assert_eq!(children[0].id, simple_id);
        assert_eq!(children[0].line_id, None);
    }

    #[test]
    fn test_subpart_unit_round_trip() {
        let conn = test_db();
        let simple_id =
            insert_amount_simple(&conn, None, None, "X s.", None, None, None, false).unwrap();
        insert_subpart(
            &conn,
            simple_id,
            "X s.",
            Some("X"),
            Some(10),
            Some(UnitOfCount::Solidus),
            false,
        )
        .unwrap();

        let subparts = get_subparts(&conn, simple_id).unwrap();
        assert_eq!(subparts.len(), 1);
        assert_eq!(subparts[0].unit_of_count, Some(UnitOfCount::Solidus));
        assert_eq!(subparts[0].arabic_numeral, Some(10));
    }

    #[test]
    fn test_rate_reference_deduplicated_per_line() {
        let conn = test_db();
        let line_id = insert_line(&conn, 1, None, None, "computando X s.").unwrap().unwrap();
        assert!(insert_rate_reference(&conn, line_id, "X s.").unwrap());
        assert!(!insert_rate_reference(&conn, line_id, "X s.").unwrap());
    }

    #[test]
    fn test_unparsed_lines_marker() {
        let conn = test_db();
        let line_id = insert_line(&conn, 1, None, None, "X s.").unwrap().unwrap();
        assert_eq!(get_unparsed_lines(&conn).unwrap().len(), 1);

        mark_line_parsed(&conn, line_id).unwrap();
        assert!(get_unparsed_lines(&conn).unwrap().is_empty());
    }
}
