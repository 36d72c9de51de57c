// Pipeline orchestration
//
// Imports, the parse stage, and the postprocessing chain. Every stage is
// re-runnable: imports deduplicate on content hashes, the parse stage only
// touches lines without the parsed marker, and the value/conversion stages
// filter on missing output.

use std::fs::File;
use std::io::Read;
use std::path::Path;

use anyhow::{bail, Context, Result};
use chrono::NaiveDate;
use rusqlite::{params, Connection};
use serde::Deserialize;

use crate::amount::{decompose_simple, extract_subparts, parse_line, AmountKind};
use crate::convert::{
    aggregate_composites, assign_no_unit_values, convert_simple_amounts, convert_to_smallest_unit,
};
use crate::currency::resolve_currency;
use crate::db::{
    get_currency_by_name, get_unparsed_lines, insert_amount_composite, insert_amount_simple,
    insert_currency, insert_currency_variant, insert_event, insert_line, insert_rate_reference,
    insert_subpart, mark_line_parsed, Event,
};
use crate::rates::calculate_exchange_rate_values;

// ============================================================================
// IMPORTS
// ============================================================================

#[derive(Debug, Deserialize)]
struct LineRecord {
    line_number: i64,
    #[serde(default)]
    folio: String,
    #[serde(default)]
    date_standardized: String,
    text: String,
}

#[derive(Debug, Deserialize)]
struct CurrencyRecord {
    currency_name: String,
    #[serde(default)]
    variant_name: String,
}

#[derive(Debug, Default, Clone, Copy)]
pub struct ImportStats {
    pub inserted: usize,
    pub skipped: usize,
}

/// Import register lines from CSV (line_number, folio, date_standardized,
/// text). Folio and date cells left empty inherit from the preceding line;
/// a multi-folio cell like "34r,34v" carries its last member forward.
pub fn import_lines<R: Read>(conn: &Connection, reader: R) -> Result<ImportStats> {
    let mut csv_reader = csv::Reader::from_reader(reader);
    let mut stats = ImportStats::default();

    let mut previous_folio: Option<String> = None;
    let mut previous_date: Option<String> = None;

    for record in csv_reader.deserialize() {
        let record: LineRecord = record.context("Failed to read line record")?;

        let folio_cell = record.folio.trim();
        let folio = if folio_cell.is_empty() {
            previous_folio.clone()
        } else {
            previous_folio = folio_cell
                .rsplit(',')
                .next()
                .map(|member| member.trim().to_string());
            Some(folio_cell.to_string())
        };

        // an unreadable date cell would poison julianday() rate lookups,
        // so it inherits like an empty one
        let date_cell = record.date_standardized.trim();
        let date = if date_cell.is_empty()
            || NaiveDate::parse_from_str(date_cell, "%Y-%m-%d").is_err()
        {
            previous_date.clone()
        } else {
            previous_date = Some(date_cell.to_string());
            Some(date_cell.to_string())
        };

        let inserted = insert_line(
            conn,
            record.line_number,
            folio.as_deref(),
            date.as_deref(),
            &record.text,
        )?;
        match inserted {
            Some(_) => stats.inserted += 1,
            None => stats.skipped += 1,
        }
    }

    insert_event(
        conn,
        &Event::new(
            "lines_imported",
            "line",
            "batch",
            serde_json::json!({ "inserted": stats.inserted, "skipped": stats.skipped }),
            "system",
        ),
    )?;

    Ok(stats)
}

pub fn import_lines_csv(conn: &Connection, path: &Path) -> Result<ImportStats> {
    let file =
        File::open(path).with_context(|| format!("Failed to open {}", path.display()))?;
    import_lines(conn, file)
}

/// Import currencies from CSV (currency_name, variant_name). Repeated
/// canonical names accumulate variants under one currency row.
pub fn import_currencies<R: Read>(conn: &Connection, reader: R) -> Result<usize> {
    let mut csv_reader = csv::Reader::from_reader(reader);
    let mut imported = 0usize;

    for record in csv_reader.deserialize() {
        let record: CurrencyRecord = record.context("Failed to read currency record")?;

        let currency_id = match get_currency_by_name(conn, &record.currency_name)? {
            Some(id) => id,
            None => {
                imported += 1;
                insert_currency(conn, &record.currency_name)?
            }
        };

        let variant = record.variant_name.trim();
        if !variant.is_empty() {
            insert_currency_variant(conn, variant, currency_id)?;
        }
    }

    Ok(imported)
}

pub fn import_currencies_csv(conn: &Connection, path: &Path) -> Result<usize> {
    let file =
        File::open(path).with_context(|| format!("Failed to open {}", path.display()))?;
    import_currencies(conn, file)
}

// ============================================================================
// PARSE STAGE
// ============================================================================

#[derive(Debug, Default, Clone, Copy)]
pub struct ParseStats {
    pub lines: usize,
    pub simples: usize,
    pub composites: usize,
    pub rate_references: usize,
}

/// Persist one extracted simple amount with its subparts
fn store_simple(
    conn: &Connection,
    line_id: Option<i64>,
    composite_id: Option<i64>,
    raw: &str,
) -> Result<i64> {
    let simple = decompose_simple(raw);

    let currency_standardized_id = match simple.currency_extracted.as_deref() {
        Some(token) => resolve_currency(conn, token)?,
        None => None,
    };

    let amount_id = insert_amount_simple(
        conn,
        line_id,
        composite_id,
        &simple.raw,
        simple.currency_extracted.as_deref(),
        currency_standardized_id,
        simple.arithmetic_operator.as_deref(),
        simple.uncertainty,
    )?;

    for subpart in &simple.subparts {
        insert_subpart(
            conn,
            amount_id,
            &subpart.raw,
            subpart.roman_numeral.as_deref(),
            subpart.arabic_numeral,
            subpart.unit_of_count,
            subpart.uncertainty,
        )?;
    }

    Ok(amount_id)
}

/// Run amount extraction over every line not yet marked parsed
pub fn parse_lines(conn: &Connection) -> Result<ParseStats> {
    let lines = get_unparsed_lines(conn)?;
    let mut stats = ParseStats::default();

    for line in &lines {
        let parsed = parse_line(&line.text);

        match parsed.kind {
            AmountKind::None => {
                // a located segment that yielded nothing still needs review
                if let Some(segment) = parsed.segment.as_deref() {
                    if parsed.uncertainty {
                        insert_amount_composite(conn, Some(line.id), segment, true)?;
                    }
                }
            }
            AmountKind::Simple => {
                store_simple(conn, Some(line.id), None, &parsed.matches[0])?;
                stats.simples += 1;
            }
            AmountKind::Composite => {
                let segment = parsed.segment.as_deref().unwrap_or_default();
                let composite_id =
                    insert_amount_composite(conn, Some(line.id), segment, false)?;
                for raw in &parsed.matches {
                    store_simple(conn, None, Some(composite_id), raw)?;
                    stats.simples += 1;
                }
                stats.composites += 1;

                if parsed.rate_marker && insert_rate_reference(conn, line.id, segment)? {
                    stats.rate_references += 1;
                }
            }
        }

        mark_line_parsed(conn, line.id)?;
        stats.lines += 1;
    }

    insert_event(
        conn,
        &Event::new(
            "lines_parsed",
            "line",
            "batch",
            serde_json::json!({
                "lines": stats.lines,
                "simples": stats.simples,
                "composites": stats.composites,
                "rate_references": stats.rate_references,
            }),
            "system",
        ),
    )?;

    Ok(stats)
}

// ============================================================================
// POSTPROCESSING STAGES
// ============================================================================

/// Decompose the curated rate-definition amounts (owned by neither line nor
/// composite) that have no subparts yet
pub fn process_rate_reference_subparts(conn: &Connection) -> Result<usize> {
    let mut stmt = conn.prepare(
        "SELECT id, amount_simple_extracted FROM amount_simple s
         WHERE s.line_id IS NULL
           AND s.amount_composite_id IS NULL
           AND NOT EXISTS (
               SELECT 1 FROM amount_subpart sp WHERE sp.amount_simple_id = s.id)
         ORDER BY s.id",
    )?;
    let pending = stmt
        .query_map([], |row| Ok((row.get::<_, i64>(0)?, row.get::<_, String>(1)?)))?
        .collect::<Result<Vec<_>, _>>()?;

    let mut decomposed = 0usize;
    for (amount_id, extracted) in pending {
        let subparts = extract_subparts(&extracted);
        if subparts.is_empty() {
            continue;
        }
        for subpart in &subparts {
            insert_subpart(
                conn,
                amount_id,
                &subpart.raw,
                subpart.roman_numeral.as_deref(),
                subpart.arabic_numeral,
                subpart.unit_of_count,
                subpart.uncertainty,
            )?;
        }
        decomposed += 1;
    }

    Ok(decomposed)
}

/// Retry currency identification for amounts whose token found no match on
/// a previous run (currencies can be imported after parsing)
pub fn resolve_pending_currencies(conn: &Connection) -> Result<usize> {
    let mut stmt = conn.prepare(
        "SELECT id, currency_extracted FROM amount_simple
         WHERE currency_extracted IS NOT NULL AND currency_standardized_id IS NULL
         ORDER BY id",
    )?;
    let pending = stmt
        .query_map([], |row| Ok((row.get::<_, i64>(0)?, row.get::<_, String>(1)?)))?
        .collect::<Result<Vec<_>, _>>()?;

    let mut resolved = 0usize;
    for (amount_id, token) in pending {
        if let Some(currency_id) = resolve_currency(conn, &token)? {
            conn.execute(
                "UPDATE amount_simple SET currency_standardized_id = ?1 WHERE id = ?2",
                params![currency_id, amount_id],
            )?;
            resolved += 1;
        }
    }

    Ok(resolved)
}

/// Run the full postprocessing chain, converting everything convertible
/// into the named target currency
pub fn run_postprocessing(conn: &Connection, target_currency: &str) -> Result<()> {
    let Some(target_currency_id) = get_currency_by_name(conn, target_currency)? else {
        bail!("Unknown target currency '{}'", target_currency);
    };

    let rate_amounts = process_rate_reference_subparts(conn)?;
    println!("✓ Decomposed {} rate-definition amounts", rate_amounts);

    let resolved = resolve_pending_currencies(conn)?;
    println!("✓ Resolved {} pending currency tokens", resolved);

    let smallest = convert_to_smallest_unit(conn)?;
    println!("✓ Computed {} smallest-unit values", smallest);

    let no_unit = assign_no_unit_values(conn)?;
    println!("✓ Assigned {} no-unit values", no_unit);

    let rates = calculate_exchange_rate_values(conn)?;
    println!("✓ Valued {} exchange rates", rates);

    let converted = convert_simple_amounts(conn, target_currency_id)?;
    println!("✓ Converted {} simple amounts to {}", converted, target_currency);

    let aggregated = aggregate_composites(conn, target_currency_id)?;
    println!("✓ Aggregated {} composite amounts", aggregated);

    insert_event(
        conn,
        &Event::new(
            "postprocessing_completed",
            "pipeline",
            target_currency,
            serde_json::json!({
                "rate_amounts_decomposed": rate_amounts,
                "currencies_resolved": resolved,
                "smallest_unit_values": smallest,
                "no_unit_values": no_unit,
                "rates_valued": rates,
                "amounts_converted": converted,
                "composites_aggregated": aggregated,
            }),
            "system",
        ),
    )?;

    Ok(())
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::{
        count_converted, get_amounts_for_line, get_converted_for_simple, get_subparts,
        insert_exchange_rate, link_rate_to_line, setup_database,
    };

    fn test_db() -> Connection {
        let conn = Connection::open_in_memory().unwrap();
        setup_database(&conn).unwrap();
        conn
    }

    const LINES_CSV: &str = "\
line_number,folio,date_standardized,text
1,\"34r,34v\",1317-05-01,Item pro vino empto: X s. vien.
2,,,Item pro cambio: computando I fl. XII s. vien.
3,35r,1317-06-01,Item pro pane: VI fl.
";

    const CURRENCIES_CSV: &str = "\
currency_name,variant_name
florenus,fl.
viennensis,vien.
viennensis,wien.
";

    #[test]
    fn test_import_lines_folio_and_date_carry_over() {
        let conn = test_db();
        let stats = import_lines(&conn, LINES_CSV.as_bytes()).unwrap();
        assert_eq!(stats.inserted, 3);
        assert_eq!(stats.skipped, 0);

        let (folio, date): (Option<String>, Option<String>) = conn
            .query_row(
                "SELECT folio, date_standardized FROM line WHERE line_number = 2",
                [],
                |row| Ok((row.get(0)?, row.get(1)?)),
            )
            .unwrap();
        // inherits the last folio member and the preceding date
        assert_eq!(folio.as_deref(), Some("34v"));
        assert_eq!(date.as_deref(), Some("1317-05-01"));
    }

    #[test]
    fn test_import_lines_rejects_unreadable_date() {
        let conn = test_db();
        let csv = "\
line_number,folio,date_standardized,text
1,34r,1317-05-01,Item pro vino: X s. vien.
2,34v,quinta die maii,Item pro pane: VI fl.
3,35r,,Item pro sale: II s. vien.
";
        import_lines(&conn, csv.as_bytes()).unwrap();

        // the unreadable cell inherits like an empty one and is not
        // carried forward
        let dates: Vec<Option<String>> = {
            let mut stmt = conn
                .prepare("SELECT date_standardized FROM line ORDER BY line_number")
                .unwrap();
            stmt.query_map([], |row| row.get(0))
                .unwrap()
                .collect::<Result<_, _>>()
                .unwrap()
        };
        assert_eq!(
            dates,
            vec![
                Some("1317-05-01".to_string()),
                Some("1317-05-01".to_string()),
                Some("1317-05-01".to_string()),
            ]
        );
    }

    #[test]
    fn test_import_lines_deduplicates_on_reimport() {
        let conn = test_db();
        import_lines(&conn, LINES_CSV.as_bytes()).unwrap();
        let again = import_lines(&conn, LINES_CSV.as_bytes()).unwrap();
        assert_eq!(again.inserted, 0);
        assert_eq!(again.skipped, 3);
    }

    #[test]
    fn test_import_currencies_groups_variants() {
        let conn = test_db();
        assert_eq!(import_currencies(&conn, CURRENCIES_CSV.as_bytes()).unwrap(), 2);

        let variants: i64 = conn
            .query_row("SELECT COUNT(*) FROM currency_variant", [], |row| row.get(0))
            .unwrap();
        assert_eq!(variants, 3);
    }

    #[test]
    fn test_parse_lines_stores_amounts_and_rate_reference() {
        let conn = test_db();
        import_currencies(&conn, CURRENCIES_CSV.as_bytes()).unwrap();
        import_lines(&conn, LINES_CSV.as_bytes()).unwrap();

        let stats = parse_lines(&conn).unwrap();
        assert_eq!(stats.lines, 3);
        // line 1 and 3 are simple; line 2 is a two-part rate composite
        assert_eq!(stats.simples, 4);
        assert_eq!(stats.composites, 1);
        assert_eq!(stats.rate_references, 1);

        // only new lines are picked up on a second run
        let again = parse_lines(&conn).unwrap();
        assert_eq!(again.lines, 0);

        let line1: i64 = conn
            .query_row("SELECT id FROM line WHERE line_number = 1", [], |row| row.get(0))
            .unwrap();
        let amounts = get_amounts_for_line(&conn, line1).unwrap();
        assert_eq!(amounts.len(), 1);
        assert_eq!(amounts[0].currency_extracted.as_deref(), Some("vien."));
        assert!(amounts[0].currency_standardized_id.is_some());
        assert_eq!(get_subparts(&conn, amounts[0].id).unwrap().len(), 1);
    }

    #[test]
    fn test_full_pipeline_converts_and_is_idempotent() {
        let conn = test_db();
        import_currencies(&conn, CURRENCIES_CSV.as_bytes()).unwrap();
        import_lines(&conn, LINES_CSV.as_bytes()).unwrap();
        parse_lines(&conn).unwrap();

        let florenus = get_currency_by_name(&conn, "florenus").unwrap().unwrap();
        let viennensis = get_currency_by_name(&conn, "viennensis").unwrap().unwrap();

        // curated rate definition: 1 florin = 12 s. viennensis (144 denarii),
        // anchored to the "computando" line
        let source = insert_amount_simple(
            &conn, None, None, "I fl.", Some("fl."), Some(florenus), None, false,
        )
        .unwrap();
        let target = insert_amount_simple(
            &conn, None, None, "XII s. vien.", Some("vien."), Some(viennensis), None, false,
        )
        .unwrap();
        let rate_id = insert_exchange_rate(
            &conn, Some(florenus), Some(viennensis), Some(source), Some(target), None,
        )
        .unwrap();
        let rate_line: i64 = conn
            .query_row("SELECT id FROM line WHERE line_number = 2", [], |row| row.get(0))
            .unwrap();
        link_rate_to_line(&conn, rate_id, rate_line).unwrap();

        run_postprocessing(&conn, "florenus").unwrap();

        // X s. vien. = 120 denarii; 120 / 144 = 0.833 florins
        let line1: i64 = conn
            .query_row("SELECT id FROM line WHERE line_number = 1", [], |row| row.get(0))
            .unwrap();
        let amount = &get_amounts_for_line(&conn, line1).unwrap()[0];
        let converted = get_converted_for_simple(&conn, amount.id, florenus)
            .unwrap()
            .unwrap();
        assert_eq!(converted.amount_converted, 0.833);
        assert_eq!(converted.exchange_rate_id, Some(rate_id));

        // the florin amount converts as original
        let line3: i64 = conn
            .query_row("SELECT id FROM line WHERE line_number = 3", [], |row| row.get(0))
            .unwrap();
        let florin_amount = &get_amounts_for_line(&conn, line3).unwrap()[0];
        let original = get_converted_for_simple(&conn, florin_amount.id, florenus)
            .unwrap()
            .unwrap();
        assert!(original.amount_original);
        assert_eq!(original.amount_converted, 6.0);

        // a second full run changes nothing
        let before = count_converted(&conn).unwrap();
        run_postprocessing(&conn, "florenus").unwrap();
        assert_eq!(count_converted(&conn).unwrap(), before);
    }

    #[test]
    fn test_unknown_target_currency_is_an_error() {
        let conn = test_db();
        assert!(run_postprocessing(&conn, "denarius novus").is_err());
    }
}
