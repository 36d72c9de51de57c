// Conversion stages
//
// Four passes over the amount tables, each structurally idempotent (the
// work query excludes rows already carrying the stage's output):
//
//   1. smallest-unit: fold a simple amount's unit-bearing subparts into one
//      denarius-equivalent value
//   2. no-unit: amounts with no unit-bearing subpart keep their bare
//      numeral ("VI fl." is six florins, not six denarii)
//   3. convert: express every valued simple amount in a target currency,
//      using the date-nearest rate, its inverse, or triangulation
//   4. aggregate: signed sum of a composite's converted children, deferred
//      until every child has been converted
//
// Converted values are rounded to 3 decimals at the persistence boundary.

use anyhow::Result;
use rusqlite::{params, Connection};

use crate::db::{
    get_amounts_for_composite, get_converted_for_composite, get_converted_for_simple,
    get_subparts, AmountSimple,
};
use crate::rates::{cross_currency_triangulation, find_rate_with_fallback};
use crate::units::normalize_to_smallest_unit;

fn round3(value: f64) -> f64 {
    (value * 1000.0).round() / 1000.0
}

// ============================================================================
// SMALLEST-UNIT STAGE
// ============================================================================

/// Compute the denarius-equivalent value of every simple amount that has
/// unit-bearing subparts and no value yet. Returns the number valued.
pub fn convert_to_smallest_unit(conn: &Connection) -> Result<usize> {
    let mut stmt = conn.prepare(
        "SELECT id FROM amount_simple WHERE smallest_unit_value IS NULL ORDER BY id",
    )?;
    let pending = stmt
        .query_map([], |row| row.get(0))?
        .collect::<Result<Vec<i64>, _>>()?;

    let mut valued = 0usize;
    for amount_id in pending {
        let subparts = get_subparts(conn, amount_id)?;

        let mut unit_values = Vec::new();
        let mut uncertain = false;
        for subpart in &subparts {
            if subpart.uncertainty {
                uncertain = true;
            }
            let Some(unit) = subpart.unit_of_count else {
                continue;
            };
            match subpart.arabic_numeral {
                Some(numeral) => unit_values.push((numeral, unit)),
                // a unit without a readable numeral taints the total
                None => uncertain = true,
            }
        }

        if unit_values.is_empty() {
            continue;
        }
        let total = normalize_to_smallest_unit(&unit_values);
        if total == 0.0 {
            continue;
        }

        conn.execute(
            "UPDATE amount_simple
             SET smallest_unit_value = ?1, smallest_unit_uncertainty = ?2
             WHERE id = ?3",
            params![total, uncertain as i64, amount_id],
        )?;
        valued += 1;
    }

    Ok(valued)
}

// ============================================================================
// NO-UNIT STAGE
// ============================================================================

/// Record the bare numeral of every simple amount whose subparts carry no
/// unit of count. Returns the number valued.
pub fn assign_no_unit_values(conn: &Connection) -> Result<usize> {
    let mut stmt = conn.prepare(
        "SELECT id FROM amount_simple
         WHERE smallest_unit_value IS NULL AND no_unit_value IS NULL
         ORDER BY id",
    )?;
    let pending = stmt
        .query_map([], |row| row.get(0))?
        .collect::<Result<Vec<i64>, _>>()?;

    let mut valued = 0usize;
    for amount_id in pending {
        let subparts = get_subparts(conn, amount_id)?;
        if subparts.iter().any(|s| s.unit_of_count.is_some()) {
            continue;
        }

        let Some(numeral) = subparts
            .iter()
            .filter_map(|s| s.arabic_numeral)
            .find(|&n| n != 0)
        else {
            continue;
        };

        conn.execute(
            "UPDATE amount_simple SET no_unit_value = ?1 WHERE id = ?2",
            params![numeral, amount_id],
        )?;
        valued += 1;
    }

    Ok(valued)
}

// ============================================================================
// CURRENCY CONVERSION
// ============================================================================

/// Date anchoring a simple amount: its own line's standardized date, or
/// its composite's line's date
fn anchor_date(conn: &Connection, amount: &AmountSimple) -> Result<Option<String>> {
    if let Some(line_id) = amount.line_id {
        let date: Option<String> = conn.query_row(
            "SELECT date_standardized FROM line WHERE id = ?1",
            params![line_id],
            |row| row.get(0),
        )?;
        return Ok(date);
    }
    if let Some(composite_id) = amount.amount_composite_id {
        let date: Option<String> = conn.query_row(
            "SELECT l.date_standardized
             FROM amount_composite ac JOIN line l ON l.id = ac.line_id
             WHERE ac.id = ?1",
            params![composite_id],
            |row| row.get(0),
        )?;
        return Ok(date);
    }
    Ok(None)
}

/// Express every valued, currency-identified simple amount in the target
/// currency. Amounts already converted to that currency are skipped, so
/// re-running only picks up new amounts and newly resolvable rates.
/// Returns the number of conversions written.
pub fn convert_simple_amounts(conn: &Connection, target_currency_id: i64) -> Result<usize> {
    let mut stmt = conn.prepare(
        "SELECT id FROM amount_simple s
         WHERE s.currency_standardized_id IS NOT NULL
           AND (s.smallest_unit_value IS NOT NULL OR s.no_unit_value IS NOT NULL)
           AND (s.line_id IS NOT NULL OR s.amount_composite_id IS NOT NULL)
           AND NOT EXISTS (
               SELECT 1 FROM amount_converted c
               WHERE c.amount_simple_id = s.id
                 AND c.currency_standardized_id = ?1)
         ORDER BY s.id",
    )?;
    let pending = stmt
        .query_map(params![target_currency_id], |row| row.get(0))?
        .collect::<Result<Vec<i64>, _>>()?;

    let mut converted = 0usize;
    for amount_id in pending {
        let amount = crate::db::get_amount_simple(conn, amount_id)?;
        let value = match (amount.smallest_unit_value, amount.no_unit_value) {
            (Some(v), _) => v,
            (None, Some(n)) => n as f64,
            (None, None) => continue,
        };
        if value == 0.0 {
            continue;
        }
        let Some(currency_id) = amount.currency_standardized_id else {
            continue;
        };

        if currency_id == target_currency_id {
            conn.execute(
                "INSERT INTO amount_converted (amount_simple_id, currency_standardized_id,
                    amount_converted, amount_original)
                 VALUES (?1, ?2, ?3, 1)",
                params![amount_id, target_currency_id, round3(value)],
            )?;
            converted += 1;
            continue;
        }

        let Some(date) = anchor_date(conn, &amount)? else {
            continue;
        };

        // rate as "amount-currency units per target unit", then divide
        if let Some(rate) = find_rate_with_fallback(conn, &date, target_currency_id, currency_id)?
        {
            conn.execute(
                "INSERT INTO amount_converted (amount_simple_id, currency_standardized_id,
                    exchange_rate_id, amount_converted)
                 VALUES (?1, ?2, ?3, ?4)",
                params![amount_id, target_currency_id, rate.rate_id, round3(value / rate.value)],
            )?;
            converted += 1;
            continue;
        }

        if let Some(tri) =
            cross_currency_triangulation(conn, &date, target_currency_id, currency_id)?
        {
            if tri.value == 0.0 {
                continue;
            }
            conn.execute(
                "INSERT INTO amount_converted (amount_simple_id, currency_standardized_id,
                    exchange_rate_id, exchange_rate_id_additional, amount_converted)
                 VALUES (?1, ?2, ?3, ?4, ?5)",
                params![
                    amount_id,
                    target_currency_id,
                    tri.rate_id,
                    tri.additional_rate_id,
                    round3(value / tri.value),
                ],
            )?;
            converted += 1;
        }
    }

    Ok(converted)
}

// ============================================================================
// COMPOSITE AGGREGATION
// ============================================================================

/// Aggregate each composite's converted children into one converted total
/// per target currency. A composite with any unconverted child is left for
/// a later run. Existing totals are updated in place, never deleted.
/// Returns the number of composites aggregated.
pub fn aggregate_composites(conn: &Connection, target_currency_id: i64) -> Result<usize> {
    let mut stmt = conn.prepare(
        "SELECT DISTINCT amount_composite_id FROM amount_simple
         WHERE amount_composite_id IS NOT NULL
         ORDER BY amount_composite_id",
    )?;
    let composites = stmt
        .query_map([], |row| row.get(0))?
        .collect::<Result<Vec<i64>, _>>()?;

    let mut aggregated = 0usize;
    for composite_id in composites {
        let children = get_amounts_for_composite(conn, composite_id)?;

        let mut total = 0.0f64;
        let mut complete = true;
        for child in &children {
            let Some(child_converted) =
                get_converted_for_simple(conn, child.id, target_currency_id)?
            else {
                complete = false;
                break;
            };
            if child.arithmetic_operator.as_deref() == Some("minus") {
                total -= child_converted.amount_converted;
            } else {
                total += child_converted.amount_converted;
            }
        }
        if !complete {
            continue;
        }

        let total = round3(total);
        match get_converted_for_composite(conn, composite_id, target_currency_id)? {
            Some(existing) => {
                conn.execute(
                    "UPDATE amount_converted SET amount_converted = ?1 WHERE id = ?2",
                    params![total, existing.id],
                )?;
            }
            None => {
                conn.execute(
                    "INSERT INTO amount_converted (amount_composite_id,
                        currency_standardized_id, amount_converted)
                     VALUES (?1, ?2, ?3)",
                    params![composite_id, target_currency_id, total],
                )?;
            }
        }
        aggregated += 1;
    }

    Ok(aggregated)
}

// ============================================================================
// TESTS
// ============================================================================
