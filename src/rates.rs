// Exchange-rate resolution
//
// Rates are anchored to a register line through exchange_rate_reference, so
// every lookup is date-aware: among the candidate rates for a currency pair
// the one whose anchoring line's date lies closest to the query date wins.
//
// rate_value is quoted as "units of target currency per one unit of source
// currency". A rate with a null or zero value is treated as not recorded.

use anyhow::Result;
use rusqlite::{params, Connection, OptionalExtension};

use crate::db::insert_event;
use crate::db::Event;

/// A resolved rate: the exchange_rate row and the value "units of quote
/// currency per one unit of base currency"
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ResolvedRate {
    pub rate_id: i64,
    pub value: f64,
}

/// Rate derived through a common third currency
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TriangulatedRate {
    /// Units of the from-currency per one unit of the to-currency
    pub value: f64,
    /// The to-currency leg (to -> common)
    pub rate_id: i64,
    /// The from-currency leg (from -> common)
    pub additional_rate_id: i64,
}

/// Nearest-date rate for an exact (source, target) pair
pub fn find_exchange_rate(
    conn: &Connection,
    date: &str,
    currency_source_id: i64,
    currency_target_id: i64,
) -> Result<Option<ResolvedRate>> {
    let rate = conn
        .query_row(
            "SELECT er.id, er.rate_value
             FROM exchange_rate er
             JOIN exchange_rate_reference err ON err.exchange_rate_id = er.id
             JOIN line l ON l.id = err.line_id
             WHERE er.currency_source_id = ?1
               AND er.currency_target_id = ?2
               AND er.rate_value IS NOT NULL
               AND er.rate_value != 0
               AND julianday(l.date_standardized) IS NOT NULL
             ORDER BY ABS(julianday(l.date_standardized) - julianday(?3))
             LIMIT 1",
            params![currency_source_id, currency_target_id, date],
            |row| {
                Ok(ResolvedRate {
                    rate_id: row.get(0)?,
                    value: row.get(1)?,
                })
            },
        )
        .optional()?;
    Ok(rate)
}

/// Rate value "units of quote per one unit of base": the direct quotation
/// when recorded, otherwise the inverted reverse quotation
pub fn find_rate_with_fallback(
    conn: &Connection,
    date: &str,
    currency_base_id: i64,
    currency_quote_id: i64,
) -> Result<Option<ResolvedRate>> {
    if let Some(rate) = find_exchange_rate(conn, date, currency_base_id, currency_quote_id)? {
        return Ok(Some(rate));
    }

    if let Some(reverse) = find_exchange_rate(conn, date, currency_quote_id, currency_base_id)? {
        return Ok(Some(ResolvedRate {
            rate_id: reverse.rate_id,
            value: 1.0 / reverse.value,
        }));
    }

    Ok(None)
}

/// Every currency paired with the given one in any recorded rate, in row
/// order, both members of each pair flattened
fn paired_currencies(conn: &Connection, currency_id: i64) -> Result<Vec<i64>> {
    let mut stmt = conn.prepare(
        "SELECT currency_source_id, currency_target_id
         FROM exchange_rate
         WHERE (currency_source_id = ?1 OR currency_target_id = ?1)
           AND currency_source_id IS NOT NULL
           AND currency_target_id IS NOT NULL
         ORDER BY id",
    )?;
    let mut flattened = Vec::new();
    let rows = stmt.query_map(params![currency_id], |row| {
        Ok((row.get::<_, i64>(0)?, row.get::<_, i64>(1)?))
    })?;
    for row in rows {
        let (source, target) = row?;
        flattened.push(source);
        flattened.push(target);
    }
    Ok(flattened)
}

/// Pick the common third currency for triangulating between `currency_to`
/// and `currency_from`: the currency appearing most often across both
/// pair lists; ties go to the earliest appearance (to-list first).
fn pick_common_currency(
    currency_to: i64,
    currency_from: i64,
    to_pairs: &[i64],
    from_pairs: &[i64],
) -> Option<i64> {
    let mut best: Option<(i64, usize)> = None;

    for &candidate in to_pairs.iter().chain(from_pairs.iter()) {
        if candidate == currency_to || candidate == currency_from {
            continue;
        }
        if best.is_some_and(|(id, _)| id == candidate) {
            continue;
        }
        if !to_pairs.contains(&candidate) || !from_pairs.contains(&candidate) {
            continue;
        }
        let count = to_pairs.iter().filter(|&&c| c == candidate).count()
            + from_pairs.iter().filter(|&&c| c == candidate).count();
        // strict comparison keeps the first-seen candidate on ties
        if best.map_or(true, |(_, best_count)| count > best_count) {
            best = Some((candidate, count));
        }
    }

    best.map(|(id, _)| id)
}

/// Derive a rate between two currencies with no recorded pair by routing
/// both through their most-quoted common third currency
pub fn cross_currency_triangulation(
    conn: &Connection,
    date: &str,
    currency_to: i64,
    currency_from: i64,
) -> Result<Option<TriangulatedRate>> {
    let to_pairs = paired_currencies(conn, currency_to)?;
    let from_pairs = paired_currencies(conn, currency_from)?;

    let Some(common) = pick_common_currency(currency_to, currency_from, &to_pairs, &from_pairs)
    else {
        return Ok(None);
    };

    let Some(to_leg) = find_rate_with_fallback(conn, date, currency_to, common)? else {
        return Ok(None);
    };
    let Some(from_leg) = find_rate_with_fallback(conn, date, currency_from, common)? else {
        return Ok(None);
    };
    if from_leg.value == 0.0 {
        return Ok(None);
    }

    // (common per to) / (common per from) = from per to
    let value = to_leg.value / from_leg.value;

    insert_event(
        conn,
        &Event::new(
            "rate_triangulated",
            "exchange_rate",
            &to_leg.rate_id.to_string(),
            serde_json::json!({
                "currency_to": currency_to,
                "currency_from": currency_from,
                "common_currency": common,
                "value": value,
            }),
            "system",
        ),
    )?;

    Ok(Some(TriangulatedRate {
        value,
        rate_id: to_leg.rate_id,
        additional_rate_id: from_leg.rate_id,
    }))
}

// ============================================================================
// RATE-VALUE COMPUTATION
// ============================================================================

/// Value of one side of a rate definition: denarius-equivalent when the
/// amount has one, bare numeral otherwise, 1 when no amount is linked
fn rate_side_value(conn: &Connection, amount_simple_id: Option<i64>) -> Result<f64> {
    let Some(id) = amount_simple_id else {
        return Ok(1.0);
    };
    let amount = crate::db::get_amount_simple(conn, id)?;
    if let Some(value) = amount.smallest_unit_value {
        return Ok(value);
    }
    if let Some(value) = amount.no_unit_value {
        return Ok(value as f64);
    }
    Ok(1.0)
}

/// Fill rate_value for every rate that has curated source/target amounts
/// but no value yet. Returns the number of rates valued.
pub fn calculate_exchange_rate_values(conn: &Connection) -> Result<usize> {
    let mut stmt = conn.prepare(
        "SELECT id, amount_simple_source_id, amount_simple_target_id
         FROM exchange_rate
         WHERE rate_value IS NULL
           AND (amount_simple_source_id IS NOT NULL OR amount_simple_target_id IS NOT NULL)
         ORDER BY id",
    )?;
    let pending = stmt
        .query_map([], |row| {
            Ok((
                row.get::<_, i64>(0)?,
                row.get::<_, Option<i64>>(1)?,
                row.get::<_, Option<i64>>(2)?,
            ))
        })?
        .collect::<Result<Vec<_>, _>>()?;

    let mut valued = 0usize;
    for (rate_id, source_amount, target_amount) in pending {
        let base = rate_side_value(conn, source_amount)?;
        let quote = rate_side_value(conn, target_amount)?;
        if base == 0.0 {
            continue;
        }
        conn.execute(
            "UPDATE exchange_rate SET rate_value = ?1 WHERE id = ?2",
            params![quote / base, rate_id],
        )?;
        valued += 1;
    }

    Ok(valued)
}

// ============================================================================
// TESTS
// ============================================================================
