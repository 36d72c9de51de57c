// Computus - Medieval Account Register Amount Engine
// Exposes all modules for use in the CLI and tests

pub mod amount;
pub mod convert;
pub mod currency;
pub mod db;
pub mod lexer;
pub mod numerals;
pub mod pipeline;
pub mod rates;
pub mod resolve;
pub mod units;

// Re-export commonly used types
pub use amount::{decompose_simple, extract_subparts, parse_line, AmountKind, ParsedLine};
pub use convert::{
    aggregate_composites, assign_no_unit_values, convert_simple_amounts, convert_to_smallest_unit,
};
pub use currency::resolve_currency;
pub use db::{
    setup_database, AmountComposite, AmountSimple, AmountSubpart, ConvertedAmount,
    CurrencyStandardized, Event, ExchangeRate, Line,
};
pub use numerals::{complex_roman_to_arabic, roman_to_arabic};
pub use pipeline::{
    import_currencies_csv, import_lines_csv, parse_lines, run_postprocessing, ImportStats,
    ParseStats,
};
pub use rates::{
    calculate_exchange_rate_values, cross_currency_triangulation, find_exchange_rate,
    find_rate_with_fallback, ResolvedRate, TriangulatedRate,
};
pub use units::{normalize_to_smallest_unit, UnitOfCount};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
