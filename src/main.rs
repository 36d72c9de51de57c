use std::env;
use std::path::Path;

use anyhow::Result;
use rusqlite::Connection;

use computus::{
    import_currencies_csv, import_lines_csv, parse_lines, run_postprocessing, setup_database,
};

const DEFAULT_DB: &str = "computus.db";

fn main() -> Result<()> {
    let args: Vec<String> = env::args().collect();

    match args.get(1).map(String::as_str) {
        Some("init") => run_init(),
        Some("import-lines") => match args.get(2) {
            Some(path) => run_import_lines(path),
            None => usage(),
        },
        Some("import-currencies") => match args.get(2) {
            Some(path) => run_import_currencies(path),
            None => usage(),
        },
        Some("parse") => run_parse(),
        Some("convert") => match args.get(2) {
            Some(currency) => run_convert(currency),
            None => usage(),
        },
        _ => usage(),
    }
}

fn usage() -> Result<()> {
    eprintln!("Usage: computus <command>");
    eprintln!();
    eprintln!("Commands:");
    eprintln!("  init                       Create the database");
    eprintln!("  import-lines <csv>         Import register lines");
    eprintln!("  import-currencies <csv>    Import currencies and their variants");
    eprintln!("  parse                      Extract amounts from unparsed lines");
    eprintln!("  convert <currency>         Run postprocessing into a target currency");
    std::process::exit(1);
}

fn open_db() -> Result<Connection> {
    let conn = Connection::open(Path::new(DEFAULT_DB))?;
    setup_database(&conn)?;
    Ok(conn)
}

fn run_init() -> Result<()> {
    open_db()?;
    println!("✓ Database initialized with WAL mode");
    Ok(())
}

fn run_import_lines(path: &str) -> Result<()> {
    let conn = open_db()?;
    let stats = import_lines_csv(&conn, Path::new(path))?;
    println!(
        "✓ Imported {} lines ({} duplicates skipped)",
        stats.inserted, stats.skipped
    );
    Ok(())
}

fn run_import_currencies(path: &str) -> Result<()> {
    let conn = open_db()?;
    let imported = import_currencies_csv(&conn, Path::new(path))?;
    println!("✓ Imported {} currencies", imported);
    Ok(())
}

fn run_parse() -> Result<()> {
    let conn = open_db()?;
    let stats = parse_lines(&conn)?;
    println!(
        "✓ Parsed {} lines: {} simple amounts, {} composites, {} rate references",
        stats.lines, stats.simples, stats.composites, stats.rate_references
    );
    Ok(())
}

fn run_convert(currency: &str) -> Result<()> {
    let conn = open_db()?;
    run_postprocessing(&conn, currency)?;
    Ok(())
}
