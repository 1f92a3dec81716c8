use std::fs;

use anyhow::{bail, Context, Result};
use clap::Parser;
use rusqlite::types::ValueRef;
use rusqlite::Connection;
use serde::Serialize;
use tracing_subscriber::EnvFilter;

use rewind_kernel::engine::UndoRedo;

/// Rewind script driver
#[derive(Parser, Debug)]
#[command(name = "rewind")]
#[command(about = "Scripted undo/redo over a SQLite database", long_about = None)]
struct Cli {
    /// Path to the SQLite database (in-memory when omitted)
    #[arg(long)]
    db: Option<String>,

    /// Tables to capture, comma separated
    #[arg(long, value_delimiter = ',', required = true)]
    tables: Vec<String>,

    /// Script to run: lines starting with `.` drive the engine; `#`
    /// and `--` lines are comments; anything else runs as SQL
    script: String,
}

/// One observation recorded while the script ran.
#[derive(Debug, Serialize)]
struct Snapshot {
    line: usize,
    label: String,
    value: serde_json::Value,
}

/// Wrapper for JSON output
#[derive(Debug, Serialize)]
struct RunReport {
    script: String,
    snapshots: Vec<Snapshot>,
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();

    // ----------------------------
    // Open the database
    // ----------------------------
    let conn = match &cli.db {
        Some(path) => Connection::open(path).with_context(|| format!("open {path}"))?,
        None => Connection::open_in_memory().context("open in-memory database")?,
    };

    // ----------------------------
    // Activate capture
    // ----------------------------
    let mut engine = UndoRedo::new(&conn);
    engine.activate(&cli.tables)?;

    // ----------------------------
    // Run the script
    // ----------------------------
    let script = fs::read_to_string(&cli.script).with_context(|| format!("read {}", cli.script))?;
    let snapshots = run_script(&conn, &mut engine, &script)?;
    engine.deactivate()?;

    // ----------------------------
    // Output
    // ----------------------------
    let report = RunReport {
        script: cli.script,
        snapshots,
    };
    println!("{}", serde_json::to_string_pretty(&report)?);

    Ok(())
}

fn run_script(
    conn: &Connection,
    engine: &mut UndoRedo<'_>,
    script: &str,
) -> Result<Vec<Snapshot>> {
    let mut snapshots = Vec::new();

    for (index, raw) in script.lines().enumerate() {
        let line_no = index + 1;
        let line = raw.trim();
        if line.is_empty() || line.starts_with('#') || line.starts_with("--") {
            continue;
        }
        if let Some(directive) = line.strip_prefix('.') {
            apply_directive(conn, engine, directive, line_no, &mut snapshots)
                .with_context(|| format!("line {line_no}: .{directive}"))?;
        } else {
            conn.execute_batch(line)
                .with_context(|| format!("line {line_no}: {line}"))?;
        }
    }

    Ok(snapshots)
}

fn apply_directive(
    conn: &Connection,
    engine: &mut UndoRedo<'_>,
    directive: &str,
    line: usize,
    snapshots: &mut Vec<Snapshot>,
) -> Result<()> {
    let mut parts = directive.split_whitespace();
    let name = parts.next().unwrap_or("");
    let argument = parts.next();
    if parts.next().is_some() {
        bail!("malformed directive: .{directive}");
    }

    match (name, argument) {
        ("barrier", None) => engine.barrier()?,
        ("commit", None) => engine.commit()?,
        ("undo", None) => engine.undo()?,
        ("redo", None) => engine.redo()?,
        ("freeze", None) => engine.freeze()?,
        ("unfreeze", None) => engine.unfreeze()?,
        ("status", None) => snapshots.push(Snapshot {
            line,
            label: "status".to_string(),
            value: serde_json::to_value(engine.status())?,
        }),
        ("dump", Some(table)) => snapshots.push(Snapshot {
            line,
            label: format!("dump {table}"),
            value: dump_table(conn, table)?,
        }),
        _ => bail!("unknown directive: .{directive}"),
    }
    Ok(())
}

/// Render every row of `table` as a JSON object keyed by column name,
/// rowid included.
fn dump_table(conn: &Connection, table: &str) -> Result<serde_json::Value> {
    let mut stmt = conn.prepare(&format!("SELECT rowid, * FROM {table} ORDER BY rowid"))?;
    let columns: Vec<String> = stmt.column_names().iter().map(|c| c.to_string()).collect();

    let mapped = stmt.query_map([], |row| {
        let mut object = serde_json::Map::new();
        for (index, name) in columns.iter().enumerate() {
            object.insert(name.clone(), render_value(row.get_ref(index)?));
        }
        Ok(serde_json::Value::Object(object))
    })?;

    let mut rows = Vec::new();
    for row in mapped {
        rows.push(row?);
    }
    Ok(serde_json::Value::Array(rows))
}

fn render_value(value: ValueRef<'_>) -> serde_json::Value {
    match value {
        ValueRef::Null => serde_json::Value::Null,
        ValueRef::Integer(i) => serde_json::Value::from(i),
        ValueRef::Real(f) => serde_json::Value::from(f),
        ValueRef::Text(text) => serde_json::Value::from(String::from_utf8_lossy(text).into_owned()),
        ValueRef::Blob(blob) => serde_json::Value::from(format!("blob({} bytes)", blob.len())),
    }
}
