// Trigger Generator
//
// Builds the three row-level capture hooks for one table: AFTER
// INSERT, AFTER UPDATE and BEFORE DELETE triggers that append the
// inverse of each change to the change log. Rows are addressed by
// rowid, so only rowid tables can be captured.
//
// NOTE:
// Table and column names are interpolated into trigger DDL verbatim.
// They must come from schema introspection or other trusted input,
// never from untrusted callers.

use rusqlite::{params, Connection};

use crate::log::LOG_TABLE;

/// Errors raised while installing or removing capture triggers.
#[derive(Debug, thiserror::Error)]
pub enum TriggerError {
    #[error("unknown table: {0}")]
    UnknownTable(String),

    #[error(transparent)]
    Storage(#[from] rusqlite::Error),
}

/// Ordered column names of `table`, from `pragma_table_info`.
///
/// An empty column list means the table does not exist.
pub fn table_columns(conn: &Connection, table: &str) -> Result<Vec<String>, TriggerError> {
    let mut stmt = conn.prepare("SELECT name FROM pragma_table_info(?1)")?;
    let rows = stmt.query_map(params![table], |row| row.get::<_, String>(0))?;
    let columns = rows.collect::<Result<Vec<_>, _>>()?;

    if columns.is_empty() {
        return Err(TriggerError::UnknownTable(table.to_string()));
    }
    Ok(columns)
}

fn trigger_names(table: &str) -> [String; 3] {
    [
        format!("_{table}_it"),
        format!("_{table}_ut"),
        format!("_{table}_dt"),
    ]
}

/// Install the three capture triggers for `table`.
///
/// Each trigger logs one inverse statement per affected row:
/// - insert logs `DELETE FROM t WHERE rowid=...`
/// - update logs `UPDATE t SET c=...` restoring every old column value
/// - delete logs `INSERT INTO t(rowid, ...)` rebuilding the full row
///
/// Old values are rendered with SQLite's `quote()` inside the trigger
/// body, so capture happens in the same transaction as the change it
/// inverts.
pub fn install(conn: &Connection, table: &str) -> Result<(), TriggerError> {
    let columns = table_columns(conn, table)?;
    let [insert_trigger, update_trigger, delete_trigger] = trigger_names(table);

    let set_clause = columns
        .iter()
        .map(|c| format!("{c}='||quote(old.{c})||'"))
        .collect::<Vec<_>>()
        .join(",");
    let column_list = columns.join(",");
    let value_list = columns
        .iter()
        .map(|c| format!("'||quote(old.{c})||'"))
        .collect::<Vec<_>>()
        .join(",");

    let ddl = format!(
        "CREATE TEMP TRIGGER {insert_trigger} AFTER INSERT ON {table} BEGIN\n\
           INSERT INTO {LOG_TABLE}(seq, sql) VALUES(NULL, 'DELETE FROM {table} WHERE rowid='||new.rowid);\n\
         END;\n\
         CREATE TEMP TRIGGER {update_trigger} AFTER UPDATE ON {table} BEGIN\n\
           INSERT INTO {LOG_TABLE}(seq, sql) VALUES(NULL, 'UPDATE {table} SET {set_clause} WHERE rowid='||old.rowid);\n\
         END;\n\
         CREATE TEMP TRIGGER {delete_trigger} BEFORE DELETE ON {table} BEGIN\n\
           INSERT INTO {LOG_TABLE}(seq, sql) VALUES(NULL, 'INSERT INTO {table}(rowid,{column_list}) VALUES('||old.rowid||',{value_list})');\n\
         END;"
    );
    conn.execute_batch(&ddl)?;
    Ok(())
}

/// Remove exactly the three triggers [`install`] created for `table`.
///
/// Already-logged entries are untouched, and triggers belonging to
/// other tables (or to the host application) are never dropped.
pub fn uninstall(conn: &Connection, table: &str) -> Result<(), TriggerError> {
    let [insert_trigger, update_trigger, delete_trigger] = trigger_names(table);
    conn.execute_batch(&format!(
        "DROP TRIGGER IF EXISTS {insert_trigger};\n\
         DROP TRIGGER IF EXISTS {update_trigger};\n\
         DROP TRIGGER IF EXISTS {delete_trigger};"
    ))?;
    Ok(())
}
