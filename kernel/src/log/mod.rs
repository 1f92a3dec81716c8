// Change Log
//
// Append-only ledger of inverse statements captured by the row-level
// triggers. Lives in a per-connection TEMP table, so the log never
// outlives the session and is invisible to other connections.

use rusqlite::{params, Connection};

/// Position of an entry in the change log.
///
/// Sequences increase strictly with each captured change and are never
/// reused within a session: the log table allocates them with
/// `AUTOINCREMENT`, so deleting the tail cannot recycle a number into
/// a later entry.
pub type Sequence = i64;

/// Name of the log table created in the TEMP schema.
pub(crate) const LOG_TABLE: &str = "undolog";

/// One captured inverse operation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogEntry {
    pub seq: Sequence,
    pub statement: String,
}

/// Read/delete access to the change log over a borrowed connection.
///
/// Entries are appended by the capture triggers and leave only through
/// replay or unfreeze; none is ever mutated in place. All range
/// predicates here are closed (`begin` and `end` inclusive) and
/// parameterized.
#[derive(Debug, Clone, Copy)]
pub struct ChangeLog<'c> {
    conn: &'c Connection,
}

impl<'c> ChangeLog<'c> {
    pub fn new(conn: &'c Connection) -> Self {
        Self { conn }
    }

    /// Create the log table, replacing any stale one left on this
    /// connection by an earlier session.
    pub fn create(&self) -> rusqlite::Result<()> {
        self.conn.execute_batch(&format!(
            "DROP TABLE IF EXISTS {LOG_TABLE};\n\
             CREATE TEMP TABLE {LOG_TABLE}(seq INTEGER PRIMARY KEY AUTOINCREMENT, sql TEXT NOT NULL);"
        ))
    }

    /// Drop the log table. Safe to call when it does not exist.
    pub fn destroy(&self) -> rusqlite::Result<()> {
        self.conn
            .execute_batch(&format!("DROP TABLE IF EXISTS {LOG_TABLE};"))
    }

    /// Highest live sequence in the log, or 0 when the log is empty.
    pub fn last_sequence(&self) -> rusqlite::Result<Sequence> {
        self.conn.query_row(
            &format!("SELECT coalesce(max(seq), 0) FROM {LOG_TABLE}"),
            [],
            |row| row.get(0),
        )
    }

    /// Sequence the next captured change would start from.
    pub fn next_sequence(&self) -> rusqlite::Result<Sequence> {
        Ok(self.last_sequence()? + 1)
    }

    /// Live entries with `begin <= seq <= end`, ascending by sequence.
    ///
    /// Ascending is capture order; replay walks the returned list in
    /// reverse to consume entries last-captured-first.
    pub fn entries_between(
        &self,
        begin: Sequence,
        end: Sequence,
    ) -> rusqlite::Result<Vec<LogEntry>> {
        let mut stmt = self.conn.prepare(&format!(
            "SELECT seq, sql FROM {LOG_TABLE} WHERE seq >= ?1 AND seq <= ?2 ORDER BY seq ASC"
        ))?;
        let rows = stmt.query_map(params![begin, end], |row| {
            Ok(LogEntry {
                seq: row.get(0)?,
                statement: row.get(1)?,
            })
        })?;
        rows.collect()
    }

    /// Remove all entries with `begin <= seq <= end`; returns how many
    /// were removed.
    pub fn delete_between(&self, begin: Sequence, end: Sequence) -> rusqlite::Result<usize> {
        self.conn.execute(
            &format!("DELETE FROM {LOG_TABLE} WHERE seq >= ?1 AND seq <= ?2"),
            params![begin, end],
        )
    }

    /// Remove all entries past `boundary`; returns how many were
    /// removed. Unfreeze uses this to discard capture that happened
    /// while the session was frozen.
    pub fn delete_after(&self, boundary: Sequence) -> rusqlite::Result<usize> {
        self.conn.execute(
            &format!("DELETE FROM {LOG_TABLE} WHERE seq > ?1"),
            params![boundary],
        )
    }
}
