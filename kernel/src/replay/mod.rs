// Step Replay
//
// Executes one history step's inverse statements inside a single
// transaction. Running the inverses re-fires the capture triggers, so
// the log grows the opposite step while the consumed range is removed.

use rusqlite::Connection;
use tracing::debug;

use crate::history::Step;
use crate::log::ChangeLog;

/// What one replay did: how many inverse statements ran and the range
/// the capture triggers appended while they ran.
///
/// `recaptured` is `None` when nothing was appended, e.g. when every
/// table the step touched has had its triggers removed since.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReplayOutcome {
    pub executed: usize,
    pub recaptured: Option<Step>,
}

/// Replay `step` against the live tables.
///
/// One transaction covers the whole unit: fetch the step's live
/// entries, delete them from the log, execute each statement in
/// descending sequence order, commit. An error at any point drops the
/// transaction unfinished, rolling tables and log back to the state
/// before the call.
///
/// Descending order matters: inside a step, later changes can depend
/// on earlier ones, so their inverses only make sense applied
/// last-captured-first.
///
/// The recaptured range opens right after the log tail left by the
/// deletion and may therefore span sequence numbers retired earlier;
/// ranges are only ever queried against live entries, which keeps such
/// spans exact.
pub fn replay_step(conn: &Connection, step: Step) -> rusqlite::Result<ReplayOutcome> {
    let txn = conn.unchecked_transaction()?;
    let log = ChangeLog::new(&txn);

    let entries = log.entries_between(step.begin, step.end)?;
    log.delete_between(step.begin, step.end)?;
    let replay_floor = log.last_sequence()?;

    for entry in entries.iter().rev() {
        txn.execute_batch(&entry.statement)?;
    }

    let recapture_tail = log.last_sequence()?;
    txn.commit()?;

    let recaptured = (recapture_tail > replay_floor).then(|| Step {
        begin: replay_floor + 1,
        end: recapture_tail,
    });
    debug!(
        begin = step.begin,
        end = step.end,
        executed = entries.len(),
        recaptured = ?recaptured,
        "replayed step"
    );

    Ok(ReplayOutcome {
        executed: entries.len(),
        recaptured,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::triggers;
    use rusqlite::params;

    fn captured_table() -> Connection {
        let conn = Connection::open_in_memory().unwrap();
        ChangeLog::new(&conn).create().unwrap();
        conn.execute_batch("CREATE TABLE t(a INTEGER)").unwrap();
        triggers::install(&conn, "t").unwrap();
        conn
    }

    fn rows(conn: &Connection) -> Vec<i64> {
        let mut stmt = conn.prepare("SELECT a FROM t ORDER BY a").unwrap();
        let rows = stmt.query_map([], |row| row.get(0)).unwrap();
        rows.collect::<Result<_, _>>().unwrap()
    }

    fn statements(conn: &Connection) -> Vec<String> {
        ChangeLog::new(conn)
            .entries_between(1, i64::MAX)
            .unwrap()
            .into_iter()
            .map(|e| e.statement)
            .collect()
    }

    #[test]
    fn replay_reverts_the_step_and_recaptures_its_opposite() {
        let conn = captured_table();
        conn.execute_batch("INSERT INTO t(a) VALUES(23)").unwrap();

        let outcome = replay_step(&conn, Step { begin: 1, end: 1 }).unwrap();

        assert!(rows(&conn).is_empty());
        assert_eq!(outcome.executed, 1);
        assert!(outcome.recaptured.is_some());
        assert_eq!(statements(&conn), vec!["INSERT INTO t(rowid,a) VALUES(1,23)"]);
    }

    #[test]
    fn replay_applies_inverses_last_captured_first() {
        let conn = captured_table();
        // Insert then delete the same row in one step. Undoing it must
        // re-insert the row before deleting it again; the ascending
        // order would leave a resurrected row behind.
        conn.execute_batch(
            "INSERT INTO t(a) VALUES(23);\n\
             DELETE FROM t;",
        )
        .unwrap();

        let outcome = replay_step(&conn, Step { begin: 1, end: 2 }).unwrap();

        assert!(rows(&conn).is_empty());
        assert_eq!(outcome.executed, 2);
        let recaptured = outcome.recaptured.unwrap();
        assert_eq!(
            ChangeLog::new(&conn)
                .entries_between(recaptured.begin, recaptured.end)
                .unwrap()
                .len(),
            2
        );
    }

    #[test]
    fn failed_replay_rolls_back_tables_and_log() {
        let conn = captured_table();
        conn.execute_batch("INSERT INTO t(a) VALUES(23)").unwrap();
        conn.execute(
            "INSERT INTO undolog(seq, sql) VALUES(NULL, ?1)",
            params!["INSERT INTO missing VALUES(1)"],
        )
        .unwrap();

        let err = replay_step(&conn, Step { begin: 1, end: 2 });

        assert!(err.is_err());
        assert_eq!(rows(&conn), vec![23]);
        assert_eq!(statements(&conn).len(), 2);
    }

    #[test]
    fn replay_of_a_dead_range_does_nothing() {
        let conn = captured_table();
        conn.execute_batch("INSERT INTO t(a) VALUES(23)").unwrap();

        let outcome = replay_step(&conn, Step { begin: 5, end: 9 }).unwrap();

        assert_eq!(outcome.executed, 0);
        assert_eq!(outcome.recaptured, None);
        assert_eq!(rows(&conn), vec![23]);
    }
}
