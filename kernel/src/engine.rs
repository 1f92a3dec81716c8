// Undo/Redo Engine
//
// The per-connection orchestrator: session lifecycle, step
// boundaries, history replay, and the freeze window.

use rusqlite::Connection;
use serde::Serialize;
use tracing::{debug, info};

use crate::history::{HistoryStacks, StackKind, Step};
use crate::log::{ChangeLog, Sequence};
use crate::replay;
use crate::triggers::{self, TriggerError};

/// Errors surfaced by the engine.
///
/// Protocol variants mark calls the current state cannot honor; the
/// call had no effect. `Trigger` and `Storage` propagate database
/// failures unrecovered, except that a failed replay has already
/// rolled back.
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    #[error("capture is not active")]
    NotActive,

    #[error("table is already captured: {0}")]
    AlreadyInstalled(String),

    #[error("table is not captured: {0}")]
    NotInstalled(String),

    #[error("the {} stack is empty", .0.label())]
    EmptyStack(StackKind),

    #[error("capture is already frozen at sequence {0}")]
    AlreadyFrozen(Sequence),

    #[error("capture is not frozen")]
    NotFrozen,

    #[error("cannot replay history while frozen")]
    ReplayWhileFrozen,

    #[error(transparent)]
    Trigger(#[from] TriggerError),

    #[error(transparent)]
    Storage(#[from] rusqlite::Error),
}

/// Live session state, present only between activate and deactivate.
///
/// `interval_start` is the first sequence of the step currently being
/// accumulated. While frozen, `interval_start` never exceeds the
/// boundary plus one, so unfreeze can discard everything past the
/// boundary without touching the open interval.
#[derive(Debug)]
struct Session {
    tables: Vec<String>,
    stacks: HistoryStacks,
    interval_start: Sequence,
    frozen: Option<Sequence>,
}

/// Snapshot of the engine for host UIs, e.g. to gray out controls.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EngineStatus {
    pub active: bool,
    pub frozen: bool,
    pub tables: Vec<String>,
    pub undo_depth: usize,
    pub redo_depth: usize,
}

/// Transactional undo/redo over one SQLite connection.
///
/// While active, temp triggers capture the inverse of every row-level
/// change to the registered tables into the change log. [`Self::barrier`]
/// closes the entries captured since the previous barrier into one
/// step; [`Self::undo`] and [`Self::redo`] replay whole steps
/// atomically, moving them between the two history stacks.
///
/// Entries captured after the last barrier belong to no step yet; a
/// replay strands them outside history. Close the interval with
/// [`Self::barrier`] before undoing.
///
/// The log and triggers live in the connection's temp schema, so
/// engines on different connections are fully independent. Run at
/// most one engine per connection.
#[derive(Debug)]
pub struct UndoRedo<'c> {
    conn: &'c Connection,
    session: Option<Session>,
}

impl<'c> UndoRedo<'c> {
    /// Construct an inactive engine borrowing the connection.
    pub fn new(conn: &'c Connection) -> Self {
        Self { conn, session: None }
    }

    /// Start capturing changes to `tables`. No-op when already active.
    ///
    /// Creates the change log and installs the capture triggers for
    /// every table; history starts empty. If any install fails the
    /// already-installed triggers and the log are removed again and
    /// the engine stays inactive.
    pub fn activate<T: AsRef<str>>(&mut self, tables: &[T]) -> Result<(), EngineError> {
        if self.session.is_some() {
            return Ok(());
        }
        let log = ChangeLog::new(self.conn);
        log.create()?;

        let mut installed: Vec<String> = Vec::with_capacity(tables.len());
        for table in tables {
            let table = table.as_ref();
            if let Err(err) = triggers::install(self.conn, table) {
                // Unwind the partial session; cleanup failures here
                // have nowhere to go, the install error is the result.
                for done in &installed {
                    let _ = triggers::uninstall(self.conn, done);
                }
                let _ = log.destroy();
                return Err(err.into());
            }
            installed.push(table.to_owned());
        }

        info!(tables = ?installed, "capture activated");
        let interval_start = log.next_sequence()?;
        self.session = Some(Session {
            tables: installed,
            stacks: HistoryStacks::new(),
            interval_start,
            frozen: None,
        });
        Ok(())
    }

    /// Stop capturing: drop every trigger, the log, and all history.
    /// No-op when already inactive.
    ///
    /// On failure the session is kept so the call can be retried.
    pub fn deactivate(&mut self) -> Result<(), EngineError> {
        let session = match &self.session {
            Some(session) => session,
            None => return Ok(()),
        };
        for table in &session.tables {
            triggers::uninstall(self.conn, table)?;
        }
        ChangeLog::new(self.conn).destroy()?;
        self.session = None;
        info!("capture deactivated");
        Ok(())
    }

    /// Attach capture to one more table.
    pub fn install(&mut self, table: &str) -> Result<(), EngineError> {
        let session = self.session.as_mut().ok_or(EngineError::NotActive)?;
        if session.tables.iter().any(|t| t == table) {
            return Err(EngineError::AlreadyInstalled(table.to_owned()));
        }
        triggers::install(self.conn, table)?;
        session.tables.push(table.to_owned());
        debug!(table, "capture attached");
        Ok(())
    }

    /// Detach capture from one table. Entries it already logged stay
    /// replayable; future changes to it go unrecorded.
    pub fn uninstall(&mut self, table: &str) -> Result<(), EngineError> {
        let session = self.session.as_mut().ok_or(EngineError::NotActive)?;
        let position = session
            .tables
            .iter()
            .position(|t| t == table)
            .ok_or_else(|| EngineError::NotInstalled(table.to_owned()))?;
        triggers::uninstall(self.conn, table)?;
        session.tables.remove(position);
        debug!(table, "capture detached");
        Ok(())
    }

    /// Close the entries captured since the previous barrier into one
    /// undo step and drop all redo history.
    ///
    /// Does nothing when inactive or when nothing was captured; no
    /// empty step is ever pushed. While frozen, the step is clamped to
    /// the freeze boundary and suspended entries stay out of history.
    pub fn barrier(&mut self) -> Result<(), EngineError> {
        let session = match &mut self.session {
            Some(session) => session,
            None => return Ok(()),
        };
        let mut end = ChangeLog::new(self.conn).last_sequence()?;
        if let Some(boundary) = session.frozen {
            end = end.min(boundary);
        }
        if session.interval_start > end {
            return Ok(());
        }

        let step = Step {
            begin: session.interval_start,
            end,
        };
        session.stacks.push(StackKind::Undo, step);
        let redo_dropped = session.stacks.clear(StackKind::Redo);
        session.interval_start = end + 1;
        debug!(begin = step.begin, end = step.end, redo_dropped, "step closed");
        Ok(())
    }

    /// Alias of [`Self::barrier`] for hosts that think in
    /// transactional terms.
    pub fn commit(&mut self) -> Result<(), EngineError> {
        self.barrier()
    }

    /// Revert the most recent step.
    pub fn undo(&mut self) -> Result<(), EngineError> {
        self.step(StackKind::Undo)
    }

    /// Re-apply the most recently undone step.
    pub fn redo(&mut self) -> Result<(), EngineError> {
        self.step(StackKind::Redo)
    }

    /// Pop the top step of `source` and replay it; the recaptured
    /// opposite lands on the other stack.
    fn step(&mut self, source: StackKind) -> Result<(), EngineError> {
        let session = self
            .session
            .as_mut()
            .ok_or(EngineError::EmptyStack(source))?;
        if session.frozen.is_some() {
            // Replay recapture would land above the freeze boundary
            // and the next unfreeze would delete it, leaving a step
            // with no entries behind it.
            return Err(EngineError::ReplayWhileFrozen);
        }
        let step = session
            .stacks
            .pop(source)
            .ok_or(EngineError::EmptyStack(source))?;

        let outcome = match replay::replay_step(self.conn, step) {
            Ok(outcome) => outcome,
            Err(err) => {
                // The transaction already rolled back; restore the
                // step so the stacks match the untouched tables.
                session.stacks.push(source, step);
                return Err(err.into());
            }
        };

        if let Some(recaptured) = outcome.recaptured {
            session.stacks.push(source.opposite(), recaptured);
        }
        session.interval_start = ChangeLog::new(self.conn).next_sequence()?;
        debug!(
            stack = source.label(),
            executed = outcome.executed,
            "history step applied"
        );
        Ok(())
    }

    /// Suspend step creation: changes stay applied but will not become
    /// part of undo history. No-op when inactive.
    pub fn freeze(&mut self) -> Result<(), EngineError> {
        let session = match &mut self.session {
            Some(session) => session,
            None => return Ok(()),
        };
        if let Some(boundary) = session.frozen {
            return Err(EngineError::AlreadyFrozen(boundary));
        }
        let boundary = ChangeLog::new(self.conn).last_sequence()?;
        session.frozen = Some(boundary);
        debug!(boundary, "capture frozen");
        Ok(())
    }

    /// Resume step creation, discarding every entry captured while
    /// frozen. No-op when inactive.
    pub fn unfreeze(&mut self) -> Result<(), EngineError> {
        let session = match &mut self.session {
            Some(session) => session,
            None => return Ok(()),
        };
        let boundary = match session.frozen {
            Some(boundary) => boundary,
            None => return Err(EngineError::NotFrozen),
        };
        let dropped = ChangeLog::new(self.conn).delete_after(boundary)?;
        session.frozen = None;
        debug!(boundary, dropped, "capture resumed");
        Ok(())
    }

    pub fn is_active(&self) -> bool {
        self.session.is_some()
    }

    pub fn is_frozen(&self) -> bool {
        self.session.as_ref().map_or(false, |s| s.frozen.is_some())
    }

    pub fn undo_depth(&self) -> usize {
        self.depth(StackKind::Undo)
    }

    pub fn redo_depth(&self) -> usize {
        self.depth(StackKind::Redo)
    }

    fn depth(&self, kind: StackKind) -> usize {
        self.session.as_ref().map_or(0, |s| s.stacks.depth(kind))
    }

    /// Snapshot the session shape for display.
    pub fn status(&self) -> EngineStatus {
        EngineStatus {
            active: self.is_active(),
            frozen: self.is_frozen(),
            tables: self
                .session
                .as_ref()
                .map_or_else(Vec::new, |s| s.tables.clone()),
            undo_depth: self.undo_depth(),
            redo_depth: self.redo_depth(),
        }
    }
}
