// Rewind Kernel
//
// Transactional undo/redo for row-level changes in SQLite tables.

pub mod log;
pub mod history;
pub mod triggers;
pub mod replay;
pub mod engine;
