// Step History
//
// The undo and redo stacks. Each stack holds closed ranges over the
// change log; this module is pure bookkeeping and never touches the
// database.

use crate::log::Sequence;

/// One undoable (or redoable) unit of work: the closed range of log
/// sequences `begin..=end` captured between two barriers.
///
/// Ranges on the stacks are always non-empty (`begin <= end`) and
/// mutually disjoint; the engine only pushes ranges strictly above
/// every sequence already stacked.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Step {
    pub begin: Sequence,
    pub end: Sequence,
}

/// Which of the two history stacks an operation targets.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StackKind {
    Undo,
    Redo,
}

impl StackKind {
    /// The stack a replayed step gets pushed onto: undoing produces a
    /// redo step and vice versa.
    pub fn opposite(self) -> Self {
        match self {
            StackKind::Undo => StackKind::Redo,
            StackKind::Redo => StackKind::Undo,
        }
    }

    /// Lowercase name for messages and telemetry.
    pub fn label(self) -> &'static str {
        match self {
            StackKind::Undo => "undo",
            StackKind::Redo => "redo",
        }
    }
}

/// LIFO stacks of steps, addressed by [`StackKind`].
#[derive(Debug, Default)]
pub struct HistoryStacks {
    undo: Vec<Step>,
    redo: Vec<Step>,
}

impl HistoryStacks {
    pub fn new() -> Self {
        Self::default()
    }

    fn stack(&self, kind: StackKind) -> &Vec<Step> {
        match kind {
            StackKind::Undo => &self.undo,
            StackKind::Redo => &self.redo,
        }
    }

    fn stack_mut(&mut self, kind: StackKind) -> &mut Vec<Step> {
        match kind {
            StackKind::Undo => &mut self.undo,
            StackKind::Redo => &mut self.redo,
        }
    }

    pub fn push(&mut self, kind: StackKind, step: Step) {
        self.stack_mut(kind).push(step);
    }

    /// Pop the most recent step, or `None` when the stack is empty.
    pub fn pop(&mut self, kind: StackKind) -> Option<Step> {
        self.stack_mut(kind).pop()
    }

    /// Discard every step on one stack; returns how many were dropped.
    pub fn clear(&mut self, kind: StackKind) -> usize {
        let stack = self.stack_mut(kind);
        let dropped = stack.len();
        stack.clear();
        dropped
    }

    pub fn depth(&self, kind: StackKind) -> usize {
        self.stack(kind).len()
    }

    /// The steps on one stack, oldest first.
    pub fn steps(&self, kind: StackKind) -> &[Step] {
        self.stack(kind)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn step(begin: Sequence, end: Sequence) -> Step {
        Step { begin, end }
    }

    #[test]
    fn stacks_pop_in_lifo_order() {
        let mut stacks = HistoryStacks::new();

        stacks.push(StackKind::Undo, step(1, 2));
        stacks.push(StackKind::Undo, step(3, 5));

        assert_eq!(stacks.depth(StackKind::Undo), 2);
        assert_eq!(stacks.pop(StackKind::Undo), Some(step(3, 5)));
        assert_eq!(stacks.pop(StackKind::Undo), Some(step(1, 2)));
        assert_eq!(stacks.pop(StackKind::Undo), None);
    }

    #[test]
    fn stacks_are_independent() {
        let mut stacks = HistoryStacks::new();

        stacks.push(StackKind::Undo, step(1, 1));
        stacks.push(StackKind::Redo, step(2, 3));

        assert_eq!(stacks.clear(StackKind::Redo), 1);
        assert_eq!(stacks.depth(StackKind::Redo), 0);
        assert_eq!(stacks.depth(StackKind::Undo), 1);
        assert_eq!(stacks.steps(StackKind::Undo), &[step(1, 1)]);
    }

    #[test]
    fn opposite_swaps_the_stacks() {
        assert_eq!(StackKind::Undo.opposite(), StackKind::Redo);
        assert_eq!(StackKind::Redo.opposite(), StackKind::Undo);
    }
}
