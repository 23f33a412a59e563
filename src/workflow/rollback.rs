//! Rollback log
//!
//! Records compensating actions as steps create side effects. Entries are
//! only ever appended; the runner drains the log once, newest first.

use std::fmt;

/// A compensating action recorded by a workflow step
///
/// Implementations are plain records naming the entities to act on; the
/// workflow performs the action in [`Workflow::rollback`](super::Workflow::rollback).
pub trait RollbackAction: fmt::Debug + Send + Sync {
    /// Human readable description used in logs
    fn description(&self) -> String;
}

/// When a rollback entry executes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunOn {
    /// On success, failure and interrupt
    Always,
    /// Only when the workflow fails or is interrupted
    Failure,
}

impl RunOn {
    /// Whether an entry with this policy runs for the given outcome
    pub fn applies(self, failed: bool) -> bool {
        match self {
            RunOn::Always => true,
            RunOn::Failure => failed,
        }
    }
}

/// An entry of the rollback log
#[derive(Debug)]
pub struct RollbackEntry<R> {
    pub action: R,
    pub run_on: RunOn,
}

/// Append-only list of rollback actions
#[derive(Debug)]
pub struct RollbackLog<R> {
    entries: Vec<RollbackEntry<R>>,
}

impl<R: RollbackAction> RollbackLog<R> {
    pub fn new() -> Self {
        Self {
            entries: Vec::new(),
        }
    }

    /// Record an action that runs on every exit path
    pub fn push(&mut self, action: R) {
        self.push_with(action, RunOn::Always);
    }

    /// Record an action that runs only when the workflow fails
    pub fn push_on_failure(&mut self, action: R) {
        self.push_with(action, RunOn::Failure);
    }

    pub fn push_with(&mut self, action: R, run_on: RunOn) {
        self.entries.push(RollbackEntry { action, run_on });
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Entries in registration order
    pub fn iter(&self) -> impl Iterator<Item = &RollbackEntry<R>> {
        self.entries.iter()
    }

    /// Remove every entry, newest first
    pub(crate) fn drain_reversed(&mut self) -> impl Iterator<Item = RollbackEntry<R>> + use<R> {
        std::mem::take(&mut self.entries).into_iter().rev()
    }
}

impl<R: RollbackAction> Default for RollbackLog<R> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug)]
    struct Named(&'static str);

    impl RollbackAction for Named {
        fn description(&self) -> String {
            self.0.to_string()
        }
    }

    #[test]
    fn test_drain_reversed() {
        let mut log = RollbackLog::new();
        log.push(Named("first"));
        log.push_on_failure(Named("second"));
        log.push(Named("third"));
        assert_eq!(log.len(), 3);

        let drained: Vec<_> = log.drain_reversed().map(|e| e.action.0).collect();
        assert_eq!(drained, vec!["third", "second", "first"]);
        assert!(log.is_empty());
    }

    #[test]
    fn test_run_on_applies() {
        assert!(RunOn::Always.applies(false));
        assert!(RunOn::Always.applies(true));
        assert!(!RunOn::Failure.applies(false));
        assert!(RunOn::Failure.applies(true));
    }
}
