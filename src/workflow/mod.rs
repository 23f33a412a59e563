//! Step-by-step workflow engine
//!
//! A [`Workflow`] is a state machine whose states are the values of its
//! `Step` type. [`WorkflowRunner`] holds the current step and a
//! [`RollbackLog`], and executes one step at a time:
//!
//! - `Transition::Next(step)` continues with `step`
//! - `Transition::Done` ends the run; `RunOn::Always` rollbacks execute
//! - `Transition::Stop` ends the run immediately, without rollback
//! - an error (or an interrupt) executes every rollback, then is returned
//!
//! Rollbacks execute newest first, at most once per runner. A failing
//! rollback is logged and the remaining ones still execute.

pub mod rollback;

pub use rollback::{RollbackAction, RollbackEntry, RollbackLog, RunOn};

use crate::TesterError;
use async_trait::async_trait;
use std::fmt;
use std::future::Future;
use tracing::{debug, error, info};

/// A state of a workflow
pub trait WorkflowStep: fmt::Debug + Copy + Send + Sync {
    /// Short name used in logs
    fn name(&self) -> &'static str;

    /// What the step does
    fn description(&self) -> &'static str;
}

/// What the runner does after a step returns
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition<S> {
    /// Continue with another step
    Next(S),
    /// Last step finished
    Done,
    /// End the workflow early without rollback
    Stop,
}

/// How a run ended when it did not fail
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkflowOutcome {
    Completed,
    Stopped,
}

/// A workflow driven by [`WorkflowRunner`]
#[async_trait]
pub trait Workflow: Send {
    type Step: WorkflowStep;
    type Rollback: RollbackAction;

    /// Name used as log prefix
    fn name(&self) -> &str;

    /// Execute one step, recording rollbacks for any side effects
    async fn execute(
        &mut self,
        step: Self::Step,
        rollbacks: &mut RollbackLog<Self::Rollback>,
    ) -> Result<Transition<Self::Step>, TesterError>;

    /// Perform a recorded rollback action
    async fn rollback(&mut self, action: &Self::Rollback) -> Result<(), TesterError>;
}

/// Executes a workflow's steps and rollbacks
pub struct WorkflowRunner<W: Workflow> {
    workflow: W,
    current_step: Option<W::Step>,
    rollbacks: RollbackLog<W::Rollback>,
    cleaned_up: bool,
}

impl<W: Workflow> WorkflowRunner<W> {
    /// Create a runner starting at `first`
    pub fn new(workflow: W, first: W::Step) -> Self {
        Self {
            workflow,
            current_step: Some(first),
            rollbacks: RollbackLog::new(),
            cleaned_up: false,
        }
    }

    pub fn workflow(&self) -> &W {
        &self.workflow
    }

    pub fn into_inner(self) -> W {
        self.workflow
    }

    /// Step executed by the next call to [`run`](Self::run)
    pub fn current_step(&self) -> Option<W::Step> {
        self.current_step
    }

    /// Register a rollback from outside a step
    pub fn add_rollback_action(&mut self, action: W::Rollback, run_on: RunOn) {
        self.rollbacks.push_with(action, run_on);
    }

    /// Rollbacks not executed yet
    pub fn rollback_actions(&self) -> &RollbackLog<W::Rollback> {
        &self.rollbacks
    }

    /// Run until the workflow finishes, stops or fails
    pub async fn run(&mut self) -> Result<WorkflowOutcome, TesterError> {
        self.run_until(std::future::pending::<String>()).await
    }

    /// Run, aborting the current step when `interrupt` resolves
    ///
    /// The interrupt's output is the reason carried by
    /// [`TesterError::Interrupted`]. An interrupt is handled like any other
    /// failure: every rollback executes before the error is returned.
    pub async fn run_until<F>(&mut self, interrupt: F) -> Result<WorkflowOutcome, TesterError>
    where
        F: Future<Output = String>,
    {
        tokio::pin!(interrupt);

        while let Some(step) = self.current_step.take() {
            info!(
                "{}: executing: {} ({})",
                self.workflow.name(),
                step.name(),
                step.description()
            );

            // A pending interrupt wins over a step that is also ready
            let result = tokio::select! {
                biased;
                reason = &mut interrupt => Err(TesterError::Interrupted(reason)),
                result = self.workflow.execute(step, &mut self.rollbacks) => result,
            };

            match result {
                Ok(transition) => {
                    info!(
                        "{}: completed: {} ({})",
                        self.workflow.name(),
                        step.name(),
                        step.description()
                    );
                    match transition {
                        Transition::Next(next) => self.current_step = Some(next),
                        Transition::Done => {
                            self.run_rollbacks(false).await;
                            info!("{}: workflow completed", self.workflow.name());
                            return Ok(WorkflowOutcome::Completed);
                        }
                        Transition::Stop => {
                            info!("{}: workflow stopped", self.workflow.name());
                            return Ok(WorkflowOutcome::Stopped);
                        }
                    }
                }
                Err(e) => {
                    error!("{}: workflow failed: {}", self.workflow.name(), e);
                    self.run_rollbacks(true).await;
                    return Err(e);
                }
            }
        }

        debug!("{}: no step to execute", self.workflow.name());
        Ok(WorkflowOutcome::Completed)
    }

    async fn run_rollbacks(&mut self, failed: bool) {
        if self.cleaned_up {
            return;
        }
        self.cleaned_up = true;

        for entry in self.rollbacks.drain_reversed() {
            if !entry.run_on.applies(failed) {
                debug!(
                    "{}: skipping rollback on success: {}",
                    self.workflow.name(),
                    entry.action.description()
                );
                continue;
            }
            info!(
                "{}: executing rollback: {}",
                self.workflow.name(),
                entry.action.description()
            );
            if let Err(e) = self.workflow.rollback(&entry.action).await {
                error!(
                    "{}: rollback failed: {}: {}",
                    self.workflow.name(),
                    entry.action.description(),
                    e
                );
            }
        }
    }
}
