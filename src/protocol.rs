//! Turn-taking between the main agent and the testing agent.
//!
//! ```text
//!  main agent                         testing agent
//!  ──────────                         ─────────────
//!  upsert_task / append_status
//!  hand_off(tasks, message)  ───────> TestingRound::begin
//!    needs_retesting = true             scope = current_focus (or all tasks)
//!    current_focus = tasks              record(task, working, comment) per task
//!    test_sequence += 1                 finish(message)
//!    main note appended       <───────    outcomes applied, stuck_tasks refreshed,
//!                                         focus cleared, testing note appended
//! ```
//!
//! A [`TestingRound`] buffers outcomes and touches the ledger only in
//! [`TestingRound::finish`], after checking that every scoped task has
//! exactly one outcome.

use serde::{Deserialize, Serialize};
use tracing::info;

use crate::error::{LedgerError, Result};
use crate::ledger::{Agent, Ledger};

/// Main agent hand-off: queue `tasks` for testing and leave a note.
///
/// Returns the new `metadata.test_sequence`.
///
/// # Errors
///
/// [`LedgerError::EmptyRound`] if `tasks` is empty,
/// [`LedgerError::UnknownTask`] if any task is missing (nothing is changed).
///
/// # Example
///
/// ```
/// use agent_ledger::ledger::{Collection, Ledger, TaskFields};
/// use agent_ledger::protocol::hand_off;
///
/// let mut ledger = Ledger::default();
/// ledger.upsert_task(Collection::Backend, "Auth", TaskFields::new().with_implemented(true)).unwrap();
///
/// let sequence = hand_off(&mut ledger, &["Auth"], "JWT login ready").unwrap();
/// assert_eq!(sequence, 1);
/// assert_eq!(ledger.test_plan.current_focus, vec!["Auth".to_string()]);
/// ```
pub fn hand_off<S: AsRef<str>>(ledger: &mut Ledger, tasks: &[S], message: &str) -> Result<u32> {
    if tasks.is_empty() {
        return Err(LedgerError::EmptyRound);
    }

    ledger.request_retest(tasks, message)?;
    ledger.metadata.test_sequence += 1;
    ledger.communicate(Agent::Main, message);

    info!(
        "Handed off {} task(s) for testing (sequence {})",
        tasks.len(),
        ledger.metadata.test_sequence
    );
    Ok(ledger.metadata.test_sequence)
}

/// A single verification result.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Outcome {
    pub task: String,
    pub working: bool,
    #[serde(default)]
    pub comment: String,
}

/// What a finished round did.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RoundSummary {
    pub passed: Vec<String>,
    pub failed: Vec<String>,
    /// Tasks at or above the stuck threshold after the round
    pub stuck: Vec<String>,
}

/// Testing agent's side of one hand-off.
#[derive(Debug, Clone)]
pub struct TestingRound {
    scope: Vec<String>,
    outcomes: Vec<Outcome>,
}

impl TestingRound {
    /// Snapshot the scope the ledger asks for.
    ///
    /// # Errors
    ///
    /// [`LedgerError::EmptyRound`] if there is nothing to test,
    /// [`LedgerError::UnknownTask`] if the focus names a missing task.
    pub fn begin(ledger: &Ledger) -> Result<Self> {
        let scope = ledger.test_scope();
        if scope.is_empty() {
            return Err(LedgerError::EmptyRound);
        }
        if let Some(missing) = scope.iter().find(|name| !ledger.contains_task(name)) {
            return Err(LedgerError::unknown_task(missing.as_str()));
        }
        Ok(Self {
            scope,
            outcomes: Vec::new(),
        })
    }

    /// Tasks to test, in visiting order.
    #[must_use]
    pub fn scope(&self) -> &[String] {
        &self.scope
    }

    /// Scoped tasks without an outcome yet.
    #[must_use]
    pub fn pending(&self) -> Vec<&str> {
        self.scope
            .iter()
            .filter(|name| !self.outcomes.iter().any(|o| &o.task == *name))
            .map(String::as_str)
            .collect()
    }

    /// Buffer one outcome.
    ///
    /// # Errors
    ///
    /// [`LedgerError::OutOfScope`] or [`LedgerError::DuplicateOutcome`].
    pub fn record(&mut self, task: &str, working: bool, comment: impl Into<String>) -> Result<()> {
        let task = task.trim();
        if !self.scope.iter().any(|s| s == task) {
            return Err(LedgerError::OutOfScope {
                task: task.to_string(),
            });
        }
        if self.outcomes.iter().any(|o| o.task == task) {
            return Err(LedgerError::DuplicateOutcome {
                task: task.to_string(),
            });
        }
        self.outcomes.push(Outcome {
            task: task.to_string(),
            working,
            comment: comment.into(),
        });
        Ok(())
    }

    /// Apply the buffered outcomes and close the round.
    ///
    /// # Errors
    ///
    /// [`LedgerError::IncompleteRound`] if any scoped task lacks an outcome,
    /// [`LedgerError::UnknownTask`] if a task vanished from `ledger` since
    /// [`begin`](Self::begin). The ledger is unchanged on error.
    pub fn finish(
        self,
        ledger: &mut Ledger,
        message: &str,
        stuck_threshold: u32,
    ) -> Result<RoundSummary> {
        let missing: Vec<String> = self.pending().into_iter().map(String::from).collect();
        if !missing.is_empty() {
            return Err(LedgerError::IncompleteRound { missing });
        }
        if let Some(gone) = self.outcomes.iter().find(|o| !ledger.contains_task(&o.task)) {
            return Err(LedgerError::unknown_task(gone.task.as_str()));
        }

        let mut summary = RoundSummary::default();
        for outcome in self.outcomes {
            ledger.record_outcome(&outcome.task, outcome.working, outcome.comment)?;
            if outcome.working {
                summary.passed.push(outcome.task);
            } else {
                summary.failed.push(outcome.task);
            }
        }

        summary.stuck = ledger.refresh_stuck_tasks(stuck_threshold).to_vec();
        ledger.set_focus(Vec::<String>::new());
        ledger.communicate(Agent::Testing, message);

        info!(
            "Testing round closed: {} passed, {} failed, {} stuck",
            summary.passed.len(),
            summary.failed.len(),
            summary.stuck.len()
        );
        Ok(summary)
    }
}
