//! The status ledger document and its operations.
//!
//! A ledger is a single YAML document shared by a main agent, which
//! implements changes, and a testing agent, which verifies them.
//!
//! ```text
//! Ledger
//!   ├── user_problem_statement: String
//!   ├── backend:  Vec<TaskRecord>
//!   ├── frontend: Vec<TaskRecord>
//!   ├── metadata: Metadata (created_by, version, test_sequence, run_ui)
//!   ├── test_plan: TestPlan (current_focus, stuck_tasks, test_all, test_priority)
//!   └── agent_communication: Vec<Communication>
//!
//! TaskRecord
//!   ├── task, implemented, working, file, priority, needs_retesting
//!   ├── stuck_count
//!   └── status_history: Vec<StatusEntry>   (append-only)
//! ```
//!
//! # Invariants
//!
//! - `status_history` only grows. No operation here removes or reorders an
//!   entry, and [`LedgerStore::save`] refuses a document that would.
//! - `stuck_count` only goes down through [`Ledger::record_outcome`] with a
//!   passing result. [`Ledger::upsert_task`] rejects a lower value.
//! - Task names are unique across both collections, since
//!   [`Ledger::append_status`] looks tasks up by name alone.

mod metrics;
mod persistence;
mod state;
mod validation;

pub use metrics::LedgerCounts;
pub use persistence::{LedgerDocument, LedgerStore, DEFAULT_PREAMBLE};
pub use state::{Agent, Collection, Priority, TestPriority, Working};
pub use validation::{LedgerValidator, ValidationReport};

use std::cmp::Reverse;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::error::{LedgerError, Result};

// ============================================================================
// Status Entry
// ============================================================================

/// One immutable note in a task's history.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusEntry {
    /// Result the author observed
    #[serde(default)]
    pub working: Working,
    /// Who wrote the entry
    pub agent: Agent,
    /// Free text
    #[serde(default)]
    pub comment: String,
    /// When the entry was appended, if recorded by this tool
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<DateTime<Utc>>,
}

impl StatusEntry {
    /// Create an unstamped entry.
    ///
    /// # Example
    ///
    /// ```
    /// use agent_ledger::ledger::{Agent, StatusEntry, Working};
    ///
    /// let entry = StatusEntry::new(Agent::Testing, true, "All endpoints respond");
    /// assert_eq!(entry.working, Working::Yes);
    /// assert!(entry.timestamp.is_none());
    /// ```
    #[must_use]
    pub fn new(agent: Agent, working: impl Into<Working>, comment: impl Into<String>) -> Self {
        Self {
            working: working.into(),
            agent,
            comment: comment.into(),
            timestamp: None,
        }
    }

    /// Attach the current time.
    #[must_use]
    pub fn stamped(mut self) -> Self {
        self.timestamp = Some(Utc::now());
        self
    }
}

// ============================================================================
// Task Record
// ============================================================================

/// One unit of trackable work.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskRecord {
    /// Human-readable label, unique across the ledger
    pub task: String,
    #[serde(default)]
    pub implemented: bool,
    #[serde(default)]
    pub working: Working,
    /// Free-text pointer to source locations
    #[serde(default)]
    pub file: String,
    /// Consecutive failing results after the task was first tested
    #[serde(default)]
    pub stuck_count: u32,
    #[serde(default)]
    pub priority: Priority,
    #[serde(default)]
    pub needs_retesting: bool,
    #[serde(default)]
    pub status_history: Vec<StatusEntry>,
}

impl TaskRecord {
    /// Create an unimplemented, untested record.
    #[must_use]
    pub fn new(task: impl Into<String>) -> Self {
        Self {
            task: task.into(),
            implemented: false,
            working: Working::Unknown,
            file: String::new(),
            stuck_count: 0,
            priority: Priority::default(),
            needs_retesting: false,
            status_history: Vec::new(),
        }
    }

    /// Check if the task has regressed often enough to be flagged.
    #[must_use]
    pub fn is_stuck(&self, threshold: u32) -> bool {
        threshold > 0 && self.stuck_count >= threshold
    }

    /// Task name without surrounding whitespace, as lookups see it.
    #[must_use]
    pub fn name(&self) -> &str {
        self.task.trim()
    }

    /// Most recent history entry.
    #[must_use]
    pub fn last_entry(&self) -> Option<&StatusEntry> {
        self.status_history.last()
    }
}

// ============================================================================
// Task Fields
// ============================================================================

/// Partial update applied by [`Ledger::upsert_task`].
///
/// Unset fields are left alone on existing records and take their
/// defaults on new ones. There is deliberately no history field.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TaskFields {
    pub implemented: Option<bool>,
    pub working: Option<Working>,
    pub file: Option<String>,
    pub stuck_count: Option<u32>,
    pub priority: Option<Priority>,
    pub needs_retesting: Option<bool>,
}

impl TaskFields {
    /// Create an empty update.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_implemented(mut self, implemented: bool) -> Self {
        self.implemented = Some(implemented);
        self
    }

    #[must_use]
    pub fn with_working(mut self, working: impl Into<Working>) -> Self {
        self.working = Some(working.into());
        self
    }

    #[must_use]
    pub fn with_file(mut self, file: impl Into<String>) -> Self {
        self.file = Some(file.into());
        self
    }

    #[must_use]
    pub fn with_stuck_count(mut self, stuck_count: u32) -> Self {
        self.stuck_count = Some(stuck_count);
        self
    }

    #[must_use]
    pub fn with_priority(mut self, priority: Priority) -> Self {
        self.priority = Some(priority);
        self
    }

    #[must_use]
    pub fn with_needs_retesting(mut self, needs_retesting: bool) -> Self {
        self.needs_retesting = Some(needs_retesting);
        self
    }

    /// Write the set fields into `record`, returning whether anything changed.
    fn apply(&self, record: &mut TaskRecord) -> bool {
        fn set<T: PartialEq + Clone>(slot: &mut T, value: &Option<T>) -> bool {
            match value {
                Some(v) if slot != v => {
                    *slot = v.clone();
                    true
                }
                _ => false,
            }
        }

        let mut changed = set(&mut record.implemented, &self.implemented);
        changed |= set(&mut record.working, &self.working);
        changed |= set(&mut record.file, &self.file);
        changed |= set(&mut record.stuck_count, &self.stuck_count);
        changed |= set(&mut record.priority, &self.priority);
        changed |= set(&mut record.needs_retesting, &self.needs_retesting);
        changed
    }
}

/// What [`Ledger::upsert_task`] did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpsertOutcome {
    Created,
    Updated,
    Unchanged,
}

// ============================================================================
// Metadata, Test Plan, Communication
// ============================================================================

/// Document-level bookkeeping.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Metadata {
    #[serde(default = "default_created_by")]
    pub created_by: String,
    #[serde(default = "default_version")]
    pub version: String,
    /// Number of hand-offs to the testing agent so far
    #[serde(default)]
    pub test_sequence: u32,
    #[serde(default)]
    pub run_ui: bool,
}

fn default_created_by() -> String {
    "main_agent".to_string()
}

fn default_version() -> String {
    "1.0".to_string()
}

impl Default for Metadata {
    fn default() -> Self {
        Self {
            created_by: default_created_by(),
            version: default_version(),
            test_sequence: 0,
            run_ui: false,
        }
    }
}

/// What the testing agent should look at next.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TestPlan {
    #[serde(default)]
    pub current_focus: Vec<String>,
    #[serde(default)]
    pub stuck_tasks: Vec<String>,
    #[serde(default)]
    pub test_all: bool,
    #[serde(default)]
    pub test_priority: TestPriority,
}

/// A free-text note from one agent to the other.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Communication {
    pub agent: Agent,
    #[serde(default)]
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<DateTime<Utc>>,
}

// ============================================================================
// Ledger
// ============================================================================

/// The full ledger document.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Ledger {
    #[serde(default)]
    pub user_problem_statement: String,
    #[serde(default)]
    pub backend: Vec<TaskRecord>,
    #[serde(default)]
    pub frontend: Vec<TaskRecord>,
    #[serde(default)]
    pub metadata: Metadata,
    #[serde(default)]
    pub test_plan: TestPlan,
    #[serde(default)]
    pub agent_communication: Vec<Communication>,
}

impl Ledger {
    /// Create an empty ledger for a problem statement.
    #[must_use]
    pub fn new(user_problem_statement: impl Into<String>) -> Self {
        Self {
            user_problem_statement: user_problem_statement.into(),
            ..Self::default()
        }
    }

    /// Records of one collection, in document order.
    #[must_use]
    pub fn collection(&self, collection: Collection) -> &[TaskRecord] {
        match collection {
            Collection::Backend => &self.backend,
            Collection::Frontend => &self.frontend,
        }
    }

    fn collection_mut(&mut self, collection: Collection) -> &mut Vec<TaskRecord> {
        match collection {
            Collection::Backend => &mut self.backend,
            Collection::Frontend => &mut self.frontend,
        }
    }

    /// All records, backend first.
    pub fn tasks(&self) -> impl Iterator<Item = (Collection, &TaskRecord)> {
        self.backend
            .iter()
            .map(|t| (Collection::Backend, t))
            .chain(self.frontend.iter().map(|t| (Collection::Frontend, t)))
    }

    /// Look a task up by name in either collection.
    ///
    /// Both the query and the stored names are compared trimmed, so
    /// hand-kept records with stray padding still resolve.
    #[must_use]
    pub fn find_task(&self, name: &str) -> Option<(Collection, &TaskRecord)> {
        let name = name.trim();
        self.tasks().find(|(_, t)| t.name() == name)
    }

    /// Mutable lookup across both collections.
    pub fn find_task_mut(&mut self, name: &str) -> Option<(Collection, &mut TaskRecord)> {
        let name = name.trim();
        if let Some(record) = self.backend.iter_mut().find(|t| t.name() == name) {
            return Some((Collection::Backend, record));
        }
        self.frontend
            .iter_mut()
            .find(|t| t.name() == name)
            .map(|t| (Collection::Frontend, t))
    }

    /// Check if a task exists in either collection.
    #[must_use]
    pub fn contains_task(&self, name: &str) -> bool {
        self.find_task(name).is_some()
    }

    /// Create a task, or merge `fields` into the existing one.
    ///
    /// Never touches `status_history`. Calling twice with the same input
    /// returns [`UpsertOutcome::Unchanged`] the second time.
    ///
    /// # Errors
    ///
    /// - [`LedgerError::InvalidTaskName`] for an empty name or one already
    ///   tracked in the other collection
    /// - [`LedgerError::StuckCountDecrease`] if `fields.stuck_count` is
    ///   below the current value
    ///
    /// # Example
    ///
    /// ```
    /// use agent_ledger::ledger::{Collection, Ledger, TaskFields, UpsertOutcome};
    ///
    /// let mut ledger = Ledger::default();
    /// let fields = TaskFields::new().with_implemented(true).with_working(true);
    /// let first = ledger.upsert_task(Collection::Backend, "SQLite storage", fields.clone()).unwrap();
    /// let second = ledger.upsert_task(Collection::Backend, "SQLite storage", fields).unwrap();
    /// assert_eq!(first, UpsertOutcome::Created);
    /// assert_eq!(second, UpsertOutcome::Unchanged);
    /// ```
    pub fn upsert_task(
        &mut self,
        collection: Collection,
        name: &str,
        fields: TaskFields,
    ) -> Result<UpsertOutcome> {
        let name = name.trim();
        if name.is_empty() {
            return Err(LedgerError::invalid_task_name(
                name,
                "task name must not be empty",
            ));
        }

        let other = collection.other();
        if self.collection(other).iter().any(|t| t.name() == name) {
            return Err(LedgerError::invalid_task_name(
                name,
                format!("already tracked under {other}"),
            ));
        }

        let records = self.collection_mut(collection);
        match records.iter_mut().find(|t| t.name() == name) {
            Some(record) => {
                if let Some(requested) = fields.stuck_count {
                    if requested < record.stuck_count {
                        return Err(LedgerError::StuckCountDecrease {
                            task: name.to_string(),
                            current: record.stuck_count,
                            requested,
                        });
                    }
                }
                if fields.apply(record) {
                    debug!("Updated task '{}' in {}", name, collection);
                    Ok(UpsertOutcome::Updated)
                } else {
                    Ok(UpsertOutcome::Unchanged)
                }
            }
            None => {
                let mut record = TaskRecord::new(name);
                fields.apply(&mut record);
                records.push(record);
                debug!("Created task '{}' in {}", name, collection);
                Ok(UpsertOutcome::Created)
            }
        }
    }

    /// Append a status entry to a task.
    ///
    /// An entry carrying a known result also updates the record's
    /// `working` flag.
    ///
    /// # Errors
    ///
    /// [`LedgerError::UnknownTask`] if no collection holds `name`.
    pub fn append_status(&mut self, name: &str, entry: StatusEntry) -> Result<&TaskRecord> {
        let (_, record) = self
            .find_task_mut(name)
            .ok_or_else(|| LedgerError::unknown_task(name))?;

        if entry.working.is_known() {
            record.working = entry.working;
        }
        record.status_history.push(entry);
        Ok(&*record)
    }

    /// Replace `test_plan.current_focus`.
    ///
    /// Names are not checked here; [`LedgerValidator`] reports unknown ones.
    pub fn set_focus<I, S>(&mut self, names: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.test_plan.current_focus = names.into_iter().map(Into::into).collect();
    }

    /// Append a note to `agent_communication`.
    pub fn communicate(&mut self, agent: Agent, message: impl Into<String>) {
        self.agent_communication.push(Communication {
            agent,
            message: message.into(),
            timestamp: Some(Utc::now()),
        });
    }

    /// Record one testing-agent verification result.
    ///
    /// A failure on a task that already had a known result counts as a
    /// regression and bumps `stuck_count`; a first failure on an untested
    /// task does not. A pass is the only thing that resets `stuck_count`.
    /// Either way `needs_retesting` is cleared.
    ///
    /// # Errors
    ///
    /// [`LedgerError::UnknownTask`] if no collection holds `name`.
    pub fn record_outcome(
        &mut self,
        name: &str,
        working: bool,
        comment: impl Into<String>,
    ) -> Result<&TaskRecord> {
        let (_, record) = self
            .find_task_mut(name)
            .ok_or_else(|| LedgerError::unknown_task(name))?;

        let previous = record.working;
        if working {
            if record.stuck_count > 0 {
                info!(
                    "Task '{}' passes again, clearing stuck_count {}",
                    record.task, record.stuck_count
                );
            }
            record.stuck_count = 0;
        } else if previous.is_known() {
            record.stuck_count = record.stuck_count.saturating_add(1);
            debug!(
                "Task '{}' still failing, stuck_count now {}",
                record.task, record.stuck_count
            );
        }

        record.working = Working::from(working);
        record.needs_retesting = false;
        record
            .status_history
            .push(StatusEntry::new(Agent::Testing, working, comment).stamped());
        Ok(&*record)
    }

    /// Main-agent request to re-verify tasks.
    ///
    /// Marks each task `needs_retesting`, appends a main-agent entry carrying
    /// its current result, and makes the list the new focus. Repeated names
    /// are handled once.
    ///
    /// # Errors
    ///
    /// [`LedgerError::UnknownTask`] for the first missing name; the ledger is
    /// left untouched in that case.
    pub fn request_retest<S: AsRef<str>>(&mut self, names: &[S], comment: &str) -> Result<()> {
        if let Some(missing) = names.iter().find(|n| !self.contains_task(n.as_ref())) {
            return Err(LedgerError::unknown_task(missing.as_ref()));
        }

        let mut unique: Vec<String> = Vec::with_capacity(names.len());
        for name in names {
            let name = name.as_ref().trim();
            if !unique.iter().any(|n| n == name) {
                unique.push(name.to_string());
            }
        }

        for name in &unique {
            if let Some((_, record)) = self.find_task_mut(name) {
                record.needs_retesting = true;
                let entry = StatusEntry::new(Agent::Main, record.working, comment).stamped();
                record.status_history.push(entry);
            }
        }

        self.set_focus(unique);
        Ok(())
    }

    /// Recompute `test_plan.stuck_tasks` from the records.
    pub fn refresh_stuck_tasks(&mut self, threshold: u32) -> &[String] {
        let stuck: Vec<String> = self
            .tasks()
            .filter(|(_, t)| t.is_stuck(threshold))
            .map(|(_, t)| t.name().to_string())
            .collect();
        self.test_plan.stuck_tasks = stuck;
        &self.test_plan.stuck_tasks
    }

    /// Tasks the next testing round covers, in visiting order.
    ///
    /// Either every task (`test_all`) or the deduplicated focus list, then
    /// ordered by `test_priority`. Focus names that match no task are kept
    /// so the caller can report them.
    #[must_use]
    pub fn test_scope(&self) -> Vec<String> {
        let candidates: Vec<&str> = if self.test_plan.test_all {
            self.tasks().map(|(_, t)| t.name()).collect()
        } else {
            self.test_plan
                .current_focus
                .iter()
                .map(|s| s.trim())
                .collect()
        };

        let mut scope: Vec<String> = Vec::with_capacity(candidates.len());
        for name in candidates {
            if !scope.iter().any(|s| s == name) {
                scope.push(name.to_string());
            }
        }

        match self.test_plan.test_priority {
            TestPriority::Sequential => {}
            TestPriority::HighFirst => scope.sort_by_key(|name| {
                self.find_task(name)
                    .map_or(Priority::Low, |(_, t)| t.priority)
            }),
            TestPriority::StuckFirst => scope.sort_by_key(|name| {
                Reverse(self.find_task(name).map_or(0, |(_, t)| t.stuck_count))
            }),
        }
        scope
    }

    /// Aggregate counts across both collections.
    #[must_use]
    pub fn counts(&self, stuck_threshold: u32) -> LedgerCounts {
        let mut counts = LedgerCounts::default();
        for (collection, task) in self.tasks() {
            counts.total += 1;
            match collection {
                Collection::Backend => counts.backend += 1,
                Collection::Frontend => counts.frontend += 1,
            }
            if task.implemented {
                counts.implemented += 1;
            }
            match task.working {
                Working::Yes => counts.working += 1,
                Working::No => counts.failing += 1,
                Working::Unknown => counts.untested += 1,
            }
            if task.needs_retesting {
                counts.needs_retesting += 1;
            }
            if task.is_stuck(stuck_threshold) {
                counts.stuck += 1;
            }
        }
        counts
    }
}

// ============================================================================
// Tests
// ============================================================================
