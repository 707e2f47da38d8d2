//! Ledger validation.
//!
//! Rules the agents used to follow by convention are checked here and
//! reported as errors (the document is inconsistent) or warnings (the
//! document is usable but something looks off).
//!
//! # Example
//!
//! ```
//! use agent_ledger::ledger::{Ledger, LedgerValidator};
//!
//! let mut ledger = Ledger::default();
//! ledger.set_focus(["Task X"]);
//!
//! let report = LedgerValidator::new(3).validate(&ledger);
//! assert!(report.is_valid());
//! assert_eq!(report.warnings.len(), 1);
//!
//! let strict = LedgerValidator::new(3).strict(true).validate(&ledger);
//! assert!(!strict.is_valid());
//! ```

use std::collections::HashSet;

use tracing::{debug, warn};

use super::{Collection, Ledger, Working};

/// Result of validating a ledger.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ValidationReport {
    /// Problems that make the ledger inconsistent.
    pub errors: Vec<String>,
    /// Problems that don't prevent use but should be looked at.
    pub warnings: Vec<String>,
}

impl ValidationReport {
    /// Create a new empty (valid) report.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns true if there are no errors. Warnings do not affect validity.
    #[must_use]
    pub fn is_valid(&self) -> bool {
        self.errors.is_empty()
    }

    /// Returns 0 if valid, 1 if invalid.
    #[must_use]
    pub fn exit_code(&self) -> i32 {
        if self.is_valid() {
            0
        } else {
            1
        }
    }

    /// One-line summary.
    #[must_use]
    pub fn summary(&self) -> String {
        if self.is_valid() {
            if self.warnings.is_empty() {
                "Ledger is valid.".to_string()
            } else {
                format!("Ledger is valid with {} warning(s).", self.warnings.len())
            }
        } else {
            format!("Ledger is invalid with {} error(s).", self.errors.len())
        }
    }

    /// Multi-line report listing every finding.
    #[must_use]
    pub fn verbose_report(&self) -> String {
        let mut lines = vec!["Ledger Validation Report".to_string(), "\u{2500}".repeat(50)];

        if !self.errors.is_empty() {
            lines.push(String::new());
            lines.push(format!("Errors ({}):", self.errors.len()));
            for error in &self.errors {
                lines.push(format!("  \u{2717} {}", error));
            }
        }

        if !self.warnings.is_empty() {
            lines.push(String::new());
            lines.push(format!("Warnings ({}):", self.warnings.len()));
            for warning in &self.warnings {
                lines.push(format!("  \u{26a0} {}", warning));
            }
        }

        lines.push(String::new());
        lines.push(format!("Status: {}", self.summary()));
        lines.join("\n")
    }
}

/// Checks a [`Ledger`] against its consistency rules.
#[derive(Debug, Clone)]
pub struct LedgerValidator {
    stuck_threshold: u32,
    strict: bool,
}

impl LedgerValidator {
    /// Create a validator using `stuck_threshold` for stuck-task checks.
    #[must_use]
    pub fn new(stuck_threshold: u32) -> Self {
        Self {
            stuck_threshold,
            strict: false,
        }
    }

    /// In strict mode every warning is reported as an error.
    #[must_use]
    pub fn strict(mut self, strict: bool) -> Self {
        self.strict = strict;
        self
    }

    /// Run every check.
    #[must_use]
    pub fn validate(&self, ledger: &Ledger) -> ValidationReport {
        let mut report = ValidationReport::new();

        self.check_names(ledger, &mut report);
        self.check_references(ledger, &mut report);
        self.check_records(ledger, &mut report);

        if self.strict && !report.warnings.is_empty() {
            let warnings = std::mem::take(&mut report.warnings);
            report.errors.extend(warnings);
        }

        for error in &report.errors {
            warn!("ledger validation: {}", error);
        }
        debug!(
            "Validated ledger: {} error(s), {} warning(s)",
            report.errors.len(),
            report.warnings.len()
        );
        report
    }

    fn check_names(&self, ledger: &Ledger, report: &mut ValidationReport) {
        let mut seen: HashSet<&str> = HashSet::new();
        for collection in [Collection::Backend, Collection::Frontend] {
            let mut local: HashSet<&str> = HashSet::new();
            for task in ledger.collection(collection) {
                let name = task.name();
                if name.is_empty() {
                    report
                        .errors
                        .push(format!("{collection} contains a task with an empty name"));
                    continue;
                }
                if name != task.task {
                    report.errors.push(format!(
                        "Task '{}' in {collection} has leading or trailing whitespace",
                        task.task
                    ));
                }
                if !local.insert(name) {
                    report
                        .errors
                        .push(format!("Duplicate task '{name}' in {collection}"));
                } else if !seen.insert(name) {
                    report.errors.push(format!(
                        "Task '{name}' appears in both backend and frontend"
                    ));
                }
            }
        }
    }

    fn check_references(&self, ledger: &Ledger, report: &mut ValidationReport) {
        for name in &ledger.test_plan.current_focus {
            if !ledger.contains_task(name) {
                report.warnings.push(format!(
                    "current_focus references unknown task '{name}'"
                ));
            }
        }
        for name in &ledger.test_plan.stuck_tasks {
            if !ledger.contains_task(name) {
                report
                    .warnings
                    .push(format!("stuck_tasks references unknown task '{name}'"));
            }
        }
    }

    fn check_records(&self, ledger: &Ledger, report: &mut ValidationReport) {
        for (collection, task) in ledger.tasks() {
            if task.working == Working::Yes && !task.implemented {
                report.warnings.push(format!(
                    "Task '{}' in {} is marked working but not implemented",
                    task.task, collection
                ));
            }
            if task.is_stuck(self.stuck_threshold)
                && !ledger
                    .test_plan
                    .stuck_tasks
                    .iter()
                    .any(|s| s.trim() == task.name())
            {
                report.warnings.push(format!(
                    "Task '{}' has stuck_count {} (threshold {}) but is not listed in stuck_tasks",
                    task.task, task.stuck_count, self.stuck_threshold
                ));
            }
        }
    }
}
