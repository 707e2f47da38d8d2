//! agent-ledger - status ledger for a main agent and a testing agent
//!
//! The ledger is a YAML document recording, per unit of work, whether it is
//! implemented, whether it works, how often it regressed, and an
//! append-only history of notes from each agent.
//!
//! # Architecture
//!
//! - [`ledger`] - Document model, operations, validation and file storage
//! - [`protocol`] - Hand-off and testing-round turn taking
//! - [`config`] - Layered settings
//! - [`error`] - Error types and exit codes
//!
//! # Example
//!
//! ```no_run
//! use agent_ledger::ledger::{Collection, LedgerStore, TaskFields};
//! use agent_ledger::protocol::{hand_off, TestingRound};
//!
//! let store = LedgerStore::new("test_result.md");
//!
//! // Main agent
//! store.update(|ledger| {
//!     ledger.upsert_task(
//!         Collection::Backend,
//!         "Replace MongoDB with SQLite for local storage",
//!         TaskFields::new().with_implemented(true).with_file("backend/database.py"),
//!     )?;
//!     hand_off(ledger, &["Replace MongoDB with SQLite for local storage"], "Ready")
//! })?;
//!
//! // Testing agent
//! store.update(|ledger| {
//!     let mut round = TestingRound::begin(ledger)?;
//!     round.record("Replace MongoDB with SQLite for local storage", true, "CRUD ok")?;
//!     round.finish(ledger, "All green", 3)
//! })?;
//! # Ok::<(), agent_ledger::LedgerError>(())
//! ```

pub mod config;
pub mod error;
pub mod ledger;
pub mod protocol;

// Re-export commonly used types
pub use error::{LedgerError, Result};

pub use config::LedgerConfig;

pub use ledger::{
    Agent, Collection, Ledger, LedgerCounts, LedgerDocument, LedgerStore, LedgerValidator,
    Priority, StatusEntry, TaskFields, TaskRecord, TestPriority, UpsertOutcome, ValidationReport,
    Working,
};

pub use protocol::{hand_off, Outcome, RoundSummary, TestingRound};
