//! Aggregate counts over a ledger.

use serde::{Deserialize, Serialize};

// ============================================================================
// Ledger Counts
// ============================================================================

/// Snapshot of how many tasks are in each state.
///
/// # Example
///
/// ```
/// use agent_ledger::ledger::LedgerCounts;
///
/// let counts = LedgerCounts {
///     total: 4,
///     implemented: 4,
///     working: 4,
///     ..LedgerCounts::default()
/// };
/// assert!(counts.all_working());
/// assert_eq!(counts.pass_rate(), Some(1.0));
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LedgerCounts {
    /// Tasks across both collections
    pub total: u32,
    /// Tasks in `backend`
    pub backend: u32,
    /// Tasks in `frontend`
    pub frontend: u32,
    /// Tasks marked implemented
    pub implemented: u32,
    /// Tasks with `working: true`
    pub working: u32,
    /// Tasks with `working: false`
    pub failing: u32,
    /// Tasks with `working: NA`
    pub untested: u32,
    /// Tasks waiting for the testing agent
    pub needs_retesting: u32,
    /// Tasks at or above the stuck threshold
    pub stuck: u32,
}

impl LedgerCounts {
    /// Every task is tested, working, and nothing is queued for retest.
    #[must_use]
    pub fn all_working(&self) -> bool {
        self.total > 0 && self.working == self.total && self.needs_retesting == 0
    }

    /// Share of tested tasks that pass, `None` if nothing has been tested.
    #[must_use]
    pub fn pass_rate(&self) -> Option<f64> {
        let tested = self.working + self.failing;
        if tested == 0 {
            None
        } else {
            Some(f64::from(self.working) / f64::from(tested))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_counts() {
        let counts = LedgerCounts::default();
        assert!(!counts.all_working());
        assert_eq!(counts.pass_rate(), None);
    }

    #[test]
    fn test_pass_rate_ignores_untested() {
        let counts = LedgerCounts {
            total: 4,
            working: 1,
            failing: 1,
            untested: 2,
            ..LedgerCounts::default()
        };
        assert_eq!(counts.pass_rate(), Some(0.5));
        assert!(!counts.all_working());
    }

    #[test]
    fn test_pending_retest_blocks_all_working() {
        let counts = LedgerCounts {
            total: 2,
            working: 2,
            needs_retesting: 1,
            ..LedgerCounts::default()
        };
        assert!(!counts.all_working());
    }
}
