//! Value types carried by task records.
//!
//! - [`Working`] - tri-state test result (`true`, `false`, `"NA"`)
//! - [`Agent`] - who wrote a status entry or message
//! - [`Priority`] - task priority
//! - [`TestPriority`] - ordering used when testing everything
//! - [`Collection`] - which half of the ledger a task lives in

use std::fmt;
use std::str::FromStr;

use serde::de::{self, Visitor};
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::error::LedgerError;

// ============================================================================
// Working
// ============================================================================

/// Whether a task currently works.
///
/// Serialized as a YAML boolean, or the string `"NA"` when the task has not
/// been tested yet. A missing or null value reads as [`Working::Unknown`].
///
/// # Example
///
/// ```
/// use agent_ledger::ledger::Working;
///
/// assert_eq!("NA".parse::<Working>().unwrap(), Working::Unknown);
/// assert_eq!("true".parse::<Working>().unwrap(), Working::Yes);
/// assert_eq!(Working::from(false), Working::No);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Working {
    /// Verified working
    Yes,
    /// Verified broken
    No,
    /// Not tested yet
    #[default]
    Unknown,
}

impl Working {
    /// Check if a result is known.
    #[must_use]
    pub fn is_known(self) -> bool {
        !matches!(self, Working::Unknown)
    }
}

impl From<bool> for Working {
    fn from(value: bool) -> Self {
        if value {
            Working::Yes
        } else {
            Working::No
        }
    }
}

impl fmt::Display for Working {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Working::Yes => write!(f, "true"),
            Working::No => write!(f, "false"),
            Working::Unknown => write!(f, "NA"),
        }
    }
}

impl FromStr for Working {
    type Err = LedgerError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "true" | "yes" | "pass" => Ok(Working::Yes),
            "false" | "no" | "fail" => Ok(Working::No),
            "na" | "n/a" | "unknown" | "" => Ok(Working::Unknown),
            _ => Err(LedgerError::invalid_value("working", s)),
        }
    }
}

impl Serialize for Working {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Working::Yes => serializer.serialize_bool(true),
            Working::No => serializer.serialize_bool(false),
            Working::Unknown => serializer.serialize_str("NA"),
        }
    }
}

struct WorkingVisitor;

impl<'de> Visitor<'de> for WorkingVisitor {
    type Value = Working;

    fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "a boolean or \"NA\"")
    }

    fn visit_bool<E: de::Error>(self, v: bool) -> Result<Working, E> {
        Ok(Working::from(v))
    }

    fn visit_str<E: de::Error>(self, v: &str) -> Result<Working, E> {
        v.parse()
            .map_err(|_| E::invalid_value(de::Unexpected::Str(v), &self))
    }

    fn visit_unit<E: de::Error>(self) -> Result<Working, E> {
        Ok(Working::Unknown)
    }

    fn visit_none<E: de::Error>(self) -> Result<Working, E> {
        Ok(Working::Unknown)
    }

    fn visit_some<D: Deserializer<'de>>(self, deserializer: D) -> Result<Working, D::Error> {
        deserializer.deserialize_any(WorkingVisitor)
    }
}

impl<'de> Deserialize<'de> for Working {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        deserializer.deserialize_any(WorkingVisitor)
    }
}

// ============================================================================
// Agent
// ============================================================================

/// Author of a status entry or communication note.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, clap::ValueEnum,
)]
#[serde(rename_all = "lowercase")]
pub enum Agent {
    /// Implements changes and prepares the ledger
    Main,
    /// Verifies changes and records outcomes
    Testing,
    /// A person reviewing the ledger
    User,
}

impl fmt::Display for Agent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Agent::Main => write!(f, "main"),
            Agent::Testing => write!(f, "testing"),
            Agent::User => write!(f, "user"),
        }
    }
}

// ============================================================================
// Priority
// ============================================================================

/// Task priority. Declaration order is the sort order (high first).
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    Hash,
    Default,
    Serialize,
    Deserialize,
    clap::ValueEnum,
)]
#[serde(rename_all = "lowercase")]
pub enum Priority {
    High,
    #[default]
    Medium,
    Low,
}

impl fmt::Display for Priority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Priority::High => write!(f, "high"),
            Priority::Medium => write!(f, "medium"),
            Priority::Low => write!(f, "low"),
        }
    }
}

// ============================================================================
// Test Priority
// ============================================================================

/// Order in which a testing round visits its tasks.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, clap::ValueEnum,
)]
#[serde(rename_all = "snake_case")]
pub enum TestPriority {
    /// High priority tasks first, document order within a priority
    #[default]
    HighFirst,
    /// Document order
    Sequential,
    /// Highest `stuck_count` first
    StuckFirst,
}

impl fmt::Display for TestPriority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TestPriority::HighFirst => write!(f, "high_first"),
            TestPriority::Sequential => write!(f, "sequential"),
            TestPriority::StuckFirst => write!(f, "stuck_first"),
        }
    }
}

// ============================================================================
// Collection
// ============================================================================

/// The two task collections of a ledger.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, clap::ValueEnum,
)]
#[serde(rename_all = "lowercase")]
pub enum Collection {
    Backend,
    Frontend,
}

impl Collection {
    /// The collection a task name must not also appear in.
    #[must_use]
    pub fn other(self) -> Self {
        match self {
            Collection::Backend => Collection::Frontend,
            Collection::Frontend => Collection::Backend,
        }
    }
}

impl fmt::Display for Collection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Collection::Backend => write!(f, "backend"),
            Collection::Frontend => write!(f, "frontend"),
        }
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, Serialize, Deserialize, PartialEq)]
    struct Holder {
        #[serde(default)]
        working: Working,
    }

    #[test]
    fn test_working_parse_variants() {
        assert_eq!("TRUE".parse::<Working>().unwrap(), Working::Yes);
        assert_eq!(" false ".parse::<Working>().unwrap(), Working::No);
        assert_eq!("N/A".parse::<Working>().unwrap(), Working::Unknown);
        assert!("maybe".parse::<Working>().is_err());
    }

    #[test]
    fn test_working_yaml_forms() {
        let yes: Holder = serde_yaml::from_str("working: true").unwrap();
        assert_eq!(yes.working, Working::Yes);

        let na: Holder = serde_yaml::from_str("working: \"NA\"").unwrap();
        assert_eq!(na.working, Working::Unknown);

        let bare_na: Holder = serde_yaml::from_str("working: NA").unwrap();
        assert_eq!(bare_na.working, Working::Unknown);

        let null: Holder = serde_yaml::from_str("working: ~").unwrap();
        assert_eq!(null.working, Working::Unknown);

        let missing: Holder = serde_yaml::from_str("{}").unwrap();
        assert_eq!(missing.working, Working::Unknown);
    }

    #[test]
    fn test_working_serializes_as_bool_or_na() {
        let out = serde_yaml::to_string(&Holder {
            working: Working::No,
        })
        .unwrap();
        assert_eq!(out.trim(), "working: false");

        let out = serde_yaml::to_string(&Holder {
            working: Working::Unknown,
        })
        .unwrap();
        assert!(out.contains("NA"));
    }

    #[test]
    fn test_working_rejects_garbage_yaml() {
        let result: Result<Holder, _> = serde_yaml::from_str("working: sometimes");
        assert!(result.is_err());
    }

    #[test]
    fn test_priority_ordering() {
        let mut priorities = vec![Priority::Low, Priority::High, Priority::Medium];
        priorities.sort();
        assert_eq!(
            priorities,
            vec![Priority::High, Priority::Medium, Priority::Low]
        );
    }

    #[test]
    fn test_priority_rejects_unknown_value() {
        let result: Result<Priority, _> = serde_yaml::from_str("urgent");
        assert!(result.is_err());
    }

    #[test]
    fn test_test_priority_snake_case() {
        let tp: TestPriority = serde_yaml::from_str("stuck_first").unwrap();
        assert_eq!(tp, TestPriority::StuckFirst);
        assert_eq!(TestPriority::HighFirst.to_string(), "high_first");
    }

    #[test]
    fn test_collection_other() {
        assert_eq!(Collection::Backend.other(), Collection::Frontend);
        assert_eq!(Collection::Frontend.other(), Collection::Backend);
    }
}
