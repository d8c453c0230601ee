//! Property results and the checker trait.

use std::fmt;

use crate::counterexample::Counterexample;

/// Outcome of checking a single named property.
#[derive(Debug, Clone)]
pub struct PropertyResult {
    /// Property name, e.g. `NoLostElements`
    pub name: &'static str,
    /// Structure the property belongs to, e.g. `stack`
    pub structure: &'static str,
    /// Whether the property held
    pub holds: bool,
    /// Human-readable violation description
    pub violation: Option<String>,
    /// Failure path, when the checker could build one
    pub counterexample: Option<Counterexample>,
}

impl PropertyResult {
    #[must_use]
    pub fn pass(structure: &'static str, name: &'static str) -> Self {
        Self {
            name,
            structure,
            holds: true,
            violation: None,
            counterexample: None,
        }
    }

    #[must_use]
    pub fn fail(
        structure: &'static str,
        name: &'static str,
        violation: impl Into<String>,
        counterexample: Option<Counterexample>,
    ) -> Self {
        Self {
            name,
            structure,
            holds: false,
            violation: Some(violation.into()),
            counterexample,
        }
    }
}

impl fmt::Display for PropertyResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.violation {
            None => write!(f, "[PASS] {}::{}", self.structure, self.name),
            Some(v) => write!(f, "[FAIL] {}::{}: {}", self.structure, self.name, v),
        }
    }
}

/// Something that can check a set of properties.
pub trait PropertyChecker {
    /// Check every property and return one result per property.
    fn check_all(&self) -> Vec<PropertyResult>;

    /// True when every property holds.
    fn all_hold(&self) -> bool {
        self.check_all().iter().all(|r| r.holds)
    }

    /// Only the failing results.
    fn failures(&self) -> Vec<PropertyResult> {
        self.check_all().into_iter().filter(|r| !r.holds).collect()
    }
}
