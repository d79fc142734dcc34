//! ---
//! rsl_section: "15-testing-qa-runbook"
//! rsl_subsection: "module"
//! rsl_type: "source"
//! rsl_scope: "code"
//! rsl_description: "Deterministic failure injection for fakes."
//! rsl_version: "v0.0.0-prealpha"
//! rsl_owner: "tbd"
//! ---
use std::collections::HashSet;
use std::fmt::Display;

use anyhow::bail;
use parking_lot::Mutex;

/// Set of `(operation, key)` pairs that must fail.
#[derive(Debug, Default)]
pub struct FailurePlan {
    rules: Mutex<HashSet<(String, String)>>,
}

impl FailurePlan {
    pub fn fail(&self, operation: &str, key: impl Display) {
        self.rules
            .lock()
            .insert((operation.to_owned(), key.to_string()));
    }

    pub fn heal(&self, operation: &str, key: impl Display) {
        self.rules
            .lock()
            .remove(&(operation.to_owned(), key.to_string()));
    }

    pub fn clear(&self) {
        self.rules.lock().clear();
    }

    pub fn check(&self, operation: &str, key: impl Display) -> anyhow::Result<()> {
        let key = key.to_string();
        if self
            .rules
            .lock()
            .contains(&(operation.to_owned(), key.clone()))
        {
            bail!("injected failure: {operation} {key}");
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_matching_keys_fail() {
        let plan = FailurePlan::default();
        plan.fail("start", 340);
        assert!(plan.check("start", 340).is_err());
        assert!(plan.check("start", 341).is_ok());
        plan.heal("start", 340);
        assert!(plan.check("start", 340).is_ok());
    }
}
