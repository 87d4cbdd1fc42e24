//! Post-validation routing.

use dbagent_types::Validation;
use serde::{Deserialize, Serialize};

use crate::stages::Stage;

/// Where a run goes after validation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Route {
    Clarify,
    Proceed,
}

impl Route {
    pub fn as_str(&self) -> &'static str {
        match self {
            Route::Clarify => "clarify",
            Route::Proceed => "proceed",
        }
    }

    /// Stages that follow on this route, in order. Both routes terminate the run.
    pub fn stages(&self) -> &'static [Stage] {
        match self {
            Route::Clarify => &[Stage::RequestClarification],
            Route::Proceed => &[Stage::GenerateQuery, Stage::Execute],
        }
    }
}

impl std::fmt::Display for Route {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Proceed only when validation exists, asks for nothing and allows execution.
pub fn route(validation: Option<&Validation>) -> Route {
    match validation {
        Some(v) if !v.needs_clarification && v.can_proceed => Route::Proceed,
        _ => Route::Clarify,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn complete_validation_proceeds() {
        let v = Validation::from_completeness(true);
        assert_eq!(route(Some(&v)), Route::Proceed);
        assert_eq!(
            Route::Proceed.stages(),
            &[Stage::GenerateQuery, Stage::Execute]
        );
    }

    #[test]
    fn incomplete_or_missing_validation_clarifies() {
        assert_eq!(route(None), Route::Clarify);
        assert_eq!(route(Some(&Validation::from_completeness(false))), Route::Clarify);
        assert_eq!(route(Some(&Validation::failed("boom"))), Route::Clarify);
        assert_eq!(Route::Clarify.stages(), &[Stage::RequestClarification]);
    }

    #[test]
    fn contradictory_flags_do_not_proceed() {
        let v = Validation {
            needs_clarification: false,
            can_proceed: false,
            ..Validation::from_completeness(true)
        };
        assert_eq!(route(Some(&v)), Route::Clarify);
    }
}
