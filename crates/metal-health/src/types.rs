//! Health results and their reduction into conditions

use std::fmt;

use metal_common::crd::{Condition, ConditionStatus};

/// Reason of a condition whose checks all passed
pub const REASON_SUCCESSFUL: &str = "HealthCheckSuccessful";

/// Reason of a condition with a failing check
pub const REASON_UNSUCCESSFUL: &str = "HealthCheckUnsuccessful";

/// Reason of a condition whose checks could not be evaluated
pub const REASON_ERROR: &str = "HealthCheckError";

/// Outcome of a single check
///
/// Ordered from best to worst so the worst of several results is their
/// maximum.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum HealthStatus {
    /// Healthy
    True,
    /// Could not be evaluated
    Unknown,
    /// Unhealthy
    False,
}

impl fmt::Display for HealthStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::True => f.write_str("True"),
            Self::Unknown => f.write_str("Unknown"),
            Self::False => f.write_str("False"),
        }
    }
}

impl From<HealthStatus> for ConditionStatus {
    fn from(status: HealthStatus) -> Self {
        match status {
            HealthStatus::True => ConditionStatus::True,
            HealthStatus::Unknown => ConditionStatus::Unknown,
            HealthStatus::False => ConditionStatus::False,
        }
    }
}

/// Status plus an optional human-readable detail
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct HealthResult {
    /// Status
    pub status: HealthStatus,
    /// What is wrong, if anything
    pub detail: Option<String>,
}

impl HealthResult {
    /// A passing result
    pub fn healthy() -> Self {
        Self {
            status: HealthStatus::True,
            detail: None,
        }
    }

    /// A failing result
    pub fn unhealthy(detail: impl Into<String>) -> Self {
        Self {
            status: HealthStatus::False,
            detail: Some(detail.into()),
        }
    }

    /// A result for a check that could not be evaluated
    pub fn unknown(detail: impl Into<String>) -> Self {
        Self {
            status: HealthStatus::Unknown,
            detail: Some(detail.into()),
        }
    }

    /// Whether the check passed
    pub fn is_healthy(&self) -> bool {
        self.status == HealthStatus::True
    }
}

/// Reduce the results contributing to one condition, worst wins
///
/// The detail joins the details of every result sharing the worst status.
/// No results at all count as healthy.
pub fn reduce(results: &[HealthResult]) -> HealthResult {
    let Some(worst) = results.iter().map(|r| r.status).max() else {
        return HealthResult::healthy();
    };

    let details: Vec<&str> = results
        .iter()
        .filter(|r| r.status == worst)
        .filter_map(|r| r.detail.as_deref())
        .filter(|d| !d.is_empty())
        .collect();

    HealthResult {
        status: worst,
        detail: (!details.is_empty()).then(|| details.join("; ")),
    }
}

/// Render a reduced result as a condition of the given type
pub fn to_condition(condition_type: &str, result: &HealthResult) -> Condition {
    let reason = match result.status {
        HealthStatus::True => REASON_SUCCESSFUL,
        HealthStatus::Unknown => REASON_ERROR,
        HealthStatus::False => REASON_UNSUCCESSFUL,
    };
    let message = match (&result.detail, result.status) {
        (Some(detail), _) => detail.clone(),
        (None, HealthStatus::True) => "All checks passed".to_string(),
        (None, _) => String::new(),
    };
    Condition::new(condition_type, result.status.into(), reason, message)
}
