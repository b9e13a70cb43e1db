//! Condition types shared by the extension resources

use chrono::{DateTime, Utc};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Condition type for control plane health
pub const SHOOT_CONTROL_PLANE_HEALTHY: &str = "ShootControlPlaneHealthy";

/// Condition type for system component health
pub const SHOOT_SYSTEM_COMPONENTS_HEALTHY: &str = "ShootSystemComponentsHealthy";

/// Condition type for node readiness
pub const SHOOT_EVERY_NODE_READY: &str = "ShootEveryNodeReady";

/// Status of a condition
#[derive(Clone, Copy, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq, Eq)]
pub enum ConditionStatus {
    /// Condition is true
    True,
    /// Condition is false
    False,
    /// Condition status is unknown
    #[default]
    Unknown,
}

impl std::fmt::Display for ConditionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::True => write!(f, "True"),
            Self::False => write!(f, "False"),
            Self::Unknown => write!(f, "Unknown"),
        }
    }
}

/// Host-style condition as stored in extension resource status
#[derive(Clone, Debug, Deserialize, Serialize, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Condition {
    /// Type of condition (e.g., ShootControlPlaneHealthy)
    #[serde(rename = "type")]
    pub type_: String,

    /// Status of the condition (True, False, Unknown)
    pub status: ConditionStatus,

    /// Machine-readable reason for the condition
    #[serde(default)]
    pub reason: String,

    /// Human-readable message
    #[serde(default)]
    pub message: String,

    /// Last time the status changed
    pub last_transition_time: DateTime<Utc>,

    /// Last time the condition was written
    pub last_update_time: DateTime<Utc>,
}

impl Condition {
    /// Create a new condition with the current timestamp
    pub fn new(
        type_: impl Into<String>,
        status: ConditionStatus,
        reason: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        let now = Utc::now();
        Self {
            type_: type_.into(),
            status,
            reason: reason.into(),
            message: message.into(),
            last_transition_time: now,
            last_update_time: now,
        }
    }
}

/// Insert or replace `update` in `conditions` by type
///
/// The transition time of an existing condition is kept when its status does
/// not change.
pub fn merge_condition(conditions: &mut Vec<Condition>, mut update: Condition) {
    match conditions.iter_mut().find(|c| c.type_ == update.type_) {
        Some(existing) => {
            if existing.status == update.status {
                update.last_transition_time = existing.last_transition_time;
            }
            *existing = update;
        }
        None => conditions.push(update),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    #[test]
    fn condition_serializes_in_host_format() {
        let cond = Condition::new(SHOOT_EVERY_NODE_READY, ConditionStatus::True, "Ok", "");
        let value = serde_json::to_value(&cond).unwrap();
        assert_eq!(value["type"], SHOOT_EVERY_NODE_READY);
        assert_eq!(value["status"], "True");
        assert!(value.get("lastTransitionTime").is_some());
        assert!(value.get("lastUpdateTime").is_some());
    }

    #[test]
    fn merge_keeps_transition_time_when_status_is_stable() {
        let mut old = Condition::new("A", ConditionStatus::True, "Ok", "");
        old.last_transition_time -= Duration::hours(1);
        let original = old.last_transition_time;
        let mut conditions = vec![old];

        merge_condition(
            &mut conditions,
            Condition::new("A", ConditionStatus::True, "Ok", "again"),
        );

        assert_eq!(conditions.len(), 1);
        assert_eq!(conditions[0].last_transition_time, original);
        assert_eq!(conditions[0].message, "again");
    }

    #[test]
    fn merge_moves_transition_time_on_status_change() {
        let mut old = Condition::new("A", ConditionStatus::True, "Ok", "");
        old.last_transition_time -= Duration::hours(1);
        let original = old.last_transition_time;
        let mut conditions = vec![old];

        merge_condition(
            &mut conditions,
            Condition::new("A", ConditionStatus::False, "Broken", "x"),
        );

        assert_ne!(conditions[0].last_transition_time, original);
        assert_eq!(conditions[0].status, ConditionStatus::False);
    }

    #[test]
    fn merge_appends_new_types() {
        let mut conditions = vec![Condition::new("A", ConditionStatus::True, "", "")];
        merge_condition(
            &mut conditions,
            Condition::new("B", ConditionStatus::Unknown, "", ""),
        );
        assert_eq!(conditions.len(), 2);
        assert_eq!(conditions[1].type_, "B");
    }
}
