//! Status conditions shared by Integrations and IntegrationKits

use super::{IntegrationKitStatus, IntegrationStatus};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Kubernetes style condition status
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum ConditionStatus {
    True,
    False,
    #[default]
    Unknown,
}

macro_rules! status_condition {
    ($(#[$doc:meta])* $name:ident) => {
        $(#[$doc])*
        #[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
        #[serde(rename_all = "camelCase")]
        pub struct $name {
            #[serde(rename = "type")]
            pub type_: String,
            pub status: ConditionStatus,
            #[serde(default, skip_serializing_if = "Option::is_none")]
            pub last_update_time: Option<DateTime<Utc>>,
            #[serde(default, skip_serializing_if = "Option::is_none")]
            pub last_transition_time: Option<DateTime<Utc>>,
            #[serde(default, skip_serializing_if = "String::is_empty")]
            pub reason: String,
            #[serde(default, skip_serializing_if = "String::is_empty")]
            pub message: String,
        }
    };
}

status_condition!(
    /// Condition attached to an Integration status
    IntegrationCondition
);
status_condition!(
    /// Condition attached to an IntegrationKit status
    IntegrationKitCondition
);

// Conditions are keyed by type: setting one replaces the existing entry, keeping
// its transition time when the status did not change.
macro_rules! impl_conditions {
    ($status:ty, $condition:ty) => {
        impl $status {
            pub fn get_condition(&self, condition_type: &str) -> Option<&$condition> {
                self.conditions.iter().find(|c| c.type_ == condition_type)
            }

            pub fn set_condition(&mut self, mut condition: $condition) {
                let now = Utc::now();
                condition.last_update_time = Some(now);

                match self
                    .conditions
                    .iter_mut()
                    .find(|c| c.type_ == condition.type_)
                {
                    Some(existing) => {
                        condition.last_transition_time = if existing.status == condition.status {
                            existing.last_transition_time.or(Some(now))
                        } else {
                            Some(now)
                        };
                        *existing = condition;
                    }
                    None => {
                        condition.last_transition_time = Some(now);
                        self.conditions.push(condition);
                    }
                }
            }

            pub fn remove_condition(&mut self, condition_type: &str) {
                self.conditions.retain(|c| c.type_ != condition_type);
            }
        }
    };
}

impl_conditions!(IntegrationStatus, IntegrationCondition);
impl_conditions!(IntegrationKitStatus, IntegrationKitCondition);

#[cfg(test)]
mod tests {
    use super::*;

    fn condition(status: ConditionStatus, message: &str) -> IntegrationCondition {
        IntegrationCondition {
            type_: "GCTraitInfo".to_string(),
            status,
            message: message.to_string(),
            ..Default::default()
        }
    }

    #[test]
    fn test_set_condition_replaces_by_type() {
        let mut status = IntegrationStatus::default();
        status.set_condition(condition(ConditionStatus::True, "first"));
        status.set_condition(condition(ConditionStatus::True, "second"));

        assert_eq!(status.conditions.len(), 1);
        assert_eq!(status.conditions[0].message, "second");
    }

    #[test]
    fn test_transition_time_kept_when_status_unchanged() {
        let mut status = IntegrationStatus::default();
        status.set_condition(condition(ConditionStatus::True, "first"));
        let first = status.conditions[0].last_transition_time;

        status.set_condition(condition(ConditionStatus::True, "again"));
        assert_eq!(status.conditions[0].last_transition_time, first);
    }

    #[test]
    fn test_remove_condition() {
        let mut status = IntegrationKitStatus::default();
        status.set_condition(IntegrationKitCondition {
            type_: "JVMTraitInfo".to_string(),
            status: ConditionStatus::False,
            ..Default::default()
        });
        status.remove_condition("JVMTraitInfo");
        assert!(status.get_condition("JVMTraitInfo").is_none());
    }
}
