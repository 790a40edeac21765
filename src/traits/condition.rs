//! Conditions produced by traits

use crate::apis::{ConditionStatus, IntegrationCondition, IntegrationKitCondition};

/// Reason attached to conditions explaining a trait configuration decision
pub const TRAIT_CONFIGURATION_REASON: &str = "TraitConfiguration";

/// Suffix of the condition type produced by a trait
pub const TRAIT_INFO_CONDITION: &str = "TraitInfo";

pub const USER_DISABLED_MESSAGE: &str = "explicitly disabled by the user";
pub const PLATFORM_DISABLED_MESSAGE: &str = "explicitly disabled by the platform";

/// A trait level condition, attached to the Integration (or the IntegrationKit)
/// status under the type `<trait-id><suffix>`
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TraitCondition {
    trait_id: String,
    type_suffix: String,
    status: ConditionStatus,
    reason: String,
    message: String,
}

impl TraitCondition {
    pub fn new(
        trait_id: impl Into<String>,
        status: ConditionStatus,
        reason: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self {
            trait_id: trait_id.into(),
            type_suffix: TRAIT_INFO_CONDITION.to_string(),
            status,
            reason: reason.into(),
            message: message.into(),
        }
    }

    /// Override the condition type suffix
    pub fn with_type_suffix(mut self, suffix: impl Into<String>) -> Self {
        self.type_suffix = suffix.into();
        self
    }

    /// The trait was switched off in the Integration configuration
    pub fn user_disabled(trait_id: impl Into<String>) -> Self {
        Self::new(
            trait_id,
            ConditionStatus::True,
            TRAIT_CONFIGURATION_REASON,
            USER_DISABLED_MESSAGE,
        )
    }

    /// The trait was switched off by the platform, `message` gives the reason
    pub fn platform_disabled(trait_id: impl Into<String>, message: &str) -> Self {
        let message = if message.is_empty() {
            PLATFORM_DISABLED_MESSAGE.to_string()
        } else {
            format!("{}: {}", PLATFORM_DISABLED_MESSAGE, message)
        };
        Self::new(
            trait_id,
            ConditionStatus::True,
            TRAIT_CONFIGURATION_REASON,
            message,
        )
    }

    pub fn trait_id(&self) -> &str {
        &self.trait_id
    }

    pub fn condition_type(&self) -> String {
        format!("{}{}", self.trait_id, self.type_suffix)
    }

    pub fn status(&self) -> ConditionStatus {
        self.status
    }

    pub fn reason(&self) -> &str {
        &self.reason
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    /// Integration view of the condition
    pub fn integration_condition(&self) -> IntegrationCondition {
        IntegrationCondition {
            type_: self.condition_type(),
            status: self.status,
            reason: self.reason.clone(),
            message: self.message.clone(),
            ..Default::default()
        }
    }

    /// IntegrationKit view of the condition
    pub fn kit_condition(&self) -> IntegrationKitCondition {
        IntegrationKitCondition {
            type_: self.condition_type(),
            status: self.status,
            reason: self.reason.clone(),
            message: self.message.clone(),
            ..Default::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_user_disabled() {
        let condition = TraitCondition::user_disabled("GC");
        assert_eq!(condition.condition_type(), "GCTraitInfo");
        assert_eq!(condition.message(), USER_DISABLED_MESSAGE);
        assert_eq!(condition.reason(), TRAIT_CONFIGURATION_REASON);
    }

    #[test]
    fn test_views_share_payload() {
        let condition = TraitCondition::platform_disabled("Knative", "not installed");
        let it = condition.integration_condition();
        let kit = condition.kit_condition();
        assert_eq!(it.type_, kit.type_);
        assert_eq!(it.message, "explicitly disabled by the platform: not installed");
        assert_eq!(kit.status, ConditionStatus::True);
    }
}
