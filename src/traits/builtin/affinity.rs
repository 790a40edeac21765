//! Node affinity, pod affinity and pod anti-affinity constraints

use crate::apis::{INTEGRATION_LABEL, IntegrationPhase};
use crate::traits::decode::lenient;
use crate::traits::{
    BaseTrait, Configured, Environment, ORDER_AFFINITY, Trait, TraitError, TraitResult,
};
use k8s_openapi::api::core::v1::{
    Affinity, NodeAffinity, NodeSelector, NodeSelectorRequirement, NodeSelectorTerm, PodAffinity,
    PodAffinityTerm, PodAntiAffinity,
};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::{LabelSelector, LabelSelectorRequirement};
use serde::Deserialize;
use std::fmt;

pub const ID: &str = "affinity";

const TOPOLOGY_KEY_HOSTNAME: &str = "kubernetes.io/hostname";

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct AffinityConfig {
    #[serde(deserialize_with = "lenient::opt_bool")]
    pub enabled: Option<bool>,
    /// Co-locate the replicas of the Integration on the same node
    #[serde(deserialize_with = "lenient::opt_bool")]
    pub pod_affinity: Option<bool>,
    /// Never co-locate the replicas of the Integration on the same node
    #[serde(deserialize_with = "lenient::opt_bool")]
    pub pod_anti_affinity: Option<bool>,
    #[serde(deserialize_with = "lenient::string_list")]
    pub node_affinity_labels: Vec<String>,
    #[serde(deserialize_with = "lenient::string_list")]
    pub pod_affinity_labels: Vec<String>,
    #[serde(deserialize_with = "lenient::string_list")]
    pub pod_anti_affinity_labels: Vec<String>,
}

pub struct AffinityTrait {
    base: BaseTrait,
    pub config: AffinityConfig,
}

pub(crate) fn new_trait() -> Box<dyn Trait> {
    Box::new(AffinityTrait {
        base: BaseTrait::new(ID, ORDER_AFFINITY),
        config: AffinityConfig::default(),
    })
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SelectorOperator {
    In,
    NotIn,
    Exists,
    DoesNotExist,
    GreaterThan,
    LessThan,
}

impl fmt::Display for SelectorOperator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            SelectorOperator::In => "in",
            SelectorOperator::NotIn => "notin",
            SelectorOperator::Exists => "exists",
            SelectorOperator::DoesNotExist => "!",
            SelectorOperator::GreaterThan => "gt",
            SelectorOperator::LessThan => "lt",
        })
    }
}

/// One clause of a label selector
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Requirement {
    pub key: String,
    pub operator: SelectorOperator,
    /// Sorted
    pub values: Vec<String>,
}

impl Requirement {
    fn node_selector_requirement(&self) -> NodeSelectorRequirement {
        let operator = match self.operator {
            SelectorOperator::In => "In",
            SelectorOperator::NotIn => "NotIn",
            SelectorOperator::Exists => "Exists",
            SelectorOperator::DoesNotExist => "DoesNotExist",
            SelectorOperator::GreaterThan => "Gt",
            SelectorOperator::LessThan => "Lt",
        };
        NodeSelectorRequirement {
            key: self.key.clone(),
            operator: operator.to_string(),
            values: (!self.values.is_empty()).then(|| self.values.clone()),
        }
    }

    fn label_selector_requirement(&self) -> TraitResult<LabelSelectorRequirement> {
        let operator = match self.operator {
            SelectorOperator::In => "In",
            SelectorOperator::NotIn => "NotIn",
            SelectorOperator::Exists => "Exists",
            SelectorOperator::DoesNotExist => "DoesNotExist",
            other => {
                return Err(TraitError::InvalidConfiguration(format!(
                    "unsupported label selector operator: {}",
                    other
                )));
            }
        };
        Ok(LabelSelectorRequirement {
            key: self.key.clone(),
            operator: operator.to_string(),
            values: (!self.values.is_empty()).then(|| self.values.clone()),
        })
    }
}

fn invalid_selector(clause: &str) -> TraitError {
    TraitError::InvalidConfiguration(format!("unable to parse label selector {:?}", clause))
}

fn valid_key(key: &str) -> bool {
    !key.is_empty()
        && key
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '.' | '/' | '-' | '_'))
}

/// Split on commas that are not inside a value set
fn split_clauses(selector: &str) -> Vec<&str> {
    let mut clauses = Vec::new();
    let mut depth = 0usize;
    let mut start = 0;
    for (i, c) in selector.char_indices() {
        match c {
            '(' => depth += 1,
            ')' => depth = depth.saturating_sub(1),
            ',' if depth == 0 => {
                clauses.push(&selector[start..i]);
                start = i + 1;
            }
            _ => {}
        }
    }
    clauses.push(&selector[start..]);
    clauses
}

fn parse_clause(clause: &str) -> TraitResult<Requirement> {
    let requirement = |key: &str, operator, mut values: Vec<String>| {
        let key = key.trim();
        if !valid_key(key) {
            return Err(invalid_selector(clause));
        }
        values.sort();
        Ok(Requirement {
            key: key.to_string(),
            operator,
            values,
        })
    };

    if let Some(key) = clause.strip_prefix('!') {
        return requirement(key, SelectorOperator::DoesNotExist, Vec::new());
    }

    let words: Vec<&str> = clause.splitn(2, char::is_whitespace).collect();
    if let [key, rest] = words.as_slice() {
        let rest = rest.trim_start();
        for (keyword, operator) in [
            ("notin", SelectorOperator::NotIn),
            ("in", SelectorOperator::In),
        ] {
            let Some(set) = rest.strip_prefix(keyword) else {
                continue;
            };
            let set = set.trim();
            let inner = set
                .strip_prefix('(')
                .and_then(|s| s.strip_suffix(')'))
                .ok_or_else(|| invalid_selector(clause))?;
            let values: Vec<String> = inner
                .split(',')
                .map(str::trim)
                .filter(|v| !v.is_empty())
                .map(str::to_string)
                .collect();
            return requirement(key, operator, values);
        }
    }

    for (symbol, operator) in [
        ("!=", SelectorOperator::NotIn),
        ("==", SelectorOperator::In),
        ("=", SelectorOperator::In),
        (">", SelectorOperator::GreaterThan),
        ("<", SelectorOperator::LessThan),
    ] {
        let Some((key, value)) = clause.split_once(symbol) else {
            continue;
        };
        let value = value.trim();
        if matches!(
            operator,
            SelectorOperator::GreaterThan | SelectorOperator::LessThan
        ) && value.parse::<i64>().is_err()
        {
            return Err(invalid_selector(clause));
        }
        return requirement(key, operator, vec![value.to_string()]);
    }

    requirement(clause, SelectorOperator::Exists, Vec::new())
}

/// Parse label selector expressions such as `kubernetes.io/hostname in (a,b)`,
/// `env!=dev` or `!canary`. Each entry may hold several comma separated clauses.
pub fn parse_selector(selectors: &[String]) -> TraitResult<Vec<Requirement>> {
    selectors
        .iter()
        .flat_map(|s| split_clauses(s))
        .map(str::trim)
        .filter(|clause| !clause.is_empty())
        .map(parse_clause)
        .collect()
}

impl AffinityTrait {
    fn node_affinity(&self) -> TraitResult<Option<NodeAffinity>> {
        if self.config.node_affinity_labels.is_empty() {
            return Ok(None);
        }
        let match_expressions = parse_selector(&self.config.node_affinity_labels)?
            .iter()
            .map(Requirement::node_selector_requirement)
            .collect();

        Ok(Some(NodeAffinity {
            required_during_scheduling_ignored_during_execution: Some(NodeSelector {
                node_selector_terms: vec![NodeSelectorTerm {
                    match_expressions: Some(match_expressions),
                    ..Default::default()
                }],
            }),
            ..Default::default()
        }))
    }

    /// Affinity term for `labels`, plus the Integration itself when `same_integration`
    fn pod_affinity_term(
        &self,
        env: &Environment,
        labels: &[String],
        same_integration: bool,
    ) -> TraitResult<Option<PodAffinityTerm>> {
        if !same_integration && labels.is_empty() {
            return Ok(None);
        }
        let mut match_expressions = parse_selector(labels)?
            .iter()
            .map(Requirement::label_selector_requirement)
            .collect::<TraitResult<Vec<_>>>()?;
        if same_integration {
            match_expressions.push(LabelSelectorRequirement {
                key: INTEGRATION_LABEL.to_string(),
                operator: "In".to_string(),
                values: Some(vec![env.integration_name()]),
            });
        }

        Ok(Some(PodAffinityTerm {
            label_selector: Some(LabelSelector {
                match_expressions: Some(match_expressions),
                ..Default::default()
            }),
            topology_key: TOPOLOGY_KEY_HOSTNAME.to_string(),
            ..Default::default()
        }))
    }
}

impl Trait for AffinityTrait {
    trait_base!();

    fn configure(&mut self, env: &Environment) -> TraitResult<Configured> {
        if !self.config.enabled.unwrap_or(false) {
            return Ok((false, None));
        }
        if self.config.pod_affinity.unwrap_or(false) && self.config.pod_anti_affinity.unwrap_or(false)
        {
            return Err(TraitError::InvalidConfiguration(
                "both pod affinity and pod anti-affinity can't be set simultaneously".to_string(),
            ));
        }
        Ok((
            env.integration_in_phase(&[IntegrationPhase::Deploying, IntegrationPhase::Running]),
            None,
        ))
    }

    fn apply(&mut self, env: &mut Environment) -> TraitResult<()> {
        let node_affinity = self.node_affinity()?;
        let pod_affinity = self.pod_affinity_term(
            env,
            &self.config.pod_affinity_labels,
            self.config.pod_affinity.unwrap_or(false),
        )?;
        let pod_anti_affinity = self.pod_affinity_term(
            env,
            &self.config.pod_anti_affinity_labels,
            self.config.pod_anti_affinity.unwrap_or(false),
        )?;

        let Some(pod_spec) = env.integration_pod_spec_mut() else {
            tracing::debug!("No workload to constrain for integration");
            return Ok(());
        };
        let affinity = pod_spec.affinity.get_or_insert_with(Affinity::default);
        if node_affinity.is_some() {
            affinity.node_affinity = node_affinity;
        }
        if let Some(term) = pod_affinity {
            affinity.pod_affinity = Some(PodAffinity {
                required_during_scheduling_ignored_during_execution: Some(vec![term]),
                ..Default::default()
            });
        }
        if let Some(term) = pod_anti_affinity {
            affinity.pod_anti_affinity = Some(PodAntiAffinity {
                required_during_scheduling_ignored_during_execution: Some(vec![term]),
                ..Default::default()
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::traits::builtin::testing;
    use k8s_openapi::api::apps::v1::{Deployment, DeploymentSpec};
    use k8s_openapi::api::core::v1::{PodSpec, PodTemplateSpec};

    fn affinity_trait(config: AffinityConfig) -> AffinityTrait {
        AffinityTrait {
            base: BaseTrait::new(ID, ORDER_AFFINITY),
            config: AffinityConfig {
                enabled: Some(true),
                ..config
            },
        }
    }

    fn environment() -> Environment {
        let mut env = testing::environment(testing::integration("hello", IntegrationPhase::Deploying));
        env.resources.add(Deployment {
            metadata: crate::resources::object_meta("hello", Some(testing::NAMESPACE)),
            spec: Some(DeploymentSpec {
                template: PodTemplateSpec {
                    spec: Some(PodSpec::default()),
                    ..Default::default()
                },
                ..Default::default()
            }),
            ..Default::default()
        });
        env
    }

    fn affinity(env: &Environment) -> Affinity {
        let deployment = env.resources.find::<Deployment>(|_| true).unwrap();
        deployment
            .spec
            .as_ref()
            .unwrap()
            .template
            .spec
            .as_ref()
            .unwrap()
            .affinity
            .clone()
            .unwrap()
    }

    #[test]
    fn test_parse_selector() {
        let requirements = parse_selector(&[
            "kubernetes.io/hostname in (node2, node1)".to_string(),
            "env!=dev,!canary".to_string(),
            "cpu>4".to_string(),
            "zone".to_string(),
        ])
        .unwrap();

        assert_eq!(requirements.len(), 5);
        assert_eq!(requirements[0].operator, SelectorOperator::In);
        assert_eq!(requirements[0].values, vec!["node1", "node2"]);
        assert_eq!(requirements[1].operator, SelectorOperator::NotIn);
        assert_eq!(requirements[1].key, "env");
        assert_eq!(requirements[2].operator, SelectorOperator::DoesNotExist);
        assert_eq!(requirements[3].operator, SelectorOperator::GreaterThan);
        assert_eq!(requirements[4].operator, SelectorOperator::Exists);
    }

    #[test]
    fn test_invalid_selector() {
        assert!(parse_selector(&["cpu>many".to_string()]).is_err());
        assert!(parse_selector(&["key in a,b".to_string()]).is_err());
    }

    #[test]
    fn test_pod_affinity_and_anti_affinity_conflict() {
        let env = environment();
        let err = affinity_trait(AffinityConfig {
            pod_affinity: Some(true),
            pod_anti_affinity: Some(true),
            ..Default::default()
        })
        .configure(&env)
        .unwrap_err();
        assert_eq!(
            err.to_string(),
            "both pod affinity and pod anti-affinity can't be set simultaneously"
        );
    }

    #[test]
    fn test_disabled_by_default() {
        let env = environment();
        assert!(!new_trait().configure(&env).unwrap().0);
    }

    #[test]
    fn test_node_affinity() {
        let mut env = environment();
        let mut t = affinity_trait(AffinityConfig {
            node_affinity_labels: vec!["kubernetes.io/hostname in(node1)".to_string()],
            ..Default::default()
        });
        assert!(t.configure(&env).unwrap().0);
        t.apply(&mut env).unwrap();

        let node_affinity = affinity(&env).node_affinity.unwrap();
        let terms = node_affinity
            .required_during_scheduling_ignored_during_execution
            .unwrap()
            .node_selector_terms;
        let requirement = &terms[0].match_expressions.as_ref().unwrap()[0];
        assert_eq!(requirement.key, "kubernetes.io/hostname");
        assert_eq!(requirement.operator, "In");
        assert_eq!(requirement.values, Some(vec!["node1".to_string()]));
    }

    #[test]
    fn test_pod_anti_affinity_targets_integration() {
        let mut env = environment();
        let mut t = affinity_trait(AffinityConfig {
            pod_anti_affinity: Some(true),
            pod_anti_affinity_labels: vec!["role=db".to_string()],
            ..Default::default()
        });
        t.apply(&mut env).unwrap();

        let affinity = affinity(&env);
        assert!(affinity.pod_affinity.is_none());
        let term = &affinity
            .pod_anti_affinity
            .unwrap()
            .required_during_scheduling_ignored_during_execution
            .unwrap()[0];
        assert_eq!(term.topology_key, "kubernetes.io/hostname");
        let expressions = term
            .label_selector
            .as_ref()
            .unwrap()
            .match_expressions
            .clone()
            .unwrap();
        assert_eq!(expressions.len(), 2);
        assert_eq!(expressions[1].key, INTEGRATION_LABEL);
        assert_eq!(expressions[1].values, Some(vec!["hello".to_string()]));
    }

    #[test]
    fn test_greater_than_rejected_for_pods() {
        let mut env = environment();
        let err = affinity_trait(AffinityConfig {
            pod_affinity_labels: vec!["cpu>4".to_string()],
            ..Default::default()
        })
        .apply(&mut env)
        .unwrap_err();
        assert_eq!(err.to_string(), "unsupported label selector operator: gt");
    }
}
