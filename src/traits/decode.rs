//! Trait configuration decoding
//!
//! Trait options come from four places, merged per trait id with later sources
//! overriding earlier keys: the IntegrationPlatform, the IntegrationKit, the Integration
//! `spec.traits` map and finally the Integration annotations
//! (`trait.camel.apache.org/<trait-id>.<property>`).
//!
//! Property names are accepted in kebab-case and normalised to the camelCase field
//! names. Values are weakly typed: annotations only carry strings, so booleans,
//! integers and lists also decode from their string forms (see [`lenient`]).

use super::{TraitError, TraitResult};
use crate::apis::{Integration, IntegrationKit, IntegrationPlatform, TraitsSpec};
use serde::de::DeserializeOwned;
use serde_json::{Map, Value};
use std::collections::BTreeMap;

/// Annotation prefix carrying trait properties
pub const TRAIT_ANNOTATION_PREFIX: &str = "trait.camel.apache.org/";

const ADDONS_KEY: &str = "addons";
const LEGACY_CONFIGURATION_KEY: &str = "configuration";

/// Merged trait options: trait id to property map
pub type TraitOptions = BTreeMap<String, Map<String, Value>>;

/// Collect the options of every configuration source
pub fn collect_options(
    platform: Option<&IntegrationPlatform>,
    kit: Option<&IntegrationKit>,
    integration: Option<&Integration>,
) -> TraitResult<TraitOptions> {
    let mut options = TraitOptions::new();

    if let Some(platform) = platform {
        merge_traits_spec(&mut options, &platform.spec.traits)?;
    }
    if let Some(kit) = kit {
        merge_traits_spec(&mut options, &kit.spec.traits)?;
    }
    if let Some(integration) = integration {
        merge_traits_spec(&mut options, &integration.spec.traits)?;
        if let Some(annotations) = &integration.metadata.annotations {
            merge_annotations(&mut options, annotations)?;
        }
    }

    Ok(options)
}

/// Merge a `traits` map, addons last
pub fn merge_traits_spec(options: &mut TraitOptions, traits: &TraitsSpec) -> TraitResult<()> {
    for (id, value) in traits.iter().filter(|(id, _)| id.as_str() != ADDONS_KEY) {
        merge_trait(options, id, value)?;
    }

    match traits.get(ADDONS_KEY) {
        None | Some(Value::Null) => {}
        Some(Value::Object(addons)) => {
            for (id, value) in addons {
                merge_trait(options, id, value)?;
            }
        }
        Some(_) => {
            return Err(TraitError::InvalidConfiguration(
                "addons configuration must be a map".to_string(),
            ));
        }
    }

    Ok(())
}

fn merge_trait(options: &mut TraitOptions, id: &str, value: &Value) -> TraitResult<()> {
    let properties = match value {
        Value::Null => return Ok(()),
        Value::Object(map) => migrate_legacy_configuration(map.clone()),
        _ => {
            return Err(TraitError::InvalidConfiguration(format!(
                "configuration of trait {} must be a map",
                id
            )));
        }
    };

    let entry = options.entry(id.to_string()).or_default();
    for (key, value) in properties {
        entry.insert(normalize_key(&key), value);
    }
    Ok(())
}

/// Merge `trait.camel.apache.org/<id>.<property>` annotations
pub fn merge_annotations(
    options: &mut TraitOptions,
    annotations: &BTreeMap<String, String>,
) -> TraitResult<()> {
    for (key, value) in annotations {
        let Some(property) = key.strip_prefix(TRAIT_ANNOTATION_PREFIX) else {
            continue;
        };
        let Some((id, name)) = property.split_once('.') else {
            return Err(TraitError::InvalidConfiguration(format!(
                "wrong format for trait annotation {:?}: missing trait ID",
                property
            )));
        };
        options
            .entry(id.to_string())
            .or_default()
            .insert(normalize_key(name), Value::String(value.clone()));
    }
    Ok(())
}

/// Lift the keys of a legacy `configuration` sub-map into the trait map itself.
/// Keys already present at the top level win.
pub fn migrate_legacy_configuration(mut properties: Map<String, Value>) -> Map<String, Value> {
    if let Some(Value::Object(legacy)) = properties.remove(LEGACY_CONFIGURATION_KEY) {
        for (key, value) in legacy {
            properties.entry(key).or_insert(value);
        }
    }
    properties
}

/// `request-cpu` -> `requestCpu`
pub fn normalize_key(key: &str) -> String {
    let mut out = String::with_capacity(key.len());
    let mut upper = false;
    for c in key.chars() {
        if c == '-' {
            upper = true;
        } else if upper {
            out.extend(c.to_uppercase());
            upper = false;
        } else {
            out.push(c);
        }
    }
    out
}

/// Decode a property map into a trait configuration struct
pub fn decode_options<T: DeserializeOwned>(id: &str, options: Value) -> TraitResult<T> {
    serde_json::from_value(options).map_err(|source| TraitError::Decode {
        id: id.to_string(),
        source,
    })
}

/// Weakly typed field deserializers, for use with `#[serde(deserialize_with = ...)]`
pub mod lenient {
    use serde::de::{Deserializer, Error};
    use serde::Deserialize;
    use serde_json::Value;

    fn scalar_to_string(value: Value) -> Option<String> {
        match value {
            Value::String(s) => Some(s),
            Value::Bool(b) => Some(b.to_string()),
            Value::Number(n) => Some(n.to_string()),
            _ => None,
        }
    }

    pub fn opt_bool<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<bool>, D::Error> {
        match Option::<Value>::deserialize(deserializer)? {
            None | Some(Value::Null) => Ok(None),
            Some(Value::Bool(b)) => Ok(Some(b)),
            Some(Value::String(s)) => match s.trim().to_ascii_lowercase().as_str() {
                "true" => Ok(Some(true)),
                "false" => Ok(Some(false)),
                _ => Err(D::Error::custom(format!("expected a boolean, got {:?}", s))),
            },
            Some(other) => Err(D::Error::custom(format!("expected a boolean, got {}", other))),
        }
    }

    pub fn opt_i64<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<i64>, D::Error> {
        match Option::<Value>::deserialize(deserializer)? {
            None | Some(Value::Null) => Ok(None),
            Some(Value::Number(n)) => n
                .as_i64()
                .map(Some)
                .ok_or_else(|| D::Error::custom(format!("expected an integer, got {}", n))),
            Some(Value::String(s)) => s
                .trim()
                .parse()
                .map(Some)
                .map_err(|_| D::Error::custom(format!("expected an integer, got {:?}", s))),
            Some(other) => Err(D::Error::custom(format!("expected an integer, got {}", other))),
        }
    }

    pub fn opt_i32<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<i32>, D::Error> {
        match opt_i64(deserializer)? {
            None => Ok(None),
            Some(n) => i32::try_from(n)
                .map(Some)
                .map_err(|_| D::Error::custom(format!("integer {} out of range", n))),
        }
    }

    pub fn opt_string<'de, D: Deserializer<'de>>(
        deserializer: D,
    ) -> Result<Option<String>, D::Error> {
        match Option::<Value>::deserialize(deserializer)? {
            None | Some(Value::Null) => Ok(None),
            Some(value) => scalar_to_string(value.clone())
                .map(Some)
                .ok_or_else(|| D::Error::custom(format!("expected a string, got {}", value))),
        }
    }

    /// A list, a JSON array encoded as a string, or a single scalar
    pub fn string_list<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<String>, D::Error> {
        let items = match Option::<Value>::deserialize(deserializer)? {
            None | Some(Value::Null) => return Ok(Vec::new()),
            Some(Value::Array(items)) => items,
            Some(Value::String(s)) if s.trim_start().starts_with('[') => {
                serde_json::from_str::<Vec<Value>>(&s).map_err(D::Error::custom)?
            }
            Some(scalar) => vec![scalar],
        };
        items
            .into_iter()
            .map(|item| {
                let shown = item.to_string();
                scalar_to_string(item)
                    .ok_or_else(|| D::Error::custom(format!("expected a string, got {}", shown)))
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;
    use serde_json::json;

    #[derive(Debug, Default, Deserialize)]
    #[serde(rename_all = "camelCase", default)]
    struct Sample {
        #[serde(deserialize_with = "lenient::opt_bool")]
        enabled: Option<bool>,
        #[serde(deserialize_with = "lenient::opt_i32")]
        port: Option<i32>,
        #[serde(deserialize_with = "lenient::string_list")]
        taints: Vec<String>,
        #[serde(deserialize_with = "lenient::opt_string")]
        max_unavailable: Option<String>,
    }

    #[test]
    fn test_normalize_key() {
        assert_eq!(normalize_key("request-cpu"), "requestCpu");
        assert_eq!(normalize_key("pod-anti-affinity"), "podAntiAffinity");
        assert_eq!(normalize_key("enabled"), "enabled");
    }

    #[test]
    fn test_lenient_decoding_from_strings() {
        let sample: Sample = decode_options(
            "sample",
            json!({"enabled": "true", "port": "8081", "taints": "[\"a:NoSchedule\",\"b:NoExecute\"]", "maxUnavailable": 2}),
        )
        .unwrap();
        assert_eq!(sample.enabled, Some(true));
        assert_eq!(sample.port, Some(8081));
        assert_eq!(sample.taints, vec!["a:NoSchedule", "b:NoExecute"]);
        assert_eq!(sample.max_unavailable.as_deref(), Some("2"));
    }

    #[test]
    fn test_single_string_becomes_list() {
        let sample: Sample = decode_options("sample", json!({"taints": "a:NoSchedule"})).unwrap();
        assert_eq!(sample.taints, vec!["a:NoSchedule"]);
    }

    #[test]
    fn test_invalid_bool_is_decode_error() {
        let err = decode_options::<Sample>("sample", json!({"enabled": "maybe"})).unwrap_err();
        assert!(matches!(err, TraitError::Decode { .. }));
    }

    #[test]
    fn test_legacy_configuration_is_lifted() {
        let mut traits = TraitsSpec::new();
        traits.insert(
            "container".to_string(),
            json!({"configuration": {"request-cpu": "1", "name": "legacy"}, "name": "main"}),
        );
        let mut options = TraitOptions::new();
        merge_traits_spec(&mut options, &traits).unwrap();

        let container = &options["container"];
        assert_eq!(container["requestCpu"], json!("1"));
        assert_eq!(container["name"], json!("main"));
        assert!(!container.contains_key("configuration"));
    }

    #[test]
    fn test_addons_merged() {
        let mut traits = TraitsSpec::new();
        traits.insert("addons".to_string(), json!({"keda": {"enabled": true}}));
        let mut options = TraitOptions::new();
        merge_traits_spec(&mut options, &traits).unwrap();
        assert_eq!(options["keda"]["enabled"], json!(true));
    }

    #[test]
    fn test_annotations_override_spec() {
        let mut options = TraitOptions::new();
        let mut traits = TraitsSpec::new();
        traits.insert("container".to_string(), json!({"name": "spec"}));
        merge_traits_spec(&mut options, &traits).unwrap();

        let annotations = BTreeMap::from([(
            "trait.camel.apache.org/container.name".to_string(),
            "annotation".to_string(),
        )]);
        merge_annotations(&mut options, &annotations).unwrap();
        assert_eq!(options["container"]["name"], json!("annotation"));
    }

    #[test]
    fn test_annotation_without_trait_id() {
        let annotations = BTreeMap::from([(
            "trait.camel.apache.org/enabled".to_string(),
            "true".to_string(),
        )]);
        let err = merge_annotations(&mut TraitOptions::new(), &annotations).unwrap_err();
        assert_eq!(
            err.to_string(),
            "wrong format for trait annotation \"enabled\": missing trait ID"
        );
    }
}
