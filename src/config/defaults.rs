//! Default configuration values

use super::schema::OperatorConfig;

pub(crate) fn operator_id() -> String {
    "camel-k".to_string()
}

pub(crate) fn post_action_queue() -> usize {
    64
}

pub(crate) fn agent_download_image() -> String {
    "curlimages/curl:8.10.1".to_string()
}

/// Get the default configuration
pub fn default_config() -> OperatorConfig {
    OperatorConfig::default()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = default_config();
        assert_eq!(config.operator_id, "camel-k");
        assert!(config.default_runtime_version.is_none());
    }
}
