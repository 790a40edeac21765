use camelk_traits::apis::TraitProfile;
use camelk_traits::config::{self, ConfigLoader, OperatorConfig};
use std::fs;
use tempfile::TempDir;

#[test]
fn test_partial_file_keeps_defaults() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("config.yaml");
    fs::write(&path, "operatorId: my-operator\ndefaultProfile: Knative\n").unwrap();

    let config = ConfigLoader::load(Some(&path)).unwrap();
    assert_eq!(config.operator_id, "my-operator");
    assert_eq!(config.default_profile, Some(TraitProfile::Knative));
    assert_eq!(config.post_action_queue, 64);
    assert_eq!(config.agent_download_image, OperatorConfig::default().agent_download_image);
}

#[test]
fn test_save_then_load() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("nested").join("config.yaml");

    let mut config = ConfigLoader::load_defaults();
    config::set_config_value(&mut config, "defaultRuntimeVersion", "3.8.1").unwrap();
    config::set_config_value(&mut config, "postActionQueue", "8").unwrap();
    ConfigLoader::save(&config, &path).unwrap();

    let loaded = ConfigLoader::load_file(&path).unwrap();
    assert_eq!(loaded, config);
    assert_eq!(
        config::get_config_value(&loaded, "defaultRuntimeVersion").unwrap(),
        "3.8.1"
    );
}

#[test]
fn test_missing_explicit_file_is_an_error() {
    let dir = TempDir::new().unwrap();
    let err = ConfigLoader::load(Some(&dir.path().join("absent.yaml"))).unwrap_err();
    assert!(err.to_string().contains("Config file not found"));
}

#[test]
fn test_invalid_yaml_is_reported() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("config.yaml");
    fs::write(&path, "postActionQueue: [not, a, number]\n").unwrap();

    let err = ConfigLoader::load_file(&path).unwrap_err();
    assert!(err.to_string().contains("Failed to parse config file"));
}

#[test]
fn test_validate_rejects_empty_queue() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("config.yaml");

    fs::write(&path, "postActionQueue: 0\n").unwrap();
    assert!(ConfigLoader::validate(Some(&path)).is_err());

    fs::write(&path, "postActionQueue: 4\n").unwrap();
    assert!(ConfigLoader::validate(Some(&path)).is_ok());
}

#[test]
fn test_set_and_reset_values() {
    let mut config = OperatorConfig::default();

    config::set_config_value(&mut config, "defaultProfile", "openshift").unwrap();
    assert_eq!(config.default_profile, Some(TraitProfile::OpenShift));
    config::set_config_value(&mut config, "defaultProfile", "").unwrap();
    assert_eq!(config.default_profile, None);

    assert!(config::set_config_value(&mut config, "defaultProfile", "mesos").is_err());
    assert!(config::set_config_value(&mut config, "operatorId", " ").is_err());
    assert!(config::set_config_value(&mut config, "postActionQueue", "0").is_err());
    assert!(config::set_config_value(&mut config, "colour", "blue").is_err());
    assert!(config::get_config_value(&config, "colour").is_err());

    for key in config::CONFIG_KEYS {
        assert!(config::get_config_value(&config, key).is_ok());
    }
}
