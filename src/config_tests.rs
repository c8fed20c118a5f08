#![cfg(test)]

use super::config::*;

#[test]
fn test_default_config() {
    let config = Config::default();
    assert_eq!(config.mqtt.port, 1883);
    assert_eq!(config.regulation.min_current, 6);
    assert_eq!(config.regulation.max_current, 16);
    assert_eq!(config.regulation.window_capacity, 10);
    assert_eq!(config.home_assistant.mode_labels.off, "Aus");
    assert!(config.validate().is_ok());
}

#[test]
fn test_config_validation() {
    let mut config = Config::default();
    config.mqtt.host = String::new();
    assert!(config.validate().is_err());

    config = Config::default();
    config.mqtt.port = 0;
    assert!(config.validate().is_err());

    config = Config::default();
    config.topics.pv_input = config.topics.grid_export.clone();
    assert!(config.validate().is_err());

    config = Config::default();
    config.home_assistant.mode_labels.min_charge = "Max Charge".to_string();
    assert!(config.validate().is_err());

    config = Config::default();
    config.regulation.min_current = 16;
    assert!(config.validate().is_err());

    config = Config::default();
    config.regulation.confirm_poll_interval_secs = 120;
    assert!(config.validate().is_err());
}

#[test]
fn test_config_serialization() {
    let config = Config::default();
    let yaml = serde_yaml::to_string(&config).unwrap();
    let deserialized: Config = serde_yaml::from_str(&yaml).unwrap();
    assert_eq!(config.topics.set_current, deserialized.topics.set_current);
    assert_eq!(
        config.regulation.battery_full_soc,
        deserialized.regulation.battery_full_soc
    );
}

#[test]
fn test_partial_yaml_uses_defaults() {
    let yaml = "mqtt:\n  host: broker.lan\nregulation:\n  max_current: 32\n";
    let config: Config = serde_yaml::from_str(yaml).unwrap();
    assert_eq!(config.mqtt.host, "broker.lan");
    assert_eq!(config.mqtt.port, 1883);
    assert_eq!(config.regulation.max_current, 32);
    assert_eq!(config.regulation.min_current, 6);
}
