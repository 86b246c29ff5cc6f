use soapbusconfig::{Config, EndpointRole, LateResponseStrategy};
use std::fs;
use std::time::Duration;
use tempfile::TempDir;

const CONFIG_YAML: &str = r#"
host:
  http_port: 9090
http:
  streaming_enabled: true
  consumer_suspend_time_ms: 1500
  late_response_strategy: warning
endpoints:
  - name: greeter
    wsdl: wsdl/hello_world.wsdl
    service: "{http://apache.org/hello_world_soap_http}SOAPService"
    policies: [addressing]
  - name: remote
    role: provider
    wsdl: /opt/remote.wsdl
    location_uri: http://127.0.0.1:9000/remote
"#;

#[test]
fn test_load_config_from_directory() {
    let temp_dir = TempDir::new().unwrap();
    fs::write(temp_dir.path().join("config.yaml"), CONFIG_YAML).unwrap();

    let config = Config::load_config(temp_dir.path().to_str().unwrap()).unwrap();

    assert_eq!(config.get_http_port(), 9090);
    let http = config.http_settings().unwrap();
    assert!(http.streaming_enabled);
    assert_eq!(http.retry_count, 3);
    assert_eq!(http.consumer_suspend_time, Duration::from_millis(1500));
    assert_eq!(http.late_response_strategy, LateResponseStrategy::Warning);

    let endpoints = config.get_endpoints().unwrap();
    assert_eq!(endpoints.len(), 2);
    assert_eq!(endpoints[0].name, "greeter");
    assert_eq!(endpoints[0].role, EndpointRole::Consumer);
    assert_eq!(endpoints[1].role, EndpointRole::Provider);
    assert_eq!(
        config.resolve_path(&endpoints[0].wsdl),
        temp_dir.path().join("wsdl/hello_world.wsdl")
    );
}

#[test]
fn test_missing_config_file_uses_defaults() {
    let temp_dir = TempDir::new().unwrap();
    let dir = temp_dir.path().join("fresh");

    let config = Config::load_config(dir.to_str().unwrap()).unwrap();

    assert!(dir.is_dir());
    assert_eq!(config.get_http_port(), 8192);
    assert!(config.get_endpoints().unwrap().is_empty());
}

#[test]
fn test_set_value_is_saved() {
    let temp_dir = TempDir::new().unwrap();
    let dir = temp_dir.path().to_str().unwrap();

    let config = Config::load_config(dir).unwrap();
    config.set_retry_count(5).unwrap();

    let reloaded = Config::load_config(dir).unwrap();
    assert_eq!(reloaded.get_retry_count().unwrap(), 5);
}

#[test]
fn test_host_section_keys() {
    let yaml = r#"
host:
  http_port: 8443
  bind: 127.0.0.1
  logger:
    min_level: DEBUG
"#;
    let config = Config::from_yaml(yaml, "/tmp").unwrap();

    assert_eq!(config.get_http_port(), 8443);
    assert_eq!(config.get_http_bind(), "127.0.0.1");
    assert_eq!(config.get_log_min_level().unwrap(), "DEBUG");
}
