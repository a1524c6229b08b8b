// Config loading and validation tests

use std::time::Duration;

use workers_scale::config::{AppConfig, SinkBackend};
use workers_scale::scenario::Scenario;

const VALID_CONFIG: &str = r#"
[run]
uuid = "abc-123"
job_name = "workers-scale"
scenario = "direct"

[scale]
additional_worker_nodes = 6
gc = false
autoscaler_buffer = 4
settle_delay_secs = 60

[wait]
poll_interval_secs = 10
timeout_secs = 3600

[collector]
poll_interval_secs = 5

[cluster]
binary = "kubectl"
kubeconfig = "/tmp/kubeconfig"

[metrics]
backend = "sqlite"
path = "data/metrics.db"

[metadata]
platform = "AWS"
workerNodesCount = 12
"#;

#[test]
fn test_config_loads_from_str() {
    let config = AppConfig::load_from_str(VALID_CONFIG).expect("load_from_str");
    assert_eq!(config.run.uuid.as_deref(), Some("abc-123"));
    assert_eq!(config.run.scenario, Scenario::Direct);
    assert_eq!(config.scale.additional_worker_nodes, 6);
    assert!(!config.scale.gc);
    assert_eq!(config.scale.scale_event_epoch, None);
    assert_eq!(config.cluster.binary, "kubectl");
    assert_eq!(config.cluster.machine_namespace, "openshift-machine-api");
    assert_eq!(config.metrics.backend, SinkBackend::Sqlite);
    assert_eq!(config.metadata["platform"], "AWS");
    assert_eq!(config.metadata["workerNodesCount"], 12);
}

#[test]
fn test_empty_config_uses_defaults() {
    let config = AppConfig::load_from_str("").expect("defaults");
    assert_eq!(config.run.job_name, "workers-scale");
    assert_eq!(config.run.scenario, Scenario::Autoscaler);
    assert!(config.scale.gc);
    assert_eq!(config.scale.autoscaler_buffer, 10);
    assert_eq!(config.scale.settle_delay_secs, 300);
    assert_eq!(config.wait.timeout_secs, 4 * 60 * 60);
    assert_eq!(config.cluster.binary, "oc");
    assert_eq!(config.metrics.backend, SinkBackend::Local);
    assert!(config.metadata.is_empty());
}

#[test]
fn test_config_builds_runtime_settings() {
    let config = AppConfig::load_from_str(VALID_CONFIG).unwrap();
    let settings = config.scenario_settings();
    assert_eq!(settings.scenario, Scenario::Direct);
    assert_eq!(settings.autoscaler_buffer, 4);
    assert_eq!(settings.settle_delay, Duration::from_secs(60));
    assert_eq!(settings.wait.poll_interval, Duration::from_secs(10));
    assert_eq!(settings.wait.timeout, Duration::from_secs(3600));
    assert_eq!(settings.collector_interval, Duration::from_secs(5));

    let kubectl = config.kubectl_options();
    assert_eq!(kubectl.kubeconfig.as_deref(), Some("/tmp/kubeconfig"));
    assert_eq!(kubectl.workload_namespace, "default");
}

#[test]
fn test_config_validation_rejects_empty_job_name() {
    let bad = VALID_CONFIG.replace("job_name = \"workers-scale\"", "job_name = \"\"");
    let err = AppConfig::load_from_str(&bad).unwrap_err();
    assert!(err.to_string().contains("run.job_name"));
}

#[test]
fn test_config_validation_rejects_negative_worker_nodes() {
    let bad = VALID_CONFIG.replace("additional_worker_nodes = 6", "additional_worker_nodes = -1");
    let err = AppConfig::load_from_str(&bad).unwrap_err();
    assert!(err.to_string().contains("additional_worker_nodes"));
}

#[test]
fn test_config_validation_rejects_wait_poll_interval_zero() {
    let bad = VALID_CONFIG.replacen("poll_interval_secs = 10", "poll_interval_secs = 0", 1);
    let err = AppConfig::load_from_str(&bad).unwrap_err();
    assert!(err.to_string().contains("wait.poll_interval_secs"));
}

#[test]
fn test_config_validation_rejects_timeout_zero() {
    let bad = VALID_CONFIG.replace("timeout_secs = 3600", "timeout_secs = 0");
    let err = AppConfig::load_from_str(&bad).unwrap_err();
    assert!(err.to_string().contains("wait.timeout_secs"));
}

#[test]
fn test_config_validation_rejects_collector_interval_zero() {
    let bad = VALID_CONFIG.replace("poll_interval_secs = 5", "poll_interval_secs = 0");
    let err = AppConfig::load_from_str(&bad).unwrap_err();
    assert!(err.to_string().contains("collector.poll_interval_secs"));
}

#[test]
fn test_config_validation_rejects_empty_metrics_path() {
    let bad = VALID_CONFIG.replace("path = \"data/metrics.db\"", "path = \"\"");
    let err = AppConfig::load_from_str(&bad).unwrap_err();
    assert!(err.to_string().contains("metrics.path"));
}

#[test]
fn test_config_validation_rejects_non_positive_epoch() {
    let bad = VALID_CONFIG.replace("gc = false", "gc = false\nscale_event_epoch = 0");
    let err = AppConfig::load_from_str(&bad).unwrap_err();
    assert!(err.to_string().contains("scale_event_epoch"));
}

#[test]
fn test_config_rejects_unknown_scenario() {
    let bad = VALID_CONFIG.replace("scenario = \"direct\"", "scenario = \"manual\"");
    assert!(AppConfig::load_from_str(&bad).is_err());
}
