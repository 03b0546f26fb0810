//! Unit tests for configuration loading and validation.

use rstest::*;
use stackfleet::test_support::EnvGuard;
use stackfleet::{
    BatchConfig, CloudConfig, CloudProfile, ConfigError, ProfileStore, Settings, TelemetryConfig,
};

#[fixture]
fn valid_cloud() -> CloudConfig {
    CloudConfig {
        auth_url: String::from("https://keystone.example:5000/v3"),
        project_name: String::from("ops"),
        username: String::from("deployer"),
        password: String::from("hunter2"),
        user_domain_name: String::from("default"),
        project_domain_name: String::from("default"),
        region_name: None,
        interface: String::from("public"),
        cloud: None,
    }
}

#[rstest]
fn cloud_validation_accepts_complete_config(valid_cloud: CloudConfig) {
    assert!(valid_cloud.validate().is_ok());
}

#[rstest]
fn cloud_validation_rejects_missing_password_with_actionable_error(valid_cloud: CloudConfig) {
    let cfg = CloudConfig {
        password: String::from("  "),
        ..valid_cloud
    };

    let error = cfg.validate().expect_err("password is required");
    let ConfigError::MissingField(ref message) = error else {
        panic!("expected MissingField error, got {error:?}");
    };
    assert!(
        message.contains("OS_PASSWORD"),
        "error should mention env var: {message}"
    );
    assert!(
        message.contains("stackfleet.toml"),
        "error should mention config file: {message}"
    );
}

/// Every required credential names the environment variable and file key
/// that would fix it.
#[rstest]
#[case::auth_url(|cfg: &mut CloudConfig| cfg.auth_url.clear(), "OS_AUTH_URL", "auth_url")]
#[case::project(|cfg: &mut CloudConfig| cfg.project_name.clear(), "OS_PROJECT_NAME", "project_name")]
#[case::username(|cfg: &mut CloudConfig| cfg.username.clear(), "OS_USERNAME", "username")]
#[case::user_domain(
    |cfg: &mut CloudConfig| cfg.user_domain_name.clear(),
    "OS_USER_DOMAIN_NAME",
    "user_domain_name"
)]
#[case::project_domain(
    |cfg: &mut CloudConfig| cfg.project_domain_name.clear(),
    "OS_PROJECT_DOMAIN_NAME",
    "project_domain_name"
)]
fn cloud_validation_errors_are_actionable(
    valid_cloud: CloudConfig,
    #[case] mutate: fn(&mut CloudConfig),
    #[case] env_var: &str,
    #[case] toml_key: &str,
) {
    let mut cfg = valid_cloud;
    mutate(&mut cfg);

    let message = cfg.validate().expect_err("validation should fail").to_string();

    assert!(message.contains(env_var), "missing {env_var}: {message}");
    assert!(message.contains(toml_key), "missing {toml_key}: {message}");
    assert!(message.contains("stackfleet.toml"), "missing file: {message}");
}

#[rstest]
fn cloud_validation_rejects_unknown_interface(valid_cloud: CloudConfig) {
    let cfg = CloudConfig {
        interface: String::from("private"),
        ..valid_cloud
    };

    let err = cfg.validate().expect_err("interface must be known");

    assert!(matches!(err, ConfigError::Invalid(_)));
    assert!(err.to_string().contains("OS_INTERFACE"), "{err}");
}

#[rstest]
fn profile_overrides_only_present_fields(valid_cloud: CloudConfig) {
    let profile = CloudProfile {
        auth_url: Some(String::from("https://keystone.lab:5000/v3")),
        region_name: Some(String::from("RegionTwo")),
        ..CloudProfile::default()
    };

    let merged = valid_cloud.clone().with_profile(profile);

    assert_eq!(merged.auth_url, "https://keystone.lab:5000/v3");
    assert_eq!(merged.region_name.as_deref(), Some("RegionTwo"));
    assert_eq!(merged.username, valid_cloud.username);
    assert_eq!(merged.password, valid_cloud.password);
}

#[rstest]
#[case::workers(BatchConfig { max_workers: 0, ..BatchConfig::defaults() }, "STACKFLEET_BATCH_MAX_WORKERS")]
#[case::window(BatchConfig { window_size: 0, ..BatchConfig::defaults() }, "STACKFLEET_BATCH_WINDOW_SIZE")]
#[case::poll(
    BatchConfig { poll_interval_secs: 0, ..BatchConfig::defaults() },
    "STACKFLEET_BATCH_POLL_INTERVAL_SECS"
)]
fn batch_validation_rejects_zero_values(#[case] config: BatchConfig, #[case] env_var: &str) {
    let err = config.validate().expect_err("zero must be rejected");

    assert!(matches!(err, ConfigError::Invalid(_)));
    assert!(err.to_string().contains(env_var), "{err}");
}

#[test]
fn batch_defaults_validate() {
    let config = BatchConfig::defaults();

    assert!(config.validate().is_ok());
    assert_eq!(config.max_workers, 5);
    assert_eq!(config.window_size, 2);
    assert_eq!(config.window_delay().as_secs(), 30);
    assert_eq!(config.resize_timeout().as_secs(), 300);
}

#[rstest]
fn settings_validation_checks_every_section(valid_cloud: CloudConfig) {
    let settings = Settings {
        cloud: valid_cloud,
        batch: BatchConfig {
            max_workers: 0,
            ..BatchConfig::defaults()
        },
        telemetry: TelemetryConfig::defaults(),
    };

    assert!(matches!(settings.validate(), Err(ConfigError::Invalid(_))));
}

#[rstest]
#[case(None, None)]
#[case(Some("   "), None)]
#[case(Some(" license-123 "), Some("license-123"))]
fn blank_license_keys_disable_telemetry(#[case] key: Option<&str>, #[case] expected: Option<&str>) {
    let telemetry = TelemetryConfig {
        license_key: key.map(ToOwned::to_owned),
        ..TelemetryConfig::defaults()
    };

    assert_eq!(telemetry.license_key(), expected);
}

#[tokio::test]
async fn environment_overrides_reach_every_section() {
    let _guard = EnvGuard::set_vars(&[
        ("OS_PASSWORD", Some("from-env")),
        ("OS_REGION_NAME", Some("RegionOne")),
        ("STACKFLEET_BATCH_MAX_WORKERS", Some("8")),
        ("NEW_RELIC_LICENSE_KEY", Some("license-env")),
    ])
    .await;

    let cloud = CloudConfig::load_without_cli_args().expect("cloud config should load");
    let batch = BatchConfig::load_without_cli_args().expect("batch config should load");
    let telemetry = TelemetryConfig::load_without_cli_args().expect("telemetry should load");

    assert_eq!(cloud.password, "from-env");
    assert_eq!(cloud.region_name.as_deref(), Some("RegionOne"));
    assert_eq!(cloud.auth_url, "http://localhost:5000/v3");
    assert_eq!(batch.max_workers, 8);
    assert_eq!(batch.window_size, 2);
    assert_eq!(telemetry.license_key(), Some("license-env"));
}

#[tokio::test]
async fn password_can_come_from_the_selected_profile_alone() {
    let dir = tempfile::TempDir::new().expect("tempdir");
    let path = dir.path().join("stackfleet.toml");
    std::fs::write(&path, "[clouds.dev]\npassword = \"from-profile\"\n").expect("write config");
    let path_str = path.to_str().expect("utf8 path");
    let _guard = EnvGuard::set_vars(&[
        ("OS_PASSWORD", None),
        ("OS_CLOUD", Some("dev")),
        ("STACKFLEET_CONFIG_PATH", Some(path_str)),
    ])
    .await;

    let loaded = CloudConfig::load_without_cli_args().expect("load without a password");
    assert_eq!(loaded.cloud.as_deref(), Some("dev"));
    let unmerged = loaded.validate().expect_err("blank before the merge");
    assert!(unmerged.to_string().contains("OS_PASSWORD"), "{unmerged}");

    let merged = loaded
        .apply_named_profile(&ProfileStore::new(), None)
        .expect("dev profile applies");

    assert_eq!(merged.password, "from-profile");
    assert!(merged.validate().is_ok());
}
