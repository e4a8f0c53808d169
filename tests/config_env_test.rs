use serverwatch::Settings;
use std::env;
use std::fs;
use tempfile::TempDir;

// Env vars are process-wide, so everything touching them lives in one test.
#[test]
fn test_env_override_with_nested_keys() {
    let temp_dir = TempDir::new().unwrap();
    let config_path = temp_dir.path().join("settings.toml");
    fs::write(
        &config_path,
        r#"
[poll]
interval_seconds = 60

[registry]
backend_url = "http://from-file.example"
"#,
    )
    .unwrap();

    unsafe {
        // Double underscore separates nested levels
        env::set_var("SW_POLL__INTERVAL_SECONDS", "20");
        env::set_var("SW_REGISTRY__FETCH_TIMEOUT_SECS", "3");
        env::set_var("SW_NOTIFY__WEBHOOK_URL", "https://hooks.example.com/env");
    }

    let settings = Settings::load(Some(config_path.as_path())).unwrap();

    assert_eq!(settings.poll.interval_seconds, 20, "env beats file");
    assert_eq!(settings.registry.fetch_timeout_secs, 3);
    assert_eq!(settings.registry.backend_url, "http://from-file.example");
    assert_eq!(
        settings.webhook_url(),
        Some("https://hooks.example.com/env")
    );

    unsafe {
        env::set_var("SW_POLL__INTERVAL_SECONDS", "2");
    }
    assert!(
        Settings::load(Some(config_path.as_path())).is_err(),
        "env values are validated too"
    );

    unsafe {
        env::remove_var("SW_POLL__INTERVAL_SECONDS");
        env::remove_var("SW_REGISTRY__FETCH_TIMEOUT_SECS");
        env::remove_var("SW_NOTIFY__WEBHOOK_URL");
    }

    let settings = Settings::load(Some(config_path.as_path())).unwrap();
    assert_eq!(settings.poll.interval_seconds, 60);
}
