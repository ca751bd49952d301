use super::{apply_env, apply_file, load_settings, normalize_api_base_url, Settings};

use std::{
    collections::HashMap,
    env, fs,
    time::{SystemTime, UNIX_EPOCH},
};

#[test]
fn defaults_point_at_hosted_backend() {
    let settings = Settings::default();
    assert_eq!(
        settings.api_base_url,
        "https://backend-dentefier.onrender.com/api"
    );
    assert!(settings.username.is_none());
}

#[test]
fn normalizes_trailing_slash_and_blank_url() {
    assert_eq!(
        normalize_api_base_url(" http://localhost:3000/api/ "),
        "http://localhost:3000/api"
    );
    assert_eq!(
        normalize_api_base_url("   "),
        Settings::default().api_base_url
    );
}

#[test]
fn file_values_override_defaults() {
    let mut settings = Settings::default();
    apply_file(
        &mut settings,
        "api_base_url = \"http://10.0.0.2/api\"\nusername = \"ana\"\n",
    )
    .expect("parse");
    assert_eq!(settings.api_base_url, "http://10.0.0.2/api");
    assert_eq!(settings.username.as_deref(), Some("ana"));
    assert!(settings.password.is_none());
}

#[test]
fn rejects_malformed_file() {
    let mut settings = Settings::default();
    assert!(apply_file(&mut settings, "username = [").is_err());
}

#[test]
fn app_prefixed_env_wins_over_plain_env() {
    let env = HashMap::from([
        ("DENTEFIER_API_URL", "http://plain/api"),
        ("APP__API_URL", "http://app/api"),
        ("DENTEFIER_PASSWORD", "segredo"),
    ]);
    let mut settings = Settings::default();
    apply_env(&mut settings, |key| env.get(key).map(|v| v.to_string()));
    assert_eq!(settings.api_base_url, "http://app/api");
    assert_eq!(settings.password.as_deref(), Some("segredo"));
    assert!(settings.username.is_none());
}

#[test]
fn loads_settings_file_from_disk() {
    let suffix = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .expect("clock")
        .as_nanos();
    let temp_root = env::temp_dir().join(format!("dentefier_cli_config_test_{suffix}"));
    fs::create_dir_all(&temp_root).expect("temp root");
    let path = temp_root.join("dentefier.toml");
    fs::write(&path, "api_base_url = \"http://127.0.0.1:9/api/\"\n").expect("write");

    let settings = load_settings(&path).expect("load");
    if env::var("DENTEFIER_API_URL").is_err() && env::var("APP__API_URL").is_err() {
        assert_eq!(settings.api_base_url, "http://127.0.0.1:9/api");
    }

    fs::remove_dir_all(temp_root).expect("cleanup");
}

#[test]
fn missing_file_falls_back_to_defaults() {
    let path = env::temp_dir().join("dentefier_cli_config_does_not_exist.toml");
    let settings = load_settings(&path).expect("load");
    assert!(!settings.api_base_url.is_empty());
}
