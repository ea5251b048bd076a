use crate::config::{ConfigError, Settings};
use std::env;
use std::time::Duration;

/// Helper to set environment variables for testing
fn with_env_vars<F, R>(vars: Vec<(&str, &str)>, test: F) -> R
where
    F: FnOnce() -> R,
{
    // Every variable the settings loader reads, so leftovers from other tests cannot leak in
    let all_config_vars = vec![
        "BIND_ADDRESS", "PUBLIC_BASE_URL", "API_BASE_URL", "CORS_ALLOW_ORIGINS",
        "API_KEY_HEADER", "API_KEYS", "LOG_LEVEL", "LOG_FORMAT", "UPLOAD_STORAGE_PATH",
        "UPLOAD_ALLOWED_TYPES", "MAX_IMAGE_BYTES", "MAX_VIDEO_BYTES", "HTTP_TIMEOUT_SECONDS",
        "GEOCODING_URL", "GEOCODING_USER_AGENT", "GEOLOCATION_TIMEOUT_SECONDS",
        "GEOLOCATION_MAX_AGE_SECONDS", "RECORDING_CAP_SECONDS", "PHOTO_QUALITY",
        "UPLOAD_CONCURRENCY", "UPLOAD_PROGRESS_TICK_MS", "REPORT_CODE_MAX_ATTEMPTS",
        "RATE_LIMIT_ENABLED", "RATE_LIMIT_REQUESTS", "RATE_LIMIT_WINDOW_SECONDS",
        "CAPTURE_PERMISSION_ORIGINS", "EVIDENCE_MEDIA_ORIGINS",
    ];

    let original_values: Vec<_> = all_config_vars
        .iter()
        .map(|key| (*key, env::var(key).ok()))
        .collect();

    for key in &all_config_vars {
        env::remove_var(key);
    }

    for (key, value) in &vars {
        env::set_var(key, value);
    }

    let result = test();

    for (key, original_value) in original_values {
        match original_value {
            Some(value) => env::set_var(key, value),
            None => env::remove_var(key),
        }
    }

    result
}

#[test]
fn test_default_settings() {
    let settings = with_env_vars(vec![], || Settings::new_with_env_file(false))
        .expect("Failed to create default settings");

    assert_eq!(settings.bind_address, "0.0.0.0:8000");
    assert_eq!(settings.api_key_header, "X-API-Key");
    assert!(settings.api_keys.is_empty());
    assert_eq!(settings.log_level, "INFO");
    assert_eq!(settings.log_format, "json");

    assert_eq!(
        settings.upload_allowed_types,
        vec!["image/jpeg", "image/png", "video/webm", "video/mp4"]
    );
    assert_eq!(settings.max_image_bytes, 25 * 1024 * 1024);
    assert_eq!(settings.max_video_bytes, 50 * 1024 * 1024);

    assert_eq!(settings.geolocation_timeout(), Duration::from_secs(10));
    assert_eq!(settings.geolocation_max_age(), Duration::from_secs(300));
    assert_eq!(settings.recording_cap(), Duration::from_secs(20));
    assert_eq!(settings.photo_quality, 85);
    assert_eq!(settings.upload_concurrency, 1);
    assert_eq!(settings.report_code_max_attempts, 10);
    assert!(settings.rate_limit_enabled);
}

#[test]
fn test_environment_variable_override() {
    let settings = with_env_vars(
        vec![
            ("LOG_LEVEL", "DEBUG"),
            ("UPLOAD_CONCURRENCY", "3"),
            ("HTTP_TIMEOUT_SECONDS", "15.5"),
            ("PHOTO_QUALITY", "90"),
            ("RATE_LIMIT_ENABLED", "false"),
        ],
        || Settings::new_with_env_file(false),
    )
    .expect("Failed to create settings");

    assert_eq!(settings.log_level, "DEBUG");
    assert_eq!(settings.upload_concurrency, 3);
    assert_eq!(settings.http_timeout_seconds, 15.5);
    assert_eq!(settings.photo_quality, 90);
    assert!(!settings.rate_limit_enabled);
}

#[test]
fn test_comma_separated_lists() {
    let settings = with_env_vars(
        vec![
            ("CORS_ALLOW_ORIGINS", " http://localhost:3000 , https://example.com "),
            ("API_KEYS", "key1,key2,,key3"),
            ("UPLOAD_ALLOWED_TYPES", "image/jpeg,video/mp4"),
        ],
        || Settings::new_with_env_file(false),
    )
    .expect("Failed to create settings");

    assert_eq!(
        settings.cors_allow_origins,
        vec!["http://localhost:3000", "https://example.com"]
    );
    assert_eq!(settings.api_keys, vec!["key1", "key2", "key3"]);
    assert_eq!(settings.upload_allowed_types, vec!["image/jpeg", "video/mp4"]);
}

#[test]
fn test_capture_policy_origins() {
    let settings = with_env_vars(
        vec![
            ("CAPTURE_PERMISSION_ORIGINS", "https://embed.example"),
            ("EVIDENCE_MEDIA_ORIGINS", "https://cdn.example, https://media.example"),
        ],
        || Settings::new_with_env_file(false),
    )
    .expect("Failed to create settings");

    assert_eq!(settings.capture_permission_origins, vec!["https://embed.example"]);
    assert_eq!(
        settings.evidence_media_origins,
        vec!["https://cdn.example", "https://media.example"]
    );
}

#[test]
fn test_validation_log_format() {
    let result = with_env_vars(vec![("LOG_FORMAT", "invalid")], || {
        Settings::new_with_env_file(false)
    });

    match result {
        Err(ConfigError::Validation(msg)) => {
            assert!(msg.contains("log_format must be 'json' or 'plain'"))
        }
        other => panic!("Expected validation error for log_format, got {:?}", other),
    }
}

#[test]
fn test_validation_rejects_out_of_range_values() {
    for (key, value) in [
        ("MAX_IMAGE_BYTES", "0"),
        ("HTTP_TIMEOUT_SECONDS", "0"),
        ("RECORDING_CAP_SECONDS", "45"),
        ("PHOTO_QUALITY", "0"),
        ("UPLOAD_CONCURRENCY", "0"),
        ("REPORT_CODE_MAX_ATTEMPTS", "0"),
        ("BIND_ADDRESS", "not-an-address"),
        ("GEOCODING_URL", "ftp://geocoder"),
        ("EVIDENCE_MEDIA_ORIGINS", "cdn.example"),
        ("CAPTURE_PERMISSION_ORIGINS", "https://a.example; camera=*"),
    ] {
        let result = with_env_vars(vec![(key, value)], || Settings::new_with_env_file(false));
        assert!(
            matches!(result, Err(ConfigError::Validation(_))),
            "{}={} should be rejected",
            key,
            value
        );
    }
}

#[test]
fn test_endpoints_derive_from_api_base_url() {
    let settings = with_env_vars(vec![("API_BASE_URL", "https://api.example.test/")], || {
        Settings::new_with_env_file(false)
    })
    .expect("Failed to create settings");

    assert_eq!(settings.upload_endpoint(), "https://api.example.test/api/uploads");
    assert_eq!(settings.report_endpoint(), "https://api.example.test/api/reports");
    assert_eq!(
        settings.geocode_endpoint(),
        "https://api.example.test/api/geocode/reverse"
    );
}
