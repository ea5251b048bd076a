use serde::{Deserialize, Deserializer};
use std::sync::{Mutex, OnceLock};
use std::time::Duration;
use thiserror::Error;

/// Configuration errors
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Configuration error: {0}")]
    Config(#[from] config::ConfigError),
    #[error("Validation error: {0}")]
    Validation(String),
    #[error("Parse error: {0}")]
    Parse(String),
}

/// Custom deserializer for comma-separated strings
fn deserialize_comma_separated<'de, D>(deserializer: D) -> Result<Vec<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let s = String::deserialize(deserializer)?;
    if s.is_empty() {
        Ok(Vec::new())
    } else {
        Ok(s.split(',')
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect())
    }
}

/// Application settings with environment variable support
#[derive(Debug, Clone, Deserialize)]
pub struct Settings {
    // Server
    pub bind_address: String,
    pub public_base_url: String,
    pub api_base_url: String,

    // Security
    #[serde(deserialize_with = "deserialize_comma_separated")]
    pub cors_allow_origins: Vec<String>,
    pub api_key_header: String,
    #[serde(deserialize_with = "deserialize_comma_separated")]
    pub api_keys: Vec<String>,
    #[serde(deserialize_with = "deserialize_comma_separated")]
    pub capture_permission_origins: Vec<String>,
    #[serde(deserialize_with = "deserialize_comma_separated")]
    pub evidence_media_origins: Vec<String>,

    // Logging
    pub log_level: String,
    pub log_format: String,

    // Evidence uploads
    pub upload_storage_path: String,
    #[serde(deserialize_with = "deserialize_comma_separated")]
    pub upload_allowed_types: Vec<String>,
    pub max_image_bytes: u64,
    pub max_video_bytes: u64,

    // External services
    pub http_timeout_seconds: f64,
    pub geocoding_url: String,
    pub geocoding_user_agent: String,

    // Capture pipeline
    pub geolocation_timeout_seconds: f64,
    pub geolocation_max_age_seconds: f64,
    pub recording_cap_seconds: f64,
    pub photo_quality: u8,
    pub upload_concurrency: u32,
    pub upload_progress_tick_ms: u64,

    // Reports
    pub report_code_max_attempts: u32,

    // Rate Limiting
    pub rate_limit_enabled: bool,
    pub rate_limit_requests: u32,
    pub rate_limit_window_seconds: u32,
}

impl Settings {
    /// Create new settings instance from environment variables and .env file
    pub fn new() -> Result<Self, ConfigError> {
        Self::new_with_env_file(true)
    }

    /// Create new settings instance with optional .env file loading
    pub fn new_with_env_file(load_env_file: bool) -> Result<Self, ConfigError> {
        // Tests mutate process env; serialize construction so reads stay consistent
        static SETTINGS_BUILD_MUTEX: OnceLock<Mutex<()>> = OnceLock::new();
        let build_mutex = SETTINGS_BUILD_MUTEX.get_or_init(|| Mutex::new(()));
        let _guard = build_mutex
            .lock()
            .map_err(|_| ConfigError::Parse("settings build lock poisoned".to_string()))?;

        #[cfg(not(test))]
        {
            if load_env_file {
                dotenvy::dotenv().ok();
            }
        }

        let mut builder = config::Config::builder()
            // Server defaults
            .set_default("bind_address", "0.0.0.0:8000")?
            .set_default("public_base_url", "http://localhost:8000")?
            .set_default("api_base_url", "http://localhost:8000")?

            // Security defaults
            .set_default("cors_allow_origins", "http://localhost:3000,http://127.0.0.1:3000")?
            .set_default("api_key_header", "X-API-Key")?
            .set_default("api_keys", "")?
            .set_default("capture_permission_origins", "")?
            .set_default("evidence_media_origins", "")?

            // Logging defaults
            .set_default("log_level", "INFO")?
            .set_default("log_format", "json")?

            // Upload defaults
            .set_default("upload_storage_path", "./data/uploads")?
            .set_default("upload_allowed_types", "image/jpeg,image/png,video/webm,video/mp4")?
            .set_default("max_image_bytes", 26214400u64)?  // 25MB
            .set_default("max_video_bytes", 52428800u64)?  // 50MB

            // External services defaults
            .set_default("http_timeout_seconds", 30.0)?
            .set_default("geocoding_url", "https://nominatim.openstreetmap.org/reverse")?
            .set_default("geocoding_user_agent", "violation-reporter/0.1")?

            // Capture pipeline defaults
            .set_default("geolocation_timeout_seconds", 10.0)?
            .set_default("geolocation_max_age_seconds", 300.0)?
            .set_default("recording_cap_seconds", 20.0)?
            .set_default("photo_quality", 85u64)?
            .set_default("upload_concurrency", 1u32)?
            .set_default("upload_progress_tick_ms", 200u64)?

            // Report defaults
            .set_default("report_code_max_attempts", 10u32)?

            // Rate Limiting defaults
            .set_default("rate_limit_enabled", true)?
            .set_default("rate_limit_requests", 120u32)?
            .set_default("rate_limit_window_seconds", 60u32)?
            ;

        #[cfg(not(test))]
        {
            if load_env_file {
                builder = builder.add_source(config::File::with_name(".env").required(false));
            }
        }

        fn read_env(key: &str) -> Option<String> {
            std::env::var(key).ok()
        }

        fn parse_bool_env(key: &str) -> Option<bool> {
            read_env(key).and_then(|v| match v.trim().to_ascii_lowercase().as_str() {
                "true" | "1" => Some(true),
                "false" | "0" => Some(false),
                _ => None,
            })
        }

        // String overrides (UPPERCASE only)
        if let Some(v) = read_env("BIND_ADDRESS") { builder = builder.set_override("bind_address", v)?; }
        if let Some(v) = read_env("PUBLIC_BASE_URL") { builder = builder.set_override("public_base_url", v)?; }
        if let Some(v) = read_env("API_BASE_URL") { builder = builder.set_override("api_base_url", v)?; }
        if let Some(v) = read_env("CORS_ALLOW_ORIGINS") { builder = builder.set_override("cors_allow_origins", v)?; }
        if let Some(v) = read_env("API_KEY_HEADER") { builder = builder.set_override("api_key_header", v)?; }
        if let Some(v) = read_env("API_KEYS") { builder = builder.set_override("api_keys", v)?; }
        if let Some(v) = read_env("CAPTURE_PERMISSION_ORIGINS") { builder = builder.set_override("capture_permission_origins", v)?; }
        if let Some(v) = read_env("EVIDENCE_MEDIA_ORIGINS") { builder = builder.set_override("evidence_media_origins", v)?; }
        if let Some(v) = read_env("LOG_LEVEL") { builder = builder.set_override("log_level", v)?; }
        if let Some(v) = read_env("LOG_FORMAT") { builder = builder.set_override("log_format", v)?; }
        if let Some(v) = read_env("UPLOAD_STORAGE_PATH") { builder = builder.set_override("upload_storage_path", v)?; }
        if let Some(v) = read_env("UPLOAD_ALLOWED_TYPES") { builder = builder.set_override("upload_allowed_types", v)?; }
        if let Some(v) = read_env("GEOCODING_URL") { builder = builder.set_override("geocoding_url", v)?; }
        if let Some(v) = read_env("GEOCODING_USER_AGENT") { builder = builder.set_override("geocoding_user_agent", v)?; }

        // Numeric overrides
        if let Some(v) = read_env("MAX_IMAGE_BYTES").and_then(|s| s.parse::<u64>().ok()) { builder = builder.set_override("max_image_bytes", v)?; }
        if let Some(v) = read_env("MAX_VIDEO_BYTES").and_then(|s| s.parse::<u64>().ok()) { builder = builder.set_override("max_video_bytes", v)?; }
        if let Some(v) = read_env("HTTP_TIMEOUT_SECONDS").and_then(|s| s.parse::<f64>().ok()) { builder = builder.set_override("http_timeout_seconds", v)?; }
        if let Some(v) = read_env("GEOLOCATION_TIMEOUT_SECONDS").and_then(|s| s.parse::<f64>().ok()) { builder = builder.set_override("geolocation_timeout_seconds", v)?; }
        if let Some(v) = read_env("GEOLOCATION_MAX_AGE_SECONDS").and_then(|s| s.parse::<f64>().ok()) { builder = builder.set_override("geolocation_max_age_seconds", v)?; }
        if let Some(v) = read_env("RECORDING_CAP_SECONDS").and_then(|s| s.parse::<f64>().ok()) { builder = builder.set_override("recording_cap_seconds", v)?; }
        if let Some(v) = read_env("PHOTO_QUALITY").and_then(|s| s.parse::<u8>().ok()) { builder = builder.set_override("photo_quality", u64::from(v))?; }
        if let Some(v) = read_env("UPLOAD_CONCURRENCY").and_then(|s| s.parse::<u32>().ok()) { builder = builder.set_override("upload_concurrency", v)?; }
        if let Some(v) = read_env("UPLOAD_PROGRESS_TICK_MS").and_then(|s| s.parse::<u64>().ok()) { builder = builder.set_override("upload_progress_tick_ms", v)?; }
        if let Some(v) = read_env("REPORT_CODE_MAX_ATTEMPTS").and_then(|s| s.parse::<u32>().ok()) { builder = builder.set_override("report_code_max_attempts", v)?; }
        if let Some(v) = read_env("RATE_LIMIT_REQUESTS").and_then(|s| s.parse::<u32>().ok()) { builder = builder.set_override("rate_limit_requests", v)?; }
        if let Some(v) = read_env("RATE_LIMIT_WINDOW_SECONDS").and_then(|s| s.parse::<u32>().ok()) { builder = builder.set_override("rate_limit_window_seconds", v)?; }

        // Boolean overrides
        if let Some(v) = parse_bool_env("RATE_LIMIT_ENABLED") { builder = builder.set_override("rate_limit_enabled", v)?; }

        let settings = builder.build()?;

        let config: Settings = settings.try_deserialize()?;

        config.validate()?;

        Ok(config)
    }

    /// Validate configuration values
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !matches!(self.log_format.as_str(), "json" | "plain") {
            return Err(ConfigError::Validation(
                "log_format must be 'json' or 'plain'".to_string()
            ));
        }

        if self.bind_address.parse::<std::net::SocketAddr>().is_err() {
            return Err(ConfigError::Validation(format!(
                "bind_address '{}' is not a valid socket address",
                self.bind_address
            )));
        }

        for (name, url) in [
            ("public_base_url", &self.public_base_url),
            ("api_base_url", &self.api_base_url),
            ("geocoding_url", &self.geocoding_url),
        ] {
            if !(url.starts_with("http://") || url.starts_with("https://")) {
                return Err(ConfigError::Validation(format!(
                    "{} must be an http(s) URL",
                    name
                )));
            }
        }

        for origin in self
            .capture_permission_origins
            .iter()
            .chain(&self.evidence_media_origins)
        {
            if !(origin.starts_with("http://") || origin.starts_with("https://"))
                || origin.contains(|c: char| c.is_whitespace() || c == '"' || c == ';' || c == ',')
            {
                return Err(ConfigError::Validation(format!(
                    "'{}' is not a valid origin for the capture policy",
                    origin
                )));
            }
        }

        if self.upload_allowed_types.is_empty() {
            return Err(ConfigError::Validation(
                "upload_allowed_types must not be empty".to_string()
            ));
        }

        if self.max_image_bytes == 0 || self.max_video_bytes == 0 {
            return Err(ConfigError::Validation(
                "max_image_bytes and max_video_bytes must be greater than 0".to_string()
            ));
        }

        if self.http_timeout_seconds <= 0.0 {
            return Err(ConfigError::Validation(
                "http_timeout_seconds must be greater than 0".to_string()
            ));
        }

        if self.geolocation_timeout_seconds <= 0.0 {
            return Err(ConfigError::Validation(
                "geolocation_timeout_seconds must be greater than 0".to_string()
            ));
        }

        if self.geolocation_max_age_seconds < 0.0 {
            return Err(ConfigError::Validation(
                "geolocation_max_age_seconds must not be negative".to_string()
            ));
        }

        if self.recording_cap_seconds <= 0.0 || self.recording_cap_seconds > 20.0 {
            return Err(ConfigError::Validation(
                "recording_cap_seconds must be between 0 and 20".to_string()
            ));
        }

        if self.photo_quality == 0 || self.photo_quality > 100 {
            return Err(ConfigError::Validation(
                "photo_quality must be between 1 and 100".to_string()
            ));
        }

        if self.upload_concurrency == 0 {
            return Err(ConfigError::Validation(
                "upload_concurrency must be greater than 0".to_string()
            ));
        }

        if self.upload_progress_tick_ms == 0 {
            return Err(ConfigError::Validation(
                "upload_progress_tick_ms must be greater than 0".to_string()
            ));
        }

        if self.report_code_max_attempts == 0 {
            return Err(ConfigError::Validation(
                "report_code_max_attempts must be greater than 0".to_string()
            ));
        }

        if self.rate_limit_requests == 0 {
            return Err(ConfigError::Validation(
                "rate_limit_requests must be greater than 0".to_string()
            ));
        }

        if self.rate_limit_window_seconds == 0 {
            return Err(ConfigError::Validation(
                "rate_limit_window_seconds must be greater than 0".to_string()
            ));
        }

        Ok(())
    }

    pub fn http_timeout(&self) -> Duration {
        Duration::from_secs_f64(self.http_timeout_seconds)
    }

    pub fn geolocation_timeout(&self) -> Duration {
        Duration::from_secs_f64(self.geolocation_timeout_seconds)
    }

    pub fn geolocation_max_age(&self) -> Duration {
        Duration::from_secs_f64(self.geolocation_max_age_seconds)
    }

    pub fn recording_cap(&self) -> Duration {
        Duration::from_secs_f64(self.recording_cap_seconds)
    }

    pub fn upload_progress_tick(&self) -> Duration {
        Duration::from_millis(self.upload_progress_tick_ms)
    }

    /// Upload endpoint used by the capture pipeline.
    pub fn upload_endpoint(&self) -> String {
        format!("{}/api/uploads", self.api_base_url.trim_end_matches('/'))
    }

    /// Report-submission endpoint used by the capture pipeline.
    pub fn report_endpoint(&self) -> String {
        format!("{}/api/reports", self.api_base_url.trim_end_matches('/'))
    }

    /// Reverse-geocoding route exposed by the intake API.
    pub fn geocode_endpoint(&self) -> String {
        format!("{}/api/geocode/reverse", self.api_base_url.trim_end_matches('/'))
    }
}

/// Global settings instance
static SETTINGS: OnceLock<Settings> = OnceLock::new();

/// Get cached settings instance, initialising it on first use
pub fn get_settings() -> Result<&'static Settings, ConfigError> {
    if let Some(settings) = SETTINGS.get() {
        return Ok(settings);
    }
    let settings = Settings::new()?;
    Ok(SETTINGS.get_or_init(|| settings))
}

#[cfg(test)]
mod tests;
