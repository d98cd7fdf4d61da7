//! Configuration loading for the dashboard session.
//!
//! Searches for configuration in the following order:
//! 1. An explicitly given TOML file
//! 2. `robodash.toml` in the current directory
//! 3. Environment variables (`ROBODASH_*`)
//! 4. Default values for the selected profile

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use log::{debug, info};
use serde::Deserialize;
use uuid::Uuid;

use robodash_protocol::DeviceProfile;

use crate::client::ConnectionConfig;
use crate::error::ConfigError;

/// File looked up in the current directory when no path is given.
pub const CONFIG_FILE_NAME: &str = "robodash.toml";

/// Logging settings.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LoggingConfig {
    /// Filter directives, e.g. `"debug"` or `"robodash_session=trace"`.
    pub level: Option<String>,
    /// Append log lines to this file instead of stderr.
    pub file: Option<PathBuf>,
}

/// Everything a dashboard needs to open a session.
#[derive(Debug, Clone, Default)]
pub struct DashboardConfig {
    pub connection: ConnectionConfig,
    pub logging: LoggingConfig,
}

/// Configuration file format.
#[derive(Debug, Deserialize, Default)]
struct ConfigFile {
    #[serde(default)]
    device: DeviceSection,
    #[serde(default)]
    connection: ConnectionSection,
    #[serde(default)]
    logging: LoggingSection,
}

#[derive(Debug, Deserialize, Default)]
struct DeviceSection {
    profile: Option<DeviceProfile>,
    name: Option<String>,
    service_uuid: Option<Uuid>,
    characteristic_uuid: Option<Uuid>,
}

#[derive(Debug, Deserialize, Default)]
struct ConnectionSection {
    connect_timeout_ms: Option<u64>,
    write_timeout_ms: Option<u64>,
    event_capacity: Option<usize>,
}

#[derive(Debug, Deserialize, Default)]
struct LoggingSection {
    level: Option<String>,
    file: Option<PathBuf>,
}

/// Load configuration, see the module docs for the lookup order.
pub fn load_config(path: Option<&Path>) -> Result<DashboardConfig, ConfigError> {
    let path = path.map(Path::to_path_buf).or_else(find_config_file);

    match path {
        Some(path) => {
            info!("Loading configuration from {:?}", path);
            let contents = fs::read_to_string(&path).map_err(|source| ConfigError::Io {
                path: path.clone(),
                source,
            })?;
            parse_config(&contents)
        }
        None => load_from_env(),
    }
}

/// Parse a TOML document. Missing keys take the profile defaults.
pub fn parse_config(contents: &str) -> Result<DashboardConfig, ConfigError> {
    let file: ConfigFile = toml::from_str(contents)?;

    let profile = file.device.profile.unwrap_or_default();
    let mut connection = ConnectionConfig::for_profile(profile);
    if let Some(name) = file.device.name {
        connection.device_name = name;
    }
    if let Some(uuid) = file.device.service_uuid {
        connection.service_uuid = uuid;
    }
    if let Some(uuid) = file.device.characteristic_uuid {
        connection.characteristic_uuid = uuid;
    }
    if let Some(ms) = file.connection.connect_timeout_ms {
        connection.connect_timeout = Duration::from_millis(ms);
    }
    connection.write_timeout = file.connection.write_timeout_ms.map(Duration::from_millis);
    if let Some(capacity) = file.connection.event_capacity {
        connection.event_capacity = capacity;
    }

    let config = DashboardConfig {
        connection,
        logging: LoggingConfig {
            level: file.logging.level,
            file: file.logging.file,
        },
    };
    validate(&config)?;

    debug!(
        "Configuration loaded: profile={}, device={:?}",
        config.connection.profile, config.connection.device_name
    );
    Ok(config)
}

/// Load configuration from environment variables.
pub fn load_from_env() -> Result<DashboardConfig, ConfigError> {
    from_lookup(|key| std::env::var(key).ok())
}

fn from_lookup<F>(lookup: F) -> Result<DashboardConfig, ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    let profile = match lookup("ROBODASH_PROFILE") {
        Some(raw) => raw
            .parse::<DeviceProfile>()
            .map_err(|e| ConfigError::Invalid(format!("ROBODASH_PROFILE: {}", e)))?,
        None => DeviceProfile::default(),
    };

    let mut connection = ConnectionConfig::for_profile(profile);
    if let Some(name) = lookup("ROBODASH_DEVICE_NAME") {
        connection.device_name = name;
    }
    if let Some(raw) = lookup("ROBODASH_SERVICE_UUID") {
        connection.service_uuid = parse_env("ROBODASH_SERVICE_UUID", &raw)?;
    }
    if let Some(raw) = lookup("ROBODASH_CHARACTERISTIC_UUID") {
        connection.characteristic_uuid = parse_env("ROBODASH_CHARACTERISTIC_UUID", &raw)?;
    }
    if let Some(raw) = lookup("ROBODASH_CONNECT_TIMEOUT") {
        connection.connect_timeout =
            Duration::from_millis(parse_env("ROBODASH_CONNECT_TIMEOUT", &raw)?);
    }
    if let Some(raw) = lookup("ROBODASH_WRITE_TIMEOUT") {
        connection.write_timeout =
            Some(Duration::from_millis(parse_env("ROBODASH_WRITE_TIMEOUT", &raw)?));
    }

    let config = DashboardConfig {
        connection,
        logging: LoggingConfig {
            level: lookup("ROBODASH_LOG_LEVEL"),
            file: lookup("ROBODASH_LOG_FILE").map(PathBuf::from),
        },
    };
    validate(&config)?;

    debug!(
        "Using environment/default config: profile={}, device={:?}",
        config.connection.profile, config.connection.device_name
    );
    Ok(config)
}

fn parse_env<T>(key: &str, raw: &str) -> Result<T, ConfigError>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    raw.trim()
        .parse()
        .map_err(|e| ConfigError::Invalid(format!("{}={:?}: {}", key, raw, e)))
}

fn validate(config: &DashboardConfig) -> Result<(), ConfigError> {
    let connection = &config.connection;
    if connection.device_name.trim().is_empty() {
        return Err(ConfigError::Invalid("device name must not be empty".into()));
    }
    if connection.connect_timeout.is_zero() {
        return Err(ConfigError::Invalid("connect timeout must be positive".into()));
    }
    if connection.write_timeout.map_or(false, |t| t.is_zero()) {
        return Err(ConfigError::Invalid("write timeout must be positive".into()));
    }
    if connection.event_capacity == 0 {
        return Err(ConfigError::Invalid("event capacity must be positive".into()));
    }
    Ok(())
}

/// Find `robodash.toml` in the current directory.
fn find_config_file() -> Option<PathBuf> {
    let path = std::env::current_dir().ok()?.join(CONFIG_FILE_NAME);
    if path.exists() {
        Some(path)
    } else {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    use crate::transport::{DEFAULT_CHARACTERISTIC, DEFAULT_SERVICE};

    #[test]
    fn test_parse_full_config() {
        let content = r#"
[device]
profile = "binary"
name = "Rover"
service_uuid = "0000ffe0-0000-1000-8000-00805f9b34fb"

[connection]
connect_timeout_ms = 10000
write_timeout_ms = 2000

[logging]
level = "debug"
"#;
        let config = parse_config(content).unwrap();
        let connection = &config.connection;
        assert_eq!(connection.profile, DeviceProfile::Binary);
        assert_eq!(connection.device_name, "Rover");
        assert_eq!(
            connection.service_uuid,
            Uuid::parse_str("0000ffe0-0000-1000-8000-00805f9b34fb").unwrap()
        );
        assert_eq!(connection.characteristic_uuid, DEFAULT_CHARACTERISTIC);
        assert_eq!(connection.connect_timeout, Duration::from_secs(10));
        assert_eq!(connection.write_timeout, Some(Duration::from_secs(2)));
        assert_eq!(config.logging.level.as_deref(), Some("debug"));
    }

    #[test]
    fn test_parse_empty_uses_text_defaults() {
        let config = parse_config("").unwrap();
        let connection = &config.connection;
        assert_eq!(connection.profile, DeviceProfile::Text);
        assert_eq!(connection.device_name, "SelfBalancingRobot");
        assert_eq!(connection.service_uuid, DEFAULT_SERVICE);
        assert_eq!(connection.write_timeout, None);
        assert_eq!(config.logging, LoggingConfig::default());
    }

    #[test]
    fn test_profile_sets_default_name() {
        let config = parse_config("[device]\nprofile = \"binary\"\n").unwrap();
        assert_eq!(config.connection.device_name, "MotorControl");
    }

    #[test]
    fn test_parse_rejects_bad_values() {
        assert!(matches!(
            parse_config("[device]\nprofile = \"toaster\"\n"),
            Err(ConfigError::Parse(_))
        ));
        assert!(matches!(
            parse_config("[connection]\nconnect_timeout_ms = 0\n"),
            Err(ConfigError::Invalid(_))
        ));
        assert!(matches!(
            parse_config("[device]\nname = \"  \"\n"),
            Err(ConfigError::Invalid(_))
        ));
    }

    #[test]
    fn test_env_lookup() {
        let vars: HashMap<&str, &str> = [
            ("ROBODASH_PROFILE", "motor"),
            ("ROBODASH_CONNECT_TIMEOUT", "5000"),
            ("ROBODASH_WRITE_TIMEOUT", "250"),
            ("ROBODASH_LOG_LEVEL", "trace"),
        ]
        .into_iter()
        .collect();

        let config = from_lookup(|key| vars.get(key).map(|v| v.to_string())).unwrap();
        assert_eq!(config.connection.profile, DeviceProfile::Binary);
        assert_eq!(config.connection.device_name, "MotorControl");
        assert_eq!(config.connection.connect_timeout, Duration::from_secs(5));
        assert_eq!(config.connection.write_timeout, Some(Duration::from_millis(250)));
        assert_eq!(config.logging.level.as_deref(), Some("trace"));
    }

    #[test]
    fn test_env_invalid_uuid() {
        let result = from_lookup(|key| {
            (key == "ROBODASH_SERVICE_UUID").then(|| "not-a-uuid".to_string())
        });
        assert!(matches!(result, Err(ConfigError::Invalid(_))));
    }

    #[test]
    fn test_load_missing_file() {
        let result = load_config(Some(Path::new("/nonexistent/robodash.toml")));
        assert!(matches!(result, Err(ConfigError::Io { .. })));
    }
}
