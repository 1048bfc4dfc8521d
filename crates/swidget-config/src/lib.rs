//! Shared configuration for the Swidget CLI.
//!
//! TOML profiles, secret-key resolution (env + keyring + plaintext),
//! and translation to `swidget_core::DeviceConfig`. The CLI adds
//! flag-aware wrappers on top.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use directories::ProjectDirs;
use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};
use secrecy::SecretString;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use swidget_core::DeviceConfig;

/// Keyring service name secrets are stored under.
pub const KEYRING_SERVICE: &str = "swidget";

/// Prefix for environment overrides, e.g. `SWIDGET_DEFAULTS__TIMEOUT=10`.
pub const ENV_PREFIX: &str = "SWIDGET_";

// ── Error ───────────────────────────────────────────────────────────

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid {field}: {reason}")]
    Validation { field: String, reason: String },

    #[error("no secret key configured for profile '{profile}'")]
    NoCredentials { profile: String },

    #[error("profile '{profile}' not found")]
    UnknownProfile { profile: String },

    #[error("keyring error: {0}")]
    Keyring(#[from] keyring::Error),

    #[error("failed to serialize config: {0}")]
    Serialization(#[from] toml::ser::Error),

    #[error("config loading failed: {0}")]
    Figment(Box<figment::Error>),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<figment::Error> for ConfigError {
    fn from(err: figment::Error) -> Self {
        Self::Figment(Box::new(err))
    }
}

// ── TOML config structs ─────────────────────────────────────────────

/// Top-level TOML configuration.
#[derive(Debug, Deserialize, Serialize)]
pub struct Config {
    /// Default profile name.
    pub default_profile: Option<String>,

    /// Global defaults.
    #[serde(default)]
    pub defaults: Defaults,

    /// Named device profiles.
    #[serde(default)]
    pub profiles: HashMap<String, Profile>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            default_profile: Some("default".into()),
            defaults: Defaults::default(),
            profiles: HashMap::new(),
        }
    }
}

#[derive(Debug, Deserialize, Serialize)]
pub struct Defaults {
    #[serde(default = "default_output")]
    pub output: String,

    #[serde(default = "default_color")]
    pub color: String,

    /// HTTP request timeout in seconds.
    #[serde(default = "default_timeout")]
    pub timeout: u64,
}

impl Default for Defaults {
    fn default() -> Self {
        Self {
            output: default_output(),
            color: default_color(),
            timeout: default_timeout(),
        }
    }
}

fn default_output() -> String {
    "table".into()
}
fn default_color() -> String {
    "auto".into()
}
fn default_timeout() -> u64 {
    30
}

/// A named device profile.
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
pub struct Profile {
    /// Device address, e.g. "192.168.1.40".
    pub host: String,

    /// Header name the secret key travels in.
    pub token_name: Option<String>,

    /// Secret key (plaintext; prefer keyring or env var).
    pub secret_key: Option<String>,

    /// Environment variable holding the secret key.
    pub secret_key_env: Option<String>,

    /// Talk HTTPS / WSS. Defaults to true.
    pub use_https: Option<bool>,

    /// Verify the device certificate. Defaults to false.
    pub verify_ssl: Option<bool>,

    /// Seconds between socket reconnect attempts.
    pub retry_interval: Option<u64>,

    /// Reconnect attempts before giving up. Unset retries forever.
    pub max_retries: Option<u32>,

    /// Override the default HTTP timeout (seconds).
    pub timeout: Option<u64>,

    /// Open the realtime socket. Defaults to true.
    pub websockets: Option<bool>,
}

impl Config {
    /// Profile named `name`, or the default profile when `name` is `None`.
    pub fn profile(&self, name: Option<&str>) -> Result<(String, &Profile), ConfigError> {
        let name = name
            .map(str::to_owned)
            .or_else(|| self.default_profile.clone())
            .unwrap_or_else(|| "default".into());
        self.profiles
            .get(&name)
            .map(|profile| (name.clone(), profile))
            .ok_or(ConfigError::UnknownProfile { profile: name })
    }
}

// ── Config file path ────────────────────────────────────────────────

/// Resolve the config file path via XDG / platform conventions.
pub fn config_path() -> PathBuf {
    ProjectDirs::from("com", "swidget", "swidget").map_or_else(
        || {
            let mut p = dirs_fallback();
            p.push("config.toml");
            p
        },
        |dirs| dirs.config_dir().join("config.toml"),
    )
}

fn dirs_fallback() -> PathBuf {
    let mut p = PathBuf::from(std::env::var("HOME").unwrap_or_else(|_| ".".into()));
    p.push(".config");
    p.push("swidget");
    p
}

// ── Config loading ──────────────────────────────────────────────────

/// Load the full Config from the canonical file + environment.
pub fn load_config() -> Result<Config, ConfigError> {
    load_config_from(&config_path())
}

/// Load defaults, then `path` (if it exists), then `SWIDGET_` env vars.
/// Nested keys use a double underscore: `SWIDGET_DEFAULTS__TIMEOUT`.
pub fn load_config_from(path: &Path) -> Result<Config, ConfigError> {
    let figment = Figment::new()
        .merge(Serialized::defaults(Config::default()))
        .merge(Toml::file(path))
        .merge(Env::prefixed(ENV_PREFIX).split("__"));

    let config: Config = figment.extract()?;
    Ok(config)
}

/// Load config, returning a default if the file doesn't exist.
pub fn load_config_or_default() -> Config {
    load_config().unwrap_or_default()
}

// ── Config saving ───────────────────────────────────────────────────

/// Serialize config to TOML and write to the canonical config path.
pub fn save_config(cfg: &Config) -> Result<(), ConfigError> {
    save_config_to(cfg, &config_path())
}

pub fn save_config_to(cfg: &Config, path: &Path) -> Result<(), ConfigError> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let toml_str = toml::to_string_pretty(cfg)?;
    std::fs::write(path, toml_str)?;
    Ok(())
}

// ── Secret resolution (without CLI flags) ───────────────────────────

fn keyring_entry(profile_name: &str) -> Result<keyring::Entry, keyring::Error> {
    keyring::Entry::new(KEYRING_SERVICE, &format!("{profile_name}/secret-key"))
}

/// Store a profile's secret key in the OS keyring.
pub fn store_secret_key(profile_name: &str, secret: &str) -> Result<(), ConfigError> {
    keyring_entry(profile_name)?.set_password(secret)?;
    Ok(())
}

/// Resolve a secret key from the credential chain (no CLI flag step).
pub fn resolve_secret_key(profile: &Profile, profile_name: &str) -> Result<SecretString, ConfigError> {
    // 1. Profile's secret_key_env → env var lookup
    if let Some(ref env_name) = profile.secret_key_env {
        if let Ok(val) = std::env::var(env_name) {
            return Ok(SecretString::from(val));
        }
    }

    // 2. System keyring
    if let Ok(entry) = keyring_entry(profile_name) {
        if let Ok(secret) = entry.get_password() {
            return Ok(SecretString::from(secret));
        }
    }

    // 3. Plaintext in config
    if let Some(ref key) = profile.secret_key {
        return Ok(SecretString::from(key.clone()));
    }

    Err(ConfigError::NoCredentials {
        profile: profile_name.into(),
    })
}

/// Build a `DeviceConfig` from a profile, with no CLI flag overrides.
pub fn profile_to_device_config(
    profile: &Profile,
    profile_name: &str,
    defaults: &Defaults,
) -> Result<DeviceConfig, ConfigError> {
    if profile.host.trim().is_empty() {
        return Err(ConfigError::Validation {
            field: "host".into(),
            reason: format!("profile '{profile_name}' has no host"),
        });
    }
    let secret_key = resolve_secret_key(profile, profile_name)?;

    let mut config = DeviceConfig::new(profile.host.trim(), secret_key);
    if let Some(ref token_name) = profile.token_name {
        config.token_name.clone_from(token_name);
    }
    config.use_https = profile.use_https.unwrap_or(config.use_https);
    config.verify_ssl = profile.verify_ssl.unwrap_or(config.verify_ssl);
    config.use_websockets = profile.websockets.unwrap_or(config.use_websockets);
    if let Some(secs) = profile.retry_interval {
        if secs == 0 {
            return Err(ConfigError::Validation {
                field: "retry_interval".into(),
                reason: "must be at least 1 second".into(),
            });
        }
        config.retry_interval = Duration::from_secs(secs);
    }
    config.max_retries = profile.max_retries;
    config.http_timeout = Duration::from_secs(profile.timeout.unwrap_or(defaults.timeout));

    Ok(config)
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use figment::Jail;
    use pretty_assertions::assert_eq;
    use secrecy::ExposeSecret;

    use super::*;

    const SAMPLE: &str = r#"
        default_profile = "kitchen"

        [defaults]
        timeout = 12

        [profiles.kitchen]
        host = "192.168.1.40"
        secret_key = "plain-key"
        use_https = false
        max_retries = 3
        retry_interval = 10

        [profiles.porch]
        host = "192.168.1.41"
        secret_key_env = "PORCH_SWIDGET_KEY"
        secret_key = "fallback"
    "#;

    #[test]
    fn loads_profiles_from_toml() {
        Jail::expect_with(|jail| {
            jail.create_file("config.toml", SAMPLE)?;
            let config = load_config_from(&jail.directory().join("config.toml")).unwrap();

            let (name, profile) = config.profile(None).unwrap();
            assert_eq!(name, "kitchen");
            assert_eq!(profile.host, "192.168.1.40");
            assert_eq!(config.defaults.timeout, 12);
            assert_eq!(config.defaults.output, "table");
            Ok(())
        });
    }

    #[test]
    fn env_overrides_file() {
        Jail::expect_with(|jail| {
            jail.create_file("config.toml", SAMPLE)?;
            jail.set_env("SWIDGET_DEFAULTS__TIMEOUT", "99");
            jail.set_env("SWIDGET_DEFAULT_PROFILE", "porch");
            let config = load_config_from(&jail.directory().join("config.toml")).unwrap();

            assert_eq!(config.defaults.timeout, 99);
            assert_eq!(config.profile(None).unwrap().0, "porch");
            Ok(())
        });
    }

    #[test]
    fn missing_file_gives_defaults() {
        Jail::expect_with(|jail| {
            let config = load_config_from(&jail.directory().join("absent.toml")).unwrap();
            assert!(config.profiles.is_empty());
            assert_eq!(config.default_profile.as_deref(), Some("default"));
            assert!(matches!(config.profile(None), Err(ConfigError::UnknownProfile { .. })));
            Ok(())
        });
    }

    #[test]
    fn secret_env_var_wins_over_plaintext() {
        Jail::expect_with(|jail| {
            jail.set_env("PORCH_SWIDGET_KEY", "from-env");
            let profile = Profile {
                host: "10.0.0.2".into(),
                secret_key_env: Some("PORCH_SWIDGET_KEY".into()),
                secret_key: Some("fallback".into()),
                ..Profile::default()
            };
            let secret = resolve_secret_key(&profile, "swidget-test-porch").unwrap();
            assert_eq!(secret.expose_secret(), "from-env");
            Ok(())
        });
    }

    #[test]
    fn no_secret_anywhere_is_an_error() {
        let profile = Profile {
            host: "10.0.0.2".into(),
            ..Profile::default()
        };
        let err = resolve_secret_key(&profile, "swidget-test-nothing").unwrap_err();
        assert!(matches!(err, ConfigError::NoCredentials { .. }));
    }

    #[test]
    fn profile_becomes_device_config() {
        let profile = Profile {
            host: " 192.168.1.40 ".into(),
            secret_key: Some("plain-key".into()),
            use_https: Some(false),
            max_retries: Some(3),
            retry_interval: Some(10),
            websockets: Some(false),
            ..Profile::default()
        };
        let config = profile_to_device_config(&profile, "swidget-test-kitchen", &Defaults::default()).unwrap();

        assert_eq!(config.host, "192.168.1.40");
        assert_eq!(config.token_name, "x-secret-key");
        assert!(!config.use_https);
        assert!(!config.verify_ssl);
        assert!(!config.use_websockets);
        assert_eq!(config.max_retries, Some(3));
        assert_eq!(config.retry_interval, Duration::from_secs(10));
        assert_eq!(config.http_timeout, Duration::from_secs(30));
    }

    #[test]
    fn zero_retry_interval_is_rejected() {
        let profile = Profile {
            host: "10.0.0.2".into(),
            secret_key: Some("k".into()),
            retry_interval: Some(0),
            ..Profile::default()
        };
        let err = profile_to_device_config(&profile, "swidget-test-zero", &Defaults::default()).unwrap_err();
        assert!(matches!(err, ConfigError::Validation { ref field, .. } if field == "retry_interval"));
    }

    #[test]
    fn save_then_load() {
        Jail::expect_with(|jail| {
            let path = jail.directory().join("nested").join("config.toml");

            let mut config = Config::default();
            config.profiles.insert(
                "default".into(),
                Profile {
                    host: "10.0.0.3".into(),
                    secret_key_env: Some("MY_KEY".into()),
                    ..Profile::default()
                },
            );
            save_config_to(&config, &path).unwrap();

            let loaded = load_config_from(&path).unwrap();
            assert_eq!(loaded.profile(None).unwrap().1, config.profiles.get("default").unwrap());
            Ok(())
        });
    }
}
