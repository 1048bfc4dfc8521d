//! Flag-aware configuration: layers `--host`, `--secret-key` and friends
//! over the profiles loaded by `swidget-config`.
//!
//! Core never sees these types -- it receives a pre-built `DeviceConfig`.

use std::path::PathBuf;
use std::time::Duration;

use secrecy::SecretString;

use swidget_config::{Config, Profile};
use swidget_core::DeviceConfig;

use crate::cli::GlobalOpts;
use crate::error::CliError;

// ── Loading ──────────────────────────────────────────────────────────

/// Config file path: `--config` when given, else the platform default.
pub fn config_path(global: &GlobalOpts) -> PathBuf {
    global.config.clone().unwrap_or_else(swidget_config::config_path)
}

/// Load the config file (missing files yield defaults).
pub fn load_config(global: &GlobalOpts) -> Result<Config, CliError> {
    Ok(swidget_config::load_config_from(&config_path(global))?)
}

/// Resolve the active profile name from CLI flags and config.
pub fn active_profile_name(global: &GlobalOpts, config: &Config) -> String {
    global
        .profile
        .clone()
        .or_else(|| config.default_profile.clone())
        .unwrap_or_else(|| "default".into())
}

fn available_profiles(config: &Config) -> String {
    let mut names: Vec<&str> = config.profiles.keys().map(String::as_str).collect();
    if names.is_empty() {
        return "(none)".into();
    }
    names.sort_unstable();
    names.join(", ")
}

// ── DeviceConfig resolution ──────────────────────────────────────────

/// Build the `DeviceConfig` for a device-bound command.
///
/// Precedence: flags and `SWIDGET_*` env vars, then the active profile.
/// Without a profile, `--host` and `--secret-key` must both be given.
pub fn resolve_device_config(global: &GlobalOpts) -> Result<DeviceConfig, CliError> {
    let cfg = load_config(global)?;
    let profile_name = active_profile_name(global, &cfg);

    let mut device = if let Some(profile) = cfg.profiles.get(&profile_name) {
        from_profile(profile, &profile_name, &cfg, global)?
    } else {
        if global.profile.is_some() {
            return Err(CliError::ProfileNotFound {
                name: profile_name,
                available: available_profiles(&cfg),
            });
        }
        from_flags(global, &profile_name, &config_path(global))?
    };

    if global.http {
        device.use_https = false;
    }
    if global.verify_ssl {
        device.verify_ssl = true;
    }
    if let Some(secs) = global.timeout {
        device.http_timeout = Duration::from_secs(secs);
    }

    tracing::debug!(host = %device.host, profile = %profile_name, "resolved device config");
    Ok(device)
}

fn from_profile(
    profile: &Profile,
    profile_name: &str,
    cfg: &Config,
    global: &GlobalOpts,
) -> Result<DeviceConfig, CliError> {
    // Flags win over the stored host and key.
    let mut profile = profile.clone();
    if let Some(ref host) = global.host {
        profile.host.clone_from(host);
    }
    if let Some(ref key) = global.secret_key {
        profile.secret_key = Some(key.clone());
        profile.secret_key_env = None;
    }

    let mut device = swidget_config::profile_to_device_config(&profile, profile_name, &cfg.defaults)?;
    // The keyring sits ahead of plaintext in the profile chain.
    if let Some(ref key) = global.secret_key {
        device.secret_key = SecretString::from(key.clone());
    }
    Ok(device)
}

fn from_flags(global: &GlobalOpts, profile_name: &str, path: &std::path::Path) -> Result<DeviceConfig, CliError> {
    let host = global
        .host
        .as_deref()
        .map(str::trim)
        .filter(|h| !h.is_empty())
        .ok_or_else(|| CliError::NoConfig {
            path: path.display().to_string(),
        })?;

    let key = global.secret_key.clone().ok_or_else(|| CliError::NoCredentials {
        profile: profile_name.into(),
    })?;

    Ok(DeviceConfig::new(host, SecretString::from(key)))
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use clap::Parser;
    use secrecy::ExposeSecret;

    use super::*;
    use crate::cli::Cli;

    fn write_config(dir: &tempfile::TempDir, body: &str) -> String {
        let path = dir.path().join("config.toml");
        std::fs::write(&path, body).unwrap();
        path.display().to_string()
    }

    fn global(args: &[&str]) -> GlobalOpts {
        let mut argv = vec!["swidget"];
        argv.extend_from_slice(args);
        argv.push("state");
        Cli::try_parse_from(argv).unwrap().global
    }

    #[test]
    fn flags_alone_build_a_config() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("missing.toml").display().to_string();
        let g = global(&["--config", &path, "--host", "10.0.0.9", "--secret-key", "abc", "--http"]);

        let device = resolve_device_config(&g).unwrap();
        assert_eq!(device.host, "10.0.0.9");
        assert_eq!(device.secret_key.expose_secret(), "abc");
        assert!(!device.use_https);
    }

    #[test]
    fn missing_host_reports_config_path() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("missing.toml").display().to_string();
        let g = global(&["--config", &path]);

        let err = resolve_device_config(&g).unwrap_err();
        assert!(matches!(err, CliError::NoConfig { path: ref p } if p.ends_with("missing.toml")));
    }

    #[test]
    fn flags_override_profile() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_config(
            &dir,
            r#"
                default_profile = "kitchen"

                [profiles.kitchen]
                host = "192.168.1.40"
                secret_key = "stored"
                timeout = 9
            "#,
        );
        let g = global(&["--config", &path, "--secret-key", "flag-key", "--timeout", "3"]);

        let device = resolve_device_config(&g).unwrap();
        assert_eq!(device.host, "192.168.1.40");
        assert_eq!(device.secret_key.expose_secret(), "flag-key");
        assert_eq!(device.http_timeout, Duration::from_secs(3));
    }

    #[test]
    fn unknown_profile_lists_available() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_config(
            &dir,
            r#"
                [profiles.porch]
                host = "192.168.1.41"
                secret_key = "k"

                [profiles.attic]
                host = "192.168.1.42"
                secret_key = "k"
            "#,
        );
        let g = global(&["--config", &path, "--profile", "garage"]);

        let err = resolve_device_config(&g).unwrap_err();
        assert!(matches!(err, CliError::ProfileNotFound { ref available, .. } if available == "attic, porch"));
    }
}
