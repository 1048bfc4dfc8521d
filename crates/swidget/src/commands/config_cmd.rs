//! Config subcommand handlers.

use dialoguer::{Input, Select};

use swidget_config::{Config, Profile};

use crate::cli::{ConfigArgs, ConfigCommand, GlobalOpts};
use crate::commands::util::prompt_err;
use crate::config;
use crate::error::CliError;
use crate::output;

const REDACTED: &str = "********";

/// Hide plaintext secret keys before printing.
fn redact(cfg: &mut Config) {
    for profile in cfg.profiles.values_mut() {
        if profile.secret_key.is_some() {
            profile.secret_key = Some(REDACTED.into());
        }
    }
}

fn init(global: &GlobalOpts) -> Result<(), CliError> {
    let config_path = config::config_path(global);
    eprintln!("Swidget CLI configuration wizard");
    eprintln!("   Config path: {}\n", config_path.display());

    // 1. Profile name
    let profile_name: String = Input::new()
        .with_prompt("Profile name")
        .default("default".into())
        .interact_text()
        .map_err(prompt_err)?;

    // 2. Device address
    let host: String = Input::new()
        .with_prompt("Device address (IP or hostname)")
        .interact_text()
        .map_err(prompt_err)?;
    if host.trim().is_empty() {
        return Err(CliError::Validation {
            field: "host".into(),
            reason: "device address cannot be empty".into(),
        });
    }

    // 3. Transport
    let scheme_choices = &["HTTPS (recommended)", "Plain HTTP (older firmware)"];
    let scheme_selection = Select::new()
        .with_prompt("How does the device talk?")
        .items(scheme_choices)
        .default(0)
        .interact()
        .map_err(prompt_err)?;

    // 4. Secret key
    let key = rpassword::prompt_password("Secret key: ").map_err(prompt_err)?;
    if key.is_empty() {
        return Err(CliError::Validation {
            field: "secret_key".into(),
            reason: "secret key cannot be empty".into(),
        });
    }

    let store_choices = &["Store in system keyring (recommended)", "Save to config file (plaintext)"];
    let store_selection = Select::new()
        .with_prompt("Where to store the secret key?")
        .items(store_choices)
        .default(0)
        .interact()
        .map_err(prompt_err)?;

    let secret_key = if store_selection == 0 {
        swidget_config::store_secret_key(&profile_name, &key)?;
        eprintln!("   ✓ Secret key stored in system keyring");
        None
    } else {
        Some(key)
    };

    // 5. Merge into the existing config
    let mut cfg = config::load_config(global)?;
    cfg.profiles.insert(
        profile_name.clone(),
        Profile {
            host: host.trim().to_owned(),
            secret_key,
            use_https: (scheme_selection == 1).then_some(false),
            ..Profile::default()
        },
    );
    cfg.default_profile = Some(profile_name.clone());

    swidget_config::save_config_to(&cfg, &config_path)?;

    eprintln!("\n✓ Configuration written to {}", config_path.display());
    eprintln!("  Active profile: {profile_name}");
    eprintln!("\n  Test it: swidget state");
    Ok(())
}

fn show(global: &GlobalOpts) -> Result<(), CliError> {
    let mut cfg = config::load_config(global)?;
    redact(&mut cfg);

    let detail = toml::to_string_pretty(&cfg).map_err(|e| CliError::Validation {
        field: "config".into(),
        reason: format!("failed to serialize config: {e}"),
    })?;
    let out = output::render_single(
        global.output,
        &cfg,
        |_| detail.trim_end().to_owned(),
        |c| {
            let mut names: Vec<&str> = c.profiles.keys().map(String::as_str).collect();
            names.sort_unstable();
            names.join("\n")
        },
    );
    output::print_output(&out, global.quiet);
    Ok(())
}

// ── Handler ─────────────────────────────────────────────────────────

pub fn handle(args: ConfigArgs, global: &GlobalOpts) -> Result<(), CliError> {
    match args.command {
        ConfigCommand::Init => init(global),
        ConfigCommand::Show => show(global),
        ConfigCommand::Path => {
            println!("{}", config::config_path(global).display());
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn redact_hides_plaintext_keys_only() {
        let mut cfg = Config::default();
        cfg.profiles.insert(
            "kitchen".into(),
            Profile {
                host: "10.0.0.4".into(),
                secret_key: Some("hunter2".into()),
                ..Profile::default()
            },
        );
        cfg.profiles.insert(
            "porch".into(),
            Profile {
                host: "10.0.0.5".into(),
                secret_key_env: Some("PORCH_KEY".into()),
                ..Profile::default()
            },
        );

        redact(&mut cfg);

        assert_eq!(cfg.profiles["kitchen"].secret_key.as_deref(), Some(REDACTED));
        assert_eq!(cfg.profiles["porch"].secret_key, None);
        assert_eq!(cfg.profiles["porch"].secret_key_env.as_deref(), Some("PORCH_KEY"));
    }
}
