//! `swidget wifi join`: provision a device that is in access-point mode.

use std::io::IsTerminal;

use dialoguer::Input;
use secrecy::{ExposeSecret, SecretString};
use serde::Serialize;

use swidget_config::Profile;
use swidget_core::{ProvisionPolicy, ProvisionRequest, Provisioned, provision_wifi};

use crate::cli::{GlobalOpts, JoinArgs, WifiArgs, WifiCommand};
use crate::commands::util;
use crate::config;
use crate::error::CliError;
use crate::output;

#[derive(Debug, Serialize)]
struct Joined {
    ip: String,
    mac: String,
    profile: Option<String>,
}

fn ask_text(value: Option<String>, prompt: &str, field: &str, interactive: bool) -> Result<String, CliError> {
    if let Some(v) = value {
        return Ok(v);
    }
    if !interactive {
        return Err(CliError::Validation {
            field: field.into(),
            reason: "required when stdin is not a terminal".into(),
        });
    }
    Input::<String>::new()
        .with_prompt(prompt)
        .interact_text()
        .map_err(util::prompt_err)
}

fn ask_secret(value: Option<String>, prompt: &str, field: &str, interactive: bool) -> Result<SecretString, CliError> {
    if let Some(v) = value {
        return Ok(SecretString::from(v));
    }
    if !interactive {
        return Err(CliError::Validation {
            field: field.into(),
            reason: "required when stdin is not a terminal".into(),
        });
    }
    rpassword::prompt_password(prompt)
        .map(SecretString::from)
        .map_err(util::prompt_err)
}

fn build_request(args: JoinArgs, interactive: bool) -> Result<ProvisionRequest, CliError> {
    let ssid = ask_text(args.ssid, "Network SSID", "ssid", interactive)?;
    let network_password = ask_secret(args.network_password, "Network password: ", "network-password", interactive)?;
    let secret_key = ask_secret(
        args.new_secret_key,
        "Device secret key (empty lets the device pick one): ",
        "new-secret-key",
        interactive,
    )?;
    let device_name = ask_text(args.device_name, "Device name", "device-name", interactive)?;

    if ssid.trim().is_empty() {
        return Err(CliError::Validation {
            field: "ssid".into(),
            reason: "cannot be empty".into(),
        });
    }
    Ok(ProvisionRequest {
        device_name,
        ssid,
        network_password,
        secret_key,
    })
}

/// Store the provisioned device as a profile, preferring the keyring for the key.
fn save_profile(name: &str, provisioned: &Provisioned, global: &GlobalOpts) -> Result<(), CliError> {
    let path = config::config_path(global);
    let mut cfg = config::load_config(global)?;

    let key = provisioned.secret_key.expose_secret();
    let plaintext = match swidget_config::store_secret_key(name, key) {
        Ok(()) => None,
        Err(e) => {
            tracing::warn!(error = %e, "keyring unavailable, saving secret key in the config file");
            Some(key.to_owned())
        }
    };

    cfg.profiles.insert(
        name.to_owned(),
        Profile {
            host: provisioned.ip.clone(),
            secret_key: plaintext,
            ..Profile::default()
        },
    );
    if cfg.profiles.len() == 1 {
        cfg.default_profile = Some(name.to_owned());
    }
    swidget_config::save_config_to(&cfg, &path)?;
    Ok(())
}

pub async fn handle(args: WifiArgs, global: &GlobalOpts) -> Result<(), CliError> {
    match args.command {
        WifiCommand::Join(join) => {
            let interactive = std::io::stdin().is_terminal();
            let save_as = join.save_profile.clone();
            let request = build_request(join, interactive)?;

            if !util::confirm(
                "Is this machine joined to the device's \"Swidget-\" Wi-Fi network?",
                "wifi join",
                global.yes,
            )? {
                return Ok(());
            }

            if !global.quiet {
                eprintln!("Sending Wi-Fi credentials for '{}' to {}", request.ssid, request.device_name);
            }
            let provisioned = provision_wifi(&request, ProvisionPolicy::default()).await?;

            if let Some(ref name) = save_as {
                save_profile(name, &provisioned, global)?;
                if !global.quiet {
                    eprintln!("✓ Saved profile '{name}'");
                }
            }

            let joined = Joined {
                ip: provisioned.ip.clone(),
                mac: provisioned.mac.clone(),
                profile: save_as,
            };
            let out = output::render_single(
                global.output,
                &joined,
                |j| {
                    format!(
                        "✓ Device joined the network at {} (MAC {})\n  Keep its secret key: it is needed for every request.",
                        j.ip, j.mac
                    )
                },
                |j| j.ip.clone(),
            );
            output::print_output(&out, global.quiet);
            Ok(())
        }
    }
}
