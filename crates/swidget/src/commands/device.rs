//! Device-bound command handlers.
//!
//! Each handler is a one-shot: load the state over HTTP, do one thing,
//! close. Only `watch` keeps a socket open.

use std::collections::BTreeMap;

use serde::Serialize;
use serde_json::Value;

use swidget_core::{Device, DeviceConfig, DeviceType, HwInfo, InsertType};

use crate::cli::{BrightnessArgs, GlobalOpts, RawCommandArgs, TimerArgs};
use crate::commands::util;
use crate::error::CliError;
use crate::output;

// ── State ────────────────────────────────────────────────────────────

#[derive(Debug, Serialize)]
struct StateReport {
    name: String,
    host: String,
    model: Option<String>,
    device_type: DeviceType,
    insert_type: InsertType,
    on: bool,
    brightness: Option<i64>,
    version: Option<String>,
    mac: Option<String>,
    rssi: Option<i64>,
    realtime_values: BTreeMap<String, Value>,
    host_features: Vec<String>,
    insert_features: Vec<String>,
}

impl StateReport {
    fn capture(device: &Device) -> Self {
        let state = device.snapshot();
        Self {
            name: device.friendly_name(),
            host: device.host().to_owned(),
            model: state.model.clone(),
            device_type: state.device_type,
            insert_type: state.insert_type,
            on: state.is_on(),
            brightness: state.brightness().filter(|_| device.dimmer().is_ok()),
            version: state.version.clone(),
            mac: state.mac.clone(),
            rssi: state.rssi,
            realtime_values: device.realtime_values(),
            host_features: device.host_features(),
            insert_features: device.insert_features(),
        }
    }
}

fn state_detail(report: &StateReport, color: bool) -> String {
    let mut out = Vec::new();
    out.push(output::heading(
        &format!("== {} - {} ==", report.name, report.model.as_deref().unwrap_or("unknown model")),
        color,
    ));

    let mut general = vec![
        ("Host", report.host.clone()),
        ("Device state", output::on_off(report.on, color)),
        ("Type", format!("{} w/{} insert", report.device_type, report.insert_type)),
        ("Software version", report.version.clone().unwrap_or_default()),
        (
            "MAC (rssi)",
            format!(
                "{} ({})",
                report.mac.as_deref().unwrap_or("?"),
                report.rssi.map_or_else(|| "?".into(), |r| r.to_string())
            ),
        ),
    ];
    if let Some(level) = report.brightness {
        general.push(("Brightness", level.to_string()));
    }
    out.push(output::render_pairs(&general));

    if !report.realtime_values.is_empty() {
        out.push(output::heading("== Realtime values ==", color));
        let values: Vec<(String, String)> = report
            .realtime_values
            .iter()
            .map(|(k, v)| (k.clone(), display_value(v)))
            .collect();
        out.push(output::render_pairs(&values));
    }

    out.push(output::heading("== Host features ==", color));
    out.push(feature_list(&report.host_features));
    out.push(output::heading("== Insert features ==", color));
    out.push(feature_list(&report.insert_features));
    out.join("\n")
}

fn feature_list(features: &[String]) -> String {
    if features.is_empty() {
        return "  (none)".into();
    }
    features.iter().map(|f| format!("  {f}")).collect::<Vec<_>>().join("\n")
}

fn display_value(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

pub async fn state(config: DeviceConfig, global: &GlobalOpts) -> Result<(), CliError> {
    let report = Device::oneshot(config, |device| async move { Ok(StateReport::capture(&device)) }).await?;
    let color = output::should_color(global.color);
    let out = output::render_single(
        global.output,
        &report,
        |r| state_detail(r, color),
        |r| if r.on { "on".into() } else { "off".into() },
    );
    output::print_output(&out, global.quiet);
    Ok(())
}

// ── Hardware info ────────────────────────────────────────────────────

fn hwinfo_detail(info: &HwInfo) -> String {
    let pairs = [
        ("Model", info.model.clone().unwrap_or_default()),
        ("Type", info.device_type.to_string()),
        ("Insert", info.insert_type.to_string()),
        ("Id", info.id.clone().unwrap_or_default()),
        ("MAC", info.mac_address.clone().unwrap_or_default()),
        ("Version", info.version.clone().unwrap_or_default()),
        ("RSSI", info.rssi.map(|r| r.to_string()).unwrap_or_default()),
        ("Host features", info.host_features.join(", ")),
        ("Insert features", info.insert_features.join(", ")),
    ];
    output::render_pairs(&pairs)
}

pub async fn hwinfo(config: DeviceConfig, global: &GlobalOpts) -> Result<(), CliError> {
    let info = Device::oneshot(config, |device| async move { Ok(device.hw_info()) }).await?;
    let out = output::render_single(global.output, &info, hwinfo_detail, |i| {
        i.mac_address.clone().unwrap_or_default()
    });
    output::print_output(&out, global.quiet);
    Ok(())
}

// ── Power ────────────────────────────────────────────────────────────

pub async fn power(config: DeviceConfig, on: bool, global: &GlobalOpts) -> Result<(), CliError> {
    let quiet = global.quiet;
    Device::oneshot(config, |device| async move {
        if !quiet {
            eprintln!("Turning {} {}", if on { "on" } else { "off" }, device.friendly_name());
        }
        if on { device.turn_on().await } else { device.turn_off().await }
    })
    .await?;
    Ok(())
}

// ── Capabilities ─────────────────────────────────────────────────────

pub async fn brightness(config: DeviceConfig, args: &BrightnessArgs, global: &GlobalOpts) -> Result<(), CliError> {
    let (level, as_default, quiet) = (args.level, args.default, global.quiet);
    let current = Device::oneshot(config, |device| async move {
        let dimmer = device.dimmer()?;
        match level {
            Some(level) if as_default => {
                if !quiet {
                    eprintln!("Setting default brightness to {level}");
                }
                dimmer.set_default_brightness(level).await?;
            }
            Some(level) => {
                if !quiet {
                    eprintln!("Setting brightness to {level}");
                }
                dimmer.set_brightness(level).await?;
            }
            None => {}
        }
        Ok(dimmer.brightness())
    })
    .await?;

    if level.is_none() {
        let out = output::render_single(
            global.output,
            &serde_json::json!({ "brightness": current }),
            |_| format!("Brightness: {}", current.map_or_else(|| "unknown".into(), |b| b.to_string())),
            |_| current.map(|b| b.to_string()).unwrap_or_default(),
        );
        output::print_output(&out, global.quiet);
    }
    Ok(())
}

pub async fn timer(config: DeviceConfig, args: &TimerArgs, global: &GlobalOpts) -> Result<(), CliError> {
    let (minutes, quiet) = (args.minutes, global.quiet);
    Device::oneshot(config, |device| async move {
        let timer = device.timer_switch()?;
        if !quiet {
            eprintln!("Turning off {} in {minutes} minute(s)", device.friendly_name());
        }
        timer.set_countdown_timer(minutes).await
    })
    .await?;
    Ok(())
}

// ── Raw command ──────────────────────────────────────────────────────

pub async fn raw_command(config: DeviceConfig, args: &RawCommandArgs, global: &GlobalOpts) -> Result<(), CliError> {
    let payload = util::parse_json_arg("command", &args.command)?;
    let (assembly, component, function) = (args.assembly.clone(), args.component.clone(), args.function.clone());

    let result = Device::oneshot(config, |device| async move {
        device.send_command(&assembly, &component, &function, payload).await
    })
    .await?;

    let out = output::render_single(
        global.output,
        &result,
        |v| output::render_json(v, false),
        |v| output::render_json(v, true),
    );
    output::print_output(&out, global.quiet);
    Ok(())
}

// ── Maintenance ──────────────────────────────────────────────────────

pub async fn blink(config: DeviceConfig, global: &GlobalOpts) -> Result<(), CliError> {
    if !global.quiet {
        eprintln!("Requesting the device to blink");
    }
    Device::oneshot(config, |device| async move { device.blink().await }).await?;
    Ok(())
}

pub async fn enable_debug_server(config: DeviceConfig, global: &GlobalOpts) -> Result<(), CliError> {
    let enabled = Device::oneshot(config, |device| async move { device.enable_debug_server().await }).await?;
    if !enabled {
        return Err(CliError::ApiError {
            code: "debug_server".into(),
            message: "device refused to enable the debug server".into(),
        });
    }
    if !global.quiet {
        eprintln!("Debug server enabled");
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    fn report() -> StateReport {
        StateReport {
            name: "Kitchen".into(),
            host: "10.0.0.4".into(),
            model: Some("SW-DIM-1".into()),
            device_type: DeviceType::from_tag("dimmer"),
            insert_type: InsertType::from_tag("USB"),
            on: true,
            brightness: Some(40),
            version: Some("1.4.2".into()),
            mac: Some("aabbccddeeff".into()),
            rssi: Some(-52),
            realtime_values: BTreeMap::from([("power".to_string(), json!(12.5))]),
            host_features: vec!["toggle".into(), "level".into()],
            insert_features: vec![],
        }
    }

    #[test]
    fn detail_lists_sections() {
        let text = state_detail(&report(), false);
        assert!(text.starts_with("== Kitchen - SW-DIM-1 =="));
        assert!(text.contains("aabbccddeeff (-52)"));
        assert!(text.contains("12.5"));
        assert!(text.contains("  level"));
        assert!(text.contains("(none)"));
    }

    #[test]
    fn string_values_are_unquoted() {
        assert_eq!(display_value(&json!("on")), "on");
        assert_eq!(display_value(&json!(3)), "3");
    }
}
