//! `swidget discover`: SSDP search for devices on the local network.

use std::time::Duration;

use indicatif::{ProgressBar, ProgressStyle};
use serde::Serialize;
use tabled::Tabled;

use swidget_core::{DiscoveredDevice, discover_devices};

use crate::cli::{DiscoverArgs, GlobalOpts, OutputFormat};
use crate::error::CliError;
use crate::output;

#[derive(Debug, Serialize)]
struct Found {
    host: String,
    mac: String,
    name: String,
    host_type: Option<String>,
    insert_type: Option<String>,
}

impl From<DiscoveredDevice> for Found {
    fn from(d: DiscoveredDevice) -> Self {
        Self {
            host: d.host,
            mac: d.mac,
            name: d.friendly_name,
            host_type: d.host_type,
            insert_type: d.insert_type,
        }
    }
}

#[derive(Tabled)]
struct FoundRow {
    #[tabled(rename = "Host")]
    host: String,
    #[tabled(rename = "MAC")]
    mac: String,
    #[tabled(rename = "Name")]
    name: String,
    #[tabled(rename = "Type")]
    kind: String,
}

impl From<&Found> for FoundRow {
    fn from(f: &Found) -> Self {
        let kind = match (&f.host_type, &f.insert_type) {
            (Some(h), Some(i)) => format!("{h}+{i}"),
            (Some(h), None) => h.clone(),
            _ => String::new(),
        };
        Self {
            host: f.host.clone(),
            mac: f.mac.clone(),
            name: f.name.clone(),
            kind,
        }
    }
}

fn spinner(timeout: u64, enabled: bool) -> Option<ProgressBar> {
    if !enabled {
        return None;
    }
    let bar = ProgressBar::new_spinner();
    if let Ok(style) = ProgressStyle::with_template("{spinner} {msg}") {
        bar.set_style(style);
    }
    bar.set_message(format!("Discovering devices via SSDP... waiting up to {timeout} seconds"));
    bar.enable_steady_tick(Duration::from_millis(120));
    Some(bar)
}

pub async fn handle(args: &DiscoverArgs, global: &GlobalOpts) -> Result<(), CliError> {
    let interactive = matches!(global.output, OutputFormat::Table) && !global.quiet;
    let bar = spinner(args.timeout, interactive);

    let result = discover_devices(Duration::from_secs(args.timeout)).await;
    if let Some(bar) = bar {
        bar.finish_and_clear();
    }

    let found: Vec<Found> = result?.into_values().map(Found::from).collect();
    tracing::info!(count = found.len(), "discovery finished");

    if found.is_empty() && interactive {
        eprintln!("No Swidget devices answered");
        return Ok(());
    }

    let out = output::render_list(global.output, &found, |f| FoundRow::from(f), |f| f.host.clone());
    output::print_output(&out, global.quiet);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn type_column_joins_host_and_insert() {
        let found = Found::from(DiscoveredDevice {
            mac: "aabbccddeeff".into(),
            host: "10.0.0.4".into(),
            friendly_name: "Kitchen".into(),
            host_type: Some("dimmer".into()),
            insert_type: Some("USB".into()),
        });
        let row = FoundRow::from(&found);
        assert_eq!(row.kind, "dimmer+USB");
        assert_eq!(row.name, "Kitchen");
    }
}
