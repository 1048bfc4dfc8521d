//! `swidget watch`: keep the socket open and print notifications as they arrive.

use std::sync::Arc;

use tokio::sync::mpsc;
use tracing::info;

use swidget_core::{ConnectionStatus, Device, DeviceConfig, StateDelta, Subscriber};

use crate::cli::{GlobalOpts, OutputFormat, WatchArgs};
use crate::error::CliError;
use crate::output;

fn render_delta(delta: &StateDelta, format: OutputFormat) -> String {
    match format {
        OutputFormat::Json | OutputFormat::JsonCompact | OutputFormat::Yaml => output::render_json(
            &serde_json::json!({ "kind": delta.kind.to_string(), "body": delta.body }),
            true,
        ),
        OutputFormat::Table | OutputFormat::Plain => {
            format!("[{}] {}", delta.kind, output::render_json(&delta.body, true))
        }
    }
}

pub async fn handle(mut config: DeviceConfig, args: &WatchArgs, global: &GlobalOpts) -> Result<(), CliError> {
    config.use_websockets = true;
    let device = Device::new(config)?;

    let (tx, mut rx) = mpsc::unbounded_channel::<Arc<StateDelta>>();
    device.subscribe(Subscriber::callback(move |delta| {
        let _ = tx.send(delta);
    }));

    if let Err(e) = device.start().await {
        device.close().await;
        return Err(e.into());
    }
    if !device.is_connected() && !global.quiet {
        eprintln!("Socket not connected yet; waiting for the device to accept a connection");
    }

    let mut status = device.watch_status();
    let ctrl_c = tokio::signal::ctrl_c();
    tokio::pin!(ctrl_c);
    let mut printed = 0usize;

    loop {
        tokio::select! {
            _ = &mut ctrl_c => break,
            changed = status.changed() => {
                if changed.is_err() {
                    break;
                }
                let now = *status.borrow_and_update();
                info!(host = %device.host(), status = %now, "socket status changed");
                if now == ConnectionStatus::Connected && !global.quiet {
                    eprintln!("Connected to {}", device.friendly_name());
                }
            }
            delta = rx.recv() => {
                let Some(delta) = delta else { break };
                output::print_output(&render_delta(&delta, global.output), global.quiet);
                printed += 1;
                if args.count.is_some_and(|n| printed >= n) {
                    break;
                }
            }
        }
    }

    device.unsubscribe();
    device.close().await;
    Ok(())
}

#[cfg(test)]
mod tests {
    use serde_json::json;
    use swidget_core::NotificationKind;

    use super::*;

    #[test]
    fn plain_lines_carry_the_kind() {
        let delta = StateDelta {
            kind: NotificationKind::DynamicUpdate,
            body: json!({ "connection": { "rssi": -61 } }),
        };
        assert_eq!(
            render_delta(&delta, OutputFormat::Plain),
            r#"[DYNAMIC_UPDATE] {"connection":{"rssi":-61}}"#
        );
        assert_eq!(
            render_delta(&delta, OutputFormat::Json),
            r#"{"body":{"connection":{"rssi":-61}},"kind":"DYNAMIC_UPDATE"}"#
        );
    }
}
