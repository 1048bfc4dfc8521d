//! Command dispatch: bridges CLI args -> device operations -> output formatting.

pub mod config_cmd;
pub mod device;
pub mod discover;
pub mod util;
pub mod watch;
pub mod wifi;

use swidget_core::DeviceConfig;

use crate::cli::{Command, GlobalOpts};
use crate::error::CliError;

/// Dispatch a device-bound command to the appropriate handler.
pub async fn dispatch(cmd: Command, config: DeviceConfig, global: &GlobalOpts) -> Result<(), CliError> {
    match cmd {
        Command::State => device::state(config, global).await,
        Command::Hwinfo => device::hwinfo(config, global).await,
        Command::On => device::power(config, true, global).await,
        Command::Off => device::power(config, false, global).await,
        Command::Brightness(args) => device::brightness(config, &args, global).await,
        Command::Timer(args) => device::timer(config, &args, global).await,
        Command::RawCommand(args) => device::raw_command(config, &args, global).await,
        Command::Blink => device::blink(config, global).await,
        Command::EnableDebugServer => device::enable_debug_server(config, global).await,
        Command::Watch(args) => watch::handle(config, &args, global).await,
        // Handled before dispatch
        Command::Discover(_) | Command::Wifi(_) | Command::Config(_) | Command::Completions(_) => unreachable!(),
    }
}
