//! Command-line interface definitions and helpers.
//!
//! This module contains CLI argument parsing and the subcommand handlers.

mod args;
mod commands;

pub use args::{Args, Command, ConfigAction, ListenArgs};
pub use commands::{
    ctrlc_received, describe_config, handle_config_action, init_config, list_cameras,
    list_platform_cameras, listen, setup_ctrlc_handler, CommandError, PrintObserver,
};
