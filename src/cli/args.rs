//! CLI argument parsing with clap.

use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// Unified barcode input for a retail counter: camera plus keyboard-wedge scanners
#[derive(Parser, Debug)]
#[command(name = "shop-scanner")]
#[command(version, about = "Camera and HID keyboard-wedge barcode scanning", long_about = None)]
pub struct Args {
    #[command(subcommand)]
    pub command: Option<Command>,

    /// Config file path
    #[arg(long, short, global = true)]
    pub config: Option<PathBuf>,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Listen for scans and print each code on its own line
    #[command(after_help = "EXAMPLES:
    shop-scanner listen                      # Keyboard-wedge scanners only
    shop-scanner listen --camera             # Also scan with the default camera
    shop-scanner listen --camera --device /dev/video2")]
    Listen(ListenArgs),
    /// List available cameras
    ListCameras,
    /// Configuration management
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(clap::Args, Debug, Clone, Default, PartialEq, Eq)]
pub struct ListenArgs {
    /// Start the camera immediately
    #[arg(long)]
    pub camera: bool,

    /// Camera device id (from list-cameras); overrides the config file
    #[arg(long, short)]
    pub device: Option<String>,

    /// Ignore keystrokes instead of detecting wedge scanners
    #[arg(long)]
    pub no_auto_detect: bool,
}

#[derive(Subcommand, Debug, Clone)]
pub enum ConfigAction {
    /// Show current configuration
    Show,
    /// Create default config file
    Init,
}

impl Args {
    /// Listen options; running without a subcommand listens with defaults.
    pub fn listen_args(&self) -> Option<ListenArgs> {
        match &self.command {
            None => Some(ListenArgs::default()),
            Some(Command::Listen(listen)) => Some(listen.clone()),
            Some(_) => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_args_defaults() {
        let args = Args::parse_from(["shop-scanner"]);
        assert!(args.command.is_none());
        assert!(args.config.is_none());
        assert_eq!(args.listen_args(), Some(ListenArgs::default()));
    }

    #[test]
    fn test_args_listen_flags() {
        let args = Args::parse_from([
            "shop-scanner",
            "listen",
            "--camera",
            "--device",
            "/dev/video2",
            "--no-auto-detect",
        ]);
        let listen = args.listen_args().unwrap();
        assert!(listen.camera);
        assert_eq!(listen.device.as_deref(), Some("/dev/video2"));
        assert!(listen.no_auto_detect);
    }

    #[test]
    fn test_args_listen_short_device() {
        let args = Args::parse_from(["shop-scanner", "listen", "-d", "0"]);
        assert_eq!(args.listen_args().unwrap().device, Some("0".to_string()));
    }

    #[test]
    fn test_args_config_option_is_global() {
        let args = Args::parse_from(["shop-scanner", "--config", "/tmp/config.toml"]);
        assert_eq!(args.config, Some(PathBuf::from("/tmp/config.toml")));

        let args = Args::parse_from(["shop-scanner", "listen", "-c", "/tmp/test.toml"]);
        assert_eq!(args.config, Some(PathBuf::from("/tmp/test.toml")));
    }

    #[test]
    fn test_args_list_cameras_subcommand() {
        let args = Args::parse_from(["shop-scanner", "list-cameras"]);
        assert!(matches!(args.command, Some(Command::ListCameras)));
        assert!(args.listen_args().is_none());
    }

    #[test]
    fn test_args_config_show_subcommand() {
        let args = Args::parse_from(["shop-scanner", "config", "show"]);
        match args.command {
            Some(Command::Config {
                action: ConfigAction::Show,
            }) => (),
            _ => panic!("Expected Config Show subcommand"),
        }
    }

    #[test]
    fn test_args_config_init_subcommand() {
        let args = Args::parse_from(["shop-scanner", "config", "init"]);
        match args.command {
            Some(Command::Config {
                action: ConfigAction::Init,
            }) => (),
            _ => panic!("Expected Config Init subcommand"),
        }
    }

    #[test]
    fn test_args_rejects_unknown_flag() {
        assert!(Args::try_parse_from(["shop-scanner", "listen", "--torch"]).is_err());
    }
}
