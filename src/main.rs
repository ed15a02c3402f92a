use clap::Parser;

use shop_scanner::cli::{self, Args, Command};
use shop_scanner::config::{self, Config};

fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn")).init();

    let args = Args::parse();

    if let Err(e) = run(args) {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }
}

fn run(args: Args) -> Result<(), String> {
    let config_path = args.config.clone().unwrap_or_else(config::default_path);

    if let Some(Command::Config { action }) = &args.command {
        return cli::handle_config_action(action.clone(), &config_path).map_err(|e| {
            if matches!(e, cli::CommandError::ConfigExists(_)) {
                format!("{}\nUse 'shop-scanner config show' to view current settings.", e)
            } else {
                e.to_string()
            }
        });
    }

    let rt = tokio::runtime::Runtime::new()
        .map_err(|e| format!("Failed to create async runtime: {}", e))?;

    if let Some(Command::ListCameras) = &args.command {
        return rt
            .block_on(cli::list_platform_cameras())
            .map_err(|e| e.to_string());
    }

    let Some(listen) = args.listen_args() else {
        return Ok(());
    };

    let config = Config::load(Some(&config_path)).map_err(|e| e.to_string())?;
    cli::setup_ctrlc_handler().map_err(|e| format!("Failed to set Ctrl+C handler: {}", e))?;

    log::debug!("loaded config from {}", config_path.display());
    rt.block_on(cli::listen(&listen, config))
        .map_err(|e| e.to_string())
}
