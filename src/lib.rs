pub mod cli;
pub mod commands;
pub mod error;
pub mod models;
pub mod platform;
pub mod settings;
pub mod state;
pub mod utils;

use clap::Parser;
use std::process::ExitCode;

pub use crate::commands::cleanup::{CleanupEngine, CleanupLocations};
pub use crate::commands::parser::parse_packages;
pub use crate::commands::process::{ProcessGateway, ProcessOutcome, StreamOutput, StreamSource};
pub use crate::commands::residuals::{ResidualScanner, ScanRoots};
pub use crate::commands::uninstall::{preview_uninstall, uninstall_with_residuals};
pub use crate::commands::updates::merge_updates;
pub use crate::commands::winget::PackageManager;
pub use crate::error::{CoreError, CoreResult};
pub use crate::settings::Settings;

const APP_DIR: &str = "wingetsweep";

fn init_logging(verbose: bool) {
    let default_level = if cfg!(debug_assertions) {
        "trace"
    } else {
        "info"
    };
    let mut builder =
        env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(default_level));
    if verbose {
        builder.filter_level(log::LevelFilter::Debug);
    }
    if let Err(e) = builder.try_init() {
        eprintln!("Failed to initialise logging: {}", e);
    }
}

fn install_panic_hook() {
    std::panic::set_hook(Box::new(|panic_info| {
        let message = if let Some(s) = panic_info.payload().downcast_ref::<&str>() {
            s.to_string()
        } else if let Some(s) = panic_info.payload().downcast_ref::<String>() {
            s.clone()
        } else {
            "Unknown panic message".to_string()
        };
        let location = panic_info
            .location()
            .map(|l| format!("{}:{}:{}", l.file(), l.line(), l.column()))
            .unwrap_or_else(|| "unknown location".to_string());

        log::error!("PANIC: {} at {}", message, location);
        eprintln!("PANIC: {} at {}", message, location);

        // Try to write to log file if possible
        if let Some(log_dir) = dirs::data_local_dir().map(|dir| dir.join(APP_DIR).join("logs")) {
            if std::fs::create_dir_all(&log_dir).is_err() {
                return;
            }
            if let Ok(mut log_file) = std::fs::OpenOptions::new()
                .create(true)
                .append(true)
                .open(log_dir.join("panic.log"))
            {
                use std::io::Write;
                let _ = writeln!(
                    log_file,
                    "[{}] PANIC: {} at {}",
                    chrono::Utc::now().format("%Y-%m-%d %H:%M:%S"),
                    message,
                    location
                );
            }
        }
    }));
}

/// Entry point of the `wingetsweep` binary.
pub fn run() -> ExitCode {
    let cli = cli::Cli::parse();
    init_logging(cli.verbose);
    install_panic_hook();

    let runtime = match tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
    {
        Ok(runtime) => runtime,
        Err(e) => {
            eprintln!("Error: failed to start the async runtime: {}", e);
            return ExitCode::FAILURE;
        }
    };

    match runtime.block_on(cli::run(cli)) {
        Ok(true) => ExitCode::SUCCESS,
        Ok(false) => ExitCode::FAILURE,
        Err(e) => {
            eprintln!("Error: {}", e);
            ExitCode::FAILURE
        }
    }
}
