//! pkgref - package reference editor for project files

use clap::Parser;
use log::debug;
use std::process::ExitCode;

use pkgref::cli::{self, Cli, Runners};
use pkgref::commands::{AddPackageReferenceCommandRunner, RemovePackageReferenceCommandRunner};
use pkgref::config;
use pkgref::models::EXIT_FAILURE;

fn main() -> ExitCode {
    let cli = Cli::parse();

    let config = match config::load_config() {
        Ok(config) => config,
        Err(e) => {
            eprintln!("warning: {:#}; using defaults", e);
            config::Config::default()
        }
    };

    let level = if cli.verbose {
        "debug"
    } else {
        config.log_level.as_str()
    };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level))
        .format_timestamp(None)
        .init();
    debug!("Loaded config: {:?}", config);

    let add = AddPackageReferenceCommandRunner::new(&config);
    let remove = RemovePackageReferenceCommandRunner::new(&config);
    let runners = Runners {
        add: &add,
        remove: &remove,
    };

    let code = match cli::dispatch(cli.command, &config, &runners) {
        Ok(code) => code,
        Err(e) => {
            eprintln!("error: {:#}", e);
            EXIT_FAILURE
        }
    };
    ExitCode::from(u8::try_from(code).unwrap_or(1))
}
