//! Command-line surface
//!
//! Lives in the library so argument parsing can be exercised with a
//! substitute runner.

use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;

use crate::commands::{self, OutputFormat, PackageReferenceCommandRunner};
use crate::config::{Config, PkgrefPaths};

#[derive(Parser, Debug)]
#[command(name = "pkgref")]
#[command(author, version, about = "Add, remove, and list package references in project files")]
pub struct Cli {
    /// Log debug details (overrides the configured log level)
    #[arg(long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Add a package reference, or update its version if present
    Add {
        /// Package identifier
        #[arg(long)]
        package: String,

        /// Version constraint to write
        #[arg(short, long)]
        version: String,

        /// Path to the project file
        #[arg(short, long)]
        project: PathBuf,

        /// Target framework to scope the reference to
        #[arg(short, long)]
        framework: Option<String>,
    },

    /// Remove a package reference
    Remove {
        /// Package identifier
        #[arg(long)]
        package: String,

        /// Path to the project file
        #[arg(short, long)]
        project: PathBuf,

        /// Only remove the reference scoped to this target framework
        #[arg(short, long)]
        framework: Option<String>,
    },

    /// List package references by framework
    List {
        /// Path to the project file
        #[arg(short, long)]
        project: PathBuf,

        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// Print the package details URI for a package version
    DetailsUri {
        /// Package identifier
        #[arg(long)]
        id: String,

        /// Package version
        #[arg(long)]
        version: String,

        /// URI template with {id} and {version} placeholders
        #[arg(short, long)]
        template: Option<String>,
    },

    /// Write a default config file (first-time setup)
    Init,
}

/// Runners the mutating commands hand their requests to
pub struct Runners<'a> {
    pub add: &'a dyn PackageReferenceCommandRunner,
    pub remove: &'a dyn PackageReferenceCommandRunner,
}

/// Run a parsed command and return the process exit code
pub fn dispatch(command: Commands, config: &Config, runners: &Runners<'_>) -> Result<i32> {
    match command {
        Commands::Add {
            package,
            version,
            project,
            framework,
        } => commands::add(
            &package,
            &version,
            &project,
            framework.as_deref(),
            config,
            runners.add,
        ),
        Commands::Remove {
            package,
            project,
            framework,
        } => commands::remove(&package, &project, framework.as_deref(), runners.remove),
        Commands::List { project, json } => {
            let format = if json {
                OutputFormat::Json
            } else {
                OutputFormat::Summary
            };
            commands::list(&project, format, config)
        }
        Commands::DetailsUri {
            id,
            version,
            template,
        } => commands::details_uri(&id, &version, template.as_deref(), config),
        Commands::Init => {
            let paths = PkgrefPaths::new()?;
            commands::init(&paths)
        }
    }
}
