//! # SIS CLI Module
//!
//! Command line interface of the portal binary.
//!
//! ## Available Commands
//!
//! - `server` - Start the HTTP portal
//! - `init` - Create an empty database
//! - `create-admin` - Create a superuser account
//! - `delete-user` - Remove an account and its records
//! - `status` - Show record counts
//! - `generate-installments` - Create or refresh the installments of a fee plan
//! - `export` - Write a lecturers, students or courses CSV

mod commands;

use crate::config::Settings;
use clap::{Parser, Subcommand, ValueEnum};
use sis_core::SisError;
use std::path::PathBuf;

pub use commands::*;

// =============================================================================
// CLI STRUCTURE
// =============================================================================

/// SIS - Student Information System
///
/// Role-based portal for administrators, lecturers and students.
#[derive(Parser, Debug)]
#[command(name = "sis")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Suppress banner output
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Path to the redb database (overrides the configuration)
    #[arg(short = 'D', long, global = true)]
    pub database: Option<PathBuf>,

    /// TOML configuration file
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Output in JSON format (for programmatic access)
    #[arg(long, global = true)]
    pub json_mode: bool,

    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Option<Commands>,
}

/// Which CSV `export` writes.
#[derive(ValueEnum, Clone, Copy, Debug, PartialEq, Eq)]
pub enum ExportKind {
    Lecturers,
    Students,
    Courses,
}

/// Available CLI commands.
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Start the HTTP portal
    Server {
        /// Host to bind to
        #[arg(short = 'H', long)]
        host: Option<String>,

        /// Port to bind to
        #[arg(short, long)]
        port: Option<u16>,
    },

    /// Initialize a new empty database
    Init {
        /// Force initialization even if database exists
        #[arg(short, long)]
        force: bool,
    },

    /// Create an administrator with superuser rights
    CreateAdmin {
        #[arg(short, long)]
        email: String,

        #[arg(short, long)]
        password: String,

        /// Identity card number (default: IC-ADMIN)
        #[arg(long)]
        ic: Option<String>,

        /// Full name (default: Admin User)
        #[arg(short, long)]
        name: Option<String>,
    },

    /// Delete an account and everything that belongs to it
    DeleteUser {
        #[arg(short, long)]
        email: String,
    },

    /// Show record counts
    Status,

    /// Create or refresh the installments of a fee plan
    GenerateInstallments {
        /// Fee plan id
        #[arg(long)]
        plan: u64,
    },

    /// Export a CSV report
    Export {
        #[arg(value_enum)]
        kind: ExportKind,

        /// Output file path
        #[arg(short, long)]
        output: PathBuf,
    },
}

// =============================================================================
// COMMAND EXECUTION
// =============================================================================

/// Execute the CLI with parsed arguments.
pub async fn execute(cli: Cli) -> Result<(), SisError> {
    let mut settings = Settings::load(cli.config.as_deref())?;
    if let Some(database) = cli.database {
        settings.database = database;
    }
    let json_mode = cli.json_mode;
    if cli.verbose {
        println!("Settings: {:?}", settings);
    }

    match cli.command {
        Some(Commands::Server { host, port }) => {
            if let Some(host) = host {
                settings.host = host;
            }
            if let Some(port) = port {
                settings.port = port;
            }
            cmd_server(settings).await
        }
        Some(Commands::Init { force }) => cmd_init(&settings.database, force),
        Some(Commands::CreateAdmin {
            email,
            password,
            ic,
            name,
        }) => cmd_create_admin(
            &settings.database,
            json_mode,
            &email,
            &password,
            ic.as_deref(),
            name.as_deref(),
        ),
        Some(Commands::DeleteUser { email }) => {
            cmd_delete_user(&settings.database, json_mode, &email)
        }
        Some(Commands::Status) => cmd_status(&settings.database, json_mode),
        Some(Commands::GenerateInstallments { plan }) => {
            cmd_generate_installments(&settings.database, json_mode, plan)
        }
        Some(Commands::Export { kind, output }) => cmd_export(&settings.database, kind, &output),
        None => {
            // No subcommand - show status by default
            cmd_status(&settings.database, json_mode)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_export_command() {
        let cli = Cli::try_parse_from([
            "sis", "-D", "x.redb", "export", "students", "-o", "out.csv",
        ])
        .expect("parse");
        assert_eq!(cli.database, Some(PathBuf::from("x.redb")));
        assert!(matches!(
            cli.command,
            Some(Commands::Export {
                kind: ExportKind::Students,
                ..
            })
        ));
    }

    #[test]
    fn test_parse_create_admin() {
        let cli = Cli::try_parse_from([
            "sis",
            "create-admin",
            "--email",
            "root@school.test",
            "--password",
            "secret",
        ])
        .expect("parse");
        let Some(Commands::CreateAdmin { email, ic, .. }) = cli.command else {
            unreachable!("expected create-admin");
        };
        assert_eq!(email, "root@school.test");
        assert!(ic.is_none());
    }
}
