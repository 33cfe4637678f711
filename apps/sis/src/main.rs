//! # SIS - Student Information System
//!
//! The portal binary.
//!
//! This application provides:
//! - Server-rendered HTTP portal (axum-based)
//! - CLI interface for setup, reports and fee plans
//!
//! ## Architecture
//!
//! ```text
//! ┌───────────────────────────────────────────────┐
//! │              apps/sis (THE PORTAL)            │
//! │                                               │
//! │   ┌─────────────┐          ┌─────────────┐    │
//! │   │    CLI      │          │  HTTP pages │    │
//! │   │   (clap)    │          │   (axum)    │    │
//! │   └──────┬──────┘          └──────┬──────┘    │
//! │          └───────────┬────────────┘           │
//! │                      ▼                        │
//! │              ┌───────────────┐                │
//! │              │   sis-core    │                │
//! │              │ (THE RECORDS) │                │
//! │              └───────────────┘                │
//! └───────────────────────────────────────────────┘
//! ```
//!
//! ## Usage
//!
//! ```bash
//! sis init
//! sis create-admin --email admin@school.test --password secret
//! sis server --host 0.0.0.0 --port 8080
//! sis export students -o students.csv
//! ```

use clap::Parser;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

// =============================================================================
// APPLICATION ENTRY POINT
// =============================================================================

#[tokio::main]
async fn main() {
    // SIS_LOG_FORMAT=json enables machine-parseable output.
    let log_format = std::env::var("SIS_LOG_FORMAT").unwrap_or_else(|_| "text".to_string());

    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "sis=info,tower_http=debug".into());

    match log_format.as_str() {
        "json" => {
            tracing_subscriber::registry()
                .with(filter)
                .with(tracing_subscriber::fmt::layer().json())
                .init();
        }
        _ => {
            tracing_subscriber::registry()
                .with(filter)
                .with(tracing_subscriber::fmt::layer())
                .init();
        }
    }

    let cli = sis::cli::Cli::parse();

    if !cli.quiet {
        print_banner();
    }

    if let Err(e) = sis::cli::execute(cli).await {
        tracing::error!("Error: {}", e);
        std::process::exit(1);
    }
}

/// Print the startup banner.
fn print_banner() {
    println!(
        r#"
  ███████╗██╗███████╗
  ██╔════╝██║██╔════╝
  ███████╗██║███████╗
  ╚════██║██║╚════██║
  ███████║██║███████║
  ╚══════╝╚═╝╚══════╝

  Student Information System v{}
"#,
        env!("CARGO_PKG_VERSION")
    );
}
