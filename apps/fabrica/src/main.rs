//! # Fabrica
//!
//! The binary for the Fabrica document ledger.
//!
//! ## Usage
//!
//! ```bash
//! # Process documents through the cascade
//! fabrica process notes/intro.md notes/design.md
//!
//! # Inspect the ledger
//! fabrica stats
//! fabrica trace ex-019a4f3c2b10-00000001
//!
//! # Query the braid
//! fabrica query related <document-id> --min-weight 0.5
//! ```

use clap::Parser;
use fabrica::cli;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

// =============================================================================
// APPLICATION ENTRY POINT
// =============================================================================

fn main() {
    // FABRICA_LOG_FORMAT=json switches to machine-parseable log lines.
    let log_format = std::env::var("FABRICA_LOG_FORMAT").unwrap_or_else(|_| "text".to_string());

    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "fabrica=info,fabrica_core=info".into());

    // Logs go to stderr so command output on stdout stays parseable.
    match log_format.as_str() {
        "json" => {
            tracing_subscriber::registry()
                .with(filter)
                .with(tracing_subscriber::fmt::layer().json().with_writer(std::io::stderr))
                .init();
        }
        _ => {
            tracing_subscriber::registry()
                .with(filter)
                .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
                .init();
        }
    }

    let cli = cli::Cli::parse();

    if !cli.quiet && !cli.json_mode {
        print_banner();
    }

    if let Err(e) = cli::execute(cli) {
        tracing::error!("Error: {}", e);
        std::process::exit(1);
    }
}

/// Print the Fabrica startup banner.
fn print_banner() {
    println!(
        r#"
  ███████╗ █████╗ ██████╗ ██████╗ ██╗ ██████╗ █████╗
  ██╔════╝██╔══██╗██╔══██╗██╔══██╗██║██╔════╝██╔══██╗
  █████╗  ███████║██████╔╝██████╔╝██║██║     ███████║
  ██╔══╝  ██╔══██║██╔══██╗██╔══██╗██║██║     ██╔══██║
  ██║     ██║  ██║██████╔╝██║  ██║██║╚██████╗██║  ██║
  ╚═╝     ╚═╝  ╚═╝╚═════╝ ╚═╝  ╚═╝╚═╝ ╚═════╝╚═╝  ╚═╝

  Document Ledger v{}
"#,
        env!("CARGO_PKG_VERSION")
    );
}
