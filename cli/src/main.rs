//! fleetvpn - provision and operate a fleet of OpenVPN servers over SSH

use std::process::ExitCode;

use clap::Parser;
use tracing_subscriber::EnvFilter;

use fleetvpn_cli::cli::Cli;
use fleetvpn_cli::output::json;

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    let default_level = if cli.verbose { "debug" } else { "warn" };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level)),
        )
        .with_writer(std::io::stderr)
        .init();

    let as_json = cli.json;
    match cli.run().await {
        Ok(code) => code,
        Err(e) => {
            if as_json {
                match json::format_anyhow(&e) {
                    Ok(body) => println!("{body}"),
                    Err(_) => eprintln!("Error: {e:#}"),
                }
            } else {
                eprintln!("Error: {e:#}");
            }
            ExitCode::FAILURE
        }
    }
}
