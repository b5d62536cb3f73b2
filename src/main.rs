//! Proxyshim CLI

use std::path::Path;
use std::process;

use anyhow::{bail, Context};
use proxyshim::{env_file, HttpClient, ProxyConfig, Session};
use tracing_subscriber::EnvFilter;

fn usage() -> ! {
    eprintln!("Proxyshim v{}", env!("CARGO_PKG_VERSION"));
    eprintln!();
    eprintln!("Usage: proxyshim <command> [options]");
    eprintln!();
    eprintln!("Commands:");
    eprintln!("  start <test-name>       Start a session and print its recording id");
    eprintln!("  stop <recording-id>     Stop a session");
    eprintln!("  url                     Show the proxy base URL and mode");
    eprintln!();
    eprintln!("Configuration is read from .env in the working directory, then from");
    eprintln!("USE_PROXY, PROXY_HOST, PROXY_PORT, PROXY_MODE and RECORDING_PATH.");
    process::exit(1);
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(std::io::stderr)
        .init();

    let args: Vec<String> = std::env::args().collect();

    if args.len() < 2 {
        usage();
    }

    if let Err(e) = run(&args[1], &args[2..]).await {
        eprintln!("Error: {e:#}");
        process::exit(1);
    }
}

async fn run(command: &str, rest: &[String]) -> anyhow::Result<()> {
    env_file::load(Path::new(".env")).context("Failed to load .env")?;
    let config = ProxyConfig::from_env().context("Invalid proxy configuration")?;

    match command {
        "start" => {
            let Some(test_name) = rest.first() else {
                usage();
            };
            if config.mode.is_live() {
                bail!("USE_PROXY is not enabled; live runs have no session to start");
            }

            let mut session = Session::for_config(config)?;
            session.start(test_name).await?;

            if let Some(id) = session.recording_id() {
                println!("{id}");
            }
            for (key, value) in session.variables() {
                eprintln!("{key} = {value}");
            }
        }
        "stop" => {
            let Some(recording_id) = rest.first() else {
                usage();
            };

            let client = HttpClient::for_test_proxy()?;
            let mut session = Session::resume(config, client, recording_id.as_str())?;
            session.stop().await?;
        }
        "url" => {
            if config.mode.is_live() {
                println!("live (no proxy)");
            } else {
                println!("{} {}", config.mode, config.base_url());
            }
        }
        _ => {
            eprintln!("Unknown command: {command}");
            eprintln!("Run 'proxyshim' for usage information.");
            process::exit(1);
        }
    }

    Ok(())
}
