// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! loft daemon (loftd)
//!
//! Static-file HTTP server: binds the configured address, spawns one
//! event-loop worker per thread, and serves the pinned root until
//! SIGINT/SIGTERM.

use std::path::PathBuf;

use tokio::signal::unix::{signal, SignalKind};
use tracing::info;

use loft_core::ServerConfig;
use loft_server::Server;

/// Config file used when none is given and it exists.
const DEFAULT_CONFIG: &str = "loftd.toml";

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let config_path = match parse_args() {
        Ok(path) => path,
        Err(code) => std::process::exit(code),
    };

    setup_logging();

    let config = ServerConfig::load(config_path.as_deref())?;
    let server = Server::startup(&config).await?;
    let addr = server.local_addr()?;
    let shutdown = server.shutdown_notify();

    let mut sigterm = signal(SignalKind::terminate())?;
    let mut sigint = signal(SignalKind::interrupt())?;

    info!(addr = %addr, root = %config.root_path.display(), "loftd ready");

    // Signal ready for a parent process waiting on startup
    println!("READY");

    let mut run = tokio::spawn(server.run());
    let mut finished = false;
    tokio::select! {
        _ = sigterm.recv() => info!("Received SIGTERM, shutting down..."),
        _ = sigint.recv() => info!("Received SIGINT, shutting down..."),
        _ = &mut run => finished = true,
    }
    if !finished {
        shutdown.notify_one();
        let _ = run.await;
    }

    info!("loftd stopped");
    Ok(())
}

/// Manual argument handling: `loftd [--config <path>]` plus the usual
/// info flags. Returns the config path to load, or an exit code.
fn parse_args() -> Result<Option<PathBuf>, i32> {
    let mut args = std::env::args().skip(1);
    let mut config_path = None;

    while let Some(arg) = args.next() {
        match arg.as_str() {
            "--version" | "-V" | "-v" => {
                println!("loftd {}", env!("CARGO_PKG_VERSION"));
                return Err(0);
            }
            "--help" | "-h" | "help" => {
                println!("loftd {}", env!("CARGO_PKG_VERSION"));
                println!("loft daemon - static-file HTTP server");
                println!();
                println!("USAGE:");
                println!("    loftd [--config <path>]");
                println!();
                println!("Configuration comes from the TOML file (default: ./{DEFAULT_CONFIG}");
                println!("when present), overridden by LOFT_* environment variables:");
                println!("    LOFT_ROOT, LOFT_INDEX_HTML, LOFT_KEEP_ALIVE_TIMEOUT,");
                println!("    LOFT_LISTEN, LOFT_THREADS, LOFT_MAX_FD");
                println!();
                println!("OPTIONS:");
                println!("    -c, --config <path>    Path to the config file");
                println!("    -h, --help             Print help information");
                println!("    -v, --version          Print version information");
                return Err(0);
            }
            "--config" | "-c" => match args.next() {
                Some(path) => config_path = Some(PathBuf::from(path)),
                None => {
                    eprintln!("error: --config requires a path");
                    return Err(1);
                }
            },
            other => {
                eprintln!("error: unexpected argument '{other}'");
                eprintln!("Usage: loftd [--config <path>] [--help | --version]");
                return Err(1);
            }
        }
    }

    Ok(config_path.or_else(|| {
        let default = PathBuf::from(DEFAULT_CONFIG);
        default.exists().then_some(default)
    }))
}

fn setup_logging() {
    use tracing_subscriber::{fmt, prelude::*, EnvFilter};

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_writer(std::io::stderr))
        .init();
}
