use std::process;
use std::sync::atomic::AtomicBool;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use signal_hook::consts::{SIGINT, SIGPIPE, SIGQUIT, SIGTERM};
use tracing_subscriber::EnvFilter;

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive("ircserver=info".parse()?))
        .init();

    let config = ircserver::config::ServerConfig::try_parse().unwrap_or_else(|e| {
        let _ = e.print();
        process::exit(1);
    });

    let server = ircserver::server::Server::bind(config)?;
    let shutdown = server.shutdown_handle();

    // Interrupt, terminate and quit all request a cooperative shutdown;
    // the handlers only set the flag the engine checks between waits.
    for signal in [SIGINT, SIGTERM, SIGQUIT] {
        signal_hook::flag::register(signal, shutdown.flag())
            .with_context(|| format!("failed to register signal {signal}"))?;
    }
    // A write to a closed peer must fail with EPIPE, not kill the process.
    signal_hook::flag::register(SIGPIPE, Arc::new(AtomicBool::new(false)))
        .context("failed to register SIGPIPE handler")?;

    server.run()
}
