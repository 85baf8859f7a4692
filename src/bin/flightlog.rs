//! flightlog - Ask questions about vehicle telemetry logs
//!
//! # Usage
//!
//! ```bash
//! # Ask a single question about a log
//! ./target/debug/flightlog flight.bin -e "What was the maximum altitude?"
//!
//! # JSON output for scripting
//! ./target/debug/flightlog flight.bin -e "Any GPS glitches?" --json | jq .
//!
//! # Questions from a file, one per line
//! ./target/debug/flightlog flight.ulg -f questions.txt
//!
//! # Interactive REPL mode (when no -e or -f provided)
//! ./target/debug/flightlog flight.bin
//!
//! # HTTP server
//! ./target/debug/flightlog --server --port 8000
//! ```
//!
//! # Features
//!
//! This binary requires the `cli` feature flag; `--server` additionally
//! requires `server`.

use anyhow::Result;
use clap::Parser;

use flightlog_lib::cli::{
    execute_batch, execute_once, initialize, load_log, run_repl, Args, CliContext,
};

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let ctx = initialize(&args).await?;

    if args.server {
        return serve(ctx).await;
    }

    let result = analyze(&ctx).await;

    // Graceful shutdown
    ctx.shutdown().await?;

    result
}

async fn analyze(ctx: &CliContext) -> Result<()> {
    let log = ctx.args.resolve_log()?;
    load_log(ctx, &log).await?;

    if let Some(ref prompt) = ctx.args.execute {
        // Single prompt execution mode
        execute_once(ctx, prompt).await
    } else if let Some(ref file) = ctx.args.file {
        // Batch file execution mode
        execute_batch(ctx, file).await
    } else {
        // No prompt provided - enter interactive REPL mode
        run_repl(ctx).await
    }
}

#[cfg(feature = "server")]
async fn serve(ctx: CliContext) -> Result<()> {
    use flightlog_lib::cli::server::start_server;

    let (addr, shutdown) = start_server(ctx.service.clone(), &ctx.settings.server).await?;
    eprintln!("flightlog server listening on http://{}", addr);

    tokio::signal::ctrl_c().await?;
    tracing::info!("Shutdown requested");
    shutdown.cancel();

    ctx.shutdown().await
}

#[cfg(not(feature = "server"))]
async fn serve(_ctx: CliContext) -> Result<()> {
    anyhow::bail!("flightlog was built without the `server` feature")
}
