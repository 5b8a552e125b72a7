use aleph_core::{App, ServerConfig};
use anyhow::Context;
use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::EnvFilter;

mod command_compiler;
mod watch;

use command_compiler::CommandCompiler;

#[derive(Parser, Debug)]
#[command(name = "aleph")]
#[command(about = "Dev and production server for Aleph projects", long_about = None)]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable debug logging
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Serve with on-demand compilation and hot module replacement
    Dev(ServeArgs),
    /// Serve prebuilt output
    Start(ServeArgs),
}

#[derive(Args, Debug)]
struct ServeArgs {
    /// Project directory
    #[arg(default_value = ".")]
    dir: PathBuf,

    #[arg(short, long, default_value_t = 8080)]
    port: u16,

    #[arg(long, default_value = "localhost")]
    host: String,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    match cli.command {
        Commands::Dev(args) => serve(args, true).await,
        Commands::Start(args) => serve(args, false).await,
    }
}

fn init_tracing(verbose: bool) {
    let default = if verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}

async fn serve(args: ServeArgs, dev: bool) -> anyhow::Result<()> {
    let working_dir = args
        .dir
        .canonicalize()
        .with_context(|| format!("project directory {} not found", args.dir.display()))?;
    let config = ServerConfig::load(&working_dir, dev)?;

    let compiler = Arc::new(CommandCompiler::new(
        config.compiler.clone(),
        working_dir.clone(),
    ));
    let app = App::builder(config, compiler).build();

    let _watcher = if dev {
        Some(watch::spawn(Arc::clone(&app))?)
    } else {
        None
    };

    let addr = format!("{}:{}", args.host, args.port);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("failed to bind {addr}"))?;
    info!(
        "serving {} in {} mode on http://{}",
        working_dir.display(),
        if dev { "development" } else { "production" },
        listener.local_addr()?
    );

    axum::serve(listener, app.router())
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("server failed")?;
    info!("server stopped");
    Ok(())
}

async fn shutdown_signal() {
    let _ = tokio::signal::ctrl_c().await;
}
