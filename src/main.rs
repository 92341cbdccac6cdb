//! Tomato - a pomodoro timer daemon with a distraction blocker
//!
//! `tomato daemon` runs the timer in the foreground; every other command is
//! a thin client that sends one action over the control socket:
//! - work and break phases with a long break after every few intervals
//! - a blocker that closes a distracting app during focus time
//! - a one-line status for terminal status bars

use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{CommandFactory, Parser};

use tomato::cli::{Cli, Commands, DaemonNotRunning, Display, IpcClient, OFFLINE_LINE};
use tomato::config::{default_socket_path, AppConfig, Paths};
use tomato::daemon::Daemon;
use tomato::storage::{today, IntervalStore, MemoryStore, SqliteStore};

/// Main entry point
#[tokio::main(flavor = "current_thread")]
async fn main() {
    // Parse command line arguments
    let cli = Cli::parse();

    // Initialize logging
    init_tracing(&cli);

    // Execute command
    if let Err(e) = execute(cli).await {
        Display::show_error(&format!("{e:#}"));
        std::process::exit(1);
    }
}

/// Initializes the tracing subscriber for logging.
///
/// `RUST_LOG` wins; otherwise the daemon logs at info and clients at warn,
/// both raised to debug by `--verbose`.
fn init_tracing(cli: &Cli) {
    use tracing_subscriber::{fmt, EnvFilter};

    let default_level = match (cli.verbose, &cli.command) {
        (true, _) => "debug",
        (false, Some(Commands::Daemon { .. })) => "info",
        (false, _) => "warn",
    };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    fmt()
        .with_env_filter(filter)
        .with_target(false)
        .without_time()
        .with_writer(std::io::stderr)
        .init();
}

/// Executes the CLI command.
async fn execute(cli: Cli) -> Result<()> {
    let socket_path = cli.socket.clone().unwrap_or_else(default_socket_path);

    let Some(command) = cli.command else {
        // No command provided, show help
        Cli::command().print_help()?;
        return Ok(());
    };

    match command {
        Commands::Daemon { ephemeral } => run_daemon(&socket_path, ephemeral).await,
        Commands::Completions { shell } => {
            generate_completions(shell);
            Ok(())
        }
        Commands::Line => {
            let client = IpcClient::with_socket_path(&socket_path).with_retries(1);
            match client.send(tomato::Action::Status).await {
                Ok(status) => Display::show_line(&status),
                Err(e) if e.downcast_ref::<DaemonNotRunning>().is_some() => {
                    println!("{OFFLINE_LINE}")
                }
                Err(e) => return Err(e),
            }
            Ok(())
        }
        Commands::Stats => {
            let status = IpcClient::with_socket_path(&socket_path)
                .send(tomato::Action::Status)
                .await?;
            Display::show_stats(&status, today());
            Ok(())
        }
        Commands::Status => {
            let status = IpcClient::with_socket_path(&socket_path)
                .send(tomato::Action::Status)
                .await?;
            Display::show_status(&status);
            Ok(())
        }
        other => {
            let Some(action) = other.action() else {
                return Ok(());
            };
            let status = IpcClient::with_socket_path(&socket_path)
                .send(action)
                .await?;
            Display::show_action_result(action, &status);
            Ok(())
        }
    }
}

/// Runs the daemon until SIGINT or SIGTERM.
async fn run_daemon(socket_path: &Path, ephemeral: bool) -> Result<()> {
    let paths = Paths::from_home().context("failed to resolve the data directory")?;
    paths.ensure_data_dir()?;
    let config = AppConfig::load_or_create(&paths.config_path())
        .context("refusing to start with an invalid config")?;

    let store: Arc<dyn IntervalStore> = if ephemeral {
        Arc::new(MemoryStore::new())
    } else {
        let database_path = paths.database_path();
        Arc::new(
            SqliteStore::open(&database_path)
                .with_context(|| format!("failed to open {}", database_path.display()))?,
        )
    };

    let daemon = Daemon::builder(&config).store(store).build();
    tokio::spawn(stop_on_signal(Arc::clone(&daemon)));

    daemon.run(socket_path).await
}

/// Stops the daemon on the first SIGINT or SIGTERM.
async fn stop_on_signal(daemon: Arc<Daemon>) {
    use tokio::signal::unix::{signal, SignalKind};

    let mut terminate = match signal(SignalKind::terminate()) {
        Ok(terminate) => terminate,
        Err(e) => {
            tracing::warn!("failed to install SIGTERM handler: {e}");
            let _ = tokio::signal::ctrl_c().await;
            daemon.stop();
            return;
        }
    };

    tokio::select! {
        _ = tokio::signal::ctrl_c() => tracing::info!("received SIGINT"),
        _ = terminate.recv() => tracing::info!("received SIGTERM"),
    }
    daemon.stop();
}

/// Generates shell completion scripts.
fn generate_completions(shell: clap_complete::Shell) {
    use clap_complete::generate;
    use std::io;

    let mut cmd = Cli::command();
    let bin_name = cmd.get_name().to_string();
    generate(shell, &mut cmd, bin_name, &mut io::stdout());
}

// ============================================================================
// Tests
// ============================================================================
