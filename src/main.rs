//! remote-debugger binary entry point.

use std::process::ExitCode;
use std::sync::Arc;

use remote_debugger::api::serve_with_state;
use remote_debugger::cli::{self, Args};
use remote_debugger::config::Config;
use remote_debugger::{logging, IdleReaper};
use tracing::{error, info};

#[tokio::main]
async fn main() -> ExitCode {
    let args = match cli::parse_args() {
        Ok(args) => args,
        Err(e) => {
            eprintln!("error: {e}");
            eprintln!("Run with --help for usage.");
            return ExitCode::from(2);
        }
    };

    if args.help {
        cli::print_help();
        return ExitCode::SUCCESS;
    }
    if args.version {
        cli::print_version();
        return ExitCode::SUCCESS;
    }

    match run(args).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("{e}");
            eprintln!("error: {e}");
            ExitCode::FAILURE
        }
    }
}

async fn run(args: Args) -> Result<(), Box<dyn std::error::Error>> {
    let config = Config::load(&args)?;
    logging::init_with_level(config.log_filter())?;

    info!("remote-debugger v{}", env!("CARGO_PKG_VERSION"));
    info!(program = %config.debugger.program, "debugger client");

    let server = config.to_server_config()?;
    let state = config.app_state();
    let registry = Arc::clone(&state.registry);

    let reaper = config
        .reaper_settings()
        .map(|settings| IdleReaper::new(Arc::clone(&registry), settings).start());

    let served = serve_with_state(server, state, shutdown_signal()).await;

    if let Some(mut reaper) = reaper {
        reaper.stop().await;
    }
    match registry.shutdown_all().await {
        Ok(0) => {}
        Ok(n) => info!(sessions = n, "terminated remaining sessions"),
        Err(e) => error!(error = %e, "failed to terminate remaining sessions"),
    }

    served?;
    Ok(())
}

/// Resolves on Ctrl-C, or SIGTERM on Unix.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!(error = %e, "failed to listen for Ctrl-C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                error!(error = %e, "failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
    info!("shutdown requested");
}
