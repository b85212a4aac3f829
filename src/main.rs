//! Portal mock CLI
//!
//! Entry point for the `portal-mock` command-line tool.

use std::path::PathBuf;
use std::process;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use portal_mock::signal::ShutdownSignal;
use portal_mock::{LoadedParams, RemoteDesktop, Server};
use tracing_subscriber::EnvFilter;

const EXIT_OK: i32 = 0;
const EXIT_RUNTIME: i32 = 1;
const EXIT_CONFIG: i32 = 2;

#[derive(Parser)]
#[command(name = "portal-mock")]
#[command(about = "Mock org.freedesktop.portal.RemoteDesktop for client tests", version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Serve the mock portal on a Unix socket
    Serve {
        /// Socket path to listen on
        #[arg(long, short = 's')]
        socket: PathBuf,

        #[command(flatten)]
        params: ParamArgs,
    },

    /// Print the effective parameters as JSON
    Params {
        #[command(flatten)]
        params: ParamArgs,
    },
}

#[derive(clap::Args)]
struct ParamArgs {
    /// Path to a TOML parameter file
    #[arg(long, short = 'c')]
    config: Option<PathBuf>,

    /// Parameter override (e.g. -p delay=0 -p devices=3), repeatable
    #[arg(long = "param", short = 'p', value_name = "KEY=VALUE")]
    overrides: Vec<String>,
}

impl ParamArgs {
    fn load(&self) -> LoadedParams {
        match LoadedParams::load(self.config.as_deref(), &self.overrides) {
            Ok(loaded) => loaded,
            Err(e) => {
                eprintln!("Configuration error: {}", e);
                process::exit(EXIT_CONFIG);
            }
        }
    }
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    let code = match cli.command {
        Commands::Serve { socket, params } => serve(socket, params.load()),
        Commands::Params { params } => print_params(params.load()),
    };
    process::exit(code);
}

fn serve(socket: PathBuf, loaded: LoadedParams) -> i32 {
    let portal = match RemoteDesktop::new(Arc::new(loaded.params)) {
        Ok(portal) => Arc::new(portal),
        Err(e) => {
            tracing::error!(error = %e, "failed to start portal");
            return EXIT_RUNTIME;
        }
    };

    let server = match Server::bind(&socket, portal) {
        Ok(server) => server,
        Err(e) => {
            tracing::error!(path = %socket.display(), error = %e, "failed to bind socket");
            return EXIT_RUNTIME;
        }
    };

    let signal = Arc::new(ShutdownSignal::new());
    if let Err(e) = signal.install() {
        tracing::error!(error = %e, "failed to install signal handler");
        return EXIT_RUNTIME;
    }

    match server.run(signal.flag()) {
        Ok(()) => EXIT_OK,
        Err(e) => {
            tracing::error!(error = %e, "server failed");
            EXIT_RUNTIME
        }
    }
}

fn print_params(loaded: LoadedParams) -> i32 {
    match serde_json::to_string_pretty(&loaded.to_value()) {
        Ok(json) => {
            println!("{}", json);
            EXIT_OK
        }
        Err(e) => {
            eprintln!("Error serializing output: {}", e);
            EXIT_RUNTIME
        }
    }
}
