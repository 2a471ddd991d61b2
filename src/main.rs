use clap::{Parser, Subcommand};
use log::{error, info};
use std::io;
use std::path::PathBuf;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

use rustping::{Config, Endpoint, Error};

#[derive(Parser)]
#[command(name = "rustping", version, about = "Rust server monitor — always notify")]
struct Cli {
    /// Path to the TOML config file
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    mode: Option<Mode>,
}

#[derive(Subcommand)]
enum Mode {
    /// Monitor one server, prompting for anything not given
    Watch {
        /// host[:port], port defaults to 28015
        server: Option<String>,
        /// Ping interval in seconds
        #[arg(short, long)]
        interval: Option<u64>,
    },
    /// Run the chat bot command console
    Bot,
}

enum Run {
    Watch(Config, Endpoint, Duration),
    Bot(Config),
}

#[tokio::main]
async fn main() {
    env_logger::init_from_env(env_logger::Env::default().default_filter_or("info"));

    let cli = Cli::parse();

    // Prompts run before the Ctrl+C handler so SIGINT still kills the process while waiting for input.
    let run = match prepare(cli) {
        Ok(run) => run,
        Err(e) => {
            error!("{e}");
            std::process::exit(1);
        }
    };

    let token = CancellationToken::new();
    let ctrl_c = token.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("Ctrl+C received, shutting down");
            ctrl_c.cancel();
        }
    });

    let result = match run {
        Run::Watch(config, endpoint, interval) => {
            rustping::watch_server(&config, endpoint, interval, token).await
        }
        Run::Bot(config) => rustping::serve_bot(&config, token).await,
    };

    // stdin may still be held by a blocking reader; exit explicitly.
    std::process::exit(match result {
        Ok(()) => 0,
        Err(e) => {
            error!("{e}");
            1
        }
    });
}

fn prepare(cli: Cli) -> Result<Run, Error> {
    let config = Config::load(cli.config.as_deref())?;

    match cli.mode.unwrap_or(Mode::Watch {
        server: None,
        interval: None,
    }) {
        Mode::Watch { server, interval } => {
            println!("🕹️ Rust Server Monitor — Always Notify");
            println!("=======================================");

            let stdin = io::stdin();
            let (endpoint, interval) = rustping::process::resolve_watch_target(
                &config,
                server,
                interval,
                &mut stdin.lock(),
                &mut io::stdout(),
            )?;
            Ok(Run::Watch(config, endpoint, interval))
        }
        Mode::Bot => Ok(Run::Bot(config)),
    }
}
