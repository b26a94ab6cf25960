mod loopback;
mod stdio;

use clap::{Parser, Subcommand};
use std::time::Duration;
use webview_bridge::BridgeConfig;

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Drop response callbacks that got no answer within this many milliseconds
    #[arg(long, global = true)]
    timeout_ms: Option<u64>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Connect a native and a web bridge in-process and let them talk
    Loopback {
        /// Number of `add` calls the web side makes
        #[arg(long, default_value_t = 3)]
        calls: i64,
    },
    /// Serve a bridge over stdin/stdout, one json envelope per line
    Stdio {
        /// Name used in log lines
        #[arg(long, default_value = "stdio")]
        identifier: String,
    },
}

#[tokio::main]
async fn main() {
    if let Err(e) = run().await {
        eprintln!("ERROR: {:#}", e); // Pretty format with all causes
        std::process::exit(1);
    }
}

async fn run() -> Result<(), anyhow::Error> {
    // Initialize logger
    env_logger::init_from_env(
        env_logger::Env::default().filter_or(env_logger::DEFAULT_FILTER_ENV, "info"),
    );

    let cli = Cli::parse();
    let response_timeout = cli.timeout_ms.map(Duration::from_millis);

    match cli.command {
        Commands::Loopback { calls } => {
            println!("Starting loopback with {} calls", calls);
            loopback::run(calls, response_timeout).await?;
        }
        Commands::Stdio { identifier } => {
            stdio::run(BridgeConfig {
                identifier,
                response_timeout,
            })
            .await?;
        }
    }

    Ok(())
}
