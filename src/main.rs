use clap::Parser;
use tracing_subscriber::EnvFilter;

use balbot_runtime::runtime::{self, RuntimeOptions};

/// Balance control runtime for the BalBot two-wheeled robot
#[derive(Parser)]
struct Args {
    /// Serial port of the drive board
    #[arg(long)]
    port: Option<String>,

    /// Baud rate of the drive board link
    #[arg(long)]
    baud: Option<u32>,
}

#[tokio::main]
async fn main() {
    // Setup logging (set RUST_LOG=info or debug)
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive("info".parse().unwrap()))
        .init(); // installs the subscriber globally

    let args = Args::parse();
    let mut opts = RuntimeOptions::default();
    if let Some(port) = args.port {
        opts.port = port;
    }
    if let Some(baud) = args.baud {
        opts.baud = baud;
    }

    if let Err(e) = runtime::run(opts).await {
        eprintln!("Runtime error: {}", e);
        std::process::exit(1);
    }
}
