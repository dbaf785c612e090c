use clap::Parser;
use tracing_subscriber::EnvFilter;

use balancebot_motors::runtime::{self, Args};

fn main() {
    // Setup logging (set RUST_LOG=info or debug)
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive("info".parse().unwrap()))
        .init(); // installs the subscriber globally

    let args = Args::parse();
    if let Err(e) = runtime::run(args) {
        eprintln!("Runtime error: {}", e);
        std::process::exit(1);
    }
}
