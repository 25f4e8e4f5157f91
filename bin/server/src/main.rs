//! srpchat server executable.
//!
//! ```bash
//! # listen on port 8888, credentials in ./users.db
//! srpchat-server 8888
//!
//! # verbose logging
//! RUST_LOG=debug srpchat-server 8888
//! ```

use std::env;
use std::process;

use srpchat::server::Server;
use tracing::{error, warn};
use tracing_subscriber::EnvFilter;

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let args: Vec<String> = env::args().collect();
    if args.len() != 2 {
        eprintln!("Usage: {} <port>", args[0]);
        eprintln!("Example: {} 8888", args[0]);
        process::exit(1);
    }

    let port: u16 = match args[1].parse() {
        Ok(port) if (1024..=65535).contains(&port) => port,
        _ => {
            eprintln!("Port must be between 1024 and 65535");
            process::exit(1);
        }
    };

    let server = match Server::bind(port) {
        Ok(server) => server,
        Err(e) => {
            error!("failed to bind port {port}: {e}");
            process::exit(1);
        }
    };

    if let Err(e) = server.load_users() {
        warn!("could not load user database: {e}");
    }

    if let Err(e) = server.run() {
        error!("server error: {e}");
        process::exit(1);
    }
}
