//! braid entry point.
//!
//! ```bash
//! braid --branch /mnt/disk1 --branch /mnt/disk2=NC mkdir /photos/2024
//! RUST_LOG=braid_kernel=debug braid chmod 640 /photos/2024/a.jpg
//! ```

use std::process::ExitCode;

use tracing_subscriber::{fmt, prelude::*, EnvFilter};

fn main() -> ExitCode {
    // Logs go to stderr so command output stays clean on stdout.
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("braid=info"));
    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(filter)
        .init();

    match braid_cli::run() {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("braid: {e:#}");
            ExitCode::FAILURE
        }
    }
}
