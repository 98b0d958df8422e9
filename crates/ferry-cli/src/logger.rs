//! Logging setup for the CLI.
//!
//! Uses the `tracing` ecosystem: `--verbose` turns on debug logs for the
//! ferry crates, `--quiet` drops to errors only, and `RUST_LOG` overrides
//! both when set.

use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

pub fn init_logger(verbose: bool, quiet: bool) {
    let filter = if verbose {
        EnvFilter::new(
            "ferry_bundler=debug,ferry_cache=debug,ferry_filemap=debug,ferry_resolver=debug,ferry_transform=debug",
        )
    } else if quiet {
        EnvFilter::new("error")
    } else {
        EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| EnvFilter::new("ferry_bundler=info,ferry_cli=info"))
    };

    let fmt_layer = fmt::layer().with_target(false).compact();

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt_layer)
        .init();
}
