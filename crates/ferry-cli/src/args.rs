use std::path::PathBuf;

use clap::Parser;

/// Incremental JavaScript bundler.
#[derive(Parser)]
#[command(version, about, long_about = None)]
pub struct Args {
    /// Entry source file, absolute or relative to the project root.
    pub entry: PathBuf,

    /// Project root. Defaults to the working directory.
    #[clap(long)]
    pub project_root: Option<PathBuf>,

    /// Target platform (android, ios, web, ...).
    #[clap(long, short)]
    pub platform: Option<String>,

    /// Development build: keeps statically-dead branches for debugging.
    #[clap(long)]
    pub dev: bool,

    /// Minify output (forwarded to the transformer).
    #[clap(long)]
    pub minify: bool,

    /// Output bundle path. Defaults to bundle.js.
    #[clap(long, short)]
    pub out: Option<PathBuf>,

    /// Stay running and rewrite the bundle on file changes.
    #[clap(long, short)]
    pub watch: bool,

    /// Ignore all cache stores for this run.
    #[clap(long)]
    pub reset_cache: bool,

    /// Transform worker count.
    #[clap(long)]
    pub max_workers: Option<usize>,

    /// Debug-level logging.
    #[clap(long, short)]
    pub verbose: bool,

    /// Errors only.
    #[clap(long, short)]
    pub quiet: bool,
}
