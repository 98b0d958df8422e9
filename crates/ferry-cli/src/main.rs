mod args;
mod logger;
mod serializer;

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;

use anyhow::Context;
use clap::Parser;
use ferry_bundler::{BundlerOptions, ChangeEvent, GraphOptions, IncrementalBundler};
use ferry_cache::{DiskStore, MemoryStore};
use tracing::info;

use crate::args::Args;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    logger::init_logger(args.verbose, args.quiet);

    let project_root = match &args.project_root {
        Some(root) => root.clone(),
        None => std::env::current_dir().context("cannot determine working directory")?,
    };

    let mut options = BundlerOptions::new(project_root.clone());
    options.reset_cache = args.reset_cache;
    options.cache_stores = vec![
        Arc::new(MemoryStore::new()),
        Arc::new(DiskStore::new(project_root.join(".ferry-cache"))),
    ];
    if let Some(workers) = args.max_workers {
        options.transformer.workers = workers;
    }

    let graph_options = GraphOptions {
        platform: args.platform.clone(),
        dev: args.dev,
        minify: args.minify,
        ..GraphOptions::default()
    };

    let bundler = IncrementalBundler::new(options);

    let start = Instant::now();
    let handle = bundler
        .build_graph(&args.entry, graph_options)
        .await
        .map_err(|err| anyhow::anyhow!("{err}"))?;
    let elapsed = start.elapsed();

    let modules = bundler
        .graph_modules(&handle.graph_id)
        .await
        .map_err(|err| anyhow::anyhow!("{err}"))?;
    info!(
        modules = modules.len(),
        elapsed_ms = elapsed.as_millis() as u64,
        "initial build complete"
    );

    let out = args
        .out
        .clone()
        .unwrap_or_else(|| PathBuf::from("bundle.js"));
    serializer::write_bundle(&out, &project_root, &modules)?;
    println!(
        "Wrote {} ({} modules) in {:.0?}",
        out.display(),
        modules.len(),
        elapsed
    );

    if !args.watch {
        return Ok(());
    }

    // Watch mode: rewrite the bundle on every committed delta.
    bundler
        .watch()
        .await
        .map_err(|err| anyhow::anyhow!("{err}"))?;
    let mut changes = bundler
        .subscribe_changes(&handle.graph_id)
        .map_err(|err| anyhow::anyhow!("{err}"))?;
    println!("Watching {} for changes...", project_root.display());

    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                println!("\nStopping.");
                bundler.close().await.ok();
                return Ok(());
            }
            event = changes.recv() => match event {
                Ok(ChangeEvent::Delta { revision_id, delta }) => {
                    let start = Instant::now();
                    let modules = bundler
                        .graph_modules(&handle.graph_id)
                        .await
                        .map_err(|err| anyhow::anyhow!("{err}"))?;
                    serializer::write_bundle(&out, &project_root, &modules)?;
                    println!(
                        "rev {revision_id}: +{} ~{} -{} ({:.0?})",
                        delta.added.len(),
                        delta.modified.len(),
                        delta.deleted.len(),
                        start.elapsed()
                    );
                }
                Ok(ChangeEvent::Failed { message }) => {
                    eprintln!("build error: {message}");
                }
                Err(_) => return Ok(()),
            },
        }
    }
}
