use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::Parser;
use tracing::error;
use tracing_subscriber::{EnvFilter, Layer, fmt, layer::SubscriberExt, util::SubscriberInitExt};

use cdn_rewriter::{
  LocalMirrorPublisher, PublishConfig, PublishOrchestrator, SlicedPublisher, load_build_manifest,
};

/// Publish a completed build to a mirror directory and rewrite references to it.
#[derive(Debug, Parser)]
#[command(name = "cdn-rewriter", version, about)]
struct Cli {
  /// Build manifest written by the bundler.
  #[arg(long)]
  manifest: PathBuf,
  /// Configuration file; `cdn-rewriter.config.{json,yaml}` in the working directory otherwise.
  #[arg(long)]
  config: Option<PathBuf>,
  /// Directory uploaded files are copied into.
  #[arg(long)]
  mirror_dir: PathBuf,
  /// URL the mirror directory is served under.
  #[arg(long)]
  base_url: String,
}

#[tokio::main]
async fn main() {
  tracing_subscriber::registry()
    .with(
      fmt::layer()
        .with_target(false)
        .with_level(true)
        .with_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))),
    )
    .init();

  if let Err(err) = run(Cli::parse()).await {
    error!("{:#}", err);
    std::process::exit(1);
  }
}

async fn run(cli: Cli) -> Result<()> {
  let config = match &cli.config {
    Some(path) => PublishConfig::from_path(path)
      .with_context(|| format!("loading configuration from {}", path.display()))?,
    None => PublishConfig::discover(Path::new(".")),
  };

  let manifest = load_build_manifest(&cli.manifest)
    .with_context(|| format!("loading build manifest {}", cli.manifest.display()))?;

  let source_root = manifest
    .output
    .path
    .clone()
    .or_else(|| cli.manifest.parent().map(Path::to_path_buf))
    .context("cannot determine the build output directory")?;

  let publisher = SlicedPublisher::new(LocalMirrorPublisher::new(
    source_root,
    &cli.mirror_dir,
    cli.base_url,
  ));

  PublishOrchestrator::new(publisher, config)
    .publish(&manifest)
    .await
    .context("publish run failed")?;

  Ok(())
}
