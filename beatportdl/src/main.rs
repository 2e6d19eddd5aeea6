use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, bail};
use beatportdl::batch::BatchRunner;
use beatportdl::cli::Args;
use beatportdl::config::AppConfig;
use beatportdl::delivery::{Delivery, InboundFilter, TelegramClient, listener};
use beatportdl::logging::{LogOptions, init_logging};
use beatportdl::media::{FfmpegRemuxer, FfmpegTagWriter};
use beatportdl::pipeline::{Collaborators, Orchestrator};
use beatportdl::progress::ProgressDisplay;
use beatportdl::utils::fs;
use catalog::{Catalog, HttpCatalog, Store};
use clap::Parser;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use transfer_engine::HttpSource;

/// Pending chat requests before the listener waits for the batch loop.
const CHAT_QUEUE_CAPACITY: usize = 64;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let _ = dotenvy::dotenv();
    let args = Args::parse();

    let (mut config, config_path) =
        AppConfig::load(args.config.as_deref()).context("Failed to load configuration")?;
    if let Some(quality) = &args.quality {
        config.general.quality = quality.clone();
        config.validate()?;
    }

    let progress = ProgressDisplay::new(config.general.show_progress && !args.quiet);
    let _log_guard = init_logging(LogOptions {
        verbose: args.verbose,
        quiet: args.quiet,
        error_log_dir: config
            .general
            .write_error_log
            .then(|| config_dir(&config_path)),
        progress: progress.multi(),
    })?;
    info!(config = %config_path.display(), quality = %config.general.quality, "Starting beatportdl");

    fs::ensure_dir_all(&config.general.downloads_directory)
        .await
        .context("Failed to create the downloads directory")?;
    fs::ensure_dir_all(&config.temp_directory())
        .await
        .context("Failed to create the temp directory")?;

    let catalogs = build_catalogs(&config)?;
    let source = Arc::new(HttpSource::new(&config.transfer_config())?);
    let ffmpeg = config.transfer.ffmpeg_path.clone();

    let telegram = if args.telegram || config.telegram.enabled {
        let client = TelegramClient::new(config.telegram.clone())?;
        if !client.is_enabled() {
            bail!("Telegram mode needs `telegram.enabled = true` and a bot token");
        }
        Some(Arc::new(client))
    } else {
        None
    };

    let config = Arc::new(config);
    let orchestrator = Orchestrator::new(
        config.clone(),
        Collaborators {
            catalogs,
            source,
            remuxer: Arc::new(FfmpegRemuxer::new(ffmpeg.clone())),
            tag_writer: Arc::new(FfmpegTagWriter::new(ffmpeg)),
            delivery: telegram
                .clone()
                .map(|client| client as Arc<dyn Delivery>),
            progress,
        },
    )?;
    let runner = BatchRunner::new(Arc::new(orchestrator));

    let urls = args.collect_urls().await?;
    if !urls.is_empty() {
        let report = runner.run(urls, None).await;
        println!("{report}");
        if telegram.is_none() && report.failed > 0 {
            bail!("{} item(s) failed", report.failed);
        }
    }

    match telegram {
        Some(client) => serve_chat(&runner, client).await,
        None if no_links_given(&args) => bail!("No links given; pass URLs, --input or --telegram"),
        None => Ok(()),
    }
}

fn no_links_given(args: &Args) -> bool {
    args.urls.is_empty() && args.input.is_none()
}

/// Directory holding the configuration file, where `error.log` goes.
fn config_dir(config_path: &Path) -> PathBuf {
    match config_path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
        _ => PathBuf::from("."),
    }
}

fn build_catalogs(config: &AppConfig) -> anyhow::Result<HashMap<Store, Arc<dyn Catalog>>> {
    let mut catalogs: HashMap<Store, Arc<dyn Catalog>> = HashMap::new();
    for store in [Store::Beatport, Store::Beatsource] {
        let catalog_config = config.catalog_config(store);
        if catalog_config.access_token.as_deref().is_none_or(|t| t.trim().is_empty()) {
            continue;
        }
        let catalog = HttpCatalog::new(catalog_config)
            .with_context(|| format!("Failed to create the {store} client"))?;
        catalogs.insert(store, Arc::new(catalog));
    }
    if catalogs.is_empty() {
        bail!("No catalog access token configured (set BEATPORT_ACCESS_TOKEN or BEATSOURCE_ACCESS_TOKEN)");
    }
    Ok(catalogs)
}

async fn serve_chat(runner: &BatchRunner, client: Arc<TelegramClient>) -> anyhow::Result<()> {
    let cancel = CancellationToken::new();
    let shutdown = cancel.clone();
    tokio::spawn(async move {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!(error = %e, "Failed to listen for Ctrl-C");
            return;
        }
        info!("Shutting down");
        shutdown.cancel();
    });

    let (tx, rx) = mpsc::channel(CHAT_QUEUE_CAPACITY);
    let filter = InboundFilter::from_config(client.config());
    let listener = tokio::spawn(listener::listen(client, filter, tx, cancel.clone()));

    runner.serve(rx, cancel.clone()).await;
    cancel.cancel();
    listener.await.context("Chat listener panicked")?;
    Ok(())
}
