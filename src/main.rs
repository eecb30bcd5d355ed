use clap::Parser;
use comic_harvest::adapters::cache::KaggleCache;
use comic_harvest::adapters::kaggle_api::KaggleApi;
use comic_harvest::adapters::kaggle_cli::KaggleCli;
use comic_harvest::config::cli::{report_error, CommonArgs};
use comic_harvest::config::credentials::KaggleCredentials;
use comic_harvest::core::downloader::{Downloader, DownloaderSettings, PlanStatus};
use comic_harvest::domain::ports::DatasetSource;
use comic_harvest::utils::logger;
use comic_harvest::utils::monitor::SystemMonitor;
use comic_harvest::{DatasetRef, HarvestConfig, KaggleBackend, LocalStorage};
use std::path::Path;

#[derive(Parser)]
#[command(name = "comic-harvest")]
#[command(about = "Download curated and discovered comic datasets from Kaggle")]
struct Args {
    #[command(flatten)]
    common: CommonArgs,

    /// Only download the curated list (Phase A)
    #[arg(long)]
    skip_search: bool,

    /// Override how many search results are taken per term
    #[arg(long)]
    max_per_term: Option<usize>,

    /// Override the Kaggle backend from config
    #[arg(long, value_enum)]
    backend: Option<KaggleBackend>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    // 初始化日誌
    logger::init_cli_logger(args.common.verbose, args.common.log_format);

    tracing::info!("🚀 Starting comic-harvest");

    let mut config = match args.common.load_config() {
        Ok(config) => config,
        Err(e) => {
            report_error("Configuration", &e);
            std::process::exit(1);
        }
    };

    if let Some(max) = args.max_per_term {
        config.kaggle.max_per_term = max;
        tracing::info!("🔧 max_per_term overridden to: {}", max);
    }
    if let Some(backend) = args.backend {
        config.kaggle.backend = backend;
    }

    let curated = config.curated_datasets()?;

    let credentials = match KaggleCredentials::resolve() {
        Ok(credentials) => credentials,
        Err(e) => {
            report_error("Credential check", &e);
            std::process::exit(1);
        }
    };
    tracing::info!("✅ Kaggle credentials found for {}", credentials.username);

    let exit_code = match config.kaggle.backend {
        KaggleBackend::Api => {
            let source = KaggleApi::new(&config.kaggle.api_base, credentials, config.request_timeout())?;
            harvest(source, &config, &curated, &args).await?
        }
        KaggleBackend::Cli => {
            // CLI 透過環境變數或 kaggle.json 自行認證
            let source = KaggleCli::new(config.request_timeout());
            harvest(source, &config, &curated, &args).await?
        }
    };

    if exit_code > 0 {
        std::process::exit(exit_code);
    }
    Ok(())
}

async fn harvest<S: DatasetSource>(
    source: S,
    config: &HarvestConfig,
    curated: &[DatasetRef],
    args: &Args,
) -> anyhow::Result<i32> {
    let root = Path::new(&config.paths.root);
    let cache = match &config.paths.cache_dir {
        Some(dir) => KaggleCache::new(root.join(dir)),
        None => KaggleCache::from_env(),
    };
    let settings = DownloaderSettings {
        base_dir: root.join(&config.paths.base_dir),
        manifest_key: config.paths.manifest.clone(),
        error_log_key: config.paths.error_log.clone(),
        summary_key: config.paths.summary.clone(),
        retry: config.retry_policy(),
        checkpoint_every: config.kaggle.checkpoint_every,
    };

    let storage = LocalStorage::new(root);
    let monitor = SystemMonitor::new(args.common.monitor);
    if monitor.is_enabled() {
        tracing::info!("🔍 System monitoring enabled");
    }
    let mut downloader = Downloader::open(source, storage, cache, settings)
        .await?
        .with_monitor(monitor);

    if args.common.dry_run {
        perform_dry_run(&downloader, config, curated, args.skip_search);
        return Ok(0);
    }

    let terms = &config.kaggle.search_terms;
    let max_per_term = config.kaggle.max_per_term;

    let outcome = tokio::select! {
        res = downloader.run(curated, terms, max_per_term, args.skip_search) => Some(res),
        _ = tokio::signal::ctrl_c() => None,
    };

    match outcome {
        Some(Ok(totals)) => {
            tracing::info!("✅ Download complete!");
            println!("✅ Downloaded: {} | ❌ Failed: {}", totals.downloaded, totals.failed);
            Ok(0)
        }
        Some(Err(e)) => {
            if let Err(save_err) = downloader.save_manifest().await {
                tracing::error!("❌ Could not save manifest: {}", save_err);
            }
            Ok(report_error("Download", &e))
        }
        None => {
            tracing::warn!("⚠️  Interrupted by user");
            downloader.save_manifest().await?;
            println!("💾 Progress saved to {}", config.paths.manifest);
            Ok(0)
        }
    }
}

fn perform_dry_run<S: DatasetSource>(
    downloader: &Downloader<S, LocalStorage>,
    config: &HarvestConfig,
    curated: &[DatasetRef],
    skip_search: bool,
) {
    println!("🔍 Dry Run Analysis:");
    println!("  Backend: {:?}", config.kaggle.backend);
    println!("  Base directory: {}", config.paths.base_dir);
    println!("  Manifest: {}", config.paths.manifest);
    println!();

    println!("📋 Phase A: {} curated datasets", curated.len());
    for dataset in curated {
        let status = match downloader.plan(dataset) {
            PlanStatus::InManifest => "already downloaded",
            PlanStatus::Cached => "in cache",
            PlanStatus::Download => "will download",
        };
        println!("  {} ({})", dataset, status);
    }

    println!();
    if skip_search {
        println!("🔍 Phase B: skipped (--skip-search)");
    } else {
        println!(
            "🔍 Phase B: {} search terms, up to {} results each",
            config.kaggle.search_terms.len(),
            config.kaggle.max_per_term
        );
        for term in &config.kaggle.search_terms {
            println!("  - {}", term);
        }
    }
}
