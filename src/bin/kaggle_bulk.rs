use clap::Parser;
use comic_harvest::adapters::kaggle_api::KaggleApi;
use comic_harvest::adapters::kaggle_cli::KaggleCli;
use comic_harvest::config::cli::{report_error, CommonArgs};
use comic_harvest::config::credentials::KaggleCredentials;
use comic_harvest::core::bulk::{safe_term, BulkHarvester, BulkSettings};
use comic_harvest::domain::ports::DatasetSource;
use comic_harvest::utils::logger;
use comic_harvest::utils::monitor::SystemMonitor;
use comic_harvest::{HarvestConfig, KaggleBackend, LocalStorage};
use std::path::Path;

#[derive(Parser)]
#[command(name = "kaggle-bulk")]
#[command(about = "Search every category term on Kaggle and download all matching datasets")]
struct Args {
    #[command(flatten)]
    common: CommonArgs,

    /// Override the Kaggle backend from config
    #[arg(long, value_enum)]
    backend: Option<KaggleBackend>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    // 初始化日誌
    logger::init_cli_logger(args.common.verbose, args.common.log_format);

    tracing::info!("🚀 Starting kaggle-bulk");

    let mut config = match args.common.load_config() {
        Ok(config) => config,
        Err(e) => {
            report_error("Configuration", &e);
            std::process::exit(1);
        }
    };
    if let Some(backend) = args.backend {
        config.kaggle.backend = backend;
    }

    if args.common.dry_run {
        perform_dry_run(&config);
        return Ok(());
    }

    let credentials = match KaggleCredentials::resolve() {
        Ok(credentials) => credentials,
        Err(e) => {
            report_error("Credential check", &e);
            std::process::exit(1);
        }
    };

    let exit_code = match config.kaggle.backend {
        KaggleBackend::Api => {
            let source = KaggleApi::new(&config.kaggle.api_base, credentials, config.request_timeout())?;
            harvest(source, &config, args.common.monitor).await?
        }
        KaggleBackend::Cli => harvest(KaggleCli::new(config.request_timeout()), &config, args.common.monitor).await?,
    };

    if exit_code > 0 {
        std::process::exit(exit_code);
    }
    Ok(())
}

fn bulk_key(config: &HarvestConfig, name: &str) -> String {
    format!("{}/{}", config.paths.base_dir.trim_end_matches('/'), name)
}

async fn harvest<S: DatasetSource>(source: S, config: &HarvestConfig, monitor: bool) -> anyhow::Result<i32> {
    let root = Path::new(&config.paths.root);
    let settings = BulkSettings {
        base_dir: root.join(&config.paths.base_dir),
        manifest_key: bulk_key(config, "download-manifest.json"),
        error_log_key: bulk_key(config, "download-errors.log"),
        summary_key: bulk_key(config, "dataset-summary.json"),
        retry: config.retry_policy(),
        download_delay: config.download_delay(),
    };

    let mut harvester = BulkHarvester::open(source, LocalStorage::new(root), settings)
        .await?
        .with_monitor(SystemMonitor::new(monitor));

    let outcome = tokio::select! {
        res = harvester.run(&config.kaggle.categories) => Some(res),
        _ = tokio::signal::ctrl_c() => None,
    };

    match outcome {
        Some(Ok(summary)) => {
            tracing::info!("✅ Bulk download complete!");
            println!(
                "✅ {} datasets | {} records ready",
                summary.total_datasets, summary.total_records
            );
            Ok(0)
        }
        Some(Err(e)) => {
            if let Err(save_err) = harvester.save_manifest().await {
                tracing::error!("❌ Could not save manifest: {}", save_err);
            }
            Ok(report_error("Bulk download", &e))
        }
        None => {
            tracing::warn!("⚠️  Interrupted by user");
            harvester.save_manifest().await?;
            println!("💾 Progress saved to {}", bulk_key(config, "download-manifest.json"));
            Ok(0)
        }
    }
}

fn perform_dry_run(config: &HarvestConfig) {
    println!("🔍 Dry Run Analysis:");
    println!("  Backend: {:?}", config.kaggle.backend);
    println!("  Base directory: {}", config.paths.base_dir);
    println!();

    let total_terms: usize = config.kaggle.categories.iter().map(|c| c.terms.len()).sum();
    println!(
        "📂 {} categories, {} search terms",
        config.kaggle.categories.len(),
        total_terms
    );
    for category in &config.kaggle.categories {
        println!("  {}:", category.name);
        for term in &category.terms {
            println!("    - {} → {}/{}/", term, config.paths.base_dir, safe_term(term));
        }
    }
}
