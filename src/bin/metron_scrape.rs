use clap::Parser;
use comic_harvest::adapters::metron::MetronClient;
use comic_harvest::config::cli::{report_error, CommonArgs};
use comic_harvest::config::credentials::MetronCredentials;
use comic_harvest::config::toml_config::METRON_RESOURCES;
use comic_harvest::core::metron_scrape::{MetronScraper, ScrapeSettings};
use comic_harvest::utils::logger;
use comic_harvest::utils::monitor::SystemMonitor;
use comic_harvest::{HarvestConfig, LocalStorage};
use std::path::Path;
use std::time::Duration;

#[derive(Parser)]
#[command(name = "metron-scrape")]
#[command(about = "Page through the Metron comic database and normalize characters")]
struct Args {
    #[command(flatten)]
    common: CommonArgs,

    /// Resource to scrape (repeatable), e.g. character, team, series
    #[arg(long = "resource")]
    resources: Vec<String>,

    /// Stop each resource after this many pages
    #[arg(long)]
    max_pages: Option<u32>,

    /// Only keep list data, skip per-item detail requests
    #[arg(long)]
    no_details: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    // 初始化日誌
    logger::init_cli_logger(args.common.verbose, args.common.log_format);

    tracing::info!("🚀 Starting metron-scrape");

    let mut config = match args.common.load_config() {
        Ok(config) => config,
        Err(e) => {
            report_error("Configuration", &e);
            std::process::exit(1);
        }
    };

    if !args.resources.is_empty() {
        config.metron.resources = args.resources.clone();
    }
    if args.max_pages.is_some() {
        config.metron.max_pages = args.max_pages;
    }
    if args.no_details {
        config.metron.fetch_details = false;
    }

    if let Some(unknown) = config
        .metron
        .resources
        .iter()
        .find(|r| !METRON_RESOURCES.contains(&r.as_str()))
    {
        eprintln!("❌ Unknown Metron resource '{}'", unknown);
        eprintln!("💡 Valid resources: {}", METRON_RESOURCES.join(", "));
        std::process::exit(1);
    }

    if args.common.dry_run {
        perform_dry_run(&config);
        return Ok(());
    }

    let credentials = match MetronCredentials::resolve() {
        Ok(credentials) => credentials,
        Err(e) => {
            report_error("Credential check", &e);
            std::process::exit(1);
        }
    };

    let client = MetronClient::new(
        &config.metron.api_base,
        credentials,
        Duration::from_millis(config.metron.rate_limit_ms),
        Duration::from_secs(config.metron.request_timeout_seconds),
    )?;

    let root = Path::new(&config.paths.root);
    let settings = ScrapeSettings {
        output_dir: config.metron.output_dir.clone(),
        manifest_key: config.metron.manifest.clone(),
        error_log_key: config.metron.error_log.clone(),
        max_pages: config.metron.max_pages,
        fetch_details: config.metron.fetch_details,
        retry: config.retry_policy(),
    };

    let mut scraper = MetronScraper::open(client, LocalStorage::new(root), settings)
        .await?
        .with_monitor(SystemMonitor::new(args.common.monitor));

    let outcome = tokio::select! {
        res = scraper.run(&config.metron.resources) => Some(res),
        _ = tokio::signal::ctrl_c() => None,
    };

    match outcome {
        Some(Ok(totals)) => {
            tracing::info!("✅ Scrape complete!");
            println!(
                "✅ Scraped: {} | ⏭️  Skipped: {} | ❌ Failed: {}",
                totals.scraped, totals.skipped, totals.failed
            );
        }
        Some(Err(e)) => {
            if let Err(save_err) = scraper.save_progress().await {
                tracing::error!("❌ Could not save progress: {}", save_err);
            }
            let exit_code = report_error("Scrape", &e);
            if exit_code > 0 {
                std::process::exit(exit_code);
            }
        }
        None => {
            tracing::warn!("⚠️  Interrupted by user");
            scraper.save_progress().await?;
            println!("💾 Progress saved to {}", config.metron.manifest);
        }
    }

    Ok(())
}

fn perform_dry_run(config: &HarvestConfig) {
    println!("🔍 Dry Run Analysis:");
    println!("  API: {}", config.metron.api_base);
    println!("  Resources: {}", config.metron.resources.join(", "));
    match config.metron.max_pages {
        Some(max) => println!("  Max pages per resource: {}", max),
        None => println!("  Max pages per resource: unlimited"),
    }
    println!("  Fetch details: {}", config.metron.fetch_details);
    println!("  Rate limit: one request every {}ms", config.metron.rate_limit_ms);
    println!("  Output: {}/<resource>.json", config.metron.output_dir);
}
