use crate::config::toml_config::HarvestConfig;
use crate::utils::error::HarvestError;
use crate::utils::logger::LogFormat;
use crate::utils::validation::Validate;
use clap::Args;
use std::path::PathBuf;

/// 三個執行檔共用的旗標
#[derive(Debug, Clone, Args)]
pub struct CommonArgs {
    /// Path to a TOML configuration file
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Root directory all relative data paths resolve against
    #[arg(long)]
    pub root: Option<String>,

    /// Enable verbose output
    #[arg(short, long)]
    pub verbose: bool,

    #[arg(long, value_enum, default_value_t = LogFormat::Compact)]
    pub log_format: LogFormat,

    /// Log CPU / memory usage per phase
    #[arg(long)]
    pub monitor: bool,

    /// Show what would be processed without touching the network
    #[arg(long)]
    pub dry_run: bool,
}

impl CommonArgs {
    pub fn apply(&self, config: &mut HarvestConfig) {
        if let Some(root) = &self.root {
            config.paths.root = root.clone();
            tracing::info!("🔧 Data root overridden to: {}", root);
        }
    }

    /// 讀取設定檔、套用旗標並驗證
    pub fn load_config(&self) -> Result<HarvestConfig, HarvestError> {
        let mut config = HarvestConfig::load(self.config.as_deref())?;
        self.apply(&mut config);
        config.validate()?;
        Ok(config)
    }
}

/// 記錄錯誤並回傳對應的退出碼
pub fn report_error(context: &str, e: &HarvestError) -> i32 {
    tracing::error!(
        "❌ {} failed: {} (Category: {:?}, Severity: {:?})",
        context,
        e,
        e.category(),
        e.severity()
    );
    tracing::error!("💡 Recovery suggestion: {}", e.recovery_suggestion());

    eprintln!("❌ {}", e.user_friendly_message());
    eprintln!("💡 建議: {}", e.recovery_suggestion());
    e.exit_code()
}
