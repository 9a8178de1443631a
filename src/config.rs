use std::path::{Path, PathBuf};

use eyre::{Result, WrapErr, eyre};
use log::debug;
use secrecy::{ExposeSecret, Secret};
use serde::Deserialize;

const DEFAULT_PRICE: &str = "5.00";
const DEFAULT_PAYMENT_INFO: &str = "PayPal: example@example.com";

#[derive(Deserialize)]
#[serde(default)]
pub struct Config {
    /// Bot token from @BotFather
    pub bot_token: Option<Secret<String>>,
    /// Telegram user id that is always entitled and may grant subscriptions
    pub admin_id: Option<u64>,
    pub subscription_price: String,
    pub payment_info: String,
    pub subscriptions_file: PathBuf,
    pub download_workers: usize,
    /// Jobs that may wait for a free worker before requests are turned away
    pub download_queue: usize,
    pub max_search_results: usize,
    pub default_grant_days: u32,
    pub progress_interval_ms: u64,
    /// Telegram rejects bot uploads above 50 MB
    pub max_upload_mb: u64,
    pub yt_dlp: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            bot_token: None,
            admin_id: None,
            subscription_price: DEFAULT_PRICE.to_string(),
            payment_info: DEFAULT_PAYMENT_INFO.to_string(),
            subscriptions_file: PathBuf::from("subscriptions.json"),
            download_workers: 4,
            download_queue: 16,
            max_search_results: 10,
            default_grant_days: 30,
            progress_interval_ms: 1500,
            max_upload_mb: 50,
            yt_dlp: "yt-dlp".to_string(),
        }
    }
}

impl std::fmt::Debug for Config {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Config")
            .field("bot_token", &self.bot_token.as_ref().map(|_| "[REDACTED]"))
            .field("admin_id", &self.admin_id)
            .field("subscription_price", &self.subscription_price)
            .field("subscriptions_file", &self.subscriptions_file)
            .field("download_workers", &self.download_workers)
            .field("download_queue", &self.download_queue)
            .finish_non_exhaustive()
    }
}

impl Config {
    /// Load config from the given path, or ~/.config/ytbot/config.toml if it exists
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let path = path.map(Path::to_path_buf).unwrap_or_else(config_path);
        if path.exists() {
            debug!("Loading config from {}", path.display());
            let content = std::fs::read_to_string(&path)?;
            let config: Config =
                toml::from_str(&content).wrap_err_with(|| format!("invalid config file {}", path.display()))?;
            Ok(config)
        } else {
            debug!("No config file found at {}", path.display());
            Ok(Config::default())
        }
    }

    /// Apply overrides from the process environment
    pub fn apply_env(&mut self) -> Result<()> {
        self.apply_vars(|key| std::env::var(key).ok())
    }

    /// Apply overrides from any variable source; empty values are ignored
    pub fn apply_vars<F>(&mut self, lookup: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());

        if let Some(token) = var("TELEGRAM_BOT_TOKEN") {
            self.bot_token = Some(Secret::new(token));
        }
        if let Some(admin) = var("ADMIN_ID") {
            self.admin_id = Some(admin.parse().wrap_err_with(|| format!("ADMIN_ID is not a user id: {admin}"))?);
        }
        if let Some(price) = var("SUBSCRIPTION_PRICE") {
            self.subscription_price = price;
        }
        if let Some(info) = var("PAYMENT_INFO") {
            self.payment_info = info;
        }
        if let Some(file) = var("YTBOT_SUBSCRIPTIONS_FILE") {
            self.subscriptions_file = PathBuf::from(file);
        }
        if let Some(workers) = var("YTBOT_DOWNLOAD_WORKERS") {
            self.download_workers = workers
                .parse()
                .wrap_err_with(|| format!("YTBOT_DOWNLOAD_WORKERS is not a number: {workers}"))?;
        }
        if let Some(queue) = var("YTBOT_DOWNLOAD_QUEUE") {
            self.download_queue = queue
                .parse()
                .wrap_err_with(|| format!("YTBOT_DOWNLOAD_QUEUE is not a number: {queue}"))?;
        }
        if let Some(bin) = var("YTBOT_YT_DLP") {
            self.yt_dlp = bin;
        }
        Ok(())
    }

    pub fn token(&self) -> Result<&str> {
        self.bot_token
            .as_ref()
            .map(|t| t.expose_secret().as_str())
            .ok_or_else(|| eyre!("TELEGRAM_BOT_TOKEN is not set (environment, .env or config.toml)"))
    }

    pub fn max_upload_bytes(&self) -> u64 {
        self.max_upload_mb * 1024 * 1024
    }
}

pub fn config_path() -> PathBuf {
    dirs::config_dir()
        .unwrap_or_else(|| PathBuf::from(".config"))
        .join("ytbot")
        .join("config.toml")
}
