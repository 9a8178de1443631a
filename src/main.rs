use std::path::PathBuf;
use std::process::Command;
use std::sync::Arc;

use chrono::Local;
use eyre::{Result, ensure};
use log::{debug, info};

mod cli;

use cli::Cli;
use ytbot::config::{Config, config_path};
use ytbot::subscription::SubscriptionStore;

fn setup_logging(to_stderr: bool) -> Result<()> {
    let mut builder = env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"));

    if to_stderr {
        builder.init();
        return Ok(());
    }

    let log_dir = log_dir();
    std::fs::create_dir_all(&log_dir)?;
    let log_file = log_dir.join("ytbot.log");

    let target = Box::new(std::fs::OpenOptions::new().create(true).append(true).open(&log_file)?);
    builder.target(env_logger::Target::Pipe(target)).init();

    info!("Logging initialized: {}", log_file.display());
    Ok(())
}

fn log_dir() -> PathBuf {
    dirs::data_local_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("ytbot")
        .join("logs")
}

fn tool_version(name: &str) -> Option<String> {
    Command::new(name)
        .arg("--version")
        .output()
        .ok()
        .filter(|o| o.status.success())
        .map(|o| {
            String::from_utf8_lossy(&o.stdout)
                .trim()
                .lines()
                .next()
                .unwrap_or("")
                .to_string()
        })
}

fn build_after_help() -> String {
    let yt_dlp_line = match tool_version("yt-dlp") {
        Some(v) => format!("  \x1b[32m✅\x1b[0m yt-dlp     {v}"),
        None => "  \x1b[31m❌\x1b[0m yt-dlp     (not found, needed for search and downloads)".to_string(),
    };

    format!(
        "\nREQUIRED TOOLS:\n{yt_dlp_line}\n\n\
         ENVIRONMENT:\n  TELEGRAM_BOT_TOKEN, ADMIN_ID, SUBSCRIPTION_PRICE, PAYMENT_INFO\n\n\
         Config file: {}\nLogs are written to: {}",
        config_path().display(),
        log_dir().join("ytbot.log").display()
    )
}

#[tokio::main]
async fn main() -> Result<()> {
    let after_help = build_after_help();
    let cmd = <Cli as clap::CommandFactory>::command().after_help(after_help);
    let matches = cmd.get_matches();
    let cli = <Cli as clap::FromArgMatches>::from_arg_matches(&matches)?;

    setup_logging(cli.log_stderr)?;

    // .env is optional
    if let Ok(path) = dotenvy::dotenv() {
        debug!("Loaded environment from {}", path.display());
    }

    let mut config = Config::load(cli.config.as_deref())?;
    config.apply_env()?;
    if let Some(path) = cli.subscriptions {
        config.subscriptions_file = path;
    }
    debug!("Config: {config:?}");

    let store = Arc::new(SubscriptionStore::open(&config.subscriptions_file, config.admin_id)?);

    match cli.command.unwrap_or(cli::Command::Run) {
        cli::Command::Run => ytbot::bot::run(config, store).await,
        cli::Command::Grant { user_id, days } => {
            let days = days.unwrap_or(config.default_grant_days);
            ensure!(days > 0, "default_grant_days must be at least 1");
            let sub = store.grant(user_id, days)?;
            println!("User {user_id}: {} until {}", sub.plan_label, sub.expiry_date);
            Ok(())
        }
        cli::Command::Status { user_id } => {
            let today = Local::now().date_naive();
            match store.get(user_id)? {
                Some(sub) => println!("User {user_id}: {} until {}", sub.plan_label, sub.expiry_date),
                None => println!("User {user_id}: no subscription record"),
            }
            println!("Entitled today ({today}): {}", store.is_entitled_on(user_id, today)?);
            Ok(())
        }
    }
}
