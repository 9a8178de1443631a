use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser)]
#[command(
    name = "ytbot",
    about = "Telegram bot for searching and downloading YouTube videos",
    version = env!("GIT_DESCRIBE"),
)]
pub struct Cli {
    /// Config file (default: ~/.config/ytbot/config.toml)
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Subscriptions file, overrides config and environment
    #[arg(short, long)]
    pub subscriptions: Option<PathBuf>,

    /// Log to stderr instead of the log file
    #[arg(long)]
    pub log_stderr: bool,

    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(Debug, Clone, PartialEq, Eq, Subcommand)]
pub enum Command {
    /// Start the bot (default)
    Run,

    /// Grant a subscription from today, replacing any existing one
    Grant {
        user_id: u64,

        /// Days of access (default: default_grant_days from config)
        #[arg(value_parser = clap::value_parser!(u32).range(1..))]
        days: Option<u32>,
    },

    /// Show a user's subscription and whether they are entitled today
    Status { user_id: u64 },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_is_run() {
        let cli = Cli::try_parse_from(["ytbot"]).unwrap();
        assert!(cli.command.is_none());
        assert!(!cli.log_stderr);
    }

    #[test]
    fn test_grant_args() {
        let cli = Cli::try_parse_from(["ytbot", "-s", "/tmp/subs.json", "grant", "42", "30"]).unwrap();
        assert_eq!(cli.subscriptions, Some(PathBuf::from("/tmp/subs.json")));
        assert_eq!(
            cli.command,
            Some(Command::Grant {
                user_id: 42,
                days: Some(30)
            })
        );
    }

    #[test]
    fn test_grant_days_optional() {
        let cli = Cli::try_parse_from(["ytbot", "grant", "42"]).unwrap();
        assert_eq!(cli.command, Some(Command::Grant { user_id: 42, days: None }));
    }

    #[test]
    fn test_grant_rejects_zero_days() {
        assert!(Cli::try_parse_from(["ytbot", "grant", "42", "0"]).is_err());
        assert!(Cli::try_parse_from(["ytbot", "grant", "bob", "3"]).is_err());
    }
}
