use std::sync::Arc;
use std::time::Duration;

use eyre::{Result, WrapErr};
use log::{debug, error, info, warn};
use teloxide::prelude::*;
use teloxide::types::{AllowedUpdate, BotCommand, Update, UpdateKind};
use teloxide::{ApiError, RequestError};

use crate::config::Config;
use crate::download::{DownloadPool, Downloader};
use crate::handlers::{self, App};
use crate::subscription::SubscriptionStore;
use crate::youtube::YouTube;
use crate::ui;

/// Long-poll timeout passed to getUpdates
const POLL_TIMEOUT_SECS: u32 = 30;

/// Must exceed the long-poll timeout so the client does not abort idle polls
const POLL_CLIENT_TIMEOUT: Duration = Duration::from_secs(45);

/// Uploads of up to 50 MB can take a while on slow links
const UPLOAD_TIMEOUT: Duration = Duration::from_secs(300);

const RETRY_DELAY: Duration = Duration::from_secs(5);

/// Connect to Telegram and serve updates until Ctrl-C
pub async fn run(config: Config, store: Arc<SubscriptionStore>) -> Result<()> {
    let token = config.token()?.to_string();

    let client = teloxide::net::default_reqwest_settings()
        .timeout(POLL_CLIENT_TIMEOUT)
        .build()?;
    let bot = Bot::with_client(&token, client);

    let upload_client = teloxide::net::default_reqwest_settings()
        .timeout(UPLOAD_TIMEOUT)
        .build()?;
    let upload_bot = Bot::with_client(&token, upload_client);

    let me = bot.get_me().await.wrap_err("failed to verify bot token")?;

    // long polling does not work while a webhook is set
    bot.delete_webhook().await?;

    let commands = vec![
        BotCommand::new("start", "Welcome and subscription info"),
        BotCommand::new("search", "Search YouTube"),
        BotCommand::new("playlist", "Download a playlist"),
        BotCommand::new("mysub", "Show your subscription"),
        BotCommand::new("help", "Show available commands"),
    ];
    if let Err(e) = bot.set_my_commands(commands).await {
        warn!("Failed to register bot commands: {e}");
    }

    if config.admin_id.is_none() {
        warn!("No admin id configured; /addsub is disabled");
    }

    info!(
        "Connected as @{} (admin: {:?}, subscriptions: {})",
        me.username.as_deref().unwrap_or("?"),
        config.admin_id,
        store.path().display()
    );

    let youtube = YouTube::new(config.yt_dlp.clone())?;
    let downloader = Arc::new(Downloader::new(
        upload_bot,
        youtube.clone(),
        config.max_upload_bytes(),
        Duration::from_millis(config.progress_interval_ms),
    ));
    let pool = DownloadPool::start(downloader, config.download_workers, config.download_queue);

    let app = App {
        bot,
        config,
        store,
        youtube,
        pool,
    };

    tokio::select! {
        _ = poll(&app) => {}
        result = tokio::signal::ctrl_c() => {
            if let Err(e) = result {
                error!("Failed to listen for Ctrl-C: {e}");
            }
            info!("Shutting down, waiting for running downloads");
        }
    }

    app.pool.shutdown().await;
    info!("Stopped");
    Ok(())
}

async fn poll(app: &App) {
    info!("Starting polling loop");
    let mut offset: i32 = 0;

    loop {
        let result = app
            .bot
            .get_updates()
            .offset(offset)
            .timeout(POLL_TIMEOUT_SECS)
            .allowed_updates(vec![AllowedUpdate::Message, AllowedUpdate::CallbackQuery])
            .await;

        match result {
            Ok(updates) => {
                if !updates.is_empty() {
                    debug!("Got {} updates", updates.len());
                }
                for update in updates {
                    offset = update.id.as_offset();
                    dispatch(app, update).await;
                }
            }
            Err(RequestError::Api(ApiError::TerminatedByOtherGetUpdates)) => {
                warn!("Another instance is polling with this token; retrying in {RETRY_DELAY:?}");
                tokio::time::sleep(RETRY_DELAY).await;
            }
            Err(e) => {
                warn!("getUpdates failed: {e}; retrying in {RETRY_DELAY:?}");
                tokio::time::sleep(RETRY_DELAY).await;
            }
        }
    }
}

/// Handle one update; failures are logged and the user gets a generic reply
async fn dispatch(app: &App, update: Update) {
    match update.kind {
        UpdateKind::Message(msg) => {
            debug!("Message in chat {}", msg.chat.id.0);
            if let Err(e) = handlers::handle_message(app, &msg).await {
                error!("Error handling message in chat {}: {e:#}", msg.chat.id.0);
                notify_failure(app, msg.chat.id).await;
            }
        }
        UpdateKind::CallbackQuery(query) => {
            debug!("Callback {:?} from {}", query.data, query.from.id.0);
            if let Err(e) = handlers::handle_callback(app, &query).await {
                error!("Error handling callback {:?}: {e:#}", query.data);
                if let Some(message) = &query.message {
                    notify_failure(app, message.chat().id).await;
                }
            }
        }
        other => debug!("Ignoring update: {other:?}"),
    }
}

async fn notify_failure(app: &App, chat_id: ChatId) {
    if let Err(e) = app.bot.send_message(chat_id, ui::GENERIC_ERROR).await {
        warn!("Failed to send error notice to chat {}: {e}", chat_id.0);
    }
}
