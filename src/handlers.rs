use std::sync::Arc;

use chrono::Local;
use eyre::Result;
use log::{debug, error, info, warn};
use teloxide::payloads::setters::*;
use teloxide::prelude::*;
use teloxide::types::{CallbackQuery, MessageId, ParseMode};

use crate::config::Config;
use crate::download::{DownloadJob, DownloadPool, SubmitError};
use crate::router::{CallbackAction, Command, GrantArgs, Link};
use crate::subscription::SubscriptionStore;
use crate::youtube::YouTube;
use crate::{extract_playlist_id, is_youtube_url, ui};

/// Everything a handler needs
pub struct App {
    pub bot: Bot,
    pub config: Config,
    pub store: Arc<SubscriptionStore>,
    pub youtube: YouTube,
    pub pool: DownloadPool,
}

/// Handle a text message; errors returned here are unexpected and get a generic reply
pub async fn handle_message(app: &App, msg: &Message) -> Result<()> {
    let (Some(text), Some(user)) = (msg.text(), msg.from.as_ref()) else {
        return Ok(());
    };
    let user_id = user.id.0;
    let chat_id = msg.chat.id;

    match Command::parse(text) {
        Command::Start => start(app, chat_id, user_id).await,
        Command::Help => {
            let text = ui::help_text(app.store.is_admin(user_id));
            app.bot.send_message(chat_id, text).await?;
            Ok(())
        }
        Command::Search(query) => search(app, chat_id, user_id, &query).await,
        Command::Playlist(url) => playlist(app, chat_id, user_id, url.as_deref()).await,
        Command::AddSubscription(args) => add_subscription(app, chat_id, user_id, &args).await,
        Command::MySubscription => my_subscription(app, chat_id, user_id).await,
        Command::Unknown(name) => {
            debug!("Unknown command /{name} from {user_id}");
            app.bot
                .send_message(chat_id, format!("Unknown command /{name}. Send /help for the list of commands."))
                .await?;
            Ok(())
        }
        Command::Url(text) => url(app, chat_id, user_id, &text).await,
    }
}

async fn start(app: &App, chat_id: ChatId, user_id: u64) -> Result<()> {
    if app.store.is_entitled(user_id)? {
        app.bot.send_message(chat_id, ui::WELCOME_SUBSCRIBED).await?;
    } else {
        app.bot
            .send_message(
                chat_id,
                ui::welcome_unsubscribed(&app.config.subscription_price, &app.config.payment_info),
            )
            .reply_markup(ui::subscribe_keyboard())
            .await?;
    }
    Ok(())
}

async fn search(app: &App, chat_id: ChatId, user_id: u64, query: &str) -> Result<()> {
    if !gate(app, chat_id, user_id).await? {
        return Ok(());
    }
    if query.is_empty() {
        app.bot.send_message(chat_id, ui::SEARCH_USAGE).await?;
        return Ok(());
    }

    app.bot.send_message(chat_id, ui::searching(query)).await?;
    let results = match app.youtube.search(query, app.config.max_search_results).await {
        Ok(results) => results,
        Err(e) => {
            error!("Search for {query:?} failed: {e:#}");
            app.bot.send_message(chat_id, ui::error(&e.to_string())).await?;
            return Ok(());
        }
    };

    if results.is_empty() {
        app.bot.send_message(chat_id, ui::NO_RESULTS).await?;
        return Ok(());
    }

    app.bot
        .send_message(chat_id, ui::search_heading(results.len()))
        .reply_markup(ui::search_keyboard(&results))
        .await?;
    Ok(())
}

async fn playlist(app: &App, chat_id: ChatId, user_id: u64, url: Option<&str>) -> Result<()> {
    if !gate(app, chat_id, user_id).await? {
        return Ok(());
    }
    let Some(url) = url else {
        app.bot.send_message(chat_id, ui::PLAYLIST_USAGE).await?;
        return Ok(());
    };
    let Some(playlist_id) = extract_playlist_id(url) else {
        app.bot.send_message(chat_id, ui::INVALID_PLAYLIST_URL).await?;
        return Ok(());
    };
    show_playlist(app, chat_id, &playlist_id).await
}

async fn show_playlist(app: &App, chat_id: ChatId, playlist_id: &str) -> Result<()> {
    match app.youtube.playlist(playlist_id).await {
        Ok(playlist) => {
            app.bot.send_message(chat_id, ui::playlist_found(&playlist)).await?;
            app.bot
                .send_message(chat_id, "Select download option:")
                .reply_markup(ui::playlist_keyboard(&playlist.id))
                .await?;
        }
        Err(e) => {
            error!("Playlist error for {playlist_id}: {e:#}");
            app.bot.send_message(chat_id, ui::error(&e.to_string())).await?;
        }
    }
    Ok(())
}

async fn url(app: &App, chat_id: ChatId, user_id: u64, text: &str) -> Result<()> {
    if !gate(app, chat_id, user_id).await? {
        return Ok(());
    }
    let link = is_youtube_url(text).then(|| Link::parse(text)).flatten();
    let (video_id, playlist_id) = match link {
        Some(Link::Video { video_id, playlist_id }) => (video_id, playlist_id),
        Some(Link::Playlist { playlist_id }) => return show_playlist(app, chat_id, &playlist_id).await,
        None => {
            app.bot.send_message(chat_id, ui::INVALID_URL).await?;
            return Ok(());
        }
    };

    match app.youtube.video(&video_id).await {
        Ok(mut info) => {
            // the list the link was opened from offers a whole-playlist download
            if playlist_id.is_some() {
                info.playlist_id = playlist_id;
            }
            app.bot
                .send_message(chat_id, ui::options_text(&info))
                .parse_mode(ParseMode::Html)
                .reply_markup(ui::options_keyboard(&info))
                .await?;
        }
        Err(e) => {
            error!("Error resolving {video_id}: {e:#}");
            app.bot.send_message(chat_id, ui::error(&e.to_string())).await?;
        }
    }
    Ok(())
}

async fn add_subscription(app: &App, chat_id: ChatId, user_id: u64, args: &[String]) -> Result<()> {
    if !app.store.is_admin(user_id) {
        warn!("User {user_id} tried to grant a subscription");
        app.bot.send_message(chat_id, ui::ADMIN_ONLY).await?;
        return Ok(());
    }

    let grant = match GrantArgs::parse(args, app.config.default_grant_days) {
        Ok(grant) => grant,
        Err(usage) => {
            app.bot.send_message(chat_id, usage).await?;
            return Ok(());
        }
    };

    let sub = app.store.grant(grant.user_id, grant.days)?;
    app.bot
        .send_message(chat_id, ui::granted_admin(grant.user_id, &sub))
        .await?;

    // the user may never have started a chat with the bot
    if let Err(e) = app
        .bot
        .send_message(ChatId(grant.user_id as i64), ui::granted_user(&sub))
        .await
    {
        warn!("Could not notify user {} about their subscription: {e}", grant.user_id);
    }
    Ok(())
}

async fn my_subscription(app: &App, chat_id: ChatId, user_id: u64) -> Result<()> {
    let sub = app.store.get(user_id)?;
    let today = Local::now().date_naive();
    let text = ui::subscription_status(sub.as_ref(), today, app.store.is_admin(user_id));
    app.bot.send_message(chat_id, text).await?;
    Ok(())
}

/// Reply with the subscribe prompt unless the user is entitled
async fn gate(app: &App, chat_id: ChatId, user_id: u64) -> Result<bool> {
    if app.store.is_entitled(user_id)? {
        return Ok(true);
    }
    debug!("User {user_id} is not subscribed");
    app.bot.send_message(chat_id, ui::NOT_SUBSCRIBED).await?;
    Ok(false)
}

/// Handle an inline button press
pub async fn handle_callback(app: &App, query: &CallbackQuery) -> Result<()> {
    // dismiss the loading spinner whatever happens next
    if let Err(e) = app.bot.answer_callback_query(&query.id).await {
        debug!("Failed to answer callback query: {e}");
    }

    let Some(data) = query.data.as_deref() else {
        return Ok(());
    };
    let Some(message) = query.message.as_ref() else {
        return Ok(());
    };
    let chat_id = message.chat().id;
    let message_id = message.id();
    let user_id = query.from.id.0;

    let Some(action) = CallbackAction::parse(data) else {
        warn!("Unrecognised callback data {data:?} from {user_id}");
        return Ok(());
    };

    if action == CallbackAction::Subscribe {
        app.bot
            .send_message(
                chat_id,
                ui::subscribe_instructions(user_id, &app.config.subscription_price, &app.config.payment_info),
            )
            .await?;
        return Ok(());
    }

    if !app.store.is_entitled(user_id)? {
        app.bot
            .edit_message_text(chat_id, message_id, ui::NOT_SUBSCRIBED)
            .await?;
        return Ok(());
    }

    match action {
        CallbackAction::Subscribe => Ok(()),
        CallbackAction::Select { video_id } => select(app, chat_id, message_id, &video_id).await,
        CallbackAction::PlaylistMenu { playlist_id } => playlist_menu(app, chat_id, message_id, &playlist_id).await,
        CallbackAction::Download { kind, video_id, itag } => {
            let job = DownloadJob::Single {
                chat_id,
                status: message_id,
                video_id,
                kind,
                itag,
            };
            enqueue(app, chat_id, message_id, job).await
        }
        CallbackAction::DownloadPlaylist { kind, playlist_id } => {
            let job = DownloadJob::Playlist {
                chat_id,
                status: message_id,
                playlist_id,
                kind,
            };
            enqueue(app, chat_id, message_id, job).await
        }
    }
}

async fn select(app: &App, chat_id: ChatId, message_id: MessageId, video_id: &str) -> Result<()> {
    match app.youtube.video(video_id).await {
        Ok(info) => {
            app.bot
                .edit_message_text(chat_id, message_id, ui::options_text(&info))
                .parse_mode(ParseMode::Html)
                .reply_markup(ui::options_keyboard(&info))
                .await?;
        }
        Err(e) => {
            error!("Error in video selection for {video_id}: {e:#}");
            app.bot
                .edit_message_text(chat_id, message_id, ui::error(&e.to_string()))
                .await?;
        }
    }
    Ok(())
}

async fn playlist_menu(app: &App, chat_id: ChatId, message_id: MessageId, playlist_id: &str) -> Result<()> {
    match app.youtube.playlist(playlist_id).await {
        Ok(playlist) => {
            app.bot
                .edit_message_text(chat_id, message_id, ui::playlist_found(&playlist))
                .reply_markup(ui::playlist_keyboard(&playlist.id))
                .await?;
        }
        Err(e) => {
            error!("Playlist init error for {playlist_id}: {e:#}");
            app.bot
                .edit_message_text(chat_id, message_id, ui::error(&e.to_string()))
                .await?;
        }
    }
    Ok(())
}

/// Hand a job to the worker pool; the pressed message becomes its status line
async fn enqueue(app: &App, chat_id: ChatId, message_id: MessageId, job: DownloadJob) -> Result<()> {
    app.bot
        .edit_message_text(chat_id, message_id, ui::QUEUED)
        .await?;

    match app.pool.submit(job) {
        Ok(()) => {
            info!("Queued download in chat {}", chat_id.0);
        }
        Err(e) => {
            warn!("Rejected {:?}: {e}", e.job());
            let text = match e {
                SubmitError::Full(_) => ui::QUEUE_FULL,
                SubmitError::Closed(_) => ui::SHUTTING_DOWN,
            };
            app.bot.edit_message_text(chat_id, message_id, text).await?;
        }
    }
    Ok(())
}
