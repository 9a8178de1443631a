use chrono::NaiveDate;
use html_escape::encode_text;
use teloxide::types::{InlineKeyboardButton, InlineKeyboardMarkup};

use crate::router::CallbackAction;
use crate::subscription::Subscription;
use crate::{MediaKind, PlaylistInfo, SearchResult, StreamOption, VideoInfo, format_duration, format_views};

pub const NOT_SUBSCRIBED: &str = "Please subscribe to use this feature.";
pub const ADMIN_ONLY: &str = "This command is only available to the administrator.";
pub const INVALID_URL: &str = "Please provide a valid YouTube URL.";
pub const INVALID_PLAYLIST_URL: &str = "Invalid playlist URL. Please provide a valid YouTube playlist URL.";
pub const SEARCH_USAGE: &str = "Please provide a search query. Example: /search funny cats";
pub const PLAYLIST_USAGE: &str = "Please provide a playlist URL. Example: /playlist https://youtube.com/playlist?list=...";
pub const NO_RESULTS: &str = "No videos found. Try a different search term.";
pub const QUEUE_FULL: &str = "⏳ The bot is busy with other downloads right now. Please try again in a few minutes.";
pub const SHUTTING_DOWN: &str = "⏹ The bot is restarting and not taking new downloads. Please try again shortly.";
pub const QUEUED: &str = "⏳ Download queued. It starts as soon as a worker is free.";
pub const GENERIC_ERROR: &str = "Sorry, something went wrong. Please try again later.";

/// Longest title shown on a button before it is cut
const BUTTON_TITLE_CHARS: usize = 48;

pub const WELCOME_SUBSCRIBED: &str = "🎬 Welcome to YouTube Downloader Bot!\n\n\
     You can:\n\
     - Send a YouTube URL to download\n\
     - Use /search to find videos\n\
     - Use /playlist to download a playlist\n\n\
     Enjoy downloading!";

pub fn welcome_unsubscribed(price: &str, payment_info: &str) -> String {
    format!(
        "🎬 Welcome to YouTube Downloader Bot!\n\n\
         This bot requires a subscription to use.\n\
         Price: ${price} per month\n\
         Payment method: {payment_info}\n\n\
         After payment, send the receipt to the admin."
    )
}

pub fn subscribe_keyboard() -> InlineKeyboardMarkup {
    InlineKeyboardMarkup::new(vec![vec![InlineKeyboardButton::callback(
        "Subscribe Now",
        CallbackAction::Subscribe.to_string(),
    )]])
}

pub fn subscribe_instructions(user_id: u64, price: &str, payment_info: &str) -> String {
    format!(
        "💳 Subscription: ${price} per month\n\n\
         1. Pay using: {payment_info}\n\
         2. Send the receipt to the admin together with your user ID: {user_id}\n\n\
         Your access is enabled as soon as the admin confirms the payment."
    )
}

pub fn help_text(is_admin: bool) -> String {
    let mut text = String::from(
        "Commands:\n\
         /start - welcome and subscription info\n\
         /search <query> - search YouTube\n\
         /playlist <url> - download a playlist\n\
         /mysub - show your subscription\n\n\
         Or just send a YouTube link.",
    );
    if is_admin {
        text.push_str("\n\nAdmin:\n/addsub <user_id> [days] - grant a subscription starting today");
    }
    text
}

pub fn subscription_status(sub: Option<&Subscription>, today: NaiveDate, is_admin: bool) -> String {
    if is_admin {
        return "👑 You are the administrator; no subscription needed.".to_string();
    }
    match sub {
        Some(sub) if sub.is_active_on(today) => {
            format!("✅ Subscription active ({}) until {}.", sub.plan_label, sub.expiry_date)
        }
        Some(sub) => format!("⌛ Your subscription expired on {}.", sub.expiry_date),
        None => "You have no subscription. Use /start to see how to subscribe.".to_string(),
    }
}

pub fn granted_admin(user_id: u64, sub: &Subscription) -> String {
    format!(
        "✅ User {user_id} subscribed for {}. Expires on {}.",
        sub.plan_label, sub.expiry_date
    )
}

pub fn granted_user(sub: &Subscription) -> String {
    format!(
        "🎉 Your subscription is active until {}. Send /start to begin.",
        sub.expiry_date
    )
}

pub fn searching(query: &str) -> String {
    format!("🔍 Searching YouTube for: {query}...")
}

pub fn search_keyboard(results: &[SearchResult]) -> InlineKeyboardMarkup {
    let rows = results
        .iter()
        .enumerate()
        .map(|(i, video)| {
            let duration = video.duration.map(format_duration).unwrap_or_else(|| "live".to_string());
            vec![InlineKeyboardButton::callback(
                format!("{}. {} ({duration})", i + 1, truncate(&video.title, BUTTON_TITLE_CHARS)),
                CallbackAction::Select {
                    video_id: video.id.clone(),
                }
                .to_string(),
            )]
        })
        .collect::<Vec<_>>();
    InlineKeyboardMarkup::new(rows)
}

pub fn search_heading(count: usize) -> String {
    format!("Top {count} Search Results:")
}

/// HTML text shown above the download option buttons
pub fn options_text(info: &VideoInfo) -> String {
    let mut text = format!("Select download option for:\n\n📹 <b>{}</b>", encode_text(&info.title));
    if let Some(duration) = info.duration {
        text.push_str(&format!("\n⏱ {}", format_duration(duration)));
    }
    if let Some(views) = info.views {
        text.push_str(&format!("\n👁 {} views", format_views(views)));
    }
    text
}

pub fn options_keyboard(info: &VideoInfo) -> InlineKeyboardMarkup {
    let mut rows = Vec::new();

    for stream in info.video_options() {
        rows.push(vec![InlineKeyboardButton::callback(
            format!("🎥 {} ({})", stream.label(), stream.ext),
            download_action(MediaKind::Video, info, stream),
        )]);
    }
    for stream in info.audio_options() {
        rows.push(vec![InlineKeyboardButton::callback(
            format!("🔊 Audio ({})", stream.label()),
            download_action(MediaKind::Audio, info, stream),
        )]);
    }
    if let Some(playlist_id) = &info.playlist_id {
        rows.push(vec![InlineKeyboardButton::callback(
            "📋 Download Entire Playlist",
            CallbackAction::PlaylistMenu {
                playlist_id: playlist_id.clone(),
            }
            .to_string(),
        )]);
    }

    InlineKeyboardMarkup::new(rows)
}

fn download_action(kind: MediaKind, info: &VideoInfo, stream: &StreamOption) -> String {
    CallbackAction::Download {
        kind,
        video_id: info.id.clone(),
        itag: stream.itag.clone(),
    }
    .to_string()
}

pub fn playlist_found(playlist: &PlaylistInfo) -> String {
    format!(
        "📋 Found playlist: {}\n\nTotal videos: {}",
        playlist.title,
        playlist.entries.len()
    )
}

pub fn playlist_keyboard(playlist_id: &str) -> InlineKeyboardMarkup {
    InlineKeyboardMarkup::new(vec![
        vec![InlineKeyboardButton::callback(
            "Download All Videos",
            CallbackAction::DownloadPlaylist {
                kind: MediaKind::Video,
                playlist_id: playlist_id.to_string(),
            }
            .to_string(),
        )],
        vec![InlineKeyboardButton::callback(
            "Download as Audio",
            CallbackAction::DownloadPlaylist {
                kind: MediaKind::Audio,
                playlist_id: playlist_id.to_string(),
            }
            .to_string(),
        )],
    ])
}

pub fn preparing(title: &str, stream: &StreamOption) -> String {
    let size = stream
        .filesize_mb()
        .map(|mb| format!("{mb:.2} MB"))
        .unwrap_or_else(|| "unknown".to_string());
    format!(
        "⏳ Preparing to download: {title}\n\nFormat: {}\nSize: {size}\n\nStarting download...",
        stream.label()
    )
}

pub fn preparing_playlist(playlist: &PlaylistInfo) -> String {
    format!(
        "⏳ Preparing to download playlist: {}\n\nTotal videos: {}\n\nStarting download...",
        playlist.title,
        playlist.entries.len()
    )
}

pub fn caption(kind: MediaKind, info: &VideoInfo, stream: &StreamOption) -> String {
    let icon = match kind {
        MediaKind::Video => "🎥",
        MediaKind::Audio => "🔊",
    };
    let mut text = format!("{icon} {}\n\nQuality: {}", info.title, stream.label());
    if let Some(duration) = info.duration {
        text.push_str(&format!("\nDuration: {}", format_duration(duration)));
    }
    text
}

pub fn playlist_caption(kind: MediaKind, title: &str, index: usize, total: usize) -> String {
    let icon = match kind {
        MediaKind::Video => "🎥",
        MediaKind::Audio => "🔊",
    };
    format!("{icon} {title} ({index}/{total})")
}

pub fn playlist_item_failed(index: usize, error: &str) -> String {
    format!("❌ Failed to download video {index}: {error}")
}

pub fn playlist_complete(succeeded: usize, total: usize) -> String {
    format!("✅ Playlist download complete!\n\nSuccessfully downloaded {succeeded}/{total} videos.")
}

pub fn download_error(kind: &str, error: &str) -> String {
    format!("❌ Error downloading {kind}: {error}")
}

pub fn error(error: &str) -> String {
    format!("❌ Error: {error}")
}

/// Cut to `max` characters, marking the cut with an ellipsis
pub fn truncate(text: &str, max: usize) -> String {
    if text.chars().count() <= max {
        return text.to_string();
    }
    let mut out: String = text.chars().take(max.saturating_sub(1)).collect();
    out.push('…');
    out
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use teloxide::types::InlineKeyboardButtonKind;

    use super::*;

    fn stream(itag: &str, kind: MediaKind, ext: &str, height: Option<u32>, abr: Option<f64>) -> StreamOption {
        StreamOption {
            itag: itag.to_string(),
            kind,
            ext: ext.to_string(),
            height,
            abr,
            filesize: None,
            filesize_approx: None,
            url: format!("https://x/{itag}"),
            http_headers: HashMap::new(),
        }
    }

    fn video() -> VideoInfo {
        VideoInfo {
            id: "dQw4w9WgXcQ".to_string(),
            title: "Rick & <Roll>".to_string(),
            duration: Some(212),
            views: Some(1234567),
            thumbnail: None,
            playlist_id: Some("PLmix".to_string()),
            formats: vec![
                stream("18", MediaKind::Video, "mp4", Some(360), None),
                stream("22", MediaKind::Video, "mp4", Some(720), None),
                stream("140", MediaKind::Audio, "m4a", None, Some(128.0)),
            ],
        }
    }

    fn callbacks(markup: &InlineKeyboardMarkup) -> Vec<(String, String)> {
        markup
            .inline_keyboard
            .iter()
            .flatten()
            .map(|b| match &b.kind {
                InlineKeyboardButtonKind::CallbackData(data) => (b.text.clone(), data.clone()),
                other => panic!("unexpected button kind {other:?}"),
            })
            .collect()
    }

    #[test]
    fn test_options_keyboard() {
        let buttons = callbacks(&options_keyboard(&video()));
        assert_eq!(
            buttons,
            vec![
                ("🎥 720p (mp4)".to_string(), "download_video_dQw4w9WgXcQ_22".to_string()),
                ("🎥 360p (mp4)".to_string(), "download_video_dQw4w9WgXcQ_18".to_string()),
                ("🔊 Audio (128kbps)".to_string(), "download_audio_dQw4w9WgXcQ_140".to_string()),
                ("📋 Download Entire Playlist".to_string(), "playlist_PLmix".to_string()),
            ]
        );
    }

    #[test]
    fn test_options_text_escapes_title() {
        let text = options_text(&video());
        assert!(text.contains("<b>Rick &amp; &lt;Roll&gt;</b>"));
        assert!(text.contains("⏱ 3:32"));
        assert!(text.contains("👁 1,234,567 views"));
    }

    #[test]
    fn test_search_keyboard_numbers_results() {
        let results = vec![
            SearchResult {
                id: "aaaaaaaaaaa".to_string(),
                title: "First".to_string(),
                duration: Some(75),
            },
            SearchResult {
                id: "bbbbbbbbbbb".to_string(),
                title: "Stream".to_string(),
                duration: None,
            },
        ];
        let buttons = callbacks(&search_keyboard(&results));
        assert_eq!(buttons[0], ("1. First (1:15)".to_string(), "select_aaaaaaaaaaa".to_string()));
        assert_eq!(buttons[1], ("2. Stream (live)".to_string(), "select_bbbbbbbbbbb".to_string()));
    }

    #[test]
    fn test_playlist_keyboard() {
        let buttons = callbacks(&playlist_keyboard("PL_x"));
        assert_eq!(buttons[0].1, "download_playlist_PL_x");
        assert_eq!(buttons[1].1, "download_playlist_audio_PL_x");
    }

    #[test]
    fn test_subscription_status() {
        let today = NaiveDate::from_ymd_opt(2024, 1, 15).unwrap();
        let sub = Subscription {
            expiry_date: NaiveDate::from_ymd_opt(2024, 1, 31).unwrap(),
            plan_label: "30 days".to_string(),
        };
        assert_eq!(
            subscription_status(Some(&sub), today, false),
            "✅ Subscription active (30 days) until 2024-01-31."
        );
        let later = NaiveDate::from_ymd_opt(2024, 2, 1).unwrap();
        assert!(subscription_status(Some(&sub), later, false).contains("expired on 2024-01-31"));
        assert!(subscription_status(None, today, false).contains("no subscription"));
        assert!(subscription_status(None, today, true).contains("administrator"));
    }

    #[test]
    fn test_caption_and_preparing() {
        let info = video();
        let s = &info.formats[1];
        assert_eq!(caption(MediaKind::Video, &info, s), "🎥 Rick & <Roll>\n\nQuality: 720p\nDuration: 3:32");
        assert!(preparing(&info.title, s).contains("Size: unknown"));
    }

    #[test]
    fn test_truncate() {
        assert_eq!(truncate("short", 10), "short");
        assert_eq!(truncate("ééééééééééé", 5), "éééé…");
    }

    #[test]
    fn test_help_mentions_addsub_for_admin_only() {
        assert!(help_text(true).contains("/addsub"));
        assert!(!help_text(false).contains("/addsub"));
    }
}
