//! Parsing of inbound chat text and inline-button callback data.
//!
//! Callback payloads are underscore-delimited: an action tag followed by the
//! target identifiers. Video and playlist ids may contain `_` themselves, so
//! tags are matched longest-first and the itag is always the last field.

use std::fmt;

use crate::{MediaKind, extract_playlist_id, extract_video_id};

pub const ADDSUB_USAGE: &str = "Usage: /addsub <user_id> [days]";

/// A text message, classified
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Start,
    Help,
    Search(String),
    Playlist(Option<String>),
    AddSubscription(Vec<String>),
    MySubscription,
    Unknown(String),
    /// Anything that is not a command; expected to be a YouTube link
    Url(String),
}

impl Command {
    pub fn parse(text: &str) -> Self {
        let text = text.trim();
        let Some(rest) = text.strip_prefix('/') else {
            return Command::Url(text.to_string());
        };

        let mut parts = rest.split_whitespace();
        let head = parts.next().unwrap_or("");
        // "/search@MyBot cats" addresses a specific bot in groups
        let name = head.split('@').next().unwrap_or(head).to_ascii_lowercase();
        let args: Vec<String> = parts.map(str::to_string).collect();

        match name.as_str() {
            "start" => Command::Start,
            "help" => Command::Help,
            "search" => Command::Search(args.join(" ")),
            "playlist" => Command::Playlist(args.into_iter().next()),
            "addsub" => Command::AddSubscription(args),
            "mysub" => Command::MySubscription,
            _ => Command::Unknown(name),
        }
    }
}

/// Arguments of the administrator grant command
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GrantArgs {
    pub user_id: u64,
    pub days: u32,
}

impl GrantArgs {
    /// Parse `<user_id> [days]`, falling back to `default_days`; the error is the text to show the caller
    pub fn parse(args: &[String], default_days: u32) -> Result<Self, String> {
        let (user, days) = match args {
            [user] => (user, None),
            [user, days] => (user, Some(days)),
            _ => return Err(ADDSUB_USAGE.to_string()),
        };
        let user_id = user
            .parse::<u64>()
            .map_err(|_| format!("User id must be a number.\n{ADDSUB_USAGE}"))?;
        let days = match days {
            Some(days) => days
                .parse::<u32>()
                .map_err(|_| format!("Days must be a number.\n{ADDSUB_USAGE}"))?,
            None => default_days,
        };
        if days == 0 {
            return Err(format!("Days must be at least 1.\n{ADDSUB_USAGE}"));
        }
        Ok(Self { user_id, days })
    }
}

/// Where a pasted YouTube link leads
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Link {
    /// A video, possibly opened from within a playlist
    Video {
        video_id: String,
        playlist_id: Option<String>,
    },
    Playlist { playlist_id: String },
}

impl Link {
    /// `None` when the URL names neither a video nor a playlist
    pub fn parse(url: &str) -> Option<Self> {
        if let Some(video_id) = extract_video_id(url) {
            return Some(Link::Video {
                video_id,
                playlist_id: extract_playlist_id(url),
            });
        }
        extract_playlist_id(url).map(|playlist_id| Link::Playlist { playlist_id })
    }
}

/// An inline keyboard button press
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CallbackAction {
    Subscribe,
    Select { video_id: String },
    Download { kind: MediaKind, video_id: String, itag: String },
    PlaylistMenu { playlist_id: String },
    DownloadPlaylist { kind: MediaKind, playlist_id: String },
}

impl CallbackAction {
    pub fn parse(data: &str) -> Option<Self> {
        if data == "subscribe" {
            return Some(CallbackAction::Subscribe);
        }
        if let Some(id) = data.strip_prefix("download_playlist_audio_") {
            return non_empty(id).map(|playlist_id| CallbackAction::DownloadPlaylist {
                kind: MediaKind::Audio,
                playlist_id,
            });
        }
        if let Some(id) = data.strip_prefix("download_playlist_") {
            return non_empty(id).map(|playlist_id| CallbackAction::DownloadPlaylist {
                kind: MediaKind::Video,
                playlist_id,
            });
        }
        for (prefix, kind) in [("download_video_", MediaKind::Video), ("download_audio_", MediaKind::Audio)] {
            if let Some(rest) = data.strip_prefix(prefix) {
                let (video_id, itag) = rest.rsplit_once('_')?;
                return Some(CallbackAction::Download {
                    kind,
                    video_id: non_empty(video_id)?,
                    itag: non_empty(itag)?,
                });
            }
        }
        if let Some(id) = data.strip_prefix("select_") {
            return non_empty(id).map(|video_id| CallbackAction::Select { video_id });
        }
        if let Some(id) = data.strip_prefix("playlist_") {
            return non_empty(id).map(|playlist_id| CallbackAction::PlaylistMenu { playlist_id });
        }
        None
    }
}

impl fmt::Display for CallbackAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CallbackAction::Subscribe => write!(f, "subscribe"),
            CallbackAction::Select { video_id } => write!(f, "select_{video_id}"),
            CallbackAction::Download { kind, video_id, itag } => write!(f, "download_{kind}_{video_id}_{itag}"),
            CallbackAction::PlaylistMenu { playlist_id } => write!(f, "playlist_{playlist_id}"),
            CallbackAction::DownloadPlaylist {
                kind: MediaKind::Video,
                playlist_id,
            } => write!(f, "download_playlist_{playlist_id}"),
            CallbackAction::DownloadPlaylist {
                kind: MediaKind::Audio,
                playlist_id,
            } => write!(f, "download_playlist_audio_{playlist_id}"),
        }
    }
}

fn non_empty(s: &str) -> Option<String> {
    (!s.is_empty()).then(|| s.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(items: &[&str]) -> Vec<String> {
        items.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_parse_commands() {
        assert_eq!(Command::parse("/start"), Command::Start);
        assert_eq!(Command::parse("/help"), Command::Help);
        assert_eq!(Command::parse("/search funny   cats"), Command::Search("funny cats".to_string()));
        assert_eq!(Command::parse("/search"), Command::Search(String::new()));
        assert_eq!(
            Command::parse("/playlist https://youtube.com/playlist?list=PL1 extra"),
            Command::Playlist(Some("https://youtube.com/playlist?list=PL1".to_string()))
        );
        assert_eq!(Command::parse("/playlist"), Command::Playlist(None));
        assert_eq!(Command::parse("/addsub 42 30"), Command::AddSubscription(args(&["42", "30"])));
        assert_eq!(Command::parse("/mysub"), Command::MySubscription);
        assert_eq!(Command::parse("/frobnicate"), Command::Unknown("frobnicate".to_string()));
    }

    #[test]
    fn test_parse_command_with_bot_mention() {
        assert_eq!(Command::parse("/Search@YtBot lofi"), Command::Search("lofi".to_string()));
    }

    #[test]
    fn test_plain_text_is_url() {
        assert_eq!(
            Command::parse("  https://youtu.be/dQw4w9WgXcQ "),
            Command::Url("https://youtu.be/dQw4w9WgXcQ".to_string())
        );
    }

    #[test]
    fn test_grant_args() {
        assert_eq!(
            GrantArgs::parse(&args(&["42", "7"]), 30),
            Ok(GrantArgs { user_id: 42, days: 7 })
        );
    }

    #[test]
    fn test_grant_args_default_days() {
        assert_eq!(
            GrantArgs::parse(&args(&["42"]), 30),
            Ok(GrantArgs { user_id: 42, days: 30 })
        );
        let err = GrantArgs::parse(&args(&["42"]), 0).unwrap_err();
        assert!(err.starts_with("Days must be at least 1."));
    }

    #[test]
    fn test_grant_args_wrong_count() {
        assert_eq!(GrantArgs::parse(&args(&[]), 30), Err(ADDSUB_USAGE.to_string()));
        assert_eq!(GrantArgs::parse(&args(&["1", "2", "3"]), 30), Err(ADDSUB_USAGE.to_string()));
    }

    #[test]
    fn test_grant_args_non_numeric() {
        let err = GrantArgs::parse(&args(&["bob", "30"]), 30).unwrap_err();
        assert!(err.starts_with("User id must be a number."));
        let err = GrantArgs::parse(&args(&["42", "-3"]), 30).unwrap_err();
        assert!(err.starts_with("Days must be a number."));
        let err = GrantArgs::parse(&args(&["42", "0"]), 30).unwrap_err();
        assert!(err.contains(ADDSUB_USAGE));
    }

    #[test]
    fn test_links() {
        assert_eq!(
            Link::parse("https://youtu.be/dQw4w9WgXcQ"),
            Some(Link::Video {
                video_id: "dQw4w9WgXcQ".to_string(),
                playlist_id: None
            })
        );
        assert_eq!(
            Link::parse("https://www.youtube.com/watch?v=dQw4w9WgXcQ&list=PL_mix-1&index=3"),
            Some(Link::Video {
                video_id: "dQw4w9WgXcQ".to_string(),
                playlist_id: Some("PL_mix-1".to_string())
            })
        );
        assert_eq!(
            Link::parse("https://www.youtube.com/playlist?list=PLabc"),
            Some(Link::Playlist {
                playlist_id: "PLabc".to_string()
            })
        );
        assert_eq!(Link::parse("https://www.youtube.com/feed/trending"), None);
    }

    #[test]
    fn test_parse_callbacks() {
        assert_eq!(CallbackAction::parse("subscribe"), Some(CallbackAction::Subscribe));
        assert_eq!(
            CallbackAction::parse("select_dQw4w9WgXcQ"),
            Some(CallbackAction::Select {
                video_id: "dQw4w9WgXcQ".to_string()
            })
        );
        assert_eq!(
            CallbackAction::parse("download_audio_dQw4w9WgXcQ_140"),
            Some(CallbackAction::Download {
                kind: MediaKind::Audio,
                video_id: "dQw4w9WgXcQ".to_string(),
                itag: "140".to_string()
            })
        );
        assert_eq!(
            CallbackAction::parse("download_playlist_audio_PLabc"),
            Some(CallbackAction::DownloadPlaylist {
                kind: MediaKind::Audio,
                playlist_id: "PLabc".to_string()
            })
        );
        assert_eq!(
            CallbackAction::parse("download_playlist_PLabc"),
            Some(CallbackAction::DownloadPlaylist {
                kind: MediaKind::Video,
                playlist_id: "PLabc".to_string()
            })
        );
        assert_eq!(
            CallbackAction::parse("playlist_PLabc"),
            Some(CallbackAction::PlaylistMenu {
                playlist_id: "PLabc".to_string()
            })
        );
    }

    #[test]
    fn test_ids_with_underscores() {
        assert_eq!(
            CallbackAction::parse("download_video_a_b_c_d_e_f_22"),
            Some(CallbackAction::Download {
                kind: MediaKind::Video,
                video_id: "a_b_c_d_e_f".to_string(),
                itag: "22".to_string()
            })
        );
        assert_eq!(
            CallbackAction::parse("select__x_y"),
            Some(CallbackAction::Select {
                video_id: "_x_y".to_string()
            })
        );
    }

    #[test]
    fn test_malformed_callbacks() {
        assert_eq!(CallbackAction::parse(""), None);
        assert_eq!(CallbackAction::parse("select_"), None);
        assert_eq!(CallbackAction::parse("download_video_noitag"), None);
        assert_eq!(CallbackAction::parse("download_video__22"), None);
        assert_eq!(CallbackAction::parse("sessions_switch:1"), None);
    }

    #[test]
    fn test_display_matches_parse() {
        let actions = [
            CallbackAction::Subscribe,
            CallbackAction::Select {
                video_id: "a_b-c".to_string(),
            },
            CallbackAction::Download {
                kind: MediaKind::Video,
                video_id: "dQw4w9WgXcQ".to_string(),
                itag: "18".to_string(),
            },
            CallbackAction::PlaylistMenu {
                playlist_id: "PL_1".to_string(),
            },
            CallbackAction::DownloadPlaylist {
                kind: MediaKind::Audio,
                playlist_id: "PL_1".to_string(),
            },
        ];
        for action in actions {
            assert_eq!(CallbackAction::parse(&action.to_string()), Some(action));
        }
    }
}
