pub mod bot;
pub mod config;
pub mod download;
pub mod handlers;
pub mod progress;
pub mod router;
pub mod subscription;
pub mod ui;
pub mod youtube;

use std::collections::HashMap;

use regex::Regex;

/// What a download produces
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MediaKind {
    Video,
    Audio,
}

impl MediaKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            MediaKind::Video => "video",
            MediaKind::Audio => "audio",
        }
    }
}

impl std::fmt::Display for MediaKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One downloadable rendition of a video
#[derive(Debug, Clone)]
pub struct StreamOption {
    /// YouTube itag (yt-dlp format id)
    pub itag: String,
    pub kind: MediaKind,
    pub ext: String,
    pub height: Option<u32>,
    /// Audio bitrate in kbps
    pub abr: Option<f64>,
    /// Exact size in bytes, when YouTube reports one
    pub filesize: Option<u64>,
    /// yt-dlp's estimate from bitrate and duration; never used to bound a transfer
    pub filesize_approx: Option<u64>,
    pub url: String,
    pub http_headers: HashMap<String, String>,
}

impl StreamOption {
    /// Human label: "720p" for video, "128kbps" for audio
    pub fn label(&self) -> String {
        match self.kind {
            MediaKind::Video => match self.height {
                Some(h) => format!("{h}p"),
                None => "unknown".to_string(),
            },
            MediaKind::Audio => match self.abr {
                Some(abr) => format!("{}kbps", abr.round() as u64),
                None => "unknown".to_string(),
            },
        }
    }

    /// Exact size if known, otherwise the estimate
    pub fn size_hint(&self) -> Option<u64> {
        self.filesize.or(self.filesize_approx)
    }

    pub fn filesize_mb(&self) -> Option<f64> {
        self.size_hint().map(|b| b as f64 / (1024.0 * 1024.0))
    }
}

/// Metadata for a single video
#[derive(Debug, Clone)]
pub struct VideoInfo {
    pub id: String,
    pub title: String,
    pub duration: Option<u64>,
    pub views: Option<u64>,
    pub thumbnail: Option<String>,
    pub playlist_id: Option<String>,
    pub formats: Vec<StreamOption>,
}

/// A search hit
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SearchResult {
    pub id: String,
    pub title: String,
    pub duration: Option<u64>,
}

/// A resolved playlist
#[derive(Debug, Clone)]
pub struct PlaylistInfo {
    pub id: String,
    pub title: String,
    /// Video ids in playlist order
    pub entries: Vec<String>,
}

pub fn watch_url(video_id: &str) -> String {
    format!("https://www.youtube.com/watch?v={video_id}")
}

pub fn playlist_url(playlist_id: &str) -> String {
    format!("https://www.youtube.com/playlist?list={playlist_id}")
}

/// Whether the text points at YouTube at all
pub fn is_youtube_url(input: &str) -> bool {
    input.contains("youtube.com") || input.contains("youtu.be")
}

/// Extract video ID from various YouTube URL formats
pub fn extract_video_id(input: &str) -> Option<String> {
    let input = input.trim();

    // Bare 11-character video ID
    if Regex::new(r"^[a-zA-Z0-9_-]{11}$").ok()?.is_match(input) {
        return Some(input.to_string());
    }

    let patterns = [
        r"youtube\.com/watch\?(?:.*&)?v=([a-zA-Z0-9_-]{11})",
        r"youtu\.be/([a-zA-Z0-9_-]{11})",
        r"youtube\.com/embed/([a-zA-Z0-9_-]{11})",
        r"youtube\.com/shorts/([a-zA-Z0-9_-]{11})",
    ];

    for pattern in patterns {
        if let Some(caps) = Regex::new(pattern).ok()?.captures(input) {
            return Some(caps[1].to_string());
        }
    }

    None
}

/// Extract the `list=` parameter from a playlist or watch URL
pub fn extract_playlist_id(input: &str) -> Option<String> {
    let re = Regex::new(r"[?&]list=([a-zA-Z0-9_-]+)").ok()?;
    re.captures(input.trim()).map(|caps| caps[1].to_string())
}

/// Format seconds as `H:MM:SS`, or `M:SS` under an hour
pub fn format_duration(seconds: u64) -> String {
    let (minutes, seconds) = (seconds / 60, seconds % 60);
    let (hours, minutes) = (minutes / 60, minutes % 60);

    if hours > 0 {
        format!("{hours}:{minutes:02}:{seconds:02}")
    } else {
        format!("{minutes}:{seconds:02}")
    }
}

/// Format a count with thousands separators: 1234567 -> "1,234,567"
pub fn format_views(count: u64) -> String {
    let digits = count.to_string();
    let mut out = String::with_capacity(digits.len() + digits.len() / 3);
    for (i, ch) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            out.push(',');
        }
        out.push(ch);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bare_video_id() {
        assert_eq!(extract_video_id("dQw4w9WgXcQ"), Some("dQw4w9WgXcQ".to_string()));
    }

    #[test]
    fn test_watch_url_with_extra_params() {
        assert_eq!(
            extract_video_id("https://www.youtube.com/watch?v=dQw4w9WgXcQ&t=120"),
            Some("dQw4w9WgXcQ".to_string())
        );
        assert_eq!(
            extract_video_id("https://www.youtube.com/watch?list=PL123&v=dQw4w9WgXcQ"),
            Some("dQw4w9WgXcQ".to_string())
        );
    }

    #[test]
    fn test_short_and_shorts_urls() {
        assert_eq!(
            extract_video_id("https://youtu.be/dQw4w9WgXcQ"),
            Some("dQw4w9WgXcQ".to_string())
        );
        assert_eq!(
            extract_video_id("https://www.youtube.com/shorts/dQw4w9WgXcQ"),
            Some("dQw4w9WgXcQ".to_string())
        );
    }

    #[test]
    fn test_invalid_video_id() {
        assert_eq!(extract_video_id("not-a-valid-id"), None);
        assert_eq!(extract_video_id(""), None);
    }

    #[test]
    fn test_extract_playlist_id() {
        assert_eq!(
            extract_playlist_id("https://www.youtube.com/playlist?list=PLx0sYbCqOb8TBPRdmBHs5Iftvv9TPboYG"),
            Some("PLx0sYbCqOb8TBPRdmBHs5Iftvv9TPboYG".to_string())
        );
        assert_eq!(
            extract_playlist_id("https://www.youtube.com/watch?v=dQw4w9WgXcQ&list=PL_a-b"),
            Some("PL_a-b".to_string())
        );
        assert_eq!(extract_playlist_id("https://www.youtube.com/watch?v=dQw4w9WgXcQ"), None);
    }

    #[test]
    fn test_is_youtube_url() {
        assert!(is_youtube_url("https://youtu.be/dQw4w9WgXcQ"));
        assert!(is_youtube_url("https://m.youtube.com/watch?v=dQw4w9WgXcQ"));
        assert!(!is_youtube_url("https://vimeo.com/123"));
    }

    #[test]
    fn test_format_duration() {
        assert_eq!(format_duration(0), "0:00");
        assert_eq!(format_duration(59), "0:59");
        assert_eq!(format_duration(212), "3:32");
        assert_eq!(format_duration(3600), "1:00:00");
        assert_eq!(format_duration(3725), "1:02:05");
    }

    #[test]
    fn test_format_views() {
        assert_eq!(format_views(0), "0");
        assert_eq!(format_views(999), "999");
        assert_eq!(format_views(1000), "1,000");
        assert_eq!(format_views(1234567), "1,234,567");
    }

    #[test]
    fn test_stream_label() {
        let mut stream = StreamOption {
            itag: "22".to_string(),
            kind: MediaKind::Video,
            ext: "mp4".to_string(),
            height: Some(720),
            abr: None,
            filesize: None,
            filesize_approx: Some(2 * 1024 * 1024),
            url: String::new(),
            http_headers: HashMap::new(),
        };
        assert_eq!(stream.label(), "720p");
        assert_eq!(stream.filesize_mb(), Some(2.0));
        stream.filesize = Some(1024 * 1024);
        assert_eq!(stream.size_hint(), Some(1024 * 1024));

        stream.kind = MediaKind::Audio;
        stream.abr = Some(129.478);
        assert_eq!(stream.label(), "129kbps");
    }
}
