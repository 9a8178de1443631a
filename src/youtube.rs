use std::collections::{HashMap, HashSet};
use std::time::Duration;

use eyre::{Result, WrapErr, bail};
use log::debug;
use reqwest::StatusCode;
use reqwest::header::{CONTENT_RANGE, HeaderMap, RANGE};
use serde::Deserialize;

use crate::progress::{ProgressReporter, StatusSink};
use crate::{MediaKind, PlaylistInfo, SearchResult, StreamOption, VideoInfo, playlist_url, watch_url};

const USER_AGENT: &str =
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/131.0.0.0 Safari/537.36";

/// googlevideo throttles long unranged reads, so media is fetched in ranges of this size
const DEFAULT_RANGE_BYTES: u64 = 10 * 1024 * 1024;

/// Upper bound on the up-front buffer allocation
const MAX_PREALLOC: u64 = 64 * 1024 * 1024;

#[derive(Debug, Deserialize)]
struct YtDlpVideo {
    id: String,
    title: Option<String>,
    duration: Option<f64>,
    view_count: Option<u64>,
    thumbnail: Option<String>,
    playlist_id: Option<String>,
    #[serde(default)]
    formats: Vec<YtDlpFormat>,
}

#[derive(Debug, Deserialize)]
struct YtDlpFormat {
    format_id: String,
    #[serde(default)]
    ext: String,
    vcodec: Option<String>,
    acodec: Option<String>,
    height: Option<u32>,
    abr: Option<f64>,
    filesize: Option<u64>,
    filesize_approx: Option<f64>,
    url: Option<String>,
    protocol: Option<String>,
    #[serde(default)]
    http_headers: HashMap<String, String>,
}

#[derive(Debug, Deserialize)]
struct YtDlpPlaylist {
    id: Option<String>,
    title: Option<String>,
    #[serde(default)]
    entries: Vec<Option<YtDlpEntry>>,
}

#[derive(Debug, Deserialize)]
struct YtDlpEntry {
    id: Option<String>,
    title: Option<String>,
    duration: Option<f64>,
}

/// Client for YouTube metadata (via yt-dlp) and media transfer (via reqwest)
#[derive(Debug, Clone)]
pub struct YouTube {
    client: reqwest::Client,
    yt_dlp: String,
    range_bytes: u64,
}

impl YouTube {
    pub fn new(yt_dlp: impl Into<String>) -> Result<Self> {
        let client = reqwest::Client::builder()
            .connect_timeout(Duration::from_secs(15))
            .build()?;
        Ok(Self {
            client,
            yt_dlp: yt_dlp.into(),
            range_bytes: DEFAULT_RANGE_BYTES,
        })
    }

    /// Search YouTube and return up to `limit` distinct videos
    pub async fn search(&self, query: &str, limit: usize) -> Result<Vec<SearchResult>> {
        debug!("Searching YouTube for {query:?}");
        let target = format!("ytsearch{limit}:{query}");
        let json = self.run_yt_dlp(&["--flat-playlist", "-J", &target]).await?;
        parse_search(&json, limit)
    }

    /// Fetch metadata and downloadable formats for one video
    pub async fn video(&self, video_id: &str) -> Result<VideoInfo> {
        debug!("Fetching video info for {video_id}");
        let url = watch_url(video_id);
        let json = self.run_yt_dlp(&["-J", "--no-playlist", &url]).await?;
        parse_video(&json)
    }

    /// Resolve a playlist to its title and video ids
    pub async fn playlist(&self, playlist_id: &str) -> Result<PlaylistInfo> {
        debug!("Fetching playlist {playlist_id}");
        let url = playlist_url(playlist_id);
        let json = self.run_yt_dlp(&["--flat-playlist", "-J", &url]).await?;
        parse_playlist(&json, playlist_id)
    }

    /// Stream a format fully into memory, reporting progress after every chunk.
    ///
    /// The transfer length is taken from the server (`Content-Range`, or a short
    /// final range when the total is withheld); yt-dlp's size only feeds the early
    /// limit check and the first progress frame. Fails once more than `limit`
    /// bytes would be held.
    pub async fn fetch<S: StatusSink>(
        &self,
        stream: &StreamOption,
        limit: u64,
        reporter: &mut ProgressReporter<S>,
    ) -> Result<Vec<u8>> {
        let hint = stream.size_hint().unwrap_or(0);
        if hint > limit {
            bail!("file is too large ({} MB)", hint / (1024 * 1024));
        }

        let mut buffer = Vec::with_capacity(hint.min(MAX_PREALLOC) as usize);
        let mut total = stream.filesize;

        loop {
            let start = buffer.len() as u64;
            if total.is_some_and(|t| start >= t) {
                break;
            }
            let mut end = start + self.range_bytes - 1;
            if let Some(t) = total {
                end = end.min(t - 1);
            }
            debug!("Requesting bytes {start}-{end} of itag {}", stream.itag);

            let resp = self
                .request(stream)
                .header(RANGE, format!("bytes={start}-{end}"))
                .send()
                .await?;

            // the previous range ended exactly on the last byte
            if resp.status() == StatusCode::RANGE_NOT_SATISFIABLE && start > 0 && total.is_none() {
                break;
            }
            let mut resp = resp.error_for_status()?;

            if resp.status() != StatusCode::PARTIAL_CONTENT {
                // server ignored the range and is sending the whole body
                let length = resp.content_length().unwrap_or(hint);
                if length > limit {
                    bail!("file is too large ({} MB)", length / (1024 * 1024));
                }
                buffer.clear();
                reporter.report(length, length).await;
                read_body(&mut resp, &mut buffer, length, limit, reporter).await?;
                return Ok(buffer);
            }

            if let Some(full) = content_range_total(resp.headers()) {
                if full > limit {
                    bail!("file is too large ({} MB)", full / (1024 * 1024));
                }
                total = Some(full);
            }
            let expected = total.unwrap_or(hint);
            if start == 0 {
                reporter.report(expected, expected).await;
            }

            read_body(&mut resp, &mut buffer, expected, limit, reporter).await?;

            let received = buffer.len() as u64 - start;
            if received == 0 {
                bail!("stream ended early at {start} bytes");
            }
            if total.is_none() && received < end - start + 1 {
                break;
            }
        }

        if buffer.is_empty() {
            bail!("server returned an empty file");
        }
        Ok(buffer)
    }

    fn request(&self, stream: &StreamOption) -> reqwest::RequestBuilder {
        let mut req = self.client.get(&stream.url);
        if !stream.http_headers.keys().any(|k| k.eq_ignore_ascii_case("user-agent")) {
            req = req.header("User-Agent", USER_AGENT);
        }
        for (name, value) in &stream.http_headers {
            req = req.header(name.as_str(), value.as_str());
        }
        req
    }

    async fn run_yt_dlp(&self, args: &[&str]) -> Result<Vec<u8>> {
        debug!("Running {} {}", self.yt_dlp, args.join(" "));
        let output = tokio::process::Command::new(&self.yt_dlp)
            .args(["--no-warnings", "--quiet"])
            .args(args)
            .stdin(std::process::Stdio::null())
            .output()
            .await;

        match output {
            Ok(o) if o.status.success() => Ok(o.stdout),
            Ok(o) => {
                let stderr = String::from_utf8_lossy(&o.stderr);
                let reason = stderr
                    .lines()
                    .rev()
                    .find(|l| !l.trim().is_empty())
                    .unwrap_or("no output")
                    .trim_start_matches("ERROR: ")
                    .to_string();
                bail!("yt-dlp failed ({}): {reason}", o.status);
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                bail!(
                    "{} not found. Install it to enable downloads:\n  \
                     pip install yt-dlp\n  \
                     or: brew install yt-dlp",
                    self.yt_dlp
                );
            }
            Err(e) => bail!("failed to run {}: {e}", self.yt_dlp),
        }
    }
}

impl VideoInfo {
    /// Progressive (audio+video) mp4 renditions, best first, one per resolution
    pub fn video_options(&self) -> Vec<&StreamOption> {
        let mut streams: Vec<&StreamOption> = self
            .formats
            .iter()
            .filter(|f| f.kind == MediaKind::Video && f.ext == "mp4" && f.height.is_some())
            .collect();
        streams.sort_by(|a, b| b.height.cmp(&a.height));

        let mut seen = HashSet::new();
        streams.retain(|f| seen.insert(f.height));
        streams
    }

    /// Audio-only mp4 renditions, best first, one per bitrate
    pub fn audio_options(&self) -> Vec<&StreamOption> {
        let mut streams: Vec<&StreamOption> = self
            .formats
            .iter()
            .filter(|f| f.kind == MediaKind::Audio && (f.ext == "m4a" || f.ext == "mp4"))
            .collect();
        streams.sort_by(|a, b| b.abr.unwrap_or(0.0).total_cmp(&a.abr.unwrap_or(0.0)));

        let mut seen = HashSet::new();
        streams.retain(|f| seen.insert(f.label()));
        streams
    }

    pub fn best_video(&self) -> Option<&StreamOption> {
        self.video_options().into_iter().next()
    }

    pub fn best_audio(&self) -> Option<&StreamOption> {
        self.audio_options().into_iter().next().or_else(|| {
            self.formats
                .iter()
                .filter(|f| f.kind == MediaKind::Audio)
                .max_by(|a, b| a.abr.unwrap_or(0.0).total_cmp(&b.abr.unwrap_or(0.0)))
        })
    }

    pub fn format(&self, itag: &str) -> Option<&StreamOption> {
        self.formats.iter().find(|f| f.itag == itag)
    }
}

async fn read_body<S: StatusSink>(
    resp: &mut reqwest::Response,
    buffer: &mut Vec<u8>,
    total: u64,
    limit: u64,
    reporter: &mut ProgressReporter<S>,
) -> Result<()> {
    while let Some(chunk) = resp.chunk().await? {
        buffer.extend_from_slice(&chunk);
        check_limit(buffer.len(), limit)?;
        reporter.report(total, total.saturating_sub(buffer.len() as u64)).await;
    }
    Ok(())
}

/// Full length from `Content-Range: bytes a-b/TOTAL`; `None` when the total is `*`
fn content_range_total(headers: &HeaderMap) -> Option<u64> {
    let value = headers.get(CONTENT_RANGE)?.to_str().ok()?;
    value.rsplit_once('/')?.1.trim().parse().ok()
}

fn check_limit(len: usize, limit: u64) -> Result<()> {
    if len as u64 > limit {
        bail!("file is too large (over {} MB)", limit / (1024 * 1024));
    }
    Ok(())
}

fn has_codec(codec: &Option<String>) -> bool {
    codec.as_deref().is_some_and(|c| c != "none")
}

fn parse_video(json: &[u8]) -> Result<VideoInfo> {
    let raw: YtDlpVideo = serde_json::from_slice(json).wrap_err("unexpected yt-dlp video output")?;

    let formats = raw
        .formats
        .into_iter()
        .filter_map(|f| {
            // manifests (m3u8, dash segments) cannot be fetched as a single file
            let direct = matches!(f.protocol.as_deref(), None | Some("https") | Some("http"));
            let url = f.url.filter(|_| direct)?;
            let kind = match (has_codec(&f.vcodec), has_codec(&f.acodec)) {
                (true, true) => MediaKind::Video,
                (false, true) => MediaKind::Audio,
                _ => return None,
            };
            Some(StreamOption {
                itag: f.format_id,
                kind,
                ext: f.ext,
                height: f.height,
                abr: f.abr,
                filesize: f.filesize,
                filesize_approx: f.filesize_approx.map(|s| s as u64),
                url,
                http_headers: f.http_headers,
            })
        })
        .collect();

    Ok(VideoInfo {
        title: raw.title.unwrap_or_else(|| raw.id.clone()),
        id: raw.id,
        duration: raw.duration.map(|d| d.round() as u64),
        views: raw.view_count,
        thumbnail: raw.thumbnail,
        playlist_id: raw.playlist_id,
        formats,
    })
}

fn parse_playlist(json: &[u8], playlist_id: &str) -> Result<PlaylistInfo> {
    let raw: YtDlpPlaylist = serde_json::from_slice(json).wrap_err("unexpected yt-dlp playlist output")?;
    let entries: Vec<String> = raw.entries.into_iter().flatten().filter_map(|e| e.id).collect();
    if entries.is_empty() {
        bail!("playlist {playlist_id} has no available videos");
    }
    Ok(PlaylistInfo {
        id: raw.id.unwrap_or_else(|| playlist_id.to_string()),
        title: raw.title.unwrap_or_else(|| playlist_id.to_string()),
        entries,
    })
}

fn parse_search(json: &[u8], limit: usize) -> Result<Vec<SearchResult>> {
    let raw: YtDlpPlaylist = serde_json::from_slice(json).wrap_err("unexpected yt-dlp search output")?;

    let mut seen = HashSet::new();
    Ok(raw
        .entries
        .into_iter()
        .flatten()
        .filter_map(|e| {
            let id = e.id?;
            Some(SearchResult {
                title: e.title.unwrap_or_else(|| id.clone()),
                duration: e.duration.map(|d| d.round() as u64),
                id,
            })
        })
        .filter(|r| seen.insert(r.id.clone()))
        .take(limit)
        .collect())
}
