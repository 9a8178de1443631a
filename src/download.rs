use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use eyre::{Result, eyre};
use log::{debug, error, info, warn};
use teloxide::payloads::setters::*;
use teloxide::prelude::*;
use teloxide::types::{InputFile, MessageId};
use teloxide::{ApiError, RequestError};
use tokio::sync::{Mutex, mpsc};
use tokio::task::JoinHandle;

use crate::progress::{ProgressReporter, StatusSink};
use crate::youtube::YouTube;
use crate::{MediaKind, StreamOption, VideoInfo, ui};

/// A unit of work for the download pool
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DownloadJob {
    Single {
        chat_id: ChatId,
        status: MessageId,
        video_id: String,
        kind: MediaKind,
        itag: String,
    },
    Playlist {
        chat_id: ChatId,
        status: MessageId,
        playlist_id: String,
        kind: MediaKind,
    },
}

/// Executes a job to completion; failures are reported by the runner itself
#[async_trait]
pub trait JobRunner: Send + Sync + 'static {
    async fn run(&self, job: DownloadJob);
}

/// Why a job was handed back instead of queued
#[derive(Debug)]
pub enum SubmitError {
    /// Every worker is busy and the queue is at capacity
    Full(DownloadJob),
    /// The workers are gone; no job will run again
    Closed(DownloadJob),
}

impl SubmitError {
    pub fn job(&self) -> &DownloadJob {
        match self {
            SubmitError::Full(job) | SubmitError::Closed(job) => job,
        }
    }
}

impl std::fmt::Display for SubmitError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SubmitError::Full(_) => write!(f, "download queue is full"),
            SubmitError::Closed(_) => write!(f, "download pool is shut down"),
        }
    }
}

impl std::error::Error for SubmitError {}

/// Fixed set of workers draining a bounded job queue
pub struct DownloadPool {
    tx: mpsc::Sender<DownloadJob>,
    workers: Vec<JoinHandle<()>>,
}

impl DownloadPool {
    pub fn start<R: JobRunner>(runner: Arc<R>, workers: usize, queue: usize) -> Self {
        let (tx, rx) = mpsc::channel(queue.max(1));
        let rx = Arc::new(Mutex::new(rx));

        let workers = (0..workers.max(1))
            .map(|id| {
                let rx = Arc::clone(&rx);
                let runner = Arc::clone(&runner);
                tokio::spawn(async move {
                    loop {
                        let job = rx.lock().await.recv().await;
                        let Some(job) = job else { break };
                        debug!("Worker {id} picked up {job:?}");

                        let runner = Arc::clone(&runner);
                        // a panicking job must not take the worker down with it
                        if let Err(e) = tokio::spawn(async move { runner.run(job).await }).await {
                            error!("Download job on worker {id} panicked: {e}");
                        }
                    }
                    debug!("Worker {id} stopped");
                })
            })
            .collect();

        Self { tx, workers }
    }

    /// Queue a job without waiting; fails when the queue is at capacity
    pub fn submit(&self, job: DownloadJob) -> std::result::Result<(), SubmitError> {
        self.tx.try_send(job).map_err(|e| match e {
            mpsc::error::TrySendError::Full(job) => SubmitError::Full(job),
            mpsc::error::TrySendError::Closed(job) => SubmitError::Closed(job),
        })
    }

    /// Stop accepting jobs and wait for queued ones to finish
    pub async fn shutdown(self) {
        drop(self.tx);
        for (id, worker) in self.workers.into_iter().enumerate() {
            if let Err(e) = worker.await {
                error!("Download worker {id} ended abnormally: {e}");
            }
        }
    }
}

/// The chat message that shows a job's progress
#[derive(Clone)]
pub struct StatusMessage {
    bot: Bot,
    chat_id: ChatId,
    message_id: MessageId,
}

impl StatusMessage {
    pub fn new(bot: Bot, chat_id: ChatId, message_id: MessageId) -> Self {
        Self {
            bot,
            chat_id,
            message_id,
        }
    }

    async fn delete(&self) {
        if let Err(e) = self.bot.delete_message(self.chat_id, self.message_id).await {
            warn!("Failed to delete status message: {e}");
        }
    }
}

#[async_trait]
impl StatusSink for StatusMessage {
    async fn update(&self, text: &str) -> Result<()> {
        match self.bot.edit_message_text(self.chat_id, self.message_id, text).await {
            Ok(_) | Err(RequestError::Api(ApiError::MessageNotModified)) => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}

/// Resolves, streams and uploads media for queued jobs
pub struct Downloader {
    bot: Bot,
    youtube: YouTube,
    max_upload: u64,
    progress_interval: Duration,
}

impl Downloader {
    pub fn new(bot: Bot, youtube: YouTube, max_upload: u64, progress_interval: Duration) -> Self {
        Self {
            bot,
            youtube,
            max_upload,
            progress_interval,
        }
    }

    async fn run_single(&self, status: &StatusMessage, video_id: &str, kind: MediaKind, itag: &str) -> Result<()> {
        let info = self.youtube.video(video_id).await?;
        let stream = info
            .format(itag)
            .ok_or_else(|| eyre!("format {itag} is no longer available"))?
            .clone();

        if let Err(e) = status.update(&ui::preparing(&info.title, &stream)).await {
            warn!("Failed to announce download of {video_id}: {e}");
        }

        let mut reporter = ProgressReporter::new(status.clone(), self.progress_interval);
        let bytes = self.youtube.fetch(&stream, self.max_upload, &mut reporter).await?;
        info!("Downloaded {} bytes of {video_id} (itag {itag})", bytes.len());

        self.send(status.chat_id, kind, &info, &stream, bytes, ui::caption(kind, &info, &stream))
            .await?;
        status.delete().await;
        Ok(())
    }

    async fn run_playlist(&self, status: &StatusMessage, playlist_id: &str, kind: MediaKind) -> Result<()> {
        let playlist = self.youtube.playlist(playlist_id).await?;
        let total = playlist.entries.len();
        if let Err(e) = status.update(&ui::preparing_playlist(&playlist)).await {
            warn!("Failed to announce playlist {playlist_id}: {e}");
        }

        let mut succeeded = 0;
        for (i, video_id) in playlist.entries.iter().enumerate() {
            let index = i + 1;
            match self.playlist_item(status, video_id, kind, index, total).await {
                Ok(()) => succeeded += 1,
                Err(e) => {
                    error!("Playlist {playlist_id} item {index} ({video_id}) failed: {e}");
                    if let Err(e) = self
                        .bot
                        .send_message(status.chat_id, ui::playlist_item_failed(index, &e.to_string()))
                        .await
                    {
                        warn!("Failed to report playlist item failure: {e}");
                    }
                }
            }
        }

        info!("Playlist {playlist_id}: {succeeded}/{total} delivered");
        self.bot
            .send_message(status.chat_id, ui::playlist_complete(succeeded, total))
            .await?;
        status.delete().await;
        Ok(())
    }

    async fn playlist_item(
        &self,
        status: &StatusMessage,
        video_id: &str,
        kind: MediaKind,
        index: usize,
        total: usize,
    ) -> Result<()> {
        let info = self.youtube.video(video_id).await?;
        let stream = match kind {
            MediaKind::Video => info.best_video(),
            MediaKind::Audio => info.best_audio(),
        }
        .ok_or_else(|| eyre!("no downloadable {kind} format"))?
        .clone();

        let mut reporter = ProgressReporter::new(status.clone(), self.progress_interval);
        let bytes = self.youtube.fetch(&stream, self.max_upload, &mut reporter).await?;

        let caption = ui::playlist_caption(kind, &info.title, index, total);
        self.send(status.chat_id, kind, &info, &stream, bytes, caption).await
    }

    async fn send(
        &self,
        chat_id: ChatId,
        kind: MediaKind,
        info: &VideoInfo,
        stream: &StreamOption,
        bytes: Vec<u8>,
        caption: String,
    ) -> Result<()> {
        let input = InputFile::memory(bytes).file_name(file_name(&info.title, &stream.ext));
        match kind {
            MediaKind::Video => {
                let mut req = self.bot.send_video(chat_id, input).caption(caption).supports_streaming(true);
                if let Some(duration) = info.duration {
                    req = req.duration(duration as u32);
                }
                req.await?;
            }
            MediaKind::Audio => {
                let mut req = self.bot.send_audio(chat_id, input).caption(caption).title(info.title.clone());
                if let Some(duration) = info.duration {
                    req = req.duration(duration as u32);
                }
                req.await?;
            }
        }
        Ok(())
    }
}

#[async_trait]
impl JobRunner for Downloader {
    async fn run(&self, job: DownloadJob) {
        match job {
            DownloadJob::Single {
                chat_id,
                status,
                video_id,
                kind,
                itag,
            } => {
                let status = StatusMessage::new(self.bot.clone(), chat_id, status);
                if let Err(e) = self.run_single(&status, &video_id, kind, &itag).await {
                    error!("Download error for {video_id} (itag {itag}): {e:#}");
                    if let Err(e) = status.update(&ui::download_error(kind.as_str(), &e.to_string())).await {
                        warn!("Failed to report download error: {e}");
                    }
                }
            }
            DownloadJob::Playlist {
                chat_id,
                status,
                playlist_id,
                kind,
            } => {
                let status = StatusMessage::new(self.bot.clone(), chat_id, status);
                if let Err(e) = self.run_playlist(&status, &playlist_id, kind).await {
                    error!("Playlist download error for {playlist_id}: {e:#}");
                    if let Err(e) = status.update(&ui::download_error("playlist", &e.to_string())).await {
                        warn!("Failed to report playlist error: {e}");
                    }
                }
            }
        }
    }
}

/// Upload file name derived from the title, e.g. "Never Gonna Give You Up.mp4"
pub fn file_name(title: &str, ext: &str) -> String {
    let cleaned: String = title
        .chars()
        .map(|c| if c.is_alphanumeric() || " -_.,()".contains(c) { c } else { '_' })
        .collect();
    let cleaned = ui::truncate(cleaned.trim(), 60);
    let stem = if cleaned.is_empty() { "download".to_string() } else { cleaned };
    let ext = if ext.is_empty() { "bin" } else { ext };
    format!("{stem}.{ext}")
}
