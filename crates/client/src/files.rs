//! Whole-file drivers on top of [`TransferClient`].
//!
//! The uploader pushes chunk after chunk, waiting while the slot is
//! occupied; the downloader fetches, writes and confirms each chunk in
//! turn, waiting while it is not yet available. Both run until the chunk
//! flagged `is_last` has passed through.

use std::path::Path;
use std::time::{Duration, Instant};

use tracing::{debug, info};
use transferit_transfer::{ChunkReader, ChunkWriter, DEFAULT_CHUNK_SIZE, TransferId};

use crate::ClientError;
use crate::client::TransferClient;
use crate::progress::SpeedCalculator;
use crate::retry::RetryConfig;

/// How often progress is logged at `info`.
const PROGRESS_LOG_INTERVAL: Duration = Duration::from_secs(1);

/// Callback invoked after every chunk.
pub type ProgressCallback = Box<dyn Fn(&TransferProgress) + Send + Sync>;

/// Settings for [`upload_file`] and [`download_file`].
pub struct TransferOptions {
    /// Upload chunk size in bytes. Ignored when downloading.
    pub chunk_size: usize,
    pub retry: RetryConfig,
    pub on_progress: Option<ProgressCallback>,
}

impl Default for TransferOptions {
    fn default() -> Self {
        Self {
            chunk_size: DEFAULT_CHUNK_SIZE,
            retry: RetryConfig::default(),
            on_progress: None,
        }
    }
}

/// Progress of a running file transfer.
#[derive(Debug, Clone)]
pub struct TransferProgress {
    pub transfer_id: TransferId,
    pub chunks: u64,
    pub bytes: u64,
    /// Known only on the uploading side.
    pub total_bytes: Option<u64>,
    pub bytes_per_second: f64,
}

/// Outcome of a completed file transfer.
#[derive(Debug, Clone, PartialEq)]
pub struct TransferSummary {
    pub chunks: u64,
    pub bytes: u64,
    pub elapsed: Duration,
}

struct Tracker<'a> {
    progress: TransferProgress,
    speed: SpeedCalculator,
    started: Instant,
    last_log: Instant,
    callback: Option<&'a ProgressCallback>,
}

impl<'a> Tracker<'a> {
    fn new(
        id: TransferId,
        total_bytes: Option<u64>,
        callback: Option<&'a ProgressCallback>,
    ) -> Self {
        let now = Instant::now();
        Self {
            progress: TransferProgress {
                transfer_id: id,
                chunks: 0,
                bytes: 0,
                total_bytes,
                bytes_per_second: 0.0,
            },
            speed: SpeedCalculator::default(),
            started: now,
            last_log: now,
            callback,
        }
    }

    fn record(&mut self, bytes: usize) {
        let bytes = bytes as u64;
        self.speed.add_sample(bytes);
        self.progress.chunks += 1;
        self.progress.bytes += bytes;
        self.progress.bytes_per_second = self.speed.bytes_per_second();

        if let Some(cb) = self.callback {
            cb(&self.progress);
        }

        if self.last_log.elapsed() >= PROGRESS_LOG_INTERVAL {
            self.last_log = Instant::now();
            let eta = self
                .progress
                .total_bytes
                .and_then(|total| self.speed.eta(total.saturating_sub(self.progress.bytes)));
            info!(
                transfer = %self.progress.transfer_id,
                chunks = self.progress.chunks,
                bytes = self.progress.bytes,
                total = ?self.progress.total_bytes,
                kib_per_sec = self.progress.bytes_per_second / 1024.0,
                ?eta,
                "transfer progress"
            );
        }
    }

    fn finish(self) -> TransferSummary {
        TransferSummary {
            chunks: self.progress.chunks,
            bytes: self.progress.bytes,
            elapsed: self.started.elapsed(),
        }
    }
}

/// Uploads the file at `path` as transfer `id`.
///
/// Chunks are numbered from 0 and the final one is flagged last; an empty
/// file is sent as a single empty last chunk.
pub async fn upload_file(
    client: &TransferClient,
    id: &TransferId,
    path: &Path,
    opts: &TransferOptions,
) -> Result<TransferSummary, ClientError> {
    let mut reader = ChunkReader::open(path, opts.chunk_size)?;
    info!(
        transfer = %id,
        path = %path.display(),
        size = reader.file_size(),
        chunks = reader.chunk_count(),
        "uploading file"
    );

    let mut tracker = Tracker::new(*id, Some(reader.file_size()), opts.on_progress.as_ref());
    while let Some(chunk) = reader.next_chunk()? {
        let chunk = &chunk;
        opts.retry
            .run("upload chunk", move || client.upload_chunk(id, chunk))
            .await?;
        debug!(transfer = %id, chunk = chunk.number, size = chunk.size(), "chunk handed off");
        tracker.record(chunk.size());
    }

    let summary = tracker.finish();
    info!(
        transfer = %id,
        chunks = summary.chunks,
        bytes = summary.bytes,
        elapsed = ?summary.elapsed,
        "upload complete"
    );
    Ok(summary)
}

/// Downloads transfer `id` into a new file at `path`.
///
/// Each chunk is written before it is confirmed, so a confirmed chunk is
/// always on disk.
pub async fn download_file(
    client: &TransferClient,
    id: &TransferId,
    path: &Path,
    opts: &TransferOptions,
) -> Result<TransferSummary, ClientError> {
    let mut writer = ChunkWriter::create(path)?;
    info!(transfer = %id, path = %path.display(), "downloading file");

    let mut tracker = Tracker::new(*id, None, opts.on_progress.as_ref());
    let mut number = 0u64;
    loop {
        let chunk = opts
            .retry
            .run("download chunk", move || client.download_chunk(id, number))
            .await?;
        writer.write_chunk(&chunk)?;
        client.confirm_chunk_downloaded(id, number).await?;
        debug!(transfer = %id, chunk = number, size = chunk.size(), "chunk received");
        tracker.record(chunk.size());

        if chunk.is_last {
            break;
        }
        number += 1;
    }

    let written = writer.finish()?;
    let summary = tracker.finish();
    info!(
        transfer = %id,
        chunks = summary.chunks,
        bytes = written,
        elapsed = ?summary.elapsed,
        "download complete"
    );
    Ok(summary)
}
