//! Async wrappers for long-running pipeline work.
//!
//! A pipeline run takes minutes and is blocking throughout, so
//! [`ProcessingFuture`] moves it onto a `tokio::task::spawn_blocking`
//! thread. [`LogFollower`] streams a video's processing log line by line,
//! waiting for new lines as they are appended, the same way a client
//! would tail `log.txt`.
//!
//! # Example
//!
//! ```no_run
//! use tokio_stream::StreamExt;
//!
//! use signpipe::{LogFollower, VideoFolderFactory};
//!
//! # async fn example() -> Result<(), signpipe::PipelineError> {
//! let folder = VideoFolderFactory::default().folder_for("42");
//! let mut lines = LogFollower::follow(folder.log_file());
//! while let Some(line) = lines.next().await {
//!     println!("{}", line?);
//! }
//! # Ok(())
//! # }
//! ```

use std::fs::File;
use std::future::Future;
use std::io::{BufRead, BufReader};
use std::path::{Path, PathBuf};
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};
use std::thread;
use std::time::Duration;

use futures_core::Stream;
use tokio::sync::mpsc::{Receiver, Sender};
use tokio::task::{JoinError, JoinHandle};

use crate::configuration::PipelineOptions;
use crate::error::PipelineError;
use crate::processor::{Toolkit, process_video};
use crate::repository::{Video, VideoFolder, VideosRepository};

/// Lines buffered ahead of the consumer.
const LOG_CHANNEL_CAPACITY: usize = 64;

/// How long the follower sleeps when it has reached the end of the log.
const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(1);

/// A pipeline run on a blocking thread. Resolves to the final video record.
///
/// A panic on the blocking thread resolves to [`PipelineError::Panicked`]. An
/// aborted task resolves to [`PipelineError::Cancelled`].
pub struct ProcessingFuture {
    handle: JoinHandle<Result<Video, PipelineError>>,
}

impl ProcessingFuture {
    /// Start [`process_video`] in the background.
    pub fn spawn(
        video: Video,
        repository: Arc<VideosRepository>,
        folder: VideoFolder,
        toolkit: Toolkit,
        options: PipelineOptions,
        force_all: bool,
    ) -> Self {
        let handle = tokio::task::spawn_blocking(move || {
            process_video(video, repository, folder, toolkit, options, force_all)
        });
        Self { handle }
    }
}

impl Future for ProcessingFuture {
    type Output = Result<Video, PipelineError>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        Pin::new(&mut self.handle).poll(cx).map(join_outcome)
    }
}

fn join_outcome(result: Result<Result<Video, PipelineError>, JoinError>) -> Result<Video, PipelineError> {
    match result {
        Ok(outcome) => outcome,
        Err(error) if error.is_panic() => Err(PipelineError::from_panic(error.into_panic())),
        Err(_) => Err(PipelineError::Cancelled),
    }
}

/// Stream of the lines of a log file, following it as it grows.
///
/// Ends immediately if the file does not exist. Otherwise it never ends on
/// its own; dropping the stream stops the background reader at its next
/// poll.
pub struct LogFollower {
    receiver: Receiver<Result<String, PipelineError>>,
}

impl LogFollower {
    /// Follow `path`, checking for new lines every second.
    pub fn follow(path: impl Into<PathBuf>) -> Self {
        Self::with_poll_interval(path, DEFAULT_POLL_INTERVAL)
    }

    /// Follow `path`, checking for new lines every `interval`.
    pub fn with_poll_interval(path: impl Into<PathBuf>, interval: Duration) -> Self {
        let path = path.into();
        let (sender, receiver) = tokio::sync::mpsc::channel(LOG_CHANNEL_CAPACITY);

        // Detached: the reader exits once the receiver is dropped.
        tokio::task::spawn_blocking(move || {
            if let Err(error) = follow_blocking(&path, interval, &sender) {
                let _ = sender.blocking_send(Err(error));
            }
        });

        Self { receiver }
    }
}

impl Stream for LogFollower {
    type Item = Result<String, PipelineError>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.receiver.poll_recv(cx)
    }
}

fn follow_blocking(
    path: &Path,
    interval: Duration,
    sender: &Sender<Result<String, PipelineError>>,
) -> Result<(), PipelineError> {
    if !path.is_file() {
        return Ok(());
    }
    let mut reader = BufReader::new(File::open(path)?);
    let mut line = String::new();

    loop {
        // A partial line stays in `line` until its newline arrives.
        if reader.read_line(&mut line)? == 0 || !line.ends_with('\n') {
            if sender.is_closed() {
                return Ok(());
            }
            thread::sleep(interval);
            continue;
        }

        let complete = line.trim_end_matches(['\r', '\n']).to_string();
        line.clear();
        if sender.blocking_send(Ok(complete)).is_err() {
            return Ok(());
        }
    }
}

#[cfg(test)]
mod tests {
    use std::fs::OpenOptions;
    use std::io::Write;

    use tokio_stream::StreamExt;

    use super::*;

    #[tokio::test(flavor = "multi_thread")]
    async fn follower_sees_appended_lines() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("log.txt");
        std::fs::write(&path, "first\nsec").unwrap();

        let mut follower = LogFollower::with_poll_interval(&path, Duration::from_millis(10));
        assert_eq!(follower.next().await.unwrap().unwrap(), "first");

        let mut file = OpenOptions::new().append(true).open(&path).unwrap();
        writeln!(file, "ond").unwrap();
        writeln!(file, "third").unwrap();

        assert_eq!(follower.next().await.unwrap().unwrap(), "second");
        assert_eq!(follower.next().await.unwrap().unwrap(), "third");
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn panicked_run_is_not_reported_as_cancelled() {
        let handle = tokio::task::spawn_blocking(|| -> Result<Video, PipelineError> {
            panic!("translator crashed")
        });
        let result = ProcessingFuture { handle }.await;

        match result {
            Err(PipelineError::Panicked(message)) => assert_eq!(message, "translator crashed"),
            other => panic!("expected a panic error, got {other:?}"),
        }
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn aborted_run_is_cancelled() {
        let handle = tokio::spawn(async {
            std::future::pending::<()>().await;
            Err::<Video, _>(PipelineError::Cancelled)
        });
        handle.abort();
        let result = ProcessingFuture { handle }.await;
        assert!(matches!(result, Err(PipelineError::Cancelled)));
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn missing_log_ends_immediately() {
        let dir = tempfile::tempdir().unwrap();
        let mut follower = LogFollower::follow(dir.path().join("log.txt"));
        assert!(follower.next().await.is_none());
    }
}
