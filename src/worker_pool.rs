//! Bounded-queue worker pool for per-chunk processing.
//!
//! [`ChunkWorkerPool::run`] fans chunks of a frame stream out to a fixed
//! number of worker threads and collects one result per frame into a
//! pre-sized output array.
//!
//! # Architecture
//!
//! ```text
//!                      bounded(Q)
//! [Producer] --Job{chunk, slots}--> [Worker 0..W]
//!  (caller)  ------ W x Stop ------>  (own processor each)
//! ```
//!
//! - The producer decodes chunks on the calling thread. Submission blocks
//!   while the queue is full, so at most `Q` chunks wait ahead of the
//!   workers.
//! - Each worker builds its own processor once, at startup, on its own
//!   thread. Processors never cross threads and need not be `Send`.
//! - Every job carries an exclusive `&mut` sub-slice of the output array,
//!   split off with `split_at_mut`. Ranges of different jobs are disjoint by
//!   construction, so workers write without locking.
//! - After the last chunk the producer sends one `Stop` per worker and joins
//!   them all.
//!
//! A failing or panicking worker cancels the remaining work. Its error is
//! returned once every worker has been joined; a dead worker can never leave
//! the producer blocked because the queue disconnects once no worker holds a
//! receiver.

use std::sync::{Arc, Mutex};
use std::thread;

use crossbeam_channel::{Receiver, Sender, bounded};

use crate::configuration::PipelineOptions;
use crate::error::PipelineError;
use crate::memory_stream::InMemoryFrameStream;
use crate::progress::{CancellationToken, NoOpProgress, ProgressCallback, ProgressTracker};
use crate::stage::Stage;

/// Per-worker transform of one chunk into one result per frame.
pub trait ChunkProcessor {
    /// The per-frame result.
    type Output: Send;

    /// Process `chunk`, whose first frame is frame `start_frame` of the
    /// whole stream. Must return exactly `chunk.len()` results.
    fn process_chunk(
        &mut self,
        chunk: InMemoryFrameStream,
        start_frame: usize,
    ) -> Result<Vec<Self::Output>, PipelineError>;
}

struct Job<'a, T> {
    chunk: InMemoryFrameStream,
    start_frame: usize,
    slots: &'a mut [Option<T>],
}

enum WorkItem<'a, T> {
    Job(Job<'a, T>),
    Stop,
}

/// Cancels the shared stop token if the owning worker unwinds.
struct CancelOnPanic<'a>(&'a CancellationToken);

impl Drop for CancelOnPanic<'_> {
    fn drop(&mut self) {
        if thread::panicking() {
            self.0.cancel();
        }
    }
}

/// A fixed-size pool of chunk workers fed through a bounded queue.
#[derive(Clone)]
pub struct ChunkWorkerPool {
    worker_count: usize,
    queue_capacity: usize,
    stage: Stage,
    progress: Arc<dyn ProgressCallback>,
    cancellation: Option<CancellationToken>,
    batch_size: u64,
}

impl ChunkWorkerPool {
    /// A pool with `worker_count` workers and a queue of `queue_capacity`
    /// chunks. Both are clamped to a minimum of 1.
    pub fn new(worker_count: usize, queue_capacity: usize) -> Self {
        Self {
            worker_count: worker_count.max(1),
            queue_capacity: queue_capacity.max(1),
            stage: Stage::Geometry,
            progress: Arc::new(NoOpProgress),
            cancellation: None,
            batch_size: 1,
        }
    }

    /// A pool sized, observed and cancellable according to `options`.
    pub fn from_options(options: &PipelineOptions, stage: Stage) -> Self {
        Self {
            worker_count: options.worker_count,
            queue_capacity: options.queue_capacity,
            stage,
            progress: Arc::clone(&options.progress),
            cancellation: options.cancellation.clone(),
            batch_size: options.batch_size,
        }
    }

    /// Report progress for `stage` to `callback` every `batch_size` frames.
    #[must_use]
    pub fn with_progress(
        mut self,
        stage: Stage,
        callback: Arc<dyn ProgressCallback>,
        batch_size: u64,
    ) -> Self {
        self.stage = stage;
        self.progress = callback;
        self.batch_size = batch_size.max(1);
        self
    }

    /// Stop submitting chunks once `token` is cancelled.
    #[must_use]
    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancellation = Some(token);
        self
    }

    /// Number of worker threads.
    pub fn worker_count(&self) -> usize {
        self.worker_count
    }

    /// Process every chunk and return one result per frame, in frame order.
    ///
    /// `create_processor` is called once on each worker thread with the
    /// worker's index.
    ///
    /// # Errors
    ///
    /// - The first error returned by a processor, its factory, or the chunk
    ///   source.
    /// - [`PipelineError::WorkerPanicked`] if a worker panicked.
    /// - [`PipelineError::FrameCountMismatch`] if the chunks hold more than
    ///   `total_frames` frames.
    /// - [`PipelineError::IncompleteResults`] if fewer frames arrived.
    /// - [`PipelineError::Cancelled`] if the cancellation token fired.
    pub fn run<I, F, P>(
        &self,
        chunks: I,
        total_frames: usize,
        create_processor: F,
    ) -> Result<Vec<P::Output>, PipelineError>
    where
        I: IntoIterator<Item = Result<InMemoryFrameStream, PipelineError>>,
        F: Fn(usize) -> Result<P, PipelineError> + Sync,
        P: ChunkProcessor,
    {
        let mut slots: Vec<Option<P::Output>> = (0..total_frames).map(|_| None).collect();
        let stop = CancellationToken::new();
        let tracker = Mutex::new(ProgressTracker::new(
            Arc::clone(&self.progress),
            self.stage,
            Some(total_frames as u64),
            self.batch_size,
        ));

        log::debug!(
            "Starting {} workers for {} ({total_frames} frames, queue capacity {})",
            self.worker_count,
            self.stage,
            self.queue_capacity
        );

        let remaining: &mut [Option<P::Output>] = &mut slots;
        let (sender, receiver) = bounded::<WorkItem<'_, P::Output>>(self.queue_capacity);

        let (produced, worker_error) = thread::scope(|scope| {
            let handles: Vec<_> = (0..self.worker_count)
                .map(|worker_index| {
                    let receiver = receiver.clone();
                    let create_processor = &create_processor;
                    let stop = &stop;
                    let tracker = &tracker;
                    scope.spawn(move || {
                        let _guard = CancelOnPanic(stop);
                        let result =
                            run_worker(worker_index, &receiver, create_processor, tracker, stop);
                        if let Err(error) = &result {
                            log::warn!("Worker {worker_index} failed: {error}");
                            stop.cancel();
                        }
                        result
                    })
                })
                .collect();
            drop(receiver);

            let produced = self.produce(chunks, remaining, &sender, &stop);
            if produced.is_err() {
                stop.cancel();
            }

            for _ in 0..self.worker_count {
                if sender.send(WorkItem::Stop).is_err() {
                    break;
                }
            }
            drop(sender);

            let mut worker_error = None;
            for (worker_index, handle) in handles.into_iter().enumerate() {
                let error = match handle.join() {
                    Ok(Ok(())) => continue,
                    Ok(Err(error)) => error,
                    Err(_) => PipelineError::WorkerPanicked(worker_index),
                };
                worker_error.get_or_insert(error);
            }
            (produced, worker_error)
        });

        if let Some(error) = worker_error {
            return Err(error);
        }
        produced?;

        if let Ok(mut tracker) = tracker.lock() {
            tracker.finish();
        }

        collect_slots(slots)
    }

    /// Carve the output array into per-chunk slices and submit the jobs.
    fn produce<'a, I, T>(
        &self,
        chunks: I,
        mut remaining: &'a mut [Option<T>],
        sender: &Sender<WorkItem<'a, T>>,
        stop: &CancellationToken,
    ) -> Result<(), PipelineError>
    where
        I: IntoIterator<Item = Result<InMemoryFrameStream, PipelineError>>,
    {
        let total_frames = remaining.len();
        let mut start_frame = 0;

        for chunk in chunks {
            if stop.is_cancelled() {
                return Ok(());
            }
            if self
                .cancellation
                .as_ref()
                .is_some_and(CancellationToken::is_cancelled)
            {
                return Err(PipelineError::Cancelled);
            }

            let chunk = chunk?;
            if chunk.len() > remaining.len() {
                return Err(PipelineError::FrameCountMismatch {
                    expected: total_frames,
                });
            }

            let (slots, rest) = std::mem::take(&mut remaining).split_at_mut(chunk.len());
            remaining = rest;

            let frame_count = chunk.len();
            let job = Job {
                chunk,
                start_frame,
                slots,
            };
            if sender.send(WorkItem::Job(job)).is_err() {
                // Every worker has exited; the join reports why.
                return Ok(());
            }
            start_frame += frame_count;
        }

        log::debug!("Submitted {start_frame} frames to the worker queue");
        Ok(())
    }
}

fn run_worker<T, F, P>(
    worker_index: usize,
    receiver: &Receiver<WorkItem<'_, T>>,
    create_processor: &F,
    tracker: &Mutex<ProgressTracker>,
    stop: &CancellationToken,
) -> Result<(), PipelineError>
where
    F: Fn(usize) -> Result<P, PipelineError>,
    P: ChunkProcessor<Output = T>,
{
    let mut processor = create_processor(worker_index)?;
    log::debug!("Worker {worker_index} ready");

    while let Ok(WorkItem::Job(job)) = receiver.recv() {
        if stop.is_cancelled() {
            continue;
        }

        let frame_count = job.chunk.len();
        let outputs = processor.process_chunk(job.chunk, job.start_frame)?;
        if outputs.len() != frame_count {
            return Err(PipelineError::DimensionMismatch {
                what: format!("results for chunk starting at frame {}", job.start_frame),
                expected: frame_count,
                actual: outputs.len(),
            });
        }

        for (slot, output) in job.slots.iter_mut().zip(outputs) {
            *slot = Some(output);
        }

        if let Ok(mut tracker) = tracker.lock() {
            tracker.advance_by(frame_count as u64);
        }
    }

    log::debug!("Worker {worker_index} stopped");
    Ok(())
}

/// Unwrap every slot, failing if any was left empty.
fn collect_slots<T>(slots: Vec<Option<T>>) -> Result<Vec<T>, PipelineError> {
    let total = slots.len();
    let missing = slots.iter().filter(|slot| slot.is_none()).count();
    if let Some(first_missing) = slots.iter().position(Option::is_none) {
        return Err(PipelineError::IncompleteResults {
            missing,
            total,
            first_missing,
        });
    }
    Ok(slots.into_iter().flatten().collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chunker::Chunker;
    use crate::frame::Frame;

    /// Records which frame index each result came from.
    struct Echo;

    impl ChunkProcessor for Echo {
        type Output = usize;

        fn process_chunk(
            &mut self,
            chunk: InMemoryFrameStream,
            start_frame: usize,
        ) -> Result<Vec<usize>, PipelineError> {
            Ok((start_frame..start_frame + chunk.len()).collect())
        }
    }

    fn stream_of(count: usize) -> InMemoryFrameStream {
        let mut stream = InMemoryFrameStream::new(25.0, Some((1, 1)));
        for _ in 0..count {
            stream
                .write_frame(Frame::filled(1, 1, [0, 0, 0]), true)
                .unwrap();
        }
        stream.seek(0);
        stream
    }

    #[test]
    fn empty_input_yields_empty_output() {
        let pool = ChunkWorkerPool::new(2, 1);
        let results = pool.run(Vec::new(), 0, |_| Ok(Echo)).unwrap();
        assert!(results.is_empty());
    }

    #[test]
    fn collect_reports_first_gap() {
        let result = collect_slots(vec![Some(1), None, Some(3), None]);
        assert!(matches!(
            result,
            Err(PipelineError::IncompleteResults {
                missing: 2,
                total: 4,
                first_missing: 1
            })
        ));
    }

    #[test]
    fn more_frames_than_slots_is_rejected() {
        let mut stream = stream_of(30);
        let pool = ChunkWorkerPool::new(2, 1);
        let result = pool.run(Chunker::with_frame_count(&mut stream, 10), 25, |_| Ok(Echo));
        assert!(matches!(
            result,
            Err(PipelineError::FrameCountMismatch { expected: 25 })
        ));
    }

    #[test]
    fn fewer_frames_than_slots_is_incomplete() {
        let mut stream = stream_of(20);
        let pool = ChunkWorkerPool::new(2, 1);
        let result = pool.run(Chunker::with_frame_count(&mut stream, 10), 25, |_| Ok(Echo));
        assert!(matches!(
            result,
            Err(PipelineError::IncompleteResults {
                missing: 5,
                first_missing: 20,
                ..
            })
        ));
    }

    #[test]
    fn factory_failure_is_propagated() {
        let mut stream = stream_of(100);
        let pool = ChunkWorkerPool::new(3, 1);
        let result = pool.run(Chunker::with_frame_count(&mut stream, 5), 100, |index| {
            if index == 1 {
                Err(PipelineError::ModelLoad {
                    name: "detector".to_string(),
                    reason: "out of memory".to_string(),
                })
            } else {
                Ok(Echo)
            }
        });
        assert!(matches!(result, Err(PipelineError::ModelLoad { .. })));
    }

    #[test]
    fn cancellation_stops_the_producer() {
        let token = CancellationToken::new();
        token.cancel();
        let mut stream = stream_of(50);
        let pool = ChunkWorkerPool::new(2, 1).with_cancellation(token);
        let result = pool.run(Chunker::with_frame_count(&mut stream, 5), 50, |_| Ok(Echo));
        assert!(matches!(result, Err(PipelineError::Cancelled)));
    }
}
