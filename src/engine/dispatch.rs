//! Dispatch: run the transform once per argument tuple, sequentially or on a bounded worker pool,
//! and turn every outcome into exactly one log entry.

use crossbeam_channel::{Receiver, Sender, TrySendError, bounded, unbounded};
use log::{debug, warn};
use serde_json::Value;
use std::any::Any;
use std::collections::HashMap;
use std::panic::{self, AssertUnwindSafe};
use std::path::PathBuf;
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use crate::engine::pairing::ArgIter;
use crate::types::{Arg, ArgTuple, CallOutcome, ItemStatus, LogEntry, Options, describe_args};
use crate::utils::cancel::CancelToken;
use crate::utils::config::WorkerThreadLimits;

/// A transformation callable.
///
/// Receives the tuple's arguments in order, the step's output directories and its options.
/// Returns a path (JSON string), a list of paths, or null when there is nothing to save.
/// Any other value is recorded as a type error. Must not rely on call order or thread.
///
/// Pool workers are threads in the calling process: a returned error or a panic stays confined
/// to its item, but a segfault or `abort` in a closure (or native code it calls) takes the whole
/// run down. Use [`CommandTransform`](crate::engine::CommandTransform) to run each item in its
/// own OS process when a transform can crash that way.
pub trait Transform: Send + Sync {
    fn call(&self, inputs: &[Arg], output_dirs: &[PathBuf], options: &Options)
    -> anyhow::Result<Value>;
}

impl<F> Transform for F
where
    F: Fn(&[Arg], &[PathBuf], &Options) -> anyhow::Result<Value> + Send + Sync,
{
    fn call(
        &self,
        inputs: &[Arg],
        output_dirs: &[PathBuf],
        options: &Options,
    ) -> anyhow::Result<Value> {
        self(inputs, output_dirs, options)
    }
}

/// Log and outcome flag of one dispatch.
pub struct DispatchResult {
    /// One entry per generated tuple.
    pub log: Vec<LogEntry>,
    pub cancelled: bool,
}

/// Clamp a requested worker count to the host threads and to what the FD limit allows for items
/// of `fds_per_item` descriptors. Over-asking is a warning, not an error.
pub fn effective_workers(step: &str, requested: usize, fds_per_item: usize) -> usize {
    let requested = requested.max(1);
    let max = WorkerThreadLimits::for_items(fds_per_item).max_workers();
    if requested > max {
        warn!("[{step}] {requested} workers requested, clamping to {max}");
        max
    } else {
        requested
    }
}

/// Everything a worker needs to call the transform. Cheap to clone into threads.
#[derive(Clone)]
pub struct Dispatcher {
    step: Arc<str>,
    transform: Arc<dyn Transform>,
    output_dirs: Arc<[PathBuf]>,
    options: Arc<Options>,
    cancel: CancelToken,
}

struct Job {
    id: usize,
    args: ArgTuple,
}

/// `result: None` means the worker skipped the job because the run was cancelled.
struct Done {
    id: usize,
    result: Option<Result<CallOutcome, String>>,
}

impl Dispatcher {
    pub fn new(
        step: &str,
        transform: Arc<dyn Transform>,
        output_dirs: &[PathBuf],
        options: &Options,
        cancel: CancelToken,
    ) -> Self {
        Self {
            step: Arc::from(step),
            transform,
            output_dirs: Arc::from(output_dirs),
            options: Arc::new(options.clone()),
            cancel,
        }
    }

    /// Sequential when `workers <= 1`, worker pool otherwise.
    pub fn run(&self, args: ArgIter, workers: usize) -> DispatchResult {
        if workers > 1 {
            self.run_pool(args, workers)
        } else {
            self.run_sequential(args)
        }
    }

    /// Call the transform, catching errors and panics.
    fn invoke(&self, args: &[Arg]) -> Result<CallOutcome, String> {
        let called = panic::catch_unwind(AssertUnwindSafe(|| {
            self.transform.call(args, &self.output_dirs, &self.options)
        }));
        match called {
            Ok(Ok(value)) => Ok(CallOutcome::classify(value)),
            Ok(Err(e)) => Err(format!("{e:#}")),
            Err(payload) => Err(format!("transform panicked: {}", panic_message(&payload))),
        }
    }

    fn record(&self, args: ArgTuple, result: Result<CallOutcome, String>) -> LogEntry {
        let entry = LogEntry::from_call(args, result);
        match entry.status {
            ItemStatus::Error | ItemStatus::TypeError => warn!(
                "[{}] failed on {}: {}",
                self.step,
                describe_args(&entry.inputs),
                entry.error_message.as_deref().unwrap_or("")
            ),
            ItemStatus::NoOutput => debug!(
                "[{}] nothing saved for {}",
                self.step,
                describe_args(&entry.inputs)
            ),
            _ => {}
        }
        entry
    }

    /// One item at a time, in generation order. Log order = argument order.
    pub fn run_sequential(&self, args: ArgIter) -> DispatchResult {
        let mut log = Vec::new();
        let mut cancelled = false;
        for tuple in args {
            if cancelled || self.cancel.is_cancelled() {
                cancelled = true;
                log.push(LogEntry::pending(tuple));
                continue;
            }
            let result = self.invoke(&tuple);
            log.push(self.record(tuple, result));
        }
        if cancelled {
            warn!("[{}] cancelled; unprocessed items logged as pending", self.step);
        }
        DispatchResult { log, cancelled }
    }

    /// Bounded pool of `workers` threads fed over a channel. Results arrive in completion order
    /// and are matched back to their tuple by id.
    pub fn run_pool(&self, args: ArgIter, workers: usize) -> DispatchResult {
        // Work must be enumerated up front to be submitted.
        let tuples: Vec<ArgTuple> = args.collect();
        let total = tuples.len();
        debug!("[{}] dispatching {} items on {} workers", self.step, total, workers);

        let (job_tx, job_rx) = bounded::<Job>(workers);
        let (done_tx, done_rx) = unbounded::<Done>();
        let handles = self.spawn_workers(job_rx, &done_tx, workers);
        // Dropping our sender lets `done_rx` close once every worker has exited.
        drop(done_tx);

        let mut in_flight: HashMap<usize, ArgTuple> = HashMap::with_capacity(workers * 2);
        let mut log = Vec::with_capacity(total);
        let mut cancelled = false;

        let mut queue = tuples.into_iter().enumerate();
        let mut next = queue.next();
        while let Some((id, tuple)) = next.take() {
            if self.cancel.is_cancelled() {
                cancelled = true;
                log.push(LogEntry::pending(tuple));
                log.extend(queue.by_ref().map(|(_, t)| LogEntry::pending(t)));
                break;
            }
            match job_tx.try_send(Job {
                id,
                args: tuple.clone(),
            }) {
                Ok(()) => {
                    in_flight.insert(id, tuple);
                    next = queue.next();
                }
                Err(TrySendError::Full(_)) => {
                    // Pool saturated: wait for one completion, then retry this tuple.
                    if let Ok(done) = done_rx.recv() {
                        cancelled |= self.collect(done, &mut in_flight, &mut log);
                    }
                    next = Some((id, tuple));
                }
                Err(TrySendError::Disconnected(_)) => {
                    log.push(LogEntry::failed(
                        tuple,
                        "could not schedule item: worker pool is gone",
                    ));
                    next = queue.next();
                }
            }
        }
        drop(job_tx);

        for done in done_rx.iter() {
            cancelled |= self.collect(done, &mut in_flight, &mut log);
        }
        for h in handles {
            let _ = h.join();
        }
        for (_, tuple) in in_flight.drain() {
            log.push(LogEntry::failed(tuple, "worker exited without reporting a result"));
        }
        if cancelled {
            warn!("[{}] cancelled; unprocessed items logged as pending", self.step);
        }
        DispatchResult { log, cancelled }
    }

    /// Match a completion to its tuple and log it. Returns true when the job was skipped by cancellation.
    fn collect(
        &self,
        done: Done,
        in_flight: &mut HashMap<usize, ArgTuple>,
        log: &mut Vec<LogEntry>,
    ) -> bool {
        let Some(tuple) = in_flight.remove(&done.id) else {
            warn!("[{}] result for unknown item #{} dropped", self.step, done.id);
            return false;
        };
        match done.result {
            Some(result) => {
                log.push(self.record(tuple, result));
                false
            }
            None => {
                log.push(LogEntry::pending(tuple));
                true
            }
        }
    }

    fn spawn_workers(
        &self,
        job_rx: Receiver<Job>,
        done_tx: &Sender<Done>,
        workers: usize,
    ) -> Vec<JoinHandle<()>> {
        (0..workers)
            .map(|_| {
                let job_rx = job_rx.clone();
                let done_tx = done_tx.clone();
                let dispatcher = self.clone();
                thread::spawn(move || dispatcher.worker_loop(job_rx, done_tx))
            })
            .collect()
    }

    fn worker_loop(&self, job_rx: Receiver<Job>, done_tx: Sender<Done>) {
        while let Ok(Job { id, args }) = job_rx.recv() {
            let result = if self.cancel.is_cancelled() {
                None
            } else {
                Some(self.invoke(&args))
            };
            if done_tx.send(Done { id, result }).is_err() {
                break;
            }
        }
    }
}

fn panic_message(payload: &Box<dyn Any + Send>) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic payload".to_string()
    }
}
