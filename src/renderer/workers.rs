//! Worker pool for compression and decompression.
//!
//! The render thread never blocks on these jobs; it submits work and polls
//! finished results at its next `upload_step`.

use std::thread;

use crate::errors::Result;
use crate::resources::{CompressionLevel, Resource, ResourceContentHash};

/// Job executed off the render thread.
pub enum WorkerJob {
    /// Fill the compressed representation.
    Compress {
        hash: ResourceContentHash,
        resource: Box<Resource>,
    },
    /// Fill the uncompressed representation.
    Decompress {
        hash: ResourceContentHash,
        resource: Box<Resource>,
    },
}

/// Outcome delivered back to the render thread.
pub struct WorkerResult {
    pub hash: ResourceContentHash,
    pub outcome: Result<Box<Resource>>,
}

pub struct WorkerPool {
    jobs: Option<flume::Sender<WorkerJob>>,
    results: flume::Receiver<WorkerResult>,
    threads: Vec<thread::JoinHandle<()>>,
}

impl WorkerPool {
    /// Spawns `thread_count` workers; 0 means CPU cores − 1 (at least one).
    #[must_use]
    pub fn spawn(thread_count: usize) -> Self {
        let thread_count = if thread_count == 0 {
            thread::available_parallelism()
                .map(|cores| cores.get().saturating_sub(1))
                .unwrap_or(1)
                .max(1)
        } else {
            thread_count
        };

        let (job_tx, job_rx) = flume::unbounded::<WorkerJob>();
        let (result_tx, result_rx) = flume::unbounded::<WorkerResult>();

        let threads = (0..thread_count)
            .map(|index| {
                let jobs = job_rx.clone();
                let results = result_tx.clone();
                thread::Builder::new()
                    .name(format!("mirage-worker-{index}"))
                    .spawn(move || {
                        while let Ok(job) = jobs.recv() {
                            let result = run_job(job);
                            if results.send(result).is_err() {
                                break;
                            }
                        }
                    })
                    .expect("failed to spawn worker thread")
            })
            .collect();

        Self {
            jobs: Some(job_tx),
            results: result_rx,
            threads,
        }
    }

    pub fn submit(&self, job: WorkerJob) {
        if let Some(jobs) = &self.jobs {
            // receiver lives as long as the threads do
            let _ = jobs.send(job);
        }
    }

    /// Drains all finished results without blocking.
    pub fn poll(&self) -> Vec<WorkerResult> {
        self.results.try_iter().collect()
    }
}

impl Drop for WorkerPool {
    fn drop(&mut self) {
        // closing the job channel stops the workers
        self.jobs.take();
        for handle in self.threads.drain(..) {
            let _ = handle.join();
        }
    }
}

fn run_job(job: WorkerJob) -> WorkerResult {
    match job {
        WorkerJob::Compress { hash, mut resource } => {
            resource.compress(CompressionLevel::Realtime);
            WorkerResult {
                hash,
                outcome: Ok(resource),
            }
        }
        WorkerJob::Decompress { hash, mut resource } => {
            let outcome = resource.decompress().map(|()| resource);
            WorkerResult { hash, outcome }
        }
    }
}
