//! Reference-counted resource cache of the renderer.
//!
//! Tracks residency per content hash, schedules uploads FIFO per scene with
//! round-robin across scenes, hands compression work to the worker pool and
//! answers the readiness queries driving scene state transitions. Payload
//! buffers are immutable once provided; only the metadata map is behind a
//! mutex.

use std::collections::VecDeque;

use parking_lot::Mutex;
use rustc_hash::FxHashMap;

use crate::control::events::{EventSender, RendererEvent};
use crate::renderer::device::Device;
use crate::renderer::settings::ResourceCacheConfig;
use crate::renderer::workers::{WorkerJob, WorkerPool, WorkerResult};
use crate::resources::{Resource, ResourceContentHash};
use crate::scene::SceneId;
use crate::utils::BudgetTimer;

/// Residency of one cached resource.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Residency {
    /// Known (referenced or provided) but not on the GPU.
    Registered,
    /// Upload in progress, possibly waiting on decompression.
    Uploading,
    /// Resident on the GPU.
    Ready,
    /// Queued for GPU teardown.
    Unloading,
    /// Upload rejected; dependents never become ready.
    Failed,
}

#[derive(Debug)]
struct Entry {
    refcount: u32,
    residency: Residency,
    bytes_gpu: usize,
    resource: Option<Resource>,
    queued: bool,
    last_used: u64,
}

impl Entry {
    fn new() -> Self {
        Self {
            refcount: 0,
            residency: Residency::Registered,
            bytes_gpu: 0,
            resource: None,
            queued: false,
            last_used: 0,
        }
    }
}

pub struct ResourceManager {
    config: ResourceCacheConfig,
    entries: Mutex<FxHashMap<ResourceContentHash, Entry>>,
    upload_queues: FxHashMap<SceneId, VecDeque<ResourceContentHash>>,
    round_robin: VecDeque<SceneId>,
    in_flight: FxHashMap<ResourceContentHash, SceneId>,
    deferred_unloads: Vec<ResourceContentHash>,
    pool: WorkerPool,
    events: EventSender,
    lru_tick: u64,
}

impl ResourceManager {
    #[must_use]
    pub fn new(config: ResourceCacheConfig, events: EventSender) -> Self {
        let pool = WorkerPool::spawn(config.worker_threads);
        Self {
            config,
            entries: Mutex::new(FxHashMap::default()),
            upload_queues: FxHashMap::default(),
            round_robin: VecDeque::new(),
            in_flight: FxHashMap::default(),
            deferred_unloads: Vec::new(),
            pool,
            events,
            lru_tick: 0,
        }
    }

    /// Registers the payload of a resource arriving from the transport.
    pub fn provide(&mut self, resource: Resource) {
        let hash = resource.hash();
        let mut entries = self.entries.lock();
        let entry = entries.entry(hash).or_insert_with(Entry::new);
        if entry.resource.is_some() || entry.residency == Residency::Ready {
            return;
        }
        entry.resource = Some(resource);
        let needs_queue =
            entry.refcount > 0 && entry.residency == Residency::Registered && !entry.queued;
        if needs_queue {
            entry.queued = true;
        }
        drop(entries);
        if needs_queue {
            // referenced before the payload arrived; owning scene unknown,
            // use the shared queue slot
            self.enqueue(SceneId(0), hash);
        }
    }

    /// Increments the refcount; first reference of a registered resource
    /// enqueues its upload.
    pub fn reference(&mut self, scene: SceneId, hash: ResourceContentHash) {
        self.lru_tick += 1;
        let mut entries = self.entries.lock();
        let entry = entries.entry(hash).or_insert_with(Entry::new);
        entry.refcount += 1;
        entry.last_used = self.lru_tick;
        if entry.residency == Residency::Unloading {
            // resurrected before the deferred teardown ran
            entry.residency = if entry.bytes_gpu > 0 {
                Residency::Ready
            } else {
                Residency::Registered
            };
            self.deferred_unloads.retain(|&h| h != hash);
        }
        let needs_queue = entry.residency == Residency::Registered && !entry.queued;
        if needs_queue {
            entry.queued = true;
        }
        drop(entries);
        if needs_queue {
            self.enqueue(scene, hash);
        }
    }

    /// Decrements the refcount. Entries at zero stay cached until the LRU
    /// eviction needs their bytes; queued uploads are cancelled lazily.
    pub fn dereference(&mut self, hash: ResourceContentHash) {
        self.lru_tick += 1;
        let mut entries = self.entries.lock();
        let Some(entry) = entries.get_mut(&hash) else {
            log::warn!("dereference of unknown resource {hash}");
            return;
        };
        if entry.refcount == 0 {
            log::warn!("refcount underflow on resource {hash}");
            return;
        }
        entry.refcount -= 1;
        entry.last_used = self.lru_tick;
    }

    /// All given hashes resident on the GPU?
    pub fn readiness<'a>(&self, hashes: impl IntoIterator<Item = &'a ResourceContentHash>) -> bool {
        let entries = self.entries.lock();
        hashes.into_iter().all(|hash| {
            entries
                .get(hash)
                .is_some_and(|entry| entry.residency == Residency::Ready)
        })
    }

    #[must_use]
    pub fn residency(&self, hash: ResourceContentHash) -> Option<Residency> {
        self.entries.lock().get(&hash).map(|entry| entry.residency)
    }

    /// Total GPU bytes of resident resources.
    #[must_use]
    pub fn gpu_bytes(&self) -> usize {
        self.entries
            .lock()
            .values()
            .map(|entry| entry.bytes_gpu)
            .sum()
    }

    /// Queues a background compression of the resource's payload.
    pub fn compress_in_background(&mut self, hash: ResourceContentHash) {
        let mut entries = self.entries.lock();
        let Some(entry) = entries.get_mut(&hash) else {
            return;
        };
        if let Some(resource) = entry.resource.take() {
            self.in_flight.insert(hash, SceneId(0));
            self.pool.submit(WorkerJob::Compress {
                hash,
                resource: Box::new(resource),
            });
        }
    }

    /// One budgeted upload pass: collect worker results, upload up to the
    /// configured batch within `budget_us`, then run deferred teardowns and
    /// the cache eviction.
    pub fn upload_step(&mut self, device: &mut dyn Device, budget_us: u64) -> usize {
        self.process_deferred_unloads(device);
        self.collect_worker_results();

        let budget = BudgetTimer::start(budget_us);
        let mut uploaded = 0;
        while uploaded < self.config.upload_batch_size && !budget.expired() {
            let Some((scene, hash)) = self.pop_next_queued() else {
                break;
            };
            if self.start_upload(device, scene, hash) {
                uploaded += 1;
            }
        }

        self.enforce_cache_limit();
        uploaded
    }

    /// Aborts every queued upload (display teardown). In-flight worker jobs
    /// finish and are dropped when their results arrive.
    pub fn abort_queued(&mut self) {
        let mut entries = self.entries.lock();
        for queue in self.upload_queues.values() {
            for hash in queue {
                if let Some(entry) = entries.get_mut(hash) {
                    entry.queued = false;
                }
            }
        }
        self.upload_queues.clear();
        self.round_robin.clear();
    }

    // ========================================================================
    // Internals
    // ========================================================================

    fn enqueue(&mut self, scene: SceneId, hash: ResourceContentHash) {
        let queue = self.upload_queues.entry(scene).or_insert_with(|| {
            self.round_robin.push_back(scene);
            VecDeque::new()
        });
        queue.push_back(hash);
    }

    fn requeue_front(&mut self, scene: SceneId, hash: ResourceContentHash) {
        let queue = self.upload_queues.entry(scene).or_insert_with(|| {
            self.round_robin.push_back(scene);
            VecDeque::new()
        });
        queue.push_front(hash);
    }

    /// FIFO per scene, round-robin across scenes.
    fn pop_next_queued(&mut self) -> Option<(SceneId, ResourceContentHash)> {
        for _ in 0..self.round_robin.len() {
            let scene = self.round_robin.pop_front()?;
            let Some(queue) = self.upload_queues.get_mut(&scene) else {
                continue;
            };
            if let Some(hash) = queue.pop_front() {
                if queue.is_empty() {
                    self.upload_queues.remove(&scene);
                } else {
                    self.round_robin.push_back(scene);
                }
                return Some((scene, hash));
            }
            self.upload_queues.remove(&scene);
        }
        None
    }

    /// Returns true when a GPU upload was performed.
    fn start_upload(
        &mut self,
        device: &mut dyn Device,
        scene: SceneId,
        hash: ResourceContentHash,
    ) -> bool {
        let mut entries = self.entries.lock();
        let Some(entry) = entries.get_mut(&hash) else {
            return false;
        };
        if entry.refcount == 0 {
            // dereferenced while queued; cancel
            entry.queued = false;
            return false;
        }
        match entry.residency {
            Residency::Registered => {}
            _ => {
                entry.queued = false;
                return false;
            }
        }

        let Some(resource) = &entry.resource else {
            // payload has not arrived yet; retried once provided
            entry.queued = false;
            return false;
        };

        if resource.payload().is_none() {
            // only the compressed representation is resident; decompress off
            // the render thread and retry when the result lands
            let resource = entry.resource.take().unwrap();
            entry.residency = Residency::Uploading;
            drop(entries);
            self.in_flight.insert(hash, scene);
            self.pool.submit(WorkerJob::Decompress {
                hash,
                resource: Box::new(resource),
            });
            return false;
        }

        entry.residency = Residency::Uploading;
        match device.upload_resource(hash, resource) {
            Ok(bytes) => {
                entry.residency = Residency::Ready;
                entry.bytes_gpu = bytes;
                entry.queued = false;
                entry.last_used = self.lru_tick;
                true
            }
            Err(error) => {
                log::error!("upload of {hash} failed: {error}");
                entry.residency = Residency::Failed;
                entry.queued = false;
                let _ = self.events.send(RendererEvent::ResourceFailed { hash });
                false
            }
        }
    }

    fn collect_worker_results(&mut self) {
        for WorkerResult { hash, outcome } in self.pool.poll() {
            let scene = self.in_flight.remove(&hash).unwrap_or(SceneId(0));
            let mut entries = self.entries.lock();
            let Some(entry) = entries.get_mut(&hash) else {
                continue;
            };
            match outcome {
                Ok(resource) => {
                    entry.resource = Some(*resource);
                    if entry.residency == Residency::Uploading {
                        // back in line at the front of its scene's queue
                        entry.residency = Residency::Registered;
                        entry.queued = true;
                        drop(entries);
                        self.requeue_front(scene, hash);
                    }
                }
                Err(error) => {
                    log::error!("worker job for {hash} failed: {error}");
                    entry.residency = Residency::Failed;
                    let _ = self.events.send(RendererEvent::ResourceFailed { hash });
                }
            }
        }
    }

    fn process_deferred_unloads(&mut self, device: &mut dyn Device) {
        if self.deferred_unloads.is_empty() {
            return;
        }
        let mut entries = self.entries.lock();
        for hash in self.deferred_unloads.drain(..) {
            if let Some(entry) = entries.get(&hash) {
                if entry.residency == Residency::Unloading {
                    device.unload_resource(hash);
                    entries.remove(&hash);
                }
            }
        }
    }

    /// LRU eviction among ready entries with refcount 0. Victims move to
    /// `Unloading`; the GPU teardown runs at the start of the next step.
    fn enforce_cache_limit(&mut self) {
        let mut entries = self.entries.lock();
        loop {
            let unreferenced_bytes: usize = entries
                .values()
                .filter(|e| e.refcount == 0 && e.residency == Residency::Ready)
                .map(|e| e.bytes_gpu)
                .sum();
            if unreferenced_bytes <= self.config.max_cache_bytes {
                return;
            }
            let Some((&hash, _)) = entries
                .iter()
                .filter(|(_, e)| e.refcount == 0 && e.residency == Residency::Ready)
                .min_by_key(|(_, e)| e.last_used)
            else {
                return;
            };
            if let Some(entry) = entries.get_mut(&hash) {
                entry.residency = Residency::Unloading;
            }
            self.deferred_unloads.push(hash);
        }
    }
}
