//! Renderer-side runtime: resource cache and upload scheduling, the
//! per-display frame loop with its buffer graph, and the abstract GPU
//! device contract.

pub mod device;
pub mod display_graph;
pub mod resource_manager;
pub mod scheduler;
pub mod settings;
pub mod workers;

pub use device::{Device, HeadlessDevice, RecordedDraw};
pub use display_graph::{ClearFlags, DisplayBuffer, DisplayBufferKind, DisplayGraph, OffscreenLink};
pub use resource_manager::{Residency, ResourceManager};
pub use scheduler::{DisplayScheduler, FrameSummary};
pub use settings::{
    DisplayConfig, EmbeddedCompositorConfig, FrameBudgets, PixelFormatConfig, ResourceCacheConfig,
};
pub use workers::{WorkerJob, WorkerPool, WorkerResult};
