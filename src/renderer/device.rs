//! Abstract upload/draw contract issued by the core. Concrete GPU backends
//! (GL, Vulkan) live outside this crate and implement [`Device`]; the
//! scheduler only ever talks through this trait object.

use rustc_hash::FxHashMap;

use crate::errors::Result;
use crate::resources::{Resource, ResourceContentHash};
use crate::scene::{DisplayBufferId, DisplayId, RenderableHandle, SceneId, SceneState,
    WaylandIviSurfaceId};
use crate::renderer::display_graph::DisplayBuffer;

/// GPU backend contract.
pub trait Device {
    /// Uploads one resource; returns the GPU byte footprint.
    /// Fails with [`crate::errors::MirageError::UploadFailed`].
    fn upload_resource(&mut self, hash: ResourceContentHash, resource: &Resource)
    -> Result<usize>;

    /// Unloads a previously uploaded resource; returns the freed bytes.
    fn unload_resource(&mut self, hash: ResourceContentHash) -> usize;

    /// Binds and clears a display buffer before its scenes are drawn.
    fn begin_buffer(&mut self, display: DisplayId, buffer: &DisplayBuffer);

    /// Draws one renderable of `scene` into the bound buffer.
    fn draw_renderable(
        &mut self,
        display: DisplayId,
        buffer: DisplayBufferId,
        scene: &SceneState,
        renderable: RenderableHandle,
    );

    /// Uploads the committed content of an embedded-compositor surface into
    /// the stream texture fed by `source`.
    fn upload_stream_texture(
        &mut self,
        source: WaylandIviSurfaceId,
        width: u32,
        height: u32,
        bytes: &[u8],
    );

    /// Presents the display framebuffer.
    fn swap_buffers(&mut self, display: DisplayId);
}

/// Draw call recorded by [`HeadlessDevice`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RecordedDraw {
    pub display: DisplayId,
    pub buffer: DisplayBufferId,
    pub scene: SceneId,
    pub renderable: RenderableHandle,
}

/// Backend that records instead of drawing. Used by the test suites and as
/// a headless stand-in when no GPU is attached.
#[derive(Debug, Default)]
pub struct HeadlessDevice {
    uploaded: FxHashMap<ResourceContentHash, usize>,
    /// Hashes the device is told to reject, for failure-path exercises.
    pub fail_uploads: Vec<ResourceContentHash>,
    pub draws: Vec<RecordedDraw>,
    pub swaps: Vec<DisplayId>,
    pub stream_uploads: Vec<WaylandIviSurfaceId>,
    pub buffers_begun: Vec<DisplayBufferId>,
}

impl HeadlessDevice {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn uploaded_bytes(&self) -> usize {
        self.uploaded.values().sum()
    }

    #[must_use]
    pub fn is_uploaded(&self, hash: ResourceContentHash) -> bool {
        self.uploaded.contains_key(&hash)
    }
}

impl Device for HeadlessDevice {
    fn upload_resource(
        &mut self,
        hash: ResourceContentHash,
        resource: &Resource,
    ) -> Result<usize> {
        if self.fail_uploads.contains(&hash) {
            return Err(crate::errors::MirageError::UploadFailed {
                hash,
                reason: "rejected by headless device".into(),
            });
        }
        let bytes = resource.uncompressed_size() as usize;
        self.uploaded.insert(hash, bytes);
        Ok(bytes)
    }

    fn unload_resource(&mut self, hash: ResourceContentHash) -> usize {
        self.uploaded.remove(&hash).unwrap_or(0)
    }

    fn begin_buffer(&mut self, _display: DisplayId, buffer: &DisplayBuffer) {
        self.buffers_begun.push(buffer.id);
    }

    fn draw_renderable(
        &mut self,
        display: DisplayId,
        buffer: DisplayBufferId,
        scene: &SceneState,
        renderable: RenderableHandle,
    ) {
        self.draws.push(RecordedDraw {
            display,
            buffer,
            scene: scene.id(),
            renderable,
        });
    }

    fn upload_stream_texture(
        &mut self,
        source: WaylandIviSurfaceId,
        _width: u32,
        _height: u32,
        _bytes: &[u8],
    ) {
        self.stream_uploads.push(source);
    }

    fn swap_buffers(&mut self, display: DisplayId) {
        self.swaps.push(display);
    }
}
