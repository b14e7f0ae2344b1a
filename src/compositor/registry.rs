use std::sync::Arc;

use rustc_hash::FxHashMap;
use slotmap::{SlotMap, new_key_type};
use smallvec::SmallVec;

use crate::control::events::{EventSender, RendererEvent};
use crate::scene::WaylandIviSurfaceId;

/// Client connection as numbered by the platform layer.
pub type ConnectionId = u32;

new_key_type! {
    struct SurfaceKey;
    struct BufferKey;
}

/// Decoded wayland client request forwarded by the platform layer.
#[derive(Debug, Clone)]
pub enum CompositorRequest {
    Connect {
        connection: ConnectionId,
    },
    Disconnect {
        connection: ConnectionId,
    },
    CreateSurface {
        connection: ConnectionId,
        surface: u32,
    },
    DestroySurface {
        connection: ConnectionId,
        surface: u32,
    },
    SetTitle {
        connection: ConnectionId,
        surface: u32,
        title: String,
    },
    /// `ivi_application.surface_create`: addresses the surface by ivi id.
    BindIviSurface {
        connection: ConnectionId,
        surface: u32,
        ivi: WaylandIviSurfaceId,
    },
    /// `wl_surface.attach`; introduces the wl_buffer on first sight.
    AttachBuffer {
        connection: ConnectionId,
        surface: u32,
        buffer: u32,
        width: u32,
        height: u32,
        bytes: Arc<[u8]>,
    },
    DetachBuffer {
        connection: ConnectionId,
        surface: u32,
    },
    RequestFrameCallback {
        connection: ConnectionId,
        surface: u32,
        callback: u32,
    },
    /// `wl_surface.commit`: promotes pending → committed.
    CommitSurface {
        connection: ConnectionId,
        surface: u32,
    },
    /// `wl_buffer` destroy listener.
    DestroyBuffer {
        connection: ConnectionId,
        buffer: u32,
    },
}

/// Frame callback to deliver back to a client after the frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameCallback {
    pub connection: ConnectionId,
    pub callback: u32,
}

/// Committed content of a stream source, borrowed for one frame.
#[derive(Debug, Clone)]
pub struct StreamContent {
    pub width: u32,
    pub height: u32,
    pub bytes: Arc<[u8]>,
}

#[derive(Debug)]
struct Surface {
    connection: ConnectionId,
    client_id: u32,
    ivi: Option<WaylandIviSurfaceId>,
    pending: Option<BufferKey>,
    committed: Option<BufferKey>,
    frame_callbacks: SmallVec<[u32; 2]>,
    title: String,
    commit_count: u64,
}

#[derive(Debug)]
struct Buffer {
    connection: ConnectionId,
    client_id: u32,
    width: u32,
    height: u32,
    bytes: Arc<[u8]>,
    refcount: u32,
    destroyed: bool,
}

/// Surface/buffer registry of the embedded compositor.
pub struct EmbeddedCompositor {
    requests_tx: flume::Sender<CompositorRequest>,
    requests_rx: flume::Receiver<CompositorRequest>,
    surfaces: SlotMap<SurfaceKey, Surface>,
    surface_lookup: FxHashMap<(ConnectionId, u32), SurfaceKey>,
    buffers: SlotMap<BufferKey, Buffer>,
    buffer_lookup: FxHashMap<(ConnectionId, u32), BufferKey>,
    /// Bind order per ivi id; the most recently bound live surface wins.
    ivi_bindings: FxHashMap<WaylandIviSurfaceId, Vec<SurfaceKey>>,
    /// Sources whose availability flipped to true since the last drain.
    available_sources: FxHashMap<WaylandIviSurfaceId, bool>,
    updated_sources: Vec<WaylandIviSurfaceId>,
    events: EventSender,
}

impl EmbeddedCompositor {
    #[must_use]
    pub fn new(events: EventSender) -> Self {
        let (requests_tx, requests_rx) = flume::unbounded();
        Self {
            requests_tx,
            requests_rx,
            surfaces: SlotMap::with_key(),
            surface_lookup: FxHashMap::default(),
            buffers: SlotMap::with_key(),
            buffer_lookup: FxHashMap::default(),
            ivi_bindings: FxHashMap::default(),
            available_sources: FxHashMap::default(),
            updated_sources: Vec::new(),
            events,
        }
    }

    /// Sender the platform layer posts decoded requests into.
    #[must_use]
    pub fn request_sender(&self) -> flume::Sender<CompositorRequest> {
        self.requests_tx.clone()
    }

    /// Dispatches everything the platform queued since the last frame.
    pub fn pump(&mut self) {
        let pending: Vec<CompositorRequest> = self.requests_rx.try_iter().collect();
        for request in pending {
            self.handle_request(request);
        }
    }

    /// Ivi sources whose content changed since the last call.
    pub fn dispatch_updated_sources(&mut self) -> Vec<WaylandIviSurfaceId> {
        std::mem::take(&mut self.updated_sources)
    }

    #[must_use]
    pub fn connection_count(&self) -> usize {
        let mut connections: Vec<ConnectionId> =
            self.surfaces.values().map(|s| s.connection).collect();
        connections.sort_unstable();
        connections.dedup();
        connections.len()
    }

    #[must_use]
    pub fn commit_count(&self, ivi: WaylandIviSurfaceId) -> u64 {
        self.active_binder(ivi)
            .and_then(|key| self.surfaces.get(key))
            .map_or(0, |surface| surface.commit_count)
    }

    #[must_use]
    pub fn surface_title(&self, ivi: WaylandIviSurfaceId) -> Option<&str> {
        self.active_binder(ivi)
            .and_then(|key| self.surfaces.get(key))
            .map(|surface| surface.title.as_str())
    }

    /// Content is available when the winning binder has a committed buffer
    /// that is still backed by living client memory.
    #[must_use]
    pub fn is_content_available(&self, ivi: WaylandIviSurfaceId) -> bool {
        self.committed_buffer(ivi).is_some()
    }

    /// Acquires the committed content of a source for this frame; the
    /// buffer stays referenced until [`Self::release_content`].
    pub fn acquire_content(&mut self, ivi: WaylandIviSurfaceId) -> Option<StreamContent> {
        let key = self.committed_buffer(ivi)?;
        let buffer = self.buffers.get_mut(key)?;
        buffer.refcount += 1;
        Some(StreamContent {
            width: buffer.width,
            height: buffer.height,
            bytes: Arc::clone(&buffer.bytes),
        })
    }

    /// Releases the per-frame reference taken by `acquire_content`.
    pub fn release_content(&mut self, ivi: WaylandIviSurfaceId) {
        if let Some(key) = self.committed_buffer(ivi) {
            self.release_buffer(key);
        }
    }

    /// Ends the frame: collects the callbacks of every surface whose ivi id
    /// is in `used` (all surfaces when `notify_all`).
    pub fn end_frame(
        &mut self,
        notify_all: bool,
        used: &[WaylandIviSurfaceId],
    ) -> Vec<FrameCallback> {
        let mut callbacks = Vec::new();
        for surface in self.surfaces.values_mut() {
            let wanted = notify_all
                || surface
                    .ivi
                    .is_some_and(|ivi| used.contains(&ivi));
            if wanted {
                for callback in surface.frame_callbacks.drain(..) {
                    callbacks.push(FrameCallback {
                        connection: surface.connection,
                        callback,
                    });
                }
            }
        }
        callbacks
    }

    // ========================================================================
    // Request dispatch
    // ========================================================================

    pub fn handle_request(&mut self, request: CompositorRequest) {
        let result = self.try_handle(request);
        if let Err((connection, reason)) = result {
            log::error!("wayland protocol error on connection {connection}: {reason}");
            self.drop_connection(connection);
        }
    }

    #[allow(clippy::too_many_lines)]
    fn try_handle(&mut self, request: CompositorRequest) -> std::result::Result<(), (ConnectionId, String)> {
        match request {
            CompositorRequest::Connect { .. } => {}
            CompositorRequest::Disconnect { connection } => {
                self.drop_connection(connection);
            }
            CompositorRequest::CreateSurface {
                connection,
                surface,
            } => {
                if self.surface_lookup.contains_key(&(connection, surface)) {
                    return Err((connection, format!("surface {surface} already exists")));
                }
                let key = self.surfaces.insert(Surface {
                    connection,
                    client_id: surface,
                    ivi: None,
                    pending: None,
                    committed: None,
                    frame_callbacks: SmallVec::new(),
                    title: String::new(),
                    commit_count: 0,
                });
                self.surface_lookup.insert((connection, surface), key);
            }
            CompositorRequest::DestroySurface {
                connection,
                surface,
            } => {
                let key = self.lookup(connection, surface)?;
                self.remove_surface(key);
            }
            CompositorRequest::SetTitle {
                connection,
                surface,
                title,
            } => {
                let key = self.lookup(connection, surface)?;
                self.surfaces[key].title = title;
            }
            CompositorRequest::BindIviSurface {
                connection,
                surface,
                ivi,
            } => {
                let key = self.lookup(connection, surface)?;
                let bindings = self.ivi_bindings.entry(ivi).or_default();
                if !bindings.is_empty() {
                    log::warn!(
                        "{ivi} already bound by {} surface(s); most recent binder wins",
                        bindings.len()
                    );
                }
                bindings.push(key);
                self.surfaces[key].ivi = Some(ivi);
                self.refresh_availability(ivi);
            }
            CompositorRequest::AttachBuffer {
                connection,
                surface,
                buffer,
                width,
                height,
                bytes,
            } => {
                let key = self.lookup(connection, surface)?;
                let buffer_key = *self
                    .buffer_lookup
                    .entry((connection, buffer))
                    .or_insert_with(|| {
                        self.buffers.insert(Buffer {
                            connection,
                            client_id: buffer,
                            width,
                            height,
                            bytes: Arc::clone(&bytes),
                            refcount: 0,
                            destroyed: false,
                        })
                    });
                // latest attach updates the stored content
                if let Some(entry) = self.buffers.get_mut(buffer_key) {
                    entry.bytes = bytes;
                    entry.width = width;
                    entry.height = height;
                    entry.refcount += 1;
                }
                let previous = self.surfaces[key].pending.replace(buffer_key);
                if let Some(previous) = previous {
                    self.release_buffer(previous);
                }
            }
            CompositorRequest::DetachBuffer {
                connection,
                surface,
            } => {
                let key = self.lookup(connection, surface)?;
                if let Some(previous) = self.surfaces[key].pending.take() {
                    self.release_buffer(previous);
                }
            }
            CompositorRequest::RequestFrameCallback {
                connection,
                surface,
                callback,
            } => {
                let key = self.lookup(connection, surface)?;
                self.surfaces[key].frame_callbacks.push(callback);
            }
            CompositorRequest::CommitSurface {
                connection,
                surface,
            } => {
                let key = self.lookup(connection, surface)?;
                let surface_data = &mut self.surfaces[key];
                surface_data.commit_count += 1;
                if let Some(pending) = surface_data.pending.take() {
                    let previous = surface_data.committed.replace(pending);
                    if let Some(previous) = previous {
                        self.release_buffer(previous);
                    }
                }
                if let Some(ivi) = self.surfaces[key].ivi {
                    if self.active_binder(ivi) == Some(key) {
                        if !self.updated_sources.contains(&ivi) {
                            self.updated_sources.push(ivi);
                        }
                        self.refresh_availability(ivi);
                    }
                }
            }
            CompositorRequest::DestroyBuffer { connection, buffer } => {
                if let Some(key) = self.buffer_lookup.remove(&(connection, buffer)) {
                    if let Some(entry) = self.buffers.get_mut(key) {
                        entry.destroyed = true;
                        if entry.refcount == 0 {
                            self.buffers.remove(key);
                        }
                    }
                }
                // surfaces may still point at the key; their content stays
                // valid through the shared bytes until released
                let affected: Vec<WaylandIviSurfaceId> = self
                    .surfaces
                    .values()
                    .filter(|s| s.connection == connection)
                    .filter_map(|s| s.ivi)
                    .collect();
                for ivi in affected {
                    self.refresh_availability(ivi);
                }
            }
        }
        Ok(())
    }

    // ========================================================================
    // Internals
    // ========================================================================

    fn lookup(
        &self,
        connection: ConnectionId,
        surface: u32,
    ) -> std::result::Result<SurfaceKey, (ConnectionId, String)> {
        self.surface_lookup
            .get(&(connection, surface))
            .copied()
            .ok_or_else(|| (connection, format!("unknown surface {surface}")))
    }

    /// Most recently bound surface of an ivi id that is still alive.
    fn active_binder(&self, ivi: WaylandIviSurfaceId) -> Option<SurfaceKey> {
        self.ivi_bindings
            .get(&ivi)?
            .iter()
            .rev()
            .copied()
            .find(|&key| self.surfaces.contains_key(key))
    }

    fn committed_buffer(&self, ivi: WaylandIviSurfaceId) -> Option<BufferKey> {
        let surface = self.surfaces.get(self.active_binder(ivi)?)?;
        let key = surface.committed?;
        self.buffers.contains_key(key).then_some(key)
    }

    fn release_buffer(&mut self, key: BufferKey) {
        if let Some(buffer) = self.buffers.get_mut(key) {
            buffer.refcount = buffer.refcount.saturating_sub(1);
            if buffer.destroyed && buffer.refcount == 0 {
                self.buffer_lookup
                    .remove(&(buffer.connection, buffer.client_id));
                self.buffers.remove(key);
            }
        }
    }

    fn remove_surface(&mut self, key: SurfaceKey) {
        let Some(surface) = self.surfaces.remove(key) else {
            return;
        };
        self.surface_lookup
            .remove(&(surface.connection, surface.client_id));
        if let Some(pending) = surface.pending {
            self.release_buffer(pending);
        }
        if let Some(committed) = surface.committed {
            self.release_buffer(committed);
        }
        if let Some(ivi) = surface.ivi {
            if let Some(bindings) = self.ivi_bindings.get_mut(&ivi) {
                bindings.retain(|&k| k != key);
                if bindings.is_empty() {
                    self.ivi_bindings.remove(&ivi);
                }
            }
            // an earlier binder that is still live takes over
            self.refresh_availability(ivi);
        }
    }

    fn drop_connection(&mut self, connection: ConnectionId) {
        let surface_keys: Vec<SurfaceKey> = self
            .surfaces
            .iter()
            .filter(|(_, s)| s.connection == connection)
            .map(|(key, _)| key)
            .collect();
        for key in surface_keys {
            self.remove_surface(key);
        }
        let buffer_keys: Vec<BufferKey> = self
            .buffers
            .iter()
            .filter(|(_, b)| b.connection == connection)
            .map(|(key, _)| key)
            .collect();
        for key in buffer_keys {
            if let Some(buffer) = self.buffers.get_mut(key) {
                buffer.destroyed = true;
                if buffer.refcount == 0 {
                    self.buffer_lookup
                        .remove(&(buffer.connection, buffer.client_id));
                    self.buffers.remove(key);
                }
            }
        }
    }

    /// Emits `StreamAvailabilityChanged` on every edge of a source's
    /// availability.
    fn refresh_availability(&mut self, ivi: WaylandIviSurfaceId) {
        let available = self.is_content_available(ivi);
        let previous = self
            .available_sources
            .insert(ivi, available)
            .unwrap_or(false);
        if previous != available {
            let _ = self.events.send(RendererEvent::StreamAvailabilityChanged {
                source: ivi,
                available,
            });
        }
    }
}
