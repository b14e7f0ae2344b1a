//! One-pass validation of a scene's object tree.
//!
//! Each object contributes issues about itself and the objects it declares
//! as dependencies; traversal never follows anything else, keeping the walk
//! linear. Duplicate issues per (object, message) are suppressed.

use std::fmt;

use rustc_hash::FxHashSet;

use crate::scene::components::TextureSamplerContent;
use crate::scene::handles::SceneHandle;
use crate::scene::state::SceneState;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Severity {
    Warning,
    Error,
}

/// One validation finding attributed to the originating object.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationIssue {
    pub severity: Severity,
    /// Debug-formatted handle of the originating object.
    pub object: String,
    pub message: String,
}

impl fmt::Display for ValidationIssue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let tag = match self.severity {
            Severity::Warning => "warning",
            Severity::Error => "error",
        };
        write!(f, "[{tag}] {}: {}", self.object, self.message)
    }
}

/// Collected validation issues.
#[derive(Debug, Default)]
pub struct ValidationReport {
    issues: Vec<ValidationIssue>,
    seen: FxHashSet<(String, String)>,
}

impl ValidationReport {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, severity: Severity, object: impl fmt::Debug, message: impl Into<String>) {
        let object = format!("{object:?}");
        let message = message.into();
        if self.seen.insert((object.clone(), message.clone())) {
            self.issues.push(ValidationIssue {
                severity,
                object,
                message,
            });
        }
    }

    #[must_use]
    pub fn issues(&self) -> &[ValidationIssue] {
        &self.issues
    }

    #[must_use]
    pub fn has_error(&self) -> bool {
        self.issues
            .iter()
            .any(|issue| issue.severity == Severity::Error)
    }

    #[must_use]
    pub fn has_issue(&self) -> bool {
        !self.issues.is_empty()
    }
}

impl SceneState {
    /// Walks the object tree once and collects all issues.
    #[must_use]
    pub fn validate(&self) -> ValidationReport {
        let mut report = ValidationReport::new();

        for (handle, renderable) in self.renderables.iter() {
            if !self.nodes.contains(renderable.node) {
                report.add(Severity::Error, handle, "bound node was released");
            }
            if renderable.geometry_instance.is_valid()
                && !self.data_instances.contains(renderable.geometry_instance)
            {
                report.add(Severity::Error, handle, "geometry data instance was released");
            }
            if renderable.uniform_instance.is_valid()
                && !self.data_instances.contains(renderable.uniform_instance)
            {
                report.add(Severity::Error, handle, "uniform data instance was released");
            }
            if renderable.index_count == 0 {
                report.add(Severity::Warning, handle, "renderable draws zero indices");
            }
        }

        for (handle, instance) in self.data_instances.iter() {
            match self.data_layouts.get(instance.layout) {
                None => report.add(Severity::Error, handle, "data layout was released"),
                Some(layout) => {
                    if layout.fields.len() != instance.fields.len() {
                        report.add(
                            Severity::Error,
                            handle,
                            "field count differs from its data layout",
                        );
                    }
                }
            }
            for field in &instance.fields {
                if field.sampler.is_valid() && !self.texture_samplers.contains(field.sampler) {
                    report.add(Severity::Error, handle, "texture sampler was released");
                }
            }
        }

        for (handle, sampler) in self.texture_samplers.iter() {
            match sampler.content {
                TextureSamplerContent::ClientTexture(hash) => {
                    if !hash.is_valid() {
                        report.add(Severity::Warning, handle, "samples an invalid resource hash");
                    }
                }
                TextureSamplerContent::RenderBuffer(buffer) => {
                    if !self.render_buffers.contains(buffer) {
                        report.add(Severity::Error, handle, "sampled render buffer was released");
                    }
                }
                TextureSamplerContent::TextureBuffer(buffer) => {
                    if !self.texture_buffers.contains(buffer) {
                        report.add(Severity::Error, handle, "sampled texture buffer was released");
                    }
                }
                TextureSamplerContent::StreamTexture(stream) => {
                    if !self.stream_textures.contains(stream) {
                        report.add(Severity::Error, handle, "sampled stream texture was released");
                    }
                }
            }
        }

        for (handle, target) in self.render_targets.iter() {
            if target.buffers.is_empty() {
                report.add(Severity::Warning, handle, "render target has no buffers");
            }
            for &buffer in &target.buffers {
                if !self.render_buffers.contains(buffer) {
                    report.add(Severity::Error, handle, "attached render buffer was released");
                }
            }
        }

        for (handle, blit) in self.blit_passes.iter() {
            if blit.source == blit.destination {
                report.add(Severity::Warning, handle, "blits a buffer onto itself");
            }
            if !self.render_buffers.contains(blit.source) {
                report.add(Severity::Error, handle, "blit source was released");
            }
            if !self.render_buffers.contains(blit.destination) {
                report.add(Severity::Error, handle, "blit destination was released");
            }
            if blit.source_rect[2] == 0 || blit.source_rect[3] == 0 {
                report.add(Severity::Warning, handle, "blit source region is empty");
            }
        }

        for (handle, stream) in self.stream_textures.iter() {
            if !stream.fallback.is_valid() {
                report.add(Severity::Warning, handle, "stream texture has no fallback image");
            }
        }

        report
    }
}
