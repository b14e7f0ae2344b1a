//! Renderer configuration surface.

use serde::{Deserialize, Serialize};

use crate::resources::PixelFormat;

/// Per-frame time budgets of the display scheduler, in microseconds.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct FrameBudgets {
    /// Budget for applying pending scene actions.
    pub limit_actions_us: u64,
    /// Budget for resource uploads.
    pub limit_uploads_us: u64,
    /// Budget for offscreen buffer rendering.
    pub limit_offscreen_us: u64,
    /// Hard per-frame ceiling; exceeding it logs the over-budget steps.
    pub frame_max_us: u64,
}

impl Default for FrameBudgets {
    fn default() -> Self {
        Self {
            limit_actions_us: 3000,
            limit_uploads_us: 4000,
            limit_offscreen_us: 4000,
            frame_max_us: 16000,
        }
    }
}

/// Creation-time configuration of one display.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DisplayConfig {
    pub width: u32,
    pub height: u32,
    pub sample_count: u32,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub depth_stencil_format: Option<PixelFormatConfig>,
    /// Skip the swap when nothing feeding the framebuffer changed.
    pub skip_unmodified: bool,
    pub budgets: FrameBudgets,
    /// Embedded-compositor socket settings; `None` disables embedding.
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub embedded_compositor: Option<EmbeddedCompositorConfig>,
}

impl Default for DisplayConfig {
    fn default() -> Self {
        Self {
            width: 1280,
            height: 720,
            sample_count: 1,
            depth_stencil_format: Some(PixelFormatConfig::Depth24Stencil8),
            skip_unmodified: true,
            budgets: FrameBudgets::default(),
            embedded_compositor: None,
        }
    }
}

/// Depth/stencil selection exposed through the config file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PixelFormatConfig {
    Depth16,
    Depth24,
    Depth32,
    Depth24Stencil8,
}

impl From<PixelFormatConfig> for PixelFormat {
    fn from(config: PixelFormatConfig) -> Self {
        match config {
            PixelFormatConfig::Depth16 => PixelFormat::Depth16,
            PixelFormatConfig::Depth24 => PixelFormat::Depth24,
            PixelFormatConfig::Depth32 => PixelFormat::Depth32,
            PixelFormatConfig::Depth24Stencil8 => PixelFormat::Depth24Stencil8,
        }
    }
}

/// Wayland socket the embedded compositor listens on.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EmbeddedCompositorConfig {
    pub socket_name: String,
    #[serde(default)]
    pub socket_group: String,
    #[serde(default = "default_socket_permissions")]
    pub socket_permissions: u32,
}

fn default_socket_permissions() -> u32 {
    0o660
}

/// Resource cache limits of the renderer.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct ResourceCacheConfig {
    /// Eviction threshold for GPU bytes held by unreferenced resources.
    pub max_cache_bytes: usize,
    /// Resources uploaded per `upload_step` at most.
    pub upload_batch_size: usize,
    /// Worker threads for compression and file IO; 0 = CPU cores − 1.
    pub worker_threads: usize,
}

impl Default for ResourceCacheConfig {
    fn default() -> Self {
        Self {
            max_cache_bytes: 64 * 1024 * 1024,
            upload_batch_size: 10,
            worker_threads: 0,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_config_round_trips_through_json() {
        let config = DisplayConfig {
            embedded_compositor: Some(EmbeddedCompositorConfig {
                socket_name: "mirage-ec".into(),
                socket_group: "video".into(),
                socket_permissions: 0o660,
            }),
            ..DisplayConfig::default()
        };
        let json = serde_json::to_string(&config).unwrap();
        let back: DisplayConfig = serde_json::from_str(&json).unwrap();
        assert_eq!(back.width, config.width);
        assert_eq!(
            back.embedded_compositor.unwrap().socket_name,
            "mirage-ec"
        );
    }
}
