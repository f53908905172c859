//! Technique configuration
//!
//! [`TechniqueConfig`] is read once when a technique is built. Only the
//! [`RenderSettings`] behind [`SharedSettings`] may change afterwards; enable
//! predicates and updaters read them once per frame.

use std::sync::Arc;

use parking_lot::RwLock;

use crate::technique::capabilities::Capabilities;

/// Runtime toggles and tunables
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RenderSettings {
    pub ssao_enabled: bool,
    pub bloom_enabled: bool,
    pub exposure: f32,
    pub bloom_intensity: f32,
}

impl Default for RenderSettings {
    fn default() -> Self {
        Self {
            ssao_enabled: true,
            bloom_enabled: true,
            exposure: 1.0,
            bloom_intensity: 0.04,
        }
    }
}

/// Settings shared between a technique, its predicates and its updaters.
pub type SharedSettings = Arc<RwLock<RenderSettings>>;

/// Configuration for building a render technique
#[derive(Debug, Clone)]
pub struct TechniqueConfig {
    pub width: u32,
    pub height: u32,
    pub capabilities: Capabilities,
    /// Include the DepthRange reduction and its output buffer
    pub depth_range: bool,
    /// Include the SSAO pass
    pub ssao: bool,
    /// Bloom mip levels; zero leaves bloom out of the graph
    pub bloom_levels: u32,
    /// Initial runtime settings
    pub settings: RenderSettings,
}

impl TechniqueConfig {
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            width,
            height,
            ..Default::default()
        }
    }

    pub fn with_capabilities(mut self, capabilities: Capabilities) -> Self {
        self.capabilities = capabilities;
        self
    }

    pub fn with_depth_range(mut self, depth_range: bool) -> Self {
        self.depth_range = depth_range;
        self
    }

    pub fn with_ssao(mut self, ssao: bool) -> Self {
        self.ssao = ssao;
        self
    }

    pub fn with_bloom_levels(mut self, bloom_levels: u32) -> Self {
        self.bloom_levels = bloom_levels;
        self
    }
}

impl Default for TechniqueConfig {
    fn default() -> Self {
        Self {
            width: 1280,
            height: 720,
            capabilities: Capabilities::default(),
            depth_range: true,
            ssao: true,
            bloom_levels: 5,
            settings: RenderSettings::default(),
        }
    }
}
