//! Shared helpers for the integration tests.

#![allow(dead_code)]

use render_graph_engine::backend::{TextureFormat, TextureUsage};
use render_graph_engine::render_graph::{ResourceDesc, ResourceId, RenderGraph};

/// Initialize logging for test output
pub fn init_logging() {
    let _ = env_logger::builder()
        .filter_level(log::LevelFilter::Debug)
        .is_test(true)
        .try_init();
}

/// 64x64 colour image usable as attachment, sampled and storage image.
pub fn color_target(graph: &mut RenderGraph, name: &str) -> ResourceId {
    graph
        .declare_resource(
            name,
            ResourceDesc::image_2d(
                64,
                64,
                TextureFormat::Rgba16Float,
                TextureUsage::RENDER_ATTACHMENT
                    | TextureUsage::TEXTURE_BINDING
                    | TextureUsage::STORAGE_BINDING,
            ),
        )
        .expect("declare colour target")
}
