//! Per-frame updaters
//!
//! Updaters run outside the graph before a frame is recorded. CPU updaters
//! refresh host-side data; GPU updaters record uploads into the frame's
//! command stream ahead of the first pass, so their results are visible to
//! every pass of the frame.

use std::sync::Arc;

use bytemuck::{Pod, Zeroable};
use glam::{Mat4, Vec3, Vec4};
use parking_lot::Mutex;

use crate::backend::command::{Command, CommandStream};
use crate::render_graph::{CompiledGraph, FrameContext, GraphError, GraphResult, ResourceId};
use crate::technique::config::SharedSettings;

/// Refreshes host-side data once per frame.
pub trait CpuUpdater: Send {
    fn update(&mut self, frame: &FrameContext);
}

/// Records GPU work ahead of the graph, once per frame.
pub trait GpuUpdater: Send {
    fn record(&mut self, graph: &CompiledGraph, frame: &FrameContext, stream: &mut CommandStream) -> GraphResult<()>;
}

/// Perspective camera feeding the view uniforms
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Camera {
    pub position: Vec3,
    pub target: Vec3,
    pub up: Vec3,
    /// Vertical field of view in radians
    pub fov_y: f32,
    pub near: f32,
    pub far: f32,
}

impl Default for Camera {
    fn default() -> Self {
        Self {
            position: Vec3::new(0.0, 2.0, 5.0),
            target: Vec3::ZERO,
            up: Vec3::Y,
            fov_y: std::f32::consts::FRAC_PI_4,
            near: 0.1,
            far: 1000.0,
        }
    }
}

impl Camera {
    pub fn new(position: Vec3, target: Vec3) -> Self {
        Self {
            position,
            target,
            ..Default::default()
        }
    }

    pub fn view_matrix(&self) -> Mat4 {
        Mat4::look_at_rh(self.position, self.target, self.up)
    }

    pub fn projection_matrix(&self, aspect: f32) -> Mat4 {
        Mat4::perspective_rh(self.fov_y, aspect, self.near, self.far)
    }
}

/// View uniform block read by the built-in passes
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Pod, Zeroable)]
pub struct ViewUniforms {
    pub view_proj: Mat4,
    pub inv_view_proj: Mat4,
    pub camera_pos: Vec4,
    /// width, height, 1/width, 1/height
    pub viewport: Vec4,
    /// exposure, bloom intensity, frame index, delta time
    pub params: Vec4,
}

impl ViewUniforms {
    pub const SIZE: u64 = std::mem::size_of::<ViewUniforms>() as u64;

    pub fn exposure(&self) -> f32 {
        self.params.x
    }

    pub fn bloom_intensity(&self) -> f32 {
        self.params.y
    }
}

impl Default for ViewUniforms {
    fn default() -> Self {
        Self::zeroed()
    }
}

/// Uniform data shared between the CPU updater and the uploader.
pub type SharedUniforms = Arc<Mutex<ViewUniforms>>;

/// Shared camera the view uniforms are computed from.
pub type SharedCamera = Arc<Mutex<Camera>>;

/// Computes [`ViewUniforms`] from the camera and the runtime settings.
pub struct ViewUniformsUpdater {
    camera: SharedCamera,
    settings: SharedSettings,
    width: u32,
    height: u32,
    output: SharedUniforms,
}

impl ViewUniformsUpdater {
    pub fn new(
        camera: SharedCamera,
        settings: SharedSettings,
        width: u32,
        height: u32,
        output: SharedUniforms,
    ) -> Self {
        Self {
            camera,
            settings,
            width,
            height,
            output,
        }
    }
}

impl CpuUpdater for ViewUniformsUpdater {
    fn update(&mut self, frame: &FrameContext) {
        let camera = *self.camera.lock();
        let settings = *self.settings.read();

        let width = self.width.max(1) as f32;
        let height = self.height.max(1) as f32;
        let view_proj = camera.projection_matrix(width / height) * camera.view_matrix();
        // Disabled bloom still leaves the last chain output in place
        let bloom_intensity = if settings.bloom_enabled {
            settings.bloom_intensity
        } else {
            0.0
        };

        *self.output.lock() = ViewUniforms {
            view_proj,
            inv_view_proj: view_proj.inverse(),
            camera_pos: camera.position.extend(1.0),
            viewport: Vec4::new(width, height, 1.0 / width, 1.0 / height),
            params: Vec4::new(
                settings.exposure,
                bloom_intensity,
                frame.frame_index as f32,
                frame.delta_time,
            ),
        };
    }
}

/// Uploads the shared [`ViewUniforms`] into their graph buffer.
pub struct UniformUploader {
    buffer: ResourceId,
    source: SharedUniforms,
}

impl UniformUploader {
    pub fn new(buffer: ResourceId, source: SharedUniforms) -> Self {
        Self { buffer, source }
    }
}

impl GpuUpdater for UniformUploader {
    fn record(&mut self, graph: &CompiledGraph, _frame: &FrameContext, stream: &mut CommandStream) -> GraphResult<()> {
        let buffer = graph
            .physical(self.buffer)
            .and_then(|physical| physical.as_buffer())
            .ok_or(GraphError::UnknownResource(self.buffer))?;
        let uniforms = *self.source.lock();
        stream.push(Command::WriteBuffer {
            buffer,
            offset: 0,
            data: bytemuck::bytes_of(&uniforms).to_vec(),
        });
        Ok(())
    }
}
