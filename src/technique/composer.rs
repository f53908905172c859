//! Render technique composer
//!
//! [`RenderTechnique`] owns one compiled graph: it selects the prepass
//! variant from the capability flags, declares every resource, registers the
//! prepass and the passes consuming its outputs, verifies the output contract
//! and compiles. Changing the variant means building a new technique.

use std::sync::Arc;

use parking_lot::{Mutex, RwLock};

use crate::backend::command::CommandStream;
use crate::backend::traits::GraphicsBackend;
use crate::backend::types::{BufferUsage, TextureFormat, TextureUsage};
use crate::pipeline::bloom::add_bloom_chain;
use crate::pipeline::opaque::{add_opaque_pass, OpaqueInputs};
use crate::pipeline::ssao::add_ssao_pass;
use crate::pipeline::tonemapping::add_tonemapping_pass;
use crate::pipeline::PassSettings;
use crate::render_graph::{
    CompiledGraph, FrameContext, FrameExecutor, FrameSummary, GraphDump, GraphResult, GraphVisitor, RenderGraph,
    ResourceDesc, ResourceId,
};
use crate::technique::capabilities::TechniqueVariant;
use crate::technique::config::{SharedSettings, TechniqueConfig};
use crate::technique::contract::OutputContract;
use crate::technique::prepass::{register_prepass, Prepass};
use crate::technique::shaders::ShaderProvider;
use crate::technique::updater::{
    Camera, CpuUpdater, GpuUpdater, SharedCamera, SharedUniforms, UniformUploader, ViewUniforms, ViewUniformsUpdater,
};

/// A compiled render technique and its per-frame state
pub struct RenderTechnique {
    variant: TechniqueVariant,
    config: TechniqueConfig,
    contract: OutputContract,
    prepass: Prepass,
    graph: CompiledGraph,
    executor: FrameExecutor,
    settings: SharedSettings,
    camera: SharedCamera,
    cpu_updaters: Vec<Box<dyn CpuUpdater>>,
    gpu_updaters: Vec<Box<dyn GpuUpdater>>,
    frame_index: u64,
}

impl RenderTechnique {
    /// Build and compile a technique for `config`.
    ///
    /// Physical resources and pipelines are created on `backend` and stay
    /// alive until [`destroy`](Self::destroy).
    pub fn new<B: GraphicsBackend>(
        config: TechniqueConfig,
        shaders: &dyn ShaderProvider,
        backend: &mut B,
    ) -> GraphResult<Self> {
        let variant = TechniqueVariant::select(&config.capabilities);
        let settings: SharedSettings = Arc::new(RwLock::new(config.settings));
        let pass_settings = PassSettings::new(config.width, config.height);
        let (width, height) = (config.width, config.height);
        let attachment = TextureUsage::RENDER_ATTACHMENT | TextureUsage::TEXTURE_BINDING;

        let mut graph = RenderGraph::new();
        let uniforms = graph.declare_resource(
            "ViewUniforms",
            ResourceDesc::buffer(ViewUniforms::SIZE, BufferUsage::UNIFORM | BufferUsage::COPY_DST),
        )?;

        let prepass = register_prepass(&mut graph, variant, &config, shaders)?;
        let outputs = prepass.outputs;

        let ssao = if config.ssao {
            let ssao = graph.declare_resource(
                "Ssao",
                ResourceDesc::image_2d(width, height, TextureFormat::R8Unorm, attachment),
            )?;
            add_ssao_pass(
                &mut graph,
                pass_settings,
                shaders,
                settings.clone(),
                outputs.depth_obj,
                uniforms,
                ssao,
            )?;
            Some(ssao)
        } else {
            None
        };

        let hdr = graph.declare_resource(
            "HdrColor",
            ResourceDesc::image_2d(width, height, TextureFormat::Rgba16Float, attachment),
        )?;
        add_opaque_pass(
            &mut graph,
            pass_settings,
            shaders,
            OpaqueInputs {
                depth: outputs.depth,
                uniforms,
                ssao,
                normal: outputs.normal,
            },
            hdr,
        )?;

        let bloom = if config.bloom_levels > 0 {
            let desc = ResourceDesc::image_2d(
                (width / 2).max(1),
                (height / 2).max(1),
                TextureFormat::Rgba16Float,
                attachment,
            );
            let levels = desc
                .as_image()
                .map_or(1, |image| config.bloom_levels.min(image.extent.max_mips()));
            let bloom = graph.declare_resource("Bloom", desc.with_mips(levels))?;
            add_bloom_chain(&mut graph, pass_settings, shaders, settings.clone(), hdr, bloom)?;
            Some(bloom)
        } else {
            None
        };

        let target = graph.declare_resource(
            "Target",
            ResourceDesc::image_2d(
                width,
                height,
                TextureFormat::Rgba8UnormSrgb,
                attachment | TextureUsage::COPY_SRC,
            ),
        )?;
        add_tonemapping_pass(&mut graph, pass_settings, shaders, hdr, bloom, uniforms, target)?;

        let contract = OutputContract::for_config(&config);
        contract.verify(graph.resources(), graph.passes())?;

        let graph = graph.compile(backend)?;
        let executor = FrameExecutor::new(&graph);
        log::debug!(
            "Built {:?} technique on {}: {}",
            variant,
            backend.name(),
            graph.order_names().join(" -> ")
        );
        if log::log_enabled!(log::Level::Trace) {
            let mut dump = GraphDump::new();
            graph.accept(&mut dump);
            log::trace!("{}", dump.as_str());
        }

        let camera: SharedCamera = Arc::new(Mutex::new(Camera::default()));
        let shared_uniforms = SharedUniforms::default();
        let cpu_updaters: Vec<Box<dyn CpuUpdater>> = vec![Box::new(ViewUniformsUpdater::new(
            camera.clone(),
            settings.clone(),
            width,
            height,
            shared_uniforms.clone(),
        ))];
        let gpu_updaters: Vec<Box<dyn GpuUpdater>> = vec![Box::new(UniformUploader::new(uniforms, shared_uniforms))];

        Ok(Self {
            variant,
            config,
            contract,
            prepass,
            graph,
            executor,
            settings,
            camera,
            cpu_updaters,
            gpu_updaters,
            frame_index: 0,
        })
    }

    pub fn variant(&self) -> TechniqueVariant {
        self.variant
    }

    pub fn config(&self) -> &TechniqueConfig {
        &self.config
    }

    /// Runtime settings; changes apply from the next frame on.
    pub fn settings(&self) -> &SharedSettings {
        &self.settings
    }

    pub fn camera(&self) -> &SharedCamera {
        &self.camera
    }

    pub fn set_camera(&self, camera: Camera) {
        *self.camera.lock() = camera;
    }

    pub fn graph(&self) -> &CompiledGraph {
        &self.graph
    }

    pub fn contract(&self) -> &OutputContract {
        &self.contract
    }

    /// Names of the prepass passes, in registration order.
    pub fn prepass_passes(&self) -> Vec<&str> {
        self.prepass
            .passes
            .iter()
            .map(|&handle| self.graph.pass(handle).name())
            .collect()
    }

    /// Names of every pass, in compiled order.
    pub fn pass_names(&self) -> Vec<&str> {
        self.graph.order_names()
    }

    /// Resource behind a contract output.
    pub fn output(&self, name: &str) -> Option<ResourceId> {
        self.contract
            .names()
            .find(|output| *output == name)
            .and_then(|output| self.graph.resources().lookup(output))
    }

    pub fn frame_index(&self) -> u64 {
        self.frame_index
    }

    pub fn add_cpu_updater(&mut self, updater: impl CpuUpdater + 'static) {
        self.cpu_updaters.push(Box::new(updater));
    }

    pub fn add_gpu_updater(&mut self, updater: impl GpuUpdater + 'static) {
        self.gpu_updaters.push(Box::new(updater));
    }

    /// Run the updaters and record one frame into `stream`.
    pub fn record_frame(&mut self, delta_time: f32, stream: &mut CommandStream) -> GraphResult<FrameSummary> {
        let frame = FrameContext::new(self.frame_index, delta_time);
        for updater in &mut self.cpu_updaters {
            updater.update(&frame);
        }
        for updater in &mut self.gpu_updaters {
            updater.record(&self.graph, &frame, stream)?;
        }
        let summary = self.executor.record(&self.graph, &frame, stream);
        self.frame_index += 1;
        Ok(summary)
    }

    /// Record one frame and submit it to `backend`.
    pub fn render_frame<B: GraphicsBackend>(&mut self, backend: &mut B, delta_time: f32) -> GraphResult<FrameSummary> {
        let mut stream = CommandStream::new();
        let summary = self.record_frame(delta_time, &mut stream)?;
        backend.submit(stream)?;
        Ok(summary)
    }

    /// Read-only traversal of the compiled graph.
    pub fn accept(&self, visitor: &mut dyn GraphVisitor) {
        self.graph.accept(visitor);
    }

    /// Release every physical resource and pipeline.
    pub fn destroy(self, backend: &mut dyn GraphicsBackend) {
        log::debug!("Destroying {:?} technique", self.variant);
        self.graph.release(backend);
    }
}

impl std::fmt::Debug for RenderTechnique {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RenderTechnique")
            .field("variant", &self.variant)
            .field("passes", &self.graph.order_names())
            .field("frame_index", &self.frame_index)
            .finish()
    }
}
