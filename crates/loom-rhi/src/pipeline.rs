//! Graphics pipeline construction.

use std::sync::Arc;

use ash::vk;
use tracing::debug;

use crate::device::Device;
use crate::error::RhiError;
use crate::shader::Shader;

/// Pipeline layout with no descriptor sets or push constants.
pub struct PipelineLayout {
    device: Arc<Device>,
    handle: vk::PipelineLayout,
}

impl PipelineLayout {
    /// Creates an empty pipeline layout.
    ///
    /// # Errors
    ///
    /// Returns [`RhiError::PipelineCreation`] on failure.
    pub fn new(device: Arc<Device>) -> Result<Self, RhiError> {
        let create_info = vk::PipelineLayoutCreateInfo::default();

        let handle = unsafe {
            device
                .handle()
                .create_pipeline_layout(&create_info, None)
                .map_err(|e| RhiError::PipelineCreation(format!("create_pipeline_layout: {e:?}")))?
        };

        Ok(Self { device, handle })
    }

    /// Returns the raw layout handle.
    #[inline]
    pub fn handle(&self) -> vk::PipelineLayout {
        self.handle
    }
}

impl Drop for PipelineLayout {
    fn drop(&mut self) {
        unsafe {
            self.device.handle().destroy_pipeline_layout(self.handle, None);
        }
    }
}

/// Graphics pipeline for drawing into the swapchain render pass.
///
/// Fixed-function state is hard-wired for the triangle path: no vertex
/// input, triangle list topology, back-face culling with counter-clockwise
/// front faces, no blending, no depth testing. Viewport and scissor are
/// dynamic so resizes never force a pipeline rebuild.
pub struct Pipeline {
    device: Arc<Device>,
    handle: vk::Pipeline,
}

impl Pipeline {
    /// Builds the graphics pipeline from shader stages.
    ///
    /// The shader modules are only needed during this call; the caller may
    /// drop them immediately afterwards whether or not creation succeeds.
    ///
    /// # Errors
    ///
    /// Returns [`RhiError::PipelineCreation`] on failure.
    pub fn graphics(
        device: Arc<Device>,
        vertex: &Shader,
        fragment: &Shader,
        layout: &PipelineLayout,
        render_pass: vk::RenderPass,
    ) -> Result<Self, RhiError> {
        let stages = [vertex.stage_create_info(), fragment.stage_create_info()];

        let vertex_input = vk::PipelineVertexInputStateCreateInfo::default();

        let input_assembly = vk::PipelineInputAssemblyStateCreateInfo::default()
            .topology(vk::PrimitiveTopology::TRIANGLE_LIST)
            .primitive_restart_enable(false);

        // Actual viewport and scissor are set at record time
        let viewport_state = vk::PipelineViewportStateCreateInfo::default()
            .viewport_count(1)
            .scissor_count(1);

        let rasterization = vk::PipelineRasterizationStateCreateInfo::default()
            .depth_clamp_enable(false)
            .rasterizer_discard_enable(false)
            .polygon_mode(vk::PolygonMode::FILL)
            .line_width(1.0)
            .cull_mode(vk::CullModeFlags::BACK)
            .front_face(vk::FrontFace::COUNTER_CLOCKWISE)
            .depth_bias_enable(false);

        let multisample = vk::PipelineMultisampleStateCreateInfo::default()
            .sample_shading_enable(false)
            .rasterization_samples(vk::SampleCountFlags::TYPE_1);

        let blend_attachment = vk::PipelineColorBlendAttachmentState::default()
            .color_write_mask(vk::ColorComponentFlags::RGBA)
            .blend_enable(false);

        let blend_attachments = [blend_attachment];
        let color_blend = vk::PipelineColorBlendStateCreateInfo::default()
            .logic_op_enable(false)
            .attachments(&blend_attachments);

        let dynamic_states = [vk::DynamicState::VIEWPORT, vk::DynamicState::SCISSOR];
        let dynamic_state =
            vk::PipelineDynamicStateCreateInfo::default().dynamic_states(&dynamic_states);

        let create_info = vk::GraphicsPipelineCreateInfo::default()
            .stages(&stages)
            .vertex_input_state(&vertex_input)
            .input_assembly_state(&input_assembly)
            .viewport_state(&viewport_state)
            .rasterization_state(&rasterization)
            .multisample_state(&multisample)
            .color_blend_state(&color_blend)
            .dynamic_state(&dynamic_state)
            .layout(layout.handle())
            .render_pass(render_pass)
            .subpass(0);

        let pipelines = unsafe {
            device
                .handle()
                .create_graphics_pipelines(vk::PipelineCache::null(), &[create_info], None)
                .map_err(|(_, e)| {
                    RhiError::PipelineCreation(format!("create_graphics_pipelines: {e:?}"))
                })?
        };

        let handle = pipelines.into_iter().next().ok_or_else(|| {
            RhiError::PipelineCreation("no pipeline returned".to_string())
        })?;

        debug!("Graphics pipeline created");

        Ok(Self { device, handle })
    }

    /// Returns the raw pipeline handle.
    #[inline]
    pub fn handle(&self) -> vk::Pipeline {
        self.handle
    }
}

impl Drop for Pipeline {
    fn drop(&mut self) {
        unsafe {
            self.device.handle().destroy_pipeline(self.handle, None);
        }
        debug!("Graphics pipeline destroyed");
    }
}
