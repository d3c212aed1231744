//! Render pass and framebuffer management.

use std::sync::Arc;

use ash::vk;
use tracing::debug;

use crate::device::Device;
use crate::error::RhiError;

/// Single-subpass render pass writing one color attachment.
///
/// The attachment is cleared on load, stored on store, and transitions from
/// UNDEFINED to PRESENT_SRC_KHR across the pass. An external subpass
/// dependency orders the color write after the acquire semaphore wait at
/// the COLOR_ATTACHMENT_OUTPUT stage.
pub struct RenderPass {
    device: Arc<Device>,
    handle: vk::RenderPass,
}

impl RenderPass {
    /// Creates the render pass for swapchain images of `format`.
    ///
    /// # Errors
    ///
    /// Returns [`RhiError::PipelineCreation`] if render pass creation fails.
    pub fn new(device: Arc<Device>, format: vk::Format) -> Result<Self, RhiError> {
        let color_attachment = vk::AttachmentDescription::default()
            .format(format)
            .samples(vk::SampleCountFlags::TYPE_1)
            .load_op(vk::AttachmentLoadOp::CLEAR)
            .store_op(vk::AttachmentStoreOp::STORE)
            .stencil_load_op(vk::AttachmentLoadOp::DONT_CARE)
            .stencil_store_op(vk::AttachmentStoreOp::DONT_CARE)
            .initial_layout(vk::ImageLayout::UNDEFINED)
            .final_layout(vk::ImageLayout::PRESENT_SRC_KHR);

        let color_ref = vk::AttachmentReference::default()
            .attachment(0)
            .layout(vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL);

        let color_refs = [color_ref];
        let subpass = vk::SubpassDescription::default()
            .pipeline_bind_point(vk::PipelineBindPoint::GRAPHICS)
            .color_attachments(&color_refs);

        let dependency = vk::SubpassDependency::default()
            .src_subpass(vk::SUBPASS_EXTERNAL)
            .dst_subpass(0)
            .src_stage_mask(vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT)
            .src_access_mask(vk::AccessFlags::empty())
            .dst_stage_mask(vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT)
            .dst_access_mask(vk::AccessFlags::COLOR_ATTACHMENT_WRITE);

        let attachments = [color_attachment];
        let subpasses = [subpass];
        let dependencies = [dependency];

        let create_info = vk::RenderPassCreateInfo::default()
            .attachments(&attachments)
            .subpasses(&subpasses)
            .dependencies(&dependencies);

        let handle = unsafe {
            device
                .handle()
                .create_render_pass(&create_info, None)
                .map_err(|e| RhiError::PipelineCreation(format!("create_render_pass: {e:?}")))?
        };

        debug!("Render pass created for format {:?}", format);

        Ok(Self { device, handle })
    }

    /// Returns the raw render pass handle.
    #[inline]
    pub fn handle(&self) -> vk::RenderPass {
        self.handle
    }
}

impl Drop for RenderPass {
    fn drop(&mut self) {
        unsafe {
            self.device.handle().destroy_render_pass(self.handle, None);
        }
        debug!("Render pass destroyed");
    }
}

/// One framebuffer per swapchain image view.
///
/// Must be destroyed and rebuilt whenever the swapchain is recreated.
pub struct Framebuffers {
    device: Arc<Device>,
    handles: Vec<vk::Framebuffer>,
}

impl Framebuffers {
    /// Creates a framebuffer for each swapchain image view.
    ///
    /// # Errors
    ///
    /// Returns [`RhiError::SwapchainCreation`] if any framebuffer fails to
    /// build; partially created framebuffers are destroyed.
    pub fn new(
        device: Arc<Device>,
        render_pass: vk::RenderPass,
        image_views: &[vk::ImageView],
        extent: vk::Extent2D,
    ) -> Result<Self, RhiError> {
        let mut handles = Vec::with_capacity(image_views.len());

        for view in image_views {
            let attachments = [*view];
            let create_info = vk::FramebufferCreateInfo::default()
                .render_pass(render_pass)
                .attachments(&attachments)
                .width(extent.width)
                .height(extent.height)
                .layers(1);

            let framebuffer = unsafe {
                device
                    .handle()
                    .create_framebuffer(&create_info, None)
                    .map_err(|e| {
                        for created in &handles {
                            device.handle().destroy_framebuffer(*created, None);
                        }
                        RhiError::SwapchainCreation(format!("create_framebuffer: {e:?}"))
                    })?
            };
            handles.push(framebuffer);
        }

        debug!("{} framebuffers created", handles.len());

        Ok(Self { device, handles })
    }

    /// Returns the framebuffer for the given swapchain image index.
    #[inline]
    pub fn get(&self, image_index: u32) -> vk::Framebuffer {
        self.handles[image_index as usize]
    }
}

impl Drop for Framebuffers {
    fn drop(&mut self) {
        unsafe {
            for framebuffer in &self.handles {
                self.device.handle().destroy_framebuffer(*framebuffer, None);
            }
        }
        debug!("Framebuffers destroyed");
    }
}
