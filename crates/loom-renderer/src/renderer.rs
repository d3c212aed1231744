//! Per-window renderer drawing a triangle into the swapchain.

use std::mem::ManuallyDrop;
use std::sync::Arc;

use loom_platform::{Surface, Window, required_surface_extensions};
use loom_rhi::device::Device;
use loom_rhi::instance::Instance;
use loom_rhi::physical_device::select_physical_device;
use loom_rhi::pipeline::{Pipeline, PipelineLayout};
use loom_rhi::render_pass::{Framebuffers, RenderPass};
use loom_rhi::shader::{Shader, ShaderStage, validate_spirv};
use loom_rhi::swapchain::Swapchain;
use loom_rhi::sync::FrameSync;
use loom_rhi::{RhiError, RhiResult, vk};
use tracing::{debug, info, warn};
use winit::window::Window as WinitWindow;

use crate::frame::FrameExecutor;

/// Clear color for the sole color attachment.
const CLEAR_COLOR: [f32; 4] = [0.0, 0.0, 0.0, 1.0];

/// A complete rendering context for one window.
///
/// Owns the full Vulkan object graph from instance to frame slots. Fields
/// are wrapped in `ManuallyDrop` so teardown can run in strict reverse
/// creation order; the `Arc<Device>` is released only after every resource
/// holding a clone of it has been dropped, which keeps device destruction
/// ahead of surface and instance destruction.
pub struct Renderer {
    window: Arc<WinitWindow>,
    instance: ManuallyDrop<Instance>,
    surface: ManuallyDrop<Surface>,
    device: ManuallyDrop<Arc<Device>>,
    swapchain: ManuallyDrop<Swapchain>,
    render_pass: ManuallyDrop<RenderPass>,
    pipeline_layout: ManuallyDrop<PipelineLayout>,
    pipeline: ManuallyDrop<Pipeline>,
    framebuffers: ManuallyDrop<Framebuffers>,
    frames: ManuallyDrop<FrameExecutor>,
    /// Set when the swapchain must be rebuilt before the next acquire
    needs_recreate: bool,
    /// Latches the first fatal error; the draw loop then stops
    fuse: Fuse,
    /// False while the framebuffers are torn down mid-rebuild
    framebuffers_valid: bool,
}

/// One-shot breaker for fatal frame errors.
///
/// Swapchain staleness is handled inline and never reaches the breaker;
/// any error that does means the renderer must stop producing frames, so
/// the breaker stays blown for the rest of the renderer's life.
#[derive(Debug, Default)]
struct Fuse {
    blown: bool,
}

impl Fuse {
    #[inline]
    fn is_blown(&self) -> bool {
        self.blown
    }

    /// Passes `result` through, latching on any error.
    fn check<T>(&mut self, result: RhiResult<T>) -> RhiResult<T> {
        if result.is_err() {
            self.blown = true;
        }
        result
    }
}

impl Renderer {
    /// Builds the full rendering stack for `window` from SPIR-V bytecode.
    ///
    /// The shader bytes are validated before any Vulkan object is created,
    /// so a bad shader fails fast without touching the GPU. The shader
    /// modules themselves live only for the duration of pipeline creation.
    ///
    /// # Errors
    ///
    /// Returns an error if any stage of initialization fails; everything
    /// created up to that point is cleaned up by the wrappers' `Drop` impls.
    pub fn new(window: &Window, vert_spirv: &[u8], frag_spirv: &[u8]) -> RhiResult<Self> {
        validate_spirv(vert_spirv)?;
        validate_spirv(frag_spirv)?;

        let extensions = required_surface_extensions();
        let instance = Instance::new(cfg!(debug_assertions), &extensions)?;

        let surface = window
            .create_surface(instance.entry(), instance.handle())
            .map_err(|e| RhiError::Surface(e.to_string()))?;

        let device_info =
            select_physical_device(instance.handle(), surface.loader(), surface.handle())?;
        let device = Device::new(instance.handle(), &device_info)?;

        let swapchain = Swapchain::new(
            instance.handle(),
            device.clone(),
            surface.loader(),
            surface.handle(),
            vk::Extent2D {
                width: window.width(),
                height: window.height(),
            },
        )?;

        let render_pass = RenderPass::new(device.clone(), swapchain.format())?;
        let pipeline_layout = PipelineLayout::new(device.clone())?;

        // Shader modules are scoped to pipeline creation and destroyed on
        // both the success and failure paths when this block exits
        let pipeline = {
            let vert = Shader::from_spirv_bytes(device.clone(), ShaderStage::Vertex, vert_spirv)?;
            let frag =
                Shader::from_spirv_bytes(device.clone(), ShaderStage::Fragment, frag_spirv)?;
            Pipeline::graphics(
                device.clone(),
                &vert,
                &frag,
                &pipeline_layout,
                render_pass.handle(),
            )?
        };

        let framebuffers = Framebuffers::new(
            device.clone(),
            render_pass.handle(),
            swapchain.image_views(),
            swapchain.extent(),
        )?;

        let frames = FrameExecutor::new(device.clone())?;

        info!("Renderer initialized");

        Ok(Self {
            window: window.inner_arc(),
            instance: ManuallyDrop::new(instance),
            surface: ManuallyDrop::new(surface),
            device: ManuallyDrop::new(device),
            swapchain: ManuallyDrop::new(swapchain),
            render_pass: ManuallyDrop::new(render_pass),
            pipeline_layout: ManuallyDrop::new(pipeline_layout),
            pipeline: ManuallyDrop::new(pipeline),
            framebuffers: ManuallyDrop::new(framebuffers),
            frames: ManuallyDrop::new(frames),
            needs_recreate: false,
            fuse: Fuse::default(),
            framebuffers_valid: true,
        })
    }

    /// Flags the swapchain for recreation before the next frame.
    pub fn mark_resized(&mut self) {
        self.needs_recreate = true;
    }

    /// Rebuilds the swapchain and framebuffers for the current window size.
    ///
    /// Waits for the device to go idle, drops the framebuffers, recreates
    /// the swapchain with the old one chained in, then rebuilds the
    /// framebuffers. A zero-sized window defers the rebuild to the next
    /// frame instead of failing.
    ///
    /// # Errors
    ///
    /// Returns an error if swapchain or framebuffer creation fails; the
    /// renderer then refuses further frames.
    pub fn recreate_swapchain(&mut self) -> RhiResult<()> {
        let size = self.window.inner_size();
        if size.width == 0 || size.height == 0 {
            debug!("Deferring swapchain recreation for zero-sized window");
            self.needs_recreate = true;
            return Ok(());
        }

        self.device.wait_idle();

        // Framebuffers reference the old image views and must go first
        if self.framebuffers_valid {
            unsafe {
                ManuallyDrop::drop(&mut self.framebuffers);
            }
            self.framebuffers_valid = false;
        }

        let recreated = self.swapchain.recreate(
            self.surface.loader(),
            self.surface.handle(),
            vk::Extent2D {
                width: size.width,
                height: size.height,
            },
        );
        self.fuse.check(recreated)?;

        let framebuffers = self.fuse.check(Framebuffers::new(
            (*self.device).clone(),
            self.render_pass.handle(),
            self.swapchain.image_views(),
            self.swapchain.extent(),
        ))?;

        self.framebuffers = ManuallyDrop::new(framebuffers);
        self.framebuffers_valid = true;
        self.needs_recreate = false;

        Ok(())
    }

    /// Renders and presents one frame.
    ///
    /// Waits on the current slot's fence, acquires a swapchain image,
    /// re-records the slot's command buffer, submits it, presents, and
    /// advances the frame cursor. An out-of-date swapchain triggers a
    /// silent recreate and the frame is skipped; a zero-sized window skips
    /// the frame entirely.
    ///
    /// # Errors
    ///
    /// Returns an error if recording, submission, or presentation fail for
    /// reasons other than swapchain staleness. Any such error is fatal:
    /// the renderer stops drawing and every later call is a silent no-op.
    pub fn draw_frame(&mut self) -> RhiResult<()> {
        if self.fuse.is_blown() {
            warn!("Renderer stopped after a fatal error, skipping frame");
            return Ok(());
        }

        let result = self.try_draw_frame();
        self.fuse.check(result)
    }

    fn try_draw_frame(&mut self) -> RhiResult<()> {
        let size = self.window.inner_size();
        if size.width == 0 || size.height == 0 {
            return Ok(());
        }

        if self.needs_recreate {
            self.recreate_swapchain()?;
            if self.needs_recreate {
                return Ok(());
            }
        }

        let sync = &self.frames.current().sync;
        sync.in_flight.wait()?;

        // Acquire before resetting the fence, so an out-of-date bailout
        // leaves the fence signaled for the retry
        let image_index = match self
            .swapchain
            .acquire_next_image(sync.image_available.handle())?
        {
            Some(index) => index,
            None => {
                debug!("Swapchain out of date on acquire");
                return self.recreate_swapchain();
            }
        };

        sync.in_flight.reset()?;

        let command_buffer = self.frames.current().command_buffer;
        self.record_commands(command_buffer, image_index)?;

        self.submit(command_buffer)?;

        let needs_recreate = self
            .swapchain
            .present(self.frames.current().sync.render_finished.handle(), image_index)?;

        self.frames.advance();

        if needs_recreate {
            debug!("Swapchain stale after present");
            self.recreate_swapchain()?;
        }

        Ok(())
    }

    /// Records the draw commands for one frame into `command_buffer`.
    fn record_commands(
        &self,
        command_buffer: vk::CommandBuffer,
        image_index: u32,
    ) -> RhiResult<()> {
        let device = self.device.handle();
        let extent = self.swapchain.extent();

        unsafe {
            device.reset_command_buffer(command_buffer, vk::CommandBufferResetFlags::empty())?;

            let begin_info = vk::CommandBufferBeginInfo::default();
            device.begin_command_buffer(command_buffer, &begin_info)?;

            let clear_values = [vk::ClearValue {
                color: vk::ClearColorValue {
                    float32: CLEAR_COLOR,
                },
            }];

            let render_pass_begin = vk::RenderPassBeginInfo::default()
                .render_pass(self.render_pass.handle())
                .framebuffer(self.framebuffers.get(image_index))
                .render_area(vk::Rect2D {
                    offset: vk::Offset2D { x: 0, y: 0 },
                    extent,
                })
                .clear_values(&clear_values);

            device.cmd_begin_render_pass(
                command_buffer,
                &render_pass_begin,
                vk::SubpassContents::INLINE,
            );

            device.cmd_bind_pipeline(
                command_buffer,
                vk::PipelineBindPoint::GRAPHICS,
                self.pipeline.handle(),
            );

            let viewport = vk::Viewport {
                x: 0.0,
                y: 0.0,
                width: extent.width as f32,
                height: extent.height as f32,
                min_depth: 0.0,
                max_depth: 1.0,
            };
            device.cmd_set_viewport(command_buffer, 0, &[viewport]);

            let scissor = vk::Rect2D {
                offset: vk::Offset2D { x: 0, y: 0 },
                extent,
            };
            device.cmd_set_scissor(command_buffer, 0, &[scissor]);

            device.cmd_draw(command_buffer, 3, 1, 0, 0);

            device.cmd_end_render_pass(command_buffer);
            device.end_command_buffer(command_buffer)?;
        }

        Ok(())
    }

    /// Submits the recorded frame to the graphics queue.
    fn submit(&self, command_buffer: vk::CommandBuffer) -> RhiResult<()> {
        let sync: &FrameSync = &self.frames.current().sync;

        let wait_semaphores = [sync.image_available.handle()];
        let wait_stages = [vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT];
        let command_buffers = [command_buffer];
        let signal_semaphores = [sync.render_finished.handle()];

        let submit_info = vk::SubmitInfo::default()
            .wait_semaphores(&wait_semaphores)
            .wait_dst_stage_mask(&wait_stages)
            .command_buffers(&command_buffers)
            .signal_semaphores(&signal_semaphores);

        self.device
            .submit_graphics(&[submit_info], sync.in_flight.handle())
    }
}

impl Drop for Renderer {
    fn drop(&mut self) {
        self.device.wait_idle();

        // Reverse creation order; the device Arc goes after everything that
        // clones it, and the surface and instance go last
        unsafe {
            ManuallyDrop::drop(&mut self.frames);
            if self.framebuffers_valid {
                ManuallyDrop::drop(&mut self.framebuffers);
            }
            ManuallyDrop::drop(&mut self.pipeline);
            ManuallyDrop::drop(&mut self.pipeline_layout);
            ManuallyDrop::drop(&mut self.render_pass);
            ManuallyDrop::drop(&mut self.swapchain);
            ManuallyDrop::drop(&mut self.device);
            ManuallyDrop::drop(&mut self.surface);
            ManuallyDrop::drop(&mut self.instance);
        }

        info!("Renderer destroyed");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fuse_latches_on_first_fatal_error() {
        let mut fuse = Fuse::default();
        assert!(!fuse.is_blown());

        // Healthy frames pass through without tripping it
        let ok: RhiResult<()> = Ok(());
        assert!(fuse.check(ok).is_ok());
        assert!(!fuse.is_blown());

        // A fatal submit failure blows the fuse and is still propagated
        let err: RhiResult<()> = Err(RhiError::Submit(vk::Result::ERROR_DEVICE_LOST));
        assert!(fuse.check(err).is_err());
        assert!(fuse.is_blown());

        // Later successes never reset it; the draw loop stays stopped
        let ok: RhiResult<()> = Ok(());
        assert!(fuse.check(ok).is_ok());
        assert!(fuse.is_blown());
    }
}
