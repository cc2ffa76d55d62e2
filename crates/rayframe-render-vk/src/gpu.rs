// SPDX-License-Identifier: CEPL-1.0
use anyhow::{anyhow, Context, Result};
use ash::vk;
use rayframe_render::{
    AcquireOutcome, FrameContext, FrameGpu, PresentOutcome, Rebuild, RenderInit, RenderSize,
    FRAMES_IN_FLIGHT,
};
use raw_window_handle::{HasDisplayHandle, HasWindowHandle};
use tracing::info;

use crate::command::CommandResources;
use crate::device::{DeviceContext, VkInstance};
use crate::overlay::{Overlay, OverlayTarget};
use crate::pipeline::{RenderPipelineState, ShaderCode};
use crate::scene::SceneResources;
use crate::surface::PresentSurface;
use crate::swapchain::{PresentPolicy, SwapchainManager, SwapchainState};
use crate::sync::FrameSlots;

/// Every device object the frame protocol touches.
///
/// Fields drop top to bottom: overlay, swapchain-derived objects, pipeline,
/// scene buffers, frame slots, command pool, surface, device, instance.
pub struct VkBackend {
    overlay: Option<Box<dyn Overlay>>,
    swapchain: SwapchainState,
    pipeline: RenderPipelineState,
    scene: SceneResources,
    slots: FrameSlots,
    commands: CommandResources,
    manager: SwapchainManager,
    surface: PresentSurface,
    ctx: DeviceContext,
    _instance: VkInstance,

    shaders: ShaderCode,
    clear: vk::ClearValue,
}

impl VkBackend {
    pub fn new(
        window: &dyn HasWindowHandle,
        display: &dyn HasDisplayHandle,
        init: &RenderInit<'_>,
    ) -> Result<Self> {
        // STRICT ORDER: instance, surface, device. The device is chosen for
        // its ability to present to this surface.
        let dh = display
            .display_handle()
            .map_err(|e| anyhow!("{e}"))?
            .as_raw();
        let wh = window.window_handle().map_err(|e| anyhow!("{e}"))?.as_raw();

        let instance = VkInstance::create(dh).context("create Vulkan instance")?;
        let surface = PresentSurface::new(&instance, dh, wh)?;
        let ctx = DeviceContext::new(&instance, &surface)?;

        let policy = PresentPolicy {
            vsync: init.vsync,
            prefer_mailbox: init.prefer_mailbox,
        };
        let manager = SwapchainManager::new(&ctx, policy);
        let mut swapchain = manager
            .create(&ctx, &surface, init.size)
            .context("initial swapchain")?
            .ok_or_else(|| anyhow!("surface reports a 0x0 extent at startup"))?;
        let image_count = swapchain.image_count();

        let slots = FrameSlots::new(&ctx.device, FRAMES_IN_FLIGHT)?;
        let commands = CommandResources::new(&ctx.device, ctx.families.graphics, image_count)?;
        let scene = SceneResources::new(&ctx, &commands, init, image_count)
            .context("scene buffers")?;
        let shaders = ShaderCode::from_spv(init.vertex_spv, init.fragment_spv)?;
        let pipeline = RenderPipelineState::new(
            &ctx.device,
            swapchain.format.format,
            scene.set_layout(),
            &shaders,
        )?;
        swapchain.create_framebuffers(pipeline.render_pass)?;

        info!("vk backend ready on {}", ctx.name);
        Ok(Self {
            overlay: None,
            swapchain,
            pipeline,
            scene,
            slots,
            commands,
            manager,
            surface,
            ctx,
            _instance: instance,
            shaders,
            clear: clear_value([0.0, 0.0, 0.0, 1.0]),
        })
    }

    pub fn set_clear_color(&mut self, rgba: [f32; 4]) {
        self.clear = clear_value(rgba);
    }

    pub fn set_overlay(&mut self, overlay: Option<Box<dyn Overlay>>) {
        self.overlay = overlay;
    }

    pub fn policy(&self) -> PresentPolicy {
        self.manager.policy
    }

    /// Takes effect on the next recreation.
    pub fn set_policy(&mut self, policy: PresentPolicy) {
        self.manager.policy = policy;
    }

    pub fn present_mode(&self) -> vk::PresentModeKHR {
        self.swapchain.present_mode
    }

    pub fn device_name(&self) -> &str {
        &self.ctx.name
    }
}

impl Drop for VkBackend {
    fn drop(&mut self) {
        // fields are destroyed after this returns; nothing may still be queued
        let _ = self.ctx.wait_idle();
    }
}

fn clear_value(rgba: [f32; 4]) -> vk::ClearValue {
    vk::ClearValue {
        color: vk::ClearColorValue { float32: rgba },
    }
}

impl Rebuild for VkBackend {
    fn wait_idle(&mut self) -> Result<()> {
        self.ctx.wait_idle().context("device_wait_idle")
    }

    // STRICT ORDER (recreate):
    // 1) destroy framebuffers, views, swapchain
    // 2) new swapchain and views from freshly queried support
    // 3) pipeline and render pass ONLY if the format changed
    // 4) framebuffers against the (possibly new) render pass
    // 5) image-count-dependent uniforms, descriptor sets, command buffers
    fn rebuild(&mut self, size: RenderSize) -> Result<Option<usize>> {
        self.manager.destroy(&mut self.swapchain);
        let Some(swapchain) = self.manager.create(&self.ctx, &self.surface, size)? else {
            return Ok(None);
        };
        self.swapchain = swapchain;

        if self.swapchain.format.format != self.pipeline.format {
            info!(
                "surface format changed {:?} -> {:?}",
                self.pipeline.format, self.swapchain.format.format
            );
            self.pipeline = RenderPipelineState::new(
                &self.ctx.device,
                self.swapchain.format.format,
                self.scene.set_layout(),
                &self.shaders,
            )?;
        }
        self.swapchain
            .create_framebuffers(self.pipeline.render_pass)?;

        let image_count = self.swapchain.image_count();
        if image_count != self.scene.image_count() {
            self.scene.rebuild_per_image(&self.ctx, image_count)?;
            self.commands.reallocate(image_count)?;
        }
        Ok(Some(image_count))
    }
}

impl FrameGpu for VkBackend {
    type Fence = vk::Fence;

    fn slot_fences(&self) -> Vec<vk::Fence> {
        self.slots.fences()
    }

    fn image_count(&self) -> usize {
        self.swapchain.image_count()
    }

    fn extent(&self) -> RenderSize {
        self.swapchain.size()
    }

    fn wait_fence(&mut self, fence: vk::Fence) -> Result<()> {
        unsafe { self.ctx.device.wait_for_fences(&[fence], true, u64::MAX) }
            .context("wait_for_fences")
    }

    fn reset_fence(&mut self, fence: vk::Fence) -> Result<()> {
        unsafe { self.ctx.device.reset_fences(&[fence]) }.context("reset_fences")
    }

    fn acquire_image(&mut self, slot: usize) -> Result<AcquireOutcome> {
        let semaphore = self.slots.get(slot).image_acquired;
        let result = unsafe {
            self.manager.loader().acquire_next_image(
                self.swapchain.swapchain,
                u64::MAX,
                semaphore,
                vk::Fence::null(),
            )
        };
        match result {
            Ok((image_index, suboptimal)) => Ok(AcquireOutcome::Ready {
                image_index,
                suboptimal,
            }),
            Err(vk::Result::ERROR_OUT_OF_DATE_KHR) => Ok(AcquireOutcome::Stale),
            Err(e) => Err(anyhow!("acquire_next_image: {e:?}")),
        }
    }

    fn write_uniforms(&mut self, image_index: u32, bytes: &[u8]) -> Result<()> {
        self.scene.write_uniforms(image_index, bytes)?;
        Ok(())
    }

    fn record(&mut self, frame: FrameContext) -> Result<()> {
        let image_index = frame.image_index;
        let i = image_index as usize;
        let cmd = self.commands.buffers[i];
        let framebuffer = self.swapchain.framebuffers[i];
        let extent = self.swapchain.extent;
        let d = &self.ctx.device;

        unsafe {
            d.reset_command_buffer(cmd, vk::CommandBufferResetFlags::empty())?;
            let begin = vk::CommandBufferBeginInfo {
                s_type: vk::StructureType::COMMAND_BUFFER_BEGIN_INFO,
                ..Default::default()
            };
            d.begin_command_buffer(cmd, &begin)?;

            let render_area = vk::Rect2D {
                offset: vk::Offset2D { x: 0, y: 0 },
                extent,
            };
            let rp_begin = vk::RenderPassBeginInfo {
                s_type: vk::StructureType::RENDER_PASS_BEGIN_INFO,
                render_pass: self.pipeline.render_pass,
                framebuffer,
                render_area,
                clear_value_count: 1,
                p_clear_values: &self.clear,
                ..Default::default()
            };
            d.cmd_begin_render_pass(cmd, &rp_begin, vk::SubpassContents::INLINE);

            d.cmd_bind_pipeline(cmd, vk::PipelineBindPoint::GRAPHICS, self.pipeline.pipeline);
            let vp = vk::Viewport {
                x: 0.0,
                y: 0.0,
                width: extent.width as f32,
                height: extent.height as f32,
                min_depth: 0.0,
                max_depth: 1.0,
            };
            d.cmd_set_viewport(cmd, 0, std::slice::from_ref(&vp));
            d.cmd_set_scissor(cmd, 0, std::slice::from_ref(&render_area));
            self.scene
                .record_draw(d, cmd, self.pipeline.layout, image_index);

            // scene first, overlay on top, same subpass
            if let Some(overlay) = self.overlay.as_mut() {
                let target = OverlayTarget {
                    command_buffer: cmd,
                    render_pass: self.pipeline.render_pass,
                    framebuffer,
                    extent,
                    image_index,
                    delta_secs: frame.delta_secs,
                };
                overlay.record(d, &target);
            }

            d.cmd_end_render_pass(cmd);
            d.end_command_buffer(cmd)?;
        }
        Ok(())
    }

    fn submit(&mut self, slot: usize, image_index: u32) -> Result<()> {
        let slot = *self.slots.get(slot);
        let cmd = self.commands.buffers[image_index as usize];
        let wait_stages = [vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT];
        let submit = vk::SubmitInfo {
            s_type: vk::StructureType::SUBMIT_INFO,
            wait_semaphore_count: 1,
            p_wait_semaphores: &slot.image_acquired,
            p_wait_dst_stage_mask: wait_stages.as_ptr(),
            command_buffer_count: 1,
            p_command_buffers: &cmd,
            signal_semaphore_count: 1,
            p_signal_semaphores: &slot.render_complete,
            ..Default::default()
        };
        unsafe {
            self.ctx.device.queue_submit(
                self.ctx.graphics_queue,
                std::slice::from_ref(&submit),
                slot.in_flight,
            )
        }
        .context("queue_submit")
    }

    fn present(&mut self, slot: usize, image_index: u32) -> Result<PresentOutcome> {
        let render_complete = self.slots.get(slot).render_complete;
        let present = vk::PresentInfoKHR {
            s_type: vk::StructureType::PRESENT_INFO_KHR,
            wait_semaphore_count: 1,
            p_wait_semaphores: &render_complete,
            swapchain_count: 1,
            p_swapchains: &self.swapchain.swapchain,
            p_image_indices: &image_index,
            ..Default::default()
        };
        let result = unsafe {
            self.manager
                .loader()
                .queue_present(self.ctx.present_queue, &present)
        };
        match result {
            Ok(false) => Ok(PresentOutcome::Presented),
            // suboptimal
            Ok(true) | Err(vk::Result::ERROR_OUT_OF_DATE_KHR) => Ok(PresentOutcome::Stale),
            Err(e) => Err(anyhow!("queue_present: {e:?}")),
        }
    }
}
