// SPDX-License-Identifier: CEPL-1.0
use anyhow::Result;
use rayframe_render::{
    FrameExecutor, FrameStatus, HostWindow, RenderInit, Renderer, ResizeEvent, SceneHooks,
};
use raw_window_handle::{HasDisplayHandle, HasWindowHandle};
use tracing::info;

use crate::gpu::VkBackend;
use crate::overlay::Overlay;

/// Vulkan implementation of [`Renderer`]: the backend driven by the shared
/// frame executor.
pub struct VkRenderer {
    exec: FrameExecutor<VkBackend>,
}

impl VkRenderer {
    /// Drawn after the scene, inside the same render pass.
    pub fn set_overlay(&mut self, overlay: Option<Box<dyn Overlay>>) {
        self.exec.gpu_mut().set_overlay(overlay);
    }

    pub fn device_name(&self) -> &str {
        self.exec.gpu().device_name()
    }

    pub fn recreations(&self) -> u64 {
        self.exec.resize_coordinator().recreations()
    }
}

impl Renderer for VkRenderer {
    fn new(
        window: &dyn HasWindowHandle,
        display: &dyn HasDisplayHandle,
        init: RenderInit<'_>,
    ) -> Result<Self> {
        let backend = VkBackend::new(window, display, &init)?;
        Ok(Self {
            exec: FrameExecutor::new(backend, init.size),
        })
    }

    fn resize(&mut self, event: ResizeEvent) {
        self.exec.notify_resize(event);
    }

    fn render(
        &mut self,
        window: &dyn HostWindow,
        scene: &mut dyn SceneHooks,
    ) -> Result<FrameStatus> {
        self.exec.run_frame(window, scene)
    }

    fn set_clear_color(&mut self, rgba: [f32; 4]) {
        self.exec.gpu_mut().set_clear_color(rgba);
    }

    fn set_vsync(&mut self, on: bool) {
        let mut policy = self.exec.gpu().policy();
        if policy.vsync == on {
            return;
        }
        policy.vsync = on;
        self.exec.gpu_mut().set_policy(policy);
        // present mode is fixed per swapchain
        self.exec.request_recreate();
        info!(
            "vsync -> {on} (current mode {:?}, applied on next frame)",
            self.exec.gpu().present_mode()
        );
    }
}
