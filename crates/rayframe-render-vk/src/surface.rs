// SPDX-License-Identifier: CEPL-1.0
use ash::khr::surface;
use ash::vk;
use raw_window_handle::{RawDisplayHandle, RawWindowHandle};

use crate::device::VkInstance;
use crate::error::{VkError, VkResult};

/// Capabilities, formats and present modes of a surface on one device.
/// Always re-queried before a swapchain is built.
#[derive(Clone, Debug)]
pub struct SurfaceSupport {
    pub caps: vk::SurfaceCapabilitiesKHR,
    pub formats: Vec<vk::SurfaceFormatKHR>,
    pub present_modes: Vec<vk::PresentModeKHR>,
}

/// The window's drawable target.
pub struct PresentSurface {
    pub loader: surface::Instance,
    pub handle: vk::SurfaceKHR,
}

impl PresentSurface {
    pub fn new(
        instance: &VkInstance,
        display: RawDisplayHandle,
        window: RawWindowHandle,
    ) -> VkResult<Self> {
        let loader = surface::Instance::new(&instance.entry, &instance.instance);
        // SAFETY: the handles come from a live window that outlives the renderer.
        let handle = unsafe {
            ash_window::create_surface(&instance.entry, &instance.instance, display, window, None)
        }
        .map_err(VkError::device("create_surface"))?;
        Ok(Self { loader, handle })
    }

    pub fn supports_present(&self, phys: vk::PhysicalDevice, family: u32) -> bool {
        unsafe {
            self.loader
                .get_physical_device_surface_support(phys, family, self.handle)
        }
        .unwrap_or(false)
    }

    pub fn query_support(&self, phys: vk::PhysicalDevice) -> ash::prelude::VkResult<SurfaceSupport> {
        unsafe {
            let caps = self
                .loader
                .get_physical_device_surface_capabilities(phys, self.handle)?;
            let formats = self
                .loader
                .get_physical_device_surface_formats(phys, self.handle)?;
            let present_modes = self
                .loader
                .get_physical_device_surface_present_modes(phys, self.handle)?;
            Ok(SurfaceSupport {
                caps,
                formats,
                present_modes,
            })
        }
    }
}

impl Drop for PresentSurface {
    fn drop(&mut self) {
        unsafe { self.loader.destroy_surface(self.handle, None) };
    }
}
