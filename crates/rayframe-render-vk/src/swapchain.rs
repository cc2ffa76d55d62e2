// SPDX-License-Identifier: CEPL-1.0
//! Present chain: selection policy and the per-image arrays derived from it.
use ash::khr::swapchain;
use ash::vk;
use rayframe_render::RenderSize;
use tracing::{debug, info};

use crate::device::{DeviceContext, QueueFamilies};
use crate::error::{VkError, VkResult};
use crate::surface::{PresentSurface, SurfaceSupport};

pub const PREFERRED_FORMAT: vk::SurfaceFormatKHR = vk::SurfaceFormatKHR {
    format: vk::Format::B8G8R8A8_SRGB,
    color_space: vk::ColorSpaceKHR::SRGB_NONLINEAR,
};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PresentPolicy {
    pub vsync: bool,
    /// Only consulted with vsync on.
    pub prefer_mailbox: bool,
}

impl Default for PresentPolicy {
    fn default() -> Self {
        Self {
            vsync: true,
            prefer_mailbox: true,
        }
    }
}

/// Exact (format, color space) match on the preferred pair, else the first
/// supported entry. `None` only for an empty list.
pub fn choose_surface_format(formats: &[vk::SurfaceFormatKHR]) -> Option<vk::SurfaceFormatKHR> {
    formats
        .iter()
        .copied()
        .find(|f| *f == PREFERRED_FORMAT)
        .or_else(|| formats.first().copied())
}

/// FIFO is the fallback in every branch since it is always supported.
pub fn choose_present_mode(
    modes: &[vk::PresentModeKHR],
    policy: PresentPolicy,
) -> vk::PresentModeKHR {
    let order: &[vk::PresentModeKHR] = match policy {
        PresentPolicy { vsync: false, .. } => {
            &[vk::PresentModeKHR::IMMEDIATE, vk::PresentModeKHR::MAILBOX]
        }
        PresentPolicy {
            prefer_mailbox: true,
            ..
        } => &[vk::PresentModeKHR::MAILBOX],
        _ => &[],
    };
    order
        .iter()
        .copied()
        .find(|m| modes.contains(m))
        .unwrap_or(vk::PresentModeKHR::FIFO)
}

/// `current_extent` verbatim unless it is the `u32::MAX` sentinel, in which
/// case the window size is clamped into the supported range.
pub fn choose_extent(caps: &vk::SurfaceCapabilitiesKHR, window: RenderSize) -> vk::Extent2D {
    if caps.current_extent.width != u32::MAX {
        return caps.current_extent;
    }
    vk::Extent2D {
        width: window
            .width
            .clamp(caps.min_image_extent.width, caps.max_image_extent.width),
        height: window
            .height
            .clamp(caps.min_image_extent.height, caps.max_image_extent.height),
    }
}

/// One more than the minimum, capped by the maximum (0 means no maximum).
pub fn choose_image_count(caps: &vk::SurfaceCapabilitiesKHR) -> u32 {
    let want = caps.min_image_count + 1;
    if caps.max_image_count > 0 {
        want.min(caps.max_image_count)
    } else {
        want
    }
}

/// Images are shared between families only when graphics and present differ.
pub fn sharing_mode(families: QueueFamilies) -> (vk::SharingMode, Vec<u32>) {
    if families.graphics == families.present {
        (vk::SharingMode::EXCLUSIVE, Vec::new())
    } else {
        (vk::SharingMode::CONCURRENT, families.unique())
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct SwapchainChoice {
    pub format: vk::SurfaceFormatKHR,
    pub present_mode: vk::PresentModeKHR,
    pub extent: vk::Extent2D,
    pub image_count: u32,
}

/// Everything the swapchain create info needs, as a pure function of the
/// queried support, the policy and the window size.
///
/// `None` when the surface reports a zero extent (mid-minimize on some
/// platforms); no swapchain may be created until it grows again.
pub fn choose(
    support: &SurfaceSupport,
    policy: PresentPolicy,
    window: RenderSize,
) -> VkResult<Option<SwapchainChoice>> {
    let format = choose_surface_format(&support.formats).ok_or(VkError::NoSurfaceFormat)?;
    let extent = choose_extent(&support.caps, window);
    if extent.width == 0 || extent.height == 0 {
        return Ok(None);
    }
    Ok(Some(SwapchainChoice {
        format,
        present_mode: choose_present_mode(&support.present_modes, policy),
        extent,
        image_count: choose_image_count(&support.caps),
    }))
}

/// Swapchain handle plus its image views and framebuffers, all in acquire
/// index order.
pub struct SwapchainState {
    device: ash::Device,
    loader: swapchain::Device,
    pub swapchain: vk::SwapchainKHR,
    pub format: vk::SurfaceFormatKHR,
    pub present_mode: vk::PresentModeKHR,
    pub extent: vk::Extent2D,
    pub images: Vec<vk::Image>,
    pub views: Vec<vk::ImageView>,
    pub framebuffers: Vec<vk::Framebuffer>,
}

impl SwapchainState {
    pub fn image_count(&self) -> usize {
        self.images.len()
    }

    pub fn size(&self) -> RenderSize {
        RenderSize::new(self.extent.width, self.extent.height)
    }

    /// One framebuffer per image view, same order.
    pub fn create_framebuffers(&mut self, render_pass: vk::RenderPass) -> VkResult<()> {
        debug_assert!(self.framebuffers.is_empty());
        for &view in &self.views {
            let ci = vk::FramebufferCreateInfo {
                s_type: vk::StructureType::FRAMEBUFFER_CREATE_INFO,
                render_pass,
                attachment_count: 1,
                p_attachments: &view,
                width: self.extent.width,
                height: self.extent.height,
                layers: 1,
                ..Default::default()
            };
            let fb = unsafe { self.device.create_framebuffer(&ci, None) }
                .map_err(VkError::swapchain("create_framebuffer"))?;
            self.framebuffers.push(fb);
        }
        Ok(())
    }

    /// Framebuffers, then views, then the swapchain. Idempotent.
    pub fn destroy(&mut self) {
        unsafe {
            for fb in self.framebuffers.drain(..) {
                self.device.destroy_framebuffer(fb, None);
            }
            for view in self.views.drain(..) {
                self.device.destroy_image_view(view, None);
            }
            if self.swapchain != vk::SwapchainKHR::null() {
                self.loader.destroy_swapchain(self.swapchain, None);
                self.swapchain = vk::SwapchainKHR::null();
            }
        }
        self.images.clear();
    }
}

impl Drop for SwapchainState {
    fn drop(&mut self) {
        self.destroy();
    }
}

pub struct SwapchainManager {
    loader: swapchain::Device,
    pub policy: PresentPolicy,
}

impl SwapchainManager {
    pub fn new(ctx: &DeviceContext, policy: PresentPolicy) -> Self {
        Self {
            loader: swapchain::Device::new(&ctx.instance, &ctx.device),
            policy,
        }
    }

    pub fn loader(&self) -> &swapchain::Device {
        &self.loader
    }

    /// Builds the swapchain and its image views. Framebuffers are added by
    /// the caller once the render pass for the chosen format exists.
    ///
    /// Returns `None` without touching the device if the surface extent is
    /// currently 0x0.
    pub fn create(
        &self,
        ctx: &DeviceContext,
        surface: &PresentSurface,
        window: RenderSize,
    ) -> VkResult<Option<SwapchainState>> {
        let support = surface
            .query_support(ctx.phys)
            .map_err(VkError::swapchain("query surface support"))?;
        let Some(choice) = choose(&support, self.policy, window)? else {
            debug!("surface extent is 0x0, swapchain not created");
            return Ok(None);
        };
        let (sharing, family_indices) = sharing_mode(ctx.families);

        let pre_transform = if support
            .caps
            .supported_transforms
            .contains(vk::SurfaceTransformFlagsKHR::IDENTITY)
        {
            vk::SurfaceTransformFlagsKHR::IDENTITY
        } else {
            support.caps.current_transform
        };

        let ci = vk::SwapchainCreateInfoKHR {
            s_type: vk::StructureType::SWAPCHAIN_CREATE_INFO_KHR,
            surface: surface.handle,
            min_image_count: choice.image_count,
            image_format: choice.format.format,
            image_color_space: choice.format.color_space,
            image_extent: choice.extent,
            image_array_layers: 1,
            image_usage: vk::ImageUsageFlags::COLOR_ATTACHMENT,
            image_sharing_mode: sharing,
            queue_family_index_count: family_indices.len() as u32,
            p_queue_family_indices: family_indices.as_ptr(),
            pre_transform,
            composite_alpha: vk::CompositeAlphaFlagsKHR::OPAQUE,
            present_mode: choice.present_mode,
            clipped: vk::TRUE,
            old_swapchain: vk::SwapchainKHR::null(),
            ..Default::default()
        };

        let mut state = SwapchainState {
            device: ctx.device.clone(),
            loader: self.loader.clone(),
            swapchain: vk::SwapchainKHR::null(),
            format: choice.format,
            present_mode: choice.present_mode,
            extent: choice.extent,
            images: Vec::new(),
            views: Vec::new(),
            framebuffers: Vec::new(),
        };

        unsafe {
            state.swapchain = self
                .loader
                .create_swapchain(&ci, None)
                .map_err(VkError::swapchain("create_swapchain"))?;
            state.images = self
                .loader
                .get_swapchain_images(state.swapchain)
                .map_err(VkError::swapchain("get_swapchain_images"))?;

            for &image in &state.images {
                let view_ci = vk::ImageViewCreateInfo {
                    s_type: vk::StructureType::IMAGE_VIEW_CREATE_INFO,
                    image,
                    view_type: vk::ImageViewType::TYPE_2D,
                    format: choice.format.format,
                    subresource_range: vk::ImageSubresourceRange {
                        aspect_mask: vk::ImageAspectFlags::COLOR,
                        base_mip_level: 0,
                        level_count: 1,
                        base_array_layer: 0,
                        layer_count: 1,
                    },
                    ..Default::default()
                };
                let view = ctx
                    .device
                    .create_image_view(&view_ci, None)
                    .map_err(VkError::swapchain("create_image_view"))?;
                state.views.push(view);
            }
        }

        info!(
            "swapchain: format {:?}/{:?}, present mode {:?}, extent {}x{}, images {} (min {}, max {}), sharing {:?}",
            choice.format.format,
            choice.format.color_space,
            choice.present_mode,
            choice.extent.width,
            choice.extent.height,
            state.images.len(),
            support.caps.min_image_count,
            support.caps.max_image_count,
            sharing,
        );
        Ok(Some(state))
    }

    pub fn destroy(&self, state: &mut SwapchainState) {
        state.destroy();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fmt(format: vk::Format) -> vk::SurfaceFormatKHR {
        vk::SurfaceFormatKHR {
            format,
            color_space: vk::ColorSpaceKHR::SRGB_NONLINEAR,
        }
    }

    fn caps(min: u32, max: u32) -> vk::SurfaceCapabilitiesKHR {
        vk::SurfaceCapabilitiesKHR {
            min_image_count: min,
            max_image_count: max,
            current_extent: vk::Extent2D {
                width: u32::MAX,
                height: u32::MAX,
            },
            min_image_extent: vk::Extent2D {
                width: 64,
                height: 32,
            },
            max_image_extent: vk::Extent2D {
                width: 4096,
                height: 2160,
            },
            ..Default::default()
        }
    }

    #[test]
    fn preferred_pair_is_selected_when_offered() {
        let formats = [fmt(vk::Format::B8G8R8A8_SRGB), fmt(vk::Format::R8G8B8A8_SRGB)];
        assert_eq!(
            choose_surface_format(&formats),
            Some(fmt(vk::Format::B8G8R8A8_SRGB))
        );
        let reversed = [fmt(vk::Format::R8G8B8A8_SRGB), fmt(vk::Format::B8G8R8A8_SRGB)];
        assert_eq!(
            choose_surface_format(&reversed),
            Some(fmt(vk::Format::B8G8R8A8_SRGB))
        );
    }

    #[test]
    fn format_falls_back_to_first_entry() {
        let wrong_space = vk::SurfaceFormatKHR {
            format: vk::Format::B8G8R8A8_SRGB,
            color_space: vk::ColorSpaceKHR::DISPLAY_P3_NONLINEAR_EXT,
        };
        let formats = [fmt(vk::Format::R16G16B16A16_SFLOAT), wrong_space];
        assert_eq!(
            choose_surface_format(&formats),
            Some(fmt(vk::Format::R16G16B16A16_SFLOAT))
        );
        assert_eq!(choose_surface_format(&[]), None);
    }

    #[test]
    fn fifo_only_surface_gets_fifo() {
        let modes = [vk::PresentModeKHR::FIFO];
        for vsync in [true, false] {
            let policy = PresentPolicy {
                vsync,
                prefer_mailbox: true,
            };
            assert_eq!(choose_present_mode(&modes, policy), vk::PresentModeKHR::FIFO);
        }
    }

    #[test]
    fn mailbox_preferred_and_other_modes_ignored_with_vsync() {
        let modes = [
            vk::PresentModeKHR::IMMEDIATE,
            vk::PresentModeKHR::FIFO_RELAXED,
            vk::PresentModeKHR::MAILBOX,
            vk::PresentModeKHR::FIFO,
        ];
        assert_eq!(
            choose_present_mode(&modes, PresentPolicy::default()),
            vk::PresentModeKHR::MAILBOX
        );
        let fifo_pref = PresentPolicy {
            vsync: true,
            prefer_mailbox: false,
        };
        assert_eq!(choose_present_mode(&modes, fifo_pref), vk::PresentModeKHR::FIFO);
        let no_mailbox = [vk::PresentModeKHR::IMMEDIATE, vk::PresentModeKHR::FIFO];
        assert_eq!(
            choose_present_mode(&no_mailbox, PresentPolicy::default()),
            vk::PresentModeKHR::FIFO
        );
    }

    #[test]
    fn vsync_off_prefers_immediate_then_mailbox() {
        let off = PresentPolicy {
            vsync: false,
            prefer_mailbox: false,
        };
        let all = [
            vk::PresentModeKHR::FIFO,
            vk::PresentModeKHR::MAILBOX,
            vk::PresentModeKHR::IMMEDIATE,
        ];
        assert_eq!(choose_present_mode(&all, off), vk::PresentModeKHR::IMMEDIATE);
        assert_eq!(
            choose_present_mode(&all[..2], off),
            vk::PresentModeKHR::MAILBOX
        );
    }

    #[test]
    fn unbounded_max_adds_one_image() {
        assert_eq!(choose_image_count(&caps(2, 0)), 3);
    }

    #[test]
    fn image_count_clamps_to_max() {
        assert_eq!(choose_image_count(&caps(2, 2)), 2);
        assert_eq!(choose_image_count(&caps(2, 8)), 3);
    }

    #[test]
    fn current_extent_is_used_verbatim() {
        let mut c = caps(2, 0);
        c.current_extent = vk::Extent2D {
            width: 800,
            height: 600,
        };
        let e = choose_extent(&c, RenderSize::new(10_000, 1));
        assert_eq!((e.width, e.height), (800, 600));
    }

    #[test]
    fn undefined_extent_clamps_out_of_range_sizes() {
        let c = caps(2, 0);
        let e = choose_extent(&c, RenderSize::new(10, 9000));
        assert_eq!((e.width, e.height), (64, 2160));
        let e = choose_extent(&c, RenderSize::new(5000, 1));
        assert_eq!((e.width, e.height), (4096, 32));
    }

    #[test]
    fn undefined_extent_keeps_in_range_sizes() {
        let c = caps(2, 0);
        for (w, h) in [(64, 32), (1280, 720), (4096, 2160)] {
            let e = choose_extent(&c, RenderSize::new(w, h));
            assert_eq!((e.width, e.height), (w, h));
        }
    }

    #[test]
    fn selection_is_a_pure_function_of_its_inputs() {
        let support = SurfaceSupport {
            caps: caps(2, 3),
            formats: vec![fmt(vk::Format::R8G8B8A8_UNORM), fmt(vk::Format::B8G8R8A8_SRGB)],
            present_modes: vec![vk::PresentModeKHR::FIFO, vk::PresentModeKHR::MAILBOX],
        };
        let policy = PresentPolicy::default();
        let size = RenderSize::new(1920, 1080);
        let first = choose(&support, policy, size).unwrap().unwrap();
        for _ in 0..5 {
            assert_eq!(choose(&support, policy, size).unwrap(), Some(first));
        }
        assert_eq!(first.format, fmt(vk::Format::B8G8R8A8_SRGB));
        assert_eq!(first.present_mode, vk::PresentModeKHR::MAILBOX);
        assert_eq!(first.image_count, 3);
    }

    #[test]
    fn zero_surface_extent_builds_nothing() {
        let mut c = caps(2, 0);
        c.current_extent = vk::Extent2D {
            width: 0,
            height: 0,
        };
        let support = SurfaceSupport {
            caps: c,
            formats: vec![PREFERRED_FORMAT],
            present_modes: vec![vk::PresentModeKHR::FIFO],
        };
        // the window still reports its pre-minimize size
        let choice = choose(&support, PresentPolicy::default(), RenderSize::new(800, 600));
        assert!(matches!(choice, Ok(None)));

        c.current_extent.width = 800;
        let support = SurfaceSupport { caps: c, ..support };
        let choice = choose(&support, PresentPolicy::default(), RenderSize::new(800, 600));
        assert!(matches!(choice, Ok(None)));
    }

    #[test]
    fn empty_format_list_is_a_creation_error() {
        let support = SurfaceSupport {
            caps: caps(2, 0),
            formats: vec![],
            present_modes: vec![vk::PresentModeKHR::FIFO],
        };
        assert!(matches!(
            choose(&support, PresentPolicy::default(), RenderSize::new(1, 1)),
            Err(VkError::NoSurfaceFormat)
        ));
    }

    #[test]
    fn distinct_families_share_images_concurrently() {
        let same = QueueFamilies {
            graphics: 0,
            present: 0,
        };
        assert_eq!(sharing_mode(same), (vk::SharingMode::EXCLUSIVE, vec![]));
        let split = QueueFamilies {
            graphics: 0,
            present: 2,
        };
        assert_eq!(sharing_mode(split), (vk::SharingMode::CONCURRENT, vec![0, 2]));
    }
}
