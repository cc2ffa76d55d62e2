// SPDX-License-Identifier: CEPL-1.0
#![deny(unsafe_op_in_unsafe_fn)]
//! Vulkan backend for the rayframe frame protocol.
//!
//! Construction order is instance, surface, device, swapchain, frame slots,
//! command buffers, scene buffers, pipeline, framebuffers. Teardown runs in
//! reverse and always waits for the device to go idle first.

mod command;
mod device;
mod error;
mod gpu;
mod overlay;
mod pipeline;
mod renderer;
mod scene;
mod surface;
mod swapchain;
mod sync;

pub use ash;

pub use device::{DeviceContext, QueueFamilies, VkInstance};
pub use error::{VkError, VkResult};
pub use gpu::VkBackend;
pub use overlay::{FrameTimeBar, Overlay, OverlayTarget};
pub use pipeline::{RenderPipelineState, ShaderCode};
pub use renderer::VkRenderer;
pub use scene::{QuadVertex, SceneResources};
pub use surface::{PresentSurface, SurfaceSupport};
pub use swapchain::{PresentPolicy, SwapchainManager, SwapchainState};
pub use sync::{FrameSlot, FrameSlots};
