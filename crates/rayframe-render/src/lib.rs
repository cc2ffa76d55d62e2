// SPDX-License-Identifier: CEPL-1.0
//! Backend-agnostic frame protocol.
//!
//! The per-frame state machine ([`FrameExecutor`]), the frames-in-flight ring
//! ([`FrameSynchronizer`]) and swapchain recovery ([`ResizeCoordinator`]) are
//! written against the [`FrameGpu`] trait so the protocol can be driven by a
//! real device or by a test double.
use anyhow::Result;
use raw_window_handle::{HasDisplayHandle, HasWindowHandle};

mod frame;
mod resize;
mod sync;

pub use frame::{AcquireOutcome, FrameExecutor, FrameGpu, FrameState, PresentOutcome};
pub use resize::{Rebuild, ResizeCoordinator};
pub use sync::{FrameSynchronizer, SlotRef, FRAMES_IN_FLIGHT};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub struct RenderSize {
    pub width: u32,
    pub height: u32,
}

impl RenderSize {
    pub const fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    /// A minimized window reports a zero dimension.
    pub fn is_zero(&self) -> bool {
        self.width == 0 || self.height == 0
    }
}

/// Resize notification from the host window. Only a hint that recreation is
/// needed: the extent used for the new swapchain is always re-queried.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ResizeEvent {
    pub width: u32,
    pub height: u32,
}

impl From<ResizeEvent> for RenderSize {
    fn from(e: ResizeEvent) -> Self {
        RenderSize::new(e.width, e.height)
    }
}

/// What the frame loop needs from the windowing side.
pub trait HostWindow {
    /// Current drawable size in pixels.
    fn framebuffer_size(&self) -> RenderSize;

    /// Idle wait used while the window is minimized.
    fn wait_events(&self);
}

/// Passed to the scene collaborator once per frame, after the image is
/// acquired and known to be free, before command recording.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct FrameContext {
    pub image_index: u32,
    pub delta_secs: f32,
    pub extent: RenderSize,
}

pub trait SceneHooks {
    /// Fixed-layout uniform bytes for this frame. Must not exceed the
    /// uniform capacity the renderer was created with.
    fn uniforms(&mut self, frame: FrameContext) -> &[u8];
}

/// Read-only storage array handed to the GPU verbatim.
#[derive(Clone, Copy, Debug)]
pub struct StorageBlob<'a> {
    pub bytes: &'a [u8],
    /// Size of one element; an empty blob is backed by one zeroed element.
    pub element_size: usize,
}

#[derive(Clone, Copy, Debug)]
pub struct RenderInit<'a> {
    pub size: RenderSize,
    pub vertex_spv: &'a [u8],
    pub fragment_spv: &'a [u8],
    pub uniform_capacity: usize,
    pub triangles: StorageBlob<'a>,
    pub spheres: StorageBlob<'a>,
    pub vsync: bool,
    pub prefer_mailbox: bool,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FrameStatus {
    /// The frame was submitted and presented.
    Presented,
    /// The surface went stale; the swapchain has been rebuilt.
    Recreated,
    /// Nothing was drawn (zero-sized window).
    Skipped,
}

pub trait Renderer {
    fn new(
        window: &dyn HasWindowHandle,
        display: &dyn HasDisplayHandle,
        init: RenderInit<'_>,
    ) -> Result<Self>
    where
        Self: Sized;

    fn resize(&mut self, event: ResizeEvent);
    fn render(
        &mut self,
        window: &dyn HostWindow,
        scene: &mut dyn SceneHooks,
    ) -> Result<FrameStatus>;
    fn set_clear_color(&mut self, rgba: [f32; 4]);
    fn set_vsync(&mut self, _on: bool) {}
}
