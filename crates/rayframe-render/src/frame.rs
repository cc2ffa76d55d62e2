// SPDX-License-Identifier: CEPL-1.0
//! One frame at a time:
//!
//! ```text
//! Idle -> Acquiring -> ImageReady -> Recording -> Submitted -> Presenting -> Idle
//!            |                                                    |
//!            +------------------> NeedsRecreate <-----------------+
//! ```
//!
//! A stale surface never surfaces as an error; it is a transition into
//! `NeedsRecreate`, which is the only place the swapchain is rebuilt.
use std::fmt;

use anyhow::{Context, Result};
use rayframe_core::FrameClock;
use tracing::{debug, warn};

use crate::resize::{Rebuild, ResizeCoordinator};
use crate::sync::FrameSynchronizer;
use crate::{FrameContext, FrameStatus, HostWindow, RenderSize, ResizeEvent, SceneHooks};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FrameState {
    Idle,
    Acquiring,
    ImageReady,
    Recording,
    Submitted,
    Presenting,
    NeedsRecreate,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AcquireOutcome {
    /// An image was handed out; its acquire semaphore will be signalled.
    Ready { image_index: u32, suboptimal: bool },
    /// The surface is out of date. No image was consumed.
    Stale,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PresentOutcome {
    Presented,
    /// Presented (or dropped) but the swapchain no longer matches the surface.
    Stale,
}

/// Device operations the frame protocol drives. Slot `i` owns one fence and
/// one acquire/render-complete semaphore pair; image `j` owns one command
/// buffer, framebuffer and uniform region.
pub trait FrameGpu: Rebuild {
    type Fence: Copy + Eq + fmt::Debug;

    /// Fences of the frame slots, in ring order.
    fn slot_fences(&self) -> Vec<Self::Fence>;
    fn image_count(&self) -> usize;
    fn extent(&self) -> RenderSize;

    /// Unbounded wait.
    fn wait_fence(&mut self, fence: Self::Fence) -> Result<()>;
    fn reset_fence(&mut self, fence: Self::Fence) -> Result<()>;

    fn acquire_image(&mut self, slot: usize) -> Result<AcquireOutcome>;
    fn write_uniforms(&mut self, image_index: u32, bytes: &[u8]) -> Result<()>;
    /// Records the frame into the command buffer of `frame.image_index`.
    fn record(&mut self, frame: FrameContext) -> Result<()>;
    /// Waits on the slot's acquire semaphore, signals its render-complete
    /// semaphore and its fence.
    fn submit(&mut self, slot: usize, image_index: u32) -> Result<()>;
    fn present(&mut self, slot: usize, image_index: u32) -> Result<PresentOutcome>;
}

pub struct FrameExecutor<G: FrameGpu> {
    gpu: G,
    sync: FrameSynchronizer<G::Fence>,
    resize: ResizeCoordinator,
    clock: FrameClock,
    state: FrameState,
    resize_pending: bool,
}

impl<G: FrameGpu> FrameExecutor<G> {
    /// `window_size` is the drawable size the initial swapchain was built for.
    pub fn new(gpu: G, window_size: RenderSize) -> Self {
        let sync = FrameSynchronizer::new(gpu.slot_fences(), gpu.image_count());
        let resize = ResizeCoordinator::new(window_size);
        Self {
            gpu,
            sync,
            resize,
            clock: FrameClock::new(),
            state: FrameState::Idle,
            resize_pending: false,
        }
    }

    pub fn gpu(&self) -> &G {
        &self.gpu
    }

    /// Mutable access between frames only.
    pub fn gpu_mut(&mut self) -> &mut G {
        &mut self.gpu
    }

    pub fn state(&self) -> FrameState {
        self.state
    }

    pub fn synchronizer(&self) -> &FrameSynchronizer<G::Fence> {
        &self.sync
    }

    pub fn resize_coordinator(&self) -> &ResizeCoordinator {
        &self.resize
    }

    pub fn clock(&self) -> &FrameClock {
        &self.clock
    }

    /// Pushed resize notification. Consumed at the end of the next frame.
    pub fn notify_resize(&mut self, event: ResizeEvent) {
        debug!("resize notified ({}x{})", event.width, event.height);
        self.resize_pending = true;
    }

    /// Forces recreation after the next present (e.g. present mode change).
    pub fn request_recreate(&mut self) {
        self.resize_pending = true;
    }

    pub fn run_frame(
        &mut self,
        window: &dyn HostWindow,
        scene: &mut dyn SceneHooks,
    ) -> Result<FrameStatus> {
        if window.framebuffer_size().is_zero() {
            self.resize_pending = true;
            return Ok(FrameStatus::Skipped);
        }
        if self.resize.size_changed(window) {
            self.resize_pending = true;
        }

        let delta_secs = self.clock.begin_frame();

        // Acquiring: the slot fence is the back-pressure point.
        self.state = FrameState::Acquiring;
        let slot = self.sync.acquire_slot();
        self.gpu
            .wait_fence(slot.fence)
            .context("wait for frame slot")?;

        let (image_index, suboptimal) = match self.gpu.acquire_image(slot.index)? {
            AcquireOutcome::Ready {
                image_index,
                suboptimal,
            } => (image_index, suboptimal),
            AcquireOutcome::Stale => {
                warn!("surface out of date at acquire, recreating");
                self.recover(window)?;
                return Ok(FrameStatus::Recreated);
            }
        };

        // ImageReady: the image may still be in use by the other slot.
        self.state = FrameState::ImageReady;
        if let Some(previous) = self.sync.claim_image(image_index) {
            self.gpu
                .wait_fence(previous)
                .context("wait for previous use of swapchain image")?;
        }

        let ctx = FrameContext {
            image_index,
            delta_secs,
            extent: self.gpu.extent(),
        };
        self.gpu.write_uniforms(image_index, scene.uniforms(ctx))?;

        self.state = FrameState::Recording;
        self.gpu.record(ctx)?;

        self.state = FrameState::Submitted;
        self.gpu.reset_fence(slot.fence)?;
        self.gpu.submit(slot.index, image_index)?;

        self.state = FrameState::Presenting;
        let presented = self.gpu.present(slot.index, image_index)?;
        self.sync.advance();

        if presented == PresentOutcome::Stale || suboptimal || self.resize_pending {
            debug!(
                "recreate after present (stale={}, suboptimal={}, pending={})",
                presented == PresentOutcome::Stale,
                suboptimal,
                self.resize_pending
            );
            self.recover(window)?;
            return Ok(FrameStatus::Recreated);
        }

        self.state = FrameState::Idle;
        Ok(FrameStatus::Presented)
    }

    fn recover(&mut self, window: &dyn HostWindow) -> Result<()> {
        self.state = FrameState::NeedsRecreate;
        let images = self.resize.recreate(&mut self.gpu, window)?;
        self.sync.reset_images(images);
        self.resize_pending = false;
        self.state = FrameState::Idle;
        Ok(())
    }
}
