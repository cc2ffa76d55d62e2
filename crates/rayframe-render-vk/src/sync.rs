// SPDX-License-Identifier: CEPL-1.0
use ash::vk;
use tracing::debug;

use crate::error::{VkError, VkResult};

/// Semaphore pair and fence of one frame slot.
#[derive(Clone, Copy, Debug, Default)]
pub struct FrameSlot {
    pub image_acquired: vk::Semaphore,
    pub render_complete: vk::Semaphore,
    pub in_flight: vk::Fence,
}

/// The fixed ring of frame slots. Created once, never touched by swapchain
/// recreation.
pub struct FrameSlots {
    device: ash::Device,
    slots: Vec<FrameSlot>,
}

impl FrameSlots {
    /// Semaphores start unsignalled, fences signalled so the first frame on
    /// each slot does not wait for a submission that never happened.
    pub fn new(device: &ash::Device, count: usize) -> VkResult<Self> {
        let mut this = Self {
            device: device.clone(),
            slots: Vec::with_capacity(count),
        };
        let sem_ci = vk::SemaphoreCreateInfo::default();
        let fence_ci = vk::FenceCreateInfo {
            s_type: vk::StructureType::FENCE_CREATE_INFO,
            flags: vk::FenceCreateFlags::SIGNALED,
            ..Default::default()
        };
        for _ in 0..count {
            // push first so a failure halfway is still cleaned up by Drop
            let i = this.slots.len();
            this.slots.push(FrameSlot::default());
            let slot = &mut this.slots[i];
            unsafe {
                slot.image_acquired = device
                    .create_semaphore(&sem_ci, None)
                    .map_err(VkError::device("create_semaphore"))?;
                slot.render_complete = device
                    .create_semaphore(&sem_ci, None)
                    .map_err(VkError::device("create_semaphore"))?;
                slot.in_flight = device
                    .create_fence(&fence_ci, None)
                    .map_err(VkError::device("create_fence"))?;
            }
        }
        debug!("{count} frame slots created");
        Ok(this)
    }

    pub fn get(&self, index: usize) -> &FrameSlot {
        &self.slots[index]
    }

    pub fn fences(&self) -> Vec<vk::Fence> {
        self.slots.iter().map(|s| s.in_flight).collect()
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }
}

impl Drop for FrameSlots {
    fn drop(&mut self) {
        unsafe {
            for s in &self.slots {
                self.device.destroy_fence(s.in_flight, None);
                self.device.destroy_semaphore(s.render_complete, None);
                self.device.destroy_semaphore(s.image_acquired, None);
            }
        }
    }
}
