// SPDX-License-Identifier: CEPL-1.0
use ash::vk;

use crate::error::{VkError, VkResult};

/// Resettable pool with one primary command buffer per swapchain image.
pub struct CommandResources {
    device: ash::Device,
    pub pool: vk::CommandPool,
    pub buffers: Vec<vk::CommandBuffer>,
}

impl CommandResources {
    pub fn new(device: &ash::Device, queue_family: u32, count: usize) -> VkResult<Self> {
        let pool_info = vk::CommandPoolCreateInfo {
            s_type: vk::StructureType::COMMAND_POOL_CREATE_INFO,
            queue_family_index: queue_family,
            flags: vk::CommandPoolCreateFlags::RESET_COMMAND_BUFFER,
            ..Default::default()
        };
        let pool = unsafe { device.create_command_pool(&pool_info, None) }
            .map_err(VkError::device("create_command_pool"))?;
        let mut this = Self {
            device: device.clone(),
            pool,
            buffers: Vec::new(),
        };
        this.reallocate(count)?;
        Ok(this)
    }

    /// Frees the current buffers and allocates `count` new ones.
    pub fn reallocate(&mut self, count: usize) -> VkResult<()> {
        unsafe {
            if !self.buffers.is_empty() {
                self.device.free_command_buffers(self.pool, &self.buffers);
                self.buffers.clear();
            }
            let alloc_info = vk::CommandBufferAllocateInfo {
                s_type: vk::StructureType::COMMAND_BUFFER_ALLOCATE_INFO,
                command_pool: self.pool,
                level: vk::CommandBufferLevel::PRIMARY,
                command_buffer_count: count as u32,
                ..Default::default()
            };
            self.buffers = self
                .device
                .allocate_command_buffers(&alloc_info)
                .map_err(VkError::device("allocate_command_buffers"))?;
        }
        Ok(())
    }

    /// Records `record` into a temporary buffer, submits it and waits for the
    /// queue to drain.
    pub fn one_shot(
        &self,
        queue: vk::Queue,
        record: impl FnOnce(&ash::Device, vk::CommandBuffer),
    ) -> VkResult<()> {
        let d = &self.device;
        unsafe {
            let ai = vk::CommandBufferAllocateInfo {
                s_type: vk::StructureType::COMMAND_BUFFER_ALLOCATE_INFO,
                command_pool: self.pool,
                level: vk::CommandBufferLevel::PRIMARY,
                command_buffer_count: 1,
                ..Default::default()
            };
            let cmd = d.allocate_command_buffers(&ai)?[0];
            let result = (|| -> VkResult<()> {
                let bi = vk::CommandBufferBeginInfo {
                    s_type: vk::StructureType::COMMAND_BUFFER_BEGIN_INFO,
                    flags: vk::CommandBufferUsageFlags::ONE_TIME_SUBMIT,
                    ..Default::default()
                };
                d.begin_command_buffer(cmd, &bi)?;
                record(d, cmd);
                d.end_command_buffer(cmd)?;
                let si = vk::SubmitInfo {
                    s_type: vk::StructureType::SUBMIT_INFO,
                    command_buffer_count: 1,
                    p_command_buffers: &cmd,
                    ..Default::default()
                };
                d.queue_submit(queue, std::slice::from_ref(&si), vk::Fence::null())?;
                d.queue_wait_idle(queue)?;
                Ok(())
            })();
            d.free_command_buffers(self.pool, std::slice::from_ref(&cmd));
            result
        }
    }
}

impl Drop for CommandResources {
    fn drop(&mut self) {
        unsafe {
            if !self.buffers.is_empty() {
                self.device.free_command_buffers(self.pool, &self.buffers);
            }
            self.device.destroy_command_pool(self.pool, None);
        }
    }
}
