// SPDX-License-Identifier: CEPL-1.0
//! GPU side of the scene collaborator: per-image uniform buffers, the two
//! read-only storage arrays, the fullscreen quad and the descriptor sets tying
//! them together (binding 0 uniform, 1 triangles, 2 spheres).
use std::borrow::Cow;
use std::mem::{offset_of, size_of};

use ash::vk;
use bytemuck::{Pod, Zeroable};
use rayframe_render::{RenderInit, StorageBlob};
use tracing::debug;

use crate::command::CommandResources;
use crate::device::DeviceContext;
use crate::error::{VkError, VkResult};

#[repr(C)]
#[derive(Clone, Copy, Debug, PartialEq, Pod, Zeroable)]
pub struct QuadVertex {
    pub pos: [f32; 2],
    pub color: [f32; 3],
}

impl QuadVertex {
    pub fn binding_description() -> vk::VertexInputBindingDescription {
        vk::VertexInputBindingDescription {
            binding: 0,
            stride: size_of::<Self>() as u32,
            input_rate: vk::VertexInputRate::VERTEX,
        }
    }

    pub fn attribute_descriptions() -> [vk::VertexInputAttributeDescription; 2] {
        [
            vk::VertexInputAttributeDescription {
                location: 0,
                binding: 0,
                format: vk::Format::R32G32_SFLOAT,
                offset: offset_of!(QuadVertex, pos) as u32,
            },
            vk::VertexInputAttributeDescription {
                location: 1,
                binding: 0,
                format: vk::Format::R32G32B32_SFLOAT,
                offset: offset_of!(QuadVertex, color) as u32,
            },
        ]
    }
}

pub const QUAD_VERTICES: [QuadVertex; 4] = [
    QuadVertex {
        pos: [-1.0, -1.0],
        color: [1.0, 0.0, 0.0],
    },
    QuadVertex {
        pos: [1.0, -1.0],
        color: [0.0, 1.0, 0.0],
    },
    QuadVertex {
        pos: [1.0, 1.0],
        color: [0.0, 0.0, 1.0],
    },
    QuadVertex {
        pos: [-1.0, 1.0],
        color: [1.0, 1.0, 1.0],
    },
];
pub const QUAD_INDICES: [u16; 6] = [0, 1, 2, 2, 3, 0];

pub fn find_memory_type(
    props: &vk::PhysicalDeviceMemoryProperties,
    type_bits: u32,
    required: vk::MemoryPropertyFlags,
) -> Option<u32> {
    (0..props.memory_type_count).find(|&i| {
        type_bits & (1 << i) != 0 && props.memory_types[i as usize].property_flags.contains(required)
    })
}

/// Bytes to upload for a storage array. An empty array is backed by one
/// zeroed element so the binding always has a valid buffer.
pub fn storage_bytes<'a>(name: &'static str, blob: StorageBlob<'a>) -> VkResult<Cow<'a, [u8]>> {
    let malformed = || VkError::MalformedStorage {
        name,
        len: blob.bytes.len(),
        element_size: blob.element_size,
    };
    if blob.element_size == 0 || blob.bytes.len() % blob.element_size != 0 {
        return Err(malformed());
    }
    if blob.bytes.is_empty() {
        Ok(Cow::Owned(vec![0; blob.element_size]))
    } else {
        Ok(Cow::Borrowed(blob.bytes))
    }
}

pub fn check_uniform_len(len: usize, capacity: usize) -> VkResult<()> {
    if len > capacity {
        return Err(VkError::UniformOverflow { len, capacity });
    }
    Ok(())
}

/// Buffer plus its dedicated allocation. Host-visible buffers stay mapped
/// until dropped.
struct GpuBuffer {
    device: ash::Device,
    buffer: vk::Buffer,
    memory: vk::DeviceMemory,
    mapped: *mut u8,
}

impl GpuBuffer {
    fn new(
        ctx: &DeviceContext,
        size: vk::DeviceSize,
        usage: vk::BufferUsageFlags,
        props: vk::MemoryPropertyFlags,
    ) -> VkResult<Self> {
        let d = &ctx.device;
        let mut this = Self {
            device: d.clone(),
            buffer: vk::Buffer::null(),
            memory: vk::DeviceMemory::null(),
            mapped: std::ptr::null_mut(),
        };
        unsafe {
            let bci = vk::BufferCreateInfo {
                s_type: vk::StructureType::BUFFER_CREATE_INFO,
                size,
                usage,
                sharing_mode: vk::SharingMode::EXCLUSIVE,
                ..Default::default()
            };
            this.buffer = d.create_buffer(&bci, None)?;
            let req = d.get_buffer_memory_requirements(this.buffer);
            let memory_type_index = find_memory_type(&ctx.memory_properties(), req.memory_type_bits, props)
                .ok_or(VkError::NoMemoryType(props))?;
            let mai = vk::MemoryAllocateInfo {
                s_type: vk::StructureType::MEMORY_ALLOCATE_INFO,
                allocation_size: req.size,
                memory_type_index,
                ..Default::default()
            };
            this.memory = d.allocate_memory(&mai, None)?;
            d.bind_buffer_memory(this.buffer, this.memory, 0)?;
            if props.contains(vk::MemoryPropertyFlags::HOST_VISIBLE) {
                this.mapped = d
                    .map_memory(this.memory, 0, vk::WHOLE_SIZE, vk::MemoryMapFlags::empty())?
                    .cast();
            }
        }
        Ok(this)
    }

    fn host_visible(ctx: &DeviceContext, size: vk::DeviceSize, usage: vk::BufferUsageFlags) -> VkResult<Self> {
        Self::new(
            ctx,
            size,
            usage,
            vk::MemoryPropertyFlags::HOST_VISIBLE | vk::MemoryPropertyFlags::HOST_COHERENT,
        )
    }

    /// Caller guarantees `bytes` fits and the GPU is not reading this range.
    unsafe fn write(&self, bytes: &[u8]) {
        debug_assert!(!self.mapped.is_null());
        unsafe { std::ptr::copy_nonoverlapping(bytes.as_ptr(), self.mapped, bytes.len()) };
    }

    /// Device-local buffer filled through a staging copy.
    fn device_local(
        ctx: &DeviceContext,
        commands: &CommandResources,
        usage: vk::BufferUsageFlags,
        data: &[u8],
    ) -> VkResult<Self> {
        let size = data.len() as vk::DeviceSize;
        let staging = Self::host_visible(ctx, size, vk::BufferUsageFlags::TRANSFER_SRC)?;
        unsafe { staging.write(data) };
        let dst = Self::new(
            ctx,
            size,
            usage | vk::BufferUsageFlags::TRANSFER_DST,
            vk::MemoryPropertyFlags::DEVICE_LOCAL,
        )?;
        commands.one_shot(ctx.graphics_queue, |d, cmd| {
            let region = vk::BufferCopy {
                src_offset: 0,
                dst_offset: 0,
                size,
            };
            unsafe { d.cmd_copy_buffer(cmd, staging.buffer, dst.buffer, std::slice::from_ref(&region)) };
        })?;
        Ok(dst)
    }
}

impl Drop for GpuBuffer {
    fn drop(&mut self) {
        unsafe {
            self.device.destroy_buffer(self.buffer, None);
            // freeing also unmaps
            self.device.free_memory(self.memory, None);
        }
    }
}

/// Layout outlives recreation; pool and sets follow the image count.
struct Descriptors {
    device: ash::Device,
    layout: vk::DescriptorSetLayout,
    pool: vk::DescriptorPool,
    sets: Vec<vk::DescriptorSet>,
}

impl Descriptors {
    fn new(device: &ash::Device) -> VkResult<Self> {
        let bindings = [
            vk::DescriptorSetLayoutBinding {
                binding: 0,
                descriptor_type: vk::DescriptorType::UNIFORM_BUFFER,
                descriptor_count: 1,
                stage_flags: vk::ShaderStageFlags::VERTEX | vk::ShaderStageFlags::FRAGMENT,
                ..Default::default()
            },
            vk::DescriptorSetLayoutBinding {
                binding: 1,
                descriptor_type: vk::DescriptorType::STORAGE_BUFFER,
                descriptor_count: 1,
                stage_flags: vk::ShaderStageFlags::FRAGMENT,
                ..Default::default()
            },
            vk::DescriptorSetLayoutBinding {
                binding: 2,
                descriptor_type: vk::DescriptorType::STORAGE_BUFFER,
                descriptor_count: 1,
                stage_flags: vk::ShaderStageFlags::FRAGMENT,
                ..Default::default()
            },
        ];
        let ci = vk::DescriptorSetLayoutCreateInfo {
            s_type: vk::StructureType::DESCRIPTOR_SET_LAYOUT_CREATE_INFO,
            binding_count: bindings.len() as u32,
            p_bindings: bindings.as_ptr(),
            ..Default::default()
        };
        let layout = unsafe { device.create_descriptor_set_layout(&ci, None) }
            .map_err(VkError::pipeline("create_descriptor_set_layout"))?;
        Ok(Self {
            device: device.clone(),
            layout,
            pool: vk::DescriptorPool::null(),
            sets: Vec::new(),
        })
    }

    /// Drops the previous pool (and with it every set) and allocates one set
    /// per image.
    fn allocate(&mut self, image_count: usize) -> VkResult<()> {
        self.release_pool();
        let n = image_count as u32;
        let pool_sizes = [
            vk::DescriptorPoolSize {
                ty: vk::DescriptorType::UNIFORM_BUFFER,
                descriptor_count: n,
            },
            vk::DescriptorPoolSize {
                ty: vk::DescriptorType::STORAGE_BUFFER,
                descriptor_count: 2 * n,
            },
        ];
        let pool_ci = vk::DescriptorPoolCreateInfo {
            s_type: vk::StructureType::DESCRIPTOR_POOL_CREATE_INFO,
            max_sets: n,
            pool_size_count: pool_sizes.len() as u32,
            p_pool_sizes: pool_sizes.as_ptr(),
            ..Default::default()
        };
        unsafe {
            self.pool = self.device.create_descriptor_pool(&pool_ci, None)?;
            let layouts = vec![self.layout; image_count];
            let alloc = vk::DescriptorSetAllocateInfo {
                s_type: vk::StructureType::DESCRIPTOR_SET_ALLOCATE_INFO,
                descriptor_pool: self.pool,
                descriptor_set_count: n,
                p_set_layouts: layouts.as_ptr(),
                ..Default::default()
            };
            self.sets = self.device.allocate_descriptor_sets(&alloc)?;
        }
        Ok(())
    }

    fn release_pool(&mut self) {
        self.sets.clear();
        if self.pool != vk::DescriptorPool::null() {
            unsafe { self.device.destroy_descriptor_pool(self.pool, None) };
            self.pool = vk::DescriptorPool::null();
        }
    }
}

impl Drop for Descriptors {
    fn drop(&mut self) {
        self.release_pool();
        unsafe { self.device.destroy_descriptor_set_layout(self.layout, None) };
    }
}

pub struct SceneResources {
    descriptors: Descriptors,
    uniforms: Vec<GpuBuffer>,
    uniform_capacity: usize,
    triangles: GpuBuffer,
    spheres: GpuBuffer,
    quad_vertices: GpuBuffer,
    quad_indices: GpuBuffer,
}

impl SceneResources {
    pub fn new(
        ctx: &DeviceContext,
        commands: &CommandResources,
        init: &RenderInit<'_>,
        image_count: usize,
    ) -> VkResult<Self> {
        let triangles = GpuBuffer::device_local(
            ctx,
            commands,
            vk::BufferUsageFlags::STORAGE_BUFFER,
            &storage_bytes("triangles", init.triangles)?,
        )?;
        let spheres = GpuBuffer::device_local(
            ctx,
            commands,
            vk::BufferUsageFlags::STORAGE_BUFFER,
            &storage_bytes("spheres", init.spheres)?,
        )?;
        let quad_vertices = GpuBuffer::device_local(
            ctx,
            commands,
            vk::BufferUsageFlags::VERTEX_BUFFER,
            bytemuck::cast_slice(&QUAD_VERTICES),
        )?;
        let quad_indices = GpuBuffer::device_local(
            ctx,
            commands,
            vk::BufferUsageFlags::INDEX_BUFFER,
            bytemuck::cast_slice(&QUAD_INDICES),
        )?;

        let mut this = Self {
            descriptors: Descriptors::new(&ctx.device)?,
            uniforms: Vec::new(),
            uniform_capacity: init.uniform_capacity,
            triangles,
            spheres,
            quad_vertices,
            quad_indices,
        };
        this.rebuild_per_image(ctx, image_count)?;
        Ok(this)
    }

    pub fn set_layout(&self) -> vk::DescriptorSetLayout {
        self.descriptors.layout
    }

    pub fn image_count(&self) -> usize {
        self.uniforms.len()
    }

    /// Uniform buffers and descriptor sets for a new image count. Only called
    /// while the device is idle.
    pub fn rebuild_per_image(&mut self, ctx: &DeviceContext, image_count: usize) -> VkResult<()> {
        self.descriptors.release_pool();
        self.uniforms.clear();

        // zero-sized buffers are invalid
        let size = self.uniform_capacity.max(16) as vk::DeviceSize;
        for _ in 0..image_count {
            self.uniforms.push(GpuBuffer::host_visible(
                ctx,
                size,
                vk::BufferUsageFlags::UNIFORM_BUFFER,
            )?);
        }
        self.descriptors.allocate(image_count)?;

        for (set, ubo) in self.descriptors.sets.iter().zip(&self.uniforms) {
            let infos = [
                vk::DescriptorBufferInfo {
                    buffer: ubo.buffer,
                    offset: 0,
                    range: size,
                },
                vk::DescriptorBufferInfo {
                    buffer: self.triangles.buffer,
                    offset: 0,
                    range: vk::WHOLE_SIZE,
                },
                vk::DescriptorBufferInfo {
                    buffer: self.spheres.buffer,
                    offset: 0,
                    range: vk::WHOLE_SIZE,
                },
            ];
            let writes: Vec<_> = infos
                .iter()
                .enumerate()
                .map(|(binding, info)| vk::WriteDescriptorSet {
                    s_type: vk::StructureType::WRITE_DESCRIPTOR_SET,
                    dst_set: *set,
                    dst_binding: binding as u32,
                    descriptor_count: 1,
                    descriptor_type: if binding == 0 {
                        vk::DescriptorType::UNIFORM_BUFFER
                    } else {
                        vk::DescriptorType::STORAGE_BUFFER
                    },
                    p_buffer_info: info,
                    ..Default::default()
                })
                .collect();
            unsafe { ctx.device.update_descriptor_sets(&writes, &[]) };
        }
        debug!("scene descriptors for {image_count} images");
        Ok(())
    }

    /// Must only be called once the image's previous submission has retired.
    pub fn write_uniforms(&mut self, image_index: u32, bytes: &[u8]) -> VkResult<()> {
        check_uniform_len(bytes.len(), self.uniform_capacity)?;
        let ubo = &self.uniforms[image_index as usize];
        unsafe { ubo.write(bytes) };
        Ok(())
    }

    /// Binds the image's descriptor set and the quad, then draws it.
    pub unsafe fn record_draw(
        &self,
        device: &ash::Device,
        cmd: vk::CommandBuffer,
        layout: vk::PipelineLayout,
        image_index: u32,
    ) {
        let set = self.descriptors.sets[image_index as usize];
        unsafe {
            device.cmd_bind_descriptor_sets(
                cmd,
                vk::PipelineBindPoint::GRAPHICS,
                layout,
                0,
                std::slice::from_ref(&set),
                &[],
            );
            device.cmd_bind_vertex_buffers(cmd, 0, &[self.quad_vertices.buffer], &[0]);
            device.cmd_bind_index_buffer(cmd, self.quad_indices.buffer, 0, vk::IndexType::UINT16);
            device.cmd_draw_indexed(cmd, QUAD_INDICES.len() as u32, 1, 0, 0, 0);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn memory_props(flags: &[vk::MemoryPropertyFlags]) -> vk::PhysicalDeviceMemoryProperties {
        let mut props = vk::PhysicalDeviceMemoryProperties {
            memory_type_count: flags.len() as u32,
            ..Default::default()
        };
        for (slot, &f) in props.memory_types.iter_mut().zip(flags) {
            slot.property_flags = f;
        }
        props
    }

    #[test]
    fn memory_type_respects_both_mask_and_flags() {
        let host = vk::MemoryPropertyFlags::HOST_VISIBLE | vk::MemoryPropertyFlags::HOST_COHERENT;
        let props = memory_props(&[
            vk::MemoryPropertyFlags::DEVICE_LOCAL,
            host,
            vk::MemoryPropertyFlags::DEVICE_LOCAL | host,
        ]);
        assert_eq!(find_memory_type(&props, 0b111, host), Some(1));
        assert_eq!(find_memory_type(&props, 0b100, host), Some(2));
        assert_eq!(
            find_memory_type(&props, 0b010, vk::MemoryPropertyFlags::DEVICE_LOCAL),
            None
        );
    }

    #[test]
    fn empty_storage_is_backed_by_one_zeroed_element() {
        let blob = StorageBlob {
            bytes: &[],
            element_size: 80,
        };
        let bytes = storage_bytes("spheres", blob).unwrap();
        assert_eq!(bytes.len(), 80);
        assert!(bytes.iter().all(|&b| b == 0));
    }

    #[test]
    fn storage_is_passed_through_verbatim() {
        let data = [7u8; 32];
        let blob = StorageBlob {
            bytes: &data,
            element_size: 16,
        };
        assert!(matches!(storage_bytes("triangles", blob).unwrap(), Cow::Borrowed(b) if b == &data[..]));
    }

    #[test]
    fn ragged_storage_is_rejected() {
        let data = [0u8; 30];
        let blob = StorageBlob {
            bytes: &data,
            element_size: 16,
        };
        assert!(matches!(
            storage_bytes("triangles", blob),
            Err(VkError::MalformedStorage { len: 30, element_size: 16, .. })
        ));
    }

    #[test]
    fn oversized_uniform_is_a_caller_error() {
        assert!(check_uniform_len(240, 240).is_ok());
        assert!(matches!(
            check_uniform_len(241, 240),
            Err(VkError::UniformOverflow {
                len: 241,
                capacity: 240
            })
        ));
    }

    #[test]
    fn quad_layout_matches_vertex_input() {
        assert_eq!(QuadVertex::binding_description().stride, 20);
        let attrs = QuadVertex::attribute_descriptions();
        assert_eq!(attrs[1].offset, 8);
        assert_eq!(bytemuck::cast_slice::<u16, u8>(&QUAD_INDICES).len(), 12);
    }
}
