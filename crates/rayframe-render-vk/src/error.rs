// SPDX-License-Identifier: CEPL-1.0
use ash::vk;
use thiserror::Error;

pub type VkResult<T> = std::result::Result<T, VkError>;

#[derive(Debug, Error)]
pub enum VkError {
    #[error("failed to load the Vulkan loader")]
    Loading(#[from] ash::LoadingError),

    #[error("no suitable GPU: {0}")]
    NoSuitableDevice(String),

    #[error("device initialization failed at {stage}")]
    DeviceInitialization {
        stage: &'static str,
        #[source]
        result: vk::Result,
    },

    #[error("swapchain creation failed at {stage}")]
    SwapchainCreation {
        stage: &'static str,
        #[source]
        result: vk::Result,
    },

    #[error("surface reports no formats")]
    NoSurfaceFormat,

    #[error("pipeline creation failed at {stage}")]
    PipelineCreation {
        stage: &'static str,
        #[source]
        result: vk::Result,
    },

    #[error("invalid SPIR-V for {stage} shader")]
    InvalidShader {
        stage: &'static str,
        #[source]
        source: std::io::Error,
    },

    #[error("no memory type with {0:?}")]
    NoMemoryType(vk::MemoryPropertyFlags),

    #[error("uniform data is {len} bytes, buffer holds {capacity}")]
    UniformOverflow { len: usize, capacity: usize },

    #[error("{name} storage is {len} bytes, not a multiple of element size {element_size}")]
    MalformedStorage {
        name: &'static str,
        len: usize,
        element_size: usize,
    },

    #[error(transparent)]
    Vk(#[from] vk::Result),
}

impl VkError {
    pub(crate) fn device(stage: &'static str) -> impl FnOnce(vk::Result) -> Self {
        move |result| VkError::DeviceInitialization { stage, result }
    }

    pub(crate) fn swapchain(stage: &'static str) -> impl FnOnce(vk::Result) -> Self {
        move |result| VkError::SwapchainCreation { stage, result }
    }

    pub(crate) fn pipeline(stage: &'static str) -> impl FnOnce(vk::Result) -> Self {
        move |result| VkError::PipelineCreation { stage, result }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::error::Error as _;

    #[test]
    fn creation_errors_keep_the_vulkan_result_as_source() {
        let err = VkError::swapchain("create_swapchain")(vk::Result::ERROR_OUT_OF_DEVICE_MEMORY);
        assert_eq!(err.to_string(), "swapchain creation failed at create_swapchain");
        let source = err.source().map(|s| s.to_string());
        assert_eq!(
            source,
            Some(vk::Result::ERROR_OUT_OF_DEVICE_MEMORY.to_string())
        );
    }

    #[test]
    fn overflow_message_names_both_sizes() {
        let err = VkError::UniformOverflow {
            len: 300,
            capacity: 240,
        };
        assert_eq!(err.to_string(), "uniform data is 300 bytes, buffer holds 240");
    }
}
