use ash::vk;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum RhiError {
    #[error("Vulkan error: {0}")]
    VulkanError(#[from] vk::Result),

    /// The Vulkan loader library could not be found or opened
    #[error("Failed to load Vulkan: {0}")]
    LoadingError(#[from] ash::LoadingError),

    #[error("Allocator error: {0}")]
    AllocatorError(#[from] gpu_allocator::AllocationError),

    /// Another thread panicked while holding the allocator
    #[error("Allocator lock poisoned")]
    AllocatorPoisoned,

    #[error("No compatible memory type (type bits {type_bits:#x}, flags {flags:?})")]
    NoCompatibleMemoryType {
        type_bits: u32,
        flags: vk::MemoryPropertyFlags,
    },

    /// No device offers the queue families and shader stages the samples need
    #[error("No suitable GPU found")]
    NoSuitableGpu,

    #[error("Shader error: {0}")]
    ShaderError(String),

    #[error("Swapchain error: {0}")]
    SwapchainError(String),

    /// A handle or argument that breaks the callee's contract
    #[error("Invalid handle: {0}")]
    InvalidHandle(String),

    #[error("Pipeline error: {0}")]
    PipelineError(String),
}

pub type RhiResult<T> = std::result::Result<T, RhiError>;
