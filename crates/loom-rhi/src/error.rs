//! RHI-specific error types.

use thiserror::Error;

/// RHI-specific error type.
///
/// Setup errors (everything from instance creation through pipeline
/// creation) are terminal for the renderer being built. Out-of-date and
/// suboptimal swapchain conditions are not errors and never appear here;
/// they are absorbed by swapchain recreation.
#[derive(Error, Debug)]
pub enum RhiError {
    /// Failed to load the Vulkan library
    #[error("Failed to load Vulkan: {0}")]
    Loading(#[from] ash::LoadingError),

    /// A device or property enumeration call itself failed
    #[error("Enumeration failed: {0}")]
    Enumeration(ash::vk::Result),

    /// No physical device satisfies the rendering requirements
    #[error("No usable GPU found")]
    NoUsableDevice,

    /// Surface creation or query error
    #[error("Surface error: {0}")]
    Surface(String),

    /// Swapchain, image view or framebuffer creation failed
    #[error("Swapchain creation failed: {0}")]
    SwapchainCreation(String),

    /// Graphics pipeline or pipeline layout creation failed
    #[error("Pipeline creation failed: {0}")]
    PipelineCreation(String),

    /// Shader binary was invalid or module creation failed
    #[error("Shader load failed: {0}")]
    ShaderLoad(String),

    /// Queue submission failed
    #[error("Queue submission failed: {0}")]
    Submit(ash::vk::Result),

    /// Any other Vulkan API error
    #[error("Vulkan error: {0}")]
    Vulkan(#[from] ash::vk::Result),
}

/// Result type alias for RHI operations.
pub type RhiResult<T> = std::result::Result<T, RhiError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        assert_eq!(RhiError::NoUsableDevice.to_string(), "No usable GPU found");
        assert_eq!(
            RhiError::ShaderLoad("empty binary".to_string()).to_string(),
            "Shader load failed: empty binary"
        );
        assert_eq!(
            RhiError::Submit(ash::vk::Result::ERROR_DEVICE_LOST).to_string(),
            "Queue submission failed: ERROR_DEVICE_LOST"
        );
    }

    #[test]
    fn test_vk_result_conversion() {
        let err: RhiError = ash::vk::Result::ERROR_OUT_OF_HOST_MEMORY.into();
        assert!(matches!(err, RhiError::Vulkan(_)));
    }
}
