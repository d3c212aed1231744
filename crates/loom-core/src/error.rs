//! Application-level error types.

use thiserror::Error;

/// Main error type for application-level failures.
///
/// Errors that originate inside the Vulkan layer use `loom_rhi::RhiError`;
/// this type covers everything outside of it (windowing, asset loading, IO).
#[derive(Error, Debug)]
pub enum Error {
    /// Window creation or management errors
    #[error("Window error: {0}")]
    Window(String),

    /// Vulkan errors surfaced outside the RHI layer
    #[error("Vulkan error: {0}")]
    Vulkan(String),

    /// Shader binary loading errors
    #[error("Shader error: {0}")]
    Shader(String),

    /// IO errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Generic internal errors
    #[error("Internal error: {0}")]
    Internal(String),
}

/// Result type alias using the application [`Error`] type.
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = Error::Window("no display".to_string());
        assert_eq!(err.to_string(), "Window error: no display");

        let err = Error::Shader("empty binary".to_string());
        assert_eq!(err.to_string(), "Shader error: empty binary");
    }

    #[test]
    fn test_io_error_conversion() {
        let io = std::io::Error::new(std::io::ErrorKind::NotFound, "missing");
        let err: Error = io.into();
        assert!(matches!(err, Error::Io(_)));
    }
}
