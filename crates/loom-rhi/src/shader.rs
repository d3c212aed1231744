//! Shader module loading.

use std::sync::Arc;

use ash::vk;
use tracing::debug;

use crate::device::Device;
use crate::error::RhiError;

/// Entry point name shared by all shader stages.
const SHADER_ENTRY_POINT: &std::ffi::CStr = c"main";

/// Pipeline stage a shader module is bound to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShaderStage {
    Vertex,
    Fragment,
}

impl ShaderStage {
    fn to_vk(self) -> vk::ShaderStageFlags {
        match self {
            ShaderStage::Vertex => vk::ShaderStageFlags::VERTEX,
            ShaderStage::Fragment => vk::ShaderStageFlags::FRAGMENT,
        }
    }
}

/// Validates a SPIR-V byte stream before module creation.
///
/// SPIR-V words are 32 bits, so the byte length must be a non-zero multiple
/// of four.
pub fn validate_spirv(bytes: &[u8]) -> Result<(), RhiError> {
    if bytes.is_empty() {
        return Err(RhiError::ShaderLoad("shader bytecode is empty".to_string()));
    }
    if bytes.len() % 4 != 0 {
        return Err(RhiError::ShaderLoad(format!(
            "shader bytecode length {} is not a multiple of 4",
            bytes.len()
        )));
    }
    Ok(())
}

/// A compiled shader module bound to a pipeline stage.
pub struct Shader {
    device: Arc<Device>,
    module: vk::ShaderModule,
    stage: ShaderStage,
}

impl Shader {
    /// Creates a shader module from SPIR-V bytecode.
    ///
    /// # Errors
    ///
    /// Returns [`RhiError::ShaderLoad`] when the bytecode is empty,
    /// misaligned, or rejected by the driver.
    pub fn from_spirv_bytes(
        device: Arc<Device>,
        stage: ShaderStage,
        bytes: &[u8],
    ) -> Result<Self, RhiError> {
        validate_spirv(bytes)?;

        let words: Vec<u32> = bytes
            .chunks_exact(4)
            .map(|chunk| u32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]))
            .collect();

        let create_info = vk::ShaderModuleCreateInfo::default().code(&words);

        let module = unsafe {
            device
                .handle()
                .create_shader_module(&create_info, None)
                .map_err(|e| RhiError::ShaderLoad(format!("create_shader_module: {e:?}")))?
        };

        debug!("{:?} shader module created ({} bytes)", stage, bytes.len());

        Ok(Self {
            device,
            module,
            stage,
        })
    }

    /// Returns the stage create info for pipeline construction.
    pub fn stage_create_info(&self) -> vk::PipelineShaderStageCreateInfo<'_> {
        vk::PipelineShaderStageCreateInfo::default()
            .stage(self.stage.to_vk())
            .module(self.module)
            .name(SHADER_ENTRY_POINT)
    }
}

impl Drop for Shader {
    fn drop(&mut self) {
        unsafe {
            self.device.handle().destroy_shader_module(self.module, None);
        }
        debug!("{:?} shader module destroyed", self.stage);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_bytecode_rejected() {
        let err = validate_spirv(&[]).unwrap_err();
        assert!(matches!(err, RhiError::ShaderLoad(_)));
    }

    #[test]
    fn test_misaligned_bytecode_rejected() {
        let err = validate_spirv(&[0x03, 0x02, 0x23]).unwrap_err();
        assert!(matches!(err, RhiError::ShaderLoad(_)));
    }

    #[test]
    fn test_aligned_bytecode_accepted() {
        assert!(validate_spirv(&[0x03, 0x02, 0x23, 0x07]).is_ok());
        assert!(validate_spirv(&[0u8; 20]).is_ok());
    }

    #[test]
    fn test_stage_flags() {
        assert_eq!(ShaderStage::Vertex.to_vk(), vk::ShaderStageFlags::VERTEX);
        assert_eq!(ShaderStage::Fragment.to_vk(), vk::ShaderStageFlags::FRAGMENT);
    }
}
