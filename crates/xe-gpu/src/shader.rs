//! Shader microcode loaded by IM_LOAD packets

use std::collections::HashMap;
use std::sync::Arc;

use xe_core::error::GpuError;

/// Pipeline stage a shader is loaded for
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ShaderStage {
    Vertex,
    Pixel,
}

impl ShaderStage {
    /// Decode a shader type field
    pub fn from_raw(value: u32) -> Result<Self, GpuError> {
        match value {
            0 => Ok(Self::Vertex),
            1 => Ok(Self::Pixel),
            other => Err(GpuError::UnsupportedShaderStage(other)),
        }
    }
}

/// Guest shader microcode
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Shader {
    /// Stage the shader was loaded for
    pub stage: ShaderStage,
    /// Guest address the microcode was loaded from
    pub guest_address: u32,
    /// Content hash of the microcode
    pub hash: u64,
    /// Microcode words in host order
    pub ucode: Vec<u32>,
}

impl Shader {
    /// Size of the microcode in dwords
    pub fn dword_count(&self) -> usize {
        self.ucode.len()
    }

    /// Microcode as a byte slice
    pub fn as_bytes(&self) -> &[u8] {
        bytemuck::cast_slice(&self.ucode)
    }
}

/// Deduplicating store of loaded shaders
///
/// Identical microcode loaded for the same stage resolves to the same shader,
/// whatever address it was uploaded from.
#[derive(Default)]
pub struct ShaderCache {
    shaders: HashMap<(ShaderStage, u64), Arc<Shader>>,
}

impl ShaderCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Compute hash for shader microcode
    fn compute_hash(ucode: &[u32]) -> u64 {
        use std::collections::hash_map::DefaultHasher;
        use std::hash::{Hash, Hasher};

        let mut hasher = DefaultHasher::new();
        ucode.hash(&mut hasher);
        hasher.finish()
    }

    /// Find or insert the shader for this microcode
    pub fn load(&mut self, stage: ShaderStage, guest_address: u32, ucode: Vec<u32>) -> Arc<Shader> {
        let hash = Self::compute_hash(&ucode);
        Arc::clone(self.shaders.entry((stage, hash)).or_insert_with(|| {
            Arc::new(Shader {
                stage,
                guest_address,
                hash,
                ucode,
            })
        }))
    }

    /// Number of distinct shaders
    pub fn len(&self) -> usize {
        self.shaders.len()
    }

    pub fn is_empty(&self) -> bool {
        self.shaders.is_empty()
    }
}
