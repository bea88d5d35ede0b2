// renderer/records.rs
//! Context-owned storage behind each handle kind.

use std::collections::HashMap;
use std::sync::Arc;

use super::backend::RawId;
use super::handles::{
    ImageFormat, ImageHandle, ImageInterpolation, ImageTiling, ResourcePoolHandle,
    ShaderStage, ShaderStageHandle,
};
use super::uniforms::{UniformBlockSemantics, UniformInfo};

pub struct BufferRecord {
    pub raw: RawId,
    pub pool: ResourcePoolHandle,
}

pub struct MeshRecord {
    pub vertex_array: RawId,
    pub pool: ResourcePoolHandle,
}

pub struct ImageRecord {
    pub raw: RawId,
    pub width: u32,
    pub height: u32,
    pub format: ImageFormat,
    pub interpolation: ImageInterpolation,
    pub tiling: ImageTiling,
    pub pool: ResourcePoolHandle,
}

pub struct FramebufferRecord {
    pub raw: RawId,
    pub color: Vec<ImageHandle>,
    pub depth: Option<ImageHandle>,
    pub pool: ResourcePoolHandle,
}

pub struct ShaderStageRecord {
    pub raw: RawId,
    pub name: String,
    pub stage: ShaderStage,
}

pub struct ShaderRecord {
    pub raw: RawId,
    pub cache_key: u64,
    pub stages: Vec<ShaderStageHandle>,
    pub uniform_blocks: HashMap<UniformBlockSemantics, Arc<UniformInfo>>,
}

/// Bookkeeping for a resource pool. Membership lives on each record's `pool`
/// field, so the pool itself only counts what was tagged with it.
#[derive(Default)]
pub struct ResourcePool {
    pub tagged: usize,
}
