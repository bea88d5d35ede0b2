// renderer/handles.rs
//! Typed, copyable views onto resources owned by a
//! [`RenderingContext`](super::RenderingContext).
//!
//! Every handle kind wraps a generational key plus whatever metadata call
//! sites need without going back to the context. Handles compare by
//! identifier; the null value of each kind has identifier `0`.

use std::hash::{Hash, Hasher};

use serde::{Deserialize, Serialize};

use super::material::{MaterialBlendMode, UniformResources};
use super::records::{
    BufferRecord, FramebufferRecord, ImageRecord, MeshRecord, ResourcePool, ShaderRecord,
    ShaderStageRecord,
};
use super::uniforms::UniformBlockSemantics;
use super::vertex::{IndexType, PrimitiveType};
use crate::asset::{Handle, Identified};

macro_rules! identified_handle {
    ($name:ident) => {
        impl $name {
            pub fn identifier(&self) -> u64 {
                self.key.identifier()
            }

            pub fn is_null(&self) -> bool {
                self.key.is_null()
            }
        }

        impl Identified for $name {
            fn identifier(&self) -> u64 {
                self.key.identifier()
            }
        }

        impl PartialEq for $name {
            fn eq(&self, other: &Self) -> bool {
                self.identifier() == other.identifier()
            }
        }

        impl Eq for $name {}

        impl Hash for $name {
            fn hash<H: Hasher>(&self, state: &mut H) {
                self.identifier().hash(state);
            }
        }
    };
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum BufferMode {
    #[default]
    Static,
    Dynamic,
    Stream,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ImageFormat {
    R8,
    RG8,
    RGB8,
    RGBA8,
    RGBA32F,
    Depth32F,
}

impl ImageFormat {
    pub const fn bytes_per_pixel(self) -> usize {
        match self {
            Self::R8 => 1,
            Self::RG8 => 2,
            Self::RGB8 => 3,
            Self::RGBA8 | Self::Depth32F => 4,
            Self::RGBA32F => 16,
        }
    }

    pub const fn from_channel_count(channels: u8) -> Option<Self> {
        match channels {
            1 => Some(Self::R8),
            2 => Some(Self::RG8),
            3 => Some(Self::RGB8),
            4 => Some(Self::RGBA8),
            _ => None,
        }
    }

    pub const fn is_depth(self) -> bool {
        matches!(self, Self::Depth32F)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum ImageInterpolation {
    Nearest,
    #[default]
    Linear,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum ImageTiling {
    #[default]
    Repeat,
    ClampToEdge,
    MirroredRepeat,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ShaderStage {
    Vertex,
    Fragment,
    Geometry,
    Compute,
}

impl ShaderStage {
    /// Stage kind from a file name such as `sprite.frag.glsl`: the
    /// second-to-last dot segment decides, and anything unknown is compute.
    pub fn from_file_name(name: &str) -> Self {
        let mut segments = name.rsplit('.');
        segments.next();
        match segments.next() {
            Some("vert") => Self::Vertex,
            Some("frag") => Self::Fragment,
            Some("geom") => Self::Geometry,
            _ => Self::Compute,
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct BufferHandle {
    pub(crate) key: Handle<BufferRecord>,
    size: usize,
}

identified_handle!(BufferHandle);

impl BufferHandle {
    pub(crate) fn new(key: Handle<BufferRecord>, size: usize) -> Self {
        Self { key, size }
    }

    pub fn null() -> Self {
        Self::new(Handle::null(), 0)
    }

    pub fn size(&self) -> usize {
        self.size
    }
}

impl Default for BufferHandle {
    fn default() -> Self {
        Self::null()
    }
}

#[derive(Debug, Clone, Copy)]
pub struct MeshHandle {
    pub(crate) key: Handle<MeshRecord>,
    layout_hash: u64,
    vertex_buffer: BufferHandle,
    num_elements: usize,
    primitive_type: PrimitiveType,
    index_type: IndexType,
    index_buffer: Option<BufferHandle>,
    instance_count: usize,
    instance_buffer: Option<BufferHandle>,
}

identified_handle!(MeshHandle);

impl MeshHandle {
    #[allow(clippy::too_many_arguments)]
    pub(crate) fn new(
        key: Handle<MeshRecord>,
        layout_hash: u64,
        vertex_buffer: BufferHandle,
        num_elements: usize,
        primitive_type: PrimitiveType,
        index_type: IndexType,
        index_buffer: Option<BufferHandle>,
        instance_count: usize,
        instance_buffer: Option<BufferHandle>,
    ) -> Self {
        Self {
            key,
            layout_hash,
            vertex_buffer,
            num_elements,
            primitive_type,
            index_type,
            index_buffer,
            instance_count,
            instance_buffer,
        }
    }

    pub fn null() -> Self {
        Self::new(
            Handle::null(),
            0,
            BufferHandle::null(),
            0,
            PrimitiveType::default(),
            IndexType::None,
            None,
            0,
            None,
        )
    }

    pub fn layout_hash(&self) -> u64 {
        self.layout_hash
    }

    pub fn vertex_buffer(&self) -> BufferHandle {
        self.vertex_buffer
    }

    pub fn num_elements(&self) -> usize {
        self.num_elements
    }

    pub fn primitive_type(&self) -> PrimitiveType {
        self.primitive_type
    }

    pub fn index_type(&self) -> IndexType {
        self.index_type
    }

    pub fn index_buffer(&self) -> Option<BufferHandle> {
        self.index_buffer
    }

    pub fn is_indexed(&self) -> bool {
        self.index_buffer.is_some()
    }

    pub fn instance_count(&self) -> usize {
        self.instance_count
    }

    pub fn instance_buffer(&self) -> Option<BufferHandle> {
        self.instance_buffer
    }
}

impl Default for MeshHandle {
    fn default() -> Self {
        Self::null()
    }
}

#[derive(Debug, Clone, Copy)]
pub struct ImageHandle {
    pub(crate) key: Handle<ImageRecord>,
    format: ImageFormat,
    interpolation: ImageInterpolation,
    tiling: ImageTiling,
}

identified_handle!(ImageHandle);

impl ImageHandle {
    pub(crate) fn new(
        key: Handle<ImageRecord>,
        format: ImageFormat,
        interpolation: ImageInterpolation,
        tiling: ImageTiling,
    ) -> Self {
        Self {
            key,
            format,
            interpolation,
            tiling,
        }
    }

    pub fn null() -> Self {
        Self::new(
            Handle::null(),
            ImageFormat::RGBA8,
            ImageInterpolation::default(),
            ImageTiling::default(),
        )
    }

    pub fn format(&self) -> ImageFormat {
        self.format
    }

    pub fn interpolation(&self) -> ImageInterpolation {
        self.interpolation
    }

    pub fn tiling(&self) -> ImageTiling {
        self.tiling
    }
}

impl Default for ImageHandle {
    fn default() -> Self {
        Self::null()
    }
}

/// Attachments live in the context; query them with
/// [`RenderingContext::framebuffer_attachments`](super::RenderingContext::framebuffer_attachments).
#[derive(Debug, Clone, Copy, Default)]
pub struct FramebufferHandle {
    pub(crate) key: Handle<FramebufferRecord>,
}

identified_handle!(FramebufferHandle);

impl FramebufferHandle {
    pub fn null() -> Self {
        Self::default()
    }
}

#[derive(Debug, Clone, Copy)]
pub struct ShaderStageHandle {
    pub(crate) key: Handle<ShaderStageRecord>,
    stage: ShaderStage,
}

identified_handle!(ShaderStageHandle);

impl ShaderStageHandle {
    pub(crate) fn new(key: Handle<ShaderStageRecord>, stage: ShaderStage) -> Self {
        Self { key, stage }
    }

    pub fn null() -> Self {
        Self::new(Handle::null(), ShaderStage::Vertex)
    }

    pub fn stage(&self) -> ShaderStage {
        self.stage
    }
}

impl Default for ShaderStageHandle {
    fn default() -> Self {
        Self::null()
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct ShaderHandle {
    pub(crate) key: Handle<ShaderRecord>,
}

identified_handle!(ShaderHandle);

impl ShaderHandle {
    pub fn null() -> Self {
        Self::default()
    }
}

/// View of a CPU-side uniform block mirror plus its image and storage
/// buffer tables. `has_block` is false when the shader declared no block for
/// the requested semantic; such handles are still valid for image bindings.
#[derive(Debug, Clone, Copy)]
pub struct UniformBlockHandle {
    pub(crate) key: Handle<UniformResources>,
    semantic: UniformBlockSemantics,
    size: usize,
    has_block: bool,
}

identified_handle!(UniformBlockHandle);

impl UniformBlockHandle {
    pub(crate) fn new(
        key: Handle<UniformResources>,
        semantic: UniformBlockSemantics,
        size: usize,
        has_block: bool,
    ) -> Self {
        Self {
            key,
            semantic,
            size,
            has_block,
        }
    }

    pub fn null() -> Self {
        Self::new(Handle::null(), UniformBlockSemantics::Material, 0, false)
    }

    pub fn semantic(&self) -> UniformBlockSemantics {
        self.semantic
    }

    pub fn size(&self) -> usize {
        self.size
    }

    pub fn has_uniform_block(&self) -> bool {
        self.has_block
    }
}

impl Default for UniformBlockHandle {
    fn default() -> Self {
        Self::null()
    }
}

/// A material uniform block tied to one shader program and blend mode.
///
/// Identity is the block's arena slot plus the shader: two materials with
/// identical contents are still distinct.
#[derive(Debug, Clone, Copy)]
pub struct MaterialHandle {
    block: UniformBlockHandle,
    shader: ShaderHandle,
    blend_mode: MaterialBlendMode,
}

impl MaterialHandle {
    pub(crate) fn new(
        block: UniformBlockHandle,
        shader: ShaderHandle,
        blend_mode: MaterialBlendMode,
    ) -> Self {
        Self {
            block,
            shader,
            blend_mode,
        }
    }

    pub fn null() -> Self {
        Self::new(
            UniformBlockHandle::null(),
            ShaderHandle::null(),
            MaterialBlendMode::default(),
        )
    }

    pub fn identifier(&self) -> u64 {
        self.block.identifier()
    }

    pub fn is_null(&self) -> bool {
        self.block.is_null()
    }

    pub fn uniform_block(&self) -> UniformBlockHandle {
        self.block
    }

    pub fn shader(&self) -> ShaderHandle {
        self.shader
    }

    pub fn blend_mode(&self) -> MaterialBlendMode {
        self.blend_mode
    }
}

impl Identified for MaterialHandle {
    fn identifier(&self) -> u64 {
        self.block.identifier()
    }
}

impl PartialEq for MaterialHandle {
    fn eq(&self, other: &Self) -> bool {
        self.block.identifier() == other.block.identifier()
            && self.shader.identifier() == other.shader.identifier()
    }
}

impl Eq for MaterialHandle {}

impl Hash for MaterialHandle {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.block.identifier().hash(state);
        self.shader.identifier().hash(state);
    }
}

impl Default for MaterialHandle {
    fn default() -> Self {
        Self::null()
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct ResourcePoolHandle {
    pub(crate) key: Handle<ResourcePool>,
}

identified_handle!(ResourcePoolHandle);

impl ResourcePoolHandle {
    pub fn null() -> Self {
        Self::default()
    }
}

/// Anything that resolves to a uniform block in the context.
pub trait AsUniformBlock {
    fn as_uniform_block(&self) -> UniformBlockHandle;
}

impl AsUniformBlock for UniformBlockHandle {
    fn as_uniform_block(&self) -> UniformBlockHandle {
        *self
    }
}

impl AsUniformBlock for MaterialHandle {
    fn as_uniform_block(&self) -> UniformBlockHandle {
        self.block
    }
}
