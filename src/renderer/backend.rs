// renderer/backend.rs
use std::collections::HashMap;

use glam::Vec4;
use serde::Serialize;

use super::error::RenderError;
use super::handles::{BufferMode, ImageFormat, ImageInterpolation, ImageTiling, ShaderStage};
use super::material::BlendState;
use super::pass::ClearFlags;
use super::uniforms::{PushConstants, UniformBlockSemantics, UniformInfo};
use super::vertex::{IndexType, MeshAttribute, PrimitiveType};

/// Backend object name. Zero never names a live object.
pub type RawId = u64;

#[derive(Debug, Clone, Copy)]
pub struct VertexArrayDesc<'a> {
    pub vertex_buffer: RawId,
    pub attributes: &'a [MeshAttribute],
    pub index_buffer: Option<RawId>,
    pub instance_buffer: Option<RawId>,
    pub instance_attributes: &'a [MeshAttribute],
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ImageDesc {
    pub width: u32,
    pub height: u32,
    pub format: ImageFormat,
    pub interpolation: ImageInterpolation,
    pub tiling: ImageTiling,
}

impl ImageDesc {
    pub fn new(width: u32, height: u32, format: ImageFormat) -> Self {
        Self {
            width,
            height,
            format,
            interpolation: ImageInterpolation::default(),
            tiling: ImageTiling::default(),
        }
    }

    pub fn with_sampling(mut self, interpolation: ImageInterpolation, tiling: ImageTiling) -> Self {
        self.interpolation = interpolation;
        self.tiling = tiling;
        self
    }

    pub fn byte_size(&self) -> usize {
        self.width as usize * self.height as usize * self.format.bytes_per_pixel()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum RenderTarget {
    Default(u32),
    Framebuffer(RawId),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct DrawCall {
    pub vertex_array: RawId,
    pub mesh_identifier: u64,
    pub primitive: PrimitiveType,
    pub count: usize,
    pub index_type: IndexType,
    pub instance_count: usize,
}

impl DrawCall {
    pub fn is_indexed(&self) -> bool {
        self.index_type != IndexType::None
    }

    pub fn is_instanced(&self) -> bool {
        self.instance_count > 0
    }
}

/// The graphics API behind a [`RenderingContext`](super::RenderingContext).
///
/// The context owns all bookkeeping (handles, caches, pools, the draw queue
/// walk); a backend only creates raw objects and executes the state changes
/// it is told to, in order.
pub trait Backend {
    fn create_buffer(&mut self, size: usize, data: Option<&[u8]>, mode: BufferMode) -> RawId;
    fn delete_buffer(&mut self, buffer: RawId);

    fn create_vertex_array(&mut self, desc: &VertexArrayDesc<'_>) -> RawId;
    fn delete_vertex_array(&mut self, vertex_array: RawId);

    fn create_image(&mut self, desc: &ImageDesc, data: Option<&[u8]>) -> RawId;
    fn resize_image(&mut self, image: RawId, desc: &ImageDesc);
    fn delete_image(&mut self, image: RawId);

    fn create_framebuffer(&mut self, color: &[RawId], depth: Option<RawId>) -> RawId;
    fn delete_framebuffer(&mut self, framebuffer: RawId);

    fn compile_stage(
        &mut self,
        stage: ShaderStage,
        name: &str,
        source: &str,
    ) -> Result<RawId, RenderError>;
    fn delete_stage(&mut self, stage: RawId);

    fn link_program(&mut self, stages: &[RawId]) -> Result<RawId, RenderError>;
    fn delete_program(&mut self, program: RawId);

    /// Reflected uniform blocks of a linked program, keyed by semantic.
    fn uniform_blocks(&self, program: RawId) -> HashMap<UniformBlockSemantics, UniformInfo>;

    fn begin_frame(&mut self) {}
    fn end_frame(&mut self) {}

    fn bind_target(&mut self, target: RenderTarget, width: u32, height: u32);
    fn clear(&mut self, flags: ClearFlags, color: Vec4, depth: f32);
    fn upload_uniforms(&mut self, semantic: UniformBlockSemantics, bytes: &[u8]);
    fn use_program(&mut self, program: RawId);
    fn apply_blend_state(&mut self, state: BlendState);
    fn bind_image(&mut self, unit: u32, name: &str, image: RawId);
    fn bind_storage_buffer(&mut self, binding: u32, buffer: RawId);
    fn bind_vertex_array(&mut self, vertex_array: RawId);
    fn upload_push_constants(&mut self, constants: &PushConstants);
    fn draw(&mut self, call: &DrawCall);
    fn dispatch_compute(&mut self, x: u32, y: u32, z: u32);

    /// Unbind the vertex array, disable blending, re-enable depth writes.
    fn restore_default_state(&mut self);
}
