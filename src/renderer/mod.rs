pub mod backend;
pub mod batch;
pub mod context;
pub mod error;
pub mod handles;
pub mod hashing;
pub mod headless;
pub mod material;
pub mod pass;
mod records;
pub mod reflect;
pub mod uniforms;
pub mod vertex;

pub use backend::{Backend, DrawCall, ImageDesc, RawId, RenderTarget, VertexArrayDesc};
pub use batch::{DrawInfo, DrawQueue, QueuedDraw, RenderEntry};
pub use context::{MeshDesc, PassStats, RenderingContext, ResourceCounts};
pub use error::RenderError;
pub use handles::{
    AsUniformBlock, BufferHandle, BufferMode, FramebufferHandle, ImageFormat, ImageHandle,
    ImageInterpolation, ImageTiling, MaterialHandle, MeshHandle, ResourcePoolHandle,
    ShaderHandle, ShaderStage, ShaderStageHandle, UniformBlockHandle,
};
pub use headless::{Command, HeadlessBackend, ObjectKind};
pub use material::{BlendFactor, BlendState, MaterialBlendMode, UniformResources};
pub use pass::{ClearFlags, RenderPass};
pub use uniforms::{
    PushConstants, UniformBlockSemantics, UniformField, UniformInfo, UniformType, UniformValue,
};
pub use vertex::{Dimensions, ElementType, IndexType, MeshAttribute, PrimitiveType};
