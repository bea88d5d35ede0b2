// renderer/material.rs
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use super::handles::{BufferHandle, ImageHandle, ResourcePoolHandle};
use super::uniforms::{UniformBlockSemantics, UniformInfo, UniformValue};
use crate::asset::HandleDict;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum MaterialBlendMode {
    #[default]
    Opaque,
    AlphaTest,
    Alpha,
    PremultipliedAlpha,
    Additive,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum BlendFactor {
    Zero,
    One,
    SrcAlpha,
    OneMinusSrcAlpha,
}

/// Fixed-function state a backend applies before drawing a material.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct BlendState {
    pub blending: bool,
    pub src: BlendFactor,
    pub dst: BlendFactor,
    pub depth_write: bool,
}

impl BlendState {
    pub const DEFAULT: Self = Self {
        blending: false,
        src: BlendFactor::One,
        dst: BlendFactor::Zero,
        depth_write: true,
    };

    const fn blended(src: BlendFactor, dst: BlendFactor) -> Self {
        Self {
            blending: true,
            src,
            dst,
            depth_write: false,
        }
    }
}

impl Default for BlendState {
    fn default() -> Self {
        Self::DEFAULT
    }
}

impl MaterialBlendMode {
    pub const fn blend_state(self) -> BlendState {
        match self {
            Self::Opaque | Self::AlphaTest => BlendState::DEFAULT,
            Self::Alpha => BlendState::blended(BlendFactor::SrcAlpha, BlendFactor::OneMinusSrcAlpha),
            Self::PremultipliedAlpha => {
                BlendState::blended(BlendFactor::One, BlendFactor::OneMinusSrcAlpha)
            }
            Self::Additive => BlendState::blended(BlendFactor::One, BlendFactor::One),
        }
    }

    pub const fn uses_blending(self) -> bool {
        self.blend_state().blending
    }
}

/// CPU mirror of one uniform block plus the image and storage-buffer tables
/// bound alongside it. Owned by the context; reached through a
/// [`UniformBlockHandle`](super::UniformBlockHandle) or
/// [`MaterialHandle`](super::MaterialHandle).
pub struct UniformResources {
    info: Option<Arc<UniformInfo>>,
    buffer: Vec<u8>,
    images: HandleDict<String, ImageHandle>,
    buffers: HandleDict<u32, BufferHandle>,
    semantic: UniformBlockSemantics,
    pub(crate) pool: ResourcePoolHandle,
}

impl UniformResources {
    pub(crate) fn new(
        info: Option<Arc<UniformInfo>>,
        semantic: UniformBlockSemantics,
        pool: ResourcePoolHandle,
    ) -> Self {
        let size = info.as_ref().map_or(0, |info| info.buffer_size());
        Self {
            info,
            buffer: vec![0; size],
            images: HandleDict::new(),
            buffers: HandleDict::new(),
            semantic,
            pool,
        }
    }

    pub fn has_uniform_block(&self) -> bool {
        self.info.is_some()
    }

    pub fn info(&self) -> Option<&UniformInfo> {
        self.info.as_deref()
    }

    pub fn semantic(&self) -> UniformBlockSemantics {
        self.semantic
    }

    pub fn size(&self) -> usize {
        self.buffer.len()
    }

    pub fn cpu_buffer(&self) -> &[u8] {
        &self.buffer
    }

    /// Writes a single (non-array) value. Returns `false` without touching
    /// the buffer when there is no block, no such field, or the field's type
    /// or array size doesn't match.
    pub fn set(&mut self, key: &str, value: impl Into<UniformValue>) -> bool {
        let value = value.into();
        let Some(info) = self.info.as_deref() else {
            return false;
        };
        let Some(field) = info.find(key) else {
            return false;
        };
        if field.ty != value.uniform_type() || field.array_size != 1 {
            return false;
        }
        value.write_std140(&mut self.buffer[field.offset..]);
        true
    }

    /// Writes a whole uniform array. Every value must have the field's type
    /// and `values.len()` must equal the declared array size.
    pub fn set_array(&mut self, key: &str, values: &[UniformValue]) -> bool {
        let Some(info) = self.info.as_deref() else {
            return false;
        };
        let Some(field) = info.find(key) else {
            return false;
        };
        if values.len() != field.array_size as usize
            || values.iter().any(|value| value.uniform_type() != field.ty)
        {
            return false;
        }
        for (i, value) in values.iter().enumerate() {
            let offset = field.offset + i * field.array_stride;
            value.write_std140(&mut self.buffer[offset..]);
        }
        true
    }

    /// Binds an image by sampler name. A rebind keeps the sampler's slot, so
    /// its texture unit does not move.
    pub fn set_image(&mut self, key: &str, image: ImageHandle) -> bool {
        if image.is_null() {
            return false;
        }
        match self.images.find_mut(key) {
            Some(bound) => {
                *bound = image;
                true
            }
            None => self.images.insert(key.to_string(), image),
        }
    }

    /// Binds (or rebinds in place) a storage buffer to a binding index.
    pub fn set_buffer(&mut self, binding: u32, buffer: BufferHandle) -> bool {
        if buffer.is_null() {
            return false;
        }
        match self.buffers.find_mut(&binding) {
            Some(bound) => {
                *bound = buffer;
                true
            }
            None => self.buffers.insert(binding, buffer),
        }
    }

    pub fn images(&self) -> &HandleDict<String, ImageHandle> {
        &self.images
    }

    pub fn storage_buffers(&self) -> &HandleDict<u32, BufferHandle> {
        &self.buffers
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::renderer::uniforms::{UniformField, UniformType};
    use glam::{Mat4, Vec3, Vec4};

    fn material_info() -> Arc<UniformInfo> {
        let mut info = UniformInfo::new(160);
        let fields = [
            ("uFoo", UniformType::Float, 0, 1, 4),
            ("uTint", UniformType::Vec3, 16, 1, 12),
            ("uWeights", UniformType::Float, 32, 3, 16),
            ("uModel", UniformType::Mat4, 80, 1, 64),
        ];
        for (name, ty, offset, array_size, array_stride) in fields {
            assert!(info.push_field(UniformField {
                name: name.into(),
                ty,
                offset,
                array_size,
                array_stride,
            }));
        }
        Arc::new(info)
    }

    fn resources() -> UniformResources {
        UniformResources::new(
            Some(material_info()),
            UniformBlockSemantics::Material,
            ResourcePoolHandle::null(),
        )
    }

    #[test]
    fn set_float_round_trips_through_the_buffer() {
        let mut block = resources();
        assert!(block.set("uFoo", 3.5f32));
        assert_eq!(&block.cpu_buffer()[0..4], &3.5f32.to_ne_bytes());
    }

    #[test]
    fn wrong_type_leaves_buffer_untouched() {
        let mut block = resources();
        let before = block.cpu_buffer().to_vec();
        assert!(!block.set("uFoo", Vec4::new(1.0, 2.0, 3.0, 4.0)));
        assert!(!block.set("uMissing", 1.0f32));
        assert!(!block.set("uWeights", 1.0f32));
        assert_eq!(block.cpu_buffer(), &before[..]);
    }

    #[test]
    fn arrays_are_written_at_their_stride() {
        let mut block = resources();
        let weights = [
            UniformValue::Float(1.0),
            UniformValue::Float(2.0),
            UniformValue::Float(3.0),
        ];
        assert!(block.set_array("uWeights", &weights));
        assert!(!block.set_array("uWeights", &weights[..2]));
        for (i, expected) in [1.0f32, 2.0, 3.0].iter().enumerate() {
            let offset = 32 + i * 16;
            assert_eq!(&block.cpu_buffer()[offset..offset + 4], &expected.to_ne_bytes());
        }
    }

    #[test]
    fn matrix_and_vector_writes_land_at_reflected_offsets() {
        let mut block = resources();
        assert!(block.set("uTint", Vec3::new(0.5, 0.25, 1.0)));
        assert!(block.set("uModel", Mat4::from_translation(Vec3::new(7.0, 8.0, 9.0))));
        assert_eq!(&block.cpu_buffer()[16..20], &0.5f32.to_ne_bytes());
        // translation sits in the fourth column
        assert_eq!(&block.cpu_buffer()[80 + 48..80 + 52], &7.0f32.to_ne_bytes());
    }

    #[test]
    fn block_without_layout_rejects_values() {
        let mut block = UniformResources::new(
            None,
            UniformBlockSemantics::Material,
            ResourcePoolHandle::null(),
        );
        assert!(!block.has_uniform_block());
        assert_eq!(block.size(), 0);
        assert!(!block.set("uFoo", 1.0f32));
    }

    #[test]
    fn rebinding_keeps_image_and_buffer_slots() {
        use crate::asset::AssetCache;
        use crate::renderer::handles::{ImageFormat, ImageInterpolation, ImageTiling};

        let mut keys = AssetCache::new();
        let mut image = || {
            let key = keys.insert(());
            ImageHandle::new(
                crate::asset::Handle::from_key(key.key()),
                ImageFormat::RGBA8,
                ImageInterpolation::default(),
                ImageTiling::default(),
            )
        };
        let (albedo, mask, detail) = (image(), image(), image());

        let mut block = resources();
        assert!(block.set_image("uAlbedo", albedo));
        assert!(block.set_image("uMask", mask));
        assert!(block.set_image("uAlbedo", detail));
        let bound: Vec<_> = block
            .images()
            .iter()
            .map(|(name, image)| (name.as_str(), image.identifier()))
            .collect();
        assert_eq!(bound, vec![("uAlbedo", detail.identifier()), ("uMask", mask.identifier())]);

        let mut buffers = AssetCache::new();
        let first = BufferHandle::new(crate::asset::Handle::from_key(buffers.insert(()).key()), 64);
        let second = BufferHandle::new(crate::asset::Handle::from_key(buffers.insert(()).key()), 128);
        assert!(block.set_buffer(3, first));
        assert!(block.set_buffer(4, first));
        assert!(block.set_buffer(3, second));
        let bindings: Vec<_> = block
            .storage_buffers()
            .iter()
            .map(|(binding, buffer)| (*binding, buffer.size()))
            .collect();
        assert_eq!(bindings, vec![(3, 128), (4, 64)]);
    }

    #[test]
    fn blend_modes_map_to_fixed_states() {
        assert_eq!(MaterialBlendMode::Opaque.blend_state(), BlendState::DEFAULT);
        assert!(MaterialBlendMode::AlphaTest.blend_state().depth_write);
        let alpha = MaterialBlendMode::Alpha.blend_state();
        assert_eq!((alpha.src, alpha.dst), (BlendFactor::SrcAlpha, BlendFactor::OneMinusSrcAlpha));
        assert!(!alpha.depth_write);
        let additive = MaterialBlendMode::Additive.blend_state();
        assert_eq!((additive.src, additive.dst), (BlendFactor::One, BlendFactor::One));
        assert!(MaterialBlendMode::PremultipliedAlpha.uses_blending());
    }
}
