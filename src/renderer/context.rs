// renderer/context.rs
use std::path::Path;
use std::sync::Arc;

use log::{debug, error, info, warn};
use serde::Serialize;

use super::backend::{Backend, DrawCall, ImageDesc, RenderTarget, VertexArrayDesc};
use super::error::RenderError;
use super::handles::{
    AsUniformBlock, BufferHandle, BufferMode, FramebufferHandle, ImageFormat, ImageHandle,
    ImageInterpolation, ImageTiling, MaterialHandle, MeshHandle, ResourcePoolHandle,
    ShaderHandle, ShaderStage, ShaderStageHandle, UniformBlockHandle,
};
use super::hashing::{hash_combine, hash_identifiers};
use super::material::{MaterialBlendMode, UniformResources};
use super::pass::RenderPass;
use super::records::{
    BufferRecord, FramebufferRecord, ImageRecord, MeshRecord, ResourcePool, ShaderRecord,
    ShaderStageRecord,
};
use super::uniforms::{PushConstants, UniformBlockSemantics, UniformInfo, UniformValue};
use super::vertex::{hash_mesh_layout, IndexType, MeshAttribute, PrimitiveType};
use crate::asset::{AssetCache, Handle, HandleDict, HandlePool};
use crate::io;
use crate::settings::ContextSettings;

/// Everything needed to create a mesh.
///
/// `num_elements` counts indices for indexed meshes and vertices otherwise.
#[derive(Debug, Clone, Copy)]
pub struct MeshDesc<'a> {
    pub num_elements: usize,
    pub vertex_buffer: BufferHandle,
    pub attributes: &'a [MeshAttribute],
    pub index_buffer: Option<BufferHandle>,
    pub primitive_type: PrimitiveType,
    pub instance_count: usize,
    pub instance_buffer: Option<BufferHandle>,
    pub instance_attributes: &'a [MeshAttribute],
}

impl<'a> MeshDesc<'a> {
    pub fn new(num_elements: usize, vertex_buffer: BufferHandle, attributes: &'a [MeshAttribute]) -> Self {
        Self {
            num_elements,
            vertex_buffer,
            attributes,
            index_buffer: None,
            primitive_type: PrimitiveType::Triangles,
            instance_count: 0,
            instance_buffer: None,
            instance_attributes: &[],
        }
    }

    pub fn with_primitive(mut self, primitive_type: PrimitiveType) -> Self {
        self.primitive_type = primitive_type;
        self
    }

    pub fn with_indices(mut self, index_buffer: BufferHandle) -> Self {
        self.index_buffer = Some(index_buffer);
        self
    }

    pub fn with_instances(
        mut self,
        instance_count: usize,
        instance_buffer: BufferHandle,
        instance_attributes: &'a [MeshAttribute],
    ) -> Self {
        self.instance_count = instance_count;
        self.instance_buffer = Some(instance_buffer);
        self.instance_attributes = instance_attributes;
        self
    }
}

/// What one [`RenderingContext::draw_pass`] call submitted.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct PassStats {
    pub draw_calls: usize,
    pub instanced_draws: usize,
    pub program_switches: usize,
    pub material_binds: usize,
    /// Draws dropped because their mesh, shader or material was deleted.
    pub skipped_draws: usize,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ResourceCounts {
    pub buffers: usize,
    pub meshes: usize,
    pub images: usize,
    pub framebuffers: usize,
    pub shader_stages: usize,
    pub shaders: usize,
    pub uniform_blocks: usize,
    pub pools: usize,
}

/// Owns every resource a handle can point at and drives a [`Backend`].
///
/// Creation calls take an optional [`ResourcePoolHandle`]; `None` tags the
/// resource with the default pool, which lives as long as the context.
pub struct RenderingContext<B: Backend> {
    backend: B,
    settings: ContextSettings,
    screen_width: u32,
    screen_height: u32,

    buffers: AssetCache<BufferRecord>,
    meshes: AssetCache<MeshRecord>,
    mesh_registry: HandlePool<MeshHandle>,
    images: AssetCache<ImageRecord>,
    framebuffers: AssetCache<FramebufferRecord>,
    shader_stages: AssetCache<ShaderStageRecord>,
    shaders: AssetCache<ShaderRecord>,
    uniform_blocks: AssetCache<UniformResources>,
    pools: AssetCache<ResourcePool>,
    default_pool: ResourcePoolHandle,

    stage_cache: HandleDict<String, ShaderStageHandle>,
    shader_cache: HandleDict<u64, ShaderHandle>,
}

impl<B: Backend> RenderingContext<B> {
    pub fn new(backend: B, settings: ContextSettings) -> Self {
        let mut pools = AssetCache::new();
        let default_pool = ResourcePoolHandle {
            key: pools.insert(ResourcePool::default()),
        };
        let (screen_width, screen_height) = (settings.resolution.width, settings.resolution.height);
        info!(
            "Created rendering context ({}x{})",
            screen_width, screen_height
        );

        Self {
            backend,
            settings,
            screen_width,
            screen_height,
            buffers: AssetCache::new(),
            meshes: AssetCache::new(),
            mesh_registry: HandlePool::new(),
            images: AssetCache::new(),
            framebuffers: AssetCache::new(),
            shader_stages: AssetCache::new(),
            shaders: AssetCache::new(),
            uniform_blocks: AssetCache::new(),
            pools,
            default_pool,
            stage_cache: HandleDict::new(),
            shader_cache: HandleDict::new(),
        }
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    pub fn backend_mut(&mut self) -> &mut B {
        &mut self.backend
    }

    pub fn settings(&self) -> &ContextSettings {
        &self.settings
    }

    pub fn resolution(&self) -> (u32, u32) {
        (self.screen_width, self.screen_height)
    }

    pub fn window_resized(&mut self, width: u32, height: u32) {
        debug!("Screen resized to {}x{}", width, height);
        self.screen_width = width;
        self.screen_height = height;
    }

    pub fn begin_frame(&mut self) {
        self.backend.begin_frame();
    }

    pub fn end_frame(&mut self) {
        self.backend.end_frame();
    }

    pub fn live_resources(&self) -> ResourceCounts {
        ResourceCounts {
            buffers: self.buffers.len(),
            meshes: self.meshes.len(),
            images: self.images.len(),
            framebuffers: self.framebuffers.len(),
            shader_stages: self.shader_stages.len(),
            shaders: self.shaders.len(),
            uniform_blocks: self.uniform_blocks.len(),
            pools: self.pools.len(),
        }
    }

    // ---- resource pools ----

    pub fn default_pool(&self) -> ResourcePoolHandle {
        self.default_pool
    }

    pub fn create_resource_pool(&mut self) -> ResourcePoolHandle {
        let pool = ResourcePoolHandle {
            key: self.pools.insert(ResourcePool::default()),
        };
        debug!("Created resource pool {:#x}", pool.identifier());
        pool
    }

    /// Deletes every resource tagged with `pool`, then the pool itself.
    ///
    /// Panics on the default pool and on a pool that was already deleted.
    pub fn delete_resource_pool(&mut self, pool: ResourcePoolHandle) {
        assert!(
            pool != self.default_pool,
            "the default resource pool cannot be deleted"
        );
        let Some(record) = self.pools.remove(pool.key) else {
            panic!("resource pool {:#x} deleted twice", pool.identifier());
        };

        let framebuffers: Vec<_> = tagged(&self.framebuffers, pool, |r| r.pool);
        let meshes: Vec<_> = tagged(&self.meshes, pool, |r| r.pool);
        let blocks: Vec<_> = tagged(&self.uniform_blocks, pool, |r| r.pool);
        let images: Vec<_> = tagged(&self.images, pool, |r| r.pool);
        let buffers: Vec<_> = tagged(&self.buffers, pool, |r| r.pool);
        let deleted = framebuffers.len() + meshes.len() + blocks.len() + images.len() + buffers.len();

        for key in framebuffers {
            self.release_framebuffer(key);
        }
        for key in meshes {
            self.release_mesh(key);
        }
        for key in blocks {
            self.uniform_blocks.remove(key);
        }
        for key in images {
            self.release_image(key);
        }
        for key in buffers {
            self.release_buffer(key);
        }

        info!(
            "Deleted resource pool {:#x}: {} of {} tagged resources were still alive",
            pool.identifier(),
            deleted,
            record.tagged
        );
    }

    fn tag(&mut self, pool: Option<ResourcePoolHandle>) -> ResourcePoolHandle {
        let pool = pool.unwrap_or(self.default_pool);
        let Some(record) = self.pools.get_mut(pool.key) else {
            panic!("resource pool {:#x} has been deleted", pool.identifier());
        };
        record.tagged += 1;
        pool
    }

    // ---- buffers and meshes ----

    /// A zero-sized request yields the null handle.
    pub fn create_buffer(
        &mut self,
        size: usize,
        data: Option<&[u8]>,
        mode: BufferMode,
        pool: Option<ResourcePoolHandle>,
    ) -> BufferHandle {
        if size == 0 {
            warn!("Refusing to create an empty buffer");
            return BufferHandle::null();
        }
        if let Some(data) = data {
            assert_eq!(data.len(), size, "buffer data does not match the requested size");
        }

        let pool = self.tag(pool);
        let raw = self.backend.create_buffer(size, data, mode);
        let key = self.buffers.insert(BufferRecord { raw, pool });
        debug!("Created buffer {} ({} bytes)", raw, size);
        BufferHandle::new(key, size)
    }

    pub fn delete_buffer(&mut self, buffer: &BufferHandle) {
        if !buffer.is_null() && !self.release_buffer(buffer.key) {
            warn!("Ignoring delete of stale buffer {:#x}", buffer.identifier());
        }
    }

    fn release_buffer(&mut self, key: Handle<BufferRecord>) -> bool {
        match self.buffers.remove(key) {
            Some(record) => {
                self.backend.delete_buffer(record.raw);
                true
            }
            None => false,
        }
    }

    pub fn create_mesh(&mut self, desc: &MeshDesc<'_>, pool: Option<ResourcePoolHandle>) -> MeshHandle {
        let Some(vertex_buffer) = self.buffers.get(desc.vertex_buffer.key) else {
            panic!("mesh vertex buffer {:#x} is not alive", desc.vertex_buffer.identifier());
        };
        let vertex_buffer_raw = vertex_buffer.raw;

        let (index_type, index_raw) = match desc.index_buffer {
            Some(index_buffer) => {
                let Some(record) = self.buffers.get(index_buffer.key) else {
                    panic!("mesh index buffer {:#x} is not alive", index_buffer.identifier());
                };
                assert!(desc.num_elements > 0, "indexed mesh needs at least one element");
                assert!(
                    index_buffer.size() % desc.num_elements == 0,
                    "index buffer of {} bytes does not divide into {} elements",
                    index_buffer.size(),
                    desc.num_elements
                );
                let bytes_per_index = index_buffer.size() / desc.num_elements;
                let Some(index_type) = IndexType::from_element_size(bytes_per_index) else {
                    panic!(
                        "index buffer of {} bytes cannot index {} elements",
                        index_buffer.size(),
                        desc.num_elements
                    );
                };
                (index_type, Some(record.raw))
            }
            None => (IndexType::None, None),
        };

        let instance_raw = match desc.instance_buffer {
            Some(instance_buffer) => match self.buffers.get(instance_buffer.key) {
                Some(record) => Some(record.raw),
                None => panic!("mesh instance buffer {:#x} is not alive", instance_buffer.identifier()),
            },
            None => None,
        };

        let layout_hash = hash_combine(
            hash_mesh_layout(desc.attributes),
            hash_mesh_layout(desc.instance_attributes),
        );
        let vertex_array = self.backend.create_vertex_array(&VertexArrayDesc {
            vertex_buffer: vertex_buffer_raw,
            attributes: desc.attributes,
            index_buffer: index_raw,
            instance_buffer: instance_raw,
            instance_attributes: desc.instance_attributes,
        });

        let pool = self.tag(pool);
        let key = self.meshes.insert(MeshRecord { vertex_array, pool });
        let mesh = MeshHandle::new(
            key,
            layout_hash,
            desc.vertex_buffer,
            desc.num_elements,
            desc.primitive_type,
            index_type,
            desc.index_buffer,
            desc.instance_count,
            desc.instance_buffer,
        );
        self.mesh_registry.insert(mesh);
        debug!(
            "Created mesh {:#x} ({} elements, layout {:#x})",
            mesh.identifier(),
            desc.num_elements,
            layout_hash
        );
        mesh
    }

    /// Looks up a live mesh by identifier, as stored in queued draws.
    pub fn mesh(&self, identifier: u64) -> Option<&MeshHandle> {
        self.mesh_registry.find(identifier)
    }

    /// Deletes the mesh's vertex array; its buffers are separate resources.
    pub fn delete_mesh(&mut self, mesh: &MeshHandle) {
        if !mesh.is_null() && !self.release_mesh(mesh.key) {
            warn!("Ignoring delete of stale mesh {:#x}", mesh.identifier());
        }
    }

    fn release_mesh(&mut self, key: Handle<MeshRecord>) -> bool {
        match self.meshes.remove(key) {
            Some(record) => {
                self.mesh_registry.remove_identifier(key.identifier());
                self.backend.delete_vertex_array(record.vertex_array);
                true
            }
            None => false,
        }
    }

    // ---- images and framebuffers ----

    pub fn create_image(
        &mut self,
        desc: &ImageDesc,
        data: Option<&[u8]>,
        pool: Option<ResourcePoolHandle>,
    ) -> ImageHandle {
        assert!(
            desc.width > 0 && desc.height > 0,
            "image dimensions must be non-zero"
        );
        if let Some(data) = data {
            assert_eq!(
                data.len(),
                desc.byte_size(),
                "image data does not match {}x{} {:?}",
                desc.width,
                desc.height,
                desc.format
            );
        }

        let pool = self.tag(pool);
        let raw = self.backend.create_image(desc, data);
        let key = self.images.insert(ImageRecord {
            raw,
            width: desc.width,
            height: desc.height,
            format: desc.format,
            interpolation: desc.interpolation,
            tiling: desc.tiling,
            pool,
        });
        debug!(
            "Created {}x{} {:?} image {}",
            desc.width, desc.height, desc.format, raw
        );
        ImageHandle::new(key, desc.format, desc.interpolation, desc.tiling)
    }

    /// Decodes an image file into an 8-bit image with the file's channel
    /// count.
    pub fn load_image(
        &mut self,
        path: impl AsRef<Path>,
        interpolation: ImageInterpolation,
        tiling: ImageTiling,
        pool: Option<ResourcePoolHandle>,
    ) -> Result<ImageHandle, RenderError> {
        let path = path.as_ref();
        let bytes = io::load_binary(path)?;
        let decoded = image::load_from_memory(&bytes).map_err(|err| {
            error!("Failed to decode image {:?}: {}", path, err);
            RenderError::Image(format!("{:?}: {}", path, err))
        })?;

        let (width, height) = (decoded.width(), decoded.height());
        let channels = decoded.color().channel_count();
        let Some(format) = ImageFormat::from_channel_count(channels) else {
            error!("Image {:?} has {} channels", path, channels);
            return Err(RenderError::UnsupportedImage(format!(
                "{:?} has {} channels",
                path, channels
            )));
        };
        let pixels = match format {
            ImageFormat::R8 => decoded.into_luma8().into_raw(),
            ImageFormat::RG8 => decoded.into_luma_alpha8().into_raw(),
            ImageFormat::RGB8 => decoded.into_rgb8().into_raw(),
            _ => decoded.into_rgba8().into_raw(),
        };

        let desc = ImageDesc::new(width, height, format).with_sampling(interpolation, tiling);
        info!("Loaded image {:?} ({}x{} {:?})", path, width, height, format);
        Ok(self.create_image(&desc, Some(&pixels), pool))
    }

    pub fn image_size(&self, image: &ImageHandle) -> Option<(u32, u32)> {
        self.images
            .get(image.key)
            .map(|record| (record.width, record.height))
    }

    pub fn resize_image(&mut self, image: &ImageHandle, width: u32, height: u32) -> bool {
        let Some(record) = self.images.get_mut(image.key) else {
            warn!("Ignoring resize of stale image {:#x}", image.identifier());
            return false;
        };
        record.width = width;
        record.height = height;
        let desc = ImageDesc::new(width, height, record.format)
            .with_sampling(record.interpolation, record.tiling);
        self.backend.resize_image(record.raw, &desc);
        true
    }

    pub fn delete_image(&mut self, image: &ImageHandle) {
        if !image.is_null() && !self.release_image(image.key) {
            warn!("Ignoring delete of stale image {:#x}", image.identifier());
        }
    }

    fn release_image(&mut self, key: Handle<ImageRecord>) -> bool {
        match self.images.remove(key) {
            Some(record) => {
                self.backend.delete_image(record.raw);
                true
            }
            None => false,
        }
    }

    /// Panics unless there is at least one attachment, all attachments share
    /// one size, and `depth` (if given) has a depth format.
    pub fn create_framebuffer(
        &mut self,
        color: &[ImageHandle],
        depth: Option<ImageHandle>,
        pool: Option<ResourcePoolHandle>,
    ) -> FramebufferHandle {
        assert!(
            !color.is_empty() || depth.is_some(),
            "framebuffer needs at least one attachment"
        );

        let mut size = None;
        let mut color_raw = Vec::with_capacity(color.len());
        for image in color {
            let Some(record) = self.images.get(image.key) else {
                panic!("color attachment {:#x} is not alive", image.identifier());
            };
            check_attachment_size(&mut size, record);
            color_raw.push(record.raw);
        }
        let depth_raw = match depth {
            Some(image) => {
                let Some(record) = self.images.get(image.key) else {
                    panic!("depth attachment {:#x} is not alive", image.identifier());
                };
                assert!(
                    record.format.is_depth(),
                    "depth attachment must use a depth format, got {:?}",
                    record.format
                );
                check_attachment_size(&mut size, record);
                Some(record.raw)
            }
            None => None,
        };

        let pool = self.tag(pool);
        let raw = self.backend.create_framebuffer(&color_raw, depth_raw);
        let key = self.framebuffers.insert(FramebufferRecord {
            raw,
            color: color.to_vec(),
            depth,
            pool,
        });
        debug!("Created framebuffer {} with {} color attachments", raw, color.len());
        FramebufferHandle { key }
    }

    pub fn framebuffer_attachments(
        &self,
        framebuffer: &FramebufferHandle,
    ) -> Option<(&[ImageHandle], Option<ImageHandle>)> {
        self.framebuffers
            .get(framebuffer.key)
            .map(|record| (record.color.as_slice(), record.depth))
    }

    /// Size of the depth attachment, or of the first color attachment.
    pub fn framebuffer_size(&self, framebuffer: &FramebufferHandle) -> Option<(u32, u32)> {
        let record = self.framebuffers.get(framebuffer.key)?;
        let image = record.depth.or_else(|| record.color.first().copied())?;
        self.image_size(&image)
    }

    /// Resizes every attachment of the framebuffer.
    pub fn resize_framebuffer(&mut self, framebuffer: &FramebufferHandle, width: u32, height: u32) -> bool {
        let Some(record) = self.framebuffers.get(framebuffer.key) else {
            warn!("Ignoring resize of stale framebuffer {:#x}", framebuffer.identifier());
            return false;
        };
        let attachments: Vec<ImageHandle> = record.color.iter().copied().chain(record.depth).collect();
        for image in &attachments {
            self.resize_image(image, width, height);
        }
        true
    }

    /// Deletes the framebuffer object; attachments stay alive.
    pub fn delete_framebuffer(&mut self, framebuffer: &FramebufferHandle) {
        if !framebuffer.is_null() && !self.release_framebuffer(framebuffer.key) {
            warn!("Ignoring delete of stale framebuffer {:#x}", framebuffer.identifier());
        }
    }

    fn release_framebuffer(&mut self, key: Handle<FramebufferRecord>) -> bool {
        match self.framebuffers.remove(key) {
            Some(record) => {
                self.backend.delete_framebuffer(record.raw);
                true
            }
            None => false,
        }
    }

    // ---- shaders ----

    /// Loads, compiles and caches a shader stage by path. The stage kind
    /// comes from the file name (`*.vert.*`, `*.frag.*`, `*.geom.*`, anything
    /// else is compute).
    pub fn fetch_shader_stage(&mut self, path: impl AsRef<Path>) -> Result<ShaderStageHandle, RenderError> {
        let path = path.as_ref();
        let name = path.to_string_lossy().into_owned();
        if let Some(&stage) = self.stage_cache.find(name.as_str()) {
            return Ok(stage);
        }

        let resolved = self.settings.shader_path(path);
        let source = if self.settings.expand_includes {
            io::load_with_includes(&resolved)?
        } else {
            io::load_text(&resolved)?
        };
        let file_name = path
            .file_name()
            .map(|file_name| file_name.to_string_lossy().into_owned())
            .unwrap_or_default();
        self.compile_stage(name, ShaderStage::from_file_name(&file_name), &source)
    }

    /// Same as [`fetch_shader_stage`](Self::fetch_shader_stage) for source
    /// that doesn't live on disk; `name` is the cache key.
    pub fn fetch_shader_stage_source(
        &mut self,
        name: &str,
        stage: ShaderStage,
        source: &str,
    ) -> Result<ShaderStageHandle, RenderError> {
        if let Some(&cached) = self.stage_cache.find(name) {
            return Ok(cached);
        }
        self.compile_stage(name.to_string(), stage, source)
    }

    fn compile_stage(
        &mut self,
        name: String,
        stage: ShaderStage,
        source: &str,
    ) -> Result<ShaderStageHandle, RenderError> {
        let raw = self.backend.compile_stage(stage, &name, source)?;
        let key = self.shader_stages.insert(ShaderStageRecord {
            raw,
            name: name.clone(),
            stage,
        });
        let handle = ShaderStageHandle::new(key, stage);
        debug!("Compiled {:?} stage {}", stage, name);
        self.stage_cache.insert(name, handle);
        Ok(handle)
    }

    /// Links (or returns the cached) program for `stages`.
    ///
    /// The cache key depends on stage order: `[vert, frag]` and
    /// `[frag, vert]` link two separate programs.
    pub fn fetch_shader(&mut self, stages: &[ShaderStageHandle]) -> Result<ShaderHandle, RenderError> {
        let identifiers: Vec<u64> = stages.iter().map(ShaderStageHandle::identifier).collect();
        let cache_key = hash_identifiers(&identifiers);
        if let Some(&shader) = self.shader_cache.find(&cache_key) {
            return Ok(shader);
        }

        let mut raw_stages = Vec::with_capacity(stages.len());
        for stage in stages {
            let Some(record) = self.shader_stages.get(stage.key) else {
                return Err(RenderError::ShaderLink(format!(
                    "shader stage {:#x} has been deleted",
                    stage.identifier()
                )));
            };
            raw_stages.push(record.raw);
        }

        let raw = self.backend.link_program(&raw_stages)?;
        let uniform_blocks = self
            .backend
            .uniform_blocks(raw)
            .into_iter()
            .map(|(semantic, info)| (semantic, Arc::new(info)))
            .collect();
        let key = self.shaders.insert(ShaderRecord {
            raw,
            cache_key,
            stages: stages.to_vec(),
            uniform_blocks,
        });
        let shader = ShaderHandle { key };
        self.shader_cache.insert(cache_key, shader);
        debug!("Linked program {} from {} stages", raw, stages.len());
        Ok(shader)
    }

    pub fn shader_stages_of(&self, shader: &ShaderHandle) -> Option<&[ShaderStageHandle]> {
        self.shaders
            .get(shader.key)
            .map(|record| record.stages.as_slice())
    }

    /// Reflected layout of one of the shader's uniform blocks.
    pub fn shader_uniform_info(
        &self,
        shader: &ShaderHandle,
        semantic: UniformBlockSemantics,
    ) -> Option<&UniformInfo> {
        self.shaders
            .get(shader.key)?
            .uniform_blocks
            .get(&semantic)
            .map(|info| info.as_ref())
    }

    pub fn delete_shader_stage(&mut self, stage: &ShaderStageHandle) {
        match self.shader_stages.remove(stage.key) {
            Some(record) => {
                debug!("Deleting {:?} stage {}", record.stage, record.name);
                self.stage_cache.remove(record.name.as_str());
                self.backend.delete_stage(record.raw);
            }
            None if stage.is_null() => {}
            None => warn!("Ignoring delete of stale shader stage {:#x}", stage.identifier()),
        }
    }

    pub fn delete_shader(&mut self, shader: &ShaderHandle) {
        match self.shaders.remove(shader.key) {
            Some(record) => {
                self.shader_cache.remove(&record.cache_key);
                self.backend.delete_program(record.raw);
            }
            None if shader.is_null() => {}
            None => warn!("Ignoring delete of stale shader {:#x}", shader.identifier()),
        }
    }

    // ---- materials and uniform blocks ----

    /// Allocates a zeroed material block sized from the shader's reflected
    /// material layout. Shaders without one still get a valid material that
    /// carries only image and buffer bindings.
    ///
    /// Panics if `shader` is not alive.
    pub fn create_material(
        &mut self,
        shader: &ShaderHandle,
        blend_mode: MaterialBlendMode,
        pool: Option<ResourcePoolHandle>,
    ) -> MaterialHandle {
        let block = self.create_uniform_buffer(shader, UniformBlockSemantics::Material, pool);
        MaterialHandle::new(block, *shader, blend_mode)
    }

    pub fn create_uniform_buffer(
        &mut self,
        shader: &ShaderHandle,
        semantic: UniformBlockSemantics,
        pool: Option<ResourcePoolHandle>,
    ) -> UniformBlockHandle {
        let Some(record) = self.shaders.get(shader.key) else {
            panic!("shader {:#x} is not known to this context", shader.identifier());
        };
        let info = record.uniform_blocks.get(&semantic).cloned();
        if info.is_none() {
            debug!(
                "Shader {:#x} declares no {:?} block",
                shader.identifier(),
                semantic
            );
        }

        let pool = self.tag(pool);
        let resources = UniformResources::new(info, semantic, pool);
        let (size, has_block) = (resources.size(), resources.has_uniform_block());
        let key = self.uniform_blocks.insert(resources);
        UniformBlockHandle::new(key, semantic, size, has_block)
    }

    pub fn uniform_block(&self, block: &impl AsUniformBlock) -> Option<&UniformResources> {
        self.uniform_blocks.get(block.as_uniform_block().key)
    }

    pub fn uniform_block_mut(&mut self, block: &impl AsUniformBlock) -> Option<&mut UniformResources> {
        self.uniform_blocks.get_mut(block.as_uniform_block().key)
    }

    /// Soft-fails (returns `false`) on a deleted block, a missing field or a
    /// type mismatch.
    pub fn set_uniform(
        &mut self,
        block: &impl AsUniformBlock,
        key: &str,
        value: impl Into<UniformValue>,
    ) -> bool {
        self.uniform_block_mut(block)
            .is_some_and(|resources| resources.set(key, value))
    }

    pub fn set_uniform_array(
        &mut self,
        block: &impl AsUniformBlock,
        key: &str,
        values: &[UniformValue],
    ) -> bool {
        self.uniform_block_mut(block)
            .is_some_and(|resources| resources.set_array(key, values))
    }

    pub fn set_image(&mut self, block: &impl AsUniformBlock, key: &str, image: ImageHandle) -> bool {
        self.uniform_block_mut(block)
            .is_some_and(|resources| resources.set_image(key, image))
    }

    pub fn set_storage_buffer(
        &mut self,
        block: &impl AsUniformBlock,
        binding: u32,
        buffer: BufferHandle,
    ) -> bool {
        self.uniform_block_mut(block)
            .is_some_and(|resources| resources.set_buffer(binding, buffer))
    }

    pub fn delete_material(&mut self, material: &MaterialHandle) {
        self.delete_uniform_buffer(&material.uniform_block());
    }

    pub fn delete_uniform_buffer(&mut self, block: &UniformBlockHandle) {
        if self.uniform_blocks.remove(block.key).is_none() && !block.is_null() {
            warn!("Ignoring delete of stale uniform block {:#x}", block.identifier());
        }
    }

    // ---- submission ----

    /// Submits a pass: binds its target, clears, uploads pass uniforms, then
    /// walks the draw queue switching program once per shader bucket and
    /// binding material state once per material bucket. Draws whose mesh,
    /// shader or material has been deleted are skipped and counted.
    pub fn draw_pass(&mut self, pass: &RenderPass, default_framebuffer: u32) -> PassStats {
        let mut stats = PassStats::default();

        let (target, width, height) = match pass.framebuffer() {
            Some(framebuffer) => match (
                self.framebuffers.get(framebuffer.key),
                self.framebuffer_size(&framebuffer),
            ) {
                (Some(record), Some((width, height))) => {
                    (RenderTarget::Framebuffer(record.raw), width, height)
                }
                _ => {
                    warn!(
                        "Pass framebuffer {:#x} is gone, drawing to the default target",
                        framebuffer.identifier()
                    );
                    (
                        RenderTarget::Default(default_framebuffer),
                        self.screen_width,
                        self.screen_height,
                    )
                }
            },
            None => (
                RenderTarget::Default(default_framebuffer),
                self.screen_width,
                self.screen_height,
            ),
        };

        let Self {
            backend,
            shaders,
            uniform_blocks,
            meshes,
            mesh_registry,
            images,
            buffers,
            ..
        } = self;

        backend.bind_target(target, width, height);
        backend.clear(pass.clear_flags, pass.clear_color, pass.clear_depth);

        if let Some(block) = pass.pass_uniforms() {
            match uniform_blocks.get(block.key) {
                Some(resources) if resources.has_uniform_block() => {
                    backend.upload_uniforms(UniformBlockSemantics::Pass, resources.cpu_buffer());
                }
                Some(_) => {}
                None => warn!("Pass uniform block {:#x} is gone", block.identifier()),
            }
        }

        for (_, shader_queue) in pass.draw_queue().iter() {
            for (shader, material_queue) in shader_queue.iter() {
                let pending: usize = material_queue.iter().map(|(_, draws)| draws.len()).sum();
                if pending == 0 {
                    continue;
                }
                let Some(program) = shaders.get(shader.key) else {
                    warn!("Skipping {} draws of deleted shader {:#x}", pending, shader.identifier());
                    stats.skipped_draws += pending;
                    continue;
                };
                backend.use_program(program.raw);
                stats.program_switches += 1;

                for (material, draws) in material_queue.iter() {
                    if draws.is_empty() {
                        continue;
                    }
                    let Some(resources) = uniform_blocks.get(material.uniform_block().key) else {
                        warn!(
                            "Skipping {} draws of deleted material {:#x}",
                            draws.len(),
                            material.identifier()
                        );
                        stats.skipped_draws += draws.len();
                        continue;
                    };
                    bind_material(backend, resources, material.blend_mode(), images, buffers);
                    stats.material_binds += 1;

                    for (_, draw) in draws.iter() {
                        let mesh = mesh_registry
                            .find(draw.mesh_identifier)
                            .and_then(|mesh| meshes.get(mesh.key).map(|record| (mesh, record)));
                        let Some((mesh, record)) = mesh else {
                            stats.skipped_draws += 1;
                            continue;
                        };

                        backend.bind_vertex_array(record.vertex_array);
                        backend.upload_push_constants(&draw.push_constants.unwrap_or_default());
                        let call = DrawCall {
                            vertex_array: record.vertex_array,
                            mesh_identifier: draw.mesh_identifier,
                            primitive: mesh.primitive_type(),
                            count: mesh.num_elements(),
                            index_type: mesh.index_type(),
                            instance_count: draw.instance_count,
                        };
                        backend.draw(&call);
                        stats.draw_calls += 1;
                        if call.is_instanced() {
                            stats.instanced_draws += 1;
                        }
                    }
                }
            }
        }

        backend.restore_default_state();
        if stats.skipped_draws > 0 {
            debug!("Pass skipped {} stale draws", stats.skipped_draws);
        }
        stats
    }

    /// Runs a compute dispatch with the material's program and bindings.
    pub fn dispatch_compute(&mut self, material: &MaterialHandle, x: u32, y: u32, z: u32) -> bool {
        let Some(program) = self.shaders.get(material.shader().key) else {
            warn!("Compute dispatch with deleted shader {:#x}", material.shader().identifier());
            return false;
        };
        let Some(resources) = self.uniform_blocks.get(material.uniform_block().key) else {
            warn!("Compute dispatch with deleted material {:#x}", material.identifier());
            return false;
        };
        self.backend.use_program(program.raw);
        bind_material(
            &mut self.backend,
            resources,
            material.blend_mode(),
            &self.images,
            &self.buffers,
        );
        self.backend.upload_push_constants(&PushConstants::default());
        self.backend.dispatch_compute(x, y, z);
        self.backend.restore_default_state();
        true
    }

    /// Deletes every resource still alive, in dependency order. Pools other
    /// than the default one are forgotten as well.
    pub fn release_all(&mut self) {
        let counts = self.live_resources();
        for (_, record) in self.framebuffers.drain() {
            self.backend.delete_framebuffer(record.raw);
        }
        for (_, record) in self.meshes.drain() {
            self.backend.delete_vertex_array(record.vertex_array);
        }
        self.mesh_registry = HandlePool::new();
        self.uniform_blocks.drain();
        for (_, record) in self.shaders.drain() {
            self.backend.delete_program(record.raw);
        }
        for (_, record) in self.shader_stages.drain() {
            self.backend.delete_stage(record.raw);
        }
        for (_, record) in self.images.drain() {
            self.backend.delete_image(record.raw);
        }
        for (_, record) in self.buffers.drain() {
            self.backend.delete_buffer(record.raw);
        }
        self.stage_cache.clear();
        self.shader_cache.clear();
        for (pool, _) in self.pools.drain() {
            if pool != self.default_pool.key {
                debug!("Forgetting resource pool {:#x}", pool.identifier());
            }
        }
        self.default_pool = ResourcePoolHandle {
            key: self.pools.insert(ResourcePool::default()),
        };
        debug!("Released {:?}", counts);
    }
}

impl<B: Backend> Drop for RenderingContext<B> {
    fn drop(&mut self) {
        self.release_all();
        info!("Rendering context destroyed");
    }
}

fn tagged<T>(
    cache: &AssetCache<T>,
    pool: ResourcePoolHandle,
    pool_of: impl Fn(&T) -> ResourcePoolHandle,
) -> Vec<Handle<T>> {
    cache
        .iter()
        .filter(|(_, record)| pool_of(record) == pool)
        .map(|(handle, _)| handle)
        .collect()
}

fn check_attachment_size(size: &mut Option<(u32, u32)>, image: &ImageRecord) {
    let dims = (image.width, image.height);
    match size {
        Some(expected) => assert_eq!(
            *expected, dims,
            "framebuffer attachments must all have the same size"
        ),
        None => *size = Some(dims),
    }
}

fn bind_material<B: Backend>(
    backend: &mut B,
    resources: &UniformResources,
    blend_mode: MaterialBlendMode,
    images: &AssetCache<ImageRecord>,
    buffers: &AssetCache<BufferRecord>,
) {
    backend.apply_blend_state(blend_mode.blend_state());
    if resources.has_uniform_block() {
        backend.upload_uniforms(resources.semantic(), resources.cpu_buffer());
    }
    for (unit, (name, image)) in resources.images().iter().enumerate() {
        match images.get(image.key) {
            Some(record) => backend.bind_image(unit as u32, name, record.raw),
            None => warn!("Material image {} ({:#x}) is gone", name, image.identifier()),
        }
    }
    for (&binding, buffer) in resources.storage_buffers().iter() {
        match buffers.get(buffer.key) {
            Some(record) => backend.bind_storage_buffer(binding, record.raw),
            None => warn!("Storage buffer at binding {} is gone", binding),
        }
    }
}
