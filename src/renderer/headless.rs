// renderer/headless.rs
use std::collections::HashMap;

use glam::Vec4;
use log::{debug, error, warn};
use serde::Serialize;

use super::backend::{Backend, DrawCall, ImageDesc, RawId, RenderTarget, VertexArrayDesc};
use super::error::RenderError;
use super::handles::{BufferMode, ShaderStage};
use super::material::BlendState;
use super::pass::ClearFlags;
use super::reflect::{reflect_glsl, ShaderReflection};
use super::uniforms::{PushConstants, UniformBlockSemantics, UniformInfo};
use super::vertex::layout_stride;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum ObjectKind {
    Buffer,
    VertexArray,
    Image,
    Framebuffer,
    ShaderStage,
    Program,
}

/// Everything a pass asked the backend to do, in order.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum Command {
    BeginFrame,
    EndFrame,
    BindTarget {
        target: RenderTarget,
        width: u32,
        height: u32,
    },
    Clear {
        flags: ClearFlags,
        color: [f32; 4],
        depth: f32,
    },
    UploadUniforms {
        semantic: UniformBlockSemantics,
        bytes: Vec<u8>,
    },
    UseProgram {
        program: RawId,
    },
    ApplyBlendState {
        state: BlendState,
    },
    BindImage {
        unit: u32,
        name: String,
        image: RawId,
    },
    BindStorageBuffer {
        binding: u32,
        buffer: RawId,
    },
    BindVertexArray {
        vertex_array: RawId,
    },
    UploadPushConstants {
        constants: PushConstants,
    },
    Draw {
        call: DrawCall,
    },
    DispatchCompute {
        x: u32,
        y: u32,
        z: u32,
    },
    RestoreDefaultState,
}

struct StageObject {
    stage: ShaderStage,
    reflection: ShaderReflection,
}

/// Backend that talks to no GPU: it mints object names, reflects GLSL
/// sources, and records every command it receives.
pub struct HeadlessBackend {
    next_name: RawId,
    objects: HashMap<RawId, ObjectKind>,
    stages: HashMap<RawId, StageObject>,
    programs: HashMap<RawId, ShaderReflection>,
    images: HashMap<RawId, ImageDesc>,
    commands: Vec<Command>,
}

impl Default for HeadlessBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl HeadlessBackend {
    pub fn new() -> Self {
        Self {
            next_name: 1,
            objects: HashMap::new(),
            stages: HashMap::new(),
            programs: HashMap::new(),
            images: HashMap::new(),
            commands: Vec::new(),
        }
    }

    pub fn commands(&self) -> &[Command] {
        &self.commands
    }

    pub fn take_commands(&mut self) -> Vec<Command> {
        std::mem::take(&mut self.commands)
    }

    pub fn draw_calls(&self) -> Vec<DrawCall> {
        self.commands
            .iter()
            .filter_map(|command| match command {
                Command::Draw { call } => Some(*call),
                _ => None,
            })
            .collect()
    }

    pub fn commands_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(&self.commands)
    }

    pub fn live_objects(&self, kind: ObjectKind) -> usize {
        self.objects.values().filter(|&&k| k == kind).count()
    }

    pub fn live_object_count(&self) -> usize {
        self.objects.len()
    }

    pub fn image_desc(&self, image: RawId) -> Option<&ImageDesc> {
        self.images.get(&image)
    }

    /// Sampler names a linked program declares.
    pub fn program_images(&self, program: RawId) -> &[String] {
        self.programs
            .get(&program)
            .map(|reflection| reflection.images.as_slice())
            .unwrap_or(&[])
    }

    fn mint(&mut self, kind: ObjectKind) -> RawId {
        let name = self.next_name;
        self.next_name += 1;
        self.objects.insert(name, kind);
        name
    }

    fn release(&mut self, name: RawId, kind: ObjectKind) {
        match self.objects.get(&name) {
            Some(&live) if live == kind => {
                self.objects.remove(&name);
            }
            Some(&live) => warn!(
                "Refusing to delete object {} as {:?}, it is a {:?}",
                name, kind, live
            ),
            None => warn!("Deleting unknown {:?} object {}", kind, name),
        }
    }

    fn record(&mut self, command: Command) {
        self.commands.push(command);
    }
}

impl Backend for HeadlessBackend {
    fn create_buffer(&mut self, size: usize, _data: Option<&[u8]>, mode: BufferMode) -> RawId {
        let name = self.mint(ObjectKind::Buffer);
        debug!("Created {:?} buffer {} ({} bytes)", mode, name, size);
        name
    }

    fn delete_buffer(&mut self, buffer: RawId) {
        self.release(buffer, ObjectKind::Buffer);
    }

    fn create_vertex_array(&mut self, desc: &VertexArrayDesc<'_>) -> RawId {
        let name = self.mint(ObjectKind::VertexArray);
        debug!(
            "Created vertex array {} ({} vertex attributes, stride {}; {} instance attributes)",
            name,
            desc.attributes.len(),
            layout_stride(desc.attributes),
            desc.instance_attributes.len()
        );
        name
    }

    fn delete_vertex_array(&mut self, vertex_array: RawId) {
        self.release(vertex_array, ObjectKind::VertexArray);
    }

    fn create_image(&mut self, desc: &ImageDesc, _data: Option<&[u8]>) -> RawId {
        let name = self.mint(ObjectKind::Image);
        self.images.insert(name, *desc);
        name
    }

    fn resize_image(&mut self, image: RawId, desc: &ImageDesc) {
        match self.images.get_mut(&image) {
            Some(existing) => *existing = *desc,
            None => warn!("Resizing unknown image {}", image),
        }
    }

    fn delete_image(&mut self, image: RawId) {
        self.images.remove(&image);
        self.release(image, ObjectKind::Image);
    }

    fn create_framebuffer(&mut self, color: &[RawId], depth: Option<RawId>) -> RawId {
        let name = self.mint(ObjectKind::Framebuffer);
        debug!(
            "Created framebuffer {} ({} color attachments, depth: {})",
            name,
            color.len(),
            depth.is_some()
        );
        name
    }

    fn delete_framebuffer(&mut self, framebuffer: RawId) {
        self.release(framebuffer, ObjectKind::Framebuffer);
    }

    fn compile_stage(
        &mut self,
        stage: ShaderStage,
        name: &str,
        source: &str,
    ) -> Result<RawId, RenderError> {
        let reflection = reflect_glsl(stage, source).map_err(|message| {
            error!("Shader stage {} failed to compile: {}", name, message);
            RenderError::ShaderCompile {
                name: name.to_string(),
                message,
            }
        })?;
        let raw = self.mint(ObjectKind::ShaderStage);
        self.stages.insert(raw, StageObject { stage, reflection });
        Ok(raw)
    }

    fn delete_stage(&mut self, stage: RawId) {
        self.stages.remove(&stage);
        self.release(stage, ObjectKind::ShaderStage);
    }

    fn link_program(&mut self, stages: &[RawId]) -> Result<RawId, RenderError> {
        if stages.is_empty() {
            return Err(RenderError::ShaderLink("program has no stages".into()));
        }
        let mut reflections = Vec::with_capacity(stages.len());
        for raw in stages {
            match self.stages.get(raw) {
                Some(object) => reflections.push(&object.reflection),
                None => {
                    return Err(RenderError::ShaderLink(format!(
                        "stage {} is not a compiled shader stage",
                        raw
                    )))
                }
            }
        }
        let kinds: Vec<ShaderStage> = stages
            .iter()
            .filter_map(|raw| self.stages.get(raw).map(|object| object.stage))
            .collect();
        let linked = ShaderReflection::link(&reflections).map_err(|message| {
            error!("Program with stages {:?} failed to link: {}", kinds, message);
            RenderError::ShaderLink(message)
        })?;

        let raw = self.mint(ObjectKind::Program);
        self.programs.insert(raw, linked);
        Ok(raw)
    }

    fn delete_program(&mut self, program: RawId) {
        self.programs.remove(&program);
        self.release(program, ObjectKind::Program);
    }

    fn uniform_blocks(&self, program: RawId) -> HashMap<UniformBlockSemantics, UniformInfo> {
        self.programs
            .get(&program)
            .map(ShaderReflection::uniform_blocks)
            .unwrap_or_default()
    }

    fn begin_frame(&mut self) {
        self.record(Command::BeginFrame);
    }

    fn end_frame(&mut self) {
        self.record(Command::EndFrame);
    }

    fn bind_target(&mut self, target: RenderTarget, width: u32, height: u32) {
        self.record(Command::BindTarget {
            target,
            width,
            height,
        });
    }

    fn clear(&mut self, flags: ClearFlags, color: Vec4, depth: f32) {
        self.record(Command::Clear {
            flags,
            color: color.to_array(),
            depth,
        });
    }

    fn upload_uniforms(&mut self, semantic: UniformBlockSemantics, bytes: &[u8]) {
        self.record(Command::UploadUniforms {
            semantic,
            bytes: bytes.to_vec(),
        });
    }

    fn use_program(&mut self, program: RawId) {
        self.record(Command::UseProgram { program });
    }

    fn apply_blend_state(&mut self, state: BlendState) {
        self.record(Command::ApplyBlendState { state });
    }

    fn bind_image(&mut self, unit: u32, name: &str, image: RawId) {
        self.record(Command::BindImage {
            unit,
            name: name.to_string(),
            image,
        });
    }

    fn bind_storage_buffer(&mut self, binding: u32, buffer: RawId) {
        self.record(Command::BindStorageBuffer { binding, buffer });
    }

    fn bind_vertex_array(&mut self, vertex_array: RawId) {
        self.record(Command::BindVertexArray { vertex_array });
    }

    fn upload_push_constants(&mut self, constants: &PushConstants) {
        self.record(Command::UploadPushConstants {
            constants: *constants,
        });
    }

    fn draw(&mut self, call: &DrawCall) {
        self.record(Command::Draw { call: *call });
    }

    fn dispatch_compute(&mut self, x: u32, y: u32, z: u32) {
        self.record(Command::DispatchCompute { x, y, z });
    }

    fn restore_default_state(&mut self) {
        self.record(Command::RestoreDefaultState);
    }
}
