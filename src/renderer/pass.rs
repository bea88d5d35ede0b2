// renderer/pass.rs
use bitflags::bitflags;
use glam::Vec4;
use serde::{Deserialize, Serialize};

use super::batch::{DrawInfo, DrawQueue, RenderEntry};
use super::handles::{FramebufferHandle, MaterialHandle, MeshHandle, UniformBlockHandle};
use super::uniforms::PushConstants;

bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
    pub struct ClearFlags: u32 {
        const COLOR = 1 << 0;
        const DEPTH = 1 << 1;
    }
}

impl Default for ClearFlags {
    fn default() -> Self {
        Self::COLOR | Self::DEPTH
    }
}

/// A target plus everything queued to draw into it.
///
/// Draws are only collected here; nothing reaches the backend until the pass
/// is handed to [`RenderingContext::draw_pass`](super::RenderingContext::draw_pass).
#[derive(Debug, Clone)]
pub struct RenderPass {
    draw_queue: DrawQueue,
    framebuffer: Option<FramebufferHandle>,
    pass_uniforms: Option<UniformBlockHandle>,
    pub clear_color: Vec4,
    pub clear_depth: f32,
    pub clear_flags: ClearFlags,
    modified: bool,
}

impl Default for RenderPass {
    fn default() -> Self {
        Self::new()
    }
}

impl RenderPass {
    pub fn new() -> Self {
        Self {
            draw_queue: DrawQueue::new(),
            framebuffer: None,
            pass_uniforms: None,
            clear_color: Vec4::ZERO,
            clear_depth: 1.0,
            clear_flags: ClearFlags::default(),
            modified: true,
        }
    }

    pub fn framebuffer(&self) -> Option<FramebufferHandle> {
        self.framebuffer
    }

    /// `None` draws into the context's default target.
    pub fn set_framebuffer(&mut self, framebuffer: Option<FramebufferHandle>) {
        self.framebuffer = framebuffer.filter(|fb| !fb.is_null());
        self.modified = true;
    }

    pub fn pass_uniforms(&self) -> Option<UniformBlockHandle> {
        self.pass_uniforms
    }

    pub fn set_pass_uniforms(&mut self, uniforms: Option<UniformBlockHandle>) {
        self.pass_uniforms = uniforms.filter(|block| !block.is_null());
        self.modified = true;
    }

    /// Queues `mesh` with `material`. An `instance_count` of zero issues a
    /// plain draw; push constants default to identity matrices when absent.
    pub fn add_to_draw_queue(
        &mut self,
        mesh: &MeshHandle,
        material: &MaterialHandle,
        push_constants: Option<PushConstants>,
        instance_count: usize,
    ) -> RenderEntry {
        self.modified = true;
        self.draw_queue.insert(
            mesh.layout_hash(),
            material.shader(),
            *material,
            DrawInfo {
                mesh_identifier: mesh.identifier(),
                instance_count,
                push_constants,
            },
        )
    }

    pub fn remove_from_draw_queue(&mut self, entry: &RenderEntry) -> bool {
        let removed = self.draw_queue.remove(entry);
        self.modified |= removed;
        removed
    }

    /// Replaces the push constants of a queued draw in place.
    pub fn set_push_constants(&mut self, entry: &RenderEntry, push_constants: PushConstants) -> bool {
        match self.draw_queue.draw_info_mut(entry) {
            Some(info) => {
                info.push_constants = Some(push_constants);
                self.modified = true;
                true
            }
            None => false,
        }
    }

    pub fn empty_queue(&mut self) {
        self.draw_queue.clear();
        self.modified = true;
    }

    pub fn draw_queue(&self) -> &DrawQueue {
        &self.draw_queue
    }

    pub fn is_modified(&self) -> bool {
        self.modified
    }

    pub fn mark_clean(&mut self) {
        self.modified = false;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_pass_clears_color_and_depth() {
        let pass = RenderPass::new();
        assert_eq!(pass.clear_flags, ClearFlags::COLOR | ClearFlags::DEPTH);
        assert_eq!(pass.clear_depth, 1.0);
        assert!(pass.framebuffer().is_none());
        assert!(pass.is_modified());
    }

    #[test]
    fn queue_mutations_mark_the_pass_modified() {
        let mut pass = RenderPass::new();
        pass.mark_clean();
        let entry = pass.add_to_draw_queue(&MeshHandle::null(), &MaterialHandle::null(), None, 0);
        assert!(pass.is_modified());

        pass.mark_clean();
        assert!(pass.set_push_constants(&entry, PushConstants::default()));
        assert!(pass.is_modified());

        pass.mark_clean();
        assert!(pass.remove_from_draw_queue(&entry));
        assert!(pass.is_modified());

        pass.mark_clean();
        assert!(!pass.remove_from_draw_queue(&entry));
        assert!(!pass.is_modified());
    }

    #[test]
    fn null_framebuffer_means_default_target() {
        let mut pass = RenderPass::new();
        pass.set_framebuffer(Some(FramebufferHandle::null()));
        assert!(pass.framebuffer().is_none());
    }
}
