// renderer/batch.rs
//! Four-level draw queue: mesh layout, then shader, then material, then an
//! ordered run of draws. Each level keeps its buckets in first-insertion
//! order so submission is deterministic and state changes are grouped.

use std::collections::{BTreeMap, HashMap};
use std::hash::Hash;

use super::handles::{MaterialHandle, ShaderHandle};
use super::uniforms::PushConstants;

/// One queued draw. The mesh is referenced by identifier and resolved by the
/// context at submission time.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DrawInfo {
    pub mesh_identifier: u64,
    pub instance_count: usize,
    pub push_constants: Option<PushConstants>,
}

/// Fetch-or-create bucket list. Keys stay in the order they were first seen.
#[derive(Debug, Clone)]
pub struct Buckets<K, Q> {
    keys: Vec<K>,
    queues: Vec<Q>,
    index: HashMap<K, usize>,
}

impl<K: Copy + Eq + Hash, Q: Default> Buckets<K, Q> {
    pub fn new() -> Self {
        Self {
            keys: Vec::new(),
            queues: Vec::new(),
            index: HashMap::new(),
        }
    }

    fn fetch(&mut self, key: K) -> (usize, &mut Q) {
        let position = match self.index.get(&key) {
            Some(&position) => position,
            None => {
                let position = self.keys.len();
                self.keys.push(key);
                self.queues.push(Q::default());
                self.index.insert(key, position);
                position
            }
        };
        (position, &mut self.queues[position])
    }

    fn queue_mut(&mut self, position: usize) -> Option<&mut Q> {
        self.queues.get_mut(position)
    }

    pub fn get(&self, key: &K) -> Option<&Q> {
        self.index.get(key).map(|&position| &self.queues[position])
    }

    pub fn len(&self) -> usize {
        self.keys.len()
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }

    pub fn keys(&self) -> &[K] {
        &self.keys
    }

    pub fn iter(&self) -> impl Iterator<Item = (&K, &Q)> {
        self.keys.iter().zip(self.queues.iter())
    }

    fn clear(&mut self) {
        self.keys.clear();
        self.queues.clear();
        self.index.clear();
    }
}

impl<K: Copy + Eq + Hash, Q: Default> Default for Buckets<K, Q> {
    fn default() -> Self {
        Self::new()
    }
}

/// Draws of one material, keyed by a slot counter that only grows, so
/// removing one draw never moves another.
#[derive(Debug, Clone, Default)]
pub struct MeshQueue {
    next_slot: usize,
    draws: BTreeMap<usize, DrawInfo>,
}

impl MeshQueue {
    fn push(&mut self, info: DrawInfo) -> usize {
        let slot = self.next_slot;
        self.next_slot += 1;
        self.draws.insert(slot, info);
        slot
    }

    pub fn get(&self, slot: usize) -> Option<&DrawInfo> {
        self.draws.get(&slot)
    }

    pub fn len(&self) -> usize {
        self.draws.len()
    }

    pub fn is_empty(&self) -> bool {
        self.draws.is_empty()
    }

    /// Draws in ascending slot order.
    pub fn iter(&self) -> impl Iterator<Item = (usize, &DrawInfo)> {
        self.draws.iter().map(|(&slot, info)| (slot, info))
    }
}

pub type MaterialQueue = Buckets<MaterialHandle, MeshQueue>;
pub type ShaderQueue = Buckets<ShaderHandle, MaterialQueue>;

/// Position of a queued draw, valid until that draw is removed or the queue
/// is emptied.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct RenderEntry {
    layout_index: usize,
    shader_index: usize,
    material_index: usize,
    mesh_index: usize,
    epoch: u64,
}

impl RenderEntry {
    pub const NULL: Self = Self {
        layout_index: usize::MAX,
        shader_index: usize::MAX,
        material_index: usize::MAX,
        mesh_index: usize::MAX,
        epoch: u64::MAX,
    };

    pub fn is_null(&self) -> bool {
        *self == Self::NULL
    }

    pub fn layout_index(&self) -> usize {
        self.layout_index
    }

    pub fn shader_index(&self) -> usize {
        self.shader_index
    }

    pub fn material_index(&self) -> usize {
        self.material_index
    }

    pub fn mesh_index(&self) -> usize {
        self.mesh_index
    }
}

impl Default for RenderEntry {
    fn default() -> Self {
        Self::NULL
    }
}

/// A draw as seen by flattened iteration.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct QueuedDraw {
    pub layout_hash: u64,
    pub shader: ShaderHandle,
    pub material: MaterialHandle,
    pub slot: usize,
    pub info: DrawInfo,
}

#[derive(Debug, Clone, Default)]
pub struct DrawQueue {
    layouts: Buckets<u64, ShaderQueue>,
    epoch: u64,
}

impl DrawQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(
        &mut self,
        layout_hash: u64,
        shader: ShaderHandle,
        material: MaterialHandle,
        info: DrawInfo,
    ) -> RenderEntry {
        let (layout_index, shaders) = self.layouts.fetch(layout_hash);
        let (shader_index, materials) = shaders.fetch(shader);
        let (material_index, meshes) = materials.fetch(material);
        let mesh_index = meshes.push(info);
        RenderEntry {
            layout_index,
            shader_index,
            material_index,
            mesh_index,
            epoch: self.epoch,
        }
    }

    fn mesh_queue_mut(&mut self, entry: &RenderEntry) -> Option<&mut MeshQueue> {
        if entry.epoch != self.epoch {
            return None;
        }
        self.layouts
            .queue_mut(entry.layout_index)?
            .queue_mut(entry.shader_index)?
            .queue_mut(entry.material_index)
    }

    /// Returns `false` for entries already removed or minted before the last
    /// [`clear`](Self::clear). Empty ancestor buckets are left in place.
    pub fn remove(&mut self, entry: &RenderEntry) -> bool {
        self.mesh_queue_mut(entry)
            .and_then(|meshes| meshes.draws.remove(&entry.mesh_index))
            .is_some()
    }

    pub fn draw_info_mut(&mut self, entry: &RenderEntry) -> Option<&mut DrawInfo> {
        self.mesh_queue_mut(entry)?.draws.get_mut(&entry.mesh_index)
    }

    pub fn clear(&mut self) {
        self.layouts.clear();
        self.epoch += 1;
    }

    pub fn layouts(&self) -> &Buckets<u64, ShaderQueue> {
        &self.layouts
    }

    pub fn iter(&self) -> impl Iterator<Item = (&u64, &ShaderQueue)> {
        self.layouts.iter()
    }

    /// Every queued draw in submission order: layout buckets, then shader
    /// buckets, then material buckets, each in first-insertion order, then
    /// draws by ascending slot.
    pub fn iter_draws(&self) -> impl Iterator<Item = QueuedDraw> + '_ {
        self.layouts.iter().flat_map(|(&layout_hash, shaders)| {
            shaders.iter().flat_map(move |(&shader, materials)| {
                materials.iter().flat_map(move |(&material, meshes)| {
                    meshes.iter().map(move |(slot, info)| QueuedDraw {
                        layout_hash,
                        shader,
                        material,
                        slot,
                        info: *info,
                    })
                })
            })
        })
    }

    pub fn draw_count(&self) -> usize {
        self.layouts
            .iter()
            .flat_map(|(_, shaders)| shaders.iter())
            .flat_map(|(_, materials)| materials.iter())
            .map(|(_, meshes)| meshes.len())
            .sum()
    }

    pub fn is_empty(&self) -> bool {
        self.draw_count() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn draw(mesh_identifier: u64) -> DrawInfo {
        DrawInfo {
            mesh_identifier,
            instance_count: 0,
            push_constants: None,
        }
    }

    #[test]
    fn slots_grow_monotonically_after_removal() {
        let mut queue = MeshQueue::default();
        let a = queue.push(draw(1));
        let b = queue.push(draw(2));
        queue.draws.remove(&a);
        let c = queue.push(draw(3));
        assert!(c > b);
        let order: Vec<u64> = queue.iter().map(|(_, d)| d.mesh_identifier).collect();
        assert_eq!(order, vec![2, 3]);
    }

    #[test]
    fn buckets_keep_first_seen_order() {
        let mut buckets: Buckets<u64, MeshQueue> = Buckets::new();
        buckets.fetch(30);
        buckets.fetch(10);
        let (position, _) = buckets.fetch(30);
        assert_eq!(position, 0);
        assert_eq!(buckets.keys(), &[30, 10]);
    }

    #[test]
    fn cleared_queue_rejects_old_entries() {
        let mut queue = DrawQueue::new();
        let entry = queue.insert(7, ShaderHandle::null(), MaterialHandle::null(), draw(1));
        queue.clear();
        let fresh = queue.insert(7, ShaderHandle::null(), MaterialHandle::null(), draw(2));
        assert_eq!(entry.mesh_index(), fresh.mesh_index());
        assert!(!queue.remove(&entry));
        assert_eq!(queue.draw_count(), 1);
        assert!(queue.remove(&fresh));
        assert!(!queue.remove(&fresh));
        assert!(queue.is_empty());
    }

    #[test]
    fn null_entry_is_rejected() {
        let mut queue = DrawQueue::new();
        queue.insert(1, ShaderHandle::null(), MaterialHandle::null(), draw(1));
        assert!(RenderEntry::default().is_null());
        assert!(!queue.remove(&RenderEntry::NULL));
    }
}
