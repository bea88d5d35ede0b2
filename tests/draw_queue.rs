use render_queue::renderer::{
    BufferMode, Dimensions, ElementType, MaterialBlendMode, MaterialHandle, MeshAttribute, MeshDesc,
    MeshHandle, PushConstants, ShaderStage,
};
use render_queue::{ContextSettings, HeadlessBackend, RenderPass, RenderingContext};

const VERT: &str = r#"
    #version 450
    layout(std140, binding = 1) uniform Pass { mat4 uViewProjection; } pass;
    layout(location = 0) in vec3 aPosition;
    void main() { gl_Position = pass.uViewProjection * vec4(aPosition, 1.0); }
"#;
const FRAG_A: &str = r#"
    #version 450
    layout(std140, binding = 2) uniform Material { vec4 uColor; } material;
    layout(location = 0) out vec4 fragColor;
    void main() { fragColor = material.uColor; }
"#;
const FRAG_B: &str = r#"
    #version 450
    layout(std140, binding = 2) uniform Material { float uRoughness; } material;
    layout(location = 0) out vec4 fragColor;
    void main() { fragColor = vec4(material.uRoughness); }
"#;

struct Scene {
    context: RenderingContext<HeadlessBackend>,
    meshes: Vec<MeshHandle>,
    materials: Vec<MaterialHandle>,
}

/// Two vertex layouts, two shaders, three materials.
fn scene() -> Scene {
    let mut context = RenderingContext::new(HeadlessBackend::new(), ContextSettings::default());
    let vert = context
        .fetch_shader_stage_source("vert", ShaderStage::Vertex, VERT)
        .unwrap();
    let frag_a = context
        .fetch_shader_stage_source("a", ShaderStage::Fragment, FRAG_A)
        .unwrap();
    let frag_b = context
        .fetch_shader_stage_source("b", ShaderStage::Fragment, FRAG_B)
        .unwrap();
    let shader_a = context.fetch_shader(&[vert, frag_a]).unwrap();
    let shader_b = context.fetch_shader(&[vert, frag_b]).unwrap();

    let positions = [MeshAttribute::new(0, Dimensions::Three, ElementType::F32)];
    let skinned = [
        MeshAttribute::new(0, Dimensions::Three, ElementType::F32),
        MeshAttribute::new(1, Dimensions::Four, ElementType::U8),
    ];
    let buffer = context.create_buffer(96, None, BufferMode::Static, None);
    let meshes = vec![
        context.create_mesh(&MeshDesc::new(3, buffer, &positions), None),
        context.create_mesh(&MeshDesc::new(3, buffer, &skinned), None),
        context.create_mesh(&MeshDesc::new(6, buffer, &positions), None),
    ];
    let materials = vec![
        context.create_material(&shader_a, MaterialBlendMode::Opaque, None),
        context.create_material(&shader_b, MaterialBlendMode::Opaque, None),
        context.create_material(&shader_a, MaterialBlendMode::Additive, None),
    ];
    Scene {
        context,
        meshes,
        materials,
    }
}

fn queue(scene: &Scene, pass: &mut RenderPass, order: &[(usize, usize)]) {
    for (i, &(mesh, material)) in order.iter().enumerate() {
        let mut push = PushConstants::default();
        push.extra_data[0][0] = i as f32;
        pass.add_to_draw_queue(&scene.meshes[mesh], &scene.materials[material], Some(push), 0);
    }
}

fn tags(pass: &RenderPass) -> Vec<usize> {
    pass.draw_queue()
        .iter_draws()
        .map(|draw| draw.info.push_constants.map_or(usize::MAX, |pc| pc.extra_data[0][0] as usize))
        .collect()
}

#[test]
fn iteration_groups_layout_then_shader_then_material() {
    let scene = scene();
    let mut pass = RenderPass::new();
    queue(
        &scene,
        &mut pass,
        &[(0, 0), (1, 1), (2, 2), (0, 1), (2, 0), (1, 0)],
    );

    // layouts: positions first, then skinned
    // positions / shader a: material 0 (draws 0, 4), material 2 (draw 2)
    // positions / shader b: material 1 (draw 3)
    // skinned / shader b: material 1 (draw 1); skinned / shader a: material 0 (draw 5)
    assert_eq!(tags(&pass), vec![0, 4, 2, 3, 1, 5]);
    assert_eq!(pass.draw_queue().layouts().len(), 2);
    assert_eq!(pass.draw_queue().draw_count(), 6);
}

#[test]
fn identical_insertions_iterate_identically() {
    let scene = scene();
    let order = [(2, 1), (0, 2), (1, 0), (0, 0), (2, 1)];
    let mut first = RenderPass::new();
    let mut second = RenderPass::new();
    queue(&scene, &mut first, &order);
    queue(&scene, &mut second, &order);
    assert_eq!(tags(&first), tags(&second));

    let a: Vec<_> = first.draw_queue().iter_draws().map(|d| (d.layout_hash, d.material, d.slot)).collect();
    let b: Vec<_> = second.draw_queue().iter_draws().map(|d| (d.layout_hash, d.material, d.slot)).collect();
    assert_eq!(a, b);
}

#[test]
fn removal_keeps_other_entries_valid() {
    let scene = scene();
    let mut pass = RenderPass::new();
    let entries: Vec<_> = (0..4)
        .map(|i| {
            let mut push = PushConstants::default();
            push.extra_data[0][0] = i as f32;
            pass.add_to_draw_queue(&scene.meshes[0], &scene.materials[0], Some(push), 0)
        })
        .collect();

    assert!(pass.remove_from_draw_queue(&entries[1]));
    assert!(!pass.remove_from_draw_queue(&entries[1]));
    assert_eq!(tags(&pass), vec![0, 2, 3]);

    let mut replacement = PushConstants::default();
    replacement.extra_data[0][0] = 9.0;
    assert!(pass.set_push_constants(&entries[3], replacement));
    assert!(!pass.set_push_constants(&entries[1], replacement));
    assert_eq!(tags(&pass), vec![0, 2, 9]);

    let later = pass.add_to_draw_queue(&scene.meshes[0], &scene.materials[0], None, 0);
    assert!(later.mesh_index() > entries[3].mesh_index());
    assert_eq!(pass.draw_queue().draw_count(), 4);
}

#[test]
fn entries_from_before_a_clear_are_rejected() {
    let scene = scene();
    let mut pass = RenderPass::new();
    let old = pass.add_to_draw_queue(&scene.meshes[0], &scene.materials[0], None, 0);
    pass.empty_queue();
    assert!(pass.draw_queue().is_empty());

    let fresh = pass.add_to_draw_queue(&scene.meshes[0], &scene.materials[0], None, 0);
    assert_eq!(
        (old.layout_index(), old.shader_index(), old.material_index(), old.mesh_index()),
        (fresh.layout_index(), fresh.shader_index(), fresh.material_index(), fresh.mesh_index())
    );
    assert!(!pass.remove_from_draw_queue(&old));
    assert_eq!(pass.draw_queue().draw_count(), 1);
    assert!(pass.remove_from_draw_queue(&fresh));
}

#[test]
fn submission_follows_queue_order() {
    let mut scene = scene();
    let mut pass = RenderPass::new();
    queue(&scene, &mut pass, &[(1, 0), (0, 0), (0, 1)]);
    let expected: Vec<u64> = pass
        .draw_queue()
        .iter_draws()
        .map(|draw| draw.info.mesh_identifier)
        .collect();

    let stats = scene.context.draw_pass(&pass, 0);
    assert_eq!(stats.draw_calls, 3);
    let submitted: Vec<u64> = scene
        .context
        .backend()
        .draw_calls()
        .iter()
        .map(|call| call.mesh_identifier)
        .collect();
    assert_eq!(submitted, expected);
    assert_eq!(
        expected,
        vec![
            scene.meshes[1].identifier(),
            scene.meshes[0].identifier(),
            scene.meshes[0].identifier()
        ]
    );
}

#[test]
fn modified_flag_tracks_queue_changes() {
    let scene = scene();
    let mut pass = RenderPass::new();
    assert!(pass.is_modified());
    pass.mark_clean();
    let entry = pass.add_to_draw_queue(&scene.meshes[0], &scene.materials[0], None, 0);
    assert!(pass.is_modified());
    pass.mark_clean();
    assert!(!pass.remove_from_draw_queue(&render_queue::renderer::RenderEntry::NULL));
    assert!(!pass.is_modified());
    assert!(pass.remove_from_draw_queue(&entry));
    assert!(pass.is_modified());
}
