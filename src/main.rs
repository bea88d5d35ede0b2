use std::path::PathBuf;

use glam::{Mat4, Vec3, Vec4};
use render_queue::renderer::{
    BufferMode, Dimensions, ElementType, ImageDesc, ImageFormat, MaterialBlendMode, MeshAttribute,
    MeshDesc, PushConstants, UniformBlockSemantics,
};
use render_queue::{ContextSettings, HeadlessBackend, RenderError, RenderPass, RenderingContext};

const QUAD_VERTICES: [f32; 16] = [
    // position    texcoord
    -0.5, -0.5, 0.0, 0.0, //
    0.5, -0.5, 1.0, 0.0, //
    0.5, 0.5, 1.0, 1.0, //
    -0.5, 0.5, 0.0, 1.0, //
];
const QUAD_INDICES: [u16; 6] = [0, 1, 2, 2, 3, 0];
const TRIANGLE_VERTICES: [f32; 12] = [
    -0.5, -0.5, 0.0, 0.0, //
    0.5, -0.5, 1.0, 0.0, //
    0.0, 0.5, 0.5, 1.0, //
];
const FRAMES: usize = 3;

fn run() -> Result<(), RenderError> {
    let mut settings = ContextSettings::load();
    if settings.shader_root.is_none() {
        settings.shader_root = Some(PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("assets/shaders"));
    }
    let default_framebuffer = settings.default_framebuffer;
    let mut context = RenderingContext::new(HeadlessBackend::new(), settings);

    let vertex = context.fetch_shader_stage("quad.vert.glsl")?;
    let fragment = context.fetch_shader_stage("quad.frag.glsl")?;
    let shader = context.fetch_shader(&[vertex, fragment])?;

    let scene_pool = context.create_resource_pool();
    let vertex_buffer = context.create_buffer(
        std::mem::size_of_val(&QUAD_VERTICES),
        Some(bytemuck::cast_slice(&QUAD_VERTICES)),
        BufferMode::Static,
        Some(scene_pool),
    );
    let index_buffer = context.create_buffer(
        std::mem::size_of_val(&QUAD_INDICES),
        Some(bytemuck::cast_slice(&QUAD_INDICES)),
        BufferMode::Static,
        Some(scene_pool),
    );
    let attributes = [
        MeshAttribute::new(0, Dimensions::Two, ElementType::F32),
        MeshAttribute::new(1, Dimensions::Two, ElementType::F32),
    ];
    let quad = context.create_mesh(
        &MeshDesc::new(QUAD_INDICES.len(), vertex_buffer, &attributes).with_indices(index_buffer),
        Some(scene_pool),
    );

    let overlay_pool = context.create_resource_pool();
    let triangle_buffer = context.create_buffer(
        std::mem::size_of_val(&TRIANGLE_VERTICES),
        Some(bytemuck::cast_slice(&TRIANGLE_VERTICES)),
        BufferMode::Static,
        Some(overlay_pool),
    );
    let triangle = context.create_mesh(
        &MeshDesc::new(3, triangle_buffer, &attributes),
        Some(overlay_pool),
    );

    let checker: Vec<u8> = (0..16u32)
        .flat_map(|i| if (i + i / 4) % 2 == 0 { [255, 255, 255, 255] } else { [40, 40, 40, 255] })
        .collect();
    let albedo = context.create_image(
        &ImageDesc::new(4, 4, ImageFormat::RGBA8),
        Some(&checker),
        Some(scene_pool),
    );

    let opaque = context.create_material(&shader, MaterialBlendMode::Opaque, Some(scene_pool));
    context.set_uniform(&opaque, "uColor", Vec4::new(1.0, 0.2, 0.2, 1.0));
    context.set_uniform(&opaque, "uIntensity", 1.0f32);
    context.set_image(&opaque, "uAlbedo", albedo);

    let glass = context.create_material(&shader, MaterialBlendMode::Alpha, Some(overlay_pool));
    context.set_uniform(&glass, "uColor", Vec4::new(0.2, 0.6, 1.0, 0.5));
    context.set_uniform(&glass, "uIntensity", 0.8f32);
    context.set_image(&glass, "uAlbedo", albedo);

    let pass_uniforms =
        context.create_uniform_buffer(&shader, UniformBlockSemantics::Pass, Some(scene_pool));
    let (width, height) = context.resolution();
    let projection = Mat4::orthographic_rh(
        -(width as f32) / height as f32,
        width as f32 / height as f32,
        -1.0,
        1.0,
        -1.0,
        1.0,
    );
    context.set_uniform(&pass_uniforms, "uViewProjection", projection);
    context.set_uniform(&pass_uniforms, "uTime", Vec4::ZERO);

    let mut pass = RenderPass::new();
    pass.clear_color = Vec4::new(0.05, 0.05, 0.08, 1.0);
    pass.set_pass_uniforms(Some(pass_uniforms));
    let entries: Vec<_> = (0..2)
        .map(|_| pass.add_to_draw_queue(&quad, &opaque, None, 0))
        .collect();
    let overlay = pass.add_to_draw_queue(&triangle, &glass, None, 0);

    for frame in 0..FRAMES {
        let time = frame as f32 / 60.0;
        context.set_uniform(&pass_uniforms, "uTime", Vec4::new(time, 0.0, 0.0, 0.0));
        for (i, entry) in entries.iter().enumerate() {
            let model = Mat4::from_translation(Vec3::new(i as f32 * 1.2 - 0.6, time.sin() * 0.25, 0.0));
            pass.set_push_constants(entry, PushConstants::from_model(model));
        }

        context.begin_frame();
        let stats = context.draw_pass(&pass, default_framebuffer);
        context.end_frame();
        pass.mark_clean();
        log::info!("Frame {}: {:?}", frame, stats);
    }

    match context.backend().commands_json() {
        Ok(json) => println!("{json}"),
        Err(err) => log::error!("Failed to serialize command log: {}", err),
    }

    pass.remove_from_draw_queue(&overlay);
    context.delete_resource_pool(overlay_pool);
    log::info!(
        "Resources after deleting the overlay pool: {:?} ({} backend objects)",
        context.live_resources(),
        context.backend().live_object_count()
    );

    context.begin_frame();
    let stats = context.draw_pass(&pass, default_framebuffer);
    context.end_frame();
    log::info!("Frame without overlay: {:?}", stats);

    context.delete_resource_pool(scene_pool);
    Ok(())
}

fn main() {
    render_queue::init_logging();
    if let Err(err) = run() {
        eprintln!("Application error: {err}");
        std::process::exit(1);
    }
}
