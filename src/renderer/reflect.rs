// renderer/reflect.rs
//! GLSL reflection on top of naga's GLSL frontend. The frontend runs the
//! preprocessor and lays `std140` blocks out; this module flattens the
//! resulting block structs into [`UniformInfo`] tables and collects the
//! sampled images each stage declares.

use std::collections::{BTreeMap, HashMap};

use log::debug;
use naga::front::glsl::{Frontend, Options};
use naga::{AddressSpace, ArraySize, Module, Scalar, ScalarKind, StructMember, TypeInner};

use super::handles::ShaderStage;
use super::uniforms::{UniformBlockSemantics, UniformField, UniformInfo, UniformType};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReflectedBlock {
    pub name: String,
    pub info: UniformInfo,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ShaderReflection {
    pub blocks: BTreeMap<u32, ReflectedBlock>,
    pub images: Vec<String>,
}

impl ShaderReflection {
    /// Blocks whose binding maps onto a semantic; other bindings are ignored.
    pub fn uniform_blocks(&self) -> HashMap<UniformBlockSemantics, UniformInfo> {
        let mut blocks = HashMap::new();
        for (&binding, block) in &self.blocks {
            match UniformBlockSemantics::from_binding(binding) {
                Some(semantic) => {
                    blocks.insert(semantic, block.info.clone());
                }
                None => debug!(
                    "Ignoring uniform block {} at binding {} (no matching semantic)",
                    block.name, binding
                ),
            }
        }
        blocks
    }

    /// Merges per-stage reflections into one program reflection. A binding
    /// declared by several stages must have the same layout in each.
    pub fn link(stages: &[&ShaderReflection]) -> Result<ShaderReflection, String> {
        let mut linked = ShaderReflection::default();
        for stage in stages {
            for (&binding, block) in &stage.blocks {
                match linked.blocks.get(&binding) {
                    Some(existing) if existing.info != block.info => {
                        return Err(format!(
                            "uniform block binding {} declared with different layouts ({} vs {})",
                            binding, existing.name, block.name
                        ));
                    }
                    Some(_) => {}
                    None => {
                        linked.blocks.insert(binding, block.clone());
                    }
                }
            }
            for image in &stage.images {
                if !linked.images.contains(image) {
                    linked.images.push(image.clone());
                }
            }
        }
        Ok(linked)
    }
}

const fn round_up(value: usize, alignment: usize) -> usize {
    (value + alignment - 1) / alignment * alignment
}

fn naga_stage(stage: ShaderStage) -> Result<naga::ShaderStage, String> {
    match stage {
        ShaderStage::Vertex => Ok(naga::ShaderStage::Vertex),
        ShaderStage::Fragment => Ok(naga::ShaderStage::Fragment),
        ShaderStage::Compute => Ok(naga::ShaderStage::Compute),
        ShaderStage::Geometry => Err("geometry stages cannot be reflected".to_string()),
    }
}

/// GLSL spelling of a block member type, `None` for opaque and aggregate types.
fn glsl_type_name(inner: &TypeInner) -> Option<String> {
    let prefix = |scalar: Scalar| match (scalar.kind, scalar.width) {
        (ScalarKind::Float, 4) => Some(""),
        (ScalarKind::Float, 8) => Some("d"),
        (ScalarKind::Sint, _) => Some("i"),
        (ScalarKind::Uint, _) => Some("u"),
        (ScalarKind::Bool, _) => Some("b"),
        _ => None,
    };
    match *inner {
        TypeInner::Scalar(scalar) => {
            let name = match (scalar.kind, scalar.width) {
                (ScalarKind::Float, 4) => "float",
                (ScalarKind::Float, 8) => "double",
                (ScalarKind::Sint, _) => "int",
                (ScalarKind::Uint, _) => "uint",
                (ScalarKind::Bool, _) => "bool",
                _ => return None,
            };
            Some(name.to_string())
        }
        TypeInner::Vector { size, scalar } => Some(format!("{}vec{}", prefix(scalar)?, size as u8)),
        TypeInner::Matrix {
            columns,
            rows,
            scalar,
        } if columns == rows => Some(format!("{}mat{}", prefix(scalar)?, columns as u8)),
        TypeInner::Matrix {
            columns,
            rows,
            scalar,
        } => Some(format!("{}mat{}x{}", prefix(scalar)?, columns as u8, rows as u8)),
        _ => None,
    }
}

/// Walks one block's struct type, emitting a field per leaf member. Nested
/// structs become `outer.inner`, arrays of structs `outer[i].inner`.
struct BlockFlattener<'a> {
    module: &'a Module,
    block: &'a str,
    fields: Vec<UniformField>,
}

impl BlockFlattener<'_> {
    fn members(&mut self, members: &[StructMember], base: usize, prefix: &str) -> Result<(), String> {
        for member in members {
            let name = member
                .name
                .as_deref()
                .ok_or_else(|| format!("unnamed member in uniform block `{}`", self.block))?;
            let path = if prefix.is_empty() {
                name.to_string()
            } else {
                format!("{prefix}.{name}")
            };
            self.member(member.ty, base + member.offset as usize, path)?;
        }
        Ok(())
    }

    fn member(&mut self, ty: naga::Handle<naga::Type>, offset: usize, path: String) -> Result<(), String> {
        let module = self.module;
        match &module.types[ty].inner {
            TypeInner::Struct { members, .. } => self.members(members, offset, &path),
            TypeInner::Array { base, size, stride } => {
                let count = match size {
                    ArraySize::Constant(count) => count.get(),
                    _ => {
                        return Err(format!(
                            "array `{}` in uniform block `{}` needs a constant size",
                            path, self.block
                        ))
                    }
                };
                let stride = *stride as usize;
                if let TypeInner::Struct { members, .. } = &module.types[*base].inner {
                    for i in 0..count as usize {
                        self.members(members, offset + i * stride, &format!("{path}[{i}]"))?;
                    }
                    return Ok(());
                }
                let ty = self.leaf_type(&module.types[*base].inner, &path)?;
                self.fields.push(UniformField {
                    name: path,
                    ty,
                    offset,
                    array_size: count,
                    array_stride: stride,
                });
                Ok(())
            }
            inner => {
                let ty = self.leaf_type(inner, &path)?;
                self.fields.push(UniformField {
                    name: path,
                    ty,
                    offset,
                    array_size: 1,
                    array_stride: ty.std140_size(),
                });
                Ok(())
            }
        }
    }

    fn leaf_type(&self, inner: &TypeInner, path: &str) -> Result<UniformType, String> {
        let name = glsl_type_name(inner);
        name.as_deref()
            .and_then(UniformType::from_glsl)
            .ok_or_else(|| {
                format!(
                    "unsupported type `{}` for `{}` in uniform block `{}`",
                    name.as_deref().unwrap_or("opaque"),
                    path,
                    self.block
                )
            })
    }
}

fn block_info(module: &Module, ty: naga::Handle<naga::Type>, block: &str) -> Result<UniformInfo, String> {
    let TypeInner::Struct { members, span } = &module.types[ty].inner else {
        return Err(format!("uniform `{}` is not a block", block));
    };
    let mut flattener = BlockFlattener {
        module,
        block,
        fields: Vec::with_capacity(members.len()),
    };
    flattener.members(members, 0, "")?;

    let mut info = UniformInfo::new(round_up(*span as usize, 16));
    for field in flattener.fields {
        let name = field.name.clone();
        if !info.push_field(field) {
            return Err(format!("member `{}` does not fit uniform block `{}`", name, block));
        }
    }
    Ok(info)
}

/// Parses one GLSL stage and reflects its uniform blocks and images.
/// `defines` are injected as if declared with `#define`.
pub fn reflect_glsl_with_defines(
    stage: ShaderStage,
    source: &str,
    defines: &[(&str, &str)],
) -> Result<ShaderReflection, String> {
    let mut options = Options::from(naga_stage(stage)?);
    for &(name, value) in defines {
        options.defines.insert(name.to_string(), value.to_string());
    }
    let module = Frontend::default().parse(&options, source).map_err(|errors| {
        errors
            .errors
            .iter()
            .map(|error| error.to_string())
            .collect::<Vec<_>>()
            .join("; ")
    })?;

    let mut reflection = ShaderReflection::default();
    for (_, global) in module.global_variables.iter() {
        let ty = &module.types[global.ty];
        match global.space {
            AddressSpace::Uniform => {
                let name = ty
                    .name
                    .clone()
                    .or_else(|| global.name.clone())
                    .unwrap_or_else(|| "<anonymous>".to_string());
                let Some(binding) = global.binding.as_ref().map(|b| b.binding) else {
                    debug!("Uniform block {} has no binding; skipped", name);
                    continue;
                };
                let info = block_info(&module, global.ty, &name)?;
                if let Some(existing) = reflection.blocks.get(&binding) {
                    return Err(format!(
                        "uniform blocks `{}` and `{}` share binding {}",
                        existing.name, name, binding
                    ));
                }
                reflection.blocks.insert(binding, ReflectedBlock { name, info });
            }
            AddressSpace::Handle if matches!(ty.inner, TypeInner::Image { .. }) => {
                if let Some(name) = &global.name {
                    reflection.images.push(name.clone());
                }
            }
            _ => {}
        }
    }
    Ok(reflection)
}

/// Reflects one GLSL stage with no extra defines.
pub fn reflect_glsl(stage: ShaderStage, source: &str) -> Result<ShaderReflection, String> {
    reflect_glsl_with_defines(stage, source, &[])
}

#[cfg(test)]
mod tests {
    use super::*;

    const MATERIAL: &str = r#"
        #version 450
        layout(location = 0) in vec2 vTexCoord;
        layout(location = 0) out vec4 fragColor;

        // material block
        layout(std140, binding = 2) uniform Material {
            vec3 uTint;
            float uAlpha;
            vec2 uOffset;
            float uWeights[3];
            mat3 uUvTransform;
            vec4 uColor;
        } material;

        layout(set = 1, binding = 0) uniform texture2D uAlbedo;
        layout(set = 1, binding = 1) uniform texture2D uNormal;
        layout(set = 1, binding = 2) uniform sampler uSampler;

        void main() {
            fragColor = texture(sampler2D(uAlbedo, uSampler), vTexCoord) * material.uColor;
        }
    "#;

    #[test]
    fn std140_offsets_match_the_rules() {
        let reflection = reflect_glsl(ShaderStage::Fragment, MATERIAL).unwrap();
        let block = &reflection.blocks[&2];
        assert_eq!(block.name, "Material");
        let info = &block.info;

        let offset = |name: &str| info.find(name).unwrap().offset;
        assert_eq!(offset("uTint"), 0);
        assert_eq!(offset("uAlpha"), 12);
        assert_eq!(offset("uOffset"), 16);
        assert_eq!(offset("uWeights"), 32);
        assert_eq!(info.find("uWeights").unwrap().array_stride, 16);
        assert_eq!(offset("uUvTransform"), 80);
        assert_eq!(offset("uColor"), 128);
        assert_eq!(info.buffer_size(), 144);
        assert_eq!(reflection.images, vec!["uAlbedo".to_string(), "uNormal".to_string()]);
    }

    #[test]
    fn preprocessor_and_nested_structs_are_honoured() {
        let source = r#"
            #version 450
            #define COUNT 4
            struct Light {
                vec3 position;
                float radius;
            };
            #ifdef SKINNED
            layout(std140, binding = 2) uniform MaterialA { mat4 uBones[COUNT]; } material;
            #else
            layout(std140, binding = 2) uniform MaterialB { vec4 uColors[COUNT]; } material;
            #endif
            layout(std140, binding = 1) uniform Pass {
                Light uSun;
                Light uLamps[2];
            } pass;
            void main() {}
        "#;

        let plain = reflect_glsl(ShaderStage::Fragment, source).unwrap();
        let material = &plain.blocks[&2];
        assert_eq!(material.name, "MaterialB");
        assert_eq!(material.info.find("uColors").unwrap().array_size, 4);
        assert_eq!(material.info.buffer_size(), 64);

        let pass = &plain.blocks[&1].info;
        assert_eq!(pass.find("uSun.position").unwrap().offset, 0);
        assert_eq!(pass.find("uSun.radius").unwrap().offset, 12);
        assert_eq!(pass.find("uLamps[1].position").unwrap().offset, 32);
        assert_eq!(pass.find("uLamps[1].radius").unwrap().ty, UniformType::Float);
        assert_eq!(pass.buffer_size(), 48);

        let skinned =
            reflect_glsl_with_defines(ShaderStage::Fragment, source, &[("SKINNED", "1")]).unwrap();
        assert_eq!(skinned.blocks[&2].name, "MaterialA");
        assert_eq!(skinned.blocks[&2].info.buffer_size(), 256);
    }

    #[test]
    fn semantics_follow_bindings() {
        let source = r#"
            #version 450
            layout(std140, binding = 1) uniform Pass { mat4 uViewProj; };
            layout(std140, binding = 5) uniform Extra { float uUnused; };
            void main() {}
        "#;
        let blocks = reflect_glsl(ShaderStage::Vertex, source).unwrap().uniform_blocks();
        assert_eq!(blocks.len(), 1);
        assert_eq!(blocks[&UniformBlockSemantics::Pass].buffer_size(), 64);
    }

    #[test]
    fn unknown_member_type_is_an_error() {
        let source = r#"
            #version 450
            layout(std140, binding = 2) uniform Material { dvec3 uBad; };
            void main() {}
        "#;
        let err = reflect_glsl(ShaderStage::Fragment, source).unwrap_err();
        assert!(err.contains("dvec3"));
    }

    #[test]
    fn syntax_errors_and_geometry_stages_fail() {
        let unterminated = "#version 450\nlayout(std140, binding = 2) uniform Material { vec4 uColor;";
        assert!(reflect_glsl(ShaderStage::Fragment, unterminated).is_err());
        assert!(reflect_glsl(ShaderStage::Geometry, "#version 450\nvoid main() {}").is_err());
    }

    #[test]
    fn linking_rejects_conflicting_layouts() {
        let stage = |body: &str| {
            let source = format!("#version 450\n{body}\nvoid main() {{}}\n");
            reflect_glsl(ShaderStage::Vertex, &source).unwrap()
        };
        let vert = stage("layout(std140, binding = 1) uniform Pass { mat4 uViewProj; };");
        let frag = stage("layout(std140, binding = 1) uniform Pass { vec4 uTime; };");
        let same = vert.clone();
        assert!(ShaderReflection::link(&[&vert, &frag]).is_err());
        let linked = ShaderReflection::link(&[&vert, &same]).unwrap();
        assert_eq!(linked.blocks.len(), 1);
    }
}
