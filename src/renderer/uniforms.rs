// renderer/uniforms.rs
use std::collections::HashMap;

use bytemuck::{Pod, Zeroable};
use glam::{BVec2, BVec3, BVec4, IVec2, IVec3, IVec4, Mat2, Mat3, Mat4, UVec2, UVec3, UVec4, Vec2, Vec3, Vec4};
use serde::{Deserialize, Serialize};

/// Which of the three binding tiers a uniform block belongs to. The numeric
/// value is also the block's binding index in shader source.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum UniformBlockSemantics {
    PushConstants = 0,
    Pass = 1,
    Material = 2,
}

impl UniformBlockSemantics {
    pub const ALL: [Self; 3] = [Self::PushConstants, Self::Pass, Self::Material];

    pub const fn from_binding(binding: u32) -> Option<Self> {
        match binding {
            0 => Some(Self::PushConstants),
            1 => Some(Self::Pass),
            2 => Some(Self::Material),
            _ => None,
        }
    }

    pub const fn binding(self) -> u32 {
        self as u32
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum UniformType {
    Float,
    Vec2,
    Vec3,
    Vec4,
    Int,
    IVec2,
    IVec3,
    IVec4,
    UInt,
    UVec2,
    UVec3,
    UVec4,
    Bool,
    BVec2,
    BVec3,
    BVec4,
    Mat2,
    Mat3,
    Mat4,
    Image,
}

impl UniformType {
    pub fn from_glsl(name: &str) -> Option<Self> {
        let ty = match name {
            "float" => Self::Float,
            "vec2" => Self::Vec2,
            "vec3" => Self::Vec3,
            "vec4" => Self::Vec4,
            "int" => Self::Int,
            "ivec2" => Self::IVec2,
            "ivec3" => Self::IVec3,
            "ivec4" => Self::IVec4,
            "uint" => Self::UInt,
            "uvec2" => Self::UVec2,
            "uvec3" => Self::UVec3,
            "uvec4" => Self::UVec4,
            "bool" => Self::Bool,
            "bvec2" => Self::BVec2,
            "bvec3" => Self::BVec3,
            "bvec4" => Self::BVec4,
            "mat2" | "mat2x2" => Self::Mat2,
            "mat3" | "mat3x3" => Self::Mat3,
            "mat4" | "mat4x4" => Self::Mat4,
            _ => return None,
        };
        Some(ty)
    }

    /// Components per column (matrices) or per value (everything else).
    pub const fn components(self) -> usize {
        match self {
            Self::Float | Self::Int | Self::UInt | Self::Bool => 1,
            Self::Vec2 | Self::IVec2 | Self::UVec2 | Self::BVec2 | Self::Mat2 => 2,
            Self::Vec3 | Self::IVec3 | Self::UVec3 | Self::BVec3 | Self::Mat3 => 3,
            Self::Vec4 | Self::IVec4 | Self::UVec4 | Self::BVec4 | Self::Mat4 => 4,
            Self::Image => 0,
        }
    }

    pub const fn columns(self) -> usize {
        match self {
            Self::Mat2 => 2,
            Self::Mat3 => 3,
            Self::Mat4 => 4,
            Self::Image => 0,
            _ => 1,
        }
    }

    pub const fn is_matrix(self) -> bool {
        matches!(self, Self::Mat2 | Self::Mat3 | Self::Mat4)
    }

    /// std140 base alignment in bytes.
    pub const fn std140_alignment(self) -> usize {
        if self.is_matrix() {
            return 16;
        }
        match self.components() {
            0 | 1 => 4,
            2 => 8,
            _ => 16,
        }
    }

    /// std140 size of a single value, including matrix column padding.
    pub const fn std140_size(self) -> usize {
        if self.is_matrix() {
            16 * self.columns()
        } else {
            4 * self.components()
        }
    }
}

/// One member of a reflected uniform block.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UniformField {
    pub name: String,
    pub ty: UniformType,
    pub offset: usize,
    pub array_size: u32,
    pub array_stride: usize,
}

impl UniformField {
    /// Bytes covered by the field inside the block.
    pub fn byte_span(&self) -> usize {
        if self.array_size <= 1 {
            self.ty.std140_size()
        } else {
            self.array_stride * (self.array_size as usize - 1) + self.ty.std140_size()
        }
    }
}

/// Layout of one uniform block as reported by shader reflection.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UniformInfo {
    fields: Vec<UniformField>,
    name_to_field: HashMap<String, usize>,
    buffer_size: usize,
}

impl UniformInfo {
    pub fn new(buffer_size: usize) -> Self {
        Self {
            fields: Vec::new(),
            name_to_field: HashMap::new(),
            buffer_size,
        }
    }

    /// Returns `false` if the name is taken or the field would overrun the
    /// block; the field is not added in either case.
    pub fn push_field(&mut self, field: UniformField) -> bool {
        if self.name_to_field.contains_key(&field.name)
            || field.offset + field.byte_span() > self.buffer_size
        {
            return false;
        }
        self.name_to_field.insert(field.name.clone(), self.fields.len());
        self.fields.push(field);
        true
    }

    pub fn find(&self, name: &str) -> Option<&UniformField> {
        self.name_to_field.get(name).map(|&i| &self.fields[i])
    }

    pub fn fields(&self) -> &[UniformField] {
        &self.fields
    }

    pub fn buffer_size(&self) -> usize {
        self.buffer_size
    }
}

/// A typed value written into a uniform block mirror.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum UniformValue {
    Float(f32),
    Vec2(Vec2),
    Vec3(Vec3),
    Vec4(Vec4),
    Int(i32),
    IVec2(IVec2),
    IVec3(IVec3),
    IVec4(IVec4),
    UInt(u32),
    UVec2(UVec2),
    UVec3(UVec3),
    UVec4(UVec4),
    Bool(bool),
    BVec2(BVec2),
    BVec3(BVec3),
    BVec4(BVec4),
    Mat2(Mat2),
    Mat3(Mat3),
    Mat4(Mat4),
}

impl UniformValue {
    pub const fn uniform_type(&self) -> UniformType {
        match self {
            Self::Float(_) => UniformType::Float,
            Self::Vec2(_) => UniformType::Vec2,
            Self::Vec3(_) => UniformType::Vec3,
            Self::Vec4(_) => UniformType::Vec4,
            Self::Int(_) => UniformType::Int,
            Self::IVec2(_) => UniformType::IVec2,
            Self::IVec3(_) => UniformType::IVec3,
            Self::IVec4(_) => UniformType::IVec4,
            Self::UInt(_) => UniformType::UInt,
            Self::UVec2(_) => UniformType::UVec2,
            Self::UVec3(_) => UniformType::UVec3,
            Self::UVec4(_) => UniformType::UVec4,
            Self::Bool(_) => UniformType::Bool,
            Self::BVec2(_) => UniformType::BVec2,
            Self::BVec3(_) => UniformType::BVec3,
            Self::BVec4(_) => UniformType::BVec4,
            Self::Mat2(_) => UniformType::Mat2,
            Self::Mat3(_) => UniformType::Mat3,
            Self::Mat4(_) => UniformType::Mat4,
        }
    }

    /// Writes the std140 representation at the start of `dst`. Matrix
    /// columns land 16 bytes apart and bools become 32-bit 0/1.
    pub(crate) fn write_std140(&self, dst: &mut [u8]) {
        match *self {
            Self::Float(v) => put(dst, 0, &[v]),
            Self::Vec2(v) => put(dst, 0, &v.to_array()),
            Self::Vec3(v) => put(dst, 0, &v.to_array()),
            Self::Vec4(v) => put(dst, 0, &v.to_array()),
            Self::Int(v) => put(dst, 0, &[v]),
            Self::IVec2(v) => put(dst, 0, &v.to_array()),
            Self::IVec3(v) => put(dst, 0, &v.to_array()),
            Self::IVec4(v) => put(dst, 0, &v.to_array()),
            Self::UInt(v) => put(dst, 0, &[v]),
            Self::UVec2(v) => put(dst, 0, &v.to_array()),
            Self::UVec3(v) => put(dst, 0, &v.to_array()),
            Self::UVec4(v) => put(dst, 0, &v.to_array()),
            Self::Bool(b) => put(dst, 0, &[u32::from(b)]),
            Self::BVec2(b) => put(dst, 0, &[u32::from(b.x), u32::from(b.y)]),
            Self::BVec3(b) => put(dst, 0, &[u32::from(b.x), u32::from(b.y), u32::from(b.z)]),
            Self::BVec4(b) => put(
                dst,
                0,
                &[u32::from(b.x), u32::from(b.y), u32::from(b.z), u32::from(b.w)],
            ),
            Self::Mat2(m) => {
                for (i, column) in m.to_cols_array_2d().iter().enumerate() {
                    put(dst, i * 16, column);
                }
            }
            Self::Mat3(m) => {
                for (i, column) in m.to_cols_array_2d().iter().enumerate() {
                    put(dst, i * 16, column);
                }
            }
            Self::Mat4(m) => put(dst, 0, &m.to_cols_array()),
        }
    }
}

fn put<T: Pod>(dst: &mut [u8], offset: usize, values: &[T]) {
    let bytes: &[u8] = bytemuck::cast_slice(values);
    dst[offset..offset + bytes.len()].copy_from_slice(bytes);
}

macro_rules! uniform_value_from {
    ($($source:ty => $variant:ident),* $(,)?) => {
        $(
            impl From<$source> for UniformValue {
                fn from(value: $source) -> Self {
                    UniformValue::$variant(value)
                }
            }
        )*
    };
}

uniform_value_from! {
    f32 => Float,
    Vec2 => Vec2,
    Vec3 => Vec3,
    Vec4 => Vec4,
    i32 => Int,
    IVec2 => IVec2,
    IVec3 => IVec3,
    IVec4 => IVec4,
    u32 => UInt,
    UVec2 => UVec2,
    UVec3 => UVec3,
    UVec4 => UVec4,
    bool => Bool,
    BVec2 => BVec2,
    BVec3 => BVec3,
    BVec4 => BVec4,
    Mat2 => Mat2,
    Mat3 => Mat3,
    Mat4 => Mat4,
}

/// Per-draw payload uploaded right before every draw call.
#[repr(C)]
#[derive(Clone, Copy, Pod, Zeroable, PartialEq, Debug, Serialize)]
pub struct PushConstants {
    pub model_matrix: [[f32; 4]; 4],
    pub extra_data: [[f32; 4]; 4],
}

impl PushConstants {
    pub fn new(model_matrix: Mat4, extra_data: Mat4) -> Self {
        Self {
            model_matrix: model_matrix.to_cols_array_2d(),
            extra_data: extra_data.to_cols_array_2d(),
        }
    }

    pub fn from_model(model_matrix: Mat4) -> Self {
        Self::new(model_matrix, Mat4::IDENTITY)
    }

    pub fn model(&self) -> Mat4 {
        Mat4::from_cols_array_2d(&self.model_matrix)
    }
}

impl Default for PushConstants {
    fn default() -> Self {
        Self::new(Mat4::IDENTITY, Mat4::IDENTITY)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn push_constants_are_two_mat4() {
        assert_eq!(std::mem::size_of::<PushConstants>(), 128);
        let pc = PushConstants::default();
        assert_eq!(pc.model(), Mat4::IDENTITY);
    }

    #[test]
    fn std140_sizes() {
        assert_eq!(UniformType::Vec3.std140_size(), 12);
        assert_eq!(UniformType::Vec3.std140_alignment(), 16);
        assert_eq!(UniformType::Vec2.std140_alignment(), 8);
        assert_eq!(UniformType::Mat3.std140_size(), 48);
        assert_eq!(UniformType::Mat2.std140_size(), 32);
    }

    #[test]
    fn push_field_rejects_duplicates_and_overruns() {
        let mut info = UniformInfo::new(32);
        let color = UniformField {
            name: "uColor".into(),
            ty: UniformType::Vec4,
            offset: 0,
            array_size: 1,
            array_stride: 16,
        };
        assert!(info.push_field(color.clone()));
        assert!(!info.push_field(color));
        assert!(!info.push_field(UniformField {
            name: "uTooFar".into(),
            ty: UniformType::Vec4,
            offset: 24,
            array_size: 1,
            array_stride: 16,
        }));
        assert_eq!(info.fields().len(), 1);
        assert_eq!(info.find("uColor").map(|f| f.offset), Some(0));
    }

    #[test]
    fn mat3_columns_are_padded_to_sixteen_bytes() {
        let mut floats = [0f32; 12];
        UniformValue::Mat3(Mat3::from_cols_array(&[
            1.0, 2.0, 3.0, 4.0, 5.0, 6.0, 7.0, 8.0, 9.0,
        ]))
        .write_std140(bytemuck::cast_slice_mut(&mut floats));
        assert_eq!(&floats[0..3], &[1.0, 2.0, 3.0]);
        assert_eq!(&floats[4..7], &[4.0, 5.0, 6.0]);
        assert_eq!(&floats[8..11], &[7.0, 8.0, 9.0]);
    }

    #[test]
    fn bools_are_written_as_words() {
        let mut words = [u32::MAX; 2];
        UniformValue::BVec2(BVec2::new(true, false))
            .write_std140(bytemuck::cast_slice_mut(&mut words));
        assert_eq!(words, [1, 0]);
    }
}
