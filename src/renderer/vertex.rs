use serde::{Deserialize, Serialize};

use super::hashing::hash_combine;

/// Component count of a vertex attribute, stored as `count - 1`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Dimensions {
    One = 0,
    Two = 1,
    Three = 2,
    Four = 3,
}

impl Dimensions {
    pub const fn count(self) -> u8 {
        self as u8 + 1
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ElementType {
    I8 = 0,
    U8 = 1,
    I16 = 2,
    U16 = 3,
    I32 = 4,
    U32 = 5,
    F16 = 6,
    F32 = 7,
    F64 = 8,
}

impl ElementType {
    pub const fn size_in_bytes(self) -> u8 {
        match self {
            Self::I8 | Self::U8 => 1,
            Self::I16 | Self::U16 | Self::F16 => 2,
            Self::I32 | Self::U32 | Self::F32 => 4,
            Self::F64 => 8,
        }
    }

    pub const fn is_integer(self) -> bool {
        !matches!(self, Self::F16 | Self::F32 | Self::F64)
    }
}

/// One entry of a vertex (or instance) layout.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct MeshAttribute {
    pub dimensions: Dimensions,
    pub element_type: ElementType,
    pub location: u8,
}

impl MeshAttribute {
    pub const fn new(location: u8, dimensions: Dimensions, element_type: ElementType) -> Self {
        Self {
            dimensions,
            element_type,
            location,
        }
    }

    pub const fn size_in_bytes(&self) -> u8 {
        self.dimensions.count() * self.element_type.size_in_bytes()
    }

    const fn packed(&self) -> u16 {
        ((self.location as u16) << 8)
            | ((self.element_type as u16) << 2)
            | self.dimensions as u16
    }
}

/// Bytes between consecutive vertices of a tightly packed interleaved layout.
pub fn layout_stride(attributes: &[MeshAttribute]) -> u32 {
    attributes
        .iter()
        .map(|attribute| u32::from(attribute.size_in_bytes()))
        .sum()
}

/// Stable hash of an attribute layout. Each attribute packs into 16 bits and
/// four of them share one 64-bit word before mixing.
pub fn hash_mesh_layout(attributes: &[MeshAttribute]) -> u64 {
    attributes
        .chunks(4)
        .map(|chunk| {
            chunk
                .iter()
                .enumerate()
                .fold(0u64, |word, (i, attribute)| {
                    word | (u64::from(attribute.packed()) << (16 * i))
                })
        })
        .fold(0u64, hash_combine)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum PrimitiveType {
    Points,
    Lines,
    LineStrip,
    #[default]
    Triangles,
    TriangleStrip,
    TriangleFan,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum IndexType {
    #[default]
    None,
    U8,
    U16,
    U32,
}

impl IndexType {
    pub const fn from_element_size(bytes: usize) -> Option<Self> {
        match bytes {
            1 => Some(Self::U8),
            2 => Some(Self::U16),
            4 => Some(Self::U32),
            _ => None,
        }
    }

    pub const fn size_in_bytes(self) -> usize {
        match self {
            Self::None => 0,
            Self::U8 => 1,
            Self::U16 => 2,
            Self::U32 => 4,
        }
    }
}
