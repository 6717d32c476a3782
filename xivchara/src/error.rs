use serde::Serialize;
use std::io;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum XivError {
    #[error("Unexpected end of buffer at offset {offset} (needed {needed} bytes, {available} available)")]
    UnexpectedEof {
        offset: u64,
        needed: usize,
        available: usize,
    },
    #[error("Offset {offset} is outside of a {len} byte buffer")]
    OutOfBounds { offset: i64, len: usize },
    #[error("Failed to read record at offset {offset}")]
    Record {
        offset: u64,
        #[source]
        source: binrw::Error,
    },
    #[error("Failed to seek within buffer")]
    Seek(#[source] io::Error),

    #[error("Failed to read .pbd header")]
    PbdHeader(#[source] Box<XivError>),
    #[error(".pbd file declares a negative entry count ({0})")]
    PbdEntryCount(i32),
    #[error("Failed to read .pbd deformer at offset {offset}")]
    PbdDeformer {
        offset: i32,
        #[source]
        source: Box<XivError>,
    },
    #[error(".pbd deformer at offset {offset} declares a negative bone count ({count})")]
    PbdBoneCount { offset: i32, count: i32 },
    #[error("No deformer exists for race code {0:04}")]
    PbdMissingDeformer(u16),

    #[error("Color table has {0} values, but 256 were expected")]
    ColorTableLength(usize),
    #[error("Color table is not R16G16B16A16F (format={0:#x})")]
    ColorTableFormat(u32),
    #[error("Color table is not 4x16 or 8x32 ({0}x{1})")]
    ColorTableSize(u32, u32),
    #[error("Color table texture holds {available} bytes, but {needed} were expected")]
    ColorTableData { needed: usize, available: usize },

    #[error("Vertex element of {size} bytes at offset {offset} does not fit in a stride of {stride}")]
    VertexElementStride { offset: usize, size: usize, stride: usize },
    #[error("Vertex stream holds {available} bytes, but {needed} were expected")]
    VertexStream { needed: usize, available: usize },
    #[error("Vertex declaration refers to stream {0}, only streams 0-2 exist")]
    VertexStreamIndex(u8),

    #[error("Mesh {mesh} has index {index}, but only {vertex_count} vertices exist")]
    MeshIndexRange {
        mesh: usize,
        index: u16,
        vertex_count: usize,
    },
    #[error("Mesh {mesh} has {actual} indices, but {expected} were expected")]
    MeshIndexCount {
        mesh: usize,
        actual: usize,
        expected: u32,
    },
    #[error("Submesh at index offset {offset} starts before its mesh ({mesh_offset})")]
    SubmeshOffset { offset: u32, mesh_offset: u32 },
    #[error("Mesh {mesh} has a submesh spanning {offset}..{end}, past its {index_count} indices")]
    SubmeshRange {
        mesh: usize,
        offset: u32,
        end: u64,
        index_count: usize,
    },
    #[error("Mesh {0} does not exist")]
    MeshMissing(usize),
    #[error("Submesh {0} does not exist")]
    SubmeshMissing(usize),
    #[error("Bone table {0} does not exist")]
    BoneTableMissing(u8),
    #[error("Bone name {0} does not exist")]
    BoneNameMissing(u16),
    #[error("Level of detail {0} does not exist")]
    LodMissing(usize),
    #[error("Shape {shape} refers to shape meshes {start}..{end}, only {available} exist")]
    ShapeMeshRange {
        shape: Box<str>,
        start: usize,
        end: usize,
        available: usize,
    },
    #[error("Shape mesh refers to shape values {start}..{end}, only {available} exist")]
    ShapeValueRange {
        start: usize,
        end: usize,
        available: usize,
    },
}

/// Non-fatal findings reported next to a successful result.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum Diagnostic {
    /// Vertex element type code that no decoder exists for.
    UnknownVertexFormat { usage: u8, format: u8 },
    /// Vertex element usage code outside of the known kernel usages.
    UnknownVertexUsage { usage: u8, format: u8 },
    /// Known usage that has no slot in the canonical vertex.
    UnroutedVertexUsage { usage: Box<str> },
    /// Shape mesh whose index offset does not start any assembled mesh.
    ShapeMeshUnmatched {
        shape: Box<str>,
        mesh_index_offset: u32,
    },
    /// Mesh bone that the target skeleton does not have.
    BoneNotInSkeleton { mesh: usize, bone: Box<str> },
}

impl std::fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::UnknownVertexFormat { usage, format } => {
                write!(f, "skipped vertex element with unknown format {format} (usage {usage})")
            }
            Self::UnknownVertexUsage { usage, format } => {
                write!(f, "skipped vertex element with unknown usage {usage} (format {format})")
            }
            Self::UnroutedVertexUsage { usage } => write!(f, "skipped vertex usage {usage}"),
            Self::ShapeMeshUnmatched {
                shape,
                mesh_index_offset,
            } => write!(
                f,
                "shape {shape} refers to a mesh at index offset {mesh_index_offset} which was not loaded"
            ),
            Self::BoneNotInSkeleton { mesh, bone } => {
                write!(f, "mesh {mesh} bone {bone} is not part of the skeleton")
            }
        }
    }
}
