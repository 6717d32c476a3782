use crate::{
    error::{Diagnostic, XivError},
    vertex::Vertex,
};
use binrw::binread;
use nohash_hasher::IntMap;
use serde::Serialize;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Submesh {
    /// Relative to the owning mesh's index array.
    pub index_offset: u32,
    pub index_count: u32,
    pub attributes: Vec<String>,
}

impl Submesh {
    /// `offset` is relative to the model's index buffer, `mesh_index_offset` is where
    /// the owning mesh starts within it.
    pub fn from_mask(
        offset: u32,
        count: u32,
        mesh_index_offset: u32,
        attribute_mask: u32,
        attribute_names: &[String],
    ) -> Result<Self, XivError> {
        let index_offset =
            offset
                .checked_sub(mesh_index_offset)
                .ok_or(XivError::SubmeshOffset {
                    offset,
                    mesh_offset: mesh_index_offset,
                })?;

        Ok(Self {
            index_offset,
            index_count: count,
            attributes: names_from_mask(attribute_mask, attribute_names),
        })
    }

    pub fn end(&self) -> u64 {
        self.index_offset as u64 + self.index_count as u64
    }
}

/// Names whose bit is set in `mask`; bits beyond the list are ignored.
pub fn names_from_mask(mask: u32, names: &[String]) -> Vec<String> {
    names
        .iter()
        .take(32)
        .enumerate()
        .filter(|(bit, _)| mask & (1u32 << *bit) != 0)
        .map(|(_, name)| name.clone())
        .collect()
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Mesh {
    /// Position of the mesh within the model's mesh list.
    pub mesh_index: usize,
    pub material_index: u16,
    pub vertices: Vec<Vertex>,
    pub indices: Vec<u16>,
    pub submeshes: Vec<Submesh>,
    /// Bone names addressed by vertex blend indices.
    pub bone_table: Option<Vec<String>>,
}

/// Inputs of [`Mesh::assemble`].
#[derive(Debug, Clone)]
pub struct MeshParts<'a> {
    pub mesh_index: usize,
    pub material_index: u16,
    pub vertices: Vec<Vertex>,
    pub indices: &'a [u16],
    /// Index count the model declares for this mesh.
    pub index_count: u32,
    pub submeshes: Vec<Submesh>,
    pub bone_table: Option<Vec<String>>,
}

impl Mesh {
    pub fn assemble(parts: MeshParts) -> Result<Self, XivError> {
        let MeshParts {
            mesh_index,
            material_index,
            vertices,
            indices,
            index_count,
            submeshes,
            bone_table,
        } = parts;

        if indices.len() != index_count as usize {
            return Err(XivError::MeshIndexCount {
                mesh: mesh_index,
                actual: indices.len(),
                expected: index_count,
            });
        }

        if let Some(index) = indices.iter().find(|i| **i as usize >= vertices.len()) {
            return Err(XivError::MeshIndexRange {
                mesh: mesh_index,
                index: *index,
                vertex_count: vertices.len(),
            });
        }

        if let Some(submesh) = submeshes
            .iter()
            .find(|s| s.end() > indices.len() as u64)
        {
            return Err(XivError::SubmeshRange {
                mesh: mesh_index,
                offset: submesh.index_offset,
                end: submesh.end(),
                index_count: indices.len(),
            });
        }

        tracing::trace!(
            mesh = mesh_index,
            vertices = vertices.len(),
            indices = indices.len(),
            submeshes = submeshes.len(),
            "assembled mesh"
        );

        Ok(Self {
            mesh_index,
            material_index,
            vertices,
            indices: indices.to_vec(),
            submeshes,
            bone_table,
        })
    }

    pub fn bone_name(&self, blend_index: u8) -> Option<&str> {
        self.bone_table
            .as_ref()
            .and_then(|table| table.get(blend_index as usize))
            .map(String::as_str)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[binread]
#[br(little)]
pub struct ShapeValue {
    /// Slot in the model's index buffer that is redirected.
    pub base_indices_index: u16,
    pub replacing_vertex_index: u16,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[binread]
#[br(little)]
pub struct ShapeMeshSource {
    pub mesh_index_offset: u32,
    pub shape_value_count: u32,
    pub shape_value_offset: u32,
}

/// Shape declaration; `shape_mesh_start`/`shape_mesh_count` are per level of detail.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ShapeSource {
    pub name: String,
    pub shape_mesh_start: [u16; 3],
    pub shape_mesh_count: [u16; 3],
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ShapeMesh {
    pub mesh_index: usize,
    pub values: Vec<ShapeValue>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ModelShape {
    pub name: String,
    pub meshes: Vec<ShapeMesh>,
}

/// Maps the index buffer offset every loaded mesh starts at to its mesh index.
/// The first mesh wins when two start at the same offset.
pub fn mesh_offsets(meshes: impl IntoIterator<Item = (u32, usize)>) -> IntMap<u32, usize> {
    let mut map = IntMap::default();
    for (start_index, mesh_index) in meshes {
        map.entry(start_index).or_insert(mesh_index);
    }
    map
}

/// Builds the shapes of one level of detail against the loaded meshes.
///
/// Shape meshes whose mesh was not loaded are dropped, and shapes left without
/// any mesh are omitted.
pub fn compose_shapes(
    shapes: &[ShapeSource],
    shape_meshes: &[ShapeMeshSource],
    shape_values: &[ShapeValue],
    loaded: &IntMap<u32, usize>,
    lod: usize,
) -> Result<(Vec<ModelShape>, Vec<Diagnostic>), XivError> {
    let mut result = Vec::new();
    let mut diagnostics = Vec::new();

    for shape in shapes {
        let (Some(start), Some(count)) = (
            shape.shape_mesh_start.get(lod),
            shape.shape_mesh_count.get(lod),
        ) else {
            return Err(XivError::LodMissing(lod));
        };
        let start = *start as usize;
        let end = start + *count as usize;
        let range = shape_meshes
            .get(start..end)
            .ok_or_else(|| XivError::ShapeMeshRange {
                shape: shape.name.as_str().into(),
                start,
                end,
                available: shape_meshes.len(),
            })?;

        let mut meshes = Vec::new();
        for shape_mesh in range {
            let Some(mesh_index) = loaded.get(&shape_mesh.mesh_index_offset) else {
                let diagnostic = Diagnostic::ShapeMeshUnmatched {
                    shape: shape.name.as_str().into(),
                    mesh_index_offset: shape_mesh.mesh_index_offset,
                };
                tracing::debug!(%diagnostic, "dropped shape mesh");
                diagnostics.push(diagnostic);
                continue;
            };

            let value_start = shape_mesh.shape_value_offset as usize;
            let value_end = value_start + shape_mesh.shape_value_count as usize;
            let values = shape_values
                .get(value_start..value_end)
                .ok_or(XivError::ShapeValueRange {
                    start: value_start,
                    end: value_end,
                    available: shape_values.len(),
                })?;

            meshes.push(ShapeMesh {
                mesh_index: *mesh_index,
                values: values.to_vec(),
            });
        }

        if !meshes.is_empty() {
            result.push(ModelShape {
                name: shape.name.clone(),
                meshes,
            });
        }
    }

    Ok((result, diagnostics))
}
