use crate::{
    cursor::BinaryCursor,
    deform::{RaceDeformer, Skeleton},
    error::{Diagnostic, XivError},
    mesh::{
        compose_shapes, mesh_offsets, names_from_mask, Mesh, MeshParts, ModelShape, ShapeMeshSource,
        ShapeSource, ShapeValue, Submesh,
    },
    pbd::PbdFile,
    race::{deform_chain, parse_race_code, GenderRace},
    vertex::{decode_vertices, RawVertexElement, MAX_STREAMS},
};
use binrw::binread;
use serde::Serialize;
use std::ops::Range;

/// Bone table index marking a mesh without bones.
pub const NO_BONE_TABLE: u8 = 0xFF;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MeshSource {
    pub material_index: u16,
    /// First index of the mesh within the model's index buffer.
    pub start_index: u32,
    pub index_count: u32,
    pub vertex_count: u32,
    pub submesh_index: u16,
    pub submesh_count: u16,
    pub bone_table_index: u8,
    /// Byte offsets of each stream within the model's vertex buffer.
    pub stream_offsets: [u32; MAX_STREAMS],
    pub stream_strides: [u8; MAX_STREAMS],
    pub declaration: Vec<RawVertexElement>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[binread]
#[br(little)]
pub struct SubmeshSource {
    /// Relative to the model's index buffer.
    pub index_offset: u32,
    pub index_count: u32,
    pub attribute_index_mask: u32,
    pub bone_start_index: u16,
    pub bone_count: u16,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BoneTableSource {
    /// Indices into the model's bone name list.
    pub bone_indices: Vec<u16>,
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct LodSource {
    /// Mesh index ranges used by this level of detail (main, water, shadow, ...).
    pub mesh_ranges: Vec<Range<usize>>,
}

/// Structural model data supplied by the caller, already decoded from the model file
/// or the live render state.
#[derive(Debug, Clone, Default)]
pub struct ModelSource<'a> {
    pub path: &'a str,
    pub vertex_buffer: &'a [u8],
    pub index_buffer: &'a [u16],
    pub meshes: &'a [MeshSource],
    pub submeshes: &'a [SubmeshSource],
    pub attributes: &'a [String],
    pub bone_names: &'a [String],
    pub bone_tables: &'a [BoneTableSource],
    pub shapes: &'a [ShapeSource],
    pub shape_meshes: &'a [ShapeMeshSource],
    pub shape_values: &'a [ShapeValue],
    pub lods: &'a [LodSource],
    pub enabled_shape_mask: u32,
    pub enabled_attribute_mask: u32,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ModelOptions {
    /// Level of detail to assemble.
    pub lod: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Model {
    pub path: String,
    pub race_code: GenderRace,
    pub meshes: Vec<Mesh>,
    pub shapes: Vec<ModelShape>,
    pub enabled_shapes: Vec<String>,
    pub enabled_attributes: Vec<String>,
}

/// Sorts ranges, merges the overlapping ones and drops the empty ones.
/// Ranges that merely touch stay separate.
pub fn consolidate_ranges(ranges: &[Range<usize>]) -> Vec<Range<usize>> {
    let mut sorted: Vec<Range<usize>> = ranges.iter().filter(|r| !r.is_empty()).cloned().collect();
    sorted.sort_by_key(|r| (r.start, r.end));

    let mut result: Vec<Range<usize>> = Vec::with_capacity(sorted.len());
    for range in sorted {
        match result.last_mut() {
            Some(last) if last.end > range.start => last.end = last.end.max(range.end),
            _ => result.push(range),
        }
    }
    result
}

impl Model {
    pub fn load(
        source: &ModelSource,
        options: &ModelOptions,
    ) -> Result<(Self, Vec<Diagnostic>), XivError> {
        let lod = source
            .lods
            .get(options.lod)
            .ok_or(XivError::LodMissing(options.lod))?;

        let mut meshes = Vec::new();
        let mut diagnostics = Vec::new();
        for range in consolidate_ranges(&lod.mesh_ranges) {
            for mesh_index in range {
                let (mesh, mesh_diagnostics) = load_mesh(source, mesh_index)?;
                meshes.push(mesh);
                diagnostics.extend(mesh_diagnostics);
            }
        }

        let loaded = mesh_offsets(
            meshes
                .iter()
                .map(|m| (source.meshes[m.mesh_index].start_index, m.mesh_index)),
        );
        let (shapes, shape_diagnostics) = compose_shapes(
            source.shapes,
            source.shape_meshes,
            source.shape_values,
            &loaded,
            options.lod,
        )?;
        diagnostics.extend(shape_diagnostics);

        let shape_names: Vec<String> = source.shapes.iter().map(|s| s.name.clone()).collect();
        let model = Self {
            path: source.path.to_string(),
            race_code: parse_race_code(source.path),
            meshes,
            shapes,
            enabled_shapes: names_from_mask(source.enabled_shape_mask, &shape_names),
            enabled_attributes: names_from_mask(source.enabled_attribute_mask, source.attributes),
        };

        tracing::debug!(
            path = source.path,
            race_code = %model.race_code,
            meshes = model.meshes.len(),
            shapes = model.shapes.len(),
            diagnostics = diagnostics.len(),
            "loaded model"
        );
        Ok((model, diagnostics))
    }

    /// Retargets every mesh from the `from` body onto `to`.
    pub fn deform(
        &mut self,
        pbd: &PbdFile,
        from: GenderRace,
        to: GenderRace,
        skeleton: &Skeleton,
    ) -> Result<Vec<Diagnostic>, XivError> {
        let chain = deform_chain(pbd, from, to)?;
        let deformer = RaceDeformer::new(chain, skeleton);
        Ok(self
            .meshes
            .iter_mut()
            .flat_map(|mesh| deformer.deform_mesh(mesh))
            .collect())
    }
}

fn load_mesh(source: &ModelSource, mesh_index: usize) -> Result<(Mesh, Vec<Diagnostic>), XivError> {
    let mesh = source
        .meshes
        .get(mesh_index)
        .ok_or(XivError::MeshMissing(mesh_index))?;

    let buffer = BinaryCursor::new(source.vertex_buffer);
    let vertex_count = mesh.vertex_count as usize;
    // streams no element reads may carry stale offsets
    let mut streams: [&[u8]; MAX_STREAMS] = [&[]; MAX_STREAMS];
    for element in mesh.declaration.iter().take_while(|e| !e.is_terminator()) {
        let idx = element.stream as usize;
        if idx >= MAX_STREAMS || !streams[idx].is_empty() {
            continue;
        }
        let len = mesh.stream_strides[idx] as usize * vertex_count;
        streams[idx] = buffer.slice_at(mesh.stream_offsets[idx] as usize, len)?;
    }
    let (vertices, diagnostics) = decode_vertices(
        vertex_count,
        &streams,
        &mesh.stream_strides,
        &mesh.declaration,
    )?;

    // a short buffer surfaces as an index count mismatch
    let start = (mesh.start_index as usize).min(source.index_buffer.len());
    let end = (start + mesh.index_count as usize).min(source.index_buffer.len());
    let indices = &source.index_buffer[start..end];

    let first = mesh.submesh_index as usize;
    let last = first + mesh.submesh_count as usize;
    let submeshes = source
        .submeshes
        .get(first..last)
        .ok_or(XivError::SubmeshMissing(last.saturating_sub(1)))?
        .iter()
        .map(|s| {
            Submesh::from_mask(
                s.index_offset,
                s.index_count,
                mesh.start_index,
                s.attribute_index_mask,
                source.attributes,
            )
        })
        .collect::<Result<Vec<_>, _>>()?;

    let bone_table = resolve_bone_table(source, mesh.bone_table_index)?;

    let mesh = Mesh::assemble(MeshParts {
        mesh_index,
        material_index: mesh.material_index,
        vertices,
        indices,
        index_count: mesh.index_count,
        submeshes,
        bone_table,
    })?;
    Ok((mesh, diagnostics))
}

fn resolve_bone_table(source: &ModelSource, index: u8) -> Result<Option<Vec<String>>, XivError> {
    if index == NO_BONE_TABLE {
        return Ok(None);
    }
    let table = source
        .bone_tables
        .get(index as usize)
        .ok_or(XivError::BoneTableMissing(index))?;
    table
        .bone_indices
        .iter()
        .map(|i| {
            source
                .bone_names
                .get(*i as usize)
                .cloned()
                .ok_or(XivError::BoneNameMissing(*i))
        })
        .collect::<Result<Vec<_>, _>>()
        .map(Some)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn ranges_are_consolidated() {
        assert_eq!(
            consolidate_ranges(&[5..8, 0..3, 2..4, 3..3, 8..10]),
            vec![0..4, 5..8, 8..10]
        );
        assert_eq!(consolidate_ranges(&[0..10, 2..3]), vec![0..10]);
        assert!(consolidate_ranges(&[4..4, 0..0]).is_empty());
    }

    fn names(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    fn triangle_mesh(start_index: u32, offset: u32, bone_table_index: u8) -> MeshSource {
        MeshSource {
            material_index: 0,
            start_index,
            index_count: 3,
            vertex_count: 3,
            submesh_index: 0,
            submesh_count: 1,
            bone_table_index,
            stream_offsets: [offset, 0, 0],
            stream_strides: [12, 0, 0],
            declaration: vec![RawVertexElement::new(0, 0, 35, 0)],
        }
    }

    #[test]
    fn bone_tables_resolve_names() {
        let bone_names = names(&["n_root", "j_kosi", "j_sebo_a"]);
        let bone_tables = [BoneTableSource {
            bone_indices: vec![2, 0],
        }];
        let source = ModelSource {
            bone_names: &bone_names,
            bone_tables: &bone_tables,
            ..Default::default()
        };
        assert_eq!(
            resolve_bone_table(&source, 0).unwrap(),
            Some(names(&["j_sebo_a", "n_root"]))
        );
        assert_eq!(resolve_bone_table(&source, NO_BONE_TABLE).unwrap(), None);
        assert!(matches!(
            resolve_bone_table(&source, 1),
            Err(XivError::BoneTableMissing(1))
        ));

        let broken = [BoneTableSource {
            bone_indices: vec![7],
        }];
        let source = ModelSource {
            bone_names: &bone_names,
            bone_tables: &broken,
            ..Default::default()
        };
        assert!(matches!(
            resolve_bone_table(&source, 0),
            Err(XivError::BoneNameMissing(7))
        ));
    }

    #[test]
    fn missing_lod_and_mesh_are_errors() {
        let source = ModelSource::default();
        assert!(matches!(
            Model::load(&source, &ModelOptions { lod: 1 }),
            Err(XivError::LodMissing(1))
        ));

        let lods = [LodSource {
            mesh_ranges: vec![0..1],
        }];
        let source = ModelSource {
            lods: &lods,
            ..Default::default()
        };
        assert!(matches!(
            Model::load(&source, &ModelOptions::default()),
            Err(XivError::MeshMissing(0))
        ));
    }

    #[test]
    fn truncated_index_buffer_is_a_count_mismatch() {
        let vertex_buffer = vec![0u8; 36];
        let index_buffer = [0u16, 1];
        let meshes = [triangle_mesh(0, 0, NO_BONE_TABLE)];
        let submeshes = [SubmeshSource {
            index_offset: 0,
            index_count: 2,
            attribute_index_mask: 0,
            bone_start_index: 0,
            bone_count: 0,
        }];
        let lods = [LodSource {
            mesh_ranges: vec![0..1],
        }];
        let source = ModelSource {
            path: "chara/human/c0101/obj/body/b0001/model/c0101b0001_top.mdl",
            vertex_buffer: &vertex_buffer,
            index_buffer: &index_buffer,
            meshes: &meshes,
            submeshes: &submeshes,
            lods: &lods,
            ..Default::default()
        };
        assert!(matches!(
            Model::load(&source, &ModelOptions::default()),
            Err(XivError::MeshIndexCount {
                actual: 2,
                expected: 3,
                ..
            })
        ));
    }

    #[test]
    fn short_vertex_buffer_is_an_error() {
        let vertex_buffer = vec![0u8; 30];
        let index_buffer = [0u16, 1, 2];
        let meshes = [triangle_mesh(0, 0, NO_BONE_TABLE)];
        let lods = [LodSource {
            mesh_ranges: vec![0..1],
        }];
        let source = ModelSource {
            vertex_buffer: &vertex_buffer,
            index_buffer: &index_buffer,
            meshes: &meshes,
            lods: &lods,
            ..Default::default()
        };
        assert!(matches!(
            Model::load(&source, &ModelOptions::default()),
            Err(XivError::UnexpectedEof { needed: 36, .. })
        ));
    }

    #[test]
    fn unused_streams_are_not_sliced() {
        let vertex_buffer: Vec<u8> = [0.0f32, 0.0, 0.0, 1.0, 0.0, 0.0, 0.0, 1.0, 0.0]
            .iter()
            .flat_map(|v| v.to_le_bytes())
            .collect();
        let index_buffer = [0u16, 1, 2];
        let mut mesh = triangle_mesh(0, 0, NO_BONE_TABLE);
        // stream 1 is never read, its offset points past the buffer
        mesh.stream_offsets = [0, 9999, 0];
        mesh.stream_strides = [12, 0, 0];
        let meshes = [mesh];
        let submeshes = [SubmeshSource {
            index_offset: 0,
            index_count: 3,
            attribute_index_mask: 0,
            bone_start_index: 0,
            bone_count: 0,
        }];
        let lods = [LodSource {
            mesh_ranges: vec![0..1],
        }];
        let source = ModelSource {
            vertex_buffer: &vertex_buffer,
            index_buffer: &index_buffer,
            meshes: &meshes,
            submeshes: &submeshes,
            lods: &lods,
            ..Default::default()
        };

        let (model, diagnostics) = Model::load(&source, &ModelOptions::default()).unwrap();
        assert!(diagnostics.is_empty());
        assert_eq!(model.meshes.len(), 1);
        assert_eq!(
            model.meshes[0].vertices[1].position.map(|p| p.truncate()),
            Some(glam::Vec3::new(1.0, 0.0, 0.0))
        );
    }
}
