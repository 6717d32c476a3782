use glam::{Vec3, Vec4};
use pretty_assertions::assert_eq;
use xivchara::{
    colortable::{ColorTable, R16G16B16A16F},
    cursor::BinaryCursor,
    deform::{Bone, Skeleton},
    error::Diagnostic,
    mesh::{ShapeMeshSource, ShapeSource, ShapeValue},
    model::{
        BoneTableSource, LodSource, MeshSource, Model, ModelOptions, ModelSource, SubmeshSource,
        NO_BONE_TABLE,
    },
    pbd::PbdFile,
    race::{deform_chain, GenderRace},
    vertex::{parse_declaration, RawVertexElement},
};

const BODY_PATH: &str = "chara/human/c0101/obj/body/b0001/model/c0101b0001_top.mdl";

fn names(list: &[&str]) -> Vec<String> {
    list.iter().map(|s| s.to_string()).collect()
}

fn f32s(values: &[f32]) -> Vec<u8> {
    values.iter().flat_map(|v| v.to_le_bytes()).collect()
}

/// Deformer table with records for 1101 and 1201, each shifting `j_kosi` along one axis.
fn deformer_table() -> Vec<u8> {
    fn record(bone: &str, matrix: [f32; 12]) -> Vec<u8> {
        let mut r = Vec::new();
        r.extend(1i32.to_le_bytes());
        // name follows count, offset, padding and the matrix
        r.extend((4i16 + 2 + 2 + 48).to_le_bytes());
        r.extend([0u8; 2]);
        r.extend(f32s(&matrix));
        r.extend(bone.as_bytes());
        r.extend([0u8; 2]);
        r
    }
    let shift = |x: f32, y: f32| [1.0, 0.0, 0.0, x, 0.0, 1.0, 0.0, y, 0.0, 0.0, 1.0, 0.0];

    let entry_count = 3i32;
    let records_start = 4 + 3 * 12 + 3 * 8;
    let lala_male = record("j_kosi", shift(1.0, 0.0));
    let lala_female = record("j_kosi", shift(0.0, 1.0));

    let mut data = Vec::new();
    data.extend(entry_count.to_le_bytes());
    for (id, deformer_id, offset) in [
        (0u16, 0u16, 0i32),
        (1101, 1, records_start),
        (1201, 2, records_start + lala_male.len() as i32),
    ] {
        data.extend(id.to_le_bytes());
        data.extend(deformer_id.to_le_bytes());
        data.extend(offset.to_le_bytes());
        data.extend(0f32.to_le_bytes());
    }
    data.extend([0u8; 3 * 8]);
    data.extend(lala_male);
    data.extend(lala_female);
    data
}

struct Fixture {
    vertex_buffer: Vec<u8>,
    index_buffer: Vec<u16>,
    meshes: Vec<MeshSource>,
    submeshes: Vec<SubmeshSource>,
    attributes: Vec<String>,
    bone_names: Vec<String>,
    bone_tables: Vec<BoneTableSource>,
    shapes: Vec<ShapeSource>,
    shape_meshes: Vec<ShapeMeshSource>,
    shape_values: Vec<ShapeValue>,
    lods: Vec<LodSource>,
}

impl Fixture {
    /// Two meshes of one triangle each. Mesh 0 is skinned, mesh 1 is LOD 1 only.
    fn new() -> Self {
        let mut vertex_buffer = Vec::new();
        // mesh 0, stream 0: position
        vertex_buffer.extend(f32s(&[0.0, 0.0, 0.0, 1.0, 0.0, 0.0, 0.0, 1.0, 0.0]));
        // mesh 0, stream 1: blend indices + weights
        vertex_buffer.extend([0u8, 0, 0, 0, 255, 0, 0, 0].repeat(3));
        // mesh 1, stream 0: position
        vertex_buffer.extend(f32s(&[5.0, 5.0, 5.0, 6.0, 5.0, 5.0, 5.0, 6.0, 5.0]));

        // declarations as they appear in memory, 8 bytes per element
        let mut skinned = Vec::new();
        for element in [[0u8, 0, 35, 0], [1, 0, 116, 7], [1, 4, 68, 1], [255, 0, 0, 0]] {
            skinned.extend(element);
            skinned.extend([0u8; 4]);
        }
        let mut rigid = Vec::new();
        for element in [[0u8, 0, 35, 0], [0, 8, 50, 9], [255, 0, 0, 0]] {
            rigid.extend(element);
            rigid.extend([0u8; 4]);
        }

        let shape_meshes: Vec<ShapeMeshSource> = {
            let mut raw = Vec::new();
            for v in [0u32, 1, 0, 3, 1, 1] {
                raw.extend(v.to_le_bytes());
            }
            BinaryCursor::new(&raw).read_many(2).unwrap()
        };
        let shape_values: Vec<ShapeValue> = {
            let mut raw = Vec::new();
            for v in [2u16, 3, 4, 5] {
                raw.extend(v.to_le_bytes());
            }
            BinaryCursor::new(&raw).read_many(2).unwrap()
        };
        let submeshes: Vec<SubmeshSource> = {
            let mut raw = Vec::new();
            for (offset, count, mask) in [(0u32, 3u32, 0b01u32), (3, 3, 0b10)] {
                raw.extend(offset.to_le_bytes());
                raw.extend(count.to_le_bytes());
                raw.extend(mask.to_le_bytes());
                raw.extend([0u8; 4]);
            }
            BinaryCursor::new(&raw).read_many(2).unwrap()
        };

        Self {
            vertex_buffer,
            index_buffer: vec![0, 1, 2, 2, 1, 0],
            meshes: vec![
                MeshSource {
                    material_index: 0,
                    start_index: 0,
                    index_count: 3,
                    vertex_count: 3,
                    submesh_index: 0,
                    submesh_count: 1,
                    bone_table_index: 0,
                    stream_offsets: [0, 36, 0],
                    stream_strides: [12, 8, 0],
                    declaration: parse_declaration(&skinned).unwrap(),
                },
                MeshSource {
                    material_index: 1,
                    start_index: 3,
                    index_count: 3,
                    vertex_count: 3,
                    submesh_index: 1,
                    submesh_count: 1,
                    bone_table_index: NO_BONE_TABLE,
                    stream_offsets: [60, 0, 0],
                    stream_strides: [12, 0, 0],
                    declaration: parse_declaration(&rigid).unwrap(),
                },
            ],
            submeshes,
            attributes: names(&["atr_top", "atr_hij"]),
            bone_names: names(&["n_root", "j_kosi"]),
            bone_tables: vec![BoneTableSource {
                bone_indices: vec![1],
            }],
            shapes: vec![ShapeSource {
                name: "shp_sho".into(),
                shape_mesh_start: [0, 0, 0],
                shape_mesh_count: [2, 2, 0],
            }],
            shape_meshes,
            shape_values,
            lods: vec![
                LodSource {
                    mesh_ranges: vec![0..1, 0..0],
                },
                LodSource {
                    mesh_ranges: vec![1..2, 0..2],
                },
            ],
        }
    }

    fn source(&self) -> ModelSource<'_> {
        ModelSource {
            path: BODY_PATH,
            vertex_buffer: &self.vertex_buffer,
            index_buffer: &self.index_buffer,
            meshes: &self.meshes,
            submeshes: &self.submeshes,
            attributes: &self.attributes,
            bone_names: &self.bone_names,
            bone_tables: &self.bone_tables,
            shapes: &self.shapes,
            shape_meshes: &self.shape_meshes,
            shape_values: &self.shape_values,
            lods: &self.lods,
            enabled_shape_mask: 0b1,
            enabled_attribute_mask: 0b10,
        }
    }
}

#[test]
fn load_first_lod() {
    let fixture = Fixture::new();
    let (model, diagnostics) = Model::load(&fixture.source(), &ModelOptions::default()).unwrap();

    assert_eq!(model.race_code, GenderRace::MidlanderMale);
    assert_eq!(model.meshes.len(), 1);
    assert_eq!(model.enabled_shapes, names(&["shp_sho"]));
    assert_eq!(model.enabled_attributes, names(&["atr_hij"]));

    let mesh = &model.meshes[0];
    assert_eq!(mesh.bone_table, Some(names(&["j_kosi"])));
    assert_eq!(mesh.submeshes[0].attributes, names(&["atr_top"]));
    assert_eq!(mesh.vertices[1].position, Some(Vec4::new(1.0, 0.0, 0.0, 0.0)));
    assert_eq!(mesh.vertices[1].blend_indices, Some([0, 0, 0, 0]));
    assert_eq!(mesh.vertices[1].blend_weights, Some(Vec4::new(1.0, 0.0, 0.0, 0.0)));

    // mesh 1 is not part of LOD 0, so only the first shape mesh survives
    assert_eq!(model.shapes.len(), 1);
    assert_eq!(model.shapes[0].meshes.len(), 1);
    assert_eq!(
        model.shapes[0].meshes[0].values,
        vec![ShapeValue {
            base_indices_index: 2,
            replacing_vertex_index: 3,
        }]
    );
    assert_eq!(
        diagnostics,
        vec![Diagnostic::ShapeMeshUnmatched {
            shape: "shp_sho".into(),
            mesh_index_offset: 3,
        }]
    );
}

#[test]
fn load_merged_lod() {
    let fixture = Fixture::new();
    let (model, diagnostics) = Model::load(&fixture.source(), &ModelOptions { lod: 1 }).unwrap();

    // 0..2 and 1..2 overlap and load each mesh once
    let mesh_indices: Vec<usize> = model.meshes.iter().map(|m| m.mesh_index).collect();
    assert_eq!(mesh_indices, vec![0, 1]);

    let rigid = &model.meshes[1];
    assert_eq!(rigid.bone_table, None);
    assert_eq!(rigid.submeshes[0].index_offset, 0);
    assert_eq!(rigid.submeshes[0].attributes, names(&["atr_hij"]));
    assert_eq!(rigid.vertices[0].position, Some(Vec4::new(5.0, 5.0, 5.0, 0.0)));

    assert_eq!(model.shapes[0].meshes.len(), 2);
    assert_eq!(model.shapes[0].meshes[1].mesh_index, 1);
    // TEXCOORD1 has no vertex slot
    assert_eq!(
        diagnostics,
        vec![Diagnostic::UnroutedVertexUsage {
            usage: "TEXCOORD1".into()
        }]
    );
}

#[test]
fn deform_onto_lalafell_female() {
    let fixture = Fixture::new();
    let (mut model, _) = Model::load(&fixture.source(), &ModelOptions::default()).unwrap();
    let pbd = PbdFile::parse(&deformer_table()).unwrap();

    let chain = deform_chain(&pbd, GenderRace::MidlanderMale, GenderRace::LalafellFemale).unwrap();
    assert_eq!(chain.len(), 2);

    let skeleton = Skeleton::new(vec![
        Bone {
            name: "n_root".into(),
            parent: None,
        },
        Bone {
            name: "j_kosi".into(),
            parent: Some(0),
        },
    ]);
    let diagnostics = model
        .deform(
            &pbd,
            GenderRace::MidlanderMale,
            GenderRace::LalafellFemale,
            &skeleton,
        )
        .unwrap();
    assert!(diagnostics.is_empty());

    let positions: Vec<Vec3> = model.meshes[0]
        .vertices
        .iter()
        .map(|v| v.position.unwrap().truncate())
        .collect();
    assert_eq!(
        positions,
        vec![
            Vec3::new(1.0, 1.0, 0.0),
            Vec3::new(2.0, 1.0, 0.0),
            Vec3::new(1.0, 2.0, 0.0),
        ]
    );
}

#[test]
fn deform_without_chain_deformer_fails() {
    let fixture = Fixture::new();
    let (mut model, _) = Model::load(&fixture.source(), &ModelOptions::default()).unwrap();
    let pbd = PbdFile::parse(&deformer_table()).unwrap();
    let result = model.deform(
        &pbd,
        GenderRace::MidlanderMale,
        GenderRace::HighlanderMale,
        &Skeleton::default(),
    );
    assert!(result.is_err());
}

#[test]
fn color_table_texture_to_image() {
    let mut table = ColorTable::default();
    table.rows_mut()[0].set_diffuse(Vec3::new(1.0, 0.0, 0.0));
    let bytes = table.to_bytes();

    let decoded = ColorTable::from_texture(R16G16B16A16F, 4, 16, 32, &bytes).unwrap();
    assert_eq!(decoded, table);
    let image = decoded.to_image();
    assert_eq!(image.get_pixel(0, 0).0, [255, 0, 0, 255]);

    let sampled = decoded.sample(0.0);
    assert_eq!(sampled.diffuse, Vec3::new(1.0, 0.0, 0.0));
}

#[test]
fn raw_declaration_round_trip() {
    let raw = [0u8, 0, 35, 0, 0, 0, 0, 0, 255, 0, 0, 0, 0, 0, 0, 0];
    assert_eq!(
        parse_declaration(&raw).unwrap(),
        vec![RawVertexElement::new(0, 0, 35, 0)]
    );
}
