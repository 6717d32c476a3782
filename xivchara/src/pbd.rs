//! Bone deformer table (`chara/xls/boneDeformer/human.pbd`).
//!
//! Layout:
//!
//! ```text
//! i32                      entry count
//! PbdHeader[entry count]   id, deformer id, offset, unk
//! u8[entry count * 8]      not interpreted
//! ...                      deformer records, addressed by PbdHeader::offset
//! ```
//!
//! A deformer record starts with an `i32` bone count, followed by that many `i16`
//! name offsets (relative to the record start), padding up to 4 byte alignment and
//! one 3x4 `f32` matrix per bone.

use crate::{cursor::BinaryCursor, error::XivError};
use binrw::binread;
use glam::Vec3;
use nohash_hasher::IntMap;
use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[binread]
#[br(little)]
pub struct PbdHeader {
    /// Race code this entry deforms into.
    pub id: u16,
    pub deformer_id: u16,
    pub offset: i32,
    pub unk: f32,
}

/// Row-major 3x4 matrix mapping a position of one body onto another.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct DeformMatrix(pub [f32; 12]);

impl DeformMatrix {
    /// Identity record as the file format stores it: translation, rotation quaternion
    /// and scale. Not a row-major transform for `transform_coordinate`.
    pub fn identity() -> Self {
        Self([
            0.0, 0.0, 0.0, 0.0, // translation (vec3 + unused)
            0.0, 0.0, 0.0, 1.0, // rotation (vec4)
            1.0, 1.0, 1.0, 0.0, // scale (vec3 + unused)
        ])
    }

    pub fn transform_coordinate(&self, v: Vec3) -> Vec3 {
        let m = &self.0;
        Vec3::new(
            v.x * m[0] + v.y * m[1] + v.z * m[2] + m[3],
            v.x * m[4] + v.y * m[5] + v.z * m[6] + m[7],
            v.x * m[8] + v.y * m[9] + v.z * m[10] + m[11],
        )
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Deformer {
    /// Byte offset of the record within the .pbd file.
    pub offset: i32,
    pub bone_names: Vec<String>,
    pub deform_matrices: Vec<Option<DeformMatrix>>,
}

impl Deformer {
    fn read(r: &mut BinaryCursor) -> Result<Self, XivError> {
        let start = r.position() as i64;
        let offset = start as i32;
        let bone_count = r.read_i32()?;
        if bone_count < 0 {
            return Err(XivError::PbdBoneCount {
                offset,
                count: bone_count,
            });
        }
        let bone_count = bone_count as usize;

        let name_offsets = r.read_i16s(bone_count)?;
        let bone_names = name_offsets
            .iter()
            .map(|name_offset| r.read_null_string_at(start + *name_offset as i64))
            .collect::<Result<Vec<_>, _>>()?;

        r.skip(bone_count * 2 % 4)?;

        let mut deform_matrices = Vec::with_capacity(bone_count);
        for _ in 0..bone_count {
            deform_matrices.push(Some(DeformMatrix(r.read_f32_array::<12>()?)));
        }

        Ok(Self {
            offset,
            bone_names,
            deform_matrices,
        })
    }

    pub fn bone_count(&self) -> usize {
        self.bone_names.len()
    }

    pub fn bone_index(&self, bone_name: &str) -> Option<usize> {
        self.bone_names.iter().position(|name| name == bone_name)
    }

    /// Matrix for an exact bone name. `None` means the bone is not deformed.
    pub fn deform_matrix(&self, bone_name: &str) -> Option<&DeformMatrix> {
        self.bone_index(bone_name)
            .and_then(|idx| self.deform_matrices.get(idx))
            .and_then(Option::as_ref)
    }
}

#[derive(Debug, Clone)]
pub struct PbdFile {
    headers: Vec<PbdHeader>,
    deformers: Vec<Deformer>,
    by_offset: IntMap<i32, usize>,
    unknown_len: usize,
}

impl PbdFile {
    pub fn parse(data: &[u8]) -> Result<Self, XivError> {
        let mut r = BinaryCursor::new(data);

        let entry_count = r
            .read_i32()
            .map_err(|e| XivError::PbdHeader(Box::new(e)))?;
        if entry_count < 0 {
            return Err(XivError::PbdEntryCount(entry_count));
        }
        let entry_count = entry_count as usize;

        let headers: Vec<PbdHeader> = r
            .read_many(entry_count)
            .map_err(|e| XivError::PbdHeader(Box::new(e)))?;
        // No idea what this block is, it is skipped wholesale.
        let unknown_len = entry_count * 8;
        r.skip(unknown_len)
            .map_err(|e| XivError::PbdHeader(Box::new(e)))?;

        let mut deformers: Vec<Deformer> = Vec::with_capacity(entry_count);

        // The first entry does not hold a regular deformer record and is never read.
        for header in headers.iter().skip(1) {
            let offset = header.offset;
            if offset == 0 || deformers.iter().any(|d| d.offset == offset) {
                continue;
            }

            let deformer = r
                .seek(offset as i64)
                .and_then(|_| Deformer::read(&mut r))
                .map_err(|source| XivError::PbdDeformer {
                    offset,
                    source: Box::new(source),
                })?;

            tracing::trace!(
                race_code = header.id,
                offset,
                bones = deformer.bone_count(),
                "read .pbd deformer"
            );
            deformers.push(deformer);
        }

        deformers.sort_by_key(|d| d.offset);
        let by_offset = deformers
            .iter()
            .enumerate()
            .map(|(idx, d)| (d.offset, idx))
            .collect();

        Ok(Self {
            headers,
            deformers,
            by_offset,
            unknown_len,
        })
    }

    pub fn headers(&self) -> &[PbdHeader] {
        &self.headers
    }

    /// Deformers ordered by their offset in the file.
    pub fn deformers(&self) -> &[Deformer] {
        &self.deformers
    }

    /// Length of the uninterpreted block following the headers.
    pub fn unknown_len(&self) -> usize {
        self.unknown_len
    }

    pub fn deformer_at(&self, offset: i32) -> Option<&Deformer> {
        self.by_offset
            .get(&offset)
            .and_then(|idx| self.deformers.get(*idx))
    }

    pub fn header_for(&self, race_code: u16) -> Option<&PbdHeader> {
        self.headers.iter().skip(1).find(|h| h.id == race_code)
    }

    pub fn deformer_for(&self, race_code: u16) -> Option<&Deformer> {
        self.header_for(race_code)
            .and_then(|header| self.deformer_at(header.offset))
    }
}
