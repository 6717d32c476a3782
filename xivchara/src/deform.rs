use crate::{
    error::Diagnostic,
    mesh::Mesh,
    pbd::{DeformMatrix, Deformer},
};
use glam::Vec3;
use serde::Serialize;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Bone {
    pub name: String,
    pub parent: Option<usize>,
}

/// Target skeleton, bones addressed by index.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Skeleton {
    pub bones: Vec<Bone>,
}

impl Skeleton {
    pub fn new(bones: Vec<Bone>) -> Self {
        Self { bones }
    }

    pub fn find(&self, name: &str) -> Option<usize> {
        self.bones.iter().position(|b| b.name == name)
    }
}

/// Row-major matrix leaving positions untouched.
const PASSTHROUGH: DeformMatrix = DeformMatrix([
    1.0, 0.0, 0.0, 0.0, //
    0.0, 1.0, 0.0, 0.0, //
    0.0, 0.0, 1.0, 0.0,
]);

/// Applies a resolved deformer chain to positions skinned against `skeleton`.
#[derive(Debug, Clone)]
pub struct RaceDeformer<'a> {
    chain: Vec<&'a Deformer>,
    skeleton: &'a Skeleton,
}

impl<'a> RaceDeformer<'a> {
    pub fn new(chain: Vec<&'a Deformer>, skeleton: &'a Skeleton) -> Self {
        Self { chain, skeleton }
    }

    pub fn is_empty(&self) -> bool {
        self.chain.is_empty()
    }

    /// Matrix for a skeleton bone: the bone's own entry, else the closest ancestor's,
    /// else a passthrough. A bone listed without a matrix contributes nothing.
    pub fn resolve_deformation(&self, deformer: &Deformer, bone: usize) -> Option<DeformMatrix> {
        let mut current = Some(bone);
        // guards against parent cycles in caller supplied skeletons
        for _ in 0..=self.skeleton.bones.len() {
            let Some(bone) = current.and_then(|idx| self.skeleton.bones.get(idx)) else {
                break;
            };
            if let Some(idx) = deformer.bone_index(&bone.name) {
                return deformer.deform_matrices.get(idx).copied().flatten();
            }
            current = bone.parent;
        }
        Some(PASSTHROUGH)
    }

    /// `joints` are `(skeleton bone index, weight)` pairs. A joint without a skeleton
    /// bone keeps its share of the position in place.
    /// Positions without any weighted joint are returned as they are.
    pub fn deform_position(&self, position: Vec3, joints: &[(Option<usize>, f32)]) -> Vec3 {
        if joints.iter().all(|(_, weight)| *weight == 0.0) {
            return position;
        }

        self.chain.iter().fold(position, |current, deformer| {
            joints
                .iter()
                .filter(|(_, weight)| *weight != 0.0)
                .filter_map(|(bone, weight)| match bone {
                    Some(bone) => self
                        .resolve_deformation(deformer, *bone)
                        .map(|m| m.transform_coordinate(current) * *weight),
                    None => Some(current * *weight),
                })
                .sum()
        })
    }

    /// Deforms every vertex position of `mesh` in place, keeping W.
    pub fn deform_mesh(&self, mesh: &mut Mesh) -> Vec<Diagnostic> {
        let mut diagnostics = Vec::new();
        if self.is_empty() {
            return diagnostics;
        }

        let table: Vec<Option<usize>> = mesh
            .bone_table
            .iter()
            .flatten()
            .map(|name| {
                let bone = self.skeleton.find(name);
                if bone.is_none() {
                    let diagnostic = Diagnostic::BoneNotInSkeleton {
                        mesh: mesh.mesh_index,
                        bone: name.as_str().into(),
                    };
                    tracing::debug!(%diagnostic, "joint left undeformed");
                    diagnostics.push(diagnostic);
                }
                bone
            })
            .collect();

        for vertex in mesh.vertices.iter_mut() {
            let Some(position) = vertex.position else {
                continue;
            };
            let joints: Vec<(Option<usize>, f32)> = vertex
                .joints()
                .into_iter()
                .map(|(blend, weight)| (table.get(blend as usize).copied().flatten(), weight))
                .collect();

            let deformed = self.deform_position(position.truncate(), &joints);
            vertex.position = Some(deformed.extend(position.w));
        }

        diagnostics
    }
}
