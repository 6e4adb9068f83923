use serde::{Deserialize, Serialize};

use crate::binary::{
    read_f32_slice, read_fixed_str, read_u32, read_u32_slice, write_f32_slice, write_fixed_str,
    write_u32, FormatError,
};

/// Current mesh container wire version.
pub const MESH_VERSION: u32 = 1;

/// Width of the NUL-padded material name field in a serialized group.
pub const MATERIAL_NAME_WIDTH: usize = 64;

/// A material-tagged run of triangle indices within one mesh.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexGroup {
    pub material: String,
    pub indices: Vec<u32>,
}

/// Decoded mesh buffers, ready for upload.
///
/// Positions are flat `f32` triples; UVs and normals are optional flat
/// arrays with two and three values per vertex respectively. All index
/// groups reference the same deduplicated vertex buffers.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct MeshContainer {
    pub vertices: Vec<f32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub uvs: Option<Vec<f32>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub normals: Option<Vec<f32>>,
    pub groups: Vec<IndexGroup>,
}

impl MeshContainer {
    /// Number of vertices in the position buffer.
    pub fn vertex_count(&self) -> usize {
        self.vertices.len() / 3
    }

    /// Total triangle count across all index groups.
    pub fn triangle_count(&self) -> usize {
        self.groups.iter().map(|group| group.indices.len() / 3).sum()
    }

    /// Decodes a binary mesh container.
    ///
    /// Every declared count is validated against the buffer before its
    /// data is read, and every triangle index is validated against the
    /// vertex count. Corrupt containers fail instead of producing
    /// partially-garbage buffers.
    pub fn decode(data: &[u8]) -> Result<Self, FormatError> {
        let mut cursor = 0;

        let version = read_u32(data, &mut cursor, "mesh version")?;
        if version != MESH_VERSION {
            return Err(FormatError::UnsupportedVersion {
                container: "mesh",
                version,
            });
        }

        let vertex_count = read_u32(data, &mut cursor, "vertex count")? as usize;
        let uv_count = read_u32(data, &mut cursor, "uv count")? as usize;
        let color_count = read_u32(data, &mut cursor, "color count")? as usize;
        let normal_count = read_u32(data, &mut cursor, "normal count")? as usize;
        let group_count = read_u32(data, &mut cursor, "group count")? as usize;

        if color_count != 0 {
            return Err(FormatError::CountMismatch {
                what: "reserved color count",
                expected: 0,
                found: color_count,
            });
        }

        let vertex_floats = checked_floats(vertex_count, 3, cursor, "vertex array")?;
        if uv_count != 0 && uv_count != vertex_count * 2 {
            return Err(FormatError::CountMismatch {
                what: "uv count",
                expected: vertex_count * 2,
                found: uv_count,
            });
        }
        if normal_count != 0 && normal_count != vertex_floats {
            return Err(FormatError::CountMismatch {
                what: "normal count",
                expected: vertex_floats,
                found: normal_count,
            });
        }

        let vertices = read_f32_slice(data, &mut cursor, vertex_floats, "vertex array")?;
        let uvs = if uv_count > 0 {
            Some(read_f32_slice(data, &mut cursor, uv_count, "uv array")?)
        } else {
            None
        };
        let normals = if normal_count > 0 {
            Some(read_f32_slice(data, &mut cursor, normal_count, "normal array")?)
        } else {
            None
        };

        let mut groups = Vec::with_capacity(group_count.min(256));
        for _ in 0..group_count {
            let material = read_fixed_str(data, &mut cursor, MATERIAL_NAME_WIDTH, "material name")?;
            let index_count = read_u32(data, &mut cursor, "group index count")? as usize;
            let indices = read_u32_slice(data, &mut cursor, index_count, "group indices")?;
            if let Some(&index) = indices.iter().find(|&&index| index as usize >= vertex_count) {
                return Err(FormatError::IndexOutOfRange {
                    group: material,
                    index,
                    vertex_count,
                });
            }
            groups.push(IndexGroup { material, indices });
        }

        Ok(Self {
            vertices,
            uvs,
            normals,
            groups,
        })
    }

    /// Serializes the mesh into the binary container layout.
    ///
    /// Groups with no indices are dropped; the reserved color count is
    /// always written as zero.
    pub fn encode(&self) -> Vec<u8> {
        let vertex_count = self.vertex_count();
        debug_assert_eq!(self.vertices.len(), vertex_count * 3);
        if let Some(uvs) = &self.uvs {
            debug_assert_eq!(uvs.len(), vertex_count * 2);
        }
        if let Some(normals) = &self.normals {
            debug_assert_eq!(normals.len(), vertex_count * 3);
        }

        let groups: Vec<&IndexGroup> = self
            .groups
            .iter()
            .filter(|group| !group.indices.is_empty())
            .collect();

        let mut buffer = Vec::new();
        write_u32(&mut buffer, MESH_VERSION);
        write_u32(&mut buffer, vertex_count as u32);
        write_u32(&mut buffer, self.uvs.as_ref().map_or(0, |uvs| uvs.len() as u32));
        write_u32(&mut buffer, 0);
        write_u32(
            &mut buffer,
            self.normals.as_ref().map_or(0, |normals| normals.len() as u32),
        );
        write_u32(&mut buffer, groups.len() as u32);

        write_f32_slice(&mut buffer, &self.vertices);
        if let Some(uvs) = &self.uvs {
            write_f32_slice(&mut buffer, uvs);
        }
        if let Some(normals) = &self.normals {
            write_f32_slice(&mut buffer, normals);
        }

        for group in groups {
            write_fixed_str(&mut buffer, &group.material, MATERIAL_NAME_WIDTH);
            write_u32(&mut buffer, group.indices.len() as u32);
            for &index in &group.indices {
                write_u32(&mut buffer, index);
            }
        }

        buffer
    }
}

fn checked_floats(
    count: usize,
    per_element: usize,
    cursor: usize,
    what: &'static str,
) -> Result<usize, FormatError> {
    count
        .checked_mul(per_element)
        .ok_or(FormatError::UnexpectedEof { what, offset: cursor })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_mesh() -> MeshContainer {
        MeshContainer {
            vertices: vec![
                0.0, 0.0, 0.0, //
                1.0, 0.0, 0.0, //
                0.0, 1.0, 0.0, //
                1.0, 1.0, 0.0,
            ],
            uvs: Some(vec![0.0, 0.0, 1.0, 0.0, 0.0, 1.0, 1.0, 1.0]),
            normals: Some(vec![
                0.0, 0.0, 1.0, //
                0.0, 0.0, 1.0, //
                0.0, 0.0, 1.0, //
                0.0, 0.0, 1.0,
            ]),
            groups: vec![
                IndexGroup {
                    material: "stone".to_string(),
                    indices: vec![0, 1, 2],
                },
                IndexGroup {
                    material: "metal".to_string(),
                    indices: vec![0, 2, 3],
                },
            ],
        }
    }

    #[test]
    fn roundtrip_preserves_buffers_and_groups() {
        let mesh = sample_mesh();
        let decoded = MeshContainer::decode(&mesh.encode()).unwrap();
        assert_eq!(decoded, mesh);
        assert_eq!(decoded.vertex_count(), 4);
        assert_eq!(decoded.triangle_count(), 2);
    }

    #[test]
    fn positions_only_mesh_has_no_optional_buffers() {
        let mesh = MeshContainer {
            vertices: vec![0.0, 0.0, 0.0, 1.0, 0.0, 0.0, 0.0, 1.0, 0.0],
            uvs: None,
            normals: None,
            groups: vec![IndexGroup {
                material: "default".to_string(),
                indices: vec![0, 1, 2],
            }],
        };
        let decoded = MeshContainer::decode(&mesh.encode()).unwrap();
        assert!(decoded.uvs.is_none());
        assert!(decoded.normals.is_none());
    }

    #[test]
    fn empty_groups_are_dropped_on_encode() {
        let mut mesh = sample_mesh();
        mesh.groups.push(IndexGroup {
            material: "unused".to_string(),
            indices: Vec::new(),
        });
        let decoded = MeshContainer::decode(&mesh.encode()).unwrap();
        assert_eq!(decoded.groups.len(), 2);
        assert!(decoded.groups.iter().all(|g| g.material != "unused"));
    }

    #[test]
    fn truncated_vertex_array_is_an_error() {
        let mut buffer = Vec::new();
        write_u32(&mut buffer, MESH_VERSION);
        write_u32(&mut buffer, 100); // claims 100 vertices
        write_u32(&mut buffer, 0);
        write_u32(&mut buffer, 0);
        write_u32(&mut buffer, 0);
        write_u32(&mut buffer, 0);
        write_f32_slice(&mut buffer, &[0.0; 30]); // room for 10
        let err = MeshContainer::decode(&buffer).unwrap_err();
        assert!(matches!(err, FormatError::UnexpectedEof { .. }));
    }

    #[test]
    fn unknown_version_is_rejected() {
        let mut buffer = sample_mesh().encode();
        buffer[..4].copy_from_slice(&7u32.to_le_bytes());
        let err = MeshContainer::decode(&buffer).unwrap_err();
        assert_eq!(
            err,
            FormatError::UnsupportedVersion {
                container: "mesh",
                version: 7
            }
        );
    }

    #[test]
    fn inconsistent_uv_count_is_rejected() {
        let mut buffer = sample_mesh().encode();
        buffer[8..12].copy_from_slice(&3u32.to_le_bytes());
        let err = MeshContainer::decode(&buffer).unwrap_err();
        assert!(matches!(err, FormatError::CountMismatch { what: "uv count", .. }));
    }

    #[test]
    fn out_of_range_index_is_rejected() {
        let mut mesh = sample_mesh();
        mesh.groups[0].indices[1] = 4;
        let err = MeshContainer::decode(&mesh.encode()).unwrap_err();
        assert_eq!(
            err,
            FormatError::IndexOutOfRange {
                group: "stone".to_string(),
                index: 4,
                vertex_count: 4
            }
        );
    }

    #[test]
    fn truncated_group_record_is_an_error() {
        let mut buffer = sample_mesh().encode();
        buffer.truncate(buffer.len() - 8);
        let err = MeshContainer::decode(&buffer).unwrap_err();
        assert!(matches!(err, FormatError::UnexpectedEof { .. }));
    }
}
