// Copyright (C) 2025 gigablaster

// This program is free software: you can redistribute it and/or modify
// it under the terms of the GNU General Public License as published by
// the Free Software Foundation, either version 3 of the License, or
// (at your option) any later version.

// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the
// GNU General Public License for more details.

// You should have received a copy of the GNU General Public License
// along with this program.  If not, see <http://www.gnu.org/licenses/>.

use std::io::Cursor;

use byteorder::{ReadBytesExt, WriteBytesExt, LE};
use glam::Vec3;
use log::debug;
use umber_mesh::{Interpolation, Primvar, SceneData};

use crate::{FormatError, FormatResult};

const BINARY_HEADER_SIZE: usize = 80;
const FACET_RECORD_SIZE: usize = 50;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StlFormat {
    Ascii,
    Binary,
}

#[derive(Debug, Clone, Copy)]
pub struct StlFacet {
    pub normal: Vec3,
    pub vertices: [Vec3; 3],
}

#[derive(Debug, Default)]
pub struct StlModel {
    pub facets: Vec<StlFacet>,
}

/// ASCII files must start with `solid`, but a binary file is allowed to as
/// well. The tie breaker is the binary size formula: header plus facet
/// records for the count stored at offset 80.
pub fn detect_stl_format(data: &[u8]) -> StlFormat {
    let starts_with_solid = data
        .split(|b| b.is_ascii_whitespace())
        .next()
        .is_some_and(|token| token == b"solid");
    if !starts_with_solid {
        return StlFormat::Binary;
    }
    if data.len() >= BINARY_HEADER_SIZE + 4 {
        let facet_count = u32::from_le_bytes([data[80], data[81], data[82], data[83]]) as usize;
        let expected = BINARY_HEADER_SIZE + 4 + FACET_RECORD_SIZE * facet_count;
        if expected == data.len() {
            // The size matches the binary layout; the leading token lies.
            return StlFormat::Binary;
        }
    }
    StlFormat::Ascii
}

fn parse_ascii(data: &[u8]) -> FormatResult<StlModel> {
    let text = std::str::from_utf8(data)
        .map_err(|_| FormatError::Parse("stl: not valid ascii".to_owned()))?;
    let mut tokens = text.split_ascii_whitespace();
    let mut model = StlModel::default();

    fn next_f32<'a>(tokens: &mut impl Iterator<Item = &'a str>) -> FormatResult<f32> {
        tokens
            .next()
            .and_then(|t| t.parse().ok())
            .ok_or_else(|| FormatError::Parse("stl: expected a number".to_owned()))
    }
    fn next_vec3<'a>(tokens: &mut impl Iterator<Item = &'a str>) -> FormatResult<Vec3> {
        Ok(Vec3::new(
            next_f32(tokens)?,
            next_f32(tokens)?,
            next_f32(tokens)?,
        ))
    }

    while let Some(token) = tokens.next() {
        if token != "facet" {
            continue;
        }
        // facet normal nx ny nz
        if tokens.next() != Some("normal") {
            return Err(FormatError::Parse("stl: expected facet normal".to_owned()));
        }
        let normal = next_vec3(&mut tokens)?;
        // outer loop
        tokens.next();
        tokens.next();
        let mut vertices = [Vec3::ZERO; 3];
        for vertex in &mut vertices {
            if tokens.next() != Some("vertex") {
                return Err(FormatError::Parse("stl: expected vertex".to_owned()));
            }
            *vertex = next_vec3(&mut tokens)?;
        }
        model.facets.push(StlFacet { normal, vertices });
    }
    Ok(model)
}

fn parse_binary(data: &[u8]) -> FormatResult<StlModel> {
    if data.len() < BINARY_HEADER_SIZE + 4 {
        return Err(FormatError::Parse("stl: file too small".to_owned()));
    }
    let mut r = Cursor::new(&data[BINARY_HEADER_SIZE..]);
    let facet_count = r.read_u32::<LE>()? as usize;
    let mut model = StlModel::default();
    model.facets.reserve(facet_count);
    for _ in 0..facet_count {
        let mut values = [0.0f32; 12];
        for value in &mut values {
            *value = r.read_f32::<LE>()?;
        }
        let _attributes = r.read_u16::<LE>()?;
        model.facets.push(StlFacet {
            normal: Vec3::from_slice(&values[0..3]),
            vertices: [
                Vec3::from_slice(&values[3..6]),
                Vec3::from_slice(&values[6..9]),
                Vec3::from_slice(&values[9..12]),
            ],
        });
    }
    Ok(model)
}

impl StlModel {
    pub fn read(data: &[u8]) -> FormatResult<Self> {
        match detect_stl_format(data) {
            StlFormat::Ascii => parse_ascii(data),
            StlFormat::Binary => parse_binary(data),
        }
    }

    pub fn write(&self, format: StlFormat) -> Vec<u8> {
        match format {
            StlFormat::Ascii => {
                let mut out = String::from("solid\n");
                for facet in &self.facets {
                    out.push_str(&format!(
                        "facet normal {:e} {:e} {:e}\n",
                        facet.normal.x, facet.normal.y, facet.normal.z
                    ));
                    out.push_str("outer loop\n");
                    for vertex in &facet.vertices {
                        out.push_str(&format!("vertex {:e} {:e} {:e}\n", vertex.x, vertex.y, vertex.z));
                    }
                    out.push_str("endloop\nendfacet\n");
                }
                out.push_str("endsolid");
                out.into_bytes()
            }
            StlFormat::Binary => {
                let mut out = Vec::with_capacity(
                    BINARY_HEADER_SIZE + 4 + self.facets.len() * FACET_RECORD_SIZE,
                );
                out.extend_from_slice(&[0u8; BINARY_HEADER_SIZE]);
                out.write_u32::<LE>(self.facets.len() as u32).unwrap();
                for facet in &self.facets {
                    for v in [
                        facet.normal,
                        facet.vertices[0],
                        facet.vertices[1],
                        facet.vertices[2],
                    ] {
                        out.write_f32::<LE>(v.x).unwrap();
                        out.write_f32::<LE>(v.y).unwrap();
                        out.write_f32::<LE>(v.z).unwrap();
                    }
                    out.write_u16::<LE>(0).unwrap();
                }
                out
            }
        }
    }
}

fn facet_normal(vertices: &[Vec3; 3]) -> Vec3 {
    (vertices[1] - vertices[0])
        .cross(vertices[2] - vertices[0])
        .normalize_or_zero()
}

/// Translate a model into the intermediate: one mesh, one facet per face.
pub fn import_stl(data: &[u8], scene: &mut SceneData) -> FormatResult<()> {
    let model = StlModel::read(data)?;
    debug!("stl::import {} facets", model.facets.len());

    let mesh_index = scene.add_mesh();
    let mesh = &mut scene.meshes[mesh_index];
    mesh.name = "mesh".to_owned();
    let mut normals = Vec::with_capacity(model.facets.len());
    for facet in &model.facets {
        let base = mesh.points.len() as u32;
        mesh.points.extend_from_slice(&facet.vertices);
        mesh.indices.extend_from_slice(&[base, base + 1, base + 2]);
        mesh.face_counts.push(3);
        let normal = if facet.normal.length_squared() > 0.0 {
            facet.normal
        } else {
            facet_normal(&facet.vertices)
        };
        normals.push(normal);
    }
    mesh.normals = Primvar {
        interpolation: Interpolation::Uniform,
        values: normals,
        indices: Vec::new(),
    };

    let node = scene.add_node(None);
    scene.nodes[node].static_meshes.push(mesh_index);
    Ok(())
}

/// Triangulate every mesh of the scene into facets.
pub fn export_stl(scene: &SceneData, format: StlFormat) -> FormatResult<Vec<u8>> {
    let mut model = StlModel::default();
    for mesh in &scene.meshes {
        let mut cursor = 0usize;
        for (face, count) in mesh.face_counts.iter().enumerate() {
            let count = *count as usize;
            if cursor + count > mesh.indices.len() {
                return Err(FormatError::Parse("stl: face indices out of range".to_owned()));
            }
            // Fan triangulation for anything bigger than a triangle.
            for i in 1..count.saturating_sub(1) {
                let pick = |slot: usize| -> FormatResult<Vec3> {
                    mesh.points
                        .get(mesh.indices[slot] as usize)
                        .copied()
                        .ok_or_else(|| {
                            FormatError::Parse("stl: vertex index out of range".to_owned())
                        })
                };
                let vertices = [pick(cursor)?, pick(cursor + i)?, pick(cursor + i + 1)?];
                let normal = mesh
                    .normals
                    .values
                    .get(face)
                    .copied()
                    .filter(|_| mesh.normals.interpolation == Interpolation::Uniform)
                    .unwrap_or_else(|| facet_normal(&vertices));
                model.facets.push(StlFacet { normal, vertices });
            }
            cursor += count;
        }
    }
    debug!("stl::export {} facets", model.facets.len());
    Ok(model.write(format))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn triangle() -> StlModel {
        StlModel {
            facets: vec![StlFacet {
                normal: Vec3::Z,
                vertices: [Vec3::ZERO, Vec3::X, Vec3::Y],
            }],
        }
    }

    #[test]
    fn binary_round_trip() {
        let data = triangle().write(StlFormat::Binary);
        assert_eq!(data.len(), 84 + 50);
        assert_eq!(detect_stl_format(&data), StlFormat::Binary);
        let model = StlModel::read(&data).unwrap();
        assert_eq!(model.facets.len(), 1);
        assert_eq!(model.facets[0].vertices[1], Vec3::X);
    }

    #[test]
    fn ascii_round_trip() {
        let data = triangle().write(StlFormat::Ascii);
        assert_eq!(detect_stl_format(&data), StlFormat::Ascii);
        let model = StlModel::read(&data).unwrap();
        assert_eq!(model.facets.len(), 1);
        assert_eq!(model.facets[0].normal, Vec3::Z);
    }

    #[test]
    fn solid_prefixed_binary_is_detected() {
        // 184 bytes, leading token "solid ", facet count 2 at offset 80:
        // 184 == 84 + 50 * 2, so this is binary despite the prefix.
        let mut data = vec![0u8; 184];
        data[..6].copy_from_slice(b"solid ");
        data[80..84].copy_from_slice(&2i32.to_le_bytes());
        assert_eq!(detect_stl_format(&data), StlFormat::Binary);
        let model = StlModel::read(&data).unwrap();
        assert_eq!(model.facets.len(), 2);
    }

    #[test]
    fn scene_round_trip() {
        let mut scene = SceneData::default();
        import_stl(&triangle().write(StlFormat::Binary), &mut scene).unwrap();
        assert_eq!(scene.meshes.len(), 1);
        assert_eq!(scene.meshes[0].points.len(), 3);
        assert_eq!(scene.meshes[0].face_counts, vec![3]);

        let exported = export_stl(&scene, StlFormat::Binary).unwrap();
        let model = StlModel::read(&exported).unwrap();
        assert_eq!(model.facets.len(), 1);
    }
}
