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

use std::collections::HashMap;
use std::fmt::Write as _;

use glam::{Vec2, Vec3};
use log::debug;
use umber_mesh::{Interpolation, SceneData};

use crate::{FormatError, FormatResult};

fn parse_f32(token: Option<&str>) -> FormatResult<f32> {
    token
        .and_then(|t| t.parse().ok())
        .ok_or_else(|| FormatError::Parse("obj: expected a number".to_owned()))
}

/// Face corner reference `v/vt/vn` with 1-based, possibly negative indices.
fn resolve_index(token: &str, count: usize) -> FormatResult<Option<u32>> {
    if token.is_empty() {
        return Ok(None);
    }
    let index: i64 = token
        .parse()
        .map_err(|_| FormatError::Parse(format!("obj: bad index {}", token)))?;
    let resolved = if index < 0 {
        count as i64 + index
    } else {
        index - 1
    };
    if resolved < 0 || resolved >= count as i64 {
        return Err(FormatError::Parse(format!("obj: index {} out of range", token)));
    }
    Ok(Some(resolved as u32))
}

struct ObjMeshBuilder {
    name: String,
    material: Option<String>,
    face_counts: Vec<u32>,
    corners: Vec<(u32, Option<u32>, Option<u32>)>,
}

/// Parse MTL content into the fixed material input set.
fn parse_mtl(text: &str, scene: &mut SceneData, by_name: &mut HashMap<String, usize>) {
    let mut current: Option<usize> = None;
    for line in text.lines() {
        let mut tokens = line.split_ascii_whitespace();
        match tokens.next() {
            Some("newmtl") => {
                if let Some(name) = tokens.next() {
                    let index = scene.add_material();
                    scene.materials[index].name = name.to_owned();
                    by_name.insert(name.to_owned(), index);
                    current = Some(index);
                }
            }
            Some("Kd") => {
                if let (Some(index), Ok(r), Ok(g), Ok(b)) = (
                    current,
                    parse_f32(tokens.next()),
                    parse_f32(tokens.next()),
                    parse_f32(tokens.next()),
                ) {
                    scene.materials[index].diffuse_color = Some(Vec3::new(r, g, b));
                }
            }
            Some("Ke") => {
                if let (Some(index), Ok(r), Ok(g), Ok(b)) = (
                    current,
                    parse_f32(tokens.next()),
                    parse_f32(tokens.next()),
                    parse_f32(tokens.next()),
                ) {
                    scene.materials[index].emissive_color = Some(Vec3::new(r, g, b));
                }
            }
            Some("d") => {
                if let (Some(index), Ok(opacity)) = (current, parse_f32(tokens.next())) {
                    scene.materials[index].opacity = Some(opacity);
                }
            }
            Some("Ni") => {
                if let (Some(index), Ok(ior)) = (current, parse_f32(tokens.next())) {
                    scene.materials[index].ior = Some(ior);
                }
            }
            Some("Pm") => {
                if let (Some(index), Ok(metallic)) = (current, parse_f32(tokens.next())) {
                    scene.materials[index].metallic = Some(metallic);
                }
            }
            Some("Pr") => {
                if let (Some(index), Ok(roughness)) = (current, parse_f32(tokens.next())) {
                    scene.materials[index].roughness = Some(roughness);
                }
            }
            _ => {}
        }
    }
}

/// Read an OBJ file (with optional inline MTL content) into the
/// intermediate. Groups and objects start new meshes; `usemtl` binds the
/// active material.
pub fn import_obj(data: &[u8], mtl: Option<&str>, scene: &mut SceneData) -> FormatResult<()> {
    let text = std::str::from_utf8(data)
        .map_err(|_| FormatError::Parse("obj: not valid ascii".to_owned()))?;

    let mut materials = HashMap::new();
    if let Some(mtl) = mtl {
        parse_mtl(mtl, scene, &mut materials);
    }

    let mut positions: Vec<Vec3> = Vec::new();
    let mut uvs: Vec<Vec2> = Vec::new();
    let mut normals: Vec<Vec3> = Vec::new();
    let mut builders: Vec<ObjMeshBuilder> = Vec::new();
    let mut active_material: Option<String> = None;

    for line in text.lines() {
        let mut tokens = line.split_ascii_whitespace();
        match tokens.next() {
            Some("v") => positions.push(Vec3::new(
                parse_f32(tokens.next())?,
                parse_f32(tokens.next())?,
                parse_f32(tokens.next())?,
            )),
            Some("vt") => uvs.push(Vec2::new(
                parse_f32(tokens.next())?,
                parse_f32(tokens.next())?,
            )),
            Some("vn") => normals.push(Vec3::new(
                parse_f32(tokens.next())?,
                parse_f32(tokens.next())?,
                parse_f32(tokens.next())?,
            )),
            Some("o") | Some("g") => {
                let name = tokens.next().unwrap_or("default").to_owned();
                builders.push(ObjMeshBuilder {
                    name,
                    material: active_material.clone(),
                    face_counts: Vec::new(),
                    corners: Vec::new(),
                });
            }
            Some("usemtl") => {
                active_material = tokens.next().map(str::to_owned);
                if let Some(builder) = builders.last_mut() {
                    if builder.face_counts.is_empty() {
                        builder.material = active_material.clone();
                    }
                }
            }
            Some("f") => {
                if builders.is_empty() {
                    builders.push(ObjMeshBuilder {
                        name: "default".to_owned(),
                        material: active_material.clone(),
                        face_counts: Vec::new(),
                        corners: Vec::new(),
                    });
                }
                let builder = builders.last_mut().expect("just ensured");
                let mut count = 0u32;
                for corner in tokens {
                    let mut parts = corner.split('/');
                    let position = resolve_index(parts.next().unwrap_or(""), positions.len())?
                        .ok_or_else(|| {
                            FormatError::Parse("obj: face corner without position".to_owned())
                        })?;
                    let uv = match parts.next() {
                        Some(token) => resolve_index(token, uvs.len())?,
                        None => None,
                    };
                    let normal = match parts.next() {
                        Some(token) => resolve_index(token, normals.len())?,
                        None => None,
                    };
                    builder.corners.push((position, uv, normal));
                    count += 1;
                }
                if count < 3 {
                    return Err(FormatError::Parse("obj: face with fewer than 3 corners".to_owned()));
                }
                builder.face_counts.push(count);
            }
            _ => {}
        }
    }

    let node = scene.add_node(None);
    for builder in builders {
        if builder.face_counts.is_empty() {
            continue;
        }
        let mesh_index = scene.add_mesh();
        let mesh = &mut scene.meshes[mesh_index];
        mesh.name = builder.name;
        mesh.material = builder
            .material
            .as_ref()
            .and_then(|name| materials.get(name))
            .copied();
        mesh.face_counts = builder.face_counts;

        // Re-index per mesh so every mesh owns a compact point set.
        let mut remap: HashMap<u32, u32> = HashMap::new();
        let mut mesh_uvs = Vec::new();
        let mut mesh_normals = Vec::new();
        for (position, uv, normal) in builder.corners {
            let next = remap.len() as u32;
            let index = *remap.entry(position).or_insert_with(|| {
                mesh.points.push(positions[position as usize]);
                next
            });
            mesh.indices.push(index);
            if let Some(uv) = uv {
                mesh_uvs.push(uvs[uv as usize]);
            }
            if let Some(normal) = normal {
                mesh_normals.push(normals[normal as usize]);
            }
        }
        if mesh_uvs.len() == mesh.indices.len() {
            mesh.uvs.interpolation = Interpolation::FaceVarying;
            mesh.uvs.values = mesh_uvs;
        }
        if mesh_normals.len() == mesh.indices.len() {
            mesh.normals.interpolation = Interpolation::FaceVarying;
            mesh.normals.values = mesh_normals;
        }
        scene.nodes[node].static_meshes.push(mesh_index);
    }

    debug!(
        "obj::import {} meshes, {} materials",
        scene.meshes.len(),
        scene.materials.len()
    );
    Ok(())
}

/// Write the scene as OBJ plus MTL content.
pub fn export_obj(scene: &SceneData) -> FormatResult<(String, String)> {
    let mut obj = String::new();
    let mut mtl = String::new();

    for material in &scene.materials {
        let _ = writeln!(mtl, "newmtl {}", material.name);
        if let Some(diffuse) = material.diffuse_color {
            let _ = writeln!(mtl, "Kd {} {} {}", diffuse.x, diffuse.y, diffuse.z);
        }
        if let Some(emissive) = material.emissive_color {
            let _ = writeln!(mtl, "Ke {} {} {}", emissive.x, emissive.y, emissive.z);
        }
        if let Some(opacity) = material.opacity {
            let _ = writeln!(mtl, "d {}", opacity);
        }
        if let Some(ior) = material.ior {
            let _ = writeln!(mtl, "Ni {}", ior);
        }
        if let Some(metallic) = material.metallic {
            let _ = writeln!(mtl, "Pm {}", metallic);
        }
        if let Some(roughness) = material.roughness {
            let _ = writeln!(mtl, "Pr {}", roughness);
        }
    }

    let mut base_position = 1usize;
    let mut base_uv = 1usize;
    let mut base_normal = 1usize;
    for mesh in &scene.meshes {
        let _ = writeln!(obj, "o {}", if mesh.name.is_empty() { "mesh" } else { &mesh.name });
        if let Some(material) = mesh.material.and_then(|m| scene.materials.get(m)) {
            let _ = writeln!(obj, "usemtl {}", material.name);
        }
        for point in &mesh.points {
            let _ = writeln!(obj, "v {} {} {}", point.x, point.y, point.z);
        }
        for uv in &mesh.uvs.values {
            let _ = writeln!(obj, "vt {} {}", uv.x, uv.y);
        }
        for normal in &mesh.normals.values {
            let _ = writeln!(obj, "vn {} {} {}", normal.x, normal.y, normal.z);
        }

        let has_uvs = mesh.uvs.values.len() == mesh.indices.len();
        let has_normals = mesh.normals.values.len() == mesh.indices.len();
        let mut cursor = 0usize;
        for count in &mesh.face_counts {
            let count = *count as usize;
            obj.push('f');
            for corner in cursor..cursor + count {
                let position = base_position + mesh.indices[corner] as usize;
                match (has_uvs, has_normals) {
                    (true, true) => {
                        let _ = write!(
                            obj,
                            " {}/{}/{}",
                            position,
                            base_uv + corner,
                            base_normal + corner
                        );
                    }
                    (true, false) => {
                        let _ = write!(obj, " {}/{}", position, base_uv + corner);
                    }
                    (false, true) => {
                        let _ = write!(obj, " {}//{}", position, base_normal + corner);
                    }
                    (false, false) => {
                        let _ = write!(obj, " {}", position);
                    }
                }
            }
            obj.push('\n');
            cursor += count;
        }

        base_position += mesh.points.len();
        base_uv += mesh.uvs.values.len();
        base_normal += mesh.normals.values.len();
    }

    Ok((obj, mtl))
}
