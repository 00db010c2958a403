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

use std::io::{Cursor, Read};

use byteorder::{ReadBytesExt, WriteBytesExt, LE};
use glam::{Quat, Vec3};
use log::debug;
use umber_host::{arg_read_bool, arg_read_float, arg_read_float_array, FormatArgMap};
use umber_mesh::{
    color_to_sh, decode_opacity, decode_width, encode_opacity, encode_width,
    sh_bands_from_degree, sh_degree_from_coeff_count, sh_to_color, Interpolation, SceneData,
    UpAxis,
};

use crate::{FormatError, FormatResult};

const DEBUG_TAG: &str = "PLY";

/// Arguments of the point/splat import path.
#[derive(Debug, Clone, Default)]
pub struct PlyArgs {
    pub points: bool,
    pub point_width: f32,
    pub with_up_axis_correction: bool,
    pub gsplats_clipping_box: Vec<f32>,
}

pub fn parse_ply_args(args: &FormatArgMap) -> PlyArgs {
    let mut out = PlyArgs {
        point_width: 0.01,
        ..Default::default()
    };
    arg_read_bool(args, "plyPoints", &mut out.points, DEBUG_TAG);
    arg_read_float(args, "plyPointWidth", &mut out.point_width, DEBUG_TAG);
    arg_read_bool(
        args,
        "plyWithUpAxisCorrection",
        &mut out.with_up_axis_correction,
        DEBUG_TAG,
    );
    arg_read_float_array(
        args,
        "plyGsplatsClippingBox",
        &mut out.gsplats_clipping_box,
        DEBUG_TAG,
    );
    out
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum PlyEncoding {
    Ascii,
    BinaryLittleEndian,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ScalarType {
    Char,
    UChar,
    Short,
    UShort,
    Int,
    UInt,
    Float,
    Double,
}

impl ScalarType {
    fn parse(token: &str) -> Option<Self> {
        Some(match token {
            "char" | "int8" => Self::Char,
            "uchar" | "uint8" => Self::UChar,
            "short" | "int16" => Self::Short,
            "ushort" | "uint16" => Self::UShort,
            "int" | "int32" => Self::Int,
            "uint" | "uint32" => Self::UInt,
            "float" | "float32" => Self::Float,
            "double" | "float64" => Self::Double,
            _ => return None,
        })
    }

    fn read_binary(self, r: &mut impl Read) -> FormatResult<f64> {
        Ok(match self {
            Self::Char => r.read_i8()? as f64,
            Self::UChar => r.read_u8()? as f64,
            Self::Short => r.read_i16::<LE>()? as f64,
            Self::UShort => r.read_u16::<LE>()? as f64,
            Self::Int => r.read_i32::<LE>()? as f64,
            Self::UInt => r.read_u32::<LE>()? as f64,
            Self::Float => r.read_f32::<LE>()? as f64,
            Self::Double => r.read_f64::<LE>()?,
        })
    }

    fn normalization(self) -> f64 {
        match self {
            Self::UChar => 255.0,
            Self::UShort => 65535.0,
            _ => 1.0,
        }
    }
}

#[derive(Debug)]
struct Property {
    name: String,
    scalar: ScalarType,
    list_count: Option<ScalarType>,
}

#[derive(Debug)]
struct Element {
    name: String,
    count: usize,
    properties: Vec<Property>,
}

struct Header {
    encoding: PlyEncoding,
    elements: Vec<Element>,
    data_offset: usize,
}

fn parse_header(data: &[u8]) -> FormatResult<Header> {
    let end = data
        .windows(10)
        .position(|w| w == b"end_header")
        .ok_or_else(|| FormatError::Parse("ply: missing end_header".to_owned()))?;
    let mut data_offset = end + 10;
    while data_offset < data.len() && (data[data_offset] == b'\r' || data[data_offset] == b'\n') {
        data_offset += 1;
        if data.get(data_offset - 1) == Some(&b'\n') {
            break;
        }
    }
    let header_text = std::str::from_utf8(&data[..end])
        .map_err(|_| FormatError::Parse("ply: header is not ascii".to_owned()))?;

    let mut lines = header_text.lines();
    if lines.next().map(str::trim) != Some("ply") {
        return Err(FormatError::Parse("ply: missing magic".to_owned()));
    }

    let mut encoding = None;
    let mut elements: Vec<Element> = Vec::new();
    for line in lines {
        let mut tokens = line.split_ascii_whitespace();
        match tokens.next() {
            Some("format") => {
                encoding = Some(match tokens.next() {
                    Some("ascii") => PlyEncoding::Ascii,
                    Some("binary_little_endian") => PlyEncoding::BinaryLittleEndian,
                    other => {
                        return Err(FormatError::Unsupported(format!(
                            "ply: format {:?}",
                            other
                        )))
                    }
                });
            }
            Some("element") => {
                let name = tokens
                    .next()
                    .ok_or_else(|| FormatError::Parse("ply: element without name".to_owned()))?;
                let count = tokens
                    .next()
                    .and_then(|t| t.parse().ok())
                    .ok_or_else(|| FormatError::Parse("ply: element without count".to_owned()))?;
                elements.push(Element {
                    name: name.to_owned(),
                    count,
                    properties: Vec::new(),
                });
            }
            Some("property") => {
                let element = elements
                    .last_mut()
                    .ok_or_else(|| FormatError::Parse("ply: property before element".to_owned()))?;
                let kind = tokens
                    .next()
                    .ok_or_else(|| FormatError::Parse("ply: property without type".to_owned()))?;
                if kind == "list" {
                    let count_type = tokens
                        .next()
                        .and_then(ScalarType::parse)
                        .ok_or_else(|| FormatError::Parse("ply: bad list count type".to_owned()))?;
                    let scalar = tokens
                        .next()
                        .and_then(ScalarType::parse)
                        .ok_or_else(|| FormatError::Parse("ply: bad list type".to_owned()))?;
                    let name = tokens
                        .next()
                        .ok_or_else(|| FormatError::Parse("ply: list without name".to_owned()))?;
                    element.properties.push(Property {
                        name: name.to_owned(),
                        scalar,
                        list_count: Some(count_type),
                    });
                } else {
                    let scalar = ScalarType::parse(kind).ok_or_else(|| {
                        FormatError::Parse(format!("ply: unknown type {}", kind))
                    })?;
                    let name = tokens
                        .next()
                        .ok_or_else(|| FormatError::Parse("ply: property without name".to_owned()))?;
                    element.properties.push(Property {
                        name: name.to_owned(),
                        scalar,
                        list_count: None,
                    });
                }
            }
            Some("comment") | Some("obj_info") | None => {}
            Some(other) => {
                return Err(FormatError::Parse(format!("ply: unknown keyword {}", other)))
            }
        }
    }

    Ok(Header {
        encoding: encoding
            .ok_or_else(|| FormatError::Parse("ply: missing format line".to_owned()))?,
        elements,
        data_offset,
    })
}

/// Parsed body: per element, per scalar property a column of values, plus
/// the face index lists.
#[derive(Default)]
struct ElementData {
    columns: Vec<Vec<f64>>,
    lists: Vec<Vec<Vec<u32>>>,
}

fn parse_body(header: &Header, data: &[u8]) -> FormatResult<Vec<ElementData>> {
    let mut out = Vec::new();
    match header.encoding {
        PlyEncoding::BinaryLittleEndian => {
            let mut r = Cursor::new(&data[header.data_offset.min(data.len())..]);
            for element in &header.elements {
                let mut parsed = ElementData {
                    columns: vec![Vec::with_capacity(element.count); element.properties.len()],
                    lists: vec![Vec::new(); element.properties.len()],
                };
                for _ in 0..element.count {
                    for (index, property) in element.properties.iter().enumerate() {
                        match property.list_count {
                            Some(count_type) => {
                                let count = count_type.read_binary(&mut r)? as usize;
                                let mut list = Vec::with_capacity(count);
                                for _ in 0..count {
                                    list.push(property.scalar.read_binary(&mut r)? as u32);
                                }
                                parsed.lists[index].push(list);
                            }
                            None => {
                                parsed.columns[index].push(property.scalar.read_binary(&mut r)?);
                            }
                        }
                    }
                }
                out.push(parsed);
            }
        }
        PlyEncoding::Ascii => {
            let text = std::str::from_utf8(&data[header.data_offset.min(data.len())..])
                .map_err(|_| FormatError::Parse("ply: body is not ascii".to_owned()))?;
            let mut tokens = text.split_ascii_whitespace();
            let mut next = || -> FormatResult<f64> {
                tokens
                    .next()
                    .and_then(|t| t.parse().ok())
                    .ok_or_else(|| FormatError::Parse("ply: truncated body".to_owned()))
            };
            for element in &header.elements {
                let mut parsed = ElementData {
                    columns: vec![Vec::with_capacity(element.count); element.properties.len()],
                    lists: vec![Vec::new(); element.properties.len()],
                };
                for _ in 0..element.count {
                    for (index, property) in element.properties.iter().enumerate() {
                        match property.list_count {
                            Some(_) => {
                                let count = next()? as usize;
                                let mut list = Vec::with_capacity(count);
                                for _ in 0..count {
                                    list.push(next()? as u32);
                                }
                                parsed.lists[index].push(list);
                            }
                            None => parsed.columns[index].push(next()?),
                        }
                    }
                }
                out.push(parsed);
            }
        }
    }
    Ok(out)
}

fn column<'a>(
    element: &Element,
    parsed: &'a ElementData,
    name: &str,
) -> Option<(&'a Vec<f64>, ScalarType)> {
    element
        .properties
        .iter()
        .position(|p| p.name == name && p.list_count.is_none())
        .map(|index| (&parsed.columns[index], element.properties[index].scalar))
}

/// Splat files carry `f_rest_<n>` coefficient properties, all bands of one
/// channel first. That matches the intermediate layout, so the copy is
/// direct.
fn rest_coefficients(element: &Element, parsed: &ElementData) -> Vec<Vec<f64>> {
    let mut rest = Vec::new();
    loop {
        match column(element, parsed, &format!("f_rest_{}", rest.len())) {
            Some((values, _)) => rest.push(values.clone()),
            None => break,
        }
    }
    rest
}

/// Read a PLY file into the intermediate. Regular meshes come in as faces
/// and points; splat files additionally decode widths, opacity, rotations
/// and spherical harmonics.
pub fn import_ply(data: &[u8], args: &PlyArgs, scene: &mut SceneData) -> FormatResult<()> {
    let header = parse_header(data)?;
    let body = parse_body(&header, data)?;

    let vertex_pos = header
        .elements
        .iter()
        .position(|e| e.name == "vertex")
        .ok_or_else(|| FormatError::Parse("ply: no vertex element".to_owned()))?;
    let element = &header.elements[vertex_pos];
    let parsed = &body[vertex_pos];

    let mesh_index = scene.add_mesh();
    let x = column(element, parsed, "x")
        .ok_or_else(|| FormatError::Parse("ply: missing x".to_owned()))?
        .0;
    let y = column(element, parsed, "y")
        .ok_or_else(|| FormatError::Parse("ply: missing y".to_owned()))?
        .0;
    let z = column(element, parsed, "z")
        .ok_or_else(|| FormatError::Parse("ply: missing z".to_owned()))?
        .0;
    let num_points = x.len().min(y.len()).min(z.len());
    {
        let mesh = &mut scene.meshes[mesh_index];
        mesh.name = "mesh".to_owned();
        mesh.points = (0..num_points)
            .map(|i| Vec3::new(x[i] as f32, y[i] as f32, z[i] as f32))
            .collect();
    }

    let is_gsplat = column(element, parsed, "scale_0").is_some()
        && column(element, parsed, "rot_0").is_some()
        && column(element, parsed, "f_dc_0").is_some();

    if is_gsplat {
        debug!("ply::import gsplat cloud with {} points", num_points);
        let mesh = &mut scene.meshes[mesh_index];
        mesh.as_points = true;
        mesh.as_gsplats = true;

        if let Some((opacity, _)) = column(element, parsed, "opacity") {
            let index = scene.add_opacity_set(mesh_index);
            let set = &mut scene.meshes[mesh_index].opacities[index];
            set.interpolation = Interpolation::Vertex;
            set.values = opacity.iter().map(|o| decode_opacity(*o as f32)).collect();
        }

        // Base color is the zeroth SH coefficient.
        let dc: Vec<&Vec<f64>> = (0..3)
            .filter_map(|i| column(element, parsed, &format!("f_dc_{}", i)).map(|c| c.0))
            .collect();
        if dc.len() == 3 {
            let index = scene.add_color_set(mesh_index);
            let set = &mut scene.meshes[mesh_index].colors[index];
            set.interpolation = Interpolation::Vertex;
            set.values = (0..num_points)
                .map(|i| {
                    Vec3::new(
                        sh_to_color(dc[0][i] as f32),
                        sh_to_color(dc[1][i] as f32),
                        sh_to_color(dc[2][i] as f32),
                    )
                })
                .collect();
        }

        for axis in 0..3 {
            let Some((scales, _)) = column(element, parsed, &format!("scale_{}", axis)) else {
                continue;
            };
            let widths: Vec<f32> = scales.iter().map(|s| decode_width(*s as f32)).collect();
            if axis == 0 {
                scene.meshes[mesh_index].point_widths = widths;
            } else {
                let index = scene.add_extra_width_set(mesh_index);
                let set = &mut scene.meshes[mesh_index].point_extra_widths[index];
                set.interpolation = Interpolation::Vertex;
                set.values = widths;
            }
        }

        let rot: Vec<&Vec<f64>> = (0..4)
            .filter_map(|i| column(element, parsed, &format!("rot_{}", i)).map(|c| c.0))
            .collect();
        if rot.len() == 4 {
            let mesh = &mut scene.meshes[mesh_index];
            mesh.point_rotations.interpolation = Interpolation::Vertex;
            // rot_0 is the scalar part.
            mesh.point_rotations.values = (0..num_points)
                .map(|i| {
                    Quat::from_xyzw(
                        rot[1][i] as f32,
                        rot[2][i] as f32,
                        rot[3][i] as f32,
                        rot[0][i] as f32,
                    )
                    .normalize()
                })
                .collect();
        }

        for rest in rest_coefficients(element, parsed) {
            let index = scene.add_sh_coeff_set(mesh_index);
            let set = &mut scene.meshes[mesh_index].point_sh_coeffs[index];
            set.interpolation = Interpolation::Vertex;
            set.values = rest.iter().map(|v| *v as f32).collect();
        }

        if args.gsplats_clipping_box.len() >= 6 {
            apply_clipping_box(
                &mut scene.meshes[mesh_index],
                &args.gsplats_clipping_box,
            );
        }
    } else {
        if let Some((nx, _)) = column(element, parsed, "nx") {
            let ny = column(element, parsed, "ny");
            let nz = column(element, parsed, "nz");
            if let (Some((ny, _)), Some((nz, _))) = (ny, nz) {
                let mesh = &mut scene.meshes[mesh_index];
                mesh.normals.interpolation = Interpolation::Vertex;
                mesh.normals.values = (0..num_points)
                    .map(|i| Vec3::new(nx[i] as f32, ny[i] as f32, nz[i] as f32))
                    .collect();
            }
        }
        let colors: Vec<(&Vec<f64>, ScalarType)> = ["red", "green", "blue"]
            .into_iter()
            .filter_map(|name| column(element, parsed, name))
            .collect();
        if colors.len() == 3 {
            let index = scene.add_color_set(mesh_index);
            let set = &mut scene.meshes[mesh_index].colors[index];
            set.interpolation = Interpolation::Vertex;
            set.values = (0..num_points)
                .map(|i| {
                    Vec3::new(
                        (colors[0].0[i] / colors[0].1.normalization()) as f32,
                        (colors[1].0[i] / colors[1].1.normalization()) as f32,
                        (colors[2].0[i] / colors[2].1.normalization()) as f32,
                    )
                })
                .collect();
        }

        // Faces, when present and not overridden by the points argument.
        if !args.points {
            if let Some(face_pos) = header.elements.iter().position(|e| e.name == "face") {
                let face_element = &header.elements[face_pos];
                let face_parsed = &body[face_pos];
                if let Some(list_index) = face_element
                    .properties
                    .iter()
                    .position(|p| p.list_count.is_some())
                {
                    let mesh = &mut scene.meshes[mesh_index];
                    for list in &face_parsed.lists[list_index] {
                        mesh.face_counts.push(list.len() as u32);
                        mesh.indices.extend_from_slice(list);
                    }
                }
            }
        }
        if args.points || scene.meshes[mesh_index].face_counts.is_empty() {
            let mesh = &mut scene.meshes[mesh_index];
            mesh.as_points = true;
            mesh.point_widths = vec![args.point_width; num_points];
        }
    }

    scene.up_axis = if args.with_up_axis_correction {
        UpAxis::Z
    } else {
        UpAxis::Y
    };
    scene.meters_per_unit = 1.0;

    let node = scene.add_node(None);
    scene.nodes[node].static_meshes.push(mesh_index);
    Ok(())
}

fn apply_clipping_box(mesh: &mut umber_mesh::Mesh, clip: &[f32]) {
    let mut min = Vec3::splat(f32::MAX);
    let mut max = Vec3::splat(f32::MIN);
    for point in &mesh.points {
        min = min.min(*point);
        max = max.max(*point);
    }
    if max.cmplt(min).any() {
        return;
    }
    mesh.clipping_box.interpolation = Interpolation::Constant;
    mesh.clipping_box.values = vec![
        Vec3::new(clip[0].max(min.x), clip[1].max(min.y), clip[2].max(min.z)),
        Vec3::new(clip[3].min(max.x), clip[4].min(max.y), clip[5].min(max.z)),
    ];
}

fn push_scalar(out: &mut Vec<u8>, value: f32) {
    out.write_f32::<LE>(value).unwrap();
}

/// Write every splat mesh of the scene as one binary little endian splat
/// cloud with the conventional property set.
pub fn export_ply_gsplats(scene: &SceneData) -> FormatResult<Vec<u8>> {
    let meshes: Vec<&umber_mesh::Mesh> =
        scene.meshes.iter().filter(|m| m.as_gsplats).collect();
    let num_points: usize = meshes.iter().map(|m| m.points.len()).sum();
    let sh_sets = meshes
        .iter()
        .map(|m| m.point_sh_coeffs.len())
        .max()
        .unwrap_or(0);
    // Only complete degrees are stored.
    let bands = sh_bands_from_degree(sh_degree_from_coeff_count(sh_sets));
    let rest_count = bands * 3;

    let mut header = String::from("ply\nformat binary_little_endian 1.0\n");
    header.push_str(&format!("element vertex {}\n", num_points));
    for name in ["x", "y", "z"] {
        header.push_str(&format!("property float {}\n", name));
    }
    for i in 0..3 {
        header.push_str(&format!("property float f_dc_{}\n", i));
    }
    for i in 0..rest_count {
        header.push_str(&format!("property float f_rest_{}\n", i));
    }
    header.push_str("property float opacity\n");
    for i in 0..3 {
        header.push_str(&format!("property float scale_{}\n", i));
    }
    for i in 0..4 {
        header.push_str(&format!("property float rot_{}\n", i));
    }
    header.push_str("end_header\n");

    let mut out = header.into_bytes();
    for mesh in meshes {
        for i in 0..mesh.points.len() {
            let point = mesh.points[i];
            push_scalar(&mut out, point.x);
            push_scalar(&mut out, point.y);
            push_scalar(&mut out, point.z);
            let color = mesh
                .colors
                .first()
                .and_then(|set| set.values.get(i))
                .copied()
                .unwrap_or(Vec3::splat(0.5));
            push_scalar(&mut out, color_to_sh(color.x));
            push_scalar(&mut out, color_to_sh(color.y));
            push_scalar(&mut out, color_to_sh(color.z));
            for set in 0..rest_count {
                let value = mesh
                    .point_sh_coeffs
                    .get(set)
                    .and_then(|s| s.values.get(i))
                    .copied()
                    .unwrap_or(0.0);
                push_scalar(&mut out, value);
            }
            let opacity = mesh
                .opacities
                .first()
                .and_then(|set| set.values.get(i))
                .copied()
                .unwrap_or(1.0);
            push_scalar(&mut out, encode_opacity(opacity));
            let width0 = mesh.point_widths.get(i).copied().unwrap_or(0.01);
            push_scalar(&mut out, encode_width(width0));
            for axis in 0..2 {
                let width = mesh
                    .point_extra_widths
                    .get(axis)
                    .and_then(|set| set.values.get(i))
                    .copied()
                    .unwrap_or(width0);
                push_scalar(&mut out, encode_width(width));
            }
            let rotation = mesh
                .point_rotations
                .values
                .get(i)
                .copied()
                .unwrap_or(Quat::IDENTITY);
            push_scalar(&mut out, rotation.w);
            push_scalar(&mut out, rotation.x);
            push_scalar(&mut out, rotation.y);
            push_scalar(&mut out, rotation.z);
        }
    }
    Ok(out)
}
