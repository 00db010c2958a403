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

use std::io::{Read, Write};

use byteorder::{ReadBytesExt, WriteBytesExt, LE};
use flate2::{read::GzDecoder, write::GzEncoder, Compression};
use glam::{Mat4, Quat, Vec3};
use log::debug;
use umber_host::{arg_read_bool, arg_read_float_array, FormatArgMap};
use umber_mesh::{
    color_to_sh, decode_opacity, decode_width, encode_opacity, encode_width,
    rotate_point_rotations, rotate_point_sh, scale_point_widths, sh_bands_from_degree,
    sh_column_sets_to_row_major, sh_degree_from_coeff_count, sh_row_major_to_column_sets,
    sh_to_color, transform_to_meters_positive_y, Interpolation, Mesh, SceneData, ShRotation,
    UpAxis,
};

use crate::{FormatError, FormatResult};

const DEBUG_TAG: &str = "SPZ";

const SPZ_MAGIC: u32 = 0x5053474e;
const SPZ_VERSION: u32 = 2;
const DEFAULT_FRACTIONAL_BITS: u8 = 12;

#[derive(Debug, Clone, Default)]
pub struct SpzArgs {
    pub with_zup: bool,
    pub clipping_box: Vec<f32>,
}

pub fn parse_spz_args(args: &FormatArgMap) -> SpzArgs {
    let mut out = SpzArgs::default();
    arg_read_bool(args, "spzGsplatsWithZup", &mut out.with_zup, DEBUG_TAG);
    arg_read_float_array(args, "spzGsplatsClippingBox", &mut out.clipping_box, DEBUG_TAG);
    out
}

/// Dequantized splat cloud, the shape the container is packed from and
/// unpacked into. SH coefficients are coefficient-major: all points' values
/// of one coefficient are adjacent, and coefficients are ordered row-major,
/// band by band with the red, green and blue channels interleaved.
#[derive(Debug, Default)]
pub struct GaussianCloud {
    pub num_points: usize,
    pub sh_degree: usize,
    pub positions: Vec<f32>,
    /// Logit encoded opacities.
    pub alphas: Vec<f32>,
    /// Zeroth order SH color coefficients.
    pub colors: Vec<f32>,
    /// Log encoded half widths, three per point.
    pub scales: Vec<f32>,
    /// Normalized quaternions, xyzw.
    pub rotations: Vec<f32>,
    pub sh: Vec<f32>,
}

fn read_i24(r: &mut impl Read) -> FormatResult<i32> {
    let mut bytes = [0u8; 3];
    r.read_exact(&mut bytes)?;
    let raw = bytes[0] as i32 | (bytes[1] as i32) << 8 | (bytes[2] as i32) << 16;
    // Sign extend from 24 bits.
    Ok((raw << 8) >> 8)
}

fn write_i24(w: &mut impl Write, value: i32) -> FormatResult<()> {
    let clamped = value.clamp(-(1 << 23), (1 << 23) - 1);
    w.write_all(&[
        (clamped & 0xff) as u8,
        ((clamped >> 8) & 0xff) as u8,
        ((clamped >> 16) & 0xff) as u8,
    ])?;
    Ok(())
}

pub fn read_cloud(data: &[u8]) -> FormatResult<GaussianCloud> {
    let mut r = GzDecoder::new(data);
    if r.read_u32::<LE>()? != SPZ_MAGIC {
        return Err(FormatError::Parse("spz: bad magic".to_owned()));
    }
    if r.read_u32::<LE>()? != SPZ_VERSION {
        return Err(FormatError::Unsupported("spz: unknown version".to_owned()));
    }
    let num_points = r.read_u32::<LE>()? as usize;
    let sh_degree = r.read_u8()? as usize;
    let fractional_bits = r.read_u8()?;
    let _flags = r.read_u8()?;
    let _reserved = r.read_u8()?;
    if sh_degree > 3 {
        return Err(FormatError::Parse("spz: SH degree out of range".to_owned()));
    }
    let scale = 1.0 / (1u32 << fractional_bits) as f32;

    let mut cloud = GaussianCloud {
        num_points,
        sh_degree,
        ..Default::default()
    };
    cloud.positions.reserve(num_points * 3);
    for _ in 0..num_points * 3 {
        cloud.positions.push(read_i24(&mut r)? as f32 * scale);
    }
    for _ in 0..num_points {
        let quantized = r.read_u8()? as f32 / 255.0;
        cloud.alphas.push(encode_opacity(quantized));
    }
    for _ in 0..num_points * 3 {
        let quantized = r.read_u8()? as f32;
        cloud.colors.push((quantized / 255.0 - 0.5) / 0.15);
    }
    for _ in 0..num_points * 3 {
        cloud.scales.push(r.read_u8()? as f32 / 16.0 - 10.0);
    }
    for _ in 0..num_points {
        let x = (r.read_u8()? as f32 - 127.5) / 127.5;
        let y = (r.read_u8()? as f32 - 127.5) / 127.5;
        let z = (r.read_u8()? as f32 - 127.5) / 127.5;
        let w = (1.0 - x * x - y * y - z * z).max(0.0).sqrt();
        cloud.rotations.extend_from_slice(&[x, y, z, w]);
    }
    let sh_dim = sh_bands_from_degree(sh_degree);
    for _ in 0..num_points * sh_dim * 3 {
        cloud.sh.push((r.read_u8()? as f32 - 128.0) / 128.0);
    }
    Ok(cloud)
}

pub fn write_cloud(cloud: &GaussianCloud) -> FormatResult<Vec<u8>> {
    let mut w = GzEncoder::new(Vec::new(), Compression::default());
    w.write_u32::<LE>(SPZ_MAGIC)?;
    w.write_u32::<LE>(SPZ_VERSION)?;
    w.write_u32::<LE>(cloud.num_points as u32)?;
    w.write_u8(cloud.sh_degree as u8)?;
    w.write_u8(DEFAULT_FRACTIONAL_BITS)?;
    w.write_u8(0)?;
    w.write_u8(0)?;

    let scale = (1u32 << DEFAULT_FRACTIONAL_BITS) as f32;
    for position in &cloud.positions {
        write_i24(&mut w, (position * scale).round() as i32)?;
    }
    for alpha in &cloud.alphas {
        w.write_u8((decode_opacity(*alpha) * 255.0).round().clamp(0.0, 255.0) as u8)?;
    }
    for color in &cloud.colors {
        w.write_u8(((color * 0.15 + 0.5) * 255.0).round().clamp(0.0, 255.0) as u8)?;
    }
    for scale_value in &cloud.scales {
        w.write_u8(((scale_value + 10.0) * 16.0).round().clamp(0.0, 255.0) as u8)?;
    }
    for quat in cloud.rotations.chunks_exact(4) {
        // Keep the scalar part positive so the three stored components
        // recover the full quaternion.
        let sign = if quat[3] < 0.0 { -1.0 } else { 1.0 };
        for component in &quat[..3] {
            let value = component * sign * 127.5 + 127.5;
            w.write_u8(value.round().clamp(0.0, 255.0) as u8)?;
        }
    }
    for coeff in &cloud.sh {
        w.write_u8((coeff * 128.0 + 128.0).round().clamp(0.0, 255.0) as u8)?;
    }
    Ok(w.finish()?)
}

/// Unpack a cloud into the intermediate: one splat mesh under one root
/// node, SH primvars in column-major sets.
pub fn import_spz(data: &[u8], args: &SpzArgs, scene: &mut SceneData) -> FormatResult<()> {
    let cloud = read_cloud(data)?;
    debug!(
        "spz::import {} points, SH degree {}",
        cloud.num_points, cloud.sh_degree
    );
    let n = cloud.num_points;
    if cloud.positions.len() < n * 3
        || cloud.alphas.len() < n
        || cloud.colors.len() < n * 3
        || cloud.scales.len() < n * 3
        || cloud.rotations.len() < n * 4
    {
        return Err(FormatError::Parse("spz: truncated point data".to_owned()));
    }

    let mesh_index = scene.add_mesh();
    {
        let mesh = &mut scene.meshes[mesh_index];
        mesh.name = "gsplats".to_owned();
        mesh.as_points = true;
        mesh.as_gsplats = true;
        mesh.points = (0..n)
            .map(|i| {
                Vec3::new(
                    cloud.positions[i * 3],
                    cloud.positions[i * 3 + 1],
                    cloud.positions[i * 3 + 2],
                )
            })
            .collect();
        mesh.point_widths = (0..n).map(|i| decode_width(cloud.scales[i * 3])).collect();
        mesh.point_rotations.interpolation = Interpolation::Vertex;
        mesh.point_rotations.values = (0..n)
            .map(|i| {
                Quat::from_xyzw(
                    cloud.rotations[i * 4],
                    cloud.rotations[i * 4 + 1],
                    cloud.rotations[i * 4 + 2],
                    cloud.rotations[i * 4 + 3],
                )
                .normalize()
            })
            .collect();
    }

    let color_index = scene.add_color_set(mesh_index);
    {
        let set = &mut scene.meshes[mesh_index].colors[color_index];
        set.interpolation = Interpolation::Vertex;
        set.values = (0..n)
            .map(|i| {
                Vec3::new(
                    sh_to_color(cloud.colors[i * 3]),
                    sh_to_color(cloud.colors[i * 3 + 1]),
                    sh_to_color(cloud.colors[i * 3 + 2]),
                )
            })
            .collect();
    }

    let opacity_index = scene.add_opacity_set(mesh_index);
    {
        let set = &mut scene.meshes[mesh_index].opacities[opacity_index];
        set.interpolation = Interpolation::Vertex;
        set.values = cloud.alphas.iter().map(|a| decode_opacity(*a)).collect();
    }

    for axis in 1..3 {
        let index = scene.add_extra_width_set(mesh_index);
        let set = &mut scene.meshes[mesh_index].point_extra_widths[index];
        set.interpolation = Interpolation::Vertex;
        set.values = (0..n)
            .map(|i| decode_width(cloud.scales[i * 3 + axis]))
            .collect();
    }

    // The container is row-major, the intermediate column-major.
    let bands = sh_bands_from_degree(cloud.sh_degree);
    if bands > 0 {
        if cloud.sh.len() < n * bands * 3 {
            return Err(FormatError::Parse("spz: truncated SH data".to_owned()));
        }
        for values in sh_row_major_to_column_sets(&cloud.sh, n, bands) {
            let index = scene.add_sh_coeff_set(mesh_index);
            let set = &mut scene.meshes[mesh_index].point_sh_coeffs[index];
            set.interpolation = Interpolation::Vertex;
            set.values = values;
        }
    }

    if args.clipping_box.len() >= 6 {
        let mesh = &mut scene.meshes[mesh_index];
        let mut min = Vec3::splat(f32::MAX);
        let mut max = Vec3::splat(f32::MIN);
        for point in &mesh.points {
            min = min.min(*point);
            max = max.max(*point);
        }
        if max.cmplt(min).any() {
            return Err(FormatError::Parse("spz: invalid bounding box".to_owned()));
        }
        mesh.clipping_box.interpolation = Interpolation::Constant;
        mesh.clipping_box.values = vec![
            Vec3::new(
                args.clipping_box[0].max(min.x),
                args.clipping_box[1].max(min.y),
                args.clipping_box[2].max(min.z),
            ),
            Vec3::new(
                args.clipping_box[3].min(max.x),
                args.clipping_box[4].min(max.y),
                args.clipping_box[5].min(max.z),
            ),
        ];
    }

    let node = scene.add_node(None);
    scene.nodes[node].static_meshes.push(mesh_index);
    scene.meters_per_unit = 1.0;
    scene.up_axis = if args.with_zup { UpAxis::Z } else { UpAxis::Y };
    Ok(())
}

#[derive(Default)]
struct TotalMesh {
    points: Vec<Vec3>,
    colors: Vec<Vec3>,
    opacities: Vec<f32>,
    widths: Vec<f32>,
    widths1: Vec<f32>,
    widths2: Vec<f32>,
    rotations: Vec<Quat>,
    sh: Vec<Vec<f32>>,
}

fn aggregate_mesh(
    total: &mut TotalMesh,
    mesh: &Mesh,
    model_matrix: Mat4,
    kernel: Option<&dyn ShRotation>,
) {
    let n = mesh.points.len();
    let offset = total.points.len();
    total.points.reserve(n);
    for point in &mesh.points {
        total.points.push(model_matrix.transform_point3(*point));
    }
    total.colors.resize(offset + n, Vec3::ZERO);
    if let Some(set) = mesh.colors.first() {
        for (i, value) in set.values.iter().take(n).enumerate() {
            total.colors[offset + i] = *value;
        }
    }
    total.opacities.resize(offset + n, 1.0);
    if let Some(set) = mesh.opacities.first() {
        for (i, value) in set.values.iter().take(n).enumerate() {
            total.opacities[offset + i] = *value;
        }
    }

    let model_scale = model_matrix.determinant().abs().cbrt();
    let model_rotation = Quat::from_mat4(&model_matrix).normalize();

    scale_point_widths(
        &mesh.point_widths,
        &mesh.point_extra_widths,
        n,
        model_scale,
        &mut total.widths,
        &mut total.widths1,
        &mut total.widths2,
    );
    rotate_point_rotations(&mesh.point_rotations, model_rotation, n, &mut total.rotations);
    rotate_point_sh(
        &mesh.point_sh_coeffs,
        model_rotation,
        n,
        &mut total.sh,
        kernel,
    );
}

fn aggregate_nodes(
    scene: &SceneData,
    total: &mut TotalMesh,
    correction: Mat4,
    node_index: usize,
    kernel: Option<&dyn ShRotation>,
) {
    let node = &scene.nodes[node_index];
    let model_matrix = correction * node.world_transform;
    for mesh_index in &node.static_meshes {
        let mesh = &scene.meshes[*mesh_index];
        if !mesh.as_gsplats {
            continue;
        }
        aggregate_mesh(total, mesh, model_matrix, kernel);
        debug!("spz::export aggregated mesh {} ({} points)", mesh.name, mesh.points.len());
    }
    for child in &node.children {
        aggregate_nodes(scene, total, correction, *child, kernel);
    }
}

/// Pack every splat mesh of the scene into one cloud. The container knows a
/// single mesh only, so everything is flattened through the node transforms
/// and the unit/up-axis correction.
pub fn export_spz(scene: &SceneData, kernel: Option<&dyn ShRotation>) -> FormatResult<Vec<u8>> {
    let mut total = TotalMesh::default();

    // Only degrees with complete bands are stored: 0, 9, 24 or 45 sets.
    let max_sets = scene
        .meshes
        .iter()
        .filter(|m| m.as_gsplats)
        .map(|m| m.point_sh_coeffs.len())
        .max()
        .unwrap_or(0);
    let degree = sh_degree_from_coeff_count(max_sets);
    let bands = sh_bands_from_degree(degree);
    total.sh = vec![Vec::new(); bands * 3];

    let correction = transform_to_meters_positive_y(scene.meters_per_unit, scene.up_axis);
    for root in &scene.root_nodes {
        aggregate_nodes(scene, &mut total, correction, *root, kernel);
    }

    let n = total.points.len();
    let mut cloud = GaussianCloud {
        num_points: n,
        sh_degree: degree,
        ..Default::default()
    };
    cloud.positions.reserve(n * 3);
    for point in &total.points {
        cloud.positions.extend_from_slice(&point.to_array());
    }
    cloud.alphas = total.opacities.iter().map(|o| encode_opacity(*o)).collect();
    cloud.colors.reserve(n * 3);
    for color in &total.colors {
        cloud
            .colors
            .extend_from_slice(&[color_to_sh(color.x), color_to_sh(color.y), color_to_sh(color.z)]);
    }
    cloud.scales.reserve(n * 3);
    for i in 0..n {
        cloud.scales.push(encode_width(total.widths[i]));
        cloud.scales.push(encode_width(total.widths1[i]));
        cloud.scales.push(encode_width(total.widths2[i]));
    }
    cloud.rotations.reserve(n * 4);
    for quat in &total.rotations {
        cloud
            .rotations
            .extend_from_slice(&[quat.x, quat.y, quat.z, quat.w]);
    }
    cloud.sh = sh_column_sets_to_row_major(&total.sh, n, bands);

    debug!("spz::export {} points, SH degree {}", n, degree);
    write_cloud(&cloud)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn one_point_cloud(sh_degree: usize) -> GaussianCloud {
        let bands = sh_bands_from_degree(sh_degree);
        GaussianCloud {
            num_points: 1,
            sh_degree,
            positions: vec![0.5, -0.25, 1.0],
            alphas: vec![encode_opacity(0.5)],
            colors: vec![0.0, 0.0, 0.0],
            scales: vec![encode_width(2.0); 3],
            rotations: vec![0.0, 0.0, 0.0, 1.0],
            sh: (0..bands * 3).map(|i| (i as f32) / 64.0).collect(),
        }
    }

    #[test]
    fn cloud_round_trip_within_quantization() {
        let cloud = one_point_cloud(1);
        let bytes = write_cloud(&cloud).unwrap();
        let read = read_cloud(&bytes).unwrap();
        assert_eq!(read.num_points, 1);
        assert_eq!(read.sh_degree, 1);
        for (a, b) in cloud.positions.iter().zip(&read.positions) {
            assert!((a - b).abs() < 1.0 / 4096.0);
        }
        assert!((decode_opacity(read.alphas[0]) - 0.5).abs() < 0.01);
        assert!((decode_width(read.scales[0]) - 2.0).abs() < 0.1);
        for (a, b) in cloud.sh.iter().zip(&read.sh) {
            assert!((a - b).abs() < 1.0 / 64.0);
        }
    }

    #[test]
    fn rejects_bad_containers() {
        assert!(read_cloud(b"not gzip at all").is_err());
        let mut w = GzEncoder::new(Vec::new(), Compression::default());
        w.write_u32::<LE>(0xdeadbeef).unwrap();
        w.write_u32::<LE>(SPZ_VERSION).unwrap();
        let bytes = w.finish().unwrap();
        assert!(read_cloud(&bytes).is_err());
    }

    #[test]
    fn import_degree_one_yields_nine_column_major_sets() {
        let bytes = write_cloud(&one_point_cloud(1)).unwrap();
        let mut scene = SceneData::default();
        import_spz(&bytes, &SpzArgs::default(), &mut scene).unwrap();
        let mesh = &scene.meshes[0];
        assert!(mesh.as_gsplats);
        assert_eq!(mesh.point_sh_coeffs.len(), 9);
        // Row-major input: band b, channel c at index b*3+c. Column-major
        // output: channel c, band b at set c*bands+b.
        let bands = 3;
        for channel in 0..3 {
            for band in 0..bands {
                let expected = ((band * 3 + channel) as f32) / 64.0;
                let got = mesh.point_sh_coeffs[channel * bands + band].values[0];
                assert!((got - expected).abs() < 1.0 / 64.0);
            }
        }
        assert_eq!(scene.up_axis, UpAxis::Y);
    }

    fn two_point_cloud() -> GaussianCloud {
        let bands = sh_bands_from_degree(1);
        GaussianCloud {
            num_points: 2,
            sh_degree: 1,
            positions: vec![0.0, 0.0, 0.0, 1.0, 1.0, 1.0],
            alphas: vec![encode_opacity(0.5); 2],
            colors: vec![0.0; 6],
            scales: vec![encode_width(2.0); 6],
            rotations: vec![0.0, 0.0, 0.0, 1.0, 0.0, 0.0, 0.0, 1.0],
            // Coefficient-major: both points of one coefficient adjacent.
            sh: (0..bands * 3 * 2).map(|i| (i as f32 - 9.0) / 16.0).collect(),
        }
    }

    #[test]
    fn multi_point_sh_keeps_points_separate() {
        let cloud = two_point_cloud();
        let bytes = write_cloud(&cloud).unwrap();
        let mut scene = SceneData::default();
        import_spz(&bytes, &SpzArgs::default(), &mut scene).unwrap();
        let mesh = &scene.meshes[0];
        assert_eq!(mesh.point_sh_coeffs.len(), 9);

        let bands = 3;
        for point in 0..2 {
            for band in 0..bands {
                for channel in 0..3 {
                    let expected = cloud.sh[(band * 3 + channel) * 2 + point];
                    let got = mesh.point_sh_coeffs[channel * bands + band].values[point];
                    assert!((got - expected).abs() < 1.0 / 64.0);
                }
            }
        }

        // Writing the scene back out preserves the container layout.
        let exported = export_spz(&scene, None).unwrap();
        let round = read_cloud(&exported).unwrap();
        assert_eq!(round.num_points, 2);
        assert_eq!(round.sh_degree, 1);
        for (a, b) in cloud.sh.iter().zip(&round.sh) {
            assert!((a - b).abs() < 1.0 / 32.0);
        }
    }

    #[test]
    fn zup_and_clipping_arguments() {
        let bytes = write_cloud(&one_point_cloud(0)).unwrap();
        let mut scene = SceneData::default();
        let args = SpzArgs {
            with_zup: true,
            clipping_box: vec![-1.0, -1.0, -1.0, 1.0, 1.0, 1.0],
        };
        import_spz(&bytes, &args, &mut scene).unwrap();
        assert_eq!(scene.up_axis, UpAxis::Z);
        assert_eq!(scene.meshes[0].clipping_box.values.len(), 2);
    }

    #[test]
    fn export_flattens_transforms() {
        let bytes = write_cloud(&one_point_cloud(1)).unwrap();
        let mut scene = SceneData::default();
        import_spz(&bytes, &SpzArgs::default(), &mut scene).unwrap();
        // Scale the scene by 2 through the node transform.
        scene.nodes[0].world_transform = Mat4::from_scale(Vec3::splat(2.0));

        let exported = export_spz(&scene, None).unwrap();
        let cloud = read_cloud(&exported).unwrap();
        assert_eq!(cloud.num_points, 1);
        assert!((cloud.positions[0] - 1.0).abs() < 0.01);
        // Widths scale with the model.
        assert!((decode_width(cloud.scales[0]) - 4.0).abs() < 0.3);
        assert_eq!(cloud.sh_degree, 1);
    }

    #[test]
    fn args_parsing() {
        let mut args = FormatArgMap::new();
        args.insert("spzGsplatsWithZup".into(), "true".into());
        args.insert("spzGsplatsClippingBox".into(), "-2 -2 -2 2 2 2".into());
        let parsed = parse_spz_args(&args);
        assert!(parsed.with_zup);
        assert_eq!(parsed.clipping_box.len(), 6);
    }
}
