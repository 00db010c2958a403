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

use glam::Quat;
use log::error;

use crate::Primvar;

/// The zeroth order spherical harmonic basis constant, 1/sqrt(4*pi).
pub const SH_C0: f32 = 0.28209479177387814;

/// Splat files store opacity logit encoded.
pub fn encode_opacity(opacity: f32) -> f32 {
    let clamped = opacity.clamp(f32::MIN_POSITIVE, 1.0 - f32::EPSILON);
    -(1.0 / clamped - 1.0).ln()
}

pub fn decode_opacity(encoded: f32) -> f32 {
    1.0 / (1.0 + (-encoded).exp())
}

/// Widths are stored as the log of the half axis; the intermediate carries
/// full widths.
pub fn encode_width(width: f32) -> f32 {
    (width * 0.5).max(f32::MIN_POSITIVE).ln()
}

pub fn decode_width(encoded: f32) -> f32 {
    encoded.exp() * 2.0
}

/// Base color lives in the zeroth SH coefficient.
pub fn color_to_sh(color: f32) -> f32 {
    (color - 0.5) / SH_C0
}

pub fn sh_to_color(coeff: f32) -> f32 {
    (coeff * SH_C0 + 0.5).clamp(0.0, 1.0)
}

/// Splats carry R, G and B coefficients for each band, so the per channel
/// band count is a third of the coefficient set count.
pub fn sh_degree_from_coeff_count(coeff_count: usize) -> usize {
    let bands = coeff_count / 3;
    ((bands as f32 + 1.0).sqrt().floor() - 1.0).max(0.0) as usize
}

/// Number of bands above the zeroth order for a degree.
pub fn sh_bands_from_degree(degree: usize) -> usize {
    degree * (degree + 2)
}

/// Rotation of a spherical harmonic coefficient vector. The actual rotation
/// matrix construction lives in an external numerical library; this seam is
/// what exporters call point-wise.
pub trait ShRotation {
    /// Rotate `coeffs` (one channel, bands 1..=degree) in place.
    fn rotate(&self, degree: usize, rotation: Quat, coeffs: &mut [f32]);
}

/// Compose a model rotation onto every point rotation.
pub fn rotate_point_rotations(
    point_rotations: &Primvar<Quat>,
    rotation: Quat,
    num_points: usize,
    out: &mut Vec<Quat>,
) {
    let offset = out.len();
    out.resize(offset + num_points, Quat::IDENTITY);
    // Some inputs miss rotation data for the tail points; leave those at
    // identity instead of reading out of bounds.
    let available = num_points.min(point_rotations.values.len());
    for (i, quat) in point_rotations.values[..available].iter().enumerate() {
        out[offset + i] = rotation * *quat;
    }
}

/// Scale the three per point width sets by a uniform model scale.
pub fn scale_point_widths(
    widths: &[f32],
    extra_widths: &[Primvar<f32>],
    num_points: usize,
    scale: f32,
    out: &mut Vec<f32>,
    out1: &mut Vec<f32>,
    out2: &mut Vec<f32>,
) {
    let offsets = [out.len(), out1.len(), out2.len()];
    out.resize(offsets[0] + num_points, 0.0);
    out1.resize(offsets[1] + num_points, 0.0);
    out2.resize(offsets[2] + num_points, 0.0);

    for (i, width) in widths.iter().take(num_points).enumerate() {
        out[offsets[0] + i] = width * scale;
    }
    if extra_widths.len() >= 2 {
        for (i, width) in extra_widths[0].values.iter().take(num_points).enumerate() {
            out1[offsets[1] + i] = width * scale;
        }
        for (i, width) in extra_widths[1].values.iter().take(num_points).enumerate() {
            out2[offsets[2] + i] = width * scale;
        }
    }
}

fn is_identity(rotation: Quat) -> bool {
    (1.0 - rotation.w.abs()) <= 1e-6
}

/// Rotate per point SH coefficient sets by a model rotation and append them
/// to the output sets. Input and output are column-major: all bands of one
/// channel, then the next channel.
pub fn rotate_point_sh(
    in_sh: &[Primvar<f32>],
    rotation: Quat,
    num_points: usize,
    out_sh: &mut [Vec<f32>],
    kernel: Option<&dyn ShRotation>,
) {
    let mut complete_points = num_points;
    for set in in_sh {
        complete_points = complete_points.min(set.values.len());
    }

    let offsets: Vec<usize> = out_sh.iter().map(|set| set.len()).collect();
    for set in out_sh.iter_mut() {
        let len = set.len();
        set.resize(len + num_points, 0.0);
    }

    let kernel = match kernel {
        Some(kernel) if !is_identity(rotation) => kernel,
        _ => {
            // Identity transform, plain copy.
            for (index, set) in out_sh.iter_mut().enumerate() {
                if let Some(input) = in_sh.get(index) {
                    let n = complete_points.min(input.values.len());
                    set[offsets[index]..offsets[index] + n].copy_from_slice(&input.values[..n]);
                }
            }
            return;
        }
    };

    let degree = sh_degree_from_coeff_count(in_sh.len().min(out_sh.len()));
    if degree == 0 {
        return;
    }
    let bands = sh_bands_from_degree(degree);
    let rotation = rotation.normalize();
    let mut buffer = vec![0.0f32; bands];
    for point in 0..complete_points {
        for channel in 0..3 {
            for coeff in 0..bands {
                buffer[coeff] = in_sh[coeff + channel * bands].values[point];
            }
            kernel.rotate(degree, rotation, &mut buffer);
            for coeff in 0..bands {
                let set = coeff + channel * bands;
                out_sh[set][offsets[set] + point] = buffer[coeff];
            }
        }
    }
}

/// Convert SH coefficients from the row-major layout splat containers use
/// to the column-major set layout of the intermediate. The container is
/// coefficient-major: all points' values of one coefficient are adjacent,
/// and coefficients are ordered band by band with the red, green and blue
/// channels interleaved per band.
pub fn sh_row_major_to_column_sets(
    sh: &[f32],
    num_points: usize,
    bands: usize,
) -> Vec<Vec<f32>> {
    let mut sets = vec![vec![0.0f32; num_points]; bands * 3];
    if sh.len() < num_points * bands * 3 {
        error!("SH coefficient data too small: {} sets expected", bands * 3);
        return sets;
    }
    for point in 0..num_points {
        for band in 0..bands {
            for channel in 0..3 {
                let row_index = (band * 3 + channel) * num_points + point;
                sets[channel * bands + band][point] = sh[row_index];
            }
        }
    }
    sets
}

pub fn sh_column_sets_to_row_major(sets: &[Vec<f32>], num_points: usize, bands: usize) -> Vec<f32> {
    let mut sh = vec![0.0f32; num_points * bands * 3];
    for point in 0..num_points {
        for band in 0..bands {
            for channel in 0..3 {
                let value = sets
                    .get(channel * bands + band)
                    .and_then(|set| set.get(point))
                    .copied()
                    .unwrap_or(0.0);
                sh[(band * 3 + channel) * num_points + point] = value;
            }
        }
    }
    sh
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn opacity_round_trip() {
        for o in [0.01f32, 0.25, 0.5, 0.75, 0.99] {
            assert!((decode_opacity(encode_opacity(o)) - o).abs() < 1e-5);
        }
        assert_eq!(encode_opacity(0.5), 0.0);
    }

    #[test]
    fn width_round_trip() {
        for w in [0.1f32, 1.0, 2.0, 16.0] {
            assert!((decode_width(encode_width(w)) - w).abs() < 1e-4);
        }
        assert_eq!(encode_width(2.0), 0.0);
    }

    #[test]
    fn color_sh_round_trip() {
        for c in [0.0f32, 0.25, 0.5, 1.0] {
            assert!((sh_to_color(color_to_sh(c)) - c).abs() < 1e-6);
        }
        assert_eq!(color_to_sh(0.5), 0.0);
    }

    #[test]
    fn degree_math() {
        assert_eq!(sh_bands_from_degree(1), 3);
        assert_eq!(sh_bands_from_degree(2), 8);
        assert_eq!(sh_bands_from_degree(3), 15);
        assert_eq!(sh_degree_from_coeff_count(9), 1);
        assert_eq!(sh_degree_from_coeff_count(24), 2);
        assert_eq!(sh_degree_from_coeff_count(45), 3);
        assert_eq!(sh_degree_from_coeff_count(0), 0);
    }

    #[test]
    fn sh_layout_matches_the_container_convention() {
        // Two points, degree 1 (3 bands): the container stores both points
        // of one coefficient next to each other, coefficient order is
        // band 0 RGB, band 1 RGB, band 2 RGB.
        let num_points = 2;
        let bands = 3;
        #[rustfmt::skip]
        let row_major: Vec<f32> = vec![
            1.0, 2.0,   // band 0 R, points 0 and 1
            3.0, 4.0,   // band 0 G
            5.0, 6.0,   // band 0 B
            7.0, 8.0,   // band 1 R
            9.0, 10.0,  // band 1 G
            11.0, 12.0, // band 1 B
            13.0, 14.0, // band 2 R
            15.0, 16.0, // band 2 G
            17.0, 18.0, // band 2 B
        ];
        let sets = sh_row_major_to_column_sets(&row_major, num_points, bands);
        assert_eq!(sets.len(), 9);
        // Column-major sets: all red bands first, then green, then blue.
        assert_eq!(sets[0], vec![1.0, 2.0]); // R band 0
        assert_eq!(sets[1], vec![7.0, 8.0]); // R band 1
        assert_eq!(sets[2], vec![13.0, 14.0]); // R band 2
        assert_eq!(sets[bands], vec![3.0, 4.0]); // G band 0
        assert_eq!(sets[2 * bands], vec![5.0, 6.0]); // B band 0
        assert_eq!(sets[2 * bands + 2], vec![17.0, 18.0]); // B band 2

        let back = sh_column_sets_to_row_major(&sets, num_points, bands);
        assert_eq!(back, row_major);
    }

    #[test]
    fn sh_layout_round_trip_many_points() {
        for (num_points, bands) in [(2, 3), (5, 8), (3, 15)] {
            let row_major: Vec<f32> = (0..num_points * bands * 3).map(|i| i as f32).collect();
            let sets = sh_row_major_to_column_sets(&row_major, num_points, bands);
            assert_eq!(sets.len(), bands * 3);
            let back = sh_column_sets_to_row_major(&sets, num_points, bands);
            assert_eq!(back, row_major);
        }
    }

    #[test]
    fn rotations_compose() {
        let primvar = Primvar {
            values: vec![Quat::IDENTITY; 2],
            ..Default::default()
        };
        let rotation = Quat::from_rotation_y(std::f32::consts::FRAC_PI_2);
        let mut out = Vec::new();
        rotate_point_rotations(&primvar, rotation, 3, &mut out);
        assert_eq!(out.len(), 3);
        assert!((out[0].w - rotation.w).abs() < 1e-6);
        // The third point had no input rotation and stays at identity.
        assert_eq!(out[2], Quat::IDENTITY);
    }
}
