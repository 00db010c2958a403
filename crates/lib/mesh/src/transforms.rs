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

use glam::{Mat4, Vec3};

use crate::UpAxis;

/// Transform that brings a scene into meters with positive Y up, the frame
/// the splat containers expect.
pub fn transform_to_meters_positive_y(meters_per_unit: f32, up_axis: UpAxis) -> Mat4 {
    let scale = if meters_per_unit > 0.0 {
        meters_per_unit
    } else {
        1.0
    };
    let scale = Mat4::from_scale(Vec3::splat(scale));
    match up_axis {
        UpAxis::Y => scale,
        UpAxis::Z => scale * Mat4::from_rotation_x(-std::f32::consts::FRAC_PI_2),
    }
}

/// Inverse correction used on import when the consumer wants Z up.
pub fn transform_y_up_to_z_up() -> Mat4 {
    Mat4::from_rotation_x(std::f32::consts::FRAC_PI_2)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn z_up_scene_lands_on_y_up() {
        let m = transform_to_meters_positive_y(1.0, UpAxis::Z);
        let v = m.transform_point3(Vec3::Z);
        assert!((v - Vec3::Y).length() < 1e-6);
    }

    #[test]
    fn units_scale() {
        let m = transform_to_meters_positive_y(0.01, UpAxis::Y);
        let v = m.transform_point3(Vec3::new(100.0, 0.0, 0.0));
        assert!((v.x - 1.0).abs() < 1e-6);
    }
}
