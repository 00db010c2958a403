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

use crate::Value;

pub fn linear_to_srgb(c: f32) -> f32 {
    if c <= 0.0031308 {
        c * 12.92
    } else {
        1.055 * c.powf(1.0 / 2.4) - 0.055
    }
}

pub fn srgb_to_linear(c: f32) -> f32 {
    if c <= 0.04045 {
        c / 12.92
    } else {
        ((c + 0.055) / 1.055).powf(2.4)
    }
}

/// Convert the color channels of a value in place. Alpha is left untouched.
pub fn convert_color(value: &mut Value, f: fn(f32) -> f32) {
    match value {
        Value::Float3(c) => {
            for channel in c.iter_mut() {
                *channel = f(*channel);
            }
        }
        Value::Float4(c) => {
            for channel in c.iter_mut().take(3) {
                *channel = f(*channel);
            }
        }
        _ => {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn srgb_round_trip() {
        for i in 0..=100 {
            let c = i as f32 / 100.0;
            assert!((srgb_to_linear(linear_to_srgb(c)) - c).abs() < 1e-6);
        }
    }

    #[test]
    fn alpha_is_untouched() {
        let mut value = Value::Float4([0.5, 0.5, 0.5, 0.25]);
        convert_color(&mut value, linear_to_srgb);
        match value {
            Value::Float4(c) => assert_eq!(c[3], 0.25),
            _ => unreachable!(),
        }
    }
}
