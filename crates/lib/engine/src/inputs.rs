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

use std::sync::Arc;

use crate::InputImage;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InputType {
    Float,
    Float2,
    Float3,
    Float4,
    Int,
    Int2,
    Int3,
    Int4,
    String,
    Image,
}

impl InputType {
    pub fn from_byte(byte: u8) -> Option<Self> {
        Some(match byte {
            0 => Self::Float,
            1 => Self::Float2,
            2 => Self::Float3,
            3 => Self::Float4,
            4 => Self::Int,
            5 => Self::Int2,
            6 => Self::Int3,
            7 => Self::Int4,
            8 => Self::String,
            9 => Self::Image,
            _ => return None,
        })
    }
}

/// Widget hint attached to an input by the package author.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum InputWidget {
    #[default]
    NoWidget,
    Slider,
    Angle,
    Color,
    Toggle,
    Combobox,
    Position,
    Image,
}

impl InputWidget {
    pub fn from_byte(byte: u8) -> Self {
        match byte {
            1 => Self::Slider,
            2 => Self::Angle,
            3 => Self::Color,
            4 => Self::Toggle,
            5 => Self::Combobox,
            6 => Self::Position,
            7 => Self::Image,
            _ => Self::NoWidget,
        }
    }
}

/// One concrete typed cell. Parameter application dispatches on the
/// descriptor's declared type into exactly one of these.
#[derive(Debug, Clone)]
pub enum InputValue {
    Float(f32),
    Float2([f32; 2]),
    Float3([f32; 3]),
    Float4([f32; 4]),
    Int(i32),
    Int2([i32; 2]),
    Int3([i32; 3]),
    Int4([i32; 4]),
    String(String),
    Image(Option<Arc<InputImage>>),
}

impl InputValue {
    pub fn ty(&self) -> InputType {
        match self {
            Self::Float(_) => InputType::Float,
            Self::Float2(_) => InputType::Float2,
            Self::Float3(_) => InputType::Float3,
            Self::Float4(_) => InputType::Float4,
            Self::Int(_) => InputType::Int,
            Self::Int2(_) => InputType::Int2,
            Self::Int3(_) => InputType::Int3,
            Self::Int4(_) => InputType::Int4,
            Self::String(_) => InputType::String,
            Self::Image(_) => InputType::Image,
        }
    }

    /// The neutral value an input falls back to on reset when the package
    /// does not declare a default.
    pub fn zero_of(ty: InputType) -> Self {
        match ty {
            InputType::Float => Self::Float(0.0),
            InputType::Float2 => Self::Float2([0.0; 2]),
            InputType::Float3 => Self::Float3([0.0; 3]),
            InputType::Float4 => Self::Float4([0.0; 4]),
            InputType::Int => Self::Int(0),
            InputType::Int2 => Self::Int2([0; 2]),
            InputType::Int3 => Self::Int3([0; 3]),
            InputType::Int4 => Self::Int4([0; 4]),
            InputType::String => Self::String(String::new()),
            InputType::Image => Self::Image(None),
        }
    }
}

/// Description of one graph input.
#[derive(Debug, Clone)]
pub struct InputDesc {
    pub identifier: String,
    pub label: String,
    pub group: String,
    pub ty: InputType,
    pub widget: InputWidget,
    pub default: InputValue,
    pub min: Option<f32>,
    pub max: Option<f32>,
}

impl InputDesc {
    pub fn is_image(&self) -> bool {
        self.ty == InputType::Image
    }
}
