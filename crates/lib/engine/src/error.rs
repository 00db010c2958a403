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

use thiserror::Error;

use crate::InputType;

#[derive(Debug, Error)]
pub enum EngineError {
    #[error("no valid render engine library found")]
    NotFound,
    #[error("invalid package: {0}")]
    InvalidPackage(String),
    #[error("unknown graph: {0}")]
    UnknownGraph(String),
    #[error("unknown output: {0}")]
    UnknownOutput(String),
    #[error("input {identifier} is {expected:?}, got {got:?}")]
    TypeMismatch {
        identifier: String,
        expected: InputType,
        got: InputType,
    },
    #[error("render failed: {0}")]
    Render(String),
}
