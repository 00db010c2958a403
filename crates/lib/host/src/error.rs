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

use std::io;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum HostError {
    #[error("io error: {0}")]
    Io(#[from] io::Error),
    #[error("asset not found: {0}")]
    NotFound(String),
    #[error("invalid asset: {0}")]
    InvalidAsset(String),
    #[error("failed to load image {0}: {1}")]
    ImageLoad(String, String),
    #[error("unsupported pixel format: {0}")]
    UnsupportedImageFormat(String),
}
