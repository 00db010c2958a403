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
use umber_engine::EngineError;
use umber_host::HostError;

use crate::PathError;

#[derive(Debug, Error)]
pub enum SbsarError {
    #[error(transparent)]
    Path(#[from] PathError),
    #[error(transparent)]
    Host(#[from] HostError),
    #[error(transparent)]
    Engine(#[from] EngineError),
    #[error("failed to read package {0}")]
    PackageOpen(String),
    #[error("package {0} is not a valid package")]
    PackageInvalid(String),
    #[error("no graph named {0} in package")]
    UnknownGraph(String),
    #[error("no output matching {0} in graph")]
    UnknownOutput(String),
}

pub type SbsarResult<T> = Result<T, SbsarError>;
