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

use crate::{EngineError, GraphDesc, InputValue, PackageDesc};

/// Channel shuffle override for one output: for every destination channel
/// the source channel it is filled from.
pub type ChannelShuffle = [usize; 4];

/// Shuffle that swaps red and blue, turning a BGRA buffer into RGBA.
pub const SHUFFLE_BGRA_TO_RGBA: ChannelShuffle = [2, 1, 0, 3];

/// A mutable binding of inputs for one graph. The instance shares ownership
/// of its package descriptor so the descriptor outlives cache eviction.
#[derive(Debug)]
pub struct GraphInstance {
    package: Arc<PackageDesc>,
    graph_index: usize,
    cells: Vec<InputValue>,
    output_shuffles: Vec<Option<ChannelShuffle>>,
}

impl GraphInstance {
    pub fn new(package: Arc<PackageDesc>, graph_index: usize) -> Self {
        let graph = package.graph(graph_index);
        let cells = graph.inputs.iter().map(|i| i.default.clone()).collect();
        let output_shuffles = vec![None; graph.outputs.len()];
        Self {
            package,
            graph_index,
            cells,
            output_shuffles,
        }
    }

    pub fn package(&self) -> &Arc<PackageDesc> {
        &self.package
    }

    pub fn graph_index(&self) -> usize {
        self.graph_index
    }

    pub fn desc(&self) -> &GraphDesc {
        self.package.graph(self.graph_index)
    }

    pub fn input_index(&self, identifier: &str) -> Option<usize> {
        self.desc()
            .inputs
            .iter()
            .position(|i| i.identifier == identifier)
    }

    pub fn cell(&self, index: usize) -> &InputValue {
        &self.cells[index]
    }

    /// Put every input back to its package default.
    pub fn reset_all(&mut self) {
        let defaults: Vec<_> = self.desc().inputs.iter().map(|i| i.default.clone()).collect();
        self.cells = defaults;
    }

    pub fn reset(&mut self, index: usize) {
        self.cells[index] = self.desc().inputs[index].default.clone();
    }

    /// Store a value into a cell. The value type must match the declared
    /// input type; coercion happened before this point.
    pub fn set(&mut self, index: usize, value: InputValue) -> Result<(), EngineError> {
        let desc = &self.desc().inputs[index];
        if desc.ty != value.ty() {
            return Err(EngineError::TypeMismatch {
                identifier: desc.identifier.clone(),
                expected: desc.ty,
                got: value.ty(),
            });
        }
        self.cells[index] = value;
        Ok(())
    }

    pub fn override_output_shuffle(&mut self, output_index: usize, shuffle: ChannelShuffle) {
        self.output_shuffles[output_index] = Some(shuffle);
    }

    pub fn output_shuffle(&self, output_index: usize) -> Option<ChannelShuffle> {
        self.output_shuffles[output_index]
    }
}
