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

use std::collections::HashMap;

use umber_common::{Dictionary, Value};

/// What the host exposes while composing dynamic file-format arguments: the
/// composed default value of attributes on the prim carrying the payload.
pub trait AttributeSource {
    fn attribute_default(&self, name: &str) -> Option<Value>;
}

impl AttributeSource for HashMap<String, Value> {
    fn attribute_default(&self, name: &str) -> Option<Value> {
        self.get(name).cloned()
    }
}

impl AttributeSource for Dictionary {
    fn attribute_default(&self, name: &str) -> Option<Value> {
        self.get(name).cloned()
    }
}
