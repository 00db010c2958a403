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

use umber_common::{Dictionary, Value};

/// Prim specifier in a generated layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Specifier {
    Def,
    Class,
    Over,
}

#[derive(Debug, Clone)]
pub struct AttrSpec {
    pub name: String,
    pub type_name: String,
    pub default: Option<Value>,
    pub metadata: Dictionary,
    /// Source attribute paths this attribute is connected to.
    pub connections: Vec<String>,
}

impl AttrSpec {
    pub fn new(name: impl Into<String>, type_name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            type_name: type_name.into(),
            default: None,
            metadata: Dictionary::default(),
            connections: Vec::new(),
        }
    }

    pub fn with_default(mut self, value: Value) -> Self {
        self.default = Some(value);
        self
    }
}

#[derive(Debug, Clone)]
pub struct PrimSpec {
    pub name: String,
    pub type_name: String,
    pub specifier: Specifier,
    pub active: Option<bool>,
    pub inherits: Vec<String>,
    pub api_schemas: Vec<String>,
    pub asset_info: Dictionary,
    pub attributes: Vec<AttrSpec>,
    pub children: Vec<PrimSpec>,
}

impl PrimSpec {
    pub fn new(name: impl Into<String>, type_name: impl Into<String>, specifier: Specifier) -> Self {
        Self {
            name: name.into(),
            type_name: type_name.into(),
            specifier,
            active: None,
            inherits: Vec::new(),
            api_schemas: Vec::new(),
            asset_info: Dictionary::default(),
            attributes: Vec::new(),
            children: Vec::new(),
        }
    }

    pub fn attr(&self, name: &str) -> Option<&AttrSpec> {
        self.attributes.iter().find(|a| a.name == name)
    }

    pub fn child(&self, name: &str) -> Option<&PrimSpec> {
        self.children.iter().find(|c| c.name == name)
    }
}

/// The data of one generated layer. This is what format plugins hand back to
/// the host from `read`; the host owns composition and flattening.
#[derive(Debug, Default)]
pub struct LayerData {
    pub prims: Vec<PrimSpec>,
    pub default_prim: Option<String>,
    pub permission_to_edit: bool,
    pub permission_to_save: bool,
}

impl LayerData {
    pub fn read_only() -> Self {
        Self {
            permission_to_edit: false,
            permission_to_save: false,
            ..Default::default()
        }
    }

    pub fn prim(&self, name: &str) -> Option<&PrimSpec> {
        self.prims.iter().find(|p| p.name == name)
    }
}
