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

use std::collections::{HashMap, HashSet};

/// A package identifier together with its spelling in the host naming
/// scheme.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MappedSymbol {
    pub source_name: String,
    pub host_name: String,
}

/// Maps package identifiers to identifiers that are legal in the host
/// naming scheme. The mapping is a bijection: two different source names
/// never collapse onto the same host name.
#[derive(Debug, Default)]
pub struct SymbolMapper {
    mapped: HashMap<String, MappedSymbol>,
    used: HashSet<String>,
}

fn clean_name(name: &str) -> String {
    let mut cleaned: String = name
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '_' { c } else { '_' })
        .collect();
    if cleaned.chars().next().is_some_and(|c| c.is_ascii_digit()) {
        cleaned.insert(0, '_');
    }
    cleaned
}

impl SymbolMapper {
    pub fn symbol(&mut self, source_name: &str) -> MappedSymbol {
        if let Some(mapped) = self.mapped.get(source_name) {
            return mapped.clone();
        }
        let mut host_name = clean_name(source_name);
        while self.used.contains(&host_name) {
            host_name.push('_');
        }
        self.used.insert(host_name.clone());
        let mapped = MappedSymbol {
            source_name: source_name.to_owned(),
            host_name,
        };
        self.mapped.insert(source_name.to_owned(), mapped.clone());
        mapped
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cleans_forbidden_characters() {
        let mut mapper = SymbolMapper::default();
        assert_eq!(mapper.symbol("base color!").host_name, "base_color_");
        assert_eq!(mapper.symbol("3d_noise").host_name, "_3d_noise");
    }

    #[test]
    fn mapping_is_stable() {
        let mut mapper = SymbolMapper::default();
        let first = mapper.symbol("a b");
        let second = mapper.symbol("a b");
        assert_eq!(first, second);
    }

    #[test]
    fn collisions_are_nudged() {
        let mut mapper = SymbolMapper::default();
        let a = mapper.symbol("a b");
        let b = mapper.symbol("a_b");
        assert_eq!(a.host_name, "a_b");
        assert_eq!(b.host_name, "a_b_");
    }
}
