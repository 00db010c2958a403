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

/// A package-relative path looks like `outer.pkg[inner/asset.png]`: the outer
/// part names a package file, the inner part an asset inside of it.
pub fn is_package_relative(path: &str) -> bool {
    path.ends_with(']') && path.contains('[')
}

pub fn split_package_path(path: &str) -> (&str, Option<&str>) {
    if !is_package_relative(path) {
        return (path, None);
    }
    let open = path.find('[').unwrap();
    (&path[..open], Some(&path[open + 1..path.len() - 1]))
}

pub fn join_package_path(outer: &str, inner: &str) -> String {
    format!("{}[{}]", outer, inner)
}

/// Normalize slash direction and collapse `.` segments of the outer path.
/// Inner package-relative parts are kept as they are. Paths come in with
/// either slash flavor on Windows, and the caches key on the string.
pub fn normalize_package_path(path: &str) -> String {
    let (outer, inner) = split_package_path(path);
    let mut norm = String::with_capacity(outer.len());
    let flipped = outer.replace('\\', "/");
    for (i, segment) in flipped.split('/').enumerate() {
        if i > 0 && (segment == "." || segment.is_empty()) {
            continue;
        }
        if i > 0 {
            norm.push('/');
        }
        norm.push_str(segment);
    }
    match inner {
        Some(inner) => join_package_path(&norm, inner),
        None => norm,
    }
}
