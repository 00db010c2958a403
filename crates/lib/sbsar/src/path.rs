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

use log::warn;
use serde_json::{Map, Value as Json};
use thiserror::Error;

/// Preset name that selects the graph defaults; dropped when formatting.
pub const DEFAULT_PRESET: &str = "__default__";

#[derive(Debug, Error, PartialEq, Eq)]
pub enum PathError {
    #[error("invalid packaged path: {0}")]
    InvalidFormat(String),
    #[error("unsupported asset type in packaged path: {0}")]
    InvalidAssetType(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BindKind {
    Usage,
    Identifier,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AssetType {
    Image,
}

/// A parsed packaged path: one image output of one graph at one parameter
/// point. `params_json` is the canonical byte rendering of `params` and is
/// what cache keys are built from.
#[derive(Debug, Clone, PartialEq)]
pub struct ParsedPath {
    pub graph_name: String,
    pub asset_type: AssetType,
    pub bind: BindKind,
    pub usage: String,
    pub preset: String,
    pub package_hash: u64,
    pub params_json: String,
    pub params: Map<String, Json>,
}

impl ParsedPath {
    pub fn for_usage(graph_name: impl Into<String>, usage: impl Into<String>) -> Self {
        Self {
            graph_name: graph_name.into(),
            asset_type: AssetType::Image,
            bind: BindKind::Usage,
            usage: usage.into(),
            preset: String::new(),
            package_hash: 0,
            params_json: "{}".to_owned(),
            params: Map::new(),
        }
    }

    pub fn with_params(mut self, params: Map<String, Json>) -> Self {
        self.params_json = Json::Object(params.clone()).to_string();
        self.params = params;
        self
    }

    pub fn with_package_hash(mut self, hash: u64) -> Self {
        self.package_hash = hash;
        self
    }
}

/// Parse `graphs/<graphName>/images?<key=value>(#<key=value>)*`.
pub fn parse_path(packaged_path: &str) -> Result<ParsedPath, PathError> {
    let segments: Vec<&str> = packaged_path.split('/').collect();
    if segments.len() != 3 {
        return Err(PathError::InvalidFormat(format!(
            "invalid path segment count {}: {}",
            segments.len(),
            packaged_path
        )));
    }
    if segments[0] != "graphs" {
        return Err(PathError::InvalidFormat(format!(
            "only assets under graphs/ are supported: {}",
            packaged_path
        )));
    }
    let graph_name = segments[1].to_owned();

    let (asset_kind, fragments) = segments[2].split_once('?').ok_or_else(|| {
        PathError::InvalidFormat(format!("expected a single ?: {}", packaged_path))
    })?;
    if asset_kind != "images" {
        return Err(PathError::InvalidAssetType(asset_kind.to_owned()));
    }

    let mut bind = None;
    let mut usage = String::new();
    let mut preset = String::new();
    let mut package_hash: Option<u64> = None;
    let mut params = Map::new();
    let mut params_json = "{}".to_owned();

    for fragment in fragments.split('#') {
        let (key, value) = fragment.split_once('=').ok_or_else(|| {
            PathError::InvalidFormat(format!("expected a single = in {}", fragment))
        })?;
        match key {
            "usage" | "identifier" => {
                if bind.is_some() {
                    return Err(PathError::InvalidFormat(
                        "only a single usage or identifier supported".to_owned(),
                    ));
                }
                bind = Some(if key == "usage" {
                    BindKind::Usage
                } else {
                    BindKind::Identifier
                });
                usage = value.to_owned();
            }
            "preset" => {
                if !preset.is_empty() {
                    return Err(PathError::InvalidFormat(
                        "preset can only be given once".to_owned(),
                    ));
                }
                preset = value.to_owned();
            }
            "packageHash" => {
                if package_hash.is_some() {
                    return Err(PathError::InvalidFormat(
                        "packageHash can only be given once".to_owned(),
                    ));
                }
                package_hash = Some(u64::from_str_radix(value, 16).map_err(|_| {
                    PathError::InvalidFormat(format!("bad packageHash: {}", value))
                })?);
            }
            "params" => {
                let parsed: Json = serde_json::from_str(value).map_err(|err| {
                    PathError::InvalidFormat(format!("parameter parse error: {}", err))
                })?;
                match parsed {
                    Json::Object(object) => {
                        // Canonical rendering, so cache keys do not depend on
                        // the spacing of the incoming string.
                        params_json = Json::Object(object.clone()).to_string();
                        params = object;
                    }
                    _ => {
                        return Err(PathError::InvalidFormat(
                            "parameters need to be an object at root".to_owned(),
                        ))
                    }
                }
            }
            // Accepted and ignored for compatibility with older paths.
            "entries" => {}
            _ => {
                return Err(PathError::InvalidFormat(format!(
                    "{} is not a supported parameter",
                    key
                )))
            }
        }
    }

    let bind = bind.ok_or_else(|| {
        PathError::InvalidFormat("missing usage or identifier selector".to_owned())
    })?;

    Ok(ParsedPath {
        graph_name,
        asset_type: AssetType::Image,
        bind,
        usage,
        preset,
        package_hash: package_hash.unwrap_or(0),
        params_json,
        params,
    })
}

/// Format a parsed path back into its canonical string form. Two formats of
/// the same logical path are byte-identical.
pub fn format_path(parsed: &ParsedPath) -> String {
    let mut out = format!(
        "graphs/{}/images?{}={}",
        parsed.graph_name,
        match parsed.bind {
            BindKind::Usage => "usage",
            BindKind::Identifier => "identifier",
        },
        parsed.usage
    );
    if !parsed.preset.is_empty() && parsed.preset != DEFAULT_PRESET {
        out.push_str("#preset=");
        out.push_str(&parsed.preset);
    }
    if parsed.package_hash != 0 {
        out.push_str(&format!("#packageHash={:x}", parsed.package_hash));
    }
    out.push_str("#params=");
    out.push_str(&parsed.params_json);
    out
}

/// JSON leaf coercions used by parameter application.
pub fn json_as_float(value: &Json) -> Option<f32> {
    value.as_f64().map(|v| v as f32)
}

pub fn json_as_int(value: &Json) -> Option<i32> {
    if let Some(v) = value.as_i64() {
        return Some(v as i32);
    }
    if let Some(v) = value.as_f64() {
        warn!("Converting float to int when applying value");
        return Some(v as i32);
    }
    None
}

pub fn json_as_float_array<const N: usize>(value: &Json) -> Option<[f32; N]> {
    let array = value.as_array()?;
    if array.len() != N {
        return None;
    }
    let mut out = [0.0f32; N];
    for (slot, element) in out.iter_mut().zip(array) {
        *slot = element.as_f64()? as f32;
    }
    Some(out)
}

pub fn json_as_int_array<const N: usize>(value: &Json) -> Option<[i32; N]> {
    let array = value.as_array()?;
    if array.len() != N {
        return None;
    }
    let mut out = [0i32; N];
    for (slot, element) in out.iter_mut().zip(array) {
        *slot = json_as_int(element)?;
    }
    Some(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_full_path() {
        let parsed = parse_path(
            "graphs/Wood/images?usage=baseColor#packageHash=abc#params={\"$outputsize\":[4,4]}",
        )
        .unwrap();
        assert_eq!(parsed.graph_name, "Wood");
        assert_eq!(parsed.bind, BindKind::Usage);
        assert_eq!(parsed.usage, "baseColor");
        assert_eq!(parsed.package_hash, 0xabc);
        assert_eq!(parsed.params_json, "{\"$outputsize\":[4,4]}");
        assert_eq!(
            parsed.params.get("$outputsize"),
            Some(&serde_json::json!([4, 4]))
        );
    }

    #[test]
    fn round_trip() {
        let path = "graphs/Wood/images?identifier=basecolor#preset=worn#packageHash=b427747e86441362#params={\"a\":1,\"b\":[0.5,0.25]}";
        let parsed = parse_path(path).unwrap();
        let formatted = format_path(&parsed);
        assert_eq!(formatted, path);
        assert_eq!(parse_path(&formatted).unwrap(), parsed);
    }

    #[test]
    fn default_preset_is_dropped_on_format() {
        let path = "graphs/G/images?usage=baseColor#preset=__default__#params={}";
        let parsed = parse_path(path).unwrap();
        assert_eq!(
            format_path(&parsed),
            "graphs/G/images?usage=baseColor#params={}"
        );
    }

    #[test]
    fn canonical_rendering_is_stable() {
        // Spacing differences collapse onto the same fingerprint.
        let a = parse_path("graphs/G/images?usage=u#params={\"a\": 1, \"b\": 2}").unwrap();
        let b = parse_path("graphs/G/images?usage=u#params={\"a\":1,\"b\":2}").unwrap();
        assert_eq!(a.params_json, b.params_json);
        assert_eq!(format_path(&a), format_path(&b));

        // Key order is preserved, so a reordering is a different fingerprint.
        let c = parse_path("graphs/G/images?usage=u#params={\"b\":2,\"a\":1}").unwrap();
        assert_ne!(a.params_json, c.params_json);
    }

    #[test]
    fn rejects_malformed_paths() {
        assert!(matches!(
            parse_path("graphs/Wood/images"),
            Err(PathError::InvalidFormat(_))
        ));
        assert!(matches!(
            parse_path("nodes/Wood/images?usage=a"),
            Err(PathError::InvalidFormat(_))
        ));
        assert!(matches!(
            parse_path("graphs/Wood/meshes?usage=a"),
            Err(PathError::InvalidAssetType(_))
        ));
        assert!(matches!(
            parse_path("graphs/Wood/images?usage=a#usage=b"),
            Err(PathError::InvalidFormat(_))
        ));
        assert!(matches!(
            parse_path("graphs/Wood/images?usage=a#packageHash=1#packageHash=2#params={}"),
            Err(PathError::InvalidFormat(_))
        ));
        assert!(matches!(
            parse_path("graphs/Wood/images?usage=a#params=[1]"),
            Err(PathError::InvalidFormat(_))
        ));
        assert!(matches!(
            parse_path("graphs/Wood/images?params={}"),
            Err(PathError::InvalidFormat(_))
        ));
    }

    #[test]
    fn json_coercions() {
        assert_eq!(json_as_float(&serde_json::json!(1)), Some(1.0));
        assert_eq!(json_as_float(&serde_json::json!(0.5)), Some(0.5));
        assert_eq!(json_as_int(&serde_json::json!(3)), Some(3));
        assert_eq!(json_as_int(&serde_json::json!(3.7)), Some(3));
        assert_eq!(json_as_int(&serde_json::json!("3")), None);
        assert_eq!(
            json_as_float_array::<2>(&serde_json::json!([1, 2])),
            Some([1.0, 2.0])
        );
        assert_eq!(json_as_float_array::<3>(&serde_json::json!([1, 2])), None);
        assert_eq!(
            json_as_int_array::<4>(&serde_json::json!([1, 2, 3, 4])),
            Some([1, 2, 3, 4])
        );
    }
}
