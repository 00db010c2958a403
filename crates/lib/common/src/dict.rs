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
use serde_json::{json, Map, Number};

use crate::{Dictionary, Value};

fn number_to_value(n: &Number) -> Option<Value> {
    if let Some(v) = n.as_u64() {
        if v > i32::MAX as u64 {
            return Some(Value::UInt64(v));
        }
    }
    if let Some(v) = n.as_i64() {
        return Some(Value::Int(v as i32));
    }
    n.as_f64().map(|v| Value::Float(v as f32))
}

fn array_to_value(key: &str, a: &[serde_json::Value]) -> Option<Value> {
    if a.len() < 2 || a.len() > 4 {
        warn!("Invalid array size {} for {}", a.len(), key);
        return None;
    }
    if a.iter().all(|v| v.is_i64() || v.is_u64()) {
        let e: Vec<i32> = a.iter().map(|v| v.as_i64().unwrap_or(0) as i32).collect();
        match e.len() {
            2 => Some(Value::Int2([e[0], e[1]])),
            3 => Some(Value::Int3([e[0], e[1], e[2]])),
            _ => Some(Value::Int4([e[0], e[1], e[2], e[3]])),
        }
    } else {
        let e: Vec<f32> = a
            .iter()
            .map(|v| v.as_f64().unwrap_or(0.0) as f32)
            .collect();
        match e.len() {
            2 => Some(Value::Float2([e[0], e[1]])),
            3 => Some(Value::Float3([e[0], e[1], e[2]])),
            _ => Some(Value::Float4([e[0], e[1], e[2], e[3]])),
        }
    }
}

fn value_to_json(value: &Value) -> Option<serde_json::Value> {
    let json = match value {
        Value::Int(v) => json!(v),
        Value::UInt64(v) => json!(v),
        Value::Float(v) => json!(v),
        Value::String(v) | Value::AssetPath(v) => json!(v),
        Value::Float2(v) => json!(v),
        Value::Float3(v) => json!(v),
        Value::Float4(v) => json!(v),
        Value::Int2(v) => json!(v),
        Value::Int3(v) => json!(v),
        Value::Int4(v) => json!(v),
        Value::Bool(_) => return None,
    };
    Some(json)
}

/// Render a dictionary as JSON. The rendering is deterministic: keys keep
/// their insertion order and numbers are emitted without spurious precision,
/// which makes the output usable as a cache fingerprint.
pub fn write_dict_json(dict: &Dictionary) -> String {
    let mut object = Map::new();
    for (key, value) in dict {
        match value_to_json(value) {
            Some(json) => {
                object.insert(key.clone(), json);
            }
            None => warn!("Unsupported dict value {}: {:?}", key, value),
        }
    }
    serde_json::Value::Object(object).to_string()
}

/// Parse a JSON object back into a dictionary. Numeric arrays of size 2-4
/// become fixed-size vectors; integer and real elements are distinguished by
/// the JSON representation of the first element.
pub fn read_dict_json(input: &str) -> Option<Dictionary> {
    let parsed: serde_json::Value = match serde_json::from_str(input) {
        Ok(v) => v,
        Err(err) => {
            warn!("Failed to parse json data: {}", err);
            return None;
        }
    };
    let object = match parsed.as_object() {
        Some(o) => o,
        None => {
            warn!("Failed to parse json data, needs an object at root");
            return None;
        }
    };
    let mut dict = Dictionary::default();
    for (key, value) in object {
        let converted = match value {
            serde_json::Value::Number(n) => number_to_value(n),
            serde_json::Value::String(s) => Some(Value::String(s.clone())),
            serde_json::Value::Array(a) => array_to_value(key, a),
            _ => {
                warn!("Unsupported dict value {}", key);
                None
            }
        };
        if let Some(converted) = converted {
            dict.insert(key.clone(), converted);
        }
    }
    Some(dict)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trip() {
        let mut dict = Dictionary::default();
        dict.insert("tearing".into(), Value::Float(0.71));
        dict.insert("seed".into(), Value::Int(42));
        dict.insert("size".into(), Value::Int2([4, 4]));
        dict.insert("tint".into(), Value::Float3([0.5, 0.25, 0.125]));
        dict.insert("name".into(), Value::String("cardboard".into()));
        let json = write_dict_json(&dict);
        let parsed = read_dict_json(&json).unwrap();
        assert_eq!(parsed, dict);
    }

    #[test]
    fn order_is_preserved() {
        let mut dict = Dictionary::default();
        dict.insert("b".into(), Value::Int(2));
        dict.insert("a".into(), Value::Int(1));
        assert_eq!(write_dict_json(&dict), r#"{"b":2,"a":1}"#);
    }

    #[test]
    fn image_hash_survives() {
        let mut dict = Dictionary::default();
        dict.insert("mask".into(), Value::UInt64(0xffff_ffff_ffff_fff0));
        let parsed = read_dict_json(&write_dict_json(&dict)).unwrap();
        assert_eq!(parsed.get("mask"), Some(&Value::UInt64(0xffff_ffff_ffff_fff0)));
    }

    #[test]
    fn rejects_non_object() {
        assert!(read_dict_json("[1, 2]").is_none());
        assert!(read_dict_json("not json").is_none());
    }
}
