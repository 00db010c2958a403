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

use log::debug;

/// File-format arguments as the host hands them over: stringly typed
/// key/value pairs. Unknown keys are ignored by every reader.
pub type FormatArgMap = HashMap<String, String>;

pub fn arg_read_bool(args: &FormatArgMap, key: &str, out: &mut bool, tag: &str) {
    if let Some(value) = args.get(key) {
        match value.as_str() {
            "true" | "1" => *out = true,
            "false" | "0" => *out = false,
            other => debug!("{}: ignoring non boolean arg {} = {}", tag, key, other),
        }
    }
}

pub fn arg_read_int(args: &FormatArgMap, key: &str, out: &mut i32, tag: &str) {
    if let Some(value) = args.get(key) {
        match value.parse() {
            Ok(parsed) => *out = parsed,
            Err(_) => debug!("{}: ignoring non integer arg {} = {}", tag, key, value),
        }
    }
}

pub fn arg_read_float(args: &FormatArgMap, key: &str, out: &mut f32, tag: &str) {
    if let Some(value) = args.get(key) {
        match value.parse() {
            Ok(parsed) => *out = parsed,
            Err(_) => debug!("{}: ignoring non float arg {} = {}", tag, key, value),
        }
    }
}

/// Float arrays come in as whitespace or comma separated lists.
pub fn arg_read_float_array(args: &FormatArgMap, key: &str, out: &mut Vec<f32>, tag: &str) {
    if let Some(value) = args.get(key) {
        let parsed: Result<Vec<f32>, _> = value
            .split(|c: char| c == ',' || c.is_whitespace())
            .filter(|s| !s.is_empty())
            .map(str::parse)
            .collect();
        match parsed {
            Ok(values) => *out = values,
            Err(_) => debug!("{}: ignoring malformed float array {} = {}", tag, key, value),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reads_typed_args() {
        let mut args = FormatArgMap::new();
        args.insert("flag".into(), "true".into());
        args.insert("depth".into(), "3".into());
        args.insert("width".into(), "0.25".into());
        args.insert("box".into(), "-1, -1, -1, 1, 1, 1".into());

        let mut flag = false;
        let mut depth = 0;
        let mut width = 0.0;
        let mut bounds = Vec::new();
        arg_read_bool(&args, "flag", &mut flag, "test");
        arg_read_int(&args, "depth", &mut depth, "test");
        arg_read_float(&args, "width", &mut width, "test");
        arg_read_float_array(&args, "box", &mut bounds, "test");
        assert!(flag);
        assert_eq!(depth, 3);
        assert_eq!(width, 0.25);
        assert_eq!(bounds, vec![-1.0, -1.0, -1.0, 1.0, 1.0, 1.0]);
    }

    #[test]
    fn malformed_values_keep_defaults() {
        let mut args = FormatArgMap::new();
        args.insert("depth".into(), "deep".into());
        let mut depth = 7;
        arg_read_int(&args, "depth", &mut depth, "test");
        assert_eq!(depth, 7);
    }
}
