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

use log::{debug, warn};
use umber_common::{
    convert_color, linear_to_srgb, read_dict_json, write_dict_json, Dictionary, Value,
};
use umber_host::{
    arg_read_bool, arg_read_int, resolver, AttributeSource, FormatArgMap, ResolvedPath,
};
use umber_engine::InputWidget;

use crate::{add_input_image, parameter_list, SymbolMapper};

/// All attributes that influence file-format arguments share this prefix.
pub const PROCEDURAL_PARAMETER_PREFIX: &str = "procedural_sbsar:";

/// The file-format argument the parameter dictionary travels in.
pub const SBSAR_PARAMETERS_ARG: &str = "sbsarParameters";

const DEBUG_TAG: &str = "SBSAR";

/// Options recognized by the package plugin. Unknown arguments are ignored.
#[derive(Debug, Clone)]
pub struct SbsarArgs {
    pub sbsar_parameters: Dictionary,
    pub depth: i32,
    pub write_material_x: bool,
    pub write_asm: bool,
    pub write_usd_preview_surface: bool,
}

impl Default for SbsarArgs {
    fn default() -> Self {
        Self {
            sbsar_parameters: Dictionary::default(),
            depth: 0,
            write_material_x: false,
            write_asm: false,
            write_usd_preview_surface: true,
        }
    }
}

pub fn parse_sbsar_args(args: &FormatArgMap) -> SbsarArgs {
    let mut out = SbsarArgs::default();
    if let Some(parameters) = args.get(SBSAR_PARAMETERS_ARG) {
        match read_dict_json(parameters) {
            Some(dict) => out.sbsar_parameters = dict,
            None => warn!("Failed to parse {} argument", SBSAR_PARAMETERS_ARG),
        }
    }
    arg_read_int(args, "depth", &mut out.depth, DEBUG_TAG);
    arg_read_bool(args, "writeMaterialX", &mut out.write_material_x, DEBUG_TAG);
    arg_read_bool(args, "writeASM", &mut out.write_asm, DEBUG_TAG);
    arg_read_bool(
        args,
        "writeUsdPreviewSurface",
        &mut out.write_usd_preview_surface,
        DEBUG_TAG,
    );
    out
}

/// Attribute name carrying one package input on a payload prim.
pub fn input_attribute_name(mapper: &mut SymbolMapper, identifier: &str) -> String {
    format!(
        "{}{}",
        PROCEDURAL_PARAMETER_PREFIX,
        mapper.symbol(identifier).host_name
    )
}

/// Whether a changed attribute can change the composed file-format
/// arguments. Every value change below the procedural prefix recomputes.
pub fn can_attribute_change_affect_args(attribute_name: &str) -> bool {
    attribute_name.starts_with(PROCEDURAL_PARAMETER_PREFIX)
}

/// Prim fields never influence the arguments, only attribute defaults do.
pub fn can_field_change_affect_args(_field: &str) -> bool {
    false
}

/// Compose the dynamic file-format arguments for a prim that payloads a
/// package: read the current value of every input's attribute, convert
/// colors from the host's linear space to the sRGB space the engine
/// expects, route images through the input image cache and serialize the
/// collected dictionary as canonical JSON.
pub fn compose_format_arguments(
    package_path: &str,
    source: &dyn AttributeSource,
) -> Option<(String, String)> {
    let parameters = match parameter_list(package_path) {
        Ok(parameters) => parameters,
        Err(err) => {
            warn!("Cannot compose arguments for {}: {}", package_path, err);
            return None;
        }
    };

    let mut mapper = SymbolMapper::default();
    let mut dict = Dictionary::default();
    for input in parameters.iter() {
        let attribute = input_attribute_name(&mut mapper, &input.identifier);
        let Some(mut value) = source.attribute_default(&attribute) else {
            continue;
        };
        debug!("Param found: {} = {:?}", input.identifier, value);
        if input.is_image() {
            let hash = match value.as_str().map(str::to_owned) {
                Some(path) if !path.is_empty() => {
                    let resolved = resolver()
                        .resolve(&path)
                        .unwrap_or_else(|| ResolvedPath::new(path));
                    add_input_image(&resolved)
                }
                _ => 0,
            };
            dict.insert(input.identifier.clone(), Value::UInt64(hash));
        } else {
            // The host stores colors linearly, the engine expects sRGB. The
            // inverse conversion happens when defaults are exported.
            if input.widget == InputWidget::Color {
                convert_color(&mut value, linear_to_srgb);
            }
            dict.insert(input.identifier.clone(), value);
        }
    }

    if dict.is_empty() {
        None
    } else {
        Some((SBSAR_PARAMETERS_ARG.to_owned(), write_dict_json(&dict)))
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;
    use std::io::Write;

    use bytes::Bytes;
    use umber_engine::{
        GraphDesc, InputDesc, InputType, InputValue, OutputDesc, PackageBuilder, PixelFormat,
    };

    use super::*;
    use crate::test_support::global_lock;

    #[test]
    fn parses_recognized_arguments() {
        let mut args = FormatArgMap::new();
        args.insert(
            SBSAR_PARAMETERS_ARG.into(),
            r#"{"tearing":0.7,"$outputsize":[4,4]}"#.into(),
        );
        args.insert("depth".into(), "2".into());
        args.insert("writeMaterialX".into(), "true".into());
        args.insert("someUnknownArg".into(), "whatever".into());

        let parsed = parse_sbsar_args(&args);
        assert_eq!(parsed.depth, 2);
        assert!(parsed.write_material_x);
        assert!(!parsed.write_asm);
        assert!(parsed.write_usd_preview_surface);
        assert_eq!(
            parsed.sbsar_parameters.get("tearing"),
            Some(&Value::Float(0.7))
        );
        assert_eq!(
            parsed.sbsar_parameters.get("$outputsize"),
            Some(&Value::Int2([4, 4]))
        );
    }

    #[test]
    fn prefix_gates_recomputation() {
        assert!(can_attribute_change_affect_args(
            "procedural_sbsar:tearing"
        ));
        assert!(!can_attribute_change_affect_args("xformOp:translate"));
        assert!(!can_field_change_affect_args("active"));
    }

    fn write_args_package(name: &str) -> String {
        let bytes = PackageBuilder::default()
            .graph(GraphDesc {
                label: "G".into(),
                category: String::new(),
                thumbnail: Bytes::new(),
                inputs: vec![
                    InputDesc {
                        identifier: "tint".into(),
                        label: String::new(),
                        group: String::new(),
                        ty: InputType::Float3,
                        widget: umber_engine::InputWidget::Color,
                        default: InputValue::Float3([0.5; 3]),
                        min: None,
                        max: None,
                    },
                    InputDesc {
                        identifier: "mask".into(),
                        label: String::new(),
                        group: String::new(),
                        ty: InputType::Image,
                        widget: umber_engine::InputWidget::Image,
                        default: InputValue::Image(None),
                        min: None,
                        max: None,
                    },
                ],
                outputs: vec![OutputDesc {
                    identifier: "basecolor".into(),
                    usages: vec!["baseColor".into()],
                    format: PixelFormat::default(),
                    numeric: None,
                }],
                presets: Vec::new(),
            })
            .build();
        let dir = std::env::temp_dir().join("umber_args_test");
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join(name);
        let mut file = std::fs::File::create(&path).unwrap();
        file.write_all(&bytes).unwrap();
        path.to_str().unwrap().to_owned()
    }

    fn write_mask_png(name: &str) -> String {
        let dir = std::env::temp_dir().join("umber_args_test");
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join(name);
        image::RgbaImage::from_pixel(2, 2, image::Rgba([255, 0, 0, 255]))
            .save(&path)
            .unwrap();
        path.to_str().unwrap().to_owned()
    }

    #[test]
    fn composes_arguments_from_attributes() {
        let _guard = global_lock();
        crate::clear_cache();
        let package = write_args_package("compose.sbsar");
        let mask = write_mask_png("mask_a.png");

        let mut attributes: HashMap<String, Value> = HashMap::new();
        attributes.insert(
            "procedural_sbsar:tint".into(),
            Value::Float3([0.5, 0.5, 0.5]),
        );
        attributes.insert("procedural_sbsar:mask".into(), Value::AssetPath(mask.clone()));

        let (key, json) = compose_format_arguments(&package, &attributes).unwrap();
        assert_eq!(key, SBSAR_PARAMETERS_ARG);
        let dict = read_dict_json(&json).unwrap();

        // Linear 0.5 converts to sRGB ~0.7354.
        match dict.get("tint") {
            Some(Value::Float3(c)) => assert!((c[0] - 0.73536).abs() < 1e-3),
            other => panic!("unexpected tint value {:?}", other),
        }
        let first_hash = match dict.get("mask") {
            Some(Value::UInt64(hash)) => *hash,
            other => panic!("unexpected mask value {:?}", other),
        };
        assert_ne!(first_hash, 0);

        // A different resolved image path must produce a different hash and
        // therefore a different parameter fingerprint.
        let other_mask = write_mask_png("mask_b.png");
        attributes.insert("procedural_sbsar:mask".into(), Value::AssetPath(other_mask));
        let (_, other_json) = compose_format_arguments(&package, &attributes).unwrap();
        let other_dict = read_dict_json(&other_json).unwrap();
        match other_dict.get("mask") {
            Some(Value::UInt64(hash)) => assert_ne!(*hash, first_hash),
            other => panic!("unexpected mask value {:?}", other),
        }
        assert_ne!(json, other_json);

        // Attributes without values simply do not contribute.
        let empty: HashMap<String, Value> = HashMap::new();
        assert!(compose_format_arguments(&package, &empty).is_none());
    }
}
