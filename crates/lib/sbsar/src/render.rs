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

use log::{debug, error, warn};
use serde_json::Value as Json;
use umber_common::Value;
use umber_engine::{
    EngineVariant, GraphInstance, InputType, InputValue, OutputPayload, OutputUpdate, PixelFormat,
    RenderEngine, SHUFFLE_BGRA_TO_RGBA,
};

use crate::{
    input_image, json_as_float, json_as_float_array, json_as_int, json_as_int_array, AssetCache,
    GraphInstanceData, ParsedPath, RenderResult, SbsarAsset,
};

/// Coerce one JSON leaf onto one typed input cell.
fn coerce_value(ty: InputType, value: &Json) -> Option<InputValue> {
    let cell = match ty {
        InputType::Float => InputValue::Float(json_as_float(value)?),
        InputType::Float2 => InputValue::Float2(json_as_float_array(value)?),
        InputType::Float3 => InputValue::Float3(json_as_float_array(value)?),
        InputType::Float4 => InputValue::Float4(json_as_float_array(value)?),
        InputType::Int => InputValue::Int(json_as_int(value)?),
        InputType::Int2 => InputValue::Int2(json_as_int_array(value)?),
        InputType::Int3 => InputValue::Int3(json_as_int_array(value)?),
        InputType::Int4 => InputValue::Int4(json_as_int_array(value)?),
        InputType::String => InputValue::String(value.as_str()?.to_owned()),
        InputType::Image => {
            // Image parameters carry the input image cache hash; 0 clears.
            let hash = value.as_u64()?;
            if hash == 0 {
                InputValue::Image(None)
            } else {
                match input_image(hash) {
                    Some(image) => InputValue::Image(Some(image)),
                    None => {
                        warn!("Image not found in cache, resetting input");
                        InputValue::Image(None)
                    }
                }
            }
        }
    };
    Some(cell)
}

/// Reset every input, then apply the values present in the parameter JSON.
/// A value that does not fit its input's declared type is logged and the
/// input keeps its default for this render.
pub(crate) fn apply_parameters(instance: &mut GraphInstance, parsed: &ParsedPath) {
    instance.reset_all();
    for index in 0..instance.desc().inputs.len() {
        let desc = &instance.desc().inputs[index];
        let Some(value) = parsed.params.get(&desc.identifier) else {
            continue;
        };
        let identifier = desc.identifier.clone();
        match coerce_value(desc.ty, value) {
            Some(cell) => {
                if let Err(err) = instance.set(index, cell) {
                    warn!("Failed to apply value for {}: {}", identifier, err);
                }
            }
            None => warn!("Failed to apply value for {}: wrong JSON shape", identifier),
        }
    }
}

/// The OpenGL engine flavor returns 8 bit buffers in BGRA; ask it to swap
/// red and blue so the host always sees RGBA.
pub(crate) fn patch_output_formats(variant: EngineVariant, instance: &mut GraphInstance) {
    if !variant.is_opengl() {
        return;
    }
    let eight_bit: Vec<usize> = instance
        .desc()
        .outputs
        .iter()
        .enumerate()
        .filter(|(_, o)| o.numeric.is_none() && o.format.precision() == PixelFormat::PREC_8I)
        .map(|(index, _)| index)
        .collect();
    for index in eight_bit {
        instance.override_output_shuffle(index, SHUFFLE_BGRA_TO_RGBA);
    }
}

/// Engine numerics surface to the host as float or bool; the engine has no
/// bool type, so integers carry toggles.
fn numeric_to_value(payload: &OutputPayload) -> Option<Value> {
    match payload {
        OutputPayload::Float(v) => Some(Value::Float(*v)),
        OutputPayload::Int(v) => Some(Value::Bool(*v != 0)),
        OutputPayload::Image(_) => None,
    }
}

/// Run one render pass. Returns the updates the engine produced and the
/// parameter fingerprint the instance was rendered with before this call.
pub(crate) fn render_pass(
    engine: &mut dyn RenderEngine,
    data: &mut GraphInstanceData,
    parsed: &ParsedPath,
) -> Result<(Vec<OutputUpdate>, String), String> {
    patch_output_formats(engine.variant(), &mut data.instance);
    apply_parameters(&mut data.instance, parsed);
    debug!("Render: starting rendering");
    let updates = engine
        .render(&mut data.instance)
        .map_err(|err| err.to_string())?;
    debug!("Render: done rendering");
    let previous = std::mem::replace(&mut data.last_input_parameters, parsed.params_json.clone());
    Ok((updates, previous))
}

/// Turn engine updates into a cacheable render result. Outputs the engine
/// skipped are recovered from the previous result of the same instance,
/// which lives in the cache under the fingerprint rendered before this one.
pub(crate) fn assemble_result(
    cache: &mut AssetCache,
    instance: &GraphInstance,
    updates: Vec<OutputUpdate>,
    parsed: &ParsedPath,
    previous_params: &str,
) -> RenderResult {
    let desc = instance.desc();
    let mut result = RenderResult::default();

    let mut updated = vec![false; desc.outputs.len()];
    for update in &updates {
        if update.output_index < updated.len() {
            updated[update.output_index] = true;
        }
    }

    for update in updates {
        let Some(output) = desc.outputs.get(update.output_index) else {
            warn!("Render: engine returned unknown output {}", update.output_index);
            continue;
        };
        match update.payload {
            OutputPayload::Image(texture) => {
                let srgb = output.usages.iter().any(|u| u == "baseColor");
                let asset = Arc::new(SbsarAsset::from_texture(&texture, srgb));
                for usage in &output.usages {
                    result.add_asset(usage.clone(), asset.clone());
                }
            }
            payload => {
                match numeric_to_value(&payload) {
                    Some(value) => {
                        for usage in &output.usages {
                            result.add_numeric_value(usage.clone(), value.clone());
                        }
                    }
                    None => error!(
                        "Render: failed to convert numeric output {}",
                        output.identifier
                    ),
                }
            }
        }
    }

    // Unchanged outputs: share the previous result of this instance.
    let mut previous = parsed.clone();
    previous.params_json = previous_params.to_owned();
    for (index, output) in desc.outputs.iter().enumerate() {
        if updated[index] {
            continue;
        }
        debug!(
            "Render: result was not computed for {}, looking for previous result",
            output.identifier
        );
        for usage in &output.usages {
            previous.usage = usage.clone();
            if let Some(asset) = cache.asset(&previous) {
                result.add_asset(usage.clone(), asset);
            } else if let Some(value) = cache.numeric_value(&previous) {
                result.add_numeric_value(usage.clone(), value);
            } else {
                error!("Render: previous result not found for {}", usage);
            }
        }
    }

    result
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use bytes::Bytes;
    use umber_engine::{
        ChannelOrder, GraphDesc, InputDesc, InputWidget, NumericKind, OutputDesc, PackageBuilder,
        PackageDesc, Texture, SHUFFLE_BGRA_TO_RGBA,
    };

    use super::*;
    use crate::parse_path;

    fn package() -> Arc<PackageDesc> {
        let bytes = PackageBuilder::default()
            .graph(GraphDesc {
                label: "G".into(),
                category: String::new(),
                thumbnail: Bytes::new(),
                inputs: vec![
                    InputDesc {
                        identifier: "tearing".into(),
                        label: String::new(),
                        group: String::new(),
                        ty: InputType::Float,
                        widget: InputWidget::Slider,
                        default: InputValue::Float(0.5),
                        min: None,
                        max: None,
                    },
                    InputDesc {
                        identifier: "size".into(),
                        label: String::new(),
                        group: String::new(),
                        ty: InputType::Int2,
                        widget: InputWidget::NoWidget,
                        default: InputValue::Int2([8, 8]),
                        min: None,
                        max: None,
                    },
                    InputDesc {
                        identifier: "label".into(),
                        label: String::new(),
                        group: String::new(),
                        ty: InputType::String,
                        widget: InputWidget::NoWidget,
                        default: InputValue::String(String::new()),
                        min: None,
                        max: None,
                    },
                ],
                outputs: vec![
                    OutputDesc {
                        identifier: "basecolor".into(),
                        usages: vec!["baseColor".into(), "diffuse".into()],
                        format: PixelFormat::default(),
                        numeric: None,
                    },
                    OutputDesc {
                        identifier: "scale".into(),
                        usages: vec!["heightScale".into()],
                        format: PixelFormat::default(),
                        numeric: Some(NumericKind::Float),
                    },
                ],
                presets: Vec::new(),
            })
            .build();
        Arc::new(PackageDesc::read(bytes).unwrap())
    }

    fn parsed(params: &str) -> ParsedPath {
        parse_path(&format!("graphs/G/images?usage=baseColor#params={}", params)).unwrap()
    }

    #[test]
    fn applies_well_typed_parameters() {
        let mut instance = GraphInstance::new(package(), 0);
        let parsed = parsed(r#"{"tearing":0.75,"size":[4,4],"label":"x"}"#);
        apply_parameters(&mut instance, &parsed);
        assert!(matches!(instance.cell(0), InputValue::Float(v) if *v == 0.75));
        assert!(matches!(instance.cell(1), InputValue::Int2(v) if *v == [4, 4]));
        assert!(matches!(instance.cell(2), InputValue::String(v) if v == "x"));
    }

    #[test]
    fn mismatched_parameters_keep_defaults() {
        let mut instance = GraphInstance::new(package(), 0);
        apply_parameters(&mut instance, &parsed(r#"{"tearing":0.75}"#));
        assert!(matches!(instance.cell(0), InputValue::Float(v) if *v == 0.75));

        // A wrong JSON shape leaves the input at its default and unrelated
        // inputs reset.
        apply_parameters(&mut instance, &parsed(r#"{"tearing":"a lot"}"#));
        assert!(matches!(instance.cell(0), InputValue::Float(v) if *v == 0.5));
        assert!(matches!(instance.cell(1), InputValue::Int2(v) if *v == [8, 8]));
    }

    #[test]
    fn opengl_engines_get_channel_swaps() {
        let mut instance = GraphInstance::new(package(), 0);
        patch_output_formats(EngineVariant::Sse2, &mut instance);
        assert_eq!(instance.output_shuffle(0), None);

        patch_output_formats(EngineVariant::Ogl3, &mut instance);
        assert_eq!(instance.output_shuffle(0), Some(SHUFFLE_BGRA_TO_RGBA));
        // Numeric outputs are never patched.
        assert_eq!(instance.output_shuffle(1), None);
    }

    fn image_update(index: usize, fill: u8) -> OutputUpdate {
        OutputUpdate {
            output_index: index,
            payload: OutputPayload::Image(Texture {
                width: 2,
                height: 2,
                format: PixelFormat::default(),
                channel_order: ChannelOrder::Rgba,
                mip_count: 1,
                data: Bytes::from(vec![fill; 16]),
            }),
        }
    }

    #[test]
    fn usages_share_buffers_and_numerics_convert() {
        let mut cache = AssetCache::default();
        let instance = GraphInstance::new(package(), 0);
        let parsed = parsed("{}");
        let updates = vec![
            image_update(0, 9),
            OutputUpdate {
                output_index: 1,
                payload: OutputPayload::Float(2.5),
            },
        ];
        let result = assemble_result(&mut cache, &instance, updates, &parsed, "{}");
        let base = result.asset("baseColor").unwrap();
        let diffuse = result.asset("diffuse").unwrap();
        assert!(Arc::ptr_eq(&base, &diffuse));
        assert!(base.header().unwrap().is_srgb);
        assert_eq!(result.numeric_value("heightScale"), Some(Value::Float(2.5)));
    }

    #[test]
    fn skipped_outputs_reuse_the_previous_result() {
        let mut cache = AssetCache::default();
        let instance = GraphInstance::new(package(), 0);

        // First render under the old fingerprint.
        let old = parsed(r#"{"tearing":0.25}"#);
        let updates = vec![
            image_update(0, 1),
            OutputUpdate {
                output_index: 1,
                payload: OutputPayload::Float(1.0),
            },
        ];
        let first = assemble_result(&mut cache, &instance, updates, &old, "{}");
        let first_asset = first.asset("baseColor").unwrap();
        cache.add_result(&old, first);

        // Second render: the engine skipped both outputs, so both come from
        // the result stored under the previous fingerprint.
        let new = parsed(r#"{"tearing":0.75}"#);
        let reused = assemble_result(&mut cache, &instance, Vec::new(), &new, &old.params_json);
        assert!(Arc::ptr_eq(&reused.asset("baseColor").unwrap(), &first_asset));
        assert_eq!(reused.numeric_value("heightScale"), Some(Value::Float(1.0)));

        // With no previous result the reuse path comes up empty.
        let missing = assemble_result(&mut cache, &instance, Vec::new(), &new, r#"{"gone":1}"#);
        assert!(missing.asset("baseColor").is_none());
        assert!(missing.is_empty());
    }
}
