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

use log::debug;
use umber_common::{convert_color, srgb_to_linear, write_dict_json, Value};
use umber_engine::{GraphDesc, InputDesc, InputType, InputValue, InputWidget};
use umber_host::{join_package_path, split_package_path, AttrSpec, LayerData, PrimSpec, Specifier};

use crate::{
    format_path, input_attribute_name, package, ParsedPath, SbsarArgs, SbsarResult, SymbolMapper,
};

/// Shared class prim holding material wide defaults. Inactive, so it is
/// pruned when the host flattens the stage.
const MATERIAL_CLASS_NAME: &str = "_class_sbsarMaterial";

/// Texture channels a material prim binds to rendered outputs.
const TEXTURE_USAGES: &[&str] = &[
    "baseColor",
    "roughness",
    "metallic",
    "normal",
    "height",
    "emissiveColor",
    "occlusion",
    "opacity",
];

/// Extension under which rendered pixel buffers resolve.
pub const RENDERED_IMAGE_EXTENSION: &str = ".sbsarimage";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum GraphType {
    Material,
    Light,
}

fn classify_graph(graph: &GraphDesc) -> GraphType {
    if graph.category.to_ascii_lowercase().contains("light") {
        GraphType::Light
    } else {
        GraphType::Material
    }
}

fn attr_type_name(ty: InputType) -> &'static str {
    match ty {
        InputType::Float => "float",
        InputType::Float2 => "float2",
        InputType::Float3 => "float3",
        InputType::Float4 => "float4",
        InputType::Int => "int",
        InputType::Int2 => "int2",
        InputType::Int3 => "int3",
        InputType::Int4 => "int4",
        InputType::String => "string",
        InputType::Image => "asset",
    }
}

fn default_value(input: &InputDesc) -> Value {
    let mut value = match &input.default {
        InputValue::Float(v) => Value::Float(*v),
        InputValue::Float2(v) => Value::Float2(*v),
        InputValue::Float3(v) => Value::Float3(*v),
        InputValue::Float4(v) => Value::Float4(*v),
        InputValue::Int(v) => Value::Int(*v),
        InputValue::Int2(v) => Value::Int2(*v),
        InputValue::Int3(v) => Value::Int3(*v),
        InputValue::Int4(v) => Value::Int4(*v),
        InputValue::String(v) => Value::String(v.clone()),
        InputValue::Image(_) => Value::AssetPath(String::new()),
    };
    // Package colors are sRGB, host attributes are linear. The dynamic
    // argument protocol applies the inverse on the way back in.
    if input.widget == InputWidget::Color {
        convert_color(&mut value, srgb_to_linear);
    }
    value
}

fn input_attribute(mapper: &mut SymbolMapper, input: &InputDesc) -> AttrSpec {
    let mut attr = AttrSpec::new(
        input_attribute_name(mapper, &input.identifier),
        attr_type_name(input.ty),
    )
    .with_default(default_value(input));
    if let Some(min) = input.min {
        attr.metadata.insert("min".to_owned(), Value::Float(min));
    }
    if let Some(max) = input.max {
        attr.metadata.insert("max".to_owned(), Value::Float(max));
    }
    if !input.label.is_empty() {
        attr.metadata
            .insert("displayName".to_owned(), Value::String(input.label.clone()));
    }
    if !input.group.is_empty() {
        attr.metadata
            .insert("displayGroup".to_owned(), Value::String(input.group.clone()));
    }
    attr
}

fn texture_asset_path(
    package_path: &str,
    graph: &GraphDesc,
    usage: &str,
    package_hash: u64,
    params_json: &str,
) -> String {
    let mut parsed = ParsedPath::for_usage(&graph.label, usage);
    parsed.package_hash = package_hash;
    parsed.params_json = params_json.to_owned();
    join_package_path(
        package_path,
        &format!("{}{}", format_path(&parsed), RENDERED_IMAGE_EXTENSION),
    )
}

fn add_material_prim(
    package_path: &str,
    graph: &GraphDesc,
    prim_name: &str,
    package_hash: u64,
    params_json: &str,
    mapper: &mut SymbolMapper,
) -> PrimSpec {
    let mut prim = PrimSpec::new(prim_name, "Material", Specifier::Def);
    prim.inherits.push(format!("/{}", MATERIAL_CLASS_NAME));
    for input in &graph.inputs {
        prim.attributes.push(input_attribute(mapper, input));
    }
    for output in &graph.outputs {
        if output.numeric.is_some() {
            continue;
        }
        for usage in &output.usages {
            if !TEXTURE_USAGES.contains(&usage.as_str()) {
                continue;
            }
            let mut shader = PrimSpec::new(format!("{}Texture", usage), "Shader", Specifier::Def);
            shader.attributes.push(
                AttrSpec::new("inputs:file", "asset").with_default(Value::AssetPath(
                    texture_asset_path(package_path, graph, usage, package_hash, params_json),
                )),
            );
            prim.children.push(shader);
        }
    }
    prim
}

fn add_dome_light_prim(
    package_path: &str,
    graph: &GraphDesc,
    prim_name: &str,
    package_hash: u64,
    params_json: &str,
    mapper: &mut SymbolMapper,
) -> PrimSpec {
    let mut prim = PrimSpec::new(prim_name, "DomeLight", Specifier::Def);
    for input in &graph.inputs {
        prim.attributes.push(input_attribute(mapper, input));
    }
    let usage = graph
        .outputs
        .iter()
        .filter(|o| o.numeric.is_none())
        .flat_map(|o| o.usages.first())
        .next()
        .cloned()
        .unwrap_or_else(|| "environment".to_owned());
    prim.attributes.push(
        AttrSpec::new("inputs:texture:file", "asset").with_default(Value::AssetPath(
            texture_asset_path(package_path, graph, &usage, package_hash, params_json),
        )),
    );
    prim
}

fn package_stem(package_path: &str) -> String {
    let (outer, _) = split_package_path(package_path);
    let file_name = outer.rsplit('/').next().unwrap_or(outer);
    match file_name.rsplit_once('.') {
        Some((stem, _)) => stem.to_owned(),
        None => file_name.to_owned(),
    }
}

/// Build the virtual layer for a package: one material (or dome light) prim
/// per graph, bound to packaged texture paths at the current parameter
/// point. The layer is read only.
pub fn read_layer(package_path: &str, args: &SbsarArgs) -> SbsarResult<LayerData> {
    debug!("Reading package layer: {}", package_path);
    let (package, package_hash) = package(package_path)?;
    let params_json = write_dict_json(&args.sbsar_parameters);
    let stem = package_stem(package_path);

    let mut mapper = SymbolMapper::default();
    let mut layer = LayerData::read_only();
    let mut has_class_prim = false;
    let mut default_prim: Option<String> = None;

    for graph in package.graphs() {
        debug!("Reading graph: {}", graph.label);
        let prim_name = mapper.symbol(&graph.label).host_name;

        let mut prim = match classify_graph(graph) {
            GraphType::Material => {
                if !has_class_prim {
                    let mut class_prim =
                        PrimSpec::new(MATERIAL_CLASS_NAME, "Material", Specifier::Class);
                    // Inactive so it disappears when the stage is flattened.
                    class_prim.active = Some(false);
                    layer.prims.push(class_prim);
                    has_class_prim = true;
                }
                add_material_prim(
                    package_path,
                    graph,
                    &prim_name,
                    package_hash,
                    &params_json,
                    &mut mapper,
                )
            }
            GraphType::Light => add_dome_light_prim(
                package_path,
                graph,
                &prim_name,
                package_hash,
                &params_json,
                &mut mapper,
            ),
        };

        if graph.has_thumbnail() {
            prim.asset_info.insert(
                "defaultImage".to_owned(),
                Value::AssetPath(join_package_path(
                    package_path,
                    &format!("thumbnails/{}.png", prim_name),
                )),
            );
            prim.api_schemas.push("AssetPreviewsAPI".to_owned());
        }

        if default_prim.is_none() || stem.eq_ignore_ascii_case(&prim_name) {
            default_prim = Some(prim_name.clone());
        }
        layer.prims.push(prim);
    }

    layer.default_prim = default_prim;
    Ok(layer)
}
